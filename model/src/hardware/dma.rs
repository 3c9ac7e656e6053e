//! Single-channel DMA command sequencer.
//!
//! The engine does not move bytes itself, the external data mover does;
//! it sequences one transfer at a time: snapshot the parameter registers
//! at dispatch, count down one word-unit of work per cycle, raise the
//! completion event. There is no request queueing and no cancellation, a
//! start while a transfer is in flight is dropped.

use serde::{Deserialize, Serialize};

/// Transfer parameter registers. Written over the bus at any time, but
/// the engine only looks at them at the moment a start is accepted.
#[derive(Default, Serialize, Deserialize)]
pub struct Registers {
    pub source_address: u32,
    pub destination_address: u32,
    /// Transfer length in bytes.
    pub byte_count: u32,
}

/// Where the engine is in its command cycle. The command bit alone does
/// not encode this, it is self-clearing, so the state is explicit.
#[derive(Default, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug)]
pub enum State {
    #[default]
    Idle,
    /// Start accepted, descriptor goes out to the mover next edge.
    Dispatched,
    Transferring,
    /// Transfer finished. The engine re-arms from here, software does not
    /// have to acknowledge the done interrupt first.
    Done,
}

/// Parameter snapshot handed to the external data mover at dispatch.
#[derive(Default, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug)]
pub struct Descriptor {
    pub source_address: u32,
    pub destination_address: u32,
    pub byte_count: u32,
}

#[derive(Default, Serialize, Deserialize)]
pub struct Dma {
    pub registers: Registers,
    state: State,
    /// Parameters captured at the last accepted start. Rewriting the
    /// registers mid-transfer cannot touch an in-flight move.
    shadow: Descriptor,
    words_left: u32,
}

#[allow(clippy::module_name_repetitions)]
#[derive(Default)]
pub struct DmaStepOutput {
    pub request_dma_done_irq: bool,
    /// Present on the edge the snapshot goes out to the mover.
    pub dispatched: Option<Descriptor>,
}

impl Dma {
    /// Start command from DMA_CMD bit0. Accepted in Idle and Done,
    /// ignored while a transfer is outstanding. Returns whether the
    /// command was accepted.
    pub fn kick(&mut self) -> bool {
        match self.state {
            State::Idle | State::Done => {
                self.shadow = Descriptor {
                    source_address: self.registers.source_address,
                    destination_address: self.registers.destination_address,
                    byte_count: self.registers.byte_count,
                };
                self.state = State::Dispatched;
                true
            }
            State::Dispatched | State::Transferring => false,
        }
    }

    pub fn step(&mut self) -> DmaStepOutput {
        let mut output = DmaStepOutput::default();

        match self.state {
            State::Idle | State::Done => {}
            State::Dispatched => {
                output.dispatched = Some(self.shadow);
                self.words_left = self.shadow.byte_count.div_ceil(4);

                if self.words_left == 0 {
                    // A zero-length transfer is legal and completes
                    // immediately, done is still signalled.
                    self.state = State::Done;
                    output.request_dma_done_irq = true;
                } else {
                    self.state = State::Transferring;
                }
            }
            State::Transferring => {
                self.words_left -= 1;
                if self.words_left == 0 {
                    self.state = State::Done;
                    output.request_dma_done_irq = true;
                }
            }
        }

        output
    }

    #[must_use]
    pub const fn state(&self) -> State {
        self.state
    }

    /// DMA_STATUS / STATUS busy bit: a transfer is outstanding.
    #[must_use]
    pub const fn busy(&self) -> bool {
        matches!(self.state, State::Dispatched | State::Transferring)
    }

    /// DMA_STATUS / STATUS done bit: last transfer ran to completion and
    /// no new one has been accepted since.
    #[must_use]
    pub const fn done(&self) -> bool {
        matches!(self.state, State::Done)
    }
}
