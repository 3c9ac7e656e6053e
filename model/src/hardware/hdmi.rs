//! HDMI frame front-end: frame sequencer stub plus checksum accumulator.
//!
//! The real pixel pipeline is an external producer; this block models the
//! part the register contract can observe. A started frame runs a fixed
//! raster of lines, folds one content word per line into a running
//! CRC-32, and on the last cycle latches the accumulator into HDMI_CRC
//! and requests the frame-done interrupt.
//!
//! The accumulator is cumulative across frames: it is cleared by reset
//! only, never between frames and never by software, so consecutive
//! frames latch different, nonzero checksums.
//!
//! # Register Map
//!
//! | Byte Addr | Register    | Description                            |
//! |-----------|-------------|----------------------------------------|
//! | `0x20`    | CAM_X       | Camera position X                      |
//! | `0x24`    | CAM_Y       | Camera position Y                      |
//! | `0x28`    | CAM_Z       | Camera position Z                      |
//! | `0x2C`    | CAM_DIR_X   | Camera direction X                     |
//! | `0x30`    | CAM_DIR_Y   | Camera direction Y                     |
//! | `0x34`    | CAM_DIR_Z   | Camera direction Z                     |
//! | `0x38`    | CAM_PLANE_X | Camera plane X                         |
//! | `0x3C`    | CAM_PLANE_Y | Camera plane Y                         |
//! | `0x40`    | FLAGS       | [0]=smooth [1]=curv [2]=extra_light [3]=diag_slice |
//! | `0x44`    | SEL_ACTIVE  | Selection cursor enable                |
//! | `0x48`    | SEL_X       | Selection cursor X                     |
//! | `0x4C`    | SEL_Y       | Selection cursor Y                     |
//! | `0x50`    | SEL_Z       | Selection cursor Z                     |
//! | `0x54`    | FB_BASE     | Framebuffer base address               |
//! | `0x58`    | FB_STRIDE   | Framebuffer row stride                 |
//! | `0xA0`    | DBG_ADDR    | Diagnostic window index                |
//! | `0xA4`    | DBG_DATA_LO | Diagnostic word, low half              |
//! | `0xA8`    | DBG_DATA_HI | Diagnostic word, high half             |
//! | `0xAC`    | DBG_CTRL    | [0]=write_pulse, commits HI:LO at ADDR |
//! | `0xB0`    | HDMI_CRC    | Last latched frame checksum            |
//!
//! All of the configuration above is frame content: every word is folded
//! into the per-line CRC input, so camera moves, flag flips and
//! diagnostic pokes all show up in the next latched checksum.

use serde::{Deserialize, Serialize};
use serde_with::serde_as;

use crate::bitwise::Bits;

/// FLAGS bit positions.
pub const FLAG_SMOOTH: u8 = 0;
pub const FLAG_CURV: u8 = 1;
pub const FLAG_EXTRA_LIGHT: u8 = 2;
pub const FLAG_DIAG_SLICE: u8 = 3;

/// Default raster geometry: lines per frame and cycles per line.
pub const DEFAULT_FRAME_LINES: u32 = 16;
pub const DEFAULT_LINE_CYCLES: u32 = 64;

/// Diagnostic window size in 64-bit words.
pub const DEBUG_WINDOW_WORDS: usize = 64;

/// Frame producer configuration registers, all plain read/write stores.
#[derive(Default, Serialize, Deserialize)]
pub struct Registers {
    /// Camera position X
    pub cam_x: u32,
    /// Camera position Y
    pub cam_y: u32,
    /// Camera position Z
    pub cam_z: u32,
    /// Camera direction X
    pub cam_dir_x: u32,
    /// Camera direction Y
    pub cam_dir_y: u32,
    /// Camera direction Z
    pub cam_dir_z: u32,
    /// Camera plane X
    pub cam_plane_x: u32,
    /// Camera plane Y
    pub cam_plane_y: u32,
    /// Render feature flags
    pub flags: u32,
    /// Selection cursor enable
    pub sel_active: u32,
    /// Selection cursor X
    pub sel_x: u32,
    /// Selection cursor Y
    pub sel_y: u32,
    /// Selection cursor Z
    pub sel_z: u32,
    /// Framebuffer base address
    pub fb_base: u32,
    /// Framebuffer row stride
    pub fb_stride: u32,
    /// Diagnostic window index
    pub dbg_addr: u32,
    /// Diagnostic word, low half
    pub dbg_data_lo: u32,
    /// Diagnostic word, high half
    pub dbg_data_hi: u32,
}

#[serde_as]
#[derive(Serialize, Deserialize)]
pub struct Hdmi {
    pub registers: Registers,

    /// Diagnostic backdoor contents, folded into every frame.
    #[serde_as(as = "[_; 64]")]
    debug_window: [u64; DEBUG_WINDOW_WORDS],

    frame_lines: u32,
    line_cycles: u32,

    frame_active: bool,
    line: u32,
    line_cycle: u32,

    /// Running CRC-32 accumulator, survives across frames.
    crc: u32,
    /// HDMI_CRC register value, latched at frame completion.
    crc_latch: u32,
    frame_count: u32,
    frame_done: bool,
}

impl Default for Hdmi {
    fn default() -> Self {
        Self::with_geometry(DEFAULT_FRAME_LINES, DEFAULT_LINE_CYCLES)
    }
}

#[allow(clippy::module_name_repetitions)]
#[derive(Default)]
pub struct HdmiStepOutput {
    pub request_frame_done_irq: bool,
}

impl Hdmi {
    /// A front-end with a custom raster, mostly useful to keep test cycle
    /// budgets small. Geometry is clamped to at least one line of one
    /// cycle.
    #[must_use]
    pub fn with_geometry(frame_lines: u32, line_cycles: u32) -> Self {
        Self {
            registers: Registers::default(),
            debug_window: [0; DEBUG_WINDOW_WORDS],
            frame_lines: frame_lines.max(1),
            line_cycles: line_cycles.max(1),
            frame_active: false,
            line: 0,
            line_cycle: 0,
            crc: 0,
            crc_latch: 0,
            frame_count: 0,
            frame_done: false,
        }
    }

    /// Start-frame command from CTRL. Ignored while a frame is already
    /// running, the producer has no notion of a queued frame.
    pub fn start_frame(&mut self) {
        if self.frame_active {
            return;
        }

        self.frame_active = true;
        self.frame_done = false;
        self.line = 0;
        self.line_cycle = 0;
    }

    /// DBG_CTRL write pulse: commits DBG_DATA_HI:DBG_DATA_LO into the
    /// diagnostic window at DBG_ADDR (index wraps at the window size).
    pub fn commit_debug_word(&mut self) {
        let index = self.registers.dbg_addr as usize % DEBUG_WINDOW_WORDS;
        self.debug_window[index] =
            (u64::from(self.registers.dbg_data_hi) << 32) | u64::from(self.registers.dbg_data_lo);
    }

    pub fn step(&mut self) -> HdmiStepOutput {
        let mut output = HdmiStepOutput::default();

        if !self.frame_active {
            return output;
        }

        self.line_cycle += 1;

        if self.line_cycle == self.line_cycles {
            self.crc = crc32_word(self.crc, self.line_word());

            self.line_cycle = 0;
            self.line += 1;

            if self.line == self.frame_lines {
                self.frame_active = false;
                self.frame_done = true;
                self.frame_count = self.frame_count.wrapping_add(1);
                self.crc_latch = self.crc;
                output.request_frame_done_irq = true;
            }
        }

        output
    }

    /// STATUS busy bit: a frame is being produced.
    #[must_use]
    pub const fn busy(&self) -> bool {
        self.frame_active
    }

    /// STATUS frame-done bit: the last started frame ran to completion.
    #[must_use]
    pub const fn frame_done(&self) -> bool {
        self.frame_done
    }

    /// HDMI_CRC register value.
    #[must_use]
    pub const fn crc_latch(&self) -> u32 {
        self.crc_latch
    }

    #[must_use]
    pub const fn frame_count(&self) -> u32 {
        self.frame_count
    }

    #[must_use]
    pub const fn frame_lines(&self) -> u32 {
        self.frame_lines
    }

    #[must_use]
    pub const fn line_cycles(&self) -> u32 {
        self.line_cycles
    }

    /// One word of frame content per line: the frame ordinal, the line
    /// number, the whole producer configuration and the matching
    /// diagnostic window word.
    fn line_word(&self) -> u32 {
        let r = &self.registers;
        let window = self.debug_window[self.line as usize % DEBUG_WINDOW_WORDS];

        // The ordinal term keeps the word nonzero on an all-zero
        // configuration, a frame must never fold pure zeroes.
        let mut word = self
            .frame_count
            .wrapping_add(1)
            .wrapping_mul(0x9E37_79B9)
            .wrapping_add(self.line);

        word ^= r.cam_x ^ r.cam_y.rotate_left(4) ^ r.cam_z.rotate_left(8);
        word ^= r.cam_dir_x ^ r.cam_dir_y.rotate_left(4) ^ r.cam_dir_z.rotate_left(8);
        word ^= r.cam_plane_x ^ r.cam_plane_y.rotate_left(16);
        word ^= r.flags.get_bits(0..=3).rotate_left(24);
        word ^= r.sel_active ^ r.sel_x ^ r.sel_y.rotate_left(8) ^ r.sel_z.rotate_left(16);
        word ^= r.fb_base ^ r.fb_stride.rotate_left(12);
        word ^= (window as u32) ^ ((window >> 32) as u32);

        word
    }
}

/// One reflected CRC-32 update over a 32-bit word.
fn crc32_word(crc: u32, word: u32) -> u32 {
    let mut crc = crc ^ word;
    for _ in 0..32 {
        let mask = (crc & 1).wrapping_neg();
        crc = (crc >> 1) ^ (0xEDB8_8320 & mask);
    }
    crc
}
