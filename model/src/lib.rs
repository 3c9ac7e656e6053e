#[allow(clippy::cast_possible_truncation)]
mod bitwise;

#[allow(clippy::missing_panics_doc)]
#[allow(clippy::unreadable_literal)]
pub mod bus;

#[allow(clippy::cast_possible_truncation)]
pub mod hardware;
pub mod hydra;
pub mod ring_buffer;
