//! Event stream assembly for the eventide sync core.

mod assembler;
mod cursor;

pub use assembler::{AssemblerEvent, ChainFeed, StreamAssembler};
