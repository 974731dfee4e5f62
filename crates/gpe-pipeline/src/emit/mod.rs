//! Byte-exact encoders for Gen6 packets and state blocks.
//!
//! Encoders never decide whether they should run; the sequencer does. State
//! encoders in [`dynamic`] return the offset of the block they wrote, which
//! pointer packets in [`commands`] later reference.

pub mod commands;
pub mod dynamic;

pub use commands::{KernelRef, VertexBufferRef};
pub use dynamic::BufferView;
