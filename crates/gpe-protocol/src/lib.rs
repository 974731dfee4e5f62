//! Gen6 command-stream packet layouts and a batch decoder.
//!
//! This crate owns the binary contract between the pipeline emitter and the
//! hardware: opcodes, packet lengths, field shifts, state block sizes and
//! alignments. `gpe-pipeline` writes these packets; [`decode`] reads them back.

pub mod decode;
pub mod gen6;

pub use decode::{decode_batch, decode_dwords, DecodeError, DecodedPacket};
pub use gen6::{Command, PipeControl, Topology};
