//! Batch walker used by tests and debug dumps.

use crate::gen6::{Command, DWORD_BYTES};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("batch length {0} is not a multiple of 4")]
    Misaligned(usize),
    #[error("unknown command header {dw0:#010x} at dword {offset}")]
    UnknownCommand { offset: usize, dw0: u32 },
    #[error("{name} at dword {offset} claims {len} dwords but only {remaining} remain")]
    Truncated {
        name: &'static str,
        offset: usize,
        len: usize,
        remaining: usize,
    },
}

/// One packet found in a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPacket {
    pub command: Command,
    /// Offset of DW0, in dwords.
    pub offset_dw: usize,
    pub dwords: Vec<u32>,
}

impl DecodedPacket {
    pub fn dw(&self, index: usize) -> u32 {
        self.dwords.get(index).copied().unwrap_or(0)
    }
}

pub fn bytes_to_dwords(bytes: &[u8]) -> Result<Vec<u32>, DecodeError> {
    if bytes.len() % DWORD_BYTES != 0 {
        return Err(DecodeError::Misaligned(bytes.len()));
    }
    Ok(bytes
        .chunks_exact(DWORD_BYTES)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Walks `bytes` packet by packet. Decoding stops after
/// `MI_BATCH_BUFFER_END`; anything following it is padding.
pub fn decode_batch(bytes: &[u8]) -> Result<Vec<DecodedPacket>, DecodeError> {
    decode_dwords(&bytes_to_dwords(bytes)?)
}

pub fn decode_dwords(dwords: &[u32]) -> Result<Vec<DecodedPacket>, DecodeError> {
    let mut packets = Vec::new();
    let mut offset = 0usize;

    while offset < dwords.len() {
        let dw0 = dwords[offset];
        let command =
            Command::from_dw0(dw0).ok_or(DecodeError::UnknownCommand { offset, dw0 })?;
        let len = command.packet_len_dw(dw0);
        let remaining = dwords.len() - offset;
        if len > remaining {
            return Err(DecodeError::Truncated {
                name: command.name(),
                offset,
                len,
                remaining,
            });
        }

        packets.push(DecodedPacket {
            command,
            offset_dw: offset,
            dwords: dwords[offset..offset + len].to_vec(),
        });
        offset += len;

        if command == Command::MiBatchBufferEnd {
            break;
        }
    }

    Ok(packets)
}

/// Command names in batch order, for compact sequence assertions.
pub fn command_names(packets: &[DecodedPacket]) -> Vec<&'static str> {
    packets.iter().map(|p| p.command.name()).collect()
}
