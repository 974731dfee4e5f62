use std::collections::HashMap;

use tracing::debug;

use gpe_protocol::gen6::state_align;

use crate::backend::BufferId;
use crate::builder::{Builder, ItemKind, WriterKind};
use crate::emit::KernelRef;
use crate::error::BuilderError;
use crate::state::{KernelId, PipelineState, ShaderKernel};

/// Where each bound kernel lives in the instruction writer.
///
/// Kernels are uploaded once and stay put: the instruction writer is
/// append-only, so offsets remain valid until it loses its content.
#[derive(Debug, Default)]
pub struct KernelCache {
    offsets: HashMap<KernelId, u32>,
    buffer: Option<BufferId>,
    generation: u64,
}

impl KernelCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uploads the kernels `state` binds that are not resident yet. Returns
    /// true when the instruction buffer is not the one the previous call
    /// saw, meaning `STATE_BASE_ADDRESS` must be re-sent.
    pub fn upload(&mut self, b: &mut Builder, state: &PipelineState) -> Result<bool, BuilderError> {
        let generation = b.generation(WriterKind::Instruction);
        if generation != self.generation {
            self.offsets.clear();
            self.generation = generation;
        }

        for kernel in state.kernels() {
            if self.offsets.contains_key(&kernel.id) {
                continue;
            }
            let offset = b.instruction_write(ItemKind::Kernel, state_align::KERNEL, &kernel.code)?;
            debug!(kernel = kernel.id.0, offset, size = kernel.code.len(), "uploaded kernel");
            self.offsets.insert(kernel.id, offset);
        }

        let buffer = b.buffer(WriterKind::Instruction);
        let moved = buffer != self.buffer;
        self.buffer = buffer;
        Ok(moved)
    }

    pub fn offset(&self, id: KernelId) -> Option<u32> {
        self.offsets.get(&id).copied()
    }

    /// `kernel` as packets reference it, if uploaded.
    pub fn resolve<'a>(&self, kernel: Option<&'a ShaderKernel>) -> Option<KernelRef<'a>> {
        let kernel = kernel?;
        let offset = self.offset(kernel.id)?;
        Some(KernelRef {
            offset,
            params: &kernel.params,
        })
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }
}
