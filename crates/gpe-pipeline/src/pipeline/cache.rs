use bitflags::bitflags;

use crate::state::ReducedPrim;

/// Surface slots per stage binding table.
pub const MAX_SURFACES: usize = 64;

/// Border color blocks per stage, one per sampler slot.
pub const MAX_BORDER_COLORS: usize = crate::state::MAX_SAMPLERS;

bitflags! {
    /// What the next draw cannot assume is still in place.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct InvalidateFlags: u32 {
        /// The hardware context was (re)created; every command is re-sent.
        const HW = 1 << 0;
        /// Dynamic state lives in a new buffer; every handle is stale.
        const STATE_BO = 1 << 1;
        /// Kernels moved to a new instruction buffer.
        const KERNEL_BO = 1 << 2;
        /// A new batch buffer was started.
        const BATCH_BO = 1 << 3;
    }
}

/// Handles of one stage's surface, sampler and push constant state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageHandles {
    pub binding_table: u32,
    /// Entries in the last binding table written.
    pub binding_table_size: usize,
    /// Surface handle per binding table slot, 0 when unused.
    pub surfaces: [u32; MAX_SURFACES],
    pub sampler_state: u32,
    pub border_colors: [u32; MAX_BORDER_COLORS],
    pub push_constants: u32,
    /// Bytes of push constants at `push_constants`, 0 when disabled.
    pub push_constants_size: u32,
}

impl Default for StageHandles {
    fn default() -> Self {
        Self {
            binding_table: 0,
            binding_table_size: 0,
            surfaces: [0; MAX_SURFACES],
            sampler_state: 0,
            border_colors: [0; MAX_BORDER_COLORS],
            push_constants: 0,
            push_constants_size: 0,
        }
    }
}

/// State the pipeline keeps between draws: the current handle of every
/// hardware object, and the values whose changes the caller's dirty bits do
/// not capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineCache {
    pub sf_viewport: u32,
    pub clip_viewport: u32,
    pub cc_viewport: u32,
    pub scissor_rect: u32,
    pub blend: u32,
    pub depth_stencil: u32,
    pub color_calc: u32,
    /// Indexed by [`crate::state::ShaderStage::index`].
    pub stages: [StageHandles; 3],
    /// Primitive class of the last draw; `None` before the first one.
    pub reduced_prim: Option<ReducedPrim>,
    pub primitive_restart: bool,
    /// The URB is currently split between VS and GS.
    pub gs_active: bool,
    pub so_max_vertices: u32,
    pub so_num_vertices: u32,
    /// The post-sync PIPE_CONTROL workaround went out since the last
    /// 3DPRIMITIVE.
    pub post_sync_emitted: bool,
}

impl Default for PipelineCache {
    fn default() -> Self {
        Self {
            sf_viewport: 0,
            clip_viewport: 0,
            cc_viewport: 0,
            scissor_rect: 0,
            blend: 0,
            depth_stencil: 0,
            color_calc: 0,
            stages: Default::default(),
            reduced_prim: None,
            primitive_restart: false,
            gs_active: false,
            so_max_vertices: 0,
            so_num_vertices: 0,
            post_sync_emitted: false,
        }
    }
}

/// A pipeline's cache and pending invalidations at one point in the batch,
/// for undoing emissions the builder rewinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineCheckpoint {
    pub(crate) cache: PipelineCache,
    pub(crate) invalidate: InvalidateFlags,
}

impl PipelineCheckpoint {
    pub fn cache(&self) -> &PipelineCache {
        &self.cache
    }
}
