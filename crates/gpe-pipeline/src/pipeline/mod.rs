//! The draw-time sequencer.
//!
//! A [`GenPipeline`] turns the logical [`PipelineState`] into commands for
//! one hardware generation. It is chosen once per context with
//! [`for_device`] and keeps a [`PipelineCache`] of everything it emitted, so
//! each draw only re-sends what changed.

mod cache;
pub mod estimate;
mod gen6;
mod session;

use std::fmt;

use bitflags::bitflags;

use crate::backend::BufferId;
use crate::builder::Builder;
use crate::device::{DeviceInfo, GpuGen};
use crate::emit::commands::HizOp;
use crate::error::{BuilderError, ContextError};
use crate::kernel_cache::KernelCache;
use crate::state::{
    BlendColor, DepthStencilAlpha, DepthStencilSurface, DrawInfo, PipelineState, StencilRef,
    Viewport,
};

pub use cache::{InvalidateFlags, PipelineCache, PipelineCheckpoint, StageHandles, MAX_BORDER_COLORS, MAX_SURFACES};
pub use gen6::Gen6Pipeline;
pub use session::{Session, SessionFlags};

/// Depth buffer operations performed by drawing a rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RectlistOp {
    ClearZs,
    ResolveZ,
    ResolveHiz,
}

impl RectlistOp {
    pub(crate) fn hiz_op(self) -> HizOp {
        match self {
            RectlistOp::ClearZs => HizOp::DepthClear,
            RectlistOp::ResolveZ => HizOp::DepthResolve,
            RectlistOp::ResolveHiz => HizOp::HizResolve,
        }
    }
}

bitflags! {
    /// State a rectangle-list operation brings along.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct RectlistUses: u32 {
        const DSA = 1 << 0;
        const CC = 1 << 1;
        const VIEWPORT = 1 << 2;
        const FB_DEPTH = 1 << 3;
        const FB_STENCIL = 1 << 4;
    }
}

/// A self-contained rectangle draw on the depth/stencil buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct RectlistInfo {
    pub op: RectlistOp,
    pub uses: RectlistUses,
    pub width: u32,
    pub height: u32,
    pub num_samples: u32,
    pub zs: Option<DepthStencilSurface>,
    pub depth_clear_value: u32,
    /// Corners of the rectangle: (x1, y1), (x0, y1), (x0, y0).
    pub vertices: [[f32; 2]; 3],
    pub dsa: DepthStencilAlpha,
    pub stencil_ref: StencilRef,
    pub alpha_ref: f32,
    pub blend_color: BlendColor,
    pub viewport: Viewport,
}

impl RectlistInfo {
    /// Covers the `width` x `height` surface starting at the origin.
    pub fn new(op: RectlistOp, zs: DepthStencilSurface) -> Self {
        let (w, h) = (zs.width, zs.height);
        let mut uses = RectlistUses::DSA | RectlistUses::FB_DEPTH;
        if zs.stencil.is_some() {
            uses |= RectlistUses::FB_STENCIL;
        }
        Self {
            op,
            uses,
            width: w,
            height: h,
            num_samples: 1,
            depth_clear_value: zs.clear_value,
            zs: Some(zs),
            vertices: [[w as f32, h as f32], [0.0, h as f32], [0.0, 0.0]],
            dsa: DepthStencilAlpha::default(),
            stencil_ref: StencilRef::default(),
            alpha_ref: 0.0,
            blend_color: BlendColor::default(),
            viewport: Viewport::from_rect(0.0, 0.0, w as f32, h as f32),
        }
    }
}

/// Everything a pipeline can be asked to emit.
#[derive(Debug, Clone, Copy)]
pub enum PipelineAction<'a> {
    Draw(&'a PipelineState),
    Flush,
    WriteTimestamp,
    WriteDepthCount,
    WriteStatistics,
    Rectlist(&'a RectlistInfo),
}

/// One hardware generation's sequencer.
///
/// `estimate_size` must bound what the matching `emit_*` call writes into
/// the batch, commands and dynamic state combined.
pub trait GenPipeline: fmt::Debug {
    fn estimate_size(&self, action: PipelineAction<'_>) -> usize;

    fn emit_draw(
        &mut self,
        b: &mut Builder,
        state: &PipelineState,
        draw: &DrawInfo,
        kernels: &KernelCache,
    ) -> Result<(), BuilderError>;

    fn emit_flush(&mut self, b: &mut Builder) -> Result<(), BuilderError>;

    /// Writes the GPU timestamp to `buffer` at `index * 8`.
    fn emit_write_timestamp(&mut self, b: &mut Builder, buffer: BufferId, index: u32) -> Result<(), BuilderError>;

    /// Writes the PS depth count to `buffer` at `index * 8`.
    fn emit_write_depth_count(&mut self, b: &mut Builder, buffer: BufferId, index: u32)
        -> Result<(), BuilderError>;

    /// Writes the pipeline statistics counters to `buffer`, one qword per
    /// counter, starting at slot `index`.
    fn emit_write_statistics(&mut self, b: &mut Builder, buffer: BufferId, index: u32)
        -> Result<(), BuilderError>;

    fn emit_rectlist(&mut self, b: &mut Builder, info: &RectlistInfo) -> Result<(), BuilderError>;

    fn invalidate(&mut self, flags: InvalidateFlags);

    fn invalidate_flags(&self) -> InvalidateFlags;

    /// Forgets pending invalidations after a successful draw.
    fn clear_invalidate(&mut self);

    fn cache(&self) -> &PipelineCache;

    fn checkpoint(&self) -> PipelineCheckpoint;

    /// Puts the cache and invalidations back to `checkpoint`, after the
    /// batch was rewound or dropped past it.
    fn rewind(&mut self, checkpoint: PipelineCheckpoint);
}

/// Picks the sequencer for `device`. `workaround_bo` receives the
/// post-sync writes some workarounds need.
pub fn for_device(device: &DeviceInfo, workaround_bo: BufferId) -> Result<Box<dyn GenPipeline>, ContextError> {
    match device.gen {
        GpuGen::Gen6 => Ok(Box::new(Gen6Pipeline::new(*device, workaround_bo))),
        gen => Err(ContextError::UnsupportedGen(gen)),
    }
}
