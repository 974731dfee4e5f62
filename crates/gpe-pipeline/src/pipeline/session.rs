//! Per-draw dirty tracking.
//!
//! A [`Session`] lives for exactly one draw. It starts from the caller's
//! coarse [`DirtyFlags`], folds in what the pipeline knows changed behind the
//! caller's back (new buffers, a new hardware context, a new primitive
//! class), and accumulates the [`SessionFlags`] telling the command pass
//! which pointer packets must be re-sent.

use bitflags::bitflags;

use crate::state::{DirtyFlags, DrawInfo, ReducedPrim, ShaderStage};

use super::cache::{InvalidateFlags, PipelineCache};

bitflags! {
    /// Hardware objects whose handle changed during the session.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct SessionFlags: u32 {
        const VIEWPORT = 1 << 0;
        const CC_BLEND = 1 << 1;
        const CC_DSA = 1 << 2;
        const CC_CC = 1 << 3;
        const SCISSOR = 1 << 4;
        const BT_VS = 1 << 5;
        const BT_GS = 1 << 6;
        const BT_FS = 1 << 7;
        const SAMPLER_VS = 1 << 8;
        const SAMPLER_GS = 1 << 9;
        const SAMPLER_FS = 1 << 10;
        const PCB_VS = 1 << 11;
        const PCB_GS = 1 << 12;
        const PCB_FS = 1 << 13;

        const CC = Self::CC_BLEND.bits() | Self::CC_DSA.bits() | Self::CC_CC.bits();
        const BINDING_TABLES = Self::BT_VS.bits() | Self::BT_GS.bits() | Self::BT_FS.bits();
        const SAMPLERS = Self::SAMPLER_VS.bits() | Self::SAMPLER_GS.bits() | Self::SAMPLER_FS.bits();
        const PCBS = Self::PCB_VS.bits() | Self::PCB_GS.bits() | Self::PCB_FS.bits();
    }
}

impl SessionFlags {
    /// Everything addressed relative to the dynamic state base.
    pub const BASE_RELATIVE: SessionFlags = SessionFlags::all();

    pub const fn binding_table(stage: ShaderStage) -> Self {
        match stage {
            ShaderStage::Vertex => Self::BT_VS,
            ShaderStage::Geometry => Self::BT_GS,
            ShaderStage::Fragment => Self::BT_FS,
        }
    }

    pub const fn sampler(stage: ShaderStage) -> Self {
        match stage {
            ShaderStage::Vertex => Self::SAMPLER_VS,
            ShaderStage::Geometry => Self::SAMPLER_GS,
            ShaderStage::Fragment => Self::SAMPLER_FS,
        }
    }

    pub const fn push_constants(stage: ShaderStage) -> Self {
        match stage {
            ShaderStage::Vertex => Self::PCB_VS,
            ShaderStage::Geometry => Self::PCB_GS,
            ShaderStage::Fragment => Self::PCB_FS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Coarse bits the current pass honors.
    pub pipe_dirty: DirtyFlags,
    /// Bits the caller reported.
    pub state_dirty: DirtyFlags,
    pub changed: SessionFlags,
    pub reduced_prim: ReducedPrim,

    pub hw_ctx_changed: bool,
    pub batch_bo_changed: bool,
    pub state_bo_changed: bool,
    pub kernel_bo_changed: bool,
    pub prim_changed: bool,
    pub restart_changed: bool,

    /// Highest binding table slot written this session, plus one, per stage.
    pub num_surfaces: [usize; 3],
    /// Batch bytes (commands and state) in use when the session began.
    pub init_consumed: usize,
}

impl Session {
    pub fn prepare(
        cache: &PipelineCache,
        invalidate: InvalidateFlags,
        state_dirty: DirtyFlags,
        draw: &DrawInfo,
        init_consumed: usize,
    ) -> Self {
        let reduced_prim = draw.mode.reduced();
        let hw_ctx_changed = invalidate.contains(InvalidateFlags::HW);

        let mut session = Self {
            pipe_dirty: state_dirty,
            state_dirty,
            changed: SessionFlags::empty(),
            reduced_prim,
            hw_ctx_changed,
            batch_bo_changed: true,
            state_bo_changed: true,
            kernel_bo_changed: true,
            prim_changed: true,
            restart_changed: true,
            num_surfaces: [0; 3],
            init_consumed,
        };

        if !hw_ctx_changed {
            // Resource addresses are not pinned across batches, so anything
            // embedding one is re-sent whenever the state buffer is new. The
            // BATCH_BO flag itself only drives the post-sync latch.
            let state_bo = invalidate.contains(InvalidateFlags::STATE_BO);
            session.batch_bo_changed = state_bo;
            session.state_bo_changed = state_bo;
            session.kernel_bo_changed = invalidate.contains(InvalidateFlags::KERNEL_BO);
            session.prim_changed = cache.reduced_prim != Some(reduced_prim);
            session.restart_changed = cache.primitive_restart != draw.primitive_restart;
        }

        session
    }

    /// Arms the pass that encodes state blocks.
    pub fn begin_states(&mut self) {
        self.pipe_dirty = if self.state_bo_changed {
            DirtyFlags::all()
        } else {
            self.state_dirty
        };
    }

    /// Arms the pass that writes commands.
    pub fn begin_commands(&mut self) {
        self.pipe_dirty = if self.hw_ctx_changed {
            DirtyFlags::all()
        } else {
            self.state_dirty
        };
    }

    pub fn dirty(&self, flags: DirtyFlags) -> bool {
        self.pipe_dirty.intersects(flags)
    }

    pub fn changed(&self, flags: SessionFlags) -> bool {
        self.changed.intersects(flags)
    }

    pub fn mark(&mut self, flags: SessionFlags) {
        self.changed |= flags;
    }

    /// Any buffer identity changed, which moves the base addresses.
    pub fn base_address_changed(&self) -> bool {
        self.state_bo_changed || self.kernel_bo_changed || self.batch_bo_changed
    }

    pub fn grow_num_surfaces(&mut self, stage: ShaderStage, count: usize) {
        let n = &mut self.num_surfaces[stage.index()];
        *n = (*n).max(count);
    }
}
