//! Sandy Bridge sequencer.
//!
//! A draw runs in two passes over one [`Session`]: [`states`] re-encodes the
//! dirty state blocks and binding tables, then [`commands`] sends the
//! packets in the order the hardware requires, pointing at whatever the
//! first pass left in the cache. Workarounds for Gen6 errata are in
//! [`workarounds`].

mod commands;
mod rectlist;
mod states;
mod workarounds;

use tracing::trace;

use gpe_protocol::gen6::{PipeControl, PIPELINE_STATISTICS_REGS};

use crate::backend::BufferId;
use crate::builder::{Builder, WriterKind};
use crate::device::DeviceInfo;
use crate::emit::commands as cmd;
use crate::error::BuilderError;
use crate::kernel_cache::KernelCache;
use crate::state::{DrawInfo, PipelineState};

use super::cache::{InvalidateFlags, PipelineCache, PipelineCheckpoint};
use super::estimate;
use super::session::Session;
use super::{GenPipeline, PipelineAction, RectlistInfo};

/// Bytes of the batch in use, commands and stolen state together.
fn consumed(b: &Builder) -> usize {
    b.used(WriterKind::Batch) + b.stolen(WriterKind::Batch)
}

#[derive(Debug)]
pub struct Gen6Pipeline {
    device: DeviceInfo,
    workaround_bo: BufferId,
    cache: PipelineCache,
    invalidate: InvalidateFlags,
}

impl Gen6Pipeline {
    pub fn new(device: DeviceInfo, workaround_bo: BufferId) -> Self {
        Self {
            device,
            workaround_bo,
            cache: PipelineCache::default(),
            invalidate: InvalidateFlags::HW,
        }
    }

    /// A new batch starts without the post-sync workaround in it. `unset`
    /// also consumes the flag; draws leave it for [`Session::prepare`] and
    /// the context clears it once the draw made it.
    fn handle_invalid_batch_bo(&mut self, unset: bool) {
        if self.invalidate.contains(InvalidateFlags::BATCH_BO) {
            self.cache.post_sync_emitted = false;
            if unset {
                self.invalidate.remove(InvalidateFlags::BATCH_BO);
            }
        }
    }

    fn end_session(&mut self, b: &Builder, session: &Session, state: &PipelineState, draw: &DrawInfo) {
        let written = consumed(b) - session.init_consumed;
        debug_assert!(
            written <= self.estimate_size(PipelineAction::Draw(state)),
            "draw wrote {written} bytes, more than estimated"
        );
        trace!(
            dirty = ?session.state_dirty,
            changed = ?session.changed,
            hw_ctx = session.hw_ctx_changed,
            written,
            "draw session"
        );

        self.cache.reduced_prim = Some(session.reduced_prim);
        self.cache.primitive_restart = draw.primitive_restart;
    }

    /// PIPE_CONTROL flushing every cache the 3D pipeline writes through.
    fn emit_full_flush(&mut self, b: &mut Builder) -> Result<(), BuilderError> {
        self.wa_post_sync(b, false)?;
        cmd::pipe_control(
            b,
            PipeControl::INSTRUCTION_CACHE_INVALIDATE
                | PipeControl::RENDER_CACHE_FLUSH
                | PipeControl::DEPTH_CACHE_FLUSH
                | PipeControl::VF_CACHE_INVALIDATE
                | PipeControl::TEXTURE_CACHE_INVALIDATE
                | PipeControl::WRITE_NONE
                | PipeControl::CS_STALL,
            None,
        )
    }
}

impl GenPipeline for Gen6Pipeline {
    fn estimate_size(&self, action: PipelineAction<'_>) -> usize {
        match action {
            PipelineAction::Draw(state) => estimate::draw_commands() + estimate::draw_states(state),
            PipelineAction::Flush => estimate::flush(),
            PipelineAction::WriteTimestamp => estimate::write_timestamp(),
            PipelineAction::WriteDepthCount => estimate::write_depth_count(),
            PipelineAction::WriteStatistics => estimate::write_statistics(),
            PipelineAction::Rectlist(info) => estimate::rectlist(info),
        }
    }

    fn emit_draw(
        &mut self,
        b: &mut Builder,
        state: &PipelineState,
        draw: &DrawInfo,
        kernels: &KernelCache,
    ) -> Result<(), BuilderError> {
        self.handle_invalid_batch_bo(false);

        let mut session = Session::prepare(&self.cache, self.invalidate, state.dirty(), draw, consumed(b));

        session.begin_states();
        self.emit_states(b, state, &mut session)?;

        session.begin_commands();
        self.emit_commands(b, state, draw, kernels, &mut session)?;

        self.end_session(b, &session, state, draw);
        Ok(())
    }

    fn emit_flush(&mut self, b: &mut Builder) -> Result<(), BuilderError> {
        self.handle_invalid_batch_bo(true);
        let start = consumed(b);

        self.emit_full_flush(b)?;

        debug_assert!(consumed(b) - start <= estimate::flush());
        Ok(())
    }

    fn emit_write_timestamp(&mut self, b: &mut Builder, buffer: BufferId, index: u32) -> Result<(), BuilderError> {
        self.handle_invalid_batch_bo(true);
        let start = consumed(b);

        self.wa_post_sync(b, true)?;
        cmd::pipe_control(b, PipeControl::WRITE_TIMESTAMP, Some((buffer, index * 8)))?;

        debug_assert!(consumed(b) - start <= estimate::write_timestamp());
        Ok(())
    }

    fn emit_write_depth_count(
        &mut self,
        b: &mut Builder,
        buffer: BufferId,
        index: u32,
    ) -> Result<(), BuilderError> {
        self.handle_invalid_batch_bo(true);
        let start = consumed(b);

        self.wa_post_sync(b, false)?;
        cmd::pipe_control(
            b,
            PipeControl::DEPTH_STALL | PipeControl::WRITE_PS_DEPTH_COUNT,
            Some((buffer, index * 8)),
        )?;

        debug_assert!(consumed(b) - start <= estimate::write_depth_count());
        Ok(())
    }

    fn emit_write_statistics(
        &mut self,
        b: &mut Builder,
        buffer: BufferId,
        index: u32,
    ) -> Result<(), BuilderError> {
        self.handle_invalid_batch_bo(true);
        let start = consumed(b);

        self.emit_full_flush(b)?;
        for (i, reg) in PIPELINE_STATISTICS_REGS.iter().enumerate() {
            let offset = (index + i as u32) * 8;
            match reg {
                Some(reg) => {
                    cmd::store_register_mem(b, *reg, buffer, offset)?;
                    cmd::store_register_mem(b, *reg + 4, buffer, offset + 4)?;
                }
                None => cmd::store_data_imm(b, buffer, offset, 0)?,
            }
        }

        debug_assert!(consumed(b) - start <= estimate::write_statistics());
        Ok(())
    }

    fn emit_rectlist(&mut self, b: &mut Builder, info: &RectlistInfo) -> Result<(), BuilderError> {
        self.handle_invalid_batch_bo(true);
        let start = consumed(b);

        let handles = self.emit_rectlist_states(b, info)?;
        self.emit_rectlist_commands(b, info, &handles)?;

        debug_assert!(consumed(b) - start <= estimate::rectlist(info));
        Ok(())
    }

    fn invalidate(&mut self, flags: InvalidateFlags) {
        self.invalidate |= flags;
    }

    fn invalidate_flags(&self) -> InvalidateFlags {
        self.invalidate
    }

    fn clear_invalidate(&mut self) {
        self.invalidate = InvalidateFlags::empty();
    }

    fn cache(&self) -> &PipelineCache {
        &self.cache
    }

    fn checkpoint(&self) -> PipelineCheckpoint {
        PipelineCheckpoint {
            cache: self.cache.clone(),
            invalidate: self.invalidate,
        }
    }

    fn rewind(&mut self, checkpoint: PipelineCheckpoint) {
        self.cache = checkpoint.cache;
        self.invalidate = checkpoint.invalidate;
    }
}

#[cfg(test)]
mod tests;
