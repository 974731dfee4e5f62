//! PIPE_CONTROL sequences Gen6 needs before certain packets.

use gpe_protocol::gen6::PipeControl;

use crate::builder::Builder;
use crate::emit::commands as cmd;
use crate::error::BuilderError;

use super::Gen6Pipeline;

impl Gen6Pipeline {
    /// Must precede any depth stall or cache flush, including those
    /// non-pipelined state packets imply. Sent at most once between two
    /// 3DPRIMITIVEs.
    ///
    /// The write-cache flush it guards needs a PIPE_CONTROL with a post-sync
    /// op first, which in turn needs a CS stall first. With
    /// `caller_post_sync` the caller's own PIPE_CONTROL carries the post-sync
    /// op and only the stall is sent.
    pub(super) fn wa_post_sync(&mut self, b: &mut Builder, caller_post_sync: bool) -> Result<(), BuilderError> {
        if self.cache.post_sync_emitted {
            return Ok(());
        }
        self.cache.post_sync_emitted = true;

        cmd::pipe_control(b, PipeControl::CS_STALL | PipeControl::PIXEL_SCOREBOARD_STALL, None)?;
        if caller_post_sync {
            return Ok(());
        }
        cmd::pipe_control(b, PipeControl::WRITE_IMM, Some((self.workaround_bo, 0)))
    }

    /// Depth caches must be flushed, with a CS stall, before
    /// 3DSTATE_MULTISAMPLE is parsed.
    pub(super) fn wa_multisample_flush(&mut self, b: &mut Builder) -> Result<(), BuilderError> {
        self.wa_post_sync(b, false)?;
        cmd::pipe_control(b, PipeControl::DEPTH_CACHE_FLUSH | PipeControl::CS_STALL, None)
    }

    /// Stall, flush, stall ahead of the depth buffer packets.
    pub(super) fn wa_depth_flush(&mut self, b: &mut Builder) -> Result<(), BuilderError> {
        self.wa_post_sync(b, false)?;
        cmd::pipe_control(b, PipeControl::DEPTH_STALL, None)?;
        cmd::pipe_control(b, PipeControl::DEPTH_CACHE_FLUSH, None)?;
        cmd::pipe_control(b, PipeControl::DEPTH_STALL, None)
    }

    /// A pixel scoreboard stall must precede any change to the WM thread
    /// count. The post-sync workaround already includes one.
    pub(super) fn wa_max_threads_stall(&mut self, b: &mut Builder) -> Result<(), BuilderError> {
        if self.cache.post_sync_emitted {
            return Ok(());
        }
        cmd::pipe_control(b, PipeControl::PIXEL_SCOREBOARD_STALL, None)
    }

    /// Keeps the VS from holding on to a stale 3DSTATE_CONSTANT_VS.
    pub(super) fn wa_vs_const_flush(&mut self, b: &mut Builder) -> Result<(), BuilderError> {
        self.wa_post_sync(b, false)?;
        cmd::pipe_control(
            b,
            PipeControl::DEPTH_STALL
                | PipeControl::INSTRUCTION_CACHE_INVALIDATE
                | PipeControl::STATE_CACHE_INVALIDATE,
            None,
        )
    }
}
