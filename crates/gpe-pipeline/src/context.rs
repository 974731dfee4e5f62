//! Submission context.
//!
//! A [`RenderContext`] plays the command parser: it owns the builder, the
//! pipeline picked for the device and the logical state, and turns each
//! request into an atomic emission that either lands whole in the current
//! batch or moves to a fresh one.

use tracing::{debug, trace, warn};

use crate::backend::{BufferBackend, BufferId, Submission};
use crate::builder::{Builder, WriterFlags, WriterKind};
use crate::device::{ContextConfig, DeviceInfo};
use crate::error::{BuilderError, ContextError};
use crate::kernel_cache::KernelCache;
use crate::pipeline::{
    self, GenPipeline, InvalidateFlags, PipelineAction, PipelineCache, PipelineCheckpoint, RectlistInfo,
};
use crate::state::{DrawInfo, PipelineState};

/// Room kept free for MI_BATCH_BUFFER_END and its padding.
const BATCH_END_RESERVE: usize = 8;

const WORKAROUND_BO_SIZE: usize = 4096;

#[derive(Debug)]
pub struct RenderContext {
    builder: Builder,
    pipeline: Box<dyn GenPipeline>,
    state: PipelineState,
    kernels: KernelCache,
    workaround_bo: BufferId,
    /// The pipeline as of the last batch the backend accepted.
    submitted: PipelineCheckpoint,
}

impl RenderContext {
    pub fn new(
        device: DeviceInfo,
        mut backend: Box<dyn BufferBackend>,
        config: &ContextConfig,
    ) -> Result<Self, ContextError> {
        let workaround_bo = backend.allocate("workaround", WORKAROUND_BO_SIZE)?;
        let pipeline = match pipeline::for_device(&device, workaround_bo) {
            Ok(pipeline) => pipeline,
            Err(err) => {
                backend.free(workaround_bo);
                return Err(err);
            }
        };

        let mut builder = Builder::new(device, backend, &config.builder);
        if let Err(err) = builder.begin() {
            builder.backend_mut().free(workaround_bo);
            return Err(err.into());
        }

        let submitted = pipeline.checkpoint();
        Ok(Self {
            builder,
            pipeline,
            state: PipelineState::new(),
            kernels: KernelCache::new(),
            workaround_bo,
            submitted,
        })
    }

    pub fn device(&self) -> &DeviceInfo {
        self.builder.device()
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    /// Mutating the state through here marks what changed for the next draw.
    pub fn state_mut(&mut self) -> &mut PipelineState {
        &mut self.state
    }

    pub fn builder(&self) -> &Builder {
        &self.builder
    }

    pub fn pipeline_cache(&self) -> &PipelineCache {
        self.pipeline.cache()
    }

    pub fn invalidate_flags(&self) -> InvalidateFlags {
        self.pipeline.invalidate_flags()
    }

    pub fn workaround_bo(&self) -> BufferId {
        self.workaround_bo
    }

    /// Draws with the current state. Only what changed since the last
    /// successful draw is re-sent.
    pub fn draw(&mut self, draw: &DrawInfo) -> Result<(), ContextError> {
        let needed = self.pipeline.estimate_size(PipelineAction::Draw(&self.state));

        self.emit_validated("draw", needed, |ctx| {
            if ctx.kernels.upload(&mut ctx.builder, &ctx.state)? {
                ctx.pipeline.invalidate(InvalidateFlags::KERNEL_BO);
            }
            ctx.pipeline.emit_draw(&mut ctx.builder, &ctx.state, draw, &ctx.kernels)
        })?;

        self.pipeline.clear_invalidate();
        self.state.clear_dirty();
        Ok(())
    }

    /// Ends the current batch and hands it to the backend. Returns `None`
    /// when there was nothing to submit.
    ///
    /// When the batch was submitted but the next one cannot begin, the error
    /// is returned and the next emission tries to begin again.
    pub fn flush(&mut self, reason: &'static str) -> Result<Option<Submission>, ContextError> {
        if self.builder.is_batch_empty() {
            return Ok(None);
        }

        let submission = match self.finish_batch() {
            Ok(submission) => submission,
            Err(err) => {
                warn!(reason, %err, "dropping batch");
                self.builder.reset();
                // The hardware never saw this batch.
                self.pipeline.rewind(self.submitted.clone());
                self.pipeline.invalidate(InvalidateFlags::HW);
                self.restart()?;
                return Err(err);
            }
        };

        debug!(
            reason,
            batch = %submission.batch,
            used = submission.used,
            buffers = submission.buffers.len(),
            "flushed batch"
        );
        self.submitted = self.pipeline.checkpoint();
        self.restart()?;
        Ok(Some(submission))
    }

    /// Flushes the render and depth caches and invalidates the read caches.
    pub fn emit_flush(&mut self) -> Result<(), ContextError> {
        let needed = self.pipeline.estimate_size(PipelineAction::Flush);
        self.emit_validated("flush", needed, |ctx| ctx.pipeline.emit_flush(&mut ctx.builder))
    }

    pub fn write_timestamp(&mut self, buffer: BufferId, index: u32) -> Result<(), ContextError> {
        let needed = self.pipeline.estimate_size(PipelineAction::WriteTimestamp);
        self.emit_validated("timestamp", needed, |ctx| {
            ctx.pipeline.emit_write_timestamp(&mut ctx.builder, buffer, index)
        })
    }

    pub fn write_depth_count(&mut self, buffer: BufferId, index: u32) -> Result<(), ContextError> {
        let needed = self.pipeline.estimate_size(PipelineAction::WriteDepthCount);
        self.emit_validated("depth count", needed, |ctx| {
            ctx.pipeline.emit_write_depth_count(&mut ctx.builder, buffer, index)
        })
    }

    pub fn write_statistics(&mut self, buffer: BufferId, index: u32) -> Result<(), ContextError> {
        let needed = self.pipeline.estimate_size(PipelineAction::WriteStatistics);
        self.emit_validated("statistics", needed, |ctx| {
            ctx.pipeline.emit_write_statistics(&mut ctx.builder, buffer, index)
        })
    }

    /// Runs a depth clear or resolve. The rectangle reprograms most of the
    /// pipeline behind the cache's back, so the next draw re-sends
    /// everything.
    pub fn rectlist(&mut self, info: &RectlistInfo) -> Result<(), ContextError> {
        let needed = self.pipeline.estimate_size(PipelineAction::Rectlist(info));
        self.emit_validated("rectlist", needed, |ctx| ctx.pipeline.emit_rectlist(&mut ctx.builder, info))?;
        self.pipeline.invalidate(InvalidateFlags::HW);
        Ok(())
    }

    fn finish_batch(&mut self) -> Result<Submission, ContextError> {
        self.builder.batch_buffer_end()?;
        let submission = self.builder.end()?;
        self.builder.backend_mut().submit(&submission)?;
        Ok(submission)
    }

    /// Begins the next batch. Everything the pipeline wrote into the old
    /// one is gone.
    fn restart(&mut self) -> Result<(), ContextError> {
        self.builder.begin()?;

        let mut flags = InvalidateFlags::BATCH_BO | InvalidateFlags::STATE_BO;
        if !self.device().has_hw_context {
            flags |= InvalidateFlags::HW;
        }
        self.pipeline.invalidate(flags);
        Ok(())
    }

    /// Makes sure `needed` bytes, plus the batch end, fit in the batch.
    fn ensure_space(&mut self, needed: usize, what: &'static str) -> Result<(), ContextError> {
        // A failed restart left the builder reset.
        if !self.builder.is_begun() {
            self.restart()?;
        }

        let needed = needed + BATCH_END_RESERVE;
        if self.builder.space() >= needed {
            return Ok(());
        }

        if !self.builder.is_batch_empty() {
            self.flush(what)?;
            if self.builder.space() >= needed {
                return Ok(());
            }
        }

        if self.builder.flags(WriterKind::Batch).contains(WriterFlags::GROW) {
            let capacity = self.builder.capacity(WriterKind::Batch);
            self.builder
                .grow(WriterKind::Batch, capacity + needed - self.builder.space(), true)?;
            return Ok(());
        }

        Err(ContextError::DoesNotFit {
            needed,
            available: self.builder.space(),
        })
    }

    /// Emits with `emit` as one unit. When the batch would then reference
    /// more than the backend can map at once, the emission is rewound, the
    /// batch flushed, and `emit` runs once more on the empty batch.
    fn emit_validated<F>(&mut self, what: &'static str, needed: usize, mut emit: F) -> Result<(), ContextError>
    where
        F: FnMut(&mut Self) -> Result<(), BuilderError>,
    {
        self.ensure_space(needed, what)?;

        let mut retried = false;
        loop {
            let snapshot = self.builder.snapshot();
            let checkpoint = self.pipeline.checkpoint();
            emit(self)?;

            if self.builder.validate(&[]) {
                let after = self.builder.snapshot();
                trace!(
                    what,
                    needed,
                    written = (after.used + after.stolen) - (snapshot.used + snapshot.stolen),
                    "emitted"
                );
                return Ok(());
            }

            self.builder.restore(&snapshot);
            self.pipeline.rewind(checkpoint);
            // Kernels the emission uploaded stay, wherever they landed.
            self.pipeline.invalidate(InvalidateFlags::HW);
            if retried || self.builder.is_batch_empty() {
                return Err(ContextError::TooManyBuffers);
            }

            warn!(what, "out of aperture, flushing and retrying");
            self.flush("out of aperture")?;
            retried = true;
        }
    }
}

impl Drop for RenderContext {
    fn drop(&mut self) {
        self.builder.reset();
        let workaround_bo = self.workaround_bo;
        self.builder.backend_mut().free(workaround_bo);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use gpe_protocol::decode_batch;
    use gpe_protocol::gen6::{Command, DepthFormat, PipeControl, PIPE_CONTROL_DW2_GLOBAL_GTT};

    use super::*;
    use crate::backend::MemoryBackend;
    use crate::device::{BuilderConfig, GpuGen};
    use crate::error::BackendError;
    use crate::pipeline::RectlistOp;
    use crate::state::{
        DepthStencilSurface, Framebuffer, KernelId, KernelParams, PrimitiveMode, ShaderKernel, ShaderStage,
        StreamOutputDecl, StreamOutputInfo, StreamOutputTarget, SurfaceDesc, Viewport,
    };

    fn context(device: DeviceInfo, config: ContextConfig) -> (MemoryBackend, RenderContext) {
        let backend = MemoryBackend::new();
        let ctx = RenderContext::new(device, Box::new(backend.clone()), &config).unwrap();
        (backend, ctx)
    }

    fn setup_scene(backend: &MemoryBackend, ctx: &mut RenderContext) {
        let rt = backend.create_buffer("rt", 64 * 64 * 4);
        let state = ctx.state_mut();
        let vs = ShaderKernel::new(KernelId(1), vec![0u8; 64]).with_params(KernelParams::default());
        let fs = ShaderKernel::new(KernelId(2), vec![0u8; 64]).with_params(KernelParams::default());
        state.bind_shader(ShaderStage::Vertex, Some(Arc::new(vs)));
        state.bind_shader(ShaderStage::Fragment, Some(Arc::new(fs)));
        state.set_framebuffer(Framebuffer::new(64, 64).with_color(SurfaceDesc::render_target(rt, 64, 64)));
        state.set_viewports(&[Viewport::from_rect(0.0, 0.0, 64.0, 64.0)]);
    }

    fn tris() -> DrawInfo {
        DrawInfo::arrays(PrimitiveMode::Triangles, 0, 3)
    }

    fn count(commands: &[u8], command: Command) -> usize {
        decode_batch(commands)
            .unwrap()
            .iter()
            .filter(|p| p.command == command)
            .count()
    }

    #[test]
    fn unsupported_generation_releases_the_workaround_buffer() {
        let backend = MemoryBackend::new();
        let gen7 = DeviceInfo {
            gen: GpuGen::Gen7,
            ..DeviceInfo::default()
        };
        let err = RenderContext::new(gen7, Box::new(backend.clone()), &ContextConfig::default()).unwrap_err();
        assert_eq!(err, ContextError::UnsupportedGen(GpuGen::Gen7));
        assert_eq!(backend.live_buffers(), 0);
    }

    #[test]
    fn empty_flush_submits_nothing() {
        let (backend, mut ctx) = context(DeviceInfo::default(), ContextConfig::default());
        assert_eq!(ctx.flush("idle").unwrap(), None);
        assert_eq!(backend.submission_count(), 0);
    }

    #[test]
    fn draw_then_flush_submits_one_batch() {
        let (backend, mut ctx) = context(DeviceInfo::default(), ContextConfig::default());
        setup_scene(&backend, &mut ctx);
        ctx.draw(&tris()).unwrap();
        assert!(ctx.state().dirty().is_empty());
        assert!(ctx.invalidate_flags().is_empty());

        let submission = ctx.flush("test").unwrap().unwrap();
        assert_eq!(backend.submission_count(), 1);
        assert!(submission.buffers.contains(&ctx.workaround_bo()));

        let batch = backend.last_submission().unwrap();
        let packets = decode_batch(batch.commands()).unwrap();
        assert_eq!(count(batch.commands(), Command::PipelineSelect), 1);
        assert_eq!(packets.last().map(|p| p.command), Some(Command::MiBatchBufferEnd));
        assert_eq!(batch.submission.used % 8, 0);
    }

    #[test]
    fn flush_starts_a_new_batch_and_invalidates_buffers() {
        let (backend, mut ctx) = context(DeviceInfo::default(), ContextConfig::default());
        setup_scene(&backend, &mut ctx);
        ctx.draw(&tris()).unwrap();
        ctx.flush("test").unwrap();

        assert!(ctx.builder().is_begun());
        assert!(ctx.builder().is_batch_empty());
        assert_eq!(
            ctx.invalidate_flags(),
            InvalidateFlags::BATCH_BO | InvalidateFlags::STATE_BO
        );

        // Dirty bits are clear, yet every pointer is re-sent into the new
        // batch since the old state blocks are gone.
        ctx.draw(&tris()).unwrap();
        let commands = ctx.builder().batch_commands();
        assert_eq!(count(commands, Command::StateBaseAddress), 1);
        assert_eq!(count(commands, Command::BindingTablePointers), 1);
        assert_eq!(count(commands, Command::ViewportStatePointers), 1);
        // The hardware context survives, so no PIPELINE_SELECT.
        assert_eq!(count(commands, Command::PipelineSelect), 0);
    }

    #[test]
    fn no_hardware_context_resends_everything_after_flush() {
        let device = DeviceInfo {
            has_hw_context: false,
            ..DeviceInfo::default()
        };
        let (backend, mut ctx) = context(device, ContextConfig::default());
        setup_scene(&backend, &mut ctx);
        ctx.draw(&tris()).unwrap();
        ctx.flush("test").unwrap();
        assert!(ctx.invalidate_flags().contains(InvalidateFlags::HW));

        ctx.draw(&tris()).unwrap();
        assert_eq!(count(ctx.builder().batch_commands(), Command::PipelineSelect), 1);
    }

    #[test]
    fn full_batch_is_flushed_before_the_draw() {
        let config = ContextConfig {
            builder: BuilderConfig {
                batch_size: 4096,
                ..BuilderConfig::default()
            },
        };
        let (backend, mut ctx) = context(DeviceInfo::default(), config);
        setup_scene(&backend, &mut ctx);

        let estimate = ctx.pipeline.estimate_size(PipelineAction::Draw(ctx.state()));
        assert!(estimate < 4096);

        let mut draws = 0;
        while backend.submission_count() == 0 {
            ctx.draw(&tris()).unwrap();
            draws += 1;
            assert!(draws < 1000);
        }
        // The draw that did not fit went into the new batch.
        assert!(!ctx.builder().is_batch_empty());
        assert_eq!(count(ctx.builder().batch_commands(), Command::Primitive), 1);
    }

    #[test]
    fn oversized_draw_does_not_fit_a_fixed_batch() {
        let config = ContextConfig {
            builder: BuilderConfig {
                batch_size: 256,
                ..BuilderConfig::default()
            },
        };
        let (backend, mut ctx) = context(DeviceInfo::default(), config);
        setup_scene(&backend, &mut ctx);

        let err = ctx.draw(&tris()).unwrap_err();
        assert!(matches!(err, ContextError::DoesNotFit { .. }));
        assert_eq!(backend.submission_count(), 0);
    }

    #[test]
    fn growable_batch_grows_instead() {
        let config = ContextConfig {
            builder: BuilderConfig {
                batch_size: 256,
                grow_batch: true,
                ..BuilderConfig::default()
            },
        };
        let (backend, mut ctx) = context(DeviceInfo::default(), config);
        setup_scene(&backend, &mut ctx);

        ctx.draw(&tris()).unwrap();
        assert!(ctx.builder().capacity(WriterKind::Batch) > 256);
        assert_eq!(count(ctx.builder().batch_commands(), Command::Primitive), 1);
    }

    #[test]
    fn out_of_aperture_flushes_and_retries_once() {
        let (backend, mut ctx) = context(DeviceInfo::default(), ContextConfig::default());
        setup_scene(&backend, &mut ctx);
        ctx.draw(&tris()).unwrap();

        // A texture big enough that it only fits next to an empty batch.
        let texture = backend.create_buffer("texture", 1 << 20);
        let limit = ctx.builder().capacity(WriterKind::Batch)
            + ctx.builder().capacity(WriterKind::Instruction)
            + 4096
            + 64 * 64 * 4
            + (1 << 20);
        backend.set_aperture_limit(Some(limit));
        let extra = backend.create_buffer("extra", 4096);
        ctx.write_timestamp(extra, 0).unwrap();

        ctx.state_mut()
            .set_sampler_views(ShaderStage::Fragment, &[Some(SurfaceDesc::render_target(texture, 16, 16))]);
        ctx.draw(&tris()).unwrap();

        assert_eq!(backend.submission_count(), 1);
        // The retried draw re-sent the whole pipeline.
        assert_eq!(count(ctx.builder().batch_commands(), Command::PipelineSelect), 1);
        assert!(ctx.state().dirty().is_empty());
    }

    #[test]
    fn retried_draw_programs_the_new_stream_output_bound() {
        let (backend, mut ctx) = context(DeviceInfo::default(), ContextConfig::default());
        setup_scene(&backend, &mut ctx);
        ctx.draw(&tris()).unwrap();

        let target = backend.create_buffer("so", 1 << 20);
        let limit = ctx.builder().capacity(WriterKind::Batch)
            + ctx.builder().capacity(WriterKind::Instruction)
            + 4096
            + 64 * 64 * 4
            + (1 << 20);
        backend.set_aperture_limit(Some(limit));
        let extra = backend.create_buffer("extra", 4096);
        ctx.write_timestamp(extra, 0).unwrap();

        let so = StreamOutputInfo {
            outputs: vec![StreamOutputDecl {
                register: 0,
                start_component: 0,
                num_components: 4,
                buffer: 0,
                dst_offset: 0,
            }],
            strides: [4, 0, 0, 0],
        };
        let vs = ShaderKernel::new(KernelId(7), vec![0u8; 64])
            .with_params(KernelParams::default())
            .with_stream_output(so);
        let state = ctx.state_mut();
        state.bind_shader(ShaderStage::Vertex, Some(Arc::new(vs)));
        state.set_stream_output_targets(&[Some(StreamOutputTarget {
            buffer: target,
            offset: 0,
            size: 1024,
        })]);
        ctx.draw(&tris()).unwrap();

        assert_eq!(backend.submission_count(), 1);
        assert_eq!(ctx.pipeline_cache().so_max_vertices, 64);
        let packets = decode_batch(ctx.builder().batch_commands()).unwrap();
        let svbi = packets
            .iter()
            .find(|p| p.command == Command::GsSvbIndex)
            .expect("retried draw sends 3DSTATE_GS_SVB_INDEX");
        assert_eq!(svbi.dw(3), 64);
    }

    #[test]
    fn dropped_batch_restores_the_submitted_urb_split() {
        let (backend, mut ctx) = context(DeviceInfo::default(), ContextConfig::default());
        setup_scene(&backend, &mut ctx);
        let gs = ShaderKernel::new(KernelId(5), vec![0u8; 64]).with_params(KernelParams::default());
        ctx.state_mut().bind_shader(ShaderStage::Geometry, Some(Arc::new(gs)));
        ctx.draw(&tris()).unwrap();
        ctx.flush("test").unwrap();
        assert!(ctx.pipeline_cache().gs_active);

        // The batch giving the URB back to the VS never reaches the backend.
        let doomed = backend.create_buffer("doomed", 4096);
        let state = ctx.state_mut();
        state.bind_shader(ShaderStage::Geometry, None);
        state.set_sampler_views(ShaderStage::Fragment, &[Some(SurfaceDesc::render_target(doomed, 16, 16))]);
        ctx.draw(&tris()).unwrap();
        assert!(!ctx.pipeline_cache().gs_active);
        backend.clone().free(doomed);
        assert!(ctx.flush("test").is_err());
        assert_eq!(backend.submission_count(), 1);
        assert!(ctx.pipeline_cache().gs_active);

        ctx.state_mut().set_sampler_views(ShaderStage::Fragment, &[]);
        ctx.draw(&tris()).unwrap();
        assert!(!ctx.pipeline_cache().gs_active);

        let packets = decode_batch(ctx.builder().batch_commands()).unwrap();
        let urb = packets.iter().position(|p| p.command == Command::Urb).unwrap();
        let flushed = packets[urb + 1..]
            .iter()
            .take_while(|p| p.command == Command::PipeControl)
            .any(|p| {
                PipeControl::from_bits_truncate(p.dw(1)).contains(PipeControl::RENDER_CACHE_FLUSH | PipeControl::CS_STALL)
            });
        assert!(flushed, "no URB flush in {packets:?}");
    }

    #[test]
    fn working_set_too_large_for_an_empty_batch() {
        let (backend, mut ctx) = context(DeviceInfo::default(), ContextConfig::default());
        setup_scene(&backend, &mut ctx);
        backend.set_aperture_limit(Some(1024));

        let err = ctx.draw(&tris()).unwrap_err();
        assert_eq!(err, ContextError::TooManyBuffers);
        assert!(ctx.builder().is_batch_empty());
        assert!(!ctx.state().dirty().is_empty());
    }

    #[test]
    fn failed_restart_is_retried_by_the_next_emission() {
        let (backend, mut ctx) = context(DeviceInfo::default(), ContextConfig::default());
        setup_scene(&backend, &mut ctx);
        ctx.draw(&tris()).unwrap();

        backend.set_fail_maps(true);
        let err = ctx.flush("test").unwrap_err();
        assert!(matches!(
            err,
            ContextError::Builder(BuilderError::Backend(BackendError::MapFailed(_)))
        ));
        assert_eq!(backend.submission_count(), 1);
        assert!(!ctx.builder().is_begun());

        backend.set_fail_maps(false);
        ctx.draw(&tris()).unwrap();
        assert!(ctx.flush("test").unwrap().is_some());
        assert_eq!(backend.submission_count(), 2);
    }

    #[test]
    fn rectlist_invalidates_the_hardware_context() {
        let (backend, mut ctx) = context(DeviceInfo::default(), ContextConfig::default());
        setup_scene(&backend, &mut ctx);
        ctx.draw(&tris()).unwrap();

        let depth = backend.create_buffer("depth", 64 * 64 * 4);
        let zs = DepthStencilSurface::new(depth, DepthFormat::D24UnormX8Uint, 64, 64, 256);
        ctx.rectlist(&RectlistInfo::new(RectlistOp::ClearZs, zs)).unwrap();
        assert!(ctx.invalidate_flags().contains(InvalidateFlags::HW));

        let before = ctx.builder().used(WriterKind::Batch);
        ctx.draw(&tris()).unwrap();
        let commands = &ctx.builder().batch_commands()[before..];
        assert_eq!(count(commands, Command::PipelineSelect), 1);
        assert_eq!(count(commands, Command::Vs), 1);
    }

    #[test]
    fn queries_write_into_the_target_buffer() {
        let (backend, mut ctx) = context(DeviceInfo::default(), ContextConfig::default());
        let results = backend.create_buffer("query", 4096);
        ctx.write_timestamp(results, 1).unwrap();
        ctx.write_depth_count(results, 2).unwrap();
        ctx.write_statistics(results, 4).unwrap();
        ctx.emit_flush().unwrap();

        let submission = ctx.flush("queries").unwrap().unwrap();
        let writes: Vec<_> = submission.relocs.iter().filter(|r| r.target == results).collect();
        assert!(writes.iter().all(|r| r.write));
        let offsets: Vec<u32> = writes.iter().map(|r| r.delta & !PIPE_CONTROL_DW2_GLOBAL_GTT).collect();
        assert!(offsets.contains(&8));
        assert!(offsets.contains(&16));
        assert!(offsets.contains(&32));
    }

    #[test]
    fn dropping_the_context_frees_its_buffers() {
        let (backend, ctx) = context(DeviceInfo::default(), ContextConfig::default());
        // Batch, instructions and the workaround buffer.
        assert_eq!(backend.live_buffers(), 3);
        drop(ctx);
        assert_eq!(backend.live_buffers(), 0);
    }
}
