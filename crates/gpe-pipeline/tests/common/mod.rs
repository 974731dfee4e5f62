//! Shared helpers for `gpe-pipeline` integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use gpe_pipeline::state::{Framebuffer, KernelId, KernelParams, ShaderKernel, SurfaceDesc, Viewport};
use gpe_pipeline::{
    BufferId, ContextConfig, DeviceInfo, DrawInfo, MemoryBackend, PrimitiveMode, RenderContext, ShaderStage,
};
use gpe_protocol::{decode_batch, Command};

pub const RT_SIZE: u32 = 64;

/// Routes `tracing` output through the test harness. Safe to call from
/// every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

pub fn kernel(id: u64, params: KernelParams) -> Arc<ShaderKernel> {
    Arc::new(ShaderKernel::new(KernelId(id), vec![0u8; 64]).with_params(params))
}

pub fn tris() -> DrawInfo {
    DrawInfo::arrays(PrimitiveMode::Triangles, 0, 3)
}

/// A context with a VS, an FS and one render target bound.
pub struct Scene {
    pub backend: MemoryBackend,
    pub ctx: RenderContext,
    pub rt: BufferId,
}

impl Scene {
    pub fn new() -> Self {
        Self::with(DeviceInfo::default(), ContextConfig::default())
    }

    pub fn with(device: DeviceInfo, config: ContextConfig) -> Self {
        init_tracing();

        let backend = MemoryBackend::new();
        let mut ctx = RenderContext::new(device, Box::new(backend.clone()), &config).unwrap();
        let rt = backend.create_buffer("rt", (RT_SIZE * RT_SIZE * 4) as usize);

        let state = ctx.state_mut();
        state.bind_shader(ShaderStage::Vertex, Some(kernel(1, KernelParams::default())));
        state.bind_shader(ShaderStage::Fragment, Some(kernel(2, KernelParams::default())));
        state.set_framebuffer(
            Framebuffer::new(RT_SIZE, RT_SIZE).with_color(SurfaceDesc::render_target(rt, RT_SIZE, RT_SIZE)),
        );
        state.set_viewports(&[Viewport::from_rect(0.0, 0.0, RT_SIZE as f32, RT_SIZE as f32)]);

        Self { backend, ctx, rt }
    }

    pub fn texture(&self, size: u32) -> SurfaceDesc {
        let buffer = self.backend.create_buffer("texture", (size * size * 4) as usize);
        SurfaceDesc::render_target(buffer, size, size)
    }

    /// Draws and returns the commands the draw appended to the batch, or
    /// the whole new batch when the draw had to flush first.
    pub fn draw(&mut self, draw: &DrawInfo) -> Vec<Command> {
        let submitted = self.backend.submission_count();
        let mut start = self.ctx.builder().batch_commands().len();
        self.ctx.draw(draw).unwrap();
        if self.backend.submission_count() != submitted {
            start = 0;
        }
        commands(&self.ctx.builder().batch_commands()[start..])
    }
}

pub fn commands(bytes: &[u8]) -> Vec<Command> {
    decode_batch(bytes).unwrap().iter().map(|p| p.command).collect()
}

pub fn position(commands: &[Command], command: Command) -> usize {
    commands
        .iter()
        .position(|&c| c == command)
        .unwrap_or_else(|| panic!("{} not emitted", command.name()))
}
