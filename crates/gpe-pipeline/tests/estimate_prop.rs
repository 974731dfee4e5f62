mod common;

use proptest::prelude::*;

use gpe_pipeline::pipeline::{Gen6Pipeline, MAX_SURFACES};
use gpe_pipeline::state::{
    ConstantBuffer, Framebuffer, KernelParams, SamplerDesc, SurfaceDesc, Viewport,
};
use gpe_pipeline::{
    BufferId, Builder, BuilderConfig, DeviceInfo, DrawInfo, GenPipeline, KernelCache, MemoryBackend,
    PipelineAction, PipelineState, PrimitiveMode, ShaderStage, WriterKind,
};

use common::kernel;

/// One draw's worth of bindings.
#[derive(Debug, Clone)]
struct Bindings {
    targets: usize,
    fs_views: Vec<bool>,
    fs_samplers: usize,
    vs_views: Vec<bool>,
    vs_samplers: usize,
    viewports: usize,
    cbuf0_bytes: u32,
    ucp_bytes: u32,
    fs_resource_cbufs: usize,
    mode: PrimitiveMode,
}

fn bindings() -> impl Strategy<Value = Bindings> {
    let mode = prop::sample::select(vec![
        PrimitiveMode::Points,
        PrimitiveMode::Lines,
        PrimitiveMode::LineStrip,
        PrimitiveMode::Triangles,
        PrimitiveMode::TriangleStrip,
        PrimitiveMode::Quads,
    ]);
    (
        0usize..=8,
        prop::collection::vec(any::<bool>(), 0..=16),
        0usize..=16,
        prop::collection::vec(any::<bool>(), 0..=16),
        0usize..=16,
        1usize..=16,
        0u32..=16,
        0u32..=8,
        0usize..=4,
        mode,
    )
        .prop_map(
            |(targets, fs_views, fs_samplers, vs_views, vs_samplers, viewports, cbuf0, ucp, fs_cbufs, mode)| {
                Bindings {
                    targets,
                    fs_views,
                    fs_samplers,
                    vs_views,
                    vs_samplers,
                    viewports,
                    cbuf0_bytes: cbuf0 * 16,
                    ucp_bytes: ucp * 16,
                    fs_resource_cbufs: fs_cbufs,
                    mode,
                }
            },
        )
}

fn views(mask: &[bool], first: u32) -> Vec<Option<SurfaceDesc>> {
    mask.iter()
        .enumerate()
        .map(|(i, &bound)| bound.then(|| SurfaceDesc::render_target(BufferId(first + i as u32), 16, 16)))
        .collect()
}

fn apply(state: &mut PipelineState, b: &Bindings) {
    let vs_params = KernelParams {
        pcb_cbuf0_size: b.cbuf0_bytes,
        pcb_ucp_size: b.ucp_bytes,
        ..KernelParams::default()
    };
    let fs_params = KernelParams {
        pcb_cbuf0_size: b.cbuf0_bytes,
        ..KernelParams::default()
    };
    state.bind_shader(ShaderStage::Vertex, Some(kernel(1, vs_params)));
    state.bind_shader(ShaderStage::Fragment, Some(kernel(2, fs_params)));

    let mut fb = Framebuffer::new(64, 64);
    for i in 0..b.targets {
        fb = fb.with_color(SurfaceDesc::render_target(BufferId(10 + i as u32), 64, 64));
    }
    state.set_framebuffer(fb);

    let vp = Viewport::from_rect(0.0, 0.0, 64.0, 64.0);
    state.set_viewports(&vec![vp; b.viewports]);

    state.set_sampler_views(ShaderStage::Fragment, &views(&b.fs_views, 100));
    state.set_sampler_views(ShaderStage::Vertex, &views(&b.vs_views, 200));
    state.set_samplers(ShaderStage::Fragment, &vec![Some(SamplerDesc::default()); b.fs_samplers]);
    state.set_samplers(ShaderStage::Vertex, &vec![Some(SamplerDesc::default()); b.vs_samplers]);

    let user: Vec<u32> = (0..b.cbuf0_bytes / 4).collect();
    state.set_constant_buffer(ShaderStage::Vertex, 0, Some(ConstantBuffer::user(user.clone())));
    state.set_constant_buffer(ShaderStage::Fragment, 0, Some(ConstantBuffer::user(user)));
    for slot in 1..=4 {
        let cbuf = (slot <= b.fs_resource_cbufs).then(|| ConstantBuffer::Resource {
            buffer: BufferId(300 + slot as u32),
            offset: 0,
            size: 256,
        });
        state.set_constant_buffer(ShaderStage::Fragment, slot, cbuf);
    }
}

struct Rig {
    b: Builder,
    pipeline: Gen6Pipeline,
    kernels: KernelCache,
    state: PipelineState,
}

impl Rig {
    fn new() -> Self {
        let backend = MemoryBackend::new();
        let workaround = backend.create_buffer("workaround", 4096);
        let config = BuilderConfig {
            batch_size: 1 << 20,
            ..BuilderConfig::default()
        };
        let mut b = Builder::new(DeviceInfo::default(), Box::new(backend), &config);
        b.begin().unwrap();
        Self {
            b,
            pipeline: Gen6Pipeline::new(DeviceInfo::default(), workaround),
            kernels: KernelCache::new(),
            state: PipelineState::new(),
        }
    }

    fn consumed(&self) -> usize {
        self.b.used(WriterKind::Batch) + self.b.stolen(WriterKind::Batch)
    }

    /// Draws and returns (bytes written, estimate).
    fn draw(&mut self, mode: PrimitiveMode) -> (usize, usize) {
        if self.kernels.upload(&mut self.b, &self.state).unwrap() {
            self.pipeline.invalidate(gpe_pipeline::InvalidateFlags::KERNEL_BO);
        }
        let estimate = self.pipeline.estimate_size(PipelineAction::Draw(&self.state));
        let before = self.consumed();
        self.pipeline
            .emit_draw(&mut self.b, &self.state, &DrawInfo::arrays(mode, 0, 4), &self.kernels)
            .unwrap();
        let written = self.consumed() - before;
        self.pipeline.clear_invalidate();
        self.state.clear_dirty();
        (written, estimate)
    }
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        .. ProptestConfig::default()
    })]

    #[test]
    fn draws_never_exceed_their_estimate(sequence in prop::collection::vec(bindings(), 1..5)) {
        let mut rig = Rig::new();
        for b in &sequence {
            apply(&mut rig.state, b);
            let (written, estimate) = rig.draw(b.mode);
            prop_assert!(written <= estimate, "wrote {} bytes, estimated {}", written, estimate);
        }
    }

    #[test]
    fn binding_tables_cover_every_live_surface(sequence in prop::collection::vec(bindings(), 1..6)) {
        let mut rig = Rig::new();
        for b in &sequence {
            apply(&mut rig.state, b);
            rig.draw(b.mode);

            for stage in ShaderStage::ALL {
                let handles = &rig.pipeline.cache().stages[stage.index()];
                let size = handles.binding_table_size;
                prop_assert!(size <= MAX_SURFACES);
                for (slot, &surface) in handles.surfaces.iter().enumerate().skip(size) {
                    prop_assert_eq!(surface, 0, "{:?} slot {} lies past the table", stage, slot);
                }
                for (i, &surface) in handles.surfaces[..size].iter().enumerate() {
                    let entry = rig.b.read_dw(WriterKind::Batch, handles.binding_table as usize + i * 4);
                    prop_assert_eq!(entry, surface);
                }
            }

            // The render target slot is always live.
            let fs = &rig.pipeline.cache().stages[ShaderStage::Fragment.index()];
            prop_assert!(fs.binding_table_size >= b.targets.max(1));
        }
    }
}
