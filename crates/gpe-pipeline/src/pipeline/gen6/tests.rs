use std::sync::Arc;

use pretty_assertions::assert_eq;

use gpe_protocol::gen6::{Command, DepthFormat, PipeControl, SVBI_UNBOUNDED};
use gpe_protocol::{decode_batch, DecodedPacket};

use super::*;
use crate::backend::MemoryBackend;
use crate::builder::{RelocTarget, WriterKind};
use crate::device::BuilderConfig;
use crate::pipeline::{RectlistOp, RectlistUses};
use crate::state::{
    ConstantBuffer, DepthStencilSurface, Framebuffer, KernelId, KernelParams, PrimitiveMode, RasterizerState,
    ShaderKernel, ShaderStage, StreamOutputDecl, StreamOutputInfo, StreamOutputTarget, SurfaceDesc, Viewport,
};

struct Harness {
    b: Builder,
    pipeline: Gen6Pipeline,
    kernels: KernelCache,
    workaround_bo: BufferId,
}

fn harness() -> Harness {
    let backend = MemoryBackend::new();
    let workaround_bo = backend.create_buffer("workaround", 4096);
    let mut b = Builder::new(DeviceInfo::default(), Box::new(backend), &BuilderConfig::default());
    b.begin().unwrap();
    Harness {
        b,
        pipeline: Gen6Pipeline::new(DeviceInfo::default(), workaround_bo),
        kernels: KernelCache::new(),
        workaround_bo,
    }
}

fn kernel(id: u64, params: KernelParams) -> Arc<ShaderKernel> {
    Arc::new(ShaderKernel::new(KernelId(id), vec![0u8; 32]).with_params(params))
}

fn scene() -> PipelineState {
    let mut state = PipelineState::new();
    state.bind_shader(ShaderStage::Vertex, Some(kernel(1, KernelParams::default())));
    state.bind_shader(ShaderStage::Fragment, Some(kernel(2, KernelParams::default())));
    state.set_framebuffer(Framebuffer::new(64, 64).with_color(SurfaceDesc::render_target(BufferId(40), 64, 64)));
    state.set_viewports(&[Viewport::from_rect(0.0, 0.0, 64.0, 64.0)]);
    state
}

fn tris() -> DrawInfo {
    DrawInfo::arrays(PrimitiveMode::Triangles, 0, 3)
}

impl Harness {
    fn batch_since(&self, start: usize) -> Vec<DecodedPacket> {
        decode_batch(&self.b.batch_commands()[start..]).unwrap()
    }

    /// Draws like the context does: uploads kernels, then forgets the
    /// dirty bits and invalidations the draw consumed.
    fn draw(&mut self, state: &mut PipelineState, draw: &DrawInfo) -> Vec<DecodedPacket> {
        if self.kernels.upload(&mut self.b, state).unwrap() {
            self.pipeline.invalidate(InvalidateFlags::KERNEL_BO);
        }
        let start = self.b.used(WriterKind::Batch);
        let before = consumed(&self.b);

        self.pipeline.emit_draw(&mut self.b, state, draw, &self.kernels).unwrap();
        assert!(consumed(&self.b) - before <= self.pipeline.estimate_size(PipelineAction::Draw(state)));

        self.pipeline.clear_invalidate();
        state.clear_dirty();
        self.batch_since(start)
    }
}

fn commands(packets: &[DecodedPacket]) -> Vec<Command> {
    packets.iter().map(|p| p.command).collect()
}

fn pipe_controls(packets: &[DecodedPacket]) -> Vec<PipeControl> {
    packets
        .iter()
        .filter(|p| p.command == Command::PipeControl)
        .map(|p| PipeControl::from_bits_truncate(p.dw(1)))
        .collect()
}

#[test]
fn first_draw_sends_everything_in_hardware_order() {
    use Command::*;

    let mut h = harness();
    let mut state = scene();
    let packets = h.draw(&mut state, &tris());

    assert_eq!(
        commands(&packets),
        [
            PipeControl,
            PipeControl,
            PipelineSelect,
            GsSvbIndex,
            GsSvbIndex,
            GsSvbIndex,
            GsSvbIndex,
            StateSip,
            VfStatistics,
            StateBaseAddress,
            ViewportStatePointers,
            Urb,
            CcStatePointers,
            SamplerStatePointers,
            PipeControl,
            Multisample,
            SampleMask,
            ConstantVs,
            Vs,
            PipeControl,
            ConstantGs,
            Gs,
            Clip,
            Sf,
            ConstantPs,
            Wm,
            ScissorStatePointers,
            BindingTablePointers,
            PipeControl,
            PipeControl,
            PipeControl,
            DepthBuffer,
            HierDepthBuffer,
            StencilBuffer,
            ClearParams,
            DrawingRectangle,
            VertexElements,
            Primitive,
        ]
    );
}

#[test]
fn post_sync_workaround_writes_to_the_workaround_buffer() {
    let mut h = harness();
    let mut state = scene();
    h.draw(&mut state, &tris());

    let pcs = pipe_controls(&h.batch_since(0));
    assert_eq!(pcs[0], PipeControl::CS_STALL | PipeControl::PIXEL_SCOREBOARD_STALL);
    assert_eq!(pcs[1], PipeControl::WRITE_IMM);
    assert!(h
        .b
        .relocs(WriterKind::Batch)
        .iter()
        .any(|r| r.target == RelocTarget::Buffer(h.workaround_bo) && r.write));
}

#[test]
fn unchanged_state_only_draws() {
    let mut h = harness();
    let mut state = scene();
    h.draw(&mut state, &tris());

    let packets = h.draw(&mut state, &tris());
    assert_eq!(commands(&packets), [Command::Primitive]);
}

#[test]
fn new_primitive_class_resends_gs() {
    let mut h = harness();
    let mut state = scene();
    h.draw(&mut state, &tris());

    let packets = h.draw(&mut state, &DrawInfo::arrays(PrimitiveMode::LineStrip, 0, 4));
    assert_eq!(commands(&packets), [Command::Gs, Command::Primitive]);
}

#[test]
fn new_state_buffer_cascades_to_every_pointer() {
    let mut h = harness();
    let mut state = scene();
    h.draw(&mut state, &tris());

    h.pipeline.invalidate(InvalidateFlags::STATE_BO | InvalidateFlags::BATCH_BO);
    let cmds = commands(&h.draw(&mut state, &tris()));

    for expected in [
        Command::StateBaseAddress,
        Command::ViewportStatePointers,
        Command::CcStatePointers,
        Command::SamplerStatePointers,
        Command::ScissorStatePointers,
        Command::BindingTablePointers,
        Command::ConstantVs,
        Command::DepthBuffer,
    ] {
        assert!(cmds.contains(&expected), "{expected:?} missing from {cmds:?}");
    }
    assert!(!cmds.contains(&Command::PipelineSelect));
    assert!(!cmds.contains(&Command::Multisample));
}

#[test]
fn new_base_address_alone_resends_every_pointer() {
    let mut h = harness();
    let mut state = scene();
    h.draw(&mut state, &tris());

    // Kernels moved but the state buffer did not: the base addresses are
    // re-sent and every pointer with them, while no state block is rewritten.
    let stolen = h.b.stolen(WriterKind::Batch);
    h.pipeline.invalidate(InvalidateFlags::KERNEL_BO);
    let cmds = commands(&h.draw(&mut state, &tris()));

    for expected in [
        Command::StateBaseAddress,
        Command::ViewportStatePointers,
        Command::CcStatePointers,
        Command::SamplerStatePointers,
        Command::ScissorStatePointers,
        Command::BindingTablePointers,
    ] {
        assert!(cmds.contains(&expected), "{expected:?} missing from {cmds:?}");
    }
    assert_eq!(h.b.stolen(WriterKind::Batch), stolen);
    assert!(!cmds.contains(&Command::DepthBuffer));
    assert!(!cmds.contains(&Command::PipelineSelect));
}

#[test]
fn binding_table_shrinks_past_trailing_empty_slots() {
    let mut h = harness();
    let mut state = scene();
    let view = SurfaceDesc::render_target(BufferId(50), 16, 16);

    state.set_sampler_views(ShaderStage::Fragment, &[Some(view); 5]);
    h.draw(&mut state, &tris());
    let fs = ShaderStage::Fragment.index();
    assert_eq!(h.pipeline.cache.stages[fs].binding_table_size, 24 + 5);

    state.set_sampler_views(ShaderStage::Fragment, &[Some(view); 3]);
    let packets = h.draw(&mut state, &tris());
    assert!(commands(&packets).contains(&Command::BindingTablePointers));
    assert_eq!(h.pipeline.cache.stages[fs].binding_table_size, 24 + 3);

    state.set_constant_buffer(
        ShaderStage::Fragment,
        0,
        Some(ConstantBuffer::Resource {
            buffer: BufferId(60),
            offset: 0,
            size: 256,
        }),
    );
    h.draw(&mut state, &tris());
    let handles = &h.pipeline.cache.stages[fs];
    assert_eq!(handles.binding_table_size, 24 + 3);
    assert_ne!(handles.surfaces[8], 0);

    let table: Vec<u32> = (0..handles.binding_table_size)
        .map(|i| h.b.read_dw(WriterKind::Batch, handles.binding_table as usize + i * 4))
        .collect();
    assert_eq!(&table[..], &handles.surfaces[..handles.binding_table_size]);
}

#[test]
fn pushed_constant_buffer_gets_no_surface() {
    let mut h = harness();
    let mut state = scene();
    let params = KernelParams {
        pcb_cbuf0_size: 16,
        ..KernelParams::default()
    };
    state.bind_shader(ShaderStage::Vertex, Some(kernel(3, params)));
    state.set_constant_buffer(ShaderStage::Vertex, 0, Some(ConstantBuffer::user(vec![1, 2, 3, 4, 5])));
    let packets = h.draw(&mut state, &tris());

    let vs = &h.pipeline.cache.stages[ShaderStage::Vertex.index()];
    assert_eq!(vs.surfaces[0], 0);
    assert_eq!(vs.push_constants_size, 16);
    let pcb: Vec<u32> = (0..8)
        .map(|i| h.b.read_dw(WriterKind::Batch, vs.push_constants as usize + i * 4))
        .collect();
    assert_eq!(pcb, [1, 2, 3, 4, 0, 0, 0, 0]);

    let constant = packets.iter().find(|p| p.command == Command::ConstantVs).unwrap();
    assert_eq!(constant.dw(1), vs.push_constants);
}

#[test]
fn stream_output_bounds_the_svbi() {
    let mut h = harness();
    let mut state = scene();
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
    let vs = ShaderKernel::new(KernelId(4), vec![0u8; 32]).with_stream_output(so);
    state.bind_shader(ShaderStage::Vertex, Some(Arc::new(vs)));
    state.set_stream_output_targets(&[Some(StreamOutputTarget {
        buffer: BufferId(70),
        offset: 0,
        size: 64,
    })]);

    let packets = h.draw(&mut state, &tris());
    let svbi: Vec<_> = packets.iter().filter(|p| p.command == Command::GsSvbIndex).collect();
    assert_eq!(svbi.len(), 4);
    assert_eq!(svbi[0].dw(3), 4);
    assert!(svbi[1..].iter().all(|p| p.dw(3) == SVBI_UNBOUNDED));
    assert_ne!(h.pipeline.cache.stages[ShaderStage::Geometry.index()].surfaces[0], 0);

    // Same bound, nothing to resend.
    state.set_stream_output_targets(&[Some(StreamOutputTarget {
        buffer: BufferId(71),
        offset: 0,
        size: 64,
    })]);
    let packets = h.draw(&mut state, &tris());
    assert!(!commands(&packets).contains(&Command::GsSvbIndex));
}

#[test]
fn releasing_the_gs_flushes_after_the_urb() {
    let mut h = harness();
    let mut state = scene();
    state.bind_shader(ShaderStage::Geometry, Some(kernel(5, KernelParams::default())));
    h.draw(&mut state, &tris());
    assert!(h.pipeline.cache.gs_active);

    state.bind_shader(ShaderStage::Geometry, None);
    let packets = h.draw(&mut state, &tris());
    let urb = packets.iter().position(|p| p.command == Command::Urb).unwrap();
    // Post-sync workaround, then the flush itself.
    let after_urb = &packets[urb + 1..urb + 4];
    assert_eq!(commands(after_urb), [Command::PipeControl; 3]);
    let flush = PipeControl::from_bits_truncate(after_urb[2].dw(1));
    assert!(flush.contains(PipeControl::RENDER_CACHE_FLUSH | PipeControl::CS_STALL));
    assert!(!h.pipeline.cache.gs_active);
}

#[test]
fn raster_extras_follow_the_rasterizer() {
    let mut h = harness();
    let mut state = scene();
    h.draw(&mut state, &tris());

    state.set_rasterizer(RasterizerState {
        poly_stipple: true,
        line_smooth: true,
        ..RasterizerState::default()
    });
    let cmds = commands(&h.draw(&mut state, &tris()));
    assert!(cmds.contains(&Command::PolyStipplePattern));
    assert!(cmds.contains(&Command::PolyStippleOffset));
    assert!(cmds.contains(&Command::AaLineParameters));
    assert!(!cmds.contains(&Command::LineStipple));
}

#[test]
fn flush_latches_the_post_sync_workaround() {
    let mut h = harness();
    h.pipeline.emit_flush(&mut h.b).unwrap();
    assert_eq!(pipe_controls(&h.batch_since(0)).len(), 3);

    h.pipeline.emit_flush(&mut h.b).unwrap();
    assert_eq!(pipe_controls(&h.batch_since(0)).len(), 4);

    h.pipeline.invalidate(InvalidateFlags::BATCH_BO);
    h.pipeline.emit_flush(&mut h.b).unwrap();
    assert_eq!(pipe_controls(&h.batch_since(0)).len(), 7);
    assert!(!h.pipeline.invalidate_flags().contains(InvalidateFlags::BATCH_BO));
}

#[test]
fn timestamp_lets_its_own_pipe_control_carry_the_post_sync() {
    let mut h = harness();
    h.pipeline.emit_write_timestamp(&mut h.b, BufferId(80), 3).unwrap();

    let pcs = pipe_controls(&h.batch_since(0));
    assert_eq!(pcs, [PipeControl::CS_STALL | PipeControl::PIXEL_SCOREBOARD_STALL, PipeControl::WRITE_TIMESTAMP]);
    let reloc = h.b.relocs(WriterKind::Batch).last().copied().unwrap();
    assert_eq!(reloc.target, RelocTarget::Buffer(BufferId(80)));
    assert_eq!(reloc.delta & !gpe_protocol::gen6::PIPE_CONTROL_DW2_GLOBAL_GTT, 24);
}

#[test]
fn statistics_store_every_counter() {
    let mut h = harness();
    h.pipeline.emit_write_statistics(&mut h.b, BufferId(81), 0).unwrap();

    let cmds = commands(&h.batch_since(0));
    let srm = cmds.iter().filter(|&&c| c == Command::MiStoreRegisterMem).count();
    let sdi = cmds.iter().filter(|&&c| c == Command::MiStoreDataImm).count();
    assert_eq!((srm, sdi), (16, 3));
    assert_eq!(cmds.iter().filter(|&&c| c == Command::PipeControl).count(), 3);
}

#[test]
fn depth_count_stalls_on_depth() {
    let mut h = harness();
    h.pipeline.emit_write_depth_count(&mut h.b, BufferId(82), 1).unwrap();

    let pcs = pipe_controls(&h.batch_since(0));
    assert_eq!(pcs.len(), 3);
    assert_eq!(pcs[2], PipeControl::DEPTH_STALL | PipeControl::WRITE_PS_DEPTH_COUNT);
}

#[test]
fn rectlist_clears_depth_without_shaders() {
    let mut h = harness();
    let mut zs = DepthStencilSurface::new(BufferId(90), DepthFormat::D24UnormX8Uint, 32, 16, 128);
    zs.hiz = Some((BufferId(91), 128));
    let mut info = RectlistInfo::new(RectlistOp::ClearZs, zs);
    info.uses |= RectlistUses::VIEWPORT;

    let start = consumed(&h.b);
    h.pipeline.emit_rectlist(&mut h.b, &info).unwrap();
    assert!(consumed(&h.b) - start <= h.pipeline.estimate_size(PipelineAction::Rectlist(&info)));

    let packets = h.batch_since(0);
    let cmds = commands(&packets);
    assert!(cmds.contains(&Command::HierDepthBuffer));
    assert!(!cmds.contains(&Command::StencilBuffer));
    assert!(cmds.contains(&Command::ViewportStatePointers));

    let primitive = packets.last().unwrap();
    assert_eq!(primitive.command, Command::Primitive);
    let topology = primitive.dw(0) >> gpe_protocol::gen6::PRIMITIVE_DW0_TOPOLOGY_SHIFT & 0x1f;
    assert_eq!(topology, gpe_protocol::Topology::RectList as u32);
    assert_eq!(primitive.dw(1), 3);
    assert!(!h.pipeline.cache.post_sync_emitted);
}
