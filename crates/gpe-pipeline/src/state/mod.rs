//! Logical pipeline state and the coarse dirty bits describing what changed
//! since the last draw.

mod raster;
mod resources;
mod shader;

use std::sync::Arc;

use bitflags::bitflags;

use gpe_protocol::gen6::{self, Topology};

pub use raster::{
    AlphaTest, BlendColor, BlendState, ClipState, DepthStencilAlpha, LineStipple, PolyStipple,
    RasterizerState, RtBlend, SamplerDesc, ScissorRect, StencilFace, StencilRef, Viewport,
};
pub use resources::{
    ConstantBuffer, DepthStencilSurface, Framebuffer, IndexBufferBinding, StreamOutputTarget,
    SurfaceDesc, VertexBufferBinding, VertexElement,
};
pub use shader::{KernelId, KernelParams, ShaderKernel, StreamOutputDecl, StreamOutputInfo};

pub const MAX_VIEWPORTS: usize = 16;
pub const MAX_DRAW_BUFFERS: usize = 8;
pub const MAX_SAMPLERS: usize = 16;
pub const MAX_SAMPLER_VIEWS: usize = 16;
pub const MAX_CONST_BUFFERS: usize = 16;
pub const MAX_SO_BUFFERS: usize = 4;
pub const MAX_SO_BINDINGS: usize = 64;
pub const MAX_VERTEX_BUFFERS: usize = gen6::MAX_VERTEX_BUFFERS;
pub const MAX_VERTEX_ELEMENTS: usize = gen6::MAX_VERTEX_ELEMENTS;

bitflags! {
    /// One bit per logical state group.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct DirtyFlags: u32 {
        const VB = 1 << 0;
        const VE = 1 << 1;
        const IB = 1 << 2;
        const VS = 1 << 3;
        const GS = 1 << 4;
        const FS = 1 << 5;
        const SO = 1 << 6;
        const BLEND = 1 << 7;
        const DSA = 1 << 8;
        const RASTERIZER = 1 << 9;
        const VIEWPORT = 1 << 10;
        const SCISSOR = 1 << 11;
        const FB = 1 << 12;
        const SAMPLE_MASK = 1 << 13;
        const STENCIL_REF = 1 << 14;
        const BLEND_COLOR = 1 << 15;
        const CLIP = 1 << 16;
        const POLY_STIPPLE = 1 << 17;
        const SAMPLER_VS = 1 << 18;
        const SAMPLER_GS = 1 << 19;
        const SAMPLER_FS = 1 << 20;
        const VIEW_VS = 1 << 21;
        const VIEW_GS = 1 << 22;
        const VIEW_FS = 1 << 23;
        const CBUF = 1 << 24;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Geometry,
    Fragment,
}

impl ShaderStage {
    pub const ALL: [ShaderStage; 3] = [ShaderStage::Vertex, ShaderStage::Geometry, ShaderStage::Fragment];

    pub const fn index(self) -> usize {
        match self {
            ShaderStage::Vertex => 0,
            ShaderStage::Geometry => 1,
            ShaderStage::Fragment => 2,
        }
    }

    pub const fn shader_dirty(self) -> DirtyFlags {
        match self {
            ShaderStage::Vertex => DirtyFlags::VS,
            ShaderStage::Geometry => DirtyFlags::GS,
            ShaderStage::Fragment => DirtyFlags::FS,
        }
    }

    pub const fn sampler_dirty(self) -> DirtyFlags {
        match self {
            ShaderStage::Vertex => DirtyFlags::SAMPLER_VS,
            ShaderStage::Geometry => DirtyFlags::SAMPLER_GS,
            ShaderStage::Fragment => DirtyFlags::SAMPLER_FS,
        }
    }

    pub const fn view_dirty(self) -> DirtyFlags {
        match self {
            ShaderStage::Vertex => DirtyFlags::VIEW_VS,
            ShaderStage::Geometry => DirtyFlags::VIEW_GS,
            ShaderStage::Fragment => DirtyFlags::VIEW_FS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveMode {
    Points,
    Lines,
    LineLoop,
    LineStrip,
    Triangles,
    TriangleStrip,
    TriangleFan,
    Quads,
    QuadStrip,
    Polygon,
    LinesAdjacency,
    LineStripAdjacency,
    TrianglesAdjacency,
    TriangleStripAdjacency,
}

/// Primitive class after assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReducedPrim {
    Points,
    Lines,
    Triangles,
}

impl ReducedPrim {
    pub const fn vertices(self) -> u32 {
        match self {
            ReducedPrim::Points => 1,
            ReducedPrim::Lines => 2,
            ReducedPrim::Triangles => 3,
        }
    }
}

impl PrimitiveMode {
    pub const fn topology(self) -> Topology {
        match self {
            PrimitiveMode::Points => Topology::PointList,
            PrimitiveMode::Lines => Topology::LineList,
            PrimitiveMode::LineLoop => Topology::LineLoop,
            PrimitiveMode::LineStrip => Topology::LineStrip,
            PrimitiveMode::Triangles => Topology::TriList,
            PrimitiveMode::TriangleStrip => Topology::TriStrip,
            PrimitiveMode::TriangleFan => Topology::TriFan,
            PrimitiveMode::Quads => Topology::QuadList,
            PrimitiveMode::QuadStrip => Topology::QuadStrip,
            PrimitiveMode::Polygon => Topology::Polygon,
            PrimitiveMode::LinesAdjacency => Topology::LineListAdj,
            PrimitiveMode::LineStripAdjacency => Topology::LineStripAdj,
            PrimitiveMode::TrianglesAdjacency => Topology::TriListAdj,
            PrimitiveMode::TriangleStripAdjacency => Topology::TriStripAdj,
        }
    }

    pub const fn reduced(self) -> ReducedPrim {
        match self {
            PrimitiveMode::Points => ReducedPrim::Points,
            PrimitiveMode::Lines
            | PrimitiveMode::LineLoop
            | PrimitiveMode::LineStrip
            | PrimitiveMode::LinesAdjacency
            | PrimitiveMode::LineStripAdjacency => ReducedPrim::Lines,
            _ => ReducedPrim::Triangles,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawInfo {
    pub mode: PrimitiveMode,
    pub start: u32,
    pub count: u32,
    pub instance_count: u32,
    pub start_instance: u32,
    pub index_bias: i32,
    pub indexed: bool,
    pub primitive_restart: bool,
    pub restart_index: u32,
}

impl DrawInfo {
    pub fn arrays(mode: PrimitiveMode, start: u32, count: u32) -> Self {
        Self {
            mode,
            start,
            count,
            instance_count: 1,
            start_instance: 0,
            index_bias: 0,
            indexed: false,
            primitive_restart: false,
            restart_index: 0,
        }
    }

    pub fn indexed(mode: PrimitiveMode, start: u32, count: u32) -> Self {
        Self {
            indexed: true,
            ..Self::arrays(mode, start, count)
        }
    }
}

/// Per-stage resource bindings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageResources {
    pub samplers: Vec<Option<SamplerDesc>>,
    pub views: Vec<Option<SurfaceDesc>>,
    pub cbufs: Vec<Option<ConstantBuffer>>,
}

impl StageResources {
    /// One past the highest enabled constant buffer slot.
    pub fn cbuf_slot_count(&self) -> usize {
        self.cbufs.iter().rposition(Option::is_some).map_or(0, |i| i + 1)
    }

    /// Constant buffer 0 is the only one enabled and holds user data.
    pub fn cbufs_pushed_only(&self) -> bool {
        self.cbuf_slot_count() == 1
            && self.cbufs[0].as_ref().is_some_and(|cb| cb.resource().is_none())
    }
}

/// The complete logical state the next draw renders with.
///
/// Setters record what changed in [`PipelineState::dirty`]; setting a value
/// equal to the current one leaves the dirty bits alone.
#[derive(Debug, Clone)]
pub struct PipelineState {
    pub(crate) vs: Option<Arc<ShaderKernel>>,
    pub(crate) gs: Option<Arc<ShaderKernel>>,
    pub(crate) fs: Option<Arc<ShaderKernel>>,
    pub(crate) vertex_buffers: Vec<Option<VertexBufferBinding>>,
    pub(crate) vertex_elements: Vec<VertexElement>,
    pub(crate) index_buffer: Option<IndexBufferBinding>,
    pub(crate) so_targets: Vec<Option<StreamOutputTarget>>,
    pub(crate) blend: BlendState,
    pub(crate) dsa: DepthStencilAlpha,
    pub(crate) rasterizer: RasterizerState,
    pub(crate) viewports: Vec<Viewport>,
    pub(crate) scissors: Vec<ScissorRect>,
    pub(crate) framebuffer: Framebuffer,
    pub(crate) sample_mask: u32,
    pub(crate) stencil_ref: StencilRef,
    pub(crate) blend_color: BlendColor,
    pub(crate) clip: ClipState,
    pub(crate) poly_stipple: PolyStipple,
    pub(crate) stages: [StageResources; 3],
    dirty: DirtyFlags,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self {
            vs: None,
            gs: None,
            fs: None,
            vertex_buffers: Vec::new(),
            vertex_elements: Vec::new(),
            index_buffer: None,
            so_targets: Vec::new(),
            blend: BlendState::default(),
            dsa: DepthStencilAlpha::default(),
            rasterizer: RasterizerState::default(),
            viewports: vec![Viewport::from_rect(0.0, 0.0, 0.0, 0.0)],
            scissors: Vec::new(),
            framebuffer: Framebuffer::default(),
            sample_mask: !0,
            stencil_ref: StencilRef::default(),
            blend_color: BlendColor::default(),
            clip: ClipState::default(),
            poly_stipple: PolyStipple::default(),
            stages: Default::default(),
            dirty: DirtyFlags::all(),
        }
    }
}

fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot != value {
        *slot = value;
        true
    } else {
        false
    }
}

fn truncated<T: Clone>(items: &[T], max: usize) -> Vec<T> {
    debug_assert!(items.len() <= max, "{} bindings exceed the limit of {max}", items.len());
    items[..items.len().min(max)].to_vec()
}

impl PipelineState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dirty(&self) -> DirtyFlags {
        self.dirty
    }

    pub fn mark_dirty(&mut self, flags: DirtyFlags) {
        self.dirty |= flags;
    }

    pub fn clear_dirty(&mut self) {
        self.dirty = DirtyFlags::empty();
    }

    fn update<T: PartialEq>(dirty: &mut DirtyFlags, flag: DirtyFlags, slot: &mut T, value: T) {
        if replace(slot, value) {
            *dirty |= flag;
        }
    }

    pub fn shader(&self, stage: ShaderStage) -> Option<&Arc<ShaderKernel>> {
        match stage {
            ShaderStage::Vertex => self.vs.as_ref(),
            ShaderStage::Geometry => self.gs.as_ref(),
            ShaderStage::Fragment => self.fs.as_ref(),
        }
    }

    pub fn bind_shader(&mut self, stage: ShaderStage, kernel: Option<Arc<ShaderKernel>>) {
        let slot = match stage {
            ShaderStage::Vertex => &mut self.vs,
            ShaderStage::Geometry => &mut self.gs,
            ShaderStage::Fragment => &mut self.fs,
        };
        Self::update(&mut self.dirty, stage.shader_dirty(), slot, kernel);
    }

    /// Every bound kernel, vertex stage first.
    pub fn kernels(&self) -> impl Iterator<Item = &Arc<ShaderKernel>> {
        [self.vs.as_ref(), self.gs.as_ref(), self.fs.as_ref()]
            .into_iter()
            .flatten()
    }

    /// Stream-output layout of the last geometry-producing stage.
    pub fn so_info(&self) -> Option<&StreamOutputInfo> {
        self.gs
            .as_ref()
            .or(self.vs.as_ref())
            .map(|kernel| &kernel.stream_output)
    }

    /// A geometry thread runs: a GS is bound or the VS streams out through
    /// its own geometry programs.
    pub fn gs_active(&self) -> bool {
        self.gs.is_some() || self.vs.as_ref().is_some_and(|vs| vs.has_gs_stream_output())
    }

    pub fn vertex_buffers(&self) -> &[Option<VertexBufferBinding>] {
        &self.vertex_buffers
    }

    pub fn set_vertex_buffers(&mut self, buffers: &[Option<VertexBufferBinding>]) {
        let buffers = truncated(buffers, MAX_VERTEX_BUFFERS);
        Self::update(&mut self.dirty, DirtyFlags::VB, &mut self.vertex_buffers, buffers);
    }

    pub fn vertex_elements(&self) -> &[VertexElement] {
        &self.vertex_elements
    }

    pub fn set_vertex_elements(&mut self, elements: &[VertexElement]) {
        let elements = truncated(elements, MAX_VERTEX_ELEMENTS);
        Self::update(&mut self.dirty, DirtyFlags::VE, &mut self.vertex_elements, elements);
    }

    pub fn set_index_buffer(&mut self, ib: Option<IndexBufferBinding>) {
        Self::update(&mut self.dirty, DirtyFlags::IB, &mut self.index_buffer, ib);
    }

    pub fn set_stream_output_targets(&mut self, targets: &[Option<StreamOutputTarget>]) {
        let targets = truncated(targets, MAX_SO_BUFFERS);
        Self::update(&mut self.dirty, DirtyFlags::SO, &mut self.so_targets, targets);
    }

    pub fn stream_output_targets(&self) -> &[Option<StreamOutputTarget>] {
        &self.so_targets
    }

    pub fn set_blend(&mut self, blend: BlendState) {
        Self::update(&mut self.dirty, DirtyFlags::BLEND, &mut self.blend, blend);
    }

    pub fn set_depth_stencil_alpha(&mut self, dsa: DepthStencilAlpha) {
        Self::update(&mut self.dirty, DirtyFlags::DSA, &mut self.dsa, dsa);
    }

    pub fn rasterizer(&self) -> &RasterizerState {
        &self.rasterizer
    }

    pub fn set_rasterizer(&mut self, rasterizer: RasterizerState) {
        Self::update(&mut self.dirty, DirtyFlags::RASTERIZER, &mut self.rasterizer, rasterizer);
    }

    pub fn viewports(&self) -> &[Viewport] {
        &self.viewports
    }

    pub fn set_viewports(&mut self, viewports: &[Viewport]) {
        let viewports = truncated(viewports, MAX_VIEWPORTS);
        Self::update(&mut self.dirty, DirtyFlags::VIEWPORT, &mut self.viewports, viewports);
    }

    pub fn set_scissors(&mut self, scissors: &[ScissorRect]) {
        let scissors = truncated(scissors, MAX_VIEWPORTS);
        Self::update(&mut self.dirty, DirtyFlags::SCISSOR, &mut self.scissors, scissors);
    }

    /// Scissor for viewport `index`; unset scissors cover everything.
    pub fn scissor(&self, index: usize) -> ScissorRect {
        self.scissors.get(index).copied().unwrap_or_default()
    }

    pub fn framebuffer(&self) -> &Framebuffer {
        &self.framebuffer
    }

    pub fn set_framebuffer(&mut self, mut fb: Framebuffer) {
        fb.cbufs.truncate(MAX_DRAW_BUFFERS);
        Self::update(&mut self.dirty, DirtyFlags::FB, &mut self.framebuffer, fb);
    }

    pub fn set_sample_mask(&mut self, mask: u32) {
        Self::update(&mut self.dirty, DirtyFlags::SAMPLE_MASK, &mut self.sample_mask, mask);
    }

    pub fn set_stencil_ref(&mut self, stencil_ref: StencilRef) {
        Self::update(&mut self.dirty, DirtyFlags::STENCIL_REF, &mut self.stencil_ref, stencil_ref);
    }

    pub fn set_blend_color(&mut self, color: BlendColor) {
        Self::update(&mut self.dirty, DirtyFlags::BLEND_COLOR, &mut self.blend_color, color);
    }

    pub fn set_clip(&mut self, clip: ClipState) {
        Self::update(&mut self.dirty, DirtyFlags::CLIP, &mut self.clip, clip);
    }

    pub fn set_poly_stipple(&mut self, stipple: PolyStipple) {
        Self::update(&mut self.dirty, DirtyFlags::POLY_STIPPLE, &mut self.poly_stipple, stipple);
    }

    pub fn stage(&self, stage: ShaderStage) -> &StageResources {
        &self.stages[stage.index()]
    }

    pub fn set_samplers(&mut self, stage: ShaderStage, samplers: &[Option<SamplerDesc>]) {
        let samplers = truncated(samplers, MAX_SAMPLERS);
        let slot = &mut self.stages[stage.index()].samplers;
        Self::update(&mut self.dirty, stage.sampler_dirty(), slot, samplers);
    }

    pub fn set_sampler_views(&mut self, stage: ShaderStage, views: &[Option<SurfaceDesc>]) {
        let views = truncated(views, MAX_SAMPLER_VIEWS);
        let slot = &mut self.stages[stage.index()].views;
        Self::update(&mut self.dirty, stage.view_dirty(), slot, views);
    }

    pub fn set_constant_buffer(&mut self, stage: ShaderStage, index: usize, cbuf: Option<ConstantBuffer>) {
        if index >= MAX_CONST_BUFFERS {
            debug_assert!(false, "constant buffer slot {index} out of range");
            return;
        }
        let cbufs = &mut self.stages[stage.index()].cbufs;
        if cbufs.len() <= index {
            if cbuf.is_none() {
                return;
            }
            cbufs.resize(index + 1, None);
        }
        Self::update(&mut self.dirty, DirtyFlags::CBUF, &mut cbufs[index], cbuf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BufferId;

    fn kernel(id: u64) -> Arc<ShaderKernel> {
        Arc::new(ShaderKernel::new(KernelId(id), vec![0u8; 16]))
    }

    #[test]
    fn new_state_is_fully_dirty() {
        assert_eq!(PipelineState::new().dirty(), DirtyFlags::all());
    }

    #[test]
    fn unchanged_values_do_not_dirty() {
        let mut state = PipelineState::new();
        state.bind_shader(ShaderStage::Vertex, Some(kernel(1)));
        state.clear_dirty();

        state.bind_shader(ShaderStage::Vertex, Some(kernel(1)));
        state.set_sample_mask(!0);
        assert!(state.dirty().is_empty());

        state.bind_shader(ShaderStage::Vertex, Some(kernel(2)));
        state.set_sample_mask(1);
        assert_eq!(state.dirty(), DirtyFlags::VS | DirtyFlags::SAMPLE_MASK);
    }

    #[test]
    fn stage_bindings_mark_stage_bits() {
        let mut state = PipelineState::new();
        state.clear_dirty();
        let view = SurfaceDesc::render_target(BufferId(1), 4, 4);
        state.set_sampler_views(ShaderStage::Fragment, &[Some(view)]);
        state.set_samplers(ShaderStage::Vertex, &[Some(SamplerDesc::default())]);
        assert_eq!(state.dirty(), DirtyFlags::VIEW_FS | DirtyFlags::SAMPLER_VS);
    }

    #[test]
    fn pushed_constants_detection() {
        let mut state = PipelineState::new();
        state.set_constant_buffer(ShaderStage::Fragment, 0, Some(ConstantBuffer::user(vec![1, 2])));
        assert!(state.stage(ShaderStage::Fragment).cbufs_pushed_only());

        state.set_constant_buffer(
            ShaderStage::Fragment,
            2,
            Some(ConstantBuffer::Resource {
                buffer: BufferId(4),
                offset: 0,
                size: 64,
            }),
        );
        let fs = state.stage(ShaderStage::Fragment);
        assert_eq!(fs.cbuf_slot_count(), 3);
        assert!(!fs.cbufs_pushed_only());
    }

    #[test]
    fn stream_output_info_prefers_geometry_stage() {
        let mut state = PipelineState::new();
        assert!(state.so_info().is_none());
        assert!(!state.gs_active());

        let vs = ShaderKernel::new(KernelId(1), vec![0u8; 4]).with_params(KernelParams {
            so_gs_offsets: Some([0, 64, 128]),
            ..KernelParams::default()
        });
        state.bind_shader(ShaderStage::Vertex, Some(Arc::new(vs)));
        assert!(state.gs_active());

        state.bind_shader(ShaderStage::Geometry, Some(kernel(9)));
        assert!(std::ptr::eq(
            state.so_info().unwrap(),
            &state.shader(ShaderStage::Geometry).unwrap().stream_output
        ));
    }

    #[test]
    fn reduced_primitives() {
        assert_eq!(PrimitiveMode::LineLoop.reduced(), ReducedPrim::Lines);
        assert_eq!(PrimitiveMode::Quads.reduced().vertices(), 3);
        assert_eq!(PrimitiveMode::Points.topology(), Topology::PointList);
    }
}
