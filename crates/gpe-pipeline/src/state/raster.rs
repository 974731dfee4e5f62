//! Fixed-function state objects: blending, depth/stencil, rasterization,
//! viewports and samplers.

use gpe_protocol::gen6::{
    BlendFactor, BlendFunction, CompareFunction, CullMode, FillMode, LogicOp, MapFilter, MipFilter,
    StencilOp, TexCoordMode,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtBlend {
    pub blend_enable: bool,
    pub rgb_func: BlendFunction,
    pub rgb_src: BlendFactor,
    pub rgb_dst: BlendFactor,
    pub alpha_func: BlendFunction,
    pub alpha_src: BlendFactor,
    pub alpha_dst: BlendFactor,
    /// RGBA write mask, R in bit 0.
    pub colormask: u8,
}

impl Default for RtBlend {
    fn default() -> Self {
        Self {
            blend_enable: false,
            rgb_func: BlendFunction::Add,
            rgb_src: BlendFactor::One,
            rgb_dst: BlendFactor::Zero,
            alpha_func: BlendFunction::Add,
            alpha_src: BlendFactor::One,
            alpha_dst: BlendFactor::Zero,
            colormask: 0xf,
        }
    }
}

impl RtBlend {
    pub fn independent_alpha(&self) -> bool {
        self.rgb_func != self.alpha_func
            || self.rgb_src != self.alpha_src
            || self.rgb_dst != self.alpha_dst
    }

    pub fn uses_dual_source(&self) -> bool {
        self.blend_enable
            && [self.rgb_src, self.rgb_dst, self.alpha_src, self.alpha_dst]
                .iter()
                .any(|f| f.uses_src1())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlendState {
    /// When false, `rt[0]` applies to every render target.
    pub independent: bool,
    pub rt: Vec<RtBlend>,
    pub logicop: Option<LogicOp>,
    pub alpha_to_coverage: bool,
    pub alpha_to_one: bool,
    pub dither: bool,
}

impl Default for BlendState {
    fn default() -> Self {
        Self {
            independent: false,
            rt: vec![RtBlend::default()],
            logicop: None,
            alpha_to_coverage: false,
            alpha_to_one: false,
            dither: false,
        }
    }
}

impl BlendState {
    pub fn target(&self, index: usize) -> RtBlend {
        let index = if self.independent { index } else { 0 };
        self.rt.get(index).copied().unwrap_or_default()
    }

    pub fn dual_blend(&self) -> bool {
        self.target(0).uses_dual_source()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StencilFace {
    pub enabled: bool,
    pub func: CompareFunction,
    pub fail_op: StencilOp,
    pub zfail_op: StencilOp,
    pub zpass_op: StencilOp,
    pub valuemask: u8,
    pub writemask: u8,
}

impl Default for StencilFace {
    fn default() -> Self {
        Self {
            enabled: false,
            func: CompareFunction::Always,
            fail_op: StencilOp::Keep,
            zfail_op: StencilOp::Keep,
            zpass_op: StencilOp::Keep,
            valuemask: 0xff,
            writemask: 0xff,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlphaTest {
    pub func: CompareFunction,
    pub reference: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthStencilAlpha {
    pub depth_test: bool,
    pub depth_write: bool,
    pub depth_func: CompareFunction,
    /// Front and back faces.
    pub stencil: [StencilFace; 2],
    pub alpha: Option<AlphaTest>,
}

impl Default for DepthStencilAlpha {
    fn default() -> Self {
        Self {
            depth_test: false,
            depth_write: false,
            depth_func: CompareFunction::Always,
            stencil: [StencilFace::default(); 2],
            alpha: None,
        }
    }
}

impl DepthStencilAlpha {
    pub fn alpha_ref(&self) -> f32 {
        self.alpha.map_or(0.0, |a| a.reference)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineStipple {
    pub pattern: u16,
    /// Repeat count minus one.
    pub factor: u16,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterizerState {
    pub front_ccw: bool,
    pub cull: CullMode,
    pub fill_front: FillMode,
    pub fill_back: FillMode,
    pub offset_point: bool,
    pub offset_line: bool,
    pub offset_tri: bool,
    pub offset_units: f32,
    pub offset_scale: f32,
    pub offset_clamp: f32,
    pub scissor: bool,
    pub line_width: f32,
    pub line_smooth: bool,
    pub line_stipple: Option<LineStipple>,
    pub line_last_pixel: bool,
    pub poly_stipple: bool,
    pub point_size: f32,
    pub point_size_per_vertex: bool,
    /// First vertex is the provoking vertex.
    pub flatshade_first: bool,
    pub half_pixel_center: bool,
    pub multisample: bool,
    pub depth_clip: bool,
    /// User clip planes in use, one bit each.
    pub clip_plane_enable: u8,
}

impl Default for RasterizerState {
    fn default() -> Self {
        Self {
            front_ccw: false,
            cull: CullMode::None,
            fill_front: FillMode::Solid,
            fill_back: FillMode::Solid,
            offset_point: false,
            offset_line: false,
            offset_tri: false,
            offset_units: 0.0,
            offset_scale: 0.0,
            offset_clamp: 0.0,
            scissor: false,
            line_width: 1.0,
            line_smooth: false,
            line_stipple: None,
            line_last_pixel: false,
            poly_stipple: false,
            point_size: 1.0,
            point_size_per_vertex: false,
            flatshade_first: false,
            half_pixel_center: true,
            multisample: false,
            depth_clip: true,
            clip_plane_enable: 0,
        }
    }
}

/// Window transform, `window = ndc * scale + translate`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub scale: [f32; 3],
    pub translate: [f32; 3],
}

impl Viewport {
    /// Covers `(x, y, width, height)` with depth range [0, 1].
    pub fn from_rect(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            scale: [width / 2.0, height / 2.0, 0.5],
            translate: [x + width / 2.0, y + height / 2.0, 0.5],
        }
    }

    fn extent(&self, axis: usize) -> (f32, f32) {
        let half = self.scale[axis].abs();
        (self.translate[axis] - half, self.translate[axis] + half)
    }

    pub fn min_x(&self) -> f32 {
        self.extent(0).0
    }

    pub fn max_x(&self) -> f32 {
        self.extent(0).1
    }

    pub fn min_y(&self) -> f32 {
        self.extent(1).0
    }

    pub fn max_y(&self) -> f32 {
        self.extent(1).1
    }

    /// Depth range clamped to [0, 1].
    pub fn depth_range(&self) -> (f32, f32) {
        let (near, far) = self.extent(2);
        (near.clamp(0.0, 1.0), far.clamp(0.0, 1.0))
    }

    /// Whether the viewport covers a `width` x `height` framebuffer.
    pub fn covers(&self, width: u32, height: u32) -> bool {
        self.min_x() <= 0.0
            && self.max_x() >= width as f32
            && self.min_y() <= 0.0
            && self.max_y() >= height as f32
    }
}

/// Exclusive bounds in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScissorRect {
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
}

impl Default for ScissorRect {
    fn default() -> Self {
        Self {
            min_x: 0,
            min_y: 0,
            max_x: 8192,
            max_y: 8192,
        }
    }
}

impl ScissorRect {
    pub fn is_empty(&self) -> bool {
        self.min_x >= self.max_x || self.min_y >= self.max_y
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StencilRef {
    pub front: u8,
    pub back: u8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BlendColor(pub [f32; 4]);

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClipState {
    pub planes: Vec<[f32; 4]>,
}

impl ClipState {
    pub fn to_dwords(&self) -> Vec<u32> {
        self.planes.iter().flatten().map(|f| f.to_bits()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolyStipple(pub [u32; 32]);

impl Default for PolyStipple {
    fn default() -> Self {
        PolyStipple([0xffff_ffff; 32])
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerDesc {
    pub min_filter: MapFilter,
    pub mag_filter: MapFilter,
    pub mip_filter: MipFilter,
    pub wrap: [TexCoordMode; 3],
    pub lod_bias: f32,
    pub min_lod: f32,
    pub max_lod: f32,
    pub compare: Option<CompareFunction>,
    pub max_anisotropy: u32,
    pub normalized_coords: bool,
    pub border_color: [f32; 4],
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            min_filter: MapFilter::Nearest,
            mag_filter: MapFilter::Nearest,
            mip_filter: MipFilter::None,
            wrap: [TexCoordMode::Clamp; 3],
            lod_bias: 0.0,
            min_lod: 0.0,
            max_lod: 13.0,
            compare: None,
            max_anisotropy: 0,
            normalized_coords: true,
            border_color: [0.0; 4],
        }
    }
}
