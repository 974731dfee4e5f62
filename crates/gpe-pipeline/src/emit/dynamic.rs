//! Dynamic state blocks.
//!
//! Every block is stolen from the top of the batch writer and addressed by
//! its offset from the dynamic (and surface) state base, which
//! `STATE_BASE_ADDRESS` points at the batch buffer itself.

use half::f16;

use gpe_protocol::gen6::{self, state_align, state_size, surface_format, SurfaceType};

use crate::backend::BufferId;
use crate::builder::{Builder, ItemKind, RelocTarget};
use crate::error::BuilderError;
use crate::state::{
    BlendColor, BlendState, DepthStencilAlpha, Framebuffer, SamplerDesc, ScissorRect, StencilFace,
    StencilRef, StreamOutputInfo, StreamOutputTarget, SurfaceDesc, Viewport,
};

/// Guard band half extent, in pixels.
const GUARDBAND_EXTENT: f32 = 8192.0;

pub fn sf_viewports(b: &mut Builder, viewports: &[Viewport]) -> Result<u32, BuilderError> {
    let mut dw = Vec::with_capacity(viewports.len() * state_size::SF_VIEWPORT);
    for vp in viewports {
        dw.extend_from_slice(&[
            vp.scale[0].to_bits(),
            vp.scale[1].to_bits(),
            vp.scale[2].to_bits(),
            vp.translate[0].to_bits(),
            vp.translate[1].to_bits(),
            vp.translate[2].to_bits(),
            0,
            0,
        ]);
    }
    b.state_write(ItemKind::SfViewport, state_align::SF_VIEWPORT, &dw)
}

/// Guard band of one axis in NDC.
fn guardband(scale: f32, translate: f32) -> (f32, f32) {
    if scale == 0.0 {
        return (-1.0, 1.0);
    }
    let lo = (-GUARDBAND_EXTENT - translate) / scale;
    let hi = (GUARDBAND_EXTENT - translate) / scale;
    (lo.min(hi), lo.max(hi))
}

pub fn clip_viewports(b: &mut Builder, viewports: &[Viewport]) -> Result<u32, BuilderError> {
    let mut dw = Vec::with_capacity(viewports.len() * state_size::CLIP_VIEWPORT);
    for vp in viewports {
        let (min_x, max_x) = guardband(vp.scale[0], vp.translate[0]);
        let (min_y, max_y) = guardband(vp.scale[1], vp.translate[1]);
        dw.extend_from_slice(&[
            min_x.to_bits(),
            max_x.to_bits(),
            min_y.to_bits(),
            max_y.to_bits(),
        ]);
    }
    b.state_write(ItemKind::ClipViewport, state_align::CLIP_VIEWPORT, &dw)
}

pub fn cc_viewports(b: &mut Builder, viewports: &[Viewport]) -> Result<u32, BuilderError> {
    let mut dw = Vec::with_capacity(viewports.len() * state_size::CC_VIEWPORT);
    for vp in viewports {
        let (near, far) = vp.depth_range();
        dw.extend_from_slice(&[near.to_bits(), far.to_bits()]);
    }
    b.state_write(ItemKind::CcViewport, state_align::CC_VIEWPORT, &dw)
}

pub fn scissor_rects(b: &mut Builder, rects: &[ScissorRect]) -> Result<u32, BuilderError> {
    let mut dw = Vec::with_capacity(rects.len() * state_size::SCISSOR_RECT);
    for rect in rects {
        if rect.is_empty() {
            // min > max rejects every pixel
            dw.extend_from_slice(&[1 << 16 | 1, 0]);
        } else {
            dw.extend_from_slice(&[
                (rect.min_y & 0xffff) << 16 | (rect.min_x & 0xffff),
                ((rect.max_y - 1) & 0xffff) << 16 | ((rect.max_x - 1) & 0xffff),
            ]);
        }
    }
    b.state_write(ItemKind::ScissorRect, state_align::SCISSOR_RECT, &dw)
}

/// One `BLEND_STATE` entry per bound render target, at least one. Alpha
/// testing lives here on Gen6, hence the DSA dependency.
pub fn blend_state(
    b: &mut Builder,
    blend: &BlendState,
    fb: &Framebuffer,
    dsa: &DepthStencilAlpha,
) -> Result<u32, BuilderError> {
    let targets = fb.nr_cbufs().max(1);
    let mut dw = Vec::with_capacity(targets * state_size::BLEND_STATE);

    for i in 0..targets {
        let rt = blend.target(i);

        let mut dw0 = 0;
        if rt.blend_enable {
            dw0 = gen6::BLEND_DW0_BLEND_ENABLE
                | (rt.alpha_func as u32) << gen6::BLEND_DW0_ALPHA_FUNC_SHIFT
                | (rt.alpha_src as u32) << gen6::BLEND_DW0_SRC_ALPHA_SHIFT
                | (rt.alpha_dst as u32) << gen6::BLEND_DW0_DST_ALPHA_SHIFT
                | (rt.rgb_func as u32) << gen6::BLEND_DW0_COLOR_FUNC_SHIFT
                | (rt.rgb_src as u32) << gen6::BLEND_DW0_SRC_COLOR_SHIFT
                | (rt.rgb_dst as u32) << gen6::BLEND_DW0_DST_COLOR_SHIFT;
            if rt.independent_alpha() {
                dw0 |= gen6::BLEND_DW0_INDEPENDENT_ALPHA;
            }
        }

        let mut dw1 = gen6::BLEND_DW1_PRE_BLEND_CLAMP | gen6::BLEND_DW1_POST_BLEND_CLAMP;
        if blend.alpha_to_coverage {
            dw1 |= gen6::BLEND_DW1_ALPHA_TO_COVERAGE;
        }
        if blend.alpha_to_one {
            dw1 |= gen6::BLEND_DW1_ALPHA_TO_ONE;
        }
        if let Some(op) = blend.logicop {
            dw1 |= gen6::BLEND_DW1_LOGICOP_ENABLE | (op as u32) << gen6::BLEND_DW1_LOGICOP_FUNC_SHIFT;
        }
        if let Some(alpha) = dsa.alpha {
            dw1 |= gen6::BLEND_DW1_ALPHA_TEST_ENABLE
                | (alpha.func as u32) << gen6::BLEND_DW1_ALPHA_TEST_FUNC_SHIFT;
        }
        if blend.dither {
            dw1 |= gen6::BLEND_DW1_COLOR_DITHER;
        }
        for (bit, disable) in [
            (0x1, gen6::BLEND_DW1_WRITE_DISABLE_R),
            (0x2, gen6::BLEND_DW1_WRITE_DISABLE_G),
            (0x4, gen6::BLEND_DW1_WRITE_DISABLE_B),
            (0x8, gen6::BLEND_DW1_WRITE_DISABLE_A),
        ] {
            if rt.colormask & bit == 0 {
                dw1 |= disable;
            }
        }

        dw.extend_from_slice(&[dw0, dw1]);
    }

    b.state_write(ItemKind::Blend, state_align::BLEND_STATE, &dw)
}

fn stencil_ops(face: &StencilFace, func: u32, fail: u32, zfail: u32, zpass: u32) -> u32 {
    (face.func as u32) << func
        | (face.fail_op as u32) << fail
        | (face.zfail_op as u32) << zfail
        | (face.zpass_op as u32) << zpass
}

pub fn depth_stencil_state(b: &mut Builder, dsa: &DepthStencilAlpha) -> Result<u32, BuilderError> {
    let [front, back] = &dsa.stencil;

    let mut dw0 = 0;
    let mut dw1 = 0;
    if front.enabled {
        dw0 |= gen6::DSA_DW0_STENCIL_ENABLE
            | stencil_ops(
                front,
                gen6::DSA_DW0_STENCIL_FUNC_SHIFT,
                gen6::DSA_DW0_STENCIL_FAIL_SHIFT,
                gen6::DSA_DW0_STENCIL_ZFAIL_SHIFT,
                gen6::DSA_DW0_STENCIL_ZPASS_SHIFT,
            );
        if front.writemask != 0 {
            dw0 |= gen6::DSA_DW0_STENCIL_WRITE_ENABLE;
        }
        dw1 |= u32::from(front.valuemask) << gen6::DSA_DW1_TEST_MASK_SHIFT
            | u32::from(front.writemask) << gen6::DSA_DW1_WRITE_MASK_SHIFT;

        if back.enabled {
            dw0 |= gen6::DSA_DW0_DOUBLE_SIDED
                | stencil_ops(
                    back,
                    gen6::DSA_DW0_BACK_FUNC_SHIFT,
                    gen6::DSA_DW0_BACK_FAIL_SHIFT,
                    gen6::DSA_DW0_BACK_ZFAIL_SHIFT,
                    gen6::DSA_DW0_BACK_ZPASS_SHIFT,
                );
            if back.writemask != 0 {
                dw0 |= gen6::DSA_DW0_STENCIL_WRITE_ENABLE;
            }
            dw1 |= u32::from(back.valuemask) << gen6::DSA_DW1_BACK_TEST_MASK_SHIFT
                | u32::from(back.writemask) << gen6::DSA_DW1_BACK_WRITE_MASK_SHIFT;
        }
    }

    let mut dw2 = 0;
    if dsa.depth_test {
        dw2 |= gen6::DSA_DW2_DEPTH_TEST_ENABLE | (dsa.depth_func as u32) << gen6::DSA_DW2_DEPTH_FUNC_SHIFT;
    }
    if dsa.depth_write {
        dw2 |= gen6::DSA_DW2_DEPTH_WRITE_ENABLE;
    }

    b.state_write(ItemKind::DepthStencil, state_align::DEPTH_STENCIL_STATE, &[dw0, dw1, dw2])
}

pub fn color_calc_state(
    b: &mut Builder,
    stencil_ref: &StencilRef,
    alpha_ref: f32,
    blend_color: &BlendColor,
) -> Result<u32, BuilderError> {
    let [r, g, bl, a] = blend_color.0;
    let dw = [
        u32::from(stencil_ref.front) << gen6::CC_DW0_STENCIL_REF_SHIFT
            | u32::from(stencil_ref.back) << gen6::CC_DW0_BACK_STENCIL_REF_SHIFT
            | gen6::CC_DW0_ALPHATEST_FLOAT32,
        alpha_ref.to_bits(),
        r.to_bits(),
        g.to_bits(),
        bl.to_bits(),
        a.to_bits(),
    ];
    b.state_write(ItemKind::ColorCalc, state_align::COLOR_CALC_STATE, &dw)
}

fn surface_state_write(
    b: &mut Builder,
    dw: &[u32; state_size::SURFACE_STATE],
    target: Option<(BufferId, u32)>,
    write: bool,
) -> Result<u32, BuilderError> {
    let offset = b.state_write(ItemKind::Surface, state_align::SURFACE_STATE, dw)?;
    if let Some((buffer, delta)) = target {
        b.batch_reloc(offset as usize + 4, RelocTarget::Buffer(buffer), delta, write);
    }
    Ok(offset)
}

/// `SURFACE_STATE` for a texture view or a render target.
pub fn surface_state(b: &mut Builder, surface: &SurfaceDesc, render_target: bool) -> Result<u32, BuilderError> {
    let mut dw0 = (surface.kind as u32) << gen6::SURFACE_DW0_TYPE_SHIFT
        | (surface.format << gen6::SURFACE_DW0_FORMAT_SHIFT) & gen6::SURFACE_DW0_FORMAT_MASK;
    if surface.kind == SurfaceType::Cube {
        dw0 |= gen6::SURFACE_DW0_CUBE_FACES_ALL;
    }
    if render_target {
        dw0 |= gen6::SURFACE_DW0_RENDER_CACHE_RW;
    }

    let depth = surface.depth.saturating_sub(1);
    let mut dw3 = depth << gen6::SURFACE_DW3_DEPTH_SHIFT
        | surface.pitch.saturating_sub(1) << gen6::SURFACE_DW3_PITCH_SHIFT;
    if surface.tiled {
        dw3 |= gen6::SURFACE_DW3_TILED;
    }

    let mut dw4 = 0;
    if surface.num_samples > 1 {
        dw4 |= gen6::SURFACE_DW4_MULTISAMPLE_4X;
    }
    if render_target {
        dw4 |= depth << gen6::SURFACE_DW4_RT_EXTENT_SHIFT;
    }

    let dw = [
        dw0,
        0,
        surface.height.saturating_sub(1) << gen6::SURFACE_DW2_HEIGHT_SHIFT
            | surface.width.saturating_sub(1) << gen6::SURFACE_DW2_WIDTH_SHIFT
            | surface.mip_count.saturating_sub(1) << gen6::SURFACE_DW2_MIP_COUNT_SHIFT,
        dw3,
        dw4,
        0,
    ];
    surface_state_write(b, &dw, Some((surface.buffer, surface.offset)), render_target)
}

/// Render target slot with nothing bound.
pub fn null_surface_state(b: &mut Builder, width: u32, height: u32) -> Result<u32, BuilderError> {
    let dw = [
        (SurfaceType::Null as u32) << gen6::SURFACE_DW0_TYPE_SHIFT
            | surface_format::B8G8R8A8_UNORM << gen6::SURFACE_DW0_FORMAT_SHIFT
            | gen6::SURFACE_DW0_RENDER_CACHE_RW,
        0,
        height.saturating_sub(1) << gen6::SURFACE_DW2_HEIGHT_SHIFT
            | width.saturating_sub(1) << gen6::SURFACE_DW2_WIDTH_SHIFT,
        0,
        0,
        0,
    ];
    surface_state_write(b, &dw, None, false)
}

/// A buffer read or written as an array of `stride`-byte structures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferView {
    pub buffer: BufferId,
    pub offset: u32,
    pub size: u32,
    pub stride: u32,
    /// Bytes of the element actually accessed in each structure.
    pub elem_size: u32,
    pub format: u32,
}

impl BufferView {
    /// Structures addressable in the view. A trailing partial structure
    /// still counts when the accessed element fits in it.
    pub fn num_entries(&self) -> u32 {
        if self.stride == 0 {
            return 0;
        }
        let mut count = self.size / self.stride;
        if self.size % self.stride >= self.elem_size {
            count += 1;
        }
        count
    }

    pub fn constant_buffer(buffer: BufferId, offset: u32, size: u32) -> Self {
        Self {
            buffer,
            offset,
            size,
            stride: 16,
            elem_size: 16,
            format: surface_format::R32G32B32A32_FLOAT,
        }
    }

    /// View of one stream-output declaration inside its target buffer.
    pub fn stream_output(target: &StreamOutputTarget, so_info: &StreamOutputInfo, index: usize) -> Option<Self> {
        let decl = so_info.outputs.get(index)?;
        let dst = decl.dst_offset * 4;
        let format = match decl.num_components {
            1 => surface_format::R32_FLOAT,
            2 => surface_format::R32G32_FLOAT,
            3 => surface_format::R32G32B32_FLOAT,
            _ => surface_format::R32G32B32A32_FLOAT,
        };
        Some(Self {
            buffer: target.buffer,
            offset: target.offset + dst,
            size: target.size.saturating_sub(dst),
            stride: so_info.strides.get(decl.buffer).copied().unwrap_or(0) * 4,
            elem_size: decl.num_components * 4,
            format,
        })
    }
}

/// `SURFACE_STATE` of type buffer. The entry count minus one is split over
/// the width (7 bits), height (13 bits) and depth (7 bits) fields.
pub fn buffer_surface_state(b: &mut Builder, view: &BufferView, render_target: bool) -> Result<u32, BuilderError> {
    let n = view.num_entries().saturating_sub(1);
    debug_assert!(n < 1 << 27, "buffer view of {} entries is too large", n + 1);

    let mut dw0 = (SurfaceType::Buffer as u32) << gen6::SURFACE_DW0_TYPE_SHIFT
        | (view.format << gen6::SURFACE_DW0_FORMAT_SHIFT) & gen6::SURFACE_DW0_FORMAT_MASK;
    if render_target {
        dw0 |= gen6::SURFACE_DW0_RENDER_CACHE_RW;
    }
    let dw = [
        dw0,
        0,
        ((n >> 7) & 0x1fff) << gen6::SURFACE_DW2_HEIGHT_SHIFT | (n & 0x7f) << gen6::SURFACE_DW2_WIDTH_SHIFT,
        ((n >> 20) & 0x7f) << gen6::SURFACE_DW3_DEPTH_SHIFT
            | view.stride.saturating_sub(1) << gen6::SURFACE_DW3_PITCH_SHIFT,
        0,
        0,
    ];
    surface_state_write(b, &dw, Some((view.buffer, view.offset)), render_target)
}

/// Array of surface handles. An empty table is not written and yields 0.
pub fn binding_table(b: &mut Builder, surfaces: &[u32]) -> Result<u32, BuilderError> {
    if surfaces.is_empty() {
        return Ok(0);
    }
    b.state_write(ItemKind::BindingTable, state_align::BINDING_TABLE, surfaces)
}

pub fn push_constants(b: &mut Builder, data: &[u32]) -> Result<u32, BuilderError> {
    let unit = gen6::CONSTANT_UNIT_BYTES / 4;
    let mut dw = data.to_vec();
    dw.resize(data.len().div_ceil(unit) * unit, 0);
    b.state_write(ItemKind::PushConstants, state_align::PUSH_CONSTANTS, &dw)
}

fn unorm(v: f32, max: f32) -> u32 {
    (v.clamp(0.0, 1.0) * max).round() as u32
}

fn snorm(v: f32, max: f32) -> u32 {
    (v.clamp(-1.0, 1.0) * max).round() as i32 as u32
}

fn pack2(lo: u32, hi: u32) -> u32 {
    (lo & 0xffff) | (hi & 0xffff) << 16
}

/// `SAMPLER_BORDER_COLOR_STATE`: the border color in every format the
/// sampler may need to return it in.
pub fn border_color_state(b: &mut Builder, sampler: &SamplerDesc) -> Result<u32, BuilderError> {
    let [r, g, bl, a] = sampler.border_color;
    let half = |v: f32| u32::from(f16::from_f32(v).to_bits());
    let snorm8 = |v: f32| snorm(v, 127.0) & 0xff;

    let dw = [
        unorm(r, 255.0) | unorm(g, 255.0) << 8 | unorm(bl, 255.0) << 16 | unorm(a, 255.0) << 24,
        r.to_bits(),
        g.to_bits(),
        bl.to_bits(),
        a.to_bits(),
        pack2(half(r), half(g)),
        pack2(half(bl), half(a)),
        pack2(unorm(r, 65535.0), unorm(g, 65535.0)),
        pack2(unorm(bl, 65535.0), unorm(a, 65535.0)),
        pack2(snorm(r, 32767.0), snorm(g, 32767.0)),
        pack2(snorm(bl, 32767.0), snorm(a, 32767.0)),
        snorm8(r) | snorm8(g) << 8 | snorm8(bl) << 16 | snorm8(a) << 24,
    ];
    b.state_write(ItemKind::BorderColor, state_align::SAMPLER_BORDER_COLOR_STATE, &dw)
}

fn lod_fixed(lod: f32, max: f32) -> u32 {
    (lod.clamp(0.0, max) * 64.0) as u32
}

fn sampler_dwords(sampler: &SamplerDesc, view: &SurfaceDesc, border_color: u32) -> [u32; state_size::SAMPLER_STATE] {
    let bias = ((sampler.lod_bias.clamp(-16.0, 15.984) * 64.0) as i32 as u32) & gen6::SAMPLER_DW0_LOD_BIAS_MASK;
    let mut dw0 = gen6::SAMPLER_DW0_LOD_PRECLAMP
        | (sampler.mip_filter as u32) << gen6::SAMPLER_DW0_MIP_FILTER_SHIFT
        | (sampler.mag_filter as u32) << gen6::SAMPLER_DW0_MAG_FILTER_SHIFT
        | (sampler.min_filter as u32) << gen6::SAMPLER_DW0_MIN_FILTER_SHIFT
        | bias << gen6::SAMPLER_DW0_LOD_BIAS_SHIFT;
    if let Some(func) = sampler.compare {
        dw0 |= (func as u32) << gen6::SAMPLER_DW0_SHADOW_FUNC_SHIFT;
    }

    let mut dw1 = lod_fixed(sampler.min_lod, 13.0) << gen6::SAMPLER_DW1_MIN_LOD_SHIFT
        | lod_fixed(sampler.max_lod, 13.0) << gen6::SAMPLER_DW1_MAX_LOD_SHIFT;
    if view.kind == SurfaceType::Cube {
        let cube = gpe_protocol::gen6::TexCoordMode::Cube as u32;
        dw1 |= gen6::SAMPLER_DW1_CUBE_CTRL_OVERRIDE
            | cube << gen6::SAMPLER_DW1_WRAP_S_SHIFT
            | cube << gen6::SAMPLER_DW1_WRAP_T_SHIFT
            | cube << gen6::SAMPLER_DW1_WRAP_R_SHIFT;
    } else {
        let [s, t, r] = sampler.wrap;
        dw1 |= (s as u32) << gen6::SAMPLER_DW1_WRAP_S_SHIFT
            | (t as u32) << gen6::SAMPLER_DW1_WRAP_T_SHIFT
            | (r as u32) << gen6::SAMPLER_DW1_WRAP_R_SHIFT;
    }

    let mut dw3 = 0;
    if sampler.max_anisotropy > 1 {
        let ratio = (sampler.max_anisotropy.min(16) / 2).max(1) - 1;
        dw3 |= ratio << gen6::SAMPLER_DW3_MAX_ANISO_SHIFT;
    }
    if !sampler.normalized_coords {
        dw3 |= gen6::SAMPLER_DW3_NON_NORMALIZED;
    }

    [dw0, dw1, border_color, dw3]
}

/// `SAMPLER_STATE` array of `count` entries. Slots missing a sampler or a
/// view are disabled. An empty array is not written and yields 0.
pub fn sampler_states(
    b: &mut Builder,
    samplers: &[Option<SamplerDesc>],
    views: &[Option<SurfaceDesc>],
    border_colors: &[u32],
    count: usize,
) -> Result<u32, BuilderError> {
    if count == 0 {
        return Ok(0);
    }

    let mut dw = Vec::with_capacity(count * state_size::SAMPLER_STATE);
    for i in 0..count {
        let sampler = samplers.get(i).copied().flatten();
        let view = views.get(i).copied().flatten();
        match (sampler, view) {
            (Some(sampler), Some(view)) => {
                let border = border_colors.get(i).copied().unwrap_or(0);
                dw.extend_from_slice(&sampler_dwords(&sampler, &view, border));
            }
            _ => dw.extend_from_slice(&[gen6::SAMPLER_DW0_DISABLE, 0, 0, 0]),
        }
    }
    b.state_write(ItemKind::Sampler, state_align::SAMPLER_STATE, &dw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::builder::WriterKind;
    use crate::device::{BuilderConfig, DeviceInfo};
    use crate::state::{AlphaTest, RtBlend};
    use gpe_protocol::gen6::{BlendFactor, CompareFunction};

    fn builder() -> Builder {
        let mut b = Builder::new(
            DeviceInfo::default(),
            Box::new(MemoryBackend::new()),
            &BuilderConfig::default(),
        );
        b.begin().unwrap();
        b
    }

    fn read(b: &Builder, offset: u32, count: usize) -> Vec<u32> {
        (0..count)
            .map(|i| b.read_dw(WriterKind::Batch, offset as usize + i * 4))
            .collect()
    }

    #[test]
    fn state_blocks_are_aligned() {
        let mut b = builder();
        let cc = color_calc_state(&mut b, &StencilRef::default(), 0.0, &BlendColor::default()).unwrap();
        let vp = sf_viewports(&mut b, &[Viewport::from_rect(0.0, 0.0, 8.0, 8.0)]).unwrap();
        let dsa = depth_stencil_state(&mut b, &DepthStencilAlpha::default()).unwrap();
        assert_eq!(cc % 64, 0);
        assert_eq!(vp % 32, 0);
        assert_eq!(dsa % 64, 0);
        assert!(dsa < vp && vp < cc);
    }

    #[test]
    fn scissor_encoding() {
        let mut b = builder();
        let rects = [
            ScissorRect {
                min_x: 4,
                min_y: 8,
                max_x: 20,
                max_y: 40,
            },
            ScissorRect {
                min_x: 10,
                min_y: 0,
                max_x: 10,
                max_y: 5,
            },
        ];
        let off = scissor_rects(&mut b, &rects).unwrap();
        assert_eq!(read(&b, off, 4), vec![8 << 16 | 4, 39 << 16 | 19, 1 << 16 | 1, 0]);
    }

    #[test]
    fn clip_viewport_guardband() {
        let mut b = builder();
        let vp = Viewport::from_rect(0.0, 0.0, 1024.0, 1024.0);
        let off = clip_viewports(&mut b, &[vp]).unwrap();
        let dw = read(&b, off, 4);
        assert_eq!(f32::from_bits(dw[0]), (-8192.0 - 512.0) / 512.0);
        assert_eq!(f32::from_bits(dw[1]), (8192.0 - 512.0) / 512.0);

        let degenerate = Viewport {
            scale: [0.0; 3],
            translate: [0.0; 3],
        };
        let off = clip_viewports(&mut b, &[degenerate]).unwrap();
        let dw = read(&b, off, 4);
        assert_eq!(f32::from_bits(dw[0]), -1.0);
        assert_eq!(f32::from_bits(dw[3]), 1.0);
    }

    #[test]
    fn blend_writes_one_entry_per_target_and_alpha_test() {
        let mut b = builder();
        let mut blend = BlendState::default();
        blend.rt[0] = RtBlend {
            blend_enable: true,
            rgb_src: BlendFactor::SrcAlpha,
            rgb_dst: BlendFactor::InvSrcAlpha,
            colormask: 0x7,
            ..RtBlend::default()
        };
        let dsa = DepthStencilAlpha {
            alpha: Some(AlphaTest {
                func: CompareFunction::Greater,
                reference: 0.5,
            }),
            ..DepthStencilAlpha::default()
        };
        let off = blend_state(&mut b, &blend, &Framebuffer::default(), &dsa).unwrap();
        let dw = read(&b, off, 2);
        assert_ne!(dw[0] & gen6::BLEND_DW0_BLEND_ENABLE, 0);
        assert_ne!(dw[0] & gen6::BLEND_DW0_INDEPENDENT_ALPHA, 0);
        assert_ne!(dw[1] & gen6::BLEND_DW1_ALPHA_TEST_ENABLE, 0);
        assert_eq!(dw[1] & gen6::BLEND_DW1_WRITE_DISABLE_A, gen6::BLEND_DW1_WRITE_DISABLE_A);
        assert_eq!(dw[1] & gen6::BLEND_DW1_WRITE_DISABLE_R, 0);
        assert_eq!(b.stolen(WriterKind::Batch), 64);
    }

    #[test]
    fn buffer_surface_splits_entry_count() {
        let mut b = builder();
        let view = BufferView::constant_buffer(BufferId(7), 64, 16 * 300);
        assert_eq!(view.num_entries(), 300);
        let off = buffer_surface_state(&mut b, &view, false).unwrap();
        let dw = read(&b, off, 6);
        let n = 299;
        assert_eq!(dw[0] >> gen6::SURFACE_DW0_TYPE_SHIFT, SurfaceType::Buffer as u32);
        assert_eq!(dw[1], 64);
        assert_eq!(dw[2], (n >> 7) << 19 | (n & 0x7f) << 6);
        assert_eq!(dw[3], 15 << 3);

        let relocs = b.relocs(WriterKind::Batch);
        assert_eq!(relocs.len(), 1);
        assert_eq!(relocs[0].offset, off as usize + 4);
        assert_eq!(relocs[0].target, RelocTarget::Buffer(BufferId(7)));
        assert!(!relocs[0].write);
    }

    #[test]
    fn partial_trailing_structure_counts_when_element_fits() {
        let view = BufferView {
            buffer: BufferId(1),
            offset: 0,
            size: 100,
            stride: 16,
            elem_size: 4,
            format: surface_format::R32_FLOAT,
        };
        assert_eq!(view.num_entries(), 7);
        let tight = BufferView { elem_size: 8, ..view };
        assert_eq!(tight.num_entries(), 6);
    }

    #[test]
    fn render_target_surface_requests_write_reloc() {
        let mut b = builder();
        let rt = SurfaceDesc::render_target(BufferId(3), 64, 32);
        let off = surface_state(&mut b, &rt, true).unwrap();
        let dw = read(&b, off, 6);
        assert_ne!(dw[0] & gen6::SURFACE_DW0_RENDER_CACHE_RW, 0);
        assert_eq!(dw[2], 31 << 19 | 63 << 6);
        assert_eq!(dw[3], 255 << 3);
        assert!(b.relocs(WriterKind::Batch)[0].write);
    }

    #[test]
    fn border_color_formats() {
        let mut b = builder();
        let sampler = SamplerDesc {
            border_color: [1.0, 0.0, -1.0, 0.5],
            ..SamplerDesc::default()
        };
        let off = border_color_state(&mut b, &sampler).unwrap();
        let dw = read(&b, off, 12);
        assert_eq!(dw[0], 0xff | 128 << 24);
        assert_eq!(f32::from_bits(dw[4]), 0.5);
        assert_eq!(dw[5], 0x3c00);
        assert_eq!(dw[6], 0xbc00 | 0x3800 << 16);
        assert_eq!(dw[7], 0xffff);
        assert_eq!(dw[9], 0x7fff);
        assert_eq!(dw[10], 0x8001 | 0x4000 << 16);
        assert_eq!(dw[11], 0x7f | 0x81 << 16 | 0x40 << 24);
    }

    #[test]
    fn samplers_without_views_are_disabled() {
        let mut b = builder();
        let view = SurfaceDesc::render_target(BufferId(1), 4, 4);
        let off = sampler_states(
            &mut b,
            &[Some(SamplerDesc::default()), Some(SamplerDesc::default())],
            &[Some(view), None],
            &[0x40, 0x80],
            2,
        )
        .unwrap();
        let dw = read(&b, off, 8);
        assert_eq!(dw[0] & gen6::SAMPLER_DW0_DISABLE, 0);
        assert_eq!(dw[2], 0x40);
        assert_eq!(dw[4], gen6::SAMPLER_DW0_DISABLE);
        assert_eq!(sampler_states(&mut b, &[], &[], &[], 0).unwrap(), 0);
    }

    #[test]
    fn push_constants_pad_to_units() {
        let mut b = builder();
        let off = push_constants(&mut b, &[1, 2, 3]).unwrap();
        assert_eq!(read(&b, off, 8), vec![1, 2, 3, 0, 0, 0, 0, 0]);
        assert_eq!(b.stolen(WriterKind::Batch), 32);
    }
}
