//! 3D and MI packet encoders.

use gpe_protocol::gen6::{
    self, Command, DepthFormat, IndexFormat, PipeControl, SurfaceType, Topology, VfComponent,
};

use crate::backend::BufferId;
use crate::builder::{Builder, ItemKind, RelocTarget, WriterKind};
use crate::error::BuilderError;
use crate::state::{
    DepthStencilSurface, DrawInfo, IndexBufferBinding, KernelParams, PolyStipple, RasterizerState,
    VertexBufferBinding, VertexElement,
};

fn write(b: &mut Builder, dw: &[u32]) -> Result<usize, BuilderError> {
    b.batch_write(ItemKind::Command, dw)
}

/// A kernel already uploaded to the instruction writer.
#[derive(Debug, Clone, Copy)]
pub struct KernelRef<'a> {
    /// Offset from the instruction base.
    pub offset: u32,
    pub params: &'a KernelParams,
}

impl KernelRef<'_> {
    /// URB read length in pairs of vec4s, at least one.
    fn urb_read_len(&self) -> u32 {
        self.params.input_count.div_ceil(2).max(1)
    }
}

pub fn pipe_control(
    b: &mut Builder,
    flags: PipeControl,
    target: Option<(BufferId, u32)>,
) -> Result<(), BuilderError> {
    debug_assert!(
        target.is_some() || flags.post_sync_op() == 0,
        "post-sync write without a destination"
    );
    let pos = write(b, &[Command::PipeControl.dw0(5), flags.bits(), 0, 0, 0])?;
    if let Some((buffer, offset)) = target {
        b.batch_reloc(
            pos + 8,
            RelocTarget::Buffer(buffer),
            offset | gen6::PIPE_CONTROL_DW2_GLOBAL_GTT,
            true,
        );
    }
    Ok(())
}

pub fn pipeline_select_3d(b: &mut Builder) -> Result<(), BuilderError> {
    write(b, &[Command::PipelineSelect.dw0(1) | gen6::PIPELINE_SELECT_3D])?;
    Ok(())
}

pub fn state_sip(b: &mut Builder, sip: u32) -> Result<(), BuilderError> {
    write(b, &[Command::StateSip.dw0(2), sip])?;
    Ok(())
}

pub fn vf_statistics(b: &mut Builder, enable: bool) -> Result<(), BuilderError> {
    write(b, &[Command::VfStatistics.dw0(1) | u32::from(enable)])?;
    Ok(())
}

pub fn binding_table_pointers(b: &mut Builder, vs: u32, gs: u32, ps: u32) -> Result<(), BuilderError> {
    let dw0 = Command::BindingTablePointers.dw0(4)
        | gen6::STAGE_PTR_DW0_VS_CHANGED
        | gen6::STAGE_PTR_DW0_GS_CHANGED
        | gen6::STAGE_PTR_DW0_PS_CHANGED;
    write(b, &[dw0, vs, gs, ps])?;
    Ok(())
}

pub fn sampler_state_pointers(b: &mut Builder, vs: u32, gs: u32, ps: u32) -> Result<(), BuilderError> {
    let dw0 = Command::SamplerStatePointers.dw0(4)
        | gen6::STAGE_PTR_DW0_VS_CHANGED
        | gen6::STAGE_PTR_DW0_GS_CHANGED
        | gen6::STAGE_PTR_DW0_PS_CHANGED;
    write(b, &[dw0, vs, gs, ps])?;
    Ok(())
}

pub fn viewport_state_pointers(b: &mut Builder, clip: u32, sf: u32, cc: u32) -> Result<(), BuilderError> {
    let dw0 = Command::ViewportStatePointers.dw0(4)
        | gen6::VIEWPORT_PTR_DW0_CLIP_CHANGED
        | gen6::VIEWPORT_PTR_DW0_SF_CHANGED
        | gen6::VIEWPORT_PTR_DW0_CC_CHANGED;
    write(b, &[dw0, clip, sf, cc])?;
    Ok(())
}

pub fn cc_state_pointers(b: &mut Builder, blend: u32, dsa: u32, cc: u32) -> Result<(), BuilderError> {
    write(
        b,
        &[
            Command::CcStatePointers.dw0(4),
            blend | gen6::CC_PTR_MODIFY,
            dsa | gen6::CC_PTR_MODIFY,
            cc | gen6::CC_PTR_MODIFY,
        ],
    )?;
    Ok(())
}

pub fn scissor_state_pointers(b: &mut Builder, rects: u32) -> Result<(), BuilderError> {
    write(b, &[Command::ScissorStatePointers.dw0(2), rects])?;
    Ok(())
}

/// URB entry counts for a VS and GS sharing `vs_total` and `gs_total` bytes.
/// Entry sizes are in bytes; a zero GS entry size leaves the GS without
/// entries.
pub fn urb_entries(vs_total: u32, gs_total: u32, vs_entry_size: u32, gs_entry_size: u32) -> [(u32, u32); 2] {
    let row = gen6::URB_ROW_BYTES;
    let vs_alloc = vs_entry_size.div_ceil(row).max(1);
    let gs_alloc = gs_entry_size.div_ceil(row).max(1);
    debug_assert!(vs_alloc <= gen6::URB_MAX_ENTRY_ROWS && gs_alloc <= gen6::URB_MAX_ENTRY_ROWS);

    let vs_entries = ((vs_total / row / vs_alloc) & !3).min(gen6::URB_MAX_ENTRIES);
    let gs_entries = if gs_entry_size > 0 {
        ((gs_total / row / gs_alloc) & !3).min(gen6::URB_MAX_ENTRIES)
    } else {
        0
    };
    debug_assert!(vs_entries >= gen6::URB_MIN_VS_ENTRIES, "URB too small for the VS");

    [(vs_alloc, vs_entries), (gs_alloc, gs_entries)]
}

pub fn urb(
    b: &mut Builder,
    vs_total: u32,
    gs_total: u32,
    vs_entry_size: u32,
    gs_entry_size: u32,
) -> Result<(), BuilderError> {
    let [(vs_alloc, vs_entries), (gs_alloc, gs_entries)] =
        urb_entries(vs_total, gs_total, vs_entry_size, gs_entry_size);
    write(
        b,
        &[
            Command::Urb.dw0(3),
            (vs_alloc - 1) << gen6::URB_DW1_VS_ENTRY_SIZE_SHIFT
                | vs_entries << gen6::URB_DW1_VS_ENTRY_COUNT_SHIFT,
            gs_entries << gen6::URB_DW2_GS_ENTRY_COUNT_SHIFT
                | (gs_alloc - 1) << gen6::URB_DW2_GS_ENTRY_SIZE_SHIFT,
        ],
    )?;
    Ok(())
}

/// A vertex buffer as the fetcher addresses it; either an application
/// buffer or data stolen from the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexBufferRef {
    pub target: RelocTarget,
    pub offset: u32,
    pub size: u32,
    pub stride: u32,
    pub instance_divisor: u32,
}

impl From<&VertexBufferBinding> for VertexBufferRef {
    fn from(vb: &VertexBufferBinding) -> Self {
        Self {
            target: RelocTarget::Buffer(vb.buffer),
            offset: vb.offset,
            size: vb.size,
            stride: vb.stride,
            instance_divisor: vb.instance_divisor,
        }
    }
}

/// `3DSTATE_VERTEX_BUFFERS`. Unbound or empty slots are programmed as null
/// buffers. Writes nothing when `buffers` is empty.
pub fn vertex_buffers(b: &mut Builder, buffers: &[Option<VertexBufferRef>]) -> Result<(), BuilderError> {
    if buffers.is_empty() {
        return Ok(());
    }
    debug_assert!(buffers.len() <= gen6::MAX_VERTEX_BUFFERS);

    let len = 1 + 4 * buffers.len();
    let mut dw = Vec::with_capacity(len);
    dw.push(Command::VertexBuffers.dw0(len));
    for (i, vb) in buffers.iter().enumerate() {
        let index = (i as u32) << gen6::VB_DW0_INDEX_SHIFT;
        match vb {
            Some(vb) if vb.size > 0 => {
                let mut dw0 = index | (vb.stride & gen6::VB_DW0_PITCH_MASK);
                if vb.instance_divisor > 0 {
                    dw0 |= gen6::VB_DW0_INSTANCEDATA;
                }
                dw.extend_from_slice(&[dw0, 0, 0, vb.instance_divisor]);
            }
            _ => dw.extend_from_slice(&[index | gen6::VB_DW0_NULL, 0, 0, 0]),
        }
    }

    let pos = write(b, &dw)?;
    for (i, vb) in buffers.iter().enumerate() {
        if let Some(vb) = vb.filter(|vb| vb.size > 0) {
            let entry = pos + 4 + i * 16;
            b.batch_reloc(entry + 4, vb.target, vb.offset, false);
            b.batch_reloc(entry + 8, vb.target, vb.offset + vb.size - 1, false);
        }
    }
    Ok(())
}

fn components(c: [VfComponent; 4]) -> u32 {
    (c[0] as u32) << gen6::VE_DW1_COMP0_SHIFT
        | (c[1] as u32) << gen6::VE_DW1_COMP1_SHIFT
        | (c[2] as u32) << gen6::VE_DW1_COMP2_SHIFT
        | (c[3] as u32) << gen6::VE_DW1_COMP3_SHIFT
}

/// `3DSTATE_VERTEX_ELEMENTS`.
///
/// With `prepend_ids`, an element carrying the vertex and instance ids in
/// its Z and W channels is inserted first. With `last_edge_flag`, the last
/// element feeds the edge flag instead of a VUE slot. An empty layout is
/// replaced by a single element storing (0, 0, 0, 1).
pub fn vertex_elements(
    b: &mut Builder,
    elements: &[VertexElement],
    prepend_ids: bool,
    last_edge_flag: bool,
) -> Result<(), BuilderError> {
    let count = elements.len() + usize::from(prepend_ids);
    debug_assert!(count <= gen6::MAX_VERTEX_ELEMENTS);

    let mut dw = Vec::with_capacity(1 + 2 * count.max(1));
    dw.push(Command::VertexElements.dw0(1 + 2 * count.max(1)));

    if count == 0 {
        dw.push(gen6::VE_DW0_VALID | gen6::surface_format::R32G32B32A32_FLOAT << gen6::VE_DW0_FORMAT_SHIFT);
        dw.push(components([
            VfComponent::Store0,
            VfComponent::Store0,
            VfComponent::Store0,
            VfComponent::Store1Fp,
        ]));
        write(b, &dw)?;
        return Ok(());
    }

    if prepend_ids {
        dw.push(gen6::VE_DW0_VALID);
        dw.push(components([
            VfComponent::Store0,
            VfComponent::Store0,
            VfComponent::StoreVid,
            VfComponent::StoreIid,
        ]));
    }

    for (i, ve) in elements.iter().enumerate() {
        let mut dw0 = ve.buffer_index << gen6::VE_DW0_VB_INDEX_SHIFT
            | gen6::VE_DW0_VALID
            | ve.format << gen6::VE_DW0_FORMAT_SHIFT
            | (ve.src_offset & gen6::VE_DW0_SRC_OFFSET_MASK);
        let mut comps = ve.components;
        if last_edge_flag && i + 1 == elements.len() {
            dw0 |= gen6::VE_DW0_EDGE_FLAG;
            comps = [
                VfComponent::StoreSrc,
                VfComponent::NoStore,
                VfComponent::NoStore,
                VfComponent::NoStore,
            ];
        }
        dw.push(dw0);
        dw.push(components(comps));
    }

    write(b, &dw)?;
    Ok(())
}

/// `3DSTATE_INDEX_BUFFER`. The end address is inclusive.
pub fn index_buffer(b: &mut Builder, ib: &IndexBufferBinding, enable_cut: bool) -> Result<(), BuilderError> {
    let format = IndexFormat::from_index_size(ib.index_size).unwrap_or(IndexFormat::Dword);
    let mut dw0 = Command::IndexBuffer.dw0(3) | (format as u32) << gen6::IB_DW0_FORMAT_SHIFT;
    if enable_cut {
        dw0 |= gen6::IB_DW0_CUT_INDEX_ENABLE;
    }

    let pos = write(b, &[dw0, 0, 0])?;
    let target = RelocTarget::Buffer(ib.buffer);
    b.batch_reloc(pos + 4, target, ib.offset, false);
    b.batch_reloc(pos + 8, target, ib.offset + ib.size.saturating_sub(1), false);
    Ok(())
}

/// `3DSTATE_CONSTANT_{VS,GS,PS}` with at most one push constant buffer of
/// `size` bytes at `offset` from the dynamic state base.
pub fn constant(b: &mut Builder, command: Command, buffer: Option<(u32, u32)>) -> Result<(), BuilderError> {
    debug_assert!(matches!(
        command,
        Command::ConstantVs | Command::ConstantGs | Command::ConstantPs
    ));

    let mut dw = [command.dw0(5), 0, 0, 0, 0];
    if let Some((offset, size)) = buffer.filter(|&(_, size)| size > 0) {
        let units = (size as usize).div_ceil(gen6::CONSTANT_UNIT_BYTES) as u32;
        debug_assert!(units - 1 <= gen6::CONSTANT_READ_LENGTH_MASK);
        dw[0] |= 1 << gen6::CONSTANT_DW0_BUFFER_ENABLE_SHIFT;
        dw[1] = offset | ((units - 1) & gen6::CONSTANT_READ_LENGTH_MASK);
    }
    write(b, &dw)?;
    Ok(())
}

pub fn vs(
    b: &mut Builder,
    kernel: Option<KernelRef<'_>>,
    num_samplers: u32,
    max_threads: u32,
) -> Result<(), BuilderError> {
    let dw = match kernel {
        Some(k) => [
            Command::Vs.dw0(6),
            k.offset,
            num_samplers.div_ceil(4) << gen6::VS_DW2_SAMPLER_COUNT_SHIFT,
            0,
            k.params.dispatch_grf << gen6::VS_DW4_DISPATCH_GRF_SHIFT
                | k.urb_read_len() << gen6::VS_DW4_URB_READ_LEN_SHIFT,
            (max_threads - 1) << gen6::VS_DW5_MAX_THREADS_SHIFT
                | gen6::VS_DW5_STATISTICS
                | gen6::VS_DW5_ENABLE,
        ],
        None => [Command::Vs.dw0(6), 0, 0, 0, 0, 0],
    };
    write(b, &dw)?;
    Ok(())
}

/// `3DSTATE_GS`. Without a geometry kernel, the vertex kernel's
/// stream-output program for `verts_per_prim` runs instead, if it has one.
pub fn gs(
    b: &mut Builder,
    gs: Option<KernelRef<'_>>,
    vs: Option<KernelRef<'_>>,
    verts_per_prim: u32,
    max_threads: u32,
) -> Result<(), BuilderError> {
    let so_program = vs.and_then(|vs| {
        let offsets = vs.params.so_gs_offsets?;
        let index = verts_per_prim.clamp(1, 3) as usize - 1;
        Some(KernelRef {
            offset: vs.offset + offsets[index],
            params: vs.params,
        })
    });

    let dw = match (gs, so_program) {
        (Some(k), _) => [
            Command::Gs.dw0(7),
            k.offset,
            0,
            0,
            k.urb_read_len() << gen6::GS_DW4_URB_READ_LEN_SHIFT
                | k.params.dispatch_grf << gen6::GS_DW4_DISPATCH_GRF_SHIFT,
            (max_threads - 1) << gen6::GS_DW5_MAX_THREADS_SHIFT
                | gen6::GS_DW5_STATISTICS
                | gen6::GS_DW5_RENDER_ENABLE,
            gen6::GS_DW6_ENABLE,
        ],
        (None, Some(k)) => [
            Command::Gs.dw0(7),
            k.offset,
            0,
            0,
            k.urb_read_len() << gen6::GS_DW4_URB_READ_LEN_SHIFT
                | k.params.dispatch_grf << gen6::GS_DW4_DISPATCH_GRF_SHIFT,
            (max_threads - 1) << gen6::GS_DW5_MAX_THREADS_SHIFT
                | gen6::GS_DW5_STATISTICS
                | gen6::GS_DW5_SO_STATISTICS
                | gen6::GS_DW5_RENDER_ENABLE,
            gen6::GS_DW6_SVBI_PAYLOAD_ENABLE | gen6::GS_DW6_ENABLE,
        ],
        (None, None) => [
            Command::Gs.dw0(7),
            0,
            0,
            0,
            1 << gen6::GS_DW4_URB_READ_LEN_SHIFT,
            (max_threads - 1) << gen6::GS_DW5_MAX_THREADS_SHIFT | gen6::GS_DW5_STATISTICS,
            0,
        ],
    };
    write(b, &dw)?;
    Ok(())
}

/// Provoking vertex selects for triangles, lines and triangle fans.
fn provoking_vertex(rs: &RasterizerState) -> (u32, u32, u32) {
    if rs.flatshade_first {
        (0, 0, 1)
    } else {
        (2, 1, 2)
    }
}

pub fn clip(
    b: &mut Builder,
    rs: Option<&RasterizerState>,
    fs: Option<&KernelParams>,
    guardband: bool,
    num_viewports: u32,
) -> Result<(), BuilderError> {
    let Some(rs) = rs else {
        write(b, &[Command::Clip.dw0(4), 0, 0, 0])?;
        return Ok(());
    };

    let (tri, line, fan) = provoking_vertex(rs);
    let mut dw2 = gen6::CLIP_DW2_ENABLE
        | gen6::CLIP_DW2_XY_TEST_ENABLE
        | u32::from(rs.clip_plane_enable) << gen6::CLIP_DW2_UCP_ENABLES_SHIFT
        | tri << gen6::CLIP_DW2_TRI_PROVOKE_SHIFT
        | line << gen6::CLIP_DW2_LINE_PROVOKE_SHIFT
        | fan << gen6::CLIP_DW2_TRIFAN_PROVOKE_SHIFT;
    if rs.depth_clip {
        dw2 |= gen6::CLIP_DW2_Z_TEST_ENABLE;
    }
    if guardband {
        dw2 |= gen6::CLIP_DW2_GB_TEST_ENABLE;
    }
    if fs.is_some_and(|fs| fs.input_count > 0) {
        dw2 |= gen6::CLIP_DW2_NONPERSPECTIVE_BARYCENTRIC;
    }

    // point widths in U8.3
    let dw3 = 0x1 << gen6::CLIP_DW3_MIN_POINT_WIDTH_SHIFT
        | 0x7ff << gen6::CLIP_DW3_MAX_POINT_WIDTH_SHIFT
        | (num_viewports.max(1) - 1) & gen6::CLIP_DW3_MAX_VP_INDEX_MASK;

    write(b, &[Command::Clip.dw0(4), gen6::CLIP_DW1_STATISTICS, dw2, dw3])?;
    Ok(())
}

fn fixed(v: f32, frac_bits: u32, max: u32) -> u32 {
    ((v.max(0.0) * (1 << frac_bits) as f32).round() as u32).min(max)
}

pub fn sf(b: &mut Builder, rs: Option<&RasterizerState>, fs: Option<&KernelParams>) -> Result<(), BuilderError> {
    let mut dw = [0u32; 20];
    dw[0] = Command::Sf.dw0(20);

    let outputs = fs.map_or(0, |fs| fs.input_count);
    dw[1] = outputs << gen6::SF_DW1_NUM_OUTPUTS_SHIFT
        | outputs.div_ceil(2).max(1) << gen6::SF_DW1_URB_READ_LEN_SHIFT
        | 1 << gen6::SF_DW1_URB_READ_OFFSET_SHIFT;

    let Some(rs) = rs else {
        write(b, &dw)?;
        return Ok(());
    };

    dw[2] = gen6::SF_DW2_STATISTICS
        | gen6::SF_DW2_VIEWPORT_TRANSFORM
        | (rs.fill_front as u32) << gen6::SF_DW2_FRONT_FILL_SHIFT
        | (rs.fill_back as u32) << gen6::SF_DW2_BACK_FILL_SHIFT;
    if rs.offset_tri {
        dw[2] |= gen6::SF_DW2_DEPTH_OFFSET_SOLID;
    }
    if rs.offset_line {
        dw[2] |= gen6::SF_DW2_DEPTH_OFFSET_WIREFRAME;
    }
    if rs.offset_point {
        dw[2] |= gen6::SF_DW2_DEPTH_OFFSET_POINT;
    }
    if rs.front_ccw {
        dw[2] |= gen6::SF_DW2_FRONT_WINDING_CCW;
    }

    // line width in U3.7
    dw[3] = (rs.cull as u32) << gen6::SF_DW3_CULL_SHIFT
        | fixed(rs.line_width, 7, 0x3ff) << gen6::SF_DW3_LINE_WIDTH_SHIFT;
    if rs.line_smooth {
        dw[3] |= gen6::SF_DW3_ANTIALIAS;
    }
    if rs.scissor {
        dw[3] |= gen6::SF_DW3_SCISSOR_ENABLE;
    }
    if rs.multisample {
        dw[3] |= gen6::SF_DW3_MSRAST_ON_PATTERN;
    }

    let (tri, line, fan) = provoking_vertex(rs);
    dw[4] = tri << gen6::SF_DW4_TRI_PROVOKE_SHIFT
        | line << gen6::SF_DW4_LINE_PROVOKE_SHIFT
        | fan << gen6::SF_DW4_TRIFAN_PROVOKE_SHIFT;
    if rs.line_last_pixel {
        dw[4] |= gen6::SF_DW4_LAST_PIXEL;
    }
    if !rs.point_size_per_vertex {
        dw[4] |= gen6::SF_DW4_USE_POINT_WIDTH | fixed(rs.point_size, 3, gen6::SF_DW4_POINT_WIDTH_MASK);
    }

    // the hardware offset unit is twice the API one
    dw[5] = (rs.offset_units * 2.0).to_bits();
    dw[6] = rs.offset_scale.to_bits();
    dw[7] = rs.offset_clamp.to_bits();

    write(b, &dw)?;
    Ok(())
}

/// Operation the WM performs on the depth buffer instead of shading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HizOp {
    DepthClear,
    DepthResolve,
    HizResolve,
}

impl HizOp {
    fn bits(self) -> u32 {
        match self {
            HizOp::DepthClear => gen6::WM_DW4_DEPTH_CLEAR,
            HizOp::DepthResolve => gen6::WM_DW4_DEPTH_RESOLVE,
            HizOp::HizResolve => gen6::WM_DW4_HIZ_RESOLVE,
        }
    }
}

/// Inputs of `3DSTATE_WM` beyond the kernel.
#[derive(Debug, Clone, Copy, Default)]
pub struct WmSetup {
    pub num_samplers: u32,
    pub dual_blend: bool,
    /// Alpha test or alpha-to-coverage may discard pixels.
    pub cc_may_kill: bool,
    pub poly_stipple: bool,
    pub line_stipple: bool,
    pub multisample: bool,
    pub hiz_op: Option<HizOp>,
}

pub fn wm(
    b: &mut Builder,
    fs: Option<KernelRef<'_>>,
    setup: &WmSetup,
    max_threads: u32,
) -> Result<(), BuilderError> {
    let mut dw = [0u32; 9];
    dw[0] = Command::Wm.dw0(9);
    dw[4] = setup.hiz_op.map_or(0, HizOp::bits);
    dw[5] = (max_threads - 1) << gen6::WM_DW5_MAX_THREADS_SHIFT;

    let Some(k) = fs else {
        write(b, &dw)?;
        return Ok(());
    };

    dw[1] = k.offset;
    dw[2] = setup.num_samplers.div_ceil(4) << gen6::WM_DW2_SAMPLER_COUNT_SHIFT;
    dw[4] |= gen6::WM_DW4_STATISTICS | k.params.dispatch_grf << gen6::WM_DW4_DISPATCH_GRF_SHIFT;

    dw[5] |= gen6::WM_DW5_PS_ENABLE | gen6::WM_DW5_8_PIXEL_DISPATCH;
    if k.params.dispatch_16 {
        dw[5] |= gen6::WM_DW5_16_PIXEL_DISPATCH;
    }
    if k.params.uses_kill || setup.cc_may_kill {
        dw[5] |= gen6::WM_DW5_PS_KILL;
    }
    if k.params.computes_depth {
        dw[5] |= gen6::WM_DW5_PS_COMPUTE_DEPTH;
    }
    if k.params.uses_source_depth {
        dw[5] |= gen6::WM_DW5_PS_USE_DEPTH;
    }
    if setup.poly_stipple {
        dw[5] |= gen6::WM_DW5_POLY_STIPPLE;
    }
    if setup.line_stipple {
        dw[5] |= gen6::WM_DW5_LINE_STIPPLE;
    }
    if setup.dual_blend {
        dw[5] |= gen6::WM_DW5_DUAL_SOURCE_BLEND;
    }

    dw[6] = k.params.input_count << gen6::WM_DW6_SF_OUTPUTS_SHIFT | gen6::WM_DW6_BARYCENTRIC_PERSPECTIVE_PIXEL;
    if setup.multisample {
        dw[6] |= gen6::WM_DW6_MSRAST_ON_PATTERN;
    }

    write(b, &dw)?;
    Ok(())
}

pub fn sample_mask(b: &mut Builder, mask: u32) -> Result<(), BuilderError> {
    write(b, &[Command::SampleMask.dw0(2), mask & 0xf])?;
    Ok(())
}

pub fn multisample(b: &mut Builder, num_samples: u32, pixel_center: bool) -> Result<(), BuilderError> {
    let (count, positions) = if num_samples > 1 {
        (gen6::MULTISAMPLE_DW1_NUMSAMPLES_4, gen6::SAMPLE_POSITION_4X)
    } else {
        (gen6::MULTISAMPLE_DW1_NUMSAMPLES_1, gen6::SAMPLE_POSITION_1X)
    };
    let center = if pixel_center {
        gen6::MULTISAMPLE_DW1_CENTER
    } else {
        gen6::MULTISAMPLE_DW1_UPPER_LEFT
    };
    write(b, &[Command::Multisample.dw0(3), center | count, positions])?;
    Ok(())
}

pub fn drawing_rectangle(b: &mut Builder, x: u32, y: u32, width: u32, height: u32) -> Result<(), BuilderError> {
    let x_max = (x + width).saturating_sub(1);
    let y_max = (y + height).saturating_sub(1);
    write(
        b,
        &[
            Command::DrawingRectangle.dw0(4),
            (y & 0xffff) << 16 | (x & 0xffff),
            (y_max & 0xffff) << 16 | (x_max & 0xffff),
            0,
        ],
    )?;
    Ok(())
}

pub fn depth_buffer(b: &mut Builder, zs: Option<&DepthStencilSurface>) -> Result<(), BuilderError> {
    let Some(zs) = zs else {
        let dw1 = (SurfaceType::Null as u32) << gen6::DEPTH_DW1_TYPE_SHIFT
            | (DepthFormat::D32Float as u32) << gen6::DEPTH_DW1_FORMAT_SHIFT;
        write(b, &[Command::DepthBuffer.dw0(7), dw1, 0, 0, 0, 0, 0])?;
        return Ok(());
    };

    let mut dw1 = (SurfaceType::Surface2d as u32) << gen6::DEPTH_DW1_TYPE_SHIFT
        | (zs.format as u32) << gen6::DEPTH_DW1_FORMAT_SHIFT
        | zs.pitch.saturating_sub(1);
    if zs.tiled {
        dw1 |= gen6::DEPTH_DW1_TILED | gen6::DEPTH_DW1_TILE_WALK_Y;
    }
    if zs.hiz.is_some() {
        dw1 |= gen6::DEPTH_DW1_HIZ_ENABLE | gen6::DEPTH_DW1_SEPARATE_STENCIL;
    }
    let dw3 = zs.height.saturating_sub(1) << gen6::DEPTH_DW3_HEIGHT_SHIFT
        | zs.width.saturating_sub(1) << gen6::DEPTH_DW3_WIDTH_SHIFT;

    let pos = write(b, &[Command::DepthBuffer.dw0(7), dw1, 0, dw3, 0, 0, 0])?;
    b.batch_reloc(pos + 8, RelocTarget::Buffer(zs.buffer), zs.offset, true);
    Ok(())
}

fn aux_buffer(b: &mut Builder, command: Command, aux: Option<(BufferId, u32)>) -> Result<(), BuilderError> {
    match aux {
        Some((buffer, pitch)) => {
            let pos = write(b, &[command.dw0(3), pitch.saturating_sub(1), 0])?;
            b.batch_reloc(pos + 8, RelocTarget::Buffer(buffer), 0, true);
        }
        None => {
            write(b, &[command.dw0(3), 0, 0])?;
        }
    }
    Ok(())
}

pub fn hier_depth_buffer(b: &mut Builder, zs: Option<&DepthStencilSurface>) -> Result<(), BuilderError> {
    aux_buffer(b, Command::HierDepthBuffer, zs.and_then(|zs| zs.hiz))
}

pub fn stencil_buffer(b: &mut Builder, zs: Option<&DepthStencilSurface>) -> Result<(), BuilderError> {
    aux_buffer(b, Command::StencilBuffer, zs.and_then(|zs| zs.stencil))
}

pub fn clear_params(b: &mut Builder, value: u32) -> Result<(), BuilderError> {
    write(b, &[Command::ClearParams.dw0(2) | gen6::CLEAR_PARAMS_DW0_VALID, value])?;
    Ok(())
}

pub fn poly_stipple_pattern(b: &mut Builder, pattern: &PolyStipple) -> Result<(), BuilderError> {
    let mut dw = Vec::with_capacity(1 + gen6::MAX_POLY_STIPPLE_ROWS);
    dw.push(Command::PolyStipplePattern.dw0(1 + gen6::MAX_POLY_STIPPLE_ROWS));
    dw.extend_from_slice(&pattern.0);
    write(b, &dw)?;
    Ok(())
}

pub fn poly_stipple_offset(b: &mut Builder, x: u32, y: u32) -> Result<(), BuilderError> {
    write(b, &[Command::PolyStippleOffset.dw0(2), (x & 0x1f) << 8 | (y & 0x1f)])?;
    Ok(())
}

/// `3DSTATE_LINE_STIPPLE`. `factor` is the repeat count minus one.
pub fn line_stipple(b: &mut Builder, pattern: u16, factor: u16) -> Result<(), BuilderError> {
    let repeat = u32::from(factor) + 1;
    // inverse repeat count in U1.13
    let inverse = (8192 + repeat / 2) / repeat;
    write(
        b,
        &[
            Command::LineStipple.dw0(3),
            u32::from(pattern),
            inverse << 16 | repeat,
        ],
    )?;
    Ok(())
}

pub fn aa_line_parameters(b: &mut Builder) -> Result<(), BuilderError> {
    write(b, &[Command::AaLineParameters.dw0(3), 0, 0])?;
    Ok(())
}

pub fn gs_svb_index(
    b: &mut Builder,
    index: u32,
    svbi: u32,
    max_svbi: u32,
    load_internal: bool,
) -> Result<(), BuilderError> {
    debug_assert!(index < 4);
    write(
        b,
        &[
            Command::GsSvbIndex.dw0(4),
            index << gen6::GS_SVBI_DW1_INDEX_SHIFT | u32::from(load_internal),
            svbi,
            max_svbi,
        ],
    )?;
    Ok(())
}

/// `3DPRIMITIVE`. Indexed draws and rectangle lists use random access.
pub fn primitive(b: &mut Builder, topology: Topology, draw: &DrawInfo) -> Result<(), BuilderError> {
    let mut dw0 = Command::Primitive.dw0(6) | (topology as u32) << gen6::PRIMITIVE_DW0_TOPOLOGY_SHIFT;
    if draw.indexed || topology == Topology::RectList {
        dw0 |= gen6::PRIMITIVE_DW0_RANDOM_ACCESS;
    }
    write(
        b,
        &[
            dw0,
            draw.count,
            draw.start,
            draw.instance_count,
            draw.start_instance,
            draw.index_bias as u32,
        ],
    )?;
    Ok(())
}

pub fn store_register_mem(b: &mut Builder, reg: u32, buffer: BufferId, offset: u32) -> Result<(), BuilderError> {
    let pos = write(
        b,
        &[Command::MiStoreRegisterMem.dw0(3) | gen6::MI_USE_GGTT, reg, 0],
    )?;
    b.batch_reloc(pos + 8, RelocTarget::Buffer(buffer), offset, true);
    Ok(())
}

pub fn store_data_imm(b: &mut Builder, buffer: BufferId, offset: u32, value: u64) -> Result<(), BuilderError> {
    let pos = write(
        b,
        &[
            Command::MiStoreDataImm.dw0(5) | gen6::MI_USE_GGTT,
            0,
            0,
            value as u32,
            (value >> 32) as u32,
        ],
    )?;
    b.batch_reloc(pos + 8, RelocTarget::Buffer(buffer), offset, true);
    Ok(())
}

/// Start of the batch as the batch writer sees it; rectangle-list vertex
/// data lives there.
pub fn batch_target() -> RelocTarget {
    RelocTarget::Writer(WriterKind::Batch)
}
