//! Upper bounds on the batch bytes each pipeline action consumes.
//!
//! Commands are counted at their largest encoding. State blocks are counted
//! at their size plus their alignment, since stealing from the top of the
//! batch may waste up to that much.

use gpe_protocol::gen6::{state_align, state_size, Command, CONSTANT_UNIT_BYTES, PIPELINE_STATISTICS_REGS};

use crate::state::{PipelineState, ShaderStage};

use super::{RectlistInfo, RectlistUses};

/// PIPE_CONTROLs a draw can emit: two for the post-sync workaround, one
/// each for the multisample, VS constant and max-threads workarounds, three
/// for the depth flush and one full flush when the GS loses the URB.
const DRAW_PIPE_CONTROLS: usize = 9;

/// The rectangle list shares the draw's workaround set.
const RECTLIST_PIPE_CONTROLS: usize = 9;

/// Three vertices of two floats.
pub(crate) const RECTLIST_VERTEX_BYTES: u32 = 3 * 2 * 4;
pub(crate) const RECTLIST_VERTEX_ALIGN: usize = 32;

fn block(dwords: usize, align: usize) -> usize {
    dwords * 4 + align
}

fn commands(list: &[Command]) -> usize {
    list.iter().map(|c| c.size_bytes()).sum()
}

fn pipe_controls(n: usize) -> usize {
    n * Command::PipeControl.size_bytes()
}

/// Every command a draw may write, each at most once apart from the
/// constant, SVBI and PIPE_CONTROL packets.
pub fn draw_commands() -> usize {
    use Command::*;

    let once = commands(&[
        PipelineSelect,
        StateSip,
        VfStatistics,
        StateBaseAddress,
        ViewportStatePointers,
        Urb,
        CcStatePointers,
        SamplerStatePointers,
        Multisample,
        SampleMask,
        Vs,
        Gs,
        Clip,
        Sf,
        Wm,
        ScissorStatePointers,
        BindingTablePointers,
        DepthBuffer,
        HierDepthBuffer,
        StencilBuffer,
        ClearParams,
        PolyStipplePattern,
        PolyStippleOffset,
        LineStipple,
        AaLineParameters,
        DrawingRectangle,
        IndexBuffer,
        VertexBuffers,
        VertexElements,
        Primitive,
    ]);

    once + 3 * ConstantVs.size_bytes() + 4 * GsSvbIndex.size_bytes() + pipe_controls(DRAW_PIPE_CONTROLS)
}

/// Constant buffer 0 and the clip planes are each padded to whole dwords
/// before the block is padded to constant units.
fn push_constants(cbuf0_size: u32, ucp_size: u32) -> usize {
    let bytes = (cbuf0_size.div_ceil(4) + ucp_size.div_ceil(4)) as usize * 4;
    if bytes == 0 {
        return 0;
    }
    bytes.div_ceil(CONSTANT_UNIT_BYTES) * CONSTANT_UNIT_BYTES + state_align::PUSH_CONSTANTS
}

/// Every state block a draw of `state` may write.
pub fn draw_states(state: &PipelineState) -> usize {
    let fb = state.framebuffer();
    let num_vp = state.viewports().len().max(1);

    let mut size = block(state_size::BLEND_STATE * fb.nr_cbufs().max(1), state_align::BLEND_STATE)
        + block(state_size::DEPTH_STENCIL_STATE, state_align::DEPTH_STENCIL_STATE)
        + block(state_size::COLOR_CALC_STATE, state_align::COLOR_CALC_STATE)
        + block(state_size::SF_VIEWPORT * num_vp, state_align::SF_VIEWPORT)
        + block(state_size::CLIP_VIEWPORT * num_vp, state_align::CLIP_VIEWPORT)
        + block(state_size::CC_VIEWPORT * num_vp, state_align::CC_VIEWPORT)
        + block(state_size::SCISSOR_RECT * num_vp, state_align::SCISSOR_RECT);

    let surface = block(state_size::SURFACE_STATE, state_align::SURFACE_STATE);
    let border_color = block(state_size::SAMPLER_BORDER_COLOR_STATE, state_align::SAMPLER_BORDER_COLOR_STATE);

    for stage in ShaderStage::ALL {
        let resources = state.stage(stage);
        let num_surfaces = match stage {
            ShaderStage::Vertex => resources.views.len() + resources.cbuf_slot_count(),
            ShaderStage::Geometry => state.so_info().map_or(0, |so| so.outputs.len()),
            ShaderStage::Fragment => {
                resources.views.len() + resources.cbuf_slot_count() + fb.nr_cbufs().max(1)
            }
        };
        size += num_surfaces * surface;
        size += block(super::MAX_SURFACES * state_size::BINDING_TABLE_ENTRY, state_align::BINDING_TABLE);

        let n = resources.samplers.len();
        if stage != ShaderStage::Geometry && n > 0 {
            size += block(state_size::SAMPLER_STATE * n, state_align::SAMPLER_STATE);
            size += n * border_color;
        }

        let (cbuf0, ucp) = state.shader(stage).map_or((0, 0), |k| match stage {
            ShaderStage::Vertex => (k.params.pcb_cbuf0_size, k.params.pcb_ucp_size),
            ShaderStage::Geometry => (0, 0),
            ShaderStage::Fragment => (k.params.pcb_cbuf0_size, 0),
        });
        size += push_constants(cbuf0, ucp);
    }

    size
}

pub fn flush() -> usize {
    pipe_controls(3)
}

pub fn write_timestamp() -> usize {
    pipe_controls(2)
}

pub fn write_depth_count() -> usize {
    pipe_controls(3)
}

pub fn write_statistics() -> usize {
    let stores: usize = PIPELINE_STATISTICS_REGS
        .iter()
        .map(|reg| match reg {
            Some(_) => 2 * Command::MiStoreRegisterMem.size_bytes(),
            None => Command::MiStoreDataImm.size_bytes(),
        })
        .sum();
    pipe_controls(3) + stores
}

pub fn rectlist(info: &RectlistInfo) -> usize {
    use Command::*;

    let mut size = pipe_controls(RECTLIST_PIPE_CONTROLS)
        + commands(&[
            Multisample,
            SampleMask,
            StateBaseAddress,
            VertexBuffers,
            VertexElements,
            Urb,
            CcStatePointers,
            ConstantVs,
            Vs,
            ConstantGs,
            Gs,
            Clip,
            Sf,
            ConstantPs,
            Wm,
            ViewportStatePointers,
            DepthBuffer,
            HierDepthBuffer,
            StencilBuffer,
            ClearParams,
            DrawingRectangle,
            Primitive,
        ])
        + RECTLIST_VERTEX_BYTES as usize
        + RECTLIST_VERTEX_ALIGN;

    if info.uses.contains(RectlistUses::DSA) {
        size += block(state_size::DEPTH_STENCIL_STATE, state_align::DEPTH_STENCIL_STATE);
    }
    if info.uses.contains(RectlistUses::CC) {
        size += block(state_size::COLOR_CALC_STATE, state_align::COLOR_CALC_STATE);
    }
    if info.uses.contains(RectlistUses::VIEWPORT) {
        size += block(state_size::CC_VIEWPORT, state_align::CC_VIEWPORT);
    }
    size
}
