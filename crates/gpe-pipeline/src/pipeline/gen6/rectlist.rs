//! Rectangle-list operations on the depth buffer.
//!
//! These run outside the normal draw path: every unit except the WM is
//! disabled and the WM performs the HiZ operation instead of shading. The
//! packets bypass the cache, so the caller invalidates the hardware context
//! afterwards.

use gpe_protocol::gen6::{surface_format, Command, Topology, VfComponent};

use crate::builder::{Builder, ItemKind};
use crate::emit::commands::{self as cmd, VertexBufferRef, WmSetup};
use crate::emit::dynamic;
use crate::error::BuilderError;
use crate::state::{DrawInfo, PrimitiveMode, VertexElement};

use super::super::estimate::{RECTLIST_VERTEX_ALIGN, RECTLIST_VERTEX_BYTES};
use super::super::{RectlistInfo, RectlistUses};
use super::Gen6Pipeline;

const RECTLIST_VERTEX_STRIDE: u32 = 2 * 4;

/// Handles of the state blocks one rectangle uses; 0 when unused.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(super) struct RectlistHandles {
    depth_stencil: u32,
    color_calc: u32,
    cc_viewport: u32,
    vertices: u32,
}

fn rectlist_elements() -> [VertexElement; 2] {
    let zero = [VfComponent::Store0; 4];
    [
        // VUE header.
        VertexElement::new(0, 0, surface_format::R32G32_FLOAT).with_components(zero),
        VertexElement::new(0, 0, surface_format::R32G32_FLOAT).with_components([
            VfComponent::StoreSrc,
            VfComponent::StoreSrc,
            VfComponent::Store0,
            VfComponent::Store1Fp,
        ]),
    ]
}

impl Gen6Pipeline {
    pub(super) fn emit_rectlist_states(
        &mut self,
        b: &mut Builder,
        info: &RectlistInfo,
    ) -> Result<RectlistHandles, BuilderError> {
        let mut handles = RectlistHandles::default();

        if info.uses.contains(RectlistUses::DSA) {
            handles.depth_stencil = dynamic::depth_stencil_state(b, &info.dsa)?;
        }
        if info.uses.contains(RectlistUses::CC) {
            handles.color_calc = dynamic::color_calc_state(b, &info.stencil_ref, info.alpha_ref, &info.blend_color)?;
        }
        if info.uses.contains(RectlistUses::VIEWPORT) {
            handles.cc_viewport = dynamic::cc_viewports(b, &[info.viewport])?;
        }

        let dw: Vec<u32> = info.vertices.iter().flatten().map(|v| v.to_bits()).collect();
        handles.vertices = b.state_write(ItemKind::Blob, RECTLIST_VERTEX_ALIGN, &dw)?;

        Ok(handles)
    }

    pub(super) fn emit_rectlist_commands(
        &mut self,
        b: &mut Builder,
        info: &RectlistInfo,
        handles: &RectlistHandles,
    ) -> Result<(), BuilderError> {
        self.wa_post_sync(b, false)?;

        self.wa_multisample_flush(b)?;
        cmd::multisample(b, info.num_samples, true)?;
        cmd::sample_mask(b, (1u32 << info.num_samples.min(31)) - 1)?;

        b.state_base_address(true)?;

        let vb = VertexBufferRef {
            target: cmd::batch_target(),
            offset: handles.vertices,
            size: RECTLIST_VERTEX_BYTES,
            stride: RECTLIST_VERTEX_STRIDE,
            instance_divisor: 0,
        };
        cmd::vertex_buffers(b, &[Some(vb)])?;
        cmd::vertex_elements(b, &rectlist_elements(), false, false)?;

        cmd::urb(b, self.device.urb_size, 0, 2 * 16, 0)?;
        if self.cache.gs_active {
            self.emit_full_flush(b)?;
            self.cache.gs_active = false;
        }

        if info.uses.intersects(RectlistUses::DSA | RectlistUses::CC) {
            cmd::cc_state_pointers(b, 0, handles.depth_stencil, handles.color_calc)?;
        }

        cmd::constant(b, Command::ConstantVs, None)?;
        cmd::vs(b, None, 0, self.device.max_vs_threads)?;
        self.wa_vs_const_flush(b)?;
        cmd::constant(b, Command::ConstantGs, None)?;
        cmd::gs(b, None, None, 0, self.device.max_gs_threads)?;
        cmd::clip(b, None, None, false, 0)?;
        cmd::sf(b, None, None)?;

        cmd::constant(b, Command::ConstantPs, None)?;
        self.wa_max_threads_stall(b)?;
        let setup = WmSetup {
            hiz_op: Some(info.op.hiz_op()),
            ..WmSetup::default()
        };
        cmd::wm(b, None, &setup, self.device.max_wm_threads)?;

        if info.uses.contains(RectlistUses::VIEWPORT) {
            cmd::viewport_state_pointers(b, 0, 0, handles.cc_viewport)?;
        }

        self.wa_depth_flush(b)?;
        let zs = info.zs.as_ref();
        if info.uses.intersects(RectlistUses::FB_DEPTH | RectlistUses::FB_STENCIL) {
            cmd::depth_buffer(b, zs)?;
        }
        if info.uses.contains(RectlistUses::FB_DEPTH) {
            cmd::hier_depth_buffer(b, zs)?;
        }
        if info.uses.contains(RectlistUses::FB_STENCIL) {
            cmd::stencil_buffer(b, zs)?;
        }
        cmd::clear_params(b, info.depth_clear_value)?;

        cmd::drawing_rectangle(b, 0, 0, info.width, info.height)?;
        cmd::primitive(b, Topology::RectList, &DrawInfo::arrays(PrimitiveMode::Triangles, 0, 3))?;
        self.cache.post_sync_emitted = false;
        Ok(())
    }
}
