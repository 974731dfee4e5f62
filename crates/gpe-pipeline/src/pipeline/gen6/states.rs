//! State pass: re-encodes dirty state blocks and records their handles.

use crate::builder::Builder;
use crate::emit::dynamic::{self, BufferView};
use crate::error::BuilderError;
use crate::state::{
    ConstantBuffer, DirtyFlags, PipelineState, ShaderStage, MAX_CONST_BUFFERS, MAX_DRAW_BUFFERS,
    MAX_SAMPLER_VIEWS,
};

use super::super::cache::MAX_SURFACES;
use super::super::session::{Session, SessionFlags};
use super::Gen6Pipeline;

/// Binding table layout. The VS table holds constant buffers then views;
/// the GS table holds stream-output targets; the WM table holds render
/// targets, constant buffers, then views.
pub(crate) const VS_CONST_BASE: usize = 0;
pub(crate) const VS_TEX_BASE: usize = VS_CONST_BASE + MAX_CONST_BUFFERS;
pub(crate) const GS_SO_BASE: usize = 0;
pub(crate) const WM_DRAW_BASE: usize = 0;
pub(crate) const WM_CONST_BASE: usize = WM_DRAW_BASE + MAX_DRAW_BUFFERS;
pub(crate) const WM_TEX_BASE: usize = WM_CONST_BASE + MAX_CONST_BUFFERS;

fn const_base(stage: ShaderStage) -> Option<usize> {
    match stage {
        ShaderStage::Vertex => Some(VS_CONST_BASE),
        ShaderStage::Geometry => None,
        ShaderStage::Fragment => Some(WM_CONST_BASE),
    }
}

fn tex_base(stage: ShaderStage) -> Option<usize> {
    match stage {
        ShaderStage::Vertex => Some(VS_TEX_BASE),
        ShaderStage::Geometry => None,
        ShaderStage::Fragment => Some(WM_TEX_BASE),
    }
}

/// Push constant contents: constant buffer 0 cut or zero-padded to
/// `cbuf0_size` bytes, then `ucp` cut or zero-padded to `ucp_size` bytes.
fn push_constant_dwords(cbuf0: Option<&ConstantBuffer>, cbuf0_size: u32, ucp: &[u32], ucp_size: u32) -> Vec<u32> {
    let cbuf0_dw = cbuf0_size.div_ceil(4) as usize;
    let ucp_dw = ucp_size.div_ceil(4) as usize;
    let mut dw = Vec::with_capacity(cbuf0_dw + ucp_dw);

    if cbuf0_dw > 0 {
        if let Some(ConstantBuffer::User(data)) = cbuf0 {
            dw.extend(data.iter().take(cbuf0_dw));
        }
        dw.resize(cbuf0_dw, 0);
    }
    if ucp_dw > 0 {
        dw.extend(ucp.iter().take(ucp_dw));
        dw.resize(cbuf0_dw + ucp_dw, 0);
    }
    dw
}

impl Gen6Pipeline {
    pub(super) fn emit_states(
        &mut self,
        b: &mut Builder,
        state: &PipelineState,
        session: &mut Session,
    ) -> Result<(), BuilderError> {
        self.state_viewports(b, state, session)?;
        self.state_cc(b, state, session)?;
        self.state_scissors(b, state, session)?;
        self.state_pcb(b, state, session)?;

        // Surfaces go out together to keep alignment padding down.
        self.state_surfaces_rt(b, state, session)?;
        self.state_surfaces_so(b, state, session)?;
        for stage in ShaderStage::ALL {
            self.state_surfaces_view(b, state, stage, session)?;
            self.state_surfaces_const(b, state, stage, session)?;
        }

        for stage in ShaderStage::ALL {
            self.state_samplers(b, state, stage, session)?;
            // Needs every SURFACE_STATE of the stage in place.
            self.state_binding_table(b, stage, session)?;
        }
        Ok(())
    }

    fn state_viewports(&mut self, b: &mut Builder, state: &PipelineState, session: &mut Session) -> Result<(), BuilderError> {
        if session.dirty(DirtyFlags::VIEWPORT) {
            let viewports = state.viewports();
            self.cache.clip_viewport = dynamic::clip_viewports(b, viewports)?;
            self.cache.sf_viewport = dynamic::sf_viewports(b, viewports)?;
            self.cache.cc_viewport = dynamic::cc_viewports(b, viewports)?;
            session.mark(SessionFlags::VIEWPORT);
        }
        Ok(())
    }

    fn state_cc(&mut self, b: &mut Builder, state: &PipelineState, session: &mut Session) -> Result<(), BuilderError> {
        if session.dirty(DirtyFlags::BLEND | DirtyFlags::FB | DirtyFlags::DSA) {
            self.cache.blend = dynamic::blend_state(b, &state.blend, &state.framebuffer, &state.dsa)?;
            session.mark(SessionFlags::CC_BLEND);
        }

        if session.dirty(DirtyFlags::DSA | DirtyFlags::STENCIL_REF | DirtyFlags::BLEND_COLOR) {
            self.cache.color_calc =
                dynamic::color_calc_state(b, &state.stencil_ref, state.dsa.alpha_ref(), &state.blend_color)?;
            session.mark(SessionFlags::CC_CC);
        }

        if session.dirty(DirtyFlags::DSA) {
            self.cache.depth_stencil = dynamic::depth_stencil_state(b, &state.dsa)?;
            session.mark(SessionFlags::CC_DSA);
        }
        Ok(())
    }

    fn state_scissors(&mut self, b: &mut Builder, state: &PipelineState, session: &mut Session) -> Result<(), BuilderError> {
        if session.dirty(DirtyFlags::SCISSOR | DirtyFlags::VIEWPORT) {
            let rects: Vec<_> = (0..state.viewports().len()).map(|i| state.scissor(i)).collect();
            self.cache.scissor_rect = dynamic::scissor_rects(b, &rects)?;
            session.mark(SessionFlags::SCISSOR);
        }
        Ok(())
    }

    fn state_pcb(&mut self, b: &mut Builder, state: &PipelineState, session: &mut Session) -> Result<(), BuilderError> {
        if session.dirty(DirtyFlags::VS | DirtyFlags::CBUF | DirtyFlags::CLIP) {
            let (cbuf0_size, ucp_size) = state
                .vs
                .as_ref()
                .map_or((0, 0), |vs| (vs.params.pcb_cbuf0_size, vs.params.pcb_ucp_size));
            let cbuf0 = state.stage(ShaderStage::Vertex).cbufs.first().and_then(Option::as_ref);
            let ucp = state.clip.to_dwords();
            self.update_pcb(b, ShaderStage::Vertex, cbuf0, cbuf0_size, &ucp, ucp_size, session)?;
        }

        if session.dirty(DirtyFlags::FS | DirtyFlags::CBUF) {
            let cbuf0_size = state.fs.as_ref().map_or(0, |fs| fs.params.pcb_cbuf0_size);
            let cbuf0 = state.stage(ShaderStage::Fragment).cbufs.first().and_then(Option::as_ref);
            self.update_pcb(b, ShaderStage::Fragment, cbuf0, cbuf0_size, &[], 0, session)?;
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn update_pcb(
        &mut self,
        b: &mut Builder,
        stage: ShaderStage,
        cbuf0: Option<&ConstantBuffer>,
        cbuf0_size: u32,
        ucp: &[u32],
        ucp_size: u32,
        session: &mut Session,
    ) -> Result<(), BuilderError> {
        let total = cbuf0_size + ucp_size;
        let handles = &mut self.cache.stages[stage.index()];

        if total > 0 {
            let dw = push_constant_dwords(cbuf0, cbuf0_size, ucp, ucp_size);
            handles.push_constants = dynamic::push_constants(b, &dw)?;
            handles.push_constants_size = total;
            session.mark(SessionFlags::push_constants(stage));
        } else if handles.push_constants_size > 0 {
            handles.push_constants = 0;
            handles.push_constants_size = 0;
            session.mark(SessionFlags::push_constants(stage));
        }
        Ok(())
    }

    fn state_surfaces_rt(&mut self, b: &mut Builder, state: &PipelineState, session: &mut Session) -> Result<(), BuilderError> {
        if !session.dirty(DirtyFlags::FB) {
            return Ok(());
        }

        let fb = &state.framebuffer;
        let slots = &mut self.cache.stages[ShaderStage::Fragment.index()].surfaces
            [WM_DRAW_BASE..WM_DRAW_BASE + MAX_DRAW_BUFFERS];

        let count = if fb.cbufs.is_empty() {
            // The render cache needs a target even when nothing is bound.
            slots[0] = dynamic::null_surface_state(b, fb.width, fb.height)?;
            1
        } else {
            for (slot, cbuf) in slots.iter_mut().zip(&fb.cbufs) {
                *slot = match cbuf {
                    Some(surface) => dynamic::surface_state(b, surface, true)?,
                    None => dynamic::null_surface_state(b, fb.width, fb.height)?,
                };
            }
            fb.cbufs.len()
        };
        slots[count..].fill(0);

        session.grow_num_surfaces(ShaderStage::Fragment, WM_DRAW_BASE + count);
        session.mark(SessionFlags::BT_FS);
        Ok(())
    }

    fn state_surfaces_so(&mut self, b: &mut Builder, state: &PipelineState, session: &mut Session) -> Result<(), BuilderError> {
        if !session.dirty(DirtyFlags::VS | DirtyFlags::GS | DirtyFlags::SO) {
            return Ok(());
        }

        let slots = &mut self.cache.stages[ShaderStage::Geometry.index()].surfaces[GS_SO_BASE..];
        let mut count = 0;

        if let Some(so_info) = state.so_info() {
            count = so_info.outputs.len().min(slots.len());
            for (i, (slot, decl)) in slots.iter_mut().zip(&so_info.outputs).enumerate() {
                let target = state.so_targets.get(decl.buffer).copied().flatten();
                let view = target.and_then(|t| BufferView::stream_output(&t, so_info, i));
                *slot = match view {
                    Some(view) => dynamic::buffer_surface_state(b, &view, true)?,
                    None => 0,
                };
            }
        }
        slots[count..].fill(0);

        if count > 0 {
            session.grow_num_surfaces(ShaderStage::Geometry, GS_SO_BASE + count);
        }
        session.mark(SessionFlags::BT_GS);
        Ok(())
    }

    fn state_surfaces_view(
        &mut self,
        b: &mut Builder,
        state: &PipelineState,
        stage: ShaderStage,
        session: &mut Session,
    ) -> Result<(), BuilderError> {
        let Some(base) = tex_base(stage) else {
            return Ok(());
        };
        if !session.dirty(stage.view_dirty()) {
            return Ok(());
        }

        let views = &state.stage(stage).views;
        let slots = &mut self.cache.stages[stage.index()].surfaces[base..base + MAX_SAMPLER_VIEWS];
        for (slot, view) in slots.iter_mut().zip(views) {
            *slot = match view {
                Some(view) => dynamic::surface_state(b, view, false)?,
                None => 0,
            };
        }
        let count = views.len().min(MAX_SAMPLER_VIEWS);
        slots[count..].fill(0);

        if count > 0 {
            session.grow_num_surfaces(stage, base + count);
        }
        session.mark(SessionFlags::binding_table(stage));
        Ok(())
    }

    fn state_surfaces_const(
        &mut self,
        b: &mut Builder,
        state: &PipelineState,
        stage: ShaderStage,
        session: &mut Session,
    ) -> Result<(), BuilderError> {
        let Some(base) = const_base(stage) else {
            return Ok(());
        };
        if !session.dirty(DirtyFlags::CBUF) {
            return Ok(());
        }

        let resources = state.stage(stage);
        let slots = &mut self.cache.stages[stage.index()].surfaces[base..base + MAX_CONST_BUFFERS];

        // Pushed constants need no surface.
        if resources.cbufs_pushed_only() {
            if slots.iter().any(|&s| s != 0) {
                slots.fill(0);
                session.mark(SessionFlags::binding_table(stage));
            }
            return Ok(());
        }

        let count = resources.cbuf_slot_count().min(MAX_CONST_BUFFERS);
        for (slot, cbuf) in slots.iter_mut().zip(&resources.cbufs).take(count) {
            *slot = match cbuf {
                Some(ConstantBuffer::Resource { buffer, offset, size }) => {
                    let view = BufferView::constant_buffer(*buffer, *offset, *size);
                    dynamic::buffer_surface_state(b, &view, false)?
                }
                _ => 0,
            };
        }
        slots[count..].fill(0);

        if count > 0 {
            session.grow_num_surfaces(stage, base + count);
        }
        session.mark(SessionFlags::binding_table(stage));
        Ok(())
    }

    fn state_samplers(
        &mut self,
        b: &mut Builder,
        state: &PipelineState,
        stage: ShaderStage,
        session: &mut Session,
    ) -> Result<(), BuilderError> {
        if stage == ShaderStage::Geometry || !session.dirty(stage.sampler_dirty() | stage.view_dirty()) {
            return Ok(());
        }

        let resources = state.stage(stage);
        let handles = &mut self.cache.stages[stage.index()];

        if session.dirty(stage.sampler_dirty()) {
            for (slot, sampler) in handles.border_colors.iter_mut().zip(&resources.samplers) {
                *slot = match sampler {
                    Some(sampler) => dynamic::border_color_state(b, sampler)?,
                    None => 0,
                };
            }
        }

        let count = resources.samplers.len().min(resources.views.len());
        let sampler_state =
            dynamic::sampler_states(b, &resources.samplers, &resources.views, &handles.border_colors, count)?;

        // No samplers before or after leaves the pointer as it was.
        if sampler_state != 0 || handles.sampler_state != 0 {
            handles.sampler_state = sampler_state;
            session.mark(SessionFlags::sampler(stage));
        }
        Ok(())
    }

    /// Trailing slots this session did not touch may still hold surfaces
    /// from earlier draws, so the table only shrinks past slots that are
    /// actually empty.
    fn state_binding_table(&mut self, b: &mut Builder, stage: ShaderStage, session: &mut Session) -> Result<(), BuilderError> {
        if !session.changed(SessionFlags::binding_table(stage)) {
            return Ok(());
        }

        let handles = &mut self.cache.stages[stage.index()];
        let num_surfaces = session.num_surfaces[stage.index()].min(MAX_SURFACES);

        let mut size = handles.binding_table_size;
        while size > num_surfaces && handles.surfaces[size - 1] == 0 {
            size -= 1;
        }
        let size = size.max(num_surfaces);

        handles.binding_table = dynamic::binding_table(b, &handles.surfaces[..size])?;
        handles.binding_table_size = size;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn push_constants_pad_and_cut() {
        let cbuf = ConstantBuffer::user(vec![1, 2, 3]);
        assert_eq!(push_constant_dwords(Some(&cbuf), 20, &[], 0), [1, 2, 3, 0, 0]);
        assert_eq!(push_constant_dwords(Some(&cbuf), 8, &[9, 9, 9], 8), [1, 2, 9, 9]);
        assert_eq!(push_constant_dwords(None, 4, &[7], 8), [0, 7, 0]);
        assert!(push_constant_dwords(None, 0, &[], 0).is_empty());
    }

    #[test]
    fn resource_backed_cbuf0_pushes_zeros() {
        let cbuf = ConstantBuffer::Resource {
            buffer: crate::backend::BufferId(1),
            offset: 0,
            size: 64,
        };
        assert_eq!(push_constant_dwords(Some(&cbuf), 8, &[], 0), [0, 0]);
        let shared: Arc<[u32]> = Arc::from(vec![5u32; 4]);
        assert_eq!(push_constant_dwords(Some(&ConstantBuffer::User(shared)), 8, &[], 0), [5, 5]);
    }

    #[test]
    fn binding_table_layout() {
        assert_eq!((VS_CONST_BASE, VS_TEX_BASE), (0, 16));
        assert_eq!((WM_DRAW_BASE, WM_CONST_BASE, WM_TEX_BASE), (0, 8, 24));
        assert!(WM_TEX_BASE + MAX_SAMPLER_VIEWS <= MAX_SURFACES);
    }
}
