//! Command pass.
//!
//! Each step checks its own dirty bits and session flags and writes the
//! packets that depend on them. The order of the steps follows the order
//! the hardware wants the packets in; later steps reference handles the
//! state pass left in the cache.

use std::sync::Arc;

use tracing::debug;

use gpe_protocol::gen6::{Command, SVBI_UNBOUNDED};

use crate::builder::Builder;
use crate::emit::commands::{self as cmd, KernelRef, VertexBufferRef, WmSetup};
use crate::error::BuilderError;
use crate::kernel_cache::KernelCache;
use crate::state::{DirtyFlags, DrawInfo, PipelineState, ShaderStage, StreamOutputInfo, StreamOutputTarget};

use super::super::session::{Session, SessionFlags};
use super::Gen6Pipeline;

const URB_VEC4_BYTES: u32 = 16;

/// Vertices that fit in the stream-output targets before any of them
/// overflows. A declaration whose target is unbound disables output.
fn so_max_vertices(so_info: Option<&StreamOutputInfo>, targets: &[Option<StreamOutputTarget>]) -> u32 {
    let Some(so_info) = so_info else {
        return 0;
    };

    let mut max = SVBI_UNBOUNDED;
    for decl in &so_info.outputs {
        let Some(target) = targets.get(decl.buffer).copied().flatten() else {
            return 0;
        };

        let stride = so_info.strides.get(decl.buffer).copied().unwrap_or(0) * 4;
        let elem = decl.num_components * 4;
        let size = target.size.saturating_sub(decl.dst_offset * 4);
        let count = if stride == 0 {
            0
        } else {
            size / stride + u32::from(size % stride >= elem)
        };
        max = max.min(count);
    }
    max
}

fn kernel<'a>(kernels: &KernelCache, state: &'a PipelineState, stage: ShaderStage) -> Option<KernelRef<'a>> {
    kernels.resolve(state.shader(stage).map(Arc::as_ref))
}

impl Gen6Pipeline {
    pub(super) fn emit_commands(
        &mut self,
        b: &mut Builder,
        state: &PipelineState,
        draw: &DrawInfo,
        kernels: &KernelCache,
        session: &mut Session,
    ) -> Result<(), BuilderError> {
        // Non-pipelined state first.
        self.cmd_select(b, session)?;
        self.cmd_gs_svbi(b, state, session)?;
        self.cmd_sip(b, session)?;
        self.cmd_vf_statistics(b, session)?;
        self.cmd_base_address(b, session)?;
        self.cmd_pointers_1(b, session)?;
        self.cmd_urb(b, state, session)?;
        self.cmd_pointers_2(b, session)?;
        self.cmd_wm_multisample(b, state, session)?;

        // Pipelined state.
        self.cmd_vs(b, state, kernels, session)?;
        self.cmd_gs(b, state, kernels, session)?;
        self.cmd_clip(b, state, session)?;
        self.cmd_sf(b, state, session)?;
        self.cmd_wm(b, state, kernels, session)?;
        self.cmd_pointers_3(b, session)?;
        self.cmd_wm_depth(b, state, session)?;
        self.cmd_wm_raster(b, state, session)?;
        self.cmd_sf_rect(b, state, session)?;
        self.cmd_vf(b, state, draw, session)?;

        cmd::primitive(b, draw.mode.topology(), draw)?;
        self.cache.post_sync_emitted = false;
        Ok(())
    }

    fn cmd_select(&mut self, b: &mut Builder, session: &Session) -> Result<(), BuilderError> {
        if session.hw_ctx_changed {
            // PIPELINE_SELECT implies a depth flush.
            self.wa_post_sync(b, false)?;
            cmd::pipeline_select_3d(b)?;
        }
        Ok(())
    }

    fn cmd_gs_svbi(&mut self, b: &mut Builder, state: &PipelineState, session: &Session) -> Result<(), BuilderError> {
        if !session.dirty(DirtyFlags::VS | DirtyFlags::GS | DirtyFlags::SO) {
            return Ok(());
        }

        let max = so_max_vertices(state.so_info(), state.stream_output_targets());
        // A new hardware context starts with its own indices.
        if max != self.cache.so_max_vertices || session.hw_ctx_changed {
            self.cache.so_max_vertices = max;

            // 3DSTATE_GS_SVB_INDEX is non-pipelined.
            self.wa_post_sync(b, false)?;
            cmd::gs_svb_index(b, 0, self.cache.so_num_vertices, max, false)?;

            if session.hw_ctx_changed {
                for index in 1..4 {
                    cmd::gs_svb_index(b, index, 0, SVBI_UNBOUNDED, false)?;
                }
            }
        }
        Ok(())
    }

    fn cmd_sip(&mut self, b: &mut Builder, session: &Session) -> Result<(), BuilderError> {
        if session.hw_ctx_changed {
            self.wa_post_sync(b, false)?;
            cmd::state_sip(b, 0)?;
        }
        Ok(())
    }

    fn cmd_vf_statistics(&mut self, b: &mut Builder, session: &Session) -> Result<(), BuilderError> {
        if session.hw_ctx_changed {
            cmd::vf_statistics(b, false)?;
        }
        Ok(())
    }

    fn cmd_base_address(&mut self, b: &mut Builder, session: &mut Session) -> Result<(), BuilderError> {
        if session.base_address_changed() {
            self.wa_post_sync(b, false)?;
            b.state_base_address(session.hw_ctx_changed)?;

            // Every pointer is relative to the bases just sent.
            session.mark(SessionFlags::BASE_RELATIVE);
        }
        Ok(())
    }

    fn cmd_pointers_1(&mut self, b: &mut Builder, session: &Session) -> Result<(), BuilderError> {
        if session.changed(SessionFlags::VIEWPORT) {
            let c = &self.cache;
            cmd::viewport_state_pointers(b, c.clip_viewport, c.sf_viewport, c.cc_viewport)?;
        }
        Ok(())
    }

    fn cmd_urb(&mut self, b: &mut Builder, state: &PipelineState, session: &Session) -> Result<(), BuilderError> {
        if !session.dirty(DirtyFlags::VE | DirtyFlags::VS | DirtyFlags::GS) {
            return Ok(());
        }

        let gs_active = state.gs_active();
        let vs = state.shader(ShaderStage::Vertex).map(|k| &k.params);

        let prepend = vs.is_some_and(|p| p.uses_vertex_id || p.uses_instance_id);
        let ve_count = (state.vertex_elements().len() + usize::from(prepend)).max(1) as u32;
        let vs_entry = vs.map_or(0, |p| p.output_count).max(ve_count);
        let gs_entry = match state.shader(ShaderStage::Geometry) {
            Some(gs) => gs.params.output_count,
            None if gs_active => vs_entry,
            None => 0,
        };

        let (vs_total, gs_total) = if gs_active {
            let half = self.device.urb_size / 2;
            (half, half)
        } else {
            (self.device.urb_size, 0)
        };
        cmd::urb(b, vs_total, gs_total, vs_entry * URB_VEC4_BYTES, gs_entry * URB_VEC4_BYTES)?;

        // The GS may still be writing to entries the VS now owns.
        if self.cache.gs_active && !gs_active {
            debug!("URB taken back from the GS, flushing");
            self.emit_full_flush(b)?;
        }
        self.cache.gs_active = gs_active;
        Ok(())
    }

    fn cmd_pointers_2(&mut self, b: &mut Builder, session: &Session) -> Result<(), BuilderError> {
        let c = &self.cache;
        if session.changed(SessionFlags::CC) {
            cmd::cc_state_pointers(b, c.blend, c.depth_stencil, c.color_calc)?;
        }
        if session.changed(SessionFlags::SAMPLERS) {
            let [vs, _, fs] = &c.stages;
            cmd::sampler_state_pointers(b, vs.sampler_state, 0, fs.sampler_state)?;
        }
        Ok(())
    }

    fn cmd_wm_multisample(&mut self, b: &mut Builder, state: &PipelineState, session: &Session) -> Result<(), BuilderError> {
        if !session.dirty(DirtyFlags::SAMPLE_MASK | DirtyFlags::FB) {
            return Ok(());
        }

        self.wa_post_sync(b, false)?;
        self.wa_multisample_flush(b)?;

        let num_samples = state.framebuffer().num_samples;
        cmd::multisample(b, num_samples, state.rasterizer().half_pixel_center)?;
        let mask = if num_samples > 1 { state.sample_mask } else { 1 };
        cmd::sample_mask(b, mask)
    }

    fn cmd_vs(
        &mut self,
        b: &mut Builder,
        state: &PipelineState,
        kernels: &KernelCache,
        session: &Session,
    ) -> Result<(), BuilderError> {
        let emit_vs = session.dirty(DirtyFlags::VS | DirtyFlags::SAMPLER_VS) || session.kernel_bo_changed;
        let emit_pcb = session.changed(SessionFlags::PCB_VS);

        // A VS change may flush the state cache.
        if emit_vs {
            self.wa_post_sync(b, false)?;
        }

        if emit_pcb {
            let h = &self.cache.stages[ShaderStage::Vertex.index()];
            cmd::constant(b, Command::ConstantVs, Some((h.push_constants, h.push_constants_size)))?;
        }

        if emit_vs {
            let kernel = kernel(kernels, state, ShaderStage::Vertex);
            let num_samplers = state.stage(ShaderStage::Vertex).samplers.len() as u32;
            cmd::vs(b, kernel, num_samplers, self.device.max_vs_threads)?;
        }

        if emit_pcb {
            self.wa_vs_const_flush(b)?;
        }
        Ok(())
    }

    fn cmd_gs(
        &mut self,
        b: &mut Builder,
        state: &PipelineState,
        kernels: &KernelCache,
        session: &Session,
    ) -> Result<(), BuilderError> {
        if session.changed(SessionFlags::PCB_GS) {
            cmd::constant(b, Command::ConstantGs, None)?;
        }

        if session.dirty(DirtyFlags::GS | DirtyFlags::VS) || session.prim_changed || session.kernel_bo_changed {
            let gs = kernel(kernels, state, ShaderStage::Geometry);
            let vs = kernel(kernels, state, ShaderStage::Vertex);
            cmd::gs(b, gs, vs, session.reduced_prim.vertices(), self.device.max_gs_threads)?;
        }
        Ok(())
    }

    fn cmd_clip(&mut self, b: &mut Builder, state: &PipelineState, session: &Session) -> Result<(), BuilderError> {
        if !session.dirty(DirtyFlags::RASTERIZER | DirtyFlags::FS | DirtyFlags::VIEWPORT | DirtyFlags::FB) {
            return Ok(());
        }

        let fb = state.framebuffer();
        // The guard band only helps when no viewport extends past the
        // framebuffer.
        let guardband = state.viewports().iter().all(|vp| vp.covers(fb.width, fb.height));
        let fs = state.shader(ShaderStage::Fragment).map(|k| &k.params);
        cmd::clip(b, Some(state.rasterizer()), fs, guardband, 1)
    }

    fn cmd_sf(&mut self, b: &mut Builder, state: &PipelineState, session: &Session) -> Result<(), BuilderError> {
        if session.dirty(DirtyFlags::RASTERIZER | DirtyFlags::FS) {
            let fs = state.shader(ShaderStage::Fragment).map(|k| &k.params);
            cmd::sf(b, Some(state.rasterizer()), fs)?;
        }
        Ok(())
    }

    fn cmd_wm(
        &mut self,
        b: &mut Builder,
        state: &PipelineState,
        kernels: &KernelCache,
        session: &Session,
    ) -> Result<(), BuilderError> {
        if session.changed(SessionFlags::PCB_FS) {
            let h = &self.cache.stages[ShaderStage::Fragment.index()];
            cmd::constant(b, Command::ConstantPs, Some((h.push_constants, h.push_constants_size)))?;
        }

        let dirty = DirtyFlags::FS | DirtyFlags::SAMPLER_FS | DirtyFlags::BLEND | DirtyFlags::DSA | DirtyFlags::RASTERIZER;
        if !session.dirty(dirty) && !session.kernel_bo_changed {
            return Ok(());
        }

        if session.hw_ctx_changed {
            self.wa_max_threads_stall(b)?;
        }

        let rs = state.rasterizer();
        let setup = WmSetup {
            num_samplers: state.stage(ShaderStage::Fragment).samplers.len() as u32,
            dual_blend: state.blend.dual_blend(),
            cc_may_kill: state.dsa.alpha.is_some() || state.blend.alpha_to_coverage,
            poly_stipple: rs.poly_stipple,
            line_stipple: rs.line_stipple.is_some(),
            multisample: rs.multisample,
            hiz_op: None,
        };
        let fs = kernel(kernels, state, ShaderStage::Fragment);
        cmd::wm(b, fs, &setup, self.device.max_wm_threads)
    }

    fn cmd_pointers_3(&mut self, b: &mut Builder, session: &Session) -> Result<(), BuilderError> {
        let c = &self.cache;
        if session.changed(SessionFlags::SCISSOR) {
            cmd::scissor_state_pointers(b, c.scissor_rect)?;
        }
        if session.changed(SessionFlags::BINDING_TABLES) {
            let [vs, gs, fs] = &c.stages;
            cmd::binding_table_pointers(b, vs.binding_table, gs.binding_table, fs.binding_table)?;
        }
        Ok(())
    }

    fn cmd_wm_depth(&mut self, b: &mut Builder, state: &PipelineState, session: &Session) -> Result<(), BuilderError> {
        if !session.dirty(DirtyFlags::FB) && !session.batch_bo_changed {
            return Ok(());
        }

        self.wa_post_sync(b, false)?;
        self.wa_depth_flush(b)?;

        let zs = state.framebuffer().zsbuf.as_ref();
        cmd::depth_buffer(b, zs)?;
        cmd::hier_depth_buffer(b, zs)?;
        cmd::stencil_buffer(b, zs)?;
        cmd::clear_params(b, zs.map_or(0, |zs| zs.clear_value))
    }

    fn cmd_wm_raster(&mut self, b: &mut Builder, state: &PipelineState, session: &Session) -> Result<(), BuilderError> {
        let rs = state.rasterizer();

        if session.dirty(DirtyFlags::RASTERIZER | DirtyFlags::POLY_STIPPLE) && rs.poly_stipple {
            self.wa_post_sync(b, false)?;
            cmd::poly_stipple_pattern(b, &state.poly_stipple)?;
            cmd::poly_stipple_offset(b, 0, 0)?;
        }

        if session.dirty(DirtyFlags::RASTERIZER) {
            if let Some(stipple) = rs.line_stipple {
                self.wa_post_sync(b, false)?;
                cmd::line_stipple(b, stipple.pattern, stipple.factor)?;
            }
            if rs.line_smooth {
                self.wa_post_sync(b, false)?;
                cmd::aa_line_parameters(b)?;
            }
        }
        Ok(())
    }

    fn cmd_sf_rect(&mut self, b: &mut Builder, state: &PipelineState, session: &Session) -> Result<(), BuilderError> {
        if session.dirty(DirtyFlags::FB) {
            // 3DSTATE_DRAWING_RECTANGLE is non-pipelined.
            self.wa_post_sync(b, false)?;
            let fb = state.framebuffer();
            cmd::drawing_rectangle(b, 0, 0, fb.width, fb.height)?;
        }
        Ok(())
    }

    fn cmd_vf(
        &mut self,
        b: &mut Builder,
        state: &PipelineState,
        draw: &DrawInfo,
        session: &Session,
    ) -> Result<(), BuilderError> {
        if session.dirty(DirtyFlags::IB) || session.restart_changed || session.batch_bo_changed {
            if let Some(ib) = &state.index_buffer {
                cmd::index_buffer(b, ib, draw.primitive_restart)?;
            }
        }

        if session.dirty(DirtyFlags::VB | DirtyFlags::VE) || session.batch_bo_changed {
            let buffers: Vec<Option<VertexBufferRef>> = state
                .vertex_buffers()
                .iter()
                .map(|vb| vb.as_ref().map(VertexBufferRef::from))
                .collect();
            cmd::vertex_buffers(b, &buffers)?;
        }

        if session.dirty(DirtyFlags::VE | DirtyFlags::VS) {
            let vs = state.shader(ShaderStage::Vertex).map(|k| &k.params);
            let prepend = vs.is_some_and(|p| p.uses_vertex_id || p.uses_instance_id);
            let edge_flag = vs.is_some_and(|p| p.uses_edge_flag);
            cmd::vertex_elements(b, state.vertex_elements(), prepend, edge_flag)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BufferId;
    use crate::state::StreamOutputDecl;

    fn decl(buffer: usize, components: u32, dst_offset: u32) -> StreamOutputDecl {
        StreamOutputDecl {
            register: 0,
            start_component: 0,
            num_components: components,
            buffer,
            dst_offset,
        }
    }

    fn target(size: u32) -> Option<StreamOutputTarget> {
        Some(StreamOutputTarget {
            buffer: BufferId(9),
            offset: 0,
            size,
        })
    }

    #[test]
    fn no_outputs_is_unbounded() {
        let info = StreamOutputInfo::default();
        assert_eq!(so_max_vertices(Some(&info), &[]), SVBI_UNBOUNDED);
        assert_eq!(so_max_vertices(None, &[]), 0);
    }

    #[test]
    fn smallest_target_wins() {
        let info = StreamOutputInfo {
            outputs: vec![decl(0, 4, 0), decl(1, 2, 0)],
            strides: [4, 2, 0, 0],
        };
        // 100 / 16 = 6 rem 4, 4 < 16; 40 / 8 = 5 rem 0.
        assert_eq!(so_max_vertices(Some(&info), &[target(100), target(40)]), 5);
    }

    #[test]
    fn exact_fit_takes_the_smaller_buffer() {
        let info = StreamOutputInfo {
            outputs: vec![decl(0, 4, 0), decl(1, 4, 0)],
            strides: [4, 4, 0, 0],
        };
        assert_eq!(so_max_vertices(Some(&info), &[target(1024), target(2048)]), 64);
        assert_eq!(so_max_vertices(Some(&info), &[target(1024), None]), 0);
    }

    #[test]
    fn trailing_partial_vertex_counts_when_element_fits() {
        let info = StreamOutputInfo {
            outputs: vec![decl(0, 1, 1)],
            strides: [4, 0, 0, 0],
        };
        // (40 - 4) / 16 = 2 rem 4, and a single component needs 4 bytes.
        assert_eq!(so_max_vertices(Some(&info), &[target(40)]), 3);
    }

    #[test]
    fn unbound_target_disables_output() {
        let info = StreamOutputInfo {
            outputs: vec![decl(0, 4, 0), decl(2, 4, 0)],
            strides: [4, 0, 4, 0],
        };
        assert_eq!(so_max_vertices(Some(&info), &[target(64), None]), 0);
    }
}
