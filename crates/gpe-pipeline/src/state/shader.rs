use std::sync::Arc;

use super::MAX_SO_BUFFERS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KernelId(pub u64);

/// Values of a compiled kernel that the fixed-function packets depend on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KernelParams {
    /// First GRF register holding payload data.
    pub dispatch_grf: u32,
    /// URB inputs read per vertex (VS/GS) or SF outputs consumed (FS), in
    /// vec4 units.
    pub input_count: u32,
    /// Output VUE size in vec4 units.
    pub output_count: u32,
    /// Bytes of constant buffer 0 pushed through the push constant buffer.
    pub pcb_cbuf0_size: u32,
    /// Bytes of user clip planes appended after constant buffer 0 (VS only).
    pub pcb_ucp_size: u32,
    pub uses_vertex_id: bool,
    pub uses_instance_id: bool,
    /// The last vertex element carries the edge flag.
    pub uses_edge_flag: bool,
    pub uses_kill: bool,
    pub computes_depth: bool,
    pub uses_source_depth: bool,
    pub dispatch_16: bool,
    /// Byte offsets, relative to the vertex kernel, of the geometry programs
    /// that perform stream output for points, lines and triangles.
    pub so_gs_offsets: Option<[u32; 3]>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamOutputDecl {
    pub register: u32,
    pub start_component: u32,
    pub num_components: u32,
    pub buffer: usize,
    /// Offset inside the output vertex, in dwords.
    pub dst_offset: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamOutputInfo {
    pub outputs: Vec<StreamOutputDecl>,
    /// Per-buffer vertex stride in dwords.
    pub strides: [u32; MAX_SO_BUFFERS],
}

impl StreamOutputInfo {
    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }
}

/// A compiled kernel. Kernels are immutable once bound; identity is the id.
#[derive(Debug, Clone)]
pub struct ShaderKernel {
    pub id: KernelId,
    pub code: Arc<[u8]>,
    pub params: KernelParams,
    pub stream_output: StreamOutputInfo,
}

impl ShaderKernel {
    pub fn new(id: KernelId, code: impl Into<Arc<[u8]>>) -> Self {
        Self {
            id,
            code: code.into(),
            params: KernelParams::default(),
            stream_output: StreamOutputInfo::default(),
        }
    }

    pub fn with_params(mut self, params: KernelParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_stream_output(mut self, stream_output: StreamOutputInfo) -> Self {
        self.stream_output = stream_output;
        self
    }

    /// A vertex kernel that carries its own stream-output geometry programs.
    pub fn has_gs_stream_output(&self) -> bool {
        self.params.so_gs_offsets.is_some()
    }
}

impl PartialEq for ShaderKernel {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ShaderKernel {}
