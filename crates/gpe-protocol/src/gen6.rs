//! Gen6 (Sandy Bridge) render-engine command and state layouts.
//!
//! Every packet is a run of little-endian dwords. DW0 carries the command
//! type, the opcode, and for variable-length packets `length - 2` in its low
//! bits. State blocks referenced through pointer commands are plain dword
//! arrays with a fixed per-kind alignment.

use bitflags::bitflags;

pub const DWORD_BYTES: usize = 4;

pub const CMD_TYPE_SHIFT: u32 = 29;
pub const CMD_TYPE_MASK: u32 = 0x7 << CMD_TYPE_SHIFT;
pub const CMD_TYPE_MI: u32 = 0x0;
pub const CMD_TYPE_RENDER: u32 = 0x3;

pub const RENDER_SUBTYPE_SHIFT: u32 = 27;
pub const RENDER_SUBTYPE_COMMON: u32 = 0x0;
pub const RENDER_SUBTYPE_SINGLE_DW: u32 = 0x1;
pub const RENDER_SUBTYPE_3D: u32 = 0x3;

pub const RENDER_OPCODE_SHIFT: u32 = 16;
pub const RENDER_HEADER_MASK: u32 = 0xffff_0000;
pub const RENDER_LENGTH_MASK: u32 = 0xff;

pub const MI_OPCODE_SHIFT: u32 = 23;
pub const MI_HEADER_MASK: u32 = 0xff80_0000;
pub const MI_LENGTH_MASK: u32 = 0x3f;
pub const MI_USE_GGTT: u32 = 1 << 22;

const fn render(subtype: u32, opcode: u32) -> u32 {
    (CMD_TYPE_RENDER << CMD_TYPE_SHIFT)
        | (subtype << RENDER_SUBTYPE_SHIFT)
        | (opcode << RENDER_OPCODE_SHIFT)
}

const fn mi(opcode: u32) -> u32 {
    opcode << MI_OPCODE_SHIFT
}

pub const MAX_VERTEX_BUFFERS: usize = 33;
pub const MAX_VERTEX_ELEMENTS: usize = 34;
pub const MAX_POLY_STIPPLE_ROWS: usize = 32;

/// Every command the pipeline emitter can write.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Command {
    MiNoop,
    MiBatchBufferEnd,
    MiStoreDataImm,
    MiStoreRegisterMem,

    StateBaseAddress,
    StateSip,
    PipelineSelect,
    VfStatistics,

    BindingTablePointers,
    SamplerStatePointers,
    Urb,
    VertexBuffers,
    VertexElements,
    IndexBuffer,
    ViewportStatePointers,
    CcStatePointers,
    ScissorStatePointers,
    Vs,
    Gs,
    Clip,
    Sf,
    Wm,
    ConstantVs,
    ConstantGs,
    ConstantPs,
    SampleMask,

    DrawingRectangle,
    DepthBuffer,
    PolyStippleOffset,
    PolyStipplePattern,
    LineStipple,
    AaLineParameters,
    GsSvbIndex,
    Multisample,
    StencilBuffer,
    HierDepthBuffer,
    ClearParams,

    PipeControl,
    Primitive,
}

impl Command {
    pub const ALL: [Command; 39] = [
        Command::MiNoop,
        Command::MiBatchBufferEnd,
        Command::MiStoreDataImm,
        Command::MiStoreRegisterMem,
        Command::StateBaseAddress,
        Command::StateSip,
        Command::PipelineSelect,
        Command::VfStatistics,
        Command::BindingTablePointers,
        Command::SamplerStatePointers,
        Command::Urb,
        Command::VertexBuffers,
        Command::VertexElements,
        Command::IndexBuffer,
        Command::ViewportStatePointers,
        Command::CcStatePointers,
        Command::ScissorStatePointers,
        Command::Vs,
        Command::Gs,
        Command::Clip,
        Command::Sf,
        Command::Wm,
        Command::ConstantVs,
        Command::ConstantGs,
        Command::ConstantPs,
        Command::SampleMask,
        Command::DrawingRectangle,
        Command::DepthBuffer,
        Command::PolyStippleOffset,
        Command::PolyStipplePattern,
        Command::LineStipple,
        Command::AaLineParameters,
        Command::GsSvbIndex,
        Command::Multisample,
        Command::StencilBuffer,
        Command::HierDepthBuffer,
        Command::ClearParams,
        Command::PipeControl,
        Command::Primitive,
    ];

    /// DW0 with the type/opcode bits set and a zero length field.
    pub const fn header(self) -> u32 {
        use Command::*;
        match self {
            MiNoop => mi(0x00),
            MiBatchBufferEnd => mi(0x0a),
            MiStoreDataImm => mi(0x20),
            MiStoreRegisterMem => mi(0x24),

            StateBaseAddress => render(RENDER_SUBTYPE_COMMON, 0x0101),
            StateSip => render(RENDER_SUBTYPE_COMMON, 0x0102),
            PipelineSelect => render(RENDER_SUBTYPE_SINGLE_DW, 0x0104),
            VfStatistics => render(RENDER_SUBTYPE_SINGLE_DW, 0x000b),

            BindingTablePointers => render(RENDER_SUBTYPE_3D, 0x0001),
            SamplerStatePointers => render(RENDER_SUBTYPE_3D, 0x0002),
            Urb => render(RENDER_SUBTYPE_3D, 0x0005),
            VertexBuffers => render(RENDER_SUBTYPE_3D, 0x0008),
            VertexElements => render(RENDER_SUBTYPE_3D, 0x0009),
            IndexBuffer => render(RENDER_SUBTYPE_3D, 0x000a),
            ViewportStatePointers => render(RENDER_SUBTYPE_3D, 0x000d),
            CcStatePointers => render(RENDER_SUBTYPE_3D, 0x000e),
            ScissorStatePointers => render(RENDER_SUBTYPE_3D, 0x000f),
            Vs => render(RENDER_SUBTYPE_3D, 0x0010),
            Gs => render(RENDER_SUBTYPE_3D, 0x0011),
            Clip => render(RENDER_SUBTYPE_3D, 0x0012),
            Sf => render(RENDER_SUBTYPE_3D, 0x0013),
            Wm => render(RENDER_SUBTYPE_3D, 0x0014),
            ConstantVs => render(RENDER_SUBTYPE_3D, 0x0015),
            ConstantGs => render(RENDER_SUBTYPE_3D, 0x0016),
            ConstantPs => render(RENDER_SUBTYPE_3D, 0x0017),
            SampleMask => render(RENDER_SUBTYPE_3D, 0x0018),

            DrawingRectangle => render(RENDER_SUBTYPE_3D, 0x0100),
            DepthBuffer => render(RENDER_SUBTYPE_3D, 0x0105),
            PolyStippleOffset => render(RENDER_SUBTYPE_3D, 0x0106),
            PolyStipplePattern => render(RENDER_SUBTYPE_3D, 0x0107),
            LineStipple => render(RENDER_SUBTYPE_3D, 0x0108),
            AaLineParameters => render(RENDER_SUBTYPE_3D, 0x010a),
            GsSvbIndex => render(RENDER_SUBTYPE_3D, 0x010b),
            Multisample => render(RENDER_SUBTYPE_3D, 0x010d),
            StencilBuffer => render(RENDER_SUBTYPE_3D, 0x010e),
            HierDepthBuffer => render(RENDER_SUBTYPE_3D, 0x010f),
            ClearParams => render(RENDER_SUBTYPE_3D, 0x0110),

            PipeControl => render(RENDER_SUBTYPE_3D, 0x0200),
            Primitive => render(RENDER_SUBTYPE_3D, 0x0300),
        }
    }

    /// Bits of DW0 that identify the command.
    pub const fn header_mask(self) -> u32 {
        if self.is_mi() {
            MI_HEADER_MASK
        } else {
            RENDER_HEADER_MASK
        }
    }

    pub const fn is_mi(self) -> bool {
        matches!(
            self,
            Command::MiNoop
                | Command::MiBatchBufferEnd
                | Command::MiStoreDataImm
                | Command::MiStoreRegisterMem
        )
    }

    /// Packets that are exactly one dword and carry no length field.
    pub const fn is_single_dword(self) -> bool {
        matches!(
            self,
            Command::MiNoop
                | Command::MiBatchBufferEnd
                | Command::PipelineSelect
                | Command::VfStatistics
        )
    }

    /// Length in dwords. Variable-length packets report their maximum.
    pub const fn size_dw(self) -> usize {
        use Command::*;
        match self {
            MiNoop | MiBatchBufferEnd => 1,
            MiStoreDataImm => 5,
            MiStoreRegisterMem => 3,

            StateBaseAddress => 10,
            StateSip => 2,
            PipelineSelect | VfStatistics => 1,

            BindingTablePointers | SamplerStatePointers => 4,
            Urb => 3,
            VertexBuffers => 1 + 4 * MAX_VERTEX_BUFFERS,
            VertexElements => 1 + 2 * MAX_VERTEX_ELEMENTS,
            IndexBuffer => 3,
            ViewportStatePointers | CcStatePointers => 4,
            ScissorStatePointers => 2,
            Vs => 6,
            Gs => 7,
            Clip => 4,
            Sf => 20,
            Wm => 9,
            ConstantVs | ConstantGs | ConstantPs => 5,
            SampleMask => 2,

            DrawingRectangle => 4,
            DepthBuffer => 7,
            PolyStippleOffset => 2,
            PolyStipplePattern => 1 + MAX_POLY_STIPPLE_ROWS,
            LineStipple => 3,
            AaLineParameters => 3,
            GsSvbIndex => 4,
            Multisample => 3,
            StencilBuffer => 3,
            HierDepthBuffer => 3,
            ClearParams => 2,

            PipeControl => 5,
            Primitive => 6,
        }
    }

    pub const fn size_bytes(self) -> usize {
        self.size_dw() * DWORD_BYTES
    }

    /// DW0 for a packet of `len` dwords.
    pub const fn dw0(self, len: usize) -> u32 {
        if self.is_single_dword() {
            self.header()
        } else if self.is_mi() {
            self.header() | ((len as u32 - 2) & MI_LENGTH_MASK)
        } else {
            self.header() | ((len as u32 - 2) & RENDER_LENGTH_MASK)
        }
    }

    pub fn from_dw0(dw0: u32) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|cmd| dw0 & cmd.header_mask() == cmd.header())
    }

    /// Length of the packet that starts with `dw0`, in dwords.
    pub const fn packet_len_dw(self, dw0: u32) -> usize {
        if self.is_single_dword() {
            1
        } else if self.is_mi() {
            (dw0 & MI_LENGTH_MASK) as usize + 2
        } else {
            (dw0 & RENDER_LENGTH_MASK) as usize + 2
        }
    }

    pub const fn name(self) -> &'static str {
        use Command::*;
        match self {
            MiNoop => "MI_NOOP",
            MiBatchBufferEnd => "MI_BATCH_BUFFER_END",
            MiStoreDataImm => "MI_STORE_DATA_IMM",
            MiStoreRegisterMem => "MI_STORE_REGISTER_MEM",
            StateBaseAddress => "STATE_BASE_ADDRESS",
            StateSip => "STATE_SIP",
            PipelineSelect => "PIPELINE_SELECT",
            VfStatistics => "3DSTATE_VF_STATISTICS",
            BindingTablePointers => "3DSTATE_BINDING_TABLE_POINTERS",
            SamplerStatePointers => "3DSTATE_SAMPLER_STATE_POINTERS",
            Urb => "3DSTATE_URB",
            VertexBuffers => "3DSTATE_VERTEX_BUFFERS",
            VertexElements => "3DSTATE_VERTEX_ELEMENTS",
            IndexBuffer => "3DSTATE_INDEX_BUFFER",
            ViewportStatePointers => "3DSTATE_VIEWPORT_STATE_POINTERS",
            CcStatePointers => "3DSTATE_CC_STATE_POINTERS",
            ScissorStatePointers => "3DSTATE_SCISSOR_STATE_POINTERS",
            Vs => "3DSTATE_VS",
            Gs => "3DSTATE_GS",
            Clip => "3DSTATE_CLIP",
            Sf => "3DSTATE_SF",
            Wm => "3DSTATE_WM",
            ConstantVs => "3DSTATE_CONSTANT_VS",
            ConstantGs => "3DSTATE_CONSTANT_GS",
            ConstantPs => "3DSTATE_CONSTANT_PS",
            SampleMask => "3DSTATE_SAMPLE_MASK",
            DrawingRectangle => "3DSTATE_DRAWING_RECTANGLE",
            DepthBuffer => "3DSTATE_DEPTH_BUFFER",
            PolyStippleOffset => "3DSTATE_POLY_STIPPLE_OFFSET",
            PolyStipplePattern => "3DSTATE_POLY_STIPPLE_PATTERN",
            LineStipple => "3DSTATE_LINE_STIPPLE",
            AaLineParameters => "3DSTATE_AA_LINE_PARAMETERS",
            GsSvbIndex => "3DSTATE_GS_SVB_INDEX",
            Multisample => "3DSTATE_MULTISAMPLE",
            StencilBuffer => "3DSTATE_STENCIL_BUFFER",
            HierDepthBuffer => "3DSTATE_HIER_DEPTH_BUFFER",
            ClearParams => "3DSTATE_CLEAR_PARAMS",
            PipeControl => "PIPE_CONTROL",
            Primitive => "3DPRIMITIVE",
        }
    }
}

/* ------------------------------ Command fields ----------------------------- */

pub const PIPELINE_SELECT_3D: u32 = 0x0;

pub const VIEWPORT_PTR_DW0_CLIP_CHANGED: u32 = 1 << 10;
pub const VIEWPORT_PTR_DW0_SF_CHANGED: u32 = 1 << 11;
pub const VIEWPORT_PTR_DW0_CC_CHANGED: u32 = 1 << 12;

pub const STAGE_PTR_DW0_VS_CHANGED: u32 = 1 << 8;
pub const STAGE_PTR_DW0_GS_CHANGED: u32 = 1 << 9;
pub const STAGE_PTR_DW0_PS_CHANGED: u32 = 1 << 12;

pub const CC_PTR_MODIFY: u32 = 1 << 0;
pub const SBA_MODIFY: u32 = 1 << 0;
pub const SBA_UPPER_BOUND_UNCHECKED: u32 = 0xffff_f000;

pub const URB_ROW_BYTES: u32 = 128;
pub const URB_DW1_VS_ENTRY_SIZE_SHIFT: u32 = 16;
pub const URB_DW1_VS_ENTRY_COUNT_SHIFT: u32 = 0;
pub const URB_DW2_GS_ENTRY_COUNT_SHIFT: u32 = 8;
pub const URB_DW2_GS_ENTRY_SIZE_SHIFT: u32 = 0;
pub const URB_MAX_ENTRY_ROWS: u32 = 5;
pub const URB_MAX_ENTRIES: u32 = 256;
pub const URB_MIN_VS_ENTRIES: u32 = 24;

pub const VB_DW0_INDEX_SHIFT: u32 = 26;
pub const VB_DW0_INSTANCEDATA: u32 = 1 << 20;
pub const VB_DW0_NULL: u32 = 1 << 13;
pub const VB_DW0_PITCH_MASK: u32 = 0xfff;

pub const VE_DW0_VB_INDEX_SHIFT: u32 = 26;
pub const VE_DW0_VALID: u32 = 1 << 25;
pub const VE_DW0_FORMAT_SHIFT: u32 = 16;
pub const VE_DW0_EDGE_FLAG: u32 = 1 << 15;
pub const VE_DW0_SRC_OFFSET_MASK: u32 = 0x7ff;
pub const VE_DW1_COMP0_SHIFT: u32 = 28;
pub const VE_DW1_COMP1_SHIFT: u32 = 24;
pub const VE_DW1_COMP2_SHIFT: u32 = 20;
pub const VE_DW1_COMP3_SHIFT: u32 = 16;

/// Vertex-fetch component controls.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VfComponent {
    NoStore = 0,
    StoreSrc = 1,
    Store0 = 2,
    Store1Fp = 3,
    Store1Int = 4,
    StoreVid = 5,
    StoreIid = 6,
}

pub const IB_DW0_CUT_INDEX_ENABLE: u32 = 1 << 10;
pub const IB_DW0_FORMAT_SHIFT: u32 = 8;

#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IndexFormat {
    Byte = 0,
    Word = 1,
    Dword = 2,
}

impl IndexFormat {
    pub const fn from_index_size(size: u32) -> Option<Self> {
        match size {
            1 => Some(IndexFormat::Byte),
            2 => Some(IndexFormat::Word),
            4 => Some(IndexFormat::Dword),
            _ => None,
        }
    }
}

pub const CONSTANT_DW0_BUFFER_ENABLE_SHIFT: u32 = 12;
pub const CONSTANT_READ_LENGTH_MASK: u32 = 0x1f;
pub const CONSTANT_UNIT_BYTES: usize = 32;

pub const VS_DW2_SAMPLER_COUNT_SHIFT: u32 = 27;
pub const VS_DW2_BINDING_TABLE_COUNT_SHIFT: u32 = 18;
pub const VS_DW4_DISPATCH_GRF_SHIFT: u32 = 20;
pub const VS_DW4_URB_READ_LEN_SHIFT: u32 = 11;
pub const VS_DW4_URB_READ_OFFSET_SHIFT: u32 = 4;
pub const VS_DW5_MAX_THREADS_SHIFT: u32 = 25;
pub const VS_DW5_STATISTICS: u32 = 1 << 10;
pub const VS_DW5_ENABLE: u32 = 1 << 0;

pub const GS_DW4_URB_READ_LEN_SHIFT: u32 = 11;
pub const GS_DW4_URB_READ_OFFSET_SHIFT: u32 = 4;
pub const GS_DW4_DISPATCH_GRF_SHIFT: u32 = 0;
pub const GS_DW5_MAX_THREADS_SHIFT: u32 = 25;
pub const GS_DW5_STATISTICS: u32 = 1 << 10;
pub const GS_DW5_SO_STATISTICS: u32 = 1 << 9;
pub const GS_DW5_RENDER_ENABLE: u32 = 1 << 8;
pub const GS_DW6_SVBI_PAYLOAD_ENABLE: u32 = 1 << 28;
pub const GS_DW6_SVBI_POSTINCREMENT_SHIFT: u32 = 16;
pub const GS_DW6_ENABLE: u32 = 1 << 15;

pub const CLIP_DW1_STATISTICS: u32 = 1 << 10;
pub const CLIP_DW2_ENABLE: u32 = 1 << 31;
pub const CLIP_DW2_API_D3D: u32 = 1 << 30;
pub const CLIP_DW2_XY_TEST_ENABLE: u32 = 1 << 28;
pub const CLIP_DW2_Z_TEST_ENABLE: u32 = 1 << 27;
pub const CLIP_DW2_GB_TEST_ENABLE: u32 = 1 << 26;
pub const CLIP_DW2_UCP_ENABLES_SHIFT: u32 = 16;
pub const CLIP_DW2_PERSPECTIVE_DIVIDE_DISABLE: u32 = 1 << 9;
pub const CLIP_DW2_NONPERSPECTIVE_BARYCENTRIC: u32 = 1 << 8;
pub const CLIP_DW2_TRI_PROVOKE_SHIFT: u32 = 4;
pub const CLIP_DW2_LINE_PROVOKE_SHIFT: u32 = 2;
pub const CLIP_DW2_TRIFAN_PROVOKE_SHIFT: u32 = 0;
pub const CLIP_DW3_MIN_POINT_WIDTH_SHIFT: u32 = 17;
pub const CLIP_DW3_MAX_POINT_WIDTH_SHIFT: u32 = 6;
pub const CLIP_DW3_MAX_VP_INDEX_MASK: u32 = 0xf;

pub const SF_DW1_NUM_OUTPUTS_SHIFT: u32 = 22;
pub const SF_DW1_URB_READ_LEN_SHIFT: u32 = 11;
pub const SF_DW1_URB_READ_OFFSET_SHIFT: u32 = 4;
pub const SF_DW2_DEPTH_OFFSET_SOLID: u32 = 1 << 9;
pub const SF_DW2_DEPTH_OFFSET_WIREFRAME: u32 = 1 << 8;
pub const SF_DW2_DEPTH_OFFSET_POINT: u32 = 1 << 7;
pub const SF_DW2_FRONT_FILL_SHIFT: u32 = 5;
pub const SF_DW2_BACK_FILL_SHIFT: u32 = 3;
pub const SF_DW2_STATISTICS: u32 = 1 << 10;
pub const SF_DW2_VIEWPORT_TRANSFORM: u32 = 1 << 1;
pub const SF_DW2_FRONT_WINDING_CCW: u32 = 1 << 0;
pub const SF_DW3_ANTIALIAS: u32 = 1 << 31;
pub const SF_DW3_CULL_SHIFT: u32 = 29;
pub const SF_DW3_LINE_WIDTH_SHIFT: u32 = 18;
pub const SF_DW3_SCISSOR_ENABLE: u32 = 1 << 11;
pub const SF_DW3_MSRAST_ON_PATTERN: u32 = 1 << 8;
pub const SF_DW4_LAST_PIXEL: u32 = 1 << 31;
pub const SF_DW4_TRI_PROVOKE_SHIFT: u32 = 29;
pub const SF_DW4_LINE_PROVOKE_SHIFT: u32 = 27;
pub const SF_DW4_TRIFAN_PROVOKE_SHIFT: u32 = 25;
pub const SF_DW4_USE_POINT_WIDTH: u32 = 1 << 11;
pub const SF_DW4_POINT_WIDTH_MASK: u32 = 0x7ff;

#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FillMode {
    Solid = 0,
    Wireframe = 1,
    Point = 2,
}

#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CullMode {
    Both = 0,
    None = 1,
    Front = 2,
    Back = 3,
}

pub const WM_DW2_SAMPLER_COUNT_SHIFT: u32 = 27;
pub const WM_DW2_BINDING_TABLE_COUNT_SHIFT: u32 = 18;
pub const WM_DW4_STATISTICS: u32 = 1 << 31;
pub const WM_DW4_DEPTH_CLEAR: u32 = 1 << 30;
pub const WM_DW4_DEPTH_RESOLVE: u32 = 1 << 28;
pub const WM_DW4_HIZ_RESOLVE: u32 = 1 << 27;
pub const WM_DW4_DISPATCH_GRF_SHIFT: u32 = 16;
pub const WM_DW5_MAX_THREADS_SHIFT: u32 = 25;
pub const WM_DW5_PS_KILL: u32 = 1 << 22;
pub const WM_DW5_PS_COMPUTE_DEPTH: u32 = 1 << 21;
pub const WM_DW5_PS_USE_DEPTH: u32 = 1 << 20;
pub const WM_DW5_PS_ENABLE: u32 = 1 << 19;
pub const WM_DW5_POLY_STIPPLE: u32 = 1 << 13;
pub const WM_DW5_LINE_STIPPLE: u32 = 1 << 11;
pub const WM_DW5_DUAL_SOURCE_BLEND: u32 = 1 << 7;
pub const WM_DW5_16_PIXEL_DISPATCH: u32 = 1 << 1;
pub const WM_DW5_8_PIXEL_DISPATCH: u32 = 1 << 0;
pub const WM_DW6_SF_OUTPUTS_SHIFT: u32 = 20;
pub const WM_DW6_BARYCENTRIC_PERSPECTIVE_PIXEL: u32 = 1 << 10;
pub const WM_DW6_MSRAST_ON_PATTERN: u32 = 1 << 1;

pub const MULTISAMPLE_DW1_CENTER: u32 = 0 << 4;
pub const MULTISAMPLE_DW1_UPPER_LEFT: u32 = 1 << 4;
pub const MULTISAMPLE_DW1_NUMSAMPLES_1: u32 = 0 << 1;
pub const MULTISAMPLE_DW1_NUMSAMPLES_4: u32 = 2 << 1;
pub const SAMPLE_POSITION_1X: u32 = 0x0000_0088;
pub const SAMPLE_POSITION_4X: u32 = 0xae2a_e662;

pub const DEPTH_DW1_TYPE_SHIFT: u32 = 29;
pub const DEPTH_DW1_TILED: u32 = 1 << 27;
pub const DEPTH_DW1_TILE_WALK_Y: u32 = 1 << 26;
pub const DEPTH_DW1_HIZ_ENABLE: u32 = 1 << 22;
pub const DEPTH_DW1_SEPARATE_STENCIL: u32 = 1 << 21;
pub const DEPTH_DW1_FORMAT_SHIFT: u32 = 18;
pub const DEPTH_DW3_HEIGHT_SHIFT: u32 = 19;
pub const DEPTH_DW3_WIDTH_SHIFT: u32 = 6;
pub const DEPTH_DW4_DEPTH_SHIFT: u32 = 21;

#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DepthFormat {
    D32FloatS8X24Uint = 0,
    D32Float = 1,
    D24UnormS8Uint = 2,
    D24UnormX8Uint = 3,
    D16Unorm = 5,
}

pub const CLEAR_PARAMS_DW0_VALID: u32 = 1 << 15;

pub const GS_SVBI_DW1_INDEX_SHIFT: u32 = 29;
pub const SVBI_UNBOUNDED: u32 = 0xffff_ffff;

pub const PRIMITIVE_DW0_RANDOM_ACCESS: u32 = 1 << 15;
pub const PRIMITIVE_DW0_TOPOLOGY_SHIFT: u32 = 10;

/// `3DPRIM_*` topology codes.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Topology {
    PointList = 0x01,
    LineList = 0x02,
    LineStrip = 0x03,
    TriList = 0x04,
    TriStrip = 0x05,
    TriFan = 0x06,
    QuadList = 0x07,
    QuadStrip = 0x08,
    LineListAdj = 0x09,
    LineStripAdj = 0x0a,
    TriListAdj = 0x0b,
    TriStripAdj = 0x0c,
    Polygon = 0x0e,
    RectList = 0x0f,
    LineLoop = 0x10,
}

bitflags! {
    /// PIPE_CONTROL DW1 bits.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct PipeControl: u32 {
        const CS_STALL = 1 << 20;
        const WRITE_IMM = 1 << 14;
        const WRITE_PS_DEPTH_COUNT = 2 << 14;
        const WRITE_TIMESTAMP = 3 << 14;
        const DEPTH_STALL = 1 << 13;
        const RENDER_CACHE_FLUSH = 1 << 12;
        const INSTRUCTION_CACHE_INVALIDATE = 1 << 11;
        const TEXTURE_CACHE_INVALIDATE = 1 << 10;
        const INDIRECT_STATE_POINTERS_DISABLE = 1 << 9;
        const NOTIFY_ENABLE = 1 << 8;
        const DC_FLUSH = 1 << 5;
        const VF_CACHE_INVALIDATE = 1 << 4;
        const CONSTANT_CACHE_INVALIDATE = 1 << 3;
        const STATE_CACHE_INVALIDATE = 1 << 2;
        const PIXEL_SCOREBOARD_STALL = 1 << 1;
        const DEPTH_CACHE_FLUSH = 1 << 0;
    }
}

impl PipeControl {
    /// No post-sync operation; the write field is zero.
    pub const WRITE_NONE: Self = Self::empty();

    pub const WRITE_MASK: u32 = 3 << 14;

    pub fn post_sync_op(self) -> u32 {
        self.bits() & Self::WRITE_MASK
    }
}

pub const PIPE_CONTROL_DW2_GLOBAL_GTT: u32 = 1 << 2;

#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    One = 0x01,
    SrcColor = 0x02,
    SrcAlpha = 0x03,
    DstAlpha = 0x04,
    DstColor = 0x05,
    SrcAlphaSaturate = 0x06,
    ConstColor = 0x07,
    ConstAlpha = 0x08,
    Src1Color = 0x09,
    Src1Alpha = 0x0a,
    Zero = 0x11,
    InvSrcColor = 0x12,
    InvSrcAlpha = 0x13,
    InvDstAlpha = 0x14,
    InvDstColor = 0x15,
    InvConstColor = 0x17,
    InvConstAlpha = 0x18,
    InvSrc1Color = 0x19,
    InvSrc1Alpha = 0x1a,
}

impl BlendFactor {
    pub const fn uses_src1(self) -> bool {
        matches!(
            self,
            BlendFactor::Src1Color
                | BlendFactor::Src1Alpha
                | BlendFactor::InvSrc1Color
                | BlendFactor::InvSrc1Alpha
        )
    }
}

#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlendFunction {
    Add = 0,
    Subtract = 1,
    ReverseSubtract = 2,
    Min = 3,
    Max = 4,
}

#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompareFunction {
    Always = 0,
    Never = 1,
    Less = 2,
    Equal = 3,
    LessEqual = 4,
    Greater = 5,
    NotEqual = 6,
    GreaterEqual = 7,
}

#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StencilOp {
    Keep = 0,
    Zero = 1,
    Replace = 2,
    IncrementSaturate = 3,
    DecrementSaturate = 4,
    Increment = 5,
    Decrement = 6,
    Invert = 7,
}

#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LogicOp {
    Clear = 0x0,
    Nor = 0x1,
    AndInverted = 0x2,
    CopyInverted = 0x3,
    AndReverse = 0x4,
    Invert = 0x5,
    Xor = 0x6,
    Nand = 0x7,
    And = 0x8,
    Equiv = 0x9,
    Noop = 0xa,
    OrInverted = 0xb,
    Copy = 0xc,
    OrReverse = 0xd,
    Or = 0xe,
    Set = 0xf,
}

#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MapFilter {
    Nearest = 0,
    Linear = 1,
    Anisotropic = 2,
}

#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MipFilter {
    None = 0,
    Nearest = 1,
    Linear = 3,
}

#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TexCoordMode {
    Wrap = 0,
    Mirror = 1,
    Clamp = 2,
    Cube = 3,
    ClampBorder = 4,
    MirrorOnce = 5,
}

/* ------------------------------- State blocks ------------------------------ */

/// Sizes of state blocks, in dwords.
pub mod state_size {
    pub const BLEND_STATE: usize = 2;
    pub const DEPTH_STENCIL_STATE: usize = 3;
    pub const COLOR_CALC_STATE: usize = 6;
    pub const SF_VIEWPORT: usize = 8;
    pub const CLIP_VIEWPORT: usize = 4;
    pub const CC_VIEWPORT: usize = 2;
    pub const SCISSOR_RECT: usize = 2;
    pub const SAMPLER_STATE: usize = 4;
    pub const SAMPLER_BORDER_COLOR_STATE: usize = 12;
    pub const SURFACE_STATE: usize = 6;
    pub const BINDING_TABLE_ENTRY: usize = 1;
}

/// Required alignment of state blocks, in bytes.
pub mod state_align {
    pub const BLEND_STATE: usize = 64;
    pub const DEPTH_STENCIL_STATE: usize = 64;
    pub const COLOR_CALC_STATE: usize = 64;
    pub const SF_VIEWPORT: usize = 32;
    pub const CLIP_VIEWPORT: usize = 32;
    pub const CC_VIEWPORT: usize = 32;
    pub const SCISSOR_RECT: usize = 32;
    pub const SAMPLER_STATE: usize = 32;
    pub const SAMPLER_BORDER_COLOR_STATE: usize = 32;
    pub const SURFACE_STATE: usize = 32;
    pub const BINDING_TABLE: usize = 32;
    pub const PUSH_CONSTANTS: usize = 32;
    pub const KERNEL: usize = 64;
}

pub const BLEND_DW0_BLEND_ENABLE: u32 = 1 << 31;
pub const BLEND_DW0_INDEPENDENT_ALPHA: u32 = 1 << 30;
pub const BLEND_DW0_ALPHA_FUNC_SHIFT: u32 = 26;
pub const BLEND_DW0_SRC_ALPHA_SHIFT: u32 = 20;
pub const BLEND_DW0_DST_ALPHA_SHIFT: u32 = 15;
pub const BLEND_DW0_COLOR_FUNC_SHIFT: u32 = 11;
pub const BLEND_DW0_SRC_COLOR_SHIFT: u32 = 5;
pub const BLEND_DW0_DST_COLOR_SHIFT: u32 = 0;
pub const BLEND_DW1_ALPHA_TO_COVERAGE: u32 = 1 << 31;
pub const BLEND_DW1_ALPHA_TO_ONE: u32 = 1 << 30;
pub const BLEND_DW1_WRITE_DISABLE_A: u32 = 1 << 27;
pub const BLEND_DW1_WRITE_DISABLE_R: u32 = 1 << 26;
pub const BLEND_DW1_WRITE_DISABLE_G: u32 = 1 << 25;
pub const BLEND_DW1_WRITE_DISABLE_B: u32 = 1 << 24;
pub const BLEND_DW1_LOGICOP_ENABLE: u32 = 1 << 22;
pub const BLEND_DW1_LOGICOP_FUNC_SHIFT: u32 = 18;
pub const BLEND_DW1_ALPHA_TEST_ENABLE: u32 = 1 << 16;
pub const BLEND_DW1_ALPHA_TEST_FUNC_SHIFT: u32 = 13;
pub const BLEND_DW1_COLOR_DITHER: u32 = 1 << 12;
pub const BLEND_DW1_PRE_BLEND_CLAMP: u32 = 1 << 0;
pub const BLEND_DW1_POST_BLEND_CLAMP: u32 = 1 << 1;

pub const DSA_DW0_STENCIL_ENABLE: u32 = 1 << 31;
pub const DSA_DW0_STENCIL_FUNC_SHIFT: u32 = 28;
pub const DSA_DW0_STENCIL_FAIL_SHIFT: u32 = 25;
pub const DSA_DW0_STENCIL_ZFAIL_SHIFT: u32 = 22;
pub const DSA_DW0_STENCIL_ZPASS_SHIFT: u32 = 19;
pub const DSA_DW0_STENCIL_WRITE_ENABLE: u32 = 1 << 18;
pub const DSA_DW0_DOUBLE_SIDED: u32 = 1 << 15;
pub const DSA_DW0_BACK_FUNC_SHIFT: u32 = 12;
pub const DSA_DW0_BACK_FAIL_SHIFT: u32 = 9;
pub const DSA_DW0_BACK_ZFAIL_SHIFT: u32 = 6;
pub const DSA_DW0_BACK_ZPASS_SHIFT: u32 = 3;
pub const DSA_DW1_TEST_MASK_SHIFT: u32 = 24;
pub const DSA_DW1_WRITE_MASK_SHIFT: u32 = 16;
pub const DSA_DW1_BACK_TEST_MASK_SHIFT: u32 = 8;
pub const DSA_DW1_BACK_WRITE_MASK_SHIFT: u32 = 0;
pub const DSA_DW2_DEPTH_TEST_ENABLE: u32 = 1 << 31;
pub const DSA_DW2_DEPTH_FUNC_SHIFT: u32 = 27;
pub const DSA_DW2_DEPTH_WRITE_ENABLE: u32 = 1 << 26;

pub const CC_DW0_STENCIL_REF_SHIFT: u32 = 24;
pub const CC_DW0_BACK_STENCIL_REF_SHIFT: u32 = 16;
pub const CC_DW0_ALPHATEST_FLOAT32: u32 = 1 << 0;

pub const SAMPLER_DW0_DISABLE: u32 = 1 << 31;
pub const SAMPLER_DW0_LOD_PRECLAMP: u32 = 1 << 28;
pub const SAMPLER_DW0_MIP_FILTER_SHIFT: u32 = 20;
pub const SAMPLER_DW0_MAG_FILTER_SHIFT: u32 = 17;
pub const SAMPLER_DW0_MIN_FILTER_SHIFT: u32 = 14;
pub const SAMPLER_DW0_LOD_BIAS_SHIFT: u32 = 3;
pub const SAMPLER_DW0_LOD_BIAS_MASK: u32 = 0x7ff;
pub const SAMPLER_DW0_SHADOW_FUNC_SHIFT: u32 = 0;
pub const SAMPLER_DW1_MIN_LOD_SHIFT: u32 = 22;
pub const SAMPLER_DW1_MAX_LOD_SHIFT: u32 = 12;
pub const SAMPLER_DW1_CUBE_CTRL_OVERRIDE: u32 = 1 << 9;
pub const SAMPLER_DW1_WRAP_S_SHIFT: u32 = 6;
pub const SAMPLER_DW1_WRAP_T_SHIFT: u32 = 3;
pub const SAMPLER_DW1_WRAP_R_SHIFT: u32 = 0;
pub const SAMPLER_DW3_MAX_ANISO_SHIFT: u32 = 19;
pub const SAMPLER_DW3_ROUNDING_SHIFT: u32 = 13;
pub const SAMPLER_DW3_NON_NORMALIZED: u32 = 1 << 0;

pub const SURFACE_DW0_TYPE_SHIFT: u32 = 29;
pub const SURFACE_DW0_FORMAT_SHIFT: u32 = 18;
pub const SURFACE_DW0_FORMAT_MASK: u32 = 0x1ff << SURFACE_DW0_FORMAT_SHIFT;
pub const SURFACE_DW0_RENDER_CACHE_RW: u32 = 1 << 8;
pub const SURFACE_DW0_CUBE_FACES_ALL: u32 = 0x3f;
pub const SURFACE_DW2_HEIGHT_SHIFT: u32 = 19;
pub const SURFACE_DW2_WIDTH_SHIFT: u32 = 6;
pub const SURFACE_DW2_MIP_COUNT_SHIFT: u32 = 2;
pub const SURFACE_DW3_DEPTH_SHIFT: u32 = 21;
pub const SURFACE_DW3_PITCH_SHIFT: u32 = 3;
pub const SURFACE_DW3_TILED: u32 = 1 << 1;
pub const SURFACE_DW3_TILE_WALK_Y: u32 = 1 << 0;
pub const SURFACE_DW4_MIN_ARRAY_SHIFT: u32 = 17;
pub const SURFACE_DW4_RT_EXTENT_SHIFT: u32 = 8;
pub const SURFACE_DW4_MULTISAMPLE_4X: u32 = 2 << 4;

#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SurfaceType {
    Surface1d = 0,
    Surface2d = 1,
    Surface3d = 2,
    Cube = 3,
    Buffer = 4,
    Null = 7,
}

/// Subset of `SURFACE_FORMAT` codes the emitters name directly.
pub mod surface_format {
    pub const R32G32B32A32_FLOAT: u32 = 0x000;
    pub const R32G32B32_FLOAT: u32 = 0x040;
    pub const R32G32_FLOAT: u32 = 0x085;
    pub const B8G8R8A8_UNORM: u32 = 0x0c0;
    pub const R8G8B8A8_UNORM: u32 = 0x0c7;
    pub const R32_FLOAT: u32 = 0x0d8;
    pub const B5G6R5_UNORM: u32 = 0x100;
    pub const R8_UNORM: u32 = 0x140;
    pub const RAW: u32 = 0x1ff;
}

/* -------------------------------- Registers -------------------------------- */

pub mod regs {
    pub const HS_INVOCATION_COUNT: u32 = 0x2300;
    pub const DS_INVOCATION_COUNT: u32 = 0x2308;
    pub const IA_VERTICES_COUNT: u32 = 0x2310;
    pub const IA_PRIMITIVES_COUNT: u32 = 0x2318;
    pub const VS_INVOCATION_COUNT: u32 = 0x2320;
    pub const GS_INVOCATION_COUNT: u32 = 0x2328;
    pub const GS_PRIMITIVES_COUNT: u32 = 0x2330;
    pub const CL_INVOCATION_COUNT: u32 = 0x2338;
    pub const CL_PRIMITIVES_COUNT: u32 = 0x2340;
    pub const PS_INVOCATION_COUNT: u32 = 0x2348;
    pub const PS_DEPTH_COUNT: u32 = 0x2350;
}

/// Statistics registers sampled by a pipeline-statistics query, in slot
/// order. `None` slots are written as zero (stages Gen6 does not have).
pub const PIPELINE_STATISTICS_REGS: [Option<u32>; 11] = [
    Some(regs::IA_VERTICES_COUNT),
    Some(regs::IA_PRIMITIVES_COUNT),
    Some(regs::VS_INVOCATION_COUNT),
    Some(regs::GS_INVOCATION_COUNT),
    Some(regs::GS_PRIMITIVES_COUNT),
    Some(regs::CL_INVOCATION_COUNT),
    Some(regs::CL_PRIMITIVES_COUNT),
    Some(regs::PS_INVOCATION_COUNT),
    None,
    None,
    None,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_match_known_encodings() {
        assert_eq!(Command::StateBaseAddress.dw0(10), 0x6101_0008);
        assert_eq!(Command::PipelineSelect.dw0(1), 0x6904_0000);
        assert_eq!(Command::PipeControl.dw0(5), 0x7a00_0003);
        assert_eq!(Command::Primitive.dw0(6), 0x7b00_0004);
        assert_eq!(Command::MiBatchBufferEnd.dw0(1), 0x0500_0000);
        assert_eq!(Command::MiStoreRegisterMem.dw0(3), 0x1200_0001);
    }

    #[test]
    fn headers_are_unique_and_round_trip() {
        for cmd in Command::ALL {
            let dw0 = cmd.dw0(cmd.size_dw());
            assert_eq!(Command::from_dw0(dw0), Some(cmd), "{}", cmd.name());
            assert_eq!(cmd.packet_len_dw(dw0), cmd.size_dw(), "{}", cmd.name());
        }
    }

    #[test]
    fn post_sync_op_isolates_write_field() {
        let flags = PipeControl::WRITE_TIMESTAMP | PipeControl::CS_STALL;
        assert_eq!(flags.post_sync_op(), PipeControl::WRITE_TIMESTAMP.bits());
        assert_eq!(PipeControl::WRITE_NONE.post_sync_op(), 0);
    }
}
