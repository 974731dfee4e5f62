use std::sync::Arc;

use gpe_protocol::gen6::{surface_format, DepthFormat, SurfaceType, VfComponent};

use crate::backend::BufferId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexBufferBinding {
    pub buffer: BufferId,
    pub offset: u32,
    /// Bytes readable from `offset`.
    pub size: u32,
    pub stride: u32,
    /// Zero for per-vertex data.
    pub instance_divisor: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexElement {
    pub buffer_index: u32,
    pub src_offset: u32,
    pub format: u32,
    pub components: [VfComponent; 4],
}

impl VertexElement {
    /// Fetches `format` and expands missing components to (0, 0, 0, 1).
    pub fn new(buffer_index: u32, src_offset: u32, format: u32) -> Self {
        Self {
            buffer_index,
            src_offset,
            format,
            components: [
                VfComponent::StoreSrc,
                VfComponent::StoreSrc,
                VfComponent::StoreSrc,
                VfComponent::StoreSrc,
            ],
        }
    }

    pub fn with_components(mut self, components: [VfComponent; 4]) -> Self {
        self.components = components;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexBufferBinding {
    pub buffer: BufferId,
    pub offset: u32,
    pub size: u32,
    /// 1, 2 or 4 bytes.
    pub index_size: u32,
}

/// A resolved view of some memory as a surface, as the hardware samples or
/// renders it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceDesc {
    pub buffer: BufferId,
    pub offset: u32,
    pub kind: SurfaceType,
    pub format: u32,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    /// Row pitch in bytes.
    pub pitch: u32,
    pub mip_count: u32,
    pub tiled: bool,
    pub num_samples: u32,
}

impl SurfaceDesc {
    pub fn texture_2d(buffer: BufferId, width: u32, height: u32, format: u32, pitch: u32) -> Self {
        Self {
            buffer,
            offset: 0,
            kind: SurfaceType::Surface2d,
            format,
            width,
            height,
            depth: 1,
            pitch,
            mip_count: 1,
            tiled: false,
            num_samples: 1,
        }
    }

    pub fn render_target(buffer: BufferId, width: u32, height: u32) -> Self {
        Self::texture_2d(buffer, width, height, surface_format::B8G8R8A8_UNORM, width * 4)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstantBuffer {
    /// Application data pushed through the push constant buffer.
    User(Arc<[u32]>),
    /// Data read through a buffer surface.
    Resource { buffer: BufferId, offset: u32, size: u32 },
}

impl ConstantBuffer {
    pub fn user(data: impl Into<Arc<[u32]>>) -> Self {
        ConstantBuffer::User(data.into())
    }

    pub fn resource(&self) -> Option<BufferId> {
        match self {
            ConstantBuffer::Resource { buffer, .. } => Some(*buffer),
            ConstantBuffer::User(_) => None,
        }
    }

    /// User data as bytes; empty for resource-backed buffers.
    pub fn user_bytes(&self) -> Vec<u8> {
        match self {
            ConstantBuffer::User(data) => data.iter().flat_map(|dw| dw.to_le_bytes()).collect(),
            ConstantBuffer::Resource { .. } => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamOutputTarget {
    pub buffer: BufferId,
    pub offset: u32,
    /// Bytes writable from `offset`.
    pub size: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthStencilSurface {
    pub buffer: BufferId,
    pub offset: u32,
    pub format: DepthFormat,
    pub width: u32,
    pub height: u32,
    pub pitch: u32,
    pub tiled: bool,
    /// Hierarchical depth buffer and its pitch.
    pub hiz: Option<(BufferId, u32)>,
    /// Separate stencil buffer and its pitch.
    pub stencil: Option<(BufferId, u32)>,
    /// Depth clear value as stored in the depth format.
    pub clear_value: u32,
}

impl DepthStencilSurface {
    pub fn new(buffer: BufferId, format: DepthFormat, width: u32, height: u32, pitch: u32) -> Self {
        Self {
            buffer,
            offset: 0,
            format,
            width,
            height,
            pitch,
            tiled: true,
            hiz: None,
            stencil: None,
            clear_value: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Framebuffer {
    pub width: u32,
    pub height: u32,
    pub cbufs: Vec<Option<SurfaceDesc>>,
    pub zsbuf: Option<DepthStencilSurface>,
    pub num_samples: u32,
}

impl Default for Framebuffer {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            cbufs: Vec::new(),
            zsbuf: None,
            num_samples: 1,
        }
    }
}

impl Framebuffer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Self::default()
        }
    }

    pub fn with_color(mut self, surface: SurfaceDesc) -> Self {
        self.cbufs.push(Some(surface));
        self
    }

    pub fn with_depth(mut self, zs: DepthStencilSurface) -> Self {
        self.zsbuf = Some(zs);
        self
    }

    pub fn nr_cbufs(&self) -> usize {
        self.cbufs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_constants_flatten_little_endian() {
        let cb = ConstantBuffer::user(vec![0x0403_0201, 0x0807_0605]);
        assert_eq!(cb.user_bytes(), [1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(cb.resource(), None);
    }

    #[test]
    fn render_target_defaults() {
        let rt = SurfaceDesc::render_target(BufferId(3), 64, 32);
        assert_eq!(rt.pitch, 256);
        assert_eq!(rt.kind, SurfaceType::Surface2d);
        assert_eq!(rt.format, surface_format::B8G8R8A8_UNORM);
    }
}
