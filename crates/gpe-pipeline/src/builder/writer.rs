use std::fmt;

use bitflags::bitflags;
use tracing::{debug, warn};

use crate::backend::{BufferBackend, BufferId};
use crate::error::{BackendError, BuilderError};

/// Growth granularity required by `STATE_BASE_ADDRESS`.
const PAGE_SIZE: usize = 4096;
const INITIAL_ITEM_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriterKind {
    /// Commands from the bottom, dynamic state stolen from the top.
    Batch,
    /// Append-only shader kernels.
    Instruction,
}

impl WriterKind {
    pub const ALL: [WriterKind; 2] = [WriterKind::Batch, WriterKind::Instruction];

    pub const fn index(self) -> usize {
        match self {
            WriterKind::Batch => 0,
            WriterKind::Instruction => 1,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            WriterKind::Batch => "batch",
            WriterKind::Instruction => "instruction",
        }
    }
}

impl fmt::Display for WriterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct WriterFlags: u32 {
        /// `begin()` keeps the existing buffer and appends to it.
        const APPEND = 1 << 0;
        /// The writer grows when full instead of failing.
        const GROW = 1 << 1;
        /// Written through a CPU mapping rather than staged uploads.
        const MAP = 1 << 2;
    }
}

/// What a recorded range of writer memory holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemKind {
    Blob,
    Command,
    ClipViewport,
    SfViewport,
    CcViewport,
    ScissorRect,
    ColorCalc,
    DepthStencil,
    Blend,
    Sampler,
    BorderColor,
    Surface,
    BindingTable,
    PushConstants,
    Kernel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Item {
    pub kind: ItemKind,
    pub offset: usize,
    pub size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelocTarget {
    /// Whatever buffer the writer ends up in at `end()`.
    Writer(WriterKind),
    Buffer(BufferId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relocation {
    pub offset: usize,
    pub target: RelocTarget,
    pub delta: u32,
    pub write: bool,
}

pub(crate) fn align_up(v: usize, a: usize) -> usize {
    debug_assert!(a.is_power_of_two());
    (v + (a - 1)) & !(a - 1)
}

fn align_down(v: usize, a: usize) -> usize {
    debug_assert!(a.is_power_of_two());
    v & !(a - 1)
}

/// One growable backing allocation and its CPU copy.
pub(crate) struct Writer {
    pub(crate) kind: WriterKind,
    pub(crate) flags: WriterFlags,
    /// Capacity in bytes; `data.len()` once allocated.
    pub(crate) size: usize,
    pub(crate) buffer: Option<BufferId>,
    data: Vec<u8>,
    pub(crate) used: usize,
    pub(crate) stolen: usize,
    /// Bytes below this offset already landed in `buffer`.
    synced: usize,
    mapped: bool,
    record_items: bool,
    pub(crate) items: Vec<Item>,
    pub(crate) relocs: Vec<Relocation>,
    /// Bumped whenever previously written content is lost.
    pub(crate) generation: u64,
}

impl fmt::Debug for Writer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Writer")
            .field("kind", &self.kind)
            .field("flags", &self.flags)
            .field("size", &self.size)
            .field("buffer", &self.buffer)
            .field("used", &self.used)
            .field("stolen", &self.stolen)
            .field("items", &self.items.len())
            .field("relocs", &self.relocs.len())
            .finish()
    }
}

impl Writer {
    pub(crate) fn new(kind: WriterKind, size: usize, flags: WriterFlags, record_items: bool) -> Self {
        Self {
            kind,
            flags,
            size,
            buffer: None,
            data: Vec::new(),
            used: 0,
            stolen: 0,
            synced: 0,
            mapped: false,
            record_items,
            items: Vec::new(),
            relocs: Vec::new(),
            generation: 0,
        }
    }

    pub(crate) fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn is_mapped(&self) -> bool {
        self.mapped
    }

    pub(crate) fn space(&self) -> usize {
        self.size.saturating_sub(self.used + self.stolen)
    }

    /// Forgets everything written but keeps the buffer.
    pub(crate) fn discard(&mut self) {
        self.relocs.clear();
        self.items.clear();
        self.used = 0;
        self.stolen = 0;
        self.synced = 0;
        self.generation += 1;
    }

    /// Releases the buffer. The (possibly grown) size is kept.
    pub(crate) fn reset(&mut self, backend: &mut dyn BufferBackend) {
        if let Some(buffer) = self.buffer.take() {
            if self.mapped {
                let _ = backend.unmap(buffer);
            }
            backend.free(buffer);
        }
        self.mapped = false;
        self.data = Vec::new();
        self.items = Vec::new();
        self.relocs.clear();
        self.used = 0;
        self.stolen = 0;
        self.synced = 0;
        self.generation += 1;
    }

    /// Makes the writer ready for a new submission cycle.
    pub(crate) fn alloc_and_map(&mut self, backend: &mut dyn BufferBackend) -> Result<(), BuilderError> {
        if !self.flags.contains(WriterFlags::APPEND) || self.buffer.is_none() {
            match backend.allocate(self.kind.name(), self.size) {
                Ok(buffer) => {
                    if let Some(old) = self.buffer.replace(buffer) {
                        backend.free(old);
                    }
                    self.data.clear();
                    self.data.resize(self.size, 0);
                }
                Err(err) => match self.buffer {
                    Some(old) if !backend.is_busy(old) => {
                        warn!(writer = %self.kind, %err, "allocation failed, reusing idle buffer");
                    }
                    _ => {
                        warn!(writer = %self.kind, %err, "writer allocation failed");
                        return Err(err.into());
                    }
                },
            }

            self.relocs.clear();
            self.items.clear();
            self.used = 0;
            self.stolen = 0;
            self.generation += 1;
        }

        if self.flags.contains(WriterFlags::MAP) {
            if let Some(buffer) = self.buffer {
                backend.map(buffer).map_err(|err| {
                    warn!(writer = %self.kind, %err, "failed to map writer");
                    err
                })?;
                self.mapped = true;
            }
        }
        self.synced = self.used;
        Ok(())
    }

    /// Publishes what was written since `begin()` and unmaps.
    pub(crate) fn unmap(&mut self, backend: &mut dyn BufferBackend) -> Result<(), BackendError> {
        let buffer = match self.buffer {
            Some(buffer) => buffer,
            None => return Ok(()),
        };

        let mut result = Ok(());
        if self.used > self.synced {
            result = backend.write(buffer, self.synced, &self.data[self.synced..self.used]);
        }
        if self.stolen > 0 && result.is_ok() {
            let offset = self.size - self.stolen;
            result = backend.write(buffer, offset, &self.data[offset..]);
        }
        if self.mapped {
            self.mapped = false;
            let unmapped = backend.unmap(buffer);
            result = result.and(unmapped);
        }
        if result.is_ok() {
            self.synced = self.used;
        }
        result
    }

    /// Grows to at least `new_size` bytes. Capacity at least doubles and is
    /// rounded to a page.
    pub(crate) fn grow(
        &mut self,
        backend: &mut dyn BufferBackend,
        new_size: usize,
        preserve: bool,
    ) -> Result<(), BuilderError> {
        if !self.flags.contains(WriterFlags::GROW) {
            return Err(BuilderError::GrowthDisallowed {
                writer: self.kind,
                requested: new_size,
                capacity: self.size,
            });
        }
        if self.stolen > 0 {
            return Err(BuilderError::StolenDataPinned);
        }

        let new_size = align_up(new_size.max(self.size << 1), PAGE_SIZE);
        let new_buffer = backend.allocate(self.kind.name(), new_size)?;

        if self.flags.contains(WriterFlags::MAP) {
            if let Err(err) = backend.map(new_buffer) {
                backend.free(new_buffer);
                return Err(err.into());
            }
        }

        if let Some(old) = self.buffer.replace(new_buffer) {
            if self.mapped {
                let _ = backend.unmap(old);
            }
            backend.free(old);
        }
        self.mapped = self.flags.contains(WriterFlags::MAP);

        if preserve {
            self.data.resize(new_size, 0);
        } else {
            self.data = vec![0; new_size];
            self.used = 0;
            self.relocs.clear();
            self.items.clear();
            self.generation += 1;
        }
        self.size = new_size;
        // Nothing has landed in the new buffer yet.
        self.synced = 0;

        debug!(writer = %self.kind, new_size, preserve, "writer grew");
        Ok(())
    }

    fn ensure_space(&mut self, backend: &mut dyn BufferBackend, len: usize) -> Result<(), BuilderError> {
        let needed = self.used + self.stolen + len;
        if needed > self.size {
            self.grow(backend, needed, true)?;
        }
        Ok(())
    }

    /// Reserves `len` bytes after the used region.
    pub(crate) fn reserve_bottom(
        &mut self,
        backend: &mut dyn BufferBackend,
        alignment: usize,
        len: usize,
    ) -> Result<usize, BuilderError> {
        let start = align_up(self.used, alignment);
        let padded = start - self.used + len;
        self.ensure_space(backend, padded)?;
        self.data[self.used..start].fill(0);
        self.used = start + len;
        Ok(start)
    }

    /// Steals `len` bytes from the top, aligned downward.
    pub(crate) fn reserve_top(
        &mut self,
        backend: &mut dyn BufferBackend,
        alignment: usize,
        len: usize,
    ) -> Result<usize, BuilderError> {
        let fits = |w: &Self| {
            w.size
                .checked_sub(w.stolen + len)
                .map(|top| align_down(top, alignment))
                .filter(|&offset| offset >= w.used)
        };

        let offset = match fits(self) {
            Some(offset) => offset,
            None => {
                self.grow(backend, self.used + len + alignment, true)?;
                fits(self).ok_or(BuilderError::GrowthDisallowed {
                    writer: self.kind,
                    requested: self.used + len + alignment,
                    capacity: self.size,
                })?
            }
        };

        self.stolen = self.size - offset;
        Ok(offset)
    }

    pub(crate) fn write_dw(&mut self, offset: usize, value: u32) {
        self.data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    pub(crate) fn write_dwords(&mut self, offset: usize, dwords: &[u32]) {
        for (i, dw) in dwords.iter().enumerate() {
            self.write_dw(offset + i * 4, *dw);
        }
    }

    pub(crate) fn write_bytes(&mut self, offset: usize, bytes: &[u8]) {
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    pub(crate) fn read_dw(&self, offset: usize) -> u32 {
        let b = &self.data[offset..offset + 4];
        u32::from_le_bytes([b[0], b[1], b[2], b[3]])
    }

    pub(crate) fn record(&mut self, kind: ItemKind, offset: usize, size: usize) -> Result<(), BuilderError> {
        if !self.record_items {
            return Ok(());
        }
        if self.items.len() == self.items.capacity() {
            let additional = self.items.capacity().max(INITIAL_ITEM_CAPACITY);
            self.items.try_reserve_exact(additional).map_err(|_| BackendError::OutOfMemory {
                size: additional * std::mem::size_of::<Item>(),
            })?;
        }
        self.items.push(Item { kind, offset, size });
        Ok(())
    }

    pub(crate) fn reloc(&mut self, offset: usize, target: RelocTarget, delta: u32, write: bool) {
        debug_assert!(offset + 4 <= self.size);
        self.relocs.push(Relocation {
            offset,
            target,
            delta,
            write,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;

    fn batch(size: usize, flags: WriterFlags) -> (MemoryBackend, Writer) {
        let mut backend = MemoryBackend::new();
        let mut writer = Writer::new(WriterKind::Batch, size, flags, true);
        writer.alloc_and_map(&mut backend).unwrap();
        (backend, writer)
    }

    #[test]
    fn top_allocations_align_downward() {
        let (mut backend, mut w) = batch(4096, WriterFlags::empty());
        let a = w.reserve_top(&mut backend, 64, 24).unwrap();
        assert_eq!(a, 4096 - 64);
        assert_eq!(w.stolen, 64);
        let b = w.reserve_top(&mut backend, 32, 8).unwrap();
        assert_eq!(b, 4096 - 96);
        assert_eq!(w.stolen, 96);
    }

    #[test]
    fn fixed_writer_refuses_to_grow() {
        let (mut backend, mut w) = batch(64, WriterFlags::empty());
        w.reserve_bottom(&mut backend, 4, 60).unwrap();
        let err = w.reserve_bottom(&mut backend, 4, 8).unwrap_err();
        assert_eq!(
            err,
            BuilderError::GrowthDisallowed {
                writer: WriterKind::Batch,
                requested: 68,
                capacity: 64
            }
        );
    }

    #[test]
    fn stolen_data_pins_the_buffer() {
        let (mut backend, mut w) = batch(64, WriterFlags::GROW);
        w.reserve_top(&mut backend, 32, 16).unwrap();
        assert_eq!(
            w.reserve_bottom(&mut backend, 4, 64).unwrap_err(),
            BuilderError::StolenDataPinned
        );
    }

    #[test]
    fn growth_doubles_and_preserves() {
        let (mut backend, mut w) = batch(4096, WriterFlags::GROW);
        let at = w.reserve_bottom(&mut backend, 4, 8).unwrap();
        w.write_dwords(at, &[0xdead_beef, 0x1234_5678]);
        let old = w.buffer;

        w.grow(&mut backend, 5000, true).unwrap();
        assert_eq!(w.size, 8192);
        assert_ne!(w.buffer, old);
        assert_eq!(w.read_dw(0), 0xdead_beef);
        assert_eq!(w.read_dw(4), 0x1234_5678);
        assert_eq!(backend.live_buffers(), 1);
    }

    #[test]
    fn item_records_are_optional() {
        let mut w = Writer::new(WriterKind::Batch, 64, WriterFlags::empty(), false);
        w.record(ItemKind::Command, 0, 4).unwrap();
        assert!(w.items.is_empty());
    }
}
