//! Command buffer builder.
//!
//! A [`Builder`] owns two writers. The batch writer receives commands from
//! the bottom and dynamic state (viewports, surfaces, binding tables, ...)
//! stolen from the top; the instruction writer holds shader kernels and is
//! only ever appended to. Everything referring to another buffer goes through
//! a relocation that is resolved in [`Builder::end`], once every writer's final
//! buffer is known.

mod writer;

use tracing::{debug, warn};

use gpe_protocol::gen6::{self, Command};

use crate::backend::{BufferBackend, BufferId, ResolvedReloc, Submission};
use crate::device::{BuilderConfig, DeviceInfo};
use crate::error::BuilderError;

pub use writer::{Item, ItemKind, RelocTarget, Relocation, WriterFlags, WriterKind};
use writer::Writer;

/// Logical extent of the batch writer at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    pub used: usize,
    pub stolen: usize,
    pub reloc_count: usize,
    pub item_count: usize,
}

/// Caller-supplied extra buffers accepted by [`Builder::validate`].
pub const MAX_EXTRA_BUFFERS: usize = 2;

#[derive(Debug)]
pub struct Builder {
    device: DeviceInfo,
    backend: Box<dyn BufferBackend>,
    writers: [Writer; 2],
    begun: bool,
    unrecoverable: bool,
}

impl Builder {
    pub fn new(device: DeviceInfo, backend: Box<dyn BufferBackend>, config: &BuilderConfig) -> Self {
        let map = if device.has_llc {
            WriterFlags::MAP
        } else {
            WriterFlags::empty()
        };
        let batch_flags = if config.grow_batch {
            map | WriterFlags::GROW
        } else {
            map
        };
        // The kernel invalidates the instruction cache between batches, so
        // appending never exposes stale prefetched instructions.
        let instruction_flags = map | WriterFlags::APPEND | WriterFlags::GROW;

        Self {
            device,
            backend,
            writers: [
                Writer::new(WriterKind::Batch, config.batch_size, batch_flags, config.record_items),
                Writer::new(
                    WriterKind::Instruction,
                    config.instruction_size,
                    instruction_flags,
                    config.record_items,
                ),
            ],
            begun: false,
            unrecoverable: false,
        }
    }

    pub fn device(&self) -> &DeviceInfo {
        &self.device
    }

    pub fn backend(&self) -> &dyn BufferBackend {
        self.backend.as_ref()
    }

    pub fn backend_mut(&mut self) -> &mut dyn BufferBackend {
        self.backend.as_mut()
    }

    fn writer(&self, kind: WriterKind) -> &Writer {
        &self.writers[kind.index()]
    }

    fn writer_mut(&mut self, kind: WriterKind) -> (&mut Writer, &mut dyn BufferBackend) {
        (&mut self.writers[kind.index()], self.backend.as_mut())
    }

    pub fn is_begun(&self) -> bool {
        self.begun
    }

    pub fn is_unrecoverable(&self) -> bool {
        self.unrecoverable
    }

    /// Allocates (or reuses) and maps every writer. On failure everything is
    /// released and the builder must be begun again.
    pub fn begin(&mut self) -> Result<(), BuilderError> {
        for kind in WriterKind::ALL {
            let (writer, backend) = self.writer_mut(kind);
            if let Err(err) = writer.alloc_and_map(backend) {
                self.reset();
                return Err(err);
            }
        }

        self.begun = true;
        self.unrecoverable = false;
        debug!(
            batch = ?self.writer(WriterKind::Batch).buffer,
            instruction_used = self.used(WriterKind::Instruction),
            "builder begin"
        );
        Ok(())
    }

    /// Resolves relocations, publishes every writer and returns the batch.
    pub fn end(&mut self) -> Result<Submission, BuilderError> {
        if !self.begun {
            return Err(BuilderError::NotBegun);
        }
        self.begun = false;

        debug_assert!(self.validate(&[]), "ending a batch the backend cannot submit");

        let relocs = match self.resolve_relocs() {
            Ok(relocs) => relocs,
            Err(err) => {
                warn!(%err, "failed to resolve relocations");
                self.unrecoverable = true;
                Vec::new()
            }
        };

        for kind in WriterKind::ALL {
            let (writer, backend) = self.writer_mut(kind);
            if let Err(err) = writer.unmap(backend) {
                warn!(writer = %kind, %err, "failed to publish writer");
                self.unrecoverable = true;
            }
        }

        if self.unrecoverable {
            return Err(BuilderError::Unrecoverable);
        }

        let bat = self.writer(WriterKind::Batch);
        let batch = bat.buffer.ok_or(BuilderError::NotBegun)?;
        let mut buffers: Vec<BufferId> = self.writers.iter().filter_map(|w| w.buffer).collect();
        for reloc in &relocs {
            if !buffers.contains(&reloc.target) {
                buffers.push(reloc.target);
            }
        }

        debug!(%batch, used = bat.used, stolen = bat.stolen, relocs = relocs.len(), "builder end");
        Ok(Submission {
            batch,
            used: bat.used,
            relocs,
            buffers,
        })
    }

    fn resolve_relocs(&mut self) -> Result<Vec<ResolvedReloc>, BuilderError> {
        let targets = [
            self.writers[0].buffer,
            self.writers[1].buffer,
        ];
        let bat = &mut self.writers[WriterKind::Batch.index()];
        let mut resolved = Vec::with_capacity(bat.relocs.len());

        for i in 0..bat.relocs.len() {
            let reloc = bat.relocs[i];
            let target = match reloc.target {
                RelocTarget::Buffer(id) => id,
                RelocTarget::Writer(kind) => targets[kind.index()].ok_or(BuilderError::NotBegun)?,
            };
            let presumed = self.backend.presumed_address(target)?;
            // Gen6 addresses are 32 bits wide.
            let address = presumed.wrapping_add(u64::from(reloc.delta)) as u32;
            bat.write_dw(reloc.offset, address);
            resolved.push(ResolvedReloc {
                offset: reloc.offset,
                target,
                delta: reloc.delta,
                write: reloc.write,
                presumed,
            });
        }
        Ok(resolved)
    }

    /// Whether the batch, plus `extra` buffers, can be submitted.
    pub fn validate(&self, extra: &[BufferId]) -> bool {
        if extra.len() > MAX_EXTRA_BUFFERS {
            debug_assert!(false, "too many extra buffers to validate");
            return false;
        }

        let mut buffers: Vec<BufferId> = self.writers.iter().filter_map(|w| w.buffer).collect();
        for reloc in &self.writer(WriterKind::Batch).relocs {
            if let RelocTarget::Buffer(id) = reloc.target {
                if !buffers.contains(&id) {
                    buffers.push(id);
                }
            }
        }
        buffers.extend_from_slice(extra);
        self.backend.can_submit(&buffers)
    }

    /// Releases every writer. Grown sizes are kept.
    pub fn reset(&mut self) {
        for kind in WriterKind::ALL {
            let (writer, backend) = self.writer_mut(kind);
            writer.reset(backend);
        }
        self.begun = false;
        self.unrecoverable = false;
    }

    /// Throws away everything in the batch writer.
    pub fn discard(&mut self) {
        self.writers[WriterKind::Batch.index()].discard();
    }

    /// Free bytes between the commands and the stolen state.
    pub fn space(&self) -> usize {
        self.writer(WriterKind::Batch).space()
    }

    pub fn used(&self, kind: WriterKind) -> usize {
        self.writer(kind).used
    }

    pub fn stolen(&self, kind: WriterKind) -> usize {
        self.writer(kind).stolen
    }

    pub fn capacity(&self, kind: WriterKind) -> usize {
        self.writer(kind).size
    }

    pub fn flags(&self, kind: WriterKind) -> WriterFlags {
        self.writer(kind).flags
    }

    pub fn buffer(&self, kind: WriterKind) -> Option<BufferId> {
        self.writer(kind).buffer
    }

    /// Counter bumped whenever the writer's previous content is lost.
    pub fn generation(&self, kind: WriterKind) -> u64 {
        self.writer(kind).generation
    }

    pub fn is_mapped(&self, kind: WriterKind) -> bool {
        self.writer(kind).is_mapped()
    }

    pub fn is_batch_empty(&self) -> bool {
        self.used(WriterKind::Batch) == 0
    }

    pub fn items(&self, kind: WriterKind) -> &[Item] {
        &self.writer(kind).items
    }

    pub fn relocs(&self, kind: WriterKind) -> &[Relocation] {
        &self.writer(kind).relocs
    }

    /// CPU copy of the writer, full capacity.
    pub fn bytes(&self, kind: WriterKind) -> &[u8] {
        self.writer(kind).bytes()
    }

    /// Commands written to the batch so far.
    pub fn batch_commands(&self) -> &[u8] {
        let bat = self.writer(WriterKind::Batch);
        &bat.bytes()[..bat.used]
    }

    pub fn read_dw(&self, kind: WriterKind, offset: usize) -> u32 {
        self.writer(kind).read_dw(offset)
    }

    pub fn snapshot(&self) -> Snapshot {
        let bat = self.writer(WriterKind::Batch);
        Snapshot {
            used: bat.used,
            stolen: bat.stolen,
            reloc_count: bat.relocs.len(),
            item_count: bat.items.len(),
        }
    }

    /// Rewinds the batch to `snapshot`. Capacity is never shrunk.
    pub fn restore(&mut self, snapshot: &Snapshot) {
        let bat = &mut self.writers[WriterKind::Batch.index()];
        bat.relocs.truncate(snapshot.reloc_count);
        bat.items.truncate(snapshot.item_count);
        bat.used = snapshot.used;
        bat.stolen = snapshot.stolen;
    }

    /// Grows a writer explicitly, e.g. to fit a size estimate up front.
    pub fn grow(&mut self, kind: WriterKind, new_size: usize, preserve: bool) -> Result<(), BuilderError> {
        let (writer, backend) = self.writer_mut(kind);
        writer.grow(backend, new_size, preserve)
    }

    fn latch<T>(&mut self, result: Result<T, BuilderError>) -> Result<T, BuilderError> {
        if result.is_err() {
            self.unrecoverable = true;
        }
        result
    }

    fn check_begun(&self) -> Result<(), BuilderError> {
        if self.begun {
            Ok(())
        } else {
            Err(BuilderError::NotBegun)
        }
    }

    /// Appends a command to the batch and returns its byte offset.
    pub fn batch_write(&mut self, item: ItemKind, dwords: &[u32]) -> Result<usize, BuilderError> {
        self.check_begun()?;
        let len = dwords.len() * 4;
        let (writer, backend) = self.writer_mut(WriterKind::Batch);
        let reserved = writer.reserve_bottom(backend, 4, len);
        let offset = self.latch(reserved)?;

        let bat = &mut self.writers[WriterKind::Batch.index()];
        bat.write_dwords(offset, dwords);
        let recorded = bat.record(item, offset, len);
        self.latch(recorded)?;
        Ok(offset)
    }

    /// Steals an aligned block of dynamic state and returns its offset from
    /// the dynamic state base.
    pub fn state_write(&mut self, item: ItemKind, alignment: usize, dwords: &[u32]) -> Result<u32, BuilderError> {
        self.check_begun()?;
        let len = dwords.len() * 4;
        let (writer, backend) = self.writer_mut(WriterKind::Batch);
        let reserved = writer.reserve_top(backend, alignment, len);
        let offset = self.latch(reserved)?;

        let bat = &mut self.writers[WriterKind::Batch.index()];
        bat.write_dwords(offset, dwords);
        let recorded = bat.record(item, offset, len);
        self.latch(recorded)?;
        Ok(offset as u32)
    }

    /// Like [`Builder::state_write`] for raw bytes; the block is zero padded
    /// to a dword.
    pub fn state_write_bytes(&mut self, item: ItemKind, alignment: usize, bytes: &[u8]) -> Result<u32, BuilderError> {
        self.check_begun()?;
        let len = writer::align_up(bytes.len(), 4);
        let (writer, backend) = self.writer_mut(WriterKind::Batch);
        let reserved = writer.reserve_top(backend, alignment, len);
        let offset = self.latch(reserved)?;

        let bat = &mut self.writers[WriterKind::Batch.index()];
        bat.write_bytes(offset, bytes);
        bat.write_bytes(offset + bytes.len(), &[0; 3][..len - bytes.len()]);
        let recorded = bat.record(item, offset, len);
        self.latch(recorded)?;
        Ok(offset as u32)
    }

    /// Registers a relocation for the batch dword at `offset`. The dword is
    /// patched with the target's address plus `delta` in [`Builder::end`].
    pub fn batch_reloc(&mut self, offset: usize, target: RelocTarget, delta: u32, write: bool) {
        let bat = &mut self.writers[WriterKind::Batch.index()];
        bat.write_dw(offset, delta);
        bat.reloc(offset, target, delta, write);
    }

    /// Appends `bytes` to the instruction writer, `alignment`-aligned.
    pub fn instruction_write(&mut self, item: ItemKind, alignment: usize, bytes: &[u8]) -> Result<u32, BuilderError> {
        self.check_begun()?;
        let (writer, backend) = self.writer_mut(WriterKind::Instruction);
        let reserved = writer.reserve_bottom(backend, alignment, bytes.len());
        let offset = self.latch(reserved)?;

        let inst = &mut self.writers[WriterKind::Instruction.index()];
        inst.write_bytes(offset, bytes);
        let recorded = inst.record(item, offset, bytes.len());
        self.latch(recorded)?;
        Ok(offset as u32)
    }

    /// Emits `STATE_BASE_ADDRESS`. Surface and dynamic state live in the
    /// batch; instructions in the instruction writer. Upper bounds are left
    /// unchecked.
    pub fn state_base_address(&mut self, init_all: bool) -> Result<(), BuilderError> {
        let init = u32::from(init_all);
        let mut dw = [0u32; 10];
        dw[0] = Command::StateBaseAddress.dw0(10);
        dw[1] = init;
        dw[4] = init;
        dw[6] = init;
        dw[7] = gen6::SBA_UPPER_BOUND_UNCHECKED + init;
        dw[8] = gen6::SBA_UPPER_BOUND_UNCHECKED + init;
        dw[9] = init;

        let pos = self.batch_write(ItemKind::Command, &dw)?;
        let modify = gen6::SBA_MODIFY;
        self.batch_reloc(pos + 8, RelocTarget::Writer(WriterKind::Batch), modify, false);
        self.batch_reloc(pos + 12, RelocTarget::Writer(WriterKind::Batch), modify, false);
        // The instruction writer may still grow; the reloc is resolved to
        // whatever buffer it ends up in.
        self.batch_reloc(pos + 20, RelocTarget::Writer(WriterKind::Instruction), modify, false);
        Ok(())
    }

    /// Ends the batch, padding to a QWord.
    pub fn batch_buffer_end(&mut self) -> Result<(), BuilderError> {
        if self.used(WriterKind::Batch) & 0x7 != 0 {
            self.batch_write(ItemKind::Command, &[Command::MiBatchBufferEnd.header()])?;
        } else {
            self.batch_write(
                ItemKind::Command,
                &[Command::MiBatchBufferEnd.header(), Command::MiNoop.header()],
            )?;
        }
        Ok(())
    }
}
