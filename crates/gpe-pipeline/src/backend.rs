use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::warn;

use crate::error::BackendError;

/// Opaque identity of a buffer owned by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BufferId(pub u32);

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A relocation with its target resolved to a concrete buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedReloc {
    /// Byte offset of the patched dword in the batch.
    pub offset: usize,
    pub target: BufferId,
    pub delta: u32,
    /// The GPU writes to `target` through this address.
    pub write: bool,
    /// Address that was patched in, assuming `target` does not move.
    pub presumed: u64,
}

/// A finalized batch ready to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub batch: BufferId,
    /// Bytes of commands at the start of `batch`.
    pub used: usize,
    pub relocs: Vec<ResolvedReloc>,
    /// Every buffer the batch references, `batch` included.
    pub buffers: Vec<BufferId>,
}

/// Boundary between the command builder and whatever owns device memory.
///
/// The builder keeps its own CPU copy of each writer and publishes it through
/// [`BufferBackend::write`]. Mapped writers bracket those writes with
/// [`BufferBackend::map`] and [`BufferBackend::unmap`].
pub trait BufferBackend: fmt::Debug {
    fn allocate(&mut self, name: &'static str, size: usize) -> Result<BufferId, BackendError>;

    fn free(&mut self, buffer: BufferId);

    fn map(&mut self, buffer: BufferId) -> Result<(), BackendError>;

    fn unmap(&mut self, buffer: BufferId) -> Result<(), BackendError>;

    fn write(&mut self, buffer: BufferId, offset: usize, data: &[u8]) -> Result<(), BackendError>;

    /// Address the buffer is expected to have when the GPU executes.
    fn presumed_address(&self, buffer: BufferId) -> Result<u64, BackendError>;

    /// The buffer is referenced by a submission the GPU has not retired.
    fn is_busy(&self, buffer: BufferId) -> bool;

    /// Whether a batch referencing all of `buffers` fits in the aperture.
    fn can_submit(&self, buffers: &[BufferId]) -> bool;

    fn submit(&mut self, submission: &Submission) -> Result<(), BackendError>;
}

/// A batch captured by [`MemoryBackend`] at submit time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedBatch {
    pub submission: Submission,
    /// Full contents of the batch buffer, dynamic state included.
    pub contents: Vec<u8>,
}

impl SubmittedBatch {
    /// The command portion of the batch.
    pub fn commands(&self) -> &[u8] {
        &self.contents[..self.submission.used]
    }

    pub fn read_dw(&self, offset: usize) -> u32 {
        let b = &self.contents[offset..offset + 4];
        u32::from_le_bytes([b[0], b[1], b[2], b[3]])
    }
}

#[derive(Debug)]
struct MemoryBuffer {
    name: &'static str,
    data: Vec<u8>,
    address: u64,
    mapped: bool,
    busy: bool,
}

#[derive(Debug)]
struct MemoryInner {
    next_id: u32,
    next_address: u64,
    buffers: BTreeMap<BufferId, MemoryBuffer>,
    failing_allocations: usize,
    fail_maps: bool,
    aperture_limit: Option<usize>,
    submissions: Vec<SubmittedBatch>,
}

impl Default for MemoryInner {
    fn default() -> Self {
        Self {
            next_id: 1,
            next_address: MemoryBackend::BASE_ADDRESS,
            buffers: BTreeMap::new(),
            failing_allocations: 0,
            fail_maps: false,
            aperture_limit: None,
            submissions: Vec::new(),
        }
    }
}

/// Reference backend holding buffers in host memory.
///
/// Clones share state, so a test can hand one clone to a context and keep
/// another to inspect submissions and inject failures.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryBackend {
    pub const BASE_ADDRESS: u64 = 0x0010_0000;
    const PAGE_SIZE: u64 = 4096;

    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Makes the next `count` allocations fail with `OutOfMemory`.
    pub fn fail_next_allocations(&self, count: usize) {
        self.lock().failing_allocations = count;
    }

    pub fn set_fail_maps(&self, fail: bool) {
        self.lock().fail_maps = fail;
    }

    /// Limits the total size of buffers a single batch may reference.
    pub fn set_aperture_limit(&self, limit: Option<usize>) {
        self.lock().aperture_limit = limit;
    }

    pub fn set_busy(&self, buffer: BufferId, busy: bool) {
        if let Some(buf) = self.lock().buffers.get_mut(&buffer) {
            buf.busy = busy;
        }
    }

    /// Retires every submitted batch.
    pub fn retire_all(&self) {
        for buf in self.lock().buffers.values_mut() {
            buf.busy = false;
        }
    }

    pub fn submissions(&self) -> Vec<SubmittedBatch> {
        self.lock().submissions.clone()
    }

    pub fn submission_count(&self) -> usize {
        self.lock().submissions.len()
    }

    pub fn last_submission(&self) -> Option<SubmittedBatch> {
        self.lock().submissions.last().cloned()
    }

    pub fn contents(&self, buffer: BufferId) -> Option<Vec<u8>> {
        self.lock().buffers.get(&buffer).map(|b| b.data.clone())
    }

    pub fn buffer_name(&self, buffer: BufferId) -> Option<&'static str> {
        self.lock().buffers.get(&buffer).map(|b| b.name)
    }

    pub fn live_buffers(&self) -> usize {
        self.lock().buffers.len()
    }

    /// Allocates a buffer on behalf of a test, outside any builder.
    pub fn create_buffer(&self, name: &'static str, size: usize) -> BufferId {
        let mut inner = self.lock();
        alloc_locked(&mut inner, name, size)
    }
}

fn alloc_locked(inner: &mut MemoryInner, name: &'static str, size: usize) -> BufferId {
    let id = BufferId(inner.next_id);
    inner.next_id += 1;

    let address = inner.next_address;
    let span = (size as u64).div_ceil(MemoryBackend::PAGE_SIZE).max(1) * MemoryBackend::PAGE_SIZE;
    inner.next_address += span;

    inner.buffers.insert(
        id,
        MemoryBuffer {
            name,
            data: vec![0; size],
            address,
            mapped: false,
            busy: false,
        },
    );
    id
}

impl BufferBackend for MemoryBackend {
    fn allocate(&mut self, name: &'static str, size: usize) -> Result<BufferId, BackendError> {
        let mut inner = self.lock();
        if inner.failing_allocations > 0 {
            inner.failing_allocations -= 1;
            warn!(name, size, "injected allocation failure");
            return Err(BackendError::OutOfMemory { size });
        }
        Ok(alloc_locked(&mut inner, name, size))
    }

    fn free(&mut self, buffer: BufferId) {
        self.lock().buffers.remove(&buffer);
    }

    fn map(&mut self, buffer: BufferId) -> Result<(), BackendError> {
        let mut inner = self.lock();
        let fail = inner.fail_maps;
        let buf = inner
            .buffers
            .get_mut(&buffer)
            .ok_or(BackendError::UnknownBuffer(buffer))?;
        if fail {
            return Err(BackendError::MapFailed(buffer));
        }
        buf.mapped = true;
        Ok(())
    }

    fn unmap(&mut self, buffer: BufferId) -> Result<(), BackendError> {
        let mut inner = self.lock();
        let buf = inner
            .buffers
            .get_mut(&buffer)
            .ok_or(BackendError::UnknownBuffer(buffer))?;
        buf.mapped = false;
        Ok(())
    }

    fn write(&mut self, buffer: BufferId, offset: usize, data: &[u8]) -> Result<(), BackendError> {
        let mut inner = self.lock();
        let buf = inner
            .buffers
            .get_mut(&buffer)
            .ok_or(BackendError::UnknownBuffer(buffer))?;
        let end = offset
            .checked_add(data.len())
            .filter(|&end| end <= buf.data.len())
            .ok_or(BackendError::WriteFailed(buffer))?;
        buf.data[offset..end].copy_from_slice(data);
        Ok(())
    }

    fn presumed_address(&self, buffer: BufferId) -> Result<u64, BackendError> {
        self.lock()
            .buffers
            .get(&buffer)
            .map(|b| b.address)
            .ok_or(BackendError::UnknownBuffer(buffer))
    }

    fn is_busy(&self, buffer: BufferId) -> bool {
        self.lock().buffers.get(&buffer).is_some_and(|b| b.busy)
    }

    fn can_submit(&self, buffers: &[BufferId]) -> bool {
        let inner = self.lock();
        let mut seen: Vec<BufferId> = Vec::with_capacity(buffers.len());
        let mut total = 0usize;
        for &id in buffers {
            if seen.contains(&id) {
                continue;
            }
            seen.push(id);
            match inner.buffers.get(&id) {
                Some(buf) => total += buf.data.len(),
                None => return false,
            }
        }
        inner.aperture_limit.map_or(true, |limit| total <= limit)
    }

    fn submit(&mut self, submission: &Submission) -> Result<(), BackendError> {
        let mut inner = self.lock();
        for id in &submission.buffers {
            if !inner.buffers.contains_key(id) {
                return Err(BackendError::UnknownBuffer(*id));
            }
        }

        let batch = inner
            .buffers
            .get(&submission.batch)
            .ok_or(BackendError::UnknownBuffer(submission.batch))?;
        if batch.mapped {
            return Err(BackendError::SubmitFailed(format!(
                "batch {} is still mapped",
                submission.batch
            )));
        }
        let contents = batch.data.clone();

        for id in &submission.buffers {
            if let Some(buf) = inner.buffers.get_mut(id) {
                buf.busy = true;
            }
        }
        inner.submissions.push(SubmittedBatch {
            submission: submission.clone(),
            contents,
        });
        Ok(())
    }
}
