use thiserror::Error;

use crate::backend::BufferId;
use crate::builder::WriterKind;
use crate::device::GpuGen;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("out of memory allocating {size} bytes")]
    OutOfMemory { size: usize },
    #[error("failed to map buffer {0}")]
    MapFailed(BufferId),
    #[error("failed to write buffer {0}")]
    WriteFailed(BufferId),
    #[error("unknown buffer {0}")]
    UnknownBuffer(BufferId),
    #[error("buffer {0} is still in flight")]
    Busy(BufferId),
    #[error("submission rejected: {0}")]
    SubmitFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuilderError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("{writer} writer cannot grow to {requested} bytes (capacity {capacity})")]
    GrowthDisallowed {
        writer: WriterKind,
        requested: usize,
        capacity: usize,
    },
    #[error("batch writer holds stolen state and cannot move")]
    StolenDataPinned,
    #[error("builder hit an unrecoverable error; reset required")]
    Unrecoverable,
    #[error("builder used outside of begin()/end()")]
    NotBegun,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error(transparent)]
    Builder(#[from] BuilderError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("operation needs {needed} bytes but the batch only has {available}")]
    DoesNotFit { needed: usize, available: usize },
    #[error("working set exceeds the backend aperture")]
    TooManyBuffers,
    #[error("no pipeline implementation for {0:?}")]
    UnsupportedGen(GpuGen),
}
