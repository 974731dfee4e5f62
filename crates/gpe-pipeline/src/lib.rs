//! `gpe-pipeline` builds Gen6 command streams from logical pipeline state.
//!
//! The crate provides:
//! - A two-writer command buffer builder with relocations and state blocks
//!   stolen from the top of the batch (see [`builder::Builder`]).
//! - Byte-exact packet and state block encoders (see [`emit`]).
//! - A dirty-state driven sequencer that re-sends only what changed between
//!   draws (see [`pipeline::GenPipeline`]).
//! - A submission context tying them to a [`BufferBackend`] (see
//!   [`RenderContext`]).

mod context;
mod device;
mod error;
mod kernel_cache;

pub mod backend;
pub mod builder;
pub mod emit;
pub mod pipeline;
pub mod state;

pub use backend::{BufferBackend, BufferId, MemoryBackend, ResolvedReloc, Submission, SubmittedBatch};
pub use builder::{Builder, ItemKind, WriterKind};
pub use context::RenderContext;
pub use device::{BuilderConfig, ContextConfig, DeviceInfo, GpuGen};
pub use error::{BackendError, BuilderError, ContextError};
pub use kernel_cache::KernelCache;
pub use pipeline::{GenPipeline, InvalidateFlags, PipelineAction, RectlistInfo, RectlistOp, RectlistUses};
pub use state::{DirtyFlags, DrawInfo, PipelineState, PrimitiveMode, ShaderStage};
