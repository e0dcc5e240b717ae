//! # Kernel API
//!
//! The boundary between user-mode process support and the rest of the
//! kernel.
//!
//! ## Contents
//!
//! - The data that crosses the boundary: [`SegmentDescriptor`],
//!   [`ExecutableLayout`], [`ProcessContext`], [`KernelThread`]
//! - The collaborators process support consumes but does not implement:
//!   [`FileSystem`], [`ProgramLoader`], [`ThreadFactory`],
//!   [`ContextDestroyer`]
//!
//! ## Non-Goals
//!
//! This is NOT:
//! - A loader (page tables and copying belong to the [`ProgramLoader`])
//! - A scheduler (ready queues belong to the [`ThreadFactory`])
//! - Dynamic linking, relocation or signal delivery

pub mod context;
pub mod error;
pub mod kernel;
pub mod layout;

pub use context::{KernelStack, KernelThread, ProcessContext};
pub use error::{FsError, LoadError};
pub use kernel::{ContextDestroyer, FileSystem, KernelServices, ProgramLoader, ThreadFactory};
pub use layout::{ExecutableLayout, SegmentDescriptor, SegmentFlags, MAX_SEGMENTS};
