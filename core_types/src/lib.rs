//! # Core Types
//!
//! Fundamental identifiers and memory vocabulary shared by the user-mode
//! process crates.
//!
//! ## Key Types
//!
//! - [`Pid`]: Process identifier handed back by a successful spawn
//! - [`ThreadId`]: Identity of a kernel thread
//! - [`ContextId`]: Identity of a process execution context
//! - [`AddressSpaceId`]: Identity of a loaded address space
//! - [`MemoryPerms`]: Read/write/execute permission flags

pub mod ids;
pub mod memory;
pub mod uuid_tools;

pub use ids::{ContextId, Pid, ThreadId};
pub use memory::{
    page_align_down, page_align_up, AddressSpaceId, MemoryPerms, PAGE_SIZE, USER_SPACE_END,
};
