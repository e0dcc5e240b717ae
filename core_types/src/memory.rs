//! # Memory Types
//!
//! Address-space identity and permission flags.
//!
//! Page size and alignment helpers live here too, since both the loader and
//! the scheduler's stack allocator need the same notion of a page.

use crate::uuid_tools::new_uuid;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Size of one page in bytes
pub const PAGE_SIZE: u64 = 4096;

/// First address above user space
pub const USER_SPACE_END: u64 = 0x8000_0000;

/// Rounds `addr` down to the start of its page
pub fn page_align_down(addr: u64) -> u64 {
    addr & !(PAGE_SIZE - 1)
}

/// Rounds `addr` up to the next page boundary, or `None` on overflow
pub fn page_align_up(addr: u64) -> Option<u64> {
    addr.checked_add(PAGE_SIZE - 1).map(page_align_down)
}

/// Unique identifier for an address space
///
/// Each process context owns exactly one address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AddressSpaceId(Uuid);

impl AddressSpaceId {
    /// Creates a new unique address space ID
    pub fn new() -> Self {
        Self(new_uuid())
    }

    /// Returns the inner UUID value
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for AddressSpaceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AddressSpaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "aspace:{}", self.0)
    }
}

/// Memory permission flags
///
/// By default, no permissions are granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct MemoryPerms {
    pub read: bool,
    pub write: bool,
    pub execute: bool,
}

impl MemoryPerms {
    /// No permissions
    pub fn none() -> Self {
        Self::default()
    }

    /// Read and write permissions
    pub fn read_write() -> Self {
        Self {
            read: true,
            write: true,
            execute: false,
        }
    }

    /// Read and execute permissions (typical for code)
    pub fn read_execute() -> Self {
        Self {
            read: true,
            write: false,
            execute: true,
        }
    }

    /// All permissions (use sparingly)
    pub fn all() -> Self {
        Self {
            read: true,
            write: true,
            execute: true,
        }
    }

    /// Check if this has read permission
    pub fn can_read(&self) -> bool {
        self.read
    }

    /// Check if this has write permission
    pub fn can_write(&self) -> bool {
        self.write
    }

    /// Check if this has execute permission
    pub fn can_execute(&self) -> bool {
        self.execute
    }

    /// Check if this has no permissions
    pub fn is_none(&self) -> bool {
        !self.read && !self.write && !self.execute
    }
}

impl fmt::Display for MemoryPerms {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            if self.read { "R" } else { "-" },
            if self.write { "W" } else { "-" },
            if self.execute { "X" } else { "-" }
        )
    }
}
