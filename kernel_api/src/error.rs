//! Collaborator error types

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from the file-read path
///
/// `NotFound` is kept apart from every other I/O failure so that callers
/// can tell a bad path from a bad disk.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FsError {
    /// No file at this path
    #[error("File not found: {0}")]
    NotFound(String),

    /// Any other read failure
    #[error("I/O error: {0}")]
    Io(String),
}

/// Errors from building a process context out of a parsed image
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadError {
    /// Frames, page tables or stack could not be allocated
    #[error("Out of memory while loading user program")]
    OutOfMemory,

    /// A segment would be mapped outside the user portion of the address space
    #[error("Segment {index} at {start:#x} (+{size:#x}) lies outside user space")]
    SegmentOutOfRange { index: usize, start: u64, size: u64 },

    /// Two segments claim the same pages
    #[error("Segments {first} and {second} overlap")]
    OverlappingSegments { first: usize, second: usize },

    /// The command line does not fit in the argument block
    #[error("Command line too long: {len} bytes (max {max})")]
    ArgumentsTooLarge { len: usize, max: usize },
}
