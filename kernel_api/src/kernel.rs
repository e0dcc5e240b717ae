//! Collaborator traits
//!
//! Process support orchestrates these services but implements none of
//! them. The simulated kernel provides in-process versions for tests; a
//! hardware kernel would back them with its VFS, page allocator and
//! scheduler.

use crate::{ExecutableLayout, FsError, KernelThread, LoadError, ProcessContext};
use core_types::Pid;
use hal::InterruptHal;

/// File-read path
pub trait FileSystem {
    /// Reads the whole file at `path` into memory
    ///
    /// Must report a missing file as [`FsError::NotFound`].
    fn read_fully(&mut self, path: &str) -> Result<Vec<u8>, FsError>;
}

/// Builds address spaces
pub trait ProgramLoader {
    /// Creates a process context for a parsed image
    ///
    /// Maps every segment of `layout` in order, copies its file bytes out of
    /// `image`, zero-fills the remainder, and sets up the user stack and an
    /// argument block holding `command_line`. The returned context is
    /// unattached (`ref_count() == 0`).
    fn load_user_program(
        &mut self,
        image: &[u8],
        layout: &ExecutableLayout,
        command_line: &str,
    ) -> Result<ProcessContext, LoadError>;
}

/// Tears down address spaces
pub trait ContextDestroyer {
    /// Frees everything `context` owns
    ///
    /// Takes the context by value: once destroyed it cannot be reached again.
    fn destroy_context(&mut self, context: ProcessContext);
}

/// Thread creation and the ready queue
pub trait ThreadFactory {
    /// Allocates a thread and its kernel stack, assigning it a pid
    ///
    /// Returns `None` when memory for the thread is exhausted. The thread is
    /// not yet runnable.
    fn create_user_thread(&mut self, is_kernel_thread: bool) -> Option<KernelThread>;

    /// Makes a created thread runnable and returns its pid
    fn start_user_thread(&mut self, thread: KernelThread) -> Pid;
}

/// Everything the process spawner needs from the kernel
pub trait KernelServices:
    FileSystem + ProgramLoader + ThreadFactory + ContextDestroyer + InterruptHal
{
}

impl<T> KernelServices for T where
    T: FileSystem + ProgramLoader + ThreadFactory + ContextDestroyer + InterruptHal
{
}
