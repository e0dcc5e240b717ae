//! Process spawning
//!
//! Reads an executable, parses it, has the kernel build an address space
//! for it, and hands the result to a new user thread. A spawn either returns
//! a pid or releases everything it allocated; there is no partial success.

use crate::audit::{SpawnAuditLog, SpawnEvent, SpawnStage};
use crate::config::UserModeConfig;
use crate::executable::{ExecutableParser, ParseError};
use crate::lifecycle::attach_user_context;
use core_types::{ContextId, Pid, ThreadId};
use kernel_api::{FsError, KernelServices, LoadError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Closed set of spawn failure categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    NotFound,
    MalformedHeader,
    TruncatedImage,
    TooManySegments,
    UnalignedEntry,
    OutOfMemory,
    Io,
    Load,
}

/// Errors that can occur while spawning a process
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpawnError {
    #[error("Program not found: {0}")]
    NotFound(String),

    #[error("Malformed executable header: {0}")]
    MalformedHeader(String),

    #[error("Truncated image: need {needed} bytes, have {available}")]
    TruncatedImage { needed: u64, available: u64 },

    #[error("Too many segments: {count} declared, capacity is {capacity}")]
    TooManySegments { count: usize, capacity: usize },

    #[error("Entry address {entry:#x} is not {alignment}-byte aligned")]
    UnalignedEntry { entry: u64, alignment: u64 },

    #[error("Out of memory")]
    OutOfMemory,

    #[error("I/O error reading program: {0}")]
    Io(String),

    #[error("Failed to load program: {0}")]
    Load(LoadError),
}

impl SpawnError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SpawnError::NotFound(_) => ErrorKind::NotFound,
            SpawnError::MalformedHeader(_) => ErrorKind::MalformedHeader,
            SpawnError::TruncatedImage { .. } => ErrorKind::TruncatedImage,
            SpawnError::TooManySegments { .. } => ErrorKind::TooManySegments,
            SpawnError::UnalignedEntry { .. } => ErrorKind::UnalignedEntry,
            SpawnError::OutOfMemory => ErrorKind::OutOfMemory,
            SpawnError::Io(_) => ErrorKind::Io,
            SpawnError::Load(_) => ErrorKind::Load,
        }
    }
}

impl From<ParseError> for SpawnError {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::MalformedHeader(reason) => SpawnError::MalformedHeader(reason),
            ParseError::TruncatedImage { needed, available } => {
                SpawnError::TruncatedImage { needed, available }
            }
            ParseError::TooManySegments { count, capacity } => {
                SpawnError::TooManySegments { count, capacity }
            }
            ParseError::UnalignedEntry { entry, alignment } => {
                SpawnError::UnalignedEntry { entry, alignment }
            }
        }
    }
}

impl From<FsError> for SpawnError {
    fn from(err: FsError) -> Self {
        match err {
            FsError::NotFound(path) => SpawnError::NotFound(path),
            FsError::Io(message) => SpawnError::Io(message),
        }
    }
}

impl From<LoadError> for SpawnError {
    fn from(err: LoadError) -> Self {
        match err {
            LoadError::OutOfMemory => SpawnError::OutOfMemory,
            other => SpawnError::Load(other),
        }
    }
}

/// Identifiers of a successfully spawned process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpawnedProcess {
    pub pid: Pid,
    pub thread_id: ThreadId,
    pub context_id: ContextId,
}

/// Spawns user processes on a kernel
///
/// Borrows the kernel for as long as it lives and keeps an audit log of
/// every attempt made through it.
pub struct Spawner<'a, K: KernelServices + ?Sized> {
    kernel: &'a mut K,
    parser: ExecutableParser,
    audit_log: SpawnAuditLog,
}

impl<'a, K: KernelServices + ?Sized> Spawner<'a, K> {
    pub fn new(kernel: &'a mut K) -> Self {
        Self::with_config(kernel, &UserModeConfig::default())
    }

    pub fn with_config(kernel: &'a mut K, config: &UserModeConfig) -> Self {
        Self {
            kernel,
            parser: ExecutableParser::with_config(config),
            audit_log: SpawnAuditLog::new(),
        }
    }

    /// Spawns `program` and returns the new process's pid
    pub fn spawn(&mut self, program: &str, command_line: &str) -> Result<Pid, SpawnError> {
        self.spawn_with_handle(program, command_line)
            .map(|process| process.pid)
    }

    /// Spawns `program`, also returning the ids of its thread and context
    pub fn spawn_with_handle(
        &mut self,
        program: &str,
        command_line: &str,
    ) -> Result<SpawnedProcess, SpawnError> {
        log::debug!("spawning {} ({:?})", program, command_line);

        let image = match self.kernel.read_fully(program) {
            Ok(image) => image,
            Err(err) => return Err(self.fail(program, SpawnStage::Read, err.into())),
        };
        self.audit_log.record(SpawnEvent::ImageRead {
            path: program.to_string(),
            size_bytes: image.len(),
        });

        let layout = match self.parser.parse(&image) {
            Ok(layout) => layout,
            Err(err) => {
                drop(image);
                self.release_image(program);
                return Err(self.fail(program, SpawnStage::Parse, err.into()));
            }
        };
        self.audit_log.record(SpawnEvent::ImageParsed {
            path: program.to_string(),
            entry_address: layout.entry_address(),
            segment_count: layout.len(),
        });

        let loaded = self
            .kernel
            .load_user_program(&image, &layout, command_line);
        drop(image);
        self.release_image(program);

        let context = match loaded {
            Ok(context) => context,
            Err(err) => return Err(self.fail(program, SpawnStage::Load, err.into())),
        };
        let context_id = context.id();
        self.audit_log.record(SpawnEvent::ContextLoaded {
            path: program.to_string(),
            context_id,
        });

        let Some(mut thread) = self.kernel.create_user_thread(false) else {
            self.kernel.destroy_context(context);
            self.audit_log
                .record(SpawnEvent::ContextDiscarded { context_id });
            return Err(self.fail(program, SpawnStage::CreateThread, SpawnError::OutOfMemory));
        };

        attach_user_context(&mut *self.kernel, &mut thread, context);
        let thread_id = thread.id();
        let pid = self.kernel.start_user_thread(thread);

        log::debug!("spawned {} as {} (thread {})", program, pid, thread_id);
        self.audit_log.record(SpawnEvent::ProcessStarted {
            path: program.to_string(),
            pid,
            thread_id,
            context_id,
        });

        Ok(SpawnedProcess {
            pid,
            thread_id,
            context_id,
        })
    }

    /// Returns the audit log
    pub fn audit_log(&self) -> &SpawnAuditLog {
        &self.audit_log
    }

    fn release_image(&mut self, program: &str) {
        self.audit_log.record(SpawnEvent::ImageReleased {
            path: program.to_string(),
        });
    }

    fn fail(&mut self, program: &str, stage: SpawnStage, error: SpawnError) -> SpawnError {
        log::warn!("spawn of {} failed at {:?}: {}", program, stage, error);
        self.audit_log.record(SpawnEvent::SpawnFailed {
            path: program.to_string(),
            stage,
            error: error.clone(),
        });
        error
    }
}
