//! # User Process
//!
//! Creation, dispatch and teardown of user-mode processes.
//!
//! ## Philosophy
//!
//! - **Untrusted images**: every number read from an executable is checked
//!   before it indexes anything
//! - **All or nothing**: a spawn returns a pid or releases what it allocated
//! - **One owner**: a process context belongs to exactly one thread and is
//!   destroyed exactly once
//! - **Critical sections are explicit**: reference counts and the active
//!   context only change while an [`hal::InterruptGuard`] is held
//!
//! ## Components
//!
//! - [`executable`]: ELF32 header parser producing an [`ExecutableLayout`]
//! - [`spawn`]: the [`Spawner`] driving read, parse, load and thread start
//! - [`lifecycle`]: attach and detach of a context to a thread
//! - [`switch`]: the [`ActiveContextCache`] that elides redundant address
//!   space switches
//! - [`config`]: tunables loaded from JSON
//! - [`audit`]: test-visible history of spawn attempts
//!
//! [`ExecutableLayout`]: kernel_api::ExecutableLayout

pub mod audit;
pub mod config;
pub mod executable;
pub mod lifecycle;
pub mod spawn;
pub mod switch;

pub use audit::{SpawnAuditLog, SpawnEvent, SpawnStage};
pub use config::{ConfigError, UserModeConfig};
pub use executable::{parse_executable, ElfImageBuilder, ExecutableParser, ParseError};
pub use lifecycle::{attach_user_context, detach_user_context, DetachOutcome};
pub use spawn::{ErrorKind, SpawnError, SpawnedProcess, Spawner};
pub use switch::{ActiveContextCache, SwitchOutcome};
