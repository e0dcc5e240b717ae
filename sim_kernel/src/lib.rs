//! # Simulated Kernel
//!
//! In-process implementations of every collaborator user-mode process
//! support needs, wired together into a [`SimulatedKernel`].
//!
//! ## Purpose
//!
//! The simulated kernel allows testing process creation, dispatch and
//! teardown without hardware:
//! - Runs under `cargo test`
//! - Deterministic (one CPU, interrupts are a flag, faults are planned)
//! - Inspectable (every MMU operation and every destroyed context is
//!   recorded)
//!
//! This is not a "toy" or "mock": it loads real ELF32 images into simulated
//! address spaces and switches between them through the same code a
//! hardware kernel would run.

pub mod address_space;
pub mod fault_injection;
pub mod fs;
pub mod hardware;
pub mod loader;
pub mod scheduler;
pub mod test_utils;

use core_types::Pid;
use fault_injection::{FaultInjector, FaultPlan};
use fs::RamFs;
use hal::{InterruptGuard, InterruptHal};
use hardware::{SimInterrupts, SimMmu};
use kernel_api::{
    ContextDestroyer, ExecutableLayout, FileSystem, FsError, KernelThread, LoadError,
    ProcessContext, ProgramLoader, ThreadFactory,
};
use loader::SimLoader;
use scheduler::Scheduler;
use user_process::{
    detach_user_context, ActiveContextCache, DetachOutcome, SpawnError, SpawnedProcess, Spawner,
    SwitchOutcome, UserModeConfig,
};

/// Kernel-level events for auditing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimEvent {
    /// Thread picked to run and its context installed (or not)
    Dispatched { pid: Pid, outcome: SwitchOutcome },
    /// Thread torn down
    ThreadExited { pid: Pid, outcome: DetachOutcome },
}

/// Audit log for kernel-level operations
#[derive(Debug, Clone, Default)]
pub struct SimAuditLog {
    events: Vec<SimEvent>,
}

impl SimAuditLog {
    /// Creates a new empty audit log
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Records an event
    pub fn record(&mut self, event: SimEvent) {
        self.events.push(event);
    }

    /// Returns all recorded events
    pub fn events(&self) -> &[SimEvent] {
        &self.events
    }

    /// Clears all events
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Checks if an event matching the predicate exists
    pub fn has_event<F>(&self, predicate: F) -> bool
    where
        F: Fn(&SimEvent) -> bool,
    {
        self.events.iter().any(predicate)
    }

    /// Counts events matching the predicate
    pub fn count_events<F>(&self, predicate: F) -> usize
    where
        F: Fn(&SimEvent) -> bool,
    {
        self.events.iter().filter(|e| predicate(e)).count()
    }
}

/// Number of times each collaborator was invoked
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub reads: usize,
    pub loads: usize,
    pub thread_creates: usize,
    pub destroys: usize,
}

/// Simulated kernel state
///
/// Unlike a real kernel, this state is directly accessible for testing.
pub struct SimulatedKernel<F: FileSystem = RamFs> {
    config: UserModeConfig,
    fs: F,
    interrupts: SimInterrupts,
    mmu: SimMmu,
    loader: SimLoader,
    scheduler: Scheduler,
    /// Context installed on the (single) CPU
    active_context: ActiveContextCache,
    fault_injector: FaultInjector,
    calls: CallCounts,
    audit_log: SimAuditLog,
}

impl SimulatedKernel<RamFs> {
    /// Creates a kernel with an empty in-memory filesystem
    pub fn new() -> Self {
        Self::with_filesystem(RamFs::new(), UserModeConfig::default())
    }

    pub fn with_config(config: UserModeConfig) -> Self {
        Self::with_filesystem(RamFs::new(), config)
    }

    /// Adds a file to the in-memory filesystem
    pub fn add_program(&mut self, path: impl Into<String>, image: Vec<u8>) {
        self.fs.add_file(path, image);
    }
}

impl Default for SimulatedKernel<RamFs> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: FileSystem> SimulatedKernel<F> {
    pub fn with_filesystem(fs: F, config: UserModeConfig) -> Self {
        Self {
            loader: SimLoader::new(&config),
            scheduler: Scheduler::new(config.kernel_stack_size),
            config,
            fs,
            interrupts: SimInterrupts::new(),
            mmu: SimMmu::new(),
            active_context: ActiveContextCache::new(),
            fault_injector: FaultInjector::default(),
            calls: CallCounts::default(),
            audit_log: SimAuditLog::new(),
        }
    }

    /// Installs a fault plan, replacing any previous one
    pub fn with_fault_plan(mut self, plan: FaultPlan) -> Self {
        self.fault_injector = FaultInjector::new(plan);
        self
    }

    /// Limits simulated physical memory to `pages` pages
    pub fn with_page_budget(mut self, pages: u64) -> Self {
        self.loader.spaces_mut().set_page_budget(Some(pages));
        self
    }

    /// Limits the number of live threads
    pub fn with_max_threads(mut self, max: usize) -> Self {
        self.scheduler.set_max_threads(Some(max));
        self
    }

    pub fn config(&self) -> &UserModeConfig {
        &self.config
    }

    /// Spawns a user process
    pub fn spawn(&mut self, program: &str, command_line: &str) -> Result<Pid, SpawnError> {
        self.spawn_with_handle(program, command_line)
            .map(|process| process.pid)
    }

    pub fn spawn_with_handle(
        &mut self,
        program: &str,
        command_line: &str,
    ) -> Result<SpawnedProcess, SpawnError> {
        let config = self.config.clone();
        Spawner::with_config(self, &config).spawn_with_handle(program, command_line)
    }

    /// Starts a kernel-mode thread; `None` if thread allocation fails
    pub fn spawn_kernel_thread(&mut self) -> Option<Pid> {
        let thread = self.create_user_thread(true)?;
        Some(self.start_user_thread(thread))
    }

    /// Runs `pid` on the CPU, switching address spaces if needed
    ///
    /// Returns `None` for an unknown pid.
    pub fn dispatch(&mut self, pid: Pid) -> Option<SwitchOutcome> {
        if !self.scheduler.set_current(pid) {
            return None;
        }
        let thread = self.scheduler.thread(pid)?;

        let outcome = {
            let guard = InterruptGuard::new(&mut self.interrupts);
            self.active_context
                .switch_to_user_context(&guard, thread, &mut self.mmu)
        };

        self.audit_log.record(SimEvent::Dispatched { pid, outcome });
        Some(outcome)
    }

    /// Picks the next runnable thread round-robin and dispatches it
    pub fn schedule_next(&mut self) -> Option<(Pid, SwitchOutcome)> {
        let pid = self.scheduler.next_runnable()?;
        self.dispatch(pid).map(|outcome| (pid, outcome))
    }

    /// Tears down a thread, releasing its user context
    ///
    /// Returns `None` for an unknown pid.
    pub fn exit(&mut self, pid: Pid) -> Option<DetachOutcome> {
        let mut thread = self.scheduler.remove(pid)?;
        let outcome = detach_user_context(&mut self.interrupts, &mut self.loader, &mut thread);
        if matches!(outcome, DetachOutcome::Destroyed(_)) {
            self.calls.destroys += 1;
        }
        self.audit_log
            .record(SimEvent::ThreadExited { pid, outcome });
        Some(outcome)
    }

    pub fn thread(&self, pid: Pid) -> Option<&KernelThread> {
        self.scheduler.thread(pid)
    }

    pub fn current(&self) -> Option<Pid> {
        self.scheduler.current()
    }

    pub fn thread_count(&self) -> usize {
        self.scheduler.thread_count()
    }

    /// Contexts loaded and not yet destroyed
    pub fn live_contexts(&self) -> usize {
        self.loader.live_contexts()
    }

    pub fn live_address_spaces(&self) -> usize {
        self.loader.spaces().live_spaces()
    }

    pub fn pages_in_use(&self) -> u64 {
        self.loader.spaces().pages_in_use()
    }

    pub fn calls(&self) -> CallCounts {
        self.calls
    }

    pub fn fs(&self) -> &F {
        &self.fs
    }

    pub fn fs_mut(&mut self) -> &mut F {
        &mut self.fs
    }

    pub fn interrupts(&self) -> &SimInterrupts {
        &self.interrupts
    }

    pub fn mmu(&self) -> &SimMmu {
        &self.mmu
    }

    pub fn active_context(&self) -> &ActiveContextCache {
        &self.active_context
    }

    pub fn loader(&self) -> &SimLoader {
        &self.loader
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn fault_injector(&self) -> &FaultInjector {
        &self.fault_injector
    }

    /// Returns the audit log (test-only)
    pub fn audit_log(&self) -> &SimAuditLog {
        &self.audit_log
    }

    /// Clears the audit log (test-only)
    pub fn clear_audit_log(&mut self) {
        self.audit_log.clear();
    }
}

impl<F: FileSystem> FileSystem for SimulatedKernel<F> {
    fn read_fully(&mut self, path: &str) -> Result<Vec<u8>, FsError> {
        self.calls.reads += 1;
        if self.fault_injector.should_fail_read(path) {
            return Err(FsError::Io(format!("injected read failure on {}", path)));
        }
        self.fs.read_fully(path)
    }
}

impl<F: FileSystem> ProgramLoader for SimulatedKernel<F> {
    fn load_user_program(
        &mut self,
        image: &[u8],
        layout: &ExecutableLayout,
        command_line: &str,
    ) -> Result<ProcessContext, LoadError> {
        self.calls.loads += 1;
        if self.fault_injector.should_fail_load() {
            return Err(LoadError::OutOfMemory);
        }
        self.loader.load_user_program(image, layout, command_line)
    }
}

impl<F: FileSystem> ContextDestroyer for SimulatedKernel<F> {
    fn destroy_context(&mut self, context: ProcessContext) {
        self.calls.destroys += 1;
        self.loader.destroy_context(context);
    }
}

impl<F: FileSystem> ThreadFactory for SimulatedKernel<F> {
    fn create_user_thread(&mut self, is_kernel_thread: bool) -> Option<KernelThread> {
        self.calls.thread_creates += 1;
        if self.fault_injector.should_fail_thread_creation() {
            return None;
        }
        self.scheduler.create_thread(is_kernel_thread)
    }

    fn start_user_thread(&mut self, thread: KernelThread) -> Pid {
        self.scheduler.start(thread)
    }
}

impl<F: FileSystem> InterruptHal for SimulatedKernel<F> {
    fn enable_interrupts(&mut self) {
        self.interrupts.enable_interrupts();
    }

    fn disable_interrupts(&mut self) {
        self.interrupts.disable_interrupts();
    }

    fn interrupts_enabled(&self) -> bool {
        self.interrupts.interrupts_enabled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault_injection::SpawnFault;
    use crate::test_utils::{kernel_with_program, two_segment_program};
    use user_process::ErrorKind;

    #[test]
    fn test_spawn_and_dispatch() {
        let mut kernel = kernel_with_program("/c/init.exe", two_segment_program());
        let pid = kernel.spawn("/c/init.exe", "init").unwrap();

        assert_eq!(kernel.thread_count(), 1);
        assert_eq!(kernel.live_contexts(), 1);
        assert!(kernel.interrupts().interrupts_enabled());

        let outcome = kernel.dispatch(pid).unwrap();
        assert!(matches!(outcome, SwitchOutcome::Switched { from: None, .. }));
        let space = kernel
            .thread(pid)
            .and_then(|t| t.user_context())
            .map(|c| c.address_space());
        assert_eq!(kernel.mmu().active_space(), space);
        assert_eq!(kernel.current(), Some(pid));
    }

    #[test]
    fn test_dispatch_unknown_pid() {
        let mut kernel = SimulatedKernel::new();
        assert_eq!(kernel.dispatch(Pid::new(42)), None);
    }

    #[test]
    fn test_exit_destroys_context() {
        let mut kernel = kernel_with_program("/c/init.exe", two_segment_program());
        let pid = kernel.spawn("/c/init.exe", "").unwrap();

        let outcome = kernel.exit(pid).unwrap();
        assert!(matches!(outcome, DetachOutcome::Destroyed(_)));
        assert_eq!(kernel.calls().destroys, 1);
        assert_eq!(kernel.live_contexts(), 0);
        assert_eq!(kernel.live_address_spaces(), 0);
        assert_eq!(kernel.pages_in_use(), 0);
        assert_eq!(kernel.exit(pid), None);
    }

    #[test]
    fn test_kernel_thread_exit_has_no_context() {
        let mut kernel = SimulatedKernel::new();
        let pid = kernel.spawn_kernel_thread().unwrap();

        assert_eq!(kernel.dispatch(pid), Some(SwitchOutcome::KernelThread));
        assert_eq!(kernel.exit(pid), Some(DetachOutcome::NoContext));
        assert_eq!(kernel.calls().destroys, 0);
    }

    #[test]
    fn test_schedule_next_round_robin() {
        let mut kernel = kernel_with_program("/c/init.exe", two_segment_program());
        let a = kernel.spawn("/c/init.exe", "a").unwrap();
        let b = kernel.spawn("/c/init.exe", "b").unwrap();

        let picked: Vec<Pid> = (0..4)
            .filter_map(|_| kernel.schedule_next())
            .map(|(pid, _)| pid)
            .collect();
        assert_eq!(picked, vec![a, b, a, b]);
        assert_eq!(kernel.mmu().switch_count(), 4);
    }

    #[test]
    fn test_injected_read_failure() {
        let mut kernel = kernel_with_program("/c/init.exe", two_segment_program())
            .with_fault_plan(FaultPlan::new().with_spawn_fault(SpawnFault::ReadIoError));

        let err = kernel.spawn("/c/init.exe", "").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(kernel.calls().loads, 0);

        assert!(kernel.spawn("/c/init.exe", "").is_ok());
    }

    #[test]
    fn test_clear_audit_log_between_phases() {
        let mut kernel = kernel_with_program("/c/init.exe", two_segment_program());
        let pid = kernel.spawn("/c/init.exe", "").unwrap();
        let context = kernel
            .thread(pid)
            .and_then(|t| t.user_context())
            .map(|c| c.id())
            .unwrap();
        kernel.dispatch(pid);
        kernel.dispatch(pid);
        assert_eq!(kernel.audit_log().events().len(), 2);

        kernel.clear_audit_log();
        assert!(kernel.audit_log().events().is_empty());

        kernel.exit(pid);
        assert_eq!(
            kernel.audit_log().events(),
            &[SimEvent::ThreadExited {
                pid,
                outcome: DetachOutcome::Destroyed(context),
            }]
        );
    }

    #[test]
    #[should_panic(expected = "not a power of two")]
    fn test_spawn_refuses_zero_entry_alignment() {
        let mut kernel = SimulatedKernel::with_config(UserModeConfig {
            entry_alignment: 0,
            ..UserModeConfig::default()
        });
        kernel.add_program("/c/init.exe", two_segment_program());
        let _ = kernel.spawn("/c/init.exe", "");
    }

    #[test]
    fn test_interrupts_restored_after_spawn_and_dispatch() {
        let mut kernel = kernel_with_program("/c/init.exe", two_segment_program());
        let pid = kernel.spawn("/c/init.exe", "").unwrap();
        kernel.dispatch(pid);
        kernel.exit(pid);

        let irq = kernel.interrupts();
        assert!(irq.interrupts_enabled());
        assert_eq!(irq.disable_count(), irq.enable_count());
        assert_eq!(irq.disable_count(), 3);
    }
}
