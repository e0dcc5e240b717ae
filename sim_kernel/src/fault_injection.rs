//! Deterministic fault injection for testing
//!
//! Lets tests force the failures a real kernel hits under memory pressure or
//! a bad disk, at a chosen call, without tuning page budgets by hand.
//!
//! ## Design Philosophy
//!
//! - **Deterministic**: a fault fires on a counted call, never at random
//! - **One-shot**: each planned fault fires once, then the operation
//!   behaves normally again
//! - **Test-focused**: not intended for production use
//!
//! ## Example
//!
//! ```
//! use sim_kernel::fault_injection::{FaultPlan, SpawnFault};
//!
//! let plan = FaultPlan::new()
//!     .with_spawn_fault(SpawnFault::LoaderOutOfMemory)
//!     .with_spawn_fault(SpawnFault::ThreadCreationFails);
//! assert_eq!(plan.spawn_faults().len(), 2);
//! ```

/// A fault to inject into the spawn path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpawnFault {
    /// The next file read fails with an I/O error
    ReadIoError,

    /// The next read of this path fails with an I/O error
    ReadIoErrorOn { path: String },

    /// The next program load runs out of memory
    LoaderOutOfMemory,

    /// Program loads succeed `count` times, then the next one runs out of memory
    LoaderOutOfMemoryAfter { count: usize },

    /// The next user thread cannot be allocated
    ThreadCreationFails,
}

/// A plan describing all faults to inject
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    spawn_faults: Vec<SpawnFault>,
}

impl FaultPlan {
    /// Creates a new empty fault plan
    pub fn new() -> Self {
        Self {
            spawn_faults: Vec::new(),
        }
    }

    /// Adds a spawn fault to the plan
    pub fn with_spawn_fault(mut self, fault: SpawnFault) -> Self {
        self.spawn_faults.push(fault);
        self
    }

    /// Returns a reference to the spawn faults
    pub fn spawn_faults(&self) -> &[SpawnFault] {
        &self.spawn_faults
    }
}

/// Fault injector consulted by the simulated kernel's collaborators
#[derive(Debug, Default)]
pub struct FaultInjector {
    pending: Vec<SpawnFault>,
    loads_seen: usize,
    faults_fired: usize,
}

impl FaultInjector {
    /// Creates a new fault injector with the given plan
    pub fn new(plan: FaultPlan) -> Self {
        Self {
            pending: plan.spawn_faults,
            loads_seen: 0,
            faults_fired: 0,
        }
    }

    /// Checks whether the read of `path` should fail
    pub fn should_fail_read(&mut self, path: &str) -> bool {
        self.fire(|fault| match fault {
            SpawnFault::ReadIoError => true,
            SpawnFault::ReadIoErrorOn { path: target } => target == path,
            _ => false,
        })
    }

    /// Checks whether the current program load should run out of memory
    pub fn should_fail_load(&mut self) -> bool {
        let seen = self.loads_seen;
        self.loads_seen += 1;
        self.fire(|fault| match fault {
            SpawnFault::LoaderOutOfMemory => true,
            SpawnFault::LoaderOutOfMemoryAfter { count } => seen >= *count,
            _ => false,
        })
    }

    /// Checks whether the current thread creation should fail
    pub fn should_fail_thread_creation(&mut self) -> bool {
        self.fire(|fault| matches!(fault, SpawnFault::ThreadCreationFails))
    }

    /// Number of faults that have fired so far
    pub fn faults_fired(&self) -> usize {
        self.faults_fired
    }

    /// Faults still waiting to fire
    pub fn pending(&self) -> &[SpawnFault] {
        &self.pending
    }

    fn fire<F>(&mut self, matches: F) -> bool
    where
        F: Fn(&SpawnFault) -> bool,
    {
        match self.pending.iter().position(matches) {
            Some(index) => {
                let fault = self.pending.remove(index);
                log::debug!("injecting fault {:?}", fault);
                self.faults_fired += 1;
                true
            }
            None => false,
        }
    }
}
