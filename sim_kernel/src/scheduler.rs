//! Thread table and run queue
//!
//! ## Philosophy
//!
//! - **Mechanism, not policy**: round-robin over runnable threads, nothing
//!   more
//! - **Determinism first**: same spawns in the same order give the same pids
//!   and the same schedule
//!
//! Threads are created in two steps, mirroring the kernel: allocation (pid
//! and kernel stack, thread not yet runnable) and start (thread placed in the
//! table and at the back of the run queue).

use core_types::Pid;
use kernel_api::{KernelStack, KernelThread};
use std::collections::{HashMap, VecDeque};

/// Base address of the first kernel stack
pub const KERNEL_STACK_BASE: u64 = 0xc000_0000;

/// Scheduler events for auditing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleEvent {
    /// Thread allocated
    Created { pid: Pid, is_kernel_thread: bool },
    /// Thread allocation refused
    CreationRefused,
    /// Thread became runnable
    Started { pid: Pid },
    /// Thread picked to run
    Selected { pid: Pid },
    /// Thread removed from the table
    Exited { pid: Pid },
}

/// Round-robin scheduler over kernel threads
#[derive(Debug)]
pub struct Scheduler {
    threads: HashMap<Pid, KernelThread>,
    run_queue: VecDeque<Pid>,
    next_pid: Pid,
    kernel_stack_size: u64,
    stacks_allocated: u64,
    max_threads: Option<usize>,
    current: Option<Pid>,
    audit_log: Vec<ScheduleEvent>,
}

impl Scheduler {
    pub fn new(kernel_stack_size: u64) -> Self {
        Self {
            threads: HashMap::new(),
            run_queue: VecDeque::new(),
            next_pid: Pid::new(1),
            kernel_stack_size,
            stacks_allocated: 0,
            max_threads: None,
            current: None,
            audit_log: Vec::new(),
        }
    }

    /// Limits the number of live threads; further creations fail
    pub fn set_max_threads(&mut self, max: Option<usize>) {
        self.max_threads = max;
    }

    /// Allocates a thread with a fresh pid and kernel stack
    pub fn create_thread(&mut self, is_kernel_thread: bool) -> Option<KernelThread> {
        if matches!(self.max_threads, Some(max) if self.threads.len() >= max) {
            self.audit_log.push(ScheduleEvent::CreationRefused);
            return None;
        }

        let pid = self.next_pid;
        self.next_pid = pid.next();

        let base = KERNEL_STACK_BASE + self.stacks_allocated * self.kernel_stack_size;
        self.stacks_allocated += 1;
        let stack = KernelStack::new(base, self.kernel_stack_size);

        self.audit_log.push(ScheduleEvent::Created {
            pid,
            is_kernel_thread,
        });
        Some(KernelThread::new(pid, stack, is_kernel_thread))
    }

    /// Makes a thread runnable
    pub fn start(&mut self, thread: KernelThread) -> Pid {
        let pid = thread.pid();
        self.threads.insert(pid, thread);
        self.run_queue.push_back(pid);
        self.audit_log.push(ScheduleEvent::Started { pid });
        pid
    }

    /// Picks the next runnable thread and rotates it to the back of the queue
    pub fn next_runnable(&mut self) -> Option<Pid> {
        let pid = self.run_queue.pop_front()?;
        self.run_queue.push_back(pid);
        self.current = Some(pid);
        self.audit_log.push(ScheduleEvent::Selected { pid });
        Some(pid)
    }

    /// Marks `pid` as the running thread without touching the queue order
    pub fn set_current(&mut self, pid: Pid) -> bool {
        if self.threads.contains_key(&pid) {
            self.current = Some(pid);
            true
        } else {
            false
        }
    }

    /// Removes a thread from the table and the run queue
    pub fn remove(&mut self, pid: Pid) -> Option<KernelThread> {
        let thread = self.threads.remove(&pid)?;
        self.run_queue.retain(|queued| *queued != pid);
        if self.current == Some(pid) {
            self.current = None;
        }
        self.audit_log.push(ScheduleEvent::Exited { pid });
        Some(thread)
    }

    pub fn thread(&self, pid: Pid) -> Option<&KernelThread> {
        self.threads.get(&pid)
    }

    pub fn current(&self) -> Option<Pid> {
        self.current
    }

    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }

    pub fn runnable_count(&self) -> usize {
        self.run_queue.len()
    }

    /// Returns the audit log (test-only)
    pub fn audit_log(&self) -> &[ScheduleEvent] {
        &self.audit_log
    }
}
