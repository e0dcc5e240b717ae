//! Process contexts and the kernel threads that carry them

use core_types::{AddressSpaceId, ContextId, Pid, ThreadId};
use hal::{InterruptGuard, InterruptHal};

/// A fully loaded user address space plus the process metadata that goes
/// with it
///
/// Contexts are deliberately not `Clone`: exactly one kernel thread may hold
/// a context, and `ref_count` is either 0 (freshly loaded, or on its way to
/// destruction) or 1 (attached).
#[derive(Debug)]
pub struct ProcessContext {
    id: ContextId,
    address_space: AddressSpaceId,
    entry_address: u64,
    stack_pointer: u64,
    argument_block: u64,
    command_line: String,
    ref_count: u32,
}

impl ProcessContext {
    /// Creates an unattached context
    ///
    /// Called by the loader once the address space is populated and the
    /// stack and argument block are in place.
    pub fn new(
        address_space: AddressSpaceId,
        entry_address: u64,
        stack_pointer: u64,
        argument_block: u64,
        command_line: String,
    ) -> Self {
        Self {
            id: ContextId::new(),
            address_space,
            entry_address,
            stack_pointer,
            argument_block,
            command_line,
            ref_count: 0,
        }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn address_space(&self) -> AddressSpaceId {
        self.address_space
    }

    pub fn entry_address(&self) -> u64 {
        self.entry_address
    }

    /// Initial user stack pointer
    pub fn stack_pointer(&self) -> u64 {
        self.stack_pointer
    }

    /// User address of the argument block holding the command line
    pub fn argument_block(&self) -> u64 {
        self.argument_block
    }

    pub fn command_line(&self) -> &str {
        &self.command_line
    }

    pub fn ref_count(&self) -> u32 {
        self.ref_count
    }

    /// Takes the single reference
    ///
    /// # Panics
    ///
    /// If the context is already held. Sharing a context between threads is
    /// unsupported, so this is a caller bug rather than a recoverable error.
    pub fn acquire<I: InterruptHal + ?Sized>(&mut self, _guard: &InterruptGuard<'_, I>) -> u32 {
        assert_eq!(
            self.ref_count, 0,
            "user context {} is already attached to a thread",
            self.id
        );
        self.ref_count += 1;
        self.ref_count
    }

    /// Drops the reference and returns the remaining count
    ///
    /// # Panics
    ///
    /// If the context holds no reference.
    pub fn release<I: InterruptHal + ?Sized>(&mut self, _guard: &InterruptGuard<'_, I>) -> u32 {
        assert!(
            self.ref_count > 0,
            "user context {} released without being attached",
            self.id
        );
        self.ref_count -= 1;
        self.ref_count
    }
}

/// Kernel stack of a thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelStack {
    pub base: u64,
    pub size: u64,
}

impl KernelStack {
    pub fn new(base: u64, size: u64) -> Self {
        Self { base, size }
    }

    /// Initial stack pointer: the stack grows down from the end of the
    /// allocation
    pub fn top(&self) -> u64 {
        self.base + self.size
    }
}

/// A schedulable kernel thread
///
/// A thread with no user context is a kernel-mode thread and runs in
/// whatever address space happens to be loaded.
#[derive(Debug)]
pub struct KernelThread {
    id: ThreadId,
    pid: Pid,
    kernel_stack: KernelStack,
    is_kernel_thread: bool,
    user_context: Option<ProcessContext>,
}

impl KernelThread {
    pub fn new(pid: Pid, kernel_stack: KernelStack, is_kernel_thread: bool) -> Self {
        Self {
            id: ThreadId::new(),
            pid,
            kernel_stack,
            is_kernel_thread,
            user_context: None,
        }
    }

    pub fn id(&self) -> ThreadId {
        self.id
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn kernel_stack(&self) -> KernelStack {
        self.kernel_stack
    }

    pub fn is_kernel_thread(&self) -> bool {
        self.is_kernel_thread
    }

    pub fn user_context(&self) -> Option<&ProcessContext> {
        self.user_context.as_ref()
    }

    /// Stores a context in the thread, returning whatever was there
    ///
    /// Requires a critical section so the store and the refcount update that
    /// goes with it are seen together.
    pub fn set_user_context<I: InterruptHal + ?Sized>(
        &mut self,
        context: ProcessContext,
        _guard: &InterruptGuard<'_, I>,
    ) -> Option<ProcessContext> {
        self.user_context.replace(context)
    }

    /// Removes and returns the thread's context
    pub fn take_user_context(&mut self) -> Option<ProcessContext> {
        self.user_context.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Flag(bool);

    impl InterruptHal for Flag {
        fn enable_interrupts(&mut self) {
            self.0 = true;
        }

        fn disable_interrupts(&mut self) {
            self.0 = false;
        }

        fn interrupts_enabled(&self) -> bool {
            self.0
        }
    }

    fn context() -> ProcessContext {
        ProcessContext::new(AddressSpaceId::new(), 0x1000, 0x7fff_f000, 0x7fff_e000, "a".into())
    }

    #[test]
    fn test_acquire_release_cycle() {
        let mut irq = Flag(true);
        let mut ctx = context();
        let guard = InterruptGuard::new(&mut irq);
        assert_eq!(ctx.acquire(&guard), 1);
        assert_eq!(ctx.release(&guard), 0);
    }

    #[test]
    #[should_panic(expected = "already attached")]
    fn test_double_acquire_panics() {
        let mut irq = Flag(true);
        let mut ctx = context();
        let guard = InterruptGuard::new(&mut irq);
        ctx.acquire(&guard);
        ctx.acquire(&guard);
    }

    #[test]
    #[should_panic(expected = "without being attached")]
    fn test_release_unattached_panics() {
        let mut irq = Flag(true);
        let mut ctx = context();
        let guard = InterruptGuard::new(&mut irq);
        ctx.release(&guard);
    }

    #[test]
    fn test_kernel_stack_top() {
        let stack = KernelStack::new(0xc000_0000, 4096);
        assert_eq!(stack.top(), 0xc000_1000);
    }

    #[test]
    fn test_thread_context_slot() {
        let mut irq = Flag(true);
        let mut thread = KernelThread::new(Pid::new(3), KernelStack::new(0, 4096), false);
        assert!(thread.user_context().is_none());

        let ctx = context();
        let id = ctx.id();
        {
            let guard = InterruptGuard::new(&mut irq);
            assert!(thread.set_user_context(ctx, &guard).is_none());
        }
        assert_eq!(thread.user_context().map(|c| c.id()), Some(id));
        assert_eq!(thread.take_user_context().map(|c| c.id()), Some(id));
        assert!(thread.user_context().is_none());
    }
}
