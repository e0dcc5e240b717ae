//! Active-context switch cache
//!
//! Reloading the page-table root flushes the TLB, so dispatch remembers which
//! context is currently installed and skips the switch when the next thread
//! runs in the same one. The cache holds an identity only; it never keeps a
//! context alive.

use core_types::ContextId;
use hal::{InterruptGuard, InterruptHal, MmuHal};
use kernel_api::KernelThread;

/// What [`ActiveContextCache::switch_to_user_context`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchOutcome {
    /// Thread runs in kernel mode, hardware untouched
    KernelThread,
    /// Thread's context already installed, hardware untouched
    AlreadyActive(ContextId),
    /// Address space and kernel stack pointer reloaded
    Switched {
        from: Option<ContextId>,
        to: ContextId,
    },
}

/// Last context installed on one CPU
///
/// Context ids are never reused, so a stale entry left behind by a
/// destroyed context can never match a live one.
#[derive(Debug, Default)]
pub struct ActiveContextCache {
    cached: Option<ContextId>,
    hits: u64,
    misses: u64,
}

impl ActiveContextCache {
    /// Creates an empty cache; the first user thread dispatched always switches
    pub const fn new() -> Self {
        Self {
            cached: None,
            hits: 0,
            misses: 0,
        }
    }

    pub fn cached(&self) -> Option<ContextId> {
        self.cached
    }

    /// Dispatches that found their context already installed
    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// Dispatches that reloaded the hardware
    pub fn misses(&self) -> u64 {
        self.misses
    }

    /// Installs `thread`'s context on the MMU unless it is already there
    ///
    /// # Panics
    ///
    /// If interrupts are enabled. Holding the guard normally rules that
    /// out; the check catches a HAL that ignores the disable request.
    pub fn switch_to_user_context<I, M>(
        &mut self,
        guard: &InterruptGuard<'_, I>,
        thread: &KernelThread,
        mmu: &mut M,
    ) -> SwitchOutcome
    where
        I: InterruptHal + ?Sized,
        M: MmuHal + ?Sized,
    {
        assert!(
            !guard.interrupts_enabled(),
            "context switch with interrupts enabled"
        );

        let Some(context) = thread.user_context() else {
            return SwitchOutcome::KernelThread;
        };

        let to = context.id();
        if self.cached == Some(to) {
            self.hits += 1;
            log::trace!("context {} already active for thread {}", to, thread.id());
            return SwitchOutcome::AlreadyActive(to);
        }

        mmu.switch_address_space(context.address_space());
        mmu.set_kernel_stack_pointer(thread.kernel_stack().top());

        let from = self.cached.replace(to);
        self.misses += 1;
        log::trace!(
            "switched to context {} (space {}) for thread {}",
            to,
            context.address_space(),
            thread.id()
        );

        SwitchOutcome::Switched { from, to }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::attach_user_context;
    use core_types::{AddressSpaceId, Pid};
    use kernel_api::{KernelStack, ProcessContext};

    struct Irq(bool);

    impl InterruptHal for Irq {
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

    /// Ignores disable requests
    struct StuckOn;

    impl InterruptHal for StuckOn {
        fn enable_interrupts(&mut self) {}

        fn disable_interrupts(&mut self) {}

        fn interrupts_enabled(&self) -> bool {
            true
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum MmuCall {
        Space(AddressSpaceId),
        KernelStack(u64),
    }

    #[derive(Default)]
    struct RecordingMmu(Vec<MmuCall>);

    impl MmuHal for RecordingMmu {
        fn switch_address_space(&mut self, space: AddressSpaceId) {
            self.0.push(MmuCall::Space(space));
        }

        fn set_kernel_stack_pointer(&mut self, address: u64) {
            self.0.push(MmuCall::KernelStack(address));
        }
    }

    fn user_thread(irq: &mut Irq, stack_base: u64) -> (KernelThread, AddressSpaceId) {
        let mut thread = KernelThread::new(Pid::new(2), KernelStack::new(stack_base, 4096), false);
        let space = AddressSpaceId::new();
        let ctx = ProcessContext::new(space, 0x1000, 0x8000_0000, 0x7fff_f000, String::new());
        attach_user_context(irq, &mut thread, ctx);
        (thread, space)
    }

    #[test]
    fn test_first_dispatch_switches() {
        let mut irq = Irq(true);
        let (thread, space) = user_thread(&mut irq, 0xc000_0000);
        let mut cache = ActiveContextCache::new();
        let mut mmu = RecordingMmu::default();

        let guard = InterruptGuard::new(&mut irq);
        let outcome = cache.switch_to_user_context(&guard, &thread, &mut mmu);

        let id = thread.user_context().map(|c| c.id());
        assert!(matches!(outcome, SwitchOutcome::Switched { from: None, .. }));
        assert_eq!(cache.cached(), id);
        assert_eq!(
            mmu.0,
            vec![MmuCall::Space(space), MmuCall::KernelStack(0xc000_1000)]
        );
    }

    #[test]
    fn test_same_context_switches_once() {
        let mut irq = Irq(true);
        let (thread, _) = user_thread(&mut irq, 0xc000_0000);
        let mut cache = ActiveContextCache::new();
        let mut mmu = RecordingMmu::default();

        let guard = InterruptGuard::new(&mut irq);
        cache.switch_to_user_context(&guard, &thread, &mut mmu);
        let second = cache.switch_to_user_context(&guard, &thread, &mut mmu);

        assert!(matches!(second, SwitchOutcome::AlreadyActive(_)));
        assert_eq!(mmu.0.len(), 2);
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 1);
    }

    #[test]
    fn test_alternating_contexts_switch_every_time() {
        let mut irq = Irq(true);
        let (a, space_a) = user_thread(&mut irq, 0xc000_0000);
        let (b, space_b) = user_thread(&mut irq, 0xc010_0000);
        let mut cache = ActiveContextCache::new();
        let mut mmu = RecordingMmu::default();

        let guard = InterruptGuard::new(&mut irq);
        for thread in [&a, &b, &a, &b] {
            let outcome = cache.switch_to_user_context(&guard, thread, &mut mmu);
            assert!(matches!(outcome, SwitchOutcome::Switched { .. }));
        }

        let spaces: Vec<AddressSpaceId> = mmu
            .0
            .iter()
            .filter_map(|call| match call {
                MmuCall::Space(space) => Some(*space),
                MmuCall::KernelStack(_) => None,
            })
            .collect();
        assert_eq!(spaces, vec![space_a, space_b, space_a, space_b]);
        assert_eq!(cache.misses(), 4);
    }

    #[test]
    fn test_kernel_thread_leaves_cache_alone() {
        let mut irq = Irq(true);
        let (user, _) = user_thread(&mut irq, 0xc000_0000);
        let kthread = KernelThread::new(Pid::new(1), KernelStack::new(0xc020_0000, 4096), true);
        let mut cache = ActiveContextCache::new();
        let mut mmu = RecordingMmu::default();

        let guard = InterruptGuard::new(&mut irq);
        cache.switch_to_user_context(&guard, &user, &mut mmu);
        let before = cache.cached();

        let outcome = cache.switch_to_user_context(&guard, &kthread, &mut mmu);
        assert_eq!(outcome, SwitchOutcome::KernelThread);
        assert_eq!(cache.cached(), before);
        assert_eq!(mmu.0.len(), 2);

        // Returning to the same user thread after a kernel thread is free.
        let back = cache.switch_to_user_context(&guard, &user, &mut mmu);
        assert!(matches!(back, SwitchOutcome::AlreadyActive(_)));
    }

    #[test]
    #[should_panic(expected = "interrupts enabled")]
    fn test_switch_with_interrupts_enabled_panics() {
        let mut irq = Irq(false);
        let (thread, _) = user_thread(&mut irq, 0);
        let mut cache = ActiveContextCache::new();
        let mut mmu = RecordingMmu::default();
        let mut broken = StuckOn;

        let guard = InterruptGuard::new(&mut broken);
        cache.switch_to_user_context(&guard, &thread, &mut mmu);
    }
}
