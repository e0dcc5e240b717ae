//! Interrupt handling abstraction

/// Interrupt controller
///
/// On a uniprocessor kernel masking interrupts is the only synchronization
/// primitive: a read-modify-write done with interrupts disabled cannot be
/// torn by a timer tick.
pub trait InterruptHal {
    /// Enables interrupts
    fn enable_interrupts(&mut self);

    /// Disables interrupts
    fn disable_interrupts(&mut self);

    /// Returns whether interrupts are enabled
    fn interrupts_enabled(&self) -> bool;
}

impl<T: InterruptHal + ?Sized> InterruptHal for &mut T {
    fn enable_interrupts(&mut self) {
        (**self).enable_interrupts();
    }

    fn disable_interrupts(&mut self) {
        (**self).disable_interrupts();
    }

    fn interrupts_enabled(&self) -> bool {
        (**self).interrupts_enabled()
    }
}

/// Interrupt-disabled critical section
///
/// Disables interrupts on creation and restores the previous state when
/// dropped, so guards nest: an inner guard taken while interrupts are
/// already off leaves them off.
pub struct InterruptGuard<'a, I: InterruptHal + ?Sized> {
    hal: &'a mut I,
    was_enabled: bool,
}

impl<'a, I: InterruptHal + ?Sized> InterruptGuard<'a, I> {
    /// Enters a critical section
    pub fn new(hal: &'a mut I) -> Self {
        let was_enabled = hal.interrupts_enabled();
        if was_enabled {
            hal.disable_interrupts();
        }
        Self { hal, was_enabled }
    }

    /// Whether interrupts were enabled before this guard was taken
    pub fn was_enabled(&self) -> bool {
        self.was_enabled
    }

    /// Current interrupt state; false for as long as the guard lives
    pub fn interrupts_enabled(&self) -> bool {
        self.hal.interrupts_enabled()
    }
}

impl<I: InterruptHal + ?Sized> Drop for InterruptGuard<'_, I> {
    fn drop(&mut self) {
        if self.was_enabled {
            self.hal.enable_interrupts();
        }
    }
}

/// Runs `f` with interrupts disabled, restoring the previous state afterwards
pub fn without_interrupts<I, F, R>(hal: &mut I, f: F) -> R
where
    I: InterruptHal + ?Sized,
    F: FnOnce(&InterruptGuard<'_, I>) -> R,
{
    let guard = InterruptGuard::new(hal);
    f(&guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeInterrupts {
        enabled: bool,
        disables: usize,
        enables: usize,
    }

    impl FakeInterrupts {
        fn new(enabled: bool) -> Self {
            Self {
                enabled,
                disables: 0,
                enables: 0,
            }
        }
    }

    impl InterruptHal for FakeInterrupts {
        fn enable_interrupts(&mut self) {
            self.enables += 1;
            self.enabled = true;
        }

        fn disable_interrupts(&mut self) {
            self.disables += 1;
            self.enabled = false;
        }

        fn interrupts_enabled(&self) -> bool {
            self.enabled
        }
    }

    #[test]
    fn test_guard_disables_and_restores() {
        let mut hal = FakeInterrupts::new(true);
        {
            let guard = InterruptGuard::new(&mut hal);
            assert!(guard.was_enabled());
            assert!(!guard.interrupts_enabled());
        }
        assert!(hal.enabled);
        assert_eq!(hal.disables, 1);
        assert_eq!(hal.enables, 1);
    }

    #[test]
    fn test_guard_nested_keeps_disabled() {
        let mut hal = FakeInterrupts::new(true);
        {
            let mut outer = InterruptGuard::new(&mut hal);
            {
                let inner = InterruptGuard::new(&mut *outer.hal);
                assert!(!inner.was_enabled());
            }
            assert!(!outer.interrupts_enabled());
        }
        assert!(hal.enabled);
        assert_eq!(hal.enables, 1);
    }

    #[test]
    fn test_guard_leaves_disabled_state_alone() {
        let mut hal = FakeInterrupts::new(false);
        drop(InterruptGuard::new(&mut hal));
        assert!(!hal.enabled);
        assert_eq!(hal.disables, 0);
        assert_eq!(hal.enables, 0);
    }

    #[test]
    fn test_without_interrupts_returns_value() {
        let mut hal = FakeInterrupts::new(true);
        let seen = without_interrupts(&mut hal, |guard| guard.interrupts_enabled());
        assert!(!seen);
        assert!(hal.enabled);
    }
}
