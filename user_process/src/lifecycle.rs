//! Context lifecycle
//!
//! A process context is attached to exactly one kernel thread and destroyed
//! when that thread lets go of it. The reference count lives in the context
//! and only changes inside an interrupt-disabled critical section.

use core_types::ContextId;
use hal::{InterruptGuard, InterruptHal};
use kernel_api::{ContextDestroyer, KernelThread, ProcessContext};

/// What [`detach_user_context`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetachOutcome {
    /// Kernel-mode thread, nothing to release
    NoContext,
    /// Last reference dropped and the context destroyed
    Destroyed(ContextId),
}

/// Attaches a freshly loaded context to a thread
///
/// # Panics
///
/// If the context is already attached, or the thread already carries a
/// context.
pub fn attach_user_context<I: InterruptHal + ?Sized>(
    interrupts: &mut I,
    thread: &mut KernelThread,
    mut context: ProcessContext,
) {
    assert!(
        thread.user_context().is_none(),
        "thread {} already has a user context",
        thread.id()
    );

    let context_id = context.id();
    let guard = InterruptGuard::new(interrupts);
    context.acquire(&guard);
    thread.set_user_context(context, &guard);
    drop(guard);

    log::debug!("attached context {} to thread {}", context_id, thread.id());
}

/// Detaches a thread's context, destroying it when the last reference goes
///
/// Safe to call on any thread; kernel-mode threads report
/// [`DetachOutcome::NoContext`].
pub fn detach_user_context<I, D>(
    interrupts: &mut I,
    destroyer: &mut D,
    thread: &mut KernelThread,
) -> DetachOutcome
where
    I: InterruptHal + ?Sized,
    D: ContextDestroyer + ?Sized,
{
    let (context, remaining) = {
        let guard = InterruptGuard::new(interrupts);
        let Some(mut context) = thread.take_user_context() else {
            return DetachOutcome::NoContext;
        };
        let remaining = context.release(&guard);
        (context, remaining)
    };

    // A context has a single owner, so releasing the thread's reference
    // always drops the count to zero.
    assert_eq!(
        remaining,
        0,
        "context {} still referenced after detach",
        context.id()
    );

    let context_id = context.id();
    log::debug!(
        "detached context {} from thread {}, destroying",
        context_id,
        thread.id()
    );
    destroyer.destroy_context(context);
    DetachOutcome::Destroyed(context_id)
}
