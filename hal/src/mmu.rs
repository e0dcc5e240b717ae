//! Address-space switching abstraction

use core_types::AddressSpaceId;

/// MMU and task-state operations needed on a context switch
///
/// Both operations are only meaningful with interrupts disabled; callers
/// hold an [`InterruptGuard`](crate::InterruptGuard) around them.
pub trait MmuHal {
    /// Loads the page-table root of `space` into the hardware
    fn switch_address_space(&mut self, space: AddressSpaceId);

    /// Sets the stack pointer the CPU loads when trapping from user mode
    fn set_kernel_stack_pointer(&mut self, address: u64);
}
