//! Simulated interrupt controller and MMU
//!
//! Both record every operation so tests can count address-space switches
//! and check that interrupts were masked at the right moments.

use core_types::AddressSpaceId;
use hal::{InterruptHal, MmuHal};

/// Interrupt flag of the simulated CPU
#[derive(Debug, Clone)]
pub struct SimInterrupts {
    enabled: bool,
    disables: usize,
    enables: usize,
}

impl SimInterrupts {
    /// Interrupts start enabled, as on a running kernel
    pub fn new() -> Self {
        Self {
            enabled: true,
            disables: 0,
            enables: 0,
        }
    }

    /// Times interrupts were switched off
    pub fn disable_count(&self) -> usize {
        self.disables
    }

    pub fn enable_count(&self) -> usize {
        self.enables
    }
}

impl Default for SimInterrupts {
    fn default() -> Self {
        Self::new()
    }
}

impl InterruptHal for SimInterrupts {
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

/// Operation performed on the simulated MMU
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MmuOp {
    SwitchAddressSpace(AddressSpaceId),
    SetKernelStackPointer(u64),
}

/// Page-table root and task-state kernel stack pointer of the simulated CPU
#[derive(Debug, Clone, Default)]
pub struct SimMmu {
    active_space: Option<AddressSpaceId>,
    kernel_stack_pointer: Option<u64>,
    history: Vec<MmuOp>,
}

impl SimMmu {
    pub fn new() -> Self {
        Self::default()
    }

    /// Address space currently loaded
    pub fn active_space(&self) -> Option<AddressSpaceId> {
        self.active_space
    }

    /// Stack pointer loaded on the next trap from user mode
    pub fn kernel_stack_pointer(&self) -> Option<u64> {
        self.kernel_stack_pointer
    }

    /// Number of page-table root reloads
    pub fn switch_count(&self) -> usize {
        self.history
            .iter()
            .filter(|op| matches!(op, MmuOp::SwitchAddressSpace(_)))
            .count()
    }

    pub fn history(&self) -> &[MmuOp] {
        &self.history
    }
}

impl MmuHal for SimMmu {
    fn switch_address_space(&mut self, space: AddressSpaceId) {
        self.active_space = Some(space);
        self.history.push(MmuOp::SwitchAddressSpace(space));
    }

    fn set_kernel_stack_pointer(&mut self, address: u64) {
        self.kernel_stack_pointer = Some(address);
        self.history.push(MmuOp::SetKernelStackPointer(address));
    }
}
