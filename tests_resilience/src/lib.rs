//! Resilience Test Utilities
//!
//! Shared helpers for the process-support integration tests.
//!
//! ## Test Philosophy
//!
//! - **Safety under faults**: a failed spawn leaves no context, address
//!   space or thread behind
//! - **Deterministic failures**: all faults are reproducible via `FaultPlan`
//! - **Destroy exactly once**: every loaded context is destroyed once and
//!   only once, whichever path releases it

use core_types::Pid;
use sim_kernel::test_utils::two_segment_program;
use sim_kernel::SimulatedKernel;

/// Path of the default program in [`test_bootstrap`]
pub const INIT_PATH: &str = "/c/init.exe";

/// Bootstrap helper for tests
///
/// Creates a kernel with a two-segment program at [`INIT_PATH`].
pub fn test_bootstrap() -> SimulatedKernel {
    let mut kernel = SimulatedKernel::new();
    kernel.add_program(INIT_PATH, two_segment_program());
    kernel
}

/// Spawns `count` copies of the default program
pub fn spawn_many(kernel: &mut SimulatedKernel, count: usize) -> Vec<Pid> {
    (0..count)
        .map(|i| {
            kernel
                .spawn(INIT_PATH, &format!("init {}", i))
                .expect("Failed to spawn init")
        })
        .collect()
}

/// Checks that nothing loaded is left over once every thread is gone
pub fn assert_no_leaks(kernel: &SimulatedKernel) {
    assert_eq!(kernel.live_contexts(), 0, "process contexts leaked");
    assert_eq!(kernel.live_address_spaces(), 0, "address spaces leaked");
    assert_eq!(kernel.pages_in_use(), 0, "pages leaked");
}
