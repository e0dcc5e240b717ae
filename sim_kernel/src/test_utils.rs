//! Test utilities for resilience testing
//!
//! Canned executables and kernel setups shared by the unit tests here and
//! the integration tests in `tests_resilience`.

use crate::fault_injection::FaultPlan;
use crate::SimulatedKernel;
use core_types::Pid;
use kernel_api::SegmentFlags;

pub use user_process::ElfImageBuilder;

/// Text at 0x1000 and data at 0x2000, entry 0x1000
pub fn two_segment_program() -> Vec<u8> {
    ElfImageBuilder::new(0x1000)
        .segment(0x40, 0x100, 0x1000, 0x100, SegmentFlags::rx())
        .segment(0x140, 0x20, 0x2000, 0x80, SegmentFlags::rw())
        .build()
}

/// Single text segment holding `code`, loaded at `entry`
pub fn program_with_code(entry: u64, code: Vec<u8>) -> Vec<u8> {
    let size = code.len() as u64;
    ElfImageBuilder::new(entry)
        .segment_with_data(code, entry, size, SegmentFlags::rx())
        .build()
}

/// An image declaring one more segment than a layout can hold
pub fn too_many_segments_program() -> Vec<u8> {
    let mut builder = ElfImageBuilder::new(0x1000);
    for i in 0..=kernel_api::MAX_SEGMENTS as u64 {
        let start = 0x1000 * (i + 1);
        builder = builder.segment(0x40 + i * 0x10, 0x10, start, 0x10, SegmentFlags::rw());
    }
    builder.build()
}

/// Kernel whose in-memory filesystem holds one program
pub fn kernel_with_program(path: &str, image: Vec<u8>) -> SimulatedKernel {
    let mut kernel = SimulatedKernel::new();
    kernel.add_program(path, image);
    kernel
}

/// Runs `f` against a kernel holding `two_segment_program` at `path`,
/// with `plan` installed
pub fn with_fault_plan<F>(path: &str, plan: FaultPlan, f: F)
where
    F: FnOnce(&mut SimulatedKernel),
{
    let mut kernel = kernel_with_program(path, two_segment_program()).with_fault_plan(plan);
    f(&mut kernel);
}

/// Dispatches each pid in turn, returning how many address-space switches
/// the sequence caused
pub fn dispatch_sequence(kernel: &mut SimulatedKernel, pids: &[Pid]) -> usize {
    let before = kernel.mmu().switch_count();
    for pid in pids {
        kernel.dispatch(*pid);
    }
    kernel.mmu().switch_count() - before
}
