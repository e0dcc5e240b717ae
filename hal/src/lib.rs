//! # Hardware Abstraction Layer (HAL)
//!
//! Hardware seams used by user-mode process support.
//!
//! ## Design Principles
//!
//! 1. **Trait-based**: interrupt control and address-space switching go
//!    through traits so the simulated kernel can record every call
//! 2. **Critical sections are values**: an [`InterruptGuard`] is both the
//!    mechanism that masks interrupts and the proof, at the type level, that
//!    they are masked

pub mod interrupts;
pub mod mmu;

pub use interrupts::{without_interrupts, InterruptGuard, InterruptHal};
pub use mmu::MmuHal;
