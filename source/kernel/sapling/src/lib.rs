// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Sapling kernel library for a single-hart rv32 machine
//! OWNERS: @kernel-team
//! PUBLIC API: kmain(), Kernel, subsystem modules
//! DEPENDS_ON: sapling-hal, storage-virtio-blk
//! INVARIANTS: Architecture code is gated on riscv32 + target_os = "none"; everything else
//!             builds and tests on the host

#![cfg_attr(not(test), no_std)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

pub mod arch;
mod diag;
pub mod disk;
pub mod hal;
pub mod kmain;
pub mod layout;
pub mod mailbox;
pub mod mm;
pub mod responder;
pub mod sched;
pub mod syscall;
pub mod task;
pub mod trap;
pub mod types;
pub mod uart;

#[cfg(all(target_arch = "riscv32", target_os = "none", not(test)))]
mod panic;

#[cfg(test)]
mod test_support;

pub use diag::log;
pub use storage_virtio_blk::SECTOR_SIZE;

pub use kmain::Kernel;
#[cfg(all(target_arch = "riscv32", target_os = "none"))]
pub use kmain::kmain;
