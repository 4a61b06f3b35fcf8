// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Physical page allocation, Sv32 page tables and checked user-memory access
//! OWNERS: @kernel-mm-team
//! PUBLIC API: FrameAllocator, PageSpan, PageTable, PageFlags, UserSpace, PAGE_SIZE
//! DEPENDS_ON: types::{PhysAddr, VirtAddr}, bitflags
//! INVARIANTS: Pages are never freed; every physical access goes through the allocator window
//! ADR: docs/adr/0001-runtime-roles-and-boundaries.md

pub mod frame;
pub mod page_table;
pub mod user;

/// Size of a single page in bytes.
pub const PAGE_SIZE: usize = 4096;

pub use frame::{AllocError, FrameAllocator, PageSpan};
pub use page_table::{MapError, PageFlags, PageTable, SATP_SV32};
pub use user::{UserCopyError, UserSpace};

#[cfg(test)]
mod tests_prop;
