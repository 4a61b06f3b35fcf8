// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Sv32 two-level page table with second-level tables allocated on demand.

use bitflags::bitflags;

use crate::types::{PhysAddr, VirtAddr};

use super::{AllocError, FrameAllocator, PAGE_SIZE};

/// Number of 32-bit entries per Sv32 table page.
const PT_ENTRIES: usize = 1024;
/// `satp.MODE` selecting Sv32.
pub const SATP_SV32: usize = 1 << 31;

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    /// Flags stored in Sv32 page-table entries.
    pub struct PageFlags: u32 {
        const VALID = 1 << 0;
        const READ = 1 << 1;
        const WRITE = 1 << 2;
        const EXECUTE = 1 << 3;
        const USER = 1 << 4;
        const GLOBAL = 1 << 5;
        const ACCESSED = 1 << 6;
        const DIRTY = 1 << 7;
    }
}

const LEAF_PERMS: PageFlags =
    PageFlags::READ.union(PageFlags::WRITE).union(PageFlags::EXECUTE);

/// Error returned when manipulating page tables.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MapError {
    /// Virtual or physical address was not page aligned.
    Unaligned,
    /// Flags grant no access, so the entry would not be a leaf.
    InvalidFlags,
    /// The first-level entry is a 4 MiB leaf; it cannot hold a second-level table.
    Superpage,
    /// A table page lies outside the allocator window.
    OutOfRange,
    /// No page left for a second-level table.
    OutOfMemory(AllocError),
}

impl From<AllocError> for MapError {
    fn from(value: AllocError) -> Self {
        Self::OutOfMemory(value)
    }
}

#[inline]
const fn pte(pa: PhysAddr, flags: PageFlags) -> u32 {
    (pa.ppn() << 10) | flags.bits()
}

#[inline]
const fn pte_addr(entry: u32) -> PhysAddr {
    PhysAddr::from_ppn(entry >> 10)
}

#[inline]
const fn pte_flags(entry: u32) -> PageFlags {
    PageFlags::from_bits_truncate(entry & 0x3ff)
}

/// Root of one process address space. Table pages live in allocator memory
/// and are never freed.
#[derive(Debug, PartialEq, Eq)]
pub struct PageTable {
    root: PhysAddr,
}

impl PageTable {
    /// Creates an empty table with a fresh root page.
    pub fn new(frames: &mut FrameAllocator) -> Result<Self, AllocError> {
        Ok(Self { root: frames.alloc_pages(1)? })
    }

    pub const fn root(&self) -> PhysAddr {
        self.root
    }

    /// SATP value activating this table.
    pub const fn satp(&self) -> usize {
        SATP_SV32 | self.root.ppn() as usize
    }

    /// Installs a 4 KiB mapping from `va` to `pa`, overwriting any previous
    /// leaf for `va`. `VALID` is implied.
    pub fn map_page(
        &mut self,
        frames: &mut FrameAllocator,
        va: VirtAddr,
        pa: PhysAddr,
        flags: PageFlags,
    ) -> Result<(), MapError> {
        if !va.is_page_aligned() || !pa.is_page_aligned() {
            return Err(MapError::Unaligned);
        }
        if flags.intersection(LEAF_PERMS).is_empty() {
            return Err(MapError::InvalidFlags);
        }

        let root = table_entries(frames, self.root)?;
        // SAFETY: vpn1 < PT_ENTRIES and `root` spans a whole table page.
        let l1 = unsafe { &mut *root.add(va.vpn1()) };
        if *l1 & PageFlags::VALID.bits() == 0 {
            let table = frames.alloc_pages(1)?;
            *l1 = pte(table, PageFlags::VALID);
        } else if pte_flags(*l1).intersects(LEAF_PERMS) {
            return Err(MapError::Superpage);
        }

        let leaf_table = table_entries(frames, pte_addr(*l1))?;
        // SAFETY: vpn0 < PT_ENTRIES.
        unsafe { *leaf_table.add(va.vpn0()) = pte(pa, flags | PageFlags::VALID) };
        Ok(())
    }

    /// Maps `len` bytes starting at `pa` to the same virtual addresses.
    pub fn identity_map(
        &mut self,
        frames: &mut FrameAllocator,
        pa: PhysAddr,
        len: usize,
        flags: PageFlags,
    ) -> Result<(), MapError> {
        for offset in (0..len).step_by(PAGE_SIZE) {
            let page = pa.checked_add(offset).ok_or(MapError::OutOfRange)?;
            self.map_page(frames, VirtAddr::new(page.raw()), page, flags)?;
        }
        Ok(())
    }

    /// Walks the table for `va`. Returns the physical address of that byte
    /// and the leaf flags.
    pub fn translate(&self, frames: &FrameAllocator, va: VirtAddr) -> Option<(PhysAddr, PageFlags)> {
        let root = table_entries(frames, self.root).ok()?;
        // SAFETY: vpn1 < PT_ENTRIES.
        let l1 = unsafe { *root.add(va.vpn1()) };
        if l1 & PageFlags::VALID.bits() == 0 || pte_flags(l1).intersects(LEAF_PERMS) {
            return None;
        }
        let leaf_table = table_entries(frames, pte_addr(l1)).ok()?;
        // SAFETY: vpn0 < PT_ENTRIES.
        let leaf = unsafe { *leaf_table.add(va.vpn0()) };
        if leaf & PageFlags::VALID.bits() == 0 {
            return None;
        }
        let pa = pte_addr(leaf).checked_add(va.page_offset())?;
        Some((pa, pte_flags(leaf)))
    }
}

fn table_entries(frames: &FrameAllocator, table: PhysAddr) -> Result<*mut u32, MapError> {
    debug_assert_eq!(PT_ENTRIES * core::mem::size_of::<u32>(), PAGE_SIZE);
    frames.ptr(table).map(|ptr| ptr.cast::<u32>()).ok_or(MapError::OutOfRange)
}
