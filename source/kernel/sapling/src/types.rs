// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Address and identity newtypes for the Sv32 kernel
//! OWNERS: @kernel-team
//! PUBLIC API: PhysAddr, VirtAddr, Pid
//! DEPENDS_ON: mm::PAGE_SIZE
//! INVARIANTS: Addresses are 32-bit; Pid 0 = unused slot, negative = idle, positive = user

use core::fmt;

use crate::mm::PAGE_SIZE;

/// Physical address as seen by the MMU and DMA devices.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct PhysAddr(u32);

impl PhysAddr {
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn is_page_aligned(self) -> bool {
        self.0 as usize % PAGE_SIZE == 0
    }

    /// Physical page number stored in page-table entries and SATP.
    #[inline]
    pub const fn ppn(self) -> u32 {
        self.0 / PAGE_SIZE as u32
    }

    #[inline]
    pub const fn from_ppn(ppn: u32) -> Self {
        Self(ppn.wrapping_mul(PAGE_SIZE as u32))
    }

    #[inline]
    pub fn checked_add(self, bytes: usize) -> Option<Self> {
        u32::try_from(bytes).ok().and_then(|b| self.0.checked_add(b)).map(Self)
    }
}

impl fmt::Display for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Virtual address inside a process address space.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct VirtAddr(u32);

impl VirtAddr {
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Accepts a register value; rejects anything that does not fit in 32 bits.
    #[inline]
    pub fn from_usize(raw: usize) -> Option<Self> {
        u32::try_from(raw).ok().map(Self)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn is_page_aligned(self) -> bool {
        self.0 as usize % PAGE_SIZE == 0
    }

    #[inline]
    pub const fn page_base(self) -> Self {
        Self(self.0 & !(PAGE_SIZE as u32 - 1))
    }

    #[inline]
    pub const fn page_offset(self) -> usize {
        self.0 as usize & (PAGE_SIZE - 1)
    }

    /// First-level index (bits 31..22).
    #[inline]
    pub const fn vpn1(self) -> usize {
        ((self.0 >> 22) & 0x3ff) as usize
    }

    /// Second-level index (bits 21..12).
    #[inline]
    pub const fn vpn0(self) -> usize {
        ((self.0 >> 12) & 0x3ff) as usize
    }

    #[inline]
    pub fn checked_add(self, bytes: usize) -> Option<Self> {
        u32::try_from(bytes).ok().and_then(|b| self.0.checked_add(b)).map(Self)
    }
}

impl fmt::Display for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Process identifier.
///
/// **Ownership**: Only `ProcessTable` assigns PIDs (slot index + 1).
/// **Invariant**: 0 marks an unused slot; the idle process carries [`Pid::IDLE`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(transparent)]
pub struct Pid(i32);

impl Pid {
    pub const UNUSED: Self = Self(0);
    pub const IDLE: Self = Self(-1);

    #[inline]
    pub const fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn as_raw(self) -> i32 {
        self.0
    }

    /// Only strictly positive PIDs take part in round-robin selection.
    #[inline]
    pub const fn is_user(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
