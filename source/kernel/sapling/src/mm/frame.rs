// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Bump allocator over the free-RAM region.
//!
//! The allocator also owns the *window*: the kernel pointer at which physical
//! address `base` is visible. On the target the kernel runs identity mapped and
//! the window equals `base`; host tests back the region with an arena. Page
//! tables and user copies translate physical addresses exclusively through
//! [`FrameAllocator::ptr`].

use core::fmt;

use crate::types::PhysAddr;

use super::PAGE_SIZE;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AllocError {
    /// A request for zero pages.
    Empty,
    OutOfMemory { requested: usize, remaining: usize },
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocError::Empty => f.write_str("zero-page allocation"),
            AllocError::OutOfMemory { requested, remaining } => {
                write!(f, "out of memory: {} pages requested, {} left", requested, remaining)
            }
        }
    }
}

pub struct FrameAllocator {
    base: PhysAddr,
    end: PhysAddr,
    next: PhysAddr,
    window: *mut u8,
}

impl FrameAllocator {
    /// Creates an allocator handing out `[base, end)`.
    ///
    /// # Safety
    /// `window` must point to writable memory of `end - base` bytes that
    /// backs the physical range and is used by nothing else.
    pub const unsafe fn new(base: PhysAddr, end: PhysAddr, window: *mut u8) -> Self {
        debug_assert!(base.is_page_aligned() && end.is_page_aligned());
        Self { base, end, next: base, window }
    }

    /// Allocator for an identity-mapped region.
    ///
    /// # Safety
    /// Same as [`FrameAllocator::new`], with the region addressable at its
    /// physical address.
    pub unsafe fn identity(base: PhysAddr, end: PhysAddr) -> Self {
        unsafe { Self::new(base, end, base.raw() as usize as *mut u8) }
    }

    /// Returns `n` contiguous zero-filled pages.
    pub fn alloc_pages(&mut self, n: usize) -> Result<PhysAddr, AllocError> {
        if n == 0 {
            return Err(AllocError::Empty);
        }
        let remaining = self.remaining_pages();
        if n > remaining {
            return Err(AllocError::OutOfMemory { requested: n, remaining });
        }
        let paddr = self.next;
        let bytes = n * PAGE_SIZE;
        self.next = PhysAddr::new(paddr.raw() + bytes as u32);
        // SAFETY: the range was just carved out of the window-backed region.
        unsafe { core::ptr::write_bytes(self.window_ptr(paddr), 0, bytes) };
        Ok(paddr)
    }

    /// Allocates `n` pages and returns them with their kernel pointer.
    pub fn alloc_span(&mut self, n: usize) -> Result<PageSpan, AllocError> {
        let pa = self.alloc_pages(n)?;
        Ok(PageSpan { pa, ptr: self.window_ptr(pa), len: n * PAGE_SIZE })
    }

    pub fn remaining_pages(&self) -> usize {
        (self.end.raw() - self.next.raw()) as usize / PAGE_SIZE
    }

    /// Kernel pointer for an already allocated physical address.
    pub fn ptr(&self, pa: PhysAddr) -> Option<*mut u8> {
        if pa >= self.base && pa < self.next {
            Some(self.window_ptr(pa))
        } else {
            None
        }
    }

    fn window_ptr(&self, pa: PhysAddr) -> *mut u8 {
        self.window.wrapping_add((pa.raw() - self.base.raw()) as usize)
    }
}

/// Contiguous pages owned by one consumer for the kernel's lifetime.
pub struct PageSpan {
    pa: PhysAddr,
    ptr: *mut u8,
    len: usize,
}

impl PageSpan {
    pub fn phys(&self) -> PhysAddr {
        self.pa
    }

    pub fn ptr(&self) -> *mut u8 {
        self.ptr
    }

    pub fn byte_len(&self) -> usize {
        self.len
    }
}
