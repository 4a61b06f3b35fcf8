// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Checked copies between kernel buffers and a process address space
//! OWNERS: @kernel-mm-team
//! PUBLIC API: UserSpace::{read_cstr, write_cstr}, UserCopyError
//! DEPENDS_ON: mm::{PageTable, FrameAllocator}
//! INVARIANTS: Every touched page is USER-accessible with the needed permission;
//!             copies are bounded by the kernel buffer; failed writes leave user memory untouched

use crate::types::VirtAddr;

use super::{FrameAllocator, PageFlags, PageTable, PAGE_SIZE};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UserCopyError {
    /// Address not mapped for user access with the required permission.
    Fault(VirtAddr),
    /// No terminator within `limit` bytes.
    TooLong { limit: usize },
}

/// View of a process address space used by syscalls.
pub struct UserSpace<'a> {
    table: &'a PageTable,
    frames: &'a FrameAllocator,
}

impl<'a> UserSpace<'a> {
    pub fn new(table: &'a PageTable, frames: &'a FrameAllocator) -> Self {
        Self { table, frames }
    }

    /// Kernel pointer to `va` and the bytes left in its page.
    fn page_ptr(&self, va: VirtAddr, need: PageFlags) -> Result<(*mut u8, usize), UserCopyError> {
        let (pa, flags) = self.table.translate(self.frames, va).ok_or(UserCopyError::Fault(va))?;
        if !flags.contains(need | PageFlags::USER) {
            return Err(UserCopyError::Fault(va));
        }
        let ptr = self.frames.ptr(pa).ok_or(UserCopyError::Fault(va))?;
        Ok((ptr, PAGE_SIZE - va.page_offset()))
    }

    /// Copies a NUL-terminated string at `va` into `buf`. Returns its length
    /// without the terminator; `buf[len]` holds the NUL.
    pub fn read_cstr(&self, va: VirtAddr, buf: &mut [u8]) -> Result<usize, UserCopyError> {
        let mut copied = 0;
        while copied < buf.len() {
            let at = va.checked_add(copied).ok_or(UserCopyError::Fault(va))?;
            let (ptr, in_page) = self.page_ptr(at, PageFlags::READ)?;
            let chunk = in_page.min(buf.len() - copied);
            for i in 0..chunk {
                // SAFETY: `ptr..ptr + in_page` is one mapped user page.
                let byte = unsafe { ptr.add(i).read_volatile() };
                buf[copied + i] = byte;
                if byte == 0 {
                    return Ok(copied + i);
                }
            }
            copied += chunk;
        }
        Err(UserCopyError::TooLong { limit: buf.len() })
    }

    /// Writes `bytes` followed by a NUL at `va`.
    pub fn write_cstr(&self, va: VirtAddr, bytes: &[u8]) -> Result<(), UserCopyError> {
        let total = bytes.len() + 1;
        self.check_writable(va, total)?;
        let mut written = 0;
        while written < total {
            let at = va.checked_add(written).ok_or(UserCopyError::Fault(va))?;
            let (ptr, in_page) = self.page_ptr(at, PageFlags::WRITE)?;
            let chunk = in_page.min(total - written);
            for i in 0..chunk {
                let byte = bytes.get(written + i).copied().unwrap_or(0);
                // SAFETY: `ptr..ptr + in_page` is one mapped user page.
                unsafe { ptr.add(i).write_volatile(byte) };
            }
            written += chunk;
        }
        Ok(())
    }

    fn check_writable(&self, va: VirtAddr, len: usize) -> Result<(), UserCopyError> {
        let mut offset = 0;
        while offset < len {
            let at = va.checked_add(offset).ok_or(UserCopyError::Fault(va))?;
            let (_, in_page) = self.page_ptr(at, PageFlags::WRITE)?;
            offset += in_page;
        }
        Ok(())
    }
}
