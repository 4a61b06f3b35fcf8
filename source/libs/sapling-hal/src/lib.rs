// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), no_std)]

//! CONTEXT: Hardware access traits shared by the kernel and its drivers
//! OWNERS: @kernel-team
//! PUBLIC API: Bus, DmaBuffer
//! DEPENDS_ON: core
//! INVARIANTS: Register accesses are 32-bit aligned; 64-bit reads are two 32-bit reads, low word first

/// Register window of a memory-mapped device. Offsets are relative to the
/// device base and must be 4-byte aligned.
pub trait Bus {
    fn read(&self, offset: usize) -> u32;
    fn write(&self, offset: usize, value: u32);

    /// Reads a 64-bit little-endian field as two 32-bit accesses.
    fn read64(&self, offset: usize) -> u64 {
        let low = self.read(offset) as u64;
        let high = self.read(offset + 4) as u64;
        (high << 32) | low
    }
}

/// Memory the device may access directly.
pub trait DmaBuffer {
    fn as_ptr(&self) -> *const u8;
    fn as_mut_ptr(&mut self) -> *mut u8;
    fn len(&self) -> usize;
    /// Device-visible physical address of the first byte.
    fn phys_addr(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
