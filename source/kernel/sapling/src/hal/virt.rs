// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! HAL implementation targeting QEMU's `virt` machine.

use core::ptr::{read_volatile, write_volatile};

use sapling_hal::{Bus, DmaBuffer};

use crate::layout::UART0_BASE;
use crate::mm::PageSpan;
use crate::uart::KernelUart;

use super::Console;

/// Console backed by the polled UART.
pub struct VirtUart {
    uart: KernelUart,
}

impl VirtUart {
    pub const fn new() -> Self {
        Self { uart: KernelUart::new(UART0_BASE) }
    }
}

impl Default for VirtUart {
    fn default() -> Self {
        Self::new()
    }
}

impl Console for VirtUart {
    fn put_byte(&self, byte: u8) {
        self.uart.put_byte(byte);
    }

    fn try_get_byte(&self) -> Option<u8> {
        self.uart.try_get_byte()
    }
}

/// Register window of an identity-mapped MMIO device.
pub struct MmioBus {
    base: usize,
}

impl MmioBus {
    /// # Safety
    /// `base` must address a device register block that stays mapped for the
    /// lifetime of the bus.
    pub const unsafe fn new(base: usize) -> Self {
        Self { base }
    }
}

impl Bus for MmioBus {
    fn read(&self, offset: usize) -> u32 {
        // SAFETY: guaranteed by `MmioBus::new`.
        unsafe { read_volatile((self.base + offset) as *const u32) }
    }

    fn write(&self, offset: usize, value: u32) {
        // SAFETY: guaranteed by `MmioBus::new`.
        unsafe { write_volatile((self.base + offset) as *mut u32, value) }
    }
}

impl DmaBuffer for PageSpan {
    fn as_ptr(&self) -> *const u8 {
        self.ptr()
    }

    fn as_mut_ptr(&mut self) -> *mut u8 {
        self.ptr()
    }

    fn len(&self) -> usize {
        self.byte_len()
    }

    fn phys_addr(&self) -> u64 {
        self.phys().raw() as u64
    }
}
