// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Polled 16550 UART on the `virt` machine: log output, console input.

use core::fmt::{self, Write};
use core::ptr::{read_volatile, write_volatile};

use spin::Mutex;

use crate::layout::UART0_BASE;

const UART_RHR: usize = 0x0;
const UART_THR: usize = 0x0;
const UART_LSR: usize = 0x5;
const LSR_DATA_READY: u8 = 1 << 0;
const LSR_TX_IDLE: u8 = 1 << 5;

/// Global UART writer used for log lines.
static UART0: Mutex<KernelUart> = Mutex::new(KernelUart::new(UART0_BASE));

/// UART register block capable of formatted writes.
#[derive(Clone, Copy)]
pub struct KernelUart {
    base: usize,
}

impl KernelUart {
    pub const fn new(base: usize) -> Self {
        Self { base }
    }

    /// Returns a guard for the log UART singleton.
    pub fn lock() -> spin::MutexGuard<'static, KernelUart> {
        UART0.lock()
    }

    /// Blocks until the transmitter is idle, then sends `byte`.
    pub fn put_byte(&self, byte: u8) {
        // SAFETY: `base` addresses the UART register block, identity mapped in
        // every address space.
        unsafe {
            while read_volatile((self.base + UART_LSR) as *const u8) & LSR_TX_IDLE == 0 {
                core::hint::spin_loop();
            }
            write_volatile((self.base + UART_THR) as *mut u8, byte);
        }
    }

    /// Returns the next received byte without waiting.
    pub fn try_get_byte(&self) -> Option<u8> {
        // SAFETY: see `put_byte`.
        unsafe {
            if read_volatile((self.base + UART_LSR) as *const u8) & LSR_DATA_READY == 0 {
                return None;
            }
            Some(read_volatile((self.base + UART_RHR) as *const u8))
        }
    }
}

impl Write for KernelUart {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for &byte in s.as_bytes() {
            if byte == b'\n' {
                self.put_byte(b'\r');
            }
            self.put_byte(byte);
        }
        Ok(())
    }
}

/// Lock-free writer for trap and panic paths where the mutex may be held.
pub struct RawUart;

impl Write for RawUart {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        KernelUart::new(UART0_BASE).write_str(s)
    }
}

pub fn raw_writer() -> RawUart {
    RawUart
}
