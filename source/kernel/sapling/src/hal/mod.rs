// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Hardware abstraction layer traits.

pub mod virt;

/// Byte console used by the character syscalls.
pub trait Console {
    /// Writes a single byte; waits for the transmitter if needed.
    fn put_byte(&self, byte: u8);
    /// Polls once for a received byte.
    fn try_get_byte(&self) -> Option<u8>;
}
