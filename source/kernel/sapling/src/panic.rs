// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Panic handler emitting diagnostics over UART
//! OWNERS: @kernel-team
//! PUBLIC API: panic handler (no_std)
//! DEPENDS_ON: trap::last_trap(), uart::raw_writer()
//! INVARIANTS: No allocations; never takes the log UART lock; parks the hart
//! ADR: docs/adr/0001-runtime-roles-and-boundaries.md

use core::{fmt::Write, panic::PanicInfo};

use crate::{trap, uart};

/// Emits the panic message with its source location and the last trap frame.
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    let mut w = uart::raw_writer();

    let _ = w.write_str("\nPANIC: ");
    if let Some(location) = info.location() {
        let _ = write!(w, "{}:{}: ", location.file(), location.line());
    }
    let _ = writeln!(w, "{}", info.message());

    if let Some(frame) = trap::last_trap() {
        let _ = w.write_str("PANIC: last trap:\n");
        let _ = trap::fmt_trap(&frame, &mut w);
    }

    loop {
        crate::arch::riscv::wait_for_interrupt();
    }
}
