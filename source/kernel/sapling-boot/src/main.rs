// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Boot wrapper for the sapling kernel. Provides a minimal `_start` entry
//! point that sets up the boot stack and clears `.bss` before handing
//! execution to the kernel library via `sapling::kmain()`.
#![cfg_attr(target_os = "none", no_std, no_main)]

#[cfg(all(target_arch = "riscv32", target_os = "none"))]
mod boot {
    use core::ptr::addr_of_mut;

    use sapling::task::ProcessTable;

    core::arch::global_asm!(
        r#"
    .section .text._start, "ax", @progbits
    .globl _start
    .align 4
_start:
    la   sp, __stack_top
    j    start_rust
"#
    );

    static USER_IMAGE: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/user.bin"));

    static mut PROCESSES: ProcessTable = ProcessTable::new();

    extern "C" {
        static mut __bss: u8;
        static mut __bss_end: u8;
    }

    #[no_mangle]
    extern "C" fn start_rust() -> ! {
        // SAFETY: single hart, nothing has touched `.bss` yet, and the
        // process table is handed out exactly once.
        unsafe {
            let start = addr_of_mut!(__bss);
            let end = addr_of_mut!(__bss_end);
            core::ptr::write_bytes(start, 0, end as usize - start as usize);
            sapling::kmain(&mut *addr_of_mut!(PROCESSES), USER_IMAGE)
        }
    }
}

#[cfg(not(target_os = "none"))]
fn main() {}
