// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! RISC-V (rv32, Sv32) helpers: address-space activation, the callee-saved
//! context switch and the first-entry trampoline into user mode.
//!
//! Host builds get inert stubs so scheduling policy can be tested without a
//! hart: switching then only updates bookkeeping and returns immediately.

use core::mem::size_of;

use static_assertions::const_assert_eq;

#[cfg(all(target_arch = "riscv32", target_os = "none"))]
use crate::layout::{SSTATUS_SPIE, SSTATUS_SUM, USER_BASE};

#[cfg(all(target_arch = "riscv32", target_os = "none"))]
core::arch::global_asm!(
    include_str!("switch.S"),
    CONTEXT_SIZE = const size_of::<Context>(),
    USER_BASE = const USER_BASE.raw(),
    USER_SSTATUS = const SSTATUS_SPIE | SSTATUS_SUM,
);

#[cfg(all(target_arch = "riscv32", target_os = "none"))]
extern "C" {
    fn __switch_context(prev_sp: *mut usize, next_sp: *const usize);
    fn __user_entry();
}

/// Callee-saved registers pushed by `__switch_context`, lowest address first.
/// Must match `switch.S`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Context {
    pub ra: usize,
    pub s: [usize; 12],
}

const_assert_eq!(size_of::<Context>(), 13 * size_of::<usize>());

impl Context {
    /// Frame that makes the first switch into a new process return into the
    /// user-mode trampoline with all callee-saved registers zeroed.
    pub fn first_entry() -> Self {
        Self { ra: user_entry_address(), s: [0; 12] }
    }
}

/// Saves the caller's callee-saved registers on its stack, stores the stack
/// pointer to `*prev_sp`, loads `*next_sp` and resumes the context found there.
///
/// # Safety
/// `prev_sp` must be writable and `next_sp` must hold a stack pointer produced
/// by an earlier switch or by [`Context::first_entry`] placement.
#[inline]
pub unsafe fn switch_context(prev_sp: *mut usize, next_sp: *const usize) {
    #[cfg(all(target_arch = "riscv32", target_os = "none"))]
    unsafe {
        __switch_context(prev_sp, next_sp)
    };
    #[cfg(not(all(target_arch = "riscv32", target_os = "none")))]
    {
        let _ = (prev_sp, next_sp);
    }
}

/// Address of the trampoline that enters user mode at `USER_BASE`.
pub fn user_entry_address() -> usize {
    #[cfg(all(target_arch = "riscv32", target_os = "none"))]
    {
        __user_entry as usize
    }
    #[cfg(not(all(target_arch = "riscv32", target_os = "none")))]
    {
        host_user_entry as usize
    }
}

#[cfg(not(all(target_arch = "riscv32", target_os = "none")))]
extern "C" fn host_user_entry() {}

/// Installs `satp` as the translation root, fencing on both sides.
#[inline]
pub fn activate_address_space(satp: usize) {
    #[cfg(all(target_arch = "riscv32", target_os = "none"))]
    unsafe {
        core::arch::asm!(
            "sfence.vma",
            "csrw satp, {0}",
            "sfence.vma",
            in(reg) satp,
            options(nostack)
        );
    }
    #[cfg(not(all(target_arch = "riscv32", target_os = "none")))]
    {
        let _ = satp;
    }
}

/// Sets the stack the trap vector switches to on the next trap from user mode.
#[inline]
pub fn set_trap_stack(kernel_stack_top: usize) {
    #[cfg(all(target_arch = "riscv32", target_os = "none"))]
    // SAFETY: sscratch is only consumed by the trap vector.
    unsafe {
        riscv::register::sscratch::write(kernel_stack_top)
    };
    #[cfg(not(all(target_arch = "riscv32", target_os = "none")))]
    {
        let _ = kernel_stack_top;
    }
}

/// Issues a WFI instruction or spins on the host.
#[inline]
pub fn wait_for_interrupt() {
    #[cfg(all(target_arch = "riscv32", target_os = "none"))]
    unsafe {
        core::arch::asm!("wfi", options(nomem, nostack, preserves_flags));
    }
    #[cfg(not(all(target_arch = "riscv32", target_os = "none")))]
    {
        core::hint::spin_loop();
    }
}
