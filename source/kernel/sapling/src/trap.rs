// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Trap handling: assembly prologue/epilogue plus the safe Rust dispatcher
//! OWNERS: @kernel-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: trap::tests (ecall routing, reschedule/exit, fatal causes, errno encoding, diagnostics)
//! PUBLIC API: TrapFrame, TrapTarget, TrapExit, handle_trap, service_trap, register_target,
//!             install_trap_vector,
//!             last_trap, describe_cause, fmt_trap
//! DEPENDS_ON: syscall::{Args, Error}, sched::{Switch, switch_to}, arch/riscv/trap.S
//! INVARIANTS: Only U-mode ecalls are recoverable; sepc moves past the ecall only when the
//!             syscall completes; the hart switches processes only after every borrow of the
//!             trap target has ended
//! ADR: docs/adr/0001-runtime-roles-and-boundaries.md

use core::fmt::{self, Write};
use core::mem::size_of;

use spin::Mutex;
use static_assertions::const_assert_eq;

use crate::{
    mm::UserCopyError,
    sched::{self, Switch},
    syscall::{Args, Error as SysError, SysResult},
};

const WORD: usize = size_of::<usize>();

#[cfg(all(target_arch = "riscv32", target_os = "none"))]
core::arch::global_asm!(
    include_str!("arch/riscv/trap.S"),
    TF_SIZE     = const size_of::<TrapFrame>(),
    OFF_SEPC    = const 32 * WORD,
    OFF_SSTATUS = const 33 * WORD,
    OFF_SCAUSE  = const 34 * WORD,
    OFF_STVAL   = const 35 * WORD,
);

#[cfg(all(target_arch = "riscv32", target_os = "none"))]
extern "C" {
    fn __trap_vector();
}

// ——— trap frame ———

/// Saved register state for a trap from user mode.
/// Must match `arch/riscv/trap.S` save/restore layout.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TrapFrame {
    /// x0..x31 (x0 is never written).
    pub x: [usize; 32],
    pub sepc: usize,
    pub sstatus: usize,
    pub scause: usize,
    pub stval: usize,
}

const_assert_eq!(size_of::<TrapFrame>(), 36 * WORD);
const_assert_eq!(size_of::<TrapFrame>() % 16, 0);

pub const REG_A0: usize = 10;
pub const REG_A1: usize = 11;
pub const REG_A2: usize = 12;
/// Syscall number register.
pub const REG_A3: usize = 13;

const INTERRUPT_FLAG: usize = usize::MAX - (usize::MAX >> 1);
pub const SCAUSE_ECALL_FROM_U: usize = 8;

// ——— diagnostics ———

static LAST_TRAP: Mutex<Option<TrapFrame>> = Mutex::new(None);

pub fn record(frame: &TrapFrame) {
    *LAST_TRAP.lock() = Some(*frame);
}

pub fn last_trap() -> Option<TrapFrame> {
    *LAST_TRAP.lock()
}

#[inline]
pub fn is_interrupt(scause: usize) -> bool {
    scause & INTERRUPT_FLAG != 0
}

pub fn describe_cause(scause: usize) -> &'static str {
    let code = scause & !INTERRUPT_FLAG;
    if is_interrupt(scause) {
        match code {
            1 => "SupervisorSoftInt",
            5 => "SupervisorTimerInt",
            9 => "SupervisorExternalInt",
            _ => "Interrupt",
        }
    } else {
        match code {
            0 => "InstructionAddressMisaligned",
            1 => "InstructionAccessFault",
            2 => "IllegalInstruction",
            3 => "Breakpoint",
            4 => "LoadAddressMisaligned",
            5 => "LoadAccessFault",
            6 => "StoreAMOAddressMisaligned",
            7 => "StoreAMOAccessFault",
            8 => "EnvironmentCallFromUMode",
            9 => "EnvironmentCallFromSMode",
            12 => "InstructionPageFault",
            13 => "LoadPageFault",
            15 => "StoreAMOPageFault",
            _ => "Exception",
        }
    }
}

pub fn fmt_trap<W: Write>(frame: &TrapFrame, f: &mut W) -> fmt::Result {
    writeln!(f, " sepc=0x{:08x}", frame.sepc)?;
    writeln!(f, " scause=0x{:08x} ({})", frame.scause, describe_cause(frame.scause))?;
    writeln!(f, " stval=0x{:08x}", frame.stval)?;
    writeln!(f, " a0..a3 = {:08x?}", &frame.x[REG_A0..=REG_A3])
}

// ——— errno encoding ———

const E2BIG: usize = 7;
const EFAULT: usize = 14;

const fn errno(code: usize) -> usize {
    (-(code as isize)) as usize
}

fn encode_error(err: UserCopyError) -> usize {
    match err {
        UserCopyError::Fault(_) => errno(EFAULT),
        UserCopyError::TooLong { .. } => errno(E2BIG),
    }
}

// ——— dispatch ———

/// Receiver of decoded syscalls; implemented by the kernel owner object.
pub trait TrapTarget {
    /// Runs syscall `number` on behalf of the current process.
    fn syscall(&mut self, number: usize, args: &Args) -> SysResult<usize>;

    /// Makes the next process current and describes the switch to it, or
    /// returns `None` when the caller keeps the hart.
    fn reschedule(&mut self) -> Option<Switch>;
}

/// What the trap path does once a syscall has been handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapExit {
    /// Return to the interrupted process.
    Resume,
    /// Let other processes run first. `sepc` still points at the ecall, so
    /// the call is issued again when the caller is resumed.
    Yield,
    /// The caller exited and must not be resumed.
    Retire,
}

/// Handles one synchronous trap. Anything other than an ecall from user mode
/// is fatal, as is an unknown syscall number.
pub fn handle_trap(frame: &mut TrapFrame, target: &mut dyn TrapTarget) -> TrapExit {
    record(frame);
    if frame.scause != SCAUSE_ECALL_FROM_U {
        panic!(
            "unexpected trap scause={:#x} ({}) stval={:#x} sepc={:#x}",
            frame.scause,
            describe_cause(frame.scause),
            frame.stval,
            frame.sepc
        );
    }

    let number = frame.x[REG_A3];
    let args = Args::new([frame.x[REG_A0], frame.x[REG_A1], frame.x[REG_A2]]);
    let ret = match target.syscall(number, &args) {
        Ok(ret) => ret,
        Err(SysError::Reschedule) => return TrapExit::Yield,
        Err(SysError::TaskExit) => return TrapExit::Retire,
        Err(SysError::InvalidSyscall(number)) => panic!("unexpected syscall a3={:#x}", number),
        Err(SysError::UserCopy(err)) => encode_error(err),
    };
    frame.sepc = frame.sepc.wrapping_add(4);
    frame.x[REG_A0] = ret;
    TrapExit::Resume
}

/// Handles one trap for `target` and performs the switch a syscall asked
/// for. Returns when the interrupted process may run again.
///
/// # Safety
/// `target` must be valid and no reference derived from it may be live.
/// A process suspended here is resumed by a later trap that borrows the same
/// target, so each borrow ends before the hart switches.
pub unsafe fn service_trap(frame: &mut TrapFrame, target: *mut dyn TrapTarget) {
    // SAFETY: caller contract; the borrow ends when `handle_trap` returns.
    let exit = handle_trap(frame, unsafe { &mut *target });
    if exit == TrapExit::Resume {
        return;
    }
    // SAFETY: as above; `reschedule` borrows only for its own duration.
    if let Some(switch) = unsafe { (*target).reschedule() } {
        // SAFETY: `switch` is fresh and nothing borrowed from the target is live.
        unsafe { sched::switch_to(switch) };
    }
    if exit == TrapExit::Retire {
        panic!("exited process resumed sepc={:#x}", frame.sepc);
    }
}

struct TrapEnv {
    target: *mut dyn TrapTarget,
}

// SAFETY: single hart; the pointer is only dereferenced from trap context on
// the hart that registered it.
unsafe impl Send for TrapEnv {}

static TRAP_ENV: Mutex<Option<TrapEnv>> = Mutex::new(None);

/// Registers the object that services syscalls.
///
/// # Safety
/// `target` must stay valid for the rest of the kernel's life and must only
/// be used from this hart.
pub unsafe fn register_target(target: *mut dyn TrapTarget) {
    *TRAP_ENV.lock() = Some(TrapEnv { target });
}

/// Install trap vector; call once during early boot.
#[cfg(all(target_arch = "riscv32", target_os = "none"))]
pub unsafe fn install_trap_vector() {
    // SAFETY: called once before the first switch to user mode.
    unsafe {
        riscv::register::sscratch::write(0);
        riscv::register::stvec::write(
            __trap_vector as usize,
            riscv::register::mtvec::TrapMode::Direct,
        );
    }
}

#[cfg(not(all(target_arch = "riscv32", target_os = "none")))]
pub unsafe fn install_trap_vector() {}

// ——— Rust trap handler called from assembly ———

#[cfg(all(target_arch = "riscv32", target_os = "none"))]
#[no_mangle]
extern "C" fn __trap_rust(frame: &mut TrapFrame) {
    // Copy the pointer out so the lock is not held across a yield.
    let target = TRAP_ENV.lock().as_ref().map(|env| env.target);
    let Some(target) = target else {
        record(frame);
        panic!("trap before kernel registration scause={:#x} sepc={:#x}", frame.scause, frame.sepc);
    };
    // SAFETY: guaranteed by `register_target`; the lock guard is gone and
    // no other borrow of the target outlives its own trap.
    unsafe { service_trap(frame, target) };
}
