// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Syscall dispatcher and error handling
//! OWNERS: @kernel-team
//! PUBLIC API: SyscallTable, Args, Error, Handler, SYSCALL_* IDs
//! DEPENDS_ON: mm::UserCopyError, syscall::api
//! INVARIANTS: Fixed MAX_SYSCALL window; stable IDs; unknown numbers are reported, never executed
//! ADR: docs/adr/0001-runtime-roles-and-boundaries.md

pub mod api;

use core::fmt;

use crate::mm::UserCopyError;

/// Size of the dispatch window. Every public number lies below it.
const MAX_SYSCALL: usize = 256;

/// Result type used by syscall handlers.
pub type SysResult<T> = Result<T, Error>;

/// Syscall arguments passed in registers a0-a2.
#[derive(Default, Clone, Copy, Debug)]
pub struct Args {
    regs: [usize; 3],
}

impl Args {
    pub const fn new(regs: [usize; 3]) -> Self {
        Self { regs }
    }

    /// Returns the raw register at `index`.
    pub fn get(&self, index: usize) -> usize {
        self.regs[index]
    }
}

/// Public syscall numbers.
pub const SYSCALL_PUTCHAR: usize = 1;
/// Blocks (yielding between polls) until the console has a byte.
pub const SYSCALL_GETCHAR: usize = 2;
pub const SYSCALL_EXIT: usize = 3;
/// Polls the console once; returns -1 when nothing is pending.
pub const SYSCALL_GETCHAR_NONBLOCK: usize = 100;
/// Writes the request sector and flags it for the external agent.
pub const SYSCALL_LLM_SEND_REQUEST: usize = 200;
/// Copies out a ready response; returns 1 if one was delivered, else 0.
pub const SYSCALL_LLM_GET_RESPONSE: usize = 201;
/// Answers from the built-in keyword table without touching the disk.
pub const SYSCALL_LLM_SIMULATE: usize = 202;

/// Error returned by the dispatcher and handler stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Syscall number not present in the dispatch table.
    InvalidSyscall(usize),
    /// A user pointer could not be read or written.
    UserCopy(UserCopyError),
    /// The caller exited and must never be resumed.
    TaskExit,
    /// Let other processes run, then retry the same call. The trap path
    /// performs the switch after the handler's borrows have ended and leaves
    /// `sepc` on the ecall.
    Reschedule,
}

impl From<UserCopyError> for Error {
    fn from(value: UserCopyError) -> Self {
        Self::UserCopy(value)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidSyscall(number) => write!(f, "invalid syscall {}", number),
            Error::UserCopy(UserCopyError::Fault(va)) => write!(f, "bad user address {:#x}", va.raw()),
            Error::UserCopy(UserCopyError::TooLong { limit }) => {
                write!(f, "user string longer than {} bytes", limit)
            }
            Error::TaskExit => f.write_str("task exited"),
            Error::Reschedule => f.write_str("reschedule requested"),
        }
    }
}

/// Type alias for a syscall handler.
pub type Handler = fn(&mut api::Context<'_>, &Args) -> SysResult<usize>;

/// Dispatch table storing handlers by syscall number.
pub struct SyscallTable {
    handlers: [Option<Handler>; MAX_SYSCALL],
}

impl SyscallTable {
    /// Creates an empty dispatch table.
    pub const fn new() -> Self {
        const NONE: Option<Handler> = None;
        Self { handlers: [NONE; MAX_SYSCALL] }
    }

    /// Registers a handler.
    pub fn register(&mut self, number: usize, handler: Handler) {
        if number < MAX_SYSCALL {
            self.handlers[number] = Some(handler);
        }
    }

    /// Executes the handler referenced by `number`.
    #[must_use]
    pub fn dispatch(
        &self,
        number: usize,
        ctx: &mut api::Context<'_>,
        args: &Args,
    ) -> SysResult<usize> {
        #[cfg(feature = "trace_syscalls")]
        crate::log_trace!(
            target: "syscall",
            "pid={} nr={} a0={:#x} a1={:#x}",
            ctx.procs.current().pid(),
            number,
            args.get(0),
            args.get(1)
        );
        self.handlers
            .get(number)
            .and_then(|entry| *entry)
            .ok_or(Error::InvalidSyscall(number))
            .and_then(|handler| handler(ctx, args))
    }
}

impl Default for SyscallTable {
    fn default() -> Self {
        Self::new()
    }
}
