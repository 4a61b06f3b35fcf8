// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Syscall handlers exposed to the dispatcher
//! OWNERS: @kernel-team
//! PUBLIC API: install_handlers(table), Context
//! DEPENDS_ON: task::ProcessTable, mm::UserSpace, hal::Console, disk::BlockIo, mailbox, responder
//! INVARIANTS: User memory is reached only through the caller's page table; copies are capped
//!             at MAX_MESSAGE_LEN including the terminator; handlers never switch processes,
//!             they return Error::Reschedule or Error::TaskExit instead
//! ADR: docs/adr/0001-runtime-roles-and-boundaries.md

use crate::{
    disk::BlockIo,
    hal::Console,
    log_info,
    mailbox::{Mailbox, MAX_MESSAGE_LEN},
    mm::{FrameAllocator, UserCopyError, UserSpace},
    responder,
    task::ProcessTable,
    types::VirtAddr,
    SECTOR_SIZE,
};

use super::{
    Args, Error, SysResult, SyscallTable, SYSCALL_EXIT, SYSCALL_GETCHAR, SYSCALL_GETCHAR_NONBLOCK,
    SYSCALL_LLM_GET_RESPONSE, SYSCALL_LLM_SEND_REQUEST, SYSCALL_LLM_SIMULATE, SYSCALL_PUTCHAR,
};

/// Kernel state a handler may touch, borrowed from the kernel owner for
/// the duration of one syscall.
pub struct Context<'a> {
    pub procs: &'a mut ProcessTable,
    pub frames: &'a FrameAllocator,
    pub console: &'a dyn Console,
    pub disk: &'a mut dyn BlockIo,
}

impl<'a> Context<'a> {
    fn user_space(&self, va: VirtAddr) -> Result<UserSpace<'_>, UserCopyError> {
        let table = self.procs.current().page_table().ok_or(UserCopyError::Fault(va))?;
        Ok(UserSpace::new(table, self.frames))
    }

    /// Copies the NUL-terminated string at user address `raw` into `buf`.
    pub fn copy_in(&self, raw: usize, buf: &mut [u8]) -> SysResult<usize> {
        let va = user_addr(raw)?;
        Ok(self.user_space(va)?.read_cstr(va, buf)?)
    }

    /// Writes `bytes` plus a terminator to user address `raw`.
    pub fn copy_out(&self, raw: usize, bytes: &[u8]) -> SysResult<()> {
        let va = user_addr(raw)?;
        Ok(self.user_space(va)?.write_cstr(va, bytes)?)
    }
}

fn user_addr(raw: usize) -> Result<VirtAddr, UserCopyError> {
    VirtAddr::from_usize(raw).ok_or(UserCopyError::Fault(VirtAddr::new(raw as u32)))
}

/// Registers every kernel syscall in `table`.
pub fn install_handlers(table: &mut SyscallTable) {
    table.register(SYSCALL_PUTCHAR, sys_putchar);
    table.register(SYSCALL_GETCHAR, sys_getchar);
    table.register(SYSCALL_EXIT, sys_exit);
    table.register(SYSCALL_GETCHAR_NONBLOCK, sys_getchar_nonblock);
    table.register(SYSCALL_LLM_SEND_REQUEST, sys_llm_send_request);
    table.register(SYSCALL_LLM_GET_RESPONSE, sys_llm_get_response);
    table.register(SYSCALL_LLM_SIMULATE, sys_llm_simulate);
}

fn sys_putchar(ctx: &mut Context<'_>, args: &Args) -> SysResult<usize> {
    ctx.console.put_byte(args.get(0) as u8);
    Ok(0)
}

fn sys_getchar(ctx: &mut Context<'_>, _args: &Args) -> SysResult<usize> {
    // Polled again when the caller reruns the ecall.
    ctx.console.try_get_byte().map(usize::from).ok_or(Error::Reschedule)
}

fn sys_getchar_nonblock(ctx: &mut Context<'_>, _args: &Args) -> SysResult<usize> {
    Ok(ctx.console.try_get_byte().map_or(usize::MAX, usize::from))
}

fn sys_exit(ctx: &mut Context<'_>, _args: &Args) -> SysResult<usize> {
    ctx.procs.exit_current();
    Err(Error::TaskExit)
}

fn sys_llm_send_request(ctx: &mut Context<'_>, args: &Args) -> SysResult<usize> {
    let mut request = [0u8; MAX_MESSAGE_LEN];
    let len = ctx.copy_in(args.get(0), &mut request)?;
    Mailbox::new(&mut *ctx.disk).send_request(&request[..len]);
    log_info!(target: "llm", "pid {} sent a {} byte request", ctx.procs.current().pid(), len);
    Ok(0)
}

fn sys_llm_get_response(ctx: &mut Context<'_>, args: &Args) -> SysResult<usize> {
    let mut response = [0u8; SECTOR_SIZE];
    let Some(len) = Mailbox::new(&mut *ctx.disk).pending_response(&mut response) else {
        return Ok(0);
    };
    // A failed copy leaves the response flagged for a retry.
    ctx.copy_out(args.get(0), &response[..len])?;
    Mailbox::new(&mut *ctx.disk).acknowledge_response();
    Ok(1)
}

fn sys_llm_simulate(ctx: &mut Context<'_>, args: &Args) -> SysResult<usize> {
    let mut input = [0u8; MAX_MESSAGE_LEN];
    let len = ctx.copy_in(args.get(0), &mut input)?;
    let reply = responder::reply_for(&input[..len]);
    ctx.copy_out(args.get(1), reply.as_bytes())?;
    Ok(0)
}
