// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Cooperative round-robin scheduler and the yield path
//! OWNERS: @kernel-sched-team
//! PUBLIC API: pick_next, schedule, switch_to, Switch
//! DEPENDS_ON: task::ProcessTable, arch::riscv (satp/sscratch/switch_context)
//! INVARIANTS: Search starts after the current slot and wraps; only pid > 0 RUNNABLE slots
//!             are eligible; idle is the fallback; selecting the current slot is a no-op
//! ADR: docs/adr/0001-runtime-roles-and-boundaries.md

use crate::{
    arch::riscv,
    layout::PROCS_MAX,
    log_trace,
    task::{ProcessState, ProcessTable},
    types::Pid,
};

/// Everything the yield path needs to hand the hart to another process.
#[derive(Debug)]
pub struct Switch {
    pub from: Pid,
    pub to: Pid,
    /// SATP value of the next process's page table.
    pub satp: usize,
    /// Stack the trap vector will use while the next process runs.
    pub kernel_stack_top: usize,
    prev_sp: *mut usize,
    next_sp: *const usize,
}

/// Slot that should run next, or `None` before the idle process exists and
/// nothing is runnable.
pub fn pick_next(procs: &ProcessTable) -> Option<usize> {
    let current = procs.current_slot();
    (1..=PROCS_MAX)
        .map(|step| (current + step) % PROCS_MAX)
        .find(|&slot| {
            procs
                .process(slot)
                .is_some_and(|p| p.state() == ProcessState::Runnable && p.pid().is_user())
        })
        .or_else(|| procs.idle_slot())
}

/// Makes the next process current and describes the switch. Returns `None`
/// when the current process keeps the hart.
pub fn schedule(procs: &mut ProcessTable) -> Option<Switch> {
    let prev = procs.current_slot();
    let next = pick_next(procs)?;
    if next == prev {
        return None;
    }
    let from = procs.process(prev)?.pid();
    let target = procs.process(next)?;
    let to = target.pid();
    let satp = target.page_table()?.satp();
    let kernel_stack_top = target.kernel_stack_top();

    procs.set_current(next);
    let (prev_sp, next_sp) = procs.saved_sp_ptrs(prev, next);
    Some(Switch { from, to, satp, kernel_stack_top, prev_sp, next_sp })
}

/// Hands the hart to the process `switch` describes. Returns when another
/// process switches back to the caller; on the host it returns at once.
///
/// # Safety
/// `switch` must come from the latest [`schedule`] on a table that is still
/// alive. No reference into that table may be held across the call, because
/// other processes mutate it while the caller is suspended.
pub unsafe fn switch_to(switch: Switch) {
    log_trace!(target: "sched", "switch {} -> {}", switch.from, switch.to);
    riscv::activate_address_space(switch.satp);
    riscv::set_trap_stack(switch.kernel_stack_top);
    // SAFETY: both pointers address `saved_sp` words inside the process
    // table, which outlives every process. The next slot was primed by
    // `create_process` or saved by an earlier switch.
    unsafe { riscv::switch_context(switch.prev_sp, switch.next_sp) };
}

#[cfg(test)]
mod tests_prop;
