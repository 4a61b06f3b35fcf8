// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

extern crate std;

use std::boxed::Box;
use std::vec;

use super::*;
use crate::layout::USER_BASE;
use crate::mm::{UserSpace, PAGE_SIZE};
use crate::syscall::{SYSCALL_EXIT, SYSCALL_GETCHAR, SYSCALL_LLM_SIMULATE, SYSCALL_PUTCHAR};
use crate::task::ProcessState;
use crate::test_support::{Arena, MockConsole, RamDisk};
use crate::trap::{
    handle_trap, service_trap, TrapExit, TrapFrame, REG_A0, REG_A1, REG_A3, SCAUSE_ECALL_FROM_U,
};
use crate::types::VirtAddr;

fn kernel(arena: &mut Arena, disk: RamDisk) -> Kernel<RamDisk, MockConsole> {
    let procs = Box::leak(Box::new(ProcessTable::new()));
    Kernel::new(arena.frames(), procs, disk, MockConsole::default(), arena.layout())
}

fn ecall(number: usize, a0: usize, a1: usize) -> TrapFrame {
    let mut frame = TrapFrame { scause: SCAUSE_ECALL_FROM_U, sepc: USER_BASE.raw() as usize, ..TrapFrame::default() };
    frame.x[REG_A3] = number;
    frame.x[REG_A0] = a0;
    frame.x[REG_A1] = a1;
    frame
}

#[test]
fn boot_resets_mailbox_and_creates_processes() {
    let mut arena = Arena::new(64);
    let mut disk = RamDisk::new(4);
    disk.put_str(0, "left over request\nsecond line");
    disk.put_str(2, "response_ready");
    let mut kernel = kernel(&mut arena, disk);

    assert_eq!(kernel.boot(&[0x73, 0, 0, 0]), Ok(Pid::from_raw(2)));
    assert_eq!(kernel.disk().get_str(2), "idle");
    assert_eq!(kernel.procs().current().pid(), Pid::IDLE);
    assert_eq!(kernel.procs().process(1).map(|p| p.state()), Some(ProcessState::Runnable));
    #[cfg(feature = "boot_disk_probe")]
    assert!(crate::log::captured_contains("disk sector 0: \"left over request\""));
}

#[test]
fn boot_reports_exhausted_memory() {
    let mut arena = Arena::new(5);
    let mut kernel = kernel(&mut arena, RamDisk::new(4));
    assert!(matches!(kernel.boot(&[0; 16]), Err(SpawnError::Alloc(_)) | Err(SpawnError::Map(_))));
}

#[test]
fn ecall_runs_through_the_kernel() {
    let mut arena = Arena::new(64);
    let mut kernel = kernel(&mut arena, RamDisk::new(4));
    kernel.boot(&[0x73, 0, 0, 0]).expect("boot");
    sched::schedule(&mut *kernel.procs).expect("enter user");

    for byte in *b"ok\n" {
        let mut frame = ecall(SYSCALL_PUTCHAR, byte as usize, 0);
        handle_trap(&mut frame, &mut kernel);
        assert_eq!(frame.x[REG_A0], 0);
        assert_eq!(frame.sepc, USER_BASE.raw() as usize + 4);
    }
    assert_eq!(*kernel.console().output.borrow(), b"ok\n");
}

#[test]
fn simulate_round_trips_user_memory() {
    let mut image = vec![0u8; PAGE_SIZE];
    image[0x40..0x4a].copy_from_slice(b"thank you\0");
    let mut arena = Arena::new(64);
    let mut kernel = kernel(&mut arena, RamDisk::new(4));
    kernel.boot(&image).expect("boot");
    sched::schedule(&mut *kernel.procs).expect("enter user");

    let base = USER_BASE.raw() as usize;
    let mut frame = ecall(SYSCALL_LLM_SIMULATE, base + 0x40, base + 0x200);
    handle_trap(&mut frame, &mut kernel);
    assert_eq!(frame.x[REG_A0], 0);

    let table = kernel.procs().current().page_table().expect("table");
    let mut out = [0u8; 128];
    let len = UserSpace::new(table, kernel.frames())
        .read_cstr(VirtAddr::new((base + 0x200) as u32), &mut out)
        .expect("reply");
    assert!(out[..len].starts_with("不客氣！".as_bytes()));
}

#[test]
fn blocked_getchar_hands_the_hart_over_and_reruns() {
    let mut arena = Arena::new(64);
    let mut kernel = kernel(&mut arena, RamDisk::new(4));
    kernel.console = MockConsole::with_input(&[None, Some(b'y')]);
    kernel.boot(&[0x73, 0, 0, 0]).expect("boot");
    let image = [0x73, 0, 0, 0];
    kernel.procs.create_process(&mut kernel.frames, &kernel.layout, &image).expect("second user");
    sched::schedule(&mut *kernel.procs).expect("enter user");

    let mut frame = ecall(SYSCALL_GETCHAR, 0, 0);
    assert_eq!(handle_trap(&mut frame, &mut kernel), TrapExit::Yield);
    assert_eq!(frame.sepc, USER_BASE.raw() as usize);
    assert_eq!(kernel.procs().current().pid(), Pid::from_raw(2));

    // SAFETY: `kernel` is a live local with no outstanding borrows.
    unsafe { service_trap(&mut frame, &mut kernel) };
    assert_eq!(frame.x[REG_A0], b'y' as usize);
    assert_eq!(frame.sepc, USER_BASE.raw() as usize + 4);
    assert_eq!(kernel.procs().current().pid(), Pid::from_raw(2));

    let mut frame = ecall(SYSCALL_GETCHAR, 0, 0);
    // SAFETY: as above.
    unsafe { service_trap(&mut frame, &mut kernel) };
    // The host switch returns at once, leaving the other process current.
    assert_eq!(kernel.procs().current().pid(), Pid::from_raw(3));
    assert_eq!(frame.sepc, USER_BASE.raw() as usize);
}

#[test]
fn last_exit_falls_back_to_idle() {
    let mut arena = Arena::new(64);
    let mut kernel = kernel(&mut arena, RamDisk::new(4));
    kernel.boot(&[0x73, 0, 0, 0]).expect("boot");
    sched::schedule(&mut *kernel.procs).expect("enter user");

    let mut frame = ecall(SYSCALL_EXIT, 0, 0);
    let caught = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        // SAFETY: `kernel` is a live local with no outstanding borrows.
        unsafe { service_trap(&mut frame, &mut kernel) };
    }));
    // The host switch returns, which on hardware never happens for an exited process.
    assert!(caught.is_err());
    assert_eq!(kernel.procs().current().pid(), Pid::IDLE);
    assert_eq!(kernel.procs().process(1).map(|p| p.state()), Some(ProcessState::Exited));
}
