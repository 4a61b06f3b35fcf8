// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

extern crate std;

use std::boxed::Box;

use super::*;
use crate::arch::riscv::user_entry_address;
use crate::layout::{UART0_BASE, VIRTIO_BLK_BASE};
use crate::test_support::Arena;
use crate::types::PhysAddr;

fn table() -> Box<ProcessTable> {
    Box::new(ProcessTable::new())
}

#[test]
fn pids_follow_slot_order() {
    let mut arena = Arena::new(96);
    let mut frames = arena.frames();
    let layout = arena.layout();
    let mut procs = table();

    assert_eq!(procs.spawn_idle(&mut frames, &layout), Ok(Pid::IDLE));
    assert_eq!(procs.create_process(&mut frames, &layout, b"\x73\x00\x00\x00"), Ok(Pid::from_raw(2)));
    assert_eq!(procs.create_process(&mut frames, &layout, b"\x73\x00\x00\x00"), Ok(Pid::from_raw(3)));
    assert_eq!(procs.current_slot(), 0);
    assert_eq!(procs.idle_slot(), Some(0));
    assert_eq!(procs.process(1).map(Process::state), Some(ProcessState::Runnable));
}

#[test]
fn table_full_is_reported() {
    let mut arena = Arena::new(160);
    let mut frames = arena.frames();
    let layout = arena.layout();
    let mut procs = table();

    for _ in 0..PROCS_MAX {
        procs.create_process(&mut frames, &layout, &[]).expect("slot");
    }
    assert_eq!(procs.create_process(&mut frames, &layout, &[]), Err(SpawnError::NoFreeSlot));
}

#[test]
fn exited_slots_are_not_reused() {
    let mut arena = Arena::new(64);
    let mut frames = arena.frames();
    let layout = arena.layout();
    let mut procs = table();

    procs.create_process(&mut frames, &layout, &[]).expect("first");
    procs.set_current(0);
    assert_eq!(procs.exit_current(), Pid::from_raw(1));
    assert_eq!(procs.create_process(&mut frames, &layout, &[]), Ok(Pid::from_raw(2)));
    assert_eq!(procs.process(0).map(Process::state), Some(ProcessState::Exited));
    assert!(crate::log::captured_contains("process 1 exited"));
}

#[test]
fn image_is_mapped_at_user_base_and_zero_padded() {
    let mut arena = Arena::new(64);
    let mut frames = arena.frames();
    let layout = arena.layout();
    let mut procs = table();

    let image: std::vec::Vec<u8> = (0..PAGE_SIZE + 10).map(|i| (i % 251) as u8 + 1).collect();
    procs.create_process(&mut frames, &layout, &image).expect("spawn");
    let pt = procs.process(0).and_then(Process::page_table).expect("table");

    let user_rwx = PageFlags::VALID | PageFlags::USER | PageFlags::READ | PageFlags::WRITE | PageFlags::EXECUTE;
    for page in 0..2 {
        let va = USER_BASE.checked_add(page * PAGE_SIZE).expect("va");
        let (pa, flags) = pt.translate(&frames, va).expect("mapped");
        assert_eq!(flags, user_rwx);
        let ptr = frames.ptr(pa).expect("window");
        let bytes = unsafe { core::slice::from_raw_parts(ptr, PAGE_SIZE) };
        let start = page * PAGE_SIZE;
        let end = (start + PAGE_SIZE).min(image.len());
        assert_eq!(&bytes[..end - start], &image[start..end]);
        assert!(bytes[end - start..].iter().all(|&b| b == 0));
    }
    let past = USER_BASE.checked_add(2 * PAGE_SIZE).expect("va");
    assert_eq!(pt.translate(&frames, past), None);
}

#[test]
fn kernel_and_devices_are_identity_mapped_without_user_access() {
    let mut arena = Arena::new(64);
    let mut frames = arena.frames();
    let layout = arena.layout();
    let mut procs = table();

    procs.create_process(&mut frames, &layout, &[]).expect("spawn");
    let pt = procs.process(0).and_then(Process::page_table).expect("table");

    let kernel_rwx = PageFlags::VALID | PageFlags::READ | PageFlags::WRITE | PageFlags::EXECUTE;
    for probe in [layout.kernel_base.raw(), layout.free_ram.raw(), layout.free_ram_end.raw() - 1] {
        let (pa, flags) = pt.translate(&frames, VirtAddr::new(probe)).expect("identity");
        assert_eq!(pa, PhysAddr::new(probe));
        assert_eq!(flags, kernel_rwx);
    }
    for device in [UART0_BASE as u32, VIRTIO_BLK_BASE as u32] {
        let (pa, flags) = pt.translate(&frames, VirtAddr::new(device)).expect("mmio");
        assert_eq!(pa, PhysAddr::new(device));
        assert_eq!(flags, PageFlags::VALID | PageFlags::READ | PageFlags::WRITE);
    }
    assert_eq!(pt.translate(&frames, VirtAddr::new(layout.free_ram_end.raw())), None);
}

#[test]
fn new_process_resumes_in_user_entry_trampoline() {
    let mut arena = Arena::new(64);
    let mut frames = arena.frames();
    let layout = arena.layout();
    let mut procs = table();

    procs.create_process(&mut frames, &layout, &[]).expect("spawn");
    let process = procs.process(0).expect("slot");
    let top = process.kernel_stack_top();
    assert_eq!(process.saved_sp(), top - size_of::<Context>());
    let frame = unsafe { (process.saved_sp() as *const Context).read() };
    assert_eq!(frame, Context { ra: user_entry_address(), s: [0; 12] });
}

#[test]
fn allocation_failure_is_reported() {
    let mut arena = Arena::new(2);
    let mut frames = arena.frames();
    let layout = arena.layout();
    let mut procs = table();

    let err = procs.create_process(&mut frames, &layout, &[]).err();
    assert!(matches!(err, Some(SpawnError::Map(MapError::OutOfMemory(_))) | Some(SpawnError::Alloc(_))));
    assert_eq!(procs.process(0).map(Process::state), Some(ProcessState::Unused));
}
