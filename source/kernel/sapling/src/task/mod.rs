// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Process table and process creation
//! OWNERS: @kernel-sched-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: task/tests.rs (slot reuse, address-space contents, idle setup)
//! PUBLIC API: ProcessTable (create_process/spawn_idle/exit_current), Process, ProcessState, SpawnError
//! DEPENDS_ON: mm::{FrameAllocator, PageTable}, layout::MemoryLayout, arch::riscv::Context
//! INVARIANTS: First-fit slot choice; pid = slot + 1; RUNNABLE -> EXITED is one-way;
//!             slots and pages are never reclaimed
//! ADR: docs/adr/0001-runtime-roles-and-boundaries.md

use core::marker::PhantomData;
use core::mem::size_of;

use static_assertions::assert_not_impl_any;

use crate::{
    arch::riscv::Context,
    layout::{MemoryLayout, KERNEL_STACK_SIZE, PROCS_MAX, USER_BASE},
    log_info,
    mm::{AllocError, FrameAllocator, MapError, PageFlags, PageTable, PAGE_SIZE},
    types::{Pid, VirtAddr},
};

/// Lifecycle state of a process slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Unused,
    Runnable,
    Exited,
}

/// Errors returned while creating a process. All of them are fatal at boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnError {
    /// Every slot is RUNNABLE or EXITED.
    NoFreeSlot,
    Alloc(AllocError),
    Map(MapError),
    /// The image does not fit below the top of the address space.
    ImageTooLarge,
}

impl From<AllocError> for SpawnError {
    fn from(value: AllocError) -> Self {
        Self::Alloc(value)
    }
}

impl From<MapError> for SpawnError {
    fn from(value: MapError) -> Self {
        Self::Map(value)
    }
}

#[repr(C, align(16))]
struct KernelStack([u8; KERNEL_STACK_SIZE]);

/// Process control block.
pub struct Process {
    pid: Pid,
    state: ProcessState,
    saved_sp: usize,
    page_table: Option<PageTable>,
    stack: KernelStack,
}

impl Process {
    const UNUSED: Self = Self {
        pid: Pid::UNUSED,
        state: ProcessState::Unused,
        saved_sp: 0,
        page_table: None,
        stack: KernelStack([0; KERNEL_STACK_SIZE]),
    };

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    pub fn page_table(&self) -> Option<&PageTable> {
        self.page_table.as_ref()
    }

    /// Stack pointer recorded by the last switch away from this process.
    pub fn saved_sp(&self) -> usize {
        self.saved_sp
    }

    /// Initial stack pointer for traps taken while this process runs.
    pub fn kernel_stack_top(&self) -> usize {
        self.stack.0.as_ptr() as usize + KERNEL_STACK_SIZE
    }

    /// Places the first-switch frame at the top of the kernel stack.
    fn prime_stack(&mut self) {
        let sp = self.kernel_stack_top() - size_of::<Context>();
        let offset = KERNEL_STACK_SIZE - size_of::<Context>();
        let frame = self.stack.0[offset..].as_mut_ptr().cast::<Context>();
        // SAFETY: `frame` covers the last size_of::<Context>() bytes of the
        // 16-byte aligned stack, so it is in bounds and suitably aligned.
        unsafe { frame.write(Context::first_entry()) };
        self.saved_sp = sp;
    }
}

/// Fixed-capacity table of processes plus the running slot.
///
/// Single-hart only: the table is reached from trap context through one
/// registered owner and must never be shared across harts.
pub struct ProcessTable {
    procs: [Process; PROCS_MAX],
    current: usize,
    idle: Option<usize>,
    _not_sync: PhantomData<*mut ()>,
}

assert_not_impl_any!(ProcessTable: Send, Sync);

impl ProcessTable {
    pub const fn new() -> Self {
        Self { procs: [Process::UNUSED; PROCS_MAX], current: 0, idle: None, _not_sync: PhantomData }
    }

    /// Creates a process running `image` from `USER_BASE`.
    pub fn create_process(
        &mut self,
        frames: &mut FrameAllocator,
        layout: &MemoryLayout,
        image: &[u8],
    ) -> Result<Pid, SpawnError> {
        let slot = self
            .procs
            .iter()
            .position(|p| p.state == ProcessState::Unused)
            .ok_or(SpawnError::NoFreeSlot)?;

        let mut table = PageTable::new(frames)?;
        let kernel_rwx = PageFlags::READ | PageFlags::WRITE | PageFlags::EXECUTE;
        table.identity_map(frames, layout.kernel_base, layout.identity_span(), kernel_rwx)?;
        for mmio in layout.mmio {
            table.map_page(frames, VirtAddr::new(mmio.raw()), mmio, PageFlags::READ | PageFlags::WRITE)?;
        }
        load_image(&mut table, frames, image)?;

        let process = &mut self.procs[slot];
        process.page_table = Some(table);
        process.prime_stack();
        process.pid = Pid::from_raw(slot as i32 + 1);
        process.state = ProcessState::Runnable;
        log_info!(target: "task", "created process {} ({} byte image)", process.pid, image.len());
        Ok(process.pid)
    }

    /// Creates the fallback process and makes it current. Boot code calls
    /// this once, before any user process exists.
    pub fn spawn_idle(
        &mut self,
        frames: &mut FrameAllocator,
        layout: &MemoryLayout,
    ) -> Result<Pid, SpawnError> {
        let pid = self.create_process(frames, layout, &[])?;
        let slot = pid.as_raw() as usize - 1;
        self.procs[slot].pid = Pid::IDLE;
        self.idle = Some(slot);
        self.current = slot;
        Ok(Pid::IDLE)
    }

    /// Marks the running process EXITED and returns its pid.
    pub fn exit_current(&mut self) -> Pid {
        let process = &mut self.procs[self.current];
        process.state = ProcessState::Exited;
        log_info!(target: "task", "process {} exited", process.pid);
        process.pid
    }

    pub fn current(&self) -> &Process {
        &self.procs[self.current]
    }

    pub fn current_slot(&self) -> usize {
        self.current
    }

    pub fn idle_slot(&self) -> Option<usize> {
        self.idle
    }

    pub fn process(&self, slot: usize) -> Option<&Process> {
        self.procs.get(slot)
    }

    pub(crate) fn set_current(&mut self, slot: usize) {
        self.current = slot;
    }

    /// Pointers to the saved-sp words of two slots, for the context switch.
    pub(crate) fn saved_sp_ptrs(&mut self, prev: usize, next: usize) -> (*mut usize, *const usize) {
        let prev_sp: *mut usize = &mut self.procs[prev].saved_sp;
        let next_sp: *const usize = &self.procs[next].saved_sp;
        (prev_sp, next_sp)
    }
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Copies `image` page by page into fresh frames mapped at `USER_BASE`.
/// The tail of the last page stays zero.
fn load_image(
    table: &mut PageTable,
    frames: &mut FrameAllocator,
    image: &[u8],
) -> Result<(), SpawnError> {
    let user_rwx = PageFlags::USER | PageFlags::READ | PageFlags::WRITE | PageFlags::EXECUTE;
    for (index, chunk) in image.chunks(PAGE_SIZE).enumerate() {
        let va = USER_BASE.checked_add(index * PAGE_SIZE).ok_or(SpawnError::ImageTooLarge)?;
        let page = frames.alloc_pages(1)?;
        let dst = frames.ptr(page).ok_or(SpawnError::Map(MapError::OutOfRange))?;
        // SAFETY: `dst` addresses a freshly allocated page and chunk.len() <= PAGE_SIZE.
        unsafe { core::ptr::copy_nonoverlapping(chunk.as_ptr(), dst, chunk.len()) };
        table.map_page(frames, va, page, user_rwx)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests;
