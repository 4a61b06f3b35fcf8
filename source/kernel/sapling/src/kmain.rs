// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Kernel main routine responsible for subsystem bring-up.

use crate::{
    disk::BlockIo,
    hal::Console,
    layout::MemoryLayout,
    log_info,
    mailbox::{Mailbox, Status},
    mm::FrameAllocator,
    sched,
    syscall::{api, Args, SysResult, SyscallTable},
    task::{ProcessTable, SpawnError},
    trap::{self, TrapTarget},
    types::Pid,
};

/// Aggregated kernel state. Owns every subsystem and services syscalls.
pub struct Kernel<D, C> {
    frames: FrameAllocator,
    procs: &'static mut ProcessTable,
    disk: D,
    console: C,
    syscalls: SyscallTable,
    layout: MemoryLayout,
}

impl<D: BlockIo, C: Console> Kernel<D, C> {
    pub fn new(
        frames: FrameAllocator,
        procs: &'static mut ProcessTable,
        disk: D,
        console: C,
        layout: MemoryLayout,
    ) -> Self {
        let mut syscalls = SyscallTable::new();
        api::install_handlers(&mut syscalls);
        Self { frames, procs, disk, console, syscalls, layout }
    }

    /// Resets the mailbox and creates the idle process plus one process
    /// running `image`. Leaves idle current.
    pub fn boot(&mut self, image: &[u8]) -> Result<Pid, SpawnError> {
        #[cfg(feature = "boot_disk_probe")]
        self.probe_disk();
        Mailbox::new(&mut self.disk).set_status(Status::Idle);
        self.procs.spawn_idle(&mut self.frames, &self.layout)?;
        self.procs.create_process(&mut self.frames, &self.layout, image)
    }

    /// Logs the first line of the request sector.
    #[cfg(feature = "boot_disk_probe")]
    fn probe_disk(&mut self) {
        use crate::{mailbox::REQUEST_SECTOR, SECTOR_SIZE};

        let mut buf = [0u8; SECTOR_SIZE];
        let len = Mailbox::new(&mut self.disk).read_slot(REQUEST_SECTOR, &mut buf);
        let line = buf[..len].split(|&b| b == b'\n').next().unwrap_or_default();
        let text = core::str::from_utf8(line).unwrap_or("<binary>");
        log_info!(target: "boot", "disk sector 0: {:?}", text);
    }

    pub fn procs(&self) -> &ProcessTable {
        self.procs
    }

    pub fn frames(&self) -> &FrameAllocator {
        &self.frames
    }

    pub fn disk(&self) -> &D {
        &self.disk
    }

    pub fn console(&self) -> &C {
        &self.console
    }
}

impl<D: BlockIo + 'static, C: Console + 'static> Kernel<D, C> {
    /// Boots, hands the hart to the user process and never comes back
    /// unless every user process has exited.
    pub fn run(mut self, image: &[u8]) -> ! {
        match self.boot(image) {
            Ok(pid) => log_info!(target: "boot", "starting process {}", pid),
            Err(err) => panic!("boot failed: {:?}", err),
        }
        let kernel: *mut dyn TrapTarget = &mut self;
        // SAFETY: `self` lives in this frame, which never returns, and is
        // reached only through `kernel` from here on.
        unsafe { trap::register_target(kernel) };
        // SAFETY: the borrow taken by `reschedule` ends before the switch.
        if let Some(switch) = unsafe { (*kernel).reschedule() } {
            // SAFETY: no borrow of the kernel is live across the switch.
            unsafe { sched::switch_to(switch) };
        }
        panic!("switched to idle process");
    }
}

impl<D: BlockIo, C: Console> TrapTarget for Kernel<D, C> {
    fn syscall(&mut self, number: usize, args: &Args) -> SysResult<usize> {
        let mut ctx = api::Context {
            procs: &mut *self.procs,
            frames: &self.frames,
            console: &self.console,
            disk: &mut self.disk,
        };
        self.syscalls.dispatch(number, &mut ctx, args)
    }

    fn reschedule(&mut self) -> Option<sched::Switch> {
        sched::schedule(&mut *self.procs)
    }
}

/// Kernel entry after the boot shim has set up a stack and cleared `.bss`.
#[cfg(all(target_arch = "riscv32", target_os = "none"))]
pub fn kmain(procs: &'static mut ProcessTable, user_image: &[u8]) -> ! {
    use crate::hal::virt::VirtUart;

    let layout = MemoryLayout::from_linker();
    // SAFETY: first thing on the boot hart, before any user mode entry.
    unsafe { trap::install_trap_vector() };
    log_info!(target: "boot", "sapling: rv32 Sv32 kernel");
    log_info!(
        target: "boot",
        "kernel {}, free ram {}..{}",
        layout.kernel_base,
        layout.free_ram,
        layout.free_ram_end
    );

    // SAFETY: the linker reserves [__free_ram, __free_ram_end) for the
    // allocator and the kernel runs identity mapped.
    let mut frames = unsafe { FrameAllocator::identity(layout.free_ram, layout.free_ram_end) };
    let disk = init_disk(&mut frames);
    Kernel::new(frames, procs, disk, VirtUart::new(), layout).run(user_image)
}

#[cfg(all(target_arch = "riscv32", target_os = "none"))]
fn init_disk(
    frames: &mut FrameAllocator,
) -> storage_virtio_blk::VirtioBlk<crate::hal::virt::MmioBus, crate::mm::PageSpan> {
    use storage_virtio_blk::{VirtioBlk, QUEUE_BYTES, REQUEST_BYTES};

    use crate::{hal::virt::MmioBus, layout::VIRTIO_BLK_BASE, mm::PAGE_SIZE};

    let pages = |bytes: usize| bytes.div_ceil(PAGE_SIZE);
    let queue = frames
        .alloc_span(pages(QUEUE_BYTES))
        .unwrap_or_else(|err| panic!("virtqueue allocation failed: {}", err));
    let request = frames
        .alloc_span(pages(REQUEST_BYTES))
        .unwrap_or_else(|err| panic!("virtio request allocation failed: {}", err));
    // SAFETY: VIRTIO_BLK_BASE is the device page, identity mapped everywhere.
    let bus = unsafe { MmioBus::new(VIRTIO_BLK_BASE) };
    match VirtioBlk::init(bus, queue, request) {
        Ok(disk) => {
            log_info!(target: "boot", "virtio-blk: {} sectors", disk.capacity_sectors());
            disk
        }
        Err(err) => panic!("virtio-blk init failed: {:?}", err),
    }
}

#[cfg(test)]
mod tests;
