// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Machine constants and the physical memory layout of QEMU `virt` (rv32)
//! OWNERS: @kernel-team
//! PUBLIC API: MemoryLayout, PROCS_MAX, KERNEL_STACK_SIZE, USER_BASE, *_BASE, SSTATUS_*
//! DEPENDS_ON: types::{PhysAddr, VirtAddr}
//! INVARIANTS: Every region boundary is page aligned; MMIO pages are identity mapped

use crate::types::{PhysAddr, VirtAddr};

/// Process table capacity.
pub const PROCS_MAX: usize = 8;
/// Per-process kernel stack in bytes.
pub const KERNEL_STACK_SIZE: usize = 8192;
/// User images are loaded and entered here.
pub const USER_BASE: VirtAddr = VirtAddr::new(0x0100_0000);

pub const UART0_BASE: usize = 0x1000_0000;
pub const VIRTIO_BLK_BASE: usize = 0x1000_1000;

/// `sstatus.SPIE`: interrupts enabled after `sret`.
pub const SSTATUS_SPIE: usize = 1 << 5;
/// `sstatus.SUM`: supervisor may touch user pages.
pub const SSTATUS_SUM: usize = 1 << 18;

/// Physical layout the kernel maps into every process.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemoryLayout {
    /// First byte of the kernel image.
    pub kernel_base: PhysAddr,
    /// Start of the bump-allocated free region.
    pub free_ram: PhysAddr,
    /// One past the last allocatable byte; also the end of the identity map.
    pub free_ram_end: PhysAddr,
    /// Device pages identity mapped read/write.
    pub mmio: [PhysAddr; 2],
}

impl MemoryLayout {
    /// Layout described by the linker script symbols.
    #[cfg(all(target_arch = "riscv32", target_os = "none"))]
    pub fn from_linker() -> Self {
        extern "C" {
            static __kernel_base: u8;
            static __free_ram: u8;
            static __free_ram_end: u8;
        }
        // SAFETY: only the addresses of the linker symbols are taken.
        let (base, free, end) = unsafe {
            (
                core::ptr::addr_of!(__kernel_base) as usize,
                core::ptr::addr_of!(__free_ram) as usize,
                core::ptr::addr_of!(__free_ram_end) as usize,
            )
        };
        Self::new(base as u32, free as u32, end as u32)
    }

    /// Layout with the `virt` machine's UART and virtio-blk pages.
    pub const fn new(kernel_base: u32, free_ram: u32, free_ram_end: u32) -> Self {
        Self {
            kernel_base: PhysAddr::new(kernel_base),
            free_ram: PhysAddr::new(free_ram),
            free_ram_end: PhysAddr::new(free_ram_end),
            mmio: [PhysAddr::new(VIRTIO_BLK_BASE as u32), PhysAddr::new(UART0_BASE as u32)],
        }
    }

    /// Bytes between the kernel base and the end of free RAM.
    pub const fn identity_span(&self) -> usize {
        (self.free_ram_end.raw() - self.kernel_base.raw()) as usize
    }
}
