// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), no_std)]

//! CONTEXT: Polled virtio-blk driver over the legacy virtio-mmio transport
//! OWNERS: @kernel-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: tests/basic.rs (mock device servicing descriptor chains)
//!
//! PUBLIC API:
//!   - VirtioBlk::probe(): Validate MMIO identity
//!   - VirtioBlk::init(): Status handshake, queue setup, capacity read
//!   - VirtioBlk::read_write(): One synchronous sector transfer
//!   - VirtioBlk::wait_for_completion(): Blocking wait for the in-flight request
//!
//! DEPENDENCIES:
//!   - sapling-hal::{Bus, DmaBuffer}: register window and device-visible memory
//!
//! INVARIANTS:
//!   - At most one request is in flight; it is outstanding exactly while
//!     `last_used` differs from the device's used index
//!   - Queue memory uses the legacy split layout: descriptors, then the
//!     available ring, then the used ring on the next page boundary

use core::mem::size_of;
use core::ptr::{addr_of, addr_of_mut, read_volatile, write_volatile};
use core::sync::atomic::{fence, Ordering};

use sapling_hal::{Bus, DmaBuffer};
use static_assertions::const_assert_eq;

/// VirtIO MMIO magic ("virt" LE).
pub const VIRTIO_MMIO_MAGIC: u32 = 0x7472_6976;
/// VirtIO MMIO legacy version, the only transport revision this driver speaks.
pub const VIRTIO_MMIO_VERSION_LEGACY: u32 = 1;
/// VirtIO device id for block devices.
pub const VIRTIO_DEVICE_ID_BLK: u32 = 2;

/// Bytes per disk sector.
pub const SECTOR_SIZE: usize = 512;
/// Descriptors in the request queue.
pub const QUEUE_LEN: usize = 16;
/// Guest page size announced to the device; also the used-ring alignment.
pub const QUEUE_PAGE_SIZE: usize = 4096;

// VirtIO MMIO register offsets (bytes).
const REG_MAGIC: usize = 0x000;
const REG_VERSION: usize = 0x004;
const REG_DEVICE_ID: usize = 0x008;
const REG_VENDOR_ID: usize = 0x00c;
const REG_GUEST_PAGE_SIZE: usize = 0x028;
const REG_QUEUE_SEL: usize = 0x030;
const REG_QUEUE_NUM_MAX: usize = 0x034;
const REG_QUEUE_NUM: usize = 0x038;
const REG_QUEUE_ALIGN: usize = 0x03c;
const REG_QUEUE_PFN: usize = 0x040;
const REG_QUEUE_NOTIFY: usize = 0x050;
const REG_STATUS: usize = 0x070;
const REG_CONFIG_CAPACITY: usize = 0x100;

// Device status bits.
pub const STATUS_ACKNOWLEDGE: u32 = 1;
pub const STATUS_DRIVER: u32 = 2;
pub const STATUS_DRIVER_OK: u32 = 4;
pub const STATUS_FEATURES_OK: u32 = 8;

pub const VIRTQ_DESC_F_NEXT: u16 = 1;
pub const VIRTQ_DESC_F_WRITE: u16 = 2;

pub const VIRTIO_BLK_T_IN: u32 = 0;
pub const VIRTIO_BLK_T_OUT: u32 = 1;

const REQUEST_QUEUE: u32 = 0;

/// Errors reported by the driver. Identification and setup failures are
/// fatal to the caller; the transfer errors are soft.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VirtioError {
    BadMagic(u32),
    UnsupportedVersion(u32),
    NotBlockDevice(u32),
    /// Queue 0 is absent or smaller than [`QUEUE_LEN`].
    QueueUnavailable(u32),
    /// A DMA region handed to [`VirtioBlk::init`] cannot hold its structure.
    BufferTooSmall { needed: usize, got: usize },
    SectorOutOfRange { sector: u64, capacity: u64 },
    /// Device completed the request with a non-zero status byte.
    DeviceStatus(u8),
}

/// Device identity information.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviceInfo {
    pub version: u32,
    pub device_id: u32,
    pub vendor_id: u32,
}

#[repr(C)]
#[derive(Clone, Copy)]
struct VqDesc {
    addr: u64,
    len: u32,
    flags: u16,
    next: u16,
}

#[repr(C)]
struct VqAvail {
    flags: u16,
    idx: u16,
    ring: [u16; QUEUE_LEN],
}

#[repr(C)]
#[derive(Clone, Copy)]
struct VqUsedElem {
    id: u32,
    len: u32,
}

#[repr(C)]
struct VqUsed {
    flags: u16,
    idx: u16,
    ring: [VqUsedElem; QUEUE_LEN],
}

#[repr(C)]
#[derive(Clone, Copy)]
struct BlkReqHeader {
    req_type: u32,
    reserved: u32,
    sector: u64,
}

const_assert_eq!(size_of::<VqDesc>(), 16);
const_assert_eq!(size_of::<BlkReqHeader>(), 16);

/// Offset of the available ring inside queue memory.
pub const AVAIL_OFFSET: usize = size_of::<VqDesc>() * QUEUE_LEN;
/// Offset of the used ring inside queue memory.
pub const USED_OFFSET: usize = align_up(AVAIL_OFFSET + size_of::<VqAvail>(), QUEUE_PAGE_SIZE);
/// Bytes of DMA memory the queue needs.
pub const QUEUE_BYTES: usize = USED_OFFSET + size_of::<VqUsed>();

/// Request page layout: header, one sector of payload, one status byte.
pub const REQ_DATA_OFFSET: usize = size_of::<BlkReqHeader>();
pub const REQ_STATUS_OFFSET: usize = REQ_DATA_OFFSET + SECTOR_SIZE;
/// Bytes of DMA memory the request structure needs.
pub const REQUEST_BYTES: usize = REQ_STATUS_OFFSET + 1;

const fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

/// Single-queue, polled virtio-blk device.
pub struct VirtioBlk<B: Bus, D: DmaBuffer> {
    bus: B,
    queue: D,
    request: D,
    capacity: u64,
    last_used: u16,
}

impl<B: Bus, D: DmaBuffer> VirtioBlk<B, D> {
    /// Validates MMIO identity and returns device info.
    pub fn probe(bus: &B) -> Result<DeviceInfo, VirtioError> {
        let magic = bus.read(REG_MAGIC);
        if magic != VIRTIO_MMIO_MAGIC {
            return Err(VirtioError::BadMagic(magic));
        }
        let version = bus.read(REG_VERSION);
        if version != VIRTIO_MMIO_VERSION_LEGACY {
            return Err(VirtioError::UnsupportedVersion(version));
        }
        let device_id = bus.read(REG_DEVICE_ID);
        if device_id != VIRTIO_DEVICE_ID_BLK {
            return Err(VirtioError::NotBlockDevice(device_id));
        }
        let vendor_id = bus.read(REG_VENDOR_ID);
        Ok(DeviceInfo { version, device_id, vendor_id })
    }

    /// Brings the device to DRIVER_OK with one configured request queue.
    ///
    /// `queue` must hold [`QUEUE_BYTES`] and start on a page boundary;
    /// `request` must hold [`REQUEST_BYTES`]. Both stay owned by the driver
    /// for the lifetime of the device.
    pub fn init(bus: B, mut queue: D, request: D) -> Result<Self, VirtioError> {
        if queue.len() < QUEUE_BYTES {
            return Err(VirtioError::BufferTooSmall { needed: QUEUE_BYTES, got: queue.len() });
        }
        if request.len() < REQUEST_BYTES {
            return Err(VirtioError::BufferTooSmall { needed: REQUEST_BYTES, got: request.len() });
        }
        Self::probe(&bus)?;

        bus.write(REG_STATUS, 0);
        set_status(&bus, STATUS_ACKNOWLEDGE);
        set_status(&bus, STATUS_DRIVER);
        set_status(&bus, STATUS_FEATURES_OK);

        // SAFETY: the length check above covers the whole queue region.
        unsafe { core::ptr::write_bytes(queue.as_mut_ptr(), 0, QUEUE_BYTES) };
        setup_queue(&bus, REQUEST_QUEUE, queue.phys_addr())?;

        set_status(&bus, STATUS_DRIVER_OK);
        let capacity = bus.read64(REG_CONFIG_CAPACITY);

        Ok(Self { bus, queue, request, capacity, last_used: 0 })
    }

    /// Disk size in 512-byte sectors as reported by the device config space.
    pub fn capacity_sectors(&self) -> u64 {
        self.capacity
    }

    /// Transfers one sector between `buf` and the disk.
    ///
    /// On a read, `buf` is only overwritten after the device reports success.
    /// Out-of-range sectors are rejected before any device state changes.
    pub fn read_write(
        &mut self,
        buf: &mut [u8; SECTOR_SIZE],
        sector: u64,
        is_write: bool,
    ) -> Result<(), VirtioError> {
        if sector >= self.capacity {
            return Err(VirtioError::SectorOutOfRange { sector, capacity: self.capacity });
        }

        let req_pa = self.request.phys_addr();
        let req = self.request.as_mut_ptr();
        let header = BlkReqHeader {
            req_type: if is_write { VIRTIO_BLK_T_OUT } else { VIRTIO_BLK_T_IN },
            reserved: 0,
            sector,
        };
        // SAFETY: `init` checked that the request region holds REQUEST_BYTES.
        unsafe {
            write_volatile(req.cast::<BlkReqHeader>(), header);
            write_volatile(req.add(REQ_STATUS_OFFSET), 0xff);
            if is_write {
                core::ptr::copy_nonoverlapping(buf.as_ptr(), req.add(REQ_DATA_OFFSET), SECTOR_SIZE);
            }
        }

        let payload_flags =
            if is_write { VIRTQ_DESC_F_NEXT } else { VIRTQ_DESC_F_NEXT | VIRTQ_DESC_F_WRITE };
        self.write_desc(0, VqDesc {
            addr: req_pa,
            len: size_of::<BlkReqHeader>() as u32,
            flags: VIRTQ_DESC_F_NEXT,
            next: 1,
        });
        self.write_desc(1, VqDesc {
            addr: req_pa + REQ_DATA_OFFSET as u64,
            len: SECTOR_SIZE as u32,
            flags: payload_flags,
            next: 2,
        });
        self.write_desc(2, VqDesc {
            addr: req_pa + REQ_STATUS_OFFSET as u64,
            len: 1,
            flags: VIRTQ_DESC_F_WRITE,
            next: 0,
        });

        self.kick(0);
        self.wait_for_completion();

        // SAFETY: same region as above; the device has finished with it.
        let status = unsafe { read_volatile(req.add(REQ_STATUS_OFFSET)) };
        if status != 0 {
            return Err(VirtioError::DeviceStatus(status));
        }
        if !is_write {
            // SAFETY: payload lies inside the checked request region.
            unsafe {
                core::ptr::copy_nonoverlapping(req.add(REQ_DATA_OFFSET), buf.as_mut_ptr(), SECTOR_SIZE)
            };
        }
        Ok(())
    }

    /// True while a kicked request has not been returned on the used ring.
    pub fn is_busy(&self) -> bool {
        self.last_used != self.used_idx()
    }

    /// Blocks until the in-flight request completes. Polls the used ring;
    /// the device raises no interrupt in this configuration.
    pub fn wait_for_completion(&self) {
        while self.is_busy() {
            core::hint::spin_loop();
        }
    }

    fn write_desc(&mut self, index: usize, desc: VqDesc) {
        let descs = self.queue.as_mut_ptr().cast::<VqDesc>();
        // SAFETY: index < QUEUE_LEN and the descriptor table starts the queue region.
        unsafe { write_volatile(descs.add(index), desc) };
    }

    /// Publishes descriptor chain `head` and notifies the device.
    fn kick(&mut self, head: u16) {
        // SAFETY: AVAIL_OFFSET + size_of::<VqAvail>() lies inside QUEUE_BYTES.
        unsafe {
            let avail = self.queue.as_mut_ptr().add(AVAIL_OFFSET).cast::<VqAvail>();
            let idx = read_volatile(addr_of!((*avail).idx));
            write_volatile(addr_of_mut!((*avail).ring[idx as usize % QUEUE_LEN]), head);
            fence(Ordering::SeqCst);
            write_volatile(addr_of_mut!((*avail).idx), idx.wrapping_add(1));
        }
        fence(Ordering::SeqCst);
        self.bus.write(REG_QUEUE_NOTIFY, REQUEST_QUEUE);
        self.last_used = self.last_used.wrapping_add(1);
    }

    fn used_idx(&self) -> u16 {
        // SAFETY: USED_OFFSET + size_of::<VqUsed>() == QUEUE_BYTES.
        unsafe {
            let used = self.queue.as_ptr().add(USED_OFFSET).cast::<VqUsed>();
            read_volatile(addr_of!((*used).idx))
        }
    }
}

fn set_status<B: Bus>(bus: &B, bit: u32) {
    let status = bus.read(REG_STATUS);
    bus.write(REG_STATUS, status | bit);
}

/// Programs a legacy queue: page size, ring size, alignment and PFN.
fn setup_queue<B: Bus>(bus: &B, index: u32, queue_pa: u64) -> Result<(), VirtioError> {
    bus.write(REG_GUEST_PAGE_SIZE, QUEUE_PAGE_SIZE as u32);
    bus.write(REG_QUEUE_SEL, index);
    let max = bus.read(REG_QUEUE_NUM_MAX);
    if (max as usize) < QUEUE_LEN {
        return Err(VirtioError::QueueUnavailable(max));
    }
    bus.write(REG_QUEUE_NUM, QUEUE_LEN as u32);
    bus.write(REG_QUEUE_ALIGN, QUEUE_PAGE_SIZE as u32);
    bus.write(REG_QUEUE_PFN, (queue_pa / QUEUE_PAGE_SIZE as u64) as u32);
    Ok(())
}
