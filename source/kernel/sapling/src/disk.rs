// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Kernel-facing block I/O seam over the virtio-blk driver
//! OWNERS: @kernel-team
//! PUBLIC API: BlockIo, DiskError, transfer()
//! DEPENDS_ON: storage-virtio-blk, log
//! INVARIANTS: Failed transfers are soft: logged, reported as "did not happen", never fatal

use core::fmt;

use sapling_hal::{Bus, DmaBuffer};
use storage_virtio_blk::{VirtioBlk, VirtioError, SECTOR_SIZE};

use crate::log_warn;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiskError {
    OutOfRange { sector: u64, capacity: u64 },
    /// Device completed the request with this non-zero status.
    Device(u8),
    Driver(VirtioError),
}

impl From<VirtioError> for DiskError {
    fn from(value: VirtioError) -> Self {
        match value {
            VirtioError::SectorOutOfRange { sector, capacity } => Self::OutOfRange { sector, capacity },
            VirtioError::DeviceStatus(status) => Self::Device(status),
            other => Self::Driver(other),
        }
    }
}

impl fmt::Display for DiskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiskError::OutOfRange { sector, capacity } => {
                write!(f, "sector {} beyond capacity {}", sector, capacity)
            }
            DiskError::Device(status) => write!(f, "device status {}", status),
            DiskError::Driver(err) => write!(f, "driver error {:?}", err),
        }
    }
}

/// Synchronous single-sector storage.
pub trait BlockIo {
    fn capacity_sectors(&self) -> u64;

    /// Reads or writes one sector. Blocks the hart until the device is done.
    fn read_write_disk(
        &mut self,
        buf: &mut [u8; SECTOR_SIZE],
        sector: u64,
        is_write: bool,
    ) -> Result<(), DiskError>;
}

impl<B: Bus, D: DmaBuffer> BlockIo for VirtioBlk<B, D> {
    fn capacity_sectors(&self) -> u64 {
        VirtioBlk::capacity_sectors(self)
    }

    fn read_write_disk(
        &mut self,
        buf: &mut [u8; SECTOR_SIZE],
        sector: u64,
        is_write: bool,
    ) -> Result<(), DiskError> {
        self.read_write(buf, sector, is_write).map_err(DiskError::from)
    }
}

/// Runs one transfer, logging a soft failure. Returns whether it happened.
pub fn transfer(disk: &mut dyn BlockIo, buf: &mut [u8; SECTOR_SIZE], sector: u64, is_write: bool) -> bool {
    match disk.read_write_disk(buf, sector, is_write) {
        Ok(()) => true,
        Err(err) => {
            let op = if is_write { "write" } else { "read" };
            log_warn!(target: "disk", "{} of sector {} failed: {}", op, sector, err);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RamDisk;

    #[test]
    fn out_of_range_is_soft_and_logged() {
        let mut disk = RamDisk::new(3);
        let mut buf = [0x42u8; SECTOR_SIZE];
        assert!(!transfer(&mut disk, &mut buf, 77, false));
        assert_eq!(buf, [0x42u8; SECTOR_SIZE]);
        assert!(crate::log::captured_contains("read of sector 77 failed: sector 77 beyond capacity 3"));
    }

    #[test]
    fn virtio_errors_map_to_disk_errors() {
        assert_eq!(
            DiskError::from(VirtioError::SectorOutOfRange { sector: 9, capacity: 4 }),
            DiskError::OutOfRange { sector: 9, capacity: 4 }
        );
        assert_eq!(DiskError::from(VirtioError::DeviceStatus(2)), DiskError::Device(2));
    }
}
