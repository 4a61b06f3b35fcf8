// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Host doubles shared by unit tests: physical-memory arena, console, RAM disk.

extern crate std;

use std::boxed::Box;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::vec;
use std::vec::Vec;

use crate::disk::{BlockIo, DiskError};
use crate::hal::Console;
use crate::layout::MemoryLayout;
use crate::mm::{FrameAllocator, PAGE_SIZE};
use crate::types::PhysAddr;
use crate::SECTOR_SIZE;

/// Physical address the arena pretends to live at.
pub const ARENA_PA: u32 = 0x8040_0000;

#[repr(C, align(4096))]
#[derive(Clone, Copy)]
struct Page([u8; PAGE_SIZE]);

/// Page-aligned host memory standing in for free RAM.
pub struct Arena {
    pages: Box<[Page]>,
}

impl Arena {
    pub fn new(pages: usize) -> Self {
        Self { pages: vec![Page([0xa5; PAGE_SIZE]); pages].into_boxed_slice() }
    }

    /// Allocator over the whole arena. The arena must outlive it.
    pub fn frames(&mut self) -> FrameAllocator {
        let len = (self.pages.len() * PAGE_SIZE) as u32;
        let window = self.pages.as_mut_ptr().cast::<u8>();
        // SAFETY: the boxed slice backs exactly `len` bytes and is owned by the test.
        unsafe { FrameAllocator::new(PhysAddr::new(ARENA_PA), PhysAddr::new(ARENA_PA + len), window) }
    }

    /// Layout whose identity-mapped span covers a small kernel image plus the arena.
    pub fn layout(&self) -> MemoryLayout {
        let len = (self.pages.len() * PAGE_SIZE) as u32;
        MemoryLayout::new(ARENA_PA - 4 * PAGE_SIZE as u32, ARENA_PA, ARENA_PA + len)
    }
}

/// Console fed from a queue; records output.
#[derive(Default)]
pub struct MockConsole {
    pub input: RefCell<VecDeque<Option<u8>>>,
    pub output: RefCell<Vec<u8>>,
    pub polls: RefCell<usize>,
}

impl MockConsole {
    /// Scripted poll results; `None` entries model "nothing received yet".
    pub fn with_input(script: &[Option<u8>]) -> Self {
        let console = Self::default();
        console.input.borrow_mut().extend(script.iter().copied());
        console
    }
}

impl Console for MockConsole {
    fn put_byte(&self, byte: u8) {
        self.output.borrow_mut().push(byte);
    }

    fn try_get_byte(&self) -> Option<u8> {
        *self.polls.borrow_mut() += 1;
        self.input.borrow_mut().pop_front().flatten()
    }
}

/// In-memory disk with the same bounds behaviour as the virtio device.
pub struct RamDisk {
    pub sectors: Vec<[u8; SECTOR_SIZE]>,
}

impl RamDisk {
    pub fn new(sectors: usize) -> Self {
        Self { sectors: vec![[0; SECTOR_SIZE]; sectors] }
    }

    /// Stores `text` NUL-terminated in `sector`, as the external agent would.
    pub fn put_str(&mut self, sector: usize, text: &str) {
        let mut data = [0u8; SECTOR_SIZE];
        data[..text.len()].copy_from_slice(text.as_bytes());
        self.sectors[sector] = data;
    }

    pub fn get_str(&self, sector: usize) -> &str {
        let data = &self.sectors[sector];
        let len = data.iter().position(|&b| b == 0).unwrap_or(SECTOR_SIZE);
        std::str::from_utf8(&data[..len]).expect("utf8 sector")
    }
}

impl BlockIo for RamDisk {
    fn capacity_sectors(&self) -> u64 {
        self.sectors.len() as u64
    }

    fn read_write_disk(
        &mut self,
        buf: &mut [u8; SECTOR_SIZE],
        sector: u64,
        is_write: bool,
    ) -> Result<(), DiskError> {
        let capacity = self.capacity_sectors();
        let slot = self
            .sectors
            .get_mut(sector as usize)
            .ok_or(DiskError::OutOfRange { sector, capacity })?;
        if is_write {
            *slot = *buf;
        } else {
            *buf = *slot;
        }
        Ok(())
    }
}
