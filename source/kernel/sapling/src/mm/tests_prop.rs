// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

extern crate std;

use std::vec::Vec;

use proptest::prelude::*;

use super::*;
use crate::test_support::{Arena, ARENA_PA};
use crate::types::{PhysAddr, VirtAddr};

const ARENA_PAGES: usize = 32;

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]

    #[test]
    fn allocations_never_overlap(requests in proptest::collection::vec(1usize..6, 1..16)) {
        let mut arena = Arena::new(ARENA_PAGES);
        let mut frames = arena.frames();
        let mut granted: Vec<(u32, u32)> = Vec::new();
        let mut used = 0;
        for n in requests {
            match frames.alloc_pages(n) {
                Ok(pa) => {
                    prop_assert!(pa.is_page_aligned());
                    let range = (pa.raw(), pa.raw() + (n * PAGE_SIZE) as u32);
                    prop_assert!(range.1 <= ARENA_PA + (ARENA_PAGES * PAGE_SIZE) as u32);
                    for prev in &granted {
                        prop_assert!(range.0 >= prev.1 || range.1 <= prev.0);
                    }
                    granted.push(range);
                    used += n;
                }
                Err(AllocError::OutOfMemory { requested, remaining }) => {
                    prop_assert_eq!(requested, n);
                    prop_assert_eq!(remaining, ARENA_PAGES - used);
                    prop_assert!(n > remaining);
                }
                Err(AllocError::Empty) => prop_assert!(false, "non-zero request reported empty"),
            }
        }
    }

    #[test]
    fn translate_returns_what_was_mapped(
        mappings in proptest::collection::vec((0u32..0x0400_0000, 0u32..0x2000, any::<u8>()), 1..24),
    ) {
        let mut arena = Arena::new(ARENA_PAGES);
        let mut frames = arena.frames();
        let mut table = PageTable::new(&mut frames).expect("root");

        // Last write to a page wins.
        let mut expected: Vec<(u32, u32, PageFlags)> = Vec::new();
        for (va, ppn, bits) in mappings {
            let va = va & !0xfff;
            let flags = PageFlags::from_bits_truncate(bits as u32 & 0x1e);
            if (flags & (PageFlags::READ | PageFlags::WRITE | PageFlags::EXECUTE)).is_empty() {
                continue;
            }
            let pa = PhysAddr::from_ppn(0x8_0000 + ppn);
            table
                .map_page(&mut frames, VirtAddr::new(va), pa, flags)
                .expect("arena holds every second-level table");
            expected.retain(|(v, _, _)| *v != va);
            expected.push((va, pa.raw(), flags | PageFlags::VALID));
        }

        for (va, pa, flags) in expected {
            let got = table.translate(&frames, VirtAddr::new(va | 0x7ff));
            prop_assert_eq!(got, Some((PhysAddr::new(pa | 0x7ff), flags)));
        }
    }
}
