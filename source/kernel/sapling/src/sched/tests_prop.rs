// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

extern crate std;

use std::boxed::Box;
use std::vec;

use proptest::prelude::*;

use super::*;
use crate::test_support::Arena;

proptest! {
    #![proptest_config(ProptestConfig { cases: 32, .. ProptestConfig::default() })]

    #[test]
    fn every_runnable_process_runs_within_k_yields(
        users in 1usize..PROCS_MAX,
        exits in proptest::collection::vec(any::<bool>(), PROCS_MAX),
        rounds in 1usize..4,
    ) {
        let mut arena = Arena::new(8 + 6 * PROCS_MAX);
        let mut frames = arena.frames();
        let layout = arena.layout();
        let mut procs = Box::new(ProcessTable::new());
        procs.spawn_idle(&mut frames, &layout).expect("idle");
        for _ in 0..users {
            procs.create_process(&mut frames, &layout, &[0x73, 0, 0, 0]).expect("user");
        }

        // Retire a random subset, never all of them.
        for slot in 1..=users {
            if exits[slot] && slot != users {
                procs.set_current(slot);
                procs.exit_current();
            }
        }
        procs.set_current(0);

        let runnable: vec::Vec<usize> = (1..=users)
            .filter(|&slot| procs.process(slot).map(|p| p.state()) == Some(ProcessState::Runnable))
            .collect();
        let k = runnable.len();
        prop_assert!(k >= 1);

        let mut seen = vec![0usize; PROCS_MAX];
        for _ in 0..rounds {
            let mut window = vec![false; PROCS_MAX];
            for _ in 0..k {
                let _ = schedule(&mut procs);
                window[procs.current_slot()] = true;
                seen[procs.current_slot()] += 1;
            }
            for &slot in &runnable {
                prop_assert!(window[slot], "slot {} starved", slot);
            }
        }
        prop_assert_eq!(seen[0], 0, "idle ran while user processes were runnable");
    }
}
