// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Build script for the sapling boot image
//! OWNERS: @kernel-team
//!
//! Injects `kernel.ld` for freestanding targets and stages the first user
//! program as `$OUT_DIR/user.bin`: the flat binary named by
//! `SAPLING_USER_IMAGE`, or a built-in greeting when unset.

use std::env;
use std::path::PathBuf;

/// `li a3,1; li a0,'h'; ecall; li a0,'i'; ecall; li a0,'\n'; ecall; li a3,3; ecall; j .`
const DEFAULT_PROGRAM: [u32; 10] = [
    0x0010_0693, 0x0680_0513, 0x0000_0073, 0x0690_0513, 0x0000_0073, 0x00a0_0513,
    0x0000_0073, 0x0030_0693, 0x0000_0073, 0x0000_006f,
];

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR"));
    let out = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR"));

    if env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("none") {
        let linker_script = manifest_dir.join("kernel.ld");
        println!("cargo:rerun-if-changed={}", linker_script.display());
        let abs_script = linker_script.canonicalize().expect("kernel.ld must exist");
        println!("cargo:rustc-link-arg=-T{}", abs_script.display());
    }

    println!("cargo:rerun-if-env-changed=SAPLING_USER_IMAGE");
    let image = match env::var("SAPLING_USER_IMAGE") {
        Ok(path) => {
            println!("cargo:rerun-if-changed={}", path);
            std::fs::read(&path)
                .unwrap_or_else(|err| panic!("failed to read user image {}: {}", path, err))
        }
        Err(_) => DEFAULT_PROGRAM.iter().flat_map(|word| word.to_le_bytes()).collect(),
    };
    let dst = out.join("user.bin");
    std::fs::write(&dst, image)
        .unwrap_or_else(|err| panic!("failed to write {}: {}", dst.display(), err));
}
