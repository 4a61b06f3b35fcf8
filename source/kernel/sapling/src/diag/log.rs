// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Minimal structured logging with severity levels
//! OWNERS: @kernel-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Host capture sink asserted by disk and scheduler tests
//! PUBLIC API: log_* macros, emit(level,target,args)
//! DEPENDS_ON: uart::KernelUart (target), capture buffer (host tests)
//! INVARIANTS: Debug/Trace only in debug builds; single-line emission

use core::fmt::Arguments;

/// Logging severity used by the kernel.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Level {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl Level {
    const fn tag(self) -> &'static str {
        match self {
            Level::Error => "ERROR",
            Level::Warn => "WARN",
            Level::Info => "INFO",
            Level::Debug => "DEBUG",
            Level::Trace => "TRACE",
        }
    }

    const fn enabled(self) -> bool {
        match self {
            Level::Debug | Level::Trace => cfg!(debug_assertions),
            _ => true,
        }
    }
}

/// Emits a structured log line if the level is enabled for the current build.
pub fn emit(level: Level, target: &'static str, args: Arguments<'_>) {
    if !level.enabled() {
        return;
    }
    sink::write_line(level, target, args);
}

#[cfg(all(target_arch = "riscv32", target_os = "none"))]
mod sink {
    use core::fmt::{Arguments, Write};

    use super::Level;

    pub(super) fn write_line(level: Level, target: &'static str, args: Arguments<'_>) {
        let mut uart = crate::uart::KernelUart::lock();
        let writer = &mut *uart;
        let _ = write!(writer, "[{} {}] ", level.tag(), target);
        let _ = writer.write_fmt(args);
        let _ = writer.write_char('\n');
    }
}

#[cfg(all(test, not(all(target_arch = "riscv32", target_os = "none"))))]
mod sink {
    extern crate std;

    use core::fmt::Arguments;
    use std::{format, string::String, vec::Vec};

    use spin::Mutex;

    use super::Level;

    static CAPTURED: Mutex<Vec<String>> = Mutex::new(Vec::new());

    pub(super) fn write_line(level: Level, target: &'static str, args: Arguments<'_>) {
        CAPTURED.lock().push(format!("[{} {}] {}", level.tag(), target, args));
    }

    /// True if any captured line contains `needle`. Tests run in parallel, so
    /// assertions should look for messages unique to the test.
    pub fn contains(needle: &str) -> bool {
        CAPTURED.lock().iter().any(|line| line.contains(needle))
    }
}

#[cfg(all(not(test), not(all(target_arch = "riscv32", target_os = "none"))))]
mod sink {
    use core::fmt::Arguments;

    use super::Level;

    pub(super) fn write_line(_level: Level, _target: &'static str, _args: Arguments<'_>) {}
}

#[cfg(all(test, not(all(target_arch = "riscv32", target_os = "none"))))]
pub use sink::contains as captured_contains;

#[macro_export]
macro_rules! log_error {
    (target: $target:expr, $($arg:tt)+) => {{
        $crate::log::emit($crate::log::Level::Error, $target, format_args!($($arg)+));
    }};
    ($($arg:tt)+) => {{
        $crate::log::emit($crate::log::Level::Error, module_path!(), format_args!($($arg)+));
    }};
}

#[macro_export]
macro_rules! log_warn {
    (target: $target:expr, $($arg:tt)+) => {{
        $crate::log::emit($crate::log::Level::Warn, $target, format_args!($($arg)+));
    }};
    ($($arg:tt)+) => {{
        $crate::log::emit($crate::log::Level::Warn, module_path!(), format_args!($($arg)+));
    }};
}

#[macro_export]
macro_rules! log_info {
    (target: $target:expr, $($arg:tt)+) => {{
        $crate::log::emit($crate::log::Level::Info, $target, format_args!($($arg)+));
    }};
    ($($arg:tt)+) => {{
        $crate::log::emit($crate::log::Level::Info, module_path!(), format_args!($($arg)+));
    }};
}

#[macro_export]
macro_rules! log_debug {
    (target: $target:expr, $($arg:tt)+) => {{
        $crate::log::emit($crate::log::Level::Debug, $target, format_args!($($arg)+));
    }};
    ($($arg:tt)+) => {{
        $crate::log::emit($crate::log::Level::Debug, module_path!(), format_args!($($arg)+));
    }};
}

#[macro_export]
macro_rules! log_trace {
    (target: $target:expr, $($arg:tt)+) => {{
        $crate::log::emit($crate::log::Level::Trace, $target, format_args!($($arg)+));
    }};
    ($($arg:tt)+) => {{
        $crate::log::emit($crate::log::Level::Trace, module_path!(), format_args!($($arg)+));
    }};
}
