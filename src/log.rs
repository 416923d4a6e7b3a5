use lazy_static::lazy_static;
use std::env;
use std::sync::atomic::{AtomicUsize, Ordering};

lazy_static! {
    static ref VERBOSITY: AtomicUsize = AtomicUsize::new(init_verbosity());
}

fn init_verbosity() -> usize {
    match env::var("MREPLAY_LOG").as_deref() {
        Ok("debug") => LogLevel::LogDebug as usize,
        Ok("warn") => LogLevel::LogWarn as usize,
        Ok("error") => LogLevel::LogError as usize,
        _ => LogLevel::LogInfo as usize,
    }
}

#[derive(Copy, Clone, Eq, PartialEq, PartialOrd, Ord, Debug)]
#[repr(usize)]
pub enum LogLevel {
    LogError = 0,
    LogWarn = 1,
    LogInfo = 2,
    LogDebug = 3,
}

/// True when the configured verbosity would emit `LogDebug` messages.
/// Mirrors the Python driver's `is_verbose()` check against the root
/// logger's effective level, gating the extra `print_diff()` calls the
/// explorer does on divergence and success.
pub fn is_verbose() -> bool {
    VERBOSITY.load(Ordering::Relaxed) >= LogLevel::LogDebug as usize
}

pub fn set_verbosity(level: LogLevel) {
    VERBOSITY.store(level as usize, Ordering::Relaxed);
}

pub fn enabled(level: LogLevel) -> bool {
    VERBOSITY.load(Ordering::Relaxed) >= level as usize
}

#[macro_export]
macro_rules! log {
    ($level:expr, $($arg:tt)+) => {
        if $crate::log::enabled($level) {
            eprintln!("[{:?}] {}", $level, format!($($arg)+));
        }
    };
}

/// Aborts the process with a formatted message, in the spirit of the
/// teacher's `ed_assert!`: an invariant violation here means a mutator
/// produced a pipeline the rest of the system cannot reason about.
#[macro_export]
macro_rules! pipeline_assert {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            panic!($($arg)+);
        }
    };
}
