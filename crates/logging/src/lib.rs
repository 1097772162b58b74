#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `logging` provides the verbosity flag system shared by the walker
//! workspace. Diagnostics are grouped into [`DebugFlag`] categories, each with
//! an independent level, so callers can turn up the directory-change chatter
//! without drowning in dirent decoding output. Configuration lives in
//! thread-local storage because the walker itself is single-threaded and two
//! concurrent walks on separate threads should not share verbosity state.
//!
//! # Design
//!
//! - [`DebugFlag`] names a diagnostic category; [`DebugLevels`] stores one
//!   level per category.
//! - [`VerbosityConfig`] combines the levels with an overall verbosity and
//!   parses `--debug`-style tokens such as `chdir2`.
//! - [`debug_log!`] is the emission macro: it checks the thread-local level
//!   first, so disabled categories never pay for message formatting.
//! - Emitted messages are collected as [`DiagnosticEvent`] values and drained
//!   by the embedding application, which decides where they go.
//!
//! # Examples
//!
//! ```
//! use logging::{debug_log, drain_events, init, VerbosityConfig};
//!
//! let mut config = VerbosityConfig::default();
//! config.apply_debug_flag("chdir2").unwrap();
//! init(config);
//!
//! debug_log!(Chdir, 1, "descending into {}", "src");
//! debug_log!(Sort, 1, "never recorded at level 0");
//!
//! let events = drain_events();
//! assert_eq!(events.len(), 1);
//! ```

mod config;
mod levels;
mod thread_local;

pub use config::VerbosityConfig;
pub use levels::{DebugFlag, DebugLevels};
pub use thread_local::{debug_gte, drain_events, emit_debug, init, DiagnosticEvent};

/// Emits a debug diagnostic when the thread-local level for the flag allows it.
///
/// The first argument is a bare [`DebugFlag`] variant name; the rest is a
/// standard format string. Formatting is skipped entirely when the category is
/// below the requested level.
#[macro_export]
macro_rules! debug_log {
    ($flag:ident, $level:expr, $($arg:tt)*) => {
        if $crate::debug_gte($crate::DebugFlag::$flag, $level) {
            $crate::emit_debug($crate::DebugFlag::$flag, $level, format!($($arg)*));
        }
    };
}
