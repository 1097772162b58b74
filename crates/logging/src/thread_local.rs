//! crates/logging/src/thread_local.rs
//! Thread-local storage for verbosity configuration and event collection.

use super::config::VerbosityConfig;
use super::levels::DebugFlag;
use std::cell::RefCell;

thread_local! {
    static VERBOSITY: RefCell<VerbosityConfig> = RefCell::new(VerbosityConfig::default());
    #[allow(clippy::missing_const_for_thread_local)]
    static EVENTS: RefCell<Vec<DiagnosticEvent>> = RefCell::new(Vec::new());
}

/// Debug diagnostic collected during a walk.
#[derive(Clone, Debug)]
pub struct DiagnosticEvent {
    /// The debug flag category.
    pub flag: DebugFlag,
    /// The verbosity level the message was emitted at.
    pub level: u8,
    /// The rendered message.
    pub message: String,
}

/// Initialize verbosity configuration for the current thread.
pub fn init(config: VerbosityConfig) {
    VERBOSITY.with(|v| {
        *v.borrow_mut() = config;
    });
}

/// Check if the debug flag is at or above the specified level.
#[must_use]
pub fn debug_gte(flag: DebugFlag, level: u8) -> bool {
    VERBOSITY.with(|v| v.borrow().debug.get(flag) >= level)
}

/// Emit a debug diagnostic event.
pub fn emit_debug(flag: DebugFlag, level: u8, message: String) {
    EVENTS.with(|e| {
        e.borrow_mut().push(DiagnosticEvent {
            flag,
            level,
            message,
        });
    });
}

/// Drain all collected events, clearing the internal buffer.
pub fn drain_events() -> Vec<DiagnosticEvent> {
    EVENTS.with(|e| e.borrow_mut().drain(..).collect())
}
