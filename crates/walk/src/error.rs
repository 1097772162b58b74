use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Error returned when a traversal cannot be configured or navigated.
///
/// Per-entry filesystem failures (unreadable directories, failed stats,
/// dangling symlinks) never surface here; they are reported through the
/// entry's [`EntryInfo`](crate::EntryInfo) state so the walk continues with
/// the remaining siblings. `WalkError` is reserved for conditions that make
/// the session itself unusable: bad configuration, losing track of the
/// working directory, or failing to restore it at teardown.
#[derive(Debug, Error)]
pub enum WalkError {
    /// The option bitmask failed validation before any I/O was attempted.
    #[error("invalid walk options: {reason}")]
    InvalidOptions {
        /// Human-readable description of the violated rule.
        reason: &'static str,
    },

    /// The pre-traversal working directory could not be recorded at open time.
    #[error("failed to save the starting directory: {source}")]
    SaveCwd {
        /// Underlying error emitted by the operating system.
        source: io::Error,
    },

    /// A working-directory change failed.
    #[error("failed to change directory to '{}': {source}", path.display())]
    ChangeDir {
        /// Path the change was attempting to reach.
        path: PathBuf,
        /// Underlying error emitted by the operating system.
        source: io::Error,
    },

    /// A single path component exceeds the system path limit, which chunked
    /// descent cannot work around.
    #[error("path component in '{}' exceeds the system path limit", path.display())]
    NameTooLong {
        /// Path containing the oversized component.
        path: PathBuf,
    },

    /// Returning to the parent directory failed mid-walk.
    #[error("failed to ascend to the parent directory: {source}")]
    Ascend {
        /// Underlying error emitted by the operating system.
        source: io::Error,
    },

    /// The pre-traversal working directory could not be restored at teardown.
    /// Held descriptors are released before this is reported.
    #[error("failed to restore the starting directory: {source}")]
    RestoreCwd {
        /// Underlying error emitted by the operating system.
        source: io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_path_context() {
        let error = WalkError::ChangeDir {
            path: PathBuf::from("/deep/tree"),
            source: io::Error::new(io::ErrorKind::NotFound, "gone"),
        };
        assert_eq!(
            error.to_string(),
            "failed to change directory to '/deep/tree': gone"
        );

        let error = WalkError::NameTooLong {
            path: PathBuf::from("/x"),
        };
        assert_eq!(
            error.to_string(),
            "path component in '/x' exceeds the system path limit"
        );
    }

    #[test]
    fn invalid_options_carries_reason() {
        let error = WalkError::InvalidOptions {
            reason: "one of LOGICAL or PHYSICAL is required",
        };
        assert!(error.to_string().contains("LOGICAL"));
    }
}
