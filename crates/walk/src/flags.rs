use crate::error::WalkError;
use bitflags::bitflags;

bitflags! {
    /// Traversal options, combined with bitwise OR.
    ///
    /// Exactly one symlink policy is required: [`LOGICAL`](Self::LOGICAL)
    /// follows every symlink, [`PHYSICAL`](Self::PHYSICAL) never follows.
    /// [`NO_CHDIR`](Self::NO_CHDIR) and
    /// [`FD_RELATIVE_CWD`](Self::FD_RELATIVE_CWD) are mutually exclusive
    /// ways of avoiding moves of the process-global working directory.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct WalkOptions: u16 {
        /// Follow symlinks named directly as roots, even under
        /// [`PHYSICAL`](Self::PHYSICAL).
        const FOLLOW_ROOT_SYMLINKS = 1 << 0;
        /// Follow every symlink encountered. Forces
        /// [`NO_CHDIR`](Self::NO_CHDIR) on and
        /// [`FD_RELATIVE_CWD`](Self::FD_RELATIVE_CWD) off, because
        /// symlink-following traversal cannot rely on fd-relative directory
        /// identity.
        const LOGICAL = 1 << 1;
        /// Never follow symlinks; report them as entries.
        const PHYSICAL = 1 << 2;
        /// Leave the working directory alone; every access path is a full
        /// path.
        const NO_CHDIR = 1 << 3;
        /// Skip stat calls where the dirent type already rules out a
        /// directory.
        const NO_STAT = 1 << 4;
        /// Report `.` and `..` entries instead of filtering them.
        const INCLUDE_DOT = 1 << 5;
        /// Do not descend into directories on a different device than the
        /// root.
        const STAY_ON_DEVICE = 1 << 6;
        /// Surface whiteout/tombstone directory records instead of
        /// filtering them.
        const INCLUDE_WHITEOUT = 1 << 7;
        /// Use the exact hash-set cycle detector together with
        /// [`LOGICAL`](Self::LOGICAL).
        const TIGHT_CYCLE_CHECK = 1 << 8;
        /// Track the working directory purely through descriptors without
        /// touching process-global state.
        const FD_RELATIVE_CWD = 1 << 9;
        /// Postpone stat of root entries until they are first visited.
        const DEFER_STAT = 1 << 10;
        /// Open directories with `O_NOATIME` where permitted.
        const NO_ATIME = 1 << 11;
        /// Keep root paths exactly as given; no trailing-separator trimming.
        const VERBATIM_PATHS = 1 << 12;
    }
}

impl WalkOptions {
    /// Applies the validation rules and the LOGICAL adjustments, before any
    /// I/O happens.
    pub(crate) fn validated(mut self) -> Result<Self, WalkError> {
        if !self.intersects(Self::LOGICAL | Self::PHYSICAL) {
            return Err(WalkError::InvalidOptions {
                reason: "one of LOGICAL or PHYSICAL is required",
            });
        }
        if self.contains(Self::NO_CHDIR | Self::FD_RELATIVE_CWD) {
            return Err(WalkError::InvalidOptions {
                reason: "NO_CHDIR and FD_RELATIVE_CWD are mutually exclusive",
            });
        }
        if self.contains(Self::LOGICAL) {
            self.insert(Self::NO_CHDIR);
            self.remove(Self::FD_RELATIVE_CWD);
        }
        Ok(self)
    }

    pub(crate) const fn follows_symlinks(self) -> bool {
        self.contains(Self::LOGICAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symlink_policy_is_required() {
        assert!(WalkOptions::empty().validated().is_err());
        assert!(WalkOptions::NO_STAT.validated().is_err());
        assert!(WalkOptions::PHYSICAL.validated().is_ok());
        assert!(WalkOptions::LOGICAL.validated().is_ok());
    }

    #[test]
    fn chdir_modes_are_exclusive() {
        let options = WalkOptions::PHYSICAL | WalkOptions::NO_CHDIR | WalkOptions::FD_RELATIVE_CWD;
        assert!(options.validated().is_err());
    }

    #[test]
    fn logical_forces_no_chdir() {
        let options = (WalkOptions::LOGICAL | WalkOptions::FD_RELATIVE_CWD)
            .validated()
            .expect("valid combination");
        assert!(options.contains(WalkOptions::NO_CHDIR));
        assert!(!options.contains(WalkOptions::FD_RELATIVE_CWD));
    }

    #[test]
    fn physical_keeps_fd_relative_mode() {
        let options = (WalkOptions::PHYSICAL | WalkOptions::FD_RELATIVE_CWD)
            .validated()
            .expect("valid combination");
        assert!(options.contains(WalkOptions::FD_RELATIVE_CWD));
        assert!(!options.contains(WalkOptions::NO_CHDIR));
    }
}
