//! crates/logging/src/levels.rs
//! Flag enum and level structure for debug verbosity.

/// Debug flags for walker diagnostic categories.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DebugFlag {
    /// Directory changes, real or virtual.
    Chdir,
    /// Cycle detector decisions.
    Cycle,
    /// Raw directory-entry decoding.
    Dirent,
    /// Descriptor ring pushes, pops, and evictions.
    Ring,
    /// Child ordering.
    Sort,
    /// Stat calls and classification.
    Stat,
    /// Traversal protocol steps.
    Walk,
}

impl DebugFlag {
    /// Canonical lowercase token used in `--debug` style options.
    #[must_use]
    pub const fn token(self) -> &'static str {
        match self {
            Self::Chdir => "chdir",
            Self::Cycle => "cycle",
            Self::Dirent => "dirent",
            Self::Ring => "ring",
            Self::Sort => "sort",
            Self::Stat => "stat",
            Self::Walk => "walk",
        }
    }

    /// Every flag, in token order.
    pub const ALL: [Self; 7] = [
        Self::Chdir,
        Self::Cycle,
        Self::Dirent,
        Self::Ring,
        Self::Sort,
        Self::Stat,
        Self::Walk,
    ];
}

/// Debug verbosity levels for each flag.
#[derive(Clone, Default, Debug)]
pub struct DebugLevels {
    /// Directory change level.
    pub chdir: u8,
    /// Cycle detector level.
    pub cycle: u8,
    /// Dirent decoding level.
    pub dirent: u8,
    /// Descriptor ring level.
    pub ring: u8,
    /// Child ordering level.
    pub sort: u8,
    /// Stat classification level.
    pub stat: u8,
    /// Traversal protocol level.
    pub walk: u8,
}

impl DebugLevels {
    /// Returns the level for the given flag.
    #[must_use]
    pub const fn get(&self, flag: DebugFlag) -> u8 {
        match flag {
            DebugFlag::Chdir => self.chdir,
            DebugFlag::Cycle => self.cycle,
            DebugFlag::Dirent => self.dirent,
            DebugFlag::Ring => self.ring,
            DebugFlag::Sort => self.sort,
            DebugFlag::Stat => self.stat,
            DebugFlag::Walk => self.walk,
        }
    }

    /// Sets the level for the given flag.
    pub const fn set(&mut self, flag: DebugFlag, level: u8) {
        match flag {
            DebugFlag::Chdir => self.chdir = level,
            DebugFlag::Cycle => self.cycle = level,
            DebugFlag::Dirent => self.dirent = level,
            DebugFlag::Ring => self.ring = level,
            DebugFlag::Sort => self.sort = level,
            DebugFlag::Stat => self.stat = level,
            DebugFlag::Walk => self.walk = level,
        }
    }

    /// Raises every category to at least `level`.
    pub fn set_all(&mut self, level: u8) {
        for flag in DebugFlag::ALL {
            if self.get(flag) < level {
                self.set(flag, level);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_and_set_round_trip() {
        let mut levels = DebugLevels::default();
        for flag in DebugFlag::ALL {
            assert_eq!(levels.get(flag), 0);
        }
        levels.set(DebugFlag::Ring, 3);
        assert_eq!(levels.get(DebugFlag::Ring), 3);
        assert_eq!(levels.get(DebugFlag::Walk), 0);
    }

    #[test]
    fn set_all_never_lowers() {
        let mut levels = DebugLevels::default();
        levels.set(DebugFlag::Cycle, 4);
        levels.set_all(2);
        assert_eq!(levels.get(DebugFlag::Cycle), 4);
        assert_eq!(levels.get(DebugFlag::Stat), 2);
    }

    #[test]
    fn tokens_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for flag in DebugFlag::ALL {
            assert!(seen.insert(flag.token()));
        }
    }
}
