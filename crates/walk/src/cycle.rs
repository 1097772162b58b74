use crate::arena::NodeId;
use crate::flags::WalkOptions;
use logging::debug_log;
use std::collections::HashMap;

/// Filesystem identity of an entry: device number plus inode number.
///
/// Two paths with the same key name the same underlying object, which is the
/// basis for directory cycle detection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FileKey {
    /// Device number of the containing filesystem.
    pub dev: u64,
    /// Inode number on that device.
    pub ino: u64,
}

/// Outcome of registering a directory with the detector before descent.
pub(crate) enum Entered {
    /// The directory is not an active ancestor; descend.
    Unique,
    /// Descending would revisit an ancestor. For the exact detector the
    /// ancestor's node is known; the amortized probe only knows that one
    /// exists.
    Cycle { ancestor: Option<NodeId> },
}

/// Detects directory cycles along the active root-to-cursor chain.
///
/// The exact strategy keeps every active ancestor in a hash map and catches
/// a cycle on the first revisit, at a memory cost proportional to the walk's
/// depth times its sibling fan-out of open directories. The amortized
/// strategy remembers a single ancestor and is guaranteed to catch any cycle
/// before the walk traverses it twice over, in constant memory.
pub(crate) enum CycleDetector {
    Exact { active: HashMap<FileKey, NodeId> },
    Amortized(AncestorProbe),
}

impl CycleDetector {
    /// Exact detection is only sound when every symlink is being followed,
    /// so it requires both the tight-check request and the logical policy.
    pub(crate) fn new(options: WalkOptions) -> Self {
        if options.contains(WalkOptions::TIGHT_CYCLE_CHECK | WalkOptions::LOGICAL) {
            Self::Exact {
                active: HashMap::new(),
            }
        } else {
            Self::Amortized(AncestorProbe::new())
        }
    }

    /// Registers a directory about to be descended into.
    pub(crate) fn enter(&mut self, key: FileKey, id: NodeId) -> Entered {
        match self {
            Self::Exact { active } => {
                if let Some(&ancestor) = active.get(&key) {
                    debug_log!(Cycle, 1, "revisit of active dev={} ino={}", key.dev, key.ino);
                    return Entered::Cycle {
                        ancestor: Some(ancestor),
                    };
                }
                active.insert(key, id);
                Entered::Unique
            }
            Self::Amortized(probe) => {
                if probe.enter(key) {
                    debug_log!(Cycle, 1, "probe hit at dev={} ino={}", key.dev, key.ino);
                    Entered::Cycle { ancestor: None }
                } else {
                    Entered::Unique
                }
            }
        }
    }

    /// Unregisters a directory whose subtree is complete. `parent` is the
    /// identity of the enclosing directory when there is a real one above
    /// this entry, and `None` at the roots or when descent was abandoned
    /// before any child was read.
    pub(crate) fn leave(&mut self, key: FileKey, parent: Option<FileKey>) {
        match self {
            Self::Exact { active } => {
                active.remove(&key);
            }
            Self::Amortized(probe) => {
                if let Some(parent) = parent {
                    probe.reflect_up(parent, key);
                }
            }
        }
    }
}

/// Constant-memory cycle probe.
///
/// One ancestor identity is remembered at a time and refreshed whenever the
/// descent counter reaches a power of two. A directory chain of length `n`
/// containing a cycle revisits the remembered ancestor within `O(n)`
/// descents of entering the cycle.
pub(crate) struct AncestorProbe {
    remembered: Option<FileKey>,
    descents: u64,
}

impl AncestorProbe {
    pub(crate) const fn new() -> Self {
        Self {
            remembered: None,
            descents: 0,
        }
    }

    /// Returns `true` when `key` matches the remembered ancestor.
    pub(crate) fn enter(&mut self, key: FileKey) -> bool {
        if self.descents > 0 && self.remembered == Some(key) {
            return true;
        }
        self.descents = self.descents.wrapping_add(1);
        if self.descents == 0 {
            // Counter wrap after 2^64 descents; a walk that deep is a cycle
            // in practice.
            return true;
        }
        if self.descents.is_power_of_two() {
            self.remembered = Some(key);
        }
        false
    }

    /// On ascent, transfers the remembered identity from the directory being
    /// left to its parent, so the probe keeps covering the active chain.
    pub(crate) fn reflect_up(&mut self, parent: FileKey, child: FileKey) {
        if self.remembered == Some(child) {
            self.remembered = Some(parent);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::NodeId;

    fn key(ino: u64) -> FileKey {
        FileKey { dev: 1, ino }
    }

    fn id(raw: u32) -> NodeId {
        NodeId::from_raw(raw)
    }

    #[test]
    fn exact_detects_first_revisit() {
        let mut detector =
            CycleDetector::new(WalkOptions::LOGICAL | WalkOptions::TIGHT_CYCLE_CHECK);
        assert!(matches!(detector.enter(key(1), id(0)), Entered::Unique));
        assert!(matches!(detector.enter(key(2), id(1)), Entered::Unique));
        match detector.enter(key(1), id(2)) {
            Entered::Cycle { ancestor } => assert_eq!(ancestor, Some(id(0))),
            Entered::Unique => panic!("revisit not detected"),
        }
    }

    #[test]
    fn exact_forgets_on_leave() {
        let mut detector =
            CycleDetector::new(WalkOptions::LOGICAL | WalkOptions::TIGHT_CYCLE_CHECK);
        assert!(matches!(detector.enter(key(1), id(0)), Entered::Unique));
        detector.leave(key(1), None);
        assert!(matches!(detector.enter(key(1), id(1)), Entered::Unique));
    }

    #[test]
    fn tight_check_without_logical_uses_probe() {
        let detector =
            CycleDetector::new(WalkOptions::PHYSICAL | WalkOptions::TIGHT_CYCLE_CHECK);
        assert!(matches!(detector, CycleDetector::Amortized(_)));
    }

    #[test]
    fn probe_catches_immediate_self_loop() {
        let mut probe = AncestorProbe::new();
        assert!(!probe.enter(key(1)));
        assert!(probe.enter(key(1)));
    }

    #[test]
    fn probe_catches_longer_loop() {
        let mut probe = AncestorProbe::new();
        // A ring of three directories entered repeatedly must trip within a
        // bounded number of descents.
        let mut tripped = false;
        'outer: for _ in 0..16 {
            for ino in 1..=3 {
                if probe.enter(key(ino)) {
                    tripped = true;
                    break 'outer;
                }
            }
        }
        assert!(tripped);
    }

    #[test]
    fn reflect_up_moves_coverage_to_parent() {
        let mut probe = AncestorProbe::new();
        assert!(!probe.enter(key(1)));
        probe.reflect_up(key(9), key(1));
        assert!(probe.enter(key(9)));
    }
}
