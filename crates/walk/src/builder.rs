use crate::arena::NodeArena;
use crate::cwd::VirtualCwd;
use crate::cycle::CycleDetector;
use crate::entry::{EntryInfo, EntryNode};
use crate::error::WalkError;
use crate::flags::WalkOptions;
use crate::sort::{Comparator, DEFAULT_INODE_SORT_THRESHOLD};
use crate::walker::{stat_and_classify, trimmed_root, WalkSession};
use std::cmp::Ordering;
use std::ffi::OsString;
use std::path::PathBuf;

/// Configures and opens a [`WalkSession`].
///
/// ```no_run
/// use walk::{WalkBuilder, WalkOptions};
///
/// let mut session = WalkBuilder::new()
///     .root("/var/log")
///     .options(WalkOptions::PHYSICAL | WalkOptions::FD_RELATIVE_CWD)
///     .sort_by(|a, b| a.name().cmp(b.name()))
///     .open()?;
/// while let Some(entry) = session.read()? {
///     println!("{}", entry.full_path().display());
/// }
/// # Ok::<(), walk::WalkError>(())
/// ```
pub struct WalkBuilder {
    roots: Vec<PathBuf>,
    options: WalkOptions,
    comparator: Option<Comparator>,
    inode_threshold: usize,
}

impl Default for WalkBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl WalkBuilder {
    /// Starts a physical-policy builder with no roots.
    #[must_use]
    pub fn new() -> Self {
        Self {
            roots: Vec::new(),
            options: WalkOptions::PHYSICAL,
            comparator: None,
            inode_threshold: DEFAULT_INODE_SORT_THRESHOLD,
        }
    }

    /// Adds one root path to walk. Roots are visited in the order given
    /// unless a comparator reorders them.
    #[must_use]
    pub fn root(mut self, path: impl Into<PathBuf>) -> Self {
        self.roots.push(path.into());
        self
    }

    /// Adds several root paths at once.
    #[must_use]
    pub fn roots<I>(mut self, paths: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<PathBuf>,
    {
        self.roots.extend(paths.into_iter().map(Into::into));
        self
    }

    /// Replaces the option set wholesale.
    #[must_use]
    pub fn options(mut self, options: WalkOptions) -> Self {
        self.options = options;
        self
    }

    /// Orders siblings (and the root list) with `compare`. Forces metadata
    /// to be gathered even under [`WalkOptions::NO_STAT`], since the
    /// comparator may depend on it.
    #[must_use]
    pub fn sort_by(
        mut self,
        compare: impl Fn(&EntryNode, &EntryNode) -> Ordering + 'static,
    ) -> Self {
        self.comparator = Some(Box::new(compare));
        self
    }

    /// Sibling count above which unsorted directories are reordered by
    /// inode. See [`crate::DEFAULT_INODE_SORT_THRESHOLD`].
    #[must_use]
    pub fn inode_sort_threshold(mut self, threshold: usize) -> Self {
        self.inode_threshold = threshold;
        self
    }

    /// Validates the options, records the starting directory, and stats the
    /// roots.
    ///
    /// # Errors
    ///
    /// [`WalkError::InvalidOptions`] for a rejected flag combination and
    /// [`WalkError::SaveCwd`] when the starting directory cannot be
    /// recorded. Roots that fail to stat open the session anyway and are
    /// reported as [`EntryInfo::Error`] entries. Root stats are postponed to
    /// the first visit when a comparator is present or
    /// [`WalkOptions::DEFER_STAT`] is set.
    pub fn open(self) -> Result<WalkSession, WalkError> {
        let options = self.options.validated()?;
        let vcwd = VirtualCwd::new(options)?;
        let detector = CycleDetector::new(options);

        let mut arena = NodeArena::new();
        let root_parent = arena.insert(EntryNode::new(
            OsString::new(),
            PathBuf::new(),
            PathBuf::new(),
            -1,
            EntryInfo::RootParent,
        ));

        let defer = options.contains(WalkOptions::DEFER_STAT) || self.comparator.is_some();
        let follow = options.follows_symlinks()
            || options.contains(WalkOptions::FOLLOW_ROOT_SYMLINKS);

        let mut ids = Vec::with_capacity(self.roots.len());
        for given in self.roots {
            let path = if options.contains(WalkOptions::VERBATIM_PATHS) {
                given
            } else {
                trimmed_root(&given)
            };
            let mut node = EntryNode::new(
                path.as_os_str().to_os_string(),
                path.clone(),
                path.clone(),
                0,
                EntryInfo::Root,
            );
            node.parent = Some(root_parent);
            if defer {
                node.set_info(EntryInfo::StatDeferred);
                node.stat_required = true;
            } else {
                let outcome = stat_and_classify(vcwd.handle(), path.as_os_str(), follow);
                node.stat = outcome.stat;
                node.errno = outcome.errno;
                node.set_info(outcome.info);
            }
            ids.push(arena.insert(node));
        }

        if let Some(compare) = self.comparator.as_ref() {
            ids.sort_by(|&a, &b| compare(arena.get(a), arena.get(b)));
        }

        let mut head = None;
        for &id in ids.iter().rev() {
            arena.get_mut(id).sibling = head;
            head = Some(id);
        }
        arena.get_mut(root_parent).children_head = head;

        Ok(WalkSession::assemble(
            options,
            arena,
            vcwd,
            detector,
            self.comparator,
            self.inode_threshold,
            root_parent,
        ))
    }
}
