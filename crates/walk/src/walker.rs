use crate::arena::{NodeArena, NodeId};
use crate::cwd::{CwdMode, VirtualCwd};
use crate::cycle::{CycleDetector, Entered};
use crate::dirent::{read_directory, DirentRecord};
use crate::entry::{EntryInfo, EntryNode, EntryStat};
use crate::error::WalkError;
use crate::flags::WalkOptions;
use crate::sort::{order_children, Comparator};
use logging::debug_log;
use rustix::fs::{AtFlags, FileType, Mode, OFlags};
use rustix::io::Errno;
use std::ffi::OsStr;
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

/// An open traversal over one or more root paths.
///
/// Each [`read`](Self::read) reports the next entry in depth-first order:
/// a directory first as [`EntryInfo::Directory`], then its children, then
/// the same node again as [`EntryInfo::DirectoryPost`]. The walk never
/// aborts on per-entry filesystem failures; those come back as entry
/// states. `Err` from `read` means the session itself has lost its
/// position.
///
/// Built by [`WalkBuilder`](crate::WalkBuilder).
pub struct WalkSession {
    options: WalkOptions,
    arena: NodeArena,
    vcwd: VirtualCwd,
    detector: CycleDetector,
    comparator: Option<Comparator>,
    inode_threshold: usize,
    root_parent: NodeId,
    cursor: Option<NodeId>,
    finished: bool,
    entries_visited: u64,
    root_dev: Option<u64>,
    scratch: Vec<NodeId>,
}

impl WalkSession {
    pub(crate) fn assemble(
        options: WalkOptions,
        arena: NodeArena,
        vcwd: VirtualCwd,
        detector: CycleDetector,
        comparator: Option<Comparator>,
        inode_threshold: usize,
        root_parent: NodeId,
    ) -> Self {
        Self {
            options,
            arena,
            vcwd,
            detector,
            comparator,
            inode_threshold,
            root_parent,
            cursor: None,
            finished: false,
            entries_visited: 0,
            root_dev: None,
            scratch: Vec::new(),
        }
    }

    /// Reports the next entry, or `None` once every root is exhausted.
    ///
    /// The returned borrow ends at the next call; clone what must outlive
    /// it.
    pub fn read(&mut self) -> Result<Option<&EntryNode>, WalkError> {
        if self.finished {
            return Ok(None);
        }
        let next = match self.cursor {
            None => self.arena.get(self.root_parent).children_head,
            Some(last) => self.advance(last)?,
        };
        let Some(id) = next else {
            self.finished = true;
            return Ok(None);
        };
        self.visit(id)?;
        self.cursor = Some(id);
        self.entries_visited += 1;
        Ok(Some(self.arena.get(id)))
    }

    /// Number of entries reported so far, counting pre-order and post-order
    /// directory reports separately.
    #[must_use]
    pub const fn entries_visited(&self) -> u64 {
        self.entries_visited
    }

    /// Directory descriptors currently held for position tracking. Bounded
    /// by the ancestor ring capacity regardless of depth.
    #[must_use]
    pub fn held_descriptors(&self) -> usize {
        self.vcwd.held_descriptors()
    }

    /// Ends the walk, releasing every descriptor and restoring the starting
    /// directory when the walk moved away from it.
    pub fn close(mut self) -> Result<(), WalkError> {
        self.vcwd.restore_initial()
    }

    /// Picks the entry that follows the one just reported.
    fn advance(&mut self, last: NodeId) -> Result<Option<NodeId>, WalkError> {
        let node = self.arena.get(last);
        if node.info() == EntryInfo::Directory {
            if node.descended {
                if let Some(child) = node.children_head {
                    self.move_into(last)?;
                    return Ok(Some(child));
                }
            }
            self.post_visit(last)?;
            return Ok(Some(last));
        }

        // Terminal report; the node is done.
        let sibling = node.sibling;
        let parent = node.parent;
        self.arena.release(last);
        if sibling.is_some() {
            return Ok(sibling);
        }
        match parent {
            Some(parent) if parent != self.root_parent => {
                self.post_visit(parent)?;
                Ok(Some(parent))
            }
            _ => Ok(None),
        }
    }

    /// Moves the virtual cwd into a listed directory before its first child
    /// is reported.
    fn move_into(&mut self, id: NodeId) -> Result<(), WalkError> {
        let Some(fd) = self.arena.get_mut(id).dir_fd.take() else {
            return Ok(());
        };
        let path = self.arena.get(id).full_path().to_path_buf();
        self.vcwd.advance_into(fd, &path)?;
        self.arena.get_mut(id).advanced = true;
        Ok(())
    }

    /// Classifies a deferred entry and lists a directory's children at its
    /// pre-order report.
    fn visit(&mut self, id: NodeId) -> Result<(), WalkError> {
        let node = self.arena.get(id);
        if node.info() == EntryInfo::StatDeferred && node.stat_required {
            let follow = self.options.follows_symlinks()
                || self.options.contains(WalkOptions::FOLLOW_ROOT_SYMLINKS);
            let path = node.access_path().as_os_str().to_os_string();
            let outcome = stat_and_classify(self.vcwd.handle(), &path, follow);
            let node = self.arena.get_mut(id);
            node.stat = outcome.stat;
            node.errno = outcome.errno;
            node.set_info(outcome.info);
        }
        if self.arena.get(id).wants_descent() {
            self.enter_directory(id)?;
        }
        Ok(())
    }

    /// Opens, cycle-checks, and lists a directory about to be reported in
    /// pre-order. Failures downgrade the entry's classification instead of
    /// ending the walk.
    fn enter_directory(&mut self, id: NodeId) -> Result<(), WalkError> {
        let node = self.arena.get(id);
        let Some(stat) = node.stat.as_ref().copied() else {
            return Ok(());
        };
        let level = node.level();

        if level == 0 {
            self.root_dev = Some(stat.dev);
        } else if self.options.contains(WalkOptions::STAY_ON_DEVICE)
            && self.root_dev.is_some_and(|dev| dev != stat.dev)
        {
            debug_log!(
                Walk,
                1,
                "staying on device {}, not entering {}",
                self.root_dev.unwrap_or(0),
                self.arena.get(id).full_path().display()
            );
            return Ok(());
        }

        let fd = match self.open_directory(id) {
            Ok(fd) => fd,
            Err(errno) => {
                let node = self.arena.get_mut(id);
                node.set_info(EntryInfo::DirectoryUnreadable);
                node.errno = Some(errno);
                return Ok(());
            }
        };

        let key = stat.key();
        match self.detector.enter(key, id) {
            Entered::Cycle { ancestor } => {
                let ancestor_path =
                    ancestor.map(|ancestor| self.arena.get(ancestor).full_path().to_path_buf());
                let node = self.arena.get_mut(id);
                node.set_info(EntryInfo::Cycle);
                node.cycle_to = ancestor_path;
                return Ok(());
            }
            Entered::Unique => {
                self.arena.get_mut(id).detector_entered = true;
            }
        }

        let records = match read_directory(
            fd.as_fd(),
            self.options.contains(WalkOptions::INCLUDE_DOT),
            self.options.contains(WalkOptions::INCLUDE_WHITEOUT),
        ) {
            Ok(records) => records,
            Err(errno) => {
                self.detector.leave(key, None);
                let node = self.arena.get_mut(id);
                node.detector_entered = false;
                node.set_info(EntryInfo::Error);
                node.errno = Some(errno);
                return Ok(());
            }
        };
        debug_log!(
            Dirent,
            2,
            "{} records under {}",
            records.len(),
            self.arena.get(id).full_path().display()
        );

        self.build_children(id, fd.as_fd(), records);
        let keep_fd = self.vcwd.mode() != CwdMode::Static;
        let node = self.arena.get_mut(id);
        node.descended = true;
        if keep_fd {
            node.dir_fd = Some(fd);
        }
        Ok(())
    }

    /// Opens a directory for listing, recovering once from descriptor
    /// exhaustion and once from an `O_NOATIME` permission refusal.
    fn open_directory(&mut self, id: NodeId) -> Result<OwnedFd, Errno> {
        let node = self.arena.get(id);
        let follow = self.options.follows_symlinks()
            || (node.level() == 0 && self.options.contains(WalkOptions::FOLLOW_ROOT_SYMLINKS));
        let mut flags = OFlags::RDONLY
            | OFlags::DIRECTORY
            | OFlags::NOCTTY
            | OFlags::NONBLOCK
            | OFlags::CLOEXEC;
        if !follow {
            flags |= OFlags::NOFOLLOW;
        }
        if self.options.contains(WalkOptions::NO_ATIME) {
            flags |= OFlags::NOATIME;
        }

        let mut retried_exhaustion = false;
        loop {
            let path = self.arena.get(id).access_path();
            match rustix::fs::openat(self.vcwd.handle(), path, flags, Mode::empty()) {
                Ok(fd) => return Ok(fd),
                Err(Errno::PERM) if flags.contains(OFlags::NOATIME) => {
                    flags.remove(OFlags::NOATIME);
                }
                Err(Errno::MFILE) if !retried_exhaustion => {
                    retried_exhaustion = true;
                    debug_log!(Ring, 1, "descriptor limit hit, releasing an ancestor");
                    if !self.vcwd.release_one() {
                        return Err(Errno::MFILE);
                    }
                }
                Err(errno) => return Err(errno),
            }
        }
    }

    /// Turns raw directory records into classified child nodes linked under
    /// `parent`.
    fn build_children(
        &mut self,
        parent: NodeId,
        dirfd: BorrowedFd<'_>,
        records: Vec<DirentRecord>,
    ) {
        let (parent_full, parent_level, parent_stat) = {
            let node = self.arena.get(parent);
            (node.full_path().to_path_buf(), node.level(), node.stat.as_ref().copied())
        };
        let static_mode = self.vcwd.mode() == CwdMode::Static;
        let logical = self.options.follows_symlinks();
        let no_stat = self.options.contains(WalkOptions::NO_STAT) && self.comparator.is_none();

        // The link-count heuristic: a directory's nlink exceeds its subdir
        // count by two, so once enough subdirectories have been seen the
        // remaining records cannot be directories. Only sound when symlinks
        // are not followed.
        let mut dirs_remaining = if no_stat && !logical {
            parent_stat.map(|stat| {
                if self.options.contains(WalkOptions::INCLUDE_DOT) {
                    stat.nlink
                } else {
                    stat.nlink.saturating_sub(2)
                }
            })
        } else {
            None
        };

        let mut ids = std::mem::take(&mut self.scratch);
        ids.clear();
        for record in records {
            let is_dot = record.name == "." || record.name == "..";
            let full_path = parent_full.join(&record.name);
            let access_path = if static_mode {
                full_path.clone()
            } else {
                PathBuf::from(&record.name)
            };

            let mut stat = None;
            let mut errno = None;
            let info = if is_dot {
                EntryInfo::Dot
            } else if record.ino == 0 {
                // Whiteout record; there is no object behind it to stat.
                EntryInfo::Other
            } else if no_stat && can_skip_stat(record.kind, logical, dirs_remaining) {
                EntryInfo::StatSkipped
            } else {
                let outcome = stat_and_classify(dirfd, record.name.as_os_str(), logical);
                stat = outcome.stat;
                errno = outcome.errno;
                if outcome.info == EntryInfo::Directory {
                    if let Some(remaining) = dirs_remaining.as_mut() {
                        *remaining = remaining.saturating_sub(1);
                    }
                }
                outcome.info
            };

            let mut child =
                EntryNode::new(record.name, access_path, full_path, parent_level + 1, info);
            child.parent = Some(parent);
            child.ino_hint = record.ino;
            child.stat = stat;
            child.errno = errno;
            ids.push(self.arena.insert(child));
        }

        order_children(
            &self.arena,
            &mut ids,
            self.comparator.as_ref(),
            self.inode_threshold,
        );

        let mut head = None;
        for &id in ids.iter().rev() {
            self.arena.get_mut(id).sibling = head;
            head = Some(id);
        }
        let node = self.arena.get_mut(parent);
        node.children_head = head;
        node.dirs_remaining = dirs_remaining;
        self.scratch = ids;
    }

    /// Flips a directory to its post-order report, unwinding the cycle
    /// detector and the virtual cwd.
    fn post_visit(&mut self, id: NodeId) -> Result<(), WalkError> {
        let node = self.arena.get(id);
        let level = node.level();
        let key = node.stat.as_ref().map(EntryStat::key);
        let detector_entered = node.detector_entered;
        let advanced = node.advanced;
        let parent = node.parent;

        if detector_entered {
            if let Some(key) = key {
                let parent_key = parent.and_then(|parent| {
                    let parent = self.arena.get(parent);
                    if parent.level() >= 0 {
                        parent.stat.as_ref().map(EntryStat::key)
                    } else {
                        None
                    }
                });
                self.detector.leave(key, parent_key);
            }
        }

        let node = self.arena.get_mut(id);
        node.set_info(EntryInfo::DirectoryPost);
        node.detector_entered = false;
        node.dir_fd = None;

        if advanced {
            if level == 0 {
                self.vcwd.return_to_start()?;
            } else {
                self.vcwd.ascend()?;
            }
        }
        Ok(())
    }
}

pub(crate) struct Classified {
    pub(crate) info: EntryInfo,
    pub(crate) stat: Option<EntryStat>,
    pub(crate) errno: Option<Errno>,
}

/// Stats `path` relative to `base` and maps the result onto an entry
/// classification. When following symlinks, a target that cannot be reached
/// while the link itself can is reported as a dangling symlink.
pub(crate) fn stat_and_classify(base: BorrowedFd<'_>, path: &OsStr, follow: bool) -> Classified {
    let flags = if follow {
        AtFlags::empty()
    } else {
        AtFlags::SYMLINK_NOFOLLOW
    };
    match rustix::fs::statat(base, path, flags) {
        Ok(raw) => {
            let stat = EntryStat::from_stat(&raw);
            let file_type = stat.file_type();
            let info = if file_type.is_dir() {
                EntryInfo::Directory
            } else if file_type.is_symlink() {
                EntryInfo::Symlink
            } else if file_type.is_file() {
                EntryInfo::File
            } else {
                EntryInfo::Other
            };
            Classified {
                info,
                stat: Some(stat),
                errno: None,
            }
        }
        Err(errno) => {
            if follow {
                if let Ok(raw) = rustix::fs::statat(base, path, AtFlags::SYMLINK_NOFOLLOW) {
                    let stat = EntryStat::from_stat(&raw);
                    if stat.file_type().is_symlink() {
                        return Classified {
                            info: EntryInfo::DanglingSymlink,
                            stat: Some(stat),
                            errno: Some(errno),
                        };
                    }
                }
            }
            debug_log!(Stat, 1, "stat of {path:?} failed: {errno}");
            Classified {
                info: EntryInfo::Error,
                stat: None,
                errno: Some(errno),
            }
        }
    }
}

/// True when the dirent type alone proves the record is not a directory to
/// descend into.
fn can_skip_stat(kind: FileType, logical: bool, dirs_remaining: Option<u64>) -> bool {
    match kind {
        FileType::Directory => false,
        FileType::Unknown => dirs_remaining == Some(0),
        // A symlink may reach a directory when links are followed.
        FileType::Symlink => !logical,
        _ => true,
    }
}

/// Collapses a run of trailing separators down to a single one, leaving
/// short paths and interior separators alone.
pub(crate) fn trimmed_root(path: &Path) -> PathBuf {
    let bytes = path.as_os_str().as_bytes();
    let mut len = bytes.len();
    if len > 2 && bytes[len - 1] == b'/' {
        while len > 1 && bytes[len - 2] == b'/' {
            len -= 1;
        }
    }
    PathBuf::from(OsStr::from_bytes(&bytes[..len]))
}
