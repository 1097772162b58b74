use crate::arena::NodeId;
use crate::cycle::FileKey;
use rustix::fs::FileType;
use rustix::io::Errno;
use std::ffi::{OsStr, OsString};
use std::io;
use std::os::fd::OwnedFd;
use std::path::{Path, PathBuf};

/// Classification of an entry at the moment it is reported.
///
/// A directory is reported twice on a successful walk, first as
/// [`Directory`](Self::Directory) before its children and again as
/// [`DirectoryPost`](Self::DirectoryPost) after them. Every other variant is
/// reported exactly once.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryInfo {
    /// Synthetic parent of all roots; never reported to the caller.
    RootParent,
    /// A root entry whose stat has not been taken yet; resolved to a concrete
    /// classification on first visit.
    Root,
    /// Directory, reported in pre-order before its children.
    Directory,
    /// Directory, reported in post-order after all of its children.
    DirectoryPost,
    /// A `.` or `..` entry, reported only when dot entries are requested.
    Dot,
    /// Directory that would revisit an ancestor; not descended into.
    Cycle,
    /// Directory that could not be opened for reading; no children reported.
    DirectoryUnreadable,
    /// Entry whose metadata could not be read at all.
    Error,
    /// Regular file.
    File,
    /// Symbolic link, reported as itself under the physical policy.
    Symlink,
    /// Symbolic link whose target does not exist, under the logical policy.
    DanglingSymlink,
    /// Entry whose stat was deliberately postponed; metadata is absent until
    /// the caller requests it or the entry is visited.
    StatDeferred,
    /// Entry whose stat was skipped because the walk was told metadata is not
    /// needed and the directory record already ruled out a directory.
    StatSkipped,
    /// Anything else with valid metadata: fifo, socket, device, whiteout.
    Other,
}

/// Subset of stat metadata the walk keeps per entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntryStat {
    /// Device number of the containing filesystem.
    pub dev: u64,
    /// Inode number on that device.
    pub ino: u64,
    /// Hard link count.
    pub nlink: u64,
    /// Size in bytes.
    pub size: u64,
    /// Raw mode bits, including the file type.
    pub mode: u32,
}

impl EntryStat {
    pub(crate) fn from_stat(stat: &rustix::fs::Stat) -> Self {
        Self {
            dev: stat.st_dev as u64,
            ino: stat.st_ino as u64,
            nlink: stat.st_nlink as u64,
            size: stat.st_size as u64,
            mode: stat.st_mode as u32,
        }
    }

    /// File type carried in the mode bits.
    #[must_use]
    pub fn file_type(&self) -> FileType {
        FileType::from_raw_mode(self.mode)
    }

    /// Identity of this entry as a (device, inode) pair.
    #[must_use]
    pub const fn key(&self) -> FileKey {
        FileKey {
            dev: self.dev,
            ino: self.ino,
        }
    }
}

/// A single reported entry in the traversal.
///
/// Nodes are owned by the session's arena and handed out by reference from
/// each read. The borrow ends at the next read; callers who need an entry
/// beyond that clone the pieces they care about.
#[derive(Debug)]
pub struct EntryNode {
    name: OsString,
    access_path: PathBuf,
    full_path: PathBuf,
    level: isize,
    info: EntryInfo,
    pub(crate) parent: Option<NodeId>,
    pub(crate) sibling: Option<NodeId>,
    pub(crate) children_head: Option<NodeId>,
    pub(crate) stat: Option<EntryStat>,
    pub(crate) dirs_remaining: Option<u64>,
    pub(crate) ino_hint: u64,
    pub(crate) cycle_to: Option<PathBuf>,
    pub(crate) errno: Option<Errno>,
    pub(crate) stat_required: bool,
    pub(crate) descended: bool,
    pub(crate) advanced: bool,
    pub(crate) detector_entered: bool,
    pub(crate) dir_fd: Option<OwnedFd>,
}

impl EntryNode {
    pub(crate) fn new(
        name: OsString,
        access_path: PathBuf,
        full_path: PathBuf,
        level: isize,
        info: EntryInfo,
    ) -> Self {
        Self {
            name,
            access_path,
            full_path,
            level,
            info,
            parent: None,
            sibling: None,
            children_head: None,
            stat: None,
            dirs_remaining: None,
            ino_hint: 0,
            cycle_to: None,
            errno: None,
            stat_required: false,
            descended: false,
            advanced: false,
            detector_entered: false,
            dir_fd: None,
        }
    }

    /// Final path component, without any directory prefix.
    #[must_use]
    pub fn name(&self) -> &OsStr {
        &self.name
    }

    /// Path usable for filesystem access from the session's current
    /// directory. Relative while the session changes directories, identical
    /// to [`full_path`](Self::full_path) otherwise.
    #[must_use]
    pub fn access_path(&self) -> &Path {
        &self.access_path
    }

    /// Path from the root argument down to this entry.
    #[must_use]
    pub fn full_path(&self) -> &Path {
        &self.full_path
    }

    /// Length of [`full_path`](Self::full_path) in bytes.
    #[must_use]
    pub fn path_len(&self) -> usize {
        self.full_path.as_os_str().len()
    }

    /// Depth below the root; the root itself is level zero.
    #[must_use]
    pub const fn level(&self) -> isize {
        self.level
    }

    /// Current classification of this entry.
    #[must_use]
    pub const fn info(&self) -> EntryInfo {
        self.info
    }

    /// Stat metadata, absent for deferred, skipped, and failed stats.
    #[must_use]
    pub const fn stat(&self) -> Option<&EntryStat> {
        self.stat.as_ref()
    }

    /// For a [`Cycle`](EntryInfo::Cycle) entry, the full path of the
    /// ancestor directory it would revisit. Known only under the exact
    /// detector; the amortized probe proves a cycle exists without naming
    /// the ancestor.
    #[must_use]
    pub fn cycle_ancestor(&self) -> Option<&Path> {
        self.cycle_to.as_deref()
    }

    /// The error behind an [`Error`](EntryInfo::Error),
    /// [`DirectoryUnreadable`](EntryInfo::DirectoryUnreadable), or
    /// [`DanglingSymlink`](EntryInfo::DanglingSymlink) classification.
    #[must_use]
    pub fn io_error(&self) -> Option<io::Error> {
        self.errno.map(io::Error::from)
    }

    /// For a listed directory under stat skipping, an upper bound on the
    /// subdirectories still to be found among its children, derived from the
    /// link count.
    #[must_use]
    pub const fn dirs_remaining(&self) -> Option<u64> {
        self.dirs_remaining
    }

    /// Inode from the raw directory record, used to order reads before any
    /// stat has been taken.
    pub(crate) const fn inode_hint(&self) -> u64 {
        self.ino_hint
    }

    pub(crate) fn set_info(&mut self, info: EntryInfo) {
        self.info = info;
    }

    /// True for classifications that can still be descended into.
    pub(crate) fn wants_descent(&self) -> bool {
        matches!(self.info, EntryInfo::Directory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_len_counts_bytes() {
        let node = EntryNode::new(
            "c".into(),
            "a/b/c".into(),
            "a/b/c".into(),
            2,
            EntryInfo::File,
        );
        assert_eq!(node.path_len(), 5);
        assert_eq!(node.level(), 2);
        assert_eq!(node.name(), OsStr::new("c"));
    }

    #[test]
    fn stat_key_combines_device_and_inode() {
        let stat = EntryStat {
            dev: 7,
            ino: 42,
            nlink: 2,
            size: 0,
            mode: libc::S_IFDIR as u32,
        };
        assert_eq!(stat.key(), FileKey { dev: 7, ino: 42 });
        assert!(stat.file_type().is_dir());
    }

    #[test]
    fn io_error_maps_errno() {
        let mut node = EntryNode::new(
            "x".into(),
            "x".into(),
            "x".into(),
            0,
            EntryInfo::Error,
        );
        node.errno = Some(Errno::ACCESS);
        let error = node.io_error().unwrap();
        assert_eq!(error.raw_os_error(), Some(libc::EACCES));
    }
}
