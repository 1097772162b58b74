use crate::chdir::chdir_long;
use crate::error::WalkError;
use crate::flags::WalkOptions;
use logging::debug_log;
use rustix::fs::{Mode, OFlags, CWD};
use rustix::process;
use std::ffi::OsString;
use std::io;
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};
use std::os::unix::ffi::OsStringExt;
use std::path::{Path, PathBuf};

/// Ancestor descriptors kept for cheap ascent. Deeper ancestors are evicted
/// first and reopened through `..` when the walk climbs back past them.
pub(crate) const RING_CAPACITY: usize = 4;

/// Fixed-capacity ring of ancestor directory descriptors.
pub(crate) struct FdRing {
    slots: [Option<OwnedFd>; RING_CAPACITY],
    top: usize,
    len: usize,
}

impl FdRing {
    pub(crate) const fn new() -> Self {
        Self {
            slots: [None, None, None, None],
            top: 0,
            len: 0,
        }
    }

    /// Pushes the most recent ancestor, evicting the oldest at capacity.
    pub(crate) fn push(&mut self, fd: OwnedFd) {
        if self.len == RING_CAPACITY {
            self.evict_oldest();
            debug_log!(Ring, 1, "ancestor descriptor evicted at capacity");
        }
        self.slots[self.top] = Some(fd);
        self.top = (self.top + 1) % RING_CAPACITY;
        self.len += 1;
    }

    /// Pops the most recently pushed ancestor, if it is still held.
    pub(crate) fn pop(&mut self) -> Option<OwnedFd> {
        if self.len == 0 {
            return None;
        }
        self.top = (self.top + RING_CAPACITY - 1) % RING_CAPACITY;
        self.len -= 1;
        self.slots[self.top].take()
    }

    /// Drops the oldest held descriptor. Returns whether one was held.
    pub(crate) fn evict_oldest(&mut self) -> bool {
        if self.len == 0 {
            return false;
        }
        let oldest = (self.top + RING_CAPACITY - self.len) % RING_CAPACITY;
        self.slots[oldest] = None;
        self.len -= 1;
        true
    }

    pub(crate) fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
        self.len = 0;
    }

    pub(crate) const fn len(&self) -> usize {
        self.len
    }
}

/// How the session tracks its position in the hierarchy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CwdMode {
    /// Really change the process working directory and restore it at the
    /// end.
    Process,
    /// Hold the current directory as a descriptor and resolve children
    /// relative to it; process-global state is never touched.
    FdRelative,
    /// Never move at all; every access goes through the full path.
    Static,
}

/// The place the process working directory is restored to.
enum SavedCwd {
    Descriptor(OwnedFd),
    Name(PathBuf),
}

impl SavedCwd {
    /// Prefers a descriptor on `.`; falls back to the textual working
    /// directory when `.` cannot be opened.
    fn capture() -> Result<Self, WalkError> {
        match rustix::fs::open(
            ".",
            OFlags::PATH | OFlags::DIRECTORY | OFlags::CLOEXEC,
            Mode::empty(),
        ) {
            Ok(fd) => Ok(Self::Descriptor(fd)),
            Err(_) => {
                let cwd = process::getcwd(Vec::new())
                    .map_err(|errno| WalkError::SaveCwd {
                        source: errno.into(),
                    })?;
                Ok(Self::Name(PathBuf::from(OsString::from_vec(
                    cwd.into_bytes(),
                ))))
            }
        }
    }

    fn restore(&self) -> Result<(), WalkError> {
        match self {
            Self::Descriptor(fd) => {
                process::fchdir(fd.as_fd()).map_err(|errno| WalkError::RestoreCwd {
                    source: errno.into(),
                })
            }
            Self::Name(path) => chdir_long(path).map_err(|error| WalkError::RestoreCwd {
                source: io::Error::other(error),
            }),
        }
    }

    const fn holds_descriptor(&self) -> bool {
        matches!(self, Self::Descriptor(_))
    }
}

/// The session's position in the hierarchy, tracked per [`CwdMode`].
///
/// In fd-relative mode the current directory is a held descriptor and up to
/// [`RING_CAPACITY`] ancestors stay open for ascent; anything deeper is
/// reopened through `..`. In process mode the real working directory moves
/// and the pre-walk directory is restored on teardown.
pub(crate) struct VirtualCwd {
    mode: CwdMode,
    saved: Option<SavedCwd>,
    cwd: Option<OwnedFd>,
    ring: FdRing,
}

impl VirtualCwd {
    pub(crate) fn new(options: WalkOptions) -> Result<Self, WalkError> {
        let mode = if options.contains(WalkOptions::NO_CHDIR) {
            CwdMode::Static
        } else if options.contains(WalkOptions::FD_RELATIVE_CWD) {
            CwdMode::FdRelative
        } else {
            CwdMode::Process
        };
        let saved = match mode {
            CwdMode::Process => Some(SavedCwd::capture()?),
            CwdMode::FdRelative | CwdMode::Static => None,
        };
        Ok(Self {
            mode,
            saved,
            cwd: None,
            ring: FdRing::new(),
        })
    }

    pub(crate) const fn mode(&self) -> CwdMode {
        self.mode
    }

    /// Descriptor that child names resolve against. The process working
    /// directory outside fd-relative mode.
    pub(crate) fn handle(&self) -> BorrowedFd<'_> {
        match (&self.mode, &self.cwd) {
            (CwdMode::FdRelative, Some(fd)) => fd.as_fd(),
            _ => CWD,
        }
    }

    /// Moves into a directory already opened by the caller.
    pub(crate) fn advance_into(&mut self, fd: OwnedFd, path: &Path) -> Result<(), WalkError> {
        match self.mode {
            CwdMode::Static => Ok(()),
            CwdMode::Process => {
                process::fchdir(fd.as_fd()).map_err(|errno| WalkError::ChangeDir {
                    path: path.to_path_buf(),
                    source: errno.into(),
                })
            }
            CwdMode::FdRelative => {
                if let Some(old) = self.cwd.take() {
                    self.ring.push(old);
                }
                self.cwd = Some(fd);
                Ok(())
            }
        }
    }

    /// Moves to the parent of the current directory.
    pub(crate) fn ascend(&mut self) -> Result<(), WalkError> {
        match self.mode {
            CwdMode::Static => Ok(()),
            CwdMode::Process => {
                process::chdir("..").map_err(|errno| WalkError::Ascend {
                    source: errno.into(),
                })
            }
            CwdMode::FdRelative => {
                if let Some(fd) = self.ring.pop() {
                    self.cwd = Some(fd);
                    return Ok(());
                }
                if let Some(base) = self.cwd.as_ref() {
                    debug_log!(Ring, 2, "reopening evicted ancestor through ..");
                    let parent = rustix::fs::openat(
                        base.as_fd(),
                        "..",
                        OFlags::PATH | OFlags::DIRECTORY | OFlags::CLOEXEC,
                        Mode::empty(),
                    )
                    .map_err(|errno| WalkError::Ascend {
                        source: errno.into(),
                    })?;
                    self.cwd = Some(parent);
                }
                Ok(())
            }
        }
    }

    /// Returns to the pre-walk position between roots.
    pub(crate) fn return_to_start(&mut self) -> Result<(), WalkError> {
        self.ring.clear();
        self.cwd = None;
        match (&self.mode, &self.saved) {
            (CwdMode::Process, Some(saved)) => saved.restore(),
            _ => Ok(()),
        }
    }

    /// Drops the oldest held descriptor to recover from descriptor
    /// exhaustion. Returns whether one was released.
    pub(crate) fn release_one(&mut self) -> bool {
        self.ring.evict_oldest()
    }

    /// Number of descriptors this tracker currently holds.
    pub(crate) fn held_descriptors(&self) -> usize {
        self.ring.len()
            + usize::from(self.cwd.is_some())
            + usize::from(self.saved.as_ref().is_some_and(SavedCwd::holds_descriptor))
    }

    /// Releases everything and restores the saved directory if one exists.
    pub(crate) fn restore_initial(&mut self) -> Result<(), WalkError> {
        self.ring.clear();
        self.cwd = None;
        match self.saved.take() {
            Some(saved) => saved.restore(),
            None => Ok(()),
        }
    }
}

impl Drop for VirtualCwd {
    fn drop(&mut self) {
        // Best effort; close() reports failures to callers who care.
        let _ = self.restore_initial();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn open_dir(path: &Path) -> OwnedFd {
        rustix::fs::open(
            path,
            OFlags::RDONLY | OFlags::DIRECTORY | OFlags::CLOEXEC,
            Mode::empty(),
        )
        .unwrap()
    }

    fn ident(fd: BorrowedFd<'_>) -> (u64, u64) {
        let stat = rustix::fs::fstat(fd).unwrap();
        (stat.st_dev as u64, stat.st_ino as u64)
    }

    #[test]
    fn ring_pops_in_reverse_push_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut ring = FdRing::new();
        let mut idents = Vec::new();
        for _ in 0..3 {
            let fd = open_dir(dir.path());
            idents.push(ident(fd.as_fd()));
            ring.push(fd);
        }
        assert_eq!(ring.len(), 3);
        for expected in idents.iter().rev() {
            let fd = ring.pop().unwrap();
            assert_eq!(ident(fd.as_fd()), *expected);
        }
        assert!(ring.pop().is_none());
    }

    #[test]
    fn ring_evicts_oldest_at_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let mut ring = FdRing::new();
        for _ in 0..RING_CAPACITY + 2 {
            ring.push(open_dir(dir.path()));
        }
        assert_eq!(ring.len(), RING_CAPACITY);
        assert!(ring.evict_oldest());
        assert_eq!(ring.len(), RING_CAPACITY - 1);
    }

    #[test]
    fn fd_relative_ascend_reopens_past_capacity() {
        let root = tempfile::tempdir().unwrap();
        let mut path = root.path().to_path_buf();
        let mut idents = vec![];
        for index in 0..6 {
            path.push(format!("d{index}"));
            fs::create_dir(&path).unwrap();
            idents.push(ident(open_dir(&path).as_fd()));
        }

        let mut vcwd = VirtualCwd::new(
            (WalkOptions::PHYSICAL | WalkOptions::FD_RELATIVE_CWD)
                .validated()
                .unwrap(),
        )
        .unwrap();
        assert_eq!(vcwd.mode(), CwdMode::FdRelative);

        let mut path = root.path().to_path_buf();
        for index in 0..6 {
            path.push(format!("d{index}"));
            vcwd.advance_into(open_dir(&path), &path).unwrap();
        }
        assert_eq!(ident(vcwd.handle()), idents[5]);

        // Four ancestors are held; the final climb reopens via "..".
        for expected in idents.iter().rev().skip(1) {
            vcwd.ascend().unwrap();
            assert_eq!(ident(vcwd.handle()), *expected);
        }

        vcwd.return_to_start().unwrap();
        assert_eq!(vcwd.held_descriptors(), 0);
    }

    #[test]
    fn static_mode_never_holds_descriptors() {
        let dir = tempfile::tempdir().unwrap();
        let mut vcwd = VirtualCwd::new(
            (WalkOptions::PHYSICAL | WalkOptions::NO_CHDIR)
                .validated()
                .unwrap(),
        )
        .unwrap();
        assert_eq!(vcwd.mode(), CwdMode::Static);
        vcwd.advance_into(open_dir(dir.path()), dir.path()).unwrap();
        assert_eq!(vcwd.held_descriptors(), 0);
        vcwd.ascend().unwrap();
        assert_eq!(vcwd.held_descriptors(), 0);
    }
}
