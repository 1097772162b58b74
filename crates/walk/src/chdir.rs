use crate::error::WalkError;
use logging::debug_log;
use rustix::fs::{Mode, OFlags, CWD};
use rustix::io::Errno;
use rustix::process;
use std::ffi::{OsStr, OsString};
use std::os::fd::{AsFd, OwnedFd};
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::path::Path;

/// Longest path the kernel accepts in a single call, including the
/// terminating NUL.
pub(crate) const PATH_LIMIT: usize = libc::PATH_MAX as usize;

/// Changes the working directory, descending in chunks when the path is too
/// long for a single `chdir`.
///
/// Each chunk stays under [`PATH_LIMIT`] and is resolved relative to a
/// descriptor opened for the previous chunk, so a path of any length works
/// as long as every individual component fits.
pub(crate) fn chdir_long(path: &Path) -> Result<(), WalkError> {
    match process::chdir(path) {
        Ok(()) => Ok(()),
        Err(Errno::NAMETOOLONG) => chdir_chunked(path),
        Err(errno) => Err(change_dir_error(path, errno)),
    }
}

fn change_dir_error(path: &Path, errno: Errno) -> WalkError {
    WalkError::ChangeDir {
        path: path.to_path_buf(),
        source: errno.into(),
    }
}

fn chdir_chunked(path: &Path) -> Result<(), WalkError> {
    let chunks = plan_chunks(path.as_os_str(), PATH_LIMIT).ok_or_else(|| {
        WalkError::NameTooLong {
            path: path.to_path_buf(),
        }
    })?;
    debug_log!(
        Chdir,
        1,
        "chunked descent of {} bytes in {} steps",
        path.as_os_str().len(),
        chunks.len()
    );
    let mut held: Option<OwnedFd> = None;
    for chunk in &chunks {
        let base = held.as_ref().map_or(CWD, AsFd::as_fd);
        let fd = rustix::fs::openat(
            base,
            chunk.as_os_str(),
            OFlags::PATH | OFlags::DIRECTORY | OFlags::CLOEXEC,
            Mode::empty(),
        )
        .map_err(|errno| change_dir_error(path, errno))?;
        held = Some(fd);
    }
    match held {
        Some(fd) => {
            process::fchdir(fd.as_fd()).map_err(|errno| change_dir_error(path, errno))
        }
        // No components at all; only "/" reaches here and fits in one call.
        None => process::chdir(path).map_err(|errno| change_dir_error(path, errno)),
    }
}

/// Splits a path into the fewest separator-joined chunks that each fit under
/// `limit` bytes with room for a NUL. Returns `None` when a single component
/// is itself too long.
fn plan_chunks(path: &OsStr, limit: usize) -> Option<Vec<OsString>> {
    let bytes = path.as_bytes();
    let absolute = bytes.first() == Some(&b'/');
    let mut chunks = Vec::new();
    let mut current: Vec<u8> = if absolute { vec![b'/'] } else { Vec::new() };
    let is_bare = |chunk: &[u8]| chunk.is_empty() || chunk == b"/";
    for component in bytes.split(|&b| b == b'/').filter(|c| !c.is_empty()) {
        if component.len() >= limit {
            return None;
        }
        let extra = if is_bare(&current) {
            component.len()
        } else {
            component.len() + 1
        };
        if !is_bare(&current) && current.len() + extra >= limit {
            chunks.push(OsString::from_vec(current));
            current = Vec::new();
        }
        if !is_bare(&current) {
            current.push(b'/');
        }
        current.extend_from_slice(component);
    }
    if !current.is_empty() {
        chunks.push(OsString::from_vec(current));
    }
    Some(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn join(chunks: &[OsString]) -> Vec<u8> {
        let mut joined = Vec::new();
        for (index, chunk) in chunks.iter().enumerate() {
            if index > 0 && !joined.ends_with(b"/") {
                joined.push(b'/');
            }
            joined.extend_from_slice(chunk.as_bytes());
        }
        joined
    }

    #[test]
    fn short_path_stays_whole() {
        let chunks = plan_chunks(OsStr::new("/usr/share/doc"), PATH_LIMIT).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], "/usr/share/doc");
    }

    #[test]
    fn chunks_stay_under_limit_and_rejoin() {
        let path = ["abcd"; 12].join("/");
        let chunks = plan_chunks(OsStr::new(&path), 16).unwrap();
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.as_bytes().len() < 16);
        }
        assert_eq!(join(&chunks), path.as_bytes());
    }

    #[test]
    fn absolute_prefix_lands_in_first_chunk() {
        let path = format!("/{}", ["abcd"; 12].join("/"));
        let chunks = plan_chunks(OsStr::new(&path), 16).unwrap();
        assert!(chunks[0].as_bytes().starts_with(b"/"));
        for chunk in &chunks[1..] {
            assert!(!chunk.as_bytes().starts_with(b"/"));
        }
        assert_eq!(join(&chunks), path.as_bytes());
    }

    #[test]
    fn oversized_component_is_rejected() {
        let path = format!("a/{}/b", "x".repeat(32));
        assert!(plan_chunks(OsStr::new(&path), 16).is_none());
    }

    #[test]
    fn repeated_separators_collapse() {
        let chunks = plan_chunks(OsStr::new("a//b///c"), PATH_LIMIT).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], "a/b/c");
    }

    #[test]
    fn chunked_descent_lands_in_the_target_directory() {
        let _guard = crate::tests::CWD_LOCK.lock().unwrap();

        // The tree is built with mkdirat steps because the finished path is
        // too long for any single whole-path call.
        let root = tempfile::tempdir().unwrap();
        let name = "a".repeat(200);
        let mut deep = root.path().to_path_buf();
        let mut fd = rustix::fs::open(
            root.path(),
            OFlags::PATH | OFlags::DIRECTORY | OFlags::CLOEXEC,
            Mode::empty(),
        )
        .unwrap();
        while deep.as_os_str().len() <= PATH_LIMIT {
            rustix::fs::mkdirat(fd.as_fd(), name.as_str(), Mode::RWXU).unwrap();
            fd = rustix::fs::openat(
                fd.as_fd(),
                name.as_str(),
                OFlags::PATH | OFlags::DIRECTORY | OFlags::CLOEXEC,
                Mode::empty(),
            )
            .unwrap();
            deep.push(&name);
        }
        let target = rustix::fs::fstat(fd.as_fd()).unwrap();

        let chunks = plan_chunks(deep.as_os_str(), PATH_LIMIT).unwrap();
        assert!(chunks.len() > 1);

        let mut config = logging::VerbosityConfig::default();
        config.apply_debug_flag("chdir").unwrap();
        logging::init(config);
        logging::drain_events();

        let before = rustix::fs::open(
            ".",
            OFlags::PATH | OFlags::DIRECTORY | OFlags::CLOEXEC,
            Mode::empty(),
        )
        .unwrap();
        chdir_long(&deep).unwrap();
        let landed = rustix::fs::stat(".").unwrap();
        process::fchdir(before.as_fd()).unwrap();

        assert_eq!(landed.st_dev, target.st_dev);
        assert_eq!(landed.st_ino, target.st_ino);

        // The descent used exactly the planned number of chunks.
        let step_note = format!("in {} steps", chunks.len());
        let events = logging::drain_events();
        assert!(
            events.iter().any(|e| e.message.contains(&step_note)),
            "{events:?}"
        );
    }
}
