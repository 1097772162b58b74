use rustix::fs::{FileType, RawDir};
use rustix::io::Errno;
use std::ffi::{OsStr, OsString};
use std::os::fd::BorrowedFd;
use std::os::unix::ffi::OsStrExt;

/// Starting size of the getdents buffer; grown on demand for directories
/// with very long names.
const INITIAL_BUF: usize = 32 * 1024;

/// One raw directory record, before any stat.
#[derive(Debug)]
pub(crate) struct DirentRecord {
    /// Entry name as stored in the directory.
    pub(crate) name: OsString,
    /// Inode from the record. Zero marks a whiteout or deleted slot.
    pub(crate) ino: u64,
    /// Type from the record; `Unknown` on filesystems that do not fill it.
    pub(crate) kind: FileType,
}

/// Reads every record of an open directory in filesystem order.
///
/// `.` and `..` are filtered unless `keep_dots`, and zero-inode records are
/// filtered unless `keep_whiteouts`. The buffer doubles whenever the kernel
/// reports a record too large to fit; reading resumes from the directory
/// position already reached.
pub(crate) fn read_directory(
    fd: BorrowedFd<'_>,
    keep_dots: bool,
    keep_whiteouts: bool,
) -> Result<Vec<DirentRecord>, Errno> {
    let mut records = Vec::new();
    let mut buf: Vec<u8> = Vec::with_capacity(INITIAL_BUF);
    'read: loop {
        'grow: {
            let mut dir = RawDir::new(fd, buf.spare_capacity_mut());
            while let Some(entry) = dir.next() {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(Errno::INVAL) => break 'grow,
                    Err(errno) => return Err(errno),
                };
                let name = entry.file_name();
                if !keep_dots && (name == c"." || name == c"..") {
                    continue;
                }
                if entry.ino() == 0 && !keep_whiteouts {
                    continue;
                }
                records.push(DirentRecord {
                    name: OsStr::from_bytes(name.to_bytes()).to_os_string(),
                    ino: entry.ino(),
                    kind: entry.file_type(),
                });
            }
            break 'read;
        }
        let doubled = buf.capacity() * 2;
        buf.reserve(doubled);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustix::fs::{Mode, OFlags};
    use std::fs;
    use std::os::fd::{AsFd, OwnedFd};

    fn open_dir(path: &std::path::Path) -> rustix::io::Result<OwnedFd> {
        rustix::fs::open(
            path,
            OFlags::RDONLY | OFlags::DIRECTORY | OFlags::CLOEXEC,
            Mode::empty(),
        )
    }

    #[test]
    fn reads_names_and_types() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("plain"), b"x").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();

        let fd = open_dir(dir.path()).unwrap();
        let mut records = read_directory(fd.as_fd(), false, false).unwrap();
        records.sort_by(|a, b| a.name.cmp(&b.name));

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "plain");
        assert!(records[0].kind.is_file() || records[0].kind == FileType::Unknown);
        assert_eq!(records[1].name, "sub");
        assert!(records[1].kind.is_dir() || records[1].kind == FileType::Unknown);
        assert!(records.iter().all(|r| r.ino != 0));
    }

    #[test]
    fn dot_entries_are_opt_in() {
        let dir = tempfile::tempdir().unwrap();

        let fd = open_dir(dir.path()).unwrap();
        assert!(read_directory(fd.as_fd(), false, false).unwrap().is_empty());

        // Fresh descriptor; the read above consumed the directory position.
        let fd = open_dir(dir.path()).unwrap();
        let mut with_dots = read_directory(fd.as_fd(), true, false).unwrap();
        with_dots.sort_by(|a, b| a.name.cmp(&b.name));
        let names: Vec<_> = with_dots.iter().map(|r| r.name.as_os_str()).collect();
        assert_eq!(names, [OsStr::new("."), OsStr::new("..")]);
    }
}
