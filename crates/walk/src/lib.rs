//! Depth-first file-hierarchy traversal over directory descriptors.
//!
//! A [`WalkSession`] reports each entry of one or more root trees in
//! pre-order, with a second post-order report for every directory. The
//! engine works fd-relative where it can: directories are opened with
//! `openat`, children are stated against the open descriptor, and the
//! session's position is either the real process working directory, a held
//! descriptor ([`WalkOptions::FD_RELATIVE_CWD`]), or nothing at all
//! ([`WalkOptions::NO_CHDIR`]).
//!
//! Hierarchies are hostile territory: symlinks and hard-linked directories
//! form cycles, directories go unreadable mid-walk, descriptor limits bite
//! on deep trees, and paths outgrow `PATH_MAX`. None of those end a walk.
//! Cycles are caught by (device, inode) identity and reported as
//! [`EntryInfo::Cycle`]; unreadable directories come back as
//! [`EntryInfo::DirectoryUnreadable`]; ancestor descriptors live in a small
//! ring that evicts under pressure and recovers through `..`; and the
//! starting directory is restored even when it can only be named, not held.
//!
//! ```no_run
//! use walk::{EntryInfo, WalkBuilder, WalkOptions};
//!
//! let mut session = WalkBuilder::new()
//!     .root(".")
//!     .options(WalkOptions::PHYSICAL | WalkOptions::FD_RELATIVE_CWD)
//!     .open()?;
//! while let Some(entry) = session.read()? {
//!     if entry.info() == EntryInfo::DirectoryPost {
//!         continue;
//!     }
//!     println!("{}", entry.full_path().display());
//! }
//! session.close()?;
//! # Ok::<(), walk::WalkError>(())
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

mod arena;
mod builder;
mod chdir;
mod cwd;
mod cycle;
mod dirent;
mod entry;
mod error;
mod flags;
mod sort;
mod walker;

pub use builder::WalkBuilder;
pub use cycle::FileKey;
pub use entry::{EntryInfo, EntryNode, EntryStat};
pub use error::WalkError;
pub use flags::WalkOptions;
pub use sort::{Comparator, DEFAULT_INODE_SORT_THRESHOLD};
pub use walker::WalkSession;
