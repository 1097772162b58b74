//! Walks file hierarchies depth-first and prints every visited entry.
//!
//! Entries are printed one per line, indented by depth, with a two-letter
//! classification tag. Diagnostics selected with `-v` or `--debug` go to
//! stderr.

use clap::{value_parser, Arg, ArgAction, Command};
use std::process::ExitCode;
use walk::{EntryInfo, EntryNode, WalkBuilder, WalkOptions};

fn command() -> Command {
    Command::new("ftwalk")
        .about("Walk file hierarchies depth-first, printing each entry")
        .arg(
            Arg::new("paths")
                .value_name("PATH")
                .num_args(1..)
                .required(true)
                .help("Root paths to walk"),
        )
        .arg(
            Arg::new("logical")
                .short('L')
                .long("logical")
                .action(ArgAction::SetTrue)
                .help("Follow every symbolic link"),
        )
        .arg(
            Arg::new("follow-roots")
                .short('H')
                .long("follow-roots")
                .action(ArgAction::SetTrue)
                .help("Follow symbolic links named on the command line"),
        )
        .arg(
            Arg::new("no-chdir")
                .long("no-chdir")
                .action(ArgAction::SetTrue)
                .help("Never change directory; access entries by full path"),
        )
        .arg(
            Arg::new("fd-relative")
                .long("fd-relative")
                .action(ArgAction::SetTrue)
                .conflicts_with("no-chdir")
                .help("Track position with directory descriptors instead of chdir"),
        )
        .arg(
            Arg::new("no-stat")
                .long("no-stat")
                .action(ArgAction::SetTrue)
                .help("Skip stat calls the directory record type makes unnecessary"),
        )
        .arg(
            Arg::new("include-dot")
                .long("include-dot")
                .action(ArgAction::SetTrue)
                .help("Report . and .. entries"),
        )
        .arg(
            Arg::new("one-file-system")
                .short('x')
                .long("one-file-system")
                .action(ArgAction::SetTrue)
                .help("Do not descend into directories on other devices"),
        )
        .arg(
            Arg::new("tight-cycle-check")
                .long("tight-cycle-check")
                .action(ArgAction::SetTrue)
                .help("Use the exact cycle detector (with --logical)"),
        )
        .arg(
            Arg::new("defer-stat")
                .long("defer-stat")
                .action(ArgAction::SetTrue)
                .help("Postpone stat of root paths until they are visited"),
        )
        .arg(
            Arg::new("noatime")
                .long("noatime")
                .action(ArgAction::SetTrue)
                .help("Open directories with O_NOATIME where permitted"),
        )
        .arg(
            Arg::new("verbatim")
                .long("verbatim")
                .action(ArgAction::SetTrue)
                .help("Keep root paths exactly as spelled"),
        )
        .arg(
            Arg::new("whiteout")
                .long("whiteout")
                .action(ArgAction::SetTrue)
                .help("Report whiteout directory records"),
        )
        .arg(
            Arg::new("sort")
                .short('s')
                .long("sort")
                .action(ArgAction::SetTrue)
                .help("Visit siblings in name order"),
        )
        .arg(
            Arg::new("inode-threshold")
                .long("inode-threshold")
                .value_name("N")
                .value_parser(value_parser!(usize))
                .help("Sibling count above which unsorted directories are inode-ordered"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .help("Raise every diagnostic category; repeat for more"),
        )
        .arg(
            Arg::new("debug")
                .long("debug")
                .value_name("FLAGS")
                .action(ArgAction::Append)
                .help("Comma-separated diagnostic tokens, e.g. chdir2,cycle"),
        )
}

fn gathered_options(matches: &clap::ArgMatches) -> WalkOptions {
    let mut options = if matches.get_flag("logical") {
        WalkOptions::LOGICAL
    } else {
        WalkOptions::PHYSICAL
    };
    let mapping = [
        ("follow-roots", WalkOptions::FOLLOW_ROOT_SYMLINKS),
        ("no-chdir", WalkOptions::NO_CHDIR),
        ("fd-relative", WalkOptions::FD_RELATIVE_CWD),
        ("no-stat", WalkOptions::NO_STAT),
        ("include-dot", WalkOptions::INCLUDE_DOT),
        ("one-file-system", WalkOptions::STAY_ON_DEVICE),
        ("tight-cycle-check", WalkOptions::TIGHT_CYCLE_CHECK),
        ("defer-stat", WalkOptions::DEFER_STAT),
        ("noatime", WalkOptions::NO_ATIME),
        ("verbatim", WalkOptions::VERBATIM_PATHS),
        ("whiteout", WalkOptions::INCLUDE_WHITEOUT),
    ];
    for (name, flag) in mapping {
        if matches.get_flag(name) {
            options |= flag;
        }
    }
    options
}

/// Prints one report line. Returns whether the entry is a failure state.
fn print_entry(entry: &EntryNode) -> bool {
    let depth = usize::try_from(entry.level().max(0)).unwrap_or(0);
    let indent = "  ".repeat(depth);
    let (tag, failure) = match entry.info() {
        EntryInfo::Directory => ("d ", false),
        EntryInfo::DirectoryPost => ("dp", false),
        EntryInfo::File => ("f ", false),
        EntryInfo::Symlink => ("l ", false),
        EntryInfo::DanglingSymlink => ("ld", true),
        EntryInfo::Dot => (". ", false),
        EntryInfo::Cycle => ("dc", true),
        EntryInfo::DirectoryUnreadable => ("dn", true),
        EntryInfo::Error => ("er", true),
        EntryInfo::StatSkipped | EntryInfo::StatDeferred => ("ns", false),
        EntryInfo::Other => ("o ", false),
        EntryInfo::Root | EntryInfo::RootParent => ("??", true),
    };
    println!("{indent}{tag} {}", entry.full_path().display());
    if failure {
        match entry.io_error() {
            Some(error) => eprintln!("ftwalk: {}: {error}", entry.full_path().display()),
            None => eprintln!("ftwalk: {}: hierarchy cycle", entry.full_path().display()),
        }
    }
    failure
}

fn flush_diagnostics() {
    for event in logging::drain_events() {
        eprintln!(
            "ftwalk: [{}{}] {}",
            event.flag.token(),
            event.level,
            event.message
        );
    }
}

fn main() -> ExitCode {
    let matches = command().get_matches();

    let mut config = logging::VerbosityConfig::from_verbose(matches.get_count("verbose"));
    if let Some(groups) = matches.get_many::<String>("debug") {
        for group in groups {
            for token in group.split(',') {
                if let Err(message) = config.apply_debug_flag(token) {
                    eprintln!("ftwalk: {message}");
                    return ExitCode::from(2);
                }
            }
        }
    }
    logging::init(config);

    let mut builder = WalkBuilder::new().options(gathered_options(&matches));
    if let Some(paths) = matches.get_many::<String>("paths") {
        for path in paths {
            builder = builder.root(path);
        }
    }
    if matches.get_flag("sort") {
        builder = builder.sort_by(|a, b| a.name().cmp(b.name()));
    }
    if let Some(threshold) = matches.get_one::<usize>("inode-threshold") {
        builder = builder.inode_sort_threshold(*threshold);
    }

    let mut session = match builder.open() {
        Ok(session) => session,
        Err(error) => {
            eprintln!("ftwalk: {error}");
            return ExitCode::FAILURE;
        }
    };

    let mut failed = false;
    loop {
        match session.read() {
            Ok(Some(entry)) => {
                failed |= print_entry(entry);
            }
            Ok(None) => break,
            Err(error) => {
                eprintln!("ftwalk: {error}");
                failed = true;
                break;
            }
        }
        flush_diagnostics();
    }
    flush_diagnostics();

    if let Err(error) = session.close() {
        eprintln!("ftwalk: {error}");
        failed = true;
    }
    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
