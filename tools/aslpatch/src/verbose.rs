//! How chatty a run is.
//!
//! Results (patch records, path dumps, table info) always go to stdout and
//! errors always go to stderr. On top of that:
//!
//! - `-q`, and `--json` without `-v`: nothing else on stdout
//! - default: which tables were found, DSDT repair progress, patches that
//!   had to be skipped
//! - `-v`: each `iasl` command line and how long loading took
//!
//! The `iasl` output of a failed disassembly is echoed to stderr at every
//! level, since it is the only explanation of why a table was dropped.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Instant;

/// Progress output level, ordered from least to most output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Quiet = 0,
    Normal = 1,
    Verbose = 2,
}

static LEVEL: AtomicU8 = AtomicU8::new(Level::Normal as u8);

/// Pick the level for this run. `quiet` wins over `verbose`.
pub fn init(quiet: bool, verbose: bool) {
    let level = if quiet {
        Level::Quiet
    } else if verbose {
        Level::Verbose
    } else {
        Level::Normal
    };
    LEVEL.store(level as u8, Ordering::Relaxed);
}

pub fn level() -> Level {
    match LEVEL.load(Ordering::Relaxed) {
        0 => Level::Quiet,
        2 => Level::Verbose,
        _ => Level::Normal,
    }
}

pub fn is_verbose() -> bool {
    level() == Level::Verbose
}

pub fn is_quiet() -> bool {
    level() == Level::Quiet
}

/// Print a line of detail, such as an `iasl` command line, under `-v`.
macro_rules! vprintln {
    ($($arg:tt)*) => {
        if $crate::verbose::is_verbose() {
            println!($($arg)*);
        }
    };
}

pub(crate) use vprintln;

/// Print a progress line, such as a skipped rename, unless output is quiet.
macro_rules! dprintln {
    ($($arg:tt)*) => {
        if !$crate::verbose::is_quiet() {
            println!($($arg)*);
        }
    };
}

pub(crate) use dprintln;

/// Echo the stderr of a failed `program` run, indented, line for line.
/// Printed at every level; blank output prints nothing.
pub fn echo_stderr(program: &str, stderr: &str) {
    if let Some(block) = stderr_block(program, stderr) {
        eprint!("{block}");
    }
}

fn stderr_block(program: &str, stderr: &str) -> Option<String> {
    if stderr.trim().is_empty() {
        return None;
    }
    let mut block = format!("  {program} stderr:\n");
    for line in stderr.lines() {
        let _ = writeln!(block, "    {line}");
    }
    Some(block)
}

/// Reports the time spent in a load stage when dropped, under `-v`.
pub struct Timer {
    stage: &'static str,
    start: Instant,
}

impl Timer {
    pub fn start(stage: &'static str) -> Self {
        Self {
            stage,
            start: Instant::now(),
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        if is_verbose() {
            println!("  {} took {:.1?}", self.stage, self.start.elapsed());
        }
    }
}
