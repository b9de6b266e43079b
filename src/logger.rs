//! Scheduling-event log: tab-separated lines tagged with the quantum
//! count, operation name, pid, priority, and command, matching
//! `original_source/src/scheduler/logger.c`'s `log_schedule`/`log_create`/
//! etc. family, rendered here via a `tracing_subscriber` formatting layer
//! instead of hand-rolled `snprintf`+`write`.

use std::fmt;
use std::fs::File;
use std::io;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::fmt::MakeWriter;

use crate::scheduler::pcb::Priority;

/// Install the global `tracing` subscriber, writing to `log_file` if
/// given, else stderr. Returns a guard; dropping it flushes.
pub fn init(log_file: Option<&Path>) -> anyhow::Result<()> {
    let writer = match log_file {
        Some(path) => LogWriter::File(Mutex::new(File::create(path)?)),
        None => LogWriter::Stderr,
    };
    tracing_subscriber::fmt()
        .with_writer(writer)
        .with_target(false)
        .with_level(false)
        .without_time()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install logger: {e}"))
}

enum LogWriter {
    File(Mutex<File>),
    Stderr,
}

impl io::Write for &LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            LogWriter::File(f) => f.lock().unwrap().write(buf),
            LogWriter::Stderr => io::stderr().write(buf),
        }
    }
    fn flush(&mut self) -> io::Result<()> {
        match self {
            LogWriter::File(f) => f.lock().unwrap().flush(),
            LogWriter::Stderr => io::stderr().flush(),
        }
    }
}

impl<'a> MakeWriter<'a> for LogWriter {
    type Writer = &'a LogWriter;
    fn make_writer(&'a self) -> Self::Writer {
        self
    }
}

/// Operation tags from spec.md §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Schedule,
    Create,
    Exited,
    Zombie,
    Orphan,
    Waited,
    Nice,
    Blocked,
    Unblocked,
    Sleeping,
    Stopped,
    Continued,
    Signaled,
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Op::Schedule => "SCHEDULE",
            Op::Create => "CREATE",
            Op::Exited => "EXITED",
            Op::Zombie => "ZOMBIE",
            Op::Orphan => "ORPHAN",
            Op::Waited => "WAITED",
            Op::Nice => "NICE",
            Op::Blocked => "BLOCKED",
            Op::Unblocked => "UNBLOCKED",
            Op::Sleeping => "SLEEPING",
            Op::Stopped => "STOPPED",
            Op::Continued => "CONTINUED",
            Op::Signaled => "SIGNALED",
        };
        write!(f, "{s}")
    }
}

/// Emit one scheduling-event log line.
///
/// `priority` carries the old/new priority pair for `NICE`; all other
/// operations pass the PCB's single current priority twice.
pub fn log_event(quantum: u64, op: Op, pid: i32, priority: Priority, command: &str) {
    tracing::info!(
        quantum,
        op = %op,
        pid,
        priority = priority as i32,
        command,
        "[{quantum}]\t{op}\t{pid}\t{priority:?}\t{command}"
    );
}

pub fn log_nice(quantum: u64, pid: i32, old: Priority, new: Priority, command: &str) {
    tracing::info!(
        quantum,
        op = %Op::Nice,
        pid,
        old_priority = old as i32,
        new_priority = new as i32,
        command,
        "[{quantum}]\tNICE\t{pid}\t{old:?}\t{new:?}\t{command}"
    );
}
