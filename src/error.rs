//! Closed process-layer error taxonomy.
//!
//! Every kernel function returns `Result<T, KError>` instead of a bare
//! negative code; [`KError::errno_code`] recovers the negative-int wire
//! value the syscall layer stashes in a PCB's `errnumber`.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum KError {
    #[error("scheduler not initialized")]
    NoInit,
    #[error("init already exists")]
    InitExists,
    #[error("invalid argv")]
    BadArgv,
    #[error("no such process")]
    NoSuchProcess,
    #[error("no current process")]
    NoCurrentProcess,
    #[error("cannot kill init")]
    TriedToKillInit,
    #[error("continue on a non-stopped process")]
    ContinueNonStopped,
    #[error("stop on an already-stopped process")]
    StopStopped,
    #[error("stop on a non-active process")]
    StopNonActive,
    #[error("pid not found")]
    PidNotFound,
    #[error("running process not found in any ready queue")]
    RunningNotInReady,
    #[error("invalid pcb")]
    InvalidPcb,
    #[error("invalid scheduler state")]
    InvalidSchedulerState,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("process does not own the terminal")]
    TcsetNoTerminalControl,
    #[error("allocation failed")]
    AllocationFailed,
}

impl KError {
    /// The negative-integer wire code stashed in `Pcb::errnumber`.
    pub fn errno_code(&self) -> i32 {
        match self {
            KError::NoInit => -1,
            KError::InitExists => -2,
            KError::BadArgv => -3,
            KError::NoSuchProcess => -4,
            KError::NoCurrentProcess => -5,
            KError::TriedToKillInit => -6,
            KError::ContinueNonStopped => -7,
            KError::StopStopped => -8,
            KError::StopNonActive => -9,
            KError::PidNotFound => -10,
            KError::RunningNotInReady => -11,
            KError::InvalidPcb => -12,
            KError::InvalidSchedulerState => -13,
            KError::InvalidArgument => -14,
            KError::TcsetNoTerminalControl => -15,
            KError::AllocationFailed => -16,
        }
    }
}

pub type KResult<T> = Result<T, KError>;

/// Renders a negative wire code from either [`KError`] or
/// [`crate::fs::error::FsError`] back into its `Display` message, for
/// `u_perror`-style formatting at the shell boundary (spec.md §7) where
/// only the bare `errnumber` survives, not the original enum.
pub fn strerror(code: i32) -> &'static str {
    match code {
        -1 => "scheduler not initialized",
        -2 => "init already exists",
        -3 => "invalid argv",
        -4 => "no such process",
        -5 => "no current process",
        -6 => "cannot kill init",
        -7 => "continue on a non-stopped process",
        -8 => "stop on an already-stopped process",
        -9 => "stop on a non-active process",
        -10 => "pid not found",
        -11 => "running process not found in any ready queue",
        -12 => "invalid pcb",
        -13 => "invalid scheduler state",
        -14 => "invalid argument",
        -15 => "process does not own the terminal",
        -16 => "allocation failed",
        -100 => "invalid filename",
        -101 => "file not found",
        -102 => "file exists and is read-only",
        -103 => "wrong permissions",
        -104 => "file already write-locked",
        -105 => "no empty blocks",
        -106 => "fd out of range",
        -107 => "fd not in table",
        -108 => "special fd",
        -109 => "seek would overflow or go negative",
        -110 => "bad whence",
        -111 => "bad mode",
        -112 => "read failed",
        -113 => "write failed",
        0 => "success",
        _ => "unknown error",
    }
}
