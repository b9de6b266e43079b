//! The Process Control Block (spec.md §3).
//!
//! Grounded on the teacher's `scheduler::task::{Process, ProcessId,
//! ProcessState}` (a plain owned struct, no intrusive linked-list node),
//! generalized with the relationship/scheduling/exit-path fields this
//! spec requires and with `children` modeled as non-owning pid
//! references per spec.md §9 rather than embedded `Process` values.

use bitflags::bitflags;

use crate::fs::fd::ProcessFdTable;
use crate::threadcap::OsThreadCap;

pub type Pid = i32;

pub const INIT_PID: Pid = 1;

/// `Running | Blocked | Stopped | Zombied`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Running,
    Blocked,
    Stopped,
    Zombied,
}

/// `High=0, Medium=1, Low=2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Priority {
    High = 0,
    Medium = 1,
    Low = 2,
}

impl Priority {
    pub fn from_i32(v: i32) -> Option<Priority> {
        match v {
            0 => Some(Priority::High),
            1 => Some(Priority::Medium),
            2 => Some(Priority::Low),
            _ => None,
        }
    }
}

bitflags! {
    /// `exit_status` bits: `bit0 = exited, bit1 = stopped, bit2 = signaled`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ExitStatus: u32 {
        const EXITED   = 0b001;
        const STOPPED  = 0b010;
        const SIGNALED = 0b100;
    }
}

/// `waited_child`: who the caller is blocked waiting for, if anyone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitTarget {
    Any,
    Pid(Pid),
}

pub struct Pcb {
    pub pid: Pid,
    pub ppid: Pid,
    pub pgid: Pid,
    pub is_leader: bool,

    pub state: ProcessState,
    pub priority: Priority,
    pub sleep_time: f64,
    pub command: String,
    pub argv: Vec<String>,

    pub children: Vec<Pid>,
    pub waited_child: Option<WaitTarget>,

    pub process_fd_table: ProcessFdTable,

    pub exit_status: ExitStatus,
    pub ignore_sigint: bool,
    pub ignore_sigtstp: bool,
    pub errnumber: i32,

    pub thread: Option<OsThreadCap>,
}

impl Pcb {
    pub fn new(
        pid: Pid,
        ppid: Pid,
        pgid: Pid,
        is_leader: bool,
        priority: Priority,
        command: String,
        argv: Vec<String>,
        process_fd_table: ProcessFdTable,
    ) -> Self {
        Pcb {
            pid,
            ppid,
            pgid,
            is_leader,
            state: ProcessState::Running,
            priority,
            sleep_time: 0.0,
            command,
            argv,
            children: Vec::new(),
            waited_child: None,
            process_fd_table,
            exit_status: ExitStatus::empty(),
            ignore_sigint: false,
            ignore_sigtstp: false,
            errnumber: 0,
            thread: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_status_bits_are_independent() {
        let mut status = ExitStatus::empty();
        status.insert(ExitStatus::EXITED);
        assert!(status.contains(ExitStatus::EXITED));
        assert!(!status.contains(ExitStatus::STOPPED));
    }

    #[test]
    fn priority_round_trips_through_i32() {
        for p in [Priority::High, Priority::Medium, Priority::Low] {
            assert_eq!(Priority::from_i32(p as i32), Some(p));
        }
        assert_eq!(Priority::from_i32(3), None);
    }
}
