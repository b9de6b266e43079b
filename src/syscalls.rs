//! The shell-facing process syscall surface (spec.md §4.2/§6): `spawn`,
//! `waitpid`, `kill`, `exit`, `nice`, `sleep`, `tcsetpid`,
//! `ignore_sigint`/`ignore_sigtstp`, `logout`.
//!
//! Grounded on the teacher's `syscalls::dispatch` (borrow the scheduler,
//! perform the operation, drop the lock before any blocking step)
//! translated from a `match` over a syscall-number ABI to typed
//! functions over a [`SharedSystem`], since there is no hardware
//! ring-transition boundary to multiplex through here.

use std::sync::Arc;

use crate::fs::fd::OpenMode;
use crate::fs::syscalls::{ChmodOp, Whence};
use crate::fs::dentry::Perm;
use crate::scheduler::kernel::WaitOutcome;
use crate::scheduler::pcb::{ExitStatus, Pid, Priority, WaitTarget};
use crate::scheduler::SharedSystem;
use crate::threadcap::OsThreadCap;

/// The function every spawned process runs. Takes a handle scoped to its
/// own pid; if it returns without calling `s_exit`, the caller exits it
/// with status 0.
pub type EntryFn = fn(&ProcHandle);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    SigTerm,
    SigStop,
    SigCont,
    SigInt,
    SigTstp,
}

fn set_errno(system: &SharedSystem, pid: Pid, code: i32) {
    if let Ok(mut sys) = system.lock() {
        if let Ok(pcb) = sys.kernel.get_mut(pid) {
            pcb.errnumber = code;
        }
    }
}

/// A process's view of the system: its own pid, the shared kernel/fs
/// state, and the `ThreadCap` it must yield through on every blocking
/// call.
#[derive(Clone)]
pub struct ProcHandle {
    system: SharedSystem,
    pid: Pid,
    cap: OsThreadCap,
}

impl ProcHandle {
    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn system(&self) -> &SharedSystem {
        &self.system
    }

    /// `s_spawn(fn, argv, fd0, fd1, priority) -> pid`. `fd0`/`fd1` in the
    /// original select which std streams the child inherits; since this
    /// crate's process-fd table is always deep-copied from the parent
    /// (spec.md §4.4), both already point at the parent's streams and no
    /// separate parameter is needed.
    pub fn s_spawn(&self, entry: EntryFn, argv: Vec<String>, priority: Priority) -> i32 {
        spawn(&self.system, self.pid, entry, argv, priority)
    }

    /// `s_waitpid(pid, *status, nohang) -> pid | 0 | -1`.
    pub fn s_waitpid(&self, pid: i32, status: &mut u32, nohang: bool) -> i32 {
        let target = if pid == -1 {
            WaitTarget::Any
        } else {
            WaitTarget::Pid(pid)
        };
        loop {
            let outcome = {
                let mut sys = self.system.lock().unwrap();
                sys.kernel.k_waitpid_attempt(self.pid, target)
            };
            match outcome {
                Ok(WaitOutcome::Reaped(reaped_pid, exit_status)) => {
                    *status = exit_status.bits();
                    return reaped_pid;
                }
                Ok(WaitOutcome::StoppedChild) => {
                    *status = ExitStatus::STOPPED.bits();
                    return 0;
                }
                Ok(WaitOutcome::NoSuchChild) => {
                    set_errno(&self.system, self.pid, crate::error::KError::PidNotFound.errno_code());
                    return -1;
                }
                Ok(WaitOutcome::NeedsBlock) => {
                    if nohang {
                        return 0;
                    }
                    {
                        let mut sys = self.system.lock().unwrap();
                        if let Ok(pcb) = sys.kernel.get_mut(self.pid) {
                            pcb.waited_child = Some(target);
                        }
                        let _ = sys.kernel.k_block_process(self.pid);
                    }
                    self.cap.suspend_self();
                }
                Err(e) => {
                    set_errno(&self.system, self.pid, e.errno_code());
                    return -1;
                }
            }
        }
    }

    /// `s_kill(pid, sig)`.
    pub fn s_kill(&self, target: Pid, sig: Signal) -> i32 {
        let (ignore, priority, command) = {
            let sys = self.system.lock().unwrap();
            match sys.kernel.get(target) {
                Ok(p) => ((p.ignore_sigint, p.ignore_sigtstp), p.priority, p.command.clone()),
                Err(_) => ((false, false), Priority::Medium, String::new()),
            }
        };
        let mut signaled = false;
        let result = {
            let mut sys = self.system.lock().unwrap();
            match sig {
                Signal::SigTerm => {
                    signaled = true;
                    sys.kernel.k_proc_exit(target, ExitStatus::EXITED)
                }
                Signal::SigInt if ignore.0 => Ok(()),
                Signal::SigInt => {
                    signaled = true;
                    sys.kernel.k_proc_exit(target, ExitStatus::EXITED)
                }
                Signal::SigStop => sys.kernel.k_stop_process(target),
                Signal::SigTstp if ignore.1 => Ok(()),
                Signal::SigTstp => sys.kernel.k_stop_process(target),
                Signal::SigCont => sys.kernel.k_continue_process(target),
            }
        };
        match result {
            Ok(()) => {
                if signaled {
                    let quantum = self.system.lock().unwrap().kernel.quantum;
                    crate::logger::log_event(quantum, crate::logger::Op::Signaled, target, priority, &command);
                }
                if matches!(sig, Signal::SigTerm | Signal::SigInt) && target == self.pid {
                    self.s_exit(0);
                }
                0
            }
            Err(e) => {
                set_errno(&self.system, self.pid, e.errno_code());
                -1
            }
        }
    }

    /// `s_exit(status)`: never returns.
    pub fn s_exit(&self, _status: i32) -> ! {
        {
            let mut sys = self.system.lock().unwrap();
            let (priority, command) = sys
                .kernel
                .get(self.pid)
                .map(|p| (p.priority, p.command.clone()))
                .unwrap_or((Priority::Medium, String::new()));
            let quantum = sys.kernel.quantum;
            let _ = sys.kernel.k_proc_exit(self.pid, ExitStatus::EXITED);
            crate::logger::log_event(quantum, crate::logger::Op::Exited, self.pid, priority, &command);
        }
        self.cap.exit()
    }

    /// `s_nice(pid, prio)`.
    pub fn s_nice(&self, target: Pid, prio: i32) -> i32 {
        let Some(priority) = Priority::from_i32(prio) else {
            set_errno(&self.system, self.pid, crate::error::KError::InvalidArgument.errno_code());
            return -1;
        };
        let mut sys = self.system.lock().unwrap();
        match sys.kernel.k_set_priority(target, priority) {
            Ok(()) => 0,
            Err(e) => {
                drop(sys);
                set_errno(&self.system, self.pid, e.errno_code());
                -1
            }
        }
    }

    /// `s_sleep(ticks)`: restartable, looping while `sleep_time > 0`.
    pub fn s_sleep(&self, ticks: u32) {
        {
            let mut sys = self.system.lock().unwrap();
            let _ = sys.kernel.k_sleep(self.pid, ticks as f64);
        }
        loop {
            self.cap.suspend_self();
            let still_sleeping = {
                let sys = self.system.lock().unwrap();
                sys.kernel
                    .get(self.pid)
                    .map(|p| p.sleep_time > 0.0)
                    .unwrap_or(false)
            };
            if !still_sleeping {
                break;
            }
        }
    }

    /// `s_tcsetpid(pid)`.
    pub fn s_tcsetpid(&self, target: Pid) -> i32 {
        let mut sys = self.system.lock().unwrap();
        match sys.kernel.k_tcsetpid(self.pid, target) {
            Ok(()) => 0,
            Err(e) => {
                drop(sys);
                set_errno(&self.system, self.pid, e.errno_code());
                -1
            }
        }
    }

    pub fn s_ignore_sigint(&self, ignore: bool) {
        if let Ok(mut sys) = self.system.lock() {
            if let Ok(pcb) = sys.kernel.get_mut(self.pid) {
                pcb.ignore_sigint = ignore;
            }
        }
    }

    pub fn s_ignore_sigtstp(&self, ignore: bool) {
        if let Ok(mut sys) = self.system.lock() {
            if let Ok(pcb) = sys.kernel.get_mut(self.pid) {
                pcb.ignore_sigtstp = ignore;
            }
        }
    }

    pub fn s_logout(&self) {
        self.system.lock().unwrap().kernel.k_logout();
    }

    /// `u_perror(prefix)`: writes `prefix: <strerror>\n` to stderr using
    /// the caller's last `errnumber`, matching the original's
    /// `perror`-style helper (spec.md §7).
    pub fn s_perror(&self, prefix: &str) {
        let code = self
            .system
            .lock()
            .unwrap()
            .kernel
            .get(self.pid)
            .map(|p| p.errnumber)
            .unwrap_or(0);
        self.s_write(
            crate::fs::fd::STDERR_FD,
            format!("{prefix}: {}\n", crate::error::strerror(code)).as_bytes(),
        );
    }

    /// Auto-stop-on-background-stdin-read, per spec.md §4.4: a read from
    /// stdin by a process that doesn't own the terminal is treated like
    /// an incoming `SIGSTOP`.
    fn stop_if_background_stdin(&self, fd: i32) {
        if fd != crate::fs::fd::STDIN_FD {
            return;
        }
        loop {
            let owns = self.system.lock().unwrap().kernel.owns_terminal(self.pid);
            if owns {
                return;
            }
            {
                let mut sys = self.system.lock().unwrap();
                let _ = sys.kernel.k_stop_process(self.pid);
            }
            self.cap.suspend_self();
        }
    }

    pub fn s_open(&self, name: &str, mode: OpenMode) -> i32 {
        let mut sys = self.system.lock().unwrap();
        let System { kernel, fs } = &mut *sys;
        let Ok(pcb) = kernel.get_mut(self.pid) else {
            return -1;
        };
        match crate::fs::syscalls::s_open(fs, pcb, name, mode) {
            Ok(fd) => fd,
            Err(e) => {
                pcb.errnumber = e.errno_code();
                -1
            }
        }
    }

    pub fn s_read(&self, fd: i32, buf: &mut [u8]) -> i32 {
        self.stop_if_background_stdin(fd);
        let mut sys = self.system.lock().unwrap();
        let System { kernel, fs } = &mut *sys;
        let Ok(pcb) = kernel.get_mut(self.pid) else {
            return -1;
        };
        match crate::fs::syscalls::s_read(fs, pcb, fd, buf) {
            Ok(n) => n as i32,
            Err(e) => {
                pcb.errnumber = e.errno_code();
                -1
            }
        }
    }

    pub fn s_write(&self, fd: i32, buf: &[u8]) -> i32 {
        let mut sys = self.system.lock().unwrap();
        let System { kernel, fs } = &mut *sys;
        let Ok(pcb) = kernel.get_mut(self.pid) else {
            return -1;
        };
        match crate::fs::syscalls::s_write(fs, pcb, fd, buf) {
            Ok(n) => n as i32,
            Err(e) => {
                pcb.errnumber = e.errno_code();
                -1
            }
        }
    }

    pub fn s_lseek(&self, fd: i32, offset: i64, whence: Whence) -> i64 {
        let mut sys = self.system.lock().unwrap();
        let System { kernel, fs } = &mut *sys;
        let Ok(pcb) = kernel.get_mut(self.pid) else {
            return -1;
        };
        match crate::fs::syscalls::s_lseek(fs, pcb, fd, offset, whence) {
            Ok(n) => n as i64,
            Err(e) => {
                pcb.errnumber = e.errno_code();
                -1
            }
        }
    }

    pub fn s_close(&self, fd: i32) -> i32 {
        let mut sys = self.system.lock().unwrap();
        let System { kernel, fs } = &mut *sys;
        let Ok(pcb) = kernel.get_mut(self.pid) else {
            return -1;
        };
        match crate::fs::syscalls::s_close(fs, pcb, fd) {
            Ok(()) => 0,
            Err(e) => {
                pcb.errnumber = e.errno_code();
                -1
            }
        }
    }

    pub fn s_unlink(&self, name: &str) -> i32 {
        let mut sys = self.system.lock().unwrap();
        match crate::fs::syscalls::s_unlink(&mut sys.fs, name) {
            Ok(()) => 0,
            Err(e) => {
                if let Ok(pcb) = sys.kernel.get_mut(self.pid) {
                    pcb.errnumber = e.errno_code();
                }
                -1
            }
        }
    }

    pub fn s_chmod(&self, name: &str, op: ChmodOp, bits: Perm) -> i32 {
        let mut sys = self.system.lock().unwrap();
        match crate::fs::syscalls::s_chmod(&mut sys.fs, name, op, bits) {
            Ok(()) => 0,
            Err(e) => {
                if let Ok(pcb) = sys.kernel.get_mut(self.pid) {
                    pcb.errnumber = e.errno_code();
                }
                -1
            }
        }
    }

    pub fn s_mv(&self, src: &str, dst: &str) -> i32 {
        let mut sys = self.system.lock().unwrap();
        match crate::fs::syscalls::s_mv(&mut sys.fs, src, dst) {
            Ok(()) => 0,
            Err(e) => {
                if let Ok(pcb) = sys.kernel.get_mut(self.pid) {
                    pcb.errnumber = e.errno_code();
                }
                -1
            }
        }
    }

    pub fn s_ls(&self) -> Option<String> {
        let sys = self.system.lock().unwrap();
        crate::fs::syscalls::s_ls(&sys.fs).ok()
    }

    pub fn s_fprintf_short(&self, fd: i32, s: &str) -> i32 {
        let mut sys = self.system.lock().unwrap();
        let System { kernel, fs } = &mut *sys;
        let Ok(pcb) = kernel.get_mut(self.pid) else {
            return -1;
        };
        match crate::fs::syscalls::s_fprintf_short(fs, pcb, fd, s) {
            Ok(n) => n as i32,
            Err(e) => {
                pcb.errnumber = e.errno_code();
                -1
            }
        }
    }
}

use crate::scheduler::System;

/// Spawns `entry` as a child of `ppid`. Creates the backing thread
/// suspended, registers the PCB with the kernel, then makes it ready.
pub fn spawn(
    system: &SharedSystem,
    ppid: Pid,
    entry: EntryFn,
    argv: Vec<String>,
    priority: Priority,
) -> i32 {
    if argv.is_empty() {
        set_errno(system, ppid, crate::error::KError::BadArgv.errno_code());
        return -1;
    }
    let command = argv[0].clone();
    let pid_slot: Arc<std::sync::Mutex<Option<Pid>>> = Arc::new(std::sync::Mutex::new(None));
    let pid_slot_for_thread = pid_slot.clone();
    let system_for_thread = system.clone();

    let cap = OsThreadCap::start(move |cap| {
        let pid = pid_slot_for_thread
            .lock()
            .unwrap()
            .expect("pid installed before first resume");
        let handle = ProcHandle {
            system: system_for_thread,
            pid,
            cap,
        };
        entry(&handle);
        handle.s_exit(0);
    });

    let created = {
        let mut sys = system.lock().unwrap();
        sys.kernel.k_proc_create(ppid, priority, command, argv, cap)
    };
    match created {
        Ok(pid) => {
            *pid_slot.lock().unwrap() = Some(pid);
            let mut sys = system.lock().unwrap();
            let _ = sys.kernel.k_add_to_ready_queue(pid);
            pid
        }
        Err(e) => {
            set_errno(system, ppid, e.errno_code());
            -1
        }
    }
}

/// Builds the handle for the init PCB so `main.rs` can spawn the first
/// shell-level process through the same `ProcHandle` surface.
pub fn init_handle(system: &SharedSystem, init_pid: Pid, cap: OsThreadCap) -> ProcHandle {
    ProcHandle {
        system: system.clone(),
        pid: init_pid,
        cap,
    }
}
