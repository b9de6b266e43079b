//! The scheduler core (spec.md §4.2).
//!
//! Grounded on the teacher's `scheduler::Scheduler` (a single struct
//! threaded through free functions, guarding a `VecDeque` ready queue)
//! generalized to three priority-ordered ready queues plus blocked/
//! stopped/zombie queues, and on `original_source/src/scheduler/
//! scheduler.c` for the exact quantum algorithm: the 19-slot
//! `process_to_run` pattern, `_select_next_queue`'s empty-queue
//! fallback, and `_update_blocked_processes`'s per-tick sleep
//! countdown. Per DESIGN.md's Open Question decisions, PCBs live in an
//! arena (`HashMap<Pid, Pcb>`) rather than behind intrusive linked-list
//! nodes, and `children` are plain pid references into that arena.

use std::collections::{HashMap, VecDeque};

use crate::error::{KError, KResult};
use crate::fs::fd::ProcessFdTable;
use crate::logger::{self, Op};
use crate::scheduler::pcb::{ExitStatus, Pcb, Pid, Priority, ProcessState, WaitTarget, INIT_PID};
use crate::threadcap::OsThreadCap;

/// The 19-slot weighted-round-robin selection pattern (spec.md §4.2).
/// Values index priority classes `High=0, Medium=1, Low=2`.
pub const PATTERN: [u8; 19] = [0, 0, 1, 0, 0, 1, 2, 0, 1, 1, 0, 0, 1, 2, 0, 2, 1, 0, 2];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Reaped(Pid, ExitStatus),
    StoppedChild,
    NoSuchChild,
    NeedsBlock,
}

pub struct Kernel {
    processes: HashMap<Pid, Pcb>,
    ready: [VecDeque<Pid>; 3],
    blocked: Vec<Pid>,
    stopped: Vec<Pid>,
    zombie: Vec<Pid>,
    current: Option<Pid>,
    next_pid: Pid,
    pub quantum: u64,
    terminal_controlling_pid: Option<Pid>,
    shell_spawned: bool,
    logout_requested: bool,
}

impl Kernel {
    /// Creates init (pid 1) and wires it up as its own parent, matching
    /// the original's bootstrap. Does not start init's thread; the
    /// caller does that and calls `k_add_to_ready_queue`.
    pub fn new() -> (Self, Pid) {
        let mut processes = HashMap::new();
        let init = Pcb::new(
            INIT_PID,
            INIT_PID,
            INIT_PID,
            true,
            Priority::High,
            "init".to_string(),
            vec!["init".to_string()],
            ProcessFdTable::new_with_std_streams(),
        );
        processes.insert(INIT_PID, init);
        let kernel = Kernel {
            processes,
            ready: [VecDeque::new(), VecDeque::new(), VecDeque::new()],
            blocked: Vec::new(),
            stopped: Vec::new(),
            zombie: Vec::new(),
            current: None,
            next_pid: INIT_PID + 1,
            quantum: 0,
            terminal_controlling_pid: Some(INIT_PID),
            shell_spawned: false,
            logout_requested: false,
        };
        (kernel, INIT_PID)
    }

    pub fn get(&self, pid: Pid) -> KResult<&Pcb> {
        self.processes.get(&pid).ok_or(KError::NoSuchProcess)
    }

    pub fn get_mut(&mut self, pid: Pid) -> KResult<&mut Pcb> {
        self.processes.get_mut(&pid).ok_or(KError::NoSuchProcess)
    }

    pub fn current(&self) -> Option<Pid> {
        self.current
    }

    pub fn k_get_current_process(&self) -> KResult<Pid> {
        self.current.ok_or(KError::NoCurrentProcess)
    }

    pub fn is_logout_requested(&self) -> bool {
        self.logout_requested
    }

    /// `k_proc_create`: allocate a pid, deep-copy argv, inherit the
    /// parent's process-fd table, attach `thread`, and attach as a child
    /// of `ppid`. Starts in `Running` (the caller must still call
    /// `k_add_to_ready_queue`).
    pub fn k_proc_create(
        &mut self,
        ppid: Pid,
        priority: Priority,
        command: String,
        argv: Vec<String>,
        thread: OsThreadCap,
    ) -> KResult<Pid> {
        if argv.is_empty() {
            return Err(KError::BadArgv);
        }
        let parent_fd_table = ProcessFdTable::fork_from(&self.get(ppid)?.process_fd_table);
        let pid = self.next_pid;
        self.next_pid += 1;
        let mut pcb = Pcb::new(
            pid,
            ppid,
            ppid,
            false,
            priority,
            command,
            argv,
            parent_fd_table,
        );
        pcb.thread = Some(thread);
        self.processes.insert(pid, pcb);
        self.get_mut(ppid)?.children.push(pid);
        logger::log_event(self.quantum, Op::Create, pid, priority, &self.get(pid)?.command.clone());
        if ppid == INIT_PID {
            self.shell_spawned = true;
        }
        Ok(pid)
    }

    /// `k_proc_cleanup`: remove a reaped zombie's PCB entirely, joining
    /// its thread.
    pub fn k_proc_cleanup(&mut self, pid: Pid) -> KResult<()> {
        if let Some(pcb) = self.processes.remove(&pid) {
            if let Some(thread) = pcb.thread {
                thread.join();
            }
            Ok(())
        } else {
            Err(KError::NoSuchProcess)
        }
    }

    pub fn k_add_to_ready_queue(&mut self, pid: Pid) -> KResult<()> {
        let priority = self.get(pid)?.priority;
        self.get_mut(pid)?.state = ProcessState::Running;
        self.ready[priority as usize].push_back(pid);
        Ok(())
    }

    fn remove_from_active_queue(&mut self, pid: Pid) -> bool {
        for queue in &mut self.ready {
            if let Some(pos) = queue.iter().position(|&p| p == pid) {
                queue.remove(pos);
                return true;
            }
        }
        if let Some(pos) = self.blocked.iter().position(|&p| p == pid) {
            self.blocked.remove(pos);
            return true;
        }
        if let Some(pos) = self.stopped.iter().position(|&p| p == pid) {
            self.stopped.remove(pos);
            return true;
        }
        // Not found: per DESIGN.md's open-question decision, the
        // currently running PCB is legitimately absent from every
        // active queue for the duration of its quantum.
        false
    }

    pub fn k_block_process(&mut self, pid: Pid) -> KResult<()> {
        self.remove_from_active_queue(pid);
        self.get_mut(pid)?.state = ProcessState::Blocked;
        if !self.blocked.contains(&pid) {
            self.blocked.push(pid);
        }
        logger::log_event(self.quantum, Op::Blocked, pid, self.get(pid)?.priority, &self.get(pid)?.command.clone());
        Ok(())
    }

    pub fn k_unblock_process(&mut self, pid: Pid) -> KResult<()> {
        if let Some(pos) = self.blocked.iter().position(|&p| p == pid) {
            self.blocked.remove(pos);
        }
        let priority = self.get(pid)?.priority;
        self.get_mut(pid)?.state = ProcessState::Running;
        self.get_mut(pid)?.waited_child = None;
        self.ready[priority as usize].push_back(pid);
        logger::log_event(self.quantum, Op::Unblocked, pid, priority, &self.get(pid)?.command.clone());
        Ok(())
    }

    /// `k_sleep`: set `sleep_time` and move to blocked. The caller still
    /// has to `suspend_self` after this returns.
    pub fn k_sleep(&mut self, pid: Pid, ticks: f64) -> KResult<()> {
        self.get_mut(pid)?.sleep_time = ticks;
        self.k_block_process(pid)?;
        logger::log_event(self.quantum, Op::Sleeping, pid, self.get(pid)?.priority, &self.get(pid)?.command.clone());
        Ok(())
    }

    /// Per-tick sleep countdown (spec.md §4.2 step 1).
    fn tick_sleepers(&mut self) {
        let mut to_unblock = Vec::new();
        for &pid in &self.blocked {
            if let Some(pcb) = self.processes.get_mut(&pid) {
                if pcb.sleep_time > 0.0 {
                    pcb.sleep_time -= 0.1;
                    if pcb.sleep_time <= 0.0 {
                        pcb.sleep_time = 0.0;
                        to_unblock.push(pid);
                    }
                }
            }
        }
        for pid in to_unblock {
            let _ = self.k_unblock_process(pid);
        }
    }

    fn should_throttle_init(&self) -> bool {
        self.zombie.is_empty() && self.shell_spawned
    }

    /// Pick the next ready pid per the 19-slot pattern and priority
    /// fallback, applying the init-throttling rule. Returns `None` if no
    /// PCB is eligible to run this tick.
    fn pick_next(&mut self) -> Option<Pid> {
        let idx = (self.quantum % PATTERN.len() as u64) as usize;
        let primary = PATTERN[idx];
        let mut order = vec![primary];
        for p in [0u8, 1, 2] {
            if !order.contains(&p) {
                order.push(p);
            }
        }
        for class in order {
            let len = self.ready[class as usize].len();
            for _ in 0..len {
                let pid = self.ready[class as usize].pop_front().unwrap();
                if pid == INIT_PID && self.should_throttle_init() {
                    self.ready[class as usize].push_back(pid);
                    continue;
                }
                return Some(pid);
            }
        }
        None
    }

    /// Begin one quantum: advance sleep timers, then pick a PCB to run.
    /// Logs a `SCHEDULE` event and records it as `current`. Does not
    /// increment `quantum` (that happens in `end_quantum`, matching
    /// spec.md §4.2 step 5's "if none, return without incrementing").
    pub fn begin_quantum(&mut self) -> Option<Pid> {
        self.tick_sleepers();
        let pid = self.pick_next()?;
        self.current = Some(pid);
        let priority = self.get(pid).ok()?.priority;
        let command = self.get(pid).ok()?.command.clone();
        logger::log_event(self.quantum, Op::Schedule, pid, priority, &command);
        Some(pid)
    }

    /// Post-run step (spec.md §4.2 step 4-5): rotate to tail if still
    /// running, else leave it wherever its state transition put it.
    pub fn end_quantum(&mut self, pid: Pid) {
        if let Some(pcb) = self.processes.get(&pid) {
            if pcb.state == ProcessState::Running {
                let priority = pcb.priority;
                self.ready[priority as usize].push_back(pid);
            }
        }
        self.current = None;
        self.quantum += 1;
    }

    /// `k_waitpid` attempt (spec.md §4.2): one non-blocking pass over the
    /// caller's children for a matching zombie/stopped child. Returns
    /// `NeedsBlock` when the caller should `k_block_process` itself and
    /// retry after waking.
    pub fn k_waitpid_attempt(&mut self, caller: Pid, target: WaitTarget) -> KResult<WaitOutcome> {
        let children = self.get(caller)?.children.clone();
        let candidates: Vec<Pid> = match target {
            WaitTarget::Any => children.clone(),
            WaitTarget::Pid(p) => {
                if !children.contains(&p) {
                    return Err(KError::PidNotFound);
                }
                vec![p]
            }
        };
        if candidates.is_empty() {
            return Ok(WaitOutcome::NoSuchChild);
        }
        for &pid in &candidates {
            if let Some(pcb) = self.processes.get(&pid) {
                if pcb.state == ProcessState::Zombied {
                    let status = pcb.exit_status;
                    let priority = pcb.priority;
                    let command = pcb.command.clone();
                    self.zombie.retain(|&p| p != pid);
                    self.get_mut(caller)?.children.retain(|&p| p != pid);
                    self.k_proc_cleanup(pid)?;
                    logger::log_event(self.quantum, Op::Waited, pid, priority, &command);
                    return Ok(WaitOutcome::Reaped(pid, status));
                }
            }
        }
        for &pid in &candidates {
            if let Some(pcb) = self.processes.get(&pid) {
                if pcb.state == ProcessState::Stopped {
                    return Ok(WaitOutcome::StoppedChild);
                }
            }
        }
        Ok(WaitOutcome::NeedsBlock)
    }

    /// `k_proc_exit` (spec.md §4.2): zombify, wake at most one matching
    /// waiter, and reparent every live child to init.
    pub fn k_proc_exit(&mut self, pid: Pid, status: ExitStatus) -> KResult<()> {
        if pid == INIT_PID {
            return Err(KError::TriedToKillInit);
        }
        let priority = self.get(pid)?.priority;
        let command = self.get(pid)?.command.clone();
        self.get_mut(pid)?.state = ProcessState::Zombied;
        self.get_mut(pid)?.exit_status = status;
        self.remove_from_active_queue(pid);
        self.zombie.push(pid);
        logger::log_event(self.quantum, Op::Zombie, pid, priority, &command);

        let mut woke = None;
        for &blocked_pid in &self.blocked.clone() {
            if blocked_pid == pid {
                continue;
            }
            let Some(waiter) = self.processes.get(&blocked_pid) else {
                continue;
            };
            let matches = match waiter.waited_child {
                Some(WaitTarget::Pid(target)) => target == pid,
                Some(WaitTarget::Any) => waiter.children.contains(&pid),
                None => false,
            };
            if matches {
                woke = Some(blocked_pid);
                break;
            }
        }
        if let Some(waiter_pid) = woke {
            if self.terminal_controlling_pid == Some(pid) {
                self.terminal_controlling_pid = Some(waiter_pid);
            }
            self.k_unblock_process(waiter_pid)?;
        }

        let children: Vec<Pid> = self.get(pid)?.children.clone();
        for child in children {
            if let Some(child_pcb) = self.processes.get_mut(&child) {
                child_pcb.ppid = INIT_PID;
            }
            if let Some(init_pcb) = self.processes.get_mut(&INIT_PID) {
                if !init_pcb.children.contains(&child) {
                    init_pcb.children.push(child);
                }
            }
            logger::log_event(self.quantum, Op::Orphan, child, priority, &command);
        }
        self.get_mut(pid)?.children.clear();

        Ok(())
    }

    /// `k_stop_process` (spec.md §4.2). Rejected for init.
    pub fn k_stop_process(&mut self, pid: Pid) -> KResult<()> {
        if pid == INIT_PID {
            return Err(KError::TriedToKillInit);
        }
        let pcb_state = self.get(pid)?.state;
        if pcb_state == ProcessState::Stopped {
            return Err(KError::StopStopped);
        }
        if pcb_state == ProcessState::Zombied {
            return Err(KError::StopNonActive);
        }
        let found = self.remove_from_active_queue(pid);
        if !found && self.current != Some(pid) {
            return Err(KError::StopNonActive);
        }
        self.get_mut(pid)?.state = ProcessState::Stopped;
        self.stopped.push(pid);
        let priority = self.get(pid)?.priority;
        let command = self.get(pid)?.command.clone();
        logger::log_event(self.quantum, Op::Stopped, pid, priority, &command);

        let ppid = self.get(pid)?.ppid;
        if let Some(parent) = self.processes.get(&ppid) {
            let waiting_for_this = match parent.waited_child {
                Some(WaitTarget::Pid(t)) => t == pid,
                Some(WaitTarget::Any) => true,
                None => false,
            };
            if waiting_for_this && self.blocked.contains(&ppid) {
                self.k_unblock_process(ppid)?;
            }
        }
        Ok(())
    }

    /// `k_continue_process` (spec.md §4.2).
    pub fn k_continue_process(&mut self, pid: Pid) -> KResult<()> {
        if self.get(pid)?.state != ProcessState::Stopped {
            return Err(KError::ContinueNonStopped);
        }
        self.stopped.retain(|&p| p != pid);
        let priority = self.get(pid)?.priority;
        self.get_mut(pid)?.state = ProcessState::Running;
        self.ready[priority as usize].push_back(pid);
        let command = self.get(pid)?.command.clone();
        logger::log_event(self.quantum, Op::Continued, pid, priority, &command);
        Ok(())
    }

    /// `k_set_priority`: updates the field; moves a ready PCB to its new
    /// queue's tail, leaves blocked/stopped PCBs' queue membership alone.
    pub fn k_set_priority(&mut self, pid: Pid, new_priority: Priority) -> KResult<()> {
        let old_priority = self.get(pid)?.priority;
        if old_priority == new_priority {
            return Ok(());
        }
        let moved = {
            let queue = &mut self.ready[old_priority as usize];
            if let Some(pos) = queue.iter().position(|&p| p == pid) {
                queue.remove(pos);
                true
            } else {
                false
            }
        };
        self.get_mut(pid)?.priority = new_priority;
        if moved {
            self.ready[new_priority as usize].push_back(pid);
        }
        let command = self.get(pid)?.command.clone();
        logger::log_nice(self.quantum, pid, old_priority, new_priority, &command);
        Ok(())
    }

    /// `tcsetpid`: succeeds only if the caller currently owns the terminal.
    pub fn k_tcsetpid(&mut self, caller: Pid, new_owner: Pid) -> KResult<()> {
        if self.terminal_controlling_pid != Some(caller) {
            return Err(KError::TcsetNoTerminalControl);
        }
        self.terminal_controlling_pid = Some(new_owner);
        Ok(())
    }

    pub fn owns_terminal(&self, pid: Pid) -> bool {
        self.terminal_controlling_pid == Some(pid)
    }

    pub fn k_logout(&mut self) {
        self.logout_requested = true;
    }

    /// Every live PCB is in exactly one of {ready×3, blocked, stopped,
    /// zombie, current} — checked by the invariant test in this module
    /// and usable by callers wanting a debug assertion.
    #[cfg(test)]
    fn queue_of(&self, pid: Pid) -> Option<&'static str> {
        for (i, q) in self.ready.iter().enumerate() {
            if q.contains(&pid) {
                return Some(["ready-high", "ready-medium", "ready-low"][i]);
            }
        }
        if self.blocked.contains(&pid) {
            return Some("blocked");
        }
        if self.stopped.contains(&pid) {
            return Some("stopped");
        }
        if self.zombie.contains(&pid) {
            return Some("zombie");
        }
        if self.current == Some(pid) {
            return Some("current");
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spawn_child(kernel: &mut Kernel, ppid: Pid, priority: Priority) -> Pid {
        let cap = OsThreadCap::start(|cap| {
            cap.suspend_self();
        });
        let pid = kernel
            .k_proc_create(ppid, priority, "child".to_string(), vec!["child".to_string()], cap)
            .unwrap();
        kernel.k_add_to_ready_queue(pid).unwrap();
        pid
    }

    #[test]
    fn fresh_kernel_has_only_init() {
        let (kernel, init) = Kernel::new();
        assert_eq!(init, INIT_PID);
        assert!(kernel.get(INIT_PID).is_ok());
    }

    #[test]
    fn pattern_has_nineteen_weighted_slots() {
        assert_eq!(PATTERN.len(), 19);
        let high = PATTERN.iter().filter(|&&p| p == 0).count();
        let medium = PATTERN.iter().filter(|&&p| p == 1).count();
        let low = PATTERN.iter().filter(|&&p| p == 2).count();
        assert_eq!((high, medium, low), (9, 6, 4));
    }

    #[test]
    fn orphaned_children_reparent_to_init() {
        let (mut kernel, init) = Kernel::new();
        let parent_cap = OsThreadCap::start(|cap| cap.suspend_self());
        let parent = kernel
            .k_proc_create(init, Priority::Medium, "parent".into(), vec!["parent".into()], parent_cap)
            .unwrap();
        kernel.k_add_to_ready_queue(parent).unwrap();
        let child = spawn_child(&mut kernel, parent, Priority::Medium);

        kernel.k_proc_exit(parent, ExitStatus::EXITED).unwrap();

        assert_eq!(kernel.get(child).unwrap().ppid, init);
        assert!(kernel.get(init).unwrap().children.contains(&child));
    }

    #[test]
    fn waitpid_reaps_zombie_child_and_clears_queue_membership() {
        let (mut kernel, init) = Kernel::new();
        let child = spawn_child(&mut kernel, init, Priority::Medium);
        kernel.remove_from_active_queue(child);
        kernel.k_proc_exit(child, ExitStatus::EXITED).unwrap();

        let outcome = kernel
            .k_waitpid_attempt(init, WaitTarget::Pid(child))
            .unwrap();
        match outcome {
            WaitOutcome::Reaped(pid, status) => {
                assert_eq!(pid, child);
                assert!(status.contains(ExitStatus::EXITED));
            }
            other => panic!("expected Reaped, got {other:?}"),
        }
        assert!(kernel.get(child).is_err());
    }

    #[test]
    fn every_live_pcb_is_in_exactly_one_queue() {
        let (mut kernel, init) = Kernel::new();
        let a = spawn_child(&mut kernel, init, Priority::High);
        let b = spawn_child(&mut kernel, init, Priority::Low);
        assert_eq!(kernel.queue_of(a), Some("ready-high"));
        assert_eq!(kernel.queue_of(b), Some("ready-low"));
    }
}
