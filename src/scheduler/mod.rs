//! The scheduler subsystem: [`kernel::Kernel`] (pure queue/PCB logic) plus
//! the glue that drives it against real `OsThreadCap` threads and a timer.
//!
//! Grounded on the teacher's `scheduler::Scheduler`/`yield_now` driving
//! loop (lock the scheduler, pick a task, context-switch, repeat),
//! translated from a raw context switch to `OsThreadCap::resume`/
//! `suspend` around a `Timer::wait_for_tick`.

pub mod kernel;
pub mod pcb;

use std::sync::{Arc, Mutex};

use crate::fs::Fs;
use crate::threadcap::Timer;

/// All state a running PennOS instance needs: the scheduler core plus
/// the mounted filesystem, guarded by one mutex since only ever one PCB's
/// thread (or the scheduler loop) touches it at a time (spec.md §5).
pub struct System {
    pub kernel: kernel::Kernel,
    pub fs: Fs,
}

pub type SharedSystem = Arc<Mutex<System>>;

impl System {
    pub fn new(fs: Fs) -> (SharedSystem, pcb::Pid) {
        let (kernel, init) = kernel::Kernel::new();
        (Arc::new(Mutex::new(System { kernel, fs })), init)
    }
}

/// Drives the quantum loop until logout (spec.md §4.2/§2). Each tick:
/// advance sleepers and pick a PCB (`begin_quantum`), resume its thread,
/// wait for the timer, suspend it again, then run the post-quantum queue
/// move (`end_quantum`).
pub fn run(system: SharedSystem, timer: &Timer) {
    loop {
        let logout = system.lock().unwrap().kernel.is_logout_requested();
        if logout {
            break;
        }

        let picked = system.lock().unwrap().kernel.begin_quantum();
        match picked {
            None => {
                timer.wait_for_tick();
            }
            Some(pid) => {
                let cap = {
                    let sys = system.lock().unwrap();
                    sys.kernel.get(pid).ok().and_then(|p| p.thread.clone())
                };
                if let Some(cap) = cap {
                    cap.resume();
                    timer.wait_for_tick();
                    cap.suspend();
                } else {
                    timer.wait_for_tick();
                }
                system.lock().unwrap().kernel.end_quantum(pid);
            }
        }
    }
}
