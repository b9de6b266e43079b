//! The cooperative-thread primitive (§4.1).
//!
//! Treated as an external capability: the scheduler never looks inside a
//! [`ThreadCap`], it only calls the five operations below. [`OsThreadCap`]
//! is the one concrete implementation provided so the crate is runnable;
//! it backs each PennOS "process" with a real `std::thread` gated by a
//! run-state condvar instead of the teacher's raw register context switch.

use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

/// What the scheduler wants the backing thread to be doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    /// Not yet started.
    NotStarted,
    /// Free to run until the next tick.
    Runnable,
    /// Must block at its next safe point and wait to be made `Runnable` again.
    Suspended,
    /// Has returned from its entry function.
    Exited,
}

struct Shared {
    state: Mutex<RunState>,
    cond: Condvar,
}

/// Panic payload used by [`OsThreadCap::exit`] to unwind a thread without
/// treating it as a genuine panic.
struct ThreadExit;

impl Shared {
    fn wait_until_runnable(&self) {
        let mut guard = self.state.lock().unwrap();
        while *guard == RunState::Suspended {
            guard = self.cond.wait(guard).unwrap();
        }
    }
}

/// The handle the scheduler holds for one cooperative thread.
///
/// Cloning an `OsThreadCap` shares the same underlying thread; the
/// scheduler keeps exactly one clone per PCB and the entry closure keeps
/// the other to call [`OsThreadCap::suspend_self`].
#[derive(Clone)]
pub struct OsThreadCap {
    shared: Arc<Shared>,
    handle: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl OsThreadCap {
    /// `start(fn, arg)`: spawn a thread, immediately runnable but blocked
    /// on the run-state condvar until the scheduler's first `resume`.
    pub fn start<F>(entry: F) -> Self
    where
        F: FnOnce(OsThreadCap) + Send + 'static,
    {
        let shared = Arc::new(Shared {
            state: Mutex::new(RunState::Suspended),
            cond: Condvar::new(),
        });
        let cap = OsThreadCap {
            shared: shared.clone(),
            handle: Arc::new(Mutex::new(None)),
        };
        let cap_for_thread = cap.clone();
        let handle = std::thread::spawn(move || {
            shared.wait_until_runnable();
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                entry(cap_for_thread.clone());
            }));
            *cap_for_thread.shared.state.lock().unwrap() = RunState::Exited;
            cap_for_thread.shared.cond.notify_all();
            if let Err(payload) = result {
                if payload.downcast_ref::<ThreadExit>().is_none() {
                    std::panic::resume_unwind(payload);
                }
            }
        });
        *cap.handle.lock().unwrap() = Some(handle);
        cap
    }

    /// `continue(cap)`: resume the thread; it runs until it next calls
    /// `suspend_self` or exits. Does not block the caller.
    pub fn resume(&self) {
        let mut guard = self.shared.state.lock().unwrap();
        if *guard != RunState::Exited {
            *guard = RunState::Runnable;
            self.shared.cond.notify_all();
        }
    }

    /// `suspend(cap)`: called by the scheduler from outside the thread.
    /// Blocks until the thread reaches a safe point (calls
    /// `suspend_self`) or exits. Returns `true` if the thread has
    /// terminated.
    pub fn suspend(&self) -> bool {
        loop {
            let guard = self.shared.state.lock().unwrap();
            match *guard {
                RunState::Exited => return true,
                RunState::Suspended => return false,
                RunState::Runnable | RunState::NotStarted => {
                    drop(guard);
                    std::thread::yield_now();
                }
            }
        }
    }

    /// `suspend_self()`: called from within the thread to yield control
    /// back to the scheduler until it is next resumed.
    pub fn suspend_self(&self) {
        let mut guard = self.shared.state.lock().unwrap();
        *guard = RunState::Suspended;
        self.shared.cond.notify_all();
        while *guard == RunState::Suspended {
            guard = self.shared.cond.wait(guard).unwrap();
        }
    }

    /// `exit(result)`: terminates the calling thread by unwinding back to
    /// the thread body installed in `start`, which treats this specific
    /// payload as a normal exit rather than a panic. Joins are left to
    /// `Drop`/explicit `join()` by the scheduler when it reaps the PCB.
    pub fn exit(&self) -> ! {
        std::panic::panic_any(ThreadExit)
    }

    pub fn has_exited(&self) -> bool {
        *self.shared.state.lock().unwrap() == RunState::Exited
    }

    pub fn join(&self) {
        if let Some(handle) = self.handle.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

/// Dedicated timer thread: a 100ms sleep loop that flips an `AtomicBool`
/// tick flag and notifies a condvar the scheduler loop owns — the host
/// signal handler touches nothing else, per §5.
pub struct Timer {
    pair: Arc<(Mutex<bool>, Condvar)>,
    _handle: JoinHandle<()>,
}

impl Timer {
    pub fn start(period: std::time::Duration) -> Self {
        let pair = Arc::new((Mutex::new(false), Condvar::new()));
        let pair2 = pair.clone();
        let handle = std::thread::spawn(move || loop {
            std::thread::sleep(period);
            let (lock, cond) = &*pair2;
            let mut tick = lock.lock().unwrap();
            *tick = true;
            cond.notify_all();
        });
        Timer {
            pair,
            _handle: handle,
        }
    }

    /// Block until the next tick fires, then clear the flag.
    pub fn wait_for_tick(&self) {
        let (lock, cond) = &*self.pair;
        let mut tick = lock.lock().unwrap();
        while !*tick {
            tick = cond.wait(tick).unwrap();
        }
        *tick = false;
    }
}
