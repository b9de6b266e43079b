//! `pennos` binary entry point.
//!
//! Grounded on the teacher's `_start`'s init sequence (bring up each
//! subsystem in order, then hand off to a run loop) translated to a
//! hosted `fn main`: mount the FAT image, build the scheduler, spawn
//! init's thread, spawn the shell from within init, then drive the
//! quantum loop until logout.

mod cli;

use std::time::Duration;

use clap::Parser;
use pennos::fs::Fs;
use pennos::scheduler::pcb::{Priority, INIT_PID};
use pennos::scheduler::System;
use pennos::shell::shell_entry;
use pennos::syscalls::{self, ProcHandle};
use pennos::threadcap::{OsThreadCap, Timer};
use pennos::{logger, scheduler};

fn init_entry(handle: &ProcHandle) {
    handle.s_spawn(shell_entry, vec!["shell".to_string()], Priority::Medium);
    loop {
        let mut status = 0u32;
        let pid = handle.s_waitpid(-1, &mut status, false);
        if pid == -1 {
            handle.s_sleep(1);
        }
    }
}

fn run() -> anyhow::Result<()> {
    let args = cli::Args::parse();
    logger::init(args.log_file.as_deref())?;

    let fs = Fs::mount(&args.fat_image)
        .map_err(|e| anyhow::anyhow!("failed to mount {:?}: {e}", args.fat_image))?;
    let (system, init_pid) = System::new(fs);
    debug_assert_eq!(init_pid, INIT_PID);

    let system_for_thread = system.clone();
    let cap = OsThreadCap::start(move |cap| {
        let handle = syscalls::init_handle(&system_for_thread, init_pid, cap);
        init_entry(&handle);
    });
    {
        let mut sys = system.lock().unwrap();
        sys.kernel
            .get_mut(init_pid)
            .map_err(|e| anyhow::anyhow!("scheduler init failed: {e}"))?
            .thread = Some(cap);
        sys.kernel
            .k_add_to_ready_queue(init_pid)
            .map_err(|e| anyhow::anyhow!("scheduler init failed: {e}"))?;
    }

    let timer = Timer::start(Duration::from_millis(100));
    scheduler::run(system, &timer);
    Ok(())
}

fn main() {
    if let Err(err) = run() {
        eprintln!("pennos: {err}");
        std::process::exit(1);
    }
}
