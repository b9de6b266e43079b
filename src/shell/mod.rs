//! A thin line-reading REPL, present only so `cargo run` produces a
//! usable binary — the shell's parser, job control, and built-in set are
//! out of scope per spec.md §1; this is a minimal pass-through consumer
//! of the syscall surface, not a tested component.
//!
//! Grounded on the teacher's `shell::exec_command` dispatch shape
//! (split on whitespace, match the first token), trimmed to the handful
//! of built-ins needed to exercise the syscalls end to end.

use crate::fs::dentry::Perm;
use crate::fs::fd::OpenMode;
use crate::syscalls::ProcHandle;

/// The init-spawned shell process entry point.
pub fn shell_entry(handle: &ProcHandle) {
    loop {
        handle.s_write(crate::fs::fd::STDOUT_FD, b"pennos$ ");
        let mut buf = [0u8; 1024];
        let n = handle.s_read(crate::fs::fd::STDIN_FD, &mut buf);
        if n <= 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf[..n as usize]);
        if !exec_command(handle, line.trim()) {
            break;
        }
    }
    handle.s_exit(0);
}

/// Runs one line; returns `false` if the shell should stop (an `exit`
/// built-in or a logout).
fn exec_command(handle: &ProcHandle, line: &str) -> bool {
    if line.is_empty() {
        return true;
    }
    let mut parts = line.splitn(2, ' ');
    let cmd = parts.next().unwrap_or("");
    let args = parts.next().unwrap_or("").trim();

    match cmd {
        "exit" => return false,
        "logout" => {
            handle.s_logout();
            return false;
        }
        "ls" => {
            if let Some(listing) = handle.s_ls() {
                handle.s_write(crate::fs::fd::STDOUT_FD, listing.as_bytes());
            }
        }
        "cat" => {
            let fd = handle.s_open(args, OpenMode::Read);
            if fd >= 0 {
                let mut buf = [0u8; 4096];
                loop {
                    let n = handle.s_read(fd, &mut buf);
                    if n <= 0 {
                        break;
                    }
                    handle.s_write(crate::fs::fd::STDOUT_FD, &buf[..n as usize]);
                }
                handle.s_close(fd);
            } else {
                handle.s_write(
                    crate::fs::fd::STDERR_FD,
                    format!("cat: {args}: No such file or directory\n").as_bytes(),
                );
            }
        }
        "touch" => {
            let fd = handle.s_open(args, OpenMode::Write);
            if fd >= 0 {
                handle.s_close(fd);
            }
        }
        "chmod" => {
            let mut it = args.splitn(2, ' ');
            if let (Some(bits_str), Some(name)) = (it.next(), it.next()) {
                if let Ok(bits) = bits_str.parse::<u8>() {
                    handle.s_chmod(
                        name,
                        crate::fs::syscalls::ChmodOp::Set,
                        Perm::from_bits_truncate(bits),
                    );
                }
            }
        }
        "rm" => {
            handle.s_unlink(args);
        }
        "help" => {
            handle.s_write(
                crate::fs::fd::STDOUT_FD,
                b"builtins: ls cat touch chmod rm exit logout\n",
            );
        }
        _ => {
            handle.s_write(
                crate::fs::fd::STDERR_FD,
                format!("{cmd}: command not found\n").as_bytes(),
            );
        }
    }
    true
}
