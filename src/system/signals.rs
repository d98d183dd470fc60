// src/system/signals.rs

//! Process-wide shutdown bridge between the SIGCHLD handler, the console
//! listener thread and the relay loop.
//!
//! Everything reachable from [`on_child_exit`] is limited to atomics,
//! non-blocking `waitpid` and a single non-blocking `write`: no locks, no
//! allocation. The relay waits on the read end of the wake pipe, so a post
//! from any context interrupts its multiplex wait.

// sigaction() has no safe wrapper; the handler below only performs
// async-signal-safe operations.
#![allow(unsafe_code)]

use crate::models::ChildStatus;
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid;
use std::ffi::c_int;
use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::os::fd::{AsFd, BorrowedFd};
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SignalError {
    #[error("Error creating the shutdown wake pipe: {0}")]
    WakePipe(#[source] nix::Error),
    #[error("Error draining the shutdown wake pipe: {0}")]
    Drain(#[source] std::io::Error),
    #[error("sigaction() failed for {signal}: {source}")]
    Install {
        signal: Signal,
        #[source]
        source: nix::Error,
    },
    #[error("pthread_sigmask() failed: {0}")]
    Mask(#[source] nix::Error),
}

/// A sticky, cross-context wakeup.
///
/// Posting sets the flag and makes the wake descriptor readable. The flag
/// is not a counter and stays set until [`rearm`](Self::rearm) is called
/// before the next run.
#[derive(Debug)]
pub struct ShutdownSignal {
    posted: AtomicBool,
    wake_read: File,
    wake_write: File,
}

impl ShutdownSignal {
    pub fn new() -> Result<Self, SignalError> {
        let (read, write) = nix::unistd::pipe2(OFlag::O_CLOEXEC | OFlag::O_NONBLOCK)
            .map_err(SignalError::WakePipe)?;
        Ok(Self {
            posted: AtomicBool::new(false),
            wake_read: File::from(read),
            wake_write: File::from(write),
        })
    }

    /// Posts the signal. Async-signal-safe.
    pub fn post(&self) {
        if !self.posted.swap(true, Ordering::SeqCst) {
            // Non-blocking and written at most once per arm, so it cannot fill the pipe.
            let _ = (&self.wake_write).write(&[1]);
        }
    }

    pub fn is_posted(&self) -> bool {
        self.posted.load(Ordering::SeqCst)
    }

    /// Descriptor that becomes readable once the signal is posted.
    pub fn wake_fd(&self) -> BorrowedFd<'_> {
        self.wake_read.as_fd()
    }

    /// Clears the flag and drains the wake pipe.
    pub fn rearm(&self) -> Result<(), SignalError> {
        self.posted.store(false, Ordering::SeqCst);
        let mut scratch = [0u8; 64];
        loop {
            match (&self.wake_read).read(&mut scratch) {
                Ok(0) => return Ok(()),
                Ok(_) => continue,
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(SignalError::Drain(e)),
            }
        }
    }
}

/// Last reaped child, published with atomics so any context can record it.
///
/// Whoever reaps a child (the SIGCHLD handler, `terminate` or `reap`)
/// records its status here; a later wait that finds no such child reads it
/// back instead of losing the exit status.
///
/// The pid sits in the high half of a single word and the encoded status in
/// the low half, so a reader never pairs one child's pid with another's
/// status. Zero means nothing was recorded.
#[derive(Debug)]
pub struct ExitRecord {
    packed: AtomicU64,
}

fn pack(pid: Pid, encoded: c_int) -> u64 {
    let pid = u64::from(u32::from_ne_bytes(pid.as_raw().to_ne_bytes()));
    let status = u64::from(u32::from_ne_bytes(encoded.to_ne_bytes()));
    (pid << 32) | status
}

fn unpack(packed: u64) -> (i32, c_int) {
    let high = u32::try_from(packed >> 32).unwrap_or_default();
    let low = u32::try_from(packed & u64::from(u32::MAX)).unwrap_or_default();
    (i32::from_ne_bytes(high.to_ne_bytes()), c_int::from_ne_bytes(low.to_ne_bytes()))
}

impl ExitRecord {
    pub const fn new() -> Self {
        Self {
            packed: AtomicU64::new(0),
        }
    }

    /// Publishes `status` for `pid`. Async-signal-safe.
    pub fn record(&self, pid: Pid, status: ChildStatus) {
        let encoded = match status {
            ChildStatus::Exited(code) => code,
            ChildStatus::Signaled(signal) => -(signal as c_int),
        };
        self.packed.store(pack(pid, encoded), Ordering::SeqCst);
    }

    /// The recorded status of `pid`, if it was the last child reaped.
    pub fn lookup(&self, pid: Pid) -> Option<ChildStatus> {
        let (recorded, encoded) = unpack(self.packed.load(Ordering::SeqCst));
        if recorded == 0 || recorded != pid.as_raw() {
            return None;
        }
        if encoded >= 0 {
            Some(ChildStatus::Exited(encoded))
        } else {
            Signal::try_from(-encoded).ok().map(ChildStatus::Signaled)
        }
    }
}

impl Default for ExitRecord {
    fn default() -> Self {
        Self::new()
    }
}

static SHUTDOWN: OnceLock<ShutdownSignal> = OnceLock::new();
static EXITS: ExitRecord = ExitRecord::new();

/// The process-wide exit record shared with the SIGCHLD handler.
pub fn exit_record() -> &'static ExitRecord {
    &EXITS
}

/// Converts a wait status into a terminal [`ChildStatus`].
pub fn terminal_status(status: WaitStatus) -> Option<(Pid, ChildStatus)> {
    match status {
        WaitStatus::Exited(pid, code) => Some((pid, ChildStatus::Exited(code))),
        WaitStatus::Signaled(pid, signal, _) => Some((pid, ChildStatus::Signaled(signal))),
        _ => None,
    }
}

/// Reaps every child that has already terminated, without blocking.
/// Tolerates several exits folded into one SIGCHLD.
fn reap_exited_children(record: &ExitRecord) {
    loop {
        match waitpid(Option::<Pid>::None, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) | Err(_) => break,
            Ok(status) => {
                if let Some((pid, child_status)) = terminal_status(status) {
                    record.record(pid, child_status);
                }
            }
        }
    }
}

extern "C" fn on_child_exit(_signal: c_int) {
    let saved_errno = Errno::last_raw();
    reap_exited_children(&EXITS);
    if let Some(shutdown) = SHUTDOWN.get() {
        shutdown.post();
    }
    Errno::set_raw(saved_errno);
}

/// Installs the supervisor's signal handling and returns the armed
/// process-wide shutdown signal.
///
/// SIGPIPE is ignored so a vanished reader surfaces as `EPIPE`. SIGCHLD
/// reaps and posts the shutdown signal.
pub fn install() -> Result<&'static ShutdownSignal, SignalError> {
    let shutdown = match SHUTDOWN.get() {
        Some(existing) => existing,
        None => {
            let created = ShutdownSignal::new()?;
            // A concurrent installer may win the race; either value is usable.
            let _ = SHUTDOWN.set(created);
            SHUTDOWN.get().ok_or(SignalError::WakePipe(Errno::EAGAIN))?
        }
    };
    shutdown.rearm()?;

    let ignore = SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty());
    // SAFETY: SIG_IGN installs no code.
    let installed = unsafe { nix::sys::signal::sigaction(Signal::SIGPIPE, &ignore) };
    installed.map_err(|source| SignalError::Install {
        signal: Signal::SIGPIPE,
        source,
    })?;

    let on_exit = SigAction::new(
        SigHandler::Handler(on_child_exit),
        SaFlags::SA_RESTART | SaFlags::SA_NOCLDSTOP,
        SigSet::empty(),
    );
    // SAFETY: on_child_exit only calls waitpid(WNOHANG), atomics and write(2),
    // and preserves errno.
    let installed = unsafe { nix::sys::signal::sigaction(Signal::SIGCHLD, &on_exit) };
    installed.map_err(|source| SignalError::Install {
        signal: Signal::SIGCHLD,
        source,
    })?;

    log::debug!("Signal handlers installed");
    Ok(shutdown)
}

/// Blocks SIGCHLD in the calling thread until the returned guard drops.
///
/// Threads started while the guard is alive inherit the blocked mask.
pub fn block_child_exit() -> Result<scopeguard::ScopeGuard<SigSet, impl FnOnce(SigSet)>, SignalError> {
    let mut set = SigSet::empty();
    set.add(Signal::SIGCHLD);
    set.thread_block().map_err(SignalError::Mask)?;
    Ok(scopeguard::guard(set, |set| {
        if let Err(e) = set.thread_unblock() {
            log::warn!("Could not unblock SIGCHLD: {}", e);
        }
    }))
}

// MARK: --- UNIT TESTS ---

#[cfg(test)]
mod tests {
    use super::*;
    use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
    use std::sync::Arc;
    use std::thread;

    fn wake_readable(shutdown: &ShutdownSignal) -> bool {
        let mut fds = [PollFd::new(shutdown.wake_fd(), PollFlags::POLLIN)];
        poll(&mut fds, PollTimeout::ZERO).unwrap() == 1
    }

    #[test]
    fn test_post_is_sticky_and_rearm_clears() {
        let shutdown = ShutdownSignal::new().unwrap();
        assert!(!shutdown.is_posted());
        assert!(!wake_readable(&shutdown));

        shutdown.post();
        shutdown.post();
        assert!(shutdown.is_posted());
        assert!(wake_readable(&shutdown));
        // Observing does not consume it.
        assert!(wake_readable(&shutdown));

        shutdown.rearm().unwrap();
        assert!(!shutdown.is_posted());
        assert!(!wake_readable(&shutdown));
    }

    #[test]
    fn test_post_from_another_thread_wakes_poll() {
        let shutdown = Arc::new(ShutdownSignal::new().unwrap());
        let poster = Arc::clone(&shutdown);
        let handle = thread::spawn(move || poster.post());

        let mut fds = [PollFd::new(shutdown.wake_fd(), PollFlags::POLLIN)];
        let ready = poll(&mut fds, PollTimeout::from(5_000u16)).unwrap();
        handle.join().unwrap();

        assert_eq!(ready, 1);
        assert!(shutdown.is_posted());
    }

    #[test]
    fn test_exit_record_round_trips_both_kinds() {
        let record = ExitRecord::new();
        let pid = Pid::from_raw(4242);
        assert_eq!(record.lookup(pid), None);

        record.record(pid, ChildStatus::Exited(3));
        assert_eq!(record.lookup(pid), Some(ChildStatus::Exited(3)));
        assert_eq!(record.lookup(Pid::from_raw(4243)), None);

        record.record(pid, ChildStatus::Signaled(Signal::SIGTERM));
        assert_eq!(record.lookup(pid), Some(ChildStatus::Signaled(Signal::SIGTERM)));
    }

    #[test]
    fn test_exit_record_never_mixes_two_children() {
        // --- Setup ---
        let record = Arc::new(ExitRecord::new());
        let first = Pid::from_raw(1001);
        let second = Pid::from_raw(1002);
        let done = Arc::new(AtomicBool::new(false));

        let writers: Vec<_> = [(first, 1), (second, 2)]
            .into_iter()
            .map(|(pid, code)| {
                let record = Arc::clone(&record);
                let done = Arc::clone(&done);
                thread::spawn(move || {
                    while !done.load(Ordering::SeqCst) {
                        record.record(pid, ChildStatus::Exited(code));
                    }
                })
            })
            .collect();

        // --- Execute / Assert ---
        for _ in 0..200_000 {
            if let Some(status) = record.lookup(first) {
                assert_eq!(status, ChildStatus::Exited(1));
            }
            if let Some(status) = record.lookup(second) {
                assert_eq!(status, ChildStatus::Exited(2));
            }
        }
        done.store(true, Ordering::SeqCst);
        for writer in writers {
            writer.join().unwrap();
        }
    }

    #[test]
    fn test_exit_record_handles_largest_pid_and_signal_status() {
        let record = ExitRecord::new();
        let pid = Pid::from_raw(i32::MAX);
        record.record(pid, ChildStatus::Exited(255));
        assert_eq!(record.lookup(pid), Some(ChildStatus::Exited(255)));

        record.record(pid, ChildStatus::Signaled(Signal::SIGKILL));
        assert_eq!(record.lookup(pid), Some(ChildStatus::Signaled(Signal::SIGKILL)));
        assert_eq!(record.lookup(Pid::from_raw(0)), None);
    }

    #[test]
    fn test_terminal_status_ignores_non_terminal_states() {
        let pid = Pid::from_raw(7);
        assert_eq!(
            terminal_status(WaitStatus::Exited(pid, 0)),
            Some((pid, ChildStatus::Exited(0)))
        );
        assert_eq!(terminal_status(WaitStatus::StillAlive), None);
        assert_eq!(terminal_status(WaitStatus::Stopped(pid, Signal::SIGSTOP)), None);
    }
}
