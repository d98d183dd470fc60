// src/system/lifecycle.rs

use crate::models::ChildStatus;
use crate::system::environment::{Account, EnvironmentList};
use crate::system::launcher::{ChildStdio, LaunchError, Launcher, SpawnRequest};
use crate::system::signals::ExitRecord;
use nix::errno::Errno;
use nix::sys::signal::Signal;
use nix::unistd::Pid;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error(transparent)]
    Launch(#[from] LaunchError),
    #[error("Exit status of child {0} is unavailable: it was reaped elsewhere and not recorded")]
    StatusUnavailable(Pid),
}

/// Maps a child's terminal state to the supervisor's return code.
///
/// An operator STOP is an intended outcome, so termination by SIGTERM
/// (whether reported as the signal or as the shell's `128 + 15`) maps to 0.
///
/// Death by any other signal is not reported as success: it maps to
/// `128 + n`, the code a shell gives a child killed by signal `n`.
pub fn normalize_exit_code(status: ChildStatus) -> i32 {
    const SIGTERM_EXIT: i32 = 128 + Signal::SIGTERM as i32;
    match status {
        ChildStatus::Exited(SIGTERM_EXIT) => 0,
        ChildStatus::Exited(code) => code,
        ChildStatus::Signaled(Signal::SIGTERM) => 0,
        ChildStatus::Signaled(signal) => 128 + signal as i32,
    }
}

/// Owns the single child: spawns it, terminates its process group on
/// request and reaps it.
///
/// Clones share the tracked child id, which is only ever written with
/// atomics. Explicit waits are serialised so that of two blocking waits on
/// the same child, the loser can find the winner's recorded status.
#[derive(Debug, Clone)]
pub struct ChildLifecycle {
    launcher: Arc<dyn Launcher>,
    exits: &'static ExitRecord,
    child: Arc<AtomicI32>,
    wait_lock: Arc<Mutex<()>>,
}

impl ChildLifecycle {
    pub fn new(launcher: Arc<dyn Launcher>, exits: &'static ExitRecord) -> Self {
        Self {
            launcher,
            exits,
            child: Arc::new(AtomicI32::new(0)),
            wait_lock: Arc::new(Mutex::new(())),
        }
    }

    /// The tracked child, once spawned.
    pub fn child(&self) -> Option<Pid> {
        match self.child.load(Ordering::SeqCst) {
            0 => None,
            raw => Some(Pid::from_raw(raw)),
        }
    }

    /// Spawns `program` (name followed by its arguments) in a new process
    /// group. With no program, spawns the account's login shell with a
    /// leading hyphen on `argv[0]`.
    pub fn spawn(
        &self,
        program: &[String],
        account: &Account,
        env: &EnvironmentList,
        stdio: ChildStdio,
    ) -> Result<Pid, LifecycleError> {
        let (name, argv) = match program.first() {
            Some(name) => {
                log::debug!("Running program {}", name);
                (name.clone(), program.to_vec())
            }
            None => {
                log::debug!("No program specified; spawning login shell");
                let shell = account.shell.display().to_string();
                let login_argv0 = format!("-{}", shell);
                (shell, vec![login_argv0])
            }
        };

        let pid = self.launcher.spawn(SpawnRequest {
            program: name,
            argv,
            env: env.pairs(),
            stdio,
            new_process_group: true,
        })?;
        self.child.store(pid.as_raw(), Ordering::SeqCst);
        log::debug!("Spawned child {}", pid);
        Ok(pid)
    }

    /// Sends `signal` to the child's whole process group, then waits for the
    /// child itself. A group that is already gone, or a child that was
    /// already reaped, is not an error.
    pub fn terminate(&self, pid: Pid, signal: Signal) -> Result<(), LifecycleError> {
        log::debug!("Sending signal {} to process group {}", signal, pid);
        match self.launcher.signal_group(pid, signal) {
            Ok(()) => {}
            Err(LaunchError::Signal {
                source: Errno::ESRCH,
                ..
            }) => {
                log::debug!("Process group {} already exited", pid);
            }
            Err(e) => return Err(e.into()),
        }

        let _serialised = self.wait_lock.lock().unwrap_or_else(PoisonError::into_inner);
        match self.launcher.wait(pid)? {
            Some(status) => {
                log::debug!("Child {} terminated: {:?}", pid, status);
                self.exits.record(pid, status);
            }
            None => log::debug!("Child {} was already reaped", pid),
        }
        Ok(())
    }

    /// Blocks until the child has terminated and returns its normalized exit code.
    pub fn reap(&self, pid: Pid) -> Result<i32, LifecycleError> {
        let status = {
            let _serialised = self.wait_lock.lock().unwrap_or_else(PoisonError::into_inner);
            match self.launcher.wait(pid)? {
                Some(status) => {
                    self.exits.record(pid, status);
                    status
                }
                None => self
                    .exits
                    .lookup(pid)
                    .ok_or(LifecycleError::StatusUnavailable(pid))?,
            }
        };

        let code = normalize_exit_code(status);
        log::debug!("Child {} ended with {:?}, return code {}", pid, status, code);
        Ok(code)
    }

    /// A handle the console listener uses to request termination.
    pub fn terminate_handle(&self) -> TerminateHandle {
        TerminateHandle {
            lifecycle: self.clone(),
        }
    }
}

/// A request from outside the main thread to end the child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminateRequest {
    pub signal: Signal,
}

/// The one capability the console listener holds over the child.
///
/// [`send`](Self::send) serves the request synchronously on the calling
/// thread: it resolves the tracked child, signals its process group and
/// blocks until the child is reaped. The caller never sees or picks a pid.
#[derive(Debug, Clone)]
pub struct TerminateHandle {
    lifecycle: ChildLifecycle,
}

impl TerminateHandle {
    /// Serves `request` against the tracked child. Returns `Ok(false)` when
    /// no child has been spawned yet.
    pub fn send(&self, request: TerminateRequest) -> Result<bool, LifecycleError> {
        match self.lifecycle.child() {
            Some(pid) => self.lifecycle.terminate(pid, request.signal).map(|()| true),
            None => {
                log::warn!("Termination requested before the child was spawned");
                Ok(false)
            }
        }
    }
}

// MARK: --- UNIT TESTS ---
