// src/system/launcher.rs

use crate::models::ChildStatus;
use crate::system::signals::terminal_status;
use nix::errno::Errno;
use nix::sys::signal::{Signal, killpg};
use nix::sys::wait::waitpid;
use nix::unistd::Pid;
use std::fmt;
use std::os::fd::OwnedFd;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("Program '{0}' was not found on the child's PATH")]
    NotFound(String),
    #[error("Spawn failed running program '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Spawned program '{0}' reported no usable process id")]
    NoPid(String),
    #[error("kill() failed for process group {pgid} with {signal}: {source}")]
    Signal {
        pgid: Pid,
        signal: Signal,
        #[source]
        source: Errno,
    },
    #[error("waitpid() failed for {pid}: {source}")]
    Wait {
        pid: Pid,
        #[source]
        source: Errno,
    },
}

/// The child's three standard descriptors, in fd order 0, 1, 2.
#[derive(Debug)]
pub struct ChildStdio {
    pub stdin: OwnedFd,
    pub stdout: OwnedFd,
    pub stderr: OwnedFd,
}

/// Everything a launcher needs to start the child.
#[derive(Debug)]
pub struct SpawnRequest {
    /// Program to execute. Resolved against the `PATH` in `env` when it has no `/`.
    pub program: String,
    /// Full argument vector, including `argv[0]`.
    pub argv: Vec<String>,
    /// Resolved environment; nothing is inherited from the supervisor.
    pub env: Vec<(String, String)>,
    pub stdio: ChildStdio,
    /// Start the child as leader of a new process group.
    pub new_process_group: bool,
}

/// Narrow platform seam for starting, signalling and waiting on the child.
pub trait Launcher: Send + Sync + fmt::Debug {
    /// Starts the child and returns its process id.
    fn spawn(&self, request: SpawnRequest) -> Result<Pid, LaunchError>;

    /// Sends `signal` to every process in the group led by `pgid`.
    fn signal_group(&self, pgid: Pid, signal: Signal) -> Result<(), LaunchError>;

    /// Blocks until `pid` terminates. `Ok(None)` means there is no such child
    /// any more because something else already reaped it.
    fn wait(&self, pid: Pid) -> Result<Option<ChildStatus>, LaunchError>;
}

/// [`Launcher`] backed by `posix_spawn`/`fork`+`exec`, `killpg` and `waitpid`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PosixLauncher;

impl Launcher for PosixLauncher {
    fn spawn(&self, request: SpawnRequest) -> Result<Pid, LaunchError> {
        let path_var = request
            .env
            .iter()
            .rev()
            .find(|(key, _)| key == "PATH")
            .map(|(_, value)| value.as_str());
        let executable = resolve_program(&request.program, path_var)
            .ok_or_else(|| LaunchError::NotFound(request.program.clone()))?;
        log::debug!(
            "Resolved program '{}' to {}",
            request.program,
            executable.display()
        );

        let mut command = Command::new(&executable);
        if let Some((argv0, args)) = request.argv.split_first() {
            command.arg0(argv0).args(args);
        }
        command
            .env_clear()
            .envs(request.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::from(request.stdio.stdin))
            .stdout(Stdio::from(request.stdio.stdout))
            .stderr(Stdio::from(request.stdio.stderr));
        if request.new_process_group {
            command.process_group(0);
        }

        // The Command (and with it the parent's copies of the child's
        // descriptors) is dropped at the end of this function.
        let child = command.spawn().map_err(|source| LaunchError::Spawn {
            program: request.program.clone(),
            source,
        })?;
        let raw_pid =
            i32::try_from(child.id()).map_err(|_| LaunchError::NoPid(request.program.clone()))?;
        Ok(Pid::from_raw(raw_pid))
    }

    fn signal_group(&self, pgid: Pid, signal: Signal) -> Result<(), LaunchError> {
        killpg(pgid, signal).map_err(|source| LaunchError::Signal {
            pgid,
            signal,
            source,
        })
    }

    fn wait(&self, pid: Pid) -> Result<Option<ChildStatus>, LaunchError> {
        loop {
            match waitpid(pid, None) {
                Ok(status) => {
                    if let Some((_, child_status)) = terminal_status(status) {
                        return Ok(Some(child_status));
                    }
                }
                Err(Errno::EINTR) => continue,
                Err(Errno::ECHILD) => return Ok(None),
                Err(source) => return Err(LaunchError::Wait { pid, source }),
            }
        }
    }
}

/// Resolves `program` the way `spawnp` does: names containing `/` are used
/// as given, bare names are searched for in `path_var`.
pub fn resolve_program(program: &str, path_var: Option<&str>) -> Option<PathBuf> {
    if program.is_empty() {
        return None;
    }
    if program.contains('/') {
        return Some(PathBuf::from(program));
    }
    path_var?
        .split(':')
        .filter(|dir| !dir.is_empty())
        .map(|dir| Path::new(dir).join(program))
        .find(|candidate| is_executable(candidate))
}

fn is_executable(path: &Path) -> bool {
    path.metadata()
        .is_ok_and(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
}

// MARK: --- UNIT TESTS ---
