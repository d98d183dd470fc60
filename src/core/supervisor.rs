// src/core/supervisor.rs

//! The main sequence: open datasets, build pipes and environment, install
//! signal handling, start the console listener, spawn the child, relay,
//! then reap and map the exit status.

use crate::constants::{DD_STDENV, DD_STDERR, DD_STDIN, DD_STDOUT, DD_SYSOUT, RELAY_BUFFER_SIZE};
use crate::core::config::Config;
use crate::core::console::{Console, OperatorConsole, spawn_listener};
use crate::core::relay::{OutputRoutes, Relay, RelayPipes};
use crate::models::StopPolicy;
use crate::system::dataset::{Dataset, DatasetStream, OpenMode};
use crate::system::environment::{Account, build_environment};
use crate::system::launcher::{ChildStdio, Launcher, PosixLauncher};
use crate::system::lifecycle::ChildLifecycle;
use crate::system::pipe::{Pipe, PipeEnd};
use crate::system::signals;
use anyhow::{Context, Result};
use nix::sys::signal::Signal;
use std::path::PathBuf;
use std::sync::Arc;

/// Everything that shapes one run, after the command line and the config
/// file have been merged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Program followed by its arguments. Empty means the login shell.
    pub program: Vec<String>,
    pub disable_console: bool,
    pub console_path: Option<PathBuf>,
    pub stop_policy: StopPolicy,
    pub buffer_size: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            program: Vec::new(),
            disable_console: false,
            console_path: None,
            stop_policy: StopPolicy::default(),
            buffer_size: RELAY_BUFFER_SIZE,
        }
    }
}

/// Runs the job with the operator console named in `options`.
pub fn run(options: &RunOptions, config: &Config) -> Result<i32> {
    let console = open_console(options)?;
    run_with_launcher(options, config, console, Arc::new(PosixLauncher))
}

/// Runs the job, taking operator commands from `console`.
pub fn run_with_console(
    options: &RunOptions,
    config: &Config,
    console: Box<dyn Console + Send>,
) -> Result<i32> {
    run_with_launcher(options, config, Some(console), Arc::new(PosixLauncher))
}

/// Runs the job against an explicit [`Launcher`]. Without a console no
/// listener thread is started.
pub fn run_with_launcher(
    options: &RunOptions,
    config: &Config,
    console: Option<Box<dyn Console + Send>>,
    launcher: Arc<dyn Launcher>,
) -> Result<i32> {
    // --- Datasets ---
    let sysout = open_sysout(config)?;
    let input = open_optional(config, DD_STDIN, OpenMode::Read)?;
    let stdout = open_optional(config, DD_STDOUT, OpenMode::Write)?;
    let stderr = open_optional(config, DD_STDERR, OpenMode::Write)?;
    let mut stdenv = open_optional(config, DD_STDENV, OpenMode::Read)?;

    // --- Pipes ---
    let (pipes, stdio) = create_pipes()?;

    // --- Signals and environment ---
    let shutdown = signals::install().context("Error installing signal handlers")?;
    let account = Account::current().context("Error looking up the invoking account")?;
    let stdenv_text = stdenv
        .read_to_string()
        .context("Error reading the STDENV dataset")?;
    stdenv.close().context("Error closing the STDENV dataset")?;
    let env = build_environment(&account, stdenv_text.as_deref());
    if !env.shares_address_space() {
        log::debug!("Child will not share the supervisor's address space");
    }

    // --- Listener and child ---
    let lifecycle = ChildLifecycle::new(launcher, signals::exit_record());
    let pid = {
        let _blocked = signals::block_child_exit().context("Error blocking SIGCHLD")?;
        match console {
            Some(_) if options.disable_console => {
                log::debug!("Operator console commands are disabled");
            }
            Some(console) => {
                spawn_listener(console, lifecycle.terminate_handle())
                    .context("Error starting the console listener")?;
            }
            None => log::debug!("No operator console configured; not listening"),
        }
        lifecycle
            .spawn(&options.program, &account, &env, stdio)
            .context("Error spawning the child program")?
    };

    // --- Relay ---
    let outputs = OutputRoutes::new(stdout, stderr, sysout);
    let mut relay = Relay::new(pipes, input, outputs, shutdown)
        .with_policy(options.stop_policy)
        .with_buffer_size(options.buffer_size);
    if let Err(e) = relay.run() {
        log::error!("I/O relay failed: {}", e);
        if let Err(term) = lifecycle.terminate(pid, Signal::SIGTERM) {
            log::warn!("Could not terminate child {}: {}", pid, term);
        }
        return Err(e).context("Error relaying child I/O");
    }
    let (_, mut input, mut outputs) = relay.into_parts();

    // --- Teardown ---
    let code = lifecycle.reap(pid).context("Error reaping the child")?;
    input.close().context("Error closing the input dataset")?;
    outputs
        .close_all()
        .context("Error closing the output datasets")?;
    log::info!("Job ended with return code {}", code);
    Ok(code)
}

/// The console to listen on, or `None` when commands are disabled or no
/// console path is configured.
fn open_console(options: &RunOptions) -> Result<Option<Box<dyn Console + Send>>> {
    if options.disable_console {
        return Ok(None);
    }
    let Some(path) = &options.console_path else {
        return Ok(None);
    };
    let console = OperatorConsole::open(path).context("Error opening the operator console")?;
    Ok(Some(Box::new(console)))
}

/// SYSOUT is optional; when it is not allocated it is routed to the
/// supervisor's own standard output.
fn open_sysout(config: &Config) -> Result<Dataset> {
    let sysout = open_optional(config, DD_SYSOUT, OpenMode::Write)?;
    if sysout.is_open() {
        return Ok(sysout);
    }
    log::debug!("DD {} not allocated; using standard output", DD_SYSOUT);
    Dataset::from_stdout(DD_SYSOUT).context("Error allocating SYSOUT")
}

fn open_optional(config: &Config, name: &str, mode: OpenMode) -> Result<Dataset> {
    let path = config
        .dataset_path(name)
        .with_context(|| format!("Error resolving DD {}", name))?;
    Dataset::open(name, path.as_deref(), mode, false)
        .with_context(|| format!("Error opening DD {}", name))
}

/// Creates the three pipes and splits off the child's ends. The parent
/// keeps only the stdin write end and the stdout/stderr read ends.
fn create_pipes() -> Result<(RelayPipes, ChildStdio)> {
    let mut pipes = RelayPipes {
        stdin: Pipe::new().context("Error creating the stdin pipe")?,
        stdout: Pipe::new().context("Error creating the stdout pipe")?,
        stderr: Pipe::new().context("Error creating the stderr pipe")?,
    };
    let stdio = ChildStdio {
        stdin: pipes.stdin.duplicate(PipeEnd::Read)?,
        stdout: pipes.stdout.duplicate(PipeEnd::Write)?,
        stderr: pipes.stderr.duplicate(PipeEnd::Write)?,
    };
    pipes.stdin.close_read();
    pipes.stdout.close_write();
    pipes.stderr.close_write();
    Ok((pipes, stdio))
}

// MARK: --- UNIT TESTS ---
