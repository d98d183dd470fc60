// src/cli.rs

use crate::core::config::{Config, ConfigError};
use crate::core::supervisor::RunOptions;
use crate::models::StopPolicy;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// rktbatch: run a program as a batch job step.
///
/// The child's stdin is fed from the STDIN dataset and its stdout and
/// stderr are copied to the STDOUT and STDERR datasets, each falling back to
/// SYSOUT when not allocated. A DD name is allocated with the `DD_<NAME>`
/// environment variable or in the `[datasets]` table of the config file.
///
/// With no PROGRAM, the account's login shell is started instead.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Do not listen for operator console commands.
    #[arg(long)]
    pub disable_console_commands: bool,

    /// Default log level. `RUST_LOG` takes precedence when set.
    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    /// TOML config file. Defaults to the file named by `RKTBATCH_CONFIG`.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// FIFO or file to read operator commands from.
    #[arg(long)]
    pub console: Option<PathBuf>,

    /// After the child exits, keep copying output until every descendant
    /// has closed it.
    #[arg(long)]
    pub drain_on_exit: bool,

    /// Program to run, followed by its arguments.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub program: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Self::Trace,
            LogLevel::Debug => Self::Debug,
            LogLevel::Info => Self::Info,
            LogLevel::Warn => Self::Warn,
            LogLevel::Error => Self::Error,
        }
    }
}

impl Cli {
    /// Merges the command line over `config`.
    pub fn run_options(&self, config: &Config) -> Result<RunOptions, ConfigError> {
        let console_path = match &self.console {
            Some(path) => Some(path.clone()),
            None => config.console_path()?,
        };
        let stop_policy = if self.drain_on_exit {
            StopPolicy::DrainToEof
        } else {
            config.relay.stop_policy
        };
        Ok(RunOptions {
            program: self.program.clone(),
            disable_console: self.disable_console_commands,
            console_path,
            stop_policy,
            buffer_size: config.relay.buffer_size,
        })
    }
}

// MARK: --- UNIT TESTS ---
