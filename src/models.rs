// src/models.rs

//! Plain data types shared between the system layer and the core engine.

use nix::sys::signal::Signal;
use serde::Deserialize;
use std::fmt;

/// One of the three standard streams the supervisor relays for the child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// Input dataset to the child's stdin.
    Stdin,
    /// Child's stdout to the STDOUT dataset (or SYSOUT).
    Stdout,
    /// Child's stderr to the STDERR dataset (or SYSOUT).
    Stderr,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Stdin => "stdin",
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        };
        f.write_str(name)
    }
}

/// How the relay loop reacts once the shutdown signal has been posted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StopPolicy {
    /// Stop on the first wait where the shutdown signal fired and no descriptor was ready.
    /// Output written later by surviving descendants is lost.
    #[default]
    SignalOnly,
    /// Keep relaying until both child output pipes reach end-of-stream.
    /// Blocks for as long as any descendant keeps an output pipe open.
    DrainToEof,
}

/// Terminal state of a reaped child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildStatus {
    /// The child called `exit` with this code.
    Exited(i32),
    /// The child was killed by this signal.
    Signaled(Signal),
}

/// A directive received from the operator console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// STOP (`P`): terminate the job.
    Stop,
    /// MODIFY (`F`) with its free-form text. Logged, not acted upon.
    Modify(String),
    /// Anything the console delivered that is not a known verb.
    Unrecognized(String),
}

/// Counters reported by the relay loop when it stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Bytes forwarded from the input dataset into the child's stdin.
    pub stdin_bytes: u64,
    /// Bytes forwarded from the child's stdout.
    pub stdout_bytes: u64,
    /// Bytes forwarded from the child's stderr.
    pub stderr_bytes: u64,
    /// Number of completed multiplex waits.
    pub iterations: u64,
}

impl RelayStats {
    pub(crate) fn add(&mut self, channel: Channel, bytes: usize) {
        let bytes = u64::try_from(bytes).unwrap_or(u64::MAX);
        let counter = match channel {
            Channel::Stdin => &mut self.stdin_bytes,
            Channel::Stdout => &mut self.stdout_bytes,
            Channel::Stderr => &mut self.stderr_bytes,
        };
        *counter = counter.saturating_add(bytes);
    }
}
