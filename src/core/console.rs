// src/core/console.rs

//! Operator console listener.
//!
//! Commands arrive one per line from a FIFO or a plain file. The listener
//! runs on its own thread for the life of the job and only acts on STOP;
//! it ends, without affecting the relay, on the first console error.

use crate::models::ConsoleCommand;
use crate::system::lifecycle::{TerminateHandle, TerminateRequest};
use nix::sys::signal::Signal;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader};
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConsoleError {
    #[error("No operator console is configured")]
    Unavailable,
    #[error("Error opening operator console {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Error reading from the operator console: {0}")]
    Read(#[source] std::io::Error),
    #[error("The operator console was closed")]
    Closed,
}

/// A blocking source of operator commands.
pub trait Console {
    /// Blocks until the next command arrives.
    fn next_command(&mut self) -> Result<ConsoleCommand, ConsoleError>;
}

/// Line-oriented console backed by a FIFO or a file.
#[derive(Debug)]
pub struct OperatorConsole {
    reader: Option<BufReader<File>>,
}

impl OperatorConsole {
    /// Opens the console at `path`. A FIFO is opened read-write so that
    /// opening never blocks and the console survives writers coming and going.
    pub fn open(path: &Path) -> Result<Self, ConsoleError> {
        let open_error = |source| ConsoleError::Open {
            path: path.to_path_buf(),
            source,
        };
        let is_fifo = path
            .metadata()
            .map_err(open_error)?
            .file_type()
            .is_fifo();
        let file = OpenOptions::new()
            .read(true)
            .write(is_fifo)
            .open(path)
            .map_err(open_error)?;
        log::debug!("Operator console opened at {}", path.display());
        Ok(Self {
            reader: Some(BufReader::new(file)),
        })
    }

    /// A console with no source; every read reports it unavailable.
    pub fn unavailable() -> Self {
        Self { reader: None }
    }
}

impl Console for OperatorConsole {
    fn next_command(&mut self) -> Result<ConsoleCommand, ConsoleError> {
        let reader = self.reader.as_mut().ok_or(ConsoleError::Unavailable)?;
        let mut line = String::new();
        loop {
            line.clear();
            let n = reader.read_line(&mut line).map_err(ConsoleError::Read)?;
            if n == 0 {
                return Err(ConsoleError::Closed);
            }
            if let Some(command) = parse_command(&line) {
                return Ok(command);
            }
        }
    }
}

/// Parses one console line. Blank lines yield `None`.
pub fn parse_command(line: &str) -> Option<ConsoleCommand> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let (verb, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let command = match verb.to_ascii_uppercase().as_str() {
        "P" | "STOP" => ConsoleCommand::Stop,
        "F" | "MODIFY" => ConsoleCommand::Modify(rest.trim().to_string()),
        _ => ConsoleCommand::Unrecognized(line.to_string()),
    };
    Some(command)
}

/// Serves console commands until the console fails.
pub fn listen(console: &mut dyn Console, terminator: &TerminateHandle) {
    loop {
        match console.next_command() {
            Ok(ConsoleCommand::Stop) => {
                log::info!("Operator STOP received; terminating the child");
                let request = TerminateRequest {
                    signal: Signal::SIGTERM,
                };
                if let Err(e) = terminator.send(request) {
                    log::warn!("STOP could not terminate the child: {}", e);
                }
            }
            Ok(ConsoleCommand::Modify(text)) => {
                log::info!("Operator MODIFY ignored: '{}'", text);
            }
            Ok(ConsoleCommand::Unrecognized(text)) => {
                log::warn!("Unrecognised operator command: '{}'", text);
            }
            Err(ConsoleError::Unavailable) => {
                log::debug!("No operator console; listener exiting");
                return;
            }
            Err(e) => {
                log::warn!("Console listener exiting: {}", e);
                return;
            }
        }
    }
}

/// Starts [`listen`] on a detached `console` thread.
pub fn spawn_listener(
    mut console: Box<dyn Console + Send>,
    terminator: TerminateHandle,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("console".to_string())
        .spawn(move || listen(console.as_mut(), &terminator))
}

// MARK: --- UNIT TESTS ---
