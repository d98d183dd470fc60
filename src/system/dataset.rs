// src/system/dataset.rs

use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("DD {0} is not allocated")]
    Unallocated(String),
    #[error("Error opening DD {name} ({path}): {source}")]
    Open {
        name: String,
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("DD {0} is not open")]
    NotOpen(String),
    #[error("DD {name} was opened for {mode:?} and cannot be used that way")]
    WrongMode { name: String, mode: OpenMode },
    #[error("Error reading from DD {name}: {source}")]
    Read {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Error writing to DD {name}: {source}")]
    Write {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// Direction a dataset is opened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
}

/// The operations the relay and the main sequence need from a dataset.
///
/// An unopened stream is a valid state: reads report end-of-stream and
/// writes fail with [`DatasetError::NotOpen`] so nothing is silently
/// swallowed. Callers decide on fallback routing with [`is_open`].
///
/// [`is_open`]: DatasetStream::is_open
pub trait DatasetStream {
    /// The DD name, used in diagnostics.
    fn name(&self) -> &str;

    fn is_open(&self) -> bool;

    /// Reads up to `buf.len()` bytes; `Ok(0)` is end-of-stream.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, DatasetError>;

    /// Writes all of `buf` and returns its length.
    fn write(&mut self, buf: &[u8]) -> Result<usize, DatasetError>;

    /// Flushes and releases the stream. Safe to call repeatedly.
    fn close(&mut self) -> Result<(), DatasetError>;

    /// Descriptor to wait on before the next [`read`](Self::read) can make
    /// progress. `None` means a read will not block: the stream is unopened,
    /// has data buffered, or is not backed by a descriptor.
    fn poll_handle(&self) -> Option<BorrowedFd<'_>> {
        None
    }
}

#[derive(Debug)]
enum Handle {
    Reader(BufReader<File>),
    Writer(BufWriter<File>),
}

/// A buffered sequential stream over an allocated DD.
#[derive(Debug)]
pub struct Dataset {
    name: String,
    handle: Option<Handle>,
}

impl Dataset {
    /// Opens the dataset allocated at `path`.
    ///
    /// `path` is `None` when the DD name is not allocated at all. With
    /// `error_on_missing` unset, both an unallocated DD and a failed open
    /// leave the stream unopened instead of failing.
    pub fn open(
        name: &str,
        path: Option<&Path>,
        mode: OpenMode,
        error_on_missing: bool,
    ) -> Result<Self, DatasetError> {
        let Some(path) = path else {
            if error_on_missing {
                return Err(DatasetError::Unallocated(name.to_string()));
            }
            log::debug!("DD {} is not allocated", name);
            return Ok(Self::unopened(name));
        };

        let opened = match mode {
            OpenMode::Read => File::open(path),
            OpenMode::Write => File::create(path),
        };

        match opened {
            Ok(file) => {
                log::debug!("Opened DD {} ({}) for {:?}", name, path.display(), mode);
                Ok(Self::from_file(name, file, mode))
            }
            Err(source) if !error_on_missing => {
                if source.kind() == ErrorKind::NotFound {
                    log::debug!("DD {} ({}) does not exist", name, path.display());
                } else {
                    log::warn!("Could not open DD {} ({}): {}", name, path.display(), source);
                }
                Ok(Self::unopened(name))
            }
            Err(source) => Err(DatasetError::Open {
                name: name.to_string(),
                path: path.display().to_string(),
                source,
            }),
        }
    }

    /// A stream in the unopened state.
    pub fn unopened(name: &str) -> Self {
        Self {
            name: name.to_string(),
            handle: None,
        }
    }

    /// Wraps an already open descriptor.
    pub fn from_fd(name: &str, fd: OwnedFd, mode: OpenMode) -> Self {
        Self::from_file(name, File::from(fd), mode)
    }

    /// A write stream onto a duplicate of this process's standard output.
    pub fn from_stdout(name: &str) -> Result<Self, DatasetError> {
        let fd = std::io::stdout()
            .as_fd()
            .try_clone_to_owned()
            .map_err(|source| DatasetError::Open {
                name: name.to_string(),
                path: "<stdout>".to_string(),
                source,
            })?;
        Ok(Self::from_fd(name, fd, OpenMode::Write))
    }

    fn from_file(name: &str, file: File, mode: OpenMode) -> Self {
        let handle = match mode {
            OpenMode::Read => Handle::Reader(BufReader::new(file)),
            OpenMode::Write => Handle::Writer(BufWriter::new(file)),
        };
        Self {
            name: name.to_string(),
            handle: Some(handle),
        }
    }

    /// Reads the remaining content as text, replacing invalid UTF-8.
    /// Returns `None` for an unopened stream.
    pub fn read_to_string(&mut self) -> Result<Option<String>, DatasetError> {
        if !self.is_open() {
            return Ok(None);
        }
        let mut content = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = DatasetStream::read(self, &mut chunk)?;
            if n == 0 {
                break;
            }
            content.extend_from_slice(chunk.get(..n).unwrap_or_default());
        }
        Ok(Some(String::from_utf8_lossy(&content).into_owned()))
    }
}

fn wrong_mode(name: &str, mode: OpenMode) -> DatasetError {
    DatasetError::WrongMode {
        name: name.to_string(),
        mode,
    }
}

impl DatasetStream for Dataset {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, DatasetError> {
        let reader = match &mut self.handle {
            None => return Ok(0),
            Some(Handle::Reader(reader)) => reader,
            Some(Handle::Writer(_)) => return Err(wrong_mode(&self.name, OpenMode::Write)),
        };
        loop {
            match reader.read(buf) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(source) => {
                    return Err(DatasetError::Read {
                        name: self.name.clone(),
                        source,
                    });
                }
            }
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, DatasetError> {
        let writer = match &mut self.handle {
            None => return Err(DatasetError::NotOpen(self.name.clone())),
            Some(Handle::Writer(writer)) => writer,
            Some(Handle::Reader(_)) => return Err(wrong_mode(&self.name, OpenMode::Read)),
        };
        // Flushed per chunk so output is never held back behind the next wait.
        writer
            .write_all(buf)
            .and_then(|()| writer.flush())
            .map_err(|source| DatasetError::Write {
                name: self.name.clone(),
                source,
            })?;
        Ok(buf.len())
    }

    fn poll_handle(&self) -> Option<BorrowedFd<'_>> {
        match &self.handle {
            Some(Handle::Reader(reader)) if reader.buffer().is_empty() => {
                Some(reader.get_ref().as_fd())
            }
            _ => None,
        }
    }

    fn close(&mut self) -> Result<(), DatasetError> {
        if let Some(Handle::Writer(mut writer)) = self.handle.take() {
            writer.flush().map_err(|source| DatasetError::Write {
                name: self.name.clone(),
                source,
            })?;
        }
        Ok(())
    }
}

impl Drop for Dataset {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("{}", e);
        }
    }
}

// MARK: --- UNIT TESTS ---
