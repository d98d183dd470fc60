// src/system/pipe.rs

use nix::fcntl::{FcntlArg, OFlag, fcntl};
use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd};
use thiserror::Error;

/// Identifies one endpoint of a [`Pipe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeEnd {
    /// The end bytes are read from.
    Read,
    /// The end bytes are written to.
    Write,
}

#[derive(Error, Debug)]
pub enum PipeError {
    #[error("Error creating pipe: {0}")]
    Create(#[source] nix::Error),
    #[error("The {0:?} end of the pipe is closed")]
    Closed(PipeEnd),
    #[error("Error duplicating the {end:?} end of the pipe: {source}")]
    Duplicate {
        end: PipeEnd,
        #[source]
        source: std::io::Error,
    },
    #[error("Error setting flags on the {end:?} end of the pipe: {source}")]
    Flags {
        end: PipeEnd,
        #[source]
        source: nix::Error,
    },
    #[error("Error reading from pipe: {0}")]
    Read(#[source] std::io::Error),
    #[error("Error writing to pipe: {0}")]
    Write(#[source] std::io::Error),
}

impl PipeError {
    /// True when a write failed because nothing reads the other end any more.
    pub fn is_broken_pipe(&self) -> bool {
        matches!(self, Self::Write(e) if e.kind() == ErrorKind::BrokenPipe)
    }

    /// True when a non-blocking write found the pipe full.
    pub fn is_would_block(&self) -> bool {
        matches!(self, Self::Write(e) if e.kind() == ErrorKind::WouldBlock)
    }
}

/// An anonymous unidirectional pipe whose two ends are closed independently.
///
/// Both descriptors are created close-on-exec; a child only ever sees the
/// duplicates handed to it through [`Pipe::duplicate`]. A closed end stays
/// closed, and dropping the pipe closes whatever is still open exactly once.
/// The type is move-only.
#[derive(Debug)]
pub struct Pipe {
    read: Option<File>,
    write: Option<File>,
}

impl Pipe {
    /// Creates a connected read/write pair.
    pub fn new() -> Result<Self, PipeError> {
        let (read, write) = nix::unistd::pipe2(OFlag::O_CLOEXEC).map_err(PipeError::Create)?;
        Ok(Self {
            read: Some(File::from(read)),
            write: Some(File::from(write)),
        })
    }

    fn end(&self, end: PipeEnd) -> Option<&File> {
        match end {
            PipeEnd::Read => self.read.as_ref(),
            PipeEnd::Write => self.write.as_ref(),
        }
    }

    /// Borrowed descriptor of the read end, if still open.
    pub fn read_handle(&self) -> Option<BorrowedFd<'_>> {
        self.read.as_ref().map(AsFd::as_fd)
    }

    /// Borrowed descriptor of the write end, if still open.
    pub fn write_handle(&self) -> Option<BorrowedFd<'_>> {
        self.write.as_ref().map(AsFd::as_fd)
    }

    pub fn is_read_open(&self) -> bool {
        self.read.is_some()
    }

    pub fn is_write_open(&self) -> bool {
        self.write.is_some()
    }

    /// Closes the read end. Closing an already closed end is a no-op.
    pub fn close_read(&mut self) {
        drop(self.read.take());
    }

    /// Closes the write end. Closing an already closed end is a no-op.
    pub fn close_write(&mut self) {
        drop(self.write.take());
    }

    /// Returns a new owned descriptor for `end`, e.g. to hand to a child process.
    pub fn duplicate(&self, end: PipeEnd) -> Result<OwnedFd, PipeError> {
        let file = self.end(end).ok_or(PipeError::Closed(end))?;
        file.as_fd()
            .try_clone_to_owned()
            .map_err(|source| PipeError::Duplicate { end, source })
    }

    /// Puts `end` in non-blocking mode. The flag lives on the open file
    /// description, so duplicates of the same end share it; the other end is
    /// unaffected.
    pub fn set_nonblocking(&self, end: PipeEnd) -> Result<(), PipeError> {
        let fd = self.end(end).ok_or(PipeError::Closed(end))?.as_raw_fd();
        let flags_error = |source| PipeError::Flags { end, source };
        let current = fcntl(fd, FcntlArg::F_GETFL).map_err(flags_error)?;
        let flags = OFlag::from_bits_truncate(current) | OFlag::O_NONBLOCK;
        fcntl(fd, FcntlArg::F_SETFL(flags)).map_err(flags_error)?;
        Ok(())
    }

    /// Reads up to `buffer.len()` bytes. `Ok(0)` means every writer has gone.
    /// Interrupted calls are retried.
    pub fn read(&self, buffer: &mut [u8]) -> Result<usize, PipeError> {
        let mut file = self.read.as_ref().ok_or(PipeError::Closed(PipeEnd::Read))?;
        loop {
            match file.read(buffer) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(PipeError::Read(e)),
            }
        }
    }

    /// Writes some prefix of `buffer` and returns its length.
    /// Interrupted calls are retried.
    pub fn write(&self, buffer: &[u8]) -> Result<usize, PipeError> {
        let mut file = self.write.as_ref().ok_or(PipeError::Closed(PipeEnd::Write))?;
        loop {
            match file.write(buffer) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(PipeError::Write(e)),
            }
        }
    }

    /// Writes all of `buffer`, looping over short writes.
    pub fn write_all(&self, mut buffer: &[u8]) -> Result<(), PipeError> {
        while !buffer.is_empty() {
            let written = self.write(buffer)?;
            if written == 0 {
                return Err(PipeError::Write(ErrorKind::WriteZero.into()));
            }
            buffer = buffer.get(written..).unwrap_or_default();
        }
        Ok(())
    }
}

// MARK: --- UNIT TESTS ---
