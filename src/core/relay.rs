// src/core/relay.rs

//! # I/O Relay
//!
//! The single-threaded loop that moves bytes between the job's datasets and
//! the child's standard streams:
//!
//! - input dataset -> child stdin (one in-flight chunk, written without
//!   blocking so a full pipe never stalls the output side)
//! - child stdout  -> STDOUT dataset, or SYSOUT when STDOUT is unopened
//! - child stderr  -> STDERR dataset, or SYSOUT when STDERR is unopened
//!
//! The loop blocks in `poll(2)` with no timeout on the open pipe ends plus
//! the shutdown wake descriptor. It only ever stops because of the shutdown
//! signal; how eagerly is decided by [`StopPolicy`]:
//!
//! - `SignalOnly` stops on the first wait in which the shutdown signal fired
//!   and no pipe was ready. Output a surviving descendant writes afterwards
//!   is lost.
//! - `DrainToEof` keeps relaying after the signal until both output pipes
//!   reach end-of-stream, which blocks for as long as any descendant holds
//!   them open.

use crate::models::{Channel, RelayStats, StopPolicy};
use crate::system::dataset::{DatasetError, DatasetStream};
use crate::system::pipe::{Pipe, PipeEnd, PipeError};
use crate::system::signals::ShutdownSignal;
use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use std::ops::Range;
use std::os::fd::BorrowedFd;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("poll() failed: {0}")]
    Wait(#[source] Errno),
    #[error(transparent)]
    Pipe(#[from] PipeError),
    #[error(transparent)]
    Dataset(#[from] DatasetError),
}

/// The parent's ends of the three child pipes.
#[derive(Debug)]
pub struct RelayPipes {
    /// Written by the relay; its read end belongs to the child.
    pub stdin: Pipe,
    /// Read by the relay; its write end belongs to the child.
    pub stdout: Pipe,
    /// Read by the relay; its write end belongs to the child.
    pub stderr: Pipe,
}

/// Output destinations with their shared fallback.
#[derive(Debug)]
pub struct OutputRoutes<O> {
    stdout: O,
    stderr: O,
    fallback: O,
}

impl<O: DatasetStream> OutputRoutes<O> {
    pub fn new(stdout: O, stderr: O, fallback: O) -> Self {
        Self {
            stdout,
            stderr,
            fallback,
        }
    }

    /// The destination for `channel`: its primary if open, else the fallback.
    pub fn sink(&mut self, channel: Channel) -> &mut O {
        let primary = match channel {
            Channel::Stderr => &mut self.stderr,
            Channel::Stdout | Channel::Stdin => &mut self.stdout,
        };
        if primary.is_open() {
            primary
        } else {
            &mut self.fallback
        }
    }

    /// Closes every destination, reporting the first failure.
    pub fn close_all(&mut self) -> Result<(), DatasetError> {
        let stdout = self.stdout.close();
        let stderr = self.stderr.close();
        let fallback = self.fallback.close();
        stdout.and(stderr).and(fallback)
    }

    /// Returns `(stdout, stderr, fallback)`.
    pub fn into_parts(self) -> (O, O, O) {
        (self.stdout, self.stderr, self.fallback)
    }
}

/// What one multiplex wait reported.
#[derive(Debug, Default, Clone, Copy)]
struct Readiness {
    input: bool,
    stdin: bool,
    stdout: bool,
    stderr: bool,
    shutdown: bool,
}

impl Readiness {
    fn any_descriptor(&self) -> bool {
        self.input || self.stdin || self.stdout || self.stderr
    }
}

fn watch<'fd>(fds: &mut Vec<PollFd<'fd>>, fd: BorrowedFd<'fd>, events: PollFlags) -> usize {
    fds.push(PollFd::new(fd, events));
    fds.len() - 1
}

fn fired(fds: &[PollFd<'_>], slot: Option<usize>) -> bool {
    slot.and_then(|i| fds.get(i))
        .and_then(|fd| fd.revents())
        .is_some_and(|revents| !revents.is_empty())
}

/// The relay loop and the resources it drives.
#[derive(Debug)]
pub struct Relay<'a, I, O> {
    pipes: RelayPipes,
    input: I,
    outputs: OutputRoutes<O>,
    shutdown: &'a ShutdownSignal,
    policy: StopPolicy,
    buffer: Vec<u8>,
    input_buffer: Vec<u8>,
    /// Part of `input_buffer` read from the input but not yet taken by the child.
    pending: Range<usize>,
    stats: RelayStats,
}

impl<'a, I: DatasetStream, O: DatasetStream> Relay<'a, I, O> {
    pub fn new(
        pipes: RelayPipes,
        input: I,
        outputs: OutputRoutes<O>,
        shutdown: &'a ShutdownSignal,
    ) -> Self {
        Self {
            pipes,
            input,
            outputs,
            shutdown,
            policy: StopPolicy::default(),
            buffer: vec![0; crate::constants::RELAY_BUFFER_SIZE],
            input_buffer: vec![0; crate::constants::RELAY_BUFFER_SIZE],
            pending: 0..0,
            stats: RelayStats::default(),
        }
    }

    pub fn with_policy(mut self, policy: StopPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the per-channel buffer size. Zero is treated as one byte.
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer = vec![0; size.max(1)];
        self.input_buffer = vec![0; size.max(1)];
        self.pending = 0..0;
        self
    }

    pub fn pipes(&self) -> &RelayPipes {
        &self.pipes
    }

    pub fn stats(&self) -> RelayStats {
        self.stats
    }

    pub fn into_parts(self) -> (RelayPipes, I, OutputRoutes<O>) {
        (self.pipes, self.input, self.outputs)
    }

    /// Relays until the shutdown signal ends the loop.
    pub fn run(&mut self) -> Result<RelayStats, RelayError> {
        if !self.input.is_open() {
            log::debug!("DD {} is not open; child stdin gets immediate EOF", self.input.name());
            self.finish_input()?;
        }
        if self.pipes.stdin.is_write_open() {
            self.pipes.stdin.set_nonblocking(PipeEnd::Write)?;
        }

        let mut shutdown_seen = false;
        loop {
            if shutdown_seen && self.outputs_drained() {
                log::debug!("Child output drained; stopping relay");
                break;
            }

            // Once draining, the sticky wake descriptor would make every wait return at once.
            let watch_shutdown = !shutdown_seen || self.policy == StopPolicy::SignalOnly;
            let ready = self.wait(watch_shutdown)?;
            self.stats.iterations += 1;
            log::trace!("Wait returned {:?}", ready);

            if ready.shutdown {
                match self.policy {
                    StopPolicy::SignalOnly if !ready.any_descriptor() => {
                        log::debug!("Shutdown signalled; stopping relay");
                        break;
                    }
                    StopPolicy::SignalOnly => {}
                    StopPolicy::DrainToEof => {
                        if !shutdown_seen {
                            log::debug!("Shutdown signalled; draining child output");
                        }
                        shutdown_seen = true;
                    }
                }
            }

            if ready.input || ready.stdin {
                self.forward_input()?;
            }
            if ready.stdout {
                self.forward_output(Channel::Stdout)?;
            }
            if ready.stderr {
                self.forward_output(Channel::Stderr)?;
            }
        }

        log::debug!(
            "Relay stopped after {} waits: {} bytes in, {} bytes out, {} bytes err",
            self.stats.iterations,
            self.stats.stdin_bytes,
            self.stats.stdout_bytes,
            self.stats.stderr_bytes
        );
        Ok(self.stats)
    }

    fn outputs_drained(&self) -> bool {
        !self.pipes.stdout.is_read_open() && !self.pipes.stderr.is_read_open()
    }

    /// Blocks until a watched descriptor is ready. Interrupted waits are retried.
    ///
    /// While a chunk is in flight the relay waits for room in the child's
    /// stdin; otherwise it waits for the input dataset to have data, or for
    /// the pipe when the input cannot be waited on.
    fn wait(&self, watch_shutdown: bool) -> Result<Readiness, RelayError> {
        loop {
            let mut fds = Vec::with_capacity(4);
            let (stdin, input) = match self.pipes.stdin.write_handle() {
                None => (None, None),
                Some(fd) if !self.pending.is_empty() => {
                    (Some(watch(&mut fds, fd, PollFlags::POLLOUT)), None)
                }
                Some(fd) => match self.input.poll_handle() {
                    Some(source) => (None, Some(watch(&mut fds, source, PollFlags::POLLIN))),
                    None => (Some(watch(&mut fds, fd, PollFlags::POLLOUT)), None),
                },
            };
            let stdout = self
                .pipes
                .stdout
                .read_handle()
                .map(|fd| watch(&mut fds, fd, PollFlags::POLLIN));
            let stderr = self
                .pipes
                .stderr
                .read_handle()
                .map(|fd| watch(&mut fds, fd, PollFlags::POLLIN));
            let shutdown = watch_shutdown
                .then(|| watch(&mut fds, self.shutdown.wake_fd(), PollFlags::POLLIN));

            match poll(&mut fds, PollTimeout::NONE) {
                Ok(_) => {}
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(RelayError::Wait(e)),
            }

            // POLLHUP and POLLERR count as ready: the following read or
            // write reports what happened.
            return Ok(Readiness {
                input: fired(&fds, input),
                stdin: fired(&fds, stdin),
                stdout: fired(&fds, stdout),
                stderr: fired(&fds, stderr),
                shutdown: fired(&fds, shutdown),
            });
        }
    }

    /// Refills the in-flight chunk when it is empty, then offers it to the
    /// child with a single non-blocking write. Whatever the pipe does not
    /// take stays pending for the next wait.
    fn forward_input(&mut self) -> Result<(), RelayError> {
        if self.pending.is_empty() {
            let n = self.input.read(&mut self.input_buffer)?;
            log::trace!("Read {} bytes from DD {}", n, self.input.name());
            if n == 0 {
                return self.finish_input();
            }
            self.pending = 0..n;
        }

        let chunk = self.input_buffer.get(self.pending.clone()).unwrap_or_default();
        match self.pipes.stdin.write(chunk) {
            Ok(n) => {
                self.pending.start += n;
                self.stats.add(Channel::Stdin, n);
                Ok(())
            }
            Err(e) if e.is_would_block() => {
                log::trace!("Child stdin is full; {} bytes pending", self.pending.len());
                Ok(())
            }
            Err(e) if e.is_broken_pipe() => {
                log::debug!("Child closed its stdin; discarding the rest of DD {}", self.input.name());
                self.finish_input()
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Half-closes the input channel so the child sees end-of-input.
    fn finish_input(&mut self) -> Result<(), RelayError> {
        log::debug!("Close the write end of the stdin pipe to signal EOF to the child");
        self.pending = 0..0;
        self.pipes.stdin.close_write();
        self.input.close()?;
        Ok(())
    }

    fn forward_output(&mut self, channel: Channel) -> Result<(), RelayError> {
        let pipe = match channel {
            Channel::Stdout => &mut self.pipes.stdout,
            Channel::Stderr => &mut self.pipes.stderr,
            Channel::Stdin => return Ok(()),
        };

        let n = pipe.read(&mut self.buffer)?;
        if n == 0 {
            log::debug!("Child {} reached end-of-stream", channel);
            pipe.close_read();
            return Ok(());
        }

        let chunk = self.buffer.get(..n).unwrap_or_default();
        let sink = self.outputs.sink(channel);
        log::trace!("Forwarding {} bytes of child {} to DD {}", n, channel, sink.name());
        sink.write(chunk)?;
        self.stats.add(channel, n);
        Ok(())
    }
}

// MARK: --- UNIT TESTS ---

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::dataset::{Dataset, OpenMode};
    use std::fs::File;
    use std::io::{Read, Write};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    /// In-memory input dataset that counts how it is used.
    #[derive(Debug, Default)]
    struct MemoryInput {
        data: Vec<u8>,
        pos: usize,
        open: bool,
        reads: usize,
        closes: usize,
    }

    impl MemoryInput {
        fn with(data: Vec<u8>) -> Self {
            Self {
                data,
                open: true,
                ..Default::default()
            }
        }
    }

    impl DatasetStream for MemoryInput {
        fn name(&self) -> &str {
            "STDIN"
        }
        fn is_open(&self) -> bool {
            self.open
        }
        fn read(&mut self, buf: &mut [u8]) -> Result<usize, DatasetError> {
            self.reads += 1;
            if !self.open {
                return Ok(0);
            }
            let n = buf.len().min(self.data.len() - self.pos);
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
        fn write(&mut self, _buf: &[u8]) -> Result<usize, DatasetError> {
            Err(DatasetError::NotOpen("STDIN".to_string()))
        }
        fn close(&mut self) -> Result<(), DatasetError> {
            self.closes += 1;
            self.open = false;
            Ok(())
        }
    }

    /// In-memory output dataset.
    #[derive(Debug, Default)]
    struct MemoryOutput {
        data: Vec<u8>,
        open: bool,
        writes: usize,
    }

    impl MemoryOutput {
        fn open() -> Self {
            Self {
                open: true,
                ..Default::default()
            }
        }
    }

    impl DatasetStream for MemoryOutput {
        fn name(&self) -> &str {
            "OUT"
        }
        fn is_open(&self) -> bool {
            self.open
        }
        fn read(&mut self, _buf: &mut [u8]) -> Result<usize, DatasetError> {
            Ok(0)
        }
        fn write(&mut self, buf: &[u8]) -> Result<usize, DatasetError> {
            self.writes += 1;
            if !self.open {
                return Err(DatasetError::NotOpen("OUT".to_string()));
            }
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }
        fn close(&mut self) -> Result<(), DatasetError> {
            self.open = false;
            Ok(())
        }
    }

    /// The child's ends of the three pipes.
    struct ChildEnds {
        stdin: File,
        stdout: File,
        stderr: File,
    }

    fn pipes_with_child_ends() -> (RelayPipes, ChildEnds) {
        let mut pipes = RelayPipes {
            stdin: Pipe::new().unwrap(),
            stdout: Pipe::new().unwrap(),
            stderr: Pipe::new().unwrap(),
        };
        let child = ChildEnds {
            stdin: File::from(pipes.stdin.duplicate(PipeEnd::Read).unwrap()),
            stdout: File::from(pipes.stdout.duplicate(PipeEnd::Write).unwrap()),
            stderr: File::from(pipes.stderr.duplicate(PipeEnd::Write).unwrap()),
        };
        pipes.stdin.close_read();
        pipes.stdout.close_write();
        pipes.stderr.close_write();
        (pipes, child)
    }

    fn routes() -> OutputRoutes<MemoryOutput> {
        OutputRoutes::new(MemoryOutput::open(), MemoryOutput::open(), MemoryOutput::open())
    }

    #[test]
    fn test_input_larger_than_buffer_is_forwarded_intact() {
        // --- Setup ---
        let input: Vec<u8> = (0..10_000u32).map(|i| (i * 31 % 251) as u8).collect();
        let (pipes, child) = pipes_with_child_ends();
        let shutdown = Arc::new(ShutdownSignal::new().unwrap());

        // The "child" consumes stdin to EOF, then exits.
        let poster = Arc::clone(&shutdown);
        let consumer = thread::spawn(move || {
            let ChildEnds { mut stdin, stdout, stderr } = child;
            let mut received = Vec::new();
            stdin.read_to_end(&mut received).unwrap();
            drop((stdout, stderr));
            poster.post();
            received
        });

        // --- Execute ---
        let mut relay = Relay::new(pipes, MemoryInput::with(input.clone()), routes(), &shutdown)
            .with_buffer_size(4096);
        let stats = relay.run().unwrap();
        let received = consumer.join().unwrap();

        // --- Assert ---
        assert_eq!(received, input);
        assert_eq!(stats.stdin_bytes, 10_000);
        let (pipes, input_ds, _) = relay.into_parts();
        assert!(!pipes.stdin.is_write_open());
        // Three data reads and one end-of-stream read.
        assert_eq!(input_ds.reads, 4);
        assert_eq!(input_ds.closes, 1);
    }

    #[test]
    fn test_end_of_input_closes_stdin_exactly_once() {
        let (pipes, child) = pipes_with_child_ends();
        let shutdown = Arc::new(ShutdownSignal::new().unwrap());

        let poster = Arc::clone(&shutdown);
        let consumer = thread::spawn(move || {
            let ChildEnds { mut stdin, .. } = child;
            let mut received = Vec::new();
            stdin.read_to_end(&mut received).unwrap();
            // Stay alive a little so the relay iterates with stdin closed.
            thread::sleep(Duration::from_millis(50));
            poster.post();
            received
        });

        let mut relay = Relay::new(pipes, MemoryInput::with(b"abc".to_vec()), routes(), &shutdown);
        relay.run().unwrap();
        assert_eq!(consumer.join().unwrap(), b"abc");

        let (_, input_ds, _) = relay.into_parts();
        assert_eq!(input_ds.reads, 2);
        assert_eq!(input_ds.closes, 1);
    }

    #[test]
    fn test_unopened_input_closes_stdin_without_reading() {
        let (pipes, child) = pipes_with_child_ends();
        let shutdown = Arc::new(ShutdownSignal::new().unwrap());

        let poster = Arc::clone(&shutdown);
        let consumer = thread::spawn(move || {
            let ChildEnds { mut stdin, .. } = child;
            let mut received = Vec::new();
            stdin.read_to_end(&mut received).unwrap();
            poster.post();
            received
        });

        let mut relay = Relay::new(pipes, MemoryInput::default(), routes(), &shutdown);
        relay.run().unwrap();

        assert!(consumer.join().unwrap().is_empty());
        let (_, input_ds, _) = relay.into_parts();
        assert_eq!(input_ds.reads, 0);
        assert_eq!(input_ds.closes, 1);
    }

    #[test]
    fn test_output_goes_to_primary_or_fallback() {
        let (pipes, child) = pipes_with_child_ends();
        let shutdown = ShutdownSignal::new().unwrap();

        let ChildEnds {
            stdin,
            mut stdout,
            mut stderr,
        } = child;
        stdout.write_all(b"to stdout\n").unwrap();
        stderr.write_all(b"to stderr\n").unwrap();
        drop((stdin, stdout, stderr));
        shutdown.post();

        // STDOUT is unallocated, STDERR is.
        let outputs = OutputRoutes::new(
            MemoryOutput::default(),
            MemoryOutput::open(),
            MemoryOutput::open(),
        );
        let mut relay = Relay::new(pipes, MemoryInput::default(), outputs, &shutdown);
        let stats = relay.run().unwrap();

        let (_, _, outputs) = relay.into_parts();
        let (primary_out, primary_err, fallback) = outputs.into_parts();
        assert_eq!(fallback.data, b"to stdout\n");
        assert_eq!(primary_err.data, b"to stderr\n");
        // The unopened primary was never written through.
        assert_eq!(primary_out.writes, 0);
        assert!(primary_out.data.is_empty());
        assert_eq!(stats.stdout_bytes, 10);
        assert_eq!(stats.stderr_bytes, 10);
    }

    #[test]
    fn test_shutdown_with_nothing_ready_stops_in_one_wait() {
        let (pipes, child) = pipes_with_child_ends();
        let shutdown = ShutdownSignal::new().unwrap();
        shutdown.post();

        let mut relay = Relay::new(pipes, MemoryInput::default(), routes(), &shutdown);
        let stats = relay.run().unwrap();

        assert_eq!(stats.iterations, 1);
        let (pipes, input_ds, outputs) = relay.into_parts();
        assert_eq!(input_ds.reads, 0);
        let (out, err, fallback) = outputs.into_parts();
        assert_eq!(out.writes + err.writes + fallback.writes, 0);
        // The child still holds its ends; the relay did not wait for them.
        assert!(pipes.stdout.is_read_open());
        drop(child);
    }

    #[test]
    fn test_signal_only_loses_output_written_after_stop() {
        let (pipes, child) = pipes_with_child_ends();
        let shutdown = ShutdownSignal::new().unwrap();
        shutdown.post();

        let mut relay = Relay::new(pipes, MemoryInput::default(), routes(), &shutdown)
            .with_policy(StopPolicy::SignalOnly);
        relay.run().unwrap();

        // A descendant that still holds stdout writes after the relay stopped.
        let ChildEnds { mut stdout, .. } = child;
        stdout.write_all(b"late output").unwrap();

        let (_, _, outputs) = relay.into_parts();
        let (out, _, fallback) = outputs.into_parts();
        assert!(out.data.is_empty());
        assert!(fallback.data.is_empty());
    }

    #[test]
    fn test_drain_to_eof_forwards_output_written_after_signal() {
        let (pipes, child) = pipes_with_child_ends();
        let shutdown = ShutdownSignal::new().unwrap();
        shutdown.post();

        let writer = thread::spawn(move || {
            let ChildEnds {
                stdin,
                mut stdout,
                mut stderr,
            } = child;
            drop(stdin);
            thread::sleep(Duration::from_millis(100));
            stdout.write_all(b"late output").unwrap();
            stderr.write_all(b"late error").unwrap();
        });

        let mut relay = Relay::new(pipes, MemoryInput::default(), routes(), &shutdown)
            .with_policy(StopPolicy::DrainToEof);
        relay.run().unwrap();
        writer.join().unwrap();

        let (pipes, _, outputs) = relay.into_parts();
        let (out, err, _) = outputs.into_parts();
        assert_eq!(out.data, b"late output");
        assert_eq!(err.data, b"late error");
        assert!(!pipes.stdout.is_read_open());
        assert!(!pipes.stderr.is_read_open());
    }

    #[test]
    fn test_broken_stdin_half_closes_instead_of_failing() {
        let (pipes, child) = pipes_with_child_ends();
        let shutdown = ShutdownSignal::new().unwrap();

        // The child is gone before reading any input.
        drop(child);
        let mut relay = Relay::new(
            pipes,
            MemoryInput::with(vec![b'x'; 100]),
            routes(),
            &shutdown,
        )
        .with_policy(StopPolicy::DrainToEof);
        shutdown.post();
        let stats = relay.run().unwrap();

        assert_eq!(stats.stdin_bytes, 0);
        let (pipes, input_ds, _) = relay.into_parts();
        assert!(!pipes.stdin.is_write_open());
        assert_eq!(input_ds.closes, 1);
    }

    #[test]
    fn test_buffer_larger_than_pipe_does_not_stall_a_filter_child() {
        // --- Setup ---
        let input: Vec<u8> = (0..1_000_000u32).map(|i| (i % 253) as u8).collect();
        let (pipes, child) = pipes_with_child_ends();
        let shutdown = Arc::new(ShutdownSignal::new().unwrap());

        // The "child" copies stdin to stdout the way `cat` does.
        let poster = Arc::clone(&shutdown);
        let filter = thread::spawn(move || {
            let ChildEnds {
                mut stdin,
                mut stdout,
                stderr,
            } = child;
            let mut chunk = [0u8; 8192];
            loop {
                let n = stdin.read(&mut chunk).unwrap();
                if n == 0 {
                    break;
                }
                stdout.write_all(&chunk[..n]).unwrap();
            }
            drop((stdout, stderr));
            poster.post();
        });

        // --- Execute ---
        let mut relay = Relay::new(pipes, MemoryInput::with(input.clone()), routes(), &shutdown)
            .with_buffer_size(1 << 20);
        let stats = relay.run().unwrap();
        filter.join().unwrap();

        // --- Assert ---
        assert_eq!(stats.stdin_bytes, 1_000_000);
        assert_eq!(stats.stdout_bytes, 1_000_000);
        let (_, _, outputs) = relay.into_parts();
        let (out, _, _) = outputs.into_parts();
        assert!(out.data == input, "output differs from input");
    }

    #[test]
    fn test_shutdown_while_waiting_for_input_stops_in_one_wait() {
        // --- Setup ---
        let (pipes, child) = pipes_with_child_ends();
        // Input whose writer stays open without ever sending data.
        let (source, feeder) = nix::unistd::pipe().unwrap();
        let input = Dataset::from_fd("STDIN", source, OpenMode::Read);
        let shutdown = Arc::new(ShutdownSignal::new().unwrap());

        let poster = Arc::clone(&shutdown);
        let stopper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            poster.post();
        });

        // --- Execute ---
        let mut relay = Relay::new(pipes, input, routes(), &shutdown);
        let stats = relay.run().unwrap();
        stopper.join().unwrap();

        // --- Assert ---
        assert_eq!(stats.iterations, 1);
        assert_eq!(stats.stdin_bytes, 0);
        let (pipes, input_ds, _) = relay.into_parts();
        // Neither side saw end-of-input.
        assert!(pipes.stdin.is_write_open());
        assert!(input_ds.is_open());
        drop((feeder, child));
    }
}
