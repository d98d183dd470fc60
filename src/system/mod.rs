//! # System Interaction Layer
//!
//! Thin wrappers over the operating system that the core engine drives.
//!
//! ## Modules
//!
//! - **`pipe`**: Unidirectional pipes with independently closable ends.
//! - **`dataset`**: Named job datasets (`DD:<NAME>`) opened as byte streams.
//! - **`environment`**: The invoking account and the child's environment list.
//! - **`signals`**: SIGCHLD/SIGPIPE handling and the process-wide shutdown signal.
//! - **`launcher`**: The spawn/signal/wait seam and its POSIX implementation.
//! - **`lifecycle`**: Child process ownership: spawn, terminate, reap.

pub mod dataset;
pub mod environment;
pub mod launcher;
pub mod lifecycle;
pub mod pipe;
pub mod signals;
