//! # rktbatch
//!
//! A batch-job process supervisor: it launches a child program (or the
//! account's login shell), wires the child's standard streams to job
//! datasets, relays I/O until the child exits and lets an operator console
//! command stop the job early.

pub mod cli;
pub mod constants;
pub mod core;
pub mod models;
pub mod system;
