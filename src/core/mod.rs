// src/core/mod.rs

//! # Core Engine
//!
//! - **`config`**: DD name allocations and relay tuning from TOML and the environment.
//! - **`console`**: The operator console and its listener thread.
//! - **`relay`**: The multiplexed I/O relay loop.
//! - **`supervisor`**: The main sequence tying everything together.

pub mod config;
pub mod console;
pub mod relay;
pub mod supervisor;
