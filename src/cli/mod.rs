//! Command-line interface.
//!
//! Provides commands for migrations, dataset builds, run lifecycle
//! management, synchronization sweeps, reading import and the worker
//! process.

mod commands;

pub use commands::{parse_cli, run_with_cli, Cli};
