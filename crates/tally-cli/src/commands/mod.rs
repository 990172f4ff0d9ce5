//! CLI subcommands. Each exposes an `Args` struct and an `execute` entry point.

pub mod config;
pub mod fix;
pub mod scan;
