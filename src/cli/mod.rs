//! Command-line interface for agent-evals.
//!
//! Provides the `eval-tasks` and `autograde` subcommands.

mod commands;

pub use commands::{parse_cli, run, run_with_cli};
