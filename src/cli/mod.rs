//! # Command-Line Interface
//!
//! ## Commands
//!
//! | Command | Purpose |
//! |---------|---------|
//! | `move` | Set status, priority or release on issues, optionally with their sub-issues |
//!
//! ## Output Formats
//!
//! All commands support `--format` flag:
//! - `text` (default) - Human-readable output, warnings on stderr
//! - `json` - Machine-parseable JSON with warnings included
//!
//! ## Verbose Mode
//!
//! `--verbose` (or `-v`) prints context lines and enables DEBUG tracing:
//! ```bash
//! gh-pmu --verbose move 42 --status in_progress
//! ```
//!
//! ## Entry Point
//!
//! Call [`run()`] to parse arguments and execute the appropriate command.

mod app;
mod move_cmd;
mod output;

pub use app::{run, Cli, Commands};
pub use move_cmd::MoveArgs;
pub use output::{Output, OutputFormat};
