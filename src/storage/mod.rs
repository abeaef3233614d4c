//! # Storage Layer
//!
//! Read-only access to the repository's `.gh-pmu.yml`.
//!
//! ```yaml
//! project:
//!   owner: acme
//!   number: 3
//! repositories:
//!   - acme/widgets
//! framework: idpf
//! fields:
//!   status:
//!     field: Status
//!     values:
//!       in_progress: In progress
//!   branch:
//!     field: Release
//! releases:
//!   label: release
//!   title_prefix: "Release: "
//! labels:
//!   assigned: assigned
//! ```
//!
//! ## Key Types
//!
//! - [`Config`] - Parsed configuration with alias resolution

mod config;

pub use config::{Config, ConfigError, FieldMapping, Framework, CONFIG_FILE};
