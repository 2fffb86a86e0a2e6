//! Command-line interface for bluefin-releases
//!
//! # Commands
//!
//! - **run**: discover every package of the catalog, fetch details, merge,
//!   enrich with releases, and write the dataset atomically. A one-line JSON
//!   summary is printed on success.
//! - **init**: write the built-in configuration to a file as a starting point.
//!
//! `run` wires the configured upstreams and release sources to the pipeline,
//! giving each its own rate governor so a throttled upstream never slows the
//! others. Ctrl-C or `--timeout` cancel the run before anything is written.

mod common;
mod config;
mod generate;
mod host;
mod init;
mod progress_reporter;
mod run;

pub use common::{ColorMode, LogLevel};
pub use config::{Config, DEFAULT_CONFIG_TOML, Endpoints, Governors};
pub use generate::{GenerateArgs, Mode, generate_dataset};
pub use host::Host;
pub use init::{InitArgs, init_config};
pub use progress_reporter::ProgressReporter;
pub use run::run;
