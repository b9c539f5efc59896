//! wcag-audit CLI library
//!
//! Command-line front end for the wcag-audit engine: reads a local HTML
//! file, runs one audit and prints the report as JSON on stdout.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

mod commands;
mod error;
pub mod logging;
mod runner;

pub use commands::Cli;
pub use error::{CliError, CliResult};
pub use runner::{audit, exit_code, exit_status, load_config, render, EXIT_NON_COMPLIANT};
