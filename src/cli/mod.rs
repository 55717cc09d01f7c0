//! Command-line front end for the archiver.

mod commands;
mod helpers;

pub use commands::{is_verbose, run};
