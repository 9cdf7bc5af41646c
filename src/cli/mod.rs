//! Command-line interface for the cache maintenance binary.

pub mod args;

pub use args::{Args, Command};
