//! CLI module for the car-dataset tool
//!
//! This module is only available when the "cli" feature is enabled.

mod config;
#[path = "main.rs"]
mod main_impl;
mod progress;

pub use main_impl::{main, Cli, CollectArgs, Command, ModelCommand, PreprocessArgs, RemoverKind};
pub use progress::IndicatifReporter;
