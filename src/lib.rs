// ABOUTME: Library root for dokku - exposes the pipeline components for the binary and tests.
// ABOUTME: The main binary is in main.rs.

pub mod build;
pub mod cleanup;
pub mod config;
pub mod deploy;
pub mod diagnostics;
pub mod error;
pub mod hooks;
pub mod output;
pub mod pipeline;
pub mod plugins;
pub mod privilege;
pub mod process;
pub mod registry;
pub mod release;
pub mod runtime;
pub mod types;
