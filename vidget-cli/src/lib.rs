//! Library target for the `vidget` package.
//!
//! The primary deliverable of this package is the `vidget` CLI binary
//! (`src/main.rs`); the modules live here so they can be unit tested.

pub mod batch;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod progress;

#[doc(hidden)]
pub use vidget_engine;
