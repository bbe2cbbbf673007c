//! `ltx-worker` library crate.
//!
//! The job handler, its configuration, and the HTTP intake server.
//! The binary entrypoint lives in `main.rs`.

pub mod config;
pub mod error;
pub mod handler;
pub mod server;
