//! `guard-agent` library crate.
//!
//! Re-exports internal modules for integration testing. The binary
//! entrypoint lives in `main.rs`.

pub mod registry;
pub mod replay;
pub mod sources;
