//! # LedgerLens Common Library
//!
//! Shared code for LedgerLens crates:
//! - Error type and Result alias
//! - TOML configuration loading and resolution
//! - Tracing bootstrap
//! - Pipeline event types and EventBus

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
