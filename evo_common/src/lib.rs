//! Common library
//!
//! This crate provides shared constants and configuration loading utilities
//! used across the workspace's crates.
//!
//! # Module Structure
//!
//! - [`shm`] - Shared memory sizing constants
//! - [`config`] - Configuration loading traits and types
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! Add to your `Cargo.toml` with alias for shorter imports:
//! ```toml
//! [dependencies]
//! evo = { package = "evo_common", path = "../evo_common" }
//! ```
//!
//! Then import:
//! ```rust
//! use evo::shm::consts::*;
//! use evo::config::{ConfigLoader, SharedConfig};
//! ```

pub mod config;
pub mod consts;
pub mod prelude;
pub mod shm;
