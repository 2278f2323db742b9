//! Core types, configuration, and utilities for the dossier sync layer.
//!
//! This crate provides:
//! - Config: layered configuration with file and environment overrides
//! - Paths: filesystem locations for the local database and config file
//! - BackoffPolicy: capped exponential backoff with jitter
//! - init_logging: tracing subscriber setup shared by all services

mod backoff;
mod config;
mod error;
mod logging;
mod paths;

pub use backoff::BackoffPolicy;
pub use config::Config;
pub use error::{CoreError, CoreResult};
pub use logging::init_logging;
pub use paths::Paths;
