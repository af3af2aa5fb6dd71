//! # SiteKit Common
//!
//! Shared logging configuration for the SiteKit crates.

pub mod logging;

pub use logging::{init_logging, LogConfig, LogFormat, LoggingError};
