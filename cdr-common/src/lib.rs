//! # Crash Data Refiner Common Library
//!
//! Shared code for the crash-refiner crates including:
//! - Error type shared by configuration and filesystem helpers
//! - Configuration loading and output root resolution
//! - Timestamp and duration formatting utilities

pub mod config;
pub mod error;
pub mod human_time;
pub mod time;

pub use error::{Error, Result};
