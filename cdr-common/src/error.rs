//! Errors raised by configuration and filesystem helpers

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file exists but could not be read or parsed
    #[error("Cannot load config {}: {reason}", path.display())]
    Config { path: PathBuf, reason: String },

    #[error("Cannot serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A path that must be a directory is something else
    #[error("Not a directory: {}", .0.display())]
    NotADirectory(PathBuf),
}
