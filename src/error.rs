//! Error types for profile generation.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{} does not exist", .0.display())]
    MissingFile(PathBuf),

    #[error("{} does not exist", .0.display())]
    MissingDirectory(PathBuf),

    #[error("Could not extract signing identity from {}", .0.display())]
    IdentityNotFound(PathBuf),

    #[error("Missing dependency: {0}")]
    MissingDependency(String),

    #[error("Command execution failed: {0}")]
    CommandExecution(String),

    #[error("Keychain operation failed: {0}")]
    KeychainOperation(String),

    #[error("Invalid provisioning profile {}: {reason}", .path.display())]
    InvalidProfile { path: PathBuf, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Property list error: {0}")]
    Plist(#[from] plist::Error),

    #[error("Config parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Base64 decoding error: {0}")]
    Base64(#[from] base64::DecodeError),
}
