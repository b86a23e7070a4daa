use std::{io, path::PathBuf};

use crate::logging::RotationUnit;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed opening log target {path}: {source}")]
    Open { path: PathBuf, source: io::Error },

    #[error("failed writing log record: {0}")]
    Io(#[from] io::Error),

    #[error("rotation every {interval} x {unit} is not supported, the interval must be at least 1")]
    UnsupportedRotation { unit: RotationUnit, interval: u32 },

    #[error("invalid rotation unit `{0}`")]
    InvalidRotationUnit(String),

    #[error("invalid log level `{0}`")]
    InvalidLevel(String),

    #[error("invalid log format `{format}`: {reason}")]
    InvalidFormat { format: String, reason: String },

    #[error("failed reading config file {path}: {source}")]
    ReadConfig { path: PathBuf, source: io::Error },

    #[error("failed parsing config file {path}: {source}")]
    ParseConfig {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("failed installing global logger: {0}")]
    SetLogger(#[from] log::SetLoggerError),
}

impl Error {
    /// True when a target could not be opened because access was denied.
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Error::Open { source, .. } if source.kind() == io::ErrorKind::PermissionDenied)
    }
}
