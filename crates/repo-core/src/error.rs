//! Structured error types produced by configuration, initialization, and the
//! per-call repository operations.

use std::io;

use anyhow::Error as AnyError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("invalid repository configuration: {0}")]
    Config(String),
    #[error("failed to initialise repository `{name}`: {source}")]
    Init {
        name: String,
        #[source]
        source: AnyError,
    },
    #[error("artifact digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },
    #[error("uploaded file is not a usable bundle: {0}")]
    Bundle(#[source] AnyError),
    #[error("error during artifact upload: {source}")]
    Upload {
        #[source]
        source: AnyError,
    },
    #[error("artifact was not uploaded")]
    NotUploaded,
    #[error("remote repository query failed: {0}")]
    Remote(#[source] AnyError),
    #[error("fallback index failure: {0}")]
    Index(#[source] AnyError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl RepoError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn init(name: impl Into<String>, source: AnyError) -> Self {
        Self::Init {
            name: name.into(),
            source,
        }
    }

    pub fn upload(source: AnyError) -> Self {
        Self::Upload { source }
    }
}

pub type Result<T, E = RepoError> = std::result::Result<T, E>;
