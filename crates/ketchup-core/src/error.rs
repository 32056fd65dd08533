//! Core error types

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Invalid signature table: {message}")]
    InvalidSignatures { message: String },

    #[error("Invalid value '{value}' for {option} (expected one of: {expected})")]
    InvalidOption {
        option: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("Resource object is missing {field}")]
    MissingField { field: String },
}

pub type Result<T> = std::result::Result<T, CoreError>;

/// A record body does not have the shape its kind requires
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SanitizeError {
    #[error("{kind} body is not an object")]
    NotAnObject { kind: String },

    #[error("{kind} field '{path}' has unexpected type (expected {expected})")]
    UnexpectedType {
        kind: String,
        path: String,
        expected: &'static str,
    },

    #[error("body declares kind '{found}' but record is {expected}")]
    KindMismatch { expected: String, found: String },
}

/// A single resource file could not be written
#[derive(Error, Debug)]
pub enum WriteError {
    #[error("failed to serialize {path}: {message}")]
    Serialize { path: PathBuf, message: String },

    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("output path {path} is already used by another resource")]
    Collision { path: PathBuf },
}

/// The run directory cannot be prepared
#[derive(Error, Debug)]
#[error("cannot create run directory {path}: {source}")]
pub struct OutputError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Packaging the run directory failed
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("failed to create archive {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to add {entry} to archive: {source}")]
    Append {
        entry: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to walk {path}: {message}")]
    Walk { path: PathBuf, message: String },

    #[error("failed to read archive {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("file not found in archive: {0}")]
    EntryNotFound(String),
}
