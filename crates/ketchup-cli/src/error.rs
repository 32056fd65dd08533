//! CLI error types with exit code handling
//!
//! Library errors are folded into [`CliError`], which carries the exit code
//! and renders as a `miette` diagnostic.

use ketchup_core::{ArchiveError, CoreError};
use ketchup_kube::{CollectError, SessionError};
use miette::Diagnostic;
use thiserror::Error;

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum CliError {
    /// Config file, signature table or option value is invalid
    #[error("Configuration error: {message}")]
    #[diagnostic(code(ketchup::cli::config))]
    Config {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// No usable cluster session
    #[error("Cannot reach the cluster: {message}")]
    #[diagnostic(
        code(ketchup::cli::session),
        help("check the kubeconfig path, its current context and network access to the API server")
    )]
    Session { message: String },

    #[error("Archive error: {message}")]
    #[diagnostic(code(ketchup::cli::archive))]
    Archive { message: String },

    /// Run directory or summary could not be written
    #[error("Output error: {message}")]
    #[diagnostic(code(ketchup::cli::output))]
    Output {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Internal error (runtime, unexpected failure)
    #[error("Internal error: {message}")]
    #[diagnostic(code(ketchup::cli::internal))]
    Internal { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config { .. } => exit_codes::CONFIG_ERROR,
            CliError::Session { .. } => exit_codes::SESSION_ERROR,
            CliError::Archive { .. } => exit_codes::ARCHIVE_ERROR,
            CliError::Output { .. } => exit_codes::OUTPUT_ERROR,
            CliError::Internal { .. } => exit_codes::ERROR,
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: None,
        }
    }

    pub fn config_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        CliError::config(err.to_string())
    }
}

impl From<SessionError> for CliError {
    fn from(err: SessionError) -> Self {
        CliError::Session {
            message: err.to_string(),
        }
    }
}

impl From<ArchiveError> for CliError {
    fn from(err: ArchiveError) -> Self {
        CliError::Archive {
            message: err.to_string(),
        }
    }
}

impl From<CollectError> for CliError {
    fn from(err: CollectError) -> Self {
        match err {
            CollectError::Session(e) => e.into(),
            CollectError::Archive(e) => e.into(),
            CollectError::Config(e) => e.into(),
            CollectError::Output(e) => CliError::Output {
                message: e.to_string(),
                help: Some("choose a writable directory with --output".to_string()),
            },
            CollectError::Write(e) => CliError::Output {
                message: e.to_string(),
                help: None,
            },
            other => CliError::internal(other.to_string()),
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
