//! Ketchup Core - data model and offline stages of a cluster collection
//!
//! This crate holds everything that does not talk to a cluster:
//! - `ResourceRecord`: one collected object and where it came from
//! - `CollectionRun` / `CollectorConfig`: what a run does and how
//! - `Sanitizer`: reapply-safe normalization
//! - `detection`: platform fingerprinting against a signature table
//! - `OutputOrganizer` / `CollectionSummary`: the on-disk tree and its summary
//! - `archive`: packaging and inspection of run archives

pub mod archive;
pub mod config;
pub mod detection;
pub mod error;
pub mod output;
pub mod record;
pub mod run;
pub mod sanitize;
pub mod summary;

pub use archive::{ArchiveEntry, ArchiveInfo, create_archive, extract_archive, list_archive};
pub use config::{CollectorConfig, NodePortRange, SanitizeConfig, SanitizeFailurePolicy};
pub use detection::{AnalysisReport, DetectionAccumulator, DetectionResult, SignatureTable};
pub use error::{ArchiveError, CoreError, OutputError, Result, SanitizeError, WriteError};
pub use output::OutputOrganizer;
pub use record::{KindDescriptor, ResourceCategory, ResourceRecord, ResourceScope};
pub use run::{CollectionRun, CompressionMode, FileFormat, NamespaceFilter, OutputFormat};
pub use sanitize::{KindShape, Sanitizer};
pub use summary::CollectionSummary;
