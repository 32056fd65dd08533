//! Ketchup Kube - cluster side of a collection run
//!
//! This crate provides:
//! - **Sources**: [`ClusterSource`] with a live [`KubeSource`] and an
//!   in-memory [`MockClusterSource`]
//! - **Catalog**: the built-in kinds and CRD-derived custom kinds
//! - **Enumerator**: bounded parallel listing with per-request timeouts and a
//!   run deadline
//! - **Collector**: the aggregation loop that sanitizes, writes, detects,
//!   summarizes and archives

pub mod catalog;
pub mod collector;
pub mod enumerator;
pub mod error;
pub mod source;

pub use collector::{Collector, EMBEDDED_SIGNATURES_LABEL, RunReport};
pub use enumerator::{Enumerator, ExecuteStats, FetchOutcome, Plan, WorkItem};
pub use error::{CollectError, FetchError, Result, SessionError};
pub use source::{ClusterSource, KubeSource, MockClusterSource};
