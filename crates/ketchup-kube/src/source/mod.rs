//! Cluster sources
//!
//! A [`ClusterSource`] is the only thing the enumerator knows about the
//! cluster: it can report the server version and list one resource type in
//! one scope. Two implementations are provided:
//! - [`KubeSource`]: a real API server through `kube`
//! - [`MockClusterSource`]: in-memory objects and scripted failures for tests

mod live;
mod mock;

pub use live::KubeSource;
pub use mock::MockClusterSource;

use async_trait::async_trait;
use ketchup_core::KindDescriptor;
use serde_json::Value;

use crate::error::FetchError;

/// Read-only access to a cluster
///
/// Implementations must be Send + Sync; list calls run concurrently.
#[async_trait]
pub trait ClusterSource: Send + Sync + 'static {
    /// Version string reported by the API server
    async fn server_version(&self) -> Result<String, FetchError>;

    /// List every object of `kind`, following continuation tokens
    ///
    /// `namespace` is `None` for cluster-scoped kinds.
    async fn list(
        &self,
        kind: &KindDescriptor,
        namespace: Option<&str>,
        page_size: u32,
    ) -> Result<Vec<Value>, FetchError>;
}
