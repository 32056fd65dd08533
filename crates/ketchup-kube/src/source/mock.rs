//! In-memory cluster source for testing
//!
//! Objects, failures and delays are registered per (type name, namespace)
//! before the source is used; afterwards it is read-only apart from the list
//! counter.

use async_trait::async_trait;
use ketchup_core::KindDescriptor;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::ClusterSource;
use crate::error::FetchError;

type Key = (String, Option<String>);

fn key(type_name: &str, namespace: Option<&str>) -> Key {
    (type_name.to_string(), namespace.map(String::from))
}

/// Scripted cluster for unit tests
#[derive(Clone)]
pub struct MockClusterSource {
    version: Result<String, FetchError>,
    objects: HashMap<Key, Vec<Value>>,
    failures: HashMap<Key, FetchError>,
    delays: HashMap<Key, Duration>,
    lists: Arc<AtomicUsize>,
}

impl MockClusterSource {
    /// An empty cluster reporting version `v1.31.0`
    pub fn new() -> Self {
        Self {
            version: Ok("v1.31.0".to_string()),
            objects: HashMap::new(),
            failures: HashMap::new(),
            delays: HashMap::new(),
            lists: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_version(mut self, version: &str) -> Self {
        self.version = Ok(version.to_string());
        self
    }

    pub fn with_version_error(mut self, error: FetchError) -> Self {
        self.version = Err(error);
        self
    }

    /// Add a Namespace object
    pub fn with_namespace(self, name: &str) -> Self {
        self.with_object("namespaces", None, json!({"metadata": {"name": name}}))
    }

    /// Add one object to a listing
    pub fn with_object(mut self, type_name: &str, namespace: Option<&str>, object: Value) -> Self {
        self.objects
            .entry(key(type_name, namespace))
            .or_default()
            .push(object);
        self
    }

    /// Add several objects to a listing
    pub fn with_objects(
        mut self,
        type_name: &str,
        namespace: Option<&str>,
        objects: impl IntoIterator<Item = Value>,
    ) -> Self {
        self.objects
            .entry(key(type_name, namespace))
            .or_default()
            .extend(objects);
        self
    }

    /// Make a listing fail
    pub fn with_failure(mut self, type_name: &str, namespace: Option<&str>, error: FetchError) -> Self {
        self.failures.insert(key(type_name, namespace), error);
        self
    }

    /// Make a listing slow
    pub fn with_delay(mut self, type_name: &str, namespace: Option<&str>, delay: Duration) -> Self {
        self.delays.insert(key(type_name, namespace), delay);
        self
    }

    /// Number of list calls made so far
    pub fn list_count(&self) -> usize {
        self.lists.load(Ordering::SeqCst)
    }
}

impl Default for MockClusterSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClusterSource for MockClusterSource {
    async fn server_version(&self) -> Result<String, FetchError> {
        self.version.clone()
    }

    async fn list(
        &self,
        kind: &KindDescriptor,
        namespace: Option<&str>,
        _page_size: u32,
    ) -> Result<Vec<Value>, FetchError> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        let key = key(&kind.type_name(), namespace);

        if let Some(delay) = self.delays.get(&key) {
            tokio::time::sleep(*delay).await;
        }
        if let Some(error) = self.failures.get(&key) {
            return Err(error.clone());
        }
        Ok(self.objects.get(&key).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ketchup_core::ResourceScope;

    fn pods() -> KindDescriptor {
        KindDescriptor::builtin("", "v1", "Pod", "pods", ResourceScope::Namespaced)
    }

    #[tokio::test]
    async fn test_scripted_listings() {
        let source = MockClusterSource::new()
            .with_object("pods", Some("web"), json!({"metadata": {"name": "a"}}))
            .with_failure(
                "pods",
                Some("db"),
                FetchError::Forbidden {
                    message: "no".to_string(),
                },
            );

        assert_eq!(source.list(&pods(), Some("web"), 10).await.unwrap().len(), 1);
        assert!(source.list(&pods(), Some("other"), 10).await.unwrap().is_empty());
        assert!(matches!(
            source.list(&pods(), Some("db"), 10).await,
            Err(FetchError::Forbidden { .. })
        ));
        assert_eq!(source.list_count(), 3);
        assert_eq!(source.server_version().await.unwrap(), "v1.31.0");
    }
}
