//! Work planning and bounded parallel listing
//!
//! A run lists namespaces and CustomResourceDefinitions first, then fans out
//! one list request per (kind, namespace) pair. At most `concurrency` requests
//! are in flight; each one has its own timeout, and the whole batch is cut
//! short when the run deadline passes.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use ketchup_core::{CollectionRun, CollectorConfig, KindDescriptor, NamespaceFilter};
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::catalog;
use crate::error::FetchError;
use crate::source::ClusterSource;

/// One list request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub kind: KindDescriptor,
    /// `None` for cluster-scoped kinds
    pub namespace: Option<String>,
}

impl WorkItem {
    pub fn cluster(kind: KindDescriptor) -> Self {
        Self {
            kind,
            namespace: None,
        }
    }

    pub fn namespaced(kind: KindDescriptor, namespace: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: Some(namespace.into()),
        }
    }

    pub fn type_name(&self) -> String {
        self.kind.type_name()
    }
}

/// Result of one list request
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub item: WorkItem,
    pub result: Result<Vec<Value>, FetchError>,
}

/// What a run is going to list
#[derive(Debug, Default)]
pub struct Plan {
    /// Namespaces that will be listed
    pub targets: BTreeSet<String>,
    /// Requested namespaces the cluster does not have
    pub missing: BTreeSet<String>,
    /// Requests still to execute
    pub items: Vec<WorkItem>,
    /// Outcomes of the namespace and CRD listings
    pub bootstrap: Vec<FetchOutcome>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecuteStats {
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub deadline_exceeded: bool,
}

/// Plans and executes list requests against a [`ClusterSource`]
pub struct Enumerator<S> {
    source: Arc<S>,
    concurrency: usize,
    fetch_timeout: Duration,
    page_size: u32,
    deadline: Option<Instant>,
}

impl<S: ClusterSource> Enumerator<S> {
    /// The run deadline, if any, starts counting now
    pub fn new(source: Arc<S>, config: &CollectorConfig) -> Self {
        Self {
            source,
            concurrency: config.concurrency.max(1),
            fetch_timeout: config.fetch_timeout,
            page_size: config.page_size,
            deadline: config.run_deadline.map(|d| Instant::now() + d),
        }
    }

    pub fn deadline_passed(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// List namespaces and CRDs, then derive every remaining request
    ///
    /// When the namespace listing fails an explicit filter is used as given;
    /// with `all` no namespaced kind can be listed.
    pub async fn plan(&self, run: &CollectionRun) -> Plan {
        let mut bootstrap = Vec::new();
        let bootstrap_items = vec![
            WorkItem::cluster(catalog::namespaces()),
            WorkItem::cluster(catalog::custom_resource_definitions()),
        ];
        self.execute(bootstrap_items, |outcome| bootstrap.push(outcome))
            .await;

        let visible: Option<BTreeSet<String>> = listing(&bootstrap, "namespaces").map(|objects| {
            objects
                .iter()
                .filter_map(|o| o.pointer("/metadata/name").and_then(Value::as_str))
                .map(String::from)
                .collect()
        });

        let (targets, missing) = match (&visible, &run.namespace_filter) {
            (Some(visible), filter) => filter.resolve(visible),
            (None, NamespaceFilter::Only(names)) => {
                warn!("namespace listing failed; using the requested namespaces as given");
                (names.clone(), BTreeSet::new())
            }
            (None, NamespaceFilter::All) => {
                warn!("namespace listing failed; namespaced resources will not be collected");
                (BTreeSet::new(), BTreeSet::new())
            }
        };
        if !missing.is_empty() {
            warn!(missing = ?missing, "requested namespaces do not exist");
        }

        let mut custom: BTreeMap<String, KindDescriptor> = BTreeMap::new();
        if run.include_custom_resources {
            for crd in listing(&bootstrap, "customresourcedefinitions").into_iter().flatten() {
                if let Some(kind) = catalog::custom_kind(crd) {
                    custom.entry(kind.type_name()).or_insert(kind);
                }
            }
        }

        let bootstrap_kinds = [
            catalog::namespaces().type_name(),
            catalog::custom_resource_definitions().type_name(),
        ];
        let kinds = catalog::builtin_kinds()
            .into_iter()
            .filter(|k| !bootstrap_kinds.contains(&k.type_name()))
            .chain(custom.into_values());

        let mut items = Vec::new();
        for kind in kinds {
            if kind.is_namespaced() {
                items.extend(targets.iter().map(|ns| WorkItem::namespaced(kind.clone(), ns)));
            } else {
                items.push(WorkItem::cluster(kind));
            }
        }

        info!(
            namespaces = targets.len(),
            requests = items.len(),
            "planned collection"
        );

        Plan {
            targets,
            missing,
            items,
            bootstrap,
        }
    }

    /// Run every request, handing each outcome to `on_outcome` as it arrives
    ///
    /// Every item produces exactly one outcome. Requests still pending when
    /// the deadline passes are reported as [`FetchError::Cancelled`].
    pub async fn execute<F>(&self, items: Vec<WorkItem>, mut on_outcome: F) -> ExecuteStats
    where
        F: FnMut(FetchOutcome),
    {
        let mut stats = ExecuteStats::default();

        if self.deadline_passed() {
            stats.deadline_exceeded = true;
            for item in items {
                stats.cancelled += 1;
                on_outcome(FetchOutcome {
                    item,
                    result: Err(FetchError::Cancelled),
                });
            }
            return stats;
        }

        debug!(
            requests = items.len(),
            concurrency = self.concurrency,
            "starting list requests"
        );

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut pending: BTreeMap<usize, WorkItem> = BTreeMap::new();
        let mut tasks = JoinSet::new();

        for (index, item) in items.into_iter().enumerate() {
            let source = Arc::clone(&self.source);
            let semaphore = Arc::clone(&semaphore);
            let kind = item.kind.clone();
            let namespace = item.namespace.clone();
            let timeout = self.fetch_timeout;
            let page_size = self.page_size;
            pending.insert(index, item);

            tasks.spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => {
                        let list = source.list(&kind, namespace.as_deref(), page_size);
                        match tokio::time::timeout(timeout, list).await {
                            Ok(result) => result,
                            Err(_) => Err(FetchError::Timeout { after: timeout }),
                        }
                    }
                    Err(_) => Err(FetchError::Cancelled),
                };
                (index, result)
            });
        }

        loop {
            let joined = match self.deadline {
                Some(deadline) => tokio::select! {
                    joined = tasks.join_next() => joined,
                    _ = tokio::time::sleep_until(deadline) => {
                        stats.deadline_exceeded = true;
                        break;
                    }
                },
                None => tasks.join_next().await,
            };

            match joined {
                None => break,
                Some(Ok((index, result))) => {
                    if let Some(item) = pending.remove(&index) {
                        deliver(&mut stats, &mut on_outcome, item, result);
                    }
                }
                Some(Err(e)) => warn!(error = %e, "list task did not complete"),
            }
        }

        if stats.deadline_exceeded {
            tasks.abort_all();
            while let Some(joined) = tasks.join_next().await {
                if let Ok((index, result)) = joined {
                    if let Some(item) = pending.remove(&index) {
                        deliver(&mut stats, &mut on_outcome, item, result);
                    }
                }
            }
            warn!(
                cancelled = pending.len(),
                "run deadline exceeded; pending requests cancelled"
            );
        }

        for item in pending.into_values() {
            let result = if stats.deadline_exceeded {
                Err(FetchError::Cancelled)
            } else {
                Err(FetchError::Transport("list task panicked".to_string()))
            };
            deliver(&mut stats, &mut on_outcome, item, result);
        }

        stats
    }
}

fn listing<'a>(outcomes: &'a [FetchOutcome], plural: &str) -> Option<&'a Vec<Value>> {
    outcomes
        .iter()
        .find(|o| o.item.kind.plural == plural)
        .and_then(|o| o.result.as_ref().ok())
}

fn deliver<F: FnMut(FetchOutcome)>(
    stats: &mut ExecuteStats,
    on_outcome: &mut F,
    item: WorkItem,
    result: Result<Vec<Value>, FetchError>,
) {
    let scope = item.namespace.as_deref().unwrap_or("<cluster>");
    match &result {
        Ok(objects) => {
            stats.succeeded += 1;
            debug!(kind = %item.type_name(), namespace = scope, count = objects.len(), "listed");
        }
        Err(e) if e.is_cancelled() => stats.cancelled += 1,
        Err(e) => {
            stats.failed += 1;
            warn!(kind = %item.type_name(), namespace = scope, error = %e, "list request failed");
        }
    }
    on_outcome(FetchOutcome { item, result });
}
