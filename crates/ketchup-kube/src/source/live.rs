//! Cluster source backed by a Kubernetes API server

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use ketchup_core::KindDescriptor;
use kube::{
    Client, Config,
    api::{Api, DynamicObject, ListParams},
    config::{KubeConfigOptions, Kubeconfig},
    discovery::ApiResource,
};
use serde_json::Value;
use tracing::{debug, instrument};

use super::ClusterSource;
use crate::error::{FetchError, SessionError};

/// Lists resources through a `kube::Client`
#[derive(Clone)]
pub struct KubeSource {
    client: Client,
}

impl KubeSource {
    /// Build a client from a kubeconfig file
    ///
    /// `timeout` bounds connecting and reading on every request.
    pub async fn connect(kubeconfig: &Path, timeout: Duration) -> Result<Self, SessionError> {
        let config_err = |message: String| SessionError::Kubeconfig {
            path: kubeconfig.to_path_buf(),
            message,
        };

        let raw = Kubeconfig::read_from(kubeconfig).map_err(|e| config_err(e.to_string()))?;
        let mut config = Config::from_custom_kubeconfig(raw, &KubeConfigOptions::default())
            .await
            .map_err(|e| config_err(e.to_string()))?;
        config.connect_timeout = Some(timeout);
        config.read_timeout = Some(timeout);

        let client = Client::try_from(config).map_err(|e| SessionError::Client(e.to_string()))?;
        Ok(Self { client })
    }

    /// Confirm the API server answers; returns its version
    pub async fn probe(&self) -> Result<String, SessionError> {
        self.server_version()
            .await
            .map_err(|e| SessionError::Unreachable(e.to_string()))
    }

    fn api(&self, kind: &KindDescriptor, namespace: Option<&str>) -> Api<DynamicObject> {
        let resource = ApiResource {
            group: kind.group.clone(),
            version: kind.version.clone(),
            api_version: kind.api_version(),
            kind: kind.kind.clone(),
            plural: kind.plural.clone(),
        };
        match namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &resource),
            None => Api::all_with(self.client.clone(), &resource),
        }
    }
}

#[async_trait]
impl ClusterSource for KubeSource {
    async fn server_version(&self) -> Result<String, FetchError> {
        let info = self.client.apiserver_version().await?;
        Ok(info.git_version)
    }

    #[instrument(skip_all, fields(kind = %kind.type_name(), namespace = namespace.unwrap_or("")))]
    async fn list(
        &self,
        kind: &KindDescriptor,
        namespace: Option<&str>,
        page_size: u32,
    ) -> Result<Vec<Value>, FetchError> {
        let api = self.api(kind, namespace);
        let mut items = Vec::new();
        let mut continue_token: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let mut params = ListParams::default().limit(page_size);
            if let Some(token) = &continue_token {
                params = params.continue_token(token);
            }

            let list = api.list(&params).await?;
            pages += 1;
            for object in list.items {
                let value =
                    serde_json::to_value(&object).map_err(|e| FetchError::Decode(e.to_string()))?;
                items.push(value);
            }

            continue_token = list.metadata.continue_.filter(|t| !t.is_empty());
            if continue_token.is_none() {
                break;
            }
        }

        debug!(items = items.len(), pages, "listed");
        Ok(items)
    }
}
