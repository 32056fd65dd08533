//! Resource records produced by enumeration
//!
//! A [`ResourceRecord`] is one object returned by a list call, together with
//! the [`KindDescriptor`] of the list it came from. Bodies stay as JSON values
//! so unknown fields survive untouched.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CoreError, Result};

/// Whether a kind lives in a namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceScope {
    Cluster,
    Namespaced,
}

/// Everything needed to list one resource type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KindDescriptor {
    /// API group ("" for the core group)
    pub group: String,
    pub version: String,
    pub kind: String,
    /// Lowercase plural used in API paths
    pub plural: String,
    pub scope: ResourceScope,
    /// Discovered from a CustomResourceDefinition
    pub custom: bool,
}

impl KindDescriptor {
    /// Descriptor for a built-in kind
    pub fn builtin(group: &str, version: &str, kind: &str, plural: &str, scope: ResourceScope) -> Self {
        Self {
            group: group.to_string(),
            version: version.to_string(),
            kind: kind.to_string(),
            plural: plural.to_string(),
            scope,
            custom: false,
        }
    }

    /// The `apiVersion` string for this kind
    ///
    /// - group="apps", version="v1" -> "apps/v1"
    /// - group="", version="v1" -> "v1"
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    /// Directory name used for this type in the output tree
    ///
    /// Built-ins use their plural; custom kinds are qualified by group since
    /// plurals are only unique within a group.
    pub fn type_name(&self) -> String {
        if self.custom && !self.group.is_empty() {
            format!("{}.{}", self.plural, self.group)
        } else {
            self.plural.clone()
        }
    }

    pub fn is_namespaced(&self) -> bool {
        self.scope == ResourceScope::Namespaced
    }
}

/// One collected object
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceRecord {
    pub api_group: String,
    pub api_version: String,
    pub kind: String,
    pub type_name: String,
    pub scope: ResourceScope,
    pub custom: bool,
    /// Empty for cluster-scoped records
    pub namespace: String,
    pub name: String,
    pub raw: Value,
    pub sanitized: Option<Value>,
}

impl ResourceRecord {
    /// Build a record from a listed object
    ///
    /// `listed_namespace` is the namespace the list call was scoped to and is
    /// used when the object itself does not carry one. `apiVersion` and `kind`
    /// are filled in when absent, since list responses omit them per item.
    pub fn from_object(
        descriptor: &KindDescriptor,
        listed_namespace: Option<&str>,
        mut body: Value,
    ) -> Result<Self> {
        let object = body.as_object_mut().ok_or_else(|| CoreError::MissingField {
            field: "object body".to_string(),
        })?;

        let api_version = descriptor.api_version();
        object
            .entry("apiVersion")
            .or_insert_with(|| Value::String(api_version.clone()));
        object
            .entry("kind")
            .or_insert_with(|| Value::String(descriptor.kind.clone()));

        let metadata = object.get("metadata").and_then(Value::as_object);
        let name = metadata
            .and_then(|m| m.get("name"))
            .and_then(Value::as_str)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| CoreError::MissingField {
                field: "metadata.name".to_string(),
            })?
            .to_string();

        let namespace = match descriptor.scope {
            ResourceScope::Cluster => String::new(),
            ResourceScope::Namespaced => metadata
                .and_then(|m| m.get("namespace"))
                .and_then(Value::as_str)
                .filter(|ns| !ns.is_empty())
                .or(listed_namespace)
                .filter(|ns| !ns.is_empty())
                .ok_or_else(|| CoreError::MissingField {
                    field: "metadata.namespace".to_string(),
                })?
                .to_string(),
        };

        Ok(Self {
            api_group: descriptor.group.clone(),
            api_version,
            kind: descriptor.kind.clone(),
            type_name: descriptor.type_name(),
            scope: descriptor.scope,
            custom: descriptor.custom,
            namespace,
            name,
            raw: body,
            sanitized: None,
        })
    }

    /// Display name for logging: `namespace/Kind/name` or `Kind/name`
    pub fn display_name(&self) -> String {
        if self.namespace.is_empty() {
            format!("{}/{}", self.kind, self.name)
        } else {
            format!("{}/{}/{}", self.namespace, self.kind, self.name)
        }
    }

    /// The body that should be written: sanitized if available
    pub fn output_body(&self) -> &Value {
        self.sanitized.as_ref().unwrap_or(&self.raw)
    }

    pub fn category(&self) -> ResourceCategory {
        if self.custom {
            ResourceCategory::CustomResource
        } else {
            ResourceCategory::from_kind(&self.kind)
        }
    }
}

/// Resource categories, ordered the way they should be reapplied
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceCategory {
    /// CustomResourceDefinition - reapplied first
    Crd = 0,
    /// Namespace - before anything namespaced
    Namespace = 1,
    /// ResourceQuota, LimitRange
    NamespaceConfig = 2,
    /// ClusterRole, ClusterRoleBinding, Role, RoleBinding, ServiceAccount
    Rbac = 10,
    /// ConfigMap, Secret
    Config = 20,
    /// PersistentVolume, PersistentVolumeClaim, StorageClass
    Storage = 21,
    /// NetworkPolicy, Service, Endpoints, EndpointSlice, Ingress
    Network = 30,
    /// Deployment, StatefulSet, DaemonSet, ReplicaSet, Pod, Job, CronJob
    Workload = 40,
    /// HorizontalPodAutoscaler, PodDisruptionBudget
    Autoscaling = 60,
    /// Node
    Infrastructure = 65,
    /// Instances of CRDs
    CustomResource = 70,
    Other = 100,
}

impl ResourceCategory {
    pub fn from_kind(kind: &str) -> Self {
        match kind {
            "CustomResourceDefinition" => Self::Crd,
            "Namespace" => Self::Namespace,
            "ResourceQuota" | "LimitRange" => Self::NamespaceConfig,
            "ClusterRole" | "ClusterRoleBinding" | "Role" | "RoleBinding" | "ServiceAccount" => {
                Self::Rbac
            }
            "ConfigMap" | "Secret" => Self::Config,
            "PersistentVolume" | "PersistentVolumeClaim" | "StorageClass" => Self::Storage,
            "NetworkPolicy" | "Service" | "Endpoints" | "EndpointSlice" | "Ingress" => {
                Self::Network
            }
            "Deployment" | "StatefulSet" | "DaemonSet" | "ReplicaSet" | "Pod" | "Job"
            | "CronJob" => Self::Workload,
            "HorizontalPodAutoscaler" | "PodDisruptionBudget" => Self::Autoscaling,
            "Node" => Self::Infrastructure,
            _ => Self::Other,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Crd => "customResourceDefinitions",
            Self::Namespace => "namespaces",
            Self::NamespaceConfig => "namespaceConfig",
            Self::Rbac => "rbac",
            Self::Config => "configuration",
            Self::Storage => "storage",
            Self::Network => "networking",
            Self::Workload => "workloads",
            Self::Autoscaling => "autoscaling",
            Self::Infrastructure => "infrastructure",
            Self::CustomResource => "customResources",
            Self::Other => "other",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn deployments() -> KindDescriptor {
        KindDescriptor::builtin("apps", "v1", "Deployment", "deployments", ResourceScope::Namespaced)
    }

    #[test]
    fn test_api_version_core_and_grouped() {
        let pods = KindDescriptor::builtin("", "v1", "Pod", "pods", ResourceScope::Namespaced);
        assert_eq!(pods.api_version(), "v1");
        assert_eq!(deployments().api_version(), "apps/v1");
    }

    #[test]
    fn test_type_name_qualifies_custom_kinds() {
        let mut crd = KindDescriptor::builtin(
            "longhorn.io",
            "v1beta2",
            "Volume",
            "volumes",
            ResourceScope::Namespaced,
        );
        assert_eq!(crd.type_name(), "volumes");
        crd.custom = true;
        assert_eq!(crd.type_name(), "volumes.longhorn.io");
    }

    #[test]
    fn test_from_object_fills_type_meta() {
        let record = ResourceRecord::from_object(
            &deployments(),
            Some("web"),
            json!({"metadata": {"name": "frontend", "namespace": "web"}}),
        )
        .unwrap();

        assert_eq!(record.kind, "Deployment");
        assert_eq!(record.namespace, "web");
        assert_eq!(record.raw["apiVersion"], "apps/v1");
        assert_eq!(record.raw["kind"], "Deployment");
        assert_eq!(record.display_name(), "web/Deployment/frontend");
    }

    #[test]
    fn test_from_object_uses_listed_namespace() {
        let record = ResourceRecord::from_object(
            &deployments(),
            Some("web"),
            json!({"metadata": {"name": "frontend"}}),
        )
        .unwrap();
        assert_eq!(record.namespace, "web");
    }

    #[test]
    fn test_from_object_requires_namespace_for_namespaced() {
        let result =
            ResourceRecord::from_object(&deployments(), None, json!({"metadata": {"name": "x"}}));
        assert!(matches!(result, Err(CoreError::MissingField { .. })));
    }

    #[test]
    fn test_from_object_requires_name() {
        let result = ResourceRecord::from_object(&deployments(), Some("web"), json!({"metadata": {}}));
        assert!(matches!(result, Err(CoreError::MissingField { field }) if field == "metadata.name"));
    }

    #[test]
    fn test_cluster_scoped_ignores_namespace() {
        let nodes = KindDescriptor::builtin("", "v1", "Node", "nodes", ResourceScope::Cluster);
        let record = ResourceRecord::from_object(
            &nodes,
            None,
            json!({"metadata": {"name": "node-1", "namespace": "bogus"}}),
        )
        .unwrap();
        assert_eq!(record.namespace, "");
        assert_eq!(record.display_name(), "Node/node-1");
    }

    #[test]
    fn test_category_ordering() {
        assert!(ResourceCategory::Crd < ResourceCategory::Namespace);
        assert!(ResourceCategory::Namespace < ResourceCategory::Rbac);
        assert!(ResourceCategory::Config < ResourceCategory::Workload);
        assert!(ResourceCategory::Workload < ResourceCategory::CustomResource);
        assert_eq!(ResourceCategory::from_kind("CronJob"), ResourceCategory::Workload);
        assert_eq!(ResourceCategory::from_kind("Widget"), ResourceCategory::Other);
    }
}
