//! Resource types to enumerate
//!
//! The built-in catalog is fixed. Custom kinds are derived from the
//! CustomResourceDefinitions found in the cluster.

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use ketchup_core::{KindDescriptor, ResourceScope};
use serde_json::Value;
use tracing::debug;

use ResourceScope::{Cluster, Namespaced};

/// (group, version, kind, plural, scope)
const BUILTINS: &[(&str, &str, &str, &str, ResourceScope)] = &[
    ("", "v1", "Namespace", "namespaces", Cluster),
    ("apiextensions.k8s.io", "v1", "CustomResourceDefinition", "customresourcedefinitions", Cluster),
    ("", "v1", "Node", "nodes", Cluster),
    ("rbac.authorization.k8s.io", "v1", "ClusterRole", "clusterroles", Cluster),
    ("rbac.authorization.k8s.io", "v1", "ClusterRoleBinding", "clusterrolebindings", Cluster),
    ("", "v1", "PersistentVolume", "persistentvolumes", Cluster),
    ("storage.k8s.io", "v1", "StorageClass", "storageclasses", Cluster),
    ("", "v1", "Pod", "pods", Namespaced),
    ("apps", "v1", "Deployment", "deployments", Namespaced),
    ("apps", "v1", "ReplicaSet", "replicasets", Namespaced),
    ("apps", "v1", "DaemonSet", "daemonsets", Namespaced),
    ("apps", "v1", "StatefulSet", "statefulsets", Namespaced),
    ("batch", "v1", "Job", "jobs", Namespaced),
    ("batch", "v1", "CronJob", "cronjobs", Namespaced),
    ("", "v1", "Service", "services", Namespaced),
    ("", "v1", "Endpoints", "endpoints", Namespaced),
    ("discovery.k8s.io", "v1", "EndpointSlice", "endpointslices", Namespaced),
    ("networking.k8s.io", "v1", "Ingress", "ingresses", Namespaced),
    ("networking.k8s.io", "v1", "NetworkPolicy", "networkpolicies", Namespaced),
    ("", "v1", "ConfigMap", "configmaps", Namespaced),
    ("", "v1", "Secret", "secrets", Namespaced),
    ("", "v1", "PersistentVolumeClaim", "persistentvolumeclaims", Namespaced),
    ("", "v1", "ServiceAccount", "serviceaccounts", Namespaced),
    ("rbac.authorization.k8s.io", "v1", "Role", "roles", Namespaced),
    ("rbac.authorization.k8s.io", "v1", "RoleBinding", "rolebindings", Namespaced),
    ("", "v1", "ResourceQuota", "resourcequotas", Namespaced),
    ("", "v1", "LimitRange", "limitranges", Namespaced),
    ("autoscaling", "v2", "HorizontalPodAutoscaler", "horizontalpodautoscalers", Namespaced),
    ("policy", "v1", "PodDisruptionBudget", "poddisruptionbudgets", Namespaced),
];

/// Every built-in kind, cluster-scoped first
pub fn builtin_kinds() -> Vec<KindDescriptor> {
    BUILTINS
        .iter()
        .map(|(group, version, kind, plural, scope)| {
            KindDescriptor::builtin(group, version, kind, plural, *scope)
        })
        .collect()
}

/// Descriptor used to list namespaces
pub fn namespaces() -> KindDescriptor {
    KindDescriptor::builtin("", "v1", "Namespace", "namespaces", Cluster)
}

/// Descriptor used to list CustomResourceDefinitions
pub fn custom_resource_definitions() -> KindDescriptor {
    KindDescriptor::builtin(
        "apiextensions.k8s.io",
        "v1",
        "CustomResourceDefinition",
        "customresourcedefinitions",
        Cluster,
    )
}

/// Turn a CRD body into the descriptor of its custom kind
///
/// Uses the storage version when it is served, else the first served
/// version. Returns `None` for CRDs that cannot be decoded or serve nothing.
pub fn custom_kind(crd: &Value) -> Option<KindDescriptor> {
    let crd: CustomResourceDefinition = match serde_json::from_value(crd.clone()) {
        Ok(crd) => crd,
        Err(e) => {
            debug!(error = %e, "skipping undecodable CustomResourceDefinition");
            return None;
        }
    };

    let spec = &crd.spec;
    let version = spec
        .versions
        .iter()
        .find(|v| v.served && v.storage)
        .or_else(|| spec.versions.iter().find(|v| v.served))?;

    let scope = match spec.scope.as_str() {
        "Cluster" => Cluster,
        _ => Namespaced,
    };

    Some(KindDescriptor {
        group: spec.group.clone(),
        version: version.name.clone(),
        kind: spec.names.kind.clone(),
        plural: spec.names.plural.clone(),
        scope,
        custom: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn crd(scope: &str, versions: Value) -> Value {
        json!({
            "apiVersion": "apiextensions.k8s.io/v1",
            "kind": "CustomResourceDefinition",
            "metadata": {"name": "volumes.longhorn.io"},
            "spec": {
                "group": "longhorn.io",
                "names": {"kind": "Volume", "plural": "volumes", "singular": "volume", "listKind": "VolumeList"},
                "scope": scope,
                "versions": versions
            }
        })
    }

    #[test]
    fn test_builtin_catalog() {
        let kinds = builtin_kinds();
        assert_eq!(kinds.len(), 29);
        assert_eq!(kinds.iter().filter(|k| k.scope == Cluster).count(), 7);
        assert!(kinds.iter().all(|k| !k.custom));

        let hpa = kinds.iter().find(|k| k.plural == "horizontalpodautoscalers").unwrap();
        assert_eq!(hpa.api_version(), "autoscaling/v2");
        assert_eq!(namespaces().kind, "Namespace");
        assert_eq!(custom_resource_definitions().group, "apiextensions.k8s.io");
    }

    #[test]
    fn test_custom_kind_prefers_served_storage_version() {
        let descriptor = custom_kind(&crd(
            "Namespaced",
            json!([
                {"name": "v1beta1", "served": true, "storage": false},
                {"name": "v1beta2", "served": true, "storage": true}
            ]),
        ))
        .unwrap();

        assert_eq!(descriptor.version, "v1beta2");
        assert_eq!(descriptor.scope, Namespaced);
        assert!(descriptor.custom);
        assert_eq!(descriptor.type_name(), "volumes.longhorn.io");
    }

    #[test]
    fn test_custom_kind_falls_back_to_first_served() {
        let descriptor = custom_kind(&crd(
            "Cluster",
            json!([
                {"name": "v1alpha1", "served": false, "storage": true},
                {"name": "v1beta1", "served": true, "storage": false}
            ]),
        ))
        .unwrap();

        assert_eq!(descriptor.version, "v1beta1");
        assert_eq!(descriptor.scope, Cluster);
    }

    #[test]
    fn test_custom_kind_without_served_version() {
        assert!(custom_kind(&crd(
            "Namespaced",
            json!([{"name": "v1", "served": false, "storage": true}])
        ))
        .is_none());
        assert!(custom_kind(&json!({"metadata": {"name": "broken"}})).is_none());
    }
}
