//! Reapply-safe normalization of resource bodies
//!
//! The sanitizer strips server-populated fields so a collected object can be
//! applied to another cluster. Rules are dispatched on a [`KindShape`]; each
//! shape touches only the fields it knows about and leaves the rest of the
//! body as it was.
//!
//! Sanitization is deterministic and idempotent: running it on its own output
//! returns the same document.

use serde_json::{Map, Value};

use crate::config::{NodePortRange, SanitizeConfig, denylist_matches};
use crate::error::SanitizeError;
use crate::record::ResourceRecord;

/// Annotation placed on records written unsanitized after a failure
pub const SANITIZATION_ANNOTATION: &str = "ketchup.io/sanitization";

/// Value of [`SANITIZATION_ANNOTATION`] on such records
pub const SANITIZATION_FAILED: &str = "failed";

/// Metadata fields assigned by the API server
const SERVER_METADATA_FIELDS: &[&str] = &[
    "uid",
    "resourceVersion",
    "creationTimestamp",
    "generation",
    "managedFields",
    "selfLink",
];

/// Kind-specific sanitization rules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindShape {
    /// Allocated IPs and node ports
    Service,
    /// Binding to a specific volume
    PersistentVolumeClaim,
    /// Binding to a specific claim
    PersistentVolume,
    /// Common metadata rules only
    Generic,
}

impl KindShape {
    /// Shape for a built-in kind; only the core API group has kind-specific rules
    pub fn for_resource(api_group: &str, kind: &str) -> Self {
        if !api_group.is_empty() {
            return Self::Generic;
        }
        match kind {
            "Service" => Self::Service,
            "PersistentVolumeClaim" => Self::PersistentVolumeClaim,
            "PersistentVolume" => Self::PersistentVolume,
            _ => Self::Generic,
        }
    }
}

/// Applies the configured sanitization rules
#[derive(Debug, Clone, Default)]
pub struct Sanitizer {
    config: SanitizeConfig,
}

impl Sanitizer {
    pub fn new(config: SanitizeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SanitizeConfig {
        &self.config
    }

    /// Sanitize a record's raw body
    ///
    /// Custom resources only get the common metadata rules, whatever their kind.
    pub fn sanitize(&self, record: &ResourceRecord) -> Result<Value, SanitizeError> {
        let shape = if record.custom {
            KindShape::Generic
        } else {
            KindShape::for_resource(&record.api_group, &record.kind)
        };
        self.sanitize_shaped(&record.kind, shape, &record.raw)
    }

    /// Sanitize a built-in body that is expected to be of `api_group`/`kind`
    pub fn sanitize_body(
        &self,
        api_group: &str,
        kind: &str,
        body: &Value,
    ) -> Result<Value, SanitizeError> {
        self.sanitize_shaped(kind, KindShape::for_resource(api_group, kind), body)
    }

    fn sanitize_shaped(
        &self,
        kind: &str,
        shape: KindShape,
        body: &Value,
    ) -> Result<Value, SanitizeError> {
        let mut body = body.clone();
        let object = body.as_object_mut().ok_or_else(|| SanitizeError::NotAnObject {
            kind: kind.to_string(),
        })?;

        if let Some(declared) = object.get("kind") {
            match declared.as_str() {
                Some(found) if found == kind => {}
                Some(found) => {
                    return Err(SanitizeError::KindMismatch {
                        expected: kind.to_string(),
                        found: found.to_string(),
                    });
                }
                None => return Err(unexpected(kind, "kind", "string")),
            }
        }

        object.remove("status");

        if let Some(metadata) = object.get_mut("metadata") {
            let metadata = metadata
                .as_object_mut()
                .ok_or_else(|| unexpected(kind, "metadata", "object"))?;
            self.sanitize_metadata(kind, metadata)?;
        }

        if shape != KindShape::Generic {
            if let Some(spec) = object.get_mut("spec") {
                let spec = spec
                    .as_object_mut()
                    .ok_or_else(|| unexpected(kind, "spec", "object"))?;
                match shape {
                    KindShape::Service => {
                        sanitize_service_spec(kind, spec, &self.config.node_port_range)?
                    }
                    KindShape::PersistentVolumeClaim => {
                        spec.remove("volumeName");
                    }
                    KindShape::PersistentVolume => {
                        spec.remove("claimRef");
                    }
                    KindShape::Generic => {}
                }
            }
        }

        Ok(body)
    }

    fn sanitize_metadata(
        &self,
        kind: &str,
        metadata: &mut Map<String, Value>,
    ) -> Result<(), SanitizeError> {
        for field in SERVER_METADATA_FIELDS {
            metadata.remove(*field);
        }

        let drop_annotations = match metadata.get_mut("annotations") {
            None => false,
            Some(Value::Null) => true,
            Some(Value::Object(annotations)) => {
                annotations.retain(|key, _| !denylist_matches(&self.config.annotation_denylist, key));
                annotations.is_empty()
            }
            Some(_) => return Err(unexpected(kind, "metadata.annotations", "object")),
        };
        if drop_annotations {
            metadata.remove("annotations");
        }

        let drop_finalizers = match metadata.get_mut("finalizers") {
            None => false,
            Some(Value::Null) => true,
            Some(Value::Array(finalizers)) => {
                finalizers.retain(|f| match f.as_str() {
                    Some(name) => !denylist_matches(&self.config.finalizer_denylist, name),
                    None => true,
                });
                finalizers.is_empty()
            }
            Some(_) => return Err(unexpected(kind, "metadata.finalizers", "array")),
        };
        if drop_finalizers {
            metadata.remove("finalizers");
        }

        Ok(())
    }
}

fn sanitize_service_spec(
    kind: &str,
    spec: &mut Map<String, Value>,
    node_ports: &NodePortRange,
) -> Result<(), SanitizeError> {
    let headless = spec.get("clusterIP").and_then(Value::as_str) == Some("None");
    if headless {
        let ips_headless = match spec.get("clusterIPs") {
            None => true,
            Some(Value::Array(ips)) => ips.iter().all(|ip| ip.as_str() == Some("None")),
            Some(_) => false,
        };
        if !ips_headless {
            spec.remove("clusterIPs");
        }
    } else {
        spec.remove("clusterIP");
        spec.remove("clusterIPs");
    }

    spec.remove("healthCheckNodePort");

    match spec.get_mut("ports") {
        None | Some(Value::Null) => {}
        Some(Value::Array(ports)) => {
            for (index, port) in ports.iter_mut().enumerate() {
                let port = port.as_object_mut().ok_or_else(|| {
                    unexpected(kind, &format!("spec.ports[{index}]"), "object")
                })?;
                let keep = port
                    .get("nodePort")
                    .and_then(Value::as_u64)
                    .and_then(|p| u16::try_from(p).ok())
                    .is_some_and(|p| p != 0 && !node_ports.contains(p));
                if !keep {
                    port.remove("nodePort");
                }
            }
        }
        Some(_) => return Err(unexpected(kind, "spec.ports", "array")),
    }

    Ok(())
}

fn unexpected(kind: &str, path: &str, expected: &'static str) -> SanitizeError {
    SanitizeError::UnexpectedType {
        kind: kind.to_string(),
        path: path.to_string(),
        expected,
    }
}

/// Mark an unsanitized body as having failed sanitization
///
/// Returns `None` when the body has no usable metadata to annotate; the
/// caller then writes it unmarked.
pub fn mark_sanitization_failed(body: &Value) -> Option<Value> {
    let mut body = body.clone();
    let metadata = body.as_object_mut()?.get_mut("metadata")?.as_object_mut()?;
    let annotations = metadata
        .entry("annotations")
        .or_insert_with(|| Value::Object(Map::new()));
    if annotations.is_null() {
        *annotations = Value::Object(Map::new());
    }
    annotations.as_object_mut()?.insert(
        SANITIZATION_ANNOTATION.to_string(),
        Value::String(SANITIZATION_FAILED.to_string()),
    );
    Some(body)
}
