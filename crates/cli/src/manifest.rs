//! Manifest documents the CLI knows how to converge.

use anyhow::{bail, Context, Result};
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment};
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service, ServiceAccount};
use recon_core::Managed;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::warn;

/// Server-populated metadata dropped from the desired body.
const SERVER_FIELDS: &[&str] = &["resourceVersion", "uid", "creationTimestamp", "generation", "managedFields"];

#[derive(Debug, Clone)]
pub enum Manifest {
    ConfigMap(ConfigMap),
    Secret(Secret),
    Service(Service),
    ServiceAccount(ServiceAccount),
    Deployment(Deployment),
    DaemonSet(DaemonSet),
}

/// Run `$body` with `$obj` bound to the typed object inside a [`Manifest`].
macro_rules! with_object {
    ($m:expr, $obj:ident => $body:expr) => {
        match $m {
            $crate::manifest::Manifest::ConfigMap($obj) => $body,
            $crate::manifest::Manifest::Secret($obj) => $body,
            $crate::manifest::Manifest::Service($obj) => $body,
            $crate::manifest::Manifest::ServiceAccount($obj) => $body,
            $crate::manifest::Manifest::Deployment($obj) => $body,
            $crate::manifest::Manifest::DaemonSet($obj) => $body,
        }
    };
}
pub(crate) use with_object;

impl Manifest {
    /// Decode one document. Server-populated metadata is dropped so the object
    /// can be created as is.
    pub fn from_value(mut doc: Value) -> Result<Self> {
        strip_server_fields(&mut doc);
        let kind = doc.get("kind").and_then(Value::as_str).unwrap_or_default().to_string();
        let m = match kind.as_str() {
            "ConfigMap" => Manifest::ConfigMap(serde_json::from_value(doc)?),
            "Secret" => Manifest::Secret(serde_json::from_value(doc)?),
            "Service" => Manifest::Service(serde_json::from_value(doc)?),
            "ServiceAccount" => Manifest::ServiceAccount(serde_json::from_value(doc)?),
            "Deployment" => Manifest::Deployment(serde_json::from_value(doc)?),
            "DaemonSet" => Manifest::DaemonSet(serde_json::from_value(doc)?),
            "" => bail!("document has no kind"),
            other => bail!("unsupported kind: {}", other),
        };
        Ok(m)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Manifest::ConfigMap(_) => "ConfigMap",
            Manifest::Secret(_) => "Secret",
            Manifest::Service(_) => "Service",
            Manifest::ServiceAccount(_) => "ServiceAccount",
            Manifest::Deployment(_) => "Deployment",
            Manifest::DaemonSet(_) => "DaemonSet",
        }
    }

    pub fn name(&self) -> Option<&str> {
        with_object!(self, o => o.metadata.name.as_deref())
    }

    pub fn namespace(&self) -> Option<&str> {
        with_object!(self, o => o.metadata.namespace.as_deref())
    }

    pub fn set_namespace(&mut self, ns: &str) {
        with_object!(self, o => o.metadata.namespace = Some(ns.to_string()))
    }
}

/// Parse a multi-document YAML stream. Empty documents are skipped.
pub fn parse_manifests(text: &str) -> Result<Vec<Manifest>> {
    let mut out = Vec::new();
    for (i, doc) in serde_yaml::Deserializer::from_str(text).enumerate() {
        let value = Value::deserialize(doc).with_context(|| format!("document {}: invalid YAML", i + 1))?;
        if value.is_null() {
            continue;
        }
        out.push(Manifest::from_value(value).with_context(|| format!("document {}", i + 1))?);
    }
    Ok(out)
}

/// JSON body to merge onto the stored object: the manifest without status or
/// server-populated metadata.
pub fn desired_body<K: Managed>(obj: &K) -> Result<Value> {
    let mut body = serde_json::to_value(obj).context("serializing manifest")?;
    if let Value::Object(map) = &mut body {
        map.remove("status");
    }
    strip_server_fields(&mut body);
    Ok(body)
}

fn strip_server_fields(doc: &mut Value) {
    if let Some(Value::Object(meta)) = doc.get_mut("metadata") {
        for field in SERVER_FIELDS {
            meta.remove(*field);
        }
    }
}

/// RFC 7386 merge: objects merge recursively, `null` removes a key, anything
/// else (arrays included) replaces the target.
pub fn json_merge(target: &mut Value, patch: &Value) {
    match patch {
        Value::Object(p) => {
            if !target.is_object() {
                *target = Value::Object(Map::new());
            }
            if let Value::Object(t) = target {
                for (k, v) in p {
                    if v.is_null() {
                        t.remove(k);
                    } else {
                        json_merge(t.entry(k.clone()).or_insert(Value::Null), v);
                    }
                }
            }
        }
        _ => *target = patch.clone(),
    }
}

/// Merge `desired` onto `obj` in place. A result that no longer decodes as `K`
/// leaves `obj` untouched.
pub fn merge_into<K: Managed>(obj: &mut K, desired: &Value) {
    let mut current = match serde_json::to_value(&*obj) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "cannot serialize object; skipping merge");
            return;
        }
    };
    json_merge(&mut current, desired);
    match serde_json::from_value(current) {
        Ok(merged) => *obj = merged,
        Err(e) => warn!(error = %e, "merged object does not decode; skipping merge"),
    }
}
