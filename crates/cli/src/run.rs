//! Drive the primitives over parsed manifests.

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment};
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service, ServiceAccount};
use metrics::counter;
use recon_core::{
    create_or_delete, delete_if_exists, Logger, Managed, ObjectKey, ObjectStore, OperationResult, ReconcileError,
    Reconciler, TracingLogger,
};
use recon_store::MemStore;
use serde::Serialize;
use tracing::{debug, warn};

use crate::manifest::{desired_body, merge_into, with_object, Manifest};

/// Store that can hold every kind a [`Manifest`] carries.
pub trait ManifestStore:
    ObjectStore<ConfigMap>
    + ObjectStore<Secret>
    + ObjectStore<Service>
    + ObjectStore<ServiceAccount>
    + ObjectStore<Deployment>
    + ObjectStore<DaemonSet>
{
}

impl<T> ManifestStore for T where
    T: ObjectStore<ConfigMap>
        + ObjectStore<Secret>
        + ObjectStore<Service>
        + ObjectStore<ServiceAccount>
        + ObjectStore<Deployment>
        + ObjectStore<DaemonSet>
{
}

pub struct CliReconciler<C> {
    client: C,
    logger: TracingLogger,
}

impl<C> CliReconciler<C> {
    pub fn new(client: C) -> Self {
        Self { client, logger: TracingLogger::new("reconctl") }
    }
}

impl<C: Send + Sync> Reconciler for CliReconciler<C> {
    type Client = C;

    fn client(&self) -> &C {
        &self.client
    }

    fn logger(&self) -> &dyn Logger {
        &self.logger
    }
}

/// In-memory store for `--dry-run`, rejecting the same in-place changes the API server does.
pub fn dry_run_store() -> MemStore {
    MemStore::new()
        .with_immutable_field("Service", "/spec/clusterIP")
        .with_immutable_field("Deployment", "/spec/selector")
        .with_immutable_field("DaemonSet", "/spec/selector")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome {
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub name: String,
    /// `created`, `updated`, `unchanged`, `deleted_for_recreate`, `deleted` or `failed`
    pub result: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Outcome {
    fn new(doc: &Manifest, res: Result<&'static str, ReconcileError>) -> Self {
        let (result, error) = match res {
            Ok(r) => (r.to_string(), None),
            Err(e) => ("failed".to_string(), Some(e.to_string())),
        };
        Self {
            kind: doc.kind(),
            namespace: doc.namespace().map(str::to_string),
            name: doc.name().unwrap_or_default().to_string(),
            result,
            error,
        }
    }

    pub fn failed(&self) -> bool {
        self.error.is_some()
    }

    pub fn human(&self) -> String {
        let key = ObjectKey::new(self.kind, self.namespace.as_deref(), self.name.clone());
        match &self.error {
            Some(e) => format!("{}: failed: {}", key, e),
            None => format!("{}: {}", key, self.result),
        }
    }
}

async fn converge_object<R, K>(r: &R, obj: &mut K) -> Result<OperationResult, ReconcileError>
where
    R: Reconciler,
    R::Client: ObjectStore<K>,
    K: Managed,
{
    let desired = match desired_body(&*obj) {
        Ok(body) => body,
        Err(e) => {
            warn!(error = %e, "manifest body unavailable; converging identity only");
            serde_json::Value::Null
        }
    };
    create_or_delete(r, obj, move |stored: &mut K| {
        if !desired.is_null() {
            merge_into(stored, &desired);
        }
    })
    .await
}

/// Converge every document in order. Failures are recorded and do not stop later documents.
pub async fn converge_all<C: ManifestStore>(r: &CliReconciler<C>, docs: Vec<Manifest>) -> Vec<Outcome> {
    let mut out = Vec::with_capacity(docs.len());
    for mut doc in docs {
        counter!("reconctl_documents_total", 1u64, "command" => "converge");
        let res = with_object!(&mut doc, obj => converge_object(r, obj).await);
        debug!(kind = doc.kind(), name = ?doc.name(), ?res, "converged");
        out.push(Outcome::new(&doc, res.map(|o| o.as_str())));
    }
    out
}

/// Delete every document's object. Absent objects count as deleted.
pub async fn delete_all<C: ManifestStore>(r: &CliReconciler<C>, docs: Vec<Manifest>) -> Vec<Outcome> {
    let mut out = Vec::with_capacity(docs.len());
    for mut doc in docs {
        counter!("reconctl_documents_total", 1u64, "command" => "delete");
        let res = with_object!(&mut doc, obj => delete_if_exists(r, obj).await);
        out.push(Outcome::new(&doc, res.map(|()| "deleted")));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::parse_manifests;
    use recon_core::ApiStatus;
    use recon_core::{Op, StatusReason};

    const DOCS: &str = r#"
apiVersion: v1
kind: ConfigMap
metadata:
  name: ovncontroller-config
  namespace: openstack
data:
  ovn-encap-type: geneve
---
apiVersion: v1
kind: ServiceAccount
metadata:
  name: ovncontroller-ovncontroller
  namespace: openstack
"#;

    fn results(outcomes: &[Outcome]) -> Vec<&str> {
        outcomes.iter().map(|o| o.result.as_str()).collect()
    }

    #[tokio::test]
    async fn converge_then_settle() {
        let r = CliReconciler::new(dry_run_store());
        let first = converge_all(&r, parse_manifests(DOCS).expect("parse")).await;
        assert_eq!(results(&first), vec!["created", "created"]);
        let second = converge_all(&r, parse_manifests(DOCS).expect("parse")).await;
        assert_eq!(results(&second), vec!["unchanged", "unchanged"]);
        assert_eq!(r.client().len(), 2);
    }

    #[tokio::test]
    async fn changed_manifest_updates() {
        let r = CliReconciler::new(dry_run_store());
        converge_all(&r, parse_manifests(DOCS).expect("parse")).await;
        let changed = DOCS.replace("geneve", "vxlan");
        let out = converge_all(&r, parse_manifests(&changed).expect("parse")).await;
        assert_eq!(results(&out), vec!["updated", "unchanged"]);

        let key = ObjectKey::new("ConfigMap", Some("openstack"), "ovncontroller-config");
        let cm: ConfigMap = r.client().fetch(&key).expect("stored");
        assert_eq!(cm.data.and_then(|d| d.get("ovn-encap-type").cloned()).as_deref(), Some("vxlan"));
    }

    #[tokio::test]
    async fn immutable_selector_change_deletes() {
        let ds = r#"
apiVersion: apps/v1
kind: DaemonSet
metadata:
  name: ovn-controller
  namespace: openstack
spec:
  selector:
    matchLabels:
      service: ovn-controller
  template:
    metadata:
      labels:
        service: ovn-controller
"#;
        let r = CliReconciler::new(dry_run_store());
        converge_all(&r, parse_manifests(ds).expect("parse")).await;
        let moved = ds.replace("service: ovn-controller\n  template", "service: ovn-controller-ovs\n  template");
        let out = converge_all(&r, parse_manifests(&moved).expect("parse")).await;
        assert_eq!(results(&out), vec!["deleted_for_recreate"]);
        let out = converge_all(&r, parse_manifests(&moved).expect("parse")).await;
        assert_eq!(results(&out), vec!["created"]);
    }

    #[tokio::test]
    async fn failures_are_reported_per_document() {
        let store = dry_run_store();
        store.inject_fault(Op::Get, ApiStatus::new(403, StatusReason::Forbidden, "configmaps is forbidden").into());
        let r = CliReconciler::new(store);
        let out = converge_all(&r, parse_manifests(DOCS).expect("parse")).await;
        assert!(out[0].failed());
        assert_eq!(out[1].result, "created");
        assert!(out[0].human().starts_with("ConfigMap openstack/ovncontroller-config: failed: get "), "{}", out[0].human());
    }

    #[tokio::test]
    async fn manifest_exported_from_cluster_is_created() {
        let exported = DOCS.replace("  namespace: openstack\ndata:", "  namespace: openstack\n  resourceVersion: \"8812\"\n  uid: 6f1c1a3e-0d8a-4c1e-9f55-3d2b1f0c7a10\ndata:");
        assert!(exported.contains("resourceVersion"));
        let r = CliReconciler::new(dry_run_store());
        let out = converge_all(&r, parse_manifests(&exported).expect("parse")).await;
        assert_eq!(results(&out), vec!["created", "created"]);

        let key = ObjectKey::new("ConfigMap", Some("openstack"), "ovncontroller-config");
        let cm: ConfigMap = r.client().fetch(&key).expect("stored");
        assert_ne!(cm.metadata.uid.as_deref(), Some("6f1c1a3e-0d8a-4c1e-9f55-3d2b1f0c7a10"));
        assert_eq!(cm.metadata.resource_version.as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let r = CliReconciler::new(dry_run_store());
        converge_all(&r, parse_manifests(DOCS).expect("parse")).await;
        let out = delete_all(&r, parse_manifests(DOCS).expect("parse")).await;
        assert_eq!(results(&out), vec!["deleted", "deleted"]);
        assert!(r.client().is_empty());
        let out = delete_all(&r, parse_manifests(DOCS).expect("parse")).await;
        assert!(out.iter().all(|o| !o.failed()));
    }

    #[test]
    fn outcome_json_shape() {
        let doc = parse_manifests(DOCS).expect("parse").remove(0);
        let v = serde_json::to_value(Outcome::new(&doc, Ok("created"))).expect("json");
        assert_eq!(
            v,
            serde_json::json!({"kind": "ConfigMap", "namespace": "openstack", "name": "ovncontroller-config", "result": "created"})
        );
    }
}
