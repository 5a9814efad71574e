//! Recon kube integration: [`ObjectStore`] over the Kubernetes API using kube-rs.

#![forbid(unsafe_code)]

pub mod config;

use anyhow::{Context, Result};
use k8s_openapi::NamespaceResourceScope;
use kube::{
    api::{Api, DeleteParams, PostParams},
    Client, Resource,
};
use once_cell::sync::OnceCell;
use recon_core::{ApiStatus, Managed, ObjectKey, ObjectStore, StatusReason, StoreError};
use tracing::debug;

pub use config::{Propagation, StoreConfig};

static CLIENT: OnceCell<Client> = OnceCell::new();

/// Process-wide kube client built from the default kubeconfig / in-cluster config.
pub async fn get_kube_client() -> Result<Client> {
    if let Some(client) = CLIENT.get() {
        return Ok(client.clone());
    }
    let client = Client::try_default().await.context("building kube client")?;
    Ok(CLIENT.get_or_init(|| client).clone())
}

/// Map a kube-rs error into the store taxonomy. API statuses keep their code and
/// reason; everything else is a transport failure.
pub fn store_error(err: kube::Error) -> StoreError {
    match err {
        kube::Error::Api(resp) => StoreError::Api(ApiStatus::new(
            resp.code,
            StatusReason::from_status(&resp.reason, resp.code),
            resp.message,
        )),
        other => StoreError::transport(other),
    }
}

/// [`ObjectStore`] for namespaced `k8s-openapi` types. Objects without a
/// namespace go to the client's default namespace.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
    config: StoreConfig,
}

impl KubeStore {
    pub fn new(client: Client, config: StoreConfig) -> Self {
        Self { client, config }
    }

    pub async fn try_default() -> Result<Self> {
        Ok(Self::new(get_kube_client().await?, StoreConfig::from_env()))
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn api<K>(&self, namespace: Option<&str>) -> Api<K>
    where
        K: Resource<DynamicType = (), Scope = NamespaceResourceScope>,
    {
        match namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::default_namespaced(self.client.clone()),
        }
    }

    fn post_params(&self) -> PostParams {
        PostParams { field_manager: Some(self.config.field_manager.clone()), ..Default::default() }
    }
}

/// Key of an object about to be written; the same normalisation `get` and
/// `delete` receive.
fn object_key<K: Managed>(obj: &K) -> Result<ObjectKey, StoreError> {
    ObjectKey::from_object(obj).map_err(|e| ApiStatus::new(422, StatusReason::Invalid, e.to_string()).into())
}

#[async_trait::async_trait]
impl<K> ObjectStore<K> for KubeStore
where
    K: Managed + Resource<DynamicType = (), Scope = NamespaceResourceScope>,
{
    async fn get(&self, key: &ObjectKey) -> Result<K, StoreError> {
        self.api::<K>(key.namespace.as_deref()).get(&key.name).await.map_err(store_error)
    }

    async fn create(&self, obj: &K) -> Result<K, StoreError> {
        let key = object_key(obj)?;
        let api = self.api::<K>(key.namespace.as_deref());
        let created = api.create(&self.post_params(), obj).await.map_err(store_error)?;
        debug!(kind = %K::kind(&()), name = ?created.meta().name, "created");
        Ok(created)
    }

    async fn update(&self, obj: &K) -> Result<K, StoreError> {
        let key = object_key(obj)?;
        let api = self.api::<K>(key.namespace.as_deref());
        api.replace(&key.name, &self.post_params(), obj).await.map_err(store_error)
    }

    async fn delete(&self, key: &ObjectKey) -> Result<(), StoreError> {
        let dp = DeleteParams { propagation_policy: Some(self.config.propagation.policy()), ..Default::default() };
        match self.api::<K>(key.namespace.as_deref()).delete(&key.name, &dp).await.map_err(store_error) {
            Ok(_) => Ok(()),
            Err(err) if err.is_not_found() => {
                debug!(key = %key, "already absent");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::ConfigMap;
    use kube::error::ErrorResponse;

    fn api_error(code: u16, reason: &str, message: &str) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".into(),
            message: message.into(),
            reason: reason.into(),
            code,
        })
    }

    #[test]
    fn not_found_maps_to_not_found() {
        let err = store_error(api_error(404, "NotFound", "configmaps \"ovn-config\" not found"));
        assert!(err.is_not_found());
        assert_eq!(err.status().map(|s| s.code), Some(404));
    }

    #[test]
    fn immutable_rejection_is_recognized() {
        let err = store_error(api_error(
            422,
            "Invalid",
            "DaemonSet.apps \"ovn-controller\" is invalid: spec.selector: Invalid value: v1.LabelSelector{MatchLabels:map[string]string{\"service\":\"ovn-controller-ovs\"}}: field is immutable",
        ));
        assert!(err.is_invalid());
        assert!(err.is_immutable_field());
    }

    #[test]
    fn generic_invalid_is_not_immutable() {
        let err = store_error(api_error(
            422,
            "Invalid",
            "Service \"ovsdbserver-nb\" is invalid: spec.ports[0].port: Invalid value: 0: must be between 1 and 65535, inclusive",
        ));
        assert!(err.is_invalid());
        assert!(!err.is_immutable_field());
    }

    #[test]
    fn conflict_without_reason_uses_code() {
        let err = store_error(api_error(409, "", "the object has been modified"));
        assert!(err.is_conflict());
    }

    #[test]
    fn non_api_errors_are_transport() {
        let utf8 = String::from_utf8(vec![0xff]).unwrap_err();
        let err = store_error(kube::Error::FromUtf8(utf8));
        assert!(matches!(err, StoreError::Transport(_)));
        assert!(err.status().is_none());
    }

    #[test]
    fn write_key_normalises_empty_namespace() {
        let mut cm = ConfigMap::default();
        cm.metadata.name = Some("ovn-config".into());
        cm.metadata.namespace = Some(String::new());
        let key = object_key(&cm).expect("key");
        assert_eq!(key.namespace, None);
        assert_eq!(key.name, "ovn-config");

        cm.metadata.namespace = Some("openstack".into());
        assert_eq!(object_key(&cm).expect("key").namespace.as_deref(), Some("openstack"));
    }

    #[test]
    fn write_key_requires_name() {
        let err = object_key(&ConfigMap::default()).unwrap_err();
        assert!(err.is_invalid());
        assert!(!err.is_immutable_field());
    }
}
