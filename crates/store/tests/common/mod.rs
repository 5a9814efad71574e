#![allow(dead_code)]

use std::borrow::Cow;
use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{ConfigMap, Service, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use recon_core::{CapturingLogger, HasIdentity, Logger, Reconciler};
use recon_store::MemStore;

pub const NS: &str = "openstack";

pub struct Harness {
    pub store: MemStore,
    pub logger: CapturingLogger,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_store(MemStore::new())
    }

    pub fn with_store(store: MemStore) -> Self {
        Self { store, logger: CapturingLogger::new() }
    }
}

impl Reconciler for Harness {
    type Client = MemStore;

    fn client(&self) -> &MemStore {
        &self.store
    }

    fn logger(&self) -> &dyn Logger {
        &self.logger
    }
}

pub fn meta(name: &str) -> ObjectMeta {
    ObjectMeta { name: Some(name.into()), namespace: Some(NS.into()), ..Default::default() }
}

pub fn config_map(name: &str) -> ConfigMap {
    ConfigMap { metadata: meta(name), ..Default::default() }
}

pub fn config_map_with(name: &str, k: &str, v: &str) -> ConfigMap {
    ConfigMap {
        metadata: meta(name),
        data: Some(BTreeMap::from([(k.to_string(), v.to_string())])),
        ..Default::default()
    }
}

pub fn set_data(k: &'static str, v: &'static str) -> impl FnOnce(&mut ConfigMap) + Send {
    move |cm: &mut ConfigMap| {
        cm.data.get_or_insert_with(BTreeMap::new).insert(k.to_string(), v.to_string());
    }
}

pub fn headless_service(name: &str) -> Service {
    Service {
        metadata: meta(name),
        spec: Some(ServiceSpec { cluster_ip: Some("None".into()), ..Default::default() }),
        ..Default::default()
    }
}

/// Object type whose values carry no kind.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Untyped {
    pub metadata: ObjectMeta,
}

impl HasIdentity for Untyped {
    fn object_kind(&self) -> Cow<'_, str> {
        Cow::Borrowed("")
    }

    fn object_meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn object_meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}
