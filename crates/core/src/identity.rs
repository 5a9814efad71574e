//! Object identity: kind plus namespace/name, resolved through [`HasIdentity`].

use std::borrow::Cow;
use std::fmt;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};

/// Capability every managed object type exposes so it can be addressed in the store.
///
/// All `k8s-openapi` types get this through their `kube::Resource` impl. Hand-written
/// types implement it directly.
pub trait HasIdentity {
    /// Kind of the object type. An empty kind means the type carries no identity.
    fn object_kind(&self) -> Cow<'_, str>;
    fn object_meta(&self) -> &ObjectMeta;
    fn object_meta_mut(&mut self) -> &mut ObjectMeta;

    fn set_name(&mut self, name: impl Into<String>)
    where
        Self: Sized,
    {
        self.object_meta_mut().name = Some(name.into());
    }

    fn set_namespace(&mut self, namespace: Option<String>)
    where
        Self: Sized,
    {
        self.object_meta_mut().namespace = namespace;
    }
}

impl<K> HasIdentity for K
where
    K: kube::Resource<DynamicType = ()>,
{
    fn object_kind(&self) -> Cow<'_, str> {
        K::kind(&())
    }

    fn object_meta(&self) -> &ObjectMeta {
        kube::Resource::meta(self)
    }

    fn object_meta_mut(&mut self) -> &mut ObjectMeta {
        kube::Resource::meta_mut(self)
    }
}

/// Read-only view over an object's identity attributes.
#[derive(Debug, Clone)]
pub struct Accessor<'a> {
    kind: Cow<'a, str>,
    meta: &'a ObjectMeta,
}

impl<'a> Accessor<'a> {
    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn namespace(&self) -> Option<&str> {
        self.meta.namespace.as_deref()
    }

    pub fn name(&self) -> Option<&str> {
        self.meta.name.as_deref()
    }

    pub fn resource_version(&self) -> Option<&str> {
        self.meta.resource_version.as_deref()
    }

    pub fn uid(&self) -> Option<&str> {
        self.meta.uid.as_deref()
    }
}

/// Resolve the identity accessor of `obj`, aborting on a type without identity.
///
/// Such a type can never be reconciled, so this is treated as a programming error
/// rather than an operational one.
pub fn accessor_or_die<K: HasIdentity + ?Sized>(obj: &K) -> Accessor<'_> {
    let kind = obj.object_kind();
    if kind.is_empty() {
        panic!(
            "unable to get accessor for object of type {}: type carries no kind",
            std::any::type_name::<K>()
        );
    }
    Accessor { kind, meta: obj.object_meta() }
}

/// Store address of an object: `(namespace, name, kind)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub kind: String,
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectKey {
    pub fn new(kind: impl Into<String>, namespace: Option<&str>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            namespace: namespace.filter(|ns| !ns.is_empty()).map(str::to_string),
            name: name.into(),
        }
    }

    pub fn from_object<K: HasIdentity + ?Sized>(obj: &K) -> Result<Self, KeyError> {
        let kind = obj.object_kind();
        if kind.is_empty() {
            return Err(KeyError::MissingKind { type_name: std::any::type_name::<K>() });
        }
        let meta = obj.object_meta();
        let name = meta
            .name
            .as_deref()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| KeyError::MissingName { kind: kind.to_string() })?;
        Ok(Self::new(kind.into_owned(), meta.namespace.as_deref(), name))
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{} {}/{}", self.kind, ns, self.name),
            None => write!(f, "{} {}", self.kind, self.name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("object of type {type_name} carries no kind")]
    MissingKind { type_name: &'static str },
    #[error("{kind} object has no metadata.name")]
    MissingName { kind: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{ConfigMap, Namespace};

    #[derive(Debug, Clone, Default)]
    struct Untyped {
        metadata: ObjectMeta,
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

    fn config_map(ns: Option<&str>, name: Option<&str>) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: name.map(str::to_string),
                namespace: ns.map(str::to_string),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn key_from_typed_object() {
        let cm = config_map(Some("openstack"), Some("ovncontroller-config"));
        let key = ObjectKey::from_object(&cm).expect("key");
        assert_eq!(key.kind, "ConfigMap");
        assert_eq!(key.namespace.as_deref(), Some("openstack"));
        assert_eq!(key.name, "ovncontroller-config");
        assert_eq!(key.to_string(), "ConfigMap openstack/ovncontroller-config");
    }

    #[test]
    fn cluster_scoped_key_has_no_namespace() {
        let ns = Namespace {
            metadata: ObjectMeta { name: Some("openstack".into()), ..Default::default() },
            ..Default::default()
        };
        let key = ObjectKey::from_object(&ns).expect("key");
        assert_eq!(key.namespace, None);
        assert_eq!(key.to_string(), "Namespace openstack");
    }

    #[test]
    fn empty_namespace_is_treated_as_absent() {
        let key = ObjectKey::new("ConfigMap", Some(""), "x");
        assert_eq!(key.namespace, None);
    }

    #[test]
    fn missing_name_is_a_key_error() {
        let cm = config_map(Some("ns"), None);
        let err = ObjectKey::from_object(&cm).unwrap_err();
        assert_eq!(err, KeyError::MissingName { kind: "ConfigMap".into() });

        let cm = config_map(Some("ns"), Some(""));
        assert!(ObjectKey::from_object(&cm).is_err());
    }

    #[test]
    fn setters_update_identity() {
        let mut cm = config_map(None, None);
        cm.set_name("ovn-scripts");
        cm.set_namespace(Some("openstack".into()));
        let acc = accessor_or_die(&cm);
        assert_eq!(acc.kind(), "ConfigMap");
        assert_eq!(acc.name(), Some("ovn-scripts"));
        assert_eq!(acc.namespace(), Some("openstack"));
        assert_eq!(acc.resource_version(), None);
    }

    #[test]
    fn untyped_object_key_fails() {
        let obj = Untyped::default();
        assert!(matches!(ObjectKey::from_object(&obj), Err(KeyError::MissingKind { .. })));
    }

    #[test]
    #[should_panic(expected = "unable to get accessor")]
    fn accessor_for_untyped_object_panics() {
        let obj = Untyped::default();
        let _ = accessor_or_die(&obj);
    }
}
