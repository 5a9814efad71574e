//! Capability contract between the primitives and the surrounding controller.

use std::fmt::Debug;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StoreError;
use crate::identity::{HasIdentity, ObjectKey};
use crate::log::Logger;

/// Object types the primitives can reconcile.
pub trait Managed: HasIdentity + Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> Managed for T where T: HasIdentity + Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static {}

/// CRUD access to the remote store for objects of type `K`.
///
/// Implementations enforce optimistic concurrency on `update` through the
/// object's `resourceVersion`.
#[async_trait::async_trait]
pub trait ObjectStore<K: Managed>: Send + Sync {
    async fn get(&self, key: &ObjectKey) -> Result<K, StoreError>;

    /// Create `obj`; returns the object as stored.
    async fn create(&self, obj: &K) -> Result<K, StoreError>;

    /// Replace the stored object with `obj`; returns the object as stored.
    async fn update(&self, obj: &K) -> Result<K, StoreError>;

    /// Delete the object at `key`. Deleting an absent object succeeds.
    async fn delete(&self, key: &ObjectKey) -> Result<(), StoreError>;
}

/// Handles a caller supplies to run the primitives.
pub trait Reconciler: Send + Sync {
    type Client: Send + Sync;

    fn client(&self) -> &Self::Client;
    fn logger(&self) -> &dyn Logger;
}
