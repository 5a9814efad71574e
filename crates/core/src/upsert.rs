//! Create-or-update against an [`ObjectStore`].

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::diag::wrap_error_for_object;
use crate::error::{Op, ReconcileError};
use crate::identity::ObjectKey;
use crate::store::{Managed, ObjectStore, Reconciler};

/// Outcome of a convergence call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationResult {
    Unchanged,
    Created,
    Updated,
    /// The object was deleted because the desired change touches an immutable
    /// field; the next reconciliation recreates it.
    DeletedForRecreate,
}

impl OperationResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationResult::Unchanged => "unchanged",
            OperationResult::Created => "created",
            OperationResult::Updated => "updated",
            OperationResult::DeletedForRecreate => "deleted_for_recreate",
        }
    }

    pub fn is_changed(&self) -> bool {
        !matches!(self, OperationResult::Unchanged)
    }

    /// Message logged for the change.
    pub fn event(&self) -> &'static str {
        match self {
            OperationResult::Unchanged => "Unchanged",
            OperationResult::Created => "Created",
            OperationResult::Updated => "Updated",
            OperationResult::DeletedForRecreate => "Deleted",
        }
    }
}

impl fmt::Display for OperationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn key_of<K: Managed>(obj: &K) -> Result<ObjectKey, ReconcileError> {
    ObjectKey::from_object(obj).map_err(|source| ReconcileError::Key { type_name: std::any::type_name::<K>(), source })
}

fn mutate_checked<K, F>(key: &ObjectKey, obj: &mut K, mutate: F) -> Result<(), ReconcileError>
where
    K: Managed,
    F: FnOnce(&mut K),
{
    mutate(obj);
    let after = key_of(obj)?;
    if &after != key {
        return Err(ReconcileError::IdentityChanged { before: key.clone(), after });
    }
    Ok(())
}

/// Fetch the object addressed by `obj`, apply `mutate`, and write back only when
/// something changed.
///
/// When the object is absent `mutate` runs on `obj` itself and the result is
/// created. When present, `obj` is replaced with the stored copy before `mutate`
/// runs; an update is issued only if the serialized object differs afterwards.
/// `mutate` must not change the identity of the stored object. On success `obj`
/// holds what the store returned.
pub async fn create_or_update<R, K, F>(r: &R, obj: &mut K, mutate: F) -> Result<OperationResult, ReconcileError>
where
    R: Reconciler + ?Sized,
    R::Client: ObjectStore<K>,
    K: Managed,
    F: FnOnce(&mut K) + Send,
{
    let key = key_of(obj)?;

    match r.client().get(&key).await {
        Err(err) if err.is_not_found() => {
            mutate_checked(&key, obj, mutate)?;
            let created = r.client().create(obj).await.map_err(|e| wrap_error_for_object(Op::Create, obj, e))?;
            *obj = created;
            Ok(OperationResult::Created)
        }
        Err(err) => Err(wrap_error_for_object(Op::Get, obj, err)),
        Ok(current) => {
            *obj = current;
            // the store may have defaulted the namespace
            let stored = key_of(obj)?;
            let before = serde_json::to_value(&*obj).ok();
            mutate_checked(&stored, obj, mutate)?;
            let after = serde_json::to_value(&*obj).ok();
            if before.is_some() && before == after {
                debug!(key = %key, "object already in desired state");
                return Ok(OperationResult::Unchanged);
            }
            let updated = r.client().update(obj).await.map_err(|e| wrap_error_for_object(Op::Update, obj, e))?;
            *obj = updated;
            Ok(OperationResult::Updated)
        }
    }
}
