//! Deletion and convergence primitives.

use metrics::counter;

use crate::diag::{log_for_object, wrap_error_for_object};
use crate::error::{Op, ReconcileError};
use crate::identity::{accessor_or_die, ObjectKey};
use crate::store::{Managed, ObjectStore, Reconciler};
use crate::upsert::{create_or_update, OperationResult};

/// Ensure the object addressed by `obj` is absent from the store.
///
/// An object that is already gone is a successful no-op and logs nothing. When
/// the object existed, `obj` holds its last stored state afterwards.
pub async fn delete_if_exists<R, K>(r: &R, obj: &mut K) -> Result<(), ReconcileError>
where
    R: Reconciler + ?Sized,
    R::Client: ObjectStore<K>,
    K: Managed,
{
    accessor_or_die(obj);
    let key = ObjectKey::from_object(obj)
        .map_err(|source| ReconcileError::Key { type_name: std::any::type_name::<K>(), source })?;

    match r.client().get(&key).await {
        Ok(current) => *obj = current,
        Err(err) if err.is_not_found() => {
            counter!("recon_delete_total", 1u64, "outcome" => "absent");
            return Ok(());
        }
        Err(err) => return Err(wrap_error_for_object(Op::Get, obj, err)),
    }

    r.client().delete(&key).await.map_err(|e| wrap_error_for_object(Op::Delete, obj, e))?;

    log_for_object(r.logger(), "Delete", obj, &[]);
    counter!("recon_delete_total", 1u64, "outcome" => "deleted");
    Ok(())
}

/// Converge the object addressed by `obj` toward the state `mutate` describes.
///
/// Creates or updates through [`create_or_update`]. If the store rejects the
/// update because it touches an immutable field, the object is deleted and
/// [`OperationResult::DeletedForRecreate`] is returned without an error; the
/// caller's next reconciliation creates it again with the new values. Every
/// other failure is returned as is.
pub async fn create_or_delete<R, K, F>(r: &R, obj: &mut K, mutate: F) -> Result<OperationResult, ReconcileError>
where
    R: Reconciler + ?Sized,
    R::Client: ObjectStore<K>,
    K: Managed,
    F: FnOnce(&mut K) + Send,
{
    accessor_or_die(obj);

    let result = match create_or_update(r, obj, mutate).await {
        Ok(result) => result,
        Err(err) if err.op() == Some(Op::Update) && err.is_immutable_field() => {
            let Some(key) = err.key().cloned() else {
                return Err(err);
            };
            r.client().delete(&key).await.map_err(|e| wrap_error_for_object(Op::Delete, obj, e))?;
            OperationResult::DeletedForRecreate
        }
        Err(err) => return Err(err),
    };

    if result.is_changed() {
        log_for_object(r.logger(), result.event(), obj, &[]);
    }
    counter!("recon_converge_total", 1u64, "result" => result.as_str());
    Ok(result)
}
