//! Recon core: primitives that converge objects in a declarative store toward a
//! desired state.
//!
//! [`create_or_delete`] upserts an object and falls back to deleting it when the
//! desired change touches an immutable field. [`delete_if_exists`] removes an
//! object idempotently. Both run against the [`Reconciler`] capability a caller
//! supplies (store client plus logger) and narrate every change with the same
//! identity params.

#![forbid(unsafe_code)]

pub mod diag;
pub mod error;
pub mod identity;
pub mod log;
pub mod reconcile;
pub mod store;
pub mod upsert;

pub use diag::{log_error_for_object, log_for_object, object_params, wrap_error_for_object};
pub use error::{ApiStatus, Op, ReconcileError, StatusCause, StatusReason, StoreError};
pub use identity::{accessor_or_die, Accessor, HasIdentity, KeyError, ObjectKey};
pub use log::{CapturingLogger, LogParams, LogRecord, Logger, TracingLogger};
pub use reconcile::{create_or_delete, delete_if_exists};
pub use store::{Managed, ObjectStore, Reconciler};
pub use upsert::{create_or_update, OperationResult};

pub mod prelude {
    pub use super::{
        create_or_delete, create_or_update, delete_if_exists, HasIdentity, Logger, Managed, ObjectKey, ObjectStore,
        OperationResult, ReconcileError, Reconciler, StoreError,
    };
}
