//! Diagnostic context: identity-derived log params and error wrapping.

use metrics::counter;

use crate::error::{Op, ReconcileError, StoreError};
use crate::identity::{accessor_or_die, HasIdentity, ObjectKey};
use crate::log::{LogParams, Logger};

/// Identity params every log line about `obj` carries, in this order.
pub fn object_params<K: HasIdentity + ?Sized>(obj: &K) -> LogParams {
    let acc = accessor_or_die(obj);
    let mut params = LogParams::new();
    params.push(("object_type", acc.kind().to_string()));
    params.push(("object_namespace", acc.namespace().unwrap_or_default().to_string()));
    params.push(("object_name", acc.name().unwrap_or_default().to_string()));
    params
}

fn with_object_params<K: HasIdentity + ?Sized>(obj: &K, extra: &[(&'static str, String)]) -> LogParams {
    let mut params: LogParams = extra.iter().cloned().collect();
    params.extend(object_params(obj));
    params
}

pub fn log_for_object<K: HasIdentity + ?Sized>(
    logger: &dyn Logger,
    msg: &str,
    obj: &K,
    extra: &[(&'static str, String)],
) {
    logger.info(msg, &with_object_params(obj, extra));
}

pub fn log_error_for_object<K: HasIdentity + ?Sized>(
    logger: &dyn Logger,
    err: &(dyn std::error::Error + 'static),
    msg: &str,
    obj: &K,
    extra: &[(&'static str, String)],
) {
    logger.error(err, msg, &with_object_params(obj, extra));
}

/// Attach operation and identity to a store error. If the key of `obj` cannot be
/// resolved, the key error is returned instead.
pub fn wrap_error_for_object<K: HasIdentity + ?Sized>(op: Op, obj: &K, err: StoreError) -> ReconcileError {
    counter!("recon_errors_total", 1u64, "op" => op.as_str());
    match ObjectKey::from_object(obj) {
        Ok(key) => ReconcileError::Store { op, key, source: err },
        Err(source) => ReconcileError::Key { type_name: std::any::type_name::<K>(), source },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ApiStatus, StatusReason};
    use crate::log::{CapturingLogger, Level};
    use k8s_openapi::api::core::v1::Service;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::error::Error as _;

    fn service(name: Option<&str>) -> Service {
        Service {
            metadata: ObjectMeta {
                name: name.map(str::to_string),
                namespace: Some("openstack".into()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn params_follow_caller_params() {
        let logger = CapturingLogger::new();
        log_for_object(&logger, "Updated", &service(Some("ovsdbserver-sb")), &[("attempt", "2".into())]);

        let rec = &logger.records()[0];
        let keys: Vec<&str> = rec.params.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec!["attempt", "object_type", "object_namespace", "object_name"]);
        assert_eq!(rec.param("object_type"), Some("Service"));
        assert_eq!(rec.param("object_name"), Some("ovsdbserver-sb"));
    }

    #[test]
    fn error_lines_carry_same_identity_params() {
        let logger = CapturingLogger::new();
        let svc = service(Some("ovsdbserver-nb"));
        let err = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        log_for_object(&logger, "Created", &svc, &[]);
        log_error_for_object(&logger, &err, "Converge failed", &svc, &[]);

        let records = logger.records();
        assert_eq!(records[1].level, Level::Error);
        assert_eq!(records[0].params, records[1].params);
    }

    #[test]
    fn wrap_names_operation_and_key() {
        let status = ApiStatus::new(403, StatusReason::Forbidden, "services is forbidden");
        let err = wrap_error_for_object(Op::Get, &service(Some("ovsdbserver-nb")), status.clone().into());
        assert_eq!(
            err.to_string(),
            "get Service openstack/ovsdbserver-nb: services is forbidden (Forbidden 403)"
        );
        let source = err.source().and_then(|s| s.downcast_ref::<StoreError>()).expect("source");
        assert_eq!(source.status(), Some(&status));
    }

    #[test]
    fn wrap_reports_key_failure() {
        let err = wrap_error_for_object(
            Op::Delete,
            &service(None),
            ApiStatus::new(500, StatusReason::InternalError, "etcd unavailable").into(),
        );
        assert!(matches!(err, ReconcileError::Key { .. }));
    }
}
