//! Store error taxonomy and the wrapped errors the primitives return.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::identity::{KeyError, ObjectKey};

/// Messages the API server uses when a change touches a field that cannot be
/// updated in place.
pub const IMMUTABLE_FIELD_MARKERS: &[&str] = &["field is immutable", "may not change once set"];

/// Machine-readable reason of a failed store request (mirrors `metav1.StatusReason`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusReason {
    NotFound,
    AlreadyExists,
    Conflict,
    Invalid,
    BadRequest,
    Unauthorized,
    Forbidden,
    Timeout,
    TooManyRequests,
    InternalError,
    Unknown,
}

impl StatusReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusReason::NotFound => "NotFound",
            StatusReason::AlreadyExists => "AlreadyExists",
            StatusReason::Conflict => "Conflict",
            StatusReason::Invalid => "Invalid",
            StatusReason::BadRequest => "BadRequest",
            StatusReason::Unauthorized => "Unauthorized",
            StatusReason::Forbidden => "Forbidden",
            StatusReason::Timeout => "Timeout",
            StatusReason::TooManyRequests => "TooManyRequests",
            StatusReason::InternalError => "InternalError",
            StatusReason::Unknown => "Unknown",
        }
    }

    /// Parse the `reason` string of an API status, falling back to the HTTP code.
    pub fn from_status(reason: &str, code: u16) -> Self {
        match reason {
            "NotFound" => StatusReason::NotFound,
            "AlreadyExists" => StatusReason::AlreadyExists,
            "Conflict" => StatusReason::Conflict,
            "Invalid" => StatusReason::Invalid,
            "BadRequest" => StatusReason::BadRequest,
            "Unauthorized" => StatusReason::Unauthorized,
            "Forbidden" => StatusReason::Forbidden,
            "Timeout" | "ServerTimeout" => StatusReason::Timeout,
            "TooManyRequests" => StatusReason::TooManyRequests,
            "InternalError" => StatusReason::InternalError,
            _ => Self::from_code(code),
        }
    }

    pub fn from_code(code: u16) -> Self {
        match code {
            400 => StatusReason::BadRequest,
            401 => StatusReason::Unauthorized,
            403 => StatusReason::Forbidden,
            404 => StatusReason::NotFound,
            409 => StatusReason::Conflict,
            422 => StatusReason::Invalid,
            429 => StatusReason::TooManyRequests,
            504 => StatusReason::Timeout,
            500 => StatusReason::InternalError,
            _ => StatusReason::Unknown,
        }
    }
}

impl fmt::Display for StatusReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One field-level cause attached to a rejected request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCause {
    pub field: Option<String>,
    pub message: String,
}

/// Failure status reported by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiStatus {
    pub code: u16,
    pub reason: StatusReason,
    pub message: String,
    pub causes: Vec<StatusCause>,
}

impl ApiStatus {
    pub fn new(code: u16, reason: StatusReason, message: impl Into<String>) -> Self {
        Self { code, reason, message: message.into(), causes: Vec::new() }
    }

    pub fn with_cause(mut self, field: Option<&str>, message: impl Into<String>) -> Self {
        self.causes.push(StatusCause { field: field.map(str::to_string), message: message.into() });
        self
    }

    pub fn not_found(key: &ObjectKey) -> Self {
        Self::new(404, StatusReason::NotFound, format!("{} \"{}\" not found", key.kind, key.name))
    }

    pub fn already_exists(key: &ObjectKey) -> Self {
        Self::new(409, StatusReason::AlreadyExists, format!("{} \"{}\" already exists", key.kind, key.name))
    }

    pub fn conflict(key: &ObjectKey) -> Self {
        Self::new(
            409,
            StatusReason::Conflict,
            format!(
                "Operation cannot be fulfilled on {} \"{}\": the object has been modified; please apply your changes to the latest version and try again",
                key.kind, key.name
            ),
        )
    }

    /// `Invalid` status; the message lists every cause the way the API server does.
    pub fn invalid(key: &ObjectKey, causes: Vec<StatusCause>) -> Self {
        let details: Vec<String> = causes
            .iter()
            .map(|c| match &c.field {
                Some(field) => format!("{}: {}", field, c.message),
                None => c.message.clone(),
            })
            .collect();
        let message = format!("{} \"{}\" is invalid: {}", key.kind, key.name, details.join(", "));
        Self { code: 422, reason: StatusReason::Invalid, message, causes }
    }

    fn mentions_immutable_field(&self) -> bool {
        let hit = |s: &str| IMMUTABLE_FIELD_MARKERS.iter().any(|m| s.contains(m));
        hit(&self.message) || self.causes.iter().any(|c| hit(&c.message))
    }
}

impl fmt::Display for ApiStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} {})", self.message, self.reason, self.code)
    }
}

/// Error returned by an [`ObjectStore`](crate::ObjectStore) implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0}")]
    Api(ApiStatus),
    #[error("transport: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    pub fn transport(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        StoreError::Transport(Box::new(err))
    }

    pub fn status(&self) -> Option<&ApiStatus> {
        match self {
            StoreError::Api(status) => Some(status),
            StoreError::Transport(_) => None,
        }
    }

    pub fn reason(&self) -> Option<StatusReason> {
        self.status().map(|s| s.reason)
    }

    pub fn is_not_found(&self) -> bool {
        self.reason() == Some(StatusReason::NotFound)
    }

    pub fn is_already_exists(&self) -> bool {
        self.reason() == Some(StatusReason::AlreadyExists)
    }

    pub fn is_conflict(&self) -> bool {
        self.reason() == Some(StatusReason::Conflict)
    }

    pub fn is_invalid(&self) -> bool {
        self.reason() == Some(StatusReason::Invalid)
    }

    /// `Invalid` rejection caused by a change to a field that cannot be updated in place.
    /// Other `Invalid` rejections (malformed payloads, failed validation) do not qualify.
    pub fn is_immutable_field(&self) -> bool {
        match self.status() {
            Some(status) => status.reason == StatusReason::Invalid && status.mentions_immutable_field(),
            None => false,
        }
    }
}

impl From<ApiStatus> for StoreError {
    fn from(status: ApiStatus) -> Self {
        StoreError::Api(status)
    }
}

/// Store operation a wrapped error was detected in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Op {
    Get,
    Create,
    Update,
    Delete,
}

impl Op {
    pub fn as_str(&self) -> &'static str {
        match self {
            Op::Get => "get",
            Op::Create => "create",
            Op::Update => "update",
            Op::Delete => "delete",
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error surfaced by the reconciliation primitives. Store failures keep the
/// original [`StoreError`] as `source()`.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("resolving object key for {type_name}: {source}")]
    Key {
        type_name: &'static str,
        #[source]
        source: KeyError,
    },
    #[error("{op} {key}: {source}")]
    Store {
        op: Op,
        key: ObjectKey,
        #[source]
        source: StoreError,
    },
    #[error("mutation changed object identity from {before} to {after}")]
    IdentityChanged { before: ObjectKey, after: ObjectKey },
}

impl ReconcileError {
    pub fn store_error(&self) -> Option<&StoreError> {
        match self {
            ReconcileError::Store { source, .. } => Some(source),
            _ => None,
        }
    }

    pub fn op(&self) -> Option<Op> {
        match self {
            ReconcileError::Store { op, .. } => Some(*op),
            _ => None,
        }
    }

    pub fn key(&self) -> Option<&ObjectKey> {
        match self {
            ReconcileError::Store { key, .. } => Some(key),
            ReconcileError::IdentityChanged { before, .. } => Some(before),
            ReconcileError::Key { .. } => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.store_error().is_some_and(StoreError::is_not_found)
    }

    pub fn is_conflict(&self) -> bool {
        self.store_error().is_some_and(StoreError::is_conflict)
    }

    pub fn is_invalid(&self) -> bool {
        self.store_error().is_some_and(StoreError::is_invalid)
    }

    pub fn is_immutable_field(&self) -> bool {
        self.store_error().is_some_and(StoreError::is_immutable_field)
    }
}
