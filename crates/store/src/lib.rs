//! Recon store: in-RAM object store with API-server semantics.
//!
//! Objects are kept as JSON keyed by [`ObjectKey`]. Creates stamp `uid`,
//! `resourceVersion` and `creationTimestamp` and refuse a caller-set
//! `resourceVersion`; updates enforce optimistic concurrency and per-kind
//! immutable fields. Used by tests and dry runs.

#![forbid(unsafe_code)]

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use recon_core::{ApiStatus, Managed, ObjectKey, ObjectStore, Op, StatusCause, StatusReason, StoreError};
use rustc_hash::FxHashMap;
use serde_json::{Map, Value as Json};
use tracing::debug;

#[derive(Default)]
struct Inner {
    objects: FxHashMap<ObjectKey, Json>,
    next_rv: u64,
    faults: FxHashMap<Op, VecDeque<StoreError>>,
    reads: u64,
    writes: u64,
}

/// In-memory [`ObjectStore`] for every [`Managed`] type.
#[derive(Default)]
pub struct MemStore {
    inner: Mutex<Inner>,
    /// kind -> JSON pointers that may not change on update
    immutable: FxHashMap<String, Vec<String>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject updates of `kind` objects that change the value at JSON `pointer`
    /// (e.g. `/spec/selector`).
    pub fn with_immutable_field(mut self, kind: &str, pointer: &str) -> Self {
        self.immutable.entry(kind.to_string()).or_default().push(pointer.to_string());
        self
    }

    /// Fail the next call of `op` with `err`. Faults queue per operation.
    pub fn inject_fault(&self, op: Op, err: StoreError) {
        self.lock().faults.entry(op).or_default().push_back(err);
    }

    /// Seed an object without counting it as a write.
    pub fn insert<K: Managed>(&self, obj: &K) -> Result<K, StoreError> {
        let key = key_of(obj)?;
        let stored = self.lock().create(&key, to_json(obj)?)?;
        from_json(stored)
    }

    pub fn fetch<K: Managed>(&self, key: &ObjectKey) -> Option<K> {
        let raw = self.lock().objects.get(key).cloned()?;
        serde_json::from_value(raw).ok()
    }

    pub fn contains(&self, key: &ObjectKey) -> bool {
        self.lock().objects.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.lock().objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of `get` calls served, including failed ones.
    pub fn reads(&self) -> u64 {
        self.lock().reads
    }

    /// Number of `create`/`update`/`delete` calls served, including failed ones.
    pub fn writes(&self) -> u64 {
        self.lock().writes
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn immutable_for(&self, kind: &str) -> &[String] {
        self.immutable.get(kind).map(Vec::as_slice).unwrap_or(&[])
    }

    fn get_raw(&self, key: &ObjectKey) -> Result<Json, StoreError> {
        let mut inner = self.lock();
        inner.reads += 1;
        if let Some(err) = inner.take_fault(Op::Get) {
            return Err(err);
        }
        inner.objects.get(key).cloned().ok_or_else(|| ApiStatus::not_found(key).into())
    }

    fn write_raw(&self, op: Op, key: &ObjectKey, obj: Option<Json>) -> Result<Option<Json>, StoreError> {
        let mut inner = self.lock();
        inner.writes += 1;
        if let Some(err) = inner.take_fault(op) {
            return Err(err);
        }
        match (op, obj) {
            (Op::Create, Some(obj)) => inner.create(key, obj).map(Some),
            (Op::Update, Some(obj)) => inner.update(key, obj, self.immutable_for(&key.kind)).map(Some),
            (Op::Delete, _) => {
                if inner.objects.remove(key).is_some() {
                    debug!(key = %key, "object deleted");
                }
                Ok(None)
            }
            _ => Err(bad_request("request carries no object")),
        }
    }
}

impl Inner {
    fn take_fault(&mut self, op: Op) -> Option<StoreError> {
        self.faults.get_mut(&op).and_then(VecDeque::pop_front)
    }

    fn bump_rv(&mut self) -> String {
        self.next_rv += 1;
        self.next_rv.to_string()
    }

    fn create(&mut self, key: &ObjectKey, mut obj: Json) -> Result<Json, StoreError> {
        if self.objects.contains_key(key) {
            return Err(ApiStatus::already_exists(key).into());
        }
        if obj.pointer("/metadata/resourceVersion").and_then(Json::as_str).is_some_and(|rv| !rv.is_empty()) {
            return Err(bad_request("resourceVersion should not be set on objects to be created"));
        }
        let rv = self.bump_rv();
        let meta = metadata_mut(&mut obj)?;
        meta.insert("uid".into(), Json::String(uuid::Uuid::new_v4().to_string()));
        meta.insert("resourceVersion".into(), Json::String(rv.clone()));
        meta.insert(
            "creationTimestamp".into(),
            Json::String(chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)),
        );
        self.objects.insert(key.clone(), obj.clone());
        debug!(key = %key, rv = %rv, "object created");
        Ok(obj)
    }

    fn update(&mut self, key: &ObjectKey, mut obj: Json, immutable: &[String]) -> Result<Json, StoreError> {
        let Some(stored) = self.objects.get(key) else {
            return Err(ApiStatus::not_found(key).into());
        };

        let stored_rv = stored.pointer("/metadata/resourceVersion").and_then(Json::as_str);
        let sent_rv = obj.pointer("/metadata/resourceVersion").and_then(Json::as_str);
        if sent_rv.is_some() && sent_rv != stored_rv {
            return Err(ApiStatus::conflict(key).into());
        }

        let causes: Vec<StatusCause> = immutable
            .iter()
            .filter(|p| stored.pointer(p) != obj.pointer(p))
            .map(|p| StatusCause { field: Some(field_path(p)), message: "field is immutable".into() })
            .collect();
        if !causes.is_empty() {
            return Err(ApiStatus::invalid(key, causes).into());
        }

        let uid = stored.pointer("/metadata/uid").cloned();
        let created = stored.pointer("/metadata/creationTimestamp").cloned();
        let rv = self.bump_rv();
        let meta = metadata_mut(&mut obj)?;
        if let Some(uid) = uid {
            meta.insert("uid".into(), uid);
        }
        if let Some(created) = created {
            meta.insert("creationTimestamp".into(), created);
        }
        meta.insert("resourceVersion".into(), Json::String(rv.clone()));
        self.objects.insert(key.clone(), obj.clone());
        debug!(key = %key, rv = %rv, "object updated");
        Ok(obj)
    }
}

#[async_trait::async_trait]
impl<K: Managed> ObjectStore<K> for MemStore {
    async fn get(&self, key: &ObjectKey) -> Result<K, StoreError> {
        from_json(self.get_raw(key)?)
    }

    async fn create(&self, obj: &K) -> Result<K, StoreError> {
        let key = key_of(obj)?;
        let stored = self.write_raw(Op::Create, &key, Some(to_json(obj)?))?;
        from_json(stored.unwrap_or_default())
    }

    async fn update(&self, obj: &K) -> Result<K, StoreError> {
        let key = key_of(obj)?;
        let stored = self.write_raw(Op::Update, &key, Some(to_json(obj)?))?;
        from_json(stored.unwrap_or_default())
    }

    async fn delete(&self, key: &ObjectKey) -> Result<(), StoreError> {
        self.write_raw(Op::Delete, key, None).map(|_| ())
    }
}

fn bad_request(msg: &str) -> StoreError {
    ApiStatus::new(400, StatusReason::BadRequest, msg).into()
}

fn key_of<K: Managed>(obj: &K) -> Result<ObjectKey, StoreError> {
    ObjectKey::from_object(obj).map_err(|e| ApiStatus::new(422, StatusReason::Invalid, e.to_string()).into())
}

fn to_json<K: Managed>(obj: &K) -> Result<Json, StoreError> {
    serde_json::to_value(obj).map_err(StoreError::transport)
}

fn from_json<K: Managed>(raw: Json) -> Result<K, StoreError> {
    serde_json::from_value(raw).map_err(StoreError::transport)
}

fn metadata_mut(obj: &mut Json) -> Result<&mut Map<String, Json>, StoreError> {
    obj.as_object_mut()
        .ok_or_else(|| bad_request("object must be a JSON object"))?
        .entry("metadata")
        .or_insert_with(|| Json::Object(Map::new()))
        .as_object_mut()
        .ok_or_else(|| bad_request("metadata must be a JSON object"))
}

/// `/spec/selector` -> `spec.selector`
fn field_path(pointer: &str) -> String {
    pointer.trim_start_matches('/').replace('/', ".")
}
