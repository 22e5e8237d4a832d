//! `SeaORM` backed document store with real-time listeners.
//!
//! Writes are serialized and each one runs in a database transaction. Atomic field
//! operators are resolved against the stored row inside that transaction, and the access
//! rules see the before and after images. After commit, every listener on the written
//! collection gets a fresh snapshot of its query. Deliveries are ordered by a single
//! notification lock, so a listener never observes an older state after a newer one.

use crate::{
    entities::{DocumentColumn, DocumentEntity, document},
    remote::{
        Direction, Document, DocumentPath, FieldMap, FieldValue, ListenerRegistration, Query,
        RemoteError, RemoteResult, SnapshotCallback, document::compare_values,
    },
    store::rules,
};
use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use sea_orm::{ActiveModelTrait, DatabaseConnection, QueryFilter, Set, TransactionTrait, prelude::*};
use serde_json::{Map, Value};
use std::sync::{
    Arc, Mutex, PoisonError, Weak,
    atomic::{AtomicU64, Ordering},
};
use tracing::{debug, trace, warn};

type Data = Map<String, Value>;

#[derive(Clone)]
struct Listener {
    id: u64,
    caller: String,
    query: Query,
    callback: SnapshotCallback,
}

struct Inner {
    db: DatabaseConnection,
    write_lock: tokio::sync::Mutex<()>,
    notify_lock: tokio::sync::Mutex<()>,
    clock: Mutex<Option<DateTime<Utc>>>,
    listeners: Mutex<Vec<Listener>>,
    next_listener: AtomicU64,
}

impl Inner {
    fn remove_listener(&self, id: u64) {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        listeners.retain(|l| l.id != id);
        trace!("Removed listener {}, {} remaining", id, listeners.len());
    }

    fn is_registered(&self, id: u64) -> bool {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|l| l.id == id)
    }
}

/// The kinds of write the store accepts.
enum Write {
    Create(FieldMap),
    Set { fields: FieldMap, merge: bool },
    Update(FieldMap),
    Delete,
}

/// Document store over a `SeaORM` connection. Cloning shares the same store.
#[derive(Clone)]
pub struct DocumentBackend {
    inner: Arc<Inner>,
}

impl DocumentBackend {
    /// Wraps a connection whose `documents` table already exists.
    #[must_use]
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            inner: Arc::new(Inner {
                db,
                write_lock: tokio::sync::Mutex::new(()),
                notify_lock: tokio::sync::Mutex::new(()),
                clock: Mutex::new(None),
                listeners: Mutex::new(Vec::new()),
                next_listener: AtomicU64::new(1),
            }),
        }
    }

    /// Number of attached listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Runs `query` for `caller` and keeps delivering its result set until the returned
    /// registration is removed. The first snapshot is delivered before this returns.
    pub async fn listen(
        &self,
        caller: Option<&str>,
        query: Query,
        callback: SnapshotCallback,
    ) -> RemoteResult<ListenerRegistration> {
        let caller = require_caller(caller)?;
        rules::check_query(caller, &query)?;

        let _order = self.inner.notify_lock.lock().await;
        let initial = self.run_query(caller, &query).await?;
        let id = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);
        debug!(
            "Listener {} on {} for {} ({} documents)",
            id,
            query.collection,
            caller,
            initial.len()
        );
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Listener {
                id,
                caller: caller.to_string(),
                query,
                callback: Arc::clone(&callback),
            });
        callback(Ok(initial));

        let inner: Weak<Inner> = Arc::downgrade(&self.inner);
        Ok(ListenerRegistration::new(move || {
            if let Some(inner) = inner.upgrade() {
                inner.remove_listener(id);
            }
        }))
    }

    /// Creates a document with a fresh id.
    pub async fn add(
        &self,
        caller: Option<&str>,
        collection: &str,
        fields: FieldMap,
    ) -> RemoteResult<String> {
        let id = uuid::Uuid::new_v4().simple().to_string();
        let path = DocumentPath::new(collection, id.clone());
        self.write(caller, &path, Write::Create(fields)).await?;
        Ok(id)
    }

    /// Creates or overwrites a document; with `merge`, untouched fields are kept.
    pub async fn set(
        &self,
        caller: Option<&str>,
        path: &DocumentPath,
        fields: FieldMap,
        merge: bool,
    ) -> RemoteResult<()> {
        self.write(caller, path, Write::Set { fields, merge }).await
    }

    /// Partially updates an existing document.
    pub async fn update(
        &self,
        caller: Option<&str>,
        path: &DocumentPath,
        fields: FieldMap,
    ) -> RemoteResult<()> {
        self.write(caller, path, Write::Update(fields)).await
    }

    /// Deletes an existing document.
    pub async fn delete(&self, caller: Option<&str>, path: &DocumentPath) -> RemoteResult<()> {
        self.write(caller, path, Write::Delete).await
    }

    /// Reads one document, bypassing access rules. Used by trusted server-side code.
    pub async fn get(&self, path: &DocumentPath) -> RemoteResult<Option<Document>> {
        let row = DocumentEntity::find_by_id((path.collection.clone(), path.id.clone()))
            .one(&self.inner.db)
            .await?;
        Ok(row.map(into_document))
    }

    /// Every document in a collection, bypassing access rules.
    pub async fn all(&self, collection: &str) -> RemoteResult<Vec<Document>> {
        let rows = DocumentEntity::find()
            .filter(DocumentColumn::Collection.eq(collection))
            .all(&self.inner.db)
            .await?;
        Ok(rows.into_iter().map(into_document).collect())
    }

    async fn write(
        &self,
        caller: Option<&str>,
        path: &DocumentPath,
        write: Write,
    ) -> RemoteResult<()> {
        let caller = require_caller(caller)?;
        {
            let _serialized = self.inner.write_lock.lock().await;
            let txn = self.inner.db.begin().await?;

            let existing = DocumentEntity::find_by_id((path.collection.clone(), path.id.clone()))
                .one(&txn)
                .await?;
            let now = self.next_timestamp();
            let stamp = now.to_rfc3339_opts(SecondsFormat::Micros, true);

            match (write, existing) {
                (Write::Create(_), Some(_)) => {
                    return Err(RemoteError::InvalidArgument(format!("{path} already exists")));
                }
                (Write::Update(_) | Write::Delete, None) => {
                    return Err(RemoteError::NotFound(path.to_string()));
                }
                (Write::Create(fields) | Write::Set { fields, .. }, None) => {
                    let mut data = Data::new();
                    apply_fields(&mut data, fields, &stamp);
                    rules::check_create(caller, &path.collection, &path.id, &data)?;
                    DocumentEntity::insert(document::ActiveModel {
                        collection: Set(path.collection.clone()),
                        id: Set(path.id.clone()),
                        data: Set(Value::Object(data)),
                        created_at: Set(now),
                        updated_at: Set(now),
                    })
                    .exec_without_returning(&txn)
                    .await?;
                }
                (Write::Set { fields, merge }, Some(row)) => {
                    let old = object(&row.data);
                    let mut data = if merge { old.clone() } else { Data::new() };
                    apply_fields(&mut data, fields, &stamp);
                    rules::check_update(caller, &path.collection, &path.id, &old, &data)?;
                    replace(row, data, now).update(&txn).await?;
                }
                (Write::Update(fields), Some(row)) => {
                    let old = object(&row.data);
                    let mut data = old.clone();
                    apply_fields(&mut data, fields, &stamp);
                    rules::check_update(caller, &path.collection, &path.id, &old, &data)?;
                    replace(row, data, now).update(&txn).await?;
                }
                (Write::Delete, Some(row)) => {
                    rules::check_delete(caller, &path.collection, &object(&row.data))?;
                    DocumentEntity::delete_by_id((path.collection.clone(), path.id.clone()))
                        .exec(&txn)
                        .await?;
                }
            }

            txn.commit().await?;
            debug!("{} wrote {}", caller, path);
        }

        self.notify(&path.collection).await;
        Ok(())
    }

    /// Re-runs every listener's query on `collection` and delivers the result.
    async fn notify(&self, collection: &str) {
        let _order = self.inner.notify_lock.lock().await;
        let listeners: Vec<Listener> = self
            .inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|l| l.query.collection == collection)
            .cloned()
            .collect();

        for listener in listeners {
            let event = self.run_query(&listener.caller, &listener.query).await;
            if let Err(e) = &event {
                warn!("Listener {} query failed: {}", listener.id, e);
            }
            if self.inner.is_registered(listener.id) {
                (listener.callback)(event);
            }
        }
    }

    async fn run_query(&self, caller: &str, query: &Query) -> RemoteResult<Vec<Document>> {
        let rows = DocumentEntity::find()
            .filter(DocumentColumn::Collection.eq(query.collection.as_str()))
            .all(&self.inner.db)
            .await?;

        let mut documents: Vec<Document> = rows
            .into_iter()
            .map(into_document)
            .filter(|d| query.filter.as_ref().is_none_or(|f| f.matches(&d.data)))
            .filter(|d| rules::can_read(caller, &query.collection, &d.data))
            .collect();

        if let Some(order) = &query.order_by {
            documents.sort_by(|a, b| {
                let ordering = compare_values(a.get(&order.field), b.get(&order.field));
                match order.direction {
                    Direction::Ascending => ordering,
                    Direction::Descending => ordering.reverse(),
                }
                .then_with(|| a.id.cmp(&b.id))
            });
        }
        Ok(documents)
    }

    /// Strictly increasing server time.
    fn next_timestamp(&self) -> DateTime<Utc> {
        let mut last = self.inner.clock.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Utc::now();
        let next = match *last {
            Some(previous) if now <= previous => previous + TimeDelta::microseconds(1),
            _ => now,
        };
        *last = Some(next);
        next
    }
}

fn require_caller(caller: Option<&str>) -> RemoteResult<&str> {
    caller
        .filter(|c| !c.is_empty())
        .ok_or_else(|| RemoteError::Unauthenticated("sign in required".to_string()))
}

fn object(value: &Value) -> Data {
    value.as_object().cloned().unwrap_or_default()
}

fn into_document(row: document::Model) -> Document {
    Document::new(row.id, row.data)
}

fn replace(row: document::Model, data: Data, now: DateTime<Utc>) -> document::ActiveModel {
    let mut active: document::ActiveModel = row.into();
    active.data = Set(Value::Object(data));
    active.updated_at = Set(now);
    active
}

fn number(value: f64) -> Value {
    serde_json::Number::from_f64(value).map_or(Value::Null, Value::Number)
}

/// Resolves field operations against the stored body.
fn apply_fields(data: &mut Data, fields: FieldMap, server_time: &str) {
    for (field, op) in fields {
        match op {
            FieldValue::Set(value) => {
                data.insert(field, value);
            }
            FieldValue::Increment(delta) => {
                let current = data.get(&field).and_then(Value::as_f64).unwrap_or(0.0);
                data.insert(field, number(current + delta));
            }
            FieldValue::ArrayUnion(values) => {
                let mut items = data
                    .get(&field)
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                for value in values {
                    if !items.contains(&value) {
                        items.push(value);
                    }
                }
                data.insert(field, Value::Array(items));
            }
            FieldValue::ArrayRemove(values) => {
                let mut items = data
                    .get(&field)
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                items.retain(|item| !values.contains(item));
                data.insert(field, Value::Array(items));
            }
            FieldValue::ServerTimestamp => {
                data.insert(field, Value::String(server_time.to_string()));
            }
            FieldValue::Delete => {
                data.remove(&field);
            }
        }
    }
}
