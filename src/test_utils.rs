//! Shared test utilities for `SavingsBuddy`.
//!
//! This module provides the in-memory database setup, a recording test double for the
//! remote store, a fixed invite resolver, and builders for principals and resources.

use crate::{
    config::database::create_tables,
    core::{
        principal::{Principal, normalize_email},
        profiles::mirror_profile,
        resource::{ResourceKind, SharedResource},
        session::AuthSession,
        sync::SyncEngine,
    },
    errors::Result,
    remote::{
        DocumentPath, FieldMap, IdentityProvider, InviteResolver, ListenerRegistration, Query,
        RemoteCollectionClient, RemoteError, RemoteResult, ResolvedUser, SnapshotCallback,
        SnapshotEvent,
    },
    store::{DocumentBackend, LocalIdentityProvider, ProfileInviteResolver, StoreClient},
};
use async_trait::async_trait;
use sea_orm::DatabaseConnection;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing_subscriber::EnvFilter;

/// Initializes tracing for tests. Safe to call from every test.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("trace")),
        )
        .with_test_writer()
        .try_init();
}

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all store-backed tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    create_tables(&db).await?;
    Ok(db)
}

/// A principal with a capitalized display name and an `@example.com` email.
///
/// # Defaults
/// * `display_name`: `id` with its first letter upper-cased
/// * `email`: `"{id}@example.com"`
pub fn principal(id: &str) -> Principal {
    let mut chars = id.chars();
    let display_name = chars
        .next()
        .map(|first| first.to_uppercase().chain(chars).collect::<String>())
        .unwrap_or_default();
    Principal::new(id, display_name, format!("{id}@example.com"))
}

/// A bucket with the given owner and members and no money in it.
pub fn resource_with_members(id: &str, owner: &str, members: &[&str]) -> SharedResource {
    SharedResource {
        kind: ResourceKind::Bucket,
        id: id.to_string(),
        name: format!("Bucket {id}"),
        target: 0.0,
        balance: 0.0,
        color: None,
        owner_id: owner.to_string(),
        member_ids: members.iter().map(ToString::to_string).collect(),
        created_at: None,
        last_updated_at: None,
        last_updated_by: None,
    }
}

/// A bucket owned by `"owner"` with the given goal and balance.
pub fn resource_with_amounts(id: &str, target: f64, balance: f64) -> SharedResource {
    SharedResource {
        target,
        balance,
        ..resource_with_members(id, "owner", &["owner"])
    }
}

/// A remote call captured by [`RecordingClient`].
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCall {
    /// `add_document`
    Add {
        /// Target collection
        collection: String,
        /// Field writes
        fields: FieldMap,
    },
    /// `set_document`
    Set {
        /// Target document
        path: DocumentPath,
        /// Field writes
        fields: FieldMap,
        /// Merge flag
        merge: bool,
    },
    /// `update_document`
    Update {
        /// Target document
        path: DocumentPath,
        /// Field writes
        fields: FieldMap,
    },
    /// `delete_document`
    Delete {
        /// Target document
        path: DocumentPath,
    },
}

#[derive(Default)]
struct Recording {
    listeners: Vec<(u64, SnapshotCallback)>,
    last_callback: Option<SnapshotCallback>,
    last_query: Option<Query>,
    listen_count: usize,
    detach_count: usize,
    next_listener: u64,
    fail_next_listen: Option<RemoteError>,
    write_failure: Option<RemoteError>,
    writes: Vec<RemoteCall>,
}

/// Remote store double: records every call and lets the test deliver snapshots by hand.
#[derive(Default)]
pub struct RecordingClient {
    state: Arc<Mutex<Recording>>,
}

impl RecordingClient {
    /// A client with no listeners and no recorded calls.
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut Recording) -> T) -> T {
        f(&mut self.state.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Delivers `event` to every attached listener.
    pub fn deliver(&self, event: SnapshotEvent) {
        let callbacks: Vec<SnapshotCallback> =
            self.with(|s| s.listeners.iter().map(|(_, c)| Arc::clone(c)).collect());
        for callback in callbacks {
            callback(event.clone());
        }
    }

    /// Callback of the most recent listener, kept even after it is detached.
    pub fn last_callback(&self) -> Option<SnapshotCallback> {
        self.with(|s| s.last_callback.clone())
    }

    /// Query of the most recent listener.
    pub fn last_query(&self) -> Option<Query> {
        self.with(|s| s.last_query.clone())
    }

    /// Listeners currently attached.
    pub fn active_listeners(&self) -> usize {
        self.with(|s| s.listeners.len())
    }

    /// Total `listen` calls that succeeded.
    pub fn listen_count(&self) -> usize {
        self.with(|s| s.listen_count)
    }

    /// Total listener detaches.
    pub fn detach_count(&self) -> usize {
        self.with(|s| s.detach_count)
    }

    /// Makes the next `listen` call fail.
    pub fn fail_next_listen(&self, error: RemoteError) {
        self.with(|s| s.fail_next_listen = Some(error));
    }

    /// Makes every subsequent write fail (after being recorded).
    pub fn fail_writes(&self, error: RemoteError) {
        self.with(|s| s.write_failure = Some(error));
    }

    /// Every recorded write, oldest first.
    pub fn writes(&self) -> Vec<RemoteCall> {
        self.with(|s| s.writes.clone())
    }

    /// Number of recorded writes.
    pub fn write_count(&self) -> usize {
        self.with(|s| s.writes.len())
    }

    fn record(&self, call: RemoteCall) -> RemoteResult<()> {
        self.with(|s| {
            s.writes.push(call);
            s.write_failure.clone().map_or(Ok(()), Err)
        })
    }
}

#[async_trait]
impl RemoteCollectionClient for RecordingClient {
    async fn listen(
        &self,
        query: Query,
        on_snapshot: SnapshotCallback,
    ) -> RemoteResult<ListenerRegistration> {
        let id = self.with(|s| {
            if let Some(error) = s.fail_next_listen.take() {
                return Err(error);
            }
            s.next_listener += 1;
            s.listen_count += 1;
            s.listeners.push((s.next_listener, Arc::clone(&on_snapshot)));
            s.last_callback = Some(on_snapshot);
            s.last_query = Some(query);
            Ok(s.next_listener)
        })?;

        let state = Arc::clone(&self.state);
        Ok(ListenerRegistration::new(move || {
            let mut s = state.lock().unwrap_or_else(PoisonError::into_inner);
            s.listeners.retain(|(listener, _)| *listener != id);
            s.detach_count += 1;
        }))
    }

    async fn add_document(&self, collection: &str, fields: FieldMap) -> RemoteResult<String> {
        self.record(RemoteCall::Add {
            collection: collection.to_string(),
            fields,
        })?;
        Ok(format!("doc-{}", self.write_count()))
    }

    async fn set_document(
        &self,
        path: &DocumentPath,
        fields: FieldMap,
        merge: bool,
    ) -> RemoteResult<()> {
        self.record(RemoteCall::Set {
            path: path.clone(),
            fields,
            merge,
        })
    }

    async fn update_document(&self, path: &DocumentPath, fields: FieldMap) -> RemoteResult<()> {
        self.record(RemoteCall::Update {
            path: path.clone(),
            fields,
        })
    }

    async fn delete_document(&self, path: &DocumentPath) -> RemoteResult<()> {
        self.record(RemoteCall::Delete { path: path.clone() })
    }
}

/// Invite resolver over a fixed email → uid table.
pub struct StaticResolver {
    users: HashMap<String, String>,
}

impl StaticResolver {
    /// Resolver knowing exactly the given `(email, uid)` pairs.
    pub fn new(users: &[(&str, &str)]) -> Self {
        Self {
            users: users
                .iter()
                .map(|(email, uid)| (normalize_email(email), (*uid).to_string()))
                .collect(),
        }
    }
}

#[async_trait]
impl InviteResolver for StaticResolver {
    async fn lookup_user_by_email(&self, email: &str) -> RemoteResult<ResolvedUser> {
        let email = normalize_email(email);
        self.users
            .get(&email)
            .map(|uid| ResolvedUser {
                uid: uid.clone(),
                email: email.clone(),
            })
            .ok_or_else(|| RemoteError::NotFound(email.clone()))
    }
}

/// Store client over the local identity provider.
pub type LocalClient = StoreClient<LocalIdentityProvider>;

/// Invite resolver over the local identity provider.
pub type LocalResolver = ProfileInviteResolver<LocalIdentityProvider>;

/// The reference store wired up end to end over an in-memory database.
pub struct StoreEnv {
    /// Shared document store
    pub backend: DocumentBackend,
    /// Sign-in switch
    pub identity: Arc<LocalIdentityProvider>,
    /// Store client acting as the signed-in principal
    pub client: Arc<LocalClient>,
    /// Invite lookup over mirrored profiles
    pub resolver: Arc<LocalResolver>,
}

impl StoreEnv {
    /// Fresh store with nobody signed in.
    pub async fn new() -> Result<Self> {
        let backend = DocumentBackend::new(setup_test_db().await?);
        let identity = Arc::new(LocalIdentityProvider::new());
        Ok(Self {
            client: Arc::new(StoreClient::new(backend.clone(), Arc::clone(&identity))),
            resolver: Arc::new(ProfileInviteResolver::new(
                backend.clone(),
                Arc::clone(&identity),
            )),
            backend,
            identity,
        })
    }

    /// Signs `id` in and mirrors their profile.
    pub async fn sign_in(&self, id: &str) -> Result<Principal> {
        let who = principal(id);
        self.identity.sign_in(who.clone());
        mirror_profile(self.client.as_ref(), &who).await?;
        Ok(who)
    }

    /// Mirrors `id`'s profile without leaving them signed in.
    pub async fn register_profile(&self, id: &str) -> Result<()> {
        let previous = self.identity.current_principal();
        self.sign_in(id).await?;
        match previous {
            Some(previous) => self.identity.sign_in(previous),
            None => self.identity.sign_out(),
        }
        Ok(())
    }

    /// A fresh bucket engine over this store.
    pub fn bucket_engine(&self) -> SyncEngine<LocalClient, LocalResolver> {
        SyncEngine::new(
            ResourceKind::Bucket,
            Arc::clone(&self.client),
            Arc::clone(&self.resolver),
        )
    }

    /// A session over this store.
    pub fn session(&self) -> AuthSession<LocalClient, LocalResolver, LocalIdentityProvider> {
        AuthSession::new(
            Arc::clone(&self.identity),
            Arc::clone(&self.client),
            Arc::clone(&self.resolver),
        )
    }
}
