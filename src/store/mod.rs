//! Reference implementation of the remote collaborators on top of `SeaORM`/SQLite.
//!
//! [`DocumentBackend`] holds the documents and listeners. [`StoreClient`] and
//! [`ProfileInviteResolver`] expose it through the collaborator traits, calling in as the
//! identity provider's current principal.

/// Document persistence, atomic writes, and listener fan-out
pub mod backend;
/// Sign-in state and id tokens
pub mod identity;
/// Email lookup for invites
pub mod invite;
/// Access rules enforced on every read and write
pub mod rules;

pub use backend::DocumentBackend;
pub use identity::LocalIdentityProvider;
pub use invite::ProfileInviteResolver;

use crate::remote::{
    DocumentPath, FieldMap, IdentityProvider, ListenerRegistration, Query,
    RemoteCollectionClient, RemoteResult, SnapshotCallback,
};
use async_trait::async_trait;
use std::sync::Arc;

/// [`RemoteCollectionClient`] over a [`DocumentBackend`], authenticated as whoever is
/// signed in to `I`.
pub struct StoreClient<I> {
    backend: DocumentBackend,
    identity: Arc<I>,
}

impl<I: IdentityProvider> StoreClient<I> {
    /// Client calling into `backend` as the identity's current principal.
    pub const fn new(backend: DocumentBackend, identity: Arc<I>) -> Self {
        Self { backend, identity }
    }

    /// The underlying store.
    pub const fn backend(&self) -> &DocumentBackend {
        &self.backend
    }

    fn caller(&self) -> Option<String> {
        self.identity.current_principal().map(|p| p.id)
    }
}

#[async_trait]
impl<I: IdentityProvider> RemoteCollectionClient for StoreClient<I> {
    async fn listen(
        &self,
        query: Query,
        on_snapshot: SnapshotCallback,
    ) -> RemoteResult<ListenerRegistration> {
        let caller = self.caller();
        self.backend.listen(caller.as_deref(), query, on_snapshot).await
    }

    async fn add_document(&self, collection: &str, fields: FieldMap) -> RemoteResult<String> {
        let caller = self.caller();
        self.backend.add(caller.as_deref(), collection, fields).await
    }

    async fn set_document(
        &self,
        path: &DocumentPath,
        fields: FieldMap,
        merge: bool,
    ) -> RemoteResult<()> {
        let caller = self.caller();
        self.backend.set(caller.as_deref(), path, fields, merge).await
    }

    async fn update_document(&self, path: &DocumentPath, fields: FieldMap) -> RemoteResult<()> {
        let caller = self.caller();
        self.backend.update(caller.as_deref(), path, fields).await
    }

    async fn delete_document(&self, path: &DocumentPath) -> RemoteResult<()> {
        let caller = self.caller();
        self.backend.delete(caller.as_deref(), path).await
    }
}
