//! Interfaces of the external collaborators: the remote document store, the identity
//! provider, and the invite-lookup callable.
//!
//! Implementations are injected into the engines, so tests can substitute doubles and the
//! binary can run against the `sea-orm` backed store in [`crate::store`].

/// Documents, queries, and atomic field operations
pub mod document;

pub use document::{
    Direction, Document, DocumentPath, FieldMap, FieldValue, Filter, OrderBy, Query,
};

use crate::core::principal::Principal;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Failure reported by a remote collaborator, keyed by the store's error code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// Caller is not signed in
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),
    /// Request was malformed
    #[error("invalid-argument: {0}")]
    InvalidArgument(String),
    /// Document or user does not exist
    #[error("not-found: {0}")]
    NotFound(String),
    /// Access rules rejected the request
    #[error("permission-denied: {0}")]
    PermissionDenied(String),
    /// Store temporarily unreachable
    #[error("unavailable: {0}")]
    Unavailable(String),
    /// Unexpected store failure
    #[error("internal: {0}")]
    Internal(String),
}

impl From<sea_orm::DbErr> for RemoteError {
    fn from(value: sea_orm::DbErr) -> Self {
        Self::Unavailable(value.to_string())
    }
}

/// Result of a remote call.
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// One delivery on a listener: the full ordered result set, or an error.
pub type SnapshotEvent = RemoteResult<Vec<Document>>;

/// Callback invoked for every snapshot delivery.
pub type SnapshotCallback = Arc<dyn Fn(SnapshotEvent) + Send + Sync>;

/// Callback invoked on every sign-in/sign-out.
pub type AuthCallback = Arc<dyn Fn(Option<Principal>) + Send + Sync>;

/// Handle to an active listener. Removing it (explicitly or by dropping) detaches the
/// listener; removal is idempotent.
pub struct ListenerRegistration {
    detach: Option<Box<dyn FnOnce() + Send>>,
}

impl ListenerRegistration {
    /// Wraps the closure that detaches the listener.
    pub fn new(detach: impl FnOnce() + Send + 'static) -> Self {
        Self {
            detach: Some(Box::new(detach)),
        }
    }

    /// Detaches the listener. Calling this more than once is a no-op.
    pub fn remove(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }

    /// Whether the listener is still attached.
    #[must_use]
    pub const fn is_attached(&self) -> bool {
        self.detach.is_some()
    }
}

impl Drop for ListenerRegistration {
    fn drop(&mut self) {
        self.remove();
    }
}

impl fmt::Debug for ListenerRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistration")
            .field("attached", &self.is_attached())
            .finish()
    }
}

/// Remote document store with filtered real-time queries and atomic field writes.
#[async_trait]
pub trait RemoteCollectionClient: Send + Sync {
    /// Opens a listener. The initial snapshot may be delivered before this returns; every
    /// later change to the result set triggers another delivery.
    async fn listen(
        &self,
        query: Query,
        on_snapshot: SnapshotCallback,
    ) -> RemoteResult<ListenerRegistration>;

    /// Creates a document with a store-assigned id and returns the id.
    async fn add_document(&self, collection: &str, fields: FieldMap) -> RemoteResult<String>;

    /// Creates or overwrites a document at a known path. With `merge`, unspecified fields
    /// of an existing document are kept.
    async fn set_document(
        &self,
        path: &DocumentPath,
        fields: FieldMap,
        merge: bool,
    ) -> RemoteResult<()>;

    /// Applies a partial update to an existing document.
    async fn update_document(&self, path: &DocumentPath, fields: FieldMap) -> RemoteResult<()>;

    /// Deletes a document.
    async fn delete_document(&self, path: &DocumentPath) -> RemoteResult<()>;
}

/// Supplies the authenticated principal.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Registers for sign-in/sign-out notifications. The current state is delivered
    /// immediately.
    fn on_auth_state_change(&self, callback: AuthCallback) -> ListenerRegistration;

    /// Currently signed-in principal, if any.
    fn current_principal(&self) -> Option<Principal>;

    /// Returns an id token for the current principal, refreshing it when asked.
    async fn current_id_token(&self, force_refresh: bool) -> RemoteResult<String>;
}

/// A user id resolved from an email address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedUser {
    /// Resolved principal id
    pub uid: String,
    /// Email as stored for that user
    pub email: String,
}

/// Callable that maps an email address to a user id.
#[async_trait]
pub trait InviteResolver: Send + Sync {
    /// Fails with `Unauthenticated`, `InvalidArgument` (empty email), or `NotFound`.
    async fn lookup_user_by_email(&self, email: &str) -> RemoteResult<ResolvedUser>;
}

#[async_trait]
impl<T: RemoteCollectionClient + ?Sized> RemoteCollectionClient for Arc<T> {
    async fn listen(
        &self,
        query: Query,
        on_snapshot: SnapshotCallback,
    ) -> RemoteResult<ListenerRegistration> {
        (**self).listen(query, on_snapshot).await
    }

    async fn add_document(&self, collection: &str, fields: FieldMap) -> RemoteResult<String> {
        (**self).add_document(collection, fields).await
    }

    async fn set_document(
        &self,
        path: &DocumentPath,
        fields: FieldMap,
        merge: bool,
    ) -> RemoteResult<()> {
        (**self).set_document(path, fields, merge).await
    }

    async fn update_document(&self, path: &DocumentPath, fields: FieldMap) -> RemoteResult<()> {
        (**self).update_document(path, fields).await
    }

    async fn delete_document(&self, path: &DocumentPath) -> RemoteResult<()> {
        (**self).delete_document(path).await
    }
}
