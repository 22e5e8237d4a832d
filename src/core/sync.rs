//! Shared-resource sync engine - one instance per resource kind.
//!
//! The engine keeps a [`LiveCollection`] of the principal's buckets (or trips) and turns
//! user intents into remote writes. Intents are validated and checked by the
//! authorization guard before anything is sent. Nothing is applied locally: the next
//! snapshot carries the store's result back into the view.

use crate::{
    core::{
        authorization::{self, Action},
        live::{CollectionView, LiveCollection, SyncStatus},
        principal::{Principal, normalize_email},
        resource::{
            NewResource, ResourceKind, ResourceUpdate, SharedResource, stamp_update,
            validate_contribution,
        },
    },
    errors::{Error, Result},
    remote::{
        Direction, DocumentPath, FieldMap, FieldValue, Filter, InviteResolver, Query,
        RemoteCollectionClient, RemoteError,
        document::{CREATED_AT, MEMBER_IDS},
    },
};
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

/// Live view and mutation surface for one resource collection.
pub struct SyncEngine<C, R> {
    kind: ResourceKind,
    client: Arc<C>,
    resolver: Arc<R>,
    principal: Mutex<Option<Principal>>,
    collection: LiveCollection<SharedResource>,
}

impl<C, R> SyncEngine<C, R>
where
    C: RemoteCollectionClient,
    R: InviteResolver,
{
    /// Creates an unsubscribed engine for the given kind.
    pub fn new(kind: ResourceKind, client: Arc<C>, resolver: Arc<R>) -> Self {
        let label = match kind {
            ResourceKind::Bucket => "buckets",
            ResourceKind::Trip => "trips",
        };
        Self {
            kind,
            client,
            resolver,
            principal: Mutex::new(None),
            collection: LiveCollection::new(label),
        }
    }

    /// Resource kind this engine syncs.
    pub const fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Principal the engine is subscribed for.
    pub fn principal(&self) -> Option<Principal> {
        self.principal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The membership-filtered, newest-first query for a principal.
    pub fn query_for(&self, principal: &Principal) -> Query {
        Query::collection(self.kind.collection())
            .filter(Filter::ArrayContains {
                field: MEMBER_IDS.to_string(),
                value: Value::String(principal.id.clone()),
            })
            .order_by(CREATED_AT, Direction::Descending)
    }

    /// Opens the subscription for `principal`. Switching to a different principal clears
    /// the local collection first.
    #[instrument(skip(self, principal), fields(kind = %self.kind, principal = %principal.id))]
    pub async fn subscribe(&self, principal: Principal) -> Result<()> {
        let previous = self.principal();
        if previous.as_ref().is_some_and(|p| p.id != principal.id) {
            debug!("Principal changed, clearing local collection");
            self.collection.unsubscribe();
        }

        let query = self.query_for(&principal);
        *self.principal.lock().unwrap_or_else(PoisonError::into_inner) = Some(principal);

        let kind = self.kind;
        self.collection
            .subscribe(self.client.as_ref(), query, move |document| {
                SharedResource::decode(kind, document)
            })
            .await
    }

    /// Re-opens the subscription for the current principal, keeping loaded data.
    pub async fn retry(&self) -> Result<()> {
        let principal = self.principal().ok_or(Error::Unauthenticated)?;
        info!("Retrying {} subscription", self.kind);
        let query = self.query_for(&principal);
        let kind = self.kind;
        self.collection
            .subscribe(self.client.as_ref(), query, move |document| {
                SharedResource::decode(kind, document)
            })
            .await
    }

    /// Tears down the subscription and forgets the principal. Idempotent.
    pub fn unsubscribe(&self) {
        self.collection.unsubscribe();
        self.principal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Clears the surfaced sync error.
    pub fn dismiss_error(&self) {
        self.collection.dismiss_error();
    }

    /// Frozen copy of the current view.
    pub fn snapshot(&self) -> CollectionView<SharedResource> {
        self.collection.snapshot()
    }

    /// Receiver notified after every reconciliation.
    pub fn watch(&self) -> watch::Receiver<CollectionView<SharedResource>> {
        self.collection.watch()
    }

    /// Lifecycle state.
    pub fn status(&self) -> SyncStatus {
        self.collection.status()
    }

    /// Looks a resource up in the current view.
    pub fn resource(&self, resource_id: &str) -> Option<SharedResource> {
        self.collection
            .snapshot()
            .items
            .iter()
            .find(|r| r.id == resource_id)
            .cloned()
    }

    /// Creates a resource owned by the current principal and returns its id.
    #[instrument(skip(self, input), fields(kind = %self.kind))]
    pub async fn create(&self, input: &NewResource) -> Result<String> {
        let principal = self.live_principal()?;
        let fields = input.to_fields(self.kind, &principal.id)?;

        let id = self
            .client
            .add_document(self.kind.collection(), fields)
            .await
            .map_err(|e| write_failed("create", e))?;
        info!("Created {} {} for {}", self.kind, id, principal.id);
        Ok(id)
    }

    /// Adds `amount` to the balance with an atomic increment. Any member may contribute.
    #[instrument(skip(self), fields(kind = %self.kind))]
    pub async fn contribute(&self, resource_id: &str, amount: f64) -> Result<()> {
        let principal = self.live_principal()?;
        let amount = validate_contribution(amount)?;
        let resource = self.find(resource_id)?;
        authorization::require(Action::Contribute, &principal, &resource)?;

        let mut fields = FieldMap::new();
        fields.insert(
            self.kind.balance_field().to_string(),
            FieldValue::Increment(amount),
        );
        stamp_update(&mut fields, &principal.id);

        self.write("contribution", resource_id, fields).await?;
        debug!("{} contributed {} to {}", principal.id, amount, resource_id);
        Ok(())
    }

    /// Owner edit of name, target, balance, or color.
    #[instrument(skip(self, update), fields(kind = %self.kind))]
    pub async fn edit(&self, resource_id: &str, update: &ResourceUpdate) -> Result<()> {
        let principal = self.live_principal()?;
        let resource = self.find(resource_id)?;
        authorization::require(Action::Edit, &principal, &resource)?;
        if update.is_empty() {
            debug!("Empty edit for {}, nothing to send", resource_id);
            return Ok(());
        }
        let fields = update.to_fields(self.kind, &principal.id)?;

        self.write("edit", resource_id, fields).await
    }

    /// Owner deletion. The next snapshot removes the resource locally.
    #[instrument(skip(self), fields(kind = %self.kind))]
    pub async fn delete(&self, resource_id: &str) -> Result<()> {
        let principal = self.live_principal()?;
        let resource = self.find(resource_id)?;
        authorization::require(Action::Delete, &principal, &resource)?;

        self.client
            .delete_document(&self.path(resource_id))
            .await
            .map_err(|e| write_failed("delete", e))?;
        info!("Deleted {} {}", self.kind, resource_id);
        Ok(())
    }

    /// Owner invites a user by email; the resolved id is added with an atomic union.
    #[instrument(skip(self, email), fields(kind = %self.kind))]
    pub async fn invite_member(&self, resource_id: &str, email: &str) -> Result<()> {
        let principal = self.live_principal()?;
        let resource = self.find(resource_id)?;
        authorization::require(Action::Invite, &principal, &resource)?;

        let email = normalize_email(email);
        if email.is_empty() {
            return Err(Error::validation("Email cannot be empty"));
        }

        let resolved = match self.resolver.lookup_user_by_email(&email).await {
            Ok(resolved) => resolved,
            Err(RemoteError::NotFound(_)) => {
                return Err(Error::NotFound {
                    what: format!("User with email {email}"),
                });
            }
            Err(e) => return Err(write_failed("invite", e)),
        };

        if resolved.uid == principal.id {
            return Err(Error::SelfInvite);
        }
        if resource.member_ids.iter().any(|id| *id == resolved.uid) {
            return Err(Error::AlreadyMember {
                user_id: resolved.uid,
            });
        }

        let mut fields = FieldMap::new();
        fields.insert(
            MEMBER_IDS.to_string(),
            FieldValue::ArrayUnion(vec![Value::String(resolved.uid.clone())]),
        );
        stamp_update(&mut fields, &principal.id);

        self.write("invite", resource_id, fields).await?;
        info!("Invited {} to {} {}", resolved.uid, self.kind, resource_id);
        Ok(())
    }

    /// Owner removes another member with an atomic set-difference.
    #[instrument(skip(self), fields(kind = %self.kind))]
    pub async fn remove_member(&self, resource_id: &str, member_id: &str) -> Result<()> {
        let principal = self.live_principal()?;
        let resource = self.find(resource_id)?;
        authorization::require(Action::RemoveMember, &principal, &resource)?;
        if member_id == resource.owner_id {
            return Err(Error::CannotRemoveOwner);
        }
        if !resource.member_ids.iter().any(|id| id == member_id) {
            return Err(Error::NotFound {
                what: format!("Member {member_id}"),
            });
        }

        let mut fields = FieldMap::new();
        fields.insert(
            MEMBER_IDS.to_string(),
            FieldValue::ArrayRemove(vec![Value::String(member_id.to_string())]),
        );
        stamp_update(&mut fields, &principal.id);

        self.write("remove member", resource_id, fields).await?;
        info!("Removed {} from {} {}", member_id, self.kind, resource_id);
        Ok(())
    }

    /// A non-owner member removes themselves.
    #[instrument(skip(self), fields(kind = %self.kind))]
    pub async fn leave(&self, resource_id: &str) -> Result<()> {
        let principal = self.live_principal()?;
        let resource = self.find(resource_id)?;
        if authorization::is_owner(&principal, &resource) {
            return Err(Error::OwnerCannotLeave);
        }
        authorization::require(Action::Leave, &principal, &resource)?;

        let mut fields = FieldMap::new();
        fields.insert(
            MEMBER_IDS.to_string(),
            FieldValue::ArrayRemove(vec![Value::String(principal.id.clone())]),
        );
        stamp_update(&mut fields, &principal.id);

        self.write("leave", resource_id, fields).await?;
        info!("{} left {} {}", principal.id, self.kind, resource_id);
        Ok(())
    }

    /// The signed-in principal, provided the subscription is live.
    fn live_principal(&self) -> Result<Principal> {
        let status = self.collection.status();
        if status != SyncStatus::Live {
            return Err(Error::NotLive { status });
        }
        self.principal().ok_or(Error::Unauthenticated)
    }

    fn find(&self, resource_id: &str) -> Result<SharedResource> {
        self.resource(resource_id).ok_or_else(|| Error::NotFound {
            what: format!("{} {}", self.kind, resource_id),
        })
    }

    fn path(&self, resource_id: &str) -> DocumentPath {
        DocumentPath::new(self.kind.collection(), resource_id)
    }

    async fn write(
        &self,
        operation: &'static str,
        resource_id: &str,
        fields: FieldMap,
    ) -> Result<()> {
        self.client
            .update_document(&self.path(resource_id), fields)
            .await
            .map_err(|e| write_failed(operation, e))
    }
}

fn write_failed(operation: &'static str, source: RemoteError) -> Error {
    warn!("Remote {} rejected: {}", operation, source);
    Error::remote_write(operation, source)
}
