//! Auth session - drives every engine from the identity provider's sign-in state.
//!
//! A sign-in first forces a fresh id token, so no listener opens with a stale credential.
//! It then mirrors the public profile and subscribes the bucket and trip engines. A
//! sign-out tears every subscription down. Auth changes are forwarded over a channel and
//! handled one at a time in delivery order.

use crate::{
    core::{
        aggregate,
        principal::Principal,
        profiles::{ProfileDirectory, mirror_profile},
        live::CollectionView,
        resource::{ResourceKind, SharedResource},
        sync::SyncEngine,
    },
    errors::{Error, Result},
    remote::{IdentityProvider, InviteResolver, ListenerRegistration, RemoteCollectionClient},
};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

/// Auth-state changes as delivered by the identity provider.
pub type AuthChanges = mpsc::UnboundedReceiver<Option<Principal>>;

/// Every synced view belonging to one signed-in principal.
pub struct AuthSession<C, R, I> {
    identity: Arc<I>,
    client: Arc<C>,
    buckets: SyncEngine<C, R>,
    trips: SyncEngine<C, R>,
    profiles: ProfileDirectory<C>,
}

impl<C, R, I> AuthSession<C, R, I>
where
    C: RemoteCollectionClient,
    R: InviteResolver,
    I: IdentityProvider,
{
    /// Builds the engines; nothing is subscribed until a sign-in is handled.
    pub fn new(identity: Arc<I>, client: Arc<C>, resolver: Arc<R>) -> Self {
        Self {
            buckets: SyncEngine::new(
                ResourceKind::Bucket,
                Arc::clone(&client),
                Arc::clone(&resolver),
            ),
            trips: SyncEngine::new(ResourceKind::Trip, Arc::clone(&client), resolver),
            profiles: ProfileDirectory::new(Arc::clone(&client)),
            identity,
            client,
        }
    }

    /// Bucket engine.
    pub const fn buckets(&self) -> &SyncEngine<C, R> {
        &self.buckets
    }

    /// Trip engine.
    pub const fn trips(&self) -> &SyncEngine<C, R> {
        &self.trips
    }

    /// Engine for `kind`.
    pub const fn engine(&self, kind: ResourceKind) -> &SyncEngine<C, R> {
        match kind {
            ResourceKind::Bucket => &self.buckets,
            ResourceKind::Trip => &self.trips,
        }
    }

    /// Member profile mirror.
    pub const fn profiles(&self) -> &ProfileDirectory<C> {
        &self.profiles
    }

    /// Subscribes everything for `principal`.
    pub async fn sign_in(&self, principal: Principal) -> Result<()> {
        self.identity
            .current_id_token(true)
            .await
            .map_err(|source| Error::TransientSync { source })?;

        if let Err(e) = mirror_profile(self.client.as_ref(), &principal).await {
            warn!("Could not mirror profile for {}: {}", principal.id, e);
        }

        self.buckets.subscribe(principal.clone()).await?;
        self.trips.subscribe(principal.clone()).await?;
        if let Err(e) = self.refresh_members().await {
            warn!("Could not load member profiles: {}", e);
        }
        info!("Session ready for {}", principal.id);
        Ok(())
    }

    /// Unsubscribes everything. Safe to call when already signed out.
    pub fn sign_out(&self) {
        self.buckets.unsubscribe();
        self.trips.unsubscribe();
        self.profiles.untrack();
    }

    /// Applies one auth-state change.
    pub async fn handle(&self, state: Option<Principal>) -> Result<()> {
        match state {
            Some(principal) => self.sign_in(principal).await,
            None => {
                self.sign_out();
                Ok(())
            }
        }
    }

    /// Points the profile mirror at every member of every loaded bucket and trip.
    pub async fn refresh_members(&self) -> Result<()> {
        let mut resources = self.buckets.snapshot().items.as_ref().clone();
        resources.extend(self.trips.snapshot().items.iter().cloned());
        self.profiles.track(&aggregate::member_ids(&resources)).await
    }

    /// Registers with the identity provider. Changes, starting with the current state,
    /// arrive on the returned channel until the registration is removed.
    pub fn listen(&self) -> (ListenerRegistration, AuthChanges) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let registration = self.identity.on_auth_state_change(Arc::new(move |state| {
            // Receiver gone means the session stopped; nothing to deliver to.
            let _ = sender.send(state);
        }));
        (registration, receiver)
    }

    /// Handles changes until the channel closes. A failed sign-in is logged and the loop
    /// keeps going; the engines surface the failure through their status. Between auth
    /// changes, every reconciliation of a live view re-points the profile mirror, so members
    /// added from another device get their names without a manual refresh.
    pub async fn run(&self, mut changes: AuthChanges) {
        let mut buckets = self.buckets.watch();
        let mut trips = self.trips.watch();
        loop {
            tokio::select! {
                biased;
                state = changes.recv() => {
                    let Some(state) = state else { break };
                    if let Err(e) = self.handle(state).await {
                        error!("Auth change failed: {}", e);
                    }
                }
                Ok(()) = buckets.changed() => self.follow_members(&mut buckets).await,
                Ok(()) = trips.changed() => self.follow_members(&mut trips).await,
            }
        }
        self.sign_out();
    }

    async fn follow_members(&self, view: &mut watch::Receiver<CollectionView<SharedResource>>) {
        let live = view.borrow_and_update().is_live();
        if !live {
            return;
        }
        if let Err(e) = self.refresh_members().await {
            warn!("Could not refresh member profiles: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::{live::SyncStatus, resource::NewResource};
    use crate::remote::{DocumentPath, FieldMap, FieldValue, document::MEMBER_IDS};
    use crate::test_utils::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_sign_in_refreshes_token_then_subscribes() -> Result<()> {
        init_test_tracing();
        let env = StoreEnv::new().await?;
        let session = env.session();
        env.identity.sign_in(principal("alice"));

        session.handle(Some(principal("alice"))).await?;

        assert_eq!(env.identity.tokens_issued(), 1);
        assert_eq!(session.buckets().status(), SyncStatus::Live);
        assert_eq!(session.trips().status(), SyncStatus::Live);
        assert!(env.backend.listener_count() >= 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_sign_in_without_identity_fails_before_subscribing() -> Result<()> {
        let env = StoreEnv::new().await?;
        let session = env.session();

        let result = session.sign_in(principal("alice")).await;

        assert!(matches!(result, Err(Error::TransientSync { .. })));
        assert_eq!(session.buckets().status(), SyncStatus::Unsubscribed);
        assert_eq!(env.backend.listener_count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_sign_out_clears_every_view() -> Result<()> {
        let env = StoreEnv::new().await?;
        let session = env.session();
        env.identity.sign_in(principal("alice"));
        session.handle(Some(principal("alice"))).await?;
        session
            .buckets()
            .create(&NewResource::named("Rainy day"))
            .await?;
        assert_eq!(session.buckets().snapshot().items.len(), 1);

        session.handle(None).await?;
        session.handle(None).await?;

        assert!(session.buckets().snapshot().items.is_empty());
        assert_eq!(session.trips().status(), SyncStatus::Unsubscribed);
        assert_eq!(env.backend.listener_count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_run_drains_changes_in_order() -> Result<()> {
        let env = StoreEnv::new().await?;
        let session = env.session();
        let (mut registration, changes) = session.listen();

        env.identity.sign_in(principal("alice"));
        registration.remove();
        session.run(changes).await;

        // The loop ends with a sign-out once the channel closes.
        assert_eq!(session.buckets().status(), SyncStatus::Unsubscribed);
        assert_eq!(env.identity.tokens_issued(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_member_names_come_from_profile_mirror() -> Result<()> {
        let env = StoreEnv::new().await?;
        env.register_profile("bob").await?;
        let session = env.session();
        env.identity.sign_in(principal("alice"));
        session.handle(Some(principal("alice"))).await?;

        let id = session
            .buckets()
            .create(&NewResource::named("Gift"))
            .await?;
        session.buckets().invite_member(&id, "bob@example.com").await?;
        session.refresh_members().await?;

        assert_eq!(session.profiles().display("bob").display_name, "Bob");
        assert_eq!(session.profiles().display("alice").display_name, "Alice");
        assert!(session.profiles().display("carol-99").placeholder);
        Ok(())
    }

    #[tokio::test]
    async fn test_run_names_members_added_elsewhere() -> Result<()> {
        init_test_tracing();
        let env = StoreEnv::new().await?;
        env.register_profile("bob").await?;
        let session = env.session();
        let (mut registration, changes) = session.listen();
        env.identity.sign_in(principal("alice"));

        let other_device = async {
            let mut buckets = session.buckets().watch();
            let mut profiles = session.profiles().watch();
            buckets.wait_for(|view| view.status == SyncStatus::Live).await.unwrap();
            let id = session
                .buckets()
                .create(&NewResource::named("Boat"))
                .await?;
            assert!(session.profiles().display("bob").placeholder);

            let mut add_bob = FieldMap::new();
            add_bob.insert(
                MEMBER_IDS.to_string(),
                FieldValue::ArrayUnion(vec![json!("bob")]),
            );
            env.backend
                .update(Some("alice"), &DocumentPath::new("buckets", id), add_bob)
                .await?;

            profiles
                .wait_for(|view| view.items.iter().any(|p| p.uid == "bob"))
                .await
                .unwrap();
            let bob = session.profiles().display("bob");
            registration.remove();
            Ok::<_, Error>(bob)
        };
        let ((), bob) = tokio::join!(session.run(changes), other_device);

        let bob = bob?;
        assert!(!bob.placeholder);
        assert_eq!(bob.display_name, "Bob");
        assert_eq!(session.buckets().status(), SyncStatus::Unsubscribed);
        Ok(())
    }
}
