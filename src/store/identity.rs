//! In-process identity provider: an explicit sign-in/sign-out switch with auth listeners
//! and locally minted id tokens.

use crate::{
    core::principal::Principal,
    remote::{AuthCallback, IdentityProvider, ListenerRegistration, RemoteError, RemoteResult},
};
use async_trait::async_trait;
use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicU64, Ordering},
};
use tracing::{debug, info};

type Listeners = Mutex<Vec<(u64, AuthCallback)>>;

/// Identity provider whose principal is set by the host application.
#[derive(Default)]
pub struct LocalIdentityProvider {
    current: Mutex<Option<Principal>>,
    listeners: Arc<Listeners>,
    next_listener: AtomicU64,
    token_generation: AtomicU64,
}

impl LocalIdentityProvider {
    /// A provider with nobody signed in.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Signs `principal` in and notifies every listener.
    pub fn sign_in(&self, principal: Principal) {
        info!("Signing in {}", principal.id);
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(principal.clone());
        self.notify(Some(principal));
    }

    /// Signs out and notifies every listener. Signing out twice notifies twice.
    pub fn sign_out(&self) {
        let previous = self.current.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(previous) = previous {
            info!("Signing out {}", previous.id);
        }
        self.notify(None);
    }

    /// How many tokens have been minted so far.
    #[must_use]
    pub fn tokens_issued(&self) -> u64 {
        self.token_generation.load(Ordering::Relaxed)
    }

    fn notify(&self, principal: Option<Principal>) {
        // Callbacks run outside the lock so they may register or unregister.
        let callbacks: Vec<AuthCallback> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for callback in callbacks {
            callback(principal.clone());
        }
    }
}

#[async_trait]
impl IdentityProvider for LocalIdentityProvider {
    fn on_auth_state_change(&self, callback: AuthCallback) -> ListenerRegistration {
        let id = self.next_listener.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::clone(&callback)));
        callback(self.current_principal());

        let listeners = Arc::downgrade(&self.listeners);
        ListenerRegistration::new(move || {
            if let Some(listeners) = listeners.upgrade() {
                listeners
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .retain(|(registered, _)| *registered != id);
            }
        })
    }

    fn current_principal(&self) -> Option<Principal> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn current_id_token(&self, force_refresh: bool) -> RemoteResult<String> {
        let principal = self
            .current_principal()
            .ok_or_else(|| RemoteError::Unauthenticated("no signed-in user".to_string()))?;
        let generation = if force_refresh || self.tokens_issued() == 0 {
            self.token_generation.fetch_add(1, Ordering::Relaxed) + 1
        } else {
            self.tokens_issued()
        };
        debug!("Issued token {} for {}", generation, principal.id);
        Ok(format!("local.{}.{generation}", principal.id))
    }
}
