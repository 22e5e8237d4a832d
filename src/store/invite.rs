//! Invite lookup over the public profile mirror.

use crate::{
    core::{principal::normalize_email, profiles::PROFILES_COLLECTION},
    remote::{IdentityProvider, InviteResolver, RemoteError, RemoteResult, ResolvedUser},
    store::DocumentBackend,
};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Resolves emails against `publicProfiles.emailLower`. Requires a signed-in caller.
pub struct ProfileInviteResolver<I> {
    backend: DocumentBackend,
    identity: Arc<I>,
}

impl<I: IdentityProvider> ProfileInviteResolver<I> {
    /// Resolver backed by the given store and identity.
    pub const fn new(backend: DocumentBackend, identity: Arc<I>) -> Self {
        Self { backend, identity }
    }
}

#[async_trait]
impl<I: IdentityProvider> InviteResolver for ProfileInviteResolver<I> {
    async fn lookup_user_by_email(&self, email: &str) -> RemoteResult<ResolvedUser> {
        if self.identity.current_principal().is_none() {
            return Err(RemoteError::Unauthenticated(
                "sign in to invite members".to_string(),
            ));
        }
        let email = normalize_email(email);
        if email.is_empty() {
            return Err(RemoteError::InvalidArgument("email is required".to_string()));
        }

        let profiles = self.backend.all(PROFILES_COLLECTION).await?;
        let found = profiles
            .into_iter()
            .find(|p| p.get("emailLower").and_then(Value::as_str) == Some(email.as_str()));
        match found {
            Some(profile) => {
                debug!("Resolved {} to {}", email, profile.id);
                Ok(ResolvedUser {
                    uid: profile.id,
                    email,
                })
            }
            None => Err(RemoteError::NotFound(format!("no user with email {email}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::errors::Result;
    use crate::test_utils::StoreEnv;

    #[tokio::test]
    async fn test_lookup_outcomes() -> Result<()> {
        let env = StoreEnv::new().await?;
        env.register_profile("bob").await?;

        assert!(matches!(
            env.resolver.lookup_user_by_email("bob@example.com").await,
            Err(RemoteError::Unauthenticated(_))
        ));

        env.sign_in("alice").await?;
        let bob = env
            .resolver
            .lookup_user_by_email("  BOB@example.com ")
            .await
            .unwrap();
        assert_eq!(bob.uid, "bob");
        assert_eq!(bob.email, "bob@example.com");

        assert!(matches!(
            env.resolver.lookup_user_by_email("").await,
            Err(RemoteError::InvalidArgument(_))
        ));
        assert!(matches!(
            env.resolver.lookup_user_by_email("carol@example.com").await,
            Err(RemoteError::NotFound(_))
        ));
        Ok(())
    }
}
