//! Unified error types for `SavingsBuddy`.
//!
//! Pre-flight failures (validation and the authorization guard) are produced locally and
//! never reach the remote store. Failures reported by the store itself are carried as a
//! [`RemoteError`] inside `TransientSync` or `RemoteWrite`. Mutations name themselves via
//! [`Error::remote_write`]; a bare `?` on a store result is a sync failure.

use crate::core::{authorization::Action, live::SyncStatus};
use crate::remote::RemoteError;
use thiserror::Error;

/// Every failure the crate can surface.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration could not be read or parsed
    #[error("Configuration error: {message}")]
    Config {
        /// What went wrong
        message: String,
    },

    /// Database failure in the reference document store
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// Bad user input, caught before any remote call
    #[error("Invalid input: {message}")]
    Validation {
        /// Message suitable for the dialog that submitted the input
        message: String,
    },

    /// Amount that is zero, negative, or not a finite number
    #[error("Invalid amount: {amount}")]
    InvalidAmount {
        /// The rejected amount
        amount: f64,
    },

    /// The current principal may not perform this action on this resource
    #[error("Not allowed to {action}")]
    Unauthorized {
        /// The action the guard rejected
        action: Action,
    },

    /// No principal is signed in
    #[error("Not signed in")]
    Unauthenticated,

    /// Missing resource, member, or unresolved invite email
    #[error("{what} not found")]
    NotFound {
        /// Human-readable description of what was looked up
        what: String,
    },

    /// Invited user already belongs to the resource
    #[error("User {user_id} is already a member")]
    AlreadyMember {
        /// The resolved user id
        user_id: String,
    },

    /// The owner tried to invite themselves
    #[error("You cannot invite yourself")]
    SelfInvite,

    /// The owner cannot be removed from the member set
    #[error("The owner cannot be removed")]
    CannotRemoveOwner,

    /// The owner tried to leave their own resource
    #[error("The owner cannot leave; delete the goal instead")]
    OwnerCannotLeave,

    /// Mutation attempted while the subscription is not live
    #[error("Engine is not live (state: {status:?})")]
    NotLive {
        /// State the engine was in
        status: SyncStatus,
    },

    /// Subscription or read failed; loaded data is retained. Store failures outside a
    /// named mutation convert into this variant.
    #[error("Sync error: {source}")]
    TransientSync {
        /// Underlying store failure
        #[from]
        source: RemoteError,
    },

    /// A remote mutation or callable was rejected
    #[error("{operation} failed: {source}")]
    RemoteWrite {
        /// Operation that failed (e.g. "contribution")
        operation: &'static str,
        /// Underlying store failure
        #[source]
        source: RemoteError,
    },
}

impl Error {
    /// Convenience constructor for [`Error::Validation`].
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Wraps a store failure for the named mutation.
    pub const fn remote_write(operation: &'static str, source: RemoteError) -> Self {
        Self::RemoteWrite { operation, source }
    }

    /// Whether the failure was decided locally, with no remote call attempted.
    #[must_use]
    pub const fn is_preflight(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. }
                | Self::InvalidAmount { .. }
                | Self::Unauthorized { .. }
                | Self::Unauthenticated
                | Self::AlreadyMember { .. }
                | Self::SelfInvite
                | Self::CannotRemoveOwner
                | Self::OwnerCannotLeave
                | Self::NotLive { .. }
        )
    }
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    fn read_document() -> std::result::Result<(), RemoteError> {
        Err(RemoteError::Unavailable("offline".to_string()))
    }

    fn load() -> Result<()> {
        read_document()?;
        Ok(())
    }

    #[test]
    fn test_store_failure_converts_to_sync_error() {
        let error = load().unwrap_err();
        assert!(matches!(
            error,
            Error::TransientSync {
                source: RemoteError::Unavailable(_)
            }
        ));
        assert!(!error.is_preflight());
        assert!(error.to_string().contains("offline"));
    }

    #[test]
    fn test_preflight_classification() {
        assert!(Error::validation("empty").is_preflight());
        assert!(Error::SelfInvite.is_preflight());
        assert!(
            Error::NotLive {
                status: SyncStatus::Subscribing
            }
            .is_preflight()
        );
        let rejected = Error::remote_write(
            "contribution",
            RemoteError::PermissionDenied("rules".to_string()),
        );
        assert!(!rejected.is_preflight());
    }
}
