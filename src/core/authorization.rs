//! Authorization guard - owner/member predicates evaluated before any mutation is sent.
//!
//! The remote store enforces the same predicate set independently (see
//! [`crate::store::rules`]); these checks exist so doomed requests never leave the client
//! and so surfaces can disable controls the instant ownership or membership changes.

use crate::{
    core::{principal::Principal, resource::SharedResource},
    errors::{Error, Result},
};
use std::fmt;

/// Mutations gated by the guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Change name, target, balance, or color
    Edit,
    /// Delete the resource
    Delete,
    /// Add a member by email
    Invite,
    /// Remove another member
    RemoveMember,
    /// Add money to the balance
    Contribute,
    /// Remove oneself from the member set
    Leave,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Edit => "edit this goal",
            Self::Delete => "delete this goal",
            Self::Invite => "invite members",
            Self::RemoveMember => "remove this member",
            Self::Contribute => "contribute",
            Self::Leave => "leave this goal",
        };
        f.write_str(label)
    }
}

/// Whether the principal created the resource.
#[must_use]
pub fn is_owner(principal: &Principal, resource: &SharedResource) -> bool {
    !resource.owner_id.is_empty() && resource.owner_id == principal.id
}

/// Whether the principal is in the member set.
#[must_use]
pub fn is_member(principal: &Principal, resource: &SharedResource) -> bool {
    resource.member_ids.iter().any(|id| *id == principal.id)
}

/// Owner only.
#[must_use]
pub fn can_edit(principal: &Principal, resource: &SharedResource) -> bool {
    is_owner(principal, resource)
}

/// Owner only.
#[must_use]
pub fn can_delete(principal: &Principal, resource: &SharedResource) -> bool {
    is_owner(principal, resource)
}

/// Owner only.
#[must_use]
pub fn can_invite(principal: &Principal, resource: &SharedResource) -> bool {
    is_owner(principal, resource)
}

/// Owner only, and never the owner themselves.
#[must_use]
pub fn can_remove_member(
    principal: &Principal,
    resource: &SharedResource,
    target_id: &str,
) -> bool {
    is_owner(principal, resource) && target_id != resource.owner_id
}

/// Any member.
#[must_use]
pub fn can_contribute(principal: &Principal, resource: &SharedResource) -> bool {
    is_member(principal, resource)
}

/// Any member except the owner.
#[must_use]
pub fn can_leave(principal: &Principal, resource: &SharedResource) -> bool {
    is_member(principal, resource) && !is_owner(principal, resource)
}

/// Fails with [`Error::Unauthorized`] unless the principal may perform the action.
///
/// `RemoveMember` is checked for ownership only here; the owner-as-target case is a
/// distinct error raised by the engine.
pub fn require(action: Action, principal: &Principal, resource: &SharedResource) -> Result<()> {
    let allowed = match action {
        Action::Edit => can_edit(principal, resource),
        Action::Delete => can_delete(principal, resource),
        Action::Invite => can_invite(principal, resource),
        Action::RemoveMember => is_owner(principal, resource),
        Action::Contribute => can_contribute(principal, resource),
        Action::Leave => can_leave(principal, resource),
    };
    if allowed {
        Ok(())
    } else {
        Err(Error::Unauthorized { action })
    }
}

/// Every predicate for one (principal, resource) pair, recomputed whenever either changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[allow(clippy::struct_excessive_bools)]
pub struct Permissions {
    /// Principal is the owner
    pub is_owner: bool,
    /// Principal is a member
    pub is_member: bool,
    /// Edit allowed
    pub can_edit: bool,
    /// Delete allowed
    pub can_delete: bool,
    /// Invite allowed
    pub can_invite: bool,
    /// Contribute allowed
    pub can_contribute: bool,
    /// Leave allowed
    pub can_leave: bool,
}

impl Permissions {
    /// Evaluates every predicate.
    #[must_use]
    pub fn for_resource(principal: &Principal, resource: &SharedResource) -> Self {
        Self {
            is_owner: is_owner(principal, resource),
            is_member: is_member(principal, resource),
            can_edit: can_edit(principal, resource),
            can_delete: can_delete(principal, resource),
            can_invite: can_invite(principal, resource),
            can_contribute: can_contribute(principal, resource),
            can_leave: can_leave(principal, resource),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{principal, resource_with_members};

    #[test]
    fn test_owner_permissions() {
        let owner = principal("owner");
        let bucket = resource_with_members("b1", "owner", &["owner", "friend"]);

        let permissions = Permissions::for_resource(&owner, &bucket);

        assert!(permissions.is_owner);
        assert!(permissions.is_member);
        assert!(permissions.can_edit);
        assert!(permissions.can_delete);
        assert!(permissions.can_invite);
        assert!(permissions.can_contribute);
        assert!(!permissions.can_leave);
        assert!(can_remove_member(&owner, &bucket, "friend"));
        assert!(!can_remove_member(&owner, &bucket, "owner"));
    }

    #[test]
    fn test_member_permissions() {
        let friend = principal("friend");
        let bucket = resource_with_members("b1", "owner", &["owner", "friend"]);

        let permissions = Permissions::for_resource(&friend, &bucket);

        assert!(!permissions.is_owner);
        assert!(permissions.is_member);
        assert!(!permissions.can_edit);
        assert!(!permissions.can_delete);
        assert!(!permissions.can_invite);
        assert!(permissions.can_contribute);
        assert!(permissions.can_leave);
        assert!(!can_remove_member(&friend, &bucket, "owner"));
        assert!(!can_remove_member(&friend, &bucket, "friend"));
    }

    #[test]
    fn test_outsider_has_no_permissions() {
        let stranger = principal("stranger");
        let bucket = resource_with_members("b1", "owner", &["owner", "friend"]);

        assert_eq!(
            Permissions::for_resource(&stranger, &bucket),
            Permissions::default()
        );
        assert!(!can_remove_member(&stranger, &bucket, "friend"));
    }

    #[test]
    fn test_owner_only_predicates_false_for_every_non_owner() {
        let bucket = resource_with_members("b1", "owner", &["owner", "a", "b"]);
        for id in ["a", "b", "stranger", "", "OWNER"] {
            let who = principal(id);
            assert!(!can_invite(&who, &bucket), "{id} can invite");
            assert!(!can_delete(&who, &bucket), "{id} can delete");
            assert!(!can_edit(&who, &bucket), "{id} can edit");
            assert!(!can_remove_member(&who, &bucket, "a"), "{id} can remove");
        }
    }

    #[test]
    fn test_empty_owner_id_never_matches() {
        let nobody = principal("");
        let orphan = resource_with_members("b1", "", &[]);
        assert!(!is_owner(&nobody, &orphan));
    }

    #[test]
    fn test_require_maps_to_unauthorized() {
        let friend = principal("friend");
        let bucket = resource_with_members("b1", "owner", &["owner", "friend"]);

        assert!(require(Action::Contribute, &friend, &bucket).is_ok());
        assert!(require(Action::Leave, &friend, &bucket).is_ok());
        assert!(matches!(
            require(Action::RemoveMember, &friend, &bucket),
            Err(Error::Unauthorized {
                action: Action::RemoveMember
            })
        ));
        assert!(matches!(
            require(Action::Leave, &principal("owner"), &bucket),
            Err(Error::Unauthorized {
                action: Action::Leave
            })
        ));
    }
}
