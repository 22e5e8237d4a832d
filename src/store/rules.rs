//! Server-side access rules evaluated by the document store on every read and write.
//!
//! Shared resources are visible only to their members. Creation must name the caller as
//! owner and sole member. After that, members may change the balance and may remove
//! themselves. Every other field change is reserved for the owner, and `ownerId` and
//! `createdAt` never change. Public profiles are readable by any signed-in caller and
//! writable only by the profile's owner.

use crate::{
    core::{profiles::PROFILES_COLLECTION, resource::ResourceKind},
    remote::{
        Filter, Query, RemoteError, RemoteResult,
        document::{
            COLOR, CREATED_AT, LAST_UPDATED_AT, LAST_UPDATED_BY, MEMBER_IDS, OWNER_ID, TARGET,
        },
    },
};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

type Data = Map<String, Value>;

fn denied(reason: impl Into<String>) -> RemoteError {
    RemoteError::PermissionDenied(reason.into())
}

fn string_at<'a>(data: &'a Data, field: &str) -> Option<&'a str> {
    data.get(field).and_then(Value::as_str)
}

fn members(data: &Data) -> Vec<&str> {
    data.get(MEMBER_IDS)
        .and_then(Value::as_array)
        .map(|ids| ids.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}

fn is_member(data: &Data, caller: &str) -> bool {
    members(data).contains(&caller)
}

/// Whether `caller` may see this document.
#[must_use]
pub fn can_read(caller: &str, collection: &str, data: &Data) -> bool {
    if collection == PROFILES_COLLECTION {
        return true;
    }
    ResourceKind::from_collection(collection).is_some() && is_member(data, caller)
}

/// Rejects queries that could return documents the caller may not read.
///
/// Resource queries must be constrained to `memberIds array-contains <caller>`.
pub fn check_query(caller: &str, query: &Query) -> RemoteResult<()> {
    if query.collection == PROFILES_COLLECTION {
        return Ok(());
    }
    if ResourceKind::from_collection(&query.collection).is_none() {
        return Err(denied(format!("unknown collection {}", query.collection)));
    }
    match &query.filter {
        Some(Filter::ArrayContains { field, value })
            if field == MEMBER_IDS && value.as_str() == Some(caller) =>
        {
            Ok(())
        }
        _ => Err(denied("resource queries must be restricted to the caller's memberships")),
    }
}

/// Checks a write that creates a new document.
pub fn check_create(caller: &str, collection: &str, id: &str, data: &Data) -> RemoteResult<()> {
    if collection == PROFILES_COLLECTION {
        return check_profile_write(caller, id, data);
    }
    let kind = ResourceKind::from_collection(collection)
        .ok_or_else(|| denied(format!("unknown collection {collection}")))?;

    if string_at(data, OWNER_ID) != Some(caller) {
        return Err(denied("ownerId must be the caller"));
    }
    if data.get(MEMBER_IDS) != Some(&Value::Array(vec![Value::String(caller.to_string())])) {
        return Err(denied("memberIds must contain only the caller"));
    }
    check_stamp(caller, None, data)?;
    check_fields(kind, data)
}

/// Checks a write that replaces an existing document.
pub fn check_update(
    caller: &str,
    collection: &str,
    id: &str,
    old: &Data,
    new: &Data,
) -> RemoteResult<()> {
    if collection == PROFILES_COLLECTION {
        return check_profile_write(caller, id, new);
    }
    let kind = ResourceKind::from_collection(collection)
        .ok_or_else(|| denied(format!("unknown collection {collection}")))?;

    if !is_member(old, caller) {
        return Err(denied("caller is not a member"));
    }
    for field in [OWNER_ID, CREATED_AT] {
        if old.get(field) != new.get(field) {
            return Err(denied(format!("{field} is immutable")));
        }
    }
    check_stamp(caller, Some(old), new)?;

    let changed = changed_fields(old, new);
    let owner = string_at(old, OWNER_ID) == Some(caller);
    if owner {
        let allowed = [kind.name_field(), TARGET, kind.balance_field(), COLOR, MEMBER_IDS];
        if let Some(field) = changed.iter().find(|f| !allowed.contains(&f.as_str())) {
            return Err(denied(format!("{field} cannot be changed")));
        }
        if changed.contains(MEMBER_IDS) && !is_member(new, caller) {
            return Err(denied("the owner must remain a member"));
        }
    } else {
        let allowed = [kind.balance_field(), MEMBER_IDS];
        if let Some(field) = changed.iter().find(|f| !allowed.contains(&f.as_str())) {
            return Err(denied(format!("only the owner may change {field}")));
        }
        if changed.contains(MEMBER_IDS) && !is_exact_self_removal(caller, old, new) {
            return Err(denied("members may only remove themselves"));
        }
    }
    check_fields(kind, new)
}

/// Checks a delete.
pub fn check_delete(caller: &str, collection: &str, existing: &Data) -> RemoteResult<()> {
    if collection == PROFILES_COLLECTION {
        return Err(denied("profiles cannot be deleted"));
    }
    if ResourceKind::from_collection(collection).is_none() {
        return Err(denied(format!("unknown collection {collection}")));
    }
    if string_at(existing, OWNER_ID) == Some(caller) {
        Ok(())
    } else {
        Err(denied("only the owner may delete"))
    }
}

fn check_profile_write(caller: &str, id: &str, data: &Data) -> RemoteResult<()> {
    if id != caller {
        return Err(denied("profiles are written by their owner"));
    }
    if string_at(data, "uid").is_some_and(|uid| uid != caller) {
        return Err(denied("profile uid must match the document id"));
    }
    Ok(())
}

fn check_stamp(caller: &str, old: Option<&Data>, new: &Data) -> RemoteResult<()> {
    let before = old.and_then(|o| o.get(LAST_UPDATED_BY));
    match new.get(LAST_UPDATED_BY) {
        Some(stamp) if Some(stamp) != before && stamp.as_str() != Some(caller) => {
            Err(denied("lastUpdatedBy must be the caller"))
        }
        _ => Ok(()),
    }
}

fn check_fields(kind: ResourceKind, data: &Data) -> RemoteResult<()> {
    let name = string_at(data, kind.name_field()).unwrap_or_default();
    if name.trim().is_empty() {
        return Err(denied(format!("{} must be a non-empty string", kind.name_field())));
    }
    for field in [TARGET, kind.balance_field()] {
        let ok = data
            .get(field)
            .is_none_or(|v| v.as_f64().is_some_and(|n| n.is_finite() && n >= 0.0));
        if !ok {
            return Err(denied(format!("{field} must be a non-negative number")));
        }
    }
    Ok(())
}

fn changed_fields(old: &Data, new: &Data) -> BTreeSet<String> {
    old.keys()
        .chain(new.keys())
        .filter(|k| !matches!(k.as_str(), LAST_UPDATED_AT | LAST_UPDATED_BY))
        .filter(|k| old.get(k.as_str()) != new.get(k.as_str()))
        .cloned()
        .collect()
}

fn is_exact_self_removal(caller: &str, old: &Data, new: &Data) -> bool {
    let mut expected: Vec<&str> = members(old).into_iter().filter(|id| *id != caller).collect();
    let mut actual = members(new);
    expected.sort_unstable();
    actual.sort_unstable();
    expected == actual
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::Direction;
    use serde_json::json;

    fn data(value: Value) -> Data {
        match value {
            Value::Object(map) => map,
            _ => Data::new(),
        }
    }

    fn shared() -> Data {
        data(json!({
            "name": "Rent",
            "target": 1000,
            "balance": 100,
            "ownerId": "owner",
            "memberIds": ["owner", "friend"],
            "createdAt": "2026-01-01T00:00:00.000000Z",
        }))
    }

    fn with(base: &Data, field: &str, value: Value) -> Data {
        let mut next = base.clone();
        next.insert(field.to_string(), value);
        next
    }

    fn creates(caller: &str, new: &Data) -> bool {
        check_create(caller, "buckets", "b1", new).is_ok()
    }

    fn updates(caller: &str, old: &Data, new: &Data) -> bool {
        check_update(caller, "buckets", "b1", old, new).is_ok()
    }

    #[test]
    fn test_read_requires_membership() {
        assert!(can_read("friend", "buckets", &shared()));
        assert!(!can_read("stranger", "buckets", &shared()));
        assert!(can_read("stranger", PROFILES_COLLECTION, &Data::new()));
        assert!(!can_read("owner", "secrets", &shared()));
    }

    #[test]
    fn test_queries_must_filter_on_caller_membership() {
        let scoped = Query::collection("trips")
            .filter(Filter::ArrayContains {
                field: MEMBER_IDS.to_string(),
                value: json!("me"),
            })
            .order_by(CREATED_AT, Direction::Descending);
        assert!(check_query("me", &scoped).is_ok());
        assert!(check_query("someone-else", &scoped).is_err());
        assert!(check_query("me", &Query::collection("trips")).is_err());
        assert!(check_query("me", &Query::collection(PROFILES_COLLECTION)).is_ok());
    }

    #[test]
    fn test_create_requires_caller_as_sole_owner_member() {
        let valid = data(json!({
            "name": "Car",
            "target": 0,
            "balance": 0,
            "ownerId": "me",
            "memberIds": ["me"],
            "lastUpdatedBy": "me",
        }));
        assert!(creates("me", &valid));
        assert!(!creates("you", &valid));
        assert!(!creates("me", &with(&valid, MEMBER_IDS, json!(["me", "you"]))));
        assert!(!creates("me", &with(&valid, "name", json!(" "))));
        assert!(!creates("me", &with(&valid, "balance", json!(-1))));
        assert!(!creates("me", &with(&valid, LAST_UPDATED_BY, json!("you"))));
    }

    #[test]
    fn test_member_may_change_balance_only() {
        let old = shared();
        assert!(updates("friend", &old, &with(&old, "balance", json!(150))));
        assert!(!updates("friend", &old, &with(&old, "name", json!("Mine"))));
        assert!(!updates("friend", &old, &with(&old, TARGET, json!(5))));
        assert!(!updates("stranger", &old, &with(&old, "balance", json!(150))));
    }

    #[test]
    fn test_member_may_leave_but_not_remove_others() {
        let old = shared();
        let left = with(&old, MEMBER_IDS, json!(["owner"]));
        assert!(updates("friend", &old, &left));

        let three = with(&old, MEMBER_IDS, json!(["owner", "friend", "third"]));
        let removed_third = with(&three, MEMBER_IDS, json!(["owner", "friend"]));
        assert!(!updates("friend", &three, &removed_third));
        let added = with(&old, MEMBER_IDS, json!(["owner", "friend", "pal"]));
        assert!(!updates("friend", &old, &added));
    }

    #[test]
    fn test_nobody_may_add_themselves() {
        let old = shared();
        let joined = with(&old, MEMBER_IDS, json!(["owner", "friend", "stranger"]));
        let result = check_update("stranger", "buckets", "b1", &old, &joined);
        assert!(matches!(result, Err(RemoteError::PermissionDenied(_))));

        let doubled = with(&old, MEMBER_IDS, json!(["owner", "friend", "friend"]));
        assert!(!updates("friend", &old, &doubled));
    }

    #[test]
    fn test_owner_edits_and_immutable_fields() {
        let old = shared();
        assert!(updates("owner", &old, &with(&old, "name", json!("Rent 2"))));
        assert!(updates("owner", &old, &with(&old, MEMBER_IDS, json!(["owner"]))));
        assert!(!updates("owner", &old, &with(&old, MEMBER_IDS, json!(["friend"]))));
        assert!(!updates("owner", &old, &with(&old, OWNER_ID, json!("friend"))));
        assert!(!updates("owner", &old, &with(&old, CREATED_AT, json!(null))));
        assert!(!updates("owner", &old, &with(&old, "extra", json!(1))));
    }

    #[test]
    fn test_delete_is_owner_only() {
        assert!(check_delete("owner", "buckets", &shared()).is_ok());
        assert!(check_delete("friend", "buckets", &shared()).is_err());
        assert!(check_delete("owner", PROFILES_COLLECTION, &shared()).is_err());
    }

    #[test]
    fn test_profiles_are_self_written() {
        let profile = data(json!({ "uid": "me", "displayName": "Me" }));
        assert!(check_create("me", PROFILES_COLLECTION, "me", &profile).is_ok());
        assert!(check_create("you", PROFILES_COLLECTION, "me", &profile).is_err());
        assert!(check_update("me", PROFILES_COLLECTION, "me", &profile, &profile).is_ok());
    }
}
