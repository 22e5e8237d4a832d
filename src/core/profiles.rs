//! Membership directory - the public profile mirror used to show member names and avatars.
//!
//! Each principal writes its own `publicProfiles/{uid}` document on sign-in. Member lists
//! subscribe to just the profiles of the ids they display. A member whose profile has not
//! been mirrored yet is shown with a placeholder, never an error.

use crate::{
    core::{
        live::{CollectionView, LiveCollection},
        principal::{Principal, PublicProfile},
        resource::string_field,
    },
    errors::{Error, Result},
    remote::{DocumentPath, FieldMap, FieldValue, Filter, Query, RemoteCollectionClient},
};
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tracing::{debug, instrument};

/// Collection holding the profile mirror.
pub const PROFILES_COLLECTION: &str = "publicProfiles";

/// Writes (merging) the principal's public profile.
#[instrument(skip_all, fields(uid = %principal.id))]
pub async fn mirror_profile<C>(client: &C, principal: &Principal) -> Result<()>
where
    C: RemoteCollectionClient + ?Sized,
{
    let profile = PublicProfile::from_principal(principal);
    let mut fields = FieldMap::new();
    fields.insert("uid".to_string(), FieldValue::string(&profile.uid));
    fields.insert(
        "displayName".to_string(),
        FieldValue::string(&profile.display_name),
    );
    fields.insert(
        "photoURL".to_string(),
        FieldValue::Set(profile.photo_url.clone().map_or(Value::Null, Value::String)),
    );
    fields.insert("emailLower".to_string(), FieldValue::string(&profile.email_lower));

    client
        .set_document(
            &DocumentPath::new(PROFILES_COLLECTION, profile.uid.clone()),
            fields,
            true,
        )
        .await
        .map_err(|e| Error::remote_write("mirror profile", e))?;
    debug!("Mirrored public profile");
    Ok(())
}

/// How one member is shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberDisplay {
    /// Member id
    pub uid: String,
    /// Mirrored name, or `Member <prefix>` when unknown
    pub display_name: String,
    /// Mirrored avatar
    pub photo_url: Option<String>,
    /// Whether the profile has not been mirrored yet
    pub placeholder: bool,
}

impl MemberDisplay {
    /// Deterministic stand-in for an id with no mirrored profile.
    #[must_use]
    pub fn placeholder(uid: &str) -> Self {
        let prefix: String = uid.chars().take(6).collect();
        Self {
            uid: uid.to_string(),
            display_name: format!("Member {prefix}"),
            photo_url: None,
            placeholder: true,
        }
    }
}

fn decode_profile(document: &crate::remote::Document) -> PublicProfile {
    let uid = string_field(&document.data, "uid");
    PublicProfile {
        uid: if uid.is_empty() { document.id.clone() } else { uid },
        display_name: string_field(&document.data, "displayName"),
        photo_url: document
            .get("photoURL")
            .and_then(Value::as_str)
            .map(str::to_string),
        email_lower: string_field(&document.data, "emailLower"),
    }
}

/// Live mirror of the profiles for a set of member ids.
pub struct ProfileDirectory<C> {
    client: Arc<C>,
    tracked: Mutex<Vec<String>>,
    profiles: LiveCollection<PublicProfile>,
}

impl<C: RemoteCollectionClient> ProfileDirectory<C> {
    /// A directory tracking nobody.
    pub fn new(client: Arc<C>) -> Self {
        Self {
            client,
            tracked: Mutex::new(Vec::new()),
            profiles: LiveCollection::new("profiles"),
        }
    }

    /// Follows the profiles of `member_ids`. Re-subscribes only when the id set changes;
    /// an empty set tears the subscription down.
    pub async fn track(&self, member_ids: &[String]) -> Result<()> {
        let mut ids: Vec<String> = member_ids
            .iter()
            .filter(|id| !id.is_empty())
            .cloned()
            .collect();
        ids.sort_unstable();
        ids.dedup();

        {
            let mut tracked = self.tracked.lock().unwrap_or_else(PoisonError::into_inner);
            if *tracked == ids {
                return Ok(());
            }
            tracked.clone_from(&ids);
        }

        if ids.is_empty() {
            self.profiles.unsubscribe();
            return Ok(());
        }

        debug!("Tracking {} member profiles", ids.len());
        let query = Query::collection(PROFILES_COLLECTION).filter(Filter::In {
            field: "uid".to_string(),
            values: ids.into_iter().map(Value::String).collect(),
        });
        let result = self
            .profiles
            .subscribe(self.client.as_ref(), query, decode_profile)
            .await;
        if result.is_err() {
            // Forget the ids so the next call retries.
            self.tracked
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clear();
        }
        result
    }

    /// Stops following every profile.
    pub fn untrack(&self) {
        self.tracked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.profiles.unsubscribe();
    }

    /// Name and avatar for `uid`, or a placeholder.
    pub fn display(&self, uid: &str) -> MemberDisplay {
        self.profiles
            .snapshot()
            .items
            .iter()
            .find(|p| p.uid == uid)
            .map_or_else(
                || MemberDisplay::placeholder(uid),
                |p| MemberDisplay {
                    uid: p.uid.clone(),
                    display_name: if p.display_name.is_empty() {
                        MemberDisplay::placeholder(uid).display_name
                    } else {
                        p.display_name.clone()
                    },
                    photo_url: p.photo_url.clone(),
                    placeholder: false,
                },
            )
    }

    /// Frozen copy of the mirrored profiles.
    pub fn snapshot(&self) -> CollectionView<PublicProfile> {
        self.profiles.snapshot()
    }

    /// Receiver notified whenever the mirrored profiles change.
    pub fn watch(&self) -> watch::Receiver<CollectionView<PublicProfile>> {
        self.profiles.watch()
    }
}
