//! Principal and public-profile types.

/// The authenticated user making requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    /// Stable identifier assigned by the identity provider
    pub id: String,
    /// Name shown to other members
    pub display_name: String,
    /// Sign-in email
    pub email: String,
    /// Optional avatar URL
    pub photo_url: Option<String>,
}

impl Principal {
    /// Builds a principal with no avatar.
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            email: email.into(),
            photo_url: None,
        }
    }
}

/// Denormalized mirror of a principal, readable by any signed-in user. May be stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicProfile {
    /// Principal id
    pub uid: String,
    /// Name shown in member lists
    pub display_name: String,
    /// Optional avatar URL
    pub photo_url: Option<String>,
    /// Lower-cased email used by invite lookup
    pub email_lower: String,
}

impl PublicProfile {
    /// Mirror of the given principal.
    #[must_use]
    pub fn from_principal(principal: &Principal) -> Self {
        Self {
            uid: principal.id.clone(),
            display_name: principal.display_name.trim().to_string(),
            photo_url: principal.photo_url.clone(),
            email_lower: normalize_email(&principal.email),
        }
    }
}

/// Trims and lower-cases an email address for lookups.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_profile_from_principal_normalizes_email() {
        let mut principal = Principal::new("u1", "  Ada ", " Ada@Example.COM ");
        principal.photo_url = Some("https://img/ada.png".to_string());

        let profile = PublicProfile::from_principal(&principal);

        assert_eq!(profile.uid, "u1");
        assert_eq!(profile.display_name, "Ada");
        assert_eq!(profile.email_lower, "ada@example.com");
        assert_eq!(profile.photo_url.as_deref(), Some("https://img/ada.png"));
    }
}
