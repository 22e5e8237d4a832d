//! Principal configuration - who the binary signs in as.
//!
//! Reads `SAVINGS_PRINCIPAL_ID` (required) and the optional `SAVINGS_PRINCIPAL_EMAIL`,
//! `SAVINGS_PRINCIPAL_NAME`, and `SAVINGS_PRINCIPAL_PHOTO` from the environment.

use crate::core::principal::Principal;
use crate::errors::{Error, Result};

/// Builds the principal from environment variables.
pub fn principal_from_env() -> Result<Principal> {
    principal_from_vars(|key| std::env::var(key).ok())
}

/// Builds the principal from any variable source. Blank values count as missing.
pub fn principal_from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Principal> {
    let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    let id = get("SAVINGS_PRINCIPAL_ID").ok_or_else(|| Error::Config {
        message: "SAVINGS_PRINCIPAL_ID is not set".to_string(),
    })?;
    let email = get("SAVINGS_PRINCIPAL_EMAIL").unwrap_or_else(|| format!("{id}@localhost"));
    let name = get("SAVINGS_PRINCIPAL_NAME").unwrap_or_else(|| id.clone());

    let mut principal = Principal::new(id, name, email);
    principal.photo_url = get("SAVINGS_PRINCIPAL_PHOTO");
    Ok(principal)
}
