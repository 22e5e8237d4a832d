//! Starter goal configuration loaded from config.toml
//!
//! The `[[buckets]]` and `[[trips]]` tables list goals created for a principal the first
//! time they sign in. Goals whose name already exists in the principal's view are skipped,
//! so seeding is safe to run on every start.

use crate::{
    core::{
        resource::{AccentColor, NewResource},
        sync::SyncEngine,
    },
    errors::{Error, Result},
    remote::{InviteResolver, RemoteCollectionClient},
};
use serde::Deserialize;
use std::path::Path;
use tracing::{info, warn};

/// Configuration structure representing the entire config.toml file
#[derive(Debug, Default, Deserialize)]
pub struct SeedConfig {
    /// Starter savings buckets
    #[serde(default)]
    pub buckets: Vec<GoalSeed>,
    /// Starter trips
    #[serde(default)]
    pub trips: Vec<GoalSeed>,
}

/// One starter goal
#[derive(Debug, Deserialize, Clone)]
pub struct GoalSeed {
    /// Bucket name or trip title
    pub name: String,
    /// Optional goal amount
    pub target: Option<f64>,
    /// Optional palette color as a hex string (e.g. `"#10B981"`)
    pub color: Option<String>,
}

impl GoalSeed {
    /// Converts to a create request. Colors outside the palette are dropped with a warning.
    #[must_use]
    pub fn to_new_resource(&self) -> NewResource {
        let mut resource = NewResource::named(self.name.clone());
        resource.target = self.target;
        resource.color = self.color.as_deref().and_then(|hex| {
            let color = AccentColor::from_hex(hex);
            if color.is_none() {
                warn!("Ignoring unknown color {} for {}", hex, self.name);
            }
            color
        });
        resource
    }
}

/// Loads seed configuration from a TOML file
///
/// # Errors
/// Returns an error if:
/// - The file cannot be read
/// - The TOML syntax is invalid
/// - Required fields are missing
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<SeedConfig> {
    let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| Error::Config {
        message: format!("Failed to read config file: {e}"),
    })?;

    toml::from_str(&contents).map_err(|e| Error::Config {
        message: format!("Failed to parse config.toml: {e}"),
    })
}

/// Loads seed configuration from the default location (./config.toml)
pub fn load_default_config() -> Result<SeedConfig> {
    load_config("config.toml")
}

/// Creates every seed goal whose name is not already present. Returns how many were
/// created. The engine must be live.
pub async fn seed_initial_resources<C, R>(
    engine: &SyncEngine<C, R>,
    seeds: &[GoalSeed],
) -> Result<usize>
where
    C: RemoteCollectionClient,
    R: InviteResolver,
{
    let mut created = 0;
    for seed in seeds {
        let exists = engine
            .snapshot()
            .items
            .iter()
            .any(|r| r.name.eq_ignore_ascii_case(seed.name.trim()));
        if exists {
            continue;
        }
        engine.create(&seed.to_new_resource()).await?;
        created += 1;
    }
    if created > 0 {
        info!("Seeded {} starter {}(s)", created, engine.kind());
    }
    Ok(created)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::test_utils::StoreEnv;

    #[test]
    fn test_parse_seed_config() {
        let toml_str = r##"
            [[buckets]]
            name = "Emergency fund"
            target = 5000.0
            color = "#10B981"

            [[buckets]]
            name = "Gifts"

            [[trips]]
            name = "Lisbon"
            target = 1800.0
        "##;

        let config: SeedConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.buckets.len(), 2);
        assert_eq!(config.buckets[0].target, Some(5000.0));
        assert_eq!(
            config.buckets[0].to_new_resource().color,
            Some(AccentColor::Green)
        );
        assert!(config.buckets[1].target.is_none());
        assert_eq!(config.trips[0].name, "Lisbon");
    }

    #[test]
    fn test_missing_sections_default_to_empty() {
        let config: SeedConfig = toml::from_str("").unwrap();
        assert!(config.buckets.is_empty());
        assert!(config.trips.is_empty());
    }

    #[test]
    fn test_unknown_color_is_dropped() {
        let seed = GoalSeed {
            name: "Car".to_string(),
            target: None,
            color: Some("#000000".to_string()),
        };
        assert!(seed.to_new_resource().color.is_none());
    }

    #[test]
    fn test_load_missing_file_is_config_error() {
        assert!(matches!(
            load_config("does/not/exist.toml"),
            Err(Error::Config { .. })
        ));
    }

    #[tokio::test]
    async fn test_seeding_skips_existing_names() -> Result<()> {
        let env = StoreEnv::new().await?;
        let alice = env.sign_in("alice").await?;
        let engine = env.bucket_engine();
        engine.subscribe(alice).await?;
        let seeds = vec![
            GoalSeed {
                name: "Rent".to_string(),
                target: Some(1200.0),
                color: None,
            },
            GoalSeed {
                name: "Books".to_string(),
                target: None,
                color: None,
            },
        ];

        assert_eq!(seed_initial_resources(&engine, &seeds).await?, 2);
        assert_eq!(seed_initial_resources(&engine, &seeds).await?, 0);
        assert_eq!(engine.snapshot().items.len(), 2);
        Ok(())
    }
}
