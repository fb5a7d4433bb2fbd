use std::path::PathBuf;

use crate::profile::CapabilityTier;

/// Application configuration
/// In debug builds: loads from .env file
/// In release builds: loads from environment only
#[derive(Clone, Debug)]
pub struct Config {
    /// Destination root for the archive store
    pub archive_root: PathBuf,
    /// Path to the identity index database
    pub database_path: PathBuf,
    /// Volume labels that classify as local even under a network mount root
    pub local_volumes: Vec<String>,
    /// Capability tier resolved by the external hardware probe
    pub capability_tier: CapabilityTier,
}

impl Config {
    /// Load configuration based on build mode
    pub fn load() -> Self {
        #[cfg(debug_assertions)]
        {
            if dotenvy::dotenv().is_ok() {
                tracing::info!("Dev mode activated - loaded .env file");
            }
        }

        Self::from_env()
    }

    /// Load configuration from environment variables
    fn from_env() -> Self {
        let base = Self::default_base_dir();

        let archive_root = std::env::var("ARCA_ARCHIVE_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| base.join("archive"));

        let database_path = std::env::var("ARCA_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| base.join("arca.db"));

        let local_volumes = std::env::var("ARCA_LOCAL_VOLUMES")
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let capability_tier = match std::env::var("ARCA_CAPABILITY_TIER").as_deref() {
            Ok("constrained") => CapabilityTier::Constrained,
            Ok("performance") => CapabilityTier::Performance,
            _ => CapabilityTier::Standard,
        };

        Self {
            archive_root,
            database_path,
            local_volumes,
            capability_tier,
        }
    }

    fn default_base_dir() -> PathBuf {
        dirs::home_dir()
            .map(|home| home.join(".arca"))
            .unwrap_or_else(|| PathBuf::from(".arca"))
    }
}
