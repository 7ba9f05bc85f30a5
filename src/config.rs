//! Process configuration from the environment

use crate::llm::DEFAULT_COMPLETION_URL;
use crate::payment::StripeConfig;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub port: u16,
    /// Identifies this device in need claims and capture ownership
    pub device_id: String,
    /// User id the local user resolves to
    pub local_user_id: String,
    pub completion_url: String,
    pub api_key: Option<String>,
    /// Claims older than this may be taken over. `None` means never.
    pub claim_ttl: Option<Duration>,
    /// Payments are refused when unset
    pub stripe: Option<StripeConfig>,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| var(name).filter(|v| !v.is_empty());

        let db_path = var("LIGHTWARD_DB_PATH").map_or_else(
            || {
                let home = var("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(home).join(".lightward-rooms").join("rooms.db")
            },
            PathBuf::from,
        );

        let port = var("LIGHTWARD_PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(8000);

        let device_id = var("LIGHTWARD_DEVICE_ID").unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let local_user_id = var("LIGHTWARD_LOCAL_USER_ID").unwrap_or_else(|| device_id.clone());

        let claim_ttl = var("LIGHTWARD_CLAIM_TTL_SECS")
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs);

        Self {
            db_path,
            port,
            device_id,
            local_user_id,
            completion_url: var("LIGHTWARD_COMPLETION_URL")
                .unwrap_or_else(|| DEFAULT_COMPLETION_URL.to_string()),
            api_key: var("LIGHTWARD_API_KEY"),
            claim_ttl,
            stripe: StripeConfig::from_env(),
        }
    }
}
