//! Data store settings.
//!
//! The store recognizes a fixed set of configuration keys; anything else is
//! dropped at the setter boundary. Static push/pull credentials switch the
//! store into "external" credential mode when both are present.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

pub const DATASTORE_TYPE_KEY: &str = "dataStoreType";
pub const GIT_REMOTE_URL_KEY: &str = "gitRemoteUrl";
pub const GIT_REMOTE_USER_KEY: &str = "gitRemoteUser";
pub const GIT_REMOTE_PASSWORD_KEY: &str = "gitRemotePassword";
pub const GIT_PULL_PERIOD_KEY: &str = "gitPullPeriod";

/// Configuration keys the store recognizes.
pub const SUPPORTED_KEYS: [&str; 5] = [
    DATASTORE_TYPE_KEY,
    GIT_REMOTE_URL_KEY,
    GIT_REMOTE_USER_KEY,
    GIT_REMOTE_PASSWORD_KEY,
    GIT_PULL_PERIOD_KEY,
];

fn default_pull_period_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Upstream remote URL; pull/push are skipped quietly when unset.
    pub remote_url: Option<String>,
    /// Static push/pull username.
    pub remote_user: Option<String>,
    /// Static push/pull password.
    pub remote_password: Option<String>,
    /// Sync interval in milliseconds.
    pub pull_period_ms: u64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            remote_url: None,
            remote_user: None,
            remote_password: None,
            pull_period_ms: default_pull_period_ms(),
        }
    }
}

impl StoreSettings {
    /// Build settings from a raw key/value map, dropping unrecognized keys.
    pub fn from_properties(properties: &BTreeMap<String, String>) -> Result<Self, StoreError> {
        let mut settings = Self::default();
        for (key, value) in properties {
            match key.as_str() {
                GIT_REMOTE_URL_KEY => settings.remote_url = Some(value.clone()),
                GIT_REMOTE_USER_KEY => settings.remote_user = Some(value.clone()),
                GIT_REMOTE_PASSWORD_KEY => settings.remote_password = Some(value.clone()),
                GIT_PULL_PERIOD_KEY => {
                    settings.pull_period_ms =
                        value.parse().map_err(|_| StoreError::Settings {
                            key: GIT_PULL_PERIOD_KEY,
                            reason: format!("not a millisecond count: {value:?}"),
                        })?;
                }
                DATASTORE_TYPE_KEY => {}
                _ => tracing::debug!(key, "dropping unrecognized data store setting"),
            }
        }
        Ok(settings)
    }

    pub fn pull_period(&self) -> Duration {
        Duration::from_millis(self.pull_period_ms)
    }

    /// True when the store was configured with an external git repository,
    /// i.e. both a static user and password are present.
    pub fn is_external(&self) -> bool {
        self.remote_user.is_some() && self.remote_password.is_some()
    }
}
