use std::env;
use thiserror::Error;

/// Environment variable names - single source of truth
pub mod env_vars {
    pub const NOTION_API_KEY: &str = "NOTION_API_KEY";
    pub const KANBAN_DB_ID: &str = "KANBAN_DB_ID";
    pub const ACTION_ITEMS_DB_ID: &str = "ACTION_ITEMS_DB_ID";
    /// Override for the API base (e.g. a local mock)
    pub const NOTION_API_URL: &str = "NOTION_API_URL";
    pub const NOTION_VERSION: &str = "NOTION_VERSION";
    /// Per-request transport timeout in seconds
    pub const NOTION_TIMEOUT_SECS: &str = "NOTION_TIMEOUT_SECS";

    // Property name overrides
    pub const PROP_CARD_TITLE: &str = "ACTION_SYNC_PROP_CARD_TITLE";
    pub const PROP_NOTES: &str = "ACTION_SYNC_PROP_NOTES";
    pub const PROP_LAST_EDITED: &str = "ACTION_SYNC_PROP_LAST_EDITED";
    pub const PROP_LAST_PROCESSED: &str = "ACTION_SYNC_PROP_LAST_PROCESSED";
    pub const PROP_ACTION_ITEM: &str = "ACTION_SYNC_PROP_ACTION_ITEM";
    pub const PROP_STATUS: &str = "ACTION_SYNC_PROP_STATUS";
    pub const PROP_SOURCE_CARD: &str = "ACTION_SYNC_PROP_SOURCE_CARD";
    pub const PROP_DATE_ADDED: &str = "ACTION_SYNC_PROP_DATE_ADDED";
}

/// Default values
pub mod defaults {
    pub const NOTION_API_URL: &str = "https://api.notion.com/v1";
    pub const NOTION_VERSION: &str = "2022-06-28";
    pub const NOTION_TIMEOUT_SECS: u64 = 30;

    pub const PROP_CARD_TITLE: &str = "Task Name";
    pub const PROP_NOTES: &str = "Notes";
    pub const PROP_LAST_EDITED: &str = "Last Edited Time";
    pub const PROP_LAST_PROCESSED: &str = "Last Processed";
    pub const PROP_ACTION_ITEM: &str = "Action Item";
    pub const PROP_STATUS: &str = "Status";
    pub const PROP_SOURCE_CARD: &str = "Source Card";
    pub const PROP_DATE_ADDED: &str = "Date Added";
}

/// Length of a collection identifier once hyphens are removed
const DATABASE_ID_LEN: usize = 32;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),
    #[error("{0} cannot be empty")]
    Empty(&'static str),
    #[error("Invalid {name} format: {value} (expected 32 alphanumeric characters, hyphens allowed)")]
    InvalidDatabaseId { name: &'static str, value: String },
    #[error("{name} must be a positive number of seconds, got {value}")]
    InvalidTimeout { name: &'static str, value: String },
}

/// Check if a database ID has a valid format (32 alphanumeric characters once hyphens are dropped).
pub fn is_valid_database_id(db_id: &str) -> bool {
    let cleaned = normalize_database_id(db_id);
    cleaned.len() == DATABASE_ID_LEN && cleaned.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Strip hyphens so dashed and undashed forms of an identifier compare equal
pub fn normalize_database_id(db_id: &str) -> String {
    db_id.replace('-', "")
}

/// External property names for each logical field role.
///
/// Owned by the store adapter; the sync core only deals with typed records.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PropertyNames {
    pub card_title: String,
    pub notes: String,
    pub last_edited: String,
    pub last_processed: String,
    pub action_item: String,
    pub status: String,
    pub source_card: String,
    pub date_added: String,
}

impl Default for PropertyNames {
    fn default() -> Self {
        Self {
            card_title: defaults::PROP_CARD_TITLE.to_string(),
            notes: defaults::PROP_NOTES.to_string(),
            last_edited: defaults::PROP_LAST_EDITED.to_string(),
            last_processed: defaults::PROP_LAST_PROCESSED.to_string(),
            action_item: defaults::PROP_ACTION_ITEM.to_string(),
            status: defaults::PROP_STATUS.to_string(),
            source_card: defaults::PROP_SOURCE_CARD.to_string(),
            date_added: defaults::PROP_DATE_ADDED.to_string(),
        }
    }
}

impl PropertyNames {
    /// Defaults, with any `ACTION_SYNC_PROP_*` override applied
    pub fn from_env() -> Self {
        let pick = |var: &str, fallback: String| {
            env::var(var)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or(fallback)
        };

        let d = Self::default();
        Self {
            card_title: pick(env_vars::PROP_CARD_TITLE, d.card_title),
            notes: pick(env_vars::PROP_NOTES, d.notes),
            last_edited: pick(env_vars::PROP_LAST_EDITED, d.last_edited),
            last_processed: pick(env_vars::PROP_LAST_PROCESSED, d.last_processed),
            action_item: pick(env_vars::PROP_ACTION_ITEM, d.action_item),
            status: pick(env_vars::PROP_STATUS, d.status),
            source_card: pick(env_vars::PROP_SOURCE_CARD, d.source_card),
            date_added: pick(env_vars::PROP_DATE_ADDED, d.date_added),
        }
    }
}

#[derive(Clone)]
pub struct Config {
    pub notion_token: String,
    /// Card collection, hyphens stripped
    pub kanban_db_id: String,
    /// Tracking collection, hyphens stripped
    pub action_items_db_id: String,
    pub api_url: String,
    pub notion_version: String,
    pub timeout_secs: u64,
    pub properties: PropertyNames,
}

// Keeps the token out of logs.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("notion_token", &"<redacted>")
            .field("kanban_db_id", &self.kanban_db_id)
            .field("action_items_db_id", &self.action_items_db_id)
            .field("api_url", &self.api_url)
            .field("notion_version", &self.notion_version)
            .field("timeout_secs", &self.timeout_secs)
            .field("properties", &self.properties)
            .finish()
    }
}

impl Config {
    /// Validate credentials and identifiers. No I/O happens here.
    pub fn new(
        notion_token: &str,
        kanban_db_id: &str,
        action_items_db_id: &str,
    ) -> Result<Self, ConfigError> {
        if notion_token.trim().is_empty() {
            return Err(ConfigError::Empty(env_vars::NOTION_API_KEY));
        }
        if kanban_db_id.trim().is_empty() {
            return Err(ConfigError::Empty(env_vars::KANBAN_DB_ID));
        }
        if action_items_db_id.trim().is_empty() {
            return Err(ConfigError::Empty(env_vars::ACTION_ITEMS_DB_ID));
        }
        if !is_valid_database_id(kanban_db_id) {
            return Err(ConfigError::InvalidDatabaseId {
                name: env_vars::KANBAN_DB_ID,
                value: kanban_db_id.to_string(),
            });
        }
        if !is_valid_database_id(action_items_db_id) {
            return Err(ConfigError::InvalidDatabaseId {
                name: env_vars::ACTION_ITEMS_DB_ID,
                value: action_items_db_id.to_string(),
            });
        }

        Ok(Self {
            notion_token: notion_token.trim().to_string(),
            kanban_db_id: normalize_database_id(kanban_db_id),
            action_items_db_id: normalize_database_id(action_items_db_id),
            api_url: defaults::NOTION_API_URL.to_string(),
            notion_version: defaults::NOTION_VERSION.to_string(),
            timeout_secs: defaults::NOTION_TIMEOUT_SECS,
            properties: PropertyNames::default(),
        })
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let required = |name: &'static str| env::var(name).map_err(|_| ConfigError::Missing(name));

        let mut config = Self::new(
            &required(env_vars::NOTION_API_KEY)?,
            &required(env_vars::KANBAN_DB_ID)?,
            &required(env_vars::ACTION_ITEMS_DB_ID)?,
        )?;

        if let Ok(url) = env::var(env_vars::NOTION_API_URL) {
            config.api_url = url.trim_end_matches('/').to_string();
        }
        if let Ok(version) = env::var(env_vars::NOTION_VERSION) {
            config.notion_version = version;
        }
        if let Ok(raw) = env::var(env_vars::NOTION_TIMEOUT_SECS) {
            config.timeout_secs = match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => secs,
                _ => {
                    return Err(ConfigError::InvalidTimeout {
                        name: env_vars::NOTION_TIMEOUT_SECS,
                        value: raw,
                    });
                }
            };
        }
        config.properties = PropertyNames::from_env();

        Ok(config)
    }
}
