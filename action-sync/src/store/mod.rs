//! Remote store boundary.
//!
//! The sync passes talk to an [`ActionStore`]; [`NotionStore`] is the
//! production implementation over the Notion REST API.

pub mod notion;

use action_sync_types::{Card, NewTrackingEntry, TrackingEntry};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

pub use notion::NotionStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("API error ({status}) {code}: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },
    #[error("Unexpected response shape: {0}")]
    Decode(String),
}

/// Logical operations the sync passes need from the remote collections
#[async_trait]
pub trait ActionStore: Send + Sync {
    /// Cards whose notes mention the ACTION keyword
    async fn list_candidate_cards(&self) -> Result<Vec<Card>, StoreError>;

    /// Current notes text of a card (empty when the property is missing)
    async fn read_notes(&self, card_id: &str) -> Result<String, StoreError>;

    /// Titles of the tracking entries that reference a card
    async fn list_action_titles(&self, card_id: &str) -> Result<Vec<String>, StoreError>;

    /// Create a tracking entry, returning its id
    async fn create_action_item(&self, entry: &NewTrackingEntry) -> Result<String, StoreError>;

    async fn mark_processed(&self, card_id: &str, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Tracking entries whose completion flag is set
    async fn list_completed_items(&self) -> Result<Vec<TrackingEntry>, StoreError>;

    async fn write_notes(&self, card_id: &str, notes: &str) -> Result<(), StoreError>;
}
