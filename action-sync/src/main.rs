//! Action Sync — keeps kanban ACTION markers and the action items database in step.
//!
//! One invocation runs the forward pass (card notes -> new action items) and
//! then the backward pass (completed action items -> ✅ in card notes), then
//! exits. Scheduling repeated runs is left to cron or similar.

mod config;
mod fanout;
mod markers;
mod store;
mod sync;

use config::Config;
use std::sync::Arc;
use store::NotionStore;
use sync::ActionSyncer;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("[CONFIG] {}", e);
            std::process::exit(1);
        }
    };
    log::debug!("[CONFIG] {:?}", config);

    let store = match NotionStore::new(&config) {
        Ok(store) => store,
        Err(e) => {
            log::error!("[CONFIG] Failed to build Notion client: {}", e);
            std::process::exit(1);
        }
    };

    log::info!(
        "[SYNC] Syncing kanban {} with action items {}",
        config.kanban_db_id,
        config.action_items_db_id
    );

    let syncer = ActionSyncer::new(Arc::new(store));
    let report = syncer.run().await;

    match serde_json::to_string(&report) {
        Ok(json) => log::info!("[SYNC] Done: {}", json),
        Err(e) => log::warn!("[SYNC] Done (report not serializable: {})", e),
    }
}
