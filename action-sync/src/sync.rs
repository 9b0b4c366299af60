//! Forward and backward synchronization passes.
//!
//! Forward: kanban cards with ACTION markers -> tracking entries.
//! Backward: completed tracking entries -> ✅ on the source card's marker.
//!
//! Every remote failure is logged and contained to the card (or creation, or
//! card group) it belongs to. Only a failed enumerating query ends a pass
//! early, and it never touches the other pass.

use crate::fanout;
use crate::markers::{build_completion_rewrite, extract_markers, filter_new, should_reprocess};
use crate::store::{ActionStore, StoreError};
use action_sync_types::{Card, NewTrackingEntry, PassReport, SyncReport, TrackingEntry};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;

pub struct ActionSyncer {
    store: Arc<dyn ActionStore>,
}

impl ActionSyncer {
    pub fn new(store: Arc<dyn ActionStore>) -> Self {
        Self { store }
    }

    /// Forward pass to completion, then the backward pass
    pub async fn run(&self) -> SyncReport {
        let forward = self.forward_pass().await;
        let backward = self.backward_pass().await;
        SyncReport { forward, backward }
    }

    // ── Forward pass ────────────────────────────────

    pub async fn forward_pass(&self) -> PassReport {
        let cards = match self.store.list_candidate_cards().await {
            Ok(cards) => cards,
            Err(e) => {
                log::error!("[SYNC] Error processing kanban updates: {}", e);
                return PassReport::aborted();
            }
        };

        log::info!("[SYNC] Found {} pages with ACTION items to check", cards.len());

        let outcomes = fanout::run_isolated(cards.iter().map(|card| async move {
            self.process_card(card).await.map_err(|e| (card, e))
        }))
        .await;

        let mut report = PassReport {
            candidates: cards.len(),
            ..Default::default()
        };
        for outcome in outcomes {
            match outcome {
                Ok(card_report) => report.merge(&card_report),
                Err((card, e)) => {
                    log::error!(
                        "[SYNC] Error processing page {} ({}): {}",
                        card.display_title(),
                        card.id,
                        e
                    );
                    report.failures += 1;
                }
            }
        }

        log::info!(
            "[SYNC] Forward pass: {} processed, {} skipped, {} created, {} failures",
            report.processed,
            report.skipped,
            report.created,
            report.failures
        );
        report
    }

    /// Scan one card and create its missing tracking entries.
    ///
    /// A failed notes read or existing-entry lookup leaves the card untouched
    /// (not marked processed) so the next run tries again.
    async fn process_card(&self, card: &Card) -> Result<PassReport, StoreError> {
        let mut report = PassReport::default();

        if !should_reprocess(card.last_edited, card.last_processed) {
            log::debug!(
                "[SYNC] Skipping page {} since no updates since last processing",
                card.display_title()
            );
            report.skipped = 1;
            return Ok(report);
        }

        log::info!("[SYNC] Processing page: {}", card.display_title());
        log::debug!(
            "[SYNC] Last Edited: {:?}, Last Processed: {:?}",
            card.last_edited,
            card.last_processed
        );

        let notes = self.store.read_notes(&card.id).await?;
        let phrases = extract_markers(&notes);

        if phrases.is_empty() {
            log::debug!("[SYNC] No ACTION items found in notes for {}", card.display_title());
        } else {
            log::info!(
                "[SYNC] Found {} ACTION items in {}",
                phrases.len(),
                card.display_title()
            );

            let existing = self.store.list_action_titles(&card.id).await?;
            let fresh = filter_new(&phrases, &existing);
            for phrase in phrases.iter().filter(|p| existing.contains(*p)) {
                log::debug!("[SYNC] Skipping duplicate: {}", phrase);
            }

            let (created, failed) = self.create_missing(card, &fresh).await;
            report.created += created;
            report.failures += failed;
        }

        // Advances even when nothing was found or some creations failed
        match self.store.mark_processed(&card.id, Utc::now()).await {
            Ok(()) => {
                log::debug!("[SYNC] Updated last processed time for page {}", card.id);
                report.processed = 1;
            }
            Err(e) => {
                log::error!("[SYNC] Error marking page {} as processed: {}", card.id, e);
                report.failures += 1;
            }
        }

        Ok(report)
    }

    /// One creation per phrase, all in flight together. Returns (created, failed).
    async fn create_missing(&self, card: &Card, phrases: &[String]) -> (usize, usize) {
        if phrases.is_empty() {
            return (0, 0);
        }

        let outcomes = fanout::run_isolated(phrases.iter().map(|phrase| async move {
            let entry = NewTrackingEntry {
                title: phrase.clone(),
                source_card: card.id.clone(),
                date_added: Utc::now(),
            };
            match self.store.create_action_item(&entry).await {
                Ok(id) => {
                    log::info!("[SYNC] Created action item: {} ({})", phrase, id);
                    Ok(())
                }
                Err(e) => {
                    log::error!(
                        "[SYNC] Error creating action item '{}' for page {}: {}",
                        phrase,
                        card.id,
                        e
                    );
                    Err(e)
                }
            }
        }))
        .await;

        fanout::tally(&outcomes)
    }

    // ── Backward pass ───────────────────────────────

    pub async fn backward_pass(&self) -> PassReport {
        let entries = match self.store.list_completed_items().await {
            Ok(entries) => entries,
            Err(e) => {
                log::error!("[SYNC] Error processing completion updates: {}", e);
                return PassReport::aborted();
            }
        };

        log::info!("[SYNC] Found {} completed action items to process", entries.len());

        let mut report = PassReport {
            candidates: entries.len(),
            ..Default::default()
        };

        let groups = group_by_source_card(&entries);
        let syncable: usize = groups.iter().map(|(_, group)| group.len()).sum();
        report.skipped += entries.len() - syncable;

        let outcomes = fanout::run_isolated(groups.iter().map(|(card_id, group)| async move {
            self.sync_card_completions(card_id, group)
                .await
                .map_err(|e| (*card_id, group.len(), e))
        }))
        .await;

        for outcome in outcomes {
            match outcome {
                Ok((marked, unchanged)) => {
                    report.processed += marked;
                    report.skipped += unchanged;
                }
                Err((card_id, count, e)) => {
                    log::error!(
                        "[SYNC] Error marking {} action item(s) completed on page {}: {}",
                        count,
                        card_id,
                        e
                    );
                    report.failures += 1;
                }
            }
        }

        log::info!(
            "[SYNC] Backward pass: {} marked, {} unchanged, {} failures",
            report.processed,
            report.skipped,
            report.failures
        );
        report
    }

    /// Apply every completed entry of one card to its notes, writing once.
    /// Returns (markers rewritten, entries left unchanged).
    async fn sync_card_completions(
        &self,
        card_id: &str,
        entries: &[&TrackingEntry],
    ) -> Result<(usize, usize), StoreError> {
        let mut notes = self.store.read_notes(card_id).await?;
        let mut marked = Vec::new();
        for entry in entries {
            let (updated, changed) = build_completion_rewrite(&notes, &entry.title);
            if changed {
                notes = updated;
                marked.push(entry.title.as_str());
            } else {
                log::debug!(
                    "[SYNC] Nothing to mark for '{}' on page {}",
                    entry.title,
                    card_id
                );
            }
        }

        if marked.is_empty() {
            return Ok((0, entries.len()));
        }

        self.store.write_notes(card_id, &notes).await?;
        for title in &marked {
            log::info!("[SYNC] Marked action completed: {}", title);
        }

        Ok((marked.len(), entries.len() - marked.len()))
    }
}

/// Completed entries grouped by source card, in first-seen order.
///
/// Entries without a source card or a title cannot be synced and are left out.
fn group_by_source_card(entries: &[TrackingEntry]) -> Vec<(&str, Vec<&TrackingEntry>)> {
    let mut groups: Vec<(&str, Vec<&TrackingEntry>)> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for entry in entries {
        if !entry.completed || entry.title.is_empty() {
            continue;
        }
        let Some(card_id) = entry.source_card.as_deref() else {
            log::debug!("[SYNC] Action item {} has no source card, skipping", entry.id);
            continue;
        };

        match index.get(card_id) {
            Some(&i) => groups[i].1.push(entry),
            None => {
                index.insert(card_id, groups.len());
                groups.push((card_id, vec![entry]));
            }
        }
    }

    groups
}
