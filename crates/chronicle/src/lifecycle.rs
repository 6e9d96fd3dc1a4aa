//! Chunk lifecycle reconciliation
//!
//! A new classification is reconciled against what the collection already
//! holds. Planning is pure and works on stored records, so records whose
//! metadata no longer parses as a chunk are still matched by their promoted
//! fields. Execution deletes first, then inserts.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::classify::{Classification, classify_legacy, classify_summary};
use crate::config::LifecycleConfig;
use crate::error::Result;
use crate::memory::types::{ChunkBehavior, MemoryChunk};
use crate::storage::{ChunkRecord, ListOptions, VectorStore};

/// Counts reported after a reconciliation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Existing superseding chunks deleted
    pub superseding_replaced: usize,
    /// Cumulative and legacy chunks inserted
    pub cumulative_added: usize,
    /// Rolling chunks inserted
    pub rolling_updated: usize,
    /// Existing rolling chunks deleted because their entity resolved
    pub rolling_purged: usize,
}

/// Deletes and inserts for one reconciliation
#[derive(Debug, Clone, Default)]
pub struct ReconcilePlan {
    pub deletes: Vec<u64>,
    pub inserts: Vec<MemoryChunk>,
    pub report: ReconcileReport,
}

impl ReconcilePlan {
    pub fn is_noop(&self) -> bool {
        self.deletes.is_empty() && self.inserts.is_empty()
    }
}

type IdentityKey = (String, String);

fn record_identity(record: &ChunkRecord) -> Option<IdentityKey> {
    match (record.section_type(), record.entity_key()) {
        (Some(section), Some(key)) => Some((section.to_string(), key.to_string())),
        _ => None,
    }
}

/// Plan the store mutations that bring `existing` in line with `classification`.
///
/// Hashes present on both sides are never deleted and never re-inserted.
pub fn plan_reconciliation(
    existing: &[ChunkRecord],
    classification: &Classification,
) -> ReconcilePlan {
    let new_hashes: HashSet<u64> = classification.chunks.iter().map(|c| c.hash).collect();
    let existing_hashes: HashSet<u64> = existing.iter().map(|r| r.hash).collect();

    let has_superseding = classification
        .chunks
        .iter()
        .any(|c| c.behavior() == ChunkBehavior::Superseding);
    let updated_identities: HashSet<IdentityKey> = classification
        .chunks
        .iter()
        .filter_map(|c| c.metadata.rolling_identity())
        .map(|id| (id.section_type.key().to_string(), id.entity_key))
        .collect();
    let resolved_identities: HashSet<IdentityKey> = classification
        .resolved_entities
        .iter()
        .map(|e| (e.section_type.key().to_string(), e.entity_key.clone()))
        .collect();

    let mut plan = ReconcilePlan::default();
    let mut deleted = HashSet::new();

    for record in existing {
        if new_hashes.contains(&record.hash) || deleted.contains(&record.hash) {
            continue;
        }
        match record.behavior().and_then(ChunkBehavior::parse) {
            Some(ChunkBehavior::Superseding) if has_superseding => {
                plan.deletes.push(record.hash);
                deleted.insert(record.hash);
                plan.report.superseding_replaced += 1;
            }
            Some(ChunkBehavior::Rolling) => {
                let Some(identity) = record_identity(record) else {
                    continue;
                };
                let resolved = resolved_identities.contains(&identity);
                if resolved || updated_identities.contains(&identity) {
                    plan.deletes.push(record.hash);
                    deleted.insert(record.hash);
                    if resolved {
                        plan.report.rolling_purged += 1;
                    }
                }
            }
            _ => {}
        }
    }

    let mut inserted = HashSet::new();
    for chunk in &classification.chunks {
        if existing_hashes.contains(&chunk.hash) || !inserted.insert(chunk.hash) {
            continue;
        }
        match chunk.behavior() {
            ChunkBehavior::Cumulative | ChunkBehavior::Legacy => plan.report.cumulative_added += 1,
            ChunkBehavior::Rolling => plan.report.rolling_updated += 1,
            ChunkBehavior::Superseding => {}
        }
        plan.inserts.push(chunk.clone());
    }

    plan
}

/// Applies reconciliation plans to a store
pub struct Reconciler {
    store: Arc<dyn VectorStore>,
    config: LifecycleConfig,
}

impl Reconciler {
    pub fn new(store: Arc<dyn VectorStore>, config: LifecycleConfig) -> Self {
        Self { store, config }
    }

    /// Every record in the collection, read page by page.
    pub async fn existing_records(&self, collection_id: &str) -> Result<Vec<ChunkRecord>> {
        let page_size = self.config.page_size.max(1);
        let mut records = Vec::new();
        let mut offset = 0;

        loop {
            let page = self
                .store
                .list(collection_id, &ListOptions::page(offset, page_size))
                .await?;
            let len = page.len();
            records.extend(page);
            if len < page_size {
                break;
            }
            offset += len;
        }

        Ok(records)
    }

    /// Reconcile a classification into the collection.
    pub async fn apply(
        &self,
        collection_id: &str,
        classification: &Classification,
    ) -> Result<ReconcileReport> {
        let existing = self.existing_records(collection_id).await?;
        let plan = plan_reconciliation(&existing, classification);
        debug!(
            "Reconciliation plan for {}: {} existing, {} deletes, {} inserts",
            collection_id,
            existing.len(),
            plan.deletes.len(),
            plan.inserts.len()
        );

        if plan.is_noop() {
            return Ok(plan.report);
        }

        if !plan.deletes.is_empty() {
            self.store.delete(collection_id, &plan.deletes).await?;
        }
        if !plan.inserts.is_empty() {
            let records = plan
                .inserts
                .iter()
                .map(ChunkRecord::try_from)
                .collect::<Result<Vec<_>>>()?;
            self.store.insert(collection_id, &records).await?;
        }

        info!(
            "Reconciled {}: superseding_replaced={} cumulative_added={} rolling_updated={} rolling_purged={}",
            collection_id,
            plan.report.superseding_replaced,
            plan.report.cumulative_added,
            plan.report.rolling_updated,
            plan.report.rolling_purged
        );
        Ok(plan.report)
    }

    /// Classify a summary covering messages `[start_index, end_index]` and
    /// reconcile it. Summaries with no recognized structure are stored whole
    /// as a single legacy chunk.
    pub async fn index_summary(
        &self,
        collection_id: &str,
        text: &str,
        start_index: u64,
        end_index: u64,
        keywords: &[String],
    ) -> Result<ReconcileReport> {
        if text.trim().is_empty() {
            return Ok(ReconcileReport::default());
        }

        let mut classification = classify_summary(text, start_index, end_index, keywords);
        if classification.is_empty() {
            debug!("No recognized sections, indexing summary as legacy chunk");
            classification = Classification {
                chunks: vec![classify_legacy(text, start_index, end_index, keywords)],
                resolved_entities: Vec::new(),
            };
        }

        self.apply(collection_id, &classification).await
    }
}

/// Result of purging one collection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PurgeOutcome {
    pub collection_id: String,
    /// Failure reason, if the purge failed
    pub error: Option<String>,
}

impl PurgeOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Purge every collection of a deleted conversation.
///
/// Failures are reported per collection; the remaining collections are
/// still purged.
pub async fn purge_conversation(
    store: &dyn VectorStore,
    collection_ids: &[String],
) -> Vec<PurgeOutcome> {
    let mut outcomes = Vec::with_capacity(collection_ids.len());
    for collection_id in collection_ids {
        let error = match store.purge(collection_id).await {
            Ok(()) => {
                info!("Purged collection {}", collection_id);
                None
            }
            Err(e) => {
                warn!("Failed to purge collection {}: {}", collection_id, e);
                Some(e.to_string())
            }
        };
        outcomes.push(PurgeOutcome {
            collection_id: collection_id.clone(),
            error,
        });
    }
    outcomes
}
