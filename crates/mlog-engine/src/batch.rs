//! Batched parent-status lookups.
//!
//! When frame tasks observe cache misses for their parents, the engine
//! collapses all of them into one OR find against the store instead of one
//! find per frame. The result is merged back into the status cache; the
//! tasks that deferred succeed on the next cycle.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{info, warn};

use mlog_models::{fields, Footage};
use mlog_store::StoreClient;

use crate::error::EngineResult;

pub struct BatchStatusChecker {
    store: Arc<StoreClient>,
}

impl BatchStatusChecker {
    pub fn new(store: Arc<StoreClient>) -> Self {
        Self { store }
    }

    /// Resolve many footage statuses with a single OR find. Ids missing
    /// from the store are logged, never treated as errors: the frames
    /// pointing at them are orphans and simply stay deferred.
    pub async fn batch_check(&self, footage_ids: &BTreeSet<String>) -> EngineResult<Vec<Footage>> {
        if footage_ids.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<&str> = footage_ids.iter().map(String::as_str).collect();
        let records = self
            .store
            .find_by_or(fields::FOOTAGE_LAYOUT, fields::footage::ID, &ids)
            .await?;

        let found: Vec<Footage> = records
            .iter()
            .filter_map(|record| Footage::from_fields(&record.record_key, &record.fields))
            .collect();

        info!(
            requested = footage_ids.len(),
            found = found.len(),
            "Batch parent-status check complete"
        );

        let found_ids: BTreeSet<&str> = found.iter().map(|f| f.id.as_str()).collect();
        let missing: Vec<&str> = footage_ids
            .iter()
            .map(String::as_str)
            .filter(|id| !found_ids.contains(id))
            .collect();
        if !missing.is_empty() {
            warn!(
                missing = missing.len(),
                sample = ?&missing[..missing.len().min(5)],
                "Parent footage records missing from the store"
            );
        }

        Ok(found)
    }
}
