//! Merge-and-persist for one alert evaluation.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, error, info};
use vigil_core::AnomalyInterval;

use crate::error::{MergeError, Result};
use crate::merger::{combine_and_sort, merge};
use crate::policy::MergePolicy;
use crate::store::AnomalyStore;

/// Outcome of [`AnomalyMerger::merge_and_save`].
#[derive(Debug, Default)]
pub struct MergeOutcome {
    /// Merged parents; `id` is set on those that were persisted.
    pub merged: Vec<AnomalyInterval>,
    pub persisted: usize,
    pub failed: usize,
}

/// One async mutex per alert id.
#[derive(Default)]
struct AlertLocks {
    locks: Mutex<HashMap<i64, Arc<AsyncMutex<()>>>>,
}

impl AlertLocks {
    async fn acquire(&self, alert_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = match self.locks.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            Arc::clone(locks.entry(alert_id).or_default())
        };
        lock.lock_owned().await
    }
}

/// Merges fresh anomalies with stored ones and persists the result.
///
/// Calls for the same alert id are serialized; different alerts run freely.
pub struct AnomalyMerger {
    store: Arc<dyn AnomalyStore>,
    locks: AlertLocks,
}

impl AnomalyMerger {
    pub fn new(store: Arc<dyn AnomalyStore>) -> Self {
        Self {
            store,
            locks: AlertLocks::default(),
        }
    }

    pub fn store(&self) -> &Arc<dyn AnomalyStore> {
        &self.store
    }

    /// Merge `anomalies` for `alert_id` and persist every resulting parent.
    ///
    /// Empty input is a no-op. Anomalies are merged separately per
    /// enumeration item, each group against its own stored overlap window
    /// `[min_start - gap - 1, max_end + gap + 1]`. A failed persist is logged
    /// and the remaining parents are still persisted.
    pub async fn merge_and_save(
        &self,
        alert_id: Option<i64>,
        policy: &MergePolicy,
        anomalies: Vec<AnomalyInterval>,
    ) -> Result<MergeOutcome> {
        if anomalies.is_empty() {
            return Ok(MergeOutcome::default());
        }
        let alert_id = alert_id.ok_or(MergeError::MissingAlertIdentity)?;
        let _guard = self.locks.acquire(alert_id).await;

        let mut groups: BTreeMap<Option<i64>, Vec<AnomalyInterval>> = BTreeMap::new();
        for mut anomaly in anomalies {
            anomaly.alert_id = Some(alert_id);
            groups
                .entry(anomaly.enumeration_item_id)
                .or_default()
                .push(anomaly);
        }

        let mut merged = Vec::new();
        for (item_id, fresh) in groups {
            merged.extend(self.merge_group(alert_id, item_id, fresh, policy).await?);
        }

        let mut outcome = MergeOutcome::default();
        for mut anomaly in merged {
            match self.store.persist(&anomaly).await {
                Ok(id) => {
                    anomaly.id = Some(id);
                    outcome.persisted += 1;
                }
                Err(e) => {
                    outcome.failed += 1;
                    error!(
                        alert_id,
                        start = anomaly.start_time,
                        end = anomaly.end_time,
                        error = %format!("{e:#}"),
                        "failed to store anomaly"
                    );
                }
            }
            outcome.merged.push(anomaly);
        }

        info!(
            alert_id,
            merged = outcome.merged.len(),
            persisted = outcome.persisted,
            failed = outcome.failed,
            "anomalies merged"
        );
        Ok(outcome)
    }

    async fn merge_group(
        &self,
        alert_id: i64,
        item_id: Option<i64>,
        fresh: Vec<AnomalyInterval>,
        policy: &MergePolicy,
    ) -> Result<Vec<AnomalyInterval>> {
        let (Some(min_start), Some(max_end)) = (
            fresh.iter().map(|a| a.start_time).min(),
            fresh.iter().map(|a| a.end_time).max(),
        ) else {
            return Ok(Vec::new());
        };
        let lower = min_start.saturating_sub(policy.max_gap_ms).saturating_sub(1);
        let upper = max_end.saturating_add(policy.max_gap_ms).saturating_add(1);

        let existing = self
            .store
            .find_overlapping(alert_id, lower, upper, item_id)
            .await
            .map_err(MergeError::Store)?;
        debug!(
            alert_id,
            enumeration_item_id = ?item_id,
            fresh = fresh.len(),
            existing = existing.len(),
            "merging anomaly group"
        );

        Ok(merge(combine_and_sort(fresh, existing), policy))
    }
}
