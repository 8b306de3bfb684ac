//! Storage collaborator for anomalies.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;

use vigil_core::AnomalyInterval;

/// Where merged anomalies live between evaluations.
#[async_trait::async_trait]
pub trait AnomalyStore: Send + Sync {
    /// Stored anomalies of `alert_id` overlapping `[start, end]`, restricted to
    /// one enumeration item (`None` = anomalies without an item).
    async fn find_overlapping(
        &self,
        alert_id: i64,
        start: i64,
        end: i64,
        enumeration_item_id: Option<i64>,
    ) -> anyhow::Result<Vec<AnomalyInterval>>;

    /// Insert or update `anomaly` and its children. Returns the stored id.
    async fn persist(&self, anomaly: &AnomalyInterval) -> anyhow::Result<i64>;
}

/// Process-local store keyed by id. Children are kept inside their parent
/// record and are never returned on their own.
#[derive(Debug, Default)]
pub struct InMemoryAnomalyStore {
    records: RwLock<BTreeMap<i64, AnomalyInterval>>,
    next_id: AtomicI64,
}

impl InMemoryAnomalyStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Every stored parent, by id.
    pub fn all(&self) -> Vec<AnomalyInterval> {
        match self.records.read() {
            Ok(guard) => guard.values().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().values().cloned().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|g| g.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl AnomalyStore for InMemoryAnomalyStore {
    async fn find_overlapping(
        &self,
        alert_id: i64,
        start: i64,
        end: i64,
        enumeration_item_id: Option<i64>,
    ) -> anyhow::Result<Vec<AnomalyInterval>> {
        let records = self
            .records
            .read()
            .map_err(|_| anyhow::anyhow!("anomaly store lock poisoned"))?;
        Ok(records
            .values()
            .filter(|a| a.alert_id == Some(alert_id))
            .filter(|a| a.enumeration_item_id == enumeration_item_id)
            .filter(|a| a.start_time <= end && a.end_time >= start)
            .cloned()
            .collect())
    }

    async fn persist(&self, anomaly: &AnomalyInterval) -> anyhow::Result<i64> {
        let mut record = anomaly.clone();
        let id = record.id.unwrap_or_else(|| self.allocate());
        record.id = Some(id);
        record.is_child = false;
        let absorbed = std::mem::take(&mut record.absorbed_ids);
        for child in &mut record.children {
            if child.id.is_none() {
                child.id = Some(self.allocate());
            }
            child.is_child = true;
            child.alert_id = record.alert_id;
        }

        let mut records = self
            .records
            .write()
            .map_err(|_| anyhow::anyhow!("anomaly store lock poisoned"))?;
        // Stored intervals folded into this one: either now its children or
        // parents whose children it adopted.
        let folded = record.children.iter().filter_map(|c| c.id).chain(absorbed);
        for folded_id in folded.filter(|f| *f != id) {
            records.remove(&folded_id);
        }
        records.insert(id, record);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn persist_assigns_ids_and_flags_children() {
        let store = InMemoryAnomalyStore::new();
        let mut parent = AnomalyInterval::new(0, 10);
        parent.alert_id = Some(1);
        parent.children.push(AnomalyInterval::new(0, 5));

        let id = store.persist(&parent).await.unwrap();

        let stored = store.all();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, Some(id));
        assert!(stored[0].children[0].is_child);
        assert!(stored[0].children[0].id.is_some());
    }

    #[tokio::test]
    async fn find_overlapping_scopes_by_alert_item_and_range() {
        let store = InMemoryAnomalyStore::new();
        let mut a = AnomalyInterval::new(0, 10);
        a.alert_id = Some(1);
        let mut b = a.clone();
        b.enumeration_item_id = Some(5);
        let mut c = AnomalyInterval::new(100, 110);
        c.alert_id = Some(1);
        let mut d = AnomalyInterval::new(0, 10);
        d.alert_id = Some(2);
        for x in [&a, &b, &c, &d] {
            store.persist(x).await.unwrap();
        }

        let hits = store.find_overlapping(1, 5, 50, None).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].start_time, 0);

        let hits = store.find_overlapping(1, 0, 200, Some(5)).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].enumeration_item_id, Some(5));
    }

    #[tokio::test]
    async fn absorbed_record_is_replaced_by_parent() {
        let store = InMemoryAnomalyStore::new();
        let mut old = AnomalyInterval::new(10, 20);
        old.alert_id = Some(1);
        let old_id = store.persist(&old).await.unwrap();

        let mut parent = AnomalyInterval::new(0, 20);
        parent.alert_id = Some(1);
        parent.children.push(old.with_id(old_id));
        store.persist(&parent).await.unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.all()[0].start_time, 0);
    }

    #[tokio::test]
    async fn absorbed_parent_record_is_retired() {
        let store = InMemoryAnomalyStore::new();
        let mut old = AnomalyInterval::new(10, 20);
        old.alert_id = Some(1);
        old.children.push(AnomalyInterval::new(10, 15));
        let old_id = store.persist(&old).await.unwrap();

        let mut parent = AnomalyInterval::new(0, 20);
        parent.alert_id = Some(1);
        parent.absorbed_ids.push(old_id);
        let id = store.persist(&parent).await.unwrap();

        let stored = store.all();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, Some(id));
        assert!(stored[0].absorbed_ids.is_empty());
    }
}
