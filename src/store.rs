// =============================================================================
// store.rs — WHERE CASES LIVE WHILE WE THINK ABOUT THEM
// =============================================================================
//
// The case store is append-only and keyed by case id. A record goes in
// once, gets classified once, and after that it's read-only. Writing to
// disk, spreadsheets or dashboards is somebody else's job; this is the
// in-memory seam they plug into.
// =============================================================================

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::debug;

use crate::error::StoreError;
use crate::models::{CaseRecord, Category, ClassificationResult};

/// Persistence seam for case records.
pub trait CaseStore: Send + Sync {
    /// Add a new record. Ids are unique.
    fn insert(&self, record: CaseRecord) -> Result<(), StoreError>;

    /// Attach a classification to an existing record, exactly once.
    fn record_classification(&self, id: &str, result: ClassificationResult) -> Result<(), StoreError>;

    fn get(&self, id: &str) -> Option<CaseRecord>;

    /// Every record, in insertion order.
    fn list(&self) -> Vec<CaseRecord>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Default)]
struct StoreInner {
    records: HashMap<String, CaseRecord>,
    order: Vec<String>,
}

/// A `CaseStore` behind a single parking_lot RwLock.
#[derive(Default)]
pub struct MemoryCaseStore {
    inner: RwLock<StoreInner>,
}

impl MemoryCaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a store from a case list, rejecting duplicate ids.
    pub fn from_records(records: impl IntoIterator<Item = CaseRecord>) -> Result<Self, StoreError> {
        let store = Self::new();
        for record in records {
            store.insert(record)?;
        }
        Ok(store)
    }

    /// How many stored records carry each category. Unclassified records
    /// without any result count as `Unclassified`.
    pub fn category_counts(&self) -> HashMap<Category, usize> {
        let inner = self.inner.read();
        let mut counts = HashMap::new();
        for record in inner.records.values() {
            *counts
                .entry(record.category().unwrap_or(Category::Unclassified))
                .or_insert(0) += 1;
        }
        counts
    }
}

impl CaseStore for MemoryCaseStore {
    fn insert(&self, record: CaseRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        if inner.records.contains_key(&record.id) {
            return Err(StoreError::Duplicate(record.id));
        }
        inner.order.push(record.id.clone());
        inner.records.insert(record.id.clone(), record);
        Ok(())
    }

    fn record_classification(&self, id: &str, result: ClassificationResult) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        let record = inner
            .records
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        debug!(id, category = %result.category, confidence = %result.confidence, "Recording classification");
        record.apply_classification(result)?;
        Ok(())
    }

    fn get(&self, id: &str) -> Option<CaseRecord> {
        self.inner.read().records.get(id).cloned()
    }

    fn list(&self) -> Vec<CaseRecord> {
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .filter_map(|id| inner.records.get(id).cloned())
            .collect()
    }

    fn len(&self) -> usize {
        self.inner.read().records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModelError;
    use crate::models::Confidence;

    fn granted() -> ClassificationResult {
        ClassificationResult::new(Category::Granted, Confidence::High, "estimar el conflicto", true)
    }

    #[test]
    fn test_insert_and_get() {
        let store = MemoryCaseStore::new();
        assert!(store.is_empty());
        store.insert(CaseRecord::new("CFT/DE/001/23", "Solar vs. REE")).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("CFT/DE/001/23").unwrap().title, "Solar vs. REE");
        assert!(store.get("missing").is_none());
    }

    #[test]
    fn test_duplicate_ids_are_rejected() {
        let store = MemoryCaseStore::new();
        store.insert(CaseRecord::new("a", "first")).unwrap();
        let err = store.insert(CaseRecord::new("a", "second")).unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(ref id) if id == "a"));
        assert_eq!(store.get("a").unwrap().title, "first");
    }

    #[test]
    fn test_classification_is_written_once() {
        let store = MemoryCaseStore::new();
        store.insert(CaseRecord::new("a", "t")).unwrap();
        store.record_classification("a", granted()).unwrap();
        assert_eq!(store.get("a").unwrap().category(), Some(Category::Granted));

        let err = store
            .record_classification("a", ClassificationResult::unclassified())
            .unwrap_err();
        assert!(matches!(err, StoreError::Model(ModelError::AlreadyClassified(_))));
        assert_eq!(store.get("a").unwrap().category(), Some(Category::Granted));
    }

    #[test]
    fn test_classifying_unknown_case() {
        let store = MemoryCaseStore::new();
        assert!(matches!(
            store.record_classification("ghost", granted()),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_list_keeps_insertion_order_and_counts() {
        let store = MemoryCaseStore::from_records(vec![
            CaseRecord::new("c", ""),
            CaseRecord::new("a", ""),
            CaseRecord::new("b", ""),
        ])
        .unwrap();
        store.record_classification("a", granted()).unwrap();

        let ids: Vec<String> = store.list().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);

        let counts = store.category_counts();
        assert_eq!(counts[&Category::Granted], 1);
        assert_eq!(counts[&Category::Unclassified], 2);
    }
}
