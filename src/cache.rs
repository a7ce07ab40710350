use chrono::{DateTime, Utc};

/// Last non-empty snapshot of one resource kind.
///
/// An empty fetch is indistinguishable from an API outage, so it never
/// replaces a populated snapshot.
#[derive(Debug, Clone)]
pub struct SnapshotCache<T> {
    records: Vec<T>,
    last_refreshed: Option<DateTime<Utc>>,
}

impl<T> Default for SnapshotCache<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            last_refreshed: None,
        }
    }
}

impl<T> SnapshotCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the records to use this cycle: `fresh` when it has any,
    /// otherwise whatever was cached before.
    pub fn reconcile(&mut self, fresh: Vec<T>) -> &[T] {
        if !fresh.is_empty() {
            self.records = fresh;
            self.last_refreshed = Some(Utc::now());
        }
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn last_refreshed(&self) -> Option<DateTime<Utc>> {
        self.last_refreshed
    }
}
