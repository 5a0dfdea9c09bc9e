//! Record store
//!
//! The authoritative in-memory snapshot of one entity's records. Loads are
//! identified by tokens so that a slow response which arrives after a newer
//! request was issued is discarded rather than overwriting fresher data.
//!
//! # Examples
//!
//! ```
//! use pharmatable::{RecordStore, Record, Mutation, LoadOutcome};
//!
//! let mut store = RecordStore::new("id");
//! let token = store.begin_load();
//! let outcome = store
//!     .finish_load(token, Ok(vec![Record::new().with("id", 1i64).with("name", "Aspirin")]))
//!     .unwrap();
//! assert_eq!(outcome, LoadOutcome::Replaced(1));
//!
//! store.apply_mutation(Mutation::Created(Record::new().with("id", 2i64)));
//! assert_eq!(store.len(), 2);
//! ```

use crate::error::TableError;
use crate::mutation::Mutation;
use crate::record::{Record, RecordId};
use log::{debug, warn};

/// Identifies one load request
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LoadToken(u64);

/// Load lifecycle: Idle -> Loading -> Idle | Failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    Idle,
    Loading(LoadToken),
    Failed(String),
}

/// What `finish_load` did with a response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Records were replaced; carries the new record count
    Replaced(usize),
    /// The response belonged to a superseded request and was dropped
    Stale,
}

pub struct RecordStore {
    id_field: String,
    records: Vec<Record>,
    state: LoadState,
    next_token: u64,
    /// Number of successful loads, used by callers to detect a first load
    generation: u64,
}

impl RecordStore {
    pub fn new(id_field: impl Into<String>) -> Self {
        RecordStore {
            id_field: id_field.into(),
            records: Vec::new(),
            state: LoadState::Idle,
            next_token: 0,
            generation: 0,
        }
    }

    /// Creates a store already holding `records` (e.g. server-rendered seed data)
    pub fn with_records(id_field: impl Into<String>, records: Vec<Record>) -> Self {
        let mut store = Self::new(id_field);
        store.records = records;
        store
    }

    pub fn id_field(&self) -> &str {
        &self.id_field
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn state(&self) -> &LoadState {
        &self.state
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.state, LoadState::Loading(_))
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn find(&self, id: &RecordId) -> Option<&Record> {
        self.position(id).map(|i| &self.records[i])
    }

    fn position(&self, id: &RecordId) -> Option<usize> {
        self.records
            .iter()
            .position(|r| r.id(&self.id_field).as_ref() == Some(id))
    }

    /// Starts a load. Any load still in flight is superseded: its response
    /// will be reported as `Stale` when it arrives.
    pub fn begin_load(&mut self) -> LoadToken {
        self.next_token += 1;
        let token = LoadToken(self.next_token);
        if let LoadState::Loading(previous) = self.state {
            debug!("load {:?} superseded by {:?}", previous, token);
        }
        self.state = LoadState::Loading(token);
        token
    }

    /// Completes the load identified by `token`.
    ///
    /// On success the records are replaced wholesale. On failure the previous
    /// records are kept and the error is returned. Responses for superseded
    /// tokens are ignored either way.
    pub fn finish_load(
        &mut self,
        token: LoadToken,
        result: Result<Vec<Record>, TableError>,
    ) -> Result<LoadOutcome, TableError> {
        if self.state != LoadState::Loading(token) {
            debug!("discarding stale load response {:?}", token);
            return Ok(LoadOutcome::Stale);
        }

        match result {
            Ok(records) => {
                let count = records.len();
                self.records = records;
                self.state = LoadState::Idle;
                self.generation += 1;
                Ok(LoadOutcome::Replaced(count))
            }
            Err(e) => {
                warn!("load failed, keeping {} cached records: {}", self.records.len(), e);
                self.state = LoadState::Failed(e.to_string());
                Err(e)
            }
        }
    }

    /// Applies a reconciled change. Returns true if the store changed.
    ///
    /// Updates and deletes for ids that are not present are no-ops.
    pub fn apply_mutation(&mut self, mutation: Mutation) -> bool {
        match mutation {
            Mutation::Created(record) => {
                self.records.push(record);
                true
            }
            Mutation::Updated(record) => {
                let Some(id) = record.id(&self.id_field) else {
                    warn!("ignoring update without '{}'", self.id_field);
                    return false;
                };
                match self.position(&id) {
                    Some(i) => {
                        self.records[i] = record;
                        true
                    }
                    None => {
                        debug!("update for unknown id {} ignored", id);
                        false
                    }
                }
            }
            Mutation::Deleted(id) => match self.position(&id) {
                Some(i) => {
                    self.records.remove(i);
                    true
                }
                None => {
                    debug!("delete for unknown id {} ignored", id);
                    false
                }
            },
        }
    }

    /// Next free numeric id, used when assigning ids locally in demo mode
    pub fn next_local_id(&self) -> i64 {
        self.records
            .iter()
            .filter_map(|r| r.get(&self.id_field).and_then(|v| v.as_f64()))
            .fold(0i64, |max, id| max.max(id as i64))
            .saturating_add(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::FieldValue;

    fn record(id: i64, name: &str) -> Record {
        Record::new().with("id", id).with("name", name)
    }

    fn loaded(records: Vec<Record>) -> RecordStore {
        let mut store = RecordStore::new("id");
        let token = store.begin_load();
        store.finish_load(token, Ok(records)).unwrap();
        store
    }

    #[test]
    fn test_store_load_replaces() {
        let mut store = loaded(vec![record(1, "a"), record(2, "b")]);
        assert_eq!(store.len(), 2);
        assert_eq!(store.state(), &LoadState::Idle);
        assert_eq!(store.generation(), 1);

        let token = store.begin_load();
        assert!(store.is_loading());
        let outcome = store.finish_load(token, Ok(vec![record(3, "c")])).unwrap();
        assert_eq!(outcome, LoadOutcome::Replaced(1));
        assert_eq!(store.records()[0].get("name").unwrap().as_str(), Some("c"));
    }

    #[test]
    fn test_store_failed_load_keeps_records() {
        let mut store = loaded(vec![record(1, "a")]);
        let before = store.records().to_vec();

        let token = store.begin_load();
        let err = store
            .finish_load(token, Err(TableError::Network("offline".into())))
            .unwrap_err();

        assert!(err.is_network());
        assert_eq!(store.records(), before.as_slice());
        assert!(matches!(store.state(), LoadState::Failed(_)));
        assert_eq!(store.generation(), 1);
    }

    #[test]
    fn test_store_stale_response_discarded() {
        let mut store = loaded(vec![record(1, "a")]);

        let slow = store.begin_load();
        let fast = store.begin_load();

        let outcome = store.finish_load(fast, Ok(vec![record(2, "fresh")])).unwrap();
        assert_eq!(outcome, LoadOutcome::Replaced(1));

        // The older request finishing late must not overwrite fresher data
        let outcome = store.finish_load(slow, Ok(vec![record(9, "stale")])).unwrap();
        assert_eq!(outcome, LoadOutcome::Stale);
        assert_eq!(store.records()[0].get("name").unwrap().as_str(), Some("fresh"));

        // A late failure is also ignored
        let outcome = store.finish_load(slow, Err(TableError::Network("x".into()))).unwrap();
        assert_eq!(outcome, LoadOutcome::Stale);
        assert_eq!(store.state(), &LoadState::Idle);
    }

    #[test]
    fn test_store_mutations() {
        let mut store = loaded(vec![record(1, "a"), record(2, "b")]);

        assert!(store.apply_mutation(Mutation::Created(record(3, "c"))));
        assert_eq!(store.len(), 3);

        assert!(store.apply_mutation(Mutation::Updated(
            Record::new().with("id", "2").with("name", "B")
        )));
        assert_eq!(
            store.find(&RecordId::from(2)).unwrap().get("name"),
            Some(&FieldValue::text("B"))
        );

        assert!(store.apply_mutation(Mutation::Deleted(RecordId::from(1))));
        assert_eq!(store.len(), 2);
        assert!(store.find(&RecordId::from(1)).is_none());
    }

    #[test]
    fn test_store_delete_missing_is_noop() {
        let mut store = loaded(vec![record(1, "a"), record(2, "b")]);
        assert!(!store.apply_mutation(Mutation::Deleted(RecordId::from(42))));
        assert_eq!(store.len(), 2);

        assert!(!store.apply_mutation(Mutation::Updated(record(42, "ghost"))));
        assert!(!store.apply_mutation(Mutation::Updated(Record::new().with("name", "no id"))));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_next_local_id() {
        let store = loaded(vec![record(4, "a"), Record::new().with("id", "11")]);
        assert_eq!(store.next_local_id(), 12);
        assert_eq!(RecordStore::new("id").next_local_id(), 1);

        let store = loaded(vec![record(i64::MAX, "last")]);
        assert_eq!(store.next_local_id(), i64::MAX);
    }
}
