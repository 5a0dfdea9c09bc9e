//! Mutations - reconciled changes to a record store
//!
//! A `Mutation` describes a create, update or delete that the API has
//! acknowledged (or, in local-only demo mode, that the user submitted).
//! The store applies it in place instead of reloading the whole list.
//!
//! # Change Types
//!
//! - `Created`: a new record, appended at the end
//! - `Updated`: a record replacing the one with the same id
//! - `Deleted`: the id of a record to remove

use crate::record::{Record, RecordId};
use serde::{Deserialize, Serialize};

/// The kind of a write operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
    Create,
    Update,
    Delete,
}

/// A single change to the record store
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Created(Record),
    Updated(Record),
    Deleted(RecordId),
}

impl Mutation {
    pub fn kind(&self) -> MutationKind {
        match self {
            Mutation::Created(_) => MutationKind::Create,
            Mutation::Updated(_) => MutationKind::Update,
            Mutation::Deleted(_) => MutationKind::Delete,
        }
    }

    /// Id of the affected record, if it has one
    pub fn record_id(&self, id_field: &str) -> Option<RecordId> {
        match self {
            Mutation::Created(r) | Mutation::Updated(r) => r.id(id_field),
            Mutation::Deleted(id) => Some(id.clone()),
        }
    }
}

/// Whether writes go through the API before touching the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationMode {
    /// Every write is sent to the API and applied only after it succeeds
    #[default]
    RoundTrip,
    /// Writes are applied to the in-memory store only (demo mode)
    LocalOnly,
}
