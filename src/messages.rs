//! WebSocket message types for browser-server communication

use serde::{Deserialize, Serialize};

use crate::controller::{RowAction, TableEvent};
use crate::mutation::MutationKind;
use crate::notice::Notice;
use crate::record::{Record, RecordId};
use crate::render::RenderedTable;
use crate::validate::ValidationErrors;

/// Pagination button target: a page number or a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum PageTarget {
    Number(usize),
    Step(PageStep),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageStep {
    Prev,
    Next,
}

/// Messages sent from the browser
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Open a table view. `role` is a hint honoured only in demo mode.
    Mount {
        entity: String,
        #[serde(default)]
        role: Option<String>,
    },

    /// Search box input (debounced server-side)
    Search { term: String },

    /// Filter dropdown changed
    Filter { name: String, value: String },

    ClearFilters,

    /// Column header clicked
    Sort { field: String },

    Page { page: PageTarget },

    /// Reload the records; `force` bypasses the in-flight check
    Refresh {
        #[serde(default)]
        force: bool,
    },

    /// Row action button clicked
    Row { action: RowAction, id: RecordId },

    ConfirmDelete { id: RecordId },

    CancelDelete,

    /// Create form submitted
    Create { fields: Record },

    /// Edit form submitted
    Update { id: RecordId, fields: Record },
}

impl ClientMessage {
    /// The controller event for messages that map onto one directly
    pub fn into_event(self) -> Option<TableEvent> {
        let event = match self {
            ClientMessage::Search { term } => TableEvent::SearchInput(term),
            ClientMessage::Filter { name, value } => TableEvent::FilterChanged { name, value },
            ClientMessage::ClearFilters => TableEvent::ClearFilters,
            ClientMessage::Sort { field } => TableEvent::SortBy(field),
            ClientMessage::Page { page } => match page {
                PageTarget::Number(n) => TableEvent::GoToPage(n),
                PageTarget::Step(PageStep::Prev) => TableEvent::PrevPage,
                PageTarget::Step(PageStep::Next) => TableEvent::NextPage,
            },
            ClientMessage::Row { action, id } => TableEvent::Row { action, id },
            ClientMessage::ConfirmDelete { id } => TableEvent::DeleteConfirmed(id),
            ClientMessage::CancelDelete => TableEvent::DeleteCancelled,
            ClientMessage::Mount { .. }
            | ClientMessage::Refresh { .. }
            | ClientMessage::Create { .. }
            | ClientMessage::Update { .. } => return None,
        };
        Some(event)
    }
}

/// Messages sent to the browser
#[derive(Debug, Serialize, Clone)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Fresh markup for the mounted table
    Rendered {
        entity: String,
        title: String,
        loading: bool,
        table: RenderedTable,
    },

    /// A notification, with its markup
    Notice { notice: Notice, html: String },

    /// Ask the user to confirm a delete
    ConfirmDelete { id: RecordId, label: String },

    /// Open the view or edit form for a record
    Open {
        action: RowAction,
        id: RecordId,
        record: Record,
    },

    /// Form errors to show inline, per field
    ValidationFailed { errors: ValidationErrors },

    WriteSucceeded {
        kind: MutationKind,
        id: Option<RecordId>,
    },

    /// The login session is gone; the browser should go to the login page
    SessionExpired,

    Error { message: String },
}
