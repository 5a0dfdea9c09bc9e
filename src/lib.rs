//! Pharmatable - record tables for pharmacy admin screens
//!
//! Every admin screen (customers, medicines, suppliers, users) is the same
//! table driven by a different `EntitySchema`: records are fetched from a
//! backend API, searched, filtered, sorted and paginated in memory, and
//! rendered to HTML fragments. Writes go back through the API and are
//! reconciled into the loaded set without a full reload.

pub mod record;
pub mod schema;
pub mod view;
pub mod error;
pub mod validate;
pub mod mutation;
pub mod store;
pub mod permissions;
pub mod debounce;
pub mod notice;
pub mod render;
pub mod api;
pub mod http;
pub mod memory;
pub mod session;
pub mod config;
pub mod controller;
pub mod messages;

pub use record::{FieldValue, Record, RecordId};
pub use schema::{ColumnDef, CounterDef, CounterRule, EntitySchema, FieldKind, FilterDef};
pub use view::{Counter, CounterValue, PageView, SortKey, SortOrder, TableQuery};
pub use error::TableError;
pub use validate::{FieldError, FieldRule, ValidationErrors};
pub use mutation::{Mutation, MutationKind, MutationMode};
pub use store::{LoadOutcome, LoadToken, RecordStore};
pub use permissions::{Capabilities, Capability, PermissionTable};
pub use debounce::Debouncer;
pub use notice::{Notice, NoticeLevel, Retry};
pub use render::{Formatter, RenderedTable, Renderer};
pub use api::{Backend, ListParams, RecordApi, RecordPage, RouteStyle};
pub use http::HttpRecordApi;
pub use memory::MemoryRecordApi;
pub use session::{SessionApi, SessionEvent, SessionMonitor, SessionStatus};
pub use config::Settings;
pub use controller::{Committed, Effect, TableController, TableEvent};

// WebSocket server modules - only when server feature is enabled
#[cfg(feature = "server")]
pub mod websocket;
#[cfg(feature = "server")]
pub mod server;
