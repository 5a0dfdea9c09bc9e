//! Table controller
//!
//! `TableController` ties one schema's record store, query state, search
//! debouncer and permissions together. UI events go in through `handle`,
//! and a single `Effect` comes out telling the caller what to do next
//! (re-render, wake up later, open a form, ask for delete confirmation).
//!
//! Remote work is available two ways:
//!
//! - async methods (`load`, `refresh`, `create`, `update`, `delete`, `get`)
//!   that take any `RecordApi` and run the whole flow with a timeout, and
//! - two-phase methods (`begin_load`/`finish_load`, `prepare_*`/`commit`/
//!   `fail_write`) for callers such as actors that must issue the request
//!   themselves and feed the result back later.
//!
//! # Examples
//!
//! ```
//! use pharmatable::controller::{Effect, TableController, TableEvent};
//! use pharmatable::{Capabilities, EntitySchema, MemoryRecordApi, Record};
//! use std::time::Instant;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let api = MemoryRecordApi::new().with_seed(
//!     "customers",
//!     vec![Record::new().with("id", 1i64).with("name", "Jane Doe")],
//! );
//! let mut table = TableController::new(EntitySchema::customers(), Capabilities::all());
//! table.load(&api).await.unwrap();
//!
//! let effect = table.handle(TableEvent::SortBy("name".into()), Instant::now());
//! assert_eq!(effect, Effect::Render);
//! assert_eq!(table.view().total_count, 1);
//! # });
//! ```

use crate::api::{ListParams, RecordApi};
use crate::debounce::Debouncer;
use crate::error::TableError;
use crate::mutation::{Mutation, MutationKind, MutationMode};
use crate::notice::{Notice, Retry};
use crate::permissions::{Capabilities, Capability};
use crate::record::{Record, RecordId};
use crate::render::{render_notices, Formatter, RenderedTable, Renderer};
use crate::schema::EntitySchema;
use crate::store::{LoadOutcome, LoadToken, RecordStore};
use crate::validate::{validate, validate_partial};
use crate::view::{self, clamp_page, total_pages, Counter, PageView, SortKey, TableQuery};
use chrono::NaiveDate;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::{Duration, Instant};

pub const DEFAULT_SEARCH_DEBOUNCE: Duration = Duration::from_millis(300);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Per-row action buttons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowAction {
    View,
    Edit,
    Delete,
}

impl RowAction {
    pub fn capability(&self) -> Capability {
        match self {
            RowAction::View => Capability::View,
            RowAction::Edit => Capability::Edit,
            RowAction::Delete => Capability::Delete,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableEvent {
    SearchInput(String),
    FilterChanged { name: String, value: String },
    /// Clears every filter and the search term
    ClearFilters,
    SortBy(String),
    GoToPage(usize),
    NextPage,
    PrevPage,
    Row { action: RowAction, id: RecordId },
    DeleteConfirmed(RecordId),
    DeleteCancelled,
}

/// What the caller should do after an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    None,
    Render,
    /// Call `tick` after this long
    WakeAfter(Duration),
    Open { action: RowAction, id: RecordId },
    ConfirmDelete { id: RecordId, label: String },
    Delete(RecordId),
    Denied(Capability),
}

/// A validated write waiting for its remote call
#[derive(Debug, Clone, PartialEq)]
pub enum PendingWrite {
    Create(Record),
    Update(RecordId, Record),
    Delete(RecordId),
}

impl PendingWrite {
    pub fn kind(&self) -> MutationKind {
        match self {
            PendingWrite::Create(_) => MutationKind::Create,
            PendingWrite::Update(..) => MutationKind::Update,
            PendingWrite::Delete(_) => MutationKind::Delete,
        }
    }

    pub fn verb(&self) -> &'static str {
        match self {
            PendingWrite::Create(_) => "create",
            PendingWrite::Update(..) => "update",
            PendingWrite::Delete(_) => "delete",
        }
    }
}

/// Result of reconciling a successful write
#[derive(Debug, Clone, PartialEq)]
pub enum Committed {
    Applied(Mutation),
    /// The backend did not echo the new record; the list must be reloaded
    ReloadRequired,
}

/// Runs `fut`, turning expiry of `limit` into a network error
pub async fn with_timeout<T, F>(limit: Duration, fut: F) -> Result<T, TableError>
where
    F: Future<Output = Result<T, TableError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(TableError::Network(format!(
            "request timed out after {} ms",
            limit.as_millis()
        ))),
    }
}

/// Issues the remote call for a prepared write. Returns the record the
/// backend echoed, if any.
pub async fn send_write<A: RecordApi>(
    api: &A,
    entity: &str,
    write: &PendingWrite,
) -> Result<Option<Record>, TableError> {
    match write {
        PendingWrite::Create(fields) => api.create(entity, fields).await,
        PendingWrite::Update(id, fields) => api.update(entity, id, fields).await,
        PendingWrite::Delete(id) => api.delete(entity, id).await.map(|_| None),
    }
}

fn permission_error(capability: Capability) -> TableError {
    TableError::Application {
        status: Some(403),
        message: format!("You do not have permission to {} records", capability.as_str()),
    }
}

pub struct TableController {
    schema: EntitySchema,
    store: RecordStore,
    query: TableQuery,
    capabilities: Capabilities,
    search: Debouncer<String>,
    pending_delete: Option<RecordId>,
    notices: Vec<Notice>,
    mode: MutationMode,
    request_timeout: Duration,
    formatter: Formatter,
}

impl TableController {
    pub fn new(schema: EntitySchema, capabilities: Capabilities) -> Self {
        TableController {
            store: RecordStore::new(schema.get_id_field()),
            query: TableQuery::for_schema(&schema),
            schema,
            capabilities,
            search: Debouncer::new(DEFAULT_SEARCH_DEBOUNCE),
            pending_delete: None,
            notices: Vec::new(),
            mode: MutationMode::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            formatter: Formatter::default(),
        }
    }

    pub fn with_mutation_mode(mut self, mode: MutationMode) -> Self {
        if mode == MutationMode::LocalOnly {
            warn!("{}: writes will not be sent to the API", self.schema.entity());
        }
        self.mode = mode;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_search_debounce(mut self, delay: Duration) -> Self {
        self.search = Debouncer::new(delay);
        self
    }

    pub fn with_formatter(mut self, formatter: Formatter) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.query.page_size = page_size.max(1);
        self
    }

    /// Seeds the store without a request (e.g. server-provided first page)
    pub fn with_records(mut self, records: Vec<Record>) -> Self {
        self.store = RecordStore::with_records(self.schema.get_id_field(), records);
        self
    }

    pub fn schema(&self) -> &EntitySchema {
        &self.schema
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn query(&self) -> &TableQuery {
        &self.query
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn mutation_mode(&self) -> MutationMode {
        self.mode
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn pending_delete(&self) -> Option<&RecordId> {
        self.pending_delete.as_ref()
    }

    // ==================== Events ====================

    pub fn handle(&mut self, event: TableEvent, now: Instant) -> Effect {
        match event {
            TableEvent::SearchInput(text) => {
                self.search.push(text, now);
                Effect::WakeAfter(self.search.delay())
            }
            TableEvent::FilterChanged { name, value } => {
                if self.query.filters.get(&name) == Some(&value) {
                    return Effect::None;
                }
                self.query.filters.insert(name, value);
                self.reset_page()
            }
            TableEvent::ClearFilters => {
                self.search.cancel();
                if self.query.filters.is_empty() && self.query.search.is_empty() {
                    return Effect::None;
                }
                self.query.filters.clear();
                self.query.search.clear();
                self.reset_page()
            }
            TableEvent::SortBy(field) => {
                if !self.schema.is_sortable(&field) {
                    debug!("ignoring sort on unsortable field '{}'", field);
                    return Effect::None;
                }
                let key = match &self.query.sort {
                    Some(current) if current.field == field => {
                        SortKey::new(field, current.order.toggled(), current.nulls_first)
                    }
                    _ => SortKey::ascending(field),
                };
                self.query.sort = Some(key);
                self.reset_page()
            }
            TableEvent::GoToPage(page) => self.go_to_page(page),
            TableEvent::NextPage => self.go_to_page(self.query.page.saturating_add(1)),
            TableEvent::PrevPage => self.go_to_page(self.query.page.saturating_sub(1)),
            TableEvent::Row { action, id } => self.row_action(action, id),
            TableEvent::DeleteConfirmed(id) => {
                if self.pending_delete.as_ref() == Some(&id) {
                    self.pending_delete = None;
                    Effect::Delete(id)
                } else {
                    debug!("ignoring confirmation for {} (pending {:?})", id, self.pending_delete);
                    Effect::None
                }
            }
            TableEvent::DeleteCancelled => {
                self.pending_delete = None;
                Effect::None
            }
        }
    }

    /// Applies a settled search term, if any
    pub fn tick(&mut self, now: Instant) -> Effect {
        match self.search.poll(now) {
            Some(term) => {
                if term == self.query.search {
                    return Effect::None;
                }
                self.query.search = term;
                self.reset_page()
            }
            None => match self.search.remaining(now) {
                Some(left) => Effect::WakeAfter(left),
                None => Effect::None,
            },
        }
    }

    /// Applies a pending search immediately (e.g. Enter pressed)
    pub fn flush_search(&mut self) -> Effect {
        match self.search.flush() {
            Some(term) if term != self.query.search => {
                self.query.search = term;
                self.reset_page()
            }
            _ => Effect::None,
        }
    }

    fn reset_page(&mut self) -> Effect {
        self.query.page = 1;
        Effect::Render
    }

    fn go_to_page(&mut self, page: usize) -> Effect {
        let page = clamp_page(page, self.total_pages());
        if page == self.query.page {
            return Effect::None;
        }
        self.query.page = page;
        Effect::Render
    }

    fn total_pages(&self) -> usize {
        let matched = view::filter_and_sort(self.store.records(), &self.schema, &self.query).len();
        total_pages(matched, self.query.page_size)
    }

    /// Keeps the stored page inside the current result
    fn clamp(&mut self) {
        self.query.page = clamp_page(self.query.page, self.total_pages());
    }

    fn row_action(&mut self, action: RowAction, id: RecordId) -> Effect {
        let capability = action.capability();
        if !self.capabilities.allows(capability) {
            warn!("{} on {} {} denied", capability.as_str(), self.schema.entity(), id);
            return Effect::Denied(capability);
        }
        let Some(record) = self.store.find(&id) else {
            debug!("row action for unknown id {}", id);
            return Effect::None;
        };

        match action {
            RowAction::View | RowAction::Edit => Effect::Open { action, id },
            RowAction::Delete => {
                let label = record
                    .get(self.schema.get_label_field())
                    .map(|v| v.to_string())
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or_else(|| id.to_string());
                self.pending_delete = Some(id.clone());
                Effect::ConfirmDelete { id, label }
            }
        }
    }

    // ==================== Derived state ====================

    pub fn view(&self) -> PageView<'_> {
        view::apply(self.store.records(), &self.schema, &self.query)
    }

    pub fn counters(&self, today: NaiveDate) -> Vec<Counter> {
        view::summarize(self.store.records(), &self.schema, today)
    }

    pub fn render_at(&self, today: NaiveDate) -> RenderedTable {
        let renderer = Renderer::new(&self.schema, &self.formatter, self.capabilities);
        renderer.render(&self.view(), &self.query, &self.counters(today))
    }

    pub fn render(&self) -> RenderedTable {
        self.render_at(chrono::Local::now().date_naive())
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    pub fn render_notices(&self) -> String {
        render_notices(&self.notices)
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    pub fn push_notice(&mut self, notice: Notice) {
        self.notices.push(notice);
    }

    // ==================== Loading ====================

    pub fn is_loading(&self) -> bool {
        self.store.is_loading()
    }

    pub fn begin_load(&mut self) -> LoadToken {
        self.store.begin_load()
    }

    /// Starts a refresh unless one is already in flight (or `force`)
    pub fn begin_refresh(&mut self, force: bool) -> Option<LoadToken> {
        if self.store.is_loading() && !force {
            debug!("{}: refresh already in flight", self.schema.entity());
            return None;
        }
        Some(self.store.begin_load())
    }

    /// Completes a load. Success shows the first page; a failure keeps the
    /// records and page as they were and raises a notice with a retry.
    pub fn finish_load(
        &mut self,
        token: LoadToken,
        result: Result<Vec<Record>, TableError>,
    ) -> Result<LoadOutcome, TableError> {
        match self.store.finish_load(token, result) {
            Ok(LoadOutcome::Replaced(count)) => {
                info!("{}: loaded {} records", self.schema.entity(), count);
                self.query.page = 1;
                Ok(LoadOutcome::Replaced(count))
            }
            Ok(LoadOutcome::Stale) => Ok(LoadOutcome::Stale),
            Err(e) => {
                error!("{}: load failed: {}", self.schema.entity(), e);
                let context = format!("Failed to load {}", self.schema.display_title().to_lowercase());
                self.notices.push(Notice::read_failed(&context, &e, Retry::Reload));
                Err(e)
            }
        }
    }

    pub async fn load<A: RecordApi>(&mut self, api: &A) -> Result<LoadOutcome, TableError> {
        let token = self.begin_load();
        let result = self.fetch_all(api).await;
        self.finish_load(token, result)
    }

    /// Reloads unless a load is already in flight. Returns `None` when the
    /// refresh was suppressed.
    pub async fn refresh<A: RecordApi>(
        &mut self,
        api: &A,
        force: bool,
    ) -> Result<Option<LoadOutcome>, TableError> {
        let Some(token) = self.begin_refresh(force) else {
            return Ok(None);
        };
        let result = self.fetch_all(api).await;
        self.finish_load(token, result).map(Some)
    }

    async fn fetch_all<A: RecordApi>(&self, api: &A) -> Result<Vec<Record>, TableError> {
        let params = ListParams::default();
        with_timeout(self.request_timeout, api.list(self.schema.entity(), &params))
            .await
            .map(|page| page.records)
    }

    /// Fetches a single record (for a view or edit form)
    pub async fn get<A: RecordApi>(&mut self, api: &A, id: &RecordId) -> Result<Record, TableError> {
        let result = with_timeout(self.request_timeout, api.get(self.schema.entity(), id)).await;
        if let Err(e) = &result {
            self.fail_get(id, e);
        }
        result
    }

    pub fn fail_get(&mut self, id: &RecordId, error: &TableError) {
        error!("{}: failed to load {}: {}", self.schema.entity(), id, error);
        self.notices.push(Notice::read_failed(
            "Failed to load record",
            error,
            Retry::Get { id: id.clone() },
        ));
    }

    // ==================== Writes ====================

    fn require(&self, capability: Capability) -> Result<(), TableError> {
        if self.capabilities.allows(capability) {
            Ok(())
        } else {
            warn!("{} on {} denied", capability.as_str(), self.schema.entity());
            Err(permission_error(capability))
        }
    }

    fn strip_id(&self, fields: &Record) -> Record {
        let mut fields = fields.clone();
        fields.remove(self.schema.get_id_field());
        fields
    }

    /// Checks permission and validates a new record. Validation failures
    /// are returned without raising a notice; they belong inline in the form.
    pub fn prepare_create(&self, fields: &Record) -> Result<PendingWrite, TableError> {
        self.require(Capability::Create)?;
        validate(&self.schema, fields).map_err(|e| {
            warn!("{}: create blocked by validation: {}", self.schema.entity(), e);
            TableError::Validation(e)
        })?;
        Ok(PendingWrite::Create(self.strip_id(fields)))
    }

    pub fn prepare_update(&self, id: &RecordId, fields: &Record) -> Result<PendingWrite, TableError> {
        self.require(Capability::Edit)?;
        validate_partial(&self.schema, fields).map_err(|e| {
            warn!("{}: update of {} blocked by validation: {}", self.schema.entity(), id, e);
            TableError::Validation(e)
        })?;
        Ok(PendingWrite::Update(id.clone(), self.strip_id(fields)))
    }

    pub fn prepare_delete(&self, id: &RecordId) -> Result<PendingWrite, TableError> {
        self.require(Capability::Delete)?;
        Ok(PendingWrite::Delete(id.clone()))
    }

    /// Reconciles a write the backend accepted. `returned` is the record the
    /// backend echoed, if any.
    pub fn commit(&mut self, write: PendingWrite, returned: Option<Record>) -> Committed {
        let id_field = self.schema.get_id_field().to_string();
        let committed = match write {
            PendingWrite::Create(mut record) => match returned {
                Some(echoed) if echoed.id(&id_field).is_some() => {
                    record.merge(&echoed);
                    Committed::Applied(Mutation::Created(record))
                }
                _ => Committed::ReloadRequired,
            },
            PendingWrite::Update(id, fields) => {
                let mut record = self.store.find(&id).cloned().unwrap_or_default();
                record.merge(&fields);
                if let Some(echoed) = returned {
                    record.merge(&echoed);
                }
                if record.id(&id_field).is_none() {
                    record.set(id_field.clone(), id.as_str());
                }
                Committed::Applied(Mutation::Updated(record))
            }
            PendingWrite::Delete(id) => Committed::Applied(Mutation::Deleted(id)),
        };

        if let Committed::Applied(mutation) = &committed {
            let kind = mutation.kind();
            self.store.apply_mutation(mutation.clone());
            self.clamp();
            self.notices.push(Notice::success(success_message(kind)));
        } else {
            self.notices.push(Notice::success(success_message(MutationKind::Create)));
        }
        committed
    }

    /// Applies a write to the store only, assigning an id to new records
    pub fn commit_local(&mut self, write: PendingWrite) -> Committed {
        warn!(
            "{}: local-only {}, not sent to the API",
            self.schema.entity(),
            write.verb()
        );
        let returned = match &write {
            PendingWrite::Create(fields) => {
                let mut record = fields.clone();
                record.set(self.schema.get_id_field().to_string(), self.store.next_local_id());
                Some(record)
            }
            _ => None,
        };
        self.commit(write, returned)
    }

    /// Records a failed write. The store is left untouched.
    pub fn fail_write(&mut self, write: &PendingWrite, error: &TableError) {
        error!("{}: {} failed: {}", self.schema.entity(), write.verb(), error);
        let context = format!("Failed to {} record", write.verb());
        self.notices.push(Notice::write_failed(&context, error));
    }

    async fn execute<A: RecordApi>(&mut self, api: &A, write: PendingWrite) -> Result<Committed, TableError> {
        if self.mode == MutationMode::LocalOnly {
            return Ok(self.commit_local(write));
        }

        let result = with_timeout(
            self.request_timeout,
            send_write(api, self.schema.entity(), &write),
        )
        .await;

        match result {
            Ok(returned) => {
                let committed = self.commit(write, returned);
                if committed == Committed::ReloadRequired {
                    // a failed reload raises its own notice
                    let _ = self.load(api).await;
                }
                Ok(committed)
            }
            Err(e) => {
                self.fail_write(&write, &e);
                Err(e)
            }
        }
    }

    pub async fn create<A: RecordApi>(&mut self, api: &A, fields: &Record) -> Result<Committed, TableError> {
        let write = self.prepare_create(fields)?;
        self.execute(api, write).await
    }

    pub async fn update<A: RecordApi>(
        &mut self,
        api: &A,
        id: &RecordId,
        fields: &Record,
    ) -> Result<Committed, TableError> {
        let write = self.prepare_update(id, fields)?;
        self.execute(api, write).await
    }

    pub async fn delete<A: RecordApi>(&mut self, api: &A, id: &RecordId) -> Result<Committed, TableError> {
        let write = self.prepare_delete(id)?;
        self.execute(api, write).await
    }
}

fn success_message(kind: MutationKind) -> &'static str {
    match kind {
        MutationKind::Create => "Record created successfully",
        MutationKind::Update => "Record updated successfully",
        MutationKind::Delete => "Record deleted successfully",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::RecordPage;
    use crate::memory::MemoryRecordApi;
    use crate::notice::NoticeLevel;
    use crate::permissions::PermissionTable;
    use crate::record::FieldValue;
    use crate::store::LoadState;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn customers(n: usize) -> Vec<Record> {
        (1..=n)
            .map(|i| {
                Record::new()
                    .with("id", i as i64)
                    .with("name", format!("Customer {:02}", i))
                    .with("email", format!("c{}@example.com", i))
                    .with("status", if i % 3 == 0 { "VIP" } else { "Active" })
            })
            .collect()
    }

    fn seeded(n: usize) -> MemoryRecordApi {
        MemoryRecordApi::new().with_seed("customers", customers(n))
    }

    fn controller() -> TableController {
        TableController::new(EntitySchema::customers(), Capabilities::all())
    }

    /// Wraps the memory backend with switchable failures, latency and echo
    struct FlakyApi {
        inner: MemoryRecordApi,
        fail_reads: AtomicBool,
        fail_writes: AtomicBool,
        echo: bool,
        delay: Option<Duration>,
        writes: AtomicUsize,
    }

    impl FlakyApi {
        fn new(inner: MemoryRecordApi) -> Self {
            FlakyApi {
                inner,
                fail_reads: AtomicBool::new(false),
                fail_writes: AtomicBool::new(false),
                echo: true,
                delay: None,
                writes: AtomicUsize::new(0),
            }
        }

        async fn pause(&self) {
            if let Some(d) = self.delay {
                tokio::time::sleep(d).await;
            }
        }

        fn write_check(&self) -> Result<(), TableError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            if self.fail_writes.load(Ordering::SeqCst) {
                Err(TableError::application("Email already exists"))
            } else {
                Ok(())
            }
        }
    }

    impl RecordApi for FlakyApi {
        async fn list(&self, entity: &str, params: &ListParams) -> Result<RecordPage, TableError> {
            self.pause().await;
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(TableError::Network("connection refused".into()));
            }
            self.inner.list(entity, params).await
        }

        async fn get(&self, entity: &str, id: &RecordId) -> Result<Record, TableError> {
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(TableError::Network("connection refused".into()));
            }
            self.inner.get(entity, id).await
        }

        async fn create(&self, entity: &str, fields: &Record) -> Result<Option<Record>, TableError> {
            self.write_check()?;
            let created = self.inner.create(entity, fields).await?;
            Ok(created.filter(|_| self.echo))
        }

        async fn update(
            &self,
            entity: &str,
            id: &RecordId,
            fields: &Record,
        ) -> Result<Option<Record>, TableError> {
            self.write_check()?;
            let updated = self.inner.update(entity, id, fields).await?;
            Ok(updated.filter(|_| self.echo))
        }

        async fn delete(&self, entity: &str, id: &RecordId) -> Result<(), TableError> {
            self.write_check()?;
            self.inner.delete(entity, id).await
        }
    }

    fn names(table: &TableController) -> Vec<String> {
        table
            .view()
            .rows
            .iter()
            .map(|r| r.get("name").map(|v| v.to_string()).unwrap_or_default())
            .collect()
    }

    #[tokio::test]
    async fn test_load_and_paginate() {
        let api = seeded(25);
        let mut table = controller();

        assert_eq!(table.load(&api).await.unwrap(), LoadOutcome::Replaced(25));
        let view = table.view();
        assert_eq!(view.rows.len(), 10);
        assert_eq!(view.total_pages, 3);

        let now = Instant::now();
        assert_eq!(table.handle(TableEvent::GoToPage(3), now), Effect::Render);
        assert_eq!(table.view().rows.len(), 5);
        assert_eq!(table.handle(TableEvent::NextPage, now), Effect::None);
        assert_eq!(table.handle(TableEvent::GoToPage(99), now), Effect::None);
        assert_eq!(table.query().page, 3);
        assert_eq!(table.handle(TableEvent::PrevPage, now), Effect::Render);
        assert_eq!(table.query().page, 2);
    }

    #[tokio::test]
    async fn test_search_is_debounced() {
        let api = seeded(25);
        let mut table = controller();
        table.load(&api).await.unwrap();
        table.handle(TableEvent::GoToPage(2), Instant::now());

        let start = Instant::now();
        assert_eq!(
            table.handle(TableEvent::SearchInput("customer 0".into()), start),
            Effect::WakeAfter(DEFAULT_SEARCH_DEBOUNCE)
        );
        table.handle(
            TableEvent::SearchInput("customer 1".into()),
            start + Duration::from_millis(100),
        );

        // Not settled yet: still the unfiltered second page
        assert!(matches!(
            table.tick(start + Duration::from_millis(300)),
            Effect::WakeAfter(_)
        ));
        assert_eq!(table.view().total_count, 25);

        assert_eq!(table.tick(start + Duration::from_millis(400)), Effect::Render);
        assert_eq!(table.query().search, "customer 1");
        assert_eq!(table.query().page, 1);
        assert_eq!(table.view().total_count, 10);
        assert_eq!(table.tick(start + Duration::from_secs(5)), Effect::None);
    }

    #[tokio::test]
    async fn test_filter_sort_reset_page() {
        let api = seeded(25);
        let mut table = controller();
        table.load(&api).await.unwrap();
        let now = Instant::now();

        table.handle(TableEvent::GoToPage(3), now);
        let effect = table.handle(
            TableEvent::FilterChanged {
                name: "status".into(),
                value: "VIP".into(),
            },
            now,
        );
        assert_eq!(effect, Effect::Render);
        assert_eq!(table.query().page, 1);
        assert_eq!(table.view().total_count, 8);
        assert!(table
            .view()
            .rows
            .iter()
            .all(|r| r.get("status") == Some(&FieldValue::text("VIP"))));

        // Same value again is not a state change
        let effect = table.handle(
            TableEvent::FilterChanged {
                name: "status".into(),
                value: "VIP".into(),
            },
            now,
        );
        assert_eq!(effect, Effect::None);

        // Customers default to name ascending; sorting by name again flips it
        assert_eq!(table.handle(TableEvent::SortBy("name".into()), now), Effect::Render);
        assert_eq!(table.query().sort, Some(SortKey::descending("name")));
        assert_eq!(names(&table)[0], "Customer 24");

        assert_eq!(table.handle(TableEvent::SortBy("phone".into()), now), Effect::None);

        assert_eq!(table.handle(TableEvent::ClearFilters, now), Effect::Render);
        assert_eq!(table.view().total_count, 25);
        assert_eq!(table.handle(TableEvent::ClearFilters, now), Effect::None);
    }

    #[tokio::test]
    async fn test_failed_load_keeps_records_and_page() {
        let api = FlakyApi::new(seeded(25));
        let mut table = controller();
        table.load(&api).await.unwrap();
        table.handle(TableEvent::GoToPage(2), Instant::now());
        let before = table.store().records().to_vec();

        api.fail_reads.store(true, Ordering::SeqCst);
        let err = table.load(&api).await.unwrap_err();

        assert!(err.is_network());
        assert_eq!(table.store().records(), before.as_slice());
        assert_eq!(table.query().page, 2);
        assert!(matches!(table.store().state(), LoadState::Failed(_)));

        let notices = table.take_notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].level, NoticeLevel::Error);
        assert_eq!(notices[0].retry, Some(Retry::Reload));
        assert!(notices[0].message.starts_with("Failed to load customers"));
        assert!(table.notices().is_empty());
    }

    #[tokio::test]
    async fn test_stale_load_is_discarded() {
        let api = seeded(3);
        let mut table = controller();

        let slow = table.begin_load();
        let fast = table.begin_load();

        let fresh = api.list("customers", &ListParams::default()).await.map(|p| p.records);
        assert_eq!(table.finish_load(fast, fresh).unwrap(), LoadOutcome::Replaced(3));

        let outcome = table.finish_load(slow, Ok(customers(20))).unwrap();
        assert_eq!(outcome, LoadOutcome::Stale);
        assert_eq!(table.store().len(), 3);
    }

    #[tokio::test]
    async fn test_refresh_suppressed_while_loading() {
        let api = seeded(3);
        let mut table = controller();

        let token = table.begin_refresh(false).unwrap();
        assert_eq!(table.begin_refresh(false), None);
        assert_eq!(table.refresh(&api, false).await.unwrap(), None);

        // Forcing supersedes the in-flight load
        assert_eq!(
            table.refresh(&api, true).await.unwrap(),
            Some(LoadOutcome::Replaced(3))
        );
        assert_eq!(table.finish_load(token, Ok(vec![])).unwrap(), LoadOutcome::Stale);
        assert_eq!(table.store().len(), 3);
    }

    #[tokio::test]
    async fn test_request_timeout_is_network_error() {
        let mut api = FlakyApi::new(seeded(3));
        api.delay = Some(Duration::from_millis(200));
        let mut table = controller().with_request_timeout(Duration::from_millis(20));

        let err = table.load(&api).await.unwrap_err();
        assert!(err.is_network());
        assert!(err.to_string().contains("timed out"));
        assert!(table.store().is_empty());
    }

    #[tokio::test]
    async fn test_delete_requires_confirmation() {
        let api = seeded(12);
        let mut table = controller();
        table.load(&api).await.unwrap();
        let now = Instant::now();
        let id = RecordId::from(11);

        // Go to the last page, which holds customers 11 and 12
        table.handle(TableEvent::GoToPage(2), now);

        let effect = table.handle(
            TableEvent::Row {
                action: RowAction::Delete,
                id: id.clone(),
            },
            now,
        );
        assert_eq!(
            effect,
            Effect::ConfirmDelete {
                id: id.clone(),
                label: "Customer 11".into()
            }
        );

        // Confirming a different id does nothing
        assert_eq!(
            table.handle(TableEvent::DeleteConfirmed(RecordId::from(1)), now),
            Effect::None
        );
        assert_eq!(
            table.handle(TableEvent::DeleteConfirmed(id.clone()), now),
            Effect::Delete(id.clone())
        );
        assert_eq!(table.pending_delete(), None);

        table.delete(&api, &id).await.unwrap();
        assert!(table.store().find(&id).is_none());
        assert_eq!(api.count("customers"), 11);
        assert_eq!(table.query().page, 2);

        // Removing the last row of the last page moves back a page
        table.delete(&api, &RecordId::from(12)).await.unwrap();
        assert_eq!(table.query().page, 1);
    }

    #[tokio::test]
    async fn test_delete_cancelled() {
        let mut table = controller().with_records(customers(2));
        let now = Instant::now();
        let id = RecordId::from(1);

        table.handle(
            TableEvent::Row {
                action: RowAction::Delete,
                id: id.clone(),
            },
            now,
        );
        assert_eq!(table.handle(TableEvent::DeleteCancelled, now), Effect::None);
        assert_eq!(table.handle(TableEvent::DeleteConfirmed(id), now), Effect::None);
        assert_eq!(table.store().len(), 2);
    }

    #[tokio::test]
    async fn test_row_actions_follow_permissions() {
        let caps = PermissionTable::pharmacy_defaults().capabilities_for("cashier");
        let mut table =
            TableController::new(EntitySchema::customers(), caps).with_records(customers(2));
        let now = Instant::now();

        assert_eq!(
            table.handle(
                TableEvent::Row {
                    action: RowAction::View,
                    id: RecordId::from(1)
                },
                now
            ),
            Effect::Open {
                action: RowAction::View,
                id: RecordId::from(1)
            }
        );
        assert_eq!(
            table.handle(
                TableEvent::Row {
                    action: RowAction::Delete,
                    id: RecordId::from(1)
                },
                now
            ),
            Effect::Denied(Capability::Delete)
        );
        assert_eq!(
            table.handle(
                TableEvent::Row {
                    action: RowAction::View,
                    id: RecordId::from(77)
                },
                now
            ),
            Effect::None
        );

        let api = seeded(2);
        let err = table.delete(&api, &RecordId::from(1)).await.unwrap_err();
        assert!(matches!(err, TableError::Application { status: Some(403), .. }));
        assert_eq!(api.count("customers"), 2);
    }

    #[tokio::test]
    async fn test_validation_blocks_request() {
        let api = FlakyApi::new(seeded(2));
        let mut table = controller();
        table.load(&api).await.unwrap();

        let form = Record::new().with("name", "").with("email", "not-an-email");
        let err = table.create(&api, &form).await.unwrap_err();

        match err {
            TableError::Validation(errors) => {
                assert_eq!(errors.for_field("name"), Some("Name is required"));
                assert_eq!(
                    errors.for_field("email"),
                    Some("Please enter a valid email address")
                );
            }
            other => panic!("expected validation error, got {:?}", other),
        }
        assert_eq!(api.writes.load(Ordering::SeqCst), 0);
        assert_eq!(table.store().len(), 2);
        assert!(table.notices().is_empty());
    }

    #[tokio::test]
    async fn test_create_and_update_round_trip() {
        let api = seeded(2);
        let mut table = controller();
        table.load(&api).await.unwrap();

        let form = Record::new()
            .with("name", "Mei Lin")
            .with("email", "mei@example.com")
            .with("status", "Active");
        let committed = table.create(&api, &form).await.unwrap();
        let Committed::Applied(Mutation::Created(record)) = committed else {
            panic!("expected created record");
        };
        assert_eq!(record.id("id"), Some(RecordId::from(3)));
        assert_eq!(table.store().len(), 3);

        table
            .update(&api, &RecordId::from(3), &Record::new().with("status", "VIP"))
            .await
            .unwrap();
        let stored = table.store().find(&RecordId::from(3)).unwrap();
        assert_eq!(stored.get("status"), Some(&FieldValue::text("VIP")));
        assert_eq!(stored.get("name"), Some(&FieldValue::text("Mei Lin")));

        let levels: Vec<NoticeLevel> = table.take_notices().iter().map(|n| n.level).collect();
        assert_eq!(levels, vec![NoticeLevel::Success, NoticeLevel::Success]);
    }

    #[tokio::test]
    async fn test_create_without_echo_reloads() {
        let mut api = FlakyApi::new(seeded(2));
        api.echo = false;
        let mut table = controller();
        table.load(&api).await.unwrap();

        let form = Record::new().with("name", "Amina Yusuf");
        let committed = table.create(&api, &form).await.unwrap();
        assert_eq!(committed, Committed::ReloadRequired);
        assert_eq!(table.store().len(), 3);
        assert_eq!(table.store().generation(), 2);

        // Update without echo merges the submitted fields
        table
            .update(&api, &RecordId::from(1), &Record::new().with("status", "Inactive"))
            .await
            .unwrap();
        let stored = table.store().find(&RecordId::from(1)).unwrap();
        assert_eq!(stored.get("status"), Some(&FieldValue::text("Inactive")));
        assert_eq!(stored.get("name"), Some(&FieldValue::text("Customer 01")));
    }

    #[tokio::test]
    async fn test_failed_write_leaves_store_unchanged() {
        let api = FlakyApi::new(seeded(2));
        let mut table = controller();
        table.load(&api).await.unwrap();
        let before = table.store().records().to_vec();

        api.fail_writes.store(true, Ordering::SeqCst);
        let err = table
            .update(&api, &RecordId::from(1), &Record::new().with("email", "dup@example.com"))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Email already exists");
        assert_eq!(table.store().records(), before.as_slice());
        let notices = table.take_notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].level, NoticeLevel::Error);
        assert_eq!(notices[0].retry, None);
    }

    #[tokio::test]
    async fn test_local_only_mode_skips_api() {
        let api = FlakyApi::new(seeded(4));
        let mut table = controller().with_mutation_mode(MutationMode::LocalOnly);
        table.load(&api).await.unwrap();

        let form = Record::new().with("name", "Walk-in");
        table.create(&api, &form).await.unwrap();
        table.delete(&api, &RecordId::from(2)).await.unwrap();

        assert_eq!(api.writes.load(Ordering::SeqCst), 0);
        assert_eq!(api.inner.count("customers"), 4);
        assert_eq!(table.store().len(), 4);
        assert!(table.store().find(&RecordId::from(5)).is_some());
        assert!(table.store().find(&RecordId::from(2)).is_none());
    }

    #[tokio::test]
    async fn test_get_failure_offers_retry() {
        let api = FlakyApi::new(seeded(2));
        let mut table = controller();

        assert!(table.get(&api, &RecordId::from(1)).await.is_ok());

        api.fail_reads.store(true, Ordering::SeqCst);
        assert!(table.get(&api, &RecordId::from(1)).await.is_err());
        assert_eq!(
            table.notices()[0].retry,
            Some(Retry::Get {
                id: RecordId::from(1)
            })
        );
    }

    #[tokio::test]
    async fn test_render_reflects_state() {
        let api = seeded(25);
        let mut table = controller();
        table.load(&api).await.unwrap();
        let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();

        let first = table.render_at(today);
        assert_eq!(first, table.render_at(today));
        assert!(first.pagination.contains("Showing 1\u{2013}10 of 25"));
        assert!(first.summary.contains("Total Customers"));

        table.handle(TableEvent::NextPage, Instant::now());
        let second = table.render_at(today);
        assert!(second.pagination.contains("Showing 11\u{2013}20 of 25"));
        assert_eq!(first.header, second.header);
    }
}
