//! WebSocket table sessions
//!
//! Each browser tab opens one socket and mounts one table at a time. The
//! actor owns that table's `TableController` and a backend bound to the
//! browser's cookies, issues backend requests on the actor context, and
//! pushes freshly rendered markup after every change. The mounting role
//! comes from the backend session, not from the client.

use actix::prelude::*;
use actix_web_actors::ws;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::api::{Backend, ListParams, RecordApi};
use crate::config::Settings;
use crate::controller::{send_write, with_timeout, Committed, Effect, PendingWrite, RowAction, TableController};
use crate::error::TableError;
use crate::messages::{ClientMessage, ServerMessage};
use crate::mutation::{MutationKind, MutationMode};
use crate::permissions::PermissionTable;
use crate::record::RecordId;
use crate::render::render_notices;
use crate::schema::EntitySchema;
use crate::session::{SessionApi, SessionEvent, SessionMonitor};
use crate::store::LoadOutcome;

/// How often heartbeat pings are sent
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
/// How long before lack of client response causes a timeout
const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared state for all WebSocket connections. `backend` is the template
/// each connection's own backend is derived from.
pub struct AppState {
    pub settings: Settings,
    pub backend: Arc<Backend>,
    pub permissions: PermissionTable,
}

impl AppState {
    pub fn new(settings: Settings) -> Result<Self, TableError> {
        let backend = Arc::new(settings.backend()?);
        let permissions = settings.permissions();
        Ok(Self {
            settings,
            backend,
            permissions,
        })
    }

    /// Backend for one connection, carrying that browser's cookies
    pub fn session_backend(&self, cookie: Option<&str>) -> Result<Arc<Backend>, TableError> {
        self.backend.for_session(cookie).map(Arc::new)
    }

    /// Role to mount as. The role reported by the backend session wins;
    /// a client-supplied role is only honoured in demo mode.
    pub fn resolve_role(&self, known: Option<String>, requested: Option<&str>) -> Result<String, TableError> {
        match known {
            Some(role) => {
                if let Some(requested) = requested.filter(|r| !r.eq_ignore_ascii_case(&role)) {
                    warn!("client asked for role '{}', session role is '{}'", requested, role);
                }
                Ok(role)
            }
            None => match requested {
                Some(requested) if self.settings.is_demo() => Ok(requested.to_string()),
                _ => Err(TableError::Application {
                    status: Some(403),
                    message: "Could not determine the role for this session".to_string(),
                }),
            },
        }
    }

    /// Builds the controller for a mounted table
    pub fn controller(&self, entity: &str, role: &str) -> Result<TableController, TableError> {
        let schema = EntitySchema::builtin(entity).ok_or_else(|| TableError::Application {
            status: Some(404),
            message: format!("Unknown table '{}'", entity),
        })?;
        let capabilities = self.permissions.capabilities_for(role);
        if !capabilities.view {
            return Err(TableError::Application {
                status: Some(403),
                message: format!("Role '{}' cannot view {}", role, schema.display_title()),
            });
        }

        let mut table = TableController::new(schema, capabilities)
            .with_mutation_mode(self.settings.mutation_mode())
            .with_request_timeout(self.settings.request_timeout())
            .with_search_debounce(self.settings.search_debounce())
            .with_formatter(self.settings.formatter());
        if let Some(size) = self.settings.page_size() {
            table = table.with_page_size(size);
        }
        Ok(table)
    }
}

/// Session monitor report, delivered to the owning socket
#[derive(Message)]
#[rtype(result = "()")]
struct SessionReport(SessionEvent);

/// WebSocket connection actor
pub struct TableSession {
    hb: Instant,
    state: actix_web::web::Data<AppState>,
    backend: Arc<Backend>,
    table: Option<TableController>,
    /// Bumped on every mount so late responses for a previous table are dropped
    mount_id: u64,
    monitor: Option<SessionMonitor>,
    search_timer: Option<SpawnHandle>,
}

impl TableSession {
    pub fn new(state: actix_web::web::Data<AppState>, backend: Arc<Backend>) -> Self {
        Self {
            hb: Instant::now(),
            state,
            backend,
            table: None,
            mount_id: 0,
            monitor: None,
            search_timer: None,
        }
    }

    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.hb) > CLIENT_TIMEOUT {
                warn!("websocket client heartbeat failed, disconnecting");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    fn send(ctx: &mut ws::WebsocketContext<Self>, msg: &ServerMessage) {
        match serde_json::to_string(msg) {
            Ok(text) => ctx.text(text),
            Err(e) => error!("failed to encode server message: {}", e),
        }
    }

    fn send_error(ctx: &mut ws::WebsocketContext<Self>, message: impl Into<String>) {
        Self::send(
            ctx,
            &ServerMessage::Error {
                message: message.into(),
            },
        );
    }

    /// Pushes the current markup followed by any queued notices
    fn render(&mut self, ctx: &mut ws::WebsocketContext<Self>) {
        let Some(table) = self.table.as_mut() else {
            return;
        };
        let rendered = ServerMessage::Rendered {
            entity: table.schema().entity().to_string(),
            title: table.schema().display_title().to_string(),
            loading: table.is_loading(),
            table: table.render(),
        };
        let notices = table.take_notices();
        Self::send(ctx, &rendered);
        for notice in notices {
            let html = render_notices(std::slice::from_ref(&notice));
            Self::send(ctx, &ServerMessage::Notice { notice, html });
        }
    }

    /// Unmounts the current table, then asks the backend who is logged in
    fn mount(&mut self, entity: String, requested: Option<String>, ctx: &mut ws::WebsocketContext<Self>) {
        self.mount_id += 1;
        self.table = None;
        if let Some(mut monitor) = self.monitor.take() {
            monitor.stop();
        }
        if let Some(handle) = self.search_timer.take() {
            ctx.cancel_future(handle);
        }

        let backend = self.backend.clone();
        let timeout = self.state.settings.request_timeout();
        let mount_id = self.mount_id;

        let fut = async move { with_timeout(timeout, backend.session_role()).await };
        ctx.spawn(fut.into_actor(self).map(move |result, act, ctx| {
            if act.mount_id != mount_id {
                return;
            }
            let known = match result {
                Ok(known) => known,
                Err(e) if e.is_unauthorized() => {
                    info!("mount of '{}' rejected, session expired", entity);
                    Self::send(ctx, &ServerMessage::SessionExpired);
                    return;
                }
                Err(e) => {
                    warn!("mount of '{}' failed, session role unavailable: {}", entity, e);
                    Self::send_error(ctx, e.to_string());
                    return;
                }
            };
            match act.state.resolve_role(known, requested.as_deref()) {
                Ok(role) => act.finish_mount(&entity, &role, ctx),
                Err(e) => {
                    warn!("mount of '{}' refused: {}", entity, e);
                    Self::send_error(ctx, e.to_string());
                }
            }
        }));
    }

    fn finish_mount(&mut self, entity: &str, role: &str, ctx: &mut ws::WebsocketContext<Self>) {
        let table = match self.state.controller(entity, role) {
            Ok(table) => table,
            Err(e) => {
                warn!("mount of '{}' as '{}' refused: {}", entity, role, e);
                Self::send_error(ctx, e.to_string());
                return;
            }
        };
        info!("mounted {} for role {}", entity, role);

        self.table = Some(table);
        self.start_monitor(ctx);
        self.load(true, ctx);
        self.render(ctx);
    }

    fn start_monitor(&mut self, ctx: &mut ws::WebsocketContext<Self>) {
        if let Some(mut previous) = self.monitor.take() {
            previous.stop();
        }
        let addr = ctx.address();
        self.monitor = Some(SessionMonitor::start(
            self.backend.clone(),
            self.state.settings.session_check_interval(),
            move |event| addr.do_send(SessionReport(event)),
        ));
    }

    fn load(&mut self, force: bool, ctx: &mut ws::WebsocketContext<Self>) {
        let Some(table) = self.table.as_mut() else {
            return;
        };
        let Some(token) = table.begin_refresh(force) else {
            return;
        };

        let backend = self.backend.clone();
        let entity = table.schema().entity().to_string();
        let timeout = table.request_timeout();
        let mount_id = self.mount_id;

        let fut = async move {
            with_timeout(timeout, backend.list(&entity, &ListParams::default()))
                .await
                .map(|page| page.records)
        };
        ctx.spawn(fut.into_actor(self).map(move |result, act, ctx| {
            if act.mount_id != mount_id {
                return;
            }
            let Some(table) = act.table.as_mut() else {
                return;
            };
            if let Ok(LoadOutcome::Stale) = table.finish_load(token, result) {
                return;
            }
            act.render(ctx);
        }));
    }

    fn apply(&mut self, effect: Effect, ctx: &mut ws::WebsocketContext<Self>) {
        match effect {
            Effect::None => {}
            Effect::Render => self.render(ctx),
            Effect::WakeAfter(delay) => {
                if let Some(handle) = self.search_timer.take() {
                    ctx.cancel_future(handle);
                }
                self.search_timer = Some(ctx.run_later(delay, |act, ctx| {
                    act.search_timer = None;
                    let Some(table) = act.table.as_mut() else {
                        return;
                    };
                    let effect = table.tick(Instant::now());
                    act.apply(effect, ctx);
                }));
            }
            Effect::Open { action, id } => self.open(action, id, ctx),
            Effect::ConfirmDelete { id, label } => {
                Self::send(ctx, &ServerMessage::ConfirmDelete { id, label });
            }
            Effect::Delete(id) => {
                let prepared = match self.table.as_ref() {
                    Some(table) => table.prepare_delete(&id),
                    None => return,
                };
                self.write(prepared, ctx);
            }
            Effect::Denied(capability) => {
                Self::send_error(
                    ctx,
                    format!("You do not have permission to {} records", capability.as_str()),
                );
            }
        }
    }

    /// Fetches the latest copy of a record for its view or edit form
    fn open(&mut self, action: RowAction, id: RecordId, ctx: &mut ws::WebsocketContext<Self>) {
        let Some(table) = self.table.as_ref() else {
            return;
        };
        let backend = self.backend.clone();
        let entity = table.schema().entity().to_string();
        let timeout = table.request_timeout();
        let mount_id = self.mount_id;

        let fetch_id = id.clone();
        let fut = async move { with_timeout(timeout, backend.get(&entity, &fetch_id)).await };
        ctx.spawn(fut.into_actor(self).map(move |result, act, ctx| {
            if act.mount_id != mount_id {
                return;
            }
            match result {
                Ok(record) => Self::send(ctx, &ServerMessage::Open { action, id, record }),
                Err(e) => {
                    if let Some(table) = act.table.as_mut() {
                        table.fail_get(&id, &e);
                    }
                    act.render(ctx);
                }
            }
        }));
    }

    fn write(&mut self, prepared: Result<PendingWrite, TableError>, ctx: &mut ws::WebsocketContext<Self>) {
        let write = match prepared {
            Ok(write) => write,
            Err(TableError::Validation(errors)) => {
                Self::send(ctx, &ServerMessage::ValidationFailed { errors });
                return;
            }
            Err(e) => {
                Self::send_error(ctx, e.to_string());
                return;
            }
        };
        let Some(table) = self.table.as_mut() else {
            return;
        };

        if table.mutation_mode() == MutationMode::LocalOnly {
            let committed = table.commit_local(write);
            self.after_commit(committed, ctx);
            return;
        }

        let backend = self.backend.clone();
        let entity = table.schema().entity().to_string();
        let timeout = table.request_timeout();
        let mount_id = self.mount_id;

        let fut = async move {
            let result = with_timeout(timeout, send_write(backend.as_ref(), &entity, &write)).await;
            (write, result)
        };
        ctx.spawn(fut.into_actor(self).map(move |(write, result), act, ctx| {
            if act.mount_id != mount_id {
                return;
            }
            let Some(table) = act.table.as_mut() else {
                return;
            };
            match result {
                Ok(returned) => {
                    let committed = table.commit(write, returned);
                    act.after_commit(committed, ctx);
                }
                Err(e) => {
                    table.fail_write(&write, &e);
                    Self::send_error(ctx, e.to_string());
                    act.render(ctx);
                }
            }
        }));
    }

    fn after_commit(&mut self, committed: Committed, ctx: &mut ws::WebsocketContext<Self>) {
        let Some(table) = self.table.as_ref() else {
            return;
        };
        match committed {
            Committed::Applied(mutation) => {
                let id = mutation.record_id(table.schema().get_id_field());
                Self::send(
                    ctx,
                    &ServerMessage::WriteSucceeded {
                        kind: mutation.kind(),
                        id,
                    },
                );
            }
            Committed::ReloadRequired => {
                Self::send(
                    ctx,
                    &ServerMessage::WriteSucceeded {
                        kind: MutationKind::Create,
                        id: None,
                    },
                );
                self.load(true, ctx);
            }
        }
        self.render(ctx);
    }

    fn handle_client_message(&mut self, msg: ClientMessage, ctx: &mut ws::WebsocketContext<Self>) {
        let msg = match msg {
            ClientMessage::Mount { entity, role } => {
                self.mount(entity, role, ctx);
                return;
            }
            other => other,
        };
        let Some(table) = self.table.as_mut() else {
            Self::send_error(ctx, "No table mounted");
            return;
        };

        match msg {
            ClientMessage::Refresh { force } => {
                self.load(force, ctx);
                self.render(ctx);
            }
            ClientMessage::Create { fields } => {
                let prepared = table.prepare_create(&fields);
                self.write(prepared, ctx);
            }
            ClientMessage::Update { id, fields } => {
                let prepared = table.prepare_update(&id, &fields);
                self.write(prepared, ctx);
            }
            other => {
                if let Some(event) = other.into_event() {
                    let effect = table.handle(event, Instant::now());
                    self.apply(effect, ctx);
                }
            }
        }
    }
}

impl Actor for TableSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.hb(ctx);
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        if let Some(mut monitor) = self.monitor.take() {
            monitor.stop();
        }
        debug!("table session closed");
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for TableSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(client_msg) => self.handle_client_message(client_msg, ctx),
                Err(e) => Self::send_error(ctx, format!("Invalid message format: {}", e)),
            },
            Ok(ws::Message::Binary(_)) => {
                debug!("ignoring binary message");
            }
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            _ => ctx.stop(),
        }
    }
}

impl Handler<SessionReport> for TableSession {
    type Result = ();

    fn handle(&mut self, msg: SessionReport, ctx: &mut Self::Context) {
        match msg.0 {
            SessionEvent::Expired => {
                Self::send(ctx, &ServerMessage::SessionExpired);
                self.table = None;
                if let Some(mut monitor) = self.monitor.take() {
                    monitor.stop();
                }
            }
            SessionEvent::CheckFailed(message) => {
                debug!("session check failed, will retry: {}", message);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::Capability;

    fn state() -> AppState {
        AppState::new(Settings {
            demo: Some(true),
            page_size: Some(3),
            ..Settings::default()
        })
        .unwrap()
    }

    #[test]
    fn test_controller_for_role() {
        let state = state();

        let table = state.controller("medicines", "pharmacist").unwrap();
        assert!(table.capabilities().allows(Capability::Edit));
        assert!(!table.capabilities().allows(Capability::Delete));
        assert_eq!(table.query().page_size, 3);
        assert_eq!(table.mutation_mode(), MutationMode::RoundTrip);
    }

    #[test]
    fn test_controller_refusals() {
        let state = state();

        let err = state.controller("prescriptions", "admin").err().unwrap();
        assert!(matches!(err, TableError::Application { status: Some(404), .. }));

        let err = state.controller("customers", "guest").err().unwrap();
        assert!(matches!(err, TableError::Application { status: Some(403), .. }));
    }

    #[test]
    fn test_resolve_role_in_demo_mode() {
        let state = state();
        assert_eq!(state.resolve_role(None, Some("cashier")).unwrap(), "cashier");
        assert_eq!(
            state.resolve_role(Some("pharmacist".into()), Some("admin")).unwrap(),
            "pharmacist"
        );
        assert!(state.resolve_role(None, None).is_err());
    }

    #[test]
    fn test_resolve_role_ignores_client_claims() {
        let state = AppState::new(Settings {
            demo: Some(false),
            api_base: Some("http://127.0.0.1:9/api/".into()),
            ..Settings::default()
        })
        .unwrap();

        assert_eq!(state.resolve_role(Some("cashier".into()), Some("admin")).unwrap(), "cashier");
        let err = state.resolve_role(None, Some("admin")).unwrap_err();
        assert!(matches!(err, TableError::Application { status: Some(403), .. }));
    }

    #[tokio::test]
    async fn test_session_backends() {
        let state = state();
        let backend = state.session_backend(Some("PHPSESSID=abc")).unwrap();
        assert!(!Arc::ptr_eq(&backend, &state.backend));
        assert_eq!(backend.session_role().await.unwrap(), None);

        let http = AppState::new(Settings {
            demo: Some(false),
            api_base: Some("http://127.0.0.1:9/api/".into()),
            ..Settings::default()
        })
        .unwrap();
        assert_eq!(http.session_backend(None).unwrap().name(), "http");
    }

    #[tokio::test]
    async fn test_demo_backend_serves_builtin_tables() {
        let state = state();
        let mut table = state.controller("customers", "admin").unwrap();
        let backend = state.session_backend(None).unwrap();
        table.load(backend.as_ref()).await.unwrap();

        let view = table.view();
        assert_eq!(view.total_count, 5);
        assert_eq!(view.rows.len(), 3);
        assert_eq!(view.total_pages, 2);
    }
}
