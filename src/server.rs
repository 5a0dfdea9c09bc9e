//! HTTP server with WebSocket support for live record tables

use actix_web::{http::header, middleware, web, App, Error, HttpRequest, HttpResponse, HttpServer};
use actix_web_actors::ws;
use log::info;

use crate::config::Settings;
use crate::error::TableError;
use crate::websocket::{AppState, TableSession};

/// WebSocket endpoint handler. The upgrade request's cookies become the
/// connection's backend session.
async fn ws_index(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let cookie = req.headers().get(header::COOKIE).and_then(|v| v.to_str().ok());
    let backend = state
        .session_backend(cookie)
        .map_err(|e| actix_web::error::ErrorInternalServerError(e.to_string()))?;
    let resp = ws::start(TableSession::new(state.clone(), backend), &req, stream)?;
    Ok(resp)
}

/// Health check endpoint
async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "backend": state.backend.name(),
    }))
}

/// Start the HTTP server with WebSocket support
pub async fn run_server(settings: Settings) -> std::io::Result<()> {
    let host = settings.host().to_string();
    let port = settings.port();
    let state = AppState::new(settings)
        .map_err(|e: TableError| std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()))?;
    let state = web::Data::new(state);

    info!("pharmatable server listening on {}:{}", host, port);
    info!("websocket: ws://{}:{}/ws", host, port);
    info!("backend: {}", state.backend.name());

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(middleware::Logger::default())
            .wrap(
                actix_cors::Cors::default()
                    .allow_any_origin()
                    .allow_any_method()
                    .allow_any_header()
                    .max_age(3600),
            )
            .route("/ws", web::get().to(ws_index))
            .route("/health", web::get().to(health_check))
    })
    .bind((host.as_str(), port))?
    .run()
    .await
}
