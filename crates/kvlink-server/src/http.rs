//! HTTP transport: one route per command, plus `/module` and `/health`.
//!
//! The host runs in a browser, so every route answers cross-origin requests.

use crate::dispatch::Dispatcher;
use crate::registry::Command;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{MethodFilter, get, on};
use axum::{Json, Router};
use kvlink_core::{Envelope, Method, ModuleDescriptor, PRECONDITION_FAILED, Request};
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

#[derive(Clone)]
struct AppState {
    dispatcher: Dispatcher,
    module: Arc<ModuleDescriptor>,
}

/// Build the router for every command in the dispatcher's registry.
pub fn router(dispatcher: Dispatcher, module: ModuleDescriptor) -> Router {
    let mut app = Router::new()
        .route("/module", get(module_descriptor))
        .route("/descriptor.json", get(module_descriptor))
        .route("/health", get(health));

    for command in dispatcher.registry().iter() {
        tracing::debug!("Mounting {} at {}", command.name, command.route);
        app = mount(app, command);
    }

    app.with_state(AppState {
        dispatcher,
        module: Arc::new(module),
    })
    .layer(CorsLayer::permissive())
}

fn mount(app: Router<AppState>, command: &Command) -> Router<AppState> {
    let filter = method_filter(command.route.method);
    let name = command.name.clone();

    // Path extraction fails on routes without captures, so only ask for it
    // where the route has some.
    let method_router = if command.route.path.contains('{') {
        on(
            filter,
            move |State(state): State<AppState>,
                  Path(path): Path<HashMap<String, String>>,
                  Query(query): Query<HashMap<String, String>>,
                  body: Bytes| {
                let name = name.clone();
                async move { invoke(&state, &name, path, query, &body).await }
            },
        )
    } else {
        on(
            filter,
            move |State(state): State<AppState>, Query(query): Query<HashMap<String, String>>, body: Bytes| {
                let name = name.clone();
                async move { invoke(&state, &name, HashMap::new(), query, &body).await }
            },
        )
    };

    app.route(&command.route.path, method_router)
}

fn method_filter(method: Method) -> MethodFilter {
    match method {
        Method::Get => MethodFilter::GET,
        Method::Post => MethodFilter::POST,
        Method::Delete => MethodFilter::DELETE,
    }
}

async fn invoke(
    state: &AppState,
    name: &str,
    path: HashMap<String, String>,
    query: HashMap<String, String>,
    body: &[u8],
) -> EnvelopeResponse {
    let body = match parse_body(body) {
        Ok(body) => body,
        Err(reason) => {
            return EnvelopeResponse(Envelope::failure_with_code(
                format!("invalid request body: {reason}"),
                PRECONDITION_FAILED,
            ));
        }
    };
    let request = Request::from_parts(path, query, body);
    EnvelopeResponse(state.dispatcher.dispatch(name, request).await)
}

/// An empty body is an empty object; anything else must be a JSON object.
fn parse_body(body: &[u8]) -> Result<Map<String, Value>, String> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Map::new());
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err("expected a JSON object".to_string()),
        Err(e) => Err(e.to_string()),
    }
}

/// Wire form of an [`Envelope`], with its status code.
pub struct EnvelopeResponse(pub Envelope);

impl IntoResponse for EnvelopeResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::OK);
        (status, Json(self.0.to_wire())).into_response()
    }
}

async fn module_descriptor(State(state): State<AppState>) -> Json<ModuleDescriptor> {
    Json(state.module.as_ref().clone())
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let connection = state.dispatcher.connection().info().await;
    Json(json!({ "status": "ok", "connection": connection }))
}

/// Resolves on Ctrl+C, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutting down");
}
