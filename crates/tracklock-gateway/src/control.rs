//! Operator control surface.
//!
//! A small HTTP API for operators and supervising systems:
//!
//! - `GET /` — service banner
//! - `GET /list` — identities of all connected devices
//! - `GET /{imei}` — per-device status, 404 when not connected
//! - `POST /{imei}/unlock` — push the unlock command
//! - `POST /{imei}/locate` — push the locate command
//! - `POST /{imei}/ring` — push the find-me ring command
//!
//! Command routes return an immediate `pending` acknowledgement; the
//! device confirms asynchronously (if at all) with a response frame on
//! its own connection. An unknown or disconnected identity is a plain
//! 404, never a fault.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tracing::info;
use tracklock_core::{Error, Imei, Result};
use tracklock_protocol::DeviceCommand;

use crate::dispatcher::CommandDispatcher;
use crate::registry::DeviceRegistry;

/// Shared state for the control handlers.
#[derive(Clone)]
pub struct ControlState {
    registry: DeviceRegistry,
    dispatcher: CommandDispatcher,
}

impl ControlState {
    pub fn new(registry: DeviceRegistry, dispatcher: CommandDispatcher) -> Self {
        ControlState {
            registry,
            dispatcher,
        }
    }
}

/// Build the control router.
pub fn router(state: ControlState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/list", get(list_devices))
        .route("/{imei}", get(device_status))
        .route("/{imei}/unlock", post(unlock))
        .route("/{imei}/locate", post(locate))
        .route("/{imei}/ring", post(ring))
        .with_state(state)
}

/// Bind and serve the control surface.
pub async fn serve(addr: &str, state: ControlState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("control surface listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state)).await.map_err(Error::from)
}

async fn index() -> String {
    format!("tracklock gateway {}", tracklock_core::VERSION)
}

async fn list_devices(State(state): State<ControlState>) -> Json<Vec<String>> {
    let mut identities: Vec<String> = state
        .registry
        .identities()
        .iter()
        .map(|imei| imei.to_string())
        .collect();
    identities.sort();
    Json(identities)
}

async fn device_status(State(state): State<ControlState>, Path(imei): Path<String>) -> Response {
    let Ok(imei) = Imei::new(&imei) else {
        return not_found();
    };
    match state.registry.info(&imei) {
        Some(info) => Json(info).into_response(),
        None => not_found(),
    }
}

async fn unlock(State(state): State<ControlState>, Path(imei): Path<String>) -> Response {
    dispatch(&state, &imei, DeviceCommand::Unlock)
}

async fn locate(State(state): State<ControlState>, Path(imei): Path<String>) -> Response {
    dispatch(&state, &imei, DeviceCommand::Locate)
}

async fn ring(State(state): State<ControlState>, Path(imei): Path<String>) -> Response {
    dispatch(&state, &imei, DeviceCommand::Ring)
}

fn dispatch(state: &ControlState, imei: &str, command: DeviceCommand) -> Response {
    let Ok(imei) = Imei::new(imei) else {
        return not_found();
    };
    match state.dispatcher.dispatch(&imei, command) {
        Ok(()) => Json(json!({ "success": true, "status": "pending" })).into_response(),
        Err(_) => not_found(),
    }
}

fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "success": false, "error": "device not connected" })),
    )
        .into_response()
}
