//! Inbound webhook surface
//!
//! Slack delivers slash commands and button clicks here. Handlers verify
//! the shared token, hand the event to the engine on a spawned task, and
//! return immediately; everything slow (directory lookups, message sends)
//! happens off the webhook path.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Form, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::InteractionPayload;
use crate::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/command", post(command))
        .route("/interaction", post(interaction))
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

/// Slash-command entry point: `{token, text, user_id, channel_id}`.
async fn command(
    State(state): State<Arc<AppState>>,
    Form(form): Form<HashMap<String, String>>,
) -> Result<Response> {
    if form.get("token").map(String::as_str) != Some(state.verification_token.as_str()) {
        return Err(AppError::Unauthorized);
    }

    let (Some(text), Some(user_id), Some(channel_id)) = (
        form.get("text"),
        form.get("user_id"),
        form.get("channel_id"),
    ) else {
        return Ok(Json(json!({
            "response_type": "ephemeral",
            "text": "Your request appears to be malformed, please try again",
        }))
        .into_response());
    };

    let (text, user_id, channel_id) = (text.clone(), user_id.clone(), channel_id.clone());
    let engine = Arc::clone(&state.engine);
    tokio::spawn(async move {
        if let Err(e) = engine.begin(&text, &user_id, &channel_id).await {
            tracing::error!("command handling failed: {}", e);
        }
    });

    Ok(StatusCode::OK.into_response())
}

/// Button entry point: a `payload` form field holding the interactive
/// message JSON. The callback id carries `"<request id>:<requester>"` so
/// the expired path can still reach both parties.
async fn interaction(
    State(state): State<Arc<AppState>>,
    Form(form): Form<HashMap<String, String>>,
) -> Result<Response> {
    let raw = form
        .get("payload")
        .ok_or_else(|| AppError::BadRequest("missing payload".to_string()))?;
    let payload: InteractionPayload = serde_json::from_str(raw)
        .map_err(|e| AppError::BadRequest(format!("malformed payload: {}", e)))?;

    if payload.token != state.verification_token {
        return Err(AppError::Unauthorized);
    }

    let (id, requester) = payload
        .callback_id
        .split_once(':')
        .ok_or_else(|| AppError::BadRequest("malformed callback id".to_string()))?;
    let id = Uuid::parse_str(id)
        .map_err(|e| AppError::BadRequest(format!("malformed request id: {}", e)))?;
    let action = payload
        .actions
        .first()
        .ok_or_else(|| AppError::BadRequest("payload carries no action".to_string()))?;

    let accept = action.name == "yes";
    let responder = payload.user.id;
    let channel = payload.channel.id;
    let requester = requester.to_string();
    let engine = Arc::clone(&state.engine);
    tokio::spawn(async move {
        let result = if accept {
            engine.on_accept(id, &responder, &channel, &requester).await
        } else {
            engine.on_reject(id, &responder, &channel, &requester).await
        };
        if let Err(e) = result {
            tracing::error!(%id, "response handling failed: {}", e);
        }
    });

    Ok(StatusCode::OK.into_response())
}
