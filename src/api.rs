use std::collections::HashMap;

use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::spawn;
use tracing::{error, info};

use crate::{
    app_state::{AppState, Status},
    models::ChatMessage,
};

type ApiError = (StatusCode, Json<serde_json::Value>);

// --- Payloads de la API ---

#[derive(Debug, Deserialize, Serialize)]
pub struct GetAnswerPayload {
    pub messages: Vec<ChatMessage>,
}

/// Fichero enviado para sustituir contenido del curso.
#[derive(Debug, Deserialize, Serialize)]
pub struct ContentItem {
    pub data: String,
    pub name: String,
    pub path: String,
    pub ext: String,
}

/// Ruta de destino → ficheros que deben quedar en ella.
pub type ReplaceContentPayload = HashMap<String, Vec<ContentItem>>;

// --- Router ---

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/tfm/service/getAnswer", post(get_answer_handler))
        .route("/tfm/service/replaceContent", post(replace_content_handler))
        .route("/tfm/service/update", post(update_handler))
        .route("/api/status", get(status_handler))
        .with_state(app_state)
}

// --- Handlers ---

#[axum::debug_handler]
async fn get_answer_handler(
    State(state): State<AppState>,
    Json(payload): Json<GetAnswerPayload>,
) -> Result<Json<ChatMessage>, ApiError> {
    info!(
        "Solicitando respuesta para el historial con {} mensajes",
        payload.messages.len()
    );

    match state.answer(&payload.messages).await {
        Ok(answer) => Ok(Json(ChatMessage::assistant(answer))),
        Err(e) => {
            error!("Error generando la respuesta: {:#}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": format!("Error al generar la respuesta: {}", e)})),
            ))
        }
    }
}

/// Sólo acusa recibo: la sustitución de contenido no la hace este servicio.
#[axum::debug_handler]
async fn replace_content_handler(Json(payload): Json<ReplaceContentPayload>) -> StatusCode {
    let files: usize = payload.values().map(Vec::len).sum();
    info!(
        "Reemplazando contenido: {} destinos, {} ficheros",
        payload.len(),
        files
    );
    StatusCode::NO_CONTENT
}

#[axum::debug_handler]
async fn update_handler(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    if !state.try_begin_update() {
        return Err((
            StatusCode::CONFLICT,
            Json(json!({"error": "Ya hay una actualización en curso."})),
        ));
    }

    spawn(async move {
        if let Err(err) = state.run_update().await {
            error!("Actualización fallida: {}", err);
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "message": "Actualización iniciada." })),
    ))
}

#[axum::debug_handler]
async fn status_handler(State(state): State<AppState>) -> Json<Status> {
    Json(state.status_snapshot())
}
