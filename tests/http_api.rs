mod common;

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::net::TcpListener;

use common::{app_state, ScriptedModel, Workspace};
use tutor_rag::api;
use tutor_rag::app_state::AppState;
use tutor_rag::models::{ChatMessage, Role};
use tutor_rag::prompts::IRRELEVANT_REPLY;

/// Levanta el router en un puerto libre y devuelve la URL base.
async fn serve(state: AppState) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, api::create_router(state)).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn get_answer_returns_an_assistant_turn() {
    let ws = Workspace::new();
    let state = app_state(&ws, Arc::new(ScriptedModel::classifying("irrelevante", "hola")));
    let base = serve(state).await;

    let response = reqwest::Client::new()
        .post(format!("{base}/tfm/service/getAnswer"))
        .json(&json!({"messages": [{"role": "user", "content": "¿Qué tal el fin de semana?"}]}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let message: ChatMessage = response.json().await.unwrap();
    assert_eq!(message.role, Role::Assistant);
    assert_eq!(message.content, IRRELEVANT_REPLY);
}

#[tokio::test]
async fn get_answer_reports_failures_as_server_errors() {
    let ws = Workspace::new();
    let state = app_state(&ws, Arc::new(ScriptedModel::classifying("teoria", "¿Qué es una pila?")));
    let base = serve(state).await;

    let response = reqwest::Client::new()
        .post(format!("{base}/tfm/service/getAnswer"))
        .json(&json!({"messages": [{"role": "user", "content": "¿Qué es una pila?"}]}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 500);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("Error al generar la respuesta"));
}

#[tokio::test]
async fn replace_content_is_acknowledged_without_body() {
    let ws = Workspace::new();
    let base = serve(app_state(&ws, Arc::new(ScriptedModel::classifying("teoria", "x")))).await;

    let response = reqwest::Client::new()
        .post(format!("{base}/tfm/service/replaceContent"))
        .json(&json!({
            "teoria": [{"data": "aG9sYQ==", "name": "tema1", "path": "teoria", "ext": "txt"}]
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 204);
}

#[tokio::test]
async fn status_starts_idle() {
    let ws = Workspace::new();
    let base = serve(app_state(&ws, Arc::new(ScriptedModel::classifying("teoria", "x")))).await;

    let status: Value = reqwest::get(format!("{base}/api/status"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(status["stage"], "idle");
    assert_eq!(status["is_busy"], false);
    assert!(status["last_run"].is_null());
}

#[tokio::test]
async fn second_update_request_conflicts_while_busy() {
    let ws = Workspace::new();
    let state = app_state(&ws, Arc::new(ScriptedModel::classifying("teoria", "x")));
    assert!(state.try_begin_update());
    let base = serve(state).await;

    let response = reqwest::Client::new()
        .post(format!("{base}/tfm/service/update"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 409);
}

#[tokio::test]
async fn update_request_is_accepted_and_runs_in_background() {
    let ws = Workspace::new();
    ws.write("teoria/t.txt", "pila");
    ws.write("info/i.txt", "examen");
    ws.write("practica/p.txt", "ejercicio");
    let state = app_state(&ws, Arc::new(ScriptedModel::classifying("teoria", "x")));
    let base = serve(state.clone()).await;

    let response = reqwest::Client::new()
        .post(format!("{base}/tfm/service/update"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 202);

    for _ in 0..100 {
        if !state.status_snapshot().is_busy {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    let status = state.status_snapshot();
    assert!(!status.is_busy);
    assert_eq!(status.last_run.unwrap().theory_records, 1);
}
