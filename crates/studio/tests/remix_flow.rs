//! End-to-end run of the studio flow against an in-process axum service
//! that serves both the HTTP API and the realtime endpoint.

use std::path::PathBuf;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::Multipart;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use remix_client::ClientConfig;
use remix_studio::StudioOptions;
use serde_json::{json, Value};

async fn upload(mut multipart: Multipart) -> Json<Value> {
    let mut size = 0;
    while let Ok(Some(field)) = multipart.next_field().await {
        size += field.bytes().await.map(|b| b.len()).unwrap_or_default();
    }
    Json(json!({
        "file_id": "abc123",
        "original_filename": "input.wav",
        "file_size": size,
        "message": "File uploaded successfully"
    }))
}

async fn realtime(ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(serve_socket)
}

/// Acknowledge the connection, then play a short job lifecycle for every
/// `join_job` request.
async fn serve_socket(mut socket: WebSocket) {
    let hello = json!({"type": "connected", "data": {"message": "Connected to remix server"}});
    if socket.send(Message::Text(hello.to_string().into())).await.is_err() {
        return;
    }

    while let Some(Ok(msg)) = socket.recv().await {
        let Message::Text(text) = msg else { continue };
        let request: Value = serde_json::from_str(text.as_str()).unwrap_or(Value::Null);
        if request["type"] != "join_job" {
            continue;
        }
        let job_id = request["data"]["job_id"].clone();
        let frames = [
            json!({"type": "joined_job", "data": {"job_id": job_id, "status": "joined"}}),
            json!({"type": "job_update", "data": {"job_id": job_id, "status": "analyzing", "progress": 20, "message": "🔍 Analyzing audio"}}),
            json!({"type": "job_update", "data": {"job_id": job_id, "status": "applying", "progress": 80, "message": "Applying effects"}}),
            json!({"type": "job_update", "data": {
                "job_id": job_id,
                "status": "completed",
                "progress": 100,
                "message": "Remix ready",
                "result_file": "job_1_remix.wav"
            }}),
        ];
        for frame in frames {
            if socket.send(Message::Text(frame.to_string().into())).await.is_err() {
                return;
            }
        }
    }
}

fn service(health: &'static str) -> Router {
    Router::new()
        .route("/health", get(move || async move { Json(json!({"status": health})) }))
        .route("/api/upload-audio", post(upload))
        .route(
            "/api/process-audio",
            post(|| async { Json(json!({"job_id": "job_1", "status": "starting", "message": "Queued"})) }),
        )
        .route("/api/result/{job_id}", get(|| async { b"RIFF-remixed".to_vec() }))
        .route("/ws", get(realtime))
}

async fn spawn(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

async fn scratch_options(prompt: &str) -> StudioOptions {
    let dir = std::env::temp_dir().join(format!("remix-studio-{}", uuid::Uuid::new_v4()));
    tokio::fs::create_dir_all(&dir).await.unwrap();
    let input = dir.join("input.wav");
    tokio::fs::write(&input, vec![0u8; 32 * 1024]).await.unwrap();
    StudioOptions {
        input,
        prompt: prompt.into(),
        output_dir: dir.join("out"),
    }
}

#[tokio::test]
async fn run_saves_completed_remix() {
    let base_url = spawn(service("healthy")).await;
    let options = scratch_options("make it lo-fi").await;

    let saved: PathBuf = remix_studio::run(&ClientConfig::new(base_url), &options)
        .await
        .unwrap();

    assert_eq!(saved, options.output_dir.join("job_1_remix.wav"));
    assert_eq!(tokio::fs::read(&saved).await.unwrap(), b"RIFF-remixed");
}

#[tokio::test]
async fn run_stops_when_service_is_unhealthy() {
    let base_url = spawn(service("degraded")).await;
    let options = scratch_options("make it lo-fi").await;

    let err = remix_studio::run(&ClientConfig::new(base_url), &options)
        .await
        .unwrap_err();

    assert!(err.to_string().contains("unavailable"));
    assert!(!options.output_dir.exists());
}
