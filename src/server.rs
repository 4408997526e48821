//! HTTP server exposing the WebSocket endpoint and a health probe.

use anyhow::Result;
use axum::{
    extract::{
        ws::{WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use futures_util::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::hub::BroadcastHub;
use crate::session::{shutdown_signalled, ConnectionSession};

/// Application state for the web server.
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<BroadcastHub>,
    pub watch_dir: PathBuf,
    /// Per-connection outbound queue capacity
    pub send_queue: usize,
    pub shutdown: watch::Receiver<bool>,
}

/// Build the router.
pub fn build_router(state: AppState, ws_path: &str) -> Router {
    Router::new()
        .route(ws_path, get(websocket_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// Serve until shutdown is signalled.
pub async fn serve(listener: TcpListener, router: Router, mut shutdown: watch::Receiver<bool>) -> Result<()> {
    info!("Web server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown_signalled(&mut shutdown).await })
        .await?;
    Ok(())
}

/// WebSocket upgrade handler.
async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Run one connection session over an upgraded socket.
async fn handle_websocket(socket: WebSocket, state: AppState) {
    let session = ConnectionSession::new(Arc::clone(&state.hub), state.send_queue);
    info!(session_id = %session.id(), "WebSocket client connected");

    let (writer, reader) = socket.split();
    session.run(writer, reader, state.shutdown.clone()).await;
}

/// Health handler.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "subscribers": state.hub.subscriber_count(),
        "watch_dir": state.watch_dir,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FileArrival, FileArrivalEvent};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::time::Duration;
    use tokio_tungstenite::tungstenite::Message as ClientMessage;
    use tower::ServiceExt;

    fn state(hub: Arc<BroadcastHub>, shutdown: watch::Receiver<bool>) -> AppState {
        AppState {
            hub,
            watch_dir: PathBuf::from("/in"),
            send_queue: 16,
            shutdown,
        }
    }

    async fn wait_for_subscribers(hub: &BroadcastHub, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while hub.subscriber_count() != n {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("subscriber count never reached");
    }

    #[tokio::test]
    async fn test_health_reports_subscribers() {
        let hub = Arc::new(BroadcastHub::default());
        let (_tx, rx) = watch::channel(false);
        let (sink, _sink_rx) = tokio::sync::mpsc::channel::<FileArrivalEvent>(1);
        hub.subscribe("S1".into(), sink);

        let router = build_router(state(Arc::clone(&hub), rx), "/ws/files");
        let response = router
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["subscribers"], 1);
        assert_eq!(json["watch_dir"], "/in");
    }

    #[tokio::test]
    async fn test_websocket_clients_receive_stamped_events() {
        let hub = Arc::new(BroadcastHub::default());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let router = build_router(state(Arc::clone(&hub), shutdown_rx.clone()), "/ws/files");

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(serve(listener, router, shutdown_rx));

        let url = format!("ws://{}/ws/files", addr);
        let (mut first, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();
        let (mut second, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();
        wait_for_subscribers(&hub, 2).await;

        hub.publish(&FileArrival::new("/in/a.txt"));

        let mut ids = Vec::new();
        for client in [&mut first, &mut second] {
            let msg = tokio::time::timeout(Duration::from_secs(5), client.next())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            let text = match msg {
                ClientMessage::Text(text) => text,
                other => panic!("expected text frame, got {:?}", other),
            };
            let json: serde_json::Value = serde_json::from_str(&text).unwrap();
            assert_eq!(json["path"], "/in/a.txt");
            ids.push(json["sessionId"].as_str().unwrap().to_string());
        }
        assert_ne!(ids[0], ids[1]);
        assert!(ids.iter().all(|id| id.starts_with("conn_")));

        // A client going away releases its subscription.
        drop(first);
        wait_for_subscribers(&hub, 1).await;

        shutdown_tx.send(true).unwrap();
        wait_for_subscribers(&hub, 0).await;
        tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}
