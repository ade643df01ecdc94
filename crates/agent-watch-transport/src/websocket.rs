//! WebSocket endpoint serving session observers.

use std::sync::Arc;

use agent_watch_core::{ServerMessage, SessionSource};
use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
    routing::get,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Instrument, debug, error, info_span, warn};
use uuid::Uuid;

use crate::{codec, relay::Relay};

/// WebSocket handler state.
#[derive(Clone)]
pub struct WsState {
    pub source: Arc<dyn SessionSource>,
}

impl WsState {
    #[must_use]
    pub fn new(source: Arc<dyn SessionSource>) -> Self {
        Self { source }
    }
}

/// WebSocket upgrade handler.
///
/// Use this as an Axum route handler.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<WsState>) -> impl IntoResponse {
    let connection_id = Uuid::new_v4();
    ws.on_upgrade(move |socket| {
        handle_socket(socket, state).instrument(info_span!("observer", %connection_id))
    })
}

async fn handle_socket(socket: WebSocket, state: WsState) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    let send_task = tokio::spawn(
        async move {
            while let Some(message) = rx.recv().await {
                let frame = match codec::encode_server(&message) {
                    Ok(frame) => frame,
                    Err(e) => {
                        error!("Failed to serialize message: {e}");
                        continue;
                    }
                };
                if sender.send(Message::Text(frame.into())).await.is_err() {
                    break;
                }
            }
        }
        .in_current_span(),
    );

    let mut relay = Relay::new(state.source, tx);

    while let Some(frame) = receiver.next().await {
        let decoded = match frame {
            Ok(Message::Text(text)) => codec::decode_client(text.as_str()),
            Ok(Message::Binary(data)) => codec::decode_client_bytes(&data),
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                warn!("WebSocket error: {e}");
                break;
            }
        };

        match decoded {
            Ok(message) => relay.handle(message).await,
            Err(e) => debug!("Invalid client message: {e}"),
        }
    }

    relay.shutdown();
    send_task.abort();
}

/// Router serving observers at `/ws`.
///
/// # Example
/// ```ignore
/// let hub = Arc::new(SessionHub::new());
/// let app = Router::new().merge(create_ws_router(hub));
/// ```
#[must_use]
pub fn create_ws_router(source: Arc<dyn SessionSource>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(WsState::new(source))
}
