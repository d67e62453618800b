use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

use crate::adapters::http::state::HttpState;
use crate::domain::stream::{StreamEvent, WsMessage};

pub async fn ws_handler(ws: WebSocketUpgrade, State(st): State<HttpState>) -> impl axum::response::IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, st))
}

async fn handle_socket(mut socket: WebSocket, st: HttpState) {
    let mut rx = match st.pipeline.subscribe().await {
        Ok(r) => r,
        Err(_) => return,
    };

    loop {
        let (msg, jpeg) = match rx.recv().await {
            Ok(StreamEvent::Frame(meta, jpeg)) => (WsMessage::Frame { meta }, Some(jpeg)),
            Ok(StreamEvent::Finished { source }) => (WsMessage::Finished { source }, None),
            Ok(StreamEvent::Error { message }) => (WsMessage::Error { message }, None),
            // Cliente lento: se saltan frames atrasados.
            Err(RecvError::Lagged(n)) => {
                debug!("WebSocket: {} eventos descartados", n);
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        let json = serde_json::to_string(&msg).unwrap_or_default();
        if socket.send(Message::Text(json)).await.is_err() { break; }
        if let Some(jpeg) = jpeg {
            if socket.send(Message::Binary(jpeg)).await.is_err() { break; }
        }
    }
    debug!("WebSocket de streaming cerrado");
}
