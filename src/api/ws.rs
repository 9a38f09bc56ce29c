// =============================================================================
// WebSocket Handler — Push-based view updates
// =============================================================================
//
// Clients connect to `/api/v1/ws` and receive:
//   1. An immediate ViewSnapshot on connect.
//   2. A fresh snapshot every time the supervisor publishes a new version
//      (state transition or merged candle).
//
// The feed is push-only. Ping frames are answered with Pong; inbound text is
// ignored.
// =============================================================================

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use crate::supervisor::SupervisorHandle;
use crate::view_state::ViewState;

/// Axum handler for the WebSocket upgrade request.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(supervisor): State<SupervisorHandle>,
) -> impl IntoResponse {
    info!("view WebSocket connection accepted — upgrading");
    ws.on_upgrade(move |socket| handle_ws_connection(socket, supervisor))
}

/// Runs one push connection until the client leaves or the view is dropped.
async fn handle_ws_connection(socket: WebSocket, supervisor: SupervisorHandle) {
    let view = supervisor.view().clone();
    let mut changes = view.subscribe();
    let (mut sender, mut receiver) = socket.split();

    // Mark the current version seen before the initial push.
    let _ = changes.borrow_and_update();
    if let Err(e) = send_snapshot(&mut sender, &view).await {
        warn!(error = %e, "failed to send initial view snapshot");
        return;
    }

    loop {
        tokio::select! {
            changed = changes.changed() => {
                if changed.is_err() {
                    info!("view publisher dropped — closing WebSocket");
                    break;
                }
                let _ = changes.borrow_and_update();
                if let Err(e) = send_snapshot(&mut sender, &view).await {
                    debug!(error = %e, "WebSocket send failed — disconnecting");
                    break;
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        debug!(msg = %text, "inbound WebSocket text ignored");
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = sender.send(Message::Pong(data)).await {
                            debug!(error = %e, "failed to send Pong — disconnecting");
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) | Some(Ok(Message::Binary(_))) => {}
                    Some(Ok(Message::Close(_))) => {
                        info!("WebSocket Close frame received — disconnecting");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket receive error — disconnecting");
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    info!("view WebSocket connection closed");
}

/// Serialize and send the current snapshot.
async fn send_snapshot<S>(sender: &mut S, view: &ViewState) -> Result<(), axum::Error>
where
    S: futures_util::Sink<Message, Error = axum::Error> + Unpin,
{
    let snapshot = view.snapshot();

    match serde_json::to_string(&snapshot) {
        Ok(json) => {
            sender.send(Message::Text(json)).await?;
            debug!(version = snapshot.version, candles = snapshot.candles.len(), "view snapshot sent");
            Ok(())
        }
        Err(e) => {
            // Serialisation errors are not network errors; don't disconnect.
            warn!(error = %e, "failed to serialize view snapshot");
            Ok(())
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
