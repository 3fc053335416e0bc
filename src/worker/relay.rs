//! Worker-side CDP relay (spec.md §4.7): terminates the gateway's inbound
//! `/proxy/{session_id}` leg against the local browser's own DevTools socket.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message as AxumMessage, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message as TungsteniteMessage;

use crate::ids::SessionId;

use super::browser_manager::BrowserManager;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// One hop further in than `gateway::relay::handle_client_socket`: resolve
/// the locally-owned browser process, dial its devtools socket, pump both
/// directions until either side closes.
pub async fn handle_proxy_socket(mut socket: WebSocket, session_id: SessionId, browsers: Arc<BrowserManager>) {
    let Some((port, browser_guid)) = browsers.get_info(session_id).await else {
        let _ = socket
            .send(AxumMessage::Close(Some(CloseFrame {
                code: 4404,
                reason: "unknown session".into(),
            })))
            .await;
        return;
    };

    let url = format!("ws://127.0.0.1:{port}/devtools/browser/{browser_guid}");
    let connect = tokio::time::timeout(CONNECT_TIMEOUT, tokio_tungstenite::connect_async(&url)).await;

    let browser_stream = match connect {
        Ok(Ok((stream, _))) => stream,
        Ok(Err(e)) => {
            tracing::warn!(session_id = %session_id, error = %e, "failed to connect to local browser devtools socket");
            let _ = socket
                .send(AxumMessage::Close(Some(CloseFrame {
                    code: 1011,
                    reason: "browser unreachable".into(),
                })))
                .await;
            return;
        }
        Err(_) => {
            tracing::warn!(session_id = %session_id, "timed out connecting to local browser devtools socket");
            let _ = socket.close().await;
            return;
        }
    };

    let (mut client_tx, mut client_rx) = socket.split();
    let (mut browser_tx, mut browser_rx) = browser_stream.split();

    let client_to_browser = async move {
        while let Some(msg) = client_rx.next().await {
            match msg {
                Ok(AxumMessage::Text(text)) => {
                    if browser_tx.send(TungsteniteMessage::Text(text)).await.is_err() {
                        break;
                    }
                }
                Ok(AxumMessage::Binary(bin)) => {
                    if browser_tx.send(TungsteniteMessage::Binary(bin)).await.is_err() {
                        break;
                    }
                }
                Ok(AxumMessage::Close(_)) | Err(_) => break,
                Ok(_) => {}
            }
        }
        let _ = browser_tx.close().await;
    };

    let browser_to_client = async move {
        while let Some(msg) = browser_rx.next().await {
            match msg {
                Ok(TungsteniteMessage::Text(text)) => {
                    if client_tx.send(AxumMessage::Text(text)).await.is_err() {
                        break;
                    }
                }
                Ok(TungsteniteMessage::Binary(bin)) => {
                    if client_tx.send(AxumMessage::Binary(bin)).await.is_err() {
                        break;
                    }
                }
                Ok(TungsteniteMessage::Close(_)) | Err(_) => break,
                Ok(_) => {}
            }
        }
        let _ = client_tx.close().await;
    };

    tokio::join!(client_to_browser, browser_to_client);

    // Safety net against orphaned processes: the gateway's own close
    // protocol already calls DELETE /browser/{id}, but if the tunnel dies
    // first (client vanished, gateway crashed) this ensures the browser
    // process doesn't outlive its session (spec.md §4.7).
    browsers.close_browser(session_id).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_session_closes_with_4404() {
        // Exercising the full websocket handshake requires a live pair;
        // the unknown-session short-circuit is covered by BrowserManager's
        // own `get_info` tests. This test documents the expected close
        // code for future integration coverage.
        let browsers = Arc::new(BrowserManager::new("google-chrome"));
        assert_eq!(browsers.get_info(SessionId::generate()).await, None);
    }
}
