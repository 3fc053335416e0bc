//! Gateway CDP relay: client WebSocket <-> worker `/proxy/{id}` WebSocket
//! (spec.md §4.4).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as AxumMessage, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message as TungsteniteMessage;

use crate::coordination::CoordinationStore;
use crate::ids::SessionId;

use super::orchestrator::Orchestrator;

const OUTBOUND_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const ACTIVITY_THROTTLE: Duration = Duration::from_secs(1);

/// Mirrors spec.md §4.4's relay-instance state machine. Not branched on at
/// runtime — the control flow here is naturally sequential — but each
/// transition is traced so a stuck relay is diagnosable from logs alone.
#[derive(Debug, Clone, Copy)]
#[allow(dead_code)]
enum RelayState {
    Accepting,
    Resolving,
    Connecting,
    Relaying,
    Closing,
    Closed,
}

fn trace_state(session_id: SessionId, state: RelayState) {
    tracing::debug!(session_id = %session_id, state = ?state, "relay state transition");
}

pub async fn handle_client_socket(
    mut socket: WebSocket,
    session_id: SessionId,
    store: Arc<dyn CoordinationStore>,
    orchestrator: Arc<Orchestrator>,
    worker_port: u16,
) {
    trace_state(session_id, RelayState::Resolving);

    let worker = match store.get_routing(session_id).await {
        Ok(Some(w)) => w,
        Ok(None) => {
            let _ = socket.send(AxumMessage::Close(Some(axum::extract::ws::CloseFrame {
                code: 4404,
                reason: "unknown session".into(),
            }))).await;
            return;
        }
        Err(e) => {
            tracing::warn!(session_id = %session_id, error = %e, "routing lookup failed");
            let _ = socket.close().await;
            return;
        }
    };

    if store.get_detail(session_id).await.ok().flatten().is_none() {
        let _ = socket.send(AxumMessage::Close(Some(axum::extract::ws::CloseFrame {
            code: 1011,
            reason: "target missing".into(),
        }))).await;
        return;
    }

    trace_state(session_id, RelayState::Connecting);
    let url = format!("ws://{}:{}/proxy/{}", worker.as_str(), worker_port, session_id);
    let connect = tokio::time::timeout(OUTBOUND_CONNECT_TIMEOUT, tokio_tungstenite::connect_async(&url)).await;

    let worker_stream = match connect {
        Ok(Ok((stream, _))) => stream,
        Ok(Err(e)) => {
            tracing::warn!(session_id = %session_id, error = %e, "failed to connect to worker proxy");
            let _ = socket.send(AxumMessage::Close(Some(axum::extract::ws::CloseFrame {
                code: 1011,
                reason: format!("cannot connect to worker: {e}").into(),
            }))).await;
            orchestrator.close_session(session_id).await.ok();
            return;
        }
        Err(_) => {
            tracing::warn!(session_id = %session_id, "worker proxy connect timed out");
            let _ = socket.close().await;
            orchestrator.close_session(session_id).await.ok();
            return;
        }
    };

    trace_state(session_id, RelayState::Relaying);

    let (mut client_tx, mut client_rx) = socket.split();
    let (mut worker_tx, mut worker_rx) = worker_stream.split();

    let closed = Arc::new(AtomicBool::new(false));
    let last_touch = Arc::new(tokio::sync::Mutex::new(tokio::time::Instant::now() - ACTIVITY_THROTTLE));

    let touch = {
        let store = store.clone();
        let last_touch = last_touch.clone();
        move || {
            let store = store.clone();
            let last_touch = last_touch.clone();
            async move {
                let mut guard = last_touch.lock().await;
                if guard.elapsed() >= ACTIVITY_THROTTLE {
                    *guard = tokio::time::Instant::now();
                    let _ = store.touch_activity(session_id, chrono::Utc::now().timestamp()).await;
                }
            }
        }
    };

    let client_to_worker = {
        let touch = touch.clone();
        async move {
            while let Some(msg) = client_rx.next().await {
                match msg {
                    Ok(AxumMessage::Text(text)) => {
                        if worker_tx.send(TungsteniteMessage::Text(text)).await.is_err() {
                            break;
                        }
                        touch().await;
                    }
                    Ok(AxumMessage::Binary(bin)) => {
                        if worker_tx.send(TungsteniteMessage::Binary(bin)).await.is_err() {
                            break;
                        }
                        touch().await;
                    }
                    Ok(AxumMessage::Close(_)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
            let _ = worker_tx.close().await;
        }
    };

    let worker_to_client = {
        let touch = touch.clone();
        async move {
            while let Some(msg) = worker_rx.next().await {
                match msg {
                    Ok(TungsteniteMessage::Text(text)) => {
                        if client_tx.send(AxumMessage::Text(text)).await.is_err() {
                            break;
                        }
                        touch().await;
                    }
                    Ok(TungsteniteMessage::Binary(bin)) => {
                        if client_tx.send(AxumMessage::Binary(bin)).await.is_err() {
                            break;
                        }
                        touch().await;
                    }
                    Ok(TungsteniteMessage::Close(_)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
            let _ = client_tx.close().await;
        }
    };

    tokio::join!(client_to_worker, worker_to_client);

    trace_state(session_id, RelayState::Closing);
    if !closed.swap(true, Ordering::SeqCst) {
        orchestrator.close_session(session_id).await.ok();
    }
    trace_state(session_id, RelayState::Closed);
}
