//! Worker browser lifecycle manager (spec.md §4.6): one browser process per
//! session, port allocation, and CDP endpoint discovery.

use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

#[cfg(unix)]
use std::os::unix::process::CommandExt as _;

use crate::ids::SessionId;

const LAUNCH_RETRY_ATTEMPTS: u32 = 3;
const VERSION_POLL_TIMEOUT: Duration = Duration::from_secs(5);
const VERSION_POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Error, Debug)]
pub enum BrowserError {
    #[error("failed to allocate a port: {0}")]
    PortAllocation(String),
    #[error("failed to launch browser: {0}")]
    LaunchFailed(String),
    #[error("browser did not expose a debug endpoint in time")]
    DiscoveryTimeout,
}

/// `sessionId -> (processHandle, port, guid)` (spec.md §3 "Browser slot").
struct BrowserSlot {
    process: Child,
    port: u16,
    browser_guid: String,
}

/// Owns every browser process spawned by this worker. Guarded by a mutex
/// rather than a `RwLock` because mutations (insert/remove on create/close)
/// dominate over reads, unlike the teacher's `BrowserSessionManager` which
/// optimizes for many concurrent readers of a shared page.
pub struct BrowserManager {
    slots: Mutex<HashMap<SessionId, BrowserSlot>>,
    http: reqwest::Client,
    chrome_binary: String,
}

impl BrowserManager {
    pub fn new(chrome_binary: impl Into<String>) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            http: reqwest::Client::new(),
            chrome_binary: chrome_binary.into(),
        }
    }

    /// spec.md §4.6 `newBrowser`.
    pub async fn new_browser(&self, session_id: SessionId) -> Result<(u16, String), BrowserError> {
        let mut last_err = None;
        for attempt in 0..LAUNCH_RETRY_ATTEMPTS {
            match self.try_launch(session_id).await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    tracing::warn!(session_id = %session_id, attempt, error = %e, "browser launch attempt failed");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or(BrowserError::DiscoveryTimeout))
    }

    async fn try_launch(&self, session_id: SessionId) -> Result<(u16, String), BrowserError> {
        let port = pick_free_port().map_err(BrowserError::PortAllocation)?;

        let mut cmd = Command::new(&self.chrome_binary);
        cmd.args([
            format!("--remote-debugging-port={port}"),
            "--remote-debugging-address=0.0.0.0".to_string(),
            "--headless=new".to_string(),
            "--no-sandbox".to_string(),
            "--disable-gpu".to_string(),
            "--disable-dev-shm-usage".to_string(),
            format!("--user-data-dir=/tmp/browser-gateway-{session_id}"),
        ])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

        #[cfg(unix)]
        unsafe {
            cmd.pre_exec(|| {
                nix::unistd::setsid().ok();
                Ok(())
            });
        }

        let mut child = cmd.spawn().map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

        let browser_guid = match self.poll_for_guid(port).await {
            Ok(guid) => guid,
            Err(e) => {
                let _ = child.kill().await;
                return Err(e);
            }
        };

        self.slots.lock().await.insert(
            session_id,
            BrowserSlot {
                process: child,
                port,
                browser_guid: browser_guid.clone(),
            },
        );

        Ok((port, browser_guid))
    }

    async fn poll_for_guid(&self, port: u16) -> Result<String, BrowserError> {
        let url = format!("http://127.0.0.1:{port}/json/version");
        let deadline = tokio::time::Instant::now() + VERSION_POLL_TIMEOUT;

        loop {
            if tokio::time::Instant::now() >= deadline {
                return Err(BrowserError::DiscoveryTimeout);
            }
            if let Ok(Ok(resp)) = tokio::time::timeout(VERSION_POLL_INTERVAL, self.http.get(&url).send()).await {
                if let Ok(body) = resp.json::<serde_json::Value>().await {
                    if let Some(ws_url) = body.get("webSocketDebuggerUrl").and_then(|v| v.as_str()) {
                        if let Some(guid) = ws_url.rsplit('/').next() {
                            return Ok(guid.to_string());
                        }
                    }
                }
            }
            tokio::time::sleep(VERSION_POLL_INTERVAL).await;
        }
    }

    /// spec.md §4.6 `closeBrowser`. Idempotent on absence.
    pub async fn close_browser(&self, session_id: SessionId) {
        let slot = self.slots.lock().await.remove(&session_id);
        if let Some(mut slot) = slot {
            if let Err(e) = slot.process.kill().await {
                tracing::warn!(session_id = %session_id, error = %e, "failed to kill browser process");
            }
        }
    }

    /// Looked up by the worker's own CDP relay to resolve `(port, guid)`
    /// (spec.md §4.7).
    pub async fn get_info(&self, session_id: SessionId) -> Option<(u16, String)> {
        self.slots
            .lock()
            .await
            .get(&session_id)
            .map(|slot| (slot.port, slot.browser_guid.clone()))
    }

    /// Current number of live browser slots, reported by `/healthz`.
    pub async fn session_count(&self) -> usize {
        self.slots.lock().await.len()
    }
}

/// Bind-to-ephemeral-then-close. Inherently racy (spec.md §9); mitigated by
/// bounded retry in `new_browser`.
fn pick_free_port() -> Result<u16, String> {
    let socket = socket2::Socket::new(socket2::Domain::IPV4, socket2::Type::STREAM, None)
        .map_err(|e| e.to_string())?;
    socket
        .bind(&"127.0.0.1:0".parse::<std::net::SocketAddr>().unwrap().into())
        .map_err(|e| e.to_string())?;
    let addr = socket.local_addr().map_err(|e| e.to_string())?;
    let port = addr.as_socket().map(|a| a.port()).ok_or("no socket address")?;
    drop(socket);
    Ok(port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pick_free_port_returns_a_nonzero_port() {
        let port = pick_free_port().unwrap();
        assert!(port > 0);
    }

    #[tokio::test]
    async fn close_browser_on_unknown_session_is_a_noop() {
        let mgr = BrowserManager::new("google-chrome");
        mgr.close_browser(SessionId::generate()).await;
    }

    #[tokio::test]
    async fn get_info_on_unknown_session_is_none() {
        let mgr = BrowserManager::new("google-chrome");
        assert_eq!(mgr.get_info(SessionId::generate()).await, None);
    }
}
