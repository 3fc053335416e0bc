//! Environment-driven configuration for both binaries.

use std::time::Duration;

/// Which tenant-identification provider to wire up at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthProviderKind {
    Local,
    Jwt,
}

impl AuthProviderKind {
    fn from_env_value(v: &str) -> Self {
        match v {
            "jwt" => Self::Jwt,
            _ => Self::Local,
        }
    }
}

/// Gateway process configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub redis_url: String,
    pub database_url: String,
    pub session_timeout: Duration,
    pub idle_timeout: Duration,
    pub public_gateway_host: String,
    pub gateway_port: u16,
    pub worker_port: u16,
    pub auth_provider: AuthProviderKind,
    pub jwt_public_key: Option<String>,
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        let db_path = std::env::var("DATABASE_URL").unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            format!("{home}/.browser-gateway/gateway.db")
        });

        Self {
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379/0".to_string()),
            database_url: db_path,
            session_timeout: Duration::from_secs(env_u64("SESSION_TIMEOUT", 3600)),
            idle_timeout: Duration::from_secs(env_u64("IDLE_TIMEOUT", 300)),
            public_gateway_host: std::env::var("PUBLIC_GATEWAY_HOST")
                .unwrap_or_else(|_| "localhost".to_string()),
            gateway_port: env_u64("GATEWAY_PORT", 8000) as u16,
            worker_port: env_u64("WORKER_RPC_PORT", 5000) as u16,
            auth_provider: std::env::var("AUTH_PROVIDER")
                .map(|v| AuthProviderKind::from_env_value(&v))
                .unwrap_or(AuthProviderKind::Local),
            jwt_public_key: std::env::var("JWT_PUBLIC_KEY").ok(),
        }
    }
}

/// Worker process configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub redis_url: String,
    pub worker_host: String,
    pub worker_port: u16,
    pub bind_addr: String,
}

impl WorkerConfig {
    pub fn from_env() -> Self {
        let worker_host = std::env::var("WORKER_HOST").unwrap_or_else(|_| local_container_ip());

        Self {
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379/0".to_string()),
            worker_host,
            worker_port: env_u64("WORKER_PORT", 5000) as u16,
            bind_addr: std::env::var("WORKER_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0".to_string()),
        }
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Best-effort resolution of this container/host's own IP address, used as
/// the worker's self-advertised host when `WORKER_HOST` is not set.
fn local_container_ip() -> String {
    std::net::UdpSocket::bind("0.0.0.0:0")
        .and_then(|s| {
            s.connect("8.8.8.8:80")?;
            s.local_addr()
        })
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|_| "127.0.0.1".to_string())
}

/// Redis keys shared between the gateway and worker (spec.md §6 "In-memory
/// store keys").
pub mod coordination_keys {
    pub const WORKERS_LOAD: &str = "workers_load";
    pub const SESSION_MAP: &str = "session_map";
    pub const SESSION_LAST_ACTIVE: &str = "session_last_active";

    pub fn session_detail_key(session_id: &str) -> String {
        format!("session:{session_id}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_provider_defaults_to_local() {
        assert_eq!(AuthProviderKind::from_env_value("bogus"), AuthProviderKind::Local);
        assert_eq!(AuthProviderKind::from_env_value("jwt"), AuthProviderKind::Jwt);
    }

    #[test]
    fn session_detail_key_matches_spec_format() {
        assert_eq!(
            coordination_keys::session_detail_key("abc"),
            "session:abc"
        );
    }
}
