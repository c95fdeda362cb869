use std::net::SocketAddr;
use std::time::Duration;

pub const DEFAULT_REQUEUE_SECS: u64 = 2;
pub const DEFAULT_MAX_BACKOFF_SECS: u64 = 300;

/// Operator settings, all environment-derived.
#[derive(Debug, Clone)]
pub struct OperatorConfig {
    /// Restrict watches to one namespace; None watches the whole cluster.
    pub namespace: Option<String>,
    /// Delay before the re-trigger of a successful pass. Also the base of the
    /// error backoff.
    pub requeue_interval: Duration,
    /// Ceiling for the error backoff.
    pub max_backoff: Duration,
    /// Bind address for /healthz and /metrics.
    pub telemetry_addr: SocketAddr,
}

fn env_secs(key: &str, default: u64) -> Duration {
    Duration::from_secs(
        std::env::var(key)
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(default),
    )
}

impl OperatorConfig {
    pub fn from_env() -> Self {
        Self {
            namespace: std::env::var("MINECRAFT_NAMESPACE").ok().filter(|ns| !ns.is_empty()),
            requeue_interval: env_secs("MINECRAFT_REQUEUE_SECS", DEFAULT_REQUEUE_SECS),
            max_backoff: env_secs("MINECRAFT_MAX_BACKOFF_SECS", DEFAULT_MAX_BACKOFF_SECS),
            telemetry_addr: std::env::var("MINECRAFT_TELEMETRY_ADDR")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 8080))),
        }
    }
}
