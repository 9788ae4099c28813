use std::fmt;
use std::time::Duration;

use tokio::sync::watch;
use tracing::info;

const DEFAULT_CACHE_URL: &str = "ws://127.0.0.1:8801/v1";
const DEFAULT_UPLOAD_URL: &str = "ws://127.0.0.1:8802/v1";
const DEFAULT_WALLET_URL: &str = "ws://127.0.0.1:8803/v1";

/// Which backend a connection talks to. Each role has its own endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerRole {
    Caching,
    Upload,
    Wallet,
}

impl fmt::Display for ServerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Caching => "caching",
            Self::Upload => "upload",
            Self::Wallet => "wallet",
        };
        f.write_str(name)
    }
}

/// Source of endpoint URLs. The connection reads the current URL on every
/// connect attempt, and reconnects right away when a watched URL changes.
pub trait EndpointProvider: Send + Sync {
    fn current_endpoint(&self, role: ServerRole) -> String;

    /// Change notifications for `role`, if this provider can push them.
    fn watch_endpoint(&self, role: ServerRole) -> Option<watch::Receiver<String>> {
        let _ = role;
        None
    }
}

/// Runtime-updatable endpoint URLs, one per server role.
pub struct EndpointConfig {
    caching: watch::Sender<String>,
    upload: watch::Sender<String>,
    wallet: watch::Sender<String>,
}

impl EndpointConfig {
    pub fn new(
        caching: impl Into<String>,
        upload: impl Into<String>,
        wallet: impl Into<String>,
    ) -> Self {
        Self {
            caching: watch::Sender::new(caching.into()),
            upload: watch::Sender::new(upload.into()),
            wallet: watch::Sender::new(wallet.into()),
        }
    }

    /// Read `KESTREL_CACHE_URL`, `KESTREL_UPLOAD_URL` and
    /// `KESTREL_WALLET_URL`, falling back to local defaults.
    pub fn from_env() -> Self {
        let var = |name: &str, default: &str| {
            std::env::var(name).unwrap_or_else(|_| default.to_string())
        };
        Self::new(
            var("KESTREL_CACHE_URL", DEFAULT_CACHE_URL),
            var("KESTREL_UPLOAD_URL", DEFAULT_UPLOAD_URL),
            var("KESTREL_WALLET_URL", DEFAULT_WALLET_URL),
        )
    }

    /// Point `role` at a new URL. Connections for that role drop their
    /// socket and reconnect. Returns `false` if the URL was unchanged.
    pub fn update(&self, role: ServerRole, url: impl Into<String>) -> bool {
        let url = url.into();
        let changed = self.sender(role).send_if_modified(|current| {
            if *current == url {
                return false;
            }
            *current = url.clone();
            true
        });
        if changed {
            info!("{} endpoint changed to {}", role, url);
        }
        changed
    }

    fn sender(&self, role: ServerRole) -> &watch::Sender<String> {
        match role {
            ServerRole::Caching => &self.caching,
            ServerRole::Upload => &self.upload,
            ServerRole::Wallet => &self.wallet,
        }
    }
}

impl EndpointProvider for EndpointConfig {
    fn current_endpoint(&self, role: ServerRole) -> String {
        self.sender(role).borrow().clone()
    }

    fn watch_endpoint(&self, role: ServerRole) -> Option<watch::Receiver<String>> {
        Some(self.sender(role).subscribe())
    }
}

/// Reconnect and liveness timing.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// First retry delay after a failure.
    pub initial_backoff: Duration,
    /// Retry delay cap; the delay doubles up to this.
    pub max_backoff: Duration,
    /// Ping interval. Two unanswered pings drop the socket.
    pub heartbeat_interval: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            heartbeat_interval: Duration::from_secs(15),
        }
    }
}
