//! Ledger Node - the main application entry point.
//!
//! Architecture:
//! - Single daemon process with shared RocksDB storage
//! - HTTP API for clients (vote/validation submission, stats)
//! - Unix admin socket for the node registry (ledger-admin CLI)

use crate::admin_socket::AdminSocket;
use crate::api;
use crate::error::{Error, Result};
use crate::identity::{AnonymousMode, AnonymousOnly, IdentityResolver, JwtIdentityResolver};
use crate::oracle::StorageVersionOracle;
use crate::service::FeedbackService;
use crate::storage::Storage;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for a ledger node.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Data directory for storage
    pub data_dir: PathBuf,

    /// HTTP API listen address
    pub api_addr: SocketAddr,

    /// Admin socket path (for ledger-admin CLI)
    pub admin_socket: PathBuf,

    /// HS256 secret for bearer credentials. Without it every caller is anonymous.
    pub jwt_secret: Option<String>,

    /// How anonymous callers map onto ledger keys
    pub anonymous_mode: AnonymousMode,

    /// Upper bound on a single HTTP request
    pub request_timeout: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        let data_dir = PathBuf::from("./ledger-data");
        Self {
            admin_socket: data_dir.join("admin.sock"),
            data_dir,
            api_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            jwt_secret: None,
            anonymous_mode: AnonymousMode::Shared,
            request_timeout: Duration::from_millis(10_000),
        }
    }
}

impl LedgerConfig {
    /// Create config from environment variables with sensible defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let data_dir = lookup("LEDGER_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);

        let api_addr = match lookup("LEDGER_API_ADDR") {
            Some(addr) => addr
                .parse()
                .map_err(|e| Error::Config(format!("Invalid LEDGER_API_ADDR '{}': {}", addr, e)))?,
            None => defaults.api_addr,
        };

        let admin_socket = lookup("LEDGER_ADMIN_SOCKET")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("admin.sock"));

        let jwt_secret = lookup("LEDGER_JWT_SECRET").filter(|s| !s.is_empty());

        let anonymous_mode = match lookup("LEDGER_ANONYMOUS_MODE") {
            Some(mode) => mode.parse()?,
            None => defaults.anonymous_mode,
        };

        let request_timeout = match lookup("LEDGER_REQUEST_TIMEOUT_MS") {
            Some(ms) => Duration::from_millis(ms.parse().map_err(|e| {
                Error::Config(format!("Invalid LEDGER_REQUEST_TIMEOUT_MS '{}': {}", ms, e))
            })?),
            None => defaults.request_timeout,
        };

        Ok(Self {
            data_dir,
            api_addr,
            admin_socket,
            jwt_secret,
            anonymous_mode,
            request_timeout,
        })
    }
}

/// Shared state for request handlers.
pub struct LedgerState {
    pub service: Arc<FeedbackService>,
    pub config: LedgerConfig,
}

impl LedgerState {
    /// Wire storage, registry-backed oracle and the configured resolver.
    pub fn new(storage: Arc<Storage>, config: LedgerConfig) -> Result<Self> {
        let resolver: Arc<dyn IdentityResolver> = match &config.jwt_secret {
            Some(secret) => Arc::new(JwtIdentityResolver::new(secret)?),
            None => {
                tracing::warn!("LEDGER_JWT_SECRET not set, all callers will be anonymous");
                Arc::new(AnonymousOnly)
            }
        };
        let oracle = Arc::new(StorageVersionOracle::new(Arc::clone(&storage)));

        let service = FeedbackService::new(storage, oracle, resolver)
            .with_anonymous_mode(config.anonymous_mode);

        Ok(Self {
            service: Arc::new(service),
            config,
        })
    }
}

/// A ledger node instance.
pub struct LedgerNode {
    state: Arc<LedgerState>,
    storage: Arc<Storage>,
    config: LedgerConfig,
}

impl LedgerNode {
    /// Create a new ledger node.
    pub async fn new(config: LedgerConfig) -> Result<Self> {
        // Ensure data directory exists
        std::fs::create_dir_all(&config.data_dir)?;

        // Open single shared storage instance
        let storage = Arc::new(Storage::open(&config.data_dir)?);

        let state = Arc::new(LedgerState::new(Arc::clone(&storage), config.clone())?);

        Ok(Self {
            state,
            storage,
            config,
        })
    }

    /// Get the shared state (for API handlers).
    pub fn state(&self) -> Arc<LedgerState> {
        Arc::clone(&self.state)
    }

    /// Get shared storage.
    pub fn storage(&self) -> Arc<Storage> {
        Arc::clone(&self.storage)
    }

    /// Run the node (starts HTTP server and admin socket).
    pub async fn run(self) -> Result<()> {
        tracing::info!("Ledger node starting");
        tracing::info!("  API: http://{}", self.config.api_addr);
        tracing::info!("  Admin: {:?}", self.config.admin_socket);
        tracing::info!("  Data: {:?}", self.config.data_dir);
        tracing::info!("  Anonymous mode: {:?}", self.config.anonymous_mode);

        let admin_socket = AdminSocket::new(self.storage(), &self.config.admin_socket);
        tokio::spawn(async move {
            if let Err(e) = admin_socket.run().await {
                tracing::error!("Admin socket error: {}", e);
            }
        });

        // Build HTTP API
        let app = api::build_router(self.state());

        // Start HTTP server
        let listener = tokio::net::TcpListener::bind(self.config.api_addr).await?;
        tracing::info!("HTTP server listening on {}", self.config.api_addr);

        axum::serve(listener, app).await?;

        Ok(())
    }
}
