use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ServerError, ServerResult};

/// Runtime configuration for a Satchel server.
///
/// The secret gates every mutating route and must be a 64-character hex
/// string; `satcheld` refuses to start otherwise. `destroy` and `drop` stay
/// disabled unless explicitly allowed.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Path prefix all routes are mounted under, e.g. `/dk`. Empty for root.
    pub path_prefix: String,
    pub secret: String,
    pub salt: String,
    pub allow_destroy: bool,
    pub allow_drop: bool,
    /// Seconds an upload may sit idle between chunks before it is aborted.
    pub upload_timeout_secs: u64,
    pub tls: Option<TlsConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3000".parse().unwrap(),
            path_prefix: String::new(),
            secret: String::new(),
            salt: "satchel".to_string(),
            allow_destroy: false,
            allow_drop: false,
            upload_timeout_secs: 30,
            tls: None,
        }
    }
}

impl ServerConfig {
    /// Load from a TOML file. Missing keys fall back to defaults.
    pub fn load(path: &Path) -> ServerResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| ServerError::Config(e.to_string()))
    }

    /// A secret is acceptable only as 64 hex characters (a 32-byte value).
    pub fn secret_is_valid(&self) -> bool {
        self.secret.len() == 64 && self.secret.bytes().all(|b| b.is_ascii_hexdigit())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TlsConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}
