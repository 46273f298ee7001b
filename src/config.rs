//! Client configuration loading and validation.

use std::fs;
use std::path::Path;
use std::time::Duration;

use base64::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default server port.
pub const DEFAULT_PORT: u16 = 443;

const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// How the transport connection to the server is carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// Plain framed carrier, no obfuscation layer.
    Clear,
    /// Obfuscated carrier supplied by an external dialer.
    Obfuscated,
}

/// Client configuration (JSON).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Server hostname or IP address.
    pub host: String,

    /// Server port (default: 443).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Base64-encoded public identity of the server.
    pub server_public_key: String,

    /// Transport mode (default: obfuscated).
    #[serde(default = "default_mode")]
    pub mode: TransportMode,

    /// Transport open timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_mode() -> TransportMode {
    TransportMode::Obfuscated
}

fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

impl ClientConfig {
    /// Load and validate a configuration from a JSON file.
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = fs::read_to_string(&path)
            .map_err(|e| Error::config(format!("failed to read {}: {e}", path.as_ref().display())))?;
        let config: ClientConfig =
            serde_json::from_str(&data).map_err(|e| Error::config(format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// The server public key must be present and decodable before any
    /// transport work begins.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::config("server host must not be empty"));
        }
        if self.port == 0 {
            return Err(Error::config("server port must not be zero"));
        }
        if self.server_public_key.trim().is_empty() {
            return Err(Error::config("server public key must not be empty"));
        }
        BASE64_STANDARD
            .decode(self.server_public_key.trim())
            .map_err(|e| Error::config(format!("server public key is not valid base64: {e}")))?;
        Ok(())
    }

    /// Resolve the validated endpoint handed to the transport dialer.
    pub fn endpoint(&self) -> Result<ServerEndpoint> {
        self.validate()?;
        let public_identity = BASE64_STANDARD
            .decode(self.server_public_key.trim())
            .map_err(|e| Error::config(format!("server public key is not valid base64: {e}")))?;
        Ok(ServerEndpoint {
            host: self.host.clone(),
            port: self.port,
            public_identity,
            mode: self.mode,
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
        })
    }
}

/// A validated server endpoint, ready for `TransportDialer::open`.
#[derive(Debug, Clone)]
pub struct ServerEndpoint {
    pub host: String,
    pub port: u16,
    /// Decoded public identity of the server.
    pub public_identity: Vec<u8>,
    pub mode: TransportMode,
    pub connect_timeout: Duration,
}
