//! High-level client API.
//!
//! A [`ShadowClient`] holds a validated configuration and produces one
//! [`ShadowStream`] per proxied connection: it dials the server, runs the
//! session setup for the configured mode, and emits the target address
//! header as the start of the first plaintext chunk.

use tokio::net::TcpStream;
use tracing::debug;

use crate::config::{CipherMode, ShadowConfig};
use crate::core::{ConfigError, ShadowError};
use crate::transport::address::Address;
use crate::transport::stream::ShadowStream;

/// Connection factory for the client side.
#[derive(Debug, Clone)]
pub struct ShadowClient {
    config: ShadowConfig,
}

impl ShadowClient {
    /// Validate a configuration for client use.
    ///
    /// Rejects the accept-only `darkstar-server` mode, and for
    /// `darkstar-client` requires an IP endpoint up front rather than at
    /// dial time.
    pub fn new(config: ShadowConfig) -> Result<Self, ConfigError> {
        if config.mode() == CipherMode::DarkStarServer {
            return Err(ConfigError::UnsupportedMode(config.mode().name().to_string()));
        }
        if config.mode().is_darkstar() {
            config.server_addr()?;
        }
        Ok(Self { config })
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &ShadowConfig {
        &self.config
    }

    /// Open a proxied connection to `target:port`.
    pub async fn connect(
        &self,
        target: &Address,
        port: u16,
    ) -> Result<ShadowStream<TcpStream>, ShadowError> {
        self.connect_with(target, port, &[]).await
    }

    /// Open a proxied connection and coalesce `initial_data` with the
    /// address header into the first chunk.
    pub async fn connect_with(
        &self,
        target: &Address,
        port: u16,
        initial_data: &[u8],
    ) -> Result<ShadowStream<TcpStream>, ShadowError> {
        let transport =
            TcpStream::connect((self.config.server_host(), self.config.server_port())).await?;
        let mut stream = ShadowStream::connect(transport, &self.config).await?;

        let mut first = target.encode(port);
        first.extend_from_slice(initial_data);
        stream.write(&first).await?;

        debug!(target = %target, port, mode = %self.config.mode(), "proxied connection open");
        Ok(stream)
    }
}
