//! Cipher modes and connection configuration.

use std::fmt;
use std::net::{IpAddr, SocketAddr};

use crate::core::{ConfigError, KEY_SIZE_128, KEY_SIZE_256, PUBLIC_KEY_SIZE};

/// Cipher suite selector.
///
/// Determines key length, salt length, and how the session key is
/// established: the three classic modes derive it from a password and a
/// cleartext salt, the DarkStar modes run an ECDH handshake instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherMode {
    /// AES-128-GCM, 16-byte key and salt.
    Aes128Gcm,
    /// AES-256-GCM, 32-byte key and salt.
    Aes256Gcm,
    /// ChaCha20-Poly1305 (IETF), 32-byte key and salt.
    ChaCha20Poly1305,
    /// DarkStar handshake, client side.
    DarkStarClient,
    /// DarkStar handshake, server side.
    DarkStarServer,
}

impl CipherMode {
    /// Parse an upstream-compatible method name.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        match s.to_ascii_lowercase().as_str() {
            "aes-128-gcm" => Ok(CipherMode::Aes128Gcm),
            "aes-256-gcm" => Ok(CipherMode::Aes256Gcm),
            "chacha20-ietf-poly1305" | "chacha20-poly1305" => Ok(CipherMode::ChaCha20Poly1305),
            "darkstar-client" => Ok(CipherMode::DarkStarClient),
            "darkstar-server" => Ok(CipherMode::DarkStarServer),
            other => Err(ConfigError::UnsupportedMode(other.to_string())),
        }
    }

    /// Session key length in bytes.
    pub fn key_len(self) -> usize {
        match self {
            CipherMode::Aes128Gcm => KEY_SIZE_128,
            CipherMode::Aes256Gcm | CipherMode::ChaCha20Poly1305 => KEY_SIZE_256,
            CipherMode::DarkStarClient | CipherMode::DarkStarServer => KEY_SIZE_256,
        }
    }

    /// Cleartext salt length for classic modes; `None` for DarkStar,
    /// whose handshake replaces the salt exchange.
    pub fn salt_len(self) -> Option<usize> {
        match self {
            CipherMode::DarkStarClient | CipherMode::DarkStarServer => None,
            classic => Some(classic.key_len()),
        }
    }

    /// True for the two handshake modes.
    pub fn is_darkstar(self) -> bool {
        matches!(self, CipherMode::DarkStarClient | CipherMode::DarkStarServer)
    }

    /// Canonical method name.
    pub fn name(self) -> &'static str {
        match self {
            CipherMode::Aes128Gcm => "aes-128-gcm",
            CipherMode::Aes256Gcm => "aes-256-gcm",
            CipherMode::ChaCha20Poly1305 => "chacha20-ietf-poly1305",
            CipherMode::DarkStarClient => "darkstar-client",
            CipherMode::DarkStarServer => "darkstar-server",
        }
    }
}

impl fmt::Display for CipherMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Connection configuration. Immutable after creation.
#[derive(Clone)]
pub struct ShadowConfig {
    mode: CipherMode,
    password: Option<String>,
    server_public_key: Option<[u8; PUBLIC_KEY_SIZE]>,
    server_host: String,
    server_port: u16,
}

impl ShadowConfig {
    /// Build a configuration for a classic (password) mode.
    pub fn with_password(
        mode: CipherMode,
        password: impl Into<String>,
        server_host: impl Into<String>,
        server_port: u16,
    ) -> Result<Self, ConfigError> {
        if mode.is_darkstar() {
            return Err(ConfigError::ServerKeyRequired(mode.name().to_string()));
        }
        Ok(Self {
            mode,
            password: Some(password.into()),
            server_public_key: None,
            server_host: server_host.into(),
            server_port,
        })
    }

    /// Build a configuration for a DarkStar mode. The server's persistent
    /// public key is the 32-byte compact point, hex-encoded as distributed
    /// out-of-band.
    pub fn with_server_public_key(
        mode: CipherMode,
        server_public_key_hex: &str,
        server_host: impl Into<String>,
        server_port: u16,
    ) -> Result<Self, ConfigError> {
        if !mode.is_darkstar() {
            return Err(ConfigError::PasswordRequired(mode.name().to_string()));
        }
        let decoded = hex::decode(server_public_key_hex.trim())
            .map_err(|_| ConfigError::InvalidServerKey)?;
        let key: [u8; PUBLIC_KEY_SIZE] =
            decoded.try_into().map_err(|_| ConfigError::InvalidServerKey)?;
        Ok(Self {
            mode,
            password: None,
            server_public_key: Some(key),
            server_host: server_host.into(),
            server_port,
        })
    }

    /// The configured cipher mode.
    pub fn mode(&self) -> CipherMode {
        self.mode
    }

    /// Password for classic modes.
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    /// Server persistent public key for DarkStar modes.
    pub fn server_public_key(&self) -> Option<&[u8; PUBLIC_KEY_SIZE]> {
        self.server_public_key.as_ref()
    }

    /// Server host as configured (IP literal or hostname).
    pub fn server_host(&self) -> &str {
        &self.server_host
    }

    /// Server port.
    pub fn server_port(&self) -> u16 {
        self.server_port
    }

    /// The server endpoint as a socket address.
    ///
    /// DarkStar binds its handshake to the IP endpoint bytes, so the host
    /// must be an IP literal here; classic modes may resolve hostnames at
    /// dial time instead.
    pub fn server_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self
            .server_host
            .parse()
            .map_err(|_| ConfigError::NonIpEndpoint(self.server_host.clone()))?;
        Ok(SocketAddr::new(ip, self.server_port))
    }
}

impl fmt::Debug for ShadowConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The password stays out of logs and panics.
        f.debug_struct("ShadowConfig")
            .field("mode", &self.mode)
            .field("server_host", &self.server_host)
            .field("server_port", &self.server_port)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parse() {
        assert_eq!(CipherMode::parse("aes-128-gcm").unwrap(), CipherMode::Aes128Gcm);
        assert_eq!(CipherMode::parse("AES-256-GCM").unwrap(), CipherMode::Aes256Gcm);
        assert_eq!(
            CipherMode::parse("chacha20-ietf-poly1305").unwrap(),
            CipherMode::ChaCha20Poly1305
        );
        assert_eq!(
            CipherMode::parse("darkstar-client").unwrap(),
            CipherMode::DarkStarClient
        );
        assert_eq!(
            CipherMode::parse("darkstar-server").unwrap(),
            CipherMode::DarkStarServer
        );
        assert!(matches!(
            CipherMode::parse("rc4-md5"),
            Err(ConfigError::UnsupportedMode(_))
        ));
    }

    #[test]
    fn test_mode_lengths() {
        assert_eq!(CipherMode::Aes128Gcm.key_len(), 16);
        assert_eq!(CipherMode::Aes256Gcm.key_len(), 32);
        assert_eq!(CipherMode::ChaCha20Poly1305.key_len(), 32);
        assert_eq!(CipherMode::DarkStarClient.key_len(), 32);

        assert_eq!(CipherMode::Aes128Gcm.salt_len(), Some(16));
        assert_eq!(CipherMode::Aes256Gcm.salt_len(), Some(32));
        assert_eq!(CipherMode::DarkStarClient.salt_len(), None);
        assert_eq!(CipherMode::DarkStarServer.salt_len(), None);
    }

    #[test]
    fn test_password_config() {
        let config =
            ShadowConfig::with_password(CipherMode::Aes256Gcm, "secret", "example.com", 8388)
                .unwrap();
        assert_eq!(config.password(), Some("secret"));
        assert!(config.server_public_key().is_none());

        // Hostname endpoints are fine for classic modes but have no
        // socket-address form.
        assert!(config.server_addr().is_err());
    }

    #[test]
    fn test_password_config_rejects_darkstar() {
        assert!(ShadowConfig::with_password(
            CipherMode::DarkStarClient,
            "secret",
            "127.0.0.1",
            1234
        )
        .is_err());
    }

    #[test]
    fn test_server_key_config() {
        let key_hex = "6ce869e559b215588ca1db4be62cffa8c68c08d74b2a507551a73341845eb3d6";
        let config = ShadowConfig::with_server_public_key(
            CipherMode::DarkStarClient,
            key_hex,
            "127.0.0.1",
            1234,
        )
        .unwrap();
        assert_eq!(
            config.server_public_key().unwrap().as_slice(),
            hex::decode(key_hex).unwrap().as_slice()
        );
        assert_eq!(config.server_addr().unwrap().port(), 1234);
    }

    #[test]
    fn test_server_key_config_rejects_bad_key() {
        assert!(ShadowConfig::with_server_public_key(
            CipherMode::DarkStarClient,
            "not-hex",
            "127.0.0.1",
            1234
        )
        .is_err());
        assert!(ShadowConfig::with_server_public_key(
            CipherMode::DarkStarClient,
            "aabb",
            "127.0.0.1",
            1234
        )
        .is_err());
    }

    #[test]
    fn test_darkstar_requires_ip_endpoint() {
        let key_hex = "6ce869e559b215588ca1db4be62cffa8c68c08d74b2a507551a73341845eb3d6";
        let config = ShadowConfig::with_server_public_key(
            CipherMode::DarkStarClient,
            key_hex,
            "proxy.example.com",
            1234,
        )
        .unwrap();
        assert!(matches!(
            config.server_addr(),
            Err(ConfigError::NonIpEndpoint(_))
        ));
    }
}
