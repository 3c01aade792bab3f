//! # Shadow Transport
//!
//! A Shadowsocks-compatible obfuscating proxy transport: an
//! authenticated, confidential byte stream over TCP whose traffic is
//! indistinguishable from random bytes to a passive observer and
//! resistant to active probing. It provides:
//!
//! - **Framing**: length-prefixed AEAD chunks with per-direction counter
//!   nonces (AES-128/256-GCM, ChaCha20-Poly1305)
//! - **Compatibility**: upstream `EVP_BytesToKey` + HKDF-SHA1
//!   (`"ss-subkey"`) key derivation and the classic salt-prefixed wire
//!   layout
//! - **DarkStar**: an ephemeral/static ECDH handshake over P-256 with
//!   mutual authentication via confirmation codes and forward secrecy,
//!   replacing the password-derived key entirely
//! - **Duplex**: independent read/write halves, one key and nonce
//!   counter per direction
//!
//! ## Modules
//!
//! - [`core`]: constants and error types
//! - [`config`]: cipher modes and connection configuration
//! - [`crypto`]: KDF, AEAD chunk engine, nonce counters, DarkStar
//! - [`transport`]: address codec and the encrypted stream wrapper
//! - [`client`] / [`server`]: connection factories
//!
//! ## Example
//!
//! ```no_run
//! use shadow_transport::prelude::*;
//!
//! # async fn run() -> Result<(), ShadowError> {
//! let config = ShadowConfig::with_password(
//!     CipherMode::Aes256Gcm,
//!     "correct horse battery staple",
//!     "proxy.example.com",
//!     8388,
//! )?;
//!
//! let client = ShadowClient::new(config)?;
//! let mut stream = client
//!     .connect(&Address::Domain("example.com".into()), 443)
//!     .await?;
//!
//! stream.write(b"...").await?;
//! let mut buf = [0u8; 4096];
//! let n = stream.read(&mut buf).await?;
//! # let _ = n;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod core;

pub mod config;

pub mod crypto;

pub mod transport;

pub mod client;

pub mod server;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::client::ShadowClient;
    pub use crate::config::{CipherMode, ShadowConfig};
    pub use crate::core::{ConfigError, FramingError, HandshakeError, ShadowError};
    pub use crate::crypto::{ServerKeypair, SessionKey};
    pub use crate::server::ShadowServer;
    pub use crate::transport::{Address, ShadowStream};
}

// Re-export commonly used items at crate root
pub use crate::client::ShadowClient;
pub use crate::config::{CipherMode, ShadowConfig};
pub use crate::core::ShadowError;
pub use crate::crypto::ServerKeypair;
pub use crate::server::ShadowServer;
pub use crate::transport::{Address, ShadowStream};
