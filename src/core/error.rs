//! Error types for the shadow transport.

use thiserror::Error;

/// Errors raised while validating or using a [`ShadowConfig`].
///
/// [`ShadowConfig`]: crate::config::ShadowConfig
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Unknown or unsupported cipher mode name.
    #[error("unsupported cipher mode: {0}")]
    UnsupportedMode(String),

    /// The selected mode requires a password.
    #[error("cipher mode {0} requires a password")]
    PasswordRequired(String),

    /// The selected mode requires the server's persistent public key.
    #[error("cipher mode {0} requires a server public key")]
    ServerKeyRequired(String),

    /// The server public key is not 32 hex-decoded bytes.
    #[error("invalid server public key: expected 32 hex-encoded bytes")]
    InvalidServerKey,

    /// DarkStar binds the handshake to an IP endpoint; hostnames are
    /// undefined for it.
    #[error("DarkStar requires an IP endpoint, got {0:?}")]
    NonIpEndpoint(String),
}

/// Errors raised while establishing a session.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// A received public key did not decode to a valid curve point.
    #[error("invalid peer public key")]
    InvalidPeerPoint,

    /// A confirmation code did not match its local recomputation.
    #[error("confirmation code mismatch")]
    ConfirmationMismatch,

    /// The peer closed the connection before the handshake completed.
    #[error("unexpected end of stream during handshake")]
    UnexpectedEof,

    /// Key derivation produced no usable key material.
    #[error("key derivation failed")]
    KeyDerivationFailed,
}

/// Errors in the framed-stream layer.
///
/// Every framing error is fatal to the connection; there is no recovery
/// at this layer.
#[derive(Debug, Error)]
pub enum FramingError {
    /// A decrypted chunk length fell outside `1..=16384`.
    #[error("chunk length {0} out of range")]
    LengthOutOfRange(usize),

    /// AEAD tag verification failed on a length or payload block.
    #[error("chunk authentication failed")]
    Authentication,

    /// The transport hit EOF in the middle of a chunk.
    #[error("stream truncated mid-chunk")]
    TruncatedChunk,

    /// The target address header could not be decoded.
    #[error("malformed target address header")]
    InvalidAddress,

    /// The 64-bit nonce counter would overflow.
    #[error("nonce counter exhausted")]
    NonceExhausted,

    /// The connection previously failed; no further operations are
    /// possible on it.
    #[error("connection is in a terminal failed state")]
    Terminated,
}

/// Top-level transport errors.
#[derive(Debug, Error)]
pub enum ShadowError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Handshake error.
    #[error("handshake error: {0}")]
    Handshake(#[from] HandshakeError),

    /// Framing error.
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),

    /// Caller handed `pack` more than 16384 bytes in one call.
    #[error("payload too large: {0} bytes exceeds 16384")]
    PayloadTooLarge(usize),

    /// Underlying transport failure, surfaced transparently.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
