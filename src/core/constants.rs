//! Protocol constants.
//!
//! These values are fixed by the Shadowsocks AEAD and DarkStar wire formats
//! and MUST NOT be changed.

// =============================================================================
// AEAD FRAMING
// =============================================================================

/// Maximum plaintext bytes per chunk (0x4000).
pub const MAX_PAYLOAD_SIZE: usize = 0x4000;

/// Encrypted length-field size (big-endian u16).
pub const LENGTH_SIZE: usize = 2;

/// AEAD authentication tag size (GCM and Poly1305).
pub const AEAD_TAG_SIZE: usize = 16;

/// AEAD nonce size (96-bit, all supported ciphers).
pub const AEAD_NONCE_SIZE: usize = 12;

/// Wire size of the encrypted length block (`len_ct || len_tag`).
pub const LENGTH_BLOCK_SIZE: usize = LENGTH_SIZE + AEAD_TAG_SIZE;

/// Largest possible chunk on the wire (full payload plus both tags).
pub const MAX_CHUNK_WIRE_SIZE: usize = LENGTH_BLOCK_SIZE + MAX_PAYLOAD_SIZE + AEAD_TAG_SIZE;

// =============================================================================
// KEY DERIVATION
// =============================================================================

/// Key and salt size for AES-128-GCM.
pub const KEY_SIZE_128: usize = 16;

/// Key and salt size for AES-256-GCM and ChaCha20-Poly1305.
pub const KEY_SIZE_256: usize = 32;

/// HKDF info string for per-session subkey derivation.
pub const SUBKEY_INFO: &[u8] = b"ss-subkey";

// =============================================================================
// DARKSTAR HANDSHAKE
// =============================================================================

/// Compact P-256 public key size (x-coordinate only).
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Confirmation code size (SHA-256 / HMAC-SHA-256 output).
pub const CONFIRMATION_CODE_SIZE: usize = 32;

/// Size of each handshake message (`pub(32) || code(32)`).
pub const HANDSHAKE_MESSAGE_SIZE: usize = PUBLIC_KEY_SIZE + CONFIRMATION_CODE_SIZE;

/// Session key size produced by the handshake.
pub const DARKSTAR_KEY_SIZE: usize = 32;

/// Protocol label mixed into every DarkStar digest.
pub const DARKSTAR_LABEL: &[u8] = b"DarkStar";

/// Direction label for the client confirmation code.
pub const CLIENT_LABEL: &[u8] = b"client";

/// Direction label for the server confirmation code and session key.
pub const SERVER_LABEL: &[u8] = b"server";

// =============================================================================
// TARGET ADDRESS HEADER
// =============================================================================

/// Address type: IPv4, 4-byte address.
pub const ATYP_IPV4: u8 = 0x01;

/// Address type: domain name, 1-byte length prefix.
pub const ATYP_DOMAIN: u8 = 0x03;

/// Address type: IPv6, 16-byte address.
pub const ATYP_IPV6: u8 = 0x04;
