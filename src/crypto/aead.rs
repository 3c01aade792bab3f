//! AEAD chunk engine.
//!
//! Every application byte travels inside a length-prefixed chunk:
//!
//! ```text
//! [ len_ct (2) | len_tag (16) | payload_ct (1..16384) | payload_tag (16) ]
//! ```
//!
//! The length field is a big-endian u16 of the payload size, sealed and
//! opened as its own AEAD message. Each chunk therefore consumes two
//! consecutive nonces from the direction's counter.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes128Gcm, Aes256Gcm, Nonce};
use chacha20poly1305::ChaCha20Poly1305;
use zeroize::Zeroize;

use crate::config::CipherMode;
use crate::core::{
    FramingError, HandshakeError, ShadowError, AEAD_NONCE_SIZE, LENGTH_BLOCK_SIZE, LENGTH_SIZE,
    MAX_PAYLOAD_SIZE,
};
use crate::crypto::nonce::NonceCounter;

/// Symmetric key material for one direction of one connection.
///
/// Zeroized on drop.
#[derive(Clone)]
pub struct SessionKey {
    bytes: Vec<u8>,
}

impl SessionKey {
    /// Wrap raw key bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Raw key bytes. Handle with care.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Key length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True if the key is empty (never the case for a derived key).
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl Drop for SessionKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key material stays out of logs.
        write!(f, "SessionKey({} bytes)", self.bytes.len())
    }
}

/// Mode-dispatched AEAD instance.
enum AeadCipher {
    Aes128(Aes128Gcm),
    Aes256(Aes256Gcm),
    ChaCha(ChaCha20Poly1305),
}

impl AeadCipher {
    fn new(mode: CipherMode, key: &SessionKey) -> Result<Self, HandshakeError> {
        match mode {
            CipherMode::Aes128Gcm => Aes128Gcm::new_from_slice(key.as_bytes())
                .map(AeadCipher::Aes128)
                .map_err(|_| HandshakeError::KeyDerivationFailed),
            // The DarkStar handshake yields a 32-byte key and the framed
            // stream runs AES-256-GCM over it; only key establishment
            // differs from the classic mode.
            CipherMode::Aes256Gcm | CipherMode::DarkStarClient | CipherMode::DarkStarServer => {
                Aes256Gcm::new_from_slice(key.as_bytes())
                    .map(AeadCipher::Aes256)
                    .map_err(|_| HandshakeError::KeyDerivationFailed)
            }
            CipherMode::ChaCha20Poly1305 => ChaCha20Poly1305::new_from_slice(key.as_bytes())
                .map(AeadCipher::ChaCha)
                .map_err(|_| HandshakeError::KeyDerivationFailed),
        }
    }

    fn seal(&self, nonce: &[u8; AEAD_NONCE_SIZE], plaintext: &[u8]) -> Result<Vec<u8>, FramingError> {
        let nonce = Nonce::from_slice(nonce);
        match self {
            AeadCipher::Aes128(c) => c.encrypt(nonce, plaintext),
            AeadCipher::Aes256(c) => c.encrypt(nonce, plaintext),
            AeadCipher::ChaCha(c) => c.encrypt(nonce, plaintext),
        }
        .map_err(|_| FramingError::Authentication)
    }

    fn open(&self, nonce: &[u8; AEAD_NONCE_SIZE], ciphertext: &[u8]) -> Result<Vec<u8>, FramingError> {
        let nonce = Nonce::from_slice(nonce);
        match self {
            AeadCipher::Aes128(c) => c.decrypt(nonce, ciphertext),
            AeadCipher::Aes256(c) => c.decrypt(nonce, ciphertext),
            AeadCipher::ChaCha(c) => c.decrypt(nonce, ciphertext),
        }
        .map_err(|_| FramingError::Authentication)
    }
}

/// Chunk packer/unpacker for one direction of a connection.
///
/// Owns the direction's key and nonce counter; the opposite direction
/// holds its own instance and the two never share state.
pub struct ChunkCipher {
    cipher: AeadCipher,
    nonce: NonceCounter,
}

impl ChunkCipher {
    /// Build a chunk cipher for the given mode and session key.
    pub fn new(mode: CipherMode, key: &SessionKey) -> Result<Self, HandshakeError> {
        Ok(Self {
            cipher: AeadCipher::new(mode, key)?,
            nonce: NonceCounter::new(),
        })
    }

    /// Seal one plaintext chunk into its wire form.
    ///
    /// The payload must be 1..=16384 bytes; callers with more data
    /// pre-chunk it.
    pub fn pack(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, ShadowError> {
        if plaintext.is_empty() {
            return Err(FramingError::LengthOutOfRange(0).into());
        }
        if plaintext.len() > MAX_PAYLOAD_SIZE {
            return Err(ShadowError::PayloadTooLarge(plaintext.len()));
        }

        let len_be = (plaintext.len() as u16).to_be_bytes();
        let mut wire = Vec::with_capacity(LENGTH_BLOCK_SIZE + plaintext.len() + 16);

        let nonce = self.nonce.next()?;
        wire.extend_from_slice(&self.cipher.seal(&nonce, &len_be).map_err(ShadowError::from)?);
        let nonce = self.nonce.next()?;
        wire.extend_from_slice(&self.cipher.seal(&nonce, plaintext).map_err(ShadowError::from)?);

        Ok(wire)
    }

    /// Open an encrypted length block and validate the recovered length.
    pub fn open_length(&mut self, block: &[u8]) -> Result<usize, ShadowError> {
        if block.len() != LENGTH_BLOCK_SIZE {
            return Err(FramingError::Authentication.into());
        }
        let nonce = self.nonce.next()?;
        let len_bytes = self.cipher.open(&nonce, block)?;
        if len_bytes.len() != LENGTH_SIZE {
            return Err(FramingError::Authentication.into());
        }

        let len = u16::from_be_bytes([len_bytes[0], len_bytes[1]]) as usize;
        if len == 0 || len > MAX_PAYLOAD_SIZE {
            return Err(FramingError::LengthOutOfRange(len).into());
        }
        Ok(len)
    }

    /// Open an encrypted payload block.
    pub fn open_payload(&mut self, block: &[u8]) -> Result<Vec<u8>, ShadowError> {
        let nonce = self.nonce.next()?;
        Ok(self.cipher.open(&nonce, block)?)
    }

    /// Current nonce counter value for this direction.
    pub fn nonce_value(&self) -> u64 {
        self.nonce.value()
    }
}
