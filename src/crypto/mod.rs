//! Cryptographic core: key derivation, AEAD chunk engine, nonce
//! discipline, and the DarkStar handshake.

pub mod aead;
pub mod darkstar;
pub mod kdf;
pub mod nonce;

pub use aead::{ChunkCipher, SessionKey};
pub use darkstar::{ClientHandshake, ServerHandshake, ServerId, ServerKeypair};
pub use kdf::{generate_salt, password_to_key, session_subkey};
pub use nonce::NonceCounter;
