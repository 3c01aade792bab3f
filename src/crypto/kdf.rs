//! Password and session key derivation.
//!
//! Two stages, both upstream-compatible:
//!
//! 1. `EVP_BytesToKey` turns a human password into a fixed-size pre-shared
//!    key via iterated MD5. Kept for wire compatibility only; its role is
//!    reduced to sizing the password.
//! 2. HKDF-SHA1 with info `"ss-subkey"` mixes the PSK with the
//!    per-connection salt into the AEAD session key.

use hkdf::Hkdf;
use md5::{Digest, Md5};
use rand::rngs::OsRng;
use rand::RngCore;
use sha1::Sha1;

use crate::core::{HandshakeError, SUBKEY_INFO};
use crate::crypto::aead::SessionKey;

/// Derive a pre-shared key from a password (EVP_BytesToKey, MD5).
///
/// `D_1 = MD5(password)`, `D_i = MD5(D_{i-1} || password)`; concatenate
/// and truncate to `key_len`.
pub fn password_to_key(password: &str, key_len: usize) -> SessionKey {
    let mut key = Vec::with_capacity(key_len + 16);
    let mut prev: Option<[u8; 16]> = None;

    while key.len() < key_len {
        let mut hasher = Md5::new();
        if let Some(ref block) = prev {
            hasher.update(block);
        }
        hasher.update(password.as_bytes());
        let block: [u8; 16] = hasher.finalize().into();
        key.extend_from_slice(&block);
        prev = Some(block);
    }

    key.truncate(key_len);
    SessionKey::from_bytes(key)
}

/// Derive the per-session AEAD key from the PSK and the connection salt.
///
/// HKDF-SHA1 per RFC 5869: extract with the salt, expand with the
/// `"ss-subkey"` info string to the PSK's own length.
pub fn session_subkey(
    psk: &SessionKey,
    salt: &[u8],
    key_len: usize,
) -> Result<SessionKey, HandshakeError> {
    let hk = Hkdf::<Sha1>::new(Some(salt), psk.as_bytes());
    let mut okm = vec![0u8; key_len];
    hk.expand(SUBKEY_INFO, &mut okm)
        .map_err(|_| HandshakeError::KeyDerivationFailed)?;
    Ok(SessionKey::from_bytes(okm))
}

/// Generate a fresh random salt of the given length.
pub fn generate_salt(len: usize) -> Vec<u8> {
    let mut salt = vec![0u8; len];
    OsRng.fill_bytes(&mut salt);
    salt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_to_key_vectors() {
        // Upstream shadowsocks reference vectors.
        assert_eq!(
            password_to_key("test", 16).as_bytes(),
            hex::decode("098f6bcd4621d373cade4e832627b4f6").unwrap()
        );
        assert_eq!(
            password_to_key("password", 16).as_bytes(),
            hex::decode("5f4dcc3b5aa765d61d8327deb882cf99").unwrap()
        );
        assert_eq!(
            password_to_key("password", 32).as_bytes(),
            hex::decode("5f4dcc3b5aa765d61d8327deb882cf992b95990a9151374abd8ff8c5a7a0fe08")
                .unwrap()
        );
        assert_eq!(
            password_to_key("foobar", 32).as_bytes(),
            hex::decode("3858f62230ac3c915f300c664312c63f568378529614d22ddb49237d2f60bfdf")
                .unwrap()
        );
    }

    #[test]
    fn test_hkdf_sha1_rfc5869_case_4() {
        // RFC 5869 A.4: SHA-1, short inputs.
        let ikm = hex::decode("0b0b0b0b0b0b0b0b0b0b0b").unwrap();
        let salt = hex::decode("000102030405060708090a0b0c").unwrap();
        let info = hex::decode("f0f1f2f3f4f5f6f7f8f9").unwrap();

        let hk = Hkdf::<Sha1>::new(Some(&salt), &ikm);
        let mut okm = [0u8; 42];
        hk.expand(&info, &mut okm).unwrap();

        assert_eq!(
            okm.to_vec(),
            hex::decode(
                "085a01ea1b10f36933068b56efa5ad81a4f14b822f5b091568a9cdd4f155fda2c22e422478d305f3f896"
            )
            .unwrap()
        );
    }

    #[test]
    fn test_hkdf_sha1_rfc5869_case_5() {
        // RFC 5869 A.5: SHA-1, long inputs.
        let ikm: Vec<u8> = (0x00u8..0x50).collect();
        let salt: Vec<u8> = (0x60u8..0xb0).collect();
        let info: Vec<u8> = (0xb0u8..=0xff).collect();

        let hk = Hkdf::<Sha1>::new(Some(&salt), &ikm);
        let mut okm = [0u8; 82];
        hk.expand(&info, &mut okm).unwrap();

        assert_eq!(
            okm.to_vec(),
            hex::decode(
                "0bd770a74d1160f7c9f12cd5912a06ebff6adcae899d92191fe4305673ba2ffe\
                 8fa3f1a4e5ad79f3f334b3b202b2173c486ea37ce3d397ed034c7f9dfeb15c5e\
                 927336d0441f4c4300e2cff0d0900b52d3b4"
            )
            .unwrap()
        );
    }

    #[test]
    fn test_session_subkey_known_answer() {
        // PSK from password "password", all-zero 16-byte salt.
        let psk = password_to_key("password", 16);
        let subkey = session_subkey(&psk, &[0u8; 16], 16).unwrap();
        assert_eq!(
            subkey.as_bytes(),
            hex::decode("501ffe6120d190cf3d925631a9e704e2").unwrap()
        );
    }

    #[test]
    fn test_session_subkey_salt_sensitivity() {
        let psk = password_to_key("password", 32);
        let a = session_subkey(&psk, &[0u8; 32], 32).unwrap();
        let b = session_subkey(&psk, &[1u8; 32], 32).unwrap();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_generate_salt() {
        let a = generate_salt(32);
        let b = generate_salt(32);
        assert_eq!(a.len(), 32);
        // Collision probability is negligible.
        assert_ne!(a, b);
    }
}
