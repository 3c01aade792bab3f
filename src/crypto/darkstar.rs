//! DarkStar handshake.
//!
//! An ephemeral-ephemeral / ephemeral-static ECDH exchange over NIST P-256
//! that yields the session key directly, with mutual authentication via
//! confirmation codes:
//!
//! ```text
//! client -> server:  cePub(32) || CC_client(32)
//! server -> client:  sePub(32) || CC_server(32)
//! ```
//!
//! `CC_client` is a SHA-256 digest proving knowledge of the server's
//! persistent public key (and binding the chosen endpoint); `CC_server` is
//! an HMAC under the derived session key, proving the server holds the
//! persistent private key. The dual ECDH binds the session to the server's
//! long-term identity while the ephemeral half provides forward secrecy.
//!
//! Public keys travel in the 32-byte compact encoding: the x-coordinate
//! alone, with y recovered on decode as the smaller of the two square
//! roots. Key generation loops until the fresh point is representable
//! under that convention.

use std::net::{IpAddr, SocketAddr};

use hmac::{Hmac, Mac};
use p256::ecdh::{diffie_hellman, SharedSecret};
use p256::elliptic_curve::point::DecompressPoint;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::{AffinePoint, FieldBytes, PublicKey, SecretKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use subtle::{Choice, ConstantTimeEq};

use crate::core::{
    HandshakeError, CLIENT_LABEL, CONFIRMATION_CODE_SIZE, DARKSTAR_LABEL,
    HANDSHAKE_MESSAGE_SIZE, PUBLIC_KEY_SIZE, SERVER_LABEL,
};
use crate::crypto::aead::SessionKey;

type HmacSha256 = Hmac<Sha256>;

/// Deterministic byte encoding of the server's IP endpoint.
///
/// `ip_bytes || port_be16` — 6 bytes for IPv4, 18 for IPv6. The handshake
/// is undefined for non-IP endpoints; the config layer rejects them before
/// a `ServerId` is ever built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerId(Vec<u8>);

impl ServerId {
    /// Encode a socket address.
    pub fn from_endpoint(endpoint: &SocketAddr) -> Self {
        let mut bytes = match endpoint.ip() {
            IpAddr::V4(ip) => ip.octets().to_vec(),
            IpAddr::V6(ip) => ip.octets().to_vec(),
        };
        bytes.extend_from_slice(&endpoint.port().to_be_bytes());
        Self(bytes)
    }

    fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Decode a compact public key, rejecting anything that is not a valid
/// non-identity curve point.
fn decode_public(bytes: &[u8; PUBLIC_KEY_SIZE]) -> Result<PublicKey, HandshakeError> {
    let x = FieldBytes::clone_from_slice(bytes);
    let even = Option::<AffinePoint>::from(AffinePoint::decompress(&x, Choice::from(0)));
    let odd = Option::<AffinePoint>::from(AffinePoint::decompress(&x, Choice::from(1)));

    let point = match (even, odd) {
        (Some(a), Some(b)) => {
            if y_bytes(&a) <= y_bytes(&b) {
                a
            } else {
                b
            }
        }
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => return Err(HandshakeError::InvalidPeerPoint),
    };

    PublicKey::from_affine(point).map_err(|_| HandshakeError::InvalidPeerPoint)
}

fn y_bytes(point: &AffinePoint) -> [u8; 32] {
    let encoded = point.to_encoded_point(false);
    match encoded.y() {
        Some(y) => (*y).into(),
        // Identity has no affine coordinates; order it last so the
        // non-identity root wins.
        None => [0xFF; 32],
    }
}

/// The x-coordinate of a public key, i.e. its compact encoding.
fn compact_bytes(public: &PublicKey) -> [u8; PUBLIC_KEY_SIZE] {
    let encoded = public.to_encoded_point(false);
    match encoded.x() {
        Some(x) => (*x).into(),
        None => [0u8; PUBLIC_KEY_SIZE],
    }
}

/// True when decoding the x-coordinate reproduces exactly this point,
/// i.e. the point's y is the root the compact convention picks.
fn is_compactly_representable(public: &PublicKey) -> bool {
    match decode_public(&compact_bytes(public)) {
        Ok(decoded) => decoded == *public,
        Err(_) => false,
    }
}

/// Generate a keypair whose public point survives a compact round trip.
///
/// Half of all points are representable, so the loop runs twice on
/// average.
fn generate_keypair() -> (SecretKey, [u8; PUBLIC_KEY_SIZE]) {
    loop {
        let secret = SecretKey::random(&mut OsRng);
        let public = secret.public_key();
        if is_compactly_representable(&public) {
            return (secret, compact_bytes(&public));
        }
    }
}

fn ecdh(secret: &SecretKey, public: &PublicKey) -> SharedSecret {
    diffie_hellman(secret.to_nonzero_scalar(), public.as_affine())
}

/// `CC_client = SHA-256(ecdh(ce, sp) || serverId || spPub || cePub ||
/// "DarkStar" || "client")`.
fn client_confirmation(
    ephemeral_static: &SharedSecret,
    server_id: &ServerId,
    server_persistent_pub: &[u8; PUBLIC_KEY_SIZE],
    client_ephemeral_pub: &[u8; PUBLIC_KEY_SIZE],
) -> [u8; CONFIRMATION_CODE_SIZE] {
    let mut digest = Sha256::new();
    digest.update(ephemeral_static.raw_secret_bytes());
    digest.update(server_id.as_bytes());
    digest.update(server_persistent_pub);
    digest.update(client_ephemeral_pub);
    digest.update(DARKSTAR_LABEL);
    digest.update(CLIENT_LABEL);
    digest.finalize().into()
}

/// `sharedKey = SHA-256(ecdh(ce, se) || ecdh(ce, sp) || serverId ||
/// cePub || sePub || "DarkStar" || "server")`.
fn derive_session_key(
    ephemeral_ephemeral: &SharedSecret,
    ephemeral_static: &SharedSecret,
    server_id: &ServerId,
    client_ephemeral_pub: &[u8; PUBLIC_KEY_SIZE],
    server_ephemeral_pub: &[u8; PUBLIC_KEY_SIZE],
) -> SessionKey {
    let mut digest = Sha256::new();
    digest.update(ephemeral_ephemeral.raw_secret_bytes());
    digest.update(ephemeral_static.raw_secret_bytes());
    digest.update(server_id.as_bytes());
    digest.update(client_ephemeral_pub);
    digest.update(server_ephemeral_pub);
    digest.update(DARKSTAR_LABEL);
    digest.update(SERVER_LABEL);
    SessionKey::from_bytes(digest.finalize().to_vec())
}

/// `CC_server = HMAC-SHA-256(sharedKey, serverId || sePub || cePub ||
/// "DarkStar" || "server")`.
fn server_confirmation(
    session_key: &SessionKey,
    server_id: &ServerId,
    server_ephemeral_pub: &[u8; PUBLIC_KEY_SIZE],
    client_ephemeral_pub: &[u8; PUBLIC_KEY_SIZE],
) -> Result<[u8; CONFIRMATION_CODE_SIZE], HandshakeError> {
    let mut mac = HmacSha256::new_from_slice(session_key.as_bytes())
        .map_err(|_| HandshakeError::KeyDerivationFailed)?;
    mac.update(server_id.as_bytes());
    mac.update(server_ephemeral_pub);
    mac.update(client_ephemeral_pub);
    mac.update(DARKSTAR_LABEL);
    mac.update(SERVER_LABEL);
    Ok(mac.finalize().into_bytes().into())
}

/// The server's long-term P-256 keypair, distributed to clients
/// out-of-band as the hex-encoded compact public key.
#[derive(Clone)]
pub struct ServerKeypair {
    secret: SecretKey,
    public: [u8; PUBLIC_KEY_SIZE],
}

impl ServerKeypair {
    /// Generate a fresh persistent keypair.
    pub fn generate() -> Self {
        let (secret, public) = generate_keypair();
        Self { secret, public }
    }

    /// Import a persistent private scalar (32 bytes, big-endian).
    pub fn from_secret_bytes(bytes: &[u8; 32]) -> Result<Self, HandshakeError> {
        let secret =
            SecretKey::from_slice(bytes).map_err(|_| HandshakeError::KeyDerivationFailed)?;
        let public = compact_bytes(&secret.public_key());
        Ok(Self { secret, public })
    }

    /// Compact public key, as clients configure it.
    pub fn public_key_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.public
    }

    /// Hex form of the public key for distribution.
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public)
    }
}

impl std::fmt::Debug for ServerKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ServerKeypair({})", self.public_key_hex())
    }
}

/// Client (initiator) side of the handshake.
///
/// Consumed by [`finalize`](Self::finalize): the session key only exists
/// once the server's confirmation code has verified, so encrypting before
/// the handshake completes is structurally impossible.
pub struct ClientHandshake {
    server_persistent: PublicKey,
    server_persistent_bytes: [u8; PUBLIC_KEY_SIZE],
    server_id: ServerId,
    ephemeral: SecretKey,
    ephemeral_bytes: [u8; PUBLIC_KEY_SIZE],
}

impl ClientHandshake {
    /// Start a handshake toward the given server identity and endpoint.
    pub fn new(
        server_public: &[u8; PUBLIC_KEY_SIZE],
        endpoint: SocketAddr,
    ) -> Result<Self, HandshakeError> {
        let (ephemeral, ephemeral_bytes) = generate_keypair();
        Self::from_parts(server_public, endpoint, ephemeral, ephemeral_bytes)
    }

    fn from_parts(
        server_public: &[u8; PUBLIC_KEY_SIZE],
        endpoint: SocketAddr,
        ephemeral: SecretKey,
        ephemeral_bytes: [u8; PUBLIC_KEY_SIZE],
    ) -> Result<Self, HandshakeError> {
        Ok(Self {
            server_persistent: decode_public(server_public)?,
            server_persistent_bytes: *server_public,
            server_id: ServerId::from_endpoint(&endpoint),
            ephemeral,
            ephemeral_bytes,
        })
    }

    /// The first wire message: `cePub(32) || CC_client(32)`.
    pub fn initiation(&self) -> [u8; HANDSHAKE_MESSAGE_SIZE] {
        let ephemeral_static = ecdh(&self.ephemeral, &self.server_persistent);
        let code = client_confirmation(
            &ephemeral_static,
            &self.server_id,
            &self.server_persistent_bytes,
            &self.ephemeral_bytes,
        );

        let mut message = [0u8; HANDSHAKE_MESSAGE_SIZE];
        message[..PUBLIC_KEY_SIZE].copy_from_slice(&self.ephemeral_bytes);
        message[PUBLIC_KEY_SIZE..].copy_from_slice(&code);
        message
    }

    /// Process the server's response and produce the session key.
    ///
    /// Rejects invalid server ephemerals and verifies `CC_server` in
    /// constant time before any key material leaves this scope.
    pub fn finalize(
        self,
        response: &[u8; HANDSHAKE_MESSAGE_SIZE],
    ) -> Result<SessionKey, HandshakeError> {
        let mut server_ephemeral_bytes = [0u8; PUBLIC_KEY_SIZE];
        server_ephemeral_bytes.copy_from_slice(&response[..PUBLIC_KEY_SIZE]);
        let server_ephemeral = decode_public(&server_ephemeral_bytes)?;

        let ephemeral_ephemeral = ecdh(&self.ephemeral, &server_ephemeral);
        let ephemeral_static = ecdh(&self.ephemeral, &self.server_persistent);
        let session_key = derive_session_key(
            &ephemeral_ephemeral,
            &ephemeral_static,
            &self.server_id,
            &self.ephemeral_bytes,
            &server_ephemeral_bytes,
        );

        let expected = server_confirmation(
            &session_key,
            &self.server_id,
            &server_ephemeral_bytes,
            &self.ephemeral_bytes,
        )?;
        let observed = &response[PUBLIC_KEY_SIZE..];
        if !bool::from(expected.ct_eq(observed)) {
            return Err(HandshakeError::ConfirmationMismatch);
        }

        Ok(session_key)
    }
}

/// Server (responder) side of the handshake.
pub struct ServerHandshake {
    keypair: ServerKeypair,
    server_id: ServerId,
}

impl ServerHandshake {
    /// Build a responder for the listening endpoint.
    pub fn new(keypair: ServerKeypair, endpoint: SocketAddr) -> Self {
        Self {
            keypair,
            server_id: ServerId::from_endpoint(&endpoint),
        }
    }

    /// Verify the client's initiation and produce the response message
    /// plus the session key.
    pub fn respond(
        &self,
        initiation: &[u8; HANDSHAKE_MESSAGE_SIZE],
    ) -> Result<([u8; HANDSHAKE_MESSAGE_SIZE], SessionKey), HandshakeError> {
        let (ephemeral, ephemeral_bytes) = generate_keypair();
        self.respond_with_ephemeral(initiation, ephemeral, ephemeral_bytes)
    }

    fn respond_with_ephemeral(
        &self,
        initiation: &[u8; HANDSHAKE_MESSAGE_SIZE],
        ephemeral: SecretKey,
        ephemeral_bytes: [u8; PUBLIC_KEY_SIZE],
    ) -> Result<([u8; HANDSHAKE_MESSAGE_SIZE], SessionKey), HandshakeError> {
        let mut client_ephemeral_bytes = [0u8; PUBLIC_KEY_SIZE];
        client_ephemeral_bytes.copy_from_slice(&initiation[..PUBLIC_KEY_SIZE]);
        let client_ephemeral = decode_public(&client_ephemeral_bytes)?;

        // ecdh(sp, ce) == ecdh(ce, sp): verify the client's proof of the
        // persistent identity before doing any more work.
        let ephemeral_static = ecdh(&self.keypair.secret, &client_ephemeral);
        let expected = client_confirmation(
            &ephemeral_static,
            &self.server_id,
            &self.keypair.public,
            &client_ephemeral_bytes,
        );
        let observed = &initiation[PUBLIC_KEY_SIZE..];
        if !bool::from(expected.ct_eq(observed)) {
            return Err(HandshakeError::ConfirmationMismatch);
        }

        let ephemeral_ephemeral = ecdh(&ephemeral, &client_ephemeral);
        let session_key = derive_session_key(
            &ephemeral_ephemeral,
            &ephemeral_static,
            &self.server_id,
            &client_ephemeral_bytes,
            &ephemeral_bytes,
        );

        let code = server_confirmation(
            &session_key,
            &self.server_id,
            &ephemeral_bytes,
            &client_ephemeral_bytes,
        )?;
        let mut response = [0u8; HANDSHAKE_MESSAGE_SIZE];
        response[..PUBLIC_KEY_SIZE].copy_from_slice(&ephemeral_bytes);
        response[PUBLIC_KEY_SIZE..].copy_from_slice(&code);

        Ok((response, session_key))
    }
}
