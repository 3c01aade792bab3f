//! Server-side accept path.
//!
//! A [`ShadowServer`] answers one handshake per inbound transport: it
//! verifies the client (classic salt + PSK, or the DarkStar responder
//! flow), reads the first chunk, and parses the target address header the
//! stream opens with.

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::config::{CipherMode, ShadowConfig};
use crate::core::{
    ConfigError, FramingError, HandshakeError, ShadowError, HANDSHAKE_MESSAGE_SIZE,
};
use crate::crypto::darkstar::{ServerHandshake, ServerKeypair};
use crate::crypto::kdf::password_to_key;
use crate::transport::address::Address;
use crate::transport::stream::{
    read_exact_or_eof, EncryptedReader, EncryptedWriter, ReadOutcome, ShadowStream,
};

/// Connection acceptor for the server side.
pub struct ShadowServer {
    config: ShadowConfig,
    keypair: Option<ServerKeypair>,
}

impl ShadowServer {
    /// Build a server for a classic (password) mode.
    pub fn new(config: ShadowConfig) -> Result<Self, ConfigError> {
        if config.mode().is_darkstar() {
            return Err(ConfigError::ServerKeyRequired(config.mode().name().to_string()));
        }
        Ok(Self {
            config,
            keypair: None,
        })
    }

    /// Build a DarkStar server from its persistent keypair.
    ///
    /// The configured public key must match the keypair; a mismatch means
    /// clients were handed the wrong identity.
    pub fn with_keypair(config: ShadowConfig, keypair: ServerKeypair) -> Result<Self, ConfigError> {
        if config.mode() != CipherMode::DarkStarServer {
            return Err(ConfigError::UnsupportedMode(config.mode().name().to_string()));
        }
        config.server_addr()?;
        if config.server_public_key() != Some(keypair.public_key_bytes()) {
            return Err(ConfigError::InvalidServerKey);
        }
        Ok(Self {
            config,
            keypair: Some(keypair),
        })
    }

    /// Accept one connection over `transport`.
    ///
    /// Returns the established stream together with the target the client
    /// asked for. Any handshake or framing failure tears the connection
    /// down.
    pub async fn accept<T: AsyncRead + AsyncWrite + Unpin>(
        &self,
        mut transport: T,
    ) -> Result<(ShadowStream<T>, Address, u16), ShadowError> {
        let mode = self.config.mode();
        let mut stream = match mode {
            CipherMode::Aes128Gcm | CipherMode::Aes256Gcm | CipherMode::ChaCha20Poly1305 => {
                let password = self
                    .config
                    .password()
                    .ok_or_else(|| ConfigError::PasswordRequired(mode.name().to_string()))?;
                let psk = password_to_key(password, mode.key_len());
                let (read_half, write_half) = tokio::io::split(transport);
                ShadowStream::from_halves(
                    EncryptedReader::pending(read_half, mode, psk.clone()),
                    EncryptedWriter::pending(write_half, mode, psk),
                )
            }
            CipherMode::DarkStarServer => {
                let keypair = self
                    .keypair
                    .as_ref()
                    .ok_or_else(|| ConfigError::ServerKeyRequired(mode.name().to_string()))?;
                let endpoint = self.config.server_addr()?;
                let handshake = ServerHandshake::new(keypair.clone(), endpoint);

                let mut initiation = [0u8; HANDSHAKE_MESSAGE_SIZE];
                match read_exact_or_eof(&mut transport, &mut initiation).await? {
                    ReadOutcome::Full => {}
                    _ => return Err(HandshakeError::UnexpectedEof.into()),
                }
                let (response, key) = handshake.respond(&initiation)?;
                transport.write_all(&response).await?;
                transport.flush().await?;
                debug!(endpoint = %endpoint, "darkstar server handshake complete");

                let (read_half, write_half) = tokio::io::split(transport);
                ShadowStream::from_key(read_half, write_half, mode, &key)?
            }
            CipherMode::DarkStarClient => {
                return Err(ConfigError::UnsupportedMode(mode.name().to_string()).into());
            }
        };

        // The first chunk opens with the target address header.
        let reader = stream.reader_mut();
        if !reader.fill().await? {
            return Err(HandshakeError::UnexpectedEof.into());
        }
        let Some((address, port, consumed)) = Address::decode(reader.buffered()) else {
            return Err(FramingError::InvalidAddress.into());
        };
        reader.consume(consumed);

        debug!(target = %address, port, mode = %mode, "accepted proxied connection");
        Ok((stream, address, port))
    }
}

impl std::fmt::Debug for ShadowServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShadowServer")
            .field("mode", &self.config.mode())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ShadowClient;
    use std::net::Ipv4Addr;
    use tokio::net::TcpListener;

    fn darkstar_configs(
        keypair: &ServerKeypair,
        client_port: u16,
        server_port: u16,
    ) -> (ShadowConfig, ShadowConfig) {
        let hex_key = keypair.public_key_hex();
        let client = ShadowConfig::with_server_public_key(
            CipherMode::DarkStarClient,
            &hex_key,
            "127.0.0.1",
            client_port,
        )
        .unwrap();
        let server = ShadowConfig::with_server_public_key(
            CipherMode::DarkStarServer,
            &hex_key,
            "127.0.0.1",
            server_port,
        )
        .unwrap();
        (client, server)
    }

    async fn read_exact_plain<T: AsyncRead + AsyncWrite + Unpin>(
        stream: &mut ShadowStream<T>,
        len: usize,
    ) -> Vec<u8> {
        let mut out = vec![0u8; len];
        let mut total = 0;
        while total < len {
            let n = stream.read(&mut out[total..]).await.unwrap();
            assert_ne!(n, 0);
            total += n;
        }
        out
    }

    #[tokio::test]
    async fn test_darkstar_end_to_end() {
        let keypair = ServerKeypair::generate();
        let (client_cfg, server_cfg) = darkstar_configs(&keypair, 4433, 4433);
        let server = ShadowServer::with_keypair(server_cfg, keypair).unwrap();

        let (a, b) = tokio::io::duplex(1 << 20);

        let client_fut = async {
            let mut stream = ShadowStream::connect(a, &client_cfg).await.unwrap();
            let mut first = Address::Ipv4(Ipv4Addr::new(93, 184, 216, 34)).encode(80);
            first.extend_from_slice(b"ping");
            stream.write(&first).await.unwrap();
            let reply = read_exact_plain(&mut stream, 4).await;
            assert_eq!(reply, b"pong");
        };

        let server_fut = async {
            let (mut stream, address, port) = server.accept(b).await.unwrap();
            assert_eq!(address, Address::Ipv4(Ipv4Addr::new(93, 184, 216, 34)));
            assert_eq!(port, 80);
            let request = read_exact_plain(&mut stream, 4).await;
            assert_eq!(request, b"ping");
            stream.write(b"pong").await.unwrap();
        };

        tokio::join!(client_fut, server_fut);
    }

    #[tokio::test]
    async fn test_darkstar_endpoint_mismatch_rejected() {
        let keypair = ServerKeypair::generate();
        // Server believes it is listening one port over.
        let (client_cfg, server_cfg) = darkstar_configs(&keypair, 1234, 1235);
        let server = ShadowServer::with_keypair(server_cfg, keypair).unwrap();

        let (a, b) = tokio::io::duplex(1 << 20);
        let (client_res, server_res) =
            tokio::join!(ShadowStream::connect(a, &client_cfg), server.accept(b));

        assert!(matches!(
            server_res,
            Err(ShadowError::Handshake(HandshakeError::ConfirmationMismatch))
        ));
        // The server tore the transport down mid-handshake.
        assert!(client_res.is_err());
    }

    #[tokio::test]
    async fn test_wrong_server_identity_rejected() {
        let keypair = ServerKeypair::generate();
        let imposter = ServerKeypair::generate();
        let (_, server_cfg) = darkstar_configs(&keypair, 1234, 1234);
        let client_cfg = ShadowConfig::with_server_public_key(
            CipherMode::DarkStarClient,
            &imposter.public_key_hex(),
            "127.0.0.1",
            1234,
        )
        .unwrap();
        let server = ShadowServer::with_keypair(server_cfg, keypair).unwrap();

        let (a, b) = tokio::io::duplex(1 << 20);
        let (client_res, server_res) =
            tokio::join!(ShadowStream::connect(a, &client_cfg), server.accept(b));

        assert!(server_res.is_err());
        assert!(client_res.is_err());
    }

    #[tokio::test]
    async fn test_keypair_config_mismatch_rejected() {
        let keypair = ServerKeypair::generate();
        let other = ServerKeypair::generate();
        let (_, server_cfg) = darkstar_configs(&other, 1234, 1234);

        assert!(matches!(
            ShadowServer::with_keypair(server_cfg, keypair),
            Err(ConfigError::InvalidServerKey)
        ));
    }

    #[tokio::test]
    async fn test_malformed_address_header_rejected() {
        let config =
            ShadowConfig::with_password(CipherMode::Aes128Gcm, "pw", "127.0.0.1", 8388).unwrap();
        let server = ShadowServer::new(config.clone()).unwrap();

        let (a, b) = tokio::io::duplex(1 << 20);
        let client_fut = async {
            let mut stream = ShadowStream::connect(a, &config).await.unwrap();
            // 0xFF is not a valid address type.
            stream.write(&[0xFF, 1, 2, 3]).await.unwrap();
            stream
        };
        let (_, server_res) = tokio::join!(client_fut, server.accept(b));

        assert!(matches!(
            server_res,
            Err(ShadowError::Framing(FramingError::InvalidAddress))
        ));
    }

    #[tokio::test]
    async fn test_classic_tcp_end_to_end() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let config =
            ShadowConfig::with_password(CipherMode::ChaCha20Poly1305, "correct horse", "127.0.0.1", port)
                .unwrap();

        let server = ShadowServer::new(config.clone()).unwrap();
        let server_task = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let (mut stream, address, port) = server.accept(socket).await.unwrap();
            assert_eq!(address, Address::Domain("example.com".to_string()));
            assert_eq!(port, 443);

            let request = read_exact_plain(&mut stream, 5).await;
            assert_eq!(request, b"hello");
            stream.write(b"world").await.unwrap();
        });

        let client = ShadowClient::new(config).unwrap();
        let mut stream = client
            .connect_with(&Address::Domain("example.com".to_string()), 443, b"hello")
            .await
            .unwrap();
        let reply = read_exact_plain(&mut stream, 5).await;
        assert_eq!(reply, b"world");

        server_task.await.unwrap();
    }
}
