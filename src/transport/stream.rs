//! Encrypted stream wrapper.
//!
//! Wraps a reliable bidirectional byte stream in the framed AEAD
//! protocol. The two directions are fully independent: each half owns
//! its own key and nonce counter, so a connection can be split into a
//! read half and a write half that proceed concurrently.
//!
//! Classic modes exchange salts lazily: the writer emits its salt
//! immediately before the first chunk, the reader consumes the peer's
//! salt immediately before the first chunk. DarkStar connections run the
//! handshake up front and carry no salts.
//!
//! Every error is fatal: the failing half drops its key material and
//! refuses further operations.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tracing::{debug, trace};

use crate::config::{CipherMode, ShadowConfig};
use crate::core::{
    ConfigError, FramingError, HandshakeError, ShadowError, AEAD_TAG_SIZE,
    HANDSHAKE_MESSAGE_SIZE, LENGTH_BLOCK_SIZE, MAX_PAYLOAD_SIZE,
};
use crate::crypto::aead::{ChunkCipher, SessionKey};
use crate::crypto::darkstar::ClientHandshake;
use crate::crypto::kdf::{generate_salt, password_to_key, session_subkey};

/// Result of an exact-read attempt that distinguishes a clean EOF on a
/// boundary from one inside a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReadOutcome {
    /// The buffer was filled completely.
    Full,
    /// EOF before the first byte.
    CleanEof,
    /// EOF after at least one byte.
    TruncatedEof,
}

/// Read exactly `buf.len()` bytes, reporting where EOF struck.
pub(crate) async fn read_exact_or_eof<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut [u8],
) -> std::io::Result<ReadOutcome> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            return Ok(if filled == 0 {
                ReadOutcome::CleanEof
            } else {
                ReadOutcome::TruncatedEof
            });
        }
        filled += n;
    }
    Ok(ReadOutcome::Full)
}

enum WriterState {
    /// Classic mode before the first chunk: salt not yet on the wire.
    Pending { mode: CipherMode, psk: SessionKey },
    Ready(ChunkCipher),
    Failed,
}

/// Encrypting write half of a connection.
pub struct EncryptedWriter<W> {
    inner: W,
    state: WriterState,
}

impl<W: AsyncWrite + Unpin> EncryptedWriter<W> {
    pub(crate) fn pending(inner: W, mode: CipherMode, psk: SessionKey) -> Self {
        Self {
            inner,
            state: WriterState::Pending { mode, psk },
        }
    }

    pub(crate) fn ready(
        inner: W,
        mode: CipherMode,
        key: &SessionKey,
    ) -> Result<Self, ShadowError> {
        Ok(Self {
            inner,
            state: WriterState::Ready(ChunkCipher::new(mode, key)?),
        })
    }

    /// Encrypt and send `data`, slicing it into chunks of at most 16384
    /// plaintext bytes.
    pub async fn write(&mut self, data: &[u8]) -> Result<(), ShadowError> {
        if data.is_empty() {
            return Ok(());
        }
        match self.write_inner(data).await {
            Ok(()) => Ok(()),
            Err(e) => {
                // Drop key material and latch.
                self.state = WriterState::Failed;
                Err(e)
            }
        }
    }

    async fn write_inner(&mut self, data: &[u8]) -> Result<(), ShadowError> {
        if let WriterState::Pending { mode, psk } = &self.state {
            let mode = *mode;
            let salt = generate_salt(mode.salt_len().unwrap_or(mode.key_len()));
            let key = session_subkey(psk, &salt, mode.key_len())?;
            let cipher = ChunkCipher::new(mode, &key)?;
            self.inner.write_all(&salt).await?;
            self.state = WriterState::Ready(cipher);
            debug!(mode = %mode, "send salt emitted");
        }

        match &mut self.state {
            WriterState::Ready(cipher) => {
                for chunk in data.chunks(MAX_PAYLOAD_SIZE) {
                    let wire = cipher.pack(chunk)?;
                    self.inner.write_all(&wire).await?;
                    trace!(len = chunk.len(), "chunk sent");
                }
                self.inner.flush().await?;
                Ok(())
            }
            _ => Err(FramingError::Terminated.into()),
        }
    }
}

enum ReaderState {
    /// Classic mode before the first chunk: peer salt not yet consumed.
    PendingSalt { mode: CipherMode, psk: SessionKey },
    Ready(ChunkCipher),
    Failed,
}

/// Decrypting read half of a connection.
pub struct EncryptedReader<R> {
    inner: R,
    state: ReaderState,
    buffer: Vec<u8>,
    pos: usize,
}

impl<R: AsyncRead + Unpin> EncryptedReader<R> {
    pub(crate) fn pending(inner: R, mode: CipherMode, psk: SessionKey) -> Self {
        Self {
            inner,
            state: ReaderState::PendingSalt { mode, psk },
            buffer: Vec::new(),
            pos: 0,
        }
    }

    pub(crate) fn ready(
        inner: R,
        mode: CipherMode,
        key: &SessionKey,
    ) -> Result<Self, ShadowError> {
        Ok(Self {
            inner,
            state: ReaderState::Ready(ChunkCipher::new(mode, key)?),
            buffer: Vec::new(),
            pos: 0,
        })
    }

    /// Read up to `out.len()` decrypted bytes.
    ///
    /// Returns 0 only at a clean end-of-stream on a chunk boundary;
    /// mid-chunk EOF and any authentication failure are errors.
    pub async fn read(&mut self, out: &mut [u8]) -> Result<usize, ShadowError> {
        if out.is_empty() {
            return Ok(0);
        }
        while self.pos >= self.buffer.len() {
            if !self.fill().await? {
                return Ok(0);
            }
        }

        let n = out.len().min(self.buffer.len() - self.pos);
        out[..n].copy_from_slice(&self.buffer[self.pos..self.pos + n]);
        self.pos += n;
        if self.pos == self.buffer.len() {
            self.buffer.clear();
            self.pos = 0;
        }
        Ok(n)
    }

    /// Decrypted bytes pulled but not yet consumed.
    pub(crate) fn buffered(&self) -> &[u8] {
        &self.buffer[self.pos..]
    }

    /// Discard `n` buffered bytes.
    pub(crate) fn consume(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.buffer.len());
        if self.pos == self.buffer.len() {
            self.buffer.clear();
            self.pos = 0;
        }
    }

    /// Pull and verify one chunk into the internal buffer.
    ///
    /// Returns false at a clean end-of-stream.
    pub(crate) async fn fill(&mut self) -> Result<bool, ShadowError> {
        match self.fill_inner().await {
            Ok(more) => Ok(more),
            Err(e) => {
                // Drop key material and latch.
                self.state = ReaderState::Failed;
                Err(e)
            }
        }
    }

    async fn fill_inner(&mut self) -> Result<bool, ShadowError> {
        if let ReaderState::PendingSalt { mode, psk } = &self.state {
            let mode = *mode;
            let mut salt = vec![0u8; mode.salt_len().unwrap_or(mode.key_len())];
            match read_exact_or_eof(&mut self.inner, &mut salt).await? {
                ReadOutcome::Full => {}
                // The peer closed without sending anything.
                ReadOutcome::CleanEof => return Ok(false),
                ReadOutcome::TruncatedEof => {
                    return Err(HandshakeError::UnexpectedEof.into());
                }
            }
            let key = session_subkey(psk, &salt, mode.key_len())?;
            let cipher = ChunkCipher::new(mode, &key)?;
            self.state = ReaderState::Ready(cipher);
            debug!(mode = %mode, "peer salt consumed");
        }

        let ReaderState::Ready(cipher) = &mut self.state else {
            return Err(FramingError::Terminated.into());
        };

        let mut length_block = [0u8; LENGTH_BLOCK_SIZE];
        match read_exact_or_eof(&mut self.inner, &mut length_block).await? {
            ReadOutcome::Full => {}
            ReadOutcome::CleanEof => return Ok(false),
            ReadOutcome::TruncatedEof => return Err(FramingError::TruncatedChunk.into()),
        }
        let len = cipher.open_length(&length_block)?;

        let mut payload_block = vec![0u8; len + AEAD_TAG_SIZE];
        match read_exact_or_eof(&mut self.inner, &mut payload_block).await? {
            ReadOutcome::Full => {}
            // EOF between the length block and its payload is still
            // mid-chunk.
            _ => return Err(FramingError::TruncatedChunk.into()),
        }

        self.buffer = cipher.open_payload(&payload_block)?;
        self.pos = 0;
        trace!(len, "chunk received");
        Ok(true)
    }
}

/// An established encrypted connection over a reliable byte stream.
pub struct ShadowStream<T> {
    reader: EncryptedReader<ReadHalf<T>>,
    writer: EncryptedWriter<WriteHalf<T>>,
}

impl<T: AsyncRead + AsyncWrite + Unpin> ShadowStream<T> {
    /// Establish the client side of a connection over `transport`.
    ///
    /// Classic modes involve no up-front IO; DarkStar runs its handshake
    /// here and fails the connection on any mismatch.
    pub async fn connect(mut transport: T, config: &ShadowConfig) -> Result<Self, ShadowError> {
        let mode = config.mode();
        match mode {
            CipherMode::Aes128Gcm | CipherMode::Aes256Gcm | CipherMode::ChaCha20Poly1305 => {
                let password = config
                    .password()
                    .ok_or_else(|| ConfigError::PasswordRequired(mode.name().to_string()))?;
                let psk = password_to_key(password, mode.key_len());
                let (read_half, write_half) = tokio::io::split(transport);
                Ok(Self {
                    reader: EncryptedReader::pending(read_half, mode, psk.clone()),
                    writer: EncryptedWriter::pending(write_half, mode, psk),
                })
            }
            CipherMode::DarkStarClient => {
                let server_key = config
                    .server_public_key()
                    .ok_or_else(|| ConfigError::ServerKeyRequired(mode.name().to_string()))?;
                let endpoint = config.server_addr()?;

                let handshake = ClientHandshake::new(server_key, endpoint)?;
                transport.write_all(&handshake.initiation()).await?;
                transport.flush().await?;

                let mut response = [0u8; HANDSHAKE_MESSAGE_SIZE];
                match read_exact_or_eof(&mut transport, &mut response).await? {
                    ReadOutcome::Full => {}
                    _ => return Err(HandshakeError::UnexpectedEof.into()),
                }
                let key = handshake.finalize(&response)?;
                debug!(endpoint = %endpoint, "darkstar client handshake complete");

                let (read_half, write_half) = tokio::io::split(transport);
                Self::from_key(read_half, write_half, mode, &key)
            }
            // The server side of DarkStar answers handshakes; it cannot
            // originate one.
            CipherMode::DarkStarServer => {
                Err(ConfigError::UnsupportedMode(mode.name().to_string()).into())
            }
        }
    }

    pub(crate) fn from_key(
        read_half: ReadHalf<T>,
        write_half: WriteHalf<T>,
        mode: CipherMode,
        key: &SessionKey,
    ) -> Result<Self, ShadowError> {
        Ok(Self {
            reader: EncryptedReader::ready(read_half, mode, key)?,
            writer: EncryptedWriter::ready(write_half, mode, key)?,
        })
    }

    pub(crate) fn from_halves(
        reader: EncryptedReader<ReadHalf<T>>,
        writer: EncryptedWriter<WriteHalf<T>>,
    ) -> Self {
        Self { reader, writer }
    }

    /// Encrypt and send `data`.
    pub async fn write(&mut self, data: &[u8]) -> Result<(), ShadowError> {
        self.writer.write(data).await
    }

    /// Read up to `out.len()` decrypted bytes; 0 means clean end-of-stream.
    pub async fn read(&mut self, out: &mut [u8]) -> Result<usize, ShadowError> {
        self.reader.read(out).await
    }

    /// Split into independent read and write halves.
    pub fn into_split(
        self,
    ) -> (
        EncryptedReader<ReadHalf<T>>,
        EncryptedWriter<WriteHalf<T>>,
    ) {
        (self.reader, self.writer)
    }

    pub(crate) fn reader_mut(&mut self) -> &mut EncryptedReader<ReadHalf<T>> {
        &mut self.reader
    }
}
