//! Plaintext Dogecoin message transport.
//!
//! The transport deals in [`RawMessage`]s: it frames outgoing payloads and
//! validates incoming headers (magic, size limit, checksum) but leaves payload
//! interpretation to the caller, since that depends on the negotiated protocol
//! version.

use crate::message::{MessageHeader, ProtocolError, RawMessage, HEADER_SIZE};
use bitcoin::p2p::Magic;
use std::fmt;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Error types specific to the transport layer.
#[derive(Debug)]
pub enum TransportError {
    /// IO error during read/write operations.
    Io(io::Error),
    /// The peer sent bytes that violate the framing rules.
    Protocol(ProtocolError),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Io(e) => write!(f, "IO error: {e}"),
            TransportError::Protocol(e) => write!(f, "protocol error: {e}"),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransportError::Io(e) => Some(e),
            TransportError::Protocol(e) => Some(e),
        }
    }
}

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        TransportError::Io(err)
    }
}

impl From<ProtocolError> for TransportError {
    fn from(err: ProtocolError) -> Self {
        TransportError::Protocol(err)
    }
}

/// Progress of a read, kept across calls so that a `read` dropped by
/// `tokio::select!` resumes where it left off.
#[derive(Debug)]
enum ReceiveState {
    ReadingHeader {
        header: [u8; HEADER_SIZE],
        bytes_read: usize,
    },
    ReadingPayload {
        header: MessageHeader,
        payload: Vec<u8>,
        bytes_read: usize,
    },
}

impl ReceiveState {
    fn reading_header() -> Self {
        ReceiveState::ReadingHeader {
            header: [0u8; HEADER_SIZE],
            bytes_read: 0,
        }
    }

    /// Only called with a header whose length was already bounded.
    fn reading_payload(header: MessageHeader) -> Self {
        let payload = vec![0u8; header.length as usize];
        ReceiveState::ReadingPayload {
            header,
            payload,
            bytes_read: 0,
        }
    }
}

/// Sender half of the transport.
#[derive(Debug, Clone)]
pub struct AsyncTransportWriter<W> {
    network_magic: Magic,
    writer: W,
}

impl<W> AsyncTransportWriter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(network_magic: Magic, writer: W) -> Self {
        Self {
            network_magic,
            writer,
        }
    }

    /// Frame and write a message, flushing the underlying writer.
    pub async fn write(&mut self, message: &RawMessage) -> Result<(), TransportError> {
        let data = message.encode(self.network_magic);
        self.writer.write_all(&data).await?;
        self.writer.flush().await?;
        Ok(())
    }
}

/// Receiver half of the transport.
#[derive(Debug)]
pub struct AsyncTransportReader<R> {
    network_magic: Magic,
    receive_state: ReceiveState,
    reader: R,
}

impl<R> AsyncTransportReader<R>
where
    R: AsyncRead + Unpin + Send,
{
    pub fn new(network_magic: Magic, reader: R) -> Self {
        Self {
            network_magic,
            receive_state: ReceiveState::reading_header(),
            reader,
        }
    }

    /// Read the next framed message.
    ///
    /// This function is cancellation safe, it can be used with `tokio::select!`
    /// without losing partially read data.
    ///
    /// # Errors
    ///
    /// * [`ProtocolError::BadMagic`] and [`ProtocolError::MessageTooLarge`] are raised
    ///   as soon as the header is complete, before the payload is read.
    /// * [`ProtocolError::ChecksumMismatch`] once the payload is complete.
    /// * `UnexpectedEof` IO errors when the stream closes mid-message.
    pub async fn read(&mut self) -> Result<RawMessage, TransportError> {
        loop {
            match &mut self.receive_state {
                ReceiveState::ReadingHeader { header, bytes_read } => {
                    while *bytes_read < HEADER_SIZE {
                        let n = self.reader.read(&mut header[*bytes_read..]).await?;
                        if n == 0 {
                            return Err(TransportError::Io(io::Error::new(
                                io::ErrorKind::UnexpectedEof,
                                "connection closed while reading header",
                            )));
                        }
                        *bytes_read += n;
                    }

                    let decoded = MessageHeader::decode(header, self.network_magic);
                    // Start over on the next call, the stream is unusable either way.
                    let decoded = match decoded {
                        Ok(decoded) => decoded,
                        Err(e) => {
                            self.receive_state = ReceiveState::reading_header();
                            return Err(e.into());
                        }
                    };
                    self.receive_state = ReceiveState::reading_payload(decoded);
                }

                ReceiveState::ReadingPayload {
                    header,
                    payload,
                    bytes_read,
                } => {
                    while *bytes_read < payload.len() {
                        let n = self.reader.read(&mut payload[*bytes_read..]).await?;
                        if n == 0 {
                            return Err(TransportError::Io(io::Error::new(
                                io::ErrorKind::UnexpectedEof,
                                "connection closed while reading payload",
                            )));
                        }
                        *bytes_read += n;
                    }

                    let verified = header.verify(payload);
                    let state =
                        std::mem::replace(&mut self.receive_state, ReceiveState::reading_header());
                    verified?;
                    if let ReceiveState::ReadingPayload {
                        header, payload, ..
                    } = state
                    {
                        return Ok(RawMessage {
                            command: header.command,
                            payload,
                        });
                    }
                }
            }
        }
    }
}

/// Plaintext transport over any `AsyncRead` and `AsyncWrite` pair.
///
/// # Examples
///
/// ```rust
/// use dogemap_connection::message::{dogecoin_magic, NetworkMessage, PingMessage};
/// use dogemap_connection::AsyncTransport;
/// use tokio::net::TcpStream;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let stream = TcpStream::connect("127.0.0.1:22556").await?;
/// let (reader, writer) = stream.into_split();
/// let mut transport = AsyncTransport::new(dogecoin_magic(), reader, writer);
///
/// let ping = NetworkMessage::Ping(PingMessage::new(42)).into_raw(70015);
/// transport.write(&ping).await?;
///
/// let response = transport.read().await?;
/// println!("received {}", response.command);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct AsyncTransport<R, W> {
    writer: AsyncTransportWriter<W>,
    reader: AsyncTransportReader<R>,
}

impl<R, W> AsyncTransport<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(network_magic: Magic, reader: R, writer: W) -> Self {
        Self {
            writer: AsyncTransportWriter::new(network_magic, writer),
            reader: AsyncTransportReader::new(network_magic, reader),
        }
    }

    /// Read the next framed message. Cancellation safe.
    pub async fn read(&mut self) -> Result<RawMessage, TransportError> {
        self.reader.read().await
    }

    pub async fn write(&mut self, message: &RawMessage) -> Result<(), TransportError> {
        self.writer.write(message).await
    }

    /// Split this transport into separate reader and writer halves.
    pub fn into_split(self) -> (AsyncTransportReader<R>, AsyncTransportWriter<W>) {
        (self.reader, self.writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{dogecoin_magic, encode_message, MAX_MESSAGE_SIZE};
    use tokio_test::io::Builder as MockIoBuilder;

    fn ping_bytes(magic: Magic, nonce: u64) -> Vec<u8> {
        encode_message(magic, "ping", &nonce.to_le_bytes())
    }

    #[tokio::test]
    async fn test_basic_message_receive() {
        let message_bytes = ping_bytes(dogecoin_magic(), 42);
        let mock_reader = MockIoBuilder::new().read(&message_bytes).build();
        let mut transport = AsyncTransport::new(dogecoin_magic(), mock_reader, Vec::new());

        let received = transport.read().await.unwrap();
        assert_eq!(received.command, "ping");
        assert_eq!(received.payload, 42u64.to_le_bytes());
    }

    #[tokio::test]
    async fn test_send_message() {
        let mock_reader = MockIoBuilder::new().build();
        let mut transport = AsyncTransport::new(dogecoin_magic(), mock_reader, Vec::new());

        let message = RawMessage::new("ping", 42u64.to_le_bytes().to_vec());
        transport.write(&message).await.unwrap();

        let (_, writer) = transport.into_split();
        assert_eq!(writer.writer, ping_bytes(dogecoin_magic(), 42));
    }

    #[tokio::test]
    async fn test_magic_mismatch() {
        let message_bytes = ping_bytes(Magic::BITCOIN, 42);
        // Only the header is consumed before the error.
        let mock_reader = MockIoBuilder::new()
            .read(&message_bytes[..HEADER_SIZE])
            .build();
        let mut transport = AsyncTransport::new(dogecoin_magic(), mock_reader, Vec::new());

        let result = transport.read().await;
        assert!(matches!(
            result,
            Err(TransportError::Protocol(ProtocolError::BadMagic(_)))
        ));
    }

    #[tokio::test]
    async fn test_oversized_message_rejected_from_header() {
        let mut header = encode_message(dogecoin_magic(), "addr", &[]);
        header[16..20].copy_from_slice(&(MAX_MESSAGE_SIZE + 1).to_le_bytes());
        let mock_reader = MockIoBuilder::new().read(&header).build();
        let mut transport = AsyncTransport::new(dogecoin_magic(), mock_reader, Vec::new());

        let result = transport.read().await;
        assert!(matches!(
            result,
            Err(TransportError::Protocol(ProtocolError::MessageTooLarge(_)))
        ));
    }

    #[tokio::test]
    async fn test_checksum_mismatch() {
        let mut message_bytes = ping_bytes(dogecoin_magic(), 42);
        let last = message_bytes.len() - 1;
        message_bytes[last] ^= 0x01;
        let mock_reader = MockIoBuilder::new().read(&message_bytes).build();
        let mut transport = AsyncTransport::new(dogecoin_magic(), mock_reader, Vec::new());

        let result = transport.read().await;
        assert!(matches!(
            result,
            Err(TransportError::Protocol(ProtocolError::ChecksumMismatch { .. }))
        ));
    }

    #[tokio::test]
    async fn test_unexpected_eof_during_header() {
        let mock_reader = MockIoBuilder::new().read(&[0; 10]).build();
        let mut transport = AsyncTransport::new(dogecoin_magic(), mock_reader, Vec::new());

        let result = transport.read().await;
        assert!(matches!(result, Err(TransportError::Io(_))));
    }

    #[tokio::test]
    async fn test_unexpected_eof_during_payload() {
        let mut message_bytes = ping_bytes(dogecoin_magic(), 42);
        message_bytes.truncate(HEADER_SIZE + 2);
        let mock_reader = MockIoBuilder::new().read(&message_bytes).build();
        let mut transport = AsyncTransport::new(dogecoin_magic(), mock_reader, Vec::new());

        let result = transport.read().await;
        assert!(matches!(result, Err(TransportError::Io(_))));
    }

    #[tokio::test]
    async fn test_byte_at_a_time() {
        let message_bytes = ping_bytes(dogecoin_magic(), 7);
        let mut mock_reader = MockIoBuilder::new();
        for i in 0..message_bytes.len() {
            mock_reader.read(&message_bytes[i..i + 1]);
        }
        let mut transport = AsyncTransport::new(dogecoin_magic(), mock_reader.build(), Vec::new());

        let received = transport.read().await.unwrap();
        assert_eq!(received.payload, 7u64.to_le_bytes());
    }

    #[tokio::test]
    async fn test_multiple_messages() {
        let mut combined = ping_bytes(dogecoin_magic(), 42);
        combined.extend_from_slice(&encode_message(dogecoin_magic(), "verack", &[]));

        let mock_reader = MockIoBuilder::new().read(&combined).build();
        let (mut reader, _) =
            AsyncTransport::new(dogecoin_magic(), mock_reader, Vec::new()).into_split();

        assert_eq!(reader.read().await.unwrap().command, "ping");
        let verack = reader.read().await.unwrap();
        assert_eq!(verack.command, "verack");
        assert!(verack.payload.is_empty());
    }
}
