//! The wire codec and framer bound to a byte stream

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::time::Instant;

use super::framer::{FrameDecoder, FramedReader, ReadOutcome};
use super::{Received, SessionTransport};
use crate::codec::{DecodeOptions, Encoder, Field, ProtocolMessage, decode};
use crate::error::TransportError;

/// [`SessionTransport`] over any async byte stream
pub struct FramedTransport<S> {
    reader: FramedReader<ReadHalf<S>>,
    writer: WriteHalf<S>,
    encoder: Encoder,
    decode: DecodeOptions,
}

impl<S> FramedTransport<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    pub fn new(
        stream: S,
        encoder: Encoder,
        decode: DecodeOptions,
        read_timeout: Duration,
        max_body_len: usize,
    ) -> Self {
        let (read_half, writer) = tokio::io::split(stream);
        let decoder = FrameDecoder::new(encoder.begin_string()).with_max_body_len(max_body_len);
        Self {
            reader: FramedReader::new(read_half, decoder, read_timeout),
            writer,
            encoder,
            decode,
        }
    }

    fn decode_frame(&self, frame: &[u8]) -> Option<ProtocolMessage> {
        match decode(frame, &self.decode) {
            Ok(msg) => {
                debug!("<- {}", msg.to_log_string());
                Some(msg)
            }
            Err(e) => {
                warn!("Dropping undecodable message: {e}");
                None
            }
        }
    }
}

#[async_trait]
impl<S> SessionTransport for FramedTransport<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    async fn send(&mut self, msg_type: &str, fields: &[Field]) -> Result<u64, TransportError> {
        let encoded = self.encoder.encode(msg_type, fields);
        self.writer.write_all(&encoded.bytes).await?;
        self.writer.flush().await?;
        debug!("-> {} seq={}", msg_type, encoded.seq_num);
        Ok(encoded.seq_num)
    }

    async fn next_message(&mut self) -> Result<Option<ProtocolMessage>, TransportError> {
        loop {
            let Some(frame) = self.reader.next_frame().await? else {
                return Ok(None);
            };
            if let Some(msg) = self.decode_frame(&frame) {
                return Ok(Some(msg));
            }
        }
    }

    async fn recv(&mut self, deadline: Option<Instant>) -> Result<Received, TransportError> {
        loop {
            match self.reader.read_frame(deadline).await? {
                ReadOutcome::Frame(frame) => {
                    if let Some(msg) = self.decode_frame(&frame) {
                        return Ok(Received::Message(msg));
                    }
                }
                ReadOutcome::Idle => return Ok(Received::Idle),
                ReadOutcome::Closed => return Ok(Received::Closed),
            }
        }
    }

    fn reset_sequence(&mut self) {
        self.encoder.reset();
    }

    fn next_seq_num(&self) -> u64 {
        self.encoder.next_seq_num()
    }

    async fn close(&mut self) {
        if let Err(e) = self.writer.shutdown().await {
            debug!("Shutdown of write half failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::tags;

    fn pair() -> (
        FramedTransport<tokio::io::DuplexStream>,
        FramedTransport<tokio::io::DuplexStream>,
    ) {
        let (a, b) = tokio::io::duplex(4096);
        let client = FramedTransport::new(
            a,
            Encoder::new("FIX.4.4", "CLIENT", "VENUE"),
            DecodeOptions::strict(),
            Duration::from_millis(100),
            1 << 16,
        );
        let venue = FramedTransport::new(
            b,
            Encoder::new("FIX.4.4", "VENUE", "CLIENT"),
            DecodeOptions::strict(),
            Duration::from_millis(100),
            1 << 16,
        );
        (client, venue)
    }

    #[tokio::test]
    async fn test_send_and_receive() {
        let (mut client, mut venue) = pair();

        assert_eq!(client.send("0", &[]).await.unwrap(), 1);
        assert_eq!(
            client
                .send("1", &[Field::new(tags::TEST_REQ_ID, "TEST_9")])
                .await
                .unwrap(),
            2
        );
        assert_eq!(client.next_seq_num(), 3);

        let first = venue.next_message().await.unwrap().unwrap();
        assert_eq!(first.msg_type(), Some("0"));
        let second = venue.next_message().await.unwrap().unwrap();
        assert_eq!(second.get(tags::TEST_REQ_ID), Some("TEST_9"));
        assert_eq!(second.seq_num(), Some(2));

        assert!(matches!(venue.recv(None).await.unwrap(), Received::Idle));

        client.close().await;
        assert!(matches!(venue.recv(None).await.unwrap(), Received::Closed));
    }

    /// A test request whose checksum digits no longer match its bytes
    fn tampered_frame(encoder: &mut Encoder) -> Vec<u8> {
        let mut bytes = encoder
            .encode("1", &[Field::new(tags::TEST_REQ_ID, "TEST_bad")])
            .bytes
            .to_vec();
        let digits = bytes.len() - 4..bytes.len() - 1;
        let sum: u32 = std::str::from_utf8(&bytes[digits.clone()]).unwrap().parse().unwrap();
        let wrong = format!("{:03}", (sum + 1) % 256);
        bytes[digits].copy_from_slice(wrong.as_bytes());
        bytes
    }

    async fn receive_after_tampered(options: DecodeOptions) -> ProtocolMessage {
        let (a, mut raw) = tokio::io::duplex(4096);
        let mut transport = FramedTransport::new(
            a,
            Encoder::new("FIX.4.4", "CLIENT", "VENUE"),
            options,
            Duration::from_millis(100),
            1 << 16,
        );

        let mut encoder = Encoder::new("FIX.4.4", "VENUE", "CLIENT");
        let bad = tampered_frame(&mut encoder);
        let good = encoder.encode("1", &[Field::new(tags::TEST_REQ_ID, "TEST_good")]);
        raw.write_all(&bad).await.unwrap();
        raw.write_all(&good.bytes).await.unwrap();

        transport.next_message().await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_strict_mode_drops_bad_checksum_frame() {
        let msg = receive_after_tampered(DecodeOptions::strict()).await;
        assert_eq!(msg.get(tags::TEST_REQ_ID), Some("TEST_good"));
        assert_eq!(msg.seq_num(), Some(2));
    }

    #[tokio::test]
    async fn test_tolerant_mode_keeps_bad_checksum_frame() {
        let msg = receive_after_tampered(DecodeOptions::default()).await;
        assert_eq!(msg.get(tags::TEST_REQ_ID), Some("TEST_bad"));
        assert_eq!(msg.seq_num(), Some(1));
    }

    #[tokio::test]
    async fn test_reset_sequence() {
        let (mut client, _venue) = pair();
        client.send("0", &[]).await.unwrap();
        client.reset_sequence();
        assert_eq!(client.next_seq_num(), 1);
    }
}
