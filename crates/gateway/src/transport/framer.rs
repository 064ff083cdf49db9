//! Byte-stream to message framing
//!
//! TCP may split one message across reads or pack several into one read.
//! [`FrameDecoder`] accumulates bytes and slices out complete messages using
//! the declared body length; [`FramedReader`] drives it from a socket.

use std::time::Duration;

use bytes::{Buf, Bytes, BytesMut};
use log::warn;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::Instant;

use crate::codec::SOH;
use crate::error::TransportError;

/// `10=nnn<SOH>`
pub const CHECKSUM_FIELD_LEN: usize = 7;

pub const DEFAULT_MAX_BODY_LEN: usize = 1 << 20;

const READ_CHUNK: usize = 4096;

/// Accumulating frame splitter
#[derive(Debug)]
pub struct FrameDecoder {
    buf: BytesMut,
    start_marker: Vec<u8>,
    max_body_len: usize,
}

impl FrameDecoder {
    /// Frames start with `8=<begin_string><SOH>`
    pub fn new(begin_string: &str) -> Self {
        let mut start_marker = Vec::with_capacity(begin_string.len() + 3);
        start_marker.extend_from_slice(b"8=");
        start_marker.extend_from_slice(begin_string.as_bytes());
        start_marker.push(SOH);
        Self {
            buf: BytesMut::with_capacity(READ_CHUNK),
            start_marker,
            max_body_len: DEFAULT_MAX_BODY_LEN,
        }
    }

    pub fn with_max_body_len(mut self, max_body_len: usize) -> Self {
        self.max_body_len = max_body_len;
        self
    }

    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Buffer to read socket data into
    pub fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buf
    }

    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Slice the next complete message off the buffer, if one is there
    pub fn next_frame(&mut self) -> Option<Bytes> {
        loop {
            let Some(start) = find(&self.buf, &self.start_marker) else {
                // Keep a tail that could be the beginning of a split marker
                let keep = self.start_marker.len() - 1;
                if self.buf.len() > keep {
                    let drop = self.buf.len() - keep;
                    warn!("Discarding {drop} bytes with no message start");
                    self.buf.advance(drop);
                }
                return None;
            };
            if start > 0 {
                warn!("Discarding {start} bytes before message start");
                self.buf.advance(start);
            }

            let len_start = self.start_marker.len();
            if self.buf.len() < len_start + 2 {
                return None;
            }
            if &self.buf[len_start..len_start + 2] != b"9=" {
                warn!("Body length does not follow begin string, resyncing");
                self.buf.advance(1);
                continue;
            }

            let Some(len_end) = self.buf[len_start..]
                .iter()
                .position(|b| *b == SOH)
                .map(|p| p + len_start)
            else {
                if self.buf.len() - len_start > 2 + 20 {
                    warn!("Unterminated body length field, resyncing");
                    self.buf.advance(1);
                    continue;
                }
                return None;
            };

            let body_len = match std::str::from_utf8(&self.buf[len_start + 2..len_end])
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
            {
                Some(n) if n <= self.max_body_len => n,
                other => {
                    warn!("Invalid body length {other:?}, resyncing");
                    self.buf.advance(1);
                    continue;
                }
            };

            let header_end = len_end + 1;
            let total = header_end + body_len + CHECKSUM_FIELD_LEN;
            if self.buf.len() < total {
                return None;
            }

            let trailer = &self.buf[header_end + body_len..total];
            if trailer.starts_with(b"10=") && trailer[CHECKSUM_FIELD_LEN - 1] == SOH {
                return Some(self.buf.split_to(total).freeze());
            }

            // Declared length disagrees with where the trailer actually is
            match find(&self.buf[header_end..], b"\x0110=") {
                Some(pos) => {
                    let trailer_start = header_end + pos + 1;
                    let end = trailer_start + CHECKSUM_FIELD_LEN;
                    if self.buf.len() < end {
                        return None;
                    }
                    warn!(
                        "Declared body length {} but trailer found after {} bytes",
                        body_len,
                        trailer_start - header_end
                    );
                    return Some(self.buf.split_to(end).freeze());
                }
                None => {
                    warn!("No trailer where body length {body_len} points, resyncing");
                    self.buf.advance(1);
                }
            }
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Result of one bounded read
#[derive(Debug)]
pub enum ReadOutcome {
    Frame(Bytes),
    /// Read timeout elapsed with nothing complete
    Idle,
    /// Peer closed the stream
    Closed,
}

/// Frame reader over an async byte stream
pub struct FramedReader<R> {
    inner: R,
    decoder: FrameDecoder,
    read_timeout: Duration,
}

impl<R: AsyncRead + Unpin> FramedReader<R> {
    pub fn new(inner: R, decoder: FrameDecoder, read_timeout: Duration) -> Self {
        Self {
            inner,
            decoder,
            read_timeout,
        }
    }

    /// Next complete frame, `None` at end of stream.
    ///
    /// Cancellation safe: bytes already read stay buffered in the decoder.
    pub async fn next_frame(&mut self) -> Result<Option<Bytes>, TransportError> {
        loop {
            if let Some(frame) = self.decoder.next_frame() {
                return Ok(Some(frame));
            }
            let buf = self.decoder.buffer_mut();
            buf.reserve(READ_CHUNK);
            if self.inner.read_buf(buf).await? == 0 {
                return Ok(None);
            }
        }
    }

    /// Read with the configured read timeout.
    ///
    /// Without a deadline a quiet socket yields [`ReadOutcome::Idle`]; with a
    /// deadline that has passed it fails with [`TransportError::Timeout`].
    pub async fn read_frame(
        &mut self,
        deadline: Option<Instant>,
    ) -> Result<ReadOutcome, TransportError> {
        let wait = match deadline {
            Some(d) => {
                let now = Instant::now();
                if d <= now {
                    return Err(TransportError::Timeout);
                }
                (d - now).min(self.read_timeout)
            }
            None => self.read_timeout,
        };

        match tokio::time::timeout(wait, self.next_frame()).await {
            Ok(Ok(Some(frame))) => Ok(ReadOutcome::Frame(frame)),
            Ok(Ok(None)) => Ok(ReadOutcome::Closed),
            Ok(Err(e)) => Err(e),
            Err(_) => match deadline {
                Some(d) if Instant::now() >= d => Err(TransportError::Timeout),
                _ => Ok(ReadOutcome::Idle),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Encoder, Field};
    use tokio::io::AsyncWriteExt;

    fn sample(seq_offset: usize) -> Bytes {
        let mut encoder = Encoder::new("FIX.4.4", "VENUE", "CLIENT");
        for _ in 0..seq_offset {
            encoder.encode("0", &[]);
        }
        encoder
            .encode(
                "W",
                &[
                    Field::new(55, "EURUSD"),
                    Field::new(268, "1"),
                    Field::new(269, "0"),
                    Field::new(270, "1.0850"),
                    Field::new(271, "1"),
                ],
            )
            .bytes
    }

    fn split_into(data: &[u8], chunks: usize) -> Vec<&[u8]> {
        let size = data.len().div_ceil(chunks);
        data.chunks(size.max(1)).collect()
    }

    #[test]
    fn test_fragmentation_yields_identical_frame() {
        let message = sample(0);
        for chunks in [1, 2, 50] {
            let mut decoder = FrameDecoder::new("FIX.4.4");
            let mut frames = Vec::new();
            for chunk in split_into(&message, chunks) {
                decoder.extend(chunk);
                while let Some(frame) = decoder.next_frame() {
                    frames.push(frame);
                }
            }
            assert_eq!(frames.len(), 1, "chunks={chunks}");
            assert_eq!(frames[0], message);
            assert_eq!(decoder.buffered(), 0);
        }
    }

    #[test]
    fn test_coalesced_messages_in_order() {
        let first = sample(0);
        let second = sample(1);
        let mut decoder = FrameDecoder::new("FIX.4.4");
        let mut joined = first.to_vec();
        joined.extend_from_slice(&second);
        joined.extend_from_slice(&second[..10]);
        decoder.extend(&joined);

        assert_eq!(decoder.next_frame().unwrap(), first);
        assert_eq!(decoder.next_frame().unwrap(), second);
        assert!(decoder.next_frame().is_none());
        assert_eq!(decoder.buffered(), 10);
    }

    #[test]
    fn test_garbage_before_start_is_discarded() {
        let message = sample(0);
        let mut decoder = FrameDecoder::new("FIX.4.4");
        decoder.extend(b"noise\x01more-noise");
        assert!(decoder.next_frame().is_none());
        decoder.extend(&message);
        assert_eq!(decoder.next_frame().unwrap(), message);
    }

    #[test]
    fn test_wrong_declared_length_recovers_at_trailer() {
        let message = sample(0);
        let text = String::from_utf8(message.to_vec()).unwrap();
        let declared = text.split('\x01').nth(1).unwrap().to_string();
        let len: usize = declared[2..].parse().unwrap();
        let broken = text.replacen(&declared, &format!("9={}", len - 5), 1);

        let mut decoder = FrameDecoder::new("FIX.4.4");
        decoder.extend(broken.as_bytes());
        let frame = decoder.next_frame().unwrap();
        assert!(frame.ends_with(&message[message.len() - CHECKSUM_FIELD_LEN..]));
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_oversized_length_is_skipped() {
        let mut decoder = FrameDecoder::new("FIX.4.4").with_max_body_len(16);
        decoder.extend(b"8=FIX.4.4\x019=999\x0135=0\x01");
        assert!(decoder.next_frame().is_none());
        let message = sample(0);
        let mut big = FrameDecoder::new("FIX.4.4");
        big.extend(&message);
        assert!(big.next_frame().is_some());
    }

    #[tokio::test]
    async fn test_reader_over_stream() {
        let message = sample(0);
        let (mut client, server) = tokio::io::duplex(64);
        let mut reader = FramedReader::new(
            server,
            FrameDecoder::new("FIX.4.4"),
            Duration::from_millis(200),
        );

        let payload = message.clone();
        let writer = tokio::spawn(async move {
            for chunk in payload.chunks(7) {
                client.write_all(chunk).await.unwrap();
                tokio::task::yield_now().await;
            }
            client
        });

        match reader.read_frame(None).await.unwrap() {
            ReadOutcome::Frame(frame) => assert_eq!(frame, message),
            other => panic!("unexpected {other:?}"),
        }

        let client = writer.await.unwrap();
        assert!(matches!(
            reader.read_frame(None).await.unwrap(),
            ReadOutcome::Idle
        ));

        drop(client);
        assert!(matches!(
            reader.read_frame(None).await.unwrap(),
            ReadOutcome::Closed
        ));
    }

    #[tokio::test]
    async fn test_reader_deadline_times_out() {
        let (_client, server) = tokio::io::duplex(64);
        let mut reader = FramedReader::new(
            server,
            FrameDecoder::new("FIX.4.4"),
            Duration::from_millis(50),
        );
        let deadline = Instant::now() + Duration::from_millis(120);
        let mut idle_reads = 0;
        loop {
            match reader.read_frame(Some(deadline)).await {
                Ok(ReadOutcome::Idle) => idle_reads += 1,
                Err(TransportError::Timeout) => break,
                other => panic!("unexpected {other:?}"),
            }
        }
        assert!(idle_reads >= 1);
        assert!(Instant::now() >= deadline);
    }
}
