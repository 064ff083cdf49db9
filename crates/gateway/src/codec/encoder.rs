//! Outbound message encoding

use bytes::{BufMut, Bytes, BytesMut};
use chrono::{DateTime, Utc};

use super::message::Field;
use super::tags::{self, Tag};
use super::{SOH, checksum};

/// `%Y%m%d-%H:%M:%S.mmm` in UTC
pub fn format_sending_time(ts: DateTime<Utc>) -> String {
    ts.format("%Y%m%d-%H:%M:%S%.3f").to_string()
}

/// A serialized message and the sequence number it carries
#[derive(Debug, Clone)]
pub struct EncodedMessage {
    pub seq_num: u64,
    pub bytes: Bytes,
}

/// Encoder for one session.
///
/// Owns the outbound sequence counter: every call to [`Encoder::encode`]
/// consumes exactly one sequence number.
#[derive(Debug, Clone)]
pub struct Encoder {
    begin_string: String,
    sender_comp_id: String,
    target_comp_id: String,
    next_seq_num: u64,
}

impl Encoder {
    pub fn new(
        begin_string: impl Into<String>,
        sender_comp_id: impl Into<String>,
        target_comp_id: impl Into<String>,
    ) -> Self {
        Self {
            begin_string: begin_string.into(),
            sender_comp_id: sender_comp_id.into(),
            target_comp_id: target_comp_id.into(),
            next_seq_num: 1,
        }
    }

    pub fn begin_string(&self) -> &str {
        &self.begin_string
    }

    /// Sequence number the next encode will use
    pub fn next_seq_num(&self) -> u64 {
        self.next_seq_num
    }

    /// Restart numbering for a fresh logon
    pub fn reset(&mut self) {
        self.next_seq_num = 1;
    }

    pub fn encode(&mut self, msg_type: &str, fields: &[Field]) -> EncodedMessage {
        self.encode_at(msg_type, fields, Utc::now())
    }

    /// Encode with an explicit sending time
    pub fn encode_at(
        &mut self,
        msg_type: &str,
        fields: &[Field],
        sending_time: DateTime<Utc>,
    ) -> EncodedMessage {
        let seq_num = self.next_seq_num;
        self.next_seq_num += 1;

        let mut body = BytesMut::with_capacity(128 + fields.len() * 16);
        put_field(&mut body, tags::MSG_TYPE, msg_type);
        put_field(&mut body, tags::SENDER_COMP_ID, &self.sender_comp_id);
        put_field(&mut body, tags::TARGET_COMP_ID, &self.target_comp_id);
        put_field(&mut body, tags::MSG_SEQ_NUM, &seq_num.to_string());
        put_field(
            &mut body,
            tags::SENDING_TIME,
            &format_sending_time(sending_time),
        );
        for field in fields {
            put_field(&mut body, field.tag, &field.value);
        }

        EncodedMessage {
            seq_num,
            bytes: wrap_body(&self.begin_string, &body),
        }
    }
}

fn put_field(buf: &mut BytesMut, tag: Tag, value: &str) {
    buf.put_slice(tag.to_string().as_bytes());
    buf.put_u8(b'=');
    buf.put_slice(value.as_bytes());
    buf.put_u8(SOH);
}

/// Prepend `8=` and `9=` to an already serialized body and append `10=`
pub fn wrap_body(begin_string: &str, body: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(body.len() + begin_string.len() + 24);
    put_field(&mut out, tags::BEGIN_STRING, begin_string);
    put_field(&mut out, tags::BODY_LENGTH, &body.len().to_string());
    out.put_slice(body);

    let sum = checksum(&out);
    put_field(&mut out, tags::CHECKSUM, &format!("{sum:03}"));
    out.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 45).unwrap()
            + chrono::Duration::milliseconds(123)
    }

    #[test]
    fn test_header_layout() {
        let mut encoder = Encoder::new("FIX.4.4", "CLIENT", "VENUE");
        let encoded = encoder.encode_at("0", &[], fixed_time());
        let text = String::from_utf8(encoded.bytes.to_vec()).unwrap();

        let fields: Vec<&str> = text.split('\x01').filter(|s| !s.is_empty()).collect();
        assert_eq!(fields[0], "8=FIX.4.4");
        assert!(fields[1].starts_with("9="));
        assert_eq!(fields[2], "35=0");
        assert_eq!(fields[3], "49=CLIENT");
        assert_eq!(fields[4], "56=VENUE");
        assert_eq!(fields[5], "34=1");
        assert_eq!(fields[6], "52=20240301-12:30:45.123");
        assert!(fields[7].starts_with("10="));
        assert_eq!(fields.len(), 8);
    }

    #[test]
    fn test_body_length_and_checksum() {
        let mut encoder = Encoder::new("FIX.4.4", "CLIENT", "VENUE");
        let encoded = encoder.encode_at("1", &[Field::new(112, "TEST_1")], fixed_time());
        let bytes = &encoded.bytes[..];

        let header_end = bytes
            .iter()
            .enumerate()
            .filter(|(_, b)| **b == SOH)
            .nth(1)
            .map(|(i, _)| i + 1)
            .unwrap();
        let trailer_start = bytes.len() - 7;
        assert_eq!(&bytes[trailer_start..trailer_start + 3], b"10=");

        let declared: usize = std::str::from_utf8(&bytes[11..header_end - 1])
            .unwrap()
            .parse()
            .unwrap();
        assert_eq!(declared, trailer_start - header_end);

        let expected = checksum(&bytes[..trailer_start]);
        let declared_sum: u32 = std::str::from_utf8(&bytes[trailer_start + 3..bytes.len() - 1])
            .unwrap()
            .parse()
            .unwrap();
        assert_eq!(declared_sum, expected);
    }

    #[test]
    fn test_sequence_numbers_are_contiguous() {
        let mut encoder = Encoder::new("FIX.4.4", "CLIENT", "VENUE");
        let seqs: Vec<u64> = (0..50).map(|_| encoder.encode("0", &[]).seq_num).collect();
        assert_eq!(seqs, (1..=50).collect::<Vec<_>>());
        assert_eq!(encoder.next_seq_num(), 51);

        encoder.reset();
        assert_eq!(encoder.encode("A", &[]).seq_num, 1);
    }
}
