//! Wire codec for the venue's `tag=value` protocol
//!
//! Pure translation between [`ProtocolMessage`] and bytes; no I/O.
//!
//! ```text
//! 8=<begin>|9=<len>|35=..|49=..|56=..|34=..|52=..|<fields>|10=<sum%256>|
//!              └──────────── len bytes ─────────────────┘
//! ```

pub mod decoder;
pub mod encoder;
pub mod message;
pub mod tags;

pub use decoder::{ChecksumMode, DecodeOptions, GroupSchema, decode, verify_integrity};
pub use encoder::{EncodedMessage, Encoder};
pub use message::{Field, GroupEntry, ProtocolMessage};
pub use tags::Tag;

/// Field delimiter
pub const SOH: u8 = 0x01;

/// Sum of bytes modulo 256
pub fn checksum(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |acc, b| acc.wrapping_add(u32::from(*b))) % 256
}
