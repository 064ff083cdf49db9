//! Inbound message decoding

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use log::debug;
use serde::{Deserialize, Serialize};

use super::message::{Field, GroupEntry, ProtocolMessage};
use super::tags::{self, Tag};
use super::{SOH, checksum};
use crate::error::CodecError;

/// Integrity checking applied by [`decode`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumMode {
    /// Checksum and body length are advisory; noisy venues still decode
    #[default]
    Tolerant,
    /// Reject on checksum or body-length mismatch
    Strict,
}

/// Layout of one repeating group
#[derive(Debug, Clone)]
pub struct GroupSpec {
    /// First tag of every entry
    pub delimiter: Tag,
    pub members: HashSet<Tag>,
}

/// Count tag to entry layout
#[derive(Debug, Clone, Default)]
pub struct GroupSchema {
    groups: HashMap<Tag, GroupSpec>,
}

impl GroupSchema {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_group(mut self, count_tag: Tag, delimiter: Tag, members: &[Tag]) -> Self {
        let mut set: HashSet<Tag> = members.iter().copied().collect();
        set.insert(delimiter);
        self.groups.insert(
            count_tag,
            GroupSpec {
                delimiter,
                members: set,
            },
        );
        self
    }

    /// Groups the venue sends on inbound messages
    pub fn venue_default() -> Self {
        Self::empty()
            .with_group(
                tags::NO_MD_ENTRIES,
                tags::MD_ENTRY_TYPE,
                &[
                    tags::MD_ENTRY_PX,
                    tags::MD_ENTRY_SIZE,
                    tags::MD_UPDATE_ACTION,
                ],
            )
            .with_group(
                tags::NO_RELATED_SYM,
                tags::SYMBOL,
                &[
                    tags::SECURITY_ID,
                    tags::SECURITY_ID_SOURCE,
                    tags::SECURITY_DESC,
                    tags::CURRENCY,
                    tags::SETTL_CURRENCY,
                    tags::TRADE_ENABLED,
                    tags::ENCODED_TEXT_LEN,
                    tags::ENCODED_TEXT,
                    tags::ROUND_LOT,
                    tags::MIN_TRADE_VOL,
                    tags::MAX_TRADE_VOLUME,
                    tags::TRADE_VOL_STEP,
                    tags::PRICE_PRECISION,
                    tags::CONTRACT_MULTIPLIER,
                    tags::MARGIN_FACTOR,
                    tags::SWAP_SIZE_SHORT,
                    tags::SWAP_SIZE_LONG,
                    tags::COMMISSION,
                    tags::COMM_TYPE,
                    tags::DEFAULT_SLIPPAGE,
                    tags::STATUS_GROUP_ID,
                    tags::SECURITY_GROUP,
                    tags::SWAP_ENABLED,
                    tags::TRIPLE_SWAP_DAY,
                ],
            )
            .with_group(
                tags::NO_BARS,
                tags::BAR_HIGH,
                &[
                    tags::BAR_LOW,
                    tags::BAR_OPEN,
                    tags::BAR_CLOSE,
                    tags::BAR_TIME,
                    tags::BAR_VOLUME,
                    tags::BAR_VOLUME_EX,
                ],
            )
            .with_group(
                tags::NO_PARTY_IDS,
                tags::PARTY_ID,
                &[tags::PARTY_ID_SOURCE, tags::PARTY_ROLE],
            )
    }

    pub fn get(&self, count_tag: Tag) -> Option<&GroupSpec> {
        self.groups.get(&count_tag)
    }
}

/// Decoder settings
#[derive(Debug, Clone)]
pub struct DecodeOptions {
    pub checksum_mode: ChecksumMode,
    pub schema: Arc<GroupSchema>,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            checksum_mode: ChecksumMode::Tolerant,
            schema: Arc::new(GroupSchema::venue_default()),
        }
    }
}

impl DecodeOptions {
    pub fn strict() -> Self {
        Self {
            checksum_mode: ChecksumMode::Strict,
            ..Self::default()
        }
    }

    pub fn with_checksum_mode(mut self, mode: ChecksumMode) -> Self {
        self.checksum_mode = mode;
        self
    }
}

/// Decode one complete raw message.
pub fn decode(raw: &[u8], options: &DecodeOptions) -> Result<ProtocolMessage, CodecError> {
    if raw.is_empty() {
        return Err(CodecError::Empty);
    }
    if options.checksum_mode == ChecksumMode::Strict {
        verify_integrity(raw)?;
    }

    let parsed = split_fields(raw)?;
    if parsed.is_empty() {
        return Err(CodecError::Empty);
    }

    let mut msg = ProtocolMessage::new();
    let mut i = 0;
    while i < parsed.len() {
        let field = parsed[i].clone();
        let count_tag = field.tag;
        let declared = field.value.parse::<usize>().ok();
        msg.push_field(field);
        i += 1;

        let Some(spec) = options.schema.get(count_tag) else {
            continue;
        };

        let mut entries: Vec<GroupEntry> = Vec::new();
        let mut current = GroupEntry::default();
        while i < parsed.len() && spec.members.contains(&parsed[i].tag) {
            let member = &parsed[i];
            if !current.is_empty() && (member.tag == spec.delimiter || current.contains(member.tag))
            {
                entries.push(std::mem::take(&mut current));
            }
            current.push(member.clone());
            i += 1;
        }
        if !current.is_empty() {
            entries.push(current);
        }

        if declared != Some(entries.len()) {
            debug!(
                "Group {} declared {:?} entries, decoded {}",
                count_tag,
                declared,
                entries.len()
            );
        }
        msg.push_group(count_tag, entries);
    }

    Ok(msg)
}

fn split_fields(raw: &[u8]) -> Result<Vec<Field>, CodecError> {
    let mut fields = Vec::new();
    for segment in raw.split(|b| *b == SOH) {
        if segment.is_empty() {
            continue;
        }
        let eq = segment.iter().position(|b| *b == b'=').ok_or_else(|| {
            CodecError::Malformed(format!(
                "field without '=': {}",
                String::from_utf8_lossy(segment)
            ))
        })?;
        let tag = std::str::from_utf8(&segment[..eq])
            .ok()
            .and_then(|t| t.parse::<Tag>().ok())
            .ok_or_else(|| {
                CodecError::Malformed(format!(
                    "non-numeric tag: {}",
                    String::from_utf8_lossy(&segment[..eq])
                ))
            })?;
        let value = String::from_utf8_lossy(&segment[eq + 1..]).into_owned();
        fields.push(Field { tag, value });
    }
    Ok(fields)
}

/// Check the declared body length and checksum against the bytes
pub fn verify_integrity(raw: &[u8]) -> Result<(), CodecError> {
    if !raw.starts_with(b"8=") {
        return Err(CodecError::Malformed("missing begin string".into()));
    }
    let begin_end = find_soh(raw, 0)
        .ok_or_else(|| CodecError::Malformed("unterminated begin string".into()))?;
    let len_start = begin_end + 1;
    if !raw[len_start..].starts_with(b"9=") {
        return Err(CodecError::Malformed("body length must follow begin string".into()));
    }
    let len_end = find_soh(raw, len_start)
        .ok_or_else(|| CodecError::Malformed("unterminated body length".into()))?;
    let declared: usize = std::str::from_utf8(&raw[len_start + 2..len_end])
        .ok()
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| CodecError::Malformed("non-numeric body length".into()))?;

    let trailer_start = raw
        .windows(4)
        .rposition(|w| w == b"\x0110=")
        .map(|p| p + 1)
        .filter(|p| *p > len_end)
        .ok_or_else(|| CodecError::Malformed("missing checksum field".into()))?;

    let actual = trailer_start - (len_end + 1);
    if actual != declared {
        return Err(CodecError::LengthMismatch { declared, actual });
    }

    let trailer_end = find_soh(raw, trailer_start).unwrap_or(raw.len());
    let declared_sum: u32 = std::str::from_utf8(&raw[trailer_start + 3..trailer_end])
        .ok()
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| CodecError::Malformed("non-numeric checksum".into()))?;
    let computed = checksum(&raw[..trailer_start]);
    if declared_sum != computed {
        return Err(CodecError::ChecksumMismatch {
            declared: declared_sum,
            computed,
        });
    }
    Ok(())
}

fn find_soh(raw: &[u8], from: usize) -> Option<usize> {
    raw[from..].iter().position(|b| *b == SOH).map(|p| p + from)
}
