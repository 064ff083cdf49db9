//! Protocol message model

use std::collections::HashMap;

use super::tags::{self, Tag};

/// One `tag=value` pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub tag: Tag,
    pub value: String,
}

impl Field {
    pub fn new(tag: Tag, value: impl Into<String>) -> Self {
        Self {
            tag,
            value: value.into(),
        }
    }
}

/// One entry of a repeating group
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupEntry {
    fields: Vec<Field>,
}

impl GroupEntry {
    pub(crate) fn push(&mut self, field: Field) {
        self.fields.push(field);
    }

    pub(crate) fn contains(&self, tag: Tag) -> bool {
        self.fields.iter().any(|f| f.tag == tag)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, tag: Tag) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.tag == tag)
            .map(|f| f.value.as_str())
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }
}

/// An ordered list of fields plus the decoded view of its repeating groups.
///
/// Plain tags are indexed last-occurrence-wins. Fields that belong to a
/// repeating group stay in the ordered list but are only reachable through
/// [`ProtocolMessage::group`].
#[derive(Debug, Clone, Default)]
pub struct ProtocolMessage {
    fields: Vec<Field>,
    index: HashMap<Tag, usize>,
    groups: HashMap<Tag, Vec<GroupEntry>>,
}

impl ProtocolMessage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from application fields; every field is treated as a plain tag
    pub fn from_fields(fields: impl IntoIterator<Item = Field>) -> Self {
        let mut msg = Self::new();
        for field in fields {
            msg.push_field(field);
        }
        msg
    }

    pub fn push(&mut self, tag: Tag, value: impl Into<String>) -> &mut Self {
        self.push_field(Field::new(tag, value));
        self
    }

    pub fn with(mut self, tag: Tag, value: impl Into<String>) -> Self {
        self.push(tag, value);
        self
    }

    pub(crate) fn push_field(&mut self, field: Field) {
        self.index.insert(field.tag, self.fields.len());
        self.fields.push(field);
    }

    pub(crate) fn push_group(&mut self, count_tag: Tag, entries: Vec<GroupEntry>) {
        for entry in &entries {
            self.fields.extend(entry.fields.iter().cloned());
        }
        self.groups.insert(count_tag, entries);
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn get(&self, tag: Tag) -> Option<&str> {
        self.index.get(&tag).map(|&i| self.fields[i].value.as_str())
    }

    pub fn contains(&self, tag: Tag) -> bool {
        self.index.contains_key(&tag)
    }

    /// Entries of the repeating group introduced by `count_tag`
    pub fn group(&self, count_tag: Tag) -> &[GroupEntry] {
        self.groups.get(&count_tag).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn msg_type(&self) -> Option<&str> {
        self.get(tags::MSG_TYPE)
    }

    pub fn seq_num(&self) -> Option<u64> {
        self.get(tags::MSG_SEQ_NUM).and_then(|v| v.parse().ok())
    }

    pub fn text(&self) -> Option<&str> {
        self.get(tags::TEXT)
    }

    /// Fields after the standard header and before the trailer
    pub fn body_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| {
            !matches!(
                f.tag,
                tags::BEGIN_STRING
                    | tags::BODY_LENGTH
                    | tags::MSG_TYPE
                    | tags::SENDER_COMP_ID
                    | tags::TARGET_COMP_ID
                    | tags::MSG_SEQ_NUM
                    | tags::SENDING_TIME
                    | tags::CHECKSUM
            )
        })
    }

    /// Pipe-delimited rendering for logs, password masked
    pub fn to_log_string(&self) -> String {
        self.fields
            .iter()
            .map(|f| {
                if f.tag == tags::PASSWORD {
                    format!("{}=****", f.tag)
                } else {
                    format!("{}={}", f.tag, f.value)
                }
            })
            .collect::<Vec<_>>()
            .join("|")
    }
}
