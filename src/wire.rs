//! Binary stream layout.
//!
//! A stream is a sequence of entries. Every entry starts with a `u32` size
//! (the number of bytes that follow it) and a one-byte kind; readers skip
//! kinds they do not know. All integers are little-endian; `str16`/`str32`
//! are UTF-8 bytes prefixed by a `u16`/`u32` length.
//!
//! ```text
//! TemplateDefinition (1): id u32 | severity u8 | line u32 | category str16
//!                         | file str16 | format str32 | tag count u8 | tags
//! Event (2):              template id u32 | severity u8 | timestamp u64
//!                         | arg count u8 | (tag u8, payload)*
//! ClockSync (3):          clock value u64 | frequency u64 | ns since epoch u64
//! WriterProperties (4):   producer id u64 | name str16
//! ```
//!
//! Argument payloads are described in [`crate::loggable::tag`].

use crate::clock::ClockSync;
use crate::loggable::{encode_str16, encode_tagged, str16_len, tagged_len, Loggable};
use crate::severity::Severity;
use crate::template_registry::{Template, TemplateId};

/// `u32` size followed by the kind byte.
pub const ENTRY_HEADER_LEN: usize = 5;

/// Bytes of an event body before its arguments.
pub const EVENT_FIXED_LEN: usize = 4 + 1 + 8 + 1;

/// Offset of the template id inside a framed event entry.
pub(crate) const EVENT_TEMPLATE_OFFSET: usize = ENTRY_HEADER_LEN;

#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EntryKind {
    TemplateDefinition = 1,
    Event = 2,
    ClockSync = 3,
    WriterProperties = 4,
}

impl EntryKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(EntryKind::TemplateDefinition),
            2 => Some(EntryKind::Event),
            3 => Some(EntryKind::ClockSync),
            4 => Some(EntryKind::WriterProperties),
            _ => None,
        }
    }
}

#[inline(always)]
fn put_header(kind: EntryKind, body_len: usize, out: &mut Vec<u8>) {
    out.extend_from_slice(&((body_len + 1) as u32).to_le_bytes());
    out.push(kind as u8);
}

fn put_str32(s: &str, out: &mut Vec<u8>) {
    out.extend_from_slice(&(s.len() as u32).to_le_bytes());
    out.extend_from_slice(s.as_bytes());
}

/// Body size of an event carrying `args`.
#[inline]
pub fn event_body_len(args: &[&dyn Loggable]) -> usize {
    EVENT_FIXED_LEN + args.iter().map(|arg| tagged_len(*arg)).sum::<usize>()
}

/// Writes a framed event entry. `body_len` must come from [`event_body_len`]
/// for the same arguments.
#[inline]
pub fn write_event(
    template: TemplateId,
    severity: Severity,
    timestamp: u64,
    args: &[&dyn Loggable],
    body_len: usize,
    out: &mut Vec<u8>,
) {
    put_header(EntryKind::Event, body_len, out);
    out.extend_from_slice(&template.get().to_le_bytes());
    out.push(severity.as_u8());
    out.extend_from_slice(&timestamp.to_le_bytes());
    out.push(args.len() as u8);
    for arg in args {
        encode_tagged(*arg, out);
    }
}

/// Total framed size of an event entry with the given body size.
#[inline(always)]
pub fn event_entry_len(body_len: usize) -> usize {
    ENTRY_HEADER_LEN + body_len
}

pub fn write_template(template: &Template, out: &mut Vec<u8>) {
    let body_len = 4
        + 1
        + 4
        + str16_len(template.category)
        + str16_len(template.file)
        + 4
        + template.format.len()
        + 1
        + template.argument_tags.len();

    put_header(EntryKind::TemplateDefinition, body_len, out);
    out.extend_from_slice(&template.id.get().to_le_bytes());
    out.push(template.severity.as_u8());
    out.extend_from_slice(&template.line.to_le_bytes());
    encode_str16(template.category, out);
    encode_str16(template.file, out);
    put_str32(template.format, out);
    out.push(template.argument_tags.len() as u8);
    out.extend_from_slice(&template.argument_tags);
}

pub fn write_clock_sync(sync: &ClockSync, out: &mut Vec<u8>) {
    put_header(EntryKind::ClockSync, 24, out);
    out.extend_from_slice(&sync.clock_value.to_le_bytes());
    out.extend_from_slice(&sync.clock_frequency.to_le_bytes());
    out.extend_from_slice(&sync.ns_since_epoch.to_le_bytes());
}

pub fn write_writer_properties(producer_id: u64, name: &str, out: &mut Vec<u8>) {
    put_header(EntryKind::WriterProperties, 8 + str16_len(name), out);
    out.extend_from_slice(&producer_id.to_le_bytes());
    encode_str16(name, out);
}

/// Splits a buffer of framed entries into `(entry bytes, template id)` pairs.
/// Only used on channel buffers, which hold nothing but whole event entries.
pub(crate) struct EventFrames<'a> {
    data: &'a [u8],
}

impl<'a> EventFrames<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data }
    }
}

impl<'a> Iterator for EventFrames<'a> {
    type Item = (&'a [u8], TemplateId);

    fn next(&mut self) -> Option<Self::Item> {
        if self.data.len() < EVENT_TEMPLATE_OFFSET + 4 {
            return None;
        }
        let size = u32::from_le_bytes(self.data[0..4].try_into().ok()?) as usize;
        let total = 4 + size;
        let raw_id = &self.data[EVENT_TEMPLATE_OFFSET..EVENT_TEMPLATE_OFFSET + 4];
        let template = TemplateId::new(u32::from_le_bytes(raw_id.try_into().ok()?));
        let (frame, rest) = self.data.split_at(total.min(self.data.len()));
        self.data = rest;
        Some((frame, template))
    }
}
