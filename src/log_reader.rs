//! Reader and utilities for decoding binary log streams.
//!
//! This module turns the bytes written by
//! [`Session::consume`](crate::Session::consume) back into typed events. The
//! stream is self-describing: template definitions, the clock anchor and
//! producer names all travel in the stream, so no state from the writing
//! process is needed.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::clock::ClockSync;
use crate::error::DecodeError;
use crate::loggable::tag;
use crate::severity::Severity;
use crate::wire::EntryKind;

/// Deepest nesting of sequences, options, tuples and structs the reader
/// accepts before rejecting a value.
const MAX_NESTING: usize = 64;

/// A value extracted from an event's arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum LogValue {
    Boolean(bool),
    /// Any signed integer, widened.
    Integer(i64),
    /// Any unsigned integer, widened.
    Unsigned(u64),
    /// `f32` and `f64`; an `f32` widens exactly.
    Float(f64),
    Char(char),
    String(String),
    Bytes(Vec<u8>),
    Sequence(Vec<LogValue>),
    Optional(Option<Box<LogValue>>),
    Tuple(Vec<LogValue>),
    Struct {
        name: String,
        fields: Vec<(String, LogValue)>,
    },
    Enum {
        name: String,
        variant: String,
    },
}

impl fmt::Display for LogValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogValue::Boolean(b) => write!(f, "{}", b),
            LogValue::Integer(i) => write!(f, "{}", i),
            LogValue::Unsigned(u) => write!(f, "{}", u),
            LogValue::Float(fl) => write!(f, "{}", fl),
            LogValue::Char(c) => write!(f, "{}", c),
            LogValue::String(s) => write!(f, "{}", s),
            LogValue::Bytes(bytes) => {
                for byte in bytes {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
            LogValue::Sequence(items) => {
                f.write_str("[")?;
                write_list(f, items)?;
                f.write_str("]")
            }
            LogValue::Optional(Some(value)) => write!(f, "{{ {} }}", value),
            LogValue::Optional(None) => f.write_str("{null}"),
            LogValue::Tuple(items) => {
                f.write_str("(")?;
                write_list(f, items)?;
                f.write_str(")")
            }
            LogValue::Struct { name, fields } => {
                write!(f, "{}{{", name)?;
                for (i, (field, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, " {}: {}", field, value)?;
                }
                f.write_str(" }")
            }
            LogValue::Enum { variant, .. } => f.write_str(variant),
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[LogValue]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

/// A template definition read from a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateInfo {
    pub id: u32,
    pub severity: Severity,
    pub category: String,
    pub file: String,
    pub line: u32,
    pub format: String,
    pub argument_tags: Vec<u8>,
}

/// A single event read from a binary log stream.
///
/// # Examples
///
/// ```
/// use binlog::{LogReader, Session, SessionConfig, log_record, Severity};
///
/// let session = Session::new(SessionConfig::default()).unwrap();
/// let mut writer = session.writer();
/// log_record!(writer, Severity::Info, "Temperature: {} C", 25.5);
///
/// let mut data = Vec::new();
/// session.consume(&mut data);
///
/// let mut reader = LogReader::new(&data);
/// let entry = reader.read_entry().unwrap().unwrap();
/// assert_eq!(entry.format(), "Temperature: 25.5 C");
/// ```
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub template: Arc<TemplateInfo>,
    pub severity: Severity,
    /// Raw timestamp in clock ticks.
    pub clock_value: u64,
    /// Wall-clock time, available once the stream's clock anchor was read.
    pub timestamp: Option<SystemTime>,
    pub producer_id: Option<u64>,
    pub producer_name: Option<Arc<str>>,
    pub parameters: Vec<LogValue>,
}

impl LogEntry {
    pub fn format_string(&self) -> &str {
        &self.template.format
    }

    /// Renders the event by substituting its parameters into the format
    /// string. `{{` and `}}` render as literal braces; anything between a
    /// placeholder's braces is ignored.
    ///
    /// For a template "Temperature: {} C" with parameter 25.5 this returns
    /// "Temperature: 25.5 C".
    pub fn format(&self) -> String {
        let mut result = String::new();
        let mut chars = self.template.format.chars().peekable();
        let mut params = self.parameters.iter();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    result.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    result.push('}');
                }
                '{' => {
                    for inner in chars.by_ref() {
                        if inner == '}' {
                            break;
                        }
                    }
                    match params.next() {
                        Some(param) => result.push_str(&param.to_string()),
                        None => result.push_str("{MISSING}"),
                    }
                }
                _ => result.push(c),
            }
        }

        result
    }

    /// Returns a detailed multiline representation of the entry: timestamp,
    /// template, source location, producer and every parameter.
    pub fn to_detailed_string(&self) -> String {
        let mut result = String::new();

        match self.timestamp {
            Some(time) => {
                let ts = time.duration_since(UNIX_EPOCH).unwrap_or_default();
                result.push_str(&format!(
                    "Timestamp: {}.{:06} (tick {})\n",
                    ts.as_secs(),
                    ts.subsec_micros(),
                    self.clock_value
                ));
            }
            None => result.push_str(&format!("Timestamp: tick {}\n", self.clock_value)),
        }

        result.push_str(&format!("Severity: {}\n", self.severity));
        result.push_str(&format!("Template ID: {}\n", self.template.id));
        result.push_str(&format!("Format string: \"{}\"\n", self.template.format));
        result.push_str(&format!(
            "Location: {} ({}:{})\n",
            self.template.category, self.template.file, self.template.line
        ));
        if let (Some(id), Some(name)) = (self.producer_id, &self.producer_name) {
            result.push_str(&format!("Producer: {} ({})\n", name, id));
        }

        result.push_str(&format!("Parameters ({}):\n", self.parameters.len()));
        for (i, param) in self.parameters.iter().enumerate() {
            result.push_str(&format!("  {}: {}\n", i, param));
        }

        result
    }
}

/// Reader for binary log streams.
///
/// The reader walks the stream entry by entry. Template definitions, clock
/// anchors and writer properties update its internal state; events are
/// returned as [`LogEntry`] values with their template resolved and their
/// arguments decoded and checked against the template's argument tags.
///
/// A stream may be the concatenation of the output of several `consume`
/// calls; reading simply continues across them.
///
/// # Examples
///
/// ```
/// # use binlog::LogReader;
/// # fn example(data: &[u8]) -> Result<(), binlog::DecodeError> {
/// let mut reader = LogReader::new(data);
/// while let Some(entry) = reader.read_entry()? {
///     println!("{} {}", entry.severity, entry.format());
/// }
/// # Ok(())
/// # }
/// ```
pub struct LogReader<'a> {
    data: &'a [u8],
    pos: usize,
    templates: HashMap<u32, Arc<TemplateInfo>>,
    clock: Option<ClockSync>,
    producer: Option<(u64, Arc<str>)>,
}

impl<'a> LogReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            templates: HashMap::new(),
            clock: None,
            producer: None,
        }
    }

    /// Byte offset of the next entry.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Templates defined so far in the stream.
    pub fn templates(&self) -> impl Iterator<Item = &TemplateInfo> + '_ {
        self.templates.values().map(|template| template.as_ref())
    }

    pub fn clock_sync(&self) -> Option<ClockSync> {
        self.clock
    }

    /// Reads entries until the next event.
    ///
    /// Returns `Ok(None)` at the end of the stream. After an error the
    /// reader is positioned past the offending entry (or at the end, if the
    /// stream is truncated), so reading can continue.
    pub fn read_entry(&mut self) -> Result<Option<LogEntry>, DecodeError> {
        loop {
            if self.pos >= self.data.len() {
                return Ok(None);
            }

            let start = self.pos;
            let mut header = Cursor::new(&self.data[start..], start);
            let size = match header.u32() {
                Ok(size) => size as usize,
                Err(err) => {
                    self.pos = self.data.len();
                    return Err(err);
                }
            };
            let end = start + 4 + size;
            if size == 0 || end > self.data.len() {
                self.pos = self.data.len();
                if size == 0 {
                    return Err(DecodeError::InvalidValue {
                        offset: start,
                        reason: "entry without a kind",
                    });
                }
                return Err(DecodeError::Truncated {
                    offset: start,
                    needed: end - self.data.len(),
                });
            }
            self.pos = end;

            let kind = self.data[start + 4];
            let mut body = Cursor::new(&self.data[start + 5..end], start + 5);

            match EntryKind::from_u8(kind) {
                Some(EntryKind::TemplateDefinition) => {
                    let template = read_template(&mut body)?;
                    self.templates.insert(template.id, Arc::new(template));
                }
                Some(EntryKind::ClockSync) => {
                    self.clock = Some(ClockSync {
                        clock_value: body.u64()?,
                        clock_frequency: body.u64()?,
                        ns_since_epoch: body.u64()?,
                    });
                }
                Some(EntryKind::WriterProperties) => {
                    let id = body.u64()?;
                    let name = body.str16()?;
                    self.producer = Some((id, Arc::from(name)));
                }
                Some(EntryKind::Event) => return self.read_event(&mut body, start).map(Some),
                None => {
                    tracing::trace!(kind, offset = start, "skipping unknown entry kind");
                }
            }
        }
    }

    fn read_event(&self, body: &mut Cursor<'_>, offset: usize) -> Result<LogEntry, DecodeError> {
        let template_id = body.u32()?;
        let template = self
            .templates
            .get(&template_id)
            .cloned()
            .ok_or(DecodeError::UnknownTemplate {
                template_id,
                offset,
            })?;

        let severity_offset = body.offset();
        let severity_byte = body.u8()?;
        let severity = Severity::from_u8(severity_byte).ok_or(DecodeError::InvalidSeverity {
            value: severity_byte,
            offset: severity_offset,
        })?;
        let clock_value = body.u64()?;
        let count = body.u8()? as usize;

        let mut tags = Vec::with_capacity(count);
        let mut parameters = Vec::with_capacity(count);
        for _ in 0..count {
            let tag = body.u8()?;
            tags.push(tag);
            parameters.push(read_value(body, tag, 0)?);
        }

        // Values are self-tagged, so only the arity is checked. A site in a
        // generic function or one taking `&dyn Loggable` can vary its tags.
        if tags.len() != template.argument_tags.len() {
            return Err(DecodeError::ArgumentMismatch {
                template_id,
                expected: template.argument_tags.clone(),
                found: tags,
            });
        }

        Ok(LogEntry {
            template,
            severity,
            clock_value,
            timestamp: self.clock.map(|sync| sync.to_system_time(clock_value)),
            producer_id: self.producer.as_ref().map(|(id, _)| *id),
            producer_name: self.producer.as_ref().map(|(_, name)| Arc::clone(name)),
            parameters,
        })
    }
}

impl Iterator for LogReader<'_> {
    type Item = Result<LogEntry, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_entry().transpose()
    }
}

fn read_template(body: &mut Cursor<'_>) -> Result<TemplateInfo, DecodeError> {
    let id = body.u32()?;
    let severity_offset = body.offset();
    let severity_byte = body.u8()?;
    let severity = Severity::from_u8(severity_byte).ok_or(DecodeError::InvalidSeverity {
        value: severity_byte,
        offset: severity_offset,
    })?;
    let line = body.u32()?;
    let category = body.str16()?;
    let file = body.str16()?;
    let format = body.str32()?;
    let tag_count = body.u8()? as usize;
    let argument_tags = body.bytes(tag_count)?.to_vec();

    Ok(TemplateInfo {
        id,
        severity,
        category,
        file,
        line,
        format,
        argument_tags,
    })
}

fn read_value(cursor: &mut Cursor<'_>, value_tag: u8, depth: usize) -> Result<LogValue, DecodeError> {
    if depth > MAX_NESTING {
        return Err(DecodeError::InvalidValue {
            offset: cursor.offset(),
            reason: "arguments nested too deeply",
        });
    }

    let value = match value_tag {
        tag::BOOL => LogValue::Boolean(cursor.u8()? != 0),
        tag::CHAR => {
            let offset = cursor.offset();
            let raw = cursor.u32()?;
            LogValue::Char(char::from_u32(raw).ok_or(DecodeError::InvalidValue {
                offset,
                reason: "invalid char",
            })?)
        }
        tag::I8 => LogValue::Integer(cursor.u8()? as i8 as i64),
        tag::U8 => LogValue::Unsigned(cursor.u8()? as u64),
        tag::I16 => LogValue::Integer(cursor.u16()? as i16 as i64),
        tag::U16 => LogValue::Unsigned(cursor.u16()? as u64),
        tag::I32 => LogValue::Integer(cursor.u32()? as i32 as i64),
        tag::U32 => LogValue::Unsigned(cursor.u32()? as u64),
        tag::I64 => LogValue::Integer(cursor.u64()? as i64),
        tag::U64 => LogValue::Unsigned(cursor.u64()?),
        tag::F32 => LogValue::Float(f32::from_bits(cursor.u32()?) as f64),
        tag::F64 => LogValue::Float(f64::from_bits(cursor.u64()?)),
        tag::STR => LogValue::String(cursor.str32()?),
        tag::BYTES => {
            let len = cursor.u32()? as usize;
            LogValue::Bytes(cursor.bytes(len)?.to_vec())
        }
        tag::SEQUENCE => {
            let count = cursor.u32()? as usize;
            // Each element takes at least two bytes; do not trust the count
            // for the allocation.
            let mut items = Vec::with_capacity(count.min(cursor.remaining() / 2));
            for _ in 0..count {
                let item_tag = cursor.u8()?;
                items.push(read_value(cursor, item_tag, depth + 1)?);
            }
            LogValue::Sequence(items)
        }
        tag::OPTION => {
            let offset = cursor.offset();
            match cursor.u8()? {
                0 => LogValue::Optional(None),
                1 => {
                    let inner_tag = cursor.u8()?;
                    LogValue::Optional(Some(Box::new(read_value(cursor, inner_tag, depth + 1)?)))
                }
                _ => {
                    return Err(DecodeError::InvalidValue {
                        offset,
                        reason: "invalid option flag",
                    })
                }
            }
        }
        tag::TUPLE => {
            let count = cursor.u8()? as usize;
            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                let item_tag = cursor.u8()?;
                items.push(read_value(cursor, item_tag, depth + 1)?);
            }
            LogValue::Tuple(items)
        }
        tag::STRUCT => {
            let name = cursor.str16()?;
            let count = cursor.u8()? as usize;
            let mut fields = Vec::with_capacity(count);
            for _ in 0..count {
                let field = cursor.str16()?;
                let field_tag = cursor.u8()?;
                fields.push((field, read_value(cursor, field_tag, depth + 1)?));
            }
            LogValue::Struct { name, fields }
        }
        tag::ENUM => LogValue::Enum {
            name: cursor.str16()?,
            variant: cursor.str16()?,
        },
        unknown => {
            return Err(DecodeError::UnknownTag {
                tag: unknown,
                offset: cursor.offset().saturating_sub(1),
            })
        }
    };

    Ok(value)
}

/// Bounds-checked little-endian reads over one entry body.
struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
    /// Stream offset of `data[0]`, for error reporting.
    base: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8], base: usize) -> Self {
        Self { data, pos: 0, base }
    }

    fn offset(&self) -> usize {
        self.base + self.pos
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn bytes(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        if len > self.remaining() {
            return Err(DecodeError::Truncated {
                offset: self.offset(),
                needed: len - self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.array::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16, DecodeError> {
        self.array().map(u16::from_le_bytes)
    }

    fn u32(&mut self) -> Result<u32, DecodeError> {
        self.array().map(u32::from_le_bytes)
    }

    fn u64(&mut self) -> Result<u64, DecodeError> {
        self.array().map(u64::from_le_bytes)
    }

    fn string(&mut self, len: usize) -> Result<String, DecodeError> {
        let offset = self.offset();
        let bytes = self.bytes(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| DecodeError::InvalidUtf8 { offset })
    }

    fn str16(&mut self) -> Result<String, DecodeError> {
        let len = self.u16()? as usize;
        self.string(len)
    }

    fn str32(&mut self) -> Result<String, DecodeError> {
        let len = self.u32()? as usize;
        self.string(len)
    }
}
