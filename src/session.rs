use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;

use lazy_static::lazy_static;
use parking_lot::Mutex;

use crate::channel::{Batch, Channel};
use crate::clock::SessionClock;
use crate::config::SessionConfig;
use crate::error::ConfigError;
use crate::loggable::Loggable;
use crate::severity::Severity;
use crate::sink::OutputSink;
use crate::template_registry::{CallSite, TemplateId, TemplateRegistry};
use crate::wire::{self, EventFrames};

/// Most arguments a single event can carry; the count is one byte.
pub const MAX_ARGUMENTS: usize = u8::MAX as usize;

lazy_static! {
    static ref DEFAULT_SESSION: Session = Session::from_env();
}

thread_local! {
    static DEFAULT_WRITER: RefCell<Option<SessionWriter>> = const { RefCell::new(None) };
}

/// Outcome of one [`Session::consume`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainResult {
    /// Events handed to the sink by successful writes.
    pub records_written: usize,
    /// All bytes handed to the sink, definitions and metadata included.
    pub bytes_written: usize,
    /// Template definitions written ahead of their first event.
    pub templates_written: usize,
    /// Detached events that were not written because the sink failed.
    pub records_lost: usize,
    pub sink_failed: bool,
}

/// A logging session: per-producer queues plus the state needed to turn
/// them into a self-contained stream.
///
/// Producers log through a [`SessionWriter`] (one per thread); the
/// application periodically calls [`consume`](Session::consume) to move
/// everything queued so far into an [`OutputSink`]. `Session` is a cheap,
/// cloneable handle.
///
/// # Ordering
///
/// Events of one writer reach the sink in the order they were logged. Events
/// of different writers are not interleaved by time: each drain writes the
/// queued events writer by writer. Applications needing a global order can
/// log their own sequence number.
///
/// # Examples
///
/// ```
/// use binlog::{log_record, Session, SessionConfig, Severity};
///
/// let session = Session::new(SessionConfig::default()).unwrap();
/// let mut writer = session.writer();
///
/// log_record!(writer, Severity::Info, "Temperature: {} C", 25.5);
/// log_record!(writer, Severity::Warning, "Status: {}, Count: {}", true, 42);
///
/// let mut sink = Vec::new();
/// let result = session.consume(&mut sink);
/// assert_eq!(result.records_written, 2);
/// assert!(!result.sink_failed);
/// ```
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    config: SessionConfig,
    registry: &'static TemplateRegistry,
    clock: SessionClock,
    channels: Mutex<Vec<Arc<Channel>>>,
    next_channel_id: AtomicU64,
    min_severity: AtomicU8,
    dropped: AtomicU64,
    consumer: Mutex<ConsumerState>,
}

/// What the stream written so far already contains.
#[derive(Default)]
struct ConsumerState {
    written_templates: HashSet<TemplateId>,
    clock_synced: bool,
    staging: Vec<u8>,
}

impl Session {
    pub fn new(config: SessionConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::with_validated(config))
    }

    fn with_validated(config: SessionConfig) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                min_severity: AtomicU8::new(config.min_severity.as_u8()),
                config,
                registry: TemplateRegistry::global(),
                clock: SessionClock::new(),
                channels: Mutex::new(Vec::new()),
                next_channel_id: AtomicU64::new(1),
                dropped: AtomicU64::new(0),
                consumer: Mutex::new(ConsumerState::default()),
            }),
        }
    }

    /// Session configured from the `BINLOG_*` environment variables, falling
    /// back to the defaults when they are invalid.
    pub fn from_env() -> Self {
        let config = SessionConfig::from_env().unwrap_or_else(|err| {
            tracing::warn!(error = %err, "ignoring invalid binlog environment configuration");
            SessionConfig::default()
        });

        match Self::new(config) {
            Ok(session) => session,
            Err(err) => {
                tracing::warn!(error = %err, "falling back to default binlog configuration");
                Self::default()
            }
        }
    }

    /// Creates a writer with its own queue, named after the current thread.
    pub fn writer(&self) -> SessionWriter {
        let current = thread::current();
        let name = current
            .name()
            .map(str::to_owned)
            .unwrap_or_else(|| format!("{:?}", current.id()));
        self.writer_named(name)
    }

    pub fn writer_named(&self, name: impl Into<String>) -> SessionWriter {
        let inner = &self.inner;
        let id = inner.next_channel_id.fetch_add(1, Ordering::Relaxed);
        let channel = Arc::new(Channel::new(
            id,
            name.into(),
            inner.config.initial_channel_capacity,
            inner.config.max_channel_bytes,
        ));
        inner.channels.lock().push(Arc::clone(&channel));
        tracing::debug!(writer = id, name = %channel.name(), "created session writer");

        SessionWriter {
            session: self.clone(),
            channel,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &'static TemplateRegistry {
        self.inner.registry
    }

    pub fn min_severity(&self) -> Severity {
        Severity::from_u8(self.inner.min_severity.load(Ordering::Relaxed)).unwrap_or(Severity::Trace)
    }

    /// Events below `severity` are discarded before their arguments are
    /// evaluated. They do not count as dropped.
    pub fn set_min_severity(&self, severity: Severity) {
        self.inner.min_severity.store(severity.as_u8(), Ordering::Relaxed);
    }

    /// Events rejected because their writer's queue was at its ceiling. The
    /// default session also counts level-macro events that found no writer.
    pub fn dropped_records(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    /// Number of writers whose queues are still attached to the session.
    pub fn writer_count(&self) -> usize {
        self.inner.channels.lock().len()
    }

    /// Moves every queued event into `sink`.
    ///
    /// All writer queues are detached first, then serialized: a clock anchor
    /// on the first non-empty drain, and per writer a properties entry
    /// followed by its events, each preceded by its template definition the
    /// first time this session writes it. Bytes are handed to the sink in
    /// chunks of [`SessionConfig::write_chunk_size`].
    ///
    /// If the sink fails, writing stops and the remaining detached events are
    /// counted in [`DrainResult::records_lost`]; they are not re-queued. With
    /// nothing queued, the sink is not touched at all.
    pub fn consume<S: OutputSink + ?Sized>(&self, sink: &mut S) -> DrainResult {
        let inner = &*self.inner;
        let mut consumer = inner.consumer.lock();

        let channels: Vec<Arc<Channel>> = inner.channels.lock().clone();
        let batches: Vec<(Arc<Channel>, Batch)> = channels
            .into_iter()
            .map(|channel| {
                let batch = channel.detach();
                (channel, batch)
            })
            .collect();

        if batches.iter().any(|(_, batch)| batch.closed) {
            inner.channels.lock().retain(|channel| {
                !batches
                    .iter()
                    .any(|(closed, batch)| batch.closed && Arc::ptr_eq(channel, closed))
            });
        }

        let staging = std::mem::take(&mut consumer.staging);
        let mut drain = Drain {
            sink,
            state: &mut *consumer,
            inner,
            staging,
            staged_records: 0,
            staged_templates: HashSet::new(),
            staged_clock_sync: false,
            result: DrainResult::default(),
        };

        for (channel, batch) in batches.iter().filter(|(_, batch)| batch.records > 0) {
            drain.write_batch(channel, batch);
        }
        let (result, staging) = drain.finish();

        consumer.staging = staging;
        drop(consumer);

        for (channel, batch) in batches {
            channel.recycle(batch.bytes);
        }
        result
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::with_validated(SessionConfig::default())
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.inner.config)
            .field("writers", &self.writer_count())
            .field("dropped", &self.dropped_records())
            .finish()
    }
}

/// Serialization state of one `consume` call.
struct Drain<'a, S: OutputSink + ?Sized> {
    sink: &'a mut S,
    state: &'a mut ConsumerState,
    inner: &'a SessionInner,
    staging: Vec<u8>,
    staged_records: usize,
    staged_templates: HashSet<TemplateId>,
    staged_clock_sync: bool,
    result: DrainResult,
}

impl<S: OutputSink + ?Sized> Drain<'_, S> {
    fn write_batch(&mut self, channel: &Channel, batch: &Batch) {
        if self.result.sink_failed {
            self.result.records_lost += batch.records;
            return;
        }

        if !self.state.clock_synced && !self.staged_clock_sync {
            wire::write_clock_sync(&self.inner.clock.sync(), &mut self.staging);
            self.staged_clock_sync = true;
        }
        wire::write_writer_properties(channel.id(), &channel.name(), &mut self.staging);

        let mut remaining = batch.records;
        for (frame, template_id) in EventFrames::new(&batch.bytes) {
            if !self.state.written_templates.contains(&template_id)
                && !self.staged_templates.contains(&template_id)
            {
                match self.inner.registry.get(template_id) {
                    Some(template) => {
                        wire::write_template(&template, &mut self.staging);
                        self.staged_templates.insert(template_id);
                    }
                    None => tracing::error!(template = %template_id, "event references an unregistered template"),
                }
            }

            self.staging.extend_from_slice(frame);
            self.staged_records += 1;
            remaining -= 1;

            if self.staging.len() >= self.inner.config.write_chunk_size && !self.flush_staging() {
                self.result.records_lost += remaining;
                return;
            }
        }
    }

    /// Hands the staged bytes to the sink. Returns `false` if the sink failed.
    fn flush_staging(&mut self) -> bool {
        if self.staging.is_empty() {
            return true;
        }

        match self.sink.write_bytes(&self.staging) {
            Ok(()) => {
                self.result.bytes_written += self.staging.len();
                self.result.records_written += self.staged_records;
                self.result.templates_written += self.staged_templates.len();
                self.state.written_templates.extend(self.staged_templates.drain());
                if self.staged_clock_sync {
                    self.state.clock_synced = true;
                    self.staged_clock_sync = false;
                }
                self.staged_records = 0;
                self.staging.clear();
                true
            }
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    lost = self.staged_records,
                    "sink write failed, abandoning the rest of this drain"
                );
                self.result.sink_failed = true;
                self.result.records_lost += self.staged_records;
                self.staged_records = 0;
                self.staged_templates.clear();
                self.staged_clock_sync = false;
                self.staging.clear();
                false
            }
        }
    }

    fn finish(mut self) -> (DrainResult, Vec<u8>) {
        if !self.result.sink_failed && self.flush_staging() && self.result.bytes_written > 0 {
            if let Err(err) = self.sink.flush() {
                tracing::warn!(error = %err, "sink flush failed");
                self.result.sink_failed = true;
            }
        }

        if self.result.bytes_written > 0 || self.result.sink_failed {
            tracing::debug!(
                records = self.result.records_written,
                bytes = self.result.bytes_written,
                templates = self.result.templates_written,
                lost = self.result.records_lost,
                sink_failed = self.result.sink_failed,
                "drained log session"
            );
        }
        (self.result, self.staging)
    }
}

/// Producer handle of a [`Session`], owning one queue.
///
/// A writer is meant to stay on one thread: create one per producing thread
/// with [`Session::writer`]. Writing only locks the writer's own queue, which
/// is contended only by the consumer's buffer swap. Dropping the writer
/// detaches its queue from the session once the remaining events have been
/// consumed.
pub struct SessionWriter {
    session: Session,
    channel: Arc<Channel>,
}

impl SessionWriter {
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Producer id written to the stream with this writer's events.
    pub fn id(&self) -> u64 {
        self.channel.id()
    }

    pub fn name(&self) -> String {
        self.channel.name()
    }

    /// Renames the producer; takes effect from the next `consume`.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.channel.set_name(name.into());
    }

    #[inline(always)]
    pub fn enabled(&self, severity: Severity) -> bool {
        severity.as_u8() >= self.session.inner.min_severity.load(Ordering::Relaxed)
    }

    /// Records this writer could not queue.
    pub fn dropped_records(&self) -> u64 {
        self.channel.dropped()
    }

    /// Encodes and queues one event for `site`.
    ///
    /// This is the low-level entry point behind [`log_record!`](crate::log_record);
    /// the macro declares the call site and checks the format string at
    /// compile time. Returns `false` if the event was dropped because the
    /// queue is at its ceiling.
    pub fn write_event(&mut self, site: &'static CallSite, args: &[&dyn Loggable]) -> bool {
        let inner = &*self.session.inner;
        let template = inner.registry.resolve(site, args);
        let severity = site.severity();
        let body_len = wire::event_body_len(args);
        // An argument count that does not fit its byte is rejected like an
        // oversized record.
        let entry_len = if args.len() > MAX_ARGUMENTS {
            usize::MAX
        } else {
            wire::event_entry_len(body_len)
        };
        let timestamp = inner.clock.now();

        let queued = self.channel.push(entry_len, |out| {
            wire::write_event(template, severity, timestamp, args, body_len, out)
        });
        if !queued {
            inner.dropped.fetch_add(1, Ordering::Relaxed);
        }
        queued
    }
}

impl Drop for SessionWriter {
    fn drop(&mut self) {
        self.channel.close();
        tracing::debug!(writer = self.channel.id(), "closed session writer");
    }
}

impl fmt::Debug for SessionWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionWriter")
            .field("id", &self.id())
            .field("name", &self.name())
            .finish()
    }
}

/// The process-wide session used by the `binlog_*!` macros and [`consume`].
///
/// Created on first use from the `BINLOG_*` environment variables.
pub fn default_session() -> &'static Session {
    &DEFAULT_SESSION
}

/// Runs `f` with this thread's writer of the default session, creating it
/// on first use.
///
/// Returns `None` when the writer is unavailable: during thread teardown, or
/// when called re-entrantly from an argument being logged.
pub fn with_default_writer<R>(f: impl FnOnce(&mut SessionWriter) -> R) -> Option<R> {
    DEFAULT_WRITER
        .try_with(|slot| {
            let mut slot = slot.try_borrow_mut().ok()?;
            let writer = slot.get_or_insert_with(|| default_session().writer());
            Some(f(writer))
        })
        .ok()
        .flatten()
}

/// Counts a level-macro event that found no default writer as dropped.
#[doc(hidden)]
pub fn __default_writer_unavailable(severity: Severity) {
    let session = default_session();
    if severity.as_u8() >= session.inner.min_severity.load(Ordering::Relaxed) {
        session.inner.dropped.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(%severity, "default writer unavailable, event dropped");
    }
}

/// Drains the default session into `sink`. See [`Session::consume`].
pub fn consume<S: OutputSink + ?Sized>(sink: &mut S) -> DrainResult {
    default_session().consume(sink)
}

#[cfg(test)]
mod tests {
    use super::*;

    static SITE: CallSite = CallSite::new(Severity::Info, "session", file!(), line!(), "value {}");

    fn small_session(max_channel_bytes: usize) -> Session {
        Session::new(
            SessionConfig::default()
                .with_initial_channel_capacity(64)
                .with_max_channel_bytes(max_channel_bytes),
        )
        .unwrap()
    }

    #[test]
    fn test_empty_consume_does_not_touch_sink() {
        struct Untouchable;
        impl OutputSink for Untouchable {
            fn write_bytes(&mut self, _bytes: &[u8]) -> Result<(), crate::SinkError> {
                panic!("sink must not be written");
            }
            fn flush(&mut self) -> Result<(), crate::SinkError> {
                panic!("sink must not be flushed");
            }
            fn has_failed(&self) -> bool {
                false
            }
        }

        let session = small_session(1024);
        let _writer = session.writer();
        assert_eq!(session.consume(&mut Untouchable), DrainResult::default());
    }

    #[test]
    fn test_template_written_once_per_session() {
        let session = small_session(4096);
        let mut writer = session.writer();
        let mut sink = Vec::new();

        assert!(writer.write_event(&SITE, &[&1u32]));
        assert!(writer.write_event(&SITE, &[&2u32]));
        let first = session.consume(&mut sink);
        assert_eq!(first.records_written, 2);
        assert_eq!(first.templates_written, 1);

        assert!(writer.write_event(&SITE, &[&3u32]));
        let second = session.consume(&mut sink);
        assert_eq!(second.records_written, 1);
        assert_eq!(second.templates_written, 0);
        assert_eq!(sink.len(), first.bytes_written + second.bytes_written);
    }

    #[test]
    fn test_drop_counter_tracks_rejections() {
        let entry = wire::event_entry_len(wire::event_body_len(&[&0u32]));
        let session = small_session(entry * 3);
        let mut writer = session.writer();

        let queued = (0..5u32).filter(|i| writer.write_event(&SITE, &[i])).count();
        assert_eq!(queued, 3);
        assert_eq!(session.dropped_records(), 2);
        assert_eq!(writer.dropped_records(), 2);

        let result = session.consume(&mut Vec::new());
        assert_eq!(result.records_written, 3);
        assert!(writer.write_event(&SITE, &[&9u32]), "consume frees the channel");
    }

    #[test]
    fn test_closed_writers_are_removed_after_drain() {
        let session = small_session(4096);
        {
            let mut writer = session.writer_named("short-lived");
            assert!(writer.write_event(&SITE, &[&1u32]));
        }
        assert_eq!(session.writer_count(), 1);

        let result = session.consume(&mut Vec::new());
        assert_eq!(result.records_written, 1);
        assert_eq!(session.writer_count(), 0);
    }

    #[test]
    fn test_min_severity_filter() {
        let session = small_session(4096);
        let writer = session.writer();
        assert!(writer.enabled(Severity::Trace));

        session.set_min_severity(Severity::Error);
        assert!(!writer.enabled(Severity::Warning));
        assert!(writer.enabled(Severity::Critical));
        assert_eq!(session.min_severity(), Severity::Error);
    }
}
