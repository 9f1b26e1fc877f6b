use binlog::{log_record, IoSink, LogReader, Lz4Sink, OutputSink, Session, SessionConfig, Severity, SinkError};
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};

/// Sink that accepts a fixed number of writes, then fails.
struct FailingSink {
    accepted_writes: usize,
    data: Vec<u8>,
    failed: bool,
}

impl FailingSink {
    fn new(accepted_writes: usize) -> Self {
        Self {
            accepted_writes,
            data: Vec::new(),
            failed: false,
        }
    }
}

impl OutputSink for FailingSink {
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), SinkError> {
        if self.accepted_writes == 0 {
            self.failed = true;
            return Err(SinkError::Io(io::Error::new(io::ErrorKind::Other, "disk full")));
        }
        self.accepted_writes -= 1;
        self.data.extend_from_slice(bytes);
        Ok(())
    }

    fn has_failed(&self) -> bool {
        self.failed
    }
}

/// Writer that fails once it has taken `limit` bytes.
struct LimitedWriter {
    written: usize,
    limit: usize,
}

impl Write for LimitedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written + buf.len() > self.limit {
            return Err(io::Error::new(io::ErrorKind::WriteZero, "device full"));
        }
        self.written += buf.len();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn chunked_session(write_chunk_size: usize) -> Session {
    Session::new(SessionConfig::default().with_write_chunk_size(write_chunk_size)).unwrap()
}

#[test]
fn test_sink_failure_reports_written_and_lost() {
    // With one-byte chunks every event is its own write.
    let session = chunked_session(1);
    let mut writer = session.writer();
    for i in 0..10u32 {
        log_record!(writer, Severity::Info, "event {}", i);
    }

    let mut sink = FailingSink::new(3);
    let result = session.consume(&mut sink);
    assert!(result.sink_failed);
    assert!(sink.has_failed());
    assert_eq!(result.records_written, 3);
    assert_eq!(result.records_lost, 7);
    assert_eq!(result.bytes_written, sink.data.len());

    // What reached the sink is a valid stream of the first three events.
    let lines: Vec<String> = LogReader::new(&sink.data).map(|entry| entry.unwrap().format()).collect();
    assert_eq!(lines, vec!["event 0", "event 1", "event 2"]);

    // Lost events are not re-queued.
    let mut next = Vec::new();
    assert_eq!(session.consume(&mut next).records_written, 0);
    assert!(next.is_empty());
}

#[test]
fn test_failure_before_anything_written() {
    let session = chunked_session(64 * 1024);
    let mut first = session.writer();
    let mut second = session.writer();
    log_record!(first, Severity::Info, "from first");
    log_record!(second, Severity::Info, "from second");

    let mut sink = FailingSink::new(0);
    let result = session.consume(&mut sink);
    assert!(result.sink_failed);
    assert_eq!(result.records_written, 0);
    assert_eq!(result.records_lost, 2);
    assert_eq!(result.bytes_written, 0);
    assert_eq!(result.templates_written, 0);
}

#[test]
fn test_definitions_are_resent_after_failed_write() {
    let session = chunked_session(64 * 1024);
    let mut writer = session.writer();
    log_record!(writer, Severity::Info, "retry {}", 1u8);
    assert!(session.consume(&mut FailingSink::new(0)).sink_failed);

    // The failed write never delivered the clock anchor or the template.
    log_record!(writer, Severity::Info, "retry {}", 2u8);
    let mut stream = Vec::new();
    let result = session.consume(&mut stream);
    assert_eq!(result.templates_written, 1);

    let entry = LogReader::new(&stream).next().unwrap().unwrap();
    assert_eq!(entry.format(), "retry 2");
    assert!(entry.timestamp.is_some());
}

#[test]
fn test_io_sink_failure_latches() {
    let session = chunked_session(1);
    let mut writer = session.writer();
    for i in 0..100u32 {
        log_record!(writer, Severity::Info, "payload {}", i);
    }

    let mut sink = IoSink::new(LimitedWriter { written: 0, limit: 300 });
    let result = session.consume(&mut sink);
    assert!(result.sink_failed);
    assert!(sink.has_failed());
    assert_eq!(sink.error().unwrap().kind(), io::ErrorKind::WriteZero);
    assert!(result.bytes_written <= 300);
    assert_eq!(result.records_written + result.records_lost, 100);

    // A latched sink refuses the next drain too.
    log_record!(writer, Severity::Info, "payload {}", 100u32);
    let result = session.consume(&mut sink);
    assert!(result.sink_failed);
    assert_eq!(result.records_lost, 1);
}

#[test]
fn test_file_sink_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.blog");

    let session = chunked_session(128);
    let mut writer = session.writer_named("file-writer");
    for i in 0..200u32 {
        log_record!(writer, Severity::Debug, "line {} of {}", i, 200u32);
    }

    let mut sink = IoSink::new(BufWriter::new(File::create(&path).unwrap()));
    let result = session.consume(&mut sink);
    assert!(!result.sink_failed);
    drop(sink);

    let mut data = Vec::new();
    File::open(&path).unwrap().read_to_end(&mut data).unwrap();
    assert_eq!(data.len(), result.bytes_written);

    let entries: Vec<_> = LogReader::new(&data).collect::<Result<_, _>>().unwrap();
    assert_eq!(entries.len(), 200);
    assert_eq!(entries[199].format(), "line 199 of 200");
    assert_eq!(entries[0].producer_name.as_deref(), Some("file-writer"));
}

#[test]
fn test_lz4_sink_roundtrip() {
    let session = chunked_session(4096);
    let mut writer = session.writer();
    for i in 0..1_000u32 {
        log_record!(writer, Severity::Info, "compressible message number {}", i);
    }

    let mut sink = Lz4Sink::new(Vec::new());
    let result = session.consume(&mut sink);
    assert!(!result.sink_failed);
    let compressed = sink.finish().unwrap();
    assert!(compressed.len() < result.bytes_written);

    let mut data = Vec::new();
    lz4_flex::frame::FrameDecoder::new(compressed.as_slice())
        .read_to_end(&mut data)
        .unwrap();
    assert_eq!(LogReader::new(&data).count(), 1_000);
}
