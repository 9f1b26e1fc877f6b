use binlog::{log_record, LogReader, Session, SessionConfig, Severity};

fn bounded_session(max_channel_bytes: usize) -> Session {
    Session::new(
        SessionConfig::default()
            .with_initial_channel_capacity(64)
            .with_max_channel_bytes(max_channel_bytes),
    )
    .unwrap()
}

#[test]
fn test_full_channel_drops_and_counts() {
    let session = bounded_session(512);
    let mut writer = session.writer();

    let mut queued = 0u64;
    for i in 0..100u64 {
        if log_record!(writer, Severity::Info, "filling {}", i) {
            queued += 1;
        }
    }
    assert!(queued > 0 && queued < 100, "queued {} of 100", queued);
    assert_eq!(writer.dropped_records(), 100 - queued);
    assert_eq!(session.dropped_records(), 100 - queued);

    let mut stream = Vec::new();
    let result = session.consume(&mut stream);
    assert_eq!(result.records_written as u64, queued);

    // The events that made it are the oldest ones.
    let firsts: Vec<String> = LogReader::new(&stream).map(|entry| entry.unwrap().format()).collect();
    assert_eq!(firsts[0], "filling 0");
    assert_eq!(firsts.last().unwrap(), &format!("filling {}", queued - 1));
}

#[test]
fn test_consume_frees_space() {
    let session = bounded_session(256);
    let mut writer = session.writer();
    let mut stream = Vec::new();

    for _ in 0..3 {
        while log_record!(writer, Severity::Info, "until full {}", 0u32) {}
        assert!(session.consume(&mut stream).records_written > 0);
        assert!(log_record!(writer, Severity::Info, "room again"));
        session.consume(&mut stream);
    }
    assert_eq!(session.dropped_records(), 3);
}

#[test]
fn test_record_larger_than_ceiling_is_dropped() {
    let session = bounded_session(128);
    let mut writer = session.writer();
    let big = "x".repeat(1024);

    assert!(!log_record!(writer, Severity::Info, "big {}", big));
    assert!(log_record!(writer, Severity::Info, "small {}", 1u8));
    assert_eq!(writer.dropped_records(), 1);

    let mut stream = Vec::new();
    assert_eq!(session.consume(&mut stream).records_written, 1);
}

#[test]
fn test_drops_are_per_writer() {
    let session = bounded_session(128);
    let mut noisy = session.writer_named("noisy");
    let mut quiet = session.writer_named("quiet");

    while log_record!(noisy, Severity::Debug, "noise") {}
    assert!(log_record!(quiet, Severity::Info, "still heard"));
    assert_eq!(noisy.dropped_records(), 1);
    assert_eq!(quiet.dropped_records(), 0);
}
