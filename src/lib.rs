//! # binlog
//!
//! A structured binary logging library. Log statements are split into two
//! parts:
//!
//! * a **template**: severity, category, source location, format string and
//!   argument types, registered once per call site;
//! * an **event**: template id, timestamp and the encoded argument values,
//!   written on every call.
//!
//! Producers append events to their own in-memory queue without formatting
//! anything. An application-chosen consumer periodically drains all queues
//! into an [`OutputSink`], producing a self-describing stream that
//! [`LogReader`] decodes without access to the program that wrote it.
//!
//! ## Key Features
//!
//! * Format strings checked against the arguments at compile time
//! * Each template written once per stream, ahead of its first event
//! * Per-writer queues; producers never wait for the consumer
//! * Bounded queues: records that do not fit are dropped and counted
//! * Sink failures reported to the caller; nothing is retried
//!
//! ## Main Components
//!
//! * [`Session`]: the queues of one stream and the `consume` operation
//! * [`SessionWriter`]: a producer's handle, one per thread
//! * [`log_record!`] and the `binlog_*!` macros: the logging front end
//! * [`OutputSink`]: where consumed bytes go ([`IoSink`], [`Lz4Sink`], `Vec<u8>`)
//! * [`LogReader`]: decodes a stream back into [`LogEntry`] values
//!
//! ## Quick Start
//!
//! ```
//! use binlog::{log_record, LogReader, Session, SessionConfig, Severity};
//!
//! let session = Session::new(SessionConfig::default()).unwrap();
//! let mut writer = session.writer_named("main");
//!
//! log_record!(writer, Severity::Info, "Hello, world!");
//! log_record!(writer, Severity::Info, "Temperature: {} C", 25.5);
//! log_record!(writer, Severity::Warning, "Status: {}, Count: {}", true, 42);
//!
//! // Drain into memory; a file would use `IoSink::new(file)`.
//! let mut stream = Vec::new();
//! session.consume(&mut stream);
//!
//! let lines: Vec<String> = LogReader::new(&stream)
//!     .map(|entry| entry.unwrap().format())
//!     .collect();
//! assert_eq!(lines[1], "Temperature: 25.5 C");
//! assert_eq!(lines[2], "Status: true, Count: 42");
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod log_reader;
pub mod loggable;
mod macros;
pub mod session;
pub mod severity;
pub mod sink;
pub mod template_registry;
pub mod wire;

mod channel;

pub use clock::{ClockSync, SessionClock, CLOCK_FREQUENCY};
pub use config::SessionConfig;
pub use error::{ConfigError, DecodeError, SinkError};
pub use log_reader::{LogEntry, LogReader, LogValue, TemplateInfo};
pub use loggable::{Bytes, Loggable};
pub use session::{consume, default_session, with_default_writer, DrainResult, Session, SessionWriter};
pub use severity::{ParseSeverityError, Severity};
pub use sink::{IoSink, Lz4Sink, OutputSink};
pub use template_registry::{CallSite, Template, TemplateId, TemplateRegistry};
