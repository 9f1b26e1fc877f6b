use std::fs::File;
use std::io::{self, BufWriter};
use std::process::ExitCode;

use binlog::{binlog_info, IoSink, OutputSink};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const OUTPUT_PATH: &str = "hello.blog";

fn main() -> ExitCode {
    let (diagnostics, _guard) = tracing_appender::non_blocking(io::stderr());
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "binlog=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(diagnostics))
        .init();

    binlog_info!("Hello {}!", "World");

    let file = match File::create(OUTPUT_PATH) {
        Ok(file) => file,
        Err(err) => {
            tracing::error!(path = OUTPUT_PATH, error = %err, "cannot create log file");
            return ExitCode::FAILURE;
        }
    };

    let mut sink = IoSink::new(BufWriter::new(file));
    let result = binlog::consume(&mut sink);

    if sink.has_failed() {
        tracing::error!(
            path = OUTPUT_PATH,
            records_lost = result.records_lost,
            error = ?sink.error(),
            "failed to write log stream"
        );
        return ExitCode::FAILURE;
    }

    tracing::info!(
        path = OUTPUT_PATH,
        records = result.records_written,
        bytes = result.bytes_written,
        "wrote log stream"
    );
    ExitCode::SUCCESS
}
