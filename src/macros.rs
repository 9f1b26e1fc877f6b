//! Logging macros.
//!
//! [`log_record!`] writes through an explicit [`SessionWriter`](crate::SessionWriter);
//! the `binlog_*!` macros write through the calling thread's writer of the
//! default session. All of them check the format string against the argument
//! list at compile time and declare one static call site per invocation, so
//! the template is registered once and every later event only carries its id.

/// Counts comma-separated token trees. Expands to a `usize` constant
/// expression.
#[doc(hidden)]
#[macro_export]
macro_rules! __count_args {
    (@one $x:tt) => {
        1usize
    };
    ($($x:tt),* $(,)?) => {
        0usize $(+ $crate::__count_args!(@one $x))*
    };
}

/// Writes one event through a [`SessionWriter`](crate::SessionWriter).
///
/// Expands to a `bool`: `true` if the event was queued, `false` if it was
/// filtered by the session's minimum severity or dropped because the writer's
/// queue is full. Arguments are only evaluated when the severity is enabled.
///
/// The format string must be a literal. Every `{...}` is a placeholder and
/// `{{`/`}}` are literal braces; the number of placeholders must equal the
/// number of arguments, and every argument must implement
/// [`Loggable`](crate::Loggable). Violations are compile errors:
///
/// ```compile_fail
/// # use binlog::{log_record, Session, Severity};
/// let mut writer = Session::default().writer();
/// log_record!(writer, Severity::Info, "two {} {}", 1);
/// ```
///
/// `$writer` is used as a method receiver and should be a place: a variable,
/// or `*writer` for a `&mut SessionWriter`.
///
/// `$severity` initializes the call site's `static`, so it must be a constant
/// expression: a `Severity` variant or a `const`. A level only known at run
/// time does not compile; match on it and give each arm its own call site.
///
/// ```compile_fail
/// # use binlog::{log_record, Session, Severity};
/// let mut writer = Session::default().writer();
/// let level = Severity::Info;
/// log_record!(writer, level, "runtime level");
/// ```
///
/// # Examples
///
/// ```
/// use binlog::{log_record, Session, SessionConfig, Severity};
///
/// let session = Session::new(SessionConfig::default()).unwrap();
/// let mut writer = session.writer();
///
/// log_record!(writer, Severity::Info, "Hello, world!");
/// log_record!(writer, Severity::Warning, "Status: {}, Count: {}", true, 42);
///
/// const AUDIT: Severity = Severity::Warning;
/// log_record!(writer, AUDIT, "user {} logged in", "alice");
/// ```
#[macro_export]
macro_rules! log_record {
    ($writer:expr, $severity:expr, $fmt:literal $(, $arg:expr)* $(,)?) => {{
        const _: () = ::std::assert!(
            $crate::template_registry::validate_format($fmt),
            "unbalanced braces in format string"
        );
        const _: () = ::std::assert!(
            $crate::template_registry::count_placeholders($fmt) == $crate::__count_args!($($arg),*),
            "number of placeholders does not match number of arguments"
        );
        const _: () = ::std::assert!(
            $crate::__count_args!($($arg),*) <= 255,
            "too many arguments for one event"
        );

        static SITE: $crate::CallSite =
            $crate::CallSite::new($severity, ::std::module_path!(), ::std::file!(), ::std::line!(), $fmt);

        if $writer.enabled(SITE.severity()) {
            $writer.write_event(&SITE, &[$(&$arg as &dyn $crate::Loggable),*])
        } else {
            false
        }
    }};
}

#[doc(hidden)]
#[macro_export]
macro_rules! __binlog_default {
    ($severity:expr, $fmt:literal $(, $arg:expr)* $(,)?) => {{
        let __binlog_logged = $crate::with_default_writer(|__binlog_writer: &mut $crate::SessionWriter| {
            $crate::log_record!(*__binlog_writer, $severity, $fmt $(, $arg)*)
        });
        if __binlog_logged.is_none() {
            $crate::session::__default_writer_unavailable($severity);
        }
    }};
}

/// Logs a trace event through the default session.
#[macro_export]
macro_rules! binlog_trace {
    ($($args:tt)*) => {
        $crate::__binlog_default!($crate::Severity::Trace, $($args)*)
    };
}

/// Logs a debug event through the default session.
#[macro_export]
macro_rules! binlog_debug {
    ($($args:tt)*) => {
        $crate::__binlog_default!($crate::Severity::Debug, $($args)*)
    };
}

/// Logs an info event through the default session.
///
/// ```
/// use binlog::binlog_info;
///
/// binlog_info!("Hello {}!", "World");
/// ```
#[macro_export]
macro_rules! binlog_info {
    ($($args:tt)*) => {
        $crate::__binlog_default!($crate::Severity::Info, $($args)*)
    };
}

/// Logs a warning through the default session.
#[macro_export]
macro_rules! binlog_warn {
    ($($args:tt)*) => {
        $crate::__binlog_default!($crate::Severity::Warning, $($args)*)
    };
}

/// Logs an error through the default session.
#[macro_export]
macro_rules! binlog_error {
    ($($args:tt)*) => {
        $crate::__binlog_default!($crate::Severity::Error, $($args)*)
    };
}

/// Logs a critical event through the default session.
#[macro_export]
macro_rules! binlog_critical {
    ($($args:tt)*) => {
        $crate::__binlog_default!($crate::Severity::Critical, $($args)*)
    };
}

#[cfg(test)]
mod tests {
    use crate::{LogReader, Session, SessionConfig, Severity};

    #[test]
    fn test_count_args() {
        assert_eq!(crate::__count_args!(), 0);
        assert_eq!(crate::__count_args!(a), 1);
        assert_eq!(crate::__count_args!(a, (1 + 2), "x",), 3);
    }

    #[test]
    fn test_one_site_one_template() {
        let session = Session::new(SessionConfig::default()).unwrap();
        let mut writer = session.writer();
        for i in 0..3u32 {
            assert!(log_record!(writer, Severity::Info, "iteration {}", i));
        }

        let mut data = Vec::new();
        let result = session.consume(&mut data);
        assert_eq!(result.records_written, 3);
        assert_eq!(result.templates_written, 1);

        let entries: Vec<_> = LogReader::new(&data).map(|entry| entry.unwrap()).collect();
        assert_eq!(entries.len(), 3);
        assert!(entries.iter().all(|entry| entry.template.id == entries[0].template.id));
        assert_eq!(entries[2].format(), "iteration 2");
    }

    #[test]
    fn test_disabled_severity_skips_argument_evaluation() {
        let session = Session::new(SessionConfig::default().with_min_severity(Severity::Error)).unwrap();
        let mut writer = session.writer();
        let mut evaluated = false;

        let queued = log_record!(writer, Severity::Debug, "value {}", {
            evaluated = true;
            1u8
        });
        assert!(!queued);
        assert!(!evaluated);
    }
}
