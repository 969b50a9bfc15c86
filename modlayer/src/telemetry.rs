//! Logging bootstrap.
//!
//! The engine logs through `tracing` everywhere; this module wires up the
//! subscriber once, from the binary. Console output honours `RUST_LOG`,
//! and an optional rolling file under the state directory's `logs/` keeps
//! a persistent record of deployment mutations.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::LocalTime;
use tracing_subscriber::EnvFilter;

/// Initialise the global tracing subscriber.
///
/// `default_filter` applies when `RUST_LOG` is unset. When `log_dir` is
/// given, output goes to a daily-rolled file inside it instead of stderr;
/// the returned guard must be held for as long as logging should flush.
///
/// Calling this twice is a no-op (the first subscriber wins), which keeps
/// it safe to use from tests.
pub fn init_logging(default_filter: &str, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let timer = LocalTime::rfc_3339();

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "modlayer.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_timer(timer)
                .with_writer(writer)
                .with_ansi(false)
                .try_init();
            Some(guard)
        }
        None => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_timer(timer)
                .try_init();
            None
        }
    }
}
