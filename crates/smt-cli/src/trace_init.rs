#[cfg(feature = "trace")]
use std::path::Path;
#[cfg(feature = "trace")]
use std::sync::Once;

#[cfg(feature = "trace")]
static INIT: Once = Once::new();

/// Keeps the background log writer alive; pending lines are flushed when it
/// is dropped.
#[must_use]
pub struct TraceGuard {
    #[cfg(feature = "trace")]
    _worker: Option<tracing_appender::non_blocking::WorkerGuard>,
}

/// Installs a JSON subscriber writing to `log_dir/smtdecode-trace.jsonl`,
/// or to stderr when no directory is given. `RUST_LOG` overrides the
/// default filter.
#[cfg(feature = "trace")]
pub fn init_tracing(log_dir: Option<&Path>) -> TraceGuard {
    let mut worker = None;
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::new("smt_core=debug,smt_cli=debug")
        });
        let builder = tracing_subscriber::fmt()
            .json()
            .with_target(true)
            .with_span_events(tracing_subscriber::fmt::format::FmtSpan::CLOSE)
            .with_env_filter(filter);
        match log_dir {
            Some(dir) => {
                let file_appender = tracing_appender::rolling::never(dir, "smtdecode-trace.jsonl");
                let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
                worker = Some(guard);
                builder.with_writer(non_blocking).init();
            }
            None => builder.with_writer(std::io::stderr).init(),
        }
    });
    TraceGuard { _worker: worker }
}

#[cfg(not(feature = "trace"))]
pub fn init_tracing(_log_dir: Option<&std::path::Path>) -> TraceGuard {
    TraceGuard {}
}
