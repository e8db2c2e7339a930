//! Structured key=value logging on top of `tracing`.
//!
//! Every remote call made through a [`crate::binding::RemoteBinding`] emits a
//! `tracing` event; this module's [`Sink`] layer renders those events into
//! the key=value line format of the spec (`pkg=`, `mount=`, `target=`,
//! `call=`, `path=`, `retries=`, `walltime=`, `err=`, `caller=`) and keeps a
//! bounded history so [`Handle::logs`](crate::Handle::logs) can replay it,
//! while also forwarding each formatted line to a user-installed callback.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, OnceLock};

use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

const RING_CAPACITY: usize = 4096;

type Handler = Box<dyn Fn(&str) + Send + Sync>;

struct Inner {
    lines: Mutex<VecDeque<String>>,
    handler: Mutex<Option<Handler>>,
}

/// Global sink backing [`crate::Handle::logs`] and [`set_log_handler`].
static SINK: OnceLock<Inner> = OnceLock::new();

fn sink() -> &'static Inner {
    SINK.get_or_init(|| Inner {
        lines: Mutex::new(VecDeque::with_capacity(RING_CAPACITY)),
        handler: Mutex::new(None),
    })
}

/// Installs a callback invoked with every formatted log line as it is produced.
pub fn set_log_handler<F>(f: F)
where
    F: Fn(&str) + Send + Sync + 'static,
{
    *sink().handler.lock().unwrap() = Some(Box::new(f));
}

/// Returns every line currently held in the ring buffer, oldest first.
pub fn logs() -> Vec<String> {
    sink().lines.lock().unwrap().iter().cloned().collect()
}

fn record(line: String) {
    let inner = sink();
    {
        let mut lines = inner.lines.lock().unwrap();
        if lines.len() == RING_CAPACITY {
            lines.pop_front();
        }
        lines.push_back(line.clone());
    }
    if let Some(handler) = inner.handler.lock().unwrap().as_ref() {
        handler(&line);
    }
}

/// One-shot installer for the process-wide `tracing` subscriber. Safe to call
/// more than once; later calls are no-ops.
pub fn init(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(KvLayer)
        .try_init();
}

struct KvLayer;

impl<S> Layer<S> for KvLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = KvVisitor::default();
        event.record(&mut visitor);

        let mut line = format!("lvl={} pkg=muxfys", level_tag(*event.metadata().level()));
        if let Some(module) = event.metadata().module_path() {
            use fmt::Write;
            let _ = write!(line, " caller={module}");
        }
        for (k, v) in visitor.fields {
            use fmt::Write;
            let _ = write!(line, " {k}={v}");
        }
        record(line);
    }
}

fn level_tag(level: Level) -> &'static str {
    match level {
        Level::ERROR => "eror",
        Level::WARN => "warn",
        Level::INFO => "info",
        Level::DEBUG => "debg",
        Level::TRACE => "trce",
    }
}

#[derive(Default)]
struct KvVisitor {
    fields: Vec<(String, String)>,
}

impl Visit for KvVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.fields.push((field.name().to_string(), format!("{value:?}")));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.fields.push((field.name().to_string(), value.to_string()));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.push((field.name().to_string(), value.to_string()));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.push((field.name().to_string(), value.to_string()));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.push((field.name().to_string(), value.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_buffer_evicts_oldest() {
        for i in 0..(RING_CAPACITY + 10) {
            record(format!("line-{i}"));
        }
        let all = logs();
        assert_eq!(all.len(), RING_CAPACITY);
        assert_eq!(all.first().unwrap(), &format!("line-{}", 10));
    }

    #[test]
    fn handler_receives_every_line() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        set_log_handler(move |_line| {
            count2.fetch_add(1, Ordering::SeqCst);
        });
        record("probe".to_string());
        assert!(count.load(Ordering::SeqCst) >= 1);
    }
}
