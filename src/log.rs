//! Logging capability handed to middleware at construction.
//!
//! Middleware emit ordinary `tracing` events. A [`Logger`] decides which
//! subscriber receives them: the process-wide one installed by the binary,
//! or a [`Dispatch`] injected explicitly, which is how tests capture the
//! records of a single middleware without touching global state.
//!
//! Both write one JSON object per line through [`JsonLines`]:
//!
//! ```text
//! {"timestamp":"…","level":"INFO","target":"gatehouse::middleware::access_log",
//!  "fields":{"request":{"host":"…","headers":{"accept":"*/*"}},"response":{"status":200,"latency":3}}}
//! ```

use std::fmt;
use std::io;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::{Map, Value};
use tracing::field::{Field, Visit};
use tracing::{Dispatch, Event, Level, Subscriber};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::{FormatTime, SystemTime};
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields, MakeWriter};
use tracing_subscriber::registry::LookupSpan;

/// Fields whose value is JSON text, written into the line as JSON.
pub const EMBEDDED_JSON: &[&str] = &["request.headers"];

// ── Logger ────────────────────────────────────────────────────────────────────

/// Where a middleware's log records go.
#[derive(Clone, Debug, Default)]
pub struct Logger {
    dispatch: Option<Dispatch>,
}

impl Logger {
    /// Emits to whatever subscriber is current when the record is written.
    pub fn ambient() -> Self {
        Self { dispatch: None }
    }

    /// Emits to `dispatch` only.
    pub fn to(dispatch: Dispatch) -> Self {
        Self { dispatch: Some(dispatch) }
    }

    /// Runs `emit`, routing every event it records through this logger.
    pub fn emit<R>(&self, emit: impl FnOnce() -> R) -> R {
        match &self.dispatch {
            Some(dispatch) => tracing::dispatcher::with_default(dispatch, emit),
            None => emit(),
        }
    }
}

/// Installs the process-wide subscriber: [`JsonLines`] on stdout, level
/// taken from `RUST_LOG` and defaulting to `info`.
///
/// Returns an error if a global subscriber was already installed.
pub fn init() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .event_format(JsonLines)
        .with_env_filter(filter)
        .try_init()
}

// ── Formatter ─────────────────────────────────────────────────────────────────

/// One JSON object per event.
///
/// Event fields go under `fields`. A dotted field name becomes a path of
/// nested objects, so `request.host` and `request.method` end up side by
/// side in one `request` object. Fields listed in [`EMBEDDED_JSON`] are
/// parsed and written as JSON instead of as a string.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonLines;

impl<S, N> FormatEvent<S, N> for JsonLines
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();

        let mut timestamp = String::new();
        SystemTime.format_time(&mut Writer::new(&mut timestamp))?;

        let mut fields = Fields::default();
        event.record(&mut fields);

        let mut line = Map::new();
        line.insert("timestamp".to_owned(), Value::String(timestamp));
        line.insert("level".to_owned(), Value::String(metadata.level().to_string()));
        line.insert("target".to_owned(), Value::String(metadata.target().to_owned()));
        line.insert("fields".to_owned(), Value::Object(fields.values));

        writeln!(writer, "{}", Value::Object(line))
    }
}

#[derive(Default)]
struct Fields {
    values: Map<String, Value>,
}

impl Fields {
    fn insert(&mut self, name: &str, value: Value) {
        let mut target = &mut self.values;
        let mut segments = name.split('.').peekable();
        while let Some(segment) = segments.next() {
            if segments.peek().is_none() {
                target.insert(segment.to_owned(), value);
                return;
            }
            let slot = target
                .entry(segment.to_owned())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            let Value::Object(next) = slot else {
                return;
            };
            target = next;
        }
    }

    fn text(&mut self, field: &Field, text: String) {
        let value = if EMBEDDED_JSON.contains(&field.name()) {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        } else {
            Value::String(text)
        };
        self.insert(field.name(), value);
    }
}

impl Visit for Fields {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.text(field, value.to_owned());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.text(field, format!("{value:?}"));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field.name(), Value::from(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field.name(), Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field.name(), Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field.name(), Value::from(value));
    }
}

// ── In-memory sink ────────────────────────────────────────────────────────────

/// Collects [`JsonLines`] output in memory and reads it back as parsed
/// records. Lets a test or an embedding service see exactly what a
/// middleware logged.
///
/// ```rust
/// use gatehouse::log::MemorySink;
///
/// let sink = MemorySink::new();
/// sink.logger().emit(|| tracing::info!(request.method = "GET", "seen"));
///
/// let records = sink.records();
/// assert_eq!(records[0]["fields"]["request"]["method"], "GET");
/// ```
#[derive(Clone, Default)]
pub struct MemorySink {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A subscriber writing every event, down to `TRACE`, into this sink.
    pub fn dispatch(&self) -> Dispatch {
        let subscriber = tracing_subscriber::fmt()
            .event_format(JsonLines)
            .with_max_level(Level::TRACE)
            .with_writer(self.clone())
            .finish();
        Dispatch::new(subscriber)
    }

    pub fn logger(&self) -> Logger {
        Logger::to(self.dispatch())
    }

    /// Every record written so far, oldest first.
    pub fn records(&self) -> Vec<Value> {
        let buf = self.buf.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&buf)
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }
}

impl fmt::Debug for MemorySink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemorySink").finish_non_exhaustive()
    }
}

/// Writer handed out by [`MemorySink`].
pub struct MemoryWriter(Arc<Mutex<Vec<u8>>>);

impl io::Write for MemoryWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for MemorySink {
    type Writer = MemoryWriter;

    fn make_writer(&'a self) -> Self::Writer {
        MemoryWriter(Arc::clone(&self.buf))
    }
}
