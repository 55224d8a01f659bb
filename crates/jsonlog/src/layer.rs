//! Provides a [`tracing_subscriber::Layer`] ([`JsonLogLayer`]) that persists `tracing` events
//! through a [`Logger`].

use std::{fmt, sync::Arc};

use time::OffsetDateTime;
use tracing::{
    Event, Subscriber,
    field::{Field as TracingField, Visit},
};
use tracing_subscriber::{Layer, layer::Context};

use crate::{
    encoder::{LogEntry, short_caller},
    field::{Field, FieldValue},
    keys,
    level::Level,
    logger::Logger,
};

/// Events from this crate's own diagnostics are never routed back into the sink.
const INTERNAL_TARGET: &str = env!("CARGO_CRATE_NAME");

/// A [`tracing_subscriber::Layer`] writing every event as a JSON record through a shared
/// [`Logger`].
///
/// Event fields become record fields and the `message` field becomes the record message.
/// `TRACE` events are recorded at `debug`. The layer never terminates the process, and records
/// that cannot be written are dropped.
///
/// ```
/// use std::sync::Arc;
///
/// use jsonlog::{JsonLogLayer, Logger, LoggerConfig};
/// use tracing_subscriber::layer::SubscriberExt;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let directory = tempfile::tempdir()?;
/// let logger = Arc::new(Logger::new(LoggerConfig::new(directory.path()))?);
/// let subscriber = tracing_subscriber::registry().with(JsonLogLayer::new(Arc::clone(&logger)));
///
/// tracing::subscriber::with_default(subscriber, || {
///     tracing::info!(target: "checkout", order_id = 42, "Order placed");
/// });
/// logger.close()?;
///
/// assert!(std::fs::read_to_string(logger.path())?.contains("\"order_id\":42"));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct JsonLogLayer {
    logger: Arc<Logger>,
}

impl JsonLogLayer {
    /// Creates a layer writing to `logger`.
    pub fn new(logger: Arc<Logger>) -> Self {
        Self { logger }
    }

    /// The logger records are written to.
    pub fn logger(&self) -> &Arc<Logger> {
        &self.logger
    }
}

fn is_internal(target: &str) -> bool {
    target
        .strip_prefix(INTERNAL_TARGET)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
}

impl<S: Subscriber> Layer<S> for JsonLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if is_internal(metadata.target()) {
            return;
        }

        let mut visitor = EventFields::default();
        event.record(&mut visitor);

        let caller = metadata
            .file()
            .zip(metadata.line())
            .map(|(file, line)| short_caller(file, line));

        let _ = self.logger.write_entry(&LogEntry {
            timestamp: OffsetDateTime::now_utc(),
            level: Level::from(*metadata.level()),
            caller: caller.as_deref(),
            message: visitor.message.as_deref().unwrap_or_default(),
            fields: &visitor.fields,
        });
    }
}

/// Collects the message and fields of a single event.
#[derive(Debug, Default)]
struct EventFields {
    message: Option<String>,
    fields: Vec<Field>,
}

impl EventFields {
    fn record_value(&mut self, name: &str, value: FieldValue) {
        let name = name.strip_prefix("r#").unwrap_or(name);
        if keys::RESERVED_KEYS.contains(name) {
            tracing::warn!(
                "Attempting to record a reserved key `{name}` (value: {value:?}). Skipping."
            );
        } else {
            self.fields.push(Field::new(name, value));
        }
    }

    fn record_message(&mut self, field: &TracingField, message: impl FnOnce() -> String) -> bool {
        if field.name() != keys::MESSAGE {
            return false;
        }
        if self.message.is_none() {
            self.message = Some(message());
        }
        true
    }
}

impl Visit for EventFields {
    fn record_f64(&mut self, field: &TracingField, value: f64) {
        if !self.record_message(field, || value.to_string()) {
            self.record_value(field.name(), FieldValue::F64(value));
        }
    }

    fn record_i64(&mut self, field: &TracingField, value: i64) {
        if !self.record_message(field, || value.to_string()) {
            self.record_value(field.name(), FieldValue::I64(value));
        }
    }

    fn record_u64(&mut self, field: &TracingField, value: u64) {
        if !self.record_message(field, || value.to_string()) {
            self.record_value(field.name(), FieldValue::from(value));
        }
    }

    fn record_bool(&mut self, field: &TracingField, value: bool) {
        if !self.record_message(field, || value.to_string()) {
            self.record_value(field.name(), FieldValue::Bool(value));
        }
    }

    fn record_str(&mut self, field: &TracingField, value: &str) {
        if field.name() == keys::MESSAGE {
            self.message = Some(value.to_string());
        } else {
            self.record_value(field.name(), FieldValue::String(value.to_string()));
        }
    }

    fn record_error(&mut self, field: &TracingField, value: &(dyn std::error::Error + 'static)) {
        if !self.record_message(field, || value.to_string()) {
            self.record_value(field.name(), FieldValue::String(value.to_string()));
        }
    }

    fn record_debug(&mut self, field: &TracingField, value: &dyn fmt::Debug) {
        if self.record_message(field, || format!("{value:?}")) {
            return;
        }
        // Metadata of events forwarded from the `log` crate.
        if field.name().starts_with("log.") {
            return;
        }
        self.record_value(field.name(), FieldValue::String(format!("{value:?}")));
    }
}
