// Copyright (C) 2022-2025 Michael Herstine <sp1ff@pobox.com>
//
// This file is part of es-bulk-udp.
//
// es-bulk-udp is free software: you can redistribute it and/or modify it under the terms of the
// GNU General Public License as published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// mpdpopm is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even
// the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details.
//
// You should have received a copy of the GNU General Public License along with mpdpopm.  If not,
// see <http://www.gnu.org/licenses/>.

//! A [`tracing-subscriber`] [`Layer`] that ships [`tracing`] [`Event`]s as bulk records.
//!
//! [`tracing-subscriber`]: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/index.html
//! [`Layer`]: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/layer/trait.Layer.html
//! [`tracing`]: https://docs.rs/tracing/latest/tracing/index.html
//! [`Event`]: https://docs.rs/tracing/0.1.35/tracing/struct.Event.html
//!
//! Each [`Event`] becomes one record: its fields (including "message"), plus "level", "target"
//! and, where known, "module", "file" & "line". The record is stamped & sent by an
//! [`Emitter`], so it lands wherever [`Emitter::log`] would put it.
//!
//! Events raised by this crate itself (e.g. the debug trace of every datagram sent) are
//! never forwarded.
//!
//! ```rust
//! use es_bulk_udp::{emit::Emitter, layer::Layer};
//! use tracing_subscriber::registry::Registry;
//! use tracing_subscriber::layer::SubscriberExt; // Needed to get `with()`
//!
//! let subscriber = Registry::default().with(
//!     Layer::new(Emitter::builder().doc_type("tracing").build()).with_hostname(true));
//! ```

use crate::{bulk::Record, emit::Emitter};

use serde_json::Value;
use tracing::Event;
use tracing_subscriber::layer::Context;

// When the tracing-log feature is enabled, use NormalizeEvent to extract target/file/line
// metadata from events that originated from the `log` crate. This follows the same pattern used
// by tracing-subscriber's fmt layer.
#[cfg(feature = "tracing-log")]
use tracing_log::NormalizeEvent;

/// Target prefix of every event this crate raises.
const OWN_TARGET: &str = "es_bulk_udp";

/// Collects an [`Event`]'s fields into a [`Record`].
#[derive(Default)]
struct RecordVisitor {
    record: Record,
}

impl RecordVisitor {
    fn put<V: Into<Value>>(&mut self, field: &tracing::field::Field, value: V) {
        self.record.insert(field.name().to_string(), value.into());
    }
}

impl tracing::field::Visit for RecordVisitor {
    fn record_f64(&mut self, field: &tracing::field::Field, value: f64) {
        // Non-finite values have no JSON representation; `Value::from` maps them to null.
        self.put(field, value)
    }
    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.put(field, value)
    }
    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.put(field, value)
    }
    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.put(field, value)
    }
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.put(field, value)
    }
    fn record_error(
        &mut self,
        field: &tracing::field::Field,
        value: &(dyn std::error::Error + 'static),
    ) {
        self.put(field, value.to_string())
    }
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        // The tracing macros "pre-format" the `message` field so that `value` refers to a
        // `std::fmt::Arguments` instance, which prints without enclosing double-quotes.
        self.put(field, format!("{:?}", value))
    }
}

/// A [`tracing-subscriber`]-compliant [`Layer`] implementation that will send [`Event`]s to a
/// bulk collector.
///
/// [`tracing-subscriber`]: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/index.html
/// [`Layer`]: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/layer/trait.Layer.html
/// [`Event`]: https://docs.rs/tracing/0.1.35/tracing/struct.Event.html
pub struct Layer {
    emitter: Emitter,
    hostname: Option<String>,
}

impl std::default::Default for Layer {
    /// Send to the process-wide defaults.
    fn default() -> Self {
        Layer::new(Emitter::default())
    }
}

impl Layer {
    pub fn new(emitter: Emitter) -> Self {
        Layer {
            emitter,
            hostname: None,
        }
    }

    /// Add a "host" field naming this machine to every record. If the hostname can't be
    /// determined (or isn't valid UTF-8) the field is simply omitted.
    pub fn with_hostname(mut self, with_hostname: bool) -> Self {
        self.hostname = if with_hostname {
            hostname::get().ok().and_then(|hn| hn.into_string().ok())
        } else {
            None
        };
        self
    }

    fn to_record(&self, event: &Event<'_>, meta: &tracing::Metadata<'_>) -> Record {
        let mut visitor = RecordVisitor::default();
        event.record(&mut visitor);
        let mut record = visitor.record;
        record.insert("level".to_string(), Value::from(meta.level().to_string()));
        record.insert("target".to_string(), Value::from(meta.target()));
        if let Some(module) = meta.module_path() {
            record.insert("module".to_string(), Value::from(module));
        }
        if let Some(file) = meta.file() {
            record.insert("file".to_string(), Value::from(file));
        }
        if let Some(line) = meta.line() {
            record.insert("line".to_string(), Value::from(line));
        }
        if let Some(host) = &self.hostname {
            record.insert("host".to_string(), Value::from(host.as_str()));
        }
        record
    }
}

impl<S> tracing_subscriber::layer::Layer<S> for Layer
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        #[cfg(feature = "tracing-log")]
        let normalized_meta = event.normalized_metadata();
        #[cfg(feature = "tracing-log")]
        let meta = normalized_meta.as_ref().unwrap_or_else(|| event.metadata());
        #[cfg(not(feature = "tracing-log"))]
        let meta = event.metadata();

        if meta.target().starts_with(OWN_TARGET) {
            return;
        }

        self.emitter
            .log(self.to_record(event, meta))
            .map(|_| ())
            .unwrap_or_else(|err| {
                ::tracing::error!("failed to forward a tracing event: {}", err);
            })
    }
}
