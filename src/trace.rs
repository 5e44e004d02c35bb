// Copyright (C) 2022 Michael Herstine <sp1ff@pobox.com>
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

//! Logging the start, completion & failure of a unit of work.
//!
//! ```no_run
//! use es_bulk_udp::{emit::Emitter, trace::Trace};
//!
//! let emitter = Emitter::default();
//! let sum: Result<u32, std::num::ParseIntError> = Trace::new(&emitter)
//!     .field("batch", 7)
//!     .run("nightly-import", || Ok("12".parse::<u32>()? + 30));
//! ```
//!
//! logs `{"action": "start", "batch": 7, ...}` & then `{"action": "complete", "batch": 7, ...}`
//! with document type "nightly-import".

use crate::{bulk::Record, emit::Emitter, error::Result};

use serde_json::Value;

/// Anything that can file a record under a document type.
pub trait EventLogger {
    fn log_event(&self, doc_type: &str, payload: Record) -> Result<()>;
}

impl EventLogger for Emitter {
    fn log_event(&self, doc_type: &str, payload: Record) -> Result<()> {
        self.log_as(doc_type, payload).map(|_| ())
    }
}

/// Wraps a unit of work with "start", "complete" & "error" records.
///
/// Failures to log are reported through [`tracing`] and otherwise ignored; they never change
/// the outcome of the work.
pub struct Trace<'a, L: EventLogger + ?Sized> {
    logger: &'a L,
    doc_type: Option<String>,
    fields: Record,
    on_start: bool,
    on_complete: bool,
    on_error: bool,
}

impl<'a, L: EventLogger + ?Sized> Trace<'a, L> {
    /// Log all three events through `logger`, under a document type named after the work.
    pub fn new(logger: &'a L) -> Self {
        Trace {
            logger,
            doc_type: None,
            fields: Record::new(),
            on_start: true,
            on_complete: true,
            on_error: true,
        }
    }
    /// File records under `doc_type` rather than the name passed to [`Trace::run`].
    pub fn doc_type(mut self, doc_type: &str) -> Self {
        self.doc_type = Some(doc_type.to_string());
        self
    }
    /// Add `name`: `value` to every record.
    pub fn field<V: Into<Value>>(mut self, name: &str, value: V) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }
    pub fn start(mut self, on: bool) -> Self {
        self.on_start = on;
        self
    }
    pub fn complete(mut self, on: bool) -> Self {
        self.on_complete = on;
        self
    }
    pub fn error(mut self, on: bool) -> Self {
        self.on_error = on;
        self
    }

    fn record(&self, doc_type: &str, action: &str, error: Option<String>) {
        let mut payload = Record::new();
        payload.insert("action".to_string(), Value::from(action));
        if let Some(error) = error {
            payload.insert("error".to_string(), Value::from(error));
        }
        for (name, value) in &self.fields {
            payload
                .entry(name.as_str())
                .or_insert_with(|| value.clone());
        }
        if let Err(err) = self.logger.log_event(doc_type, payload) {
            ::tracing::error!("failed to log '{}' for {}: {}", action, doc_type, err);
        }
    }

    /// Run `work`, logging around it, & return its result untouched.
    pub fn run<T, E, F>(&self, name: &str, work: F) -> std::result::Result<T, E>
    where
        E: std::fmt::Display,
        F: FnOnce() -> std::result::Result<T, E>,
    {
        let doc_type = self.doc_type.as_deref().unwrap_or(name);
        if self.on_start {
            self.record(doc_type, "start", None);
        }
        let result = work();
        match &result {
            Ok(_) if self.on_complete => self.record(doc_type, "complete", None),
            Err(err) if self.on_error => self.record(doc_type, "error", Some(err.to_string())),
            _ => (),
        }
        result
    }
}
