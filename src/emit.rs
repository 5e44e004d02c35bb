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

//! Building & sending bulk messages.
//!
//! An [`Emitter`] carries whatever call-site settings the caller chose to give it; everything
//! else is resolved against the process-wide [defaults] each time a record is sent. Emitting a
//! record opens a fresh [`Connection`], sends exactly one datagram & closes the connection
//! again. The bytes sent are handed back to the caller.
//!
//! [defaults]: crate::config::defaults
//!
//! ```no_run
//! use es_bulk_udp::emit::Emitter;
//! use serde_json::json;
//!
//! let emitter = Emitter::builder()
//!     .index("web")
//!     .datestamp_index(true)
//!     .build();
//! let payload = es_bulk_udp::bulk::to_record(&json!({"who": "somebody", "what": "clicked"})).unwrap();
//! emitter.log(payload).unwrap();
//! ```

use crate::{
    bulk::{format_message, IndexTarget, Record},
    config::{self, Config},
    error::Result,
    transport::{Connection, Destination, Transport},
};

use chrono::prelude::*;
use serde_json::Value;
use tracing::{debug, trace};

/// Field name under which [`Emitter::log`] records the time of the event.
pub const TIMESTAMP_FIELD: &str = "@timestamp";
/// Field name under which [`Emitter::log`] records the document schema version.
pub const VERSION_FIELD: &str = "@version";
/// The document schema version written by [`Emitter::log`].
pub const SCHEMA_VERSION: u64 = 1;

/// All settings for one emission, after resolution against the defaults.
#[derive(Clone, Debug, PartialEq)]
pub struct Resolved {
    pub target: IndexTarget,
    pub destination: Destination,
    pub sort_keys: bool,
}

/// Formats records as bulk messages & sends them to a collector.
///
/// Unset fields fall back to the [`Config`] given to [`EmitterBuilder::defaults`], or to the
/// process-wide defaults if none was.
#[derive(Clone, Debug, Default)]
pub struct Emitter {
    index: Option<String>,
    doc_type: Option<String>,
    datestamp_index: Option<bool>,
    host: Option<String>,
    port: Option<u16>,
    protocol: Option<String>,
    sort_keys: bool,
    defaults: Option<Config>,
}

pub struct EmitterBuilder {
    imp: Emitter,
}

impl EmitterBuilder {
    pub fn index(mut self, index: &str) -> Self {
        self.imp.index = Some(index.to_string());
        self
    }
    pub fn doc_type(mut self, doc_type: &str) -> Self {
        self.imp.doc_type = Some(doc_type.to_string());
        self
    }
    pub fn datestamp_index(mut self, datestamp_index: bool) -> Self {
        self.imp.datestamp_index = Some(datestamp_index);
        self
    }
    pub fn host(mut self, host: &str) -> Self {
        self.imp.host = Some(host.to_string());
        self
    }
    pub fn port(mut self, port: u16) -> Self {
        self.imp.port = Some(port);
        self
    }
    pub fn protocol(mut self, protocol: &str) -> Self {
        self.imp.protocol = Some(protocol.to_string());
        self
    }
    /// Serialize object keys in sorted order, for reproducible output.
    pub fn sort_keys(mut self, sort_keys: bool) -> Self {
        self.imp.sort_keys = sort_keys;
        self
    }
    /// Resolve against `defaults` in place of the process-wide defaults.
    pub fn defaults(mut self, defaults: Config) -> Self {
        self.imp.defaults = Some(defaults);
        self
    }
    pub fn build(self) -> Emitter {
        self.imp
    }
}

impl Emitter {
    pub fn builder() -> EmitterBuilder {
        EmitterBuilder {
            imp: Emitter::default(),
        }
    }

    /// Resolve this emitter's settings, as of `today` (UTC).
    ///
    /// `doc_type` takes precedence over the emitter's own document type, if given.
    pub fn resolve_on(&self, doc_type: Option<&str>, today: NaiveDate) -> Resolved {
        let cfg = match &self.defaults {
            Some(cfg) => cfg.clone(),
            None => config::defaults(),
        };
        let target = IndexTarget::with_datestamp(
            self.index.as_deref().unwrap_or(&cfg.index),
            doc_type
                .or(self.doc_type.as_deref())
                .unwrap_or(&cfg.doc_type),
            self.datestamp_index.unwrap_or(cfg.datestamp_index),
            today,
        );
        let destination = Destination {
            host: self.host.clone().unwrap_or(cfg.host),
            port: self.port.unwrap_or(cfg.port),
            protocol: self.protocol.clone().unwrap_or(cfg.protocol),
        };
        trace!("resolved {:?} & {:?}", target, destination);
        Resolved {
            target,
            destination,
            sort_keys: self.sort_keys,
        }
    }

    /// Resolve this emitter's settings as of now.
    pub fn resolve(&self, doc_type: Option<&str>) -> Resolved {
        self.resolve_on(doc_type, Utc::now().date_naive())
    }

    /// Produce the bulk message for `payload` without sending it.
    pub fn format(&self, payload: &Record) -> Result<Vec<u8>> {
        let resolved = self.resolve(None);
        format_message(&resolved.target, payload, resolved.sort_keys)
    }

    fn emit_as(&self, doc_type: Option<&str>, payload: &Record) -> Result<Vec<u8>> {
        let resolved = self.resolve(doc_type);
        let message = format_message(&resolved.target, payload, resolved.sort_keys)?;
        let mut connection = Connection::from_destination(&resolved.destination)?;
        connection.scoped(|conn| conn.send(&message))?;
        Ok(message)
    }

    /// Send `payload` as-is in a single datagram over a fresh [`Connection`]; return the
    /// bytes sent.
    pub fn emit(&self, payload: &Record) -> Result<Vec<u8>> {
        self.emit_as(None, payload)
    }

    /// Like [`Emitter::emit`], but send over `transport` instead of a fresh [`Connection`].
    ///
    /// The emitter's host, port & protocol are not consulted.
    pub fn emit_via<T: Transport + ?Sized>(
        &self,
        payload: &Record,
        transport: &T,
    ) -> Result<Vec<u8>> {
        let message = self.format(payload)?;
        transport.send(&message)?;
        Ok(message)
    }

    /// Stamp `payload` with the current time & schema version, then [emit](Emitter::emit) it.
    pub fn log(&self, payload: Record) -> Result<Vec<u8>> {
        self.emit(&stamp(payload, Utc::now()))
    }

    /// Like [`Emitter::log`], filing the record under document type `doc_type`.
    pub fn log_as(&self, doc_type: &str, payload: Record) -> Result<Vec<u8>> {
        self.emit_as(Some(doc_type), &stamp(payload, Utc::now()))
    }
}

/// Add the timestamp & version fields to `payload`.
///
/// The injected values win: a caller-supplied `@timestamp` or `@version` is overwritten (in
/// place, so key order is unchanged).
pub fn stamp(mut payload: Record, now: DateTime<Utc>) -> Record {
    let timestamp = now.format("%Y-%m-%dT%H:%M:%S%.6f").to_string();
    if let Some(old) = payload.insert(TIMESTAMP_FIELD.to_string(), Value::from(timestamp)) {
        debug!("overwrote caller-supplied {}: {}", TIMESTAMP_FIELD, old);
    }
    if let Some(old) = payload.insert(VERSION_FIELD.to_string(), Value::from(SCHEMA_VERSION)) {
        debug!("overwrote caller-supplied {}: {}", VERSION_FIELD, old);
    }
    payload
}

/// [`Emitter::emit`] with every setting left at its default, save `sort_keys`.
pub fn emit(payload: &Record, sort_keys: bool) -> Result<Vec<u8>> {
    Emitter::builder().sort_keys(sort_keys).build().emit(payload)
}

/// [`Emitter::log`] with the given index & document type overrides; every other setting is
/// left at its default.
pub fn log(
    payload: Record,
    index: Option<&str>,
    doc_type: Option<&str>,
    sort_keys: bool,
) -> Result<Vec<u8>> {
    let mut builder = Emitter::builder().sort_keys(sort_keys);
    if let Some(index) = index {
        builder = builder.index(index);
    }
    if let Some(doc_type) = doc_type {
        builder = builder.doc_type(doc_type);
    }
    builder.build().log(payload)
}

#[cfg(test)]
mod test {

    use super::*;

    use crate::error::Error;

    use std::cell::RefCell;

    struct Recorder {
        sent: RefCell<Vec<Vec<u8>>>,
    }

    impl Transport for Recorder {
        fn send(&self, buf: &[u8]) -> Result<usize> {
            self.sent.borrow_mut().push(buf.to_vec());
            Ok(buf.len())
        }
    }

    fn builtins() -> EmitterBuilder {
        Emitter::builder().defaults(Config::default())
    }

    #[test]
    fn default_resolution() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        let resolved = builtins().build().resolve_on(None, today);
        assert_eq!(resolved.target, IndexTarget::new("log", "record"));
        assert_eq!(
            resolved.destination,
            Destination {
                host: "localhost".to_string(),
                port: 9700,
                protocol: "UDP".to_string(),
            }
        );
        assert!(!resolved.sort_keys);
    }

    #[test]
    fn precedence() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        let cfg = Config {
            host: "collector".to_string(),
            port: 9999,
            index: "app".to_string(),
            datestamp_index: true,
            ..Config::default()
        };

        // Emitter unset: the supplied defaults apply.
        let resolved = Emitter::builder()
            .defaults(cfg.clone())
            .build()
            .resolve_on(None, today);
        assert_eq!(resolved.target.index, "app-2024.03.05");
        assert_eq!(resolved.target.doc_type, "record");
        assert_eq!(resolved.destination.host, "collector");
        assert_eq!(resolved.destination.port, 9999);

        // Call-site values beat the defaults...
        let emitter = Emitter::builder()
            .defaults(cfg)
            .index("web")
            .doc_type("click")
            .datestamp_index(false)
            .port(1234)
            .build();
        let resolved = emitter.resolve_on(None, today);
        assert_eq!(resolved.target, IndexTarget::new("web", "click"));
        assert_eq!(resolved.destination.port, 1234);
        // & a per-record type beats them all.
        assert_eq!(
            emitter.resolve_on(Some("login"), today).target.doc_type,
            "login"
        );
    }

    #[test]
    fn emit_via_transport() {
        let recorder = Recorder {
            sent: RefCell::new(Vec::new()),
        };
        let payload = crate::bulk::to_record(&serde_json::json!({
            "hello": "world", "goodbye": "everybody"
        }))
        .unwrap();
        let msg = builtins()
            .sort_keys(true)
            .build()
            .emit_via(&payload, &recorder)
            .unwrap();
        assert_eq!(
            msg,
            b"{\"index\": {\"_index\": \"log\", \"_type\": \"record\"}}\n{\"goodbye\": \"everybody\", \"hello\": \"world\"}\n".to_vec()
        );
        assert_eq!(*recorder.sent.borrow(), vec![msg]);
    }

    #[test]
    fn stamping() {
        let now = Utc.with_ymd_and_hms(2024, 3, 5, 12, 34, 56).unwrap();
        let mut payload = Record::new();
        payload.insert("who".to_string(), Value::from("somebody"));
        payload.insert(VERSION_FIELD.to_string(), Value::from("mine"));
        let stamped = stamp(payload, now);

        assert_eq!(
            stamped[TIMESTAMP_FIELD],
            Value::from("2024-03-05T12:34:56.000000")
        );
        // Injected fields win, but the caller's key keeps its place.
        assert_eq!(stamped[VERSION_FIELD], Value::from(1));
        let keys: Vec<&str> = stamped.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["who", "@version", "@timestamp"]);
    }

    #[test]
    fn unsupported_transport() {
        let err = builtins()
            .protocol("TCP")
            .build()
            .emit(&Record::new())
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedTransport { .. }));
    }
}
