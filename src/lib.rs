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
//! Fire-and-forget event logging to an [Elasticsearch]-style [bulk] UDP endpoint
//!
//! [Elasticsearch]: https://www.elastic.co/elasticsearch
//! [bulk]: https://www.elastic.co/guide/en/elasticsearch/reference/current/docs-bulk.html
//!
//! # Introduction
//!
//! Some collectors accept documents in the bulk-indexing format over UDP: one datagram per
//! document, each an "action" line naming the index & document type followed by the document
//! itself. Sending is strictly one-way. There's no response to wait for, which makes it a handy
//! way for application code (web request handlers, say) to record user actions, request traces
//! or timings without blocking on anything.
//!
//! The flip side is that nothing is guaranteed: no retries, no batching, no acknowledgement.
//! Each call either hands exactly one datagram to the OS or returns an [`Error`].
//!
//! [`Error`]: crate::error::Error
//!
//! # Usage
//!
//! [`es-bulk-udp`](crate) comes with sane defaults: send to port 9700 on localhost, filing
//! documents under index "log" & type "record":
//!
//! ```no_run
//! use es_bulk_udp::{bulk::to_record, emit::log};
//! use serde_json::json;
//!
//! let payload = to_record(&json!({"who": "somebody", "what": "did something"})).unwrap();
//! // Adds "@timestamp" & "@version" fields, then sends:
//! //
//! // {"index": {"_index": "log", "_type": "record"}}
//! // {"who": "somebody", "what": "did something", "@timestamp": "...", "@version": 1}
//! log(payload, None, None, false).unwrap();
//! ```
//!
//! Any setting can be overridden on an [`Emitter`], or process-wide at startup through
//! [`config::install`]:
//!
//! [`Emitter`]: crate::emit::Emitter
//!
//! ```no_run
//! use es_bulk_udp::{config::{self, Config}, emit::Emitter};
//!
//! config::install(Config::from_env().unwrap()).unwrap();
//! let emitter = Emitter::builder()
//!     .host("collector.local")
//!     .index("web")
//!     .datestamp_index(true) // i.e. "web-2024.03.05"
//!     .sort_keys(true)
//!     .build();
//! emitter.log(serde_json::Map::new()).unwrap();
//! ```
//!
//! Beyond that, [`trace`] logs the start & outcome of a unit of work, [`request`] has helpers
//! for logging on behalf of web requests, and [`layer`] provides a [`tracing-subscriber`]
//! [`Layer`] that forwards [`tracing`] events.
//!
//! [`tracing-subscriber`]: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/index.html
//! [`Layer`]: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/layer/trait.Layer.html
//! [`tracing`]: https://docs.rs/tracing/latest/tracing/index.html

pub mod bulk;
pub mod config;
pub mod emit;
pub mod error;
pub mod layer;
pub mod request;
pub mod trace;
pub mod transport;
