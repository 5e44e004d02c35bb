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

//! Elasticsearch [bulk] message framing.
//!
//! [bulk]: https://www.elastic.co/guide/en/elasticsearch/reference/current/docs-bulk.html
//!
//! A bulk message for a single document is two lines of JSON followed by an empty line:
//!
//! ```text
//! {"index": {"_index": "log", "_type": "record"}}
//! {"goodbye": "everybody", "hello": "world"}
//!
//! ```
//!
//! The first line is the "action" naming the index & document type, the second the document
//! itself. JSON is written with a space after each `,` and `:` so that the bytes on the wire
//! match what existing bulk UDP collectors expect, byte for byte.

use crate::error::{Error, Result};

use backtrace::Backtrace;
use bytes::BufMut;
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::{Map, Value};

use std::io;

/// A single document: field names mapped to arbitrary JSON values, in insertion order.
pub type Record = Map<String, Value>;

/// Build a [`Record`] from anything that serializes to a JSON object.
pub fn to_record<T: Serialize>(value: &T) -> Result<Record> {
    match serde_json::to_value(value).map_err(|err| Error::Encoding {
        source: err,
        back: Backtrace::new(),
    })? {
        Value::Object(map) => Ok(map),
        other => Err(Error::Encoding {
            source: <serde_json::Error as serde::ser::Error>::custom(format!(
                "expected a JSON object, got {}",
                other
            )),
            back: Backtrace::new(),
        }),
    }
}

/// The logical collection a document is filed under.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexTarget {
    pub index: String,
    pub doc_type: String,
}

impl IndexTarget {
    pub fn new(index: &str, doc_type: &str) -> IndexTarget {
        IndexTarget {
            index: index.to_string(),
            doc_type: doc_type.to_string(),
        }
    }

    /// Like [`IndexTarget::new`], but when `datestamp` is set the index name is suffixed with
    /// `today` as `-YYYY.MM.DD`, for day-partitioned indices.
    pub fn with_datestamp(
        index: &str,
        doc_type: &str,
        datestamp: bool,
        today: NaiveDate,
    ) -> IndexTarget {
        if datestamp {
            IndexTarget {
                index: format!("{}-{}", index, today.format("%Y.%m.%d")),
                doc_type: doc_type.to_string(),
            }
        } else {
            IndexTarget::new(index, doc_type)
        }
    }

    /// The bulk "index" action for this target.
    pub fn action(&self) -> Value {
        let mut inner = Map::new();
        inner.insert("_index".to_string(), Value::from(self.index.as_str()));
        inner.insert("_type".to_string(), Value::from(self.doc_type.as_str()));
        let mut outer = Map::new();
        outer.insert("index".to_string(), Value::Object(inner));
        Value::Object(outer)
    }
}

/// [`serde_json`] [`Formatter`](serde_json::ser::Formatter) that separates items with `", "`
/// and keys from values with `": "`, & keeps the output pure ASCII by escaping everything
/// outside it as `\uXXXX` (UTF-16 surrogate pairs beyond the Basic Multilingual Plane).
struct SpacedFormatter;

impl serde_json::ser::Formatter for SpacedFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        let mut start = 0;
        for (i, c) in fragment.char_indices() {
            if c.is_ascii() {
                continue;
            }
            writer.write_all(fragment[start..i].as_bytes())?;
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units) {
                write!(writer, "\\u{:04x}", unit)?;
            }
            start = i + c.len_utf8();
        }
        writer.write_all(fragment[start..].as_bytes())
    }
}

/// Return a copy of `value` with every object's keys in sorted order.
fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(sorted_map(map)),
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}

fn sorted_map(map: &Map<String, Value>) -> Map<String, Value> {
    let mut entries: Vec<(&String, &Value)> = map.iter().collect();
    entries.sort_by(|lhs, rhs| lhs.0.cmp(rhs.0));
    entries
        .into_iter()
        .map(|(k, v)| (k.clone(), sorted(v)))
        .collect()
}

fn write_json<T: Serialize + ?Sized>(buf: &mut Vec<u8>, value: &T) -> Result<()> {
    let mut ser = serde_json::Serializer::with_formatter(buf, SpacedFormatter);
    value.serialize(&mut ser).map_err(|err| Error::Encoding {
        source: err,
        back: Backtrace::new(),
    })
}

/// Frame `payload` for `target` as a bulk message, UTF-8 encoded.
///
/// The result is the action line, a newline, the document line & a final newline. Setting
/// `sort_keys` makes the output reproducible regardless of the order in which `payload` was
/// assembled.
pub fn format_message(target: &IndexTarget, payload: &Record, sort_keys: bool) -> Result<Vec<u8>> {
    let mut buf: Vec<u8> = Vec::with_capacity(128);
    // The action's keys are already in sorted order.
    write_json(&mut buf, &target.action())?;
    buf.put_u8(b'\n');
    if sort_keys {
        write_json(&mut buf, &sorted_map(payload))?;
    } else {
        write_json(&mut buf, payload)?;
    }
    buf.put_u8(b'\n');
    Ok(buf)
}

#[cfg(test)]
mod test {

    use super::*;

    fn hello() -> Record {
        let mut payload = Record::new();
        payload.insert("hello".to_string(), Value::from("world"));
        payload.insert("goodbye".to_string(), Value::from("everybody"));
        payload
    }

    #[test]
    fn datestamp() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        assert_eq!(
            IndexTarget::with_datestamp("log", "record", true, today).index,
            "log-2024.03.05"
        );
        assert_eq!(
            IndexTarget::with_datestamp("log", "record", false, today).index,
            "log"
        );
    }

    #[test]
    fn sorted_framing() {
        let msg = format_message(&IndexTarget::new("log", "record"), &hello(), true).unwrap();
        assert_eq!(
            std::str::from_utf8(&msg).unwrap(),
            "{\"index\": {\"_index\": \"log\", \"_type\": \"record\"}}\n{\"goodbye\": \"everybody\", \"hello\": \"world\"}\n"
        );
        // Formatting is a pure function of its inputs.
        let again = format_message(&IndexTarget::new("log", "record"), &hello(), true).unwrap();
        assert_eq!(msg, again);
    }

    #[test]
    fn insertion_order_preserved() {
        let msg = format_message(&IndexTarget::new("log", "record"), &hello(), false).unwrap();
        assert_eq!(
            std::str::from_utf8(&msg).unwrap(),
            "{\"index\": {\"_index\": \"log\", \"_type\": \"record\"}}\n{\"hello\": \"world\", \"goodbye\": \"everybody\"}\n"
        );
    }

    #[test]
    fn nested_values() {
        let payload = to_record(&serde_json::json!({
            "z": [1, 2.5, null, true],
            "a": {"y": "é", "b": {}},
        }))
        .unwrap();
        let msg = format_message(&IndexTarget::new("app", "event"), &payload, true).unwrap();
        let text = std::str::from_utf8(&msg).unwrap();
        let lines: Vec<&str> = text.split('\n').collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[2], "");
        assert_eq!(
            lines[1],
            "{\"a\": {\"b\": {}, \"y\": \"\\u00e9\"}, \"z\": [1, 2.5, null, true]}"
        );

        // Both lines parse back to what went in.
        let action: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(action, IndexTarget::new("app", "event").action());
        let doc: Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(doc, Value::Object(payload));
    }

    #[test]
    fn non_ascii_is_escaped() {
        let payload = to_record(&serde_json::json!({
            "name": "é", "emoji": "😀", "mixed": "a→b\n"
        }))
        .unwrap();
        let msg = format_message(&IndexTarget::new("log", "record"), &payload, true).unwrap();
        assert!(msg.is_ascii());
        let text = std::str::from_utf8(&msg).unwrap();
        assert!(text.ends_with(
            "\n{\"emoji\": \"\\ud83d\\ude00\", \"mixed\": \"a\\u2192b\\n\", \"name\": \"\\u00e9\"}\n"
        ));
        let doc: Value = serde_json::from_str(text.split('\n').nth(1).unwrap()).unwrap();
        assert_eq!(doc, Value::Object(payload));
    }

    #[test]
    fn empty_payload() {
        let msg = format_message(&IndexTarget::new("log", "record"), &Record::new(), false).unwrap();
        assert!(msg.ends_with(b"}\n{}\n"));
    }

    #[test]
    fn non_objects_are_not_records() {
        assert!(to_record(&vec![1, 2, 3]).is_err());
        assert_eq!(to_record(&serde_json::json!({"a": 1})).unwrap().len(), 1);
    }
}
