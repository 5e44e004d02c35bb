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

//! Logging on behalf of web requests.
//!
//! These helpers know nothing of any particular web framework: pull the user & request details
//! out of whatever request type you have, and hand them in as plain values.

use crate::{bulk::Record, emit::Emitter, error::Result};

use serde_json::Value;

/// Default document type for [`log_user`].
pub const USER_ACTION_TYPE: &str = "user-action";
/// Default document type for [`log_request_path`] & [`log_request_body`].
pub const REQUEST_TYPE: &str = "request";

/// The authenticated (or anonymous) user behind a request.
#[derive(Clone, Debug, PartialEq)]
pub struct User<'a> {
    /// `None` for anonymous users
    pub id: Option<i64>,
    /// Empty for anonymous users
    pub username: &'a str,
}

impl User<'static> {
    pub fn anonymous() -> Self {
        User {
            id: None,
            username: "",
        }
    }
}

fn prepend(fields: Vec<(&str, Value)>, extra: Record) -> Record {
    let mut payload = Record::new();
    for (name, value) in fields {
        payload.insert(name.to_string(), value);
    }
    // Caller-supplied fields can't clobber the request fields.
    for (name, value) in extra {
        payload.entry(name).or_insert(value);
    }
    payload
}

fn user_fields(user: &User<'_>) -> Vec<(&'static str, Value)> {
    vec![
        ("user_id", user.id.map(Value::from).unwrap_or(Value::Null)),
        ("username", Value::from(user.username)),
    ]
}

/// Log an action taken by `user`, filed under `doc_type` (default "user-action").
pub fn log_user(
    emitter: &Emitter,
    doc_type: Option<&str>,
    user: &User<'_>,
    extra: Record,
) -> Result<Vec<u8>> {
    emitter.log_as(
        doc_type.unwrap_or(USER_ACTION_TYPE),
        prepend(user_fields(user), extra),
    )
}

/// Like [`log_user`], but also records the full request path (including any query string);
/// the default document type is "request".
pub fn log_request_path(
    emitter: &Emitter,
    doc_type: Option<&str>,
    user: &User<'_>,
    path: &str,
    extra: Record,
) -> Result<Vec<u8>> {
    let mut fields = user_fields(user);
    fields.push(("request_path", Value::from(path)));
    emitter.log_as(doc_type.unwrap_or(REQUEST_TYPE), prepend(fields, extra))
}

/// Like [`log_request_path`], but also records the request body.
pub fn log_request_body(
    emitter: &Emitter,
    doc_type: Option<&str>,
    user: &User<'_>,
    path: &str,
    body: &str,
    extra: Record,
) -> Result<Vec<u8>> {
    let mut fields = user_fields(user);
    fields.push(("request_path", Value::from(path)));
    fields.push(("request_body", Value::from(body)));
    emitter.log_as(doc_type.unwrap_or(REQUEST_TYPE), prepend(fields, extra))
}
