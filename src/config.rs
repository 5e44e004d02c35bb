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

//! Process-wide default configuration.
//!
//! Every setting an [`Emitter`] needs can be given at the call site; anything left unset is
//! resolved against a [`Config`]. The precedence, from highest to lowest, is:
//!
//! 1. a value set on the [`Emitter`] itself
//! 2. the process-wide defaults, if some were [install]ed at startup
//! 3. the built-in defaults ([`Config::default`])
//!
//! Process-wide defaults are read-only once installed. To pick them up from a settings
//! provider (the environment, say), build a [`Config`] with [`Config::from_lookup`] or
//! [`Config::from_env`] & install that:
//!
//! ```rust
//! use es_bulk_udp::config::Config;
//! let cfg = Config::from_lookup(|key| match key {
//!     "BULK_ELASTIC_SEARCH_LOGGING_PORT" => Some("9999".to_string()),
//!     _ => None,
//! })
//! .unwrap();
//! assert_eq!(cfg.port, 9999);
//! assert_eq!(cfg.host, "localhost");
//! ```
//!
//! [`Emitter`]: crate::emit::Emitter
//! [install]: install

use crate::error::{Error, Result};

use backtrace::Backtrace;

use std::sync::OnceLock;

/// Prefix applied to each setting name when consulting a settings provider.
pub const SETTINGS_PREFIX: &str = "BULK_ELASTIC_SEARCH_LOGGING_";

/// Default settings for emitting records.
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// Collector host name or address
    pub host: String,
    /// Collector UDP port
    pub port: u16,
    /// Transport name; only "UDP" is supported
    pub protocol: String,
    /// Logical index name
    pub index: String,
    /// Document type name
    pub doc_type: String,
    /// Whether to suffix the index with the current UTC date
    pub datestamp_index: bool,
}

impl std::default::Default for Config {
    fn default() -> Self {
        Config {
            host: String::from("localhost"),
            port: 9700,
            protocol: String::from("UDP"),
            index: String::from("log"),
            doc_type: String::from("record"),
            datestamp_index: false,
        }
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::BadConfig {
            key: key.to_string(),
            value: value.to_string(),
            back: Backtrace::new(),
        }),
    }
}

impl Config {
    /// Overlay the built-in defaults with whatever `lookup` supplies.
    ///
    /// `lookup` is handed names of the form `BULK_ELASTIC_SEARCH_LOGGING_<SETTING>` where
    /// `<SETTING>` is one of `HOST`, `PORT`, `PROTOCOL`, `INDEX`, `DATESTAMP_INDEX` or `TYPE`.
    pub fn from_lookup<F>(lookup: F) -> Result<Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            let key = format!("{}{}", SETTINGS_PREFIX, name);
            lookup(&key).map(|value| (key, value))
        };

        let mut cfg = Config::default();
        if let Some((_, value)) = get("HOST") {
            cfg.host = value;
        }
        if let Some((key, value)) = get("PORT") {
            cfg.port = value.trim().parse::<u16>().map_err(|_| Error::BadConfig {
                key,
                value: value.clone(),
                back: Backtrace::new(),
            })?;
        }
        if let Some((_, value)) = get("PROTOCOL") {
            cfg.protocol = value;
        }
        if let Some((_, value)) = get("INDEX") {
            cfg.index = value;
        }
        if let Some((_, value)) = get("TYPE") {
            cfg.doc_type = value;
        }
        if let Some((key, value)) = get("DATESTAMP_INDEX") {
            cfg.datestamp_index = parse_bool(&key, &value)?;
        }
        Ok(cfg)
    }

    /// [`Config::from_lookup`] over the process environment.
    pub fn from_env() -> Result<Config> {
        Config::from_lookup(|key| std::env::var(key).ok())
    }
}

static PROCESS_DEFAULTS: OnceLock<Config> = OnceLock::new();

/// Install process-wide defaults; may be called at most once, typically at startup.
pub fn install(cfg: Config) -> Result<()> {
    PROCESS_DEFAULTS
        .set(cfg)
        .map_err(|_| Error::DefaultsAlreadyInstalled {
            back: Backtrace::new(),
        })
}

/// The defaults in effect for this process: the installed ones, else the built-ins.
pub fn defaults() -> Config {
    PROCESS_DEFAULTS.get().cloned().unwrap_or_default()
}
