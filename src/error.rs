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
//! [es-bulk-udp](crate) errors

use backtrace::Backtrace;

/// [es-bulk-udp](crate) error type
///
/// [es-bulk-udp](crate) eschews libraries like [thiserror], [anyhow] & [Snafu] in favor of a
/// straightforward enumeration with a few match arms chosen on the basis what the caller will
/// need to repond.
///
/// [thiserror]: https://docs.rs/thiserror
/// [anyhow]: https://docs.rs/anyhow
/// [Snafu]: https://docs.rs/snafu/latest/snafu
#[non_exhaustive]
pub enum Error {
    /// A setting supplied by a settings provider couldn't be parsed
    BadConfig {
        key: String,
        value: String,
        back: Backtrace,
    },
    /// Process-wide defaults may only be installed once
    DefaultsAlreadyInstalled { back: Backtrace },
    /// Failed to serialize a record to JSON
    Encoding {
        source: serde_json::Error,
        back: Backtrace,
    },
    /// Attempted to send on a [`Connection`] that has already been released
    ///
    /// [`Connection`]: crate::transport::Connection
    Closed { back: Backtrace },
    /// Attempted to send on a [`Connection`] that was never opened
    ///
    /// [`Connection`]: crate::transport::Connection
    NotOpen { back: Backtrace },
    /// General transport layer error (name resolution, socket creation, `sendto`)
    Transport {
        source: std::io::Error,
        back: Backtrace,
    },
    /// Only connectionless datagrams over IP are supported
    UnsupportedTransport { name: String, back: Backtrace },
}

impl Error {
    pub(crate) fn transport(source: std::io::Error) -> Error {
        Error::Transport {
            source,
            back: Backtrace::new(),
        }
    }
}

impl std::fmt::Display for Error {
    // `Error` is non-exhaustive so that adding variants won't be a breaking change to our
    // callers. That means the compiler won't catch us if we miss a variant here, so we
    // always include a `_` arm.
    #[allow(unreachable_patterns)]
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::BadConfig { key, value, .. } => {
                write!(f, "Setting {} has an unusable value '{}'", key, value)
            }
            Error::DefaultsAlreadyInstalled { .. } => {
                write!(f, "Process-wide defaults have already been installed")
            }
            Error::Encoding { source, .. } => write!(f, "While encoding a record, got {}", source),
            Error::Closed { .. } => write!(f, "The connection has already been closed"),
            Error::NotOpen { .. } => write!(f, "The connection was never opened"),
            Error::Transport { source, .. } => write!(f, "Transport error: {}", source),
            Error::UnsupportedTransport { name, .. } => {
                write!(f, "Transport '{}' is not supported; only UDP is", name)
            }
            _ => write!(f, "Other es-bulk-udp error"),
        }
    }
}

impl std::fmt::Debug for Error {
    #[allow(unreachable_patterns)]
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::BadConfig { back, .. } => write!(f, "{}\n{:?}", self, back),
            Error::DefaultsAlreadyInstalled { back } => write!(f, "{}\n{:?}", self, back),
            Error::Encoding { back, .. } => write!(f, "{}\n{:?}", self, back),
            Error::Closed { back } => write!(f, "{}\n{:?}", self, back),
            Error::NotOpen { back } => write!(f, "{}\n{:?}", self, back),
            Error::Transport { back, .. } => write!(f, "{}\n{:?}", self, back),
            Error::UnsupportedTransport { back, .. } => write!(f, "{}\n{:?}", self, back),
            err => write!(f, "es-bulk-udp error: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Encoding { source, .. } => Some(source),
            Error::Transport { source, .. } => Some(source),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
