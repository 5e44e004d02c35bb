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

//! The collector transport layer.
//!
//! This module defines the [`Transport`] trait that all implementations must support, as well
//! as [`Connection`], the UDP implementation used by [`Emitter`].
//!
//! [`Emitter`]: crate::emit::Emitter
//!
//! # Examples
//!
//! A [`Connection`] owns at most one socket at a time. [`Connection::scoped`] opens it, runs a
//! closure & closes it again no matter how the closure exits:
//!
//! ```no_run
//! use es_bulk_udp::transport::{Connection, Transport};
//! let mut conn = Connection::new("localhost", 9700, "UDP").unwrap();
//! conn.scoped(|c| {
//!     c.send(b"Hello!")?;
//!     c.send(b"Goodbye!")
//! })
//! .unwrap();
//! ```
//!
//! Asking for anything other than UDP fails before a socket is created:
//!
//! ```rust
//! use es_bulk_udp::transport::Connection;
//! assert!(Connection::new("localhost", 9700, "TCP").is_err());
//! ```

use crate::error::{Error, Result};

use backtrace::Backtrace;
use tracing::debug;

use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                      transport mechanisms                                      //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Operations all transport layers must support.
pub trait Transport {
    /// Send a slice of bytes on this transport mechanism as a single message.
    fn send(&self, buf: &[u8]) -> Result<usize>;
}

/// Supported transport kinds.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Protocol {
    /// connectionless datagrams over IP
    Udp,
}

impl std::str::FromStr for Protocol {
    type Err = Error;
    fn from_str(s: &str) -> Result<Protocol> {
        if s.eq_ignore_ascii_case("udp") {
            Ok(Protocol::Udp)
        } else {
            Err(Error::UnsupportedTransport {
                name: s.to_string(),
                back: Backtrace::new(),
            })
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Udp => write!(f, "UDP"),
        }
    }
}

/// Where to send: host, port & transport name.
#[derive(Clone, Debug, PartialEq)]
pub struct Destination {
    pub host: String,
    pub port: u16,
    pub protocol: String,
}

/// Choose the first IPv4 address, falling back to the first of any family; collectors
/// commonly listen on IPv4 only, and "localhost" often resolves to `::1` first.
fn pick_peer<I: Iterator<Item = SocketAddr>>(addrs: I) -> Option<SocketAddr> {
    let mut first = None;
    for addr in addrs {
        if addr.is_ipv4() {
            return Some(addr);
        }
        first.get_or_insert(addr);
    }
    first
}

enum State {
    Unopened,
    Open { socket: UdpSocket, peer: SocketAddr },
    Released,
}

/// Sending bulk messages via UDP datagrams.
///
/// The socket is not connected; each [`Transport::send`] is a `sendto` addressed to the
/// destination. A [`Connection`] starts out unopened; [`open`](Connection::open) acquires a
/// socket and [`close`](Connection::close) (or dropping the [`Connection`]) releases it.
/// Closing more than once, or closing a connection that was never opened, is a no-op.
pub struct Connection {
    host: String,
    port: u16,
    protocol: Protocol,
    state: State,
}

impl Connection {
    /// Describe a connection to `host`:`port` over `protocol`; no socket is created yet.
    pub fn new(host: &str, port: u16, protocol: &str) -> Result<Connection> {
        Ok(Connection {
            host: host.to_string(),
            port,
            protocol: protocol.parse()?,
            state: State::Unopened,
        })
    }

    pub fn from_destination(dest: &Destination) -> Result<Connection> {
        Connection::new(&dest.host, dest.port, &dest.protocol)
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, State::Open { .. })
    }

    /// Acquire a socket. Opening an open connection leaves it as-is; opening a released
    /// connection acquires a fresh socket.
    pub fn open(&mut self) -> Result<()> {
        if self.is_open() {
            return Ok(());
        }
        // Resolve first so we can bind a socket of the matching address family.
        let addrs = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(Error::transport)?;
        let peer = pick_peer(addrs).ok_or_else(|| {
            Error::transport(std::io::Error::new(
                std::io::ErrorKind::AddrNotAvailable,
                format!("{} did not resolve to any address", self.host),
            ))
        })?;
        let local = match peer {
            SocketAddr::V4(_) => "0.0.0.0:0",
            SocketAddr::V6(_) => "[::]:0",
        };
        let socket = UdpSocket::bind(local).map_err(Error::transport)?;
        self.state = State::Open { socket, peer };
        Ok(())
    }

    /// Release the socket, if any.
    pub fn close(&mut self) {
        if let State::Open { .. } = self.state {
            // Dropping the socket closes it.
            self.state = State::Released;
        }
    }

    /// Open this connection, hand it to `f`, then close it on every exit path (including an
    /// unwinding panic).
    pub fn scoped<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        self.open()?;
        let guard = CloseOnExit(self);
        f(&*guard.0)
    }
}

/// Closes the borrowed [`Connection`] when dropped.
struct CloseOnExit<'a>(&'a mut Connection);

impl Drop for CloseOnExit<'_> {
    fn drop(&mut self) {
        self.0.close();
    }
}

impl Transport for Connection {
    fn send(&self, buf: &[u8]) -> Result<usize> {
        match &self.state {
            State::Open { socket, peer } => {
                debug!(
                    "sending {} bytes to {}: {}",
                    buf.len(),
                    peer,
                    String::from_utf8_lossy(buf)
                );
                socket.send_to(buf, *peer).map_err(Error::transport)
            }
            State::Unopened => Err(Error::NotOpen {
                back: Backtrace::new(),
            }),
            State::Released => Err(Error::Closed {
                back: Backtrace::new(),
            }),
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod test {

    use super::*;

    #[test]
    fn protocol_names() {
        assert_eq!("UDP".parse::<Protocol>().unwrap(), Protocol::Udp);
        assert_eq!("udp".parse::<Protocol>().unwrap(), Protocol::Udp);
        assert!(matches!(
            "TCP".parse::<Protocol>(),
            Err(Error::UnsupportedTransport { ref name, .. }) if name == "TCP"
        ));
        assert_eq!(format!("{}", Protocol::Udp), "UDP");
    }

    #[test]
    fn unsupported_transport_allocates_nothing() {
        assert!(matches!(
            Connection::new("localhost", 9700, "TCP"),
            Err(Error::UnsupportedTransport { .. })
        ));
    }

    #[test]
    fn lifecycle() {
        let mut conn = Connection::new("127.0.0.1", 9, "UDP").unwrap();
        assert!(!conn.is_open());
        assert!(matches!(conn.send(b"x"), Err(Error::NotOpen { .. })));

        // Closing a never-opened connection is fine...
        conn.close();
        assert!(matches!(conn.send(b"x"), Err(Error::NotOpen { .. })));

        conn.open().unwrap();
        assert!(conn.is_open());
        conn.close();
        assert!(!conn.is_open());
        // and so is closing twice.
        conn.close();
        assert!(matches!(conn.send(b"x"), Err(Error::Closed { .. })));

        // A released connection may be re-opened.
        conn.open().unwrap();
        assert!(conn.is_open());
    }

    #[test]
    fn prefers_ipv4() {
        let v6: SocketAddr = "[::1]:9700".parse().unwrap();
        let v4: SocketAddr = "127.0.0.1:9700".parse().unwrap();
        let other_v4: SocketAddr = "10.0.0.1:9700".parse().unwrap();
        assert_eq!(pick_peer(vec![v6, v4, other_v4].into_iter()), Some(v4));
        assert_eq!(pick_peer(vec![v4, v6].into_iter()), Some(v4));
        assert_eq!(pick_peer(vec![v6].into_iter()), Some(v6));
        assert_eq!(pick_peer(std::iter::empty()), None);
    }

    #[test]
    fn localhost_is_ipv4() {
        let mut conn = Connection::new("localhost", 9700, "UDP").unwrap();
        conn.open().unwrap();
        match &conn.state {
            State::Open { socket, peer } => {
                assert!(peer.is_ipv4());
                assert!(socket.local_addr().unwrap().is_ipv4());
            }
            _ => panic!("expected an open connection"),
        }
    }

    #[test]
    fn scoped_closes_on_panic() {
        let mut conn = Connection::new("127.0.0.1", 9, "UDP").unwrap();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _: Result<()> = conn.scoped(|c| {
                assert!(c.is_open());
                panic!("boom");
            });
        }));
        assert!(result.is_err());
        assert!(!conn.is_open());
        assert!(matches!(conn.send(b"x"), Err(Error::Closed { .. })));
    }

    #[test]
    fn scoped_closes_on_error() {
        let mut conn = Connection::new("127.0.0.1", 9, "UDP").unwrap();
        let result: Result<()> = conn.scoped(|c| {
            assert!(c.is_open());
            Err(Error::NotOpen {
                back: Backtrace::new(),
            })
        });
        assert!(matches!(result, Err(Error::NotOpen { .. })));
        assert!(!conn.is_open());
        assert!(matches!(conn.send(b"x"), Err(Error::Closed { .. })));
    }
}
