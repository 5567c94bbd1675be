//! TCP transport binding for seclink.
//!
//! Provides the duplex byte channel that links run over: a thin
//! [`NetStream`] wrapper around `std::net::TcpStream` plus a blocking
//! bind/accept/connect surface. Everything above this layer works in
//! terms of `Read + Write`, so tests can substitute socket pairs or
//! in-memory streams.

pub mod error;
pub mod tcp;

pub use error::{Result, TransportError};
pub use tcp::{NetStream, TcpEndpoint};
