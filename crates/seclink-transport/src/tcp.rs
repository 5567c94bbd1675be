use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};

/// A connected duplex byte channel — implements Read + Write.
///
/// Wraps a TCP stream. Cloning via [`NetStream::try_clone`] yields a
/// second handle to the same socket, so one half can feed a receive
/// loop while the other is held for writes.
#[derive(Debug)]
pub struct NetStream {
    inner: TcpStream,
}

impl Read for NetStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Write for NetStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

impl NetStream {
    fn from_tcp(stream: TcpStream) -> Self {
        Self { inner: stream }
    }

    /// Set read timeout on the underlying socket.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.inner.set_read_timeout(timeout).map_err(Into::into)
    }

    /// Set write timeout on the underlying socket.
    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.inner.set_write_timeout(timeout).map_err(Into::into)
    }

    /// Try to clone this stream (creates a new file descriptor).
    pub fn try_clone(&self) -> Result<Self> {
        let cloned = self.inner.try_clone()?;
        Ok(Self::from_tcp(cloned))
    }

    /// Address of the connected peer.
    pub fn peer_addr(&self) -> Result<SocketAddr> {
        self.inner.peer_addr().map_err(Into::into)
    }

    /// Shut down both halves of the connection.
    pub fn shutdown(&self) -> Result<()> {
        self.inner.shutdown(Shutdown::Both).map_err(Into::into)
    }
}

/// A bound, listening TCP endpoint.
pub struct TcpEndpoint {
    listener: TcpListener,
    addr: SocketAddr,
}

impl TcpEndpoint {
    /// Bind and listen on the given address.
    pub fn bind(addr: impl ToSocketAddrs + std::fmt::Display) -> Result<Self> {
        let display = addr.to_string();
        let listener = TcpListener::bind(&addr).map_err(|e| TransportError::Bind {
            addr: display,
            source: e,
        })?;
        let addr = listener.local_addr()?;
        info!(%addr, "listening");
        Ok(Self { listener, addr })
    }

    /// Accept an incoming connection (blocking).
    pub fn accept(&self) -> Result<NetStream> {
        let (stream, peer) = self.listener.accept().map_err(TransportError::Accept)?;
        debug!(%peer, "accepted connection");
        Ok(NetStream::from_tcp(stream))
    }

    /// Connect to a listening endpoint (blocking).
    pub fn connect(addr: impl ToSocketAddrs + std::fmt::Display) -> Result<NetStream> {
        let display = addr.to_string();
        let stream = TcpStream::connect(&addr).map_err(|e| TransportError::Connect {
            addr: display,
            source: e,
        })?;
        debug!(addr = %stream.peer_addr()?, "connected");
        Ok(NetStream::from_tcp(stream))
    }

    /// The local address this endpoint is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_accept_connect_roundtrip() {
        let endpoint = TcpEndpoint::bind("127.0.0.1:0").unwrap();
        let addr = endpoint.local_addr();

        let client = std::thread::spawn(move || {
            let mut stream = TcpEndpoint::connect(addr).unwrap();
            stream.write_all(b"hello").unwrap();
        });

        let mut server = endpoint.accept().unwrap();
        let mut buf = [0u8; 5];
        server.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");

        client.join().unwrap();
    }

    #[test]
    fn bind_refused_on_bad_address() {
        let result = TcpEndpoint::bind("256.0.0.1:0");
        assert!(matches!(result, Err(TransportError::Bind { .. })));
    }

    #[test]
    fn connect_refused_when_nobody_listens() {
        // Bind then drop to get a port that is very likely closed.
        let endpoint = TcpEndpoint::bind("127.0.0.1:0").unwrap();
        let addr = endpoint.local_addr();
        drop(endpoint);

        let result = TcpEndpoint::connect(addr);
        assert!(matches!(result, Err(TransportError::Connect { .. })));
    }

    #[test]
    fn try_clone_shares_the_socket() {
        let endpoint = TcpEndpoint::bind("127.0.0.1:0").unwrap();
        let addr = endpoint.local_addr();

        let client = std::thread::spawn(move || {
            let stream = TcpEndpoint::connect(addr).unwrap();
            let mut writer = stream.try_clone().unwrap();
            writer.write_all(b"ab").unwrap();
        });

        let mut server = endpoint.accept().unwrap();
        let mut buf = [0u8; 2];
        server.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ab");

        client.join().unwrap();
    }
}
