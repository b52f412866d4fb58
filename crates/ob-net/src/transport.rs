//! Transport contracts and default TCP implementation.

use ob_core::ErrorKind;
use ob_core::OrbiterError;
use ob_core::OrbiterResult;
use std::io::Read;
use std::io::Write;
use std::net::SocketAddr;
use std::net::TcpStream;
use std::time::Duration;

/// Trait-object-safe stream carried by a TLS session.
pub trait IoStream: Read + Write {}
impl<T> IoStream for T where T: Read + Write {}

pub type BoxedIoStream = Box<dyn IoStream>;

/// Low-level transport abstraction for opening TCP connections.
pub trait Transport {
    fn connect(&self, address: SocketAddr, timeout: Duration) -> OrbiterResult<TcpStream>;
}

/// Standard library TCP transport.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpTransport;

impl Transport for TcpTransport {
    fn connect(&self, address: SocketAddr, timeout: Duration) -> OrbiterResult<TcpStream> {
        let stream = TcpStream::connect_timeout(&address, timeout)
            .map_err(|error| connection_error("net.transport.connect_failed", error.to_string()))?;

        stream.set_nodelay(true).map_err(|error| {
            connection_error(
                "net.transport.nodelay_failed",
                format!("failed to enable TCP_NODELAY for `{address}`: {error}"),
            )
        })?;

        // The handshake runs under the connect timeout; the client shortens it
        // once the request is under way.
        stream.set_read_timeout(Some(timeout)).map_err(|error| {
            connection_error(
                "net.transport.read_timeout_failed",
                format!("failed to set read timeout for `{address}`: {error}"),
            )
        })?;

        stream.set_write_timeout(Some(timeout)).map_err(|error| {
            connection_error(
                "net.transport.write_timeout_failed",
                format!("failed to set write timeout for `{address}`: {error}"),
            )
        })?;

        Ok(stream)
    }
}

fn connection_error(code: &'static str, message: String) -> OrbiterError {
    OrbiterError::new(ErrorKind::ConnectionFailed, code, message)
}
