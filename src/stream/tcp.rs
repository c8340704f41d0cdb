//! [`NetworkStack`] over plain TCP sockets.

use std::io::{self, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use super::transport::{Connection, NetworkStack, TransportError};

/// Opens non-blocking TCP connections with a bounded connect time.
pub struct TcpNetwork {
    connect_timeout: Duration,
}

impl TcpNetwork {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl NetworkStack for TcpNetwork {
    fn connect(&mut self, host: &str, port: u16) -> Result<Box<dyn Connection>, TransportError> {
        let addr_str = format!("{host}:{port}");
        let connect_err = |reason: String| TransportError::Connect {
            addr: addr_str.clone(),
            reason,
        };

        let addrs = (host, port)
            .to_socket_addrs()
            .map_err(|e| connect_err(e.to_string()))?;

        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.connect_timeout) {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    stream.set_nonblocking(true)?;
                    log::debug!("stream: connected to {addr}");
                    return Ok(Box::new(TcpConnection {
                        stream: Some(stream),
                    }));
                }
                Err(e) => last_err = Some(e),
            }
        }

        Err(connect_err(match last_err {
            Some(e) => e.to_string(),
            None => "host did not resolve".into(),
        }))
    }
}

/// A connected, non-blocking TCP stream.
pub struct TcpConnection {
    stream: Option<TcpStream>,
}

impl Connection for TcpConnection {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        match self.stream.as_mut() {
            Some(stream) => stream.write(bytes),
            None => Err(io::ErrorKind::NotConnected.into()),
        }
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
}
