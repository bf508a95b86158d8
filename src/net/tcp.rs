//! Plain TCP transport
//!
//! The default network module: a blocking TCP stream with a bounded
//! connect timeout. Used for `tn3270://` and `telnet://` hosts.

use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};

use tracing::{debug, info};

use crate::error::{Result, SessionError};
use crate::net::{ConnectOptions, NetworkModule};

#[derive(Default)]
pub struct TcpModule {
    stream: Option<TcpStream>,
}

impl TcpModule {
    pub(crate) fn open_stream(options: &ConnectOptions) -> Result<TcpStream> {
        let address = (options.host.as_str(), options.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                SessionError::InvalidArgument(format!("can't resolve host {}", options.host))
            })?;

        debug!(host = %options.host, port = options.port, "connecting");
        let stream = TcpStream::connect_timeout(&address, options.timeout)?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

impl NetworkModule for TcpModule {
    fn name(&self) -> &'static str {
        "tcp"
    }

    fn connect(&mut self, options: &ConnectOptions) -> Result<()> {
        if self.stream.is_some() {
            return Err(SessionError::AlreadyConnected);
        }
        let stream = Self::open_stream(options)?;
        info!(host = %options.host, port = options.port, "connected");
        self.stream = Some(stream);
        Ok(())
    }

    fn disconnect(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn send(&mut self, data: &[u8]) -> Result<usize> {
        match &mut self.stream {
            Some(stream) => Ok(stream.write(data)?),
            None => Err(SessionError::NotConnected),
        }
    }

    fn recv(&mut self, buffer: &mut [u8]) -> Result<usize> {
        match &mut self.stream {
            Some(stream) => Ok(stream.read(buffer)?),
            None => Err(SessionError::NotConnected),
        }
    }

    fn finalize(&mut self) -> Result<()> {
        self.disconnect();
        Ok(())
    }
}
