//! TLS transport
//!
//! Secure network module for `tn3270s://` and `telnets://` hosts. Before
//! the connection is reported up, the module initializes the process-wide
//! TLS context and, when a CRL source is configured, downloads and
//! installs the revocation list. A connection is never considered trusted
//! while the revocation step is failing.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;

use rustls::pki_types::ServerName;
use rustls::{ClientConnection, StreamOwned};
use tracing::{debug, info};

use crate::error::{Result, SessionError, SslErrorMessage};
use crate::net::tcp::TcpModule;
use crate::net::{ConnectOptions, NetworkModule};
use crate::ssl;

#[derive(Default)]
pub struct TlsModule {
    stream: Option<StreamOwned<ClientConnection, TcpStream>>,
    /// CRL fetched during the last connect, pending pickup by the session
    crl: Option<ssl::CrlData>,
}

impl TlsModule {
    fn handshake(&mut self, options: &ConnectOptions) -> Result<StreamOwned<ClientConnection, TcpStream>> {
        ssl::init_context()?;

        #[cfg(feature = "crl-check")]
        if let Some(url) = &options.crl_url {
            let crl = ssl::crl::download(url, options.ssl_trace)?;
            ssl::apply_crl(&crl)?;
            self.crl = Some(crl);
        }

        let config = ssl::client_config()?;

        let server_name = ServerName::try_from(options.host.clone()).map_err(|_| {
            SessionError::InvalidArgument(format!("invalid TLS server name {}", options.host))
        })?;

        let connection = ClientConnection::new(config, server_name).map_err(|e| {
            SessionError::Security(SslErrorMessage::with_description(
                "Can't initialize the TLS session",
                e.to_string(),
            ))
        })?;

        let tcp = TcpModule::open_stream(options)?;
        let mut stream = StreamOwned::new(connection, tcp);

        // Drive the handshake to completion before reporting success.
        while stream.conn.is_handshaking() {
            stream.conn.complete_io(&mut stream.sock).map_err(|e| {
                SessionError::Security(SslErrorMessage::with_description(
                    "TLS negotiation failed",
                    e.to_string(),
                ))
            })?;
        }

        debug!(host = %options.host, "TLS handshake complete");
        Ok(stream)
    }
}

impl NetworkModule for TlsModule {
    fn name(&self) -> &'static str {
        "tls"
    }

    fn connect(&mut self, options: &ConnectOptions) -> Result<()> {
        if self.stream.is_some() {
            return Err(SessionError::AlreadyConnected);
        }
        self.crl = None;
        let stream = self.handshake(options)?;
        info!(host = %options.host, port = options.port, "secure connection established");
        self.stream = Some(stream);
        Ok(())
    }

    fn disconnect(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.conn.send_close_notify();
            let _ = stream.conn.complete_io(&mut stream.sock);
            let _ = stream.sock.shutdown(std::net::Shutdown::Both);
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

    fn revocation_record(&mut self) -> Option<ssl::CrlData> {
        self.crl.take()
    }
}
