//! Pluggable network transports
//!
//! A session owns exactly one network module for its whole lifetime. The
//! module encapsulates the socket (and TLS machinery, when the secure
//! module is selected); the session calls `finalize` exactly once during
//! teardown, after any active connection has been closed.

mod tcp;
mod tls;

use std::time::Duration;

pub use tcp::TcpModule;
pub use tls::TlsModule;

use crate::error::Result;

/// Everything a module needs to establish one connection attempt.
///
/// Built by the session from its own state before the call, so modules
/// never reach back into the session mid-connect.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub host: String,
    pub port: u16,
    /// Connect timeout
    pub timeout: Duration,
    /// Enable TCP keep-alive
    pub keep_alive: bool,
    /// Route TLS negotiation details through the trace sink
    pub ssl_trace: bool,
    /// CRL source URL; None disables revocation download
    pub crl_url: Option<String>,
}

/// Contract every transport implements.
///
/// `finalize` is called exactly once, never concurrently with I/O, always
/// from the thread performing teardown. Finalize failures are logged by
/// the caller and never stop teardown.
pub trait NetworkModule: Send {
    /// Short module name for logs
    fn name(&self) -> &'static str;

    /// Establish a connection to the host.
    fn connect(&mut self, options: &ConnectOptions) -> Result<()>;

    /// Close the connection if one is active. Idempotent.
    fn disconnect(&mut self);

    fn is_connected(&self) -> bool;

    fn send(&mut self, data: &[u8]) -> Result<usize>;

    fn recv(&mut self, buffer: &mut [u8]) -> Result<usize>;

    /// Release transport resources. Called exactly once during teardown.
    fn finalize(&mut self) -> Result<()>;

    /// Revocation list fetched during the last connect, handed to the
    /// session for its per-connection record. Plain transports have none.
    fn revocation_record(&mut self) -> Option<crate::ssl::CrlData> {
        None
    }
}

/// The platform-default module bound at session creation.
pub fn default_module() -> Box<dyn NetworkModule> {
    Box::new(TcpModule::default())
}

/// Module matching a URL scheme's security requirement.
pub fn module_for(secure: bool) -> Box<dyn NetworkModule> {
    if secure {
        Box::new(TlsModule::default())
    } else {
        Box::new(TcpModule::default())
    }
}
