//! tn3270 - A block-mode terminal protocol client core
//!
//! tn3270 implements the session side of a 3270-style block-mode terminal
//! connection: lifecycle management, pluggable transports with optional
//! TLS, a host capability table and a typed property registry.
//!
//! # Features
//!
//! - **Sessions**: create, connect, disconnect and destroy terminal
//!   sessions; the first one created becomes the process default
//! - **Transports**: plain TCP and TLS modules selected by URL scheme,
//!   replaceable through the [`NetworkModule`] trait
//! - **Capability table**: hosts install a revision-checked table of
//!   callbacks; every slot has a safe default
//! - **Properties**: named unsigned-integer attributes with bounds,
//!   gating groups and an optional grace-period set
//! - **Revocation**: CRL download from `file://`, `ldap://` and HTTP
//!   sources feeding the process-wide TLS context
//!
//! # Quick Start
//!
//! ```no_run
//! use tn3270::Session;
//!
//! fn main() -> tn3270::Result<()> {
//!     let session = Session::new("3279-2");
//!     session.set_url("tn3270s://host.example:992")?;
//!     session.connect()?;
//!     // ...
//!     session.disconnect()?;
//!     session.destroy();
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
mod error;
pub mod net;
pub mod ssl;
pub mod util;

pub use crate::core::callbacks::{
    ContentOption, NotifySeverity, PopupNotification, SessionCallbacks, REQUIRED_REVISION,
};
pub use crate::core::listeners::ListenerHandle;
pub use crate::core::properties::{
    get_uint_property, set_uint_property, unsigned_properties, ActionGroup, UintProperty,
};
pub use crate::core::session::{Session, StateCallback};
pub use crate::core::state::{ConnectionState, KeyboardLock, StateChange};
pub use crate::core::toggles::Toggle;
pub use crate::error::{Result, SessionError, SslErrorMessage};
pub use crate::net::{ConnectOptions, NetworkModule};
pub use crate::ssl::{CrlData, SslState};

/// Serializes tests that touch process-wide state (the default session
/// slot and the TLS context) and installs a capture-friendly trace
/// subscriber on first use.
#[cfg(test)]
pub(crate) fn test_lock() -> parking_lot::MutexGuard<'static, ()> {
    static LOCK: parking_lot::Mutex<()> = parking_lot::Mutex::new(());
    static TRACING: std::sync::Once = std::sync::Once::new();
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
    LOCK.lock()
}
