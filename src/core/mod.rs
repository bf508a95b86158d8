//! Core protocol-client components.
//!
//! This module contains the session machinery:
//!
//! - **session**: lifecycle, connection state machine and teardown
//! - **callbacks**: the host capability table
//! - **listeners**: ordered listener lists with stable handles
//! - **state**: connection and keyboard state types
//! - **toggles**: runtime boolean switches with change notification
//! - **properties**: the typed property registry
//!
//! # Architecture
//!
//! ```text
//! Session
//! ├── SessionCallbacks (host capability table)
//! ├── NetworkModule (pluggable transport, tcp or tls)
//! ├── ListenerList per StateChange event
//! ├── Toggles
//! └── ssl slots (state, error, revocation record)
//! ```

pub mod callbacks;
pub mod listeners;
pub mod properties;
pub mod session;
pub mod state;
pub mod toggles;
