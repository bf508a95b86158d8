//! Session capability table
//!
//! Hosts observe and extend a session by installing a table of callbacks.
//! Every slot has a safe default, so a session is fully callable with no
//! host integration at all: observers default to no-ops, screen
//! erase/display default to a full-buffer redraw request, print/save/load
//! default to handlers that report the operation as unavailable, and the
//! reconnect slot defaults to the library's own reconnect routine.
//!
//! Installation is version-checked at the boundary: the host declares the
//! revision it was built against and the slot count of the table it is
//! supplying. A stale revision or a slot-count mismatch rejects the
//! install and leaves the previous table untouched.

use std::sync::Arc;

use tracing::warn;

use crate::core::session::Session;
use crate::error::{Result, SessionError};
use crate::ssl::SslState;

/// Minimum capability-table revision this library accepts.
pub const REQUIRED_REVISION: &str = "20211118";

/// What a print or save operation should cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentOption {
    /// Whole screen buffer
    All,
    /// Current selection only
    Selected,
    /// Copy-mode buffer
    Copy,
}

/// Severity of a popup notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifySeverity {
    Info,
    Warning,
    Error,
    Critical,
}

/// A notification the library asks the host to surface.
#[derive(Debug, Clone)]
pub struct PopupNotification {
    pub severity: NotifySeverity,
    pub title: String,
    pub summary: String,
    pub body: String,
}

pub type ObserverFn = Arc<dyn Fn(&Session) + Send + Sync>;
pub type RangeFn = Arc<dyn Fn(&Session, usize, usize) + Send + Sync>;
pub type FlagFn = Arc<dyn Fn(&Session, bool) + Send + Sync>;
pub type TextFn = Arc<dyn Fn(&Session, &str) + Send + Sync>;
pub type CursorFn = Arc<dyn Fn(&Session, u16, u16) + Send + Sync>;
pub type ModelFn = Arc<dyn Fn(&Session, &str, u8, u16, u16) + Send + Sync>;
pub type SslStateFn = Arc<dyn Fn(&Session, SslState) + Send + Sync>;
pub type PopupFn = Arc<dyn Fn(&Session, &PopupNotification) + Send + Sync>;
pub type LogFn = Arc<dyn Fn(&Session, &str, &str) + Send + Sync>;
pub type PrintFn = Arc<dyn Fn(&Session, ContentOption) -> Result<()> + Send + Sync>;
pub type SaveFn = Arc<dyn Fn(&Session, ContentOption, &str) -> Result<()> + Send + Sync>;
pub type LoadFn = Arc<dyn Fn(&Session, &str) -> Result<()> + Send + Sync>;
pub type ActionFn = Arc<dyn Fn(&Session, &str) -> Result<()> + Send + Sync>;
pub type ReconnectFn = Arc<dyn Fn(&Session) -> Result<()> + Send + Sync>;

/// The capability table. Held by the session by value; installing a table
/// copies it, so host-side lifetime management cannot dangle a slot.
#[derive(Clone)]
pub struct SessionCallbacks {
    /// Screen region changed
    pub update: RangeFn,
    /// Screen erased
    pub erase: ObserverFn,
    /// Full redisplay requested
    pub display: ObserverFn,
    /// Terminal model changed
    pub update_model: ModelFn,
    /// Cursor moved
    pub update_cursor: CursorFn,
    /// TLS state changed
    pub update_ssl: SslStateFn,
    /// Status line message changed
    pub update_status: TextFn,
    /// Selection range changed
    pub update_selection: RangeFn,
    /// Selection turned on or off
    pub set_selection: FlagFn,
    /// LU name negotiated
    pub update_luname: TextFn,
    /// Host URL changed
    pub update_url: TextFn,
    /// Connected or disconnected
    pub update_connect: FlagFn,
    /// Data-stream processing finished
    pub ctlr_done: ObserverFn,
    /// Screen updates suspended
    pub suspend: ObserverFn,
    /// Screen updates resumed
    pub resume: ObserverFn,
    /// Keyboard-unlock timer armed or cleared
    pub set_timer: FlagFn,
    /// Print the screen content
    pub print: PrintFn,
    /// Save screen content to a file
    pub save: SaveFn,
    /// Load screen content from a file
    pub load: LoadFn,
    /// Dispatch a named host action
    pub action: ActionFn,
    /// Re-establish the last connection
    pub reconnect: ReconnectFn,
    /// Surface a notification dialog
    pub popup: PopupFn,
    /// Log sink
    pub write_log: LogFn,
    /// Trace sink
    pub write_trace: TextFn,
}

impl SessionCallbacks {
    /// Number of slots in this table revision. Hosts pass the count of the
    /// table they built; a mismatch means the host was compiled against a
    /// different table layout.
    pub const SLOT_COUNT: usize = 24;

    /// Validate a host-supplied (revision, slot count) pair.
    pub(crate) fn check_install(revision: &str, slots: usize) -> Result<()> {
        if revision.to_ascii_lowercase().as_str() < REQUIRED_REVISION {
            warn!(revision, "invalid revision when setting callback table");
            return Err(SessionError::InvalidArgument(format!(
                "callback table revision {} is older than required {}",
                revision, REQUIRED_REVISION
            )));
        }

        if slots != Self::SLOT_COUNT {
            warn!(
                slots,
                expected = Self::SLOT_COUNT,
                "invalid callback table size"
            );
            return Err(SessionError::InvalidArgument(format!(
                "callback table has {} slots, expected {}",
                slots,
                Self::SLOT_COUNT
            )));
        }

        Ok(())
    }
}

fn nop(_: &Session) {}

fn full_redraw(session: &Session) {
    session.request_redraw();
}

fn unavailable(
    session: &Session,
    verb: &'static str,
    title: &'static str,
    summary: &'static str,
) -> Result<()> {
    session.write_log(verb, &format!("{} is unavailable", title));
    session.popup(&PopupNotification {
        severity: NotifySeverity::Warning,
        title: title.to_string(),
        summary: summary.to_string(),
        body: "operation not supported".to_string(),
    });
    Err(SessionError::Unsupported(verb))
}

impl Default for SessionCallbacks {
    fn default() -> Self {
        Self {
            update: Arc::new(|_, _, _| {}),
            erase: Arc::new(full_redraw),
            display: Arc::new(full_redraw),
            update_model: Arc::new(|_, _, _, _, _| {}),
            update_cursor: Arc::new(|_, _, _| {}),
            update_ssl: Arc::new(|_, _| {}),
            update_status: Arc::new(|_, _| {}),
            update_selection: Arc::new(|_, _, _| {}),
            set_selection: Arc::new(|_, _| {}),
            update_luname: Arc::new(|_, _| {}),
            update_url: Arc::new(|_, _| {}),
            update_connect: Arc::new(|_, _| {}),
            ctlr_done: Arc::new(nop),
            suspend: Arc::new(nop),
            resume: Arc::new(full_redraw),
            set_timer: Arc::new(|_, _| {}),
            print: Arc::new(|session, _mode| {
                unavailable(session, "print", "Can't print", "Unable to print")
            }),
            save: Arc::new(|session, _mode, _filename| {
                unavailable(session, "save", "Can't save", "Unable to save")
            }),
            load: Arc::new(|session, _filename| {
                unavailable(
                    session,
                    "load",
                    "Can't load",
                    "Unable to load from file",
                )
            }),
            action: Arc::new(|_, name| Err(SessionError::NotFound(name.to_string()))),
            reconnect: Arc::new(|session| session.reconnect()),
            popup: Arc::new(|_, _| {}),
            write_log: Arc::new(|_, module, message| {
                tracing::info!(target: "tn3270", module, "{}", message);
            }),
            write_trace: Arc::new(|_, message| {
                tracing::debug!(target: "tn3270::trace", "{}", message);
            }),
        }
    }
}
