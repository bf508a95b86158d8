//! Session lifecycle
//!
//! The session owns everything tied to one terminal connection: the
//! connection and keyboard state machines, the capability table, the
//! network module, the listener lists and the TLS/revocation slots.
//! Creation installs safe defaults everywhere; teardown releases owned
//! resources in dependency order and finalizes the network module exactly
//! once.
//!
//! The handle is cheaply clonable. All interior state sits behind one
//! lock, and callbacks always fire against a snapshot taken outside it,
//! so a listener may call back into the session (including `disconnect`)
//! without deadlocking.

use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::ProtocolDefaults;
use crate::core::callbacks::{ContentOption, PopupNotification, SessionCallbacks};
use crate::core::listeners::{ListenerHandle, ListenerList};
use crate::core::state::{ConnectionState, KeyboardLock, StateChange};
use crate::core::toggles::{Toggle, ToggleCallback, Toggles};
use crate::error::{Result, SessionError, SslErrorMessage};
use crate::net::{self, ConnectOptions, NetworkModule};
use crate::ssl::{CrlData, SslState};

/// Callback fired on a state-change event. The flag carries the event's
/// direction (connected / entered mode).
pub type StateCallback = Arc<dyn Fn(&Session, bool) + Send + Sync>;

/// Default connect timeout in milliseconds.
const CONNECT_TIMEOUT_MS: u64 = 10_000;
/// Default retry interval in milliseconds.
const RETRY_INTERVAL_MS: u64 = 5_000;
/// Default keyboard unlock delay in milliseconds.
const UNLOCK_MS: u32 = 350;

static DEFAULT_SESSION: Mutex<Option<Session>> = Mutex::new(None);

#[derive(Default)]
struct HostInfo {
    /// Full URL as given to `set_url`
    url: Option<String>,
    host: Option<String>,
    port: u16,
    secure: bool,
}

struct SslInfo {
    state: SslState,
    /// Last TLS/revocation failure
    error: Option<SslErrorMessage>,
    /// Revocation record of the current connection attempt
    crl: Option<CrlData>,
    crl_url: Option<String>,
}

impl Default for SslInfo {
    fn default() -> Self {
        Self {
            state: SslState::Unsecure,
            error: None,
            crl: None,
            crl_url: None,
        }
    }
}

struct SessionState {
    /// Single-character session identifier, None until assigned
    id: Option<char>,
    model_name: String,
    model_num: u8,
    extended: bool,
    m3279: bool,
    colors: u32,
    host_type: u32,
    unlock_delay_ms: u32,
    charset_host: String,
    connect_timeout: Duration,
    #[allow(dead_code)]
    retry_interval: Duration,
    connection_state: ConnectionState,
    kybdlock: KeyboardLock,
    /// In-flight asynchronous tasks
    tasks: u32,
    cursor_addr: u32,
    selected: bool,
    user_data: Option<Arc<dyn Any + Send + Sync>>,
    cbk: SessionCallbacks,
    network: Option<Box<dyn NetworkModule>>,
    state_listeners: [ListenerList<StateCallback>; StateChange::ALL.len()],
    toggles: Toggles,
    host: HostInfo,
    ssl: SslInfo,
    paste_buffer: Option<Vec<u8>>,
    destroyed: bool,
}

/// Rows and columns for a terminal model number.
fn model_geometry(model: u8) -> (u16, u16) {
    match model {
        3 => (32, 80),
        4 => (43, 80),
        5 => (27, 132),
        _ => (24, 80),
    }
}

/// Parse a model identifier like "3278-4-E", "3279-2" or plain "4" into
/// (model number, color support, extended data stream). Invalid numbers
/// fall back to model 2; an empty identifier keeps all defaults.
fn parse_model(model: &str) -> (u8, bool, bool) {
    let trimmed = model.trim();
    if trimmed.is_empty() {
        return (2, true, true);
    }

    let mut color = true;
    let mut rest = trimmed;
    if let Some(tail) = rest.strip_prefix("3279") {
        rest = tail;
    } else if let Some(tail) = rest.strip_prefix("3278") {
        color = false;
        rest = tail;
    }

    let extended = rest.to_ascii_uppercase().ends_with("-E");

    let number = rest
        .chars()
        .find(|c| c.is_ascii_digit())
        .and_then(|c| c.to_digit(10))
        .map(|n| n as u8)
        .filter(|n| (2..=5).contains(n))
        .unwrap_or(2);

    (number, color, extended)
}

/// A terminal session handle.
///
/// Clones share the same underlying session. Exactly one session per
/// process may be the implicit default, claimed by the first one created
/// and released when that session is destroyed.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Mutex<SessionState>>,
}

impl Session {
    /// Create a session with defaults applied and the platform-default
    /// network module bound. The first session created in the process
    /// becomes the default session.
    pub fn new(model: &str) -> Session {
        let defaults = ProtocolDefaults::load();

        let (model_num, m3279, extended) = parse_model(model);

        let mut state = SessionState {
            id: None,
            model_name: model.to_string(),
            model_num,
            extended,
            m3279,
            colors: 16,
            host_type: 0,
            unlock_delay_ms: UNLOCK_MS,
            charset_host: "bracket".to_string(),
            connect_timeout: Duration::from_millis(CONNECT_TIMEOUT_MS),
            retry_interval: Duration::from_millis(RETRY_INTERVAL_MS),
            connection_state: ConnectionState::NotConnected,
            kybdlock: KeyboardLock::NOT_CONNECTED,
            tasks: 0,
            cursor_addr: 0,
            selected: false,
            user_data: None,
            cbk: SessionCallbacks::default(),
            network: Some(net::default_module()),
            state_listeners: Default::default(),
            toggles: Toggles::default(),
            host: HostInfo::default(),
            ssl: SslInfo::default(),
            paste_buffer: None,
            destroyed: false,
        };

        // Site-wide defaults override the built-ins for the offline group.
        if let Some(n) = defaults.defaults.model_number {
            if (2..=5).contains(&n) {
                state.model_num = n as u8;
            }
        }
        if let Some(colors) = defaults.defaults.color_type {
            if matches!(colors, 0 | 8 | 16) {
                state.colors = if colors == 0 { 16 } else { colors };
            }
        }
        if let Some(host_type) = defaults.defaults.host_type_number {
            state.host_type = host_type;
        }
        if let Some(delay) = defaults.defaults.unlock_delay {
            state.unlock_delay_ms = delay.min(10_000);
        }
        state.ssl.crl_url = defaults.crl_url;

        let session = Session {
            inner: Arc::new(Mutex::new(state)),
        };

        // Built-in keyboard-state listeners.
        session.register_state_listener(StateChange::Connect, Arc::new(kybd_connect));
        session.register_state_listener(StateChange::Protocol3270Mode, Arc::new(kybd_in3270));

        let mut default = DEFAULT_SESSION.lock();
        if default.is_none() {
            debug!("session claimed the process default slot");
            *default = Some(session.clone());
        }

        session
    }

    /// The process default session, lazily created with an empty model
    /// identifier when none exists yet.
    pub fn get_default() -> Session {
        if let Some(session) = DEFAULT_SESSION.lock().as_ref() {
            return session.clone();
        }
        // Session::new claims the empty slot itself.
        Session::new("")
    }

    /// Tear the session down, releasing every owned resource.
    ///
    /// Forces a disconnect when connected or mid-connect, finalizes the
    /// network module exactly once, clears every listener list and owned
    /// buffer, and releases the process default-session slot when this
    /// session held it. Safe to call more than once.
    pub fn destroy(&self) {
        let state = self.connection_state();
        if state.is_online() || state == ConnectionState::Connecting {
            debug!("destroying while connected, forcing disconnect");
            let _ = self.disconnect();
        }

        {
            let mut inner = self.inner.lock();
            if inner.destroyed {
                return;
            }

            if inner.tasks > 0 {
                warn!(tasks = inner.tasks, "destroying session with active tasks");
            }

            inner.toggles.shutdown();

            if let Some(mut module) = inner.network.take() {
                let name = module.name();
                if let Err(e) = module.finalize() {
                    error!(module = name, "network module finalize failed: {}", e);
                }
            }

            for list in &mut inner.state_listeners {
                list.clear();
            }

            inner.paste_buffer = None;
            inner.host = HostInfo::default();
            inner.ssl = SslInfo::default();
            inner.user_data = None;
            inner.destroyed = true;
        }

        let mut default = DEFAULT_SESSION.lock();
        if let Some(current) = default.as_ref() {
            if Arc::ptr_eq(&current.inner, &self.inner) {
                *default = None;
            }
        }
    }

    /// Drop the process default-session slot without destroying anything.
    #[doc(hidden)]
    pub fn reset_default_session() {
        *DEFAULT_SESSION.lock() = None;
    }

    // --- host / transport -------------------------------------------------

    /// Configure the host URL. Accepts `tn3270://`, `telnet://` (plain)
    /// and `tn3270s://`, `telnets://` (TLS); the matching network module
    /// is bound in the same step. Only allowed while offline.
    pub fn set_url(&self, url: &str) -> Result<()> {
        self.check_not_connecting()?;
        self.check_offline()?;

        let parsed = Url::parse(url)
            .map_err(|e| SessionError::InvalidArgument(format!("invalid URL {}: {}", url, e)))?;

        let (secure, default_port) = match parsed.scheme() {
            "tn3270" | "telnet" => (false, 23),
            "tn3270s" | "telnets" => (true, 992),
            other => {
                return Err(SessionError::InvalidArgument(format!(
                    "unsupported URL scheme {}",
                    other
                )))
            }
        };

        let host = parsed
            .host_str()
            .ok_or_else(|| SessionError::InvalidArgument(format!("no host in URL {}", url)))?
            .to_string();
        let port = parsed.port().unwrap_or(default_port);

        {
            let mut inner = self.inner.lock();
            inner.host.url = Some(url.to_string());
            inner.host.host = Some(host);
            inner.host.port = port;
            if inner.host.secure != secure || inner.network.is_none() {
                if let Some(mut old) = inner.network.replace(net::module_for(secure)) {
                    let _ = old.finalize();
                }
            }
            inner.host.secure = secure;
        }

        let cb = self.inner.lock().cbk.update_url.clone();
        cb(self, url);
        Ok(())
    }

    pub fn url(&self) -> Option<String> {
        self.inner.lock().host.url.clone()
    }

    /// Rebind the session to an alternate network module. Only allowed
    /// before a connection attempt; the replaced module is finalized.
    pub fn set_network_module(&self, module: Box<dyn NetworkModule>) -> Result<()> {
        self.check_not_connecting()?;
        self.check_offline()?;
        let mut inner = self.inner.lock();
        if let Some(mut old) = inner.network.replace(module) {
            let _ = old.finalize();
        }
        Ok(())
    }

    /// Name of the currently bound network module.
    pub fn network_module_name(&self) -> Option<&'static str> {
        self.inner.lock().network.as_ref().map(|m| m.name())
    }

    /// Establish the connection to the configured host.
    ///
    /// For a secure host the bound module initializes the process TLS
    /// context and runs the revocation pipeline before the connection is
    /// reported trusted.
    pub fn connect(&self) -> Result<()> {
        let options = {
            let mut inner = self.inner.lock();
            if inner.connection_state.is_online()
                || inner.connection_state == ConnectionState::Connecting
            {
                return Err(SessionError::AlreadyConnected);
            }
            let host = inner.host.host.clone().ok_or_else(|| {
                SessionError::InvalidArgument("no hostname configured".to_string())
            })?;

            inner.ssl.error = None;
            inner.ssl.crl = None;
            inner.ssl.state = if inner.host.secure {
                SslState::Negotiating
            } else {
                SslState::Unsecure
            };

            ConnectOptions {
                host,
                port: inner.host.port,
                timeout: inner.connect_timeout,
                keep_alive: inner.toggles.get(Toggle::KeepAlive),
                ssl_trace: inner.toggles.get(Toggle::SslTrace),
                crl_url: if inner.host.secure {
                    inner.ssl.crl_url.clone()
                } else {
                    None
                },
            }
        };

        self.set_connection_state(ConnectionState::Connecting);

        // Bind the taken module before matching on it: a scrutinee
        // temporary keeps the lock guard alive across the arms.
        let taken = self.inner.lock().network.take();
        let mut module = match taken {
            Some(module) => module,
            None => {
                self.set_connection_state(ConnectionState::NotConnected);
                return Err(SessionError::InvalidArgument(
                    "no network module bound".to_string(),
                ));
            }
        };

        let result = module.connect(&options);
        let crl = module.revocation_record();

        // A half-connect listener may have cancelled the attempt by
        // calling disconnect; in that case the connection is never
        // reported up, whatever the transport said.
        if self.connection_state() != ConnectionState::Connecting {
            module.disconnect();
            let mut inner = self.inner.lock();
            inner.network = Some(module);
            inner.ssl.state = SslState::Unsecure;
            inner.ssl.crl = None;
            drop(inner);
            debug!(host = %options.host, "connection attempt was cancelled");
            return Err(SessionError::NotConnected);
        }

        self.inner.lock().network = Some(module);

        match result {
            Ok(()) => {
                {
                    let mut inner = self.inner.lock();
                    inner.ssl.crl = crl;
                    inner.ssl.state = if inner.host.secure {
                        SslState::Secure
                    } else {
                        SslState::Unsecure
                    };
                }
                info!(host = %options.host, "connection established");
                self.set_connection_state(ConnectionState::ConnectedInitial);
                self.notify_ssl_state();
                Ok(())
            }
            Err(e) => {
                {
                    let mut inner = self.inner.lock();
                    if let SessionError::Security(message) = &e {
                        inner.ssl.error = Some(message.clone());
                        inner.ssl.state = SslState::Invalid;
                    }
                }
                self.set_connection_state(ConnectionState::NotConnected);
                self.notify_ssl_state();
                Err(e)
            }
        }
    }

    /// Drop the connection. Also cancels a connect in progress; safe to
    /// call from within a state-change listener.
    pub fn disconnect(&self) -> Result<()> {
        {
            let inner = self.inner.lock();
            if inner.connection_state == ConnectionState::NotConnected {
                return Err(SessionError::NotConnected);
            }
        }

        let module = self.inner.lock().network.take();
        if let Some(mut module) = module {
            module.disconnect();
            self.inner.lock().network = Some(module);
        }

        {
            let mut inner = self.inner.lock();
            inner.ssl.state = SslState::Unsecure;
            // Stale revocation data is never reused across reconnects.
            inner.ssl.crl = None;
        }

        self.set_connection_state(ConnectionState::NotConnected);
        Ok(())
    }

    /// The library reconnect routine: drop the current connection, then
    /// connect to the configured host again.
    pub fn reconnect(&self) -> Result<()> {
        if self.connection_state() != ConnectionState::NotConnected {
            self.disconnect()?;
        }
        if self.inner.lock().host.url.is_none() {
            return Err(SessionError::InvalidArgument(
                "no previous host to reconnect to".to_string(),
            ));
        }
        self.connect()
    }

    /// Transport-level loss notification: the peer went away without a
    /// local disconnect request. Drops the connection state and, when
    /// the reconnect toggle is on, immediately tries the host again.
    pub fn connection_lost(&self) {
        warn!("connection lost");
        let module = self.inner.lock().network.take();
        if let Some(mut module) = module {
            module.disconnect();
            self.inner.lock().network = Some(module);
        }
        {
            let mut inner = self.inner.lock();
            inner.ssl.state = SslState::Unsecure;
            inner.ssl.crl = None;
        }
        self.set_connection_state(ConnectionState::NotConnected);
        if self.toggle(Toggle::Reconnect) {
            if let Err(e) = self.connect() {
                warn!("automatic reconnect failed: {}", e);
            }
        }
    }

    /// Write raw data to the transport. Returns the number of bytes
    /// actually accepted.
    pub fn send(&self, data: &[u8]) -> Result<usize> {
        self.check_online()?;
        let trace = self.toggle(Toggle::NetworkTrace);
        let sent = {
            let mut inner = self.inner.lock();
            let module = inner.network.as_mut().ok_or(SessionError::NotConnected)?;
            module.send(data)?
        };
        if trace {
            self.write_trace(&format!("sent {} of {} bytes", sent, data.len()));
        }
        Ok(sent)
    }

    /// Read raw data from the transport into `buffer`.
    pub fn recv(&self, buffer: &mut [u8]) -> Result<usize> {
        self.check_online()?;
        let trace = self.toggle(Toggle::NetworkTrace);
        let received = {
            let mut inner = self.inner.lock();
            let module = inner.network.as_mut().ok_or(SessionError::NotConnected)?;
            module.recv(buffer)?
        };
        if trace {
            self.write_trace(&format!("received {} bytes", received));
        }
        Ok(received)
    }

    /// Signal that the host reported end of job, firing the matching
    /// listeners.
    pub fn notify_end_of_job(&self) {
        let callbacks =
            self.inner.lock().state_listeners[StateChange::EndOfJob as usize].snapshot();
        for callback in callbacks {
            callback(self, true);
        }
    }

    /// Advance the negotiated protocol mode. Transitions are monotone
    /// while online; only `disconnect` moves backwards.
    pub fn set_negotiated_mode(&self, state: ConnectionState) -> Result<()> {
        {
            let inner = self.inner.lock();
            if !inner.connection_state.is_online() {
                return Err(SessionError::NotConnected);
            }
            if !state.is_online() || state <= inner.connection_state {
                return Err(SessionError::InvalidArgument(format!(
                    "invalid protocol mode transition {:?} -> {:?}",
                    inner.connection_state, state
                )));
            }
        }
        self.set_connection_state(state);
        Ok(())
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.lock().connection_state
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state().is_online()
    }

    /// Fail with `NotConnected` unless the session is online.
    pub fn check_online(&self) -> Result<()> {
        if self.connection_state().is_online() {
            Ok(())
        } else {
            Err(SessionError::NotConnected)
        }
    }

    /// Fail with `AlreadyConnected` when the session is online.
    pub fn check_offline(&self) -> Result<()> {
        if self.connection_state().is_online() {
            Err(SessionError::AlreadyConnected)
        } else {
            Ok(())
        }
    }

    fn check_not_connecting(&self) -> Result<()> {
        if self.connection_state() == ConnectionState::Connecting {
            Err(SessionError::AlreadyConnected)
        } else {
            Ok(())
        }
    }

    /// Apply a state transition and fire the matching listener lists, in
    /// registration order, outside the session lock.
    fn set_connection_state(&self, new: ConnectionState) {
        let mut events: Vec<(bool, Vec<StateCallback>)> = Vec::new();
        let mut connect_cb = None;
        let mut trace_message = None;

        {
            let mut inner = self.inner.lock();
            let old = inner.connection_state;
            if old == new {
                return;
            }
            debug!(?old, ?new, "connection state change");
            if inner.toggles.get(Toggle::EventTrace) {
                trace_message = Some(format!("state change: {:?} -> {:?}", old, new));
            }
            inner.connection_state = new;

            let was_connecting = old == ConnectionState::Connecting;
            let is_connecting = new == ConnectionState::Connecting;
            if was_connecting != is_connecting {
                events.push((
                    is_connecting,
                    inner.state_listeners[StateChange::HalfConnect as usize].snapshot(),
                ));
            }

            if old.is_online() != new.is_online() {
                events.push((
                    new.is_online(),
                    inner.state_listeners[StateChange::Connect as usize].snapshot(),
                ));
                connect_cb = Some((inner.cbk.update_connect.clone(), new.is_online()));
            }

            let was_nvt = old == ConnectionState::ConnectedNvt;
            let is_nvt = new == ConnectionState::ConnectedNvt;
            if was_nvt != is_nvt {
                events.push((
                    is_nvt,
                    inner.state_listeners[StateChange::NvtMode as usize].snapshot(),
                ));
            }

            if old.is_3270() != new.is_3270() {
                events.push((
                    new.is_3270(),
                    inner.state_listeners[StateChange::Protocol3270Mode as usize].snapshot(),
                ));
            }
        }

        if let Some(message) = &trace_message {
            self.write_trace(message);
        }

        for (flag, callbacks) in events {
            for callback in callbacks {
                callback(self, flag);
            }
        }

        if let Some((callback, flag)) = connect_cb {
            callback(self, flag);
        }
    }

    // --- listeners --------------------------------------------------------

    /// Register a listener for one state-change event kind. Fires for
    /// every subsequent matching transition until removed.
    pub fn register_state_listener(
        &self,
        event: StateChange,
        callback: StateCallback,
    ) -> ListenerHandle {
        self.inner.lock().state_listeners[event as usize].add(callback)
    }

    /// Remove a listener by handle. Returns false for unknown handles.
    pub fn unregister_state_listener(&self, handle: ListenerHandle) -> bool {
        self.inner
            .lock()
            .state_listeners
            .iter_mut()
            .any(|list| list.remove(handle))
    }

    // --- toggles ----------------------------------------------------------

    pub fn toggle(&self, toggle: Toggle) -> bool {
        self.inner.lock().toggles.get(toggle)
    }

    pub fn set_toggle(&self, toggle: Toggle, value: bool) {
        let fired = self.inner.lock().toggles.set(toggle, value);
        if let Some(callbacks) = fired {
            for callback in callbacks {
                callback(self, toggle, value);
            }
        }
    }

    pub fn register_toggle_listener(
        &self,
        toggle: Toggle,
        callback: ToggleCallback,
    ) -> ListenerHandle {
        self.inner.lock().toggles.listen(toggle, callback)
    }

    pub fn unregister_toggle_listener(&self, handle: ListenerHandle) -> bool {
        self.inner.lock().toggles.unlisten(handle)
    }

    // --- capability table -------------------------------------------------

    /// Install a host capability table.
    ///
    /// The host declares the revision it was built against and the slot
    /// count of its table; a stale revision or a count mismatch rejects
    /// the install and the previous table stays fully in effect.
    pub fn install_callbacks(
        &self,
        revision: &str,
        slots: usize,
        table: SessionCallbacks,
    ) -> Result<()> {
        SessionCallbacks::check_install(revision, slots)?;
        self.inner.lock().cbk = table;
        Ok(())
    }

    /// Reinstall the default capability table.
    pub fn reset_callbacks(&self) {
        self.inner.lock().cbk = SessionCallbacks::default();
    }

    /// Ask the host to redraw the whole screen buffer.
    pub fn request_redraw(&self) {
        let (callback, length) = {
            let inner = self.inner.lock();
            (inner.cbk.update.clone(), screen_length_of(&inner) as usize)
        };
        callback(self, 0, length);
    }

    /// Surface a notification through the installed popup sink.
    pub fn popup(&self, notification: &PopupNotification) {
        let callback = self.inner.lock().cbk.popup.clone();
        callback(self, notification);
    }

    /// Write one line through the installed log sink.
    pub fn write_log(&self, module: &str, message: &str) {
        let callback = self.inner.lock().cbk.write_log.clone();
        callback(self, module, message);
    }

    /// Write through the installed trace sink.
    pub fn write_trace(&self, message: &str) {
        let callback = self.inner.lock().cbk.write_trace.clone();
        callback(self, message);
    }

    /// Dispatch a named host action through the capability table.
    pub fn action(&self, name: &str) -> Result<()> {
        let callback = self.inner.lock().cbk.action.clone();
        callback(self, name)
    }

    fn notify_ssl_state(&self) {
        let (callback, state) = {
            let inner = self.inner.lock();
            (inner.cbk.update_ssl.clone(), inner.ssl.state)
        };
        callback(self, state);
    }

    // --- print / save / load ----------------------------------------------

    pub fn print(&self, mode: ContentOption) -> Result<()> {
        self.check_online()?;
        if mode == ContentOption::Selected && !self.is_selected() {
            return Err(SessionError::NoData);
        }
        let callback = self.inner.lock().cbk.print.clone();
        callback(self, mode)
    }

    pub fn save(&self, mode: ContentOption, filename: &str) -> Result<()> {
        self.check_online()?;
        if mode == ContentOption::Selected && !self.is_selected() {
            return Err(SessionError::NoData);
        }
        let callback = self.inner.lock().cbk.save.clone();
        callback(self, mode, filename)
    }

    pub fn load(&self, filename: &str) -> Result<()> {
        self.check_online()?;
        let callback = self.inner.lock().cbk.load.clone();
        callback(self, filename)
    }

    // --- ssl / revocation -------------------------------------------------

    pub fn ssl_state(&self) -> SslState {
        self.inner.lock().ssl.state
    }

    /// Last TLS/revocation failure, if any.
    pub fn ssl_error(&self) -> Option<SslErrorMessage> {
        self.inner.lock().ssl.error.clone()
    }

    /// Revocation record of the current connection attempt.
    pub fn crl(&self) -> Option<CrlData> {
        self.inner.lock().ssl.crl.clone()
    }

    pub fn set_crl_url(&self, url: Option<String>) {
        self.inner.lock().ssl.crl_url = url;
    }

    pub fn crl_url(&self) -> Option<String> {
        self.inner.lock().ssl.crl_url.clone()
    }

    /// Fetch the revocation list from the configured source and bind it
    /// to this session. On any failure the record stays empty and the
    /// session's TLS error slot is set.
    #[cfg(feature = "crl-check")]
    pub fn fetch_revocation_list(&self) -> Result<()> {
        let (url, trace) = {
            let inner = self.inner.lock();
            (
                inner.ssl.crl_url.clone().unwrap_or_default(),
                inner.toggles.get(Toggle::SslTrace),
            )
        };

        match crate::ssl::crl::download(&url, trace) {
            Ok(crl) => {
                let mut inner = self.inner.lock();
                inner.ssl.crl = Some(crl);
                inner.ssl.error = None;
                Ok(())
            }
            Err(message) => {
                let mut inner = self.inner.lock();
                inner.ssl.crl = None;
                inner.ssl.error = Some(message.clone());
                Err(SessionError::Security(message))
            }
        }
    }

    /// Install this session's fetched CRL into the process trust store.
    #[cfg(feature = "crl-check")]
    pub fn apply_revocation_list(&self) -> Result<()> {
        let crl = self
            .crl()
            .ok_or_else(|| SessionError::Security(SslErrorMessage::new("No CRL was fetched")))?;
        crate::ssl::apply_crl(&crl)?;
        Ok(())
    }

    // --- keyboard ---------------------------------------------------------

    pub fn keyboard_lock(&self) -> KeyboardLock {
        self.inner.lock().kybdlock
    }

    /// Mutate the keyboard-lock overlay. Used by the built-in state
    /// listeners and by the data-stream decoder.
    pub fn update_keyboard_lock(&self, f: impl FnOnce(&mut KeyboardLock)) {
        let mut inner = self.inner.lock();
        f(&mut inner.kybdlock);
    }

    // --- tasks / readiness ------------------------------------------------

    pub fn task_started(&self) {
        self.inner.lock().tasks += 1;
    }

    pub fn task_finished(&self) {
        let mut inner = self.inner.lock();
        inner.tasks = inner.tasks.saturating_sub(1);
    }

    pub fn tasks(&self) -> u32 {
        self.inner.lock().tasks
    }

    /// Idle condition used by the grace-period property set: no tasks in
    /// flight, not mid-connect, and no pending keyboard unlock.
    pub fn is_ready(&self) -> bool {
        let inner = self.inner.lock();
        inner.tasks == 0
            && inner.connection_state != ConnectionState::Connecting
            && !inner.kybdlock.intersects(
                KeyboardLock::OIA_TWAIT
                    | KeyboardLock::OIA_LOCKED
                    | KeyboardLock::DEFERRED_UNLOCK,
            )
    }

    /// Bounded wait for the ready condition.
    pub fn wait_for_ready(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.is_ready() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(SessionError::Timeout);
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    // --- identity / user data ---------------------------------------------

    pub fn set_session_id(&self, id: char) {
        self.inner.lock().id = Some(id);
    }

    pub fn session_id(&self) -> Option<char> {
        self.inner.lock().id
    }

    /// Attach opaque host data to the session.
    pub fn set_user_data(&self, data: Arc<dyn Any + Send + Sync>) {
        self.inner.lock().user_data = Some(data);
    }

    pub fn user_data(&self) -> Option<Arc<dyn Any + Send + Sync>> {
        self.inner.lock().user_data.clone()
    }

    // --- properties -------------------------------------------------------

    pub fn cursor_address(&self) -> u32 {
        self.inner.lock().cursor_addr
    }

    /// Move the cursor. Requires an online session and an address inside
    /// the screen buffer.
    pub fn set_cursor_address(&self, address: u32) -> Result<()> {
        self.check_online()?;
        let callback = {
            let mut inner = self.inner.lock();
            let length = screen_length_of(&inner);
            if address >= length {
                return Err(SessionError::InvalidArgument(format!(
                    "cursor address {} out of range (length {})",
                    address, length
                )));
            }
            inner.cursor_addr = address;
            inner.cbk.update_cursor.clone()
        };
        let (row, col) = {
            let inner = self.inner.lock();
            let (_, cols) = model_geometry(inner.model_num);
            (
                (address / cols as u32) as u16,
                (address % cols as u32) as u16,
            )
        };
        callback(self, row, col);
        Ok(())
    }

    pub fn width(&self) -> u32 {
        let inner = self.inner.lock();
        model_geometry(inner.model_num).1 as u32
    }

    pub fn height(&self) -> u32 {
        let inner = self.inner.lock();
        model_geometry(inner.model_num).0 as u32
    }

    pub fn max_width(&self) -> u32 {
        self.width()
    }

    pub fn max_height(&self) -> u32 {
        self.height()
    }

    pub fn screen_length(&self) -> u32 {
        let inner = self.inner.lock();
        screen_length_of(&inner)
    }

    pub fn color_type(&self) -> u32 {
        self.inner.lock().colors
    }

    /// Set the color type (0, 8 or 16; 0 selects the default). Offline
    /// only.
    pub fn set_color_type(&self, colors: u32) -> Result<()> {
        self.check_offline()?;
        if !matches!(colors, 0 | 8 | 16) {
            return Err(SessionError::InvalidArgument(format!(
                "invalid color type {}",
                colors
            )));
        }
        let mut inner = self.inner.lock();
        inner.colors = if colors == 0 { 16 } else { colors };
        inner.m3279 = inner.colors == 16;
        Ok(())
    }

    pub fn model_number(&self) -> u32 {
        self.inner.lock().model_num as u32
    }

    /// Set the terminal model number (2-5). Offline only.
    pub fn set_model_number(&self, model: u32) -> Result<()> {
        self.check_offline()?;
        if !(2..=5).contains(&model) {
            return Err(SessionError::InvalidArgument(format!(
                "invalid model number {}",
                model
            )));
        }
        let callback = {
            let mut inner = self.inner.lock();
            inner.model_num = model as u8;
            inner.model_name = format!(
                "{}-{}{}",
                if inner.m3279 { "3279" } else { "3278" },
                model,
                if inner.extended { "-E" } else { "" }
            );
            inner.cbk.update_model.clone()
        };
        let (name, number, rows, cols) = {
            let inner = self.inner.lock();
            let (rows, cols) = model_geometry(inner.model_num);
            (inner.model_name.clone(), inner.model_num, rows, cols)
        };
        callback(self, &name, number, rows, cols);
        Ok(())
    }

    pub fn model_name(&self) -> String {
        self.inner.lock().model_name.clone()
    }

    pub fn host_type_number(&self) -> u32 {
        self.inner.lock().host_type
    }

    /// Set the host type number. Offline only.
    pub fn set_host_type_number(&self, host_type: u32) -> Result<()> {
        self.check_offline()?;
        self.inner.lock().host_type = host_type;
        Ok(())
    }

    pub fn unlock_delay(&self) -> u32 {
        self.inner.lock().unlock_delay_ms
    }

    /// Delay between the host unlocking the keyboard and the actual
    /// unlock, in milliseconds. Settable in any state.
    pub fn set_unlock_delay(&self, delay: u32) -> Result<()> {
        if delay > 10_000 {
            return Err(SessionError::InvalidArgument(format!(
                "unlock delay {} out of range",
                delay
            )));
        }
        self.inner.lock().unlock_delay_ms = delay;
        Ok(())
    }

    pub fn host_charset(&self) -> String {
        self.inner.lock().charset_host.clone()
    }

    pub fn set_host_charset(&self, charset: &str) {
        self.inner.lock().charset_host = charset.to_string();
    }

    pub fn set_selected(&self, selected: bool) {
        let callback = {
            let mut inner = self.inner.lock();
            if inner.selected == selected {
                return;
            }
            inner.selected = selected;
            inner.cbk.set_selection.clone()
        };
        callback(self, selected);
    }

    pub fn is_selected(&self) -> bool {
        self.inner.lock().selected
    }

    /// Stash data for a deferred paste.
    pub fn set_paste_buffer(&self, data: Option<Vec<u8>>) {
        self.inner.lock().paste_buffer = data;
    }

    pub fn take_paste_buffer(&self) -> Option<Vec<u8>> {
        self.inner.lock().paste_buffer.take()
    }
}

fn screen_length_of(state: &SessionState) -> u32 {
    let (rows, cols) = model_geometry(state.model_num);
    rows as u32 * cols as u32
}

/// Built-in listener keeping the keyboard lock in step with the
/// connection: locked while offline, waiting for the first host write
/// after a connect.
fn kybd_connect(session: &Session, connected: bool) {
    session.update_keyboard_lock(|lock| {
        if connected {
            lock.remove(KeyboardLock::NOT_CONNECTED);
            lock.insert(KeyboardLock::AWAITING_FIRST);
        } else {
            *lock = KeyboardLock::NOT_CONNECTED;
        }
    });
}

/// Built-in listener unlocking the keyboard once 3270 mode is entered.
fn kybd_in3270(session: &Session, in3270: bool) {
    if in3270 {
        session.update_keyboard_lock(|lock| {
            lock.remove(KeyboardLock::AWAITING_FIRST);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::properties::{get_uint_property, set_uint_property};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Network module that records the calls it receives.
    struct MockModule {
        log: Arc<Mutex<Vec<&'static str>>>,
        finalized: Arc<AtomicUsize>,
        connected: bool,
        fail_connect: bool,
    }

    impl MockModule {
        fn new() -> (Self, Arc<Mutex<Vec<&'static str>>>, Arc<AtomicUsize>) {
            let log = Arc::new(Mutex::new(Vec::new()));
            let finalized = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    log: log.clone(),
                    finalized: finalized.clone(),
                    connected: false,
                    fail_connect: false,
                },
                log,
                finalized,
            )
        }
    }

    impl NetworkModule for MockModule {
        fn name(&self) -> &'static str {
            "mock"
        }

        fn connect(&mut self, _options: &ConnectOptions) -> Result<()> {
            self.log.lock().push("connect");
            if self.fail_connect {
                return Err(SessionError::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "refused",
                )));
            }
            self.connected = true;
            Ok(())
        }

        fn disconnect(&mut self) {
            self.log.lock().push("disconnect");
            self.connected = false;
        }

        fn is_connected(&self) -> bool {
            self.connected
        }

        fn send(&mut self, data: &[u8]) -> Result<usize> {
            Ok(data.len())
        }

        fn recv(&mut self, _buffer: &mut [u8]) -> Result<usize> {
            Ok(0)
        }

        fn finalize(&mut self) -> Result<()> {
            self.log.lock().push("finalize");
            self.finalized.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_new_session_defaults() {
        let _guard = crate::test_lock();
        let session = Session::new("3278-4-E");
        assert_eq!(session.connection_state(), ConnectionState::NotConnected);
        assert_eq!(session.model_number(), 4);
        assert_eq!(session.unlock_delay(), 350);
        assert_eq!(session.host_charset(), "bracket");
        assert!(session
            .keyboard_lock()
            .contains(KeyboardLock::NOT_CONNECTED));
        session.destroy();
    }

    #[test]
    fn test_model_parsing() {
        assert_eq!(parse_model("3278-4-E"), (4, false, true));
        assert_eq!(parse_model("3279-2"), (2, true, false));
        assert_eq!(parse_model("4"), (4, true, false));
        assert_eq!(parse_model(""), (2, true, true));
        assert_eq!(parse_model("3279-9"), (2, true, false));
    }

    #[test]
    fn test_default_session_claim_and_release() {
        let _guard = crate::test_lock();
        Session::reset_default_session();

        let first = Session::new("");
        let second = Session::new("");
        let default = Session::get_default();
        assert!(Arc::ptr_eq(&default.inner, &first.inner));

        // Destroying a non-default session leaves the slot alone.
        second.destroy();
        assert!(DEFAULT_SESSION.lock().is_some());

        first.destroy();
        assert!(DEFAULT_SESSION.lock().is_none());

        // Lazily recreated on demand.
        let recreated = Session::get_default();
        assert!(DEFAULT_SESSION.lock().is_some());
        recreated.destroy();
    }

    #[test]
    fn test_destroy_is_idempotent_and_finalizes_once() {
        let _guard = crate::test_lock();
        let session = Session::new("");
        let (module, log, finalized) = MockModule::new();
        session.set_network_module(Box::new(module)).unwrap();

        session.destroy();
        session.destroy();

        assert_eq!(finalized.load(Ordering::SeqCst), 1);
        assert_eq!(log.lock().as_slice(), ["finalize"]);
    }

    #[test]
    fn test_destroy_while_connected_disconnects_first() {
        let _guard = crate::test_lock();
        let session = Session::new("");
        session.set_url("tn3270://host.example").unwrap();
        let (module, log, finalized) = MockModule::new();
        session.set_network_module(Box::new(module)).unwrap();
        session.connect().unwrap();
        assert!(session.is_connected());

        session.destroy();

        assert_eq!(session.connection_state(), ConnectionState::NotConnected);
        assert_eq!(finalized.load(Ordering::SeqCst), 1);
        assert_eq!(log.lock().as_slice(), ["connect", "disconnect", "finalize"]);
    }

    #[test]
    fn test_destroy_mid_connect_cancels() {
        let _guard = crate::test_lock();
        let session = Session::new("");
        let (module, _log, finalized) = MockModule::new();
        session.set_network_module(Box::new(module)).unwrap();
        session.set_connection_state(ConnectionState::Connecting);

        session.destroy();

        assert_eq!(session.connection_state(), ConnectionState::NotConnected);
        assert_eq!(finalized.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_connect_requires_host() {
        let _guard = crate::test_lock();
        let session = Session::new("");
        assert!(matches!(
            session.connect(),
            Err(SessionError::InvalidArgument(_))
        ));
        session.destroy();
    }

    #[test]
    fn test_connect_failure_resets_state() {
        let _guard = crate::test_lock();
        let session = Session::new("");
        session.set_url("tn3270://host.example").unwrap();
        let (mut module, _log, _finalized) = MockModule::new();
        module.fail_connect = true;
        session.set_network_module(Box::new(module)).unwrap();

        assert!(session.connect().is_err());
        assert_eq!(session.connection_state(), ConnectionState::NotConnected);
        session.destroy();
    }

    #[test]
    fn test_state_listener_order_and_removal() {
        let _guard = crate::test_lock();
        let session = Session::new("");
        let order = Arc::new(Mutex::new(Vec::new()));

        let o = order.clone();
        session.register_state_listener(
            StateChange::Connect,
            Arc::new(move |_, up| o.lock().push(("first", up))),
        );
        let o = order.clone();
        let second = session.register_state_listener(
            StateChange::Connect,
            Arc::new(move |_, up| o.lock().push(("second", up))),
        );
        let o = order.clone();
        session.register_state_listener(
            StateChange::Connect,
            Arc::new(move |_, up| o.lock().push(("first", up))),
        );

        session.set_connection_state(ConnectionState::ConnectedInitial);
        assert_eq!(
            order.lock().as_slice(),
            [("first", true), ("second", true), ("first", true)]
        );

        order.lock().clear();
        assert!(session.unregister_state_listener(second));
        session.set_connection_state(ConnectionState::NotConnected);
        assert_eq!(
            order.lock().as_slice(),
            [("first", false), ("first", false)]
        );
        session.destroy();
    }

    #[test]
    fn test_reentrant_disconnect_from_listener() {
        let _guard = crate::test_lock();
        let session = Session::new("");
        session.set_url("tn3270://host.example").unwrap();
        let (module, _log, _finalized) = MockModule::new();
        session.set_network_module(Box::new(module)).unwrap();

        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = cancelled.clone();
        session.register_state_listener(
            StateChange::Connect,
            Arc::new(move |s, connected| {
                if connected && !flag.swap(true, Ordering::SeqCst) {
                    // Cancel the connection from inside the notification.
                    let _ = s.disconnect();
                }
            }),
        );

        let _ = session.connect();
        assert_eq!(session.connection_state(), ConnectionState::NotConnected);
        session.destroy();
    }

    #[test]
    fn test_half_connect_listener_can_cancel() {
        let _guard = crate::test_lock();
        let session = Session::new("");
        session.set_url("tn3270://host.example").unwrap();
        let (module, log, _finalized) = MockModule::new();
        session.set_network_module(Box::new(module)).unwrap();

        session.register_state_listener(
            StateChange::HalfConnect,
            Arc::new(|s, starting| {
                if starting {
                    let _ = s.disconnect();
                }
            }),
        );

        assert!(matches!(session.connect(), Err(SessionError::NotConnected)));
        assert_eq!(session.connection_state(), ConnectionState::NotConnected);
        assert_eq!(session.ssl_state(), SslState::Unsecure);
        // The transport was torn down again even though its own connect
        // succeeded after the cancellation.
        assert_eq!(
            log.lock().as_slice(),
            ["disconnect", "connect", "disconnect"]
        );
        session.destroy();
    }

    #[test]
    fn test_connect_without_module_fails_fast() {
        let _guard = crate::test_lock();
        let session = Session::new("");
        session.set_url("tn3270://host.example").unwrap();
        session.inner.lock().network = None;

        assert!(matches!(
            session.connect(),
            Err(SessionError::InvalidArgument(_))
        ));
        assert_eq!(session.connection_state(), ConnectionState::NotConnected);
        session.destroy();
    }

    #[test]
    fn test_connection_lost_honors_reconnect_toggle() {
        let _guard = crate::test_lock();
        let session = Session::new("");
        session.set_url("tn3270://host.example").unwrap();
        let (module, log, _finalized) = MockModule::new();
        session.set_network_module(Box::new(module)).unwrap();
        session.connect().unwrap();

        session.connection_lost();
        assert_eq!(session.connection_state(), ConnectionState::NotConnected);
        assert_eq!(log.lock().as_slice(), ["connect", "disconnect"]);

        session.connect().unwrap();
        session.set_toggle(Toggle::Reconnect, true);
        session.connection_lost();
        assert_eq!(
            session.connection_state(),
            ConnectionState::ConnectedInitial
        );
        assert_eq!(
            log.lock().as_slice(),
            ["connect", "disconnect", "connect", "disconnect", "connect"]
        );
        session.destroy();
    }

    #[test]
    fn test_send_and_recv_require_online() {
        let _guard = crate::test_lock();
        let session = Session::new("");
        session.set_url("tn3270://host.example").unwrap();
        let (module, _log, _finalized) = MockModule::new();
        session.set_network_module(Box::new(module)).unwrap();

        let mut buffer = [0u8; 16];
        assert!(matches!(
            session.send(b"abc"),
            Err(SessionError::NotConnected)
        ));
        assert!(matches!(
            session.recv(&mut buffer),
            Err(SessionError::NotConnected)
        ));

        session.connect().unwrap();
        session.set_toggle(Toggle::NetworkTrace, true);
        assert_eq!(session.send(b"abc").unwrap(), 3);
        assert_eq!(session.recv(&mut buffer).unwrap(), 0);
        session.destroy();
    }

    #[test]
    fn test_end_of_job_listeners_fire() {
        let _guard = crate::test_lock();
        let session = Session::new("");
        let hits = Arc::new(AtomicUsize::new(0));
        let count = hits.clone();
        session.register_state_listener(
            StateChange::EndOfJob,
            Arc::new(move |_, _| {
                count.fetch_add(1, Ordering::SeqCst);
            }),
        );

        session.notify_end_of_job();
        session.notify_end_of_job();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        session.destroy();
    }

    #[test]
    fn test_callback_install_atomicity() {
        let _guard = crate::test_lock();
        let session = Session::new("");
        let hits = Arc::new(AtomicUsize::new(0));

        let mut table = SessionCallbacks::default();
        let counter = hits.clone();
        table.update_status = Arc::new(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        // Wrong slot count: rejected, default table stays callable.
        assert!(session
            .install_callbacks("20211118", SessionCallbacks::SLOT_COUNT + 1, table.clone())
            .is_err());
        let status = session.inner.lock().cbk.update_status.clone();
        status(&session, "ignored");
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        // Stale revision: same.
        assert!(session
            .install_callbacks("20111118", SessionCallbacks::SLOT_COUNT, table.clone())
            .is_err());
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        // Valid install replaces the slots.
        session
            .install_callbacks("20211118", SessionCallbacks::SLOT_COUNT, table)
            .unwrap();
        let status = session.inner.lock().cbk.update_status.clone();
        status(&session, "counted");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        session.destroy();
    }

    #[test]
    fn test_default_action_slot_reports_not_found() {
        let _guard = crate::test_lock();
        let session = Session::new("");
        assert!(matches!(
            session.action("no-such-action"),
            Err(SessionError::NotFound(_))
        ));
        session.destroy();
    }

    #[test]
    fn test_default_print_is_unsupported_and_pops_up() {
        let _guard = crate::test_lock();
        let session = Session::new("");
        session.set_url("tn3270://host.example").unwrap();
        let (module, _log, _finalized) = MockModule::new();
        session.set_network_module(Box::new(module)).unwrap();
        session.connect().unwrap();

        let popped = Arc::new(AtomicUsize::new(0));
        let mut table = SessionCallbacks::default();
        let counter = popped.clone();
        table.popup = Arc::new(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        session
            .install_callbacks("20211118", SessionCallbacks::SLOT_COUNT, table)
            .unwrap();

        assert!(matches!(
            session.print(ContentOption::All),
            Err(SessionError::Unsupported(_))
        ));
        assert_eq!(popped.load(Ordering::SeqCst), 1);

        // Print while offline fails before reaching the slot.
        session.disconnect().unwrap();
        assert!(matches!(
            session.print(ContentOption::All),
            Err(SessionError::NotConnected)
        ));
        session.destroy();
    }

    #[test]
    fn test_property_round_trip() {
        let _guard = crate::test_lock();
        let session = Session::new("");
        let before = get_uint_property(&session, "unlock_delay").unwrap();
        set_uint_property(&session, "unlock_delay", before + 50, None).unwrap();
        assert_eq!(
            get_uint_property(&session, "unlock_delay").unwrap(),
            before + 50
        );

        assert!(matches!(
            set_uint_property(&session, "no_such_property", 1, None),
            Err(SessionError::NoSuchProperty(_))
        ));
        assert!(matches!(
            set_uint_property(&session, "kybdlock", 0, None),
            Err(SessionError::NotAllowed(_))
        ));
        session.destroy();
    }

    #[test]
    fn test_offline_only_property_gating() {
        let _guard = crate::test_lock();
        let session = Session::new("");
        session.set_url("tn3270://host.example").unwrap();
        let (module, _log, _finalized) = MockModule::new();
        session.set_network_module(Box::new(module)).unwrap();
        session.connect().unwrap();

        let before = get_uint_property(&session, "model_number").unwrap();
        assert!(matches!(
            set_uint_property(&session, "model_number", 5, None),
            Err(SessionError::AlreadyConnected)
        ));
        assert_eq!(get_uint_property(&session, "model_number").unwrap(), before);

        session.disconnect().unwrap();
        set_uint_property(&session, "model_number", 5, None).unwrap();
        assert_eq!(get_uint_property(&session, "model_number").unwrap(), 5);
        assert_eq!(session.width(), 132);
        session.destroy();
    }

    #[test]
    fn test_setter_rejects_out_of_domain_values() {
        let _guard = crate::test_lock();
        let session = Session::new("");
        assert!(session.set_model_number(7).is_err());
        assert!(session.set_color_type(12).is_err());
        assert!(session.set_unlock_delay(60_000).is_err());
        session.destroy();
    }

    #[test]
    fn test_keyboard_lock_follows_connection() {
        let _guard = crate::test_lock();
        let session = Session::new("");
        session.set_url("tn3270://host.example").unwrap();
        let (module, _log, _finalized) = MockModule::new();
        session.set_network_module(Box::new(module)).unwrap();

        assert!(session
            .keyboard_lock()
            .contains(KeyboardLock::NOT_CONNECTED));

        session.connect().unwrap();
        let lock = session.keyboard_lock();
        assert!(!lock.contains(KeyboardLock::NOT_CONNECTED));
        assert!(lock.contains(KeyboardLock::AWAITING_FIRST));

        session
            .set_negotiated_mode(ConnectionState::Connected3270)
            .unwrap();
        assert!(!session
            .keyboard_lock()
            .contains(KeyboardLock::AWAITING_FIRST));

        // Exposed read-only through the registry.
        session.disconnect().unwrap();
        assert_eq!(
            get_uint_property(&session, "kybdlock").unwrap(),
            KeyboardLock::NOT_CONNECTED.bits()
        );
        session.destroy();
    }

    #[test]
    fn test_negotiated_mode_is_monotone() {
        let _guard = crate::test_lock();
        let session = Session::new("");
        session.set_url("tn3270://host.example").unwrap();
        let (module, _log, _finalized) = MockModule::new();
        session.set_network_module(Box::new(module)).unwrap();

        assert!(matches!(
            session.set_negotiated_mode(ConnectionState::Connected3270),
            Err(SessionError::NotConnected)
        ));

        session.connect().unwrap();
        session
            .set_negotiated_mode(ConnectionState::Connected3270)
            .unwrap();
        assert!(session
            .set_negotiated_mode(ConnectionState::ConnectedInitial)
            .is_err());
        session.destroy();
    }

    #[test]
    fn test_grace_period_waits_for_tasks() {
        let _guard = crate::test_lock();
        let session = Session::new("");
        session.task_started();

        let err = set_uint_property(
            &session,
            "unlock_delay",
            100,
            Some(Duration::from_millis(50)),
        )
        .unwrap_err();
        assert!(matches!(err, SessionError::Timeout));

        session.task_finished();
        set_uint_property(
            &session,
            "unlock_delay",
            100,
            Some(Duration::from_millis(50)),
        )
        .unwrap();
        session.destroy();
    }

    #[test]
    fn test_set_url_selects_module() {
        let _guard = crate::test_lock();
        let session = Session::new("");
        session.set_url("tn3270://host.example").unwrap();
        assert_eq!(session.network_module_name(), Some("tcp"));

        session.set_url("tn3270s://host.example").unwrap();
        assert_eq!(session.network_module_name(), Some("tls"));

        assert!(session.set_url("ftp://host.example").is_err());
        assert!(session.set_url("not a url").is_err());
        session.destroy();
    }

    #[test]
    fn test_user_data_and_session_id() {
        let _guard = crate::test_lock();
        let session = Session::new("");
        assert!(session.session_id().is_none());
        session.set_session_id('A');
        assert_eq!(session.session_id(), Some('A'));

        session.set_user_data(Arc::new(42u32));
        let data = session.user_data().unwrap();
        assert_eq!(*data.downcast_ref::<u32>().unwrap(), 42);
        session.destroy();
    }

    #[test]
    fn test_toggle_listeners_fire_on_change() {
        let _guard = crate::test_lock();
        let session = Session::new("");
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        session.register_toggle_listener(
            Toggle::SslTrace,
            Arc::new(move |_, _, _| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        session.set_toggle(Toggle::SslTrace, true);
        session.set_toggle(Toggle::SslTrace, true);
        session.set_toggle(Toggle::SslTrace, false);
        assert_eq!(fired.load(Ordering::SeqCst), 2);
        session.destroy();
    }

    #[cfg(feature = "crl-check")]
    #[test]
    fn test_missing_crl_file_fails_closed() {
        let _guard = crate::test_lock();
        let session = Session::new("");
        session.set_crl_url(Some("file:///tmp/missing.crl".to_string()));

        assert!(session.fetch_revocation_list().is_err());
        assert!(session.crl().is_none());
        let error = session.ssl_error().unwrap();
        assert_eq!(error.text, "Can't open CRL File");
        session.destroy();
    }

    #[cfg(feature = "crl-check")]
    #[test]
    fn test_fetched_crl_is_bound_to_session() {
        let _guard = crate::test_lock();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("host.crl");
        std::fs::write(&path, [0x30, 0x03, 0x02, 0x01, 0x00]).unwrap();

        let session = Session::new("");
        session.set_crl_url(Some(format!("file://{}", path.display())));

        session.fetch_revocation_list().unwrap();
        let crl = session.crl().unwrap();
        assert!(crl.url.ends_with("host.crl"));
        assert!(session.ssl_error().is_none());

        // The record does not survive a disconnect.
        session.set_url("tn3270://host.example").unwrap();
        let (module, _log, _finalized) = MockModule::new();
        session.set_network_module(Box::new(module)).unwrap();
        session.connect().unwrap();
        session.disconnect().unwrap();
        assert!(session.crl().is_none());
        session.destroy();
    }
}
