//! Session toggles
//!
//! Boolean switches a host can flip at runtime, each with its own
//! listener list. Only the toggles the session core itself consults are
//! kept here; screen-rendering toggles belong to the front-end.

use crate::core::listeners::{ListenerHandle, ListenerList};

/// Runtime toggles consulted by the session core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    /// Trace TLS negotiation and CRL downloads
    SslTrace,
    /// Trace network reads and writes
    NetworkTrace,
    /// Trace state-machine events
    EventTrace,
    /// Automatically reconnect after a host disconnect
    Reconnect,
    /// Enable TCP keep-alive on the transport
    KeepAlive,
}

impl Toggle {
    pub const COUNT: usize = 5;

    pub fn index(self) -> usize {
        self as usize
    }
}

pub type ToggleCallback = std::sync::Arc<dyn Fn(&crate::Session, Toggle, bool) + Send + Sync>;

/// Toggle values plus per-toggle listener lists.
pub struct Toggles {
    values: [bool; Toggle::COUNT],
    listeners: [ListenerList<ToggleCallback>; Toggle::COUNT],
}

impl Default for Toggles {
    fn default() -> Self {
        let mut toggles = Self {
            values: [false; Toggle::COUNT],
            listeners: Default::default(),
        };
        // KeepAlive is on by default; everything else starts off.
        toggles.values[Toggle::KeepAlive.index()] = true;
        toggles
    }
}

impl Toggles {
    pub fn get(&self, toggle: Toggle) -> bool {
        self.values[toggle.index()]
    }

    /// Set a toggle value. Returns the listener snapshot to fire when the
    /// value actually changed, so the caller can invoke it lock-free.
    pub fn set(&mut self, toggle: Toggle, value: bool) -> Option<Vec<ToggleCallback>> {
        if self.values[toggle.index()] == value {
            return None;
        }
        self.values[toggle.index()] = value;
        Some(self.listeners[toggle.index()].snapshot())
    }

    pub fn listen(&mut self, toggle: Toggle, callback: ToggleCallback) -> ListenerHandle {
        self.listeners[toggle.index()].add(callback)
    }

    pub fn unlisten(&mut self, handle: ListenerHandle) -> bool {
        self.listeners.iter_mut().any(|list| list.remove(handle))
    }

    /// Drop every listener list. Called once during session teardown.
    pub fn shutdown(&mut self) {
        for list in &mut self.listeners {
            list.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let toggles = Toggles::default();
        assert!(toggles.get(Toggle::KeepAlive));
        assert!(!toggles.get(Toggle::SslTrace));
    }

    #[test]
    fn test_set_reports_change_only() {
        let mut toggles = Toggles::default();
        assert!(toggles.set(Toggle::SslTrace, true).is_some());
        assert!(toggles.set(Toggle::SslTrace, true).is_none());
        assert!(toggles.set(Toggle::SslTrace, false).is_some());
    }
}
