//! Connection and keyboard state machines
//!
//! The connection state is ordered: everything at or above
//! [`ConnectionState::ConnectedInitial`] counts as online. The keyboard
//! lock is a parallel overlay of reasons the keyboard is currently
//! refusing input; it starts locked because the session starts offline.

use bitflags::bitflags;

/// Connection state of a session.
///
/// The ordering is part of the contract: guard predicates compare states,
/// so variants must stay sorted from fully offline to fully negotiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConnectionState {
    /// Disconnected
    NotConnected,
    /// Connection attempt in progress
    Connecting,
    /// Transport is up, protocol negotiation not finished
    ConnectedInitial,
    /// Connected in NVT (line) mode
    ConnectedNvt,
    /// Negotiating TN3270E
    ConnectedInitial3270e,
    /// Connected in SSCP-LU mode
    ConnectedSscp,
    /// Connected in classic 3270 mode
    Connected3270,
    /// Fully negotiated TN3270E mode
    ConnectedTn3270e,
}

impl ConnectionState {
    /// Transport is up and the peer answered.
    pub fn is_online(self) -> bool {
        self >= ConnectionState::ConnectedInitial
    }

    /// Some flavor of 3270 protocol mode has been negotiated.
    pub fn is_3270(self) -> bool {
        matches!(
            self,
            ConnectionState::Connected3270 | ConnectionState::ConnectedTn3270e
        )
    }
}

/// Events a state-change listener can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateChange {
    /// Connection established or dropped
    Connect,
    /// Entered or left 3270 protocol mode
    Protocol3270Mode,
    /// Entered or left NVT mode
    NvtMode,
    /// Connection attempt started or resolved
    HalfConnect,
    /// Remote host signalled end of job
    EndOfJob,
}

impl StateChange {
    /// All event kinds, in listener-table order.
    pub const ALL: [StateChange; 5] = [
        StateChange::Connect,
        StateChange::Protocol3270Mode,
        StateChange::NvtMode,
        StateChange::HalfConnect,
        StateChange::EndOfJob,
    ];
}

bitflags! {
    /// Reasons the keyboard is currently locked.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct KeyboardLock: u32 {
        /// Operator error lock
        const OERR_MASK       = 0x000f;
        /// Operator input area TWAIT
        const OIA_TWAIT       = 0x0010;
        /// Operator input area LOCKED
        const OIA_LOCKED      = 0x0020;
        /// Deferred keyboard unlock pending
        const DEFERRED_UNLOCK = 0x0040;
        /// Session is enabling
        const ENTER_INHIBIT   = 0x0080;
        /// Scrolled back in history
        const SCROLLED        = 0x0100;
        /// Waiting for the first host write
        const AWAITING_FIRST  = 0x0200;
        /// Session is not connected
        const NOT_CONNECTED   = 0x0400;
    }
}

impl KeyboardLock {
    pub fn is_locked(self) -> bool {
        !self.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_ordering() {
        assert!(!ConnectionState::NotConnected.is_online());
        assert!(!ConnectionState::Connecting.is_online());
        assert!(ConnectionState::ConnectedInitial.is_online());
        assert!(ConnectionState::ConnectedTn3270e.is_online());
        assert!(ConnectionState::Connecting > ConnectionState::NotConnected);
    }

    #[test]
    fn test_keyboard_lock_flags() {
        let mut lock = KeyboardLock::NOT_CONNECTED;
        assert!(lock.is_locked());
        lock.remove(KeyboardLock::NOT_CONNECTED);
        assert!(!lock.is_locked());
        lock.insert(KeyboardLock::AWAITING_FIRST | KeyboardLock::OIA_TWAIT);
        assert!(lock.contains(KeyboardLock::AWAITING_FIRST));
    }
}
