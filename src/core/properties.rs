//! Typed property registry
//!
//! A static catalog of named unsigned-integer session attributes with
//! bounds, defaults and access-gating metadata. Front-ends bind their
//! settings UI against the descriptors; scripted hosts go through
//! [`set_uint_property`] / [`get_uint_property`].
//!
//! Bounds are advisory metadata for the host side: the registry does not
//! clamp, each setter rejects out-of-domain values itself. Likewise the
//! offline-only gate lives in the individual setters, not in the
//! dispatcher, because some properties are settable in any state.

use std::time::Duration;

use crate::core::session::Session;
use crate::error::{Result, SessionError};

/// Access gating group of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionGroup {
    /// Settable in any connection state
    None,
    /// Requires an online session
    Online,
    /// Only settable while offline
    Offline,
}

/// Descriptor of one unsigned-integer property.
#[derive(Debug)]
pub struct UintProperty {
    /// Unique name, matched case-insensitively
    pub name: &'static str,
    /// Human-readable description
    pub description: &'static str,
    /// Short UI label
    pub label: Option<&'static str>,
    /// Icon name for UI binding
    pub icon: Option<&'static str>,
    /// Access gating group
    pub group: ActionGroup,
    /// Advisory lower bound
    pub min: u32,
    /// Advisory upper bound (0 = unbounded)
    pub max: u32,
    /// Default value applied at session creation
    pub default_value: u32,
    pub get: fn(&Session) -> u32,
    /// None makes the property read-only
    pub set: Option<fn(&Session, u32) -> Result<()>>,
}

impl UintProperty {
    pub fn is_writable(&self) -> bool {
        self.set.is_some()
    }
}

fn get_kybdlock(session: &Session) -> u32 {
    session.keyboard_lock().bits()
}

static UNSIGNED_PROPERTIES: &[UintProperty] = &[
    UintProperty {
        name: "cursor_address",
        description: "Cursor address",
        label: Some("Cursor"),
        icon: None,
        group: ActionGroup::Online,
        min: 0,
        max: 0,
        default_value: 0,
        get: Session::cursor_address,
        set: Some(Session::set_cursor_address),
    },
    UintProperty {
        name: "width",
        description: "Current screen width in columns",
        label: Some("Width"),
        icon: None,
        group: ActionGroup::None,
        min: 0,
        max: 0,
        default_value: 0,
        get: Session::width,
        set: None,
    },
    UintProperty {
        name: "height",
        description: "Current screen height in rows",
        label: Some("Height"),
        icon: None,
        group: ActionGroup::None,
        min: 0,
        max: 0,
        default_value: 0,
        get: Session::height,
        set: None,
    },
    UintProperty {
        name: "max_width",
        description: "Maximum screen width in columns",
        label: None,
        icon: None,
        group: ActionGroup::None,
        min: 0,
        max: 0,
        default_value: 0,
        get: Session::max_width,
        set: None,
    },
    UintProperty {
        name: "max_height",
        description: "Maximum screen height in rows",
        label: None,
        icon: None,
        group: ActionGroup::None,
        min: 0,
        max: 0,
        default_value: 0,
        get: Session::max_height,
        set: None,
    },
    UintProperty {
        name: "length",
        description: "Screen buffer length in bytes",
        label: None,
        icon: None,
        group: ActionGroup::None,
        min: 0,
        max: 0,
        default_value: 0,
        get: Session::screen_length,
        set: None,
    },
    UintProperty {
        name: "color_type",
        description: "Color type of the terminal (0 for default)",
        label: Some("Colors"),
        icon: None,
        group: ActionGroup::Offline,
        min: 0,
        max: 16,
        default_value: 16,
        get: Session::color_type,
        set: Some(Session::set_color_type),
    },
    UintProperty {
        name: "model_number",
        description: "The model number of the terminal",
        label: Some("Model"),
        icon: Some("computer"),
        group: ActionGroup::Offline,
        min: 2,
        max: 5,
        default_value: 2,
        get: Session::model_number,
        set: Some(Session::set_model_number),
    },
    UintProperty {
        name: "host_type_number",
        description: "The host type number",
        label: Some("Host type"),
        icon: None,
        group: ActionGroup::Offline,
        min: 0,
        max: 0,
        default_value: 0,
        get: Session::host_type_number,
        set: Some(Session::set_host_type_number),
    },
    UintProperty {
        name: "unlock_delay",
        description: "The delay between the host unlocking the keyboard and the actual unlock",
        label: Some("Unlock delay"),
        icon: None,
        group: ActionGroup::None,
        min: 0,
        max: 10000,
        default_value: 350,
        get: Session::unlock_delay,
        set: Some(Session::set_unlock_delay),
    },
    UintProperty {
        name: "kybdlock",
        description: "Keyboard lock status",
        label: Some("Keyboard lock"),
        icon: None,
        group: ActionGroup::None,
        min: 0,
        max: 0,
        default_value: 0,
        get: get_kybdlock,
        set: None,
    },
];

/// The live registry of unsigned-integer properties.
pub fn unsigned_properties() -> &'static [UintProperty] {
    UNSIGNED_PROPERTIES
}

/// Case-insensitive lookup.
pub fn get_by_name(name: &str) -> Result<&'static UintProperty> {
    UNSIGNED_PROPERTIES
        .iter()
        .find(|p| p.name.eq_ignore_ascii_case(name))
        .ok_or_else(|| SessionError::NoSuchProperty(name.to_string()))
}

/// Read a property by name.
pub fn get_uint_property(session: &Session, name: &str) -> Result<u32> {
    let property = get_by_name(name)?;
    Ok((property.get)(session))
}

/// Write a property by name.
///
/// With a non-zero grace period the call first blocks until the session
/// reaches a ready state or the period elapses. The property's own setter
/// may still reject the value (bounds, connected-state guard).
pub fn set_uint_property(
    session: &Session,
    name: &str,
    value: u32,
    grace_period: Option<Duration>,
) -> Result<()> {
    if let Some(timeout) = grace_period {
        session.wait_for_ready(timeout)?;
    }

    let property = get_by_name(name)?;

    match property.set {
        Some(set) => set(session, value),
        None => Err(SessionError::NotAllowed(property.name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        assert_eq!(get_by_name("Model_Number").unwrap().name, "model_number");
        assert_eq!(get_by_name("KYBDLOCK").unwrap().name, "kybdlock");
    }

    #[test]
    fn test_unknown_name_fails() {
        let err = get_by_name("no_such_thing").unwrap_err();
        assert!(matches!(err, SessionError::NoSuchProperty(_)));
    }

    #[test]
    fn test_names_are_unique() {
        let props = unsigned_properties();
        for (i, a) in props.iter().enumerate() {
            for b in &props[i + 1..] {
                assert!(!a.name.eq_ignore_ascii_case(b.name), "duplicate {}", a.name);
            }
        }
    }

    #[test]
    fn test_offline_group_entries_are_writable() {
        for p in unsigned_properties() {
            if matches!(p.group, ActionGroup::Offline) {
                assert!(p.is_writable(), "{} should have a setter", p.name);
            }
        }
    }
}
