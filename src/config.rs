//! Protocol defaults configuration
//!
//! Optional `protocol.toml`, resolved through the standard data-file
//! probing. Host deployments use it to pin defaults for the offline
//! property group and to configure revocation checking, so every session
//! created in the process starts from the site's settings instead of the
//! built-in ones.
//!
//! ```toml
//! # protocol.toml
//! crl_url = "http://crl.example.com/root.crl"
//!
//! [defaults]
//! model_number = 4
//! color_type = 8
//! unlock_delay = 250
//! ```

use std::fs;
use std::path::PathBuf;

use serde::Deserialize;
use tracing::debug;

use crate::util;

/// Site-wide protocol defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProtocolDefaults {
    /// CRL source URL applied to new sessions
    pub crl_url: Option<String>,
    /// Per-property default overrides (offline group only)
    pub defaults: PropertyDefaults,
}

/// Default overrides for the offline property group.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PropertyDefaults {
    pub model_number: Option<u32>,
    pub color_type: Option<u32>,
    pub host_type_number: Option<u32>,
    pub unlock_delay: Option<u32>,
}

impl ProtocolDefaults {
    /// Load the site defaults, falling back to built-ins when the file is
    /// absent or unreadable.
    pub fn load() -> Self {
        Self::load_from(util::build_filename("protocol.toml"))
    }

    fn load_from(path: PathBuf) -> Self {
        if path.exists() {
            if let Ok(content) = fs::read_to_string(&path) {
                if let Ok(config) = toml::from_str(&content) {
                    debug!(path = %path.display(), "loaded protocol defaults");
                    return config;
                }
            }
        }
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = ProtocolDefaults::load_from(PathBuf::from("/no/such/protocol.toml"));
        assert!(config.crl_url.is_none());
        assert!(config.defaults.model_number.is_none());
    }

    #[test]
    fn test_parse_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("protocol.toml");
        std::fs::write(
            &path,
            "crl_url = \"ldap://crl.example.com/cn=crl,o=bank?certificateRevocationList\"\n\
             [defaults]\n\
             model_number = 4\n\
             unlock_delay = 250\n",
        )
        .unwrap();

        let config = ProtocolDefaults::load_from(path);
        assert!(config.crl_url.as_deref().unwrap().starts_with("ldap://"));
        assert_eq!(config.defaults.model_number, Some(4));
        assert_eq!(config.defaults.unlock_delay, Some(250));
        assert_eq!(config.defaults.color_type, None);
    }
}
