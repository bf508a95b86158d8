//! Utility helpers
//!
//! Filesystem path probing for data files and version accessors.

use std::path::PathBuf;

/// Compiled-in data directory, overridable at build time.
const DATADIR: &str = match option_env!("TN3270_DATADIR") {
    Some(dir) => dir,
    None => "/usr/share/tn3270",
};

/// Compiled-in configuration directory, overridable at build time.
const CONFDIR: &str = match option_env!("TN3270_CONFDIR") {
    Some(dir) => dir,
    None => "/etc/tn3270",
};

/// Resolve a data file by probing, in order: the directory next to the
/// running executable, the compiled-in data directory, the compiled-in
/// config directory, the current directory. Returns the first existing
/// match, or the data-directory path when nothing exists yet.
pub fn build_filename(name: &str) -> PathBuf {
    let mut candidates: Vec<PathBuf> = Vec::with_capacity(4);

    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            candidates.push(dir.join(name));
        }
    }

    candidates.push(PathBuf::from(DATADIR).join(name));
    candidates.push(PathBuf::from(CONFDIR).join(name));
    candidates.push(PathBuf::from(".").join(name));

    for candidate in &candidates {
        if candidate.exists() {
            return candidate.clone();
        }
    }

    PathBuf::from(DATADIR).join(name)
}

/// Library version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Product name used in logs and data paths.
pub fn product_name() -> &'static str {
    "tn3270"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_is_deterministic() {
        // A name that exists nowhere resolves into the data directory.
        let path = build_filename("definitely-not-a-real-file-42");
        assert!(path.starts_with(DATADIR));
    }

    #[test]
    fn test_version_matches_manifest() {
        assert_eq!(version(), env!("CARGO_PKG_VERSION"));
        assert_eq!(product_name(), "tn3270");
    }
}
