//! Controller profiles
//!
//! Ruida models differ in the swizzle key they expect. A profile bundles
//! those per-model settings under a name that config files can refer to.

use crate::codec::DEFAULT_MAGIC;
use ruidakit_core::ProtocolError;
use serde::{Deserialize, Serialize};

/// Name of the profile used when none is configured
pub const DEFAULT_PROFILE_NAME: &str = "rdc6442g";

/// Per-model protocol settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuidaProfile {
    /// Profile name, lowercase
    pub name: String,
    /// Swizzle key
    pub swizzle_magic: u8,
}

impl Default for RuidaProfile {
    fn default() -> Self {
        Self {
            name: DEFAULT_PROFILE_NAME.to_string(),
            swizzle_magic: DEFAULT_MAGIC,
        }
    }
}

const PROFILES: &[(&str, u8)] = &[(DEFAULT_PROFILE_NAME, DEFAULT_MAGIC)];

impl RuidaProfile {
    /// Resolve a profile by name, ignoring case
    pub fn by_name(name: &str) -> Result<Self, ProtocolError> {
        PROFILES
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(n, magic)| Self {
                name: (*n).to_string(),
                swizzle_magic: *magic,
            })
            .ok_or_else(|| ProtocolError::UnknownProfile {
                name: name.to_string(),
            })
    }

    /// Names of every known profile
    pub fn names() -> impl Iterator<Item = &'static str> {
        PROFILES.iter().map(|(n, _)| *n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        let profile = RuidaProfile::by_name("RDC6442G").unwrap();
        assert_eq!(profile, RuidaProfile::default());
        assert_eq!(profile.swizzle_magic, 0x88);
    }

    #[test]
    fn test_unknown_profile() {
        let err = RuidaProfile::by_name("rdc9999").unwrap_err();
        assert_eq!(err.to_string(), "Unknown Ruida profile 'rdc9999'");
    }
}
