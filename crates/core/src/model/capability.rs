use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Administrative capabilities the engine checks at its boundary.
///
/// The caller resolves roles and per-user permission lists into a
/// `CapabilitySet` once; the engine never inspects roles itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    /// Grant pauses, reset, and lock learner progress.
    ManageProgress,
    /// Generate, toggle, clear, and inspect lesson access codes.
    ManageAccessCodes,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ManageProgress => f.write_str("manage-progress"),
            Self::ManageAccessCodes => f.write_str("manage-access-codes"),
        }
    }
}

/// The set of capabilities attached to an already-authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CapabilitySet {
    granted: HashSet<Capability>,
}

impl CapabilitySet {
    /// No capabilities; every admin operation is refused.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// All capabilities, the usual shape for a platform admin.
    #[must_use]
    pub fn admin() -> Self {
        Self {
            granted: HashSet::from([Capability::ManageProgress, Capability::ManageAccessCodes]),
        }
    }

    #[must_use]
    pub fn contains(&self, capability: Capability) -> bool {
        self.granted.contains(&capability)
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<T: IntoIterator<Item = Capability>>(iter: T) -> Self {
        Self {
            granted: iter.into_iter().collect(),
        }
    }
}
