//! Manager settings.
use serde::{Deserialize, Serialize};

/// Behavioral switches on a
/// [`CommandManager`](crate::manager::CommandManager).
///
/// All settings default to off. The struct is serde-ready so hosts can load
/// it from their configuration files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerSettings {
    /// Replace empty suggestion lists with a single empty-string entry, for
    /// UIs that require at least one result.
    pub force_suggestion: bool,
    /// Permit tree mutation after registration has been locked. Concurrent
    /// readers must then accept inconsistent views.
    pub allow_unsafe_registration: bool,
    /// Replace a previously registered command with the same surface
    /// instead of rejecting the registration.
    pub override_existing_commands: bool,
    /// Allow flag tokens interleaved between positional components instead
    /// of only after them.
    pub liberal_flag_parsing: bool,
}
