//! Configuration schema types for Parley.
//!
//! All structs use `serde(default)` so partial configs work correctly.
//! Missing fields are filled with the defaults the realtime layer expects.

mod presence;
mod realtime;
mod supabase;
mod system;

pub use presence::*;
pub use realtime::*;
pub use supabase::*;
pub use system::*;

use serde::{Deserialize, Serialize};

/// Current config schema version.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Root configuration for Parley.
///
/// Only override what you want to change.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ParleyConfig {
    pub supabase: SupabaseConfig,
    pub realtime: RealtimeSettings,
    pub presence: PresenceSettings,
    pub logging: LoggingConfig,
}

// =============================================================================
// Tests
// =============================================================================
