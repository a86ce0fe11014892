//! Configuration schema types for peershare.
//!
//! All structs use `serde(default)` so partial configs work correctly.

mod ice;
mod identity;
mod session;
mod signaling;
mod system;

pub use ice::*;
pub use identity::*;
pub use session::*;
pub use signaling::*;
pub use system::*;

use serde::{Deserialize, Serialize};

/// Current config schema version.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Root configuration.
///
/// Only override what you want to change.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ShareConfig {
    pub identity: IdentityConfig,
    pub signaling: SignalingConfig,
    pub ice: IceConfig,
    pub restart: RestartConfig,
    pub capture: CaptureConfig,
    pub logging: LoggingConfig,
}

// =============================================================================
// Tests
// =============================================================================
