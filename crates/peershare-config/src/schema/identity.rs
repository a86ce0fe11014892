//! Local identity used as the sender of every signaling message.

use serde::{Deserialize, Serialize};

/// Who the local user is on the signaling relay.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    pub user_id: String,
    pub display_name: String,
}
