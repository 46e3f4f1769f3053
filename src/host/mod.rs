//! Host platform integration
//!
//! - `AdapterHost`: what the bridge needs from the home-automation host
//! - `StateCommon`: descriptor attached to every state upsert
//! - `file_store`: standalone host persisting states to a JSON file

pub mod file_store;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::AdapterConfig;
use crate::error::BridgeError;

pub use file_store::JsonFileHost;

/// State holding the refresh token most recently issued by Ring
pub const NEXT_REFRESH_TOKEN_STATE: &str = "next_refresh_token";
/// State holding the configured token that was in use when Ring rotated it
pub const OLD_REFRESH_TOKEN_STATE: &str = "old_user_refresh_token";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateType {
    Boolean,
    Number,
    String,
}

/// Descriptor sent alongside a state value (name, type, role, access)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateCommon {
    pub name: String,
    #[serde(rename = "type")]
    pub state_type: StateType,
    pub role: String,
    pub read: bool,
    pub write: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl StateCommon {
    pub fn read_only(name: &str, state_type: StateType, role: &str) -> Self {
        Self {
            name: name.to_string(),
            state_type,
            role: role.to_string(),
            read: true,
            write: false,
            unit: None,
        }
    }

    pub fn writable(name: &str, state_type: StateType, role: &str) -> Self {
        Self {
            write: true,
            ..Self::read_only(name, state_type, role)
        }
    }

    pub fn with_unit(mut self, unit: &str) -> Self {
        self.unit = Some(unit.to_string());
        self
    }
}

pub fn common_new_token() -> StateCommon {
    StateCommon::read_only("Next Refresh Token", StateType::String, "text")
}

pub fn common_old_token() -> StateCommon {
    StateCommon::read_only("Old User Refresh Token", StateType::String, "text")
}

/// Home-automation host as seen by the bridge
#[async_trait]
pub trait AdapterHost: Send + Sync {
    /// Adapter instance namespace, part of every device identity
    fn namespace(&self) -> &str;

    fn config(&self) -> &AdapterConfig;

    /// Create the state if missing and set its value
    async fn upsert_state(
        &self,
        name: &str,
        common: &StateCommon,
        value: serde_json::Value,
    ) -> Result<(), BridgeError>;

    /// Stop the adapter; nothing is left to manage
    fn terminate(&self, reason: &str);

    /// Token to open the next session with
    async fn get_refresh_token(&self) -> Result<String, BridgeError>;
}
