//! JsonFileHost: standalone host keeping the state tree in a JSON file
//!
//! Every upsert rewrites the whole file. Termination requests are published
//! on a watch channel the main loop listens to.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, RwLock};

use super::{AdapterHost, StateCommon, NEXT_REFRESH_TOKEN_STATE, OLD_REFRESH_TOKEN_STATE};
use crate::config::AdapterConfig;
use crate::error::BridgeError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredState {
    pub common: StateCommon,
    pub value: serde_json::Value,
    pub ts: DateTime<Utc>,
}

pub struct JsonFileHost {
    config: AdapterConfig,
    path: PathBuf,
    states: RwLock<BTreeMap<String, StoredState>>,
    terminate_tx: watch::Sender<Option<String>>,
}

impl JsonFileHost {
    /// Load previously persisted states (if any) from `path`
    pub async fn open(config: AdapterConfig, path: impl Into<PathBuf>) -> Result<Self, BridgeError> {
        let path = path.into();
        let states = match tokio::fs::read_to_string(&path).await {
            Ok(content) if !content.trim().is_empty() => serde_json::from_str(&content)?,
            Ok(_) => BTreeMap::new(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        tracing::info!(
            "[JsonFileHost] Loaded {} states from {}",
            states.len(),
            path.display()
        );

        let (terminate_tx, _) = watch::channel(None);
        Ok(Self {
            config,
            path,
            states: RwLock::new(states),
            terminate_tx,
        })
    }

    /// Receiver that yields the termination reason once the adapter is stopped
    pub fn termination(&self) -> watch::Receiver<Option<String>> {
        self.terminate_tx.subscribe()
    }

    #[cfg(test)]
    pub async fn get_state(&self, name: &str) -> Option<StoredState> {
        self.states.read().await.get(name).cloned()
    }

    /// Fully qualified id the host would show for a state
    pub fn qualified_id(&self, name: &str) -> String {
        format!("{}.{}", self.config.namespace, name)
    }

    async fn persist(&self, states: &BTreeMap<String, StoredState>) -> Result<(), BridgeError> {
        let content = serde_json::to_string_pretty(states)?;
        tokio::fs::write(&self.path, content).await?;
        Ok(())
    }
}

#[async_trait]
impl AdapterHost for JsonFileHost {
    fn namespace(&self) -> &str {
        &self.config.namespace
    }

    fn config(&self) -> &AdapterConfig {
        &self.config
    }

    async fn upsert_state(
        &self,
        name: &str,
        common: &StateCommon,
        value: serde_json::Value,
    ) -> Result<(), BridgeError> {
        let mut states = self.states.write().await;
        states.insert(
            name.to_string(),
            StoredState {
                common: common.clone(),
                value,
                ts: Utc::now(),
            },
        );
        self.persist(&states).await?;

        tracing::trace!("[JsonFileHost] Upserted {}", self.qualified_id(name));
        Ok(())
    }

    fn terminate(&self, reason: &str) {
        tracing::error!("[JsonFileHost] Terminating adapter: {}", reason);
        self.terminate_tx.send_replace(Some(reason.to_string()));
    }

    async fn get_refresh_token(&self) -> Result<String, BridgeError> {
        let configured = &self.config.refreshtoken;
        let states = self.states.read().await;

        let old = states
            .get(OLD_REFRESH_TOKEN_STATE)
            .and_then(|s| s.value.as_str());
        let next = states
            .get(NEXT_REFRESH_TOKEN_STATE)
            .and_then(|s| s.value.as_str())
            .filter(|t| !t.is_empty());

        // A rotated token is only valid while the user has not entered a new one
        match (old, next) {
            (Some(old), Some(next)) if old == configured => {
                tracing::debug!("[JsonFileHost] Using rotated refresh token");
                Ok(next.to_string())
            }
            _ => Ok(configured.clone()),
        }
    }
}
