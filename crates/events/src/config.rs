//! Dispatcher configuration

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Configuration for the dispatcher
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Upper bound on the propagation path; a longer chain means a cycle.
    pub max_path_depth: usize,
    /// Return early when no node on the path listens for the type.
    pub skip_without_listeners: bool,
    /// Log once per registration when a passive listener calls preventDefault.
    pub warn_passive_prevent_default: bool,
    /// Run the microtask hook after each node that fired a listener.
    pub microtask_checkpoint: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_path_depth: 4096,
            skip_without_listeners: true,
            warn_passive_prevent_default: true,
            microtask_checkpoint: true,
        }
    }
}

impl DispatchConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
