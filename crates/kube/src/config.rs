//! Store settings read from the environment.

use std::str::FromStr;

use kube::api::PropagationPolicy;
use serde::{Deserialize, Serialize};

pub const DEFAULT_FIELD_MANAGER: &str = "recon";

/// How dependents are handled when an object is deleted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Propagation {
    #[default]
    Background,
    Foreground,
    Orphan,
}

impl Propagation {
    pub fn policy(&self) -> PropagationPolicy {
        match self {
            Propagation::Background => PropagationPolicy::Background,
            Propagation::Foreground => PropagationPolicy::Foreground,
            Propagation::Orphan => PropagationPolicy::Orphan,
        }
    }
}

impl FromStr for Propagation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "background" => Ok(Propagation::Background),
            "foreground" => Ok(Propagation::Foreground),
            "orphan" => Ok(Propagation::Orphan),
            other => Err(format!("unknown propagation policy: {} (expect Background, Foreground or Orphan)", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Field manager recorded on create/update requests.
    pub field_manager: String,
    pub propagation: Propagation,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { field_manager: DEFAULT_FIELD_MANAGER.to_string(), propagation: Propagation::default() }
    }
}

impl StoreConfig {
    /// `RECON_FIELD_MANAGER`, `RECON_DELETE_PROPAGATION`; unset or unparsable values keep defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let field_manager = get("RECON_FIELD_MANAGER")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.field_manager);
        let propagation = match get("RECON_DELETE_PROPAGATION") {
            Some(raw) => raw.parse().unwrap_or_else(|e: String| {
                tracing::warn!(error = %e, "invalid RECON_DELETE_PROPAGATION; using default");
                defaults.propagation
            }),
            None => defaults.propagation,
        };
        Self { field_manager, propagation }
    }
}
