//! Engine configuration.
//!
//! Every field has a default, so an empty TOML document is a valid
//! configuration. Call [`EngineConfig::validate`] before handing a config to
//! the engine; [`crate::engine::TriageEngine::new`] does so itself.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::budget::BudgetPolicy;
use crate::correlator::CorrelationConfig;
use crate::domain::{TriageError, TriageResult};
use crate::namespace::NamespaceConvention;
use crate::timeline_analyzer::TimelineLimits;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub budget: BudgetPolicy,
    pub namespace: NamespaceConvention,
    pub correlation: CorrelationConfig,
    /// Upper bound on one whole request
    pub request_timeout_secs: u64,
    /// Lookback used when a request asks for zero hours
    pub default_lookback_hours: u32,
    /// Records requested from the status scan in system-wide mode
    pub status_scan_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            budget: BudgetPolicy::default(),
            namespace: NamespaceConvention::default(),
            correlation: CorrelationConfig::default(),
            request_timeout_secs: 60,
            default_lookback_hours: 24,
            status_scan_limit: 50,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(raw: &str) -> TriageResult<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> TriageResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        debug!(path = %path.display(), "loading engine configuration");
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> TriageResult<()> {
        self.budget.validate()?;
        self.namespace.validate()?;
        self.correlation.validate()?;
        if self.request_timeout_secs == 0 {
            return Err(TriageError::configuration(
                "request_timeout_secs must be greater than zero",
            ));
        }
        if self.default_lookback_hours == 0 {
            return Err(TriageError::configuration(
                "default_lookback_hours must be greater than zero",
            ));
        }
        if self.status_scan_limit == 0 {
            return Err(TriageError::configuration(
                "status_scan_limit must be greater than zero",
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// `0` selects the configured default lookback.
    pub fn effective_hours(&self, requested: u32) -> u32 {
        if requested == 0 {
            self.default_lookback_hours
        } else {
            requested
        }
    }

    pub fn timeline_limits(&self) -> TimelineLimits {
        TimelineLimits {
            max_entries: self.budget.max_timeline_entries,
            max_error_len: self.budget.max_error_detail_length,
        }
    }
}
