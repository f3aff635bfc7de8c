//! Layer tunables, deserialized from the page's bootstrap JSON.

use std::collections::HashSet;
use std::time::Duration;

use failure_monitor::DEFAULT_ERROR_BUDGET;
use reconnector::ReconnectPolicy;
use render_arbiter::{ArbiterConfig, ContactLine, DegradedContent, DEFAULT_ATTEMPT_CEILING};
use script_loader::AssetSpec;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Every tunable of the layer. Missing fields take their defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResilienceConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub backoff_factor: f64,
    pub cap_delay_ms: u64,
    pub rejection_codes: Vec<u16>,
    pub error_budget_threshold: u32,
    pub render_attempt_ceiling: u32,
    pub asset_timeout_ms: u64,
    /// Id of the display root element.
    pub root_id: String,
    pub assets: Vec<AssetConfig>,
    pub degraded: DegradedConfig,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        let policy = ReconnectPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            base_delay_ms: millis(policy.base_delay),
            backoff_factor: policy.backoff_factor,
            cap_delay_ms: millis(policy.cap_delay),
            rejection_codes: policy.rejection_codes.to_vec(),
            error_budget_threshold: DEFAULT_ERROR_BUDGET,
            render_attempt_ceiling: DEFAULT_ATTEMPT_CEILING,
            asset_timeout_ms: 5_000,
            root_id: "root".to_owned(),
            assets: Vec::new(),
            degraded: DegradedConfig::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetConfig {
    pub name: String,
    pub sources: Vec<String>,
    /// Global binding the asset defines; used as loaded probe and stub target.
    #[serde(default)]
    pub binding: Option<String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DegradedConfig {
    pub title: String,
    pub message: String,
    pub retry_label: String,
    pub contacts: Vec<ContactConfig>,
}

impl Default for DegradedConfig {
    fn default() -> Self {
        let content = DegradedContent::default();
        Self {
            title: content.title,
            message: content.message,
            retry_label: content.retry_label,
            contacts: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactConfig {
    pub label: String,
    pub value: String,
    #[serde(default)]
    pub href: Option<String>,
}

impl ResilienceConfig {
    /// Parses and validates a JSON document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("maxAttempts", u64::from(self.max_attempts)),
            ("baseDelayMs", self.base_delay_ms),
            ("errorBudgetThreshold", u64::from(self.error_budget_threshold)),
            ("renderAttemptCeiling", u64::from(self.render_attempt_ceiling)),
            ("assetTimeoutMs", self.asset_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Zero { field });
            }
        }
        if self.backoff_factor.is_nan() || self.backoff_factor < 1.0 {
            return Err(ConfigError::BackoffFactor(self.backoff_factor));
        }
        if self.cap_delay_ms < self.base_delay_ms {
            return Err(ConfigError::CapBelowBase {
                base_ms: self.base_delay_ms,
                cap_ms: self.cap_delay_ms,
            });
        }
        if self.root_id.is_empty() {
            return Err(ConfigError::EmptyRootId);
        }
        let mut seen = HashSet::new();
        for asset in &self.assets {
            if asset.sources.is_empty() {
                return Err(ConfigError::NoSources {
                    asset: asset.name.clone(),
                });
            }
            if !seen.insert(asset.name.as_str()) {
                return Err(ConfigError::DuplicateAsset {
                    asset: asset.name.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            backoff_factor: self.backoff_factor,
            cap_delay: Duration::from_millis(self.cap_delay_ms),
            rejection_codes: self.rejection_codes.iter().copied().collect(),
        }
    }

    pub fn asset_timeout(&self) -> Duration {
        Duration::from_millis(self.asset_timeout_ms)
    }

    pub fn asset_specs(&self) -> Vec<AssetSpec> {
        self.assets.iter().map(AssetConfig::to_spec).collect()
    }

    pub fn arbiter_config(&self) -> ArbiterConfig {
        ArbiterConfig {
            attempt_ceiling: self.render_attempt_ceiling,
        }
    }

    pub fn degraded_content(&self) -> DegradedContent {
        DegradedContent {
            title: self.degraded.title.clone(),
            message: self.degraded.message.clone(),
            retry_label: self.degraded.retry_label.clone(),
            contacts: self
                .degraded
                .contacts
                .iter()
                .map(|contact| {
                    let line = ContactLine::new(&contact.label, &contact.value);
                    match &contact.href {
                        Some(href) => line.with_href(href),
                        None => line,
                    }
                })
                .collect(),
        }
    }
}

impl AssetConfig {
    pub fn to_spec(&self) -> AssetSpec {
        let mut spec = AssetSpec::new(&self.name, &self.sources);
        if let Some(binding) = &self.binding {
            spec = spec.with_binding(binding);
        }
        if let Some(ms) = self.timeout_ms {
            spec = spec.with_timeout(Duration::from_millis(ms));
        }
        spec
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
