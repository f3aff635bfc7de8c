use thiserror::Error;

/// Rejected configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("`{field}` must be at least 1")]
    Zero { field: &'static str },

    #[error("`backoffFactor` must be >= 1.0, got {0}")]
    BackoffFactor(f64),

    #[error("`capDelayMs` ({cap_ms}) is below `baseDelayMs` ({base_ms})")]
    CapBelowBase { base_ms: u64, cap_ms: u64 },

    #[error("`rootId` must not be empty")]
    EmptyRootId,

    #[error("asset `{asset}` has no sources")]
    NoSources { asset: String },

    #[error("asset `{asset}` is configured more than once")]
    DuplicateAsset { asset: String },
}
