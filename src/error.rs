use thiserror::Error;

/// Construction and reconfiguration failures.
///
/// Runtime motion commands never error: out-of-range numeric input is
/// clamped and conflicting concurrent updates are dropped.
#[derive(Debug, Error)]
pub enum PtzError {
    #[error("frame resolution must be at least 2x2 pixels, got {width}x{height}")]
    InvalidResolution { width: u32, height: u32 },

    #[error("invalid PTZ config: {0}")]
    InvalidConfig(&'static str),

    #[error("failed to parse PTZ config: {0}")]
    ConfigParse(#[from] serde_json::Error),
}
