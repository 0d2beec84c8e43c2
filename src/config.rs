//! Controller tuning knobs.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::PtzError;

/// Tuning for the digital PTZ controller.
///
/// Every field has a production default; sessions that persist operator
/// tuning can overlay a partial JSON document via [`PtzConfig::from_json`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PtzConfig {
    /// Fraction of the crop window moved by one step-mode pan/tilt.
    pub move_step: f64,
    /// Zoom-level delta applied by one step-mode zoom.
    pub zoom_step: f64,
    pub min_zoom: f64,
    pub max_zoom: f64,
    /// Total duration of one smooth stepped transition.
    pub transition_time_ms: u64,
    /// Interpolation frames per smooth transition; also sets the
    /// continuous-motion tick interval (`transition_time_ms / frames`).
    pub transition_frames: u32,
    /// Fraction of the crop window a full-speed pan/tilt moves per tick.
    pub max_move_rate: f64,
    /// Fraction of the zoom level a full-speed zoom changes per tick.
    pub max_zoom_rate: f64,
}

impl Default for PtzConfig {
    fn default() -> Self {
        Self {
            move_step: 0.5,
            zoom_step: 1.0,
            min_zoom: 1.0,
            max_zoom: 10.0,
            transition_time_ms: 1_500,
            transition_frames: 50,
            max_move_rate: 0.02,
            max_zoom_rate: 0.014,
        }
    }
}

impl PtzConfig {
    /// Interval between interpolation frames and continuous-motion ticks.
    pub fn frame_interval(&self) -> Duration {
        let frames = self.transition_frames.max(1) as u64;
        Duration::from_millis((self.transition_time_ms / frames).max(1))
    }

    pub fn validate(&self) -> Result<(), PtzError> {
        if !self.move_step.is_finite() || !(0.0..=1.0).contains(&self.move_step) {
            return Err(PtzError::InvalidConfig("moveStep must be within [0, 1]"));
        }
        if !self.zoom_step.is_finite() || self.zoom_step <= 0.0 {
            return Err(PtzError::InvalidConfig("zoomStep must be positive"));
        }
        if !self.min_zoom.is_finite() || self.min_zoom < 1.0 {
            return Err(PtzError::InvalidConfig("minZoom must be at least 1.0"));
        }
        if !self.max_zoom.is_finite() || self.max_zoom <= self.min_zoom {
            return Err(PtzError::InvalidConfig("maxZoom must exceed minZoom"));
        }
        if self.transition_time_ms == 0 {
            return Err(PtzError::InvalidConfig("transitionTimeMs must be positive"));
        }
        if self.transition_frames == 0 {
            return Err(PtzError::InvalidConfig("transitionFrames must be positive"));
        }
        if !self.max_move_rate.is_finite() || self.max_move_rate <= 0.0 {
            return Err(PtzError::InvalidConfig("maxMoveRate must be positive"));
        }
        if !self.max_zoom_rate.is_finite() || self.max_zoom_rate <= 0.0 {
            return Err(PtzError::InvalidConfig("maxZoomRate must be positive"));
        }
        Ok(())
    }

    /// Parses a partial or full config document, validating the result.
    pub fn from_json(raw: &str) -> Result<Self, PtzError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(PtzConfig::default().validate().is_ok());
    }

    #[test]
    fn frame_interval_derives_from_transition_shape() {
        let config = PtzConfig::default();
        assert_eq!(config.frame_interval(), Duration::from_millis(30));

        let config = PtzConfig {
            transition_time_ms: 1_000,
            transition_frames: 20,
            ..PtzConfig::default()
        };
        assert_eq!(config.frame_interval(), Duration::from_millis(50));
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config = PtzConfig::from_json(r#"{"maxZoom": 4.0, "moveStep": 0.25}"#)
            .expect("partial config must parse");
        assert_eq!(config.max_zoom, 4.0);
        assert_eq!(config.move_step, 0.25);
        assert_eq!(config.min_zoom, 1.0);
        assert_eq!(config.transition_frames, 50);
    }

    #[test]
    fn out_of_range_fields_are_rejected() {
        assert!(PtzConfig::from_json(r#"{"moveStep": 1.5}"#).is_err());
        assert!(PtzConfig::from_json(r#"{"maxZoom": 0.5}"#).is_err());
        assert!(PtzConfig::from_json(r#"{"transitionFrames": 0}"#).is_err());
        assert!(PtzConfig::from_json("not json").is_err());
    }
}
