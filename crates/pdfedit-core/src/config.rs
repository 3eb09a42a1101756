//! Engine configuration
//!
//! Every field has a default, so hosts can pass a partial JSON object.

use crate::error::PdfEditError;
use serde::{Deserialize, Serialize};

/// Tunables shared by the rendering, compression and font pipelines
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Reference rendering scale; base-space coordinates are expressed at
    /// this scale and never change with the live zoom.
    pub base_scale: f64,
    /// Pages with more text runs than this are copied verbatim during
    /// text-preserving compression.
    pub text_run_threshold: usize,
    /// Thumbnail width in pixels
    pub thumbnail_width: u32,
    pub min_zoom: f64,
    pub max_zoom: f64,
    pub zoom_step: f64,
    /// Style-descriptor endpoint for remote font families
    pub font_css_endpoint: String,
    /// User agent sent to the style endpoint. A legacy agent makes the
    /// endpoint answer with TrueType URLs instead of WOFF2.
    pub font_user_agent: String,
    pub font_fetch_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_scale: 1.5,
            text_run_threshold: 10,
            thumbnail_width: 150,
            min_zoom: 0.25,
            max_zoom: 3.0,
            zoom_step: 0.15,
            font_css_endpoint: "https://fonts.googleapis.com/css2".to_string(),
            font_user_agent: "Mozilla/4.0 (compatible; MSIE 8.0; Windows NT 6.1; Trident/4.0)"
                .to_string(),
            font_fetch_timeout_secs: 15,
        }
    }
}

impl EngineConfig {
    /// Parse configuration from a JSON string, filling missing fields with defaults
    pub fn from_json(json: &str) -> Result<Self, PdfEditError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| PdfEditError::Serialization(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PdfEditError> {
        if !(self.base_scale.is_finite() && self.base_scale > 0.0) {
            return Err(PdfEditError::InvalidInput(format!(
                "base_scale must be positive, got {}",
                self.base_scale
            )));
        }
        if !(self.min_zoom > 0.0 && self.min_zoom <= self.max_zoom) {
            return Err(PdfEditError::InvalidInput(format!(
                "zoom range [{}, {}] is empty",
                self.min_zoom, self.max_zoom
            )));
        }
        Ok(())
    }

    /// Clamp a requested zoom into the configured range
    pub fn clamp_zoom(&self, zoom: f64) -> f64 {
        if zoom.is_nan() {
            return 1.0_f64.clamp(self.min_zoom, self.max_zoom);
        }
        zoom.clamp(self.min_zoom, self.max_zoom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_values() {
        let config = EngineConfig::default();
        assert_eq!(config.base_scale, 1.5);
        assert_eq!(config.text_run_threshold, 10);
        assert_eq!(config.min_zoom, 0.25);
        assert_eq!(config.max_zoom, 3.0);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = EngineConfig::from_json(r#"{"text_run_threshold": 25}"#).unwrap();
        assert_eq!(config.text_run_threshold, 25);
        assert_eq!(config.base_scale, 1.5);
    }

    #[test]
    fn test_invalid_base_scale_rejected() {
        assert!(EngineConfig::from_json(r#"{"base_scale": 0}"#).is_err());
    }

    #[test]
    fn test_clamp_zoom() {
        let config = EngineConfig::default();
        assert_eq!(config.clamp_zoom(10.0), 3.0);
        assert_eq!(config.clamp_zoom(0.01), 0.25);
        assert_eq!(config.clamp_zoom(1.2), 1.2);
    }
}
