//! Editor configuration.

use crate::error::FlowError;
use kurbo::Size;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Longest quiet period honoured; larger configured values are clamped.
pub const MAX_DEBOUNCE_MS: u64 = 60 * 60 * 1000;

// ─── Config ───────────────────────────────────────────────────────────────

/// Tunables for the sync engine, fan router and palette.
///
/// Every field has a default, so a partial JSON document is enough:
/// `{"text_debounce_ms": 500}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Quiet period after the last text edit before text → graph runs. Default: **300**.
    pub text_debounce_ms: u64,

    /// Quiet period after the last semantic graph edit before graph → text runs. Default: **100**.
    pub graph_debounce_ms: u64,

    /// Separation between fanned parallel links. Default: **20**.
    pub fan_gap: f64,

    /// Regenerate the text when the graph changes. Turned off while the text
    /// is being hand-edited live. Default: **true**.
    pub graph_to_text_sync: bool,

    /// Zoom bounds, in percent.
    pub min_zoom: f64,
    pub max_zoom: f64,

    /// Canvas grid size; values below 1 are clamped to 1.
    pub grid_size: f64,

    pub palette: PaletteConfig,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            text_debounce_ms: 300,
            graph_debounce_ms: 100,
            fan_gap: crate::fan::DEFAULT_FAN_GAP,
            graph_to_text_sync: true,
            min_zoom: 5.0,
            max_zoom: 400.0,
            grid_size: 1.0,
            palette: PaletteConfig::default(),
        }
    }
}

impl EditorConfig {
    /// Parse a JSON config document; missing fields take their defaults.
    ///
    /// # Errors
    /// Returns [`FlowError::Config`] if the document is not valid JSON or a
    /// field has the wrong type.
    pub fn from_json(json: &str) -> Result<Self, FlowError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn text_debounce(&self) -> Duration {
        Duration::from_millis(self.text_debounce_ms.min(MAX_DEBOUNCE_MS))
    }

    pub fn graph_debounce(&self) -> Duration {
        Duration::from_millis(self.graph_debounce_ms.min(MAX_DEBOUNCE_MS))
    }

    /// Clamp a requested zoom level to the configured bounds.
    pub fn clamp_zoom(&self, percent: f64) -> f64 {
        percent.clamp(self.min_zoom, self.max_zoom)
    }
}

/// Palette layout tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaletteConfig {
    /// Padding added on every side of the largest entry to form a cell.
    pub entry_padding: Size,
    /// Space below each group header.
    pub header_gap: f64,
    /// Height of the "no matches" placeholder.
    pub no_matches_height: f64,
}

impl Default for PaletteConfig {
    fn default() -> Self {
        Self {
            entry_padding: Size::new(12.0, 12.0),
            header_gap: 5.0,
            no_matches_height: 30.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg = EditorConfig::from_json(r#"{"text_debounce_ms": 500, "palette": {"header_gap": 8}}"#)
            .unwrap();
        assert_eq!(cfg.text_debounce(), Duration::from_millis(500));
        assert_eq!(cfg.graph_debounce(), Duration::from_millis(100));
        assert_eq!(cfg.palette.header_gap, 8.0);
        assert_eq!(cfg.palette.entry_padding, Size::new(12.0, 12.0));
    }

    #[test]
    fn huge_debounce_is_clamped() {
        let cfg = EditorConfig::from_json(r#"{"text_debounce_ms": 18446744073709551615}"#).unwrap();
        assert_eq!(cfg.text_debounce(), Duration::from_millis(MAX_DEBOUNCE_MS));
        assert_eq!(cfg.graph_debounce(), Duration::from_millis(100));
    }

    #[test]
    fn bad_json_is_a_config_error() {
        let err = EditorConfig::from_json(r#"{"fan_gap": "wide"}"#).unwrap_err();
        assert!(matches!(err, FlowError::Config(_)));
    }

    #[test]
    fn zoom_is_clamped() {
        let cfg = EditorConfig::default();
        assert_eq!(cfg.clamp_zoom(1.0), 5.0);
        assert_eq!(cfg.clamp_zoom(1000.0), 400.0);
        assert_eq!(cfg.clamp_zoom(150.0), 150.0);
    }
}
