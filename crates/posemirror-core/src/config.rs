//! Visualizer tuning

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Runtime knobs shared by every robot kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualizerConfig {
    /// Overrides the rig's freshness window when set (seconds)
    pub freshness_override: Option<f64>,
    /// Largest per-frame vertical correction of the model root
    pub max_ground_correction: f64,
    /// Contact drift below this is ignored
    pub ground_epsilon: f64,
    /// HUD canvas size in pixels
    pub hud_canvas: (u32, u32),
    /// HUD panel width in scene units
    pub hud_panel_width: f64,
    /// Device pixel ratio passed to the surface
    pub pixel_ratio: f64,
    pub ground_texture_url: String,
    /// Capacity of the cross-thread telemetry feed
    pub feed_capacity: usize,
    /// Selector resolved for `ContainerTarget::Default`
    pub default_selector: String,
}

impl Default for VisualizerConfig {
    fn default() -> Self {
        Self {
            freshness_override: None,
            max_ground_correction: 0.3,
            ground_epsilon: 1e-4,
            hud_canvas: (512, 256),
            hud_panel_width: 0.18,
            pixel_ratio: 1.0,
            ground_texture_url: "modeles3D/sol.jpg".to_string(),
            feed_capacity: 16,
            default_selector: "#robot-virtuel".to_string(),
        }
    }
}

impl VisualizerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate from JSON; missing fields take defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: VisualizerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_freshness(mut self, window: f64) -> Self {
        self.freshness_override = Some(window);
        self
    }

    pub fn with_max_ground_correction(mut self, max: f64) -> Self {
        self.max_ground_correction = max;
        self
    }

    pub fn with_hud_canvas(mut self, width: u32, height: u32) -> Self {
        self.hud_canvas = (width, height);
        self
    }

    pub fn with_pixel_ratio(mut self, ratio: f64) -> Self {
        self.pixel_ratio = ratio;
        self
    }

    pub fn with_ground_texture(mut self, url: impl Into<String>) -> Self {
        self.ground_texture_url = url.into();
        self
    }

    pub fn with_feed_capacity(mut self, capacity: usize) -> Self {
        self.feed_capacity = capacity;
        self
    }

    /// Check numeric ranges
    pub fn validate(&self) -> Result<()> {
        if let Some(window) = self.freshness_override {
            if !(window.is_finite() && window > 0.0) {
                return Err(Error::Config(format!("freshness window must be positive, got {}", window)));
            }
        }
        if !(self.max_ground_correction.is_finite() && self.max_ground_correction >= 0.0) {
            return Err(Error::Config("max_ground_correction must be non-negative".into()));
        }
        if !(self.ground_epsilon.is_finite() && self.ground_epsilon >= 0.0) {
            return Err(Error::Config("ground_epsilon must be non-negative".into()));
        }
        if !(self.pixel_ratio.is_finite() && self.pixel_ratio > 0.0) {
            return Err(Error::Config("pixel_ratio must be positive".into()));
        }
        if !(self.hud_panel_width.is_finite() && self.hud_panel_width > 0.0) {
            return Err(Error::Config("hud_panel_width must be positive".into()));
        }
        if self.feed_capacity == 0 {
            return Err(Error::Config("feed_capacity must be at least 1".into()));
        }
        if self.default_selector.trim().is_empty() {
            return Err(Error::Config("default_selector must not be empty".into()));
        }
        Ok(())
    }
}
