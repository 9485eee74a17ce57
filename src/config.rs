use crate::error::{DashResult, DashboardError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable overriding the aggregation service base URL.
pub const BASE_URL_ENV: &str = "HISTOBOARD_BASE_URL";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
pub enum OutputFormat {
    #[serde(rename = "png")]
    Png,
    #[serde(rename = "svg")]
    #[default]
    Svg,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Svg => "svg",
        }
    }
}

/// Size and layout constants for one bar chart.
///
/// Width grows by `unit_width` per category on top of `base_width` and is
/// clamped to `cap_width`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ChartGeometry {
    pub unit_width: u32,
    pub base_width: u32,
    pub cap_width: u32,
    pub height: u32,
    pub padding_right: u32,
    pub title_size: u32,
    pub legend_position: String,
}

impl Default for ChartGeometry {
    fn default() -> Self {
        Self {
            unit_width: 60,
            base_width: 100,
            cap_width: 300,
            height: 200,
            padding_right: 50,
            title_size: 12,
            legend_position: "bottom".to_string(),
        }
    }
}

impl ChartGeometry {
    pub fn width_for(&self, categories: usize) -> u32 {
        let categories = u32::try_from(categories).unwrap_or(u32::MAX);
        categories
            .saturating_mul(self.unit_width)
            .saturating_add(self.base_width)
            .min(self.cap_width)
    }

    pub fn validate(&self) -> DashResult<()> {
        if self.cap_width < self.base_width {
            return Err(DashboardError::Config(format!(
                "cap_width ({}) must not be smaller than base_width ({})",
                self.cap_width, self.base_width
            )));
        }
        if self.height == 0 || self.cap_width == 0 {
            return Err(DashboardError::Config(
                "chart dimensions must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub geometry: ChartGeometry,
    /// Number of groups shown in side-by-side layout
    pub side_by_side_limit: usize,
    pub format: OutputFormat,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/".to_string(),
            timeout_secs: 30,
            geometry: ChartGeometry::default(),
            side_by_side_limit: 3,
            format: OutputFormat::default(),
        }
    }
}

impl DashboardConfig {
    /// Defaults, overlaid by an optional JSON file, then the environment.
    pub fn load(path: Option<&Path>) -> DashResult<Self> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)?;
                Self::from_json_str(&text)?
            }
            None => Self::default(),
        };

        if let Ok(url) = std::env::var(BASE_URL_ENV) {
            if !url.trim().is_empty() {
                config.base_url = url;
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(text: &str) -> DashResult<Self> {
        serde_json::from_str(text).map_err(|e| DashboardError::Config(e.to_string()))
    }

    pub fn validate(&self) -> DashResult<()> {
        if self.base_url.trim().is_empty() {
            return Err(DashboardError::Config("base_url is empty".to_string()));
        }
        self.geometry.validate()
    }
}
