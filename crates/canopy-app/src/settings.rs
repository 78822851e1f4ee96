use anyhow::{Context, Result, bail};
use canopy_core::{BoxSize, Orientation};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewSettings {
    pub node_width: f32,
    pub node_height: f32,
    /// Sibling gap; depth levels are separated by three times this.
    pub spacing: f32,
    pub orientation: Orientation,
    /// Children fetched per expansion, `None` fetches everything.
    pub page_limit: Option<u32>,
}

impl Default for ViewSettings {
    fn default() -> Self {
        Self {
            node_width: 120.0,
            node_height: 40.0,
            spacing: 50.0,
            orientation: Orientation::Horizontal,
            page_limit: Some(25),
        }
    }
}

impl ViewSettings {
    pub fn node_size(&self) -> BoxSize {
        BoxSize::new(self.node_width, self.node_height)
    }

    pub fn validate(&self) -> Result<()> {
        let positive = |v: f32| v.is_finite() && v > 0.0;
        if !positive(self.node_width) || !positive(self.node_height) {
            bail!(
                "node size must be positive, got {}x{}",
                self.node_width,
                self.node_height
            );
        }
        if !self.spacing.is_finite() || self.spacing < 0.0 {
            bail!("spacing must be non-negative, got {}", self.spacing);
        }
        if self.page_limit == Some(0) {
            bail!("page_limit must be at least 1 (omit it to fetch all children)");
        }
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings {}", path.display()))?;
        let settings: ViewSettings = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse settings {}", path.display()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write settings {}", path.display()))?;
        Ok(())
    }
}
