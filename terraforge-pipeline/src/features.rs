//! Vector road features (OSM-style input).
//!
//! A JSON list of lines and polygons with free-form tags, already projected
//! into pixel coordinates by the upstream adapter. Recognized tags:
//! `material` assigns a feature to a road material, `junction=roundabout`
//! flags a roundabout, and `junction_hint` marks a known intersection that
//! overrides geometric junction detection.

use std::collections::BTreeMap;
use std::path::Path;

use glam::Vec2;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    Line,
    Polygon,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoadFeature {
    pub kind: FeatureKind,
    pub coords: Vec<[f32; 2]>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl RoadFeature {
    pub fn points(&self) -> Vec<Vec2> {
        self.coords.iter().map(|c| Vec2::new(c[0], c[1])).collect()
    }

    pub fn is_roundabout(&self) -> bool {
        self.tags.get("junction").map(String::as_str) == Some("roundabout")
    }

    pub fn is_junction_hint(&self) -> bool {
        self.tags.contains_key("junction_hint")
    }

    /// The road material this feature belongs to, when tagged.
    pub fn material(&self) -> Option<&str> {
        self.tags.get("material").map(String::as_str)
    }
}

/// Load a feature list from JSON.
pub fn load_features(path: &Path) -> Result<Vec<RoadFeature>, PipelineError> {
    let text = std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
    let features: Vec<RoadFeature> = serde_json::from_str(&text)
        .map_err(|e| PipelineError::CorruptInput(format!("road features: {e}")))?;
    info!(path = %path.display(), count = features.len(), "loaded road features");
    Ok(features)
}

/// Junction hint locations carried by the feature list.
pub fn junction_hints(features: &[RoadFeature]) -> Vec<Vec2> {
    features
        .iter()
        .filter(|f| f.is_junction_hint())
        .filter_map(|f| f.coords.first().map(|c| Vec2::new(c[0], c[1])))
        .collect()
}

/// Line features assigned to the given material. Untagged lines belong to
/// the default (first-declared) road material.
pub fn lines_for_material<'a>(
    features: &'a [RoadFeature],
    material: &str,
    is_default: bool,
) -> Vec<&'a RoadFeature> {
    features
        .iter()
        .filter(|f| f.kind == FeatureKind::Line && !f.is_junction_hint())
        .filter(|f| match f.material() {
            Some(m) => m == material,
            None => is_default,
        })
        .collect()
}
