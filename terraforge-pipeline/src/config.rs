//! Pipeline configuration (TOML).
//!
//! One file describes a terrain: raster geometry, the ordered material
//! list (index = `.ter` storage index) and per-road-material parameters.
//! Relative paths resolve against the config file's directory.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use terraforge_roads::RoadParams;
use terraforge_terrain::is_allowed_size;

use crate::PipelineError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub terrain_name: String,
    pub size_pixels: usize,
    pub max_height: f32,
    pub base_height: f32,
    pub meters_per_pixel: f32,
    /// 16-bit grayscale heightmap PNG.
    pub heightmap: PathBuf,
    /// Optional 8-bit mask of pixels the blender must never touch.
    pub exclusion_mask: Option<PathBuf>,
    /// Optional JSON road feature list (vector input).
    pub road_features: Option<PathBuf>,
    /// Output directory; the CLI may override it.
    pub output_dir: Option<PathBuf>,
    /// Junction locations (pixel coordinates) the user excluded from
    /// harmonization.
    pub excluded_junctions: Vec<[f32; 2]>,
    pub materials: Vec<MaterialConfig>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            terrain_name: "terrain".to_string(),
            size_pixels: 1024,
            max_height: 500.0,
            base_height: 0.0,
            meters_per_pixel: 1.0,
            heightmap: PathBuf::from("heightmap.png"),
            exclusion_mask: None,
            road_features: None,
            output_dir: None,
            excluded_junctions: Vec::new(),
            materials: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MaterialConfig {
    pub name: String,
    /// 8-bit layer mask PNG; absent for the fallback material.
    pub layer: Option<PathBuf>,
    /// RGBA albedo texture for dominant color extraction.
    pub albedo_texture: Option<PathBuf>,
    /// Grayscale roughness texture for dominant roughness extraction.
    pub roughness_texture: Option<PathBuf>,
    /// Present iff this material is a road.
    pub road: Option<RoadParams>,
}

impl PipelineConfig {
    /// Load and validate a TOML config, resolving relative paths against
    /// the config file's directory.
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let text =
            std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
        let mut config: PipelineConfig = toml::from_str(&text)
            .map_err(|e| PipelineError::Validation(format!("config parse error: {e}")))?;
        if let Some(dir) = path.parent() {
            config.resolve_paths(dir);
        }
        config.validate()?;
        Ok(config)
    }

    fn resolve_paths(&mut self, dir: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                let joined = dir.join(p.as_path());
                *p = joined;
            }
        };
        resolve(&mut self.heightmap);
        if let Some(p) = &mut self.exclusion_mask {
            resolve(p);
        }
        if let Some(p) = &mut self.road_features {
            resolve(p);
        }
        if let Some(p) = &mut self.output_dir {
            resolve(p);
        }
        for mat in &mut self.materials {
            if let Some(p) = &mut mat.layer {
                resolve(p);
            }
            if let Some(p) = &mut mat.albedo_texture {
                resolve(p);
            }
            if let Some(p) = &mut mat.roughness_texture {
                resolve(p);
            }
        }
    }

    /// Check every documented config relationship; the first violation
    /// aborts the load.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if !is_allowed_size(self.size_pixels) {
            return Err(PipelineError::Validation(format!(
                "size_pixels {} must be a power of two between 256 and 16384",
                self.size_pixels
            )));
        }
        if self.max_height <= 0.0 {
            return Err(PipelineError::Validation(
                "max_height must be positive".into(),
            ));
        }
        if self.meters_per_pixel <= 0.0 {
            return Err(PipelineError::Validation(
                "meters_per_pixel must be positive".into(),
            ));
        }
        if self.materials.is_empty() {
            return Err(PipelineError::Validation(
                "at least one material is required".into(),
            ));
        }
        if self.materials.len() > 254 {
            return Err(PipelineError::Validation(format!(
                "too many materials: {} (max 254)",
                self.materials.len()
            )));
        }
        let mut seen = std::collections::BTreeSet::new();
        for mat in &self.materials {
            if mat.name.is_empty() {
                return Err(PipelineError::Validation("material with empty name".into()));
            }
            if !seen.insert(&mat.name) {
                return Err(PipelineError::Validation(format!(
                    "duplicate material name '{}'",
                    mat.name
                )));
            }
            if let Some(road) = &mat.road {
                road.validate().map_err(|e| {
                    PipelineError::Validation(format!("material '{}': {e}", mat.name))
                })?;
            }
        }
        Ok(())
    }

    /// Materials that carry road parameters, in declaration order.
    pub fn road_materials(&self) -> impl Iterator<Item = &MaterialConfig> {
        self.materials.iter().filter(|m| m.road.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> PipelineConfig {
        PipelineConfig {
            materials: vec![MaterialConfig {
                name: "grass".into(),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn minimal_config_validates() {
        minimal().validate().unwrap();
    }

    #[test]
    fn non_power_of_two_size_is_rejected() {
        let config = PipelineConfig {
            size_pixels: 1000,
            ..minimal()
        };
        assert!(matches!(
            config.validate(),
            Err(PipelineError::Validation(_))
        ));
    }

    #[test]
    fn duplicate_material_names_are_rejected() {
        let mut config = minimal();
        config.materials.push(MaterialConfig {
            name: "grass".into(),
            ..Default::default()
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn invalid_road_params_point_at_material() {
        let mut config = minimal();
        config.materials.push(MaterialConfig {
            name: "asphalt".into(),
            road: Some(RoadParams {
                global_leveling_strength: 0.9,
                terrain_affected_range_meters: 5.0,
                ..Default::default()
            }),
            ..Default::default()
        });
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("asphalt"));
    }

    #[test]
    fn toml_round_trip() {
        let text = r#"
            terrain_name = "island"
            size_pixels = 512
            max_height = 300.0
            heightmap = "h.png"

            [[materials]]
            name = "grass"

            [[materials]]
            name = "asphalt"
            layer = "roads.png"

            [materials.road]
            road_width_meters = 10.0
            terrain_affected_range_meters = 12.0
        "#;
        let config: PipelineConfig = toml::from_str(text).unwrap();
        assert_eq!(config.terrain_name, "island");
        assert_eq!(config.materials.len(), 2);
        let road = config.materials[1].road.as_ref().unwrap();
        assert_eq!(road.road_width_meters, 10.0);
        // Unspecified road fields fall back to the preset.
        assert_eq!(road.cross_section_interval_meters, 4.0);
        config.validate().unwrap();
    }
}
