//! Per-road-material parameters.
//!
//! One flat record drives every stage for one road material: corridor
//! geometry, smoothing filter, junction handling, centerline extraction
//! and mesh options. Defaults follow the shipped two-lane-road preset.

use serde::{Deserialize, Serialize};

use crate::RoadError;

/// Shape of the blend between road target elevation and original terrain.
///
/// All kinds map `t in [0,1]` monotonically onto `[0,1]` with `f(0) = 0`
/// (road side) and `f(1) = 1` (terrain side).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BlendKind {
    Linear,
    #[default]
    Cosine,
    Cubic,
    Quintic,
}

impl BlendKind {
    /// Evaluate the blend weight at `t`, clamped to `[0, 1]`.
    #[inline]
    pub fn apply(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            BlendKind::Linear => t,
            BlendKind::Cosine => (1.0 - (std::f32::consts::PI * t).cos()) * 0.5,
            BlendKind::Cubic => t * t * (3.0 - 2.0 * t),
            BlendKind::Quintic => t * t * t * (t * (t * 6.0 - 15.0) + 10.0),
        }
    }
}

/// Longitudinal elevation filter selection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum FilterKind {
    /// Zero-phase Butterworth low-pass; `window` (odd) sets the cutoff.
    Butterworth { order: usize, window: usize },
    /// Centered moving average over an odd `window`.
    BoxAverage { window: usize },
}

impl Default for FilterKind {
    fn default() -> Self {
        FilterKind::Butterworth {
            order: 4,
            window: 21,
        }
    }
}

impl FilterKind {
    pub fn window(&self) -> usize {
        match self {
            FilterKind::Butterworth { window, .. } | FilterKind::BoxAverage { window } => *window,
        }
    }
}

/// Full parameter set for one road material.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoadParams {
    /// Blend corridor width: the span the road influences at full strength.
    pub road_width_meters: f32,
    /// Painted surface width; defaults to the corridor width when absent.
    pub road_surface_width_meters: Option<f32>,
    /// Blend annulus span outside the road surface.
    pub terrain_affected_range_meters: f32,
    pub cross_section_interval_meters: f32,
    pub road_max_slope_degrees: f32,
    pub side_max_slope_degrees: f32,
    pub blend_function: BlendKind,
    pub filter: FilterKind,
    /// 0 = follow terrain, 1 = level the whole network to its mean.
    pub global_leveling_strength: f32,

    // Post-process smoothing over the blend annulus.
    pub smoothing_kernel_size: usize,
    pub smoothing_sigma: f32,
    pub smoothing_mask_extension_meters: f32,
    pub smoothing_iterations: usize,

    // Junctions.
    pub enable_junction_harmonization: bool,
    pub junction_detection_radius_meters: f32,
    pub junction_blend_distance_meters: f32,
    pub junction_blend_function: BlendKind,

    // Free spline endpoints.
    pub enable_endpoint_taper: bool,
    pub endpoint_taper_distance_meters: f32,
    pub endpoint_terrain_blend_strength: f32,

    // Centerline extraction.
    pub densify_max_spacing_pixels: f32,
    pub simplify_tolerance_pixels: f32,
    pub min_path_length_pixels: f32,
    pub bridge_endpoint_max_distance_pixels: f32,
    pub ordering_neighbor_radius_pixels: f32,
    pub junction_angle_threshold_degrees: f32,

    // Kochanek-Bartels coefficients.
    pub spline_tension: f32,
    pub spline_continuity: f32,
    pub spline_bias: f32,

    // Banking.
    pub enable_banking: bool,
    pub banking_design_speed_kmh: f32,
    pub bank_angle_max_degrees: f32,

    // Mesh.
    pub texture_repeat_meters_u: f32,
    pub texture_repeat_meters_v: f32,
    pub smooth_normals: bool,
    pub generate_end_caps: bool,
    pub include_shoulders: bool,
    pub shoulder_width_meters: f32,
    pub shoulder_drop_meters: f32,
    pub include_curbs: bool,
    pub curb_width_meters: f32,
    pub curb_height_meters: f32,
}

impl Default for RoadParams {
    fn default() -> Self {
        Self {
            road_width_meters: 8.0,
            road_surface_width_meters: None,
            terrain_affected_range_meters: 10.0,
            cross_section_interval_meters: 4.0,
            road_max_slope_degrees: 7.0,
            side_max_slope_degrees: 33.0,
            blend_function: BlendKind::Cosine,
            filter: FilterKind::default(),
            global_leveling_strength: 0.0,
            smoothing_kernel_size: 5,
            smoothing_sigma: 1.2,
            smoothing_mask_extension_meters: 0.0,
            smoothing_iterations: 1,
            enable_junction_harmonization: true,
            junction_detection_radius_meters: 12.0,
            junction_blend_distance_meters: 20.0,
            junction_blend_function: BlendKind::Cosine,
            enable_endpoint_taper: true,
            endpoint_taper_distance_meters: 12.0,
            endpoint_terrain_blend_strength: 1.0,
            densify_max_spacing_pixels: 2.0,
            simplify_tolerance_pixels: 1.5,
            min_path_length_pixels: 12.0,
            bridge_endpoint_max_distance_pixels: 6.0,
            ordering_neighbor_radius_pixels: 3.0,
            junction_angle_threshold_degrees: 35.0,
            spline_tension: 0.0,
            spline_continuity: 0.0,
            spline_bias: 0.0,
            enable_banking: false,
            banking_design_speed_kmh: 80.0,
            bank_angle_max_degrees: 6.0,
            texture_repeat_meters_u: 12.0,
            texture_repeat_meters_v: 1.0,
            smooth_normals: true,
            generate_end_caps: false,
            include_shoulders: false,
            shoulder_width_meters: 1.5,
            shoulder_drop_meters: 0.12,
            include_curbs: false,
            curb_width_meters: 0.4,
            curb_height_meters: 0.15,
        }
    }
}

impl RoadParams {
    /// Painted surface width (never wider than the corridor).
    pub fn surface_width(&self) -> f32 {
        self.road_surface_width_meters
            .unwrap_or(self.road_width_meters)
            .min(self.road_width_meters)
    }

    /// Validate documented parameter relationships.
    pub fn validate(&self) -> Result<(), RoadError> {
        let err = |msg: String| Err(RoadError::InvalidParams(msg));

        if self.road_width_meters <= 0.0 {
            return err("road_width_meters must be positive".into());
        }
        if self.cross_section_interval_meters <= 0.0 {
            return err("cross_section_interval_meters must be positive".into());
        }
        let window = self.filter.window();
        if window % 2 == 0 {
            return err(format!("smoothing window must be odd, got {window}"));
        }
        if let FilterKind::Butterworth { order, .. } = self.filter {
            if !(2..=5).contains(&order) {
                return err(format!("butterworth order must be within 2..=5, got {order}"));
            }
        }
        if !(0.0..=1.0).contains(&self.global_leveling_strength) {
            return err("global_leveling_strength must lie in [0, 1]".into());
        }
        // Heavy leveling needs enough blend range to absorb the offset,
        // otherwise the road visibly detaches from the terrain.
        if self.global_leveling_strength > 0.5 && self.terrain_affected_range_meters < 15.0 {
            return err(format!(
                "global_leveling_strength {} requires terrain_affected_range_meters >= 15",
                self.global_leveling_strength
            ));
        }
        if self.global_leveling_strength > 0.3 && self.terrain_affected_range_meters < 12.0 {
            return err(format!(
                "global_leveling_strength {} requires terrain_affected_range_meters >= 12",
                self.global_leveling_strength
            ));
        }
        let max_interval =
            (self.road_width_meters / 2.0 + self.terrain_affected_range_meters) / 3.0;
        if self.cross_section_interval_meters > max_interval {
            return err(format!(
                "cross_section_interval_meters {} exceeds (road_width/2 + blend_range)/3 = {max_interval}",
                self.cross_section_interval_meters
            ));
        }
        if !(0.0..90.0).contains(&self.road_max_slope_degrees)
            || !(0.0..90.0).contains(&self.side_max_slope_degrees)
        {
            return err("slope limits must lie in [0, 90) degrees".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn blend_kinds_hit_both_ends() {
        for kind in [
            BlendKind::Linear,
            BlendKind::Cosine,
            BlendKind::Cubic,
            BlendKind::Quintic,
        ] {
            assert_relative_eq!(kind.apply(0.0), 0.0);
            assert_relative_eq!(kind.apply(1.0), 1.0);
            assert_relative_eq!(kind.apply(0.5), 0.5, epsilon = 1e-6);
        }
    }

    #[test]
    fn blend_kinds_are_monotone() {
        for kind in [
            BlendKind::Linear,
            BlendKind::Cosine,
            BlendKind::Cubic,
            BlendKind::Quintic,
        ] {
            let mut last = -1.0;
            for i in 0..=100 {
                let v = kind.apply(i as f32 / 100.0);
                assert!(v >= last);
                last = v;
            }
        }
    }

    #[test]
    fn default_params_validate() {
        RoadParams::default().validate().unwrap();
    }

    #[test]
    fn even_window_is_rejected() {
        let params = RoadParams {
            filter: FilterKind::BoxAverage { window: 10 },
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn leveling_requires_blend_range() {
        let params = RoadParams {
            global_leveling_strength: 0.4,
            terrain_affected_range_meters: 10.0,
            ..Default::default()
        };
        assert!(params.validate().is_err());

        let ok = RoadParams {
            global_leveling_strength: 0.4,
            terrain_affected_range_meters: 12.0,
            ..Default::default()
        };
        ok.validate().unwrap();
    }

    #[test]
    fn oversized_section_interval_is_rejected() {
        let params = RoadParams {
            cross_section_interval_meters: 8.0,
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn surface_width_never_exceeds_corridor() {
        let params = RoadParams {
            road_width_meters: 8.0,
            road_surface_width_meters: Some(12.0),
            ..Default::default()
        };
        assert_relative_eq!(params.surface_width(), 8.0);
    }
}
