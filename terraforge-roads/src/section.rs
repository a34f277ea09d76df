//! Cross-section sampling along fitted splines.
//!
//! Sections are placed at a fixed arc-length interval (first and last
//! always included), carrying unit tangent, right-hand normal and the
//! terrain elevation under the centerline. The optional banking pre-pass
//! derives a superelevation angle from local curvature.

use glam::Vec2;
use terraforge_raster::Grid;

use crate::{params::RoadParams, CrossSection, Spline, SplineId};

/// Rotate a unit tangent by -90 degrees: the right-hand normal of travel.
#[inline]
pub fn right_normal(tangent: Vec2) -> Vec2 {
    Vec2::new(tangent.y, -tangent.x)
}

/// Sample cross-sections for one spline.
///
/// `heights` is the terrain in meters, indexed in pixels; `meters_per_pixel`
/// converts the spline's pixel-space arc length into meters.
pub fn sample_sections(
    spline: &Spline,
    params: &RoadParams,
    heights: &Grid<f32>,
    meters_per_pixel: f32,
) -> Vec<CrossSection> {
    let total_px = spline.curve.total_length();
    let total_m = total_px * meters_per_pixel;
    let interval = params.cross_section_interval_meters;

    let count = ((total_m / interval).ceil() as usize).max(1) + 1;
    let mut sections = Vec::with_capacity(count);

    for i in 0..count {
        let distance_m = (i as f32 * interval).min(total_m);
        let arc_px = distance_m / meters_per_pixel;
        let (center, tangent) = spline.curve.sample_at_arc(arc_px);
        let normal = right_normal(tangent);

        sections.push(CrossSection {
            spline: spline.id,
            local_index: i as u32,
            center,
            tangent,
            normal,
            distance_m,
            road_width_m: params.surface_width(),
            bank_angle_rad: 0.0,
            terrain_elevation: heights.sample_bilinear(center),
            target_elevation: heights.sample_bilinear(center),
            left_edge_elevation: None,
            right_edge_elevation: None,
            excluded: false,
        });
    }

    // The loop can emit a duplicate end section when the length is an exact
    // multiple of the interval.
    dedup_tail(&mut sections);
    sections
}

fn dedup_tail(sections: &mut Vec<CrossSection>) {
    while sections.len() >= 2 {
        let n = sections.len();
        if (sections[n - 1].distance_m - sections[n - 2].distance_m) < 1e-4 {
            sections.remove(n - 2);
        } else {
            break;
        }
    }
    for (i, s) in sections.iter_mut().enumerate() {
        s.local_index = i as u32;
    }
}

/// Mark sections whose center lies inside the exclusion mask.
pub fn mark_excluded(sections: &mut [CrossSection], exclusion: &Grid<bool>) {
    for section in sections.iter_mut() {
        let x = section.center.x.round() as i64;
        let y = section.center.y.round() as i64;
        if exclusion.in_bounds(x, y) && exclusion.get(x as usize, y as usize) {
            section.excluded = true;
        }
    }
}

/// Fill bank angles and banked edge elevations from local curvature.
///
/// Superelevation follows `atan(v^2 * kappa / g)` at the configured design
/// speed, clamped to the maximum bank angle; the outer edge of the turn is
/// raised. Must run after target elevations are final.
pub fn apply_banking(
    sections: &mut [CrossSection],
    spline: &Spline,
    params: &RoadParams,
    meters_per_pixel: f32,
) {
    if !params.enable_banking {
        return;
    }
    let v = params.banking_design_speed_kmh / 3.6;
    let max_bank = params.bank_angle_max_degrees.to_radians();
    let g = 9.81;
    let step_px = params.cross_section_interval_meters / meters_per_pixel;

    for section in sections.iter_mut() {
        let arc_px = section.distance_m / meters_per_pixel;
        let kappa_px = spline.curve.curvature_at_arc(arc_px, step_px);
        let kappa_m = kappa_px / meters_per_pixel;
        let bank = (v * v * kappa_m / g).atan().clamp(-max_bank, max_bank);
        section.bank_angle_rad = bank;

        // Positive curvature turns left; the right edge is the outer edge.
        let half = section.road_width_m * 0.5;
        let offset = half * bank.tan();
        section.left_edge_elevation = Some(section.target_elevation - offset);
        section.right_edge_elevation = Some(section.target_elevation + offset);
    }
}

/// Construction helper shared by tests and the pipeline: wrap raw polyline
/// points into a spline and sample it in one go.
pub fn sections_for_polyline(
    id: SplineId,
    points: &[Vec2],
    params: &RoadParams,
    heights: &Grid<f32>,
    meters_per_pixel: f32,
) -> Option<(Spline, Vec<CrossSection>)> {
    let curve = crate::TcbSpline::fit(
        points,
        params.spline_tension,
        params.spline_continuity,
        params.spline_bias,
        false,
    )
    .ok()?;
    let spline = Spline {
        id,
        total_length_m: curve.total_length() * meters_per_pixel,
        curve,
        material: "road".into(),
        is_roundabout: false,
        state: crate::SplineState::Ordered,
    };
    let sections = sample_sections(&spline, params, heights, meters_per_pixel);
    Some((spline, sections))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn flat_heights(n: usize, value: f32) -> Grid<f32> {
        Grid::filled(n, n, value)
    }

    fn straight_sections(length: f32) -> (Spline, Vec<CrossSection>) {
        let heights = flat_heights(128, 10.0);
        sections_for_polyline(
            SplineId(0),
            &[
                Vec2::new(2.0, 64.0),
                Vec2::new(length / 2.0, 64.0),
                Vec2::new(length, 64.0),
            ],
            &RoadParams::default(),
            &heights,
            1.0,
        )
        .expect("valid polyline")
    }

    #[test]
    fn sections_cover_whole_spline() {
        let (spline, sections) = straight_sections(100.0);
        assert!(sections.len() >= 2);
        assert_relative_eq!(sections[0].distance_m, 0.0);
        assert_relative_eq!(
            sections.last().unwrap().distance_m,
            spline.total_length_m,
            epsilon = 1e-3
        );
        // Interval spacing holds in the interior.
        for w in sections.windows(2) {
            assert!(w[1].distance_m - w[0].distance_m <= 4.0 + 1e-3);
        }
    }

    #[test]
    fn tangent_and_normal_are_orthonormal() {
        let (_, sections) = straight_sections(80.0);
        for s in &sections {
            assert_relative_eq!(s.tangent.length(), 1.0, epsilon = 1e-4);
            assert_relative_eq!(s.normal.length(), 1.0, epsilon = 1e-4);
            assert_relative_eq!(s.tangent.dot(s.normal), 0.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn normal_points_right_of_travel() {
        // Travel along +x: right of travel is -y.
        let (_, sections) = straight_sections(80.0);
        let s = &sections[1];
        assert!(s.tangent.x > 0.9);
        assert!(s.normal.y < -0.9);
    }

    #[test]
    fn terrain_elevation_is_sampled_under_center() {
        let (_, sections) = straight_sections(80.0);
        for s in &sections {
            assert_relative_eq!(s.terrain_elevation, 10.0);
        }
    }

    #[test]
    fn local_indices_are_strictly_increasing() {
        let (_, sections) = straight_sections(100.0);
        for w in sections.windows(2) {
            assert!(w[1].local_index == w[0].local_index + 1);
        }
    }

    #[test]
    fn exclusion_mask_marks_sections() {
        let (_, mut sections) = straight_sections(80.0);
        let mut exclusion = Grid::filled(128, 128, false);
        for x in 0..20 {
            for y in 0..128 {
                exclusion.set(x, y, true);
            }
        }
        mark_excluded(&mut sections, &exclusion);
        assert!(sections[0].excluded);
        assert!(!sections.last().unwrap().excluded);
    }

    #[test]
    fn banking_raises_outer_edge_on_left_turn() {
        let params = RoadParams {
            enable_banking: true,
            ..Default::default()
        };
        let heights = flat_heights(256, 0.0);
        // Quarter circle turning left, radius 40 px.
        let points: Vec<Vec2> = (0..=12)
            .map(|i| {
                let a = i as f32 / 12.0 * std::f32::consts::FRAC_PI_2;
                Vec2::new(100.0 + a.sin() * 40.0, 100.0 + 40.0 - a.cos() * 40.0 - 40.0)
            })
            .collect();
        let curve = crate::TcbSpline::fit(&points, 0.0, 0.0, 0.0, false).unwrap();
        let spline = Spline {
            id: SplineId(0),
            total_length_m: curve.total_length(),
            curve,
            material: "road".into(),
            is_roundabout: false,
            state: crate::SplineState::Ordered,
        };
        let mut sections = sample_sections(&spline, &params, &heights, 1.0);
        apply_banking(&mut sections, &spline, &params, 1.0);

        let mid = sections.len() / 2;
        let s = &sections[mid];
        assert!(s.bank_angle_rad > 0.0);
        assert!(s.right_edge_elevation.unwrap() > s.left_edge_elevation.unwrap());
        assert!(s.bank_angle_rad <= params.bank_angle_max_degrees.to_radians() + 1e-6);
    }

    #[test]
    fn banking_disabled_leaves_edges_unset() {
        let (_, mut sections) = straight_sections(80.0);
        let (spline, _) = straight_sections(80.0);
        apply_banking(&mut sections, &spline, &RoadParams::default(), 1.0);
        assert!(sections.iter().all(|s| s.left_edge_elevation.is_none()));
        assert!(sections.iter().all(|s| s.bank_angle_rad == 0.0));
    }
}
