//! Terrain embedding: carve the road surface into the heightmap and blend
//! the surrounding annulus back into the original terrain.
//!
//! Within the surface half-width every pixel is pinned to the interpolated
//! target elevation and recorded in a protection mask that no later write
//! may override. The annulus blends target toward the original heightmap
//! with the configured blend function, clamped so the embankment slope
//! never exceeds the side slope limit. Corridor overlaps resolve by
//! nearest-centerline distance, ties by processing order (ascending spline
//! id), which keeps the result deterministic.

use std::collections::BTreeMap;

use glam::Vec2;
use terraforge_raster::{gaussian_blur_masked, Grid};
use tracing::{debug, info};

use crate::{junction::MaterialParams, CrossSection, RoadNetwork, SplineState};

/// Result masks of the embedding pass.
pub struct EmbedResult {
    /// Pixels pinned to the road surface.
    pub protection: Grid<bool>,
    /// Road-surface pixels keyed by material, for painting the material
    /// raster.
    pub surface_by_material: BTreeMap<String, Grid<bool>>,
    /// Pixels touched by the blend annulus, keyed by material.
    pub annulus_by_material: BTreeMap<String, Grid<bool>>,
    /// Count of pixels that differ from the original heightmap.
    pub modified_pixels: usize,
}

/// Embed every non-excluded spline of the network into `heights`.
///
/// `heights` starts as a copy of `original` and is mutated in place;
/// `exclusion` pixels are never written.
pub fn embed_network(
    heights: &mut Grid<f32>,
    original: &Grid<f32>,
    network: &mut RoadNetwork,
    params: &MaterialParams,
    meters_per_pixel: f32,
    exclusion: Option<&Grid<bool>>,
) -> EmbedResult {
    let (w, h) = (heights.width(), heights.height());
    let mut protection = Grid::filled(w, h, false);
    let mut surface_by_material: BTreeMap<String, Grid<bool>> = BTreeMap::new();
    let mut annulus_by_material: BTreeMap<String, Grid<bool>> = BTreeMap::new();
    // Nearest-centerline distance seen per pixel, for deterministic overlap
    // resolution.
    let mut best_distance = Grid::filled(w, h, f32::INFINITY);

    for id in network.spline_ids() {
        let (material, sections): (String, Vec<CrossSection>) = {
            let spline = network.spline(id).expect("listed id");
            (spline.material.clone(), network.sections_of(id).to_vec())
        };
        let p = params.get(&material);
        let surface = surface_by_material
            .entry(material.clone())
            .or_insert_with(|| Grid::filled(w, h, false));
        let annulus = annulus_by_material
            .entry(material)
            .or_insert_with(|| Grid::filled(w, h, false));

        embed_spline(
            heights,
            original,
            &sections,
            p.terrain_affected_range_meters,
            p.blend_function,
            p.side_max_slope_degrees,
            meters_per_pixel,
            exclusion,
            &mut protection,
            surface,
            annulus,
            &mut best_distance,
        );

        for spline in network.splines_mut() {
            if spline.id == id {
                spline.state = SplineState::Embedded;
            }
        }
    }

    // Post-process smoothing, annulus only, never the protected surface.
    for (material, annulus) in &annulus_by_material {
        let p = params.get(material);
        if p.smoothing_iterations == 0 || p.smoothing_kernel_size < 3 {
            continue;
        }
        let extension_steps =
            (p.smoothing_mask_extension_meters / meters_per_pixel.max(1e-6)).ceil() as usize;
        let mut write_mask = if extension_steps > 0 {
            annulus.dilate(extension_steps)
        } else {
            annulus.clone()
        };
        for y in 0..h {
            for x in 0..w {
                if protection.get(x, y) {
                    write_mask.set(x, y, false);
                }
                if let Some(excl) = exclusion {
                    if excl.get(x, y) {
                        write_mask.set(x, y, false);
                    }
                }
            }
        }
        gaussian_blur_masked(
            heights,
            &write_mask,
            p.smoothing_kernel_size,
            p.smoothing_sigma,
            p.smoothing_iterations,
        );
        debug!(material = %material, pixels = write_mask.count_set(), "smoothed annulus");
    }

    let modified_pixels = heights
        .data()
        .iter()
        .zip(original.data())
        .filter(|(a, b)| a != b)
        .count();
    info!(modified_pixels, "embedded road network into terrain");

    EmbedResult {
        protection,
        surface_by_material,
        annulus_by_material,
        modified_pixels,
    }
}

#[allow(clippy::too_many_arguments)]
fn embed_spline(
    heights: &mut Grid<f32>,
    original: &Grid<f32>,
    sections: &[CrossSection],
    blend_range_m: f32,
    blend: crate::BlendKind,
    side_max_slope_degrees: f32,
    meters_per_pixel: f32,
    exclusion: Option<&Grid<bool>>,
    protection: &mut Grid<bool>,
    surface: &mut Grid<bool>,
    annulus: &mut Grid<bool>,
    best_distance: &mut Grid<f32>,
) {
    let tan_side = side_max_slope_degrees.to_radians().tan();
    let mpp = meters_per_pixel.max(1e-6);

    for pair in sections.windows(2) {
        let (s0, s1) = (&pair[0], &pair[1]);
        if s0.excluded || s1.excluded {
            continue;
        }
        let half_surface_m = s0.road_width_m * 0.5;
        let corridor_px = (half_surface_m + blend_range_m) / mpp;

        let min = s0.center.min(s1.center) - Vec2::splat(corridor_px + 1.0);
        let max = s0.center.max(s1.center) + Vec2::splat(corridor_px + 1.0);
        let x0 = (min.x.floor() as i64).max(0);
        let y0 = (min.y.floor() as i64).max(0);
        let x1 = (max.x.ceil() as i64).min(heights.width() as i64 - 1);
        let y1 = (max.y.ceil() as i64).min(heights.height() as i64 - 1);

        let seg = s1.center - s0.center;
        let seg_len2 = seg.length_squared().max(1e-12);

        for py in y0..=y1 {
            for px in x0..=x1 {
                let (ux, uy) = (px as usize, py as usize);
                if let Some(excl) = exclusion {
                    if excl.get(ux, uy) {
                        continue;
                    }
                }

                let pixel = Vec2::new(px as f32, py as f32);
                let t = ((pixel - s0.center).dot(seg) / seg_len2).clamp(0.0, 1.0);
                let closest = s0.center + seg * t;
                let d_px = (pixel - closest).length();
                let d_m = d_px * mpp;
                if d_m > half_surface_m + blend_range_m {
                    continue;
                }
                let target = s0.target_elevation * (1.0 - t) + s1.target_elevation * t;

                if d_m <= half_surface_m {
                    if d_px < best_distance.get(ux, uy) || !protection.get(ux, uy) {
                        heights.set(ux, uy, target);
                        protection.set(ux, uy, true);
                        surface.set(ux, uy, true);
                        best_distance.set(ux, uy, d_px);
                    }
                    continue;
                }

                if protection.get(ux, uy) || d_px >= best_distance.get(ux, uy) {
                    continue;
                }

                let tb = (d_m - half_surface_m) / blend_range_m.max(1e-6);
                let weight = blend.apply(tb);
                let orig = original.get(ux, uy);
                let mut candidate = target * (1.0 - weight) + orig * weight;
                // Embankment slope limit, measured from the road edge.
                let max_delta = (d_m - half_surface_m) * tan_side;
                candidate = target + (candidate - target).clamp(-max_delta, max_delta);

                heights.set(ux, uy, candidate);
                annulus.set(ux, uy, true);
                best_distance.set(ux, uy, d_px);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::section::sections_for_polyline;
    use crate::{BlendKind, RoadParams, SplineId};
    use approx::assert_relative_eq;

    fn tilted_heights(n: usize) -> Grid<f32> {
        let mut g = Grid::filled(n, n, 0.0f32);
        for y in 0..n {
            for x in 0..n {
                g.set(x, y, y as f32 * 0.5);
            }
        }
        g
    }

    fn straight_network(n: usize, target: f32, params: &RoadParams) -> RoadNetwork {
        let heights = tilted_heights(n);
        let mut network = RoadNetwork::new();
        let mid = n as f32 / 2.0;
        let (spline, mut sections) = sections_for_polyline(
            SplineId(0),
            &[
                Vec2::new(0.0, mid),
                Vec2::new(n as f32 / 2.0, mid),
                Vec2::new(n as f32 - 1.0, mid),
            ],
            params,
            &heights,
            1.0,
        )
        .unwrap();
        for s in &mut sections {
            s.target_elevation = target;
        }
        network.add_spline(spline, sections).unwrap();
        network
    }

    fn material_map(params: RoadParams) -> BTreeMap<String, RoadParams> {
        let mut map = BTreeMap::new();
        map.insert("road".to_string(), params);
        map
    }

    #[test]
    fn road_surface_is_flat_at_target() {
        let n = 128;
        let p = RoadParams {
            smoothing_iterations: 0,
            ..Default::default()
        };
        let mut network = straight_network(n, 30.0, &p);
        let original = tilted_heights(n);
        let mut working = original.clone();
        let map = material_map(p);
        let params = MaterialParams::new(&map);
        let result = embed_network(&mut working, &original, &mut network, &params, 1.0, None);

        let mid = n / 2;
        // Surface half width 4 px: rows mid-3..=mid+3 fully pinned.
        for x in 10..n - 10 {
            for dy in -3i64..=3 {
                let y = (mid as i64 + dy) as usize;
                assert_relative_eq!(working.get(x, y), 30.0, epsilon = 1e-4);
                assert!(result.protection.get(x, y));
            }
        }
        assert!(result.modified_pixels > 0);
    }

    #[test]
    fn terrain_outside_corridor_is_untouched() {
        let n = 128;
        let p = RoadParams {
            smoothing_iterations: 0,
            ..Default::default()
        };
        let mut network = straight_network(n, 30.0, &p);
        let original = tilted_heights(n);
        let mut working = original.clone();
        let map = material_map(p);
        let params = MaterialParams::new(&map);
        embed_network(&mut working, &original, &mut network, &params, 1.0, None);

        let mid = n / 2;
        for x in 0..n {
            for y in 0..n {
                let d = (y as i64 - mid as i64).unsigned_abs() as f32;
                if d > 15.0 {
                    assert_relative_eq!(working.get(x, y), original.get(x, y));
                }
            }
        }
    }

    #[test]
    fn annulus_follows_cosine_profile() {
        let n = 128;
        let p = RoadParams {
            blend_function: BlendKind::Cosine,
            side_max_slope_degrees: 85.0,
            smoothing_iterations: 0,
            ..Default::default()
        };
        let mut network = straight_network(n, 30.0, &p);
        let original = tilted_heights(n);
        let mut working = original.clone();
        let map = material_map(p.clone());
        let params = MaterialParams::new(&map);
        embed_network(&mut working, &original, &mut network, &params, 1.0, None);

        let mid = (n / 2) as i64;
        let x = 60usize;
        for dy in 5..=13i64 {
            let y = (mid + dy) as usize;
            let d = dy as f32;
            let t = (d - 4.0) / 10.0;
            let weight = BlendKind::Cosine.apply(t);
            let expected = 30.0 * (1.0 - weight) + original.get(x, y) * weight;
            assert_relative_eq!(working.get(x, y), expected, epsilon = 0.05);
        }
    }

    #[test]
    fn blend_is_monotone_between_surface_and_terrain() {
        let n = 128;
        let p = RoadParams {
            smoothing_iterations: 0,
            side_max_slope_degrees: 85.0,
            ..Default::default()
        };
        // Target far below the terrain: profile must descend monotonically
        // from terrain to road moving inward.
        let mut network = straight_network(n, 5.0, &p);
        let original = tilted_heights(n);
        let mut working = original.clone();
        let map = material_map(p);
        let params = MaterialParams::new(&map);
        embed_network(&mut working, &original, &mut network, &params, 1.0, None);

        let mid = (n / 2) as i64;
        let x = 60usize;
        let mut last = working.get(x, (mid + 4) as usize);
        for dy in 5..=14i64 {
            let v = working.get(x, (mid + dy) as usize);
            assert!(v >= last - 1e-4, "profile not monotone at dy={dy}");
            last = v;
        }
    }

    #[test]
    fn side_slope_is_clamped() {
        let n = 128;
        let p = RoadParams {
            side_max_slope_degrees: 10.0,
            smoothing_iterations: 0,
            ..Default::default()
        };
        // 40 m drop from road to terrain forces the clamp.
        let mut network = straight_network(n, 60.0, &p);
        let original = tilted_heights(n);
        let mut working = original.clone();
        let map = material_map(p);
        let params = MaterialParams::new(&map);
        embed_network(&mut working, &original, &mut network, &params, 1.0, None);

        let tan_side = 10.0f32.to_radians().tan();
        let mid = (n / 2) as i64;
        let x = 60usize;
        for dy in 4..=13i64 {
            let a = working.get(x, (mid + dy) as usize);
            let b = working.get(x, (mid + dy + 1) as usize);
            // Inside the annulus the step per pixel obeys the side slope.
            if dy < 13 {
                assert!(
                    (b - a).abs() <= tan_side + 1e-3,
                    "slope violated at dy={dy}: {}",
                    (b - a).abs()
                );
            }
        }
    }

    #[test]
    fn exclusion_zone_is_never_written() {
        let n = 128;
        let p = RoadParams {
            smoothing_iterations: 0,
            ..Default::default()
        };
        let mut network = straight_network(n, 30.0, &p);
        let original = tilted_heights(n);
        let mut working = original.clone();
        let mut exclusion = Grid::filled(n, n, false);
        for x in 40..60 {
            for y in 0..n {
                exclusion.set(x, y, true);
            }
        }
        let map = material_map(p);
        let params = MaterialParams::new(&map);
        embed_network(
            &mut working,
            &original,
            &mut network,
            &params,
            1.0,
            Some(&exclusion),
        );

        for x in 40..60 {
            for y in 0..n {
                assert_relative_eq!(working.get(x, y), original.get(x, y));
            }
        }
        // Outside the exclusion the road still got carved.
        assert_relative_eq!(working.get(80, n / 2), 30.0, epsilon = 1e-4);
    }

    #[test]
    fn excluded_sections_leave_no_trace() {
        let n = 128;
        let p = RoadParams {
            smoothing_iterations: 0,
            ..Default::default()
        };
        let original = tilted_heights(n);
        let mut network = RoadNetwork::new();
        let (spline, mut sections) = sections_for_polyline(
            SplineId(0),
            &[
                Vec2::new(0.0, 64.0),
                Vec2::new(64.0, 64.0),
                Vec2::new(127.0, 64.0),
            ],
            &p,
            &original,
            1.0,
        )
        .unwrap();
        for s in &mut sections {
            s.excluded = true;
        }
        network.add_spline(spline, sections).unwrap();

        let mut working = original.clone();
        let map = material_map(p);
        let params = MaterialParams::new(&map);
        let result = embed_network(&mut working, &original, &mut network, &params, 1.0, None);
        assert_eq!(result.modified_pixels, 0);
    }
}
