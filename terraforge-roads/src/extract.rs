//! Centerline extraction and spline fitting.
//!
//! Raster entry point: distance-transform medial axis -> thinning ->
//! junction-aware path decomposition -> endpoint bridging -> densify ->
//! Douglas-Peucker -> TCB fit. Vector entry point (OSM-style polylines)
//! skips the skeleton stages and goes straight to densify/simplify/fit.

use glam::Vec2;
use terraforge_raster::{distance_transform, Grid};
use tracing::{debug, warn};

use crate::{params::RoadParams, RoadError, Spline, SplineId, SplineState, TcbSpline};

/// An ordered centerline candidate in pixel space.
#[derive(Debug, Clone)]
pub struct ExtractedPath {
    pub points: Vec<Vec2>,
    pub is_roundabout: bool,
}

/// Extract road centerlines from a binary road mask.
pub fn centerlines_from_mask(mask: &Grid<bool>, params: &RoadParams) -> Vec<ExtractedPath> {
    if mask.count_set() == 0 {
        return Vec::new();
    }

    let skeleton = skeletonize(mask);
    let mut paths = decompose_paths(
        &skeleton,
        params.junction_angle_threshold_degrees,
        params.ordering_neighbor_radius_pixels,
    );
    bridge_endpoints(&mut paths, params.bridge_endpoint_max_distance_pixels);

    let mut out = Vec::new();
    for path in paths {
        if let Some(prepared) = prepare_path(path, params, params.min_path_length_pixels) {
            out.push(prepared);
        }
    }
    debug!(paths = out.len(), "extracted centerlines from mask");
    out
}

/// Accept already-ordered polylines (vector/OSM input). `min_path_length`
/// is interpreted in meters here, so the pixel threshold scales by
/// `meters_per_pixel`.
pub fn centerlines_from_polylines(
    lines: &[Vec<Vec2>],
    params: &RoadParams,
    meters_per_pixel: f32,
) -> Vec<ExtractedPath> {
    // `min_path_length_pixels` means meters for vector input.
    let min_len_px = params.min_path_length_pixels / meters_per_pixel.max(1e-6);
    lines
        .iter()
        .filter_map(|line| prepare_path(line.clone(), params, min_len_px))
        .collect()
}

/// Fit TCB splines over extracted paths, assigning sequential ids starting
/// at `first_id`.
pub fn fit_splines(
    paths: &[ExtractedPath],
    params: &RoadParams,
    material: &str,
    meters_per_pixel: f32,
    first_id: u32,
) -> Vec<Spline> {
    let mut splines = Vec::with_capacity(paths.len());
    for (k, path) in paths.iter().enumerate() {
        let curve = match TcbSpline::fit(
            &path.points,
            params.spline_tension,
            params.spline_continuity,
            params.spline_bias,
            path.is_roundabout,
        ) {
            Ok(curve) => curve,
            Err(RoadError::DegenerateSpline(_, reason)) => {
                warn!(path = k, %reason, "skipping degenerate centerline");
                continue;
            }
            Err(e) => {
                warn!(path = k, error = %e, "skipping centerline");
                continue;
            }
        };
        let id = SplineId(first_id + splines.len() as u32);
        splines.push(Spline {
            id,
            total_length_m: curve.total_length() * meters_per_pixel,
            curve,
            material: material.to_string(),
            is_roundabout: path.is_roundabout,
            state: SplineState::Ordered,
        });
    }
    splines
}

/// Densify, simplify, length-filter and roundabout-classify one ordered
/// path. Returns `None` when the path is shorter than `min_length_px`.
fn prepare_path(points: Vec<Vec2>, params: &RoadParams, min_length_px: f32) -> Option<ExtractedPath> {
    if points.len() < 2 {
        return None;
    }
    let densified = densify(&points, params.densify_max_spacing_pixels);
    let mut simplified = douglas_peucker(&densified, params.simplify_tolerance_pixels);
    if simplified.len() < 2 {
        return None;
    }
    if polyline_length(&simplified) < min_length_px {
        return None;
    }
    let is_roundabout = detect_roundabout(&simplified, params);
    if is_roundabout && simplified.len() > 2 {
        // Closed fit: the wrap segment replaces the duplicated endpoint.
        if (simplified[0] - *simplified.last().expect("non-empty")).length()
            < params.bridge_endpoint_max_distance_pixels.max(1.0)
        {
            simplified.pop();
        }
    }
    Some(ExtractedPath {
        points: simplified,
        is_roundabout,
    })
}

// ---------------------------------------------------------------------------
// Skeletonization
// ---------------------------------------------------------------------------

/// Medial axis of the mask: distance-transform ridge, one dilation step to
/// reconnect diagonal ridge fragments, then Zhang-Suen thinning back to a
/// single-pixel skeleton.
pub fn skeletonize(mask: &Grid<bool>) -> Grid<bool> {
    let dt = distance_transform(mask);
    let (w, h) = (mask.width(), mask.height());
    let mut ridge = Grid::filled(w, h, false);

    for y in 0..h {
        for x in 0..w {
            if !mask.get(x, y) {
                continue;
            }
            let d = dt.get(x, y);
            let (xi, yi) = (x as i64, y as i64);
            // Ridge test along both axes and both diagonals: a medial pixel
            // is at least as far from the boundary as one opposing
            // neighbor pair.
            let pairs = [
                ((-1, 0), (1, 0)),
                ((0, -1), (0, 1)),
                ((-1, -1), (1, 1)),
                ((-1, 1), (1, -1)),
            ];
            let on_ridge = pairs.iter().any(|((ax, ay), (bx, by))| {
                let a = sample_dt(&dt, xi + ax, yi + ay);
                let b = sample_dt(&dt, xi + bx, yi + by);
                d >= a && d >= b
            });
            if on_ridge && d >= 1.0 {
                ridge.set(x, y, true);
            }
        }
    }

    let connected = ridge.dilate(1);
    // Keep the dilation inside the original mask.
    let mut clipped = Grid::filled(w, h, false);
    for y in 0..h {
        for x in 0..w {
            clipped.set(x, y, connected.get(x, y) && mask.get(x, y));
        }
    }
    thin(&clipped)
}

fn sample_dt(dt: &Grid<f32>, x: i64, y: i64) -> f32 {
    if dt.in_bounds(x, y) {
        dt.get(x as usize, y as usize)
    } else {
        0.0
    }
}

/// Zhang-Suen thinning to a 1-pixel-wide skeleton.
fn thin(mask: &Grid<bool>) -> Grid<bool> {
    let (w, h) = (mask.width(), mask.height());
    let mut current = mask.clone();

    loop {
        let mut changed = false;
        for sub in 0..2 {
            let mut to_clear = Vec::new();
            for y in 0..h {
                for x in 0..w {
                    if !current.get(x, y) {
                        continue;
                    }
                    let n = ring_neighbors(&current, x, y);
                    let count = n.iter().filter(|v| **v).count();
                    if !(2..=6).contains(&count) {
                        continue;
                    }
                    // Transitions false -> true around the ring.
                    let transitions = (0..8)
                        .filter(|i| !n[*i] && n[(*i + 1) % 8])
                        .count();
                    if transitions != 1 {
                        continue;
                    }
                    // Ring order: p2 n[0], p3 n[1], ... p9 n[7].
                    let (p2, p4, p6, p8) = (n[0], n[2], n[4], n[6]);
                    let ok = if sub == 0 {
                        !(p2 && p4 && p6) && !(p4 && p6 && p8)
                    } else {
                        !(p2 && p4 && p8) && !(p2 && p6 && p8)
                    };
                    if ok {
                        to_clear.push((x, y));
                    }
                }
            }
            if !to_clear.is_empty() {
                changed = true;
                for (x, y) in to_clear {
                    current.set(x, y, false);
                }
            }
        }
        if !changed {
            return current;
        }
    }
}

/// The 8-neighborhood in Zhang-Suen ring order, starting north and going
/// clockwise: N, NE, E, SE, S, SW, W, NW.
fn ring_neighbors(mask: &Grid<bool>, x: usize, y: usize) -> [bool; 8] {
    let (xi, yi) = (x as i64, y as i64);
    let at = |dx: i64, dy: i64| -> bool {
        mask.in_bounds(xi + dx, yi + dy) && mask.get((xi + dx) as usize, (yi + dy) as usize)
    };
    [
        at(0, 1),
        at(1, 1),
        at(1, 0),
        at(1, -1),
        at(0, -1),
        at(-1, -1),
        at(-1, 0),
        at(-1, 1),
    ]
}

// ---------------------------------------------------------------------------
// Path decomposition
// ---------------------------------------------------------------------------

/// Walk the skeleton into ordered pixel paths, splitting at branch points
/// and merging straight-through continuations whose direction change stays
/// below `angle_threshold_degrees`. Skeleton fragments the walk cannot
/// reach (isolated medial-axis clusters) are chained by greedy
/// nearest-neighbor ordering within `ordering_radius` pixels.
pub fn decompose_paths(
    skeleton: &Grid<bool>,
    angle_threshold_degrees: f32,
    ordering_radius: f32,
) -> Vec<Vec<Vec2>> {
    let (w, h) = (skeleton.width(), skeleton.height());
    let degree = |x: usize, y: usize| -> usize {
        ring_neighbors(skeleton, x, y).iter().filter(|v| **v).count()
    };

    // Node pixels are endpoints (degree 1) and branch points (degree >= 3).
    let mut is_node = Grid::filled(w, h, false);
    let mut nodes = Vec::new();
    for y in 0..h {
        for x in 0..w {
            if skeleton.get(x, y) {
                let d = degree(x, y);
                if d != 2 {
                    is_node.set(x, y, true);
                    nodes.push((x, y));
                }
            }
        }
    }

    let mut visited = Grid::filled(w, h, false);
    let mut raw_paths: Vec<Vec<(usize, usize)>> = Vec::new();
    // Direct node-to-node edges would otherwise be walked from both ends.
    let mut node_edges: std::collections::BTreeSet<((usize, usize), (usize, usize))> =
        std::collections::BTreeSet::new();

    // Walk every edge leaving a node.
    for &(nx, ny) in &nodes {
        for (sx, sy) in neighbors8(skeleton, nx, ny) {
            if visited.get(sx, sy) && !is_node.get(sx, sy) {
                continue;
            }
            if is_node.get(sx, sy) {
                let key = if (nx, ny) < (sx, sy) {
                    ((nx, ny), (sx, sy))
                } else {
                    ((sx, sy), (nx, ny))
                };
                if !node_edges.insert(key) {
                    continue;
                }
            }
            let path = walk(skeleton, &is_node, &mut visited, (nx, ny), (sx, sy));
            if path.len() >= 2 {
                raw_paths.push(path);
            }
        }
    }

    // Remaining unvisited degree-2 pixels form pure cycles.
    for y in 0..h {
        for x in 0..w {
            if skeleton.get(x, y) && !visited.get(x, y) && !is_node.get(x, y) {
                let cycle = walk_cycle(skeleton, &mut visited, (x, y));
                if cycle.len() >= 4 {
                    raw_paths.push(cycle);
                }
            }
        }
    }

    let mut paths: Vec<Vec<Vec2>> = raw_paths
        .into_iter()
        .map(|p| p.into_iter().map(|(x, y)| Vec2::new(x as f32, y as f32)).collect())
        .collect();

    // Whatever the walk could not order (scattered medial-axis fragments)
    // gets chained greedily instead of being dropped.
    let mut leftover: Vec<Vec2> = Vec::new();
    for y in 0..h {
        for x in 0..w {
            if skeleton.get(x, y) && !visited.get(x, y) && !is_node.get(x, y) {
                leftover.push(Vec2::new(x as f32, y as f32));
            }
        }
    }
    if leftover.len() >= 2 {
        let ordered = greedy_order(&leftover, ordering_radius.max(1.5));
        if ordered.len() >= 2 {
            paths.push(ordered);
        }
    }

    merge_straight_through(&mut paths, angle_threshold_degrees);
    paths
}

fn neighbors8(mask: &Grid<bool>, x: usize, y: usize) -> Vec<(usize, usize)> {
    let mut out = Vec::new();
    let (xi, yi) = (x as i64, y as i64);
    for (dx, dy) in [
        (0, 1),
        (1, 1),
        (1, 0),
        (1, -1),
        (0, -1),
        (-1, -1),
        (-1, 0),
        (-1, 1),
    ] {
        let (nx, ny) = (xi + dx, yi + dy);
        if mask.in_bounds(nx, ny) && mask.get(nx as usize, ny as usize) {
            out.push((nx as usize, ny as usize));
        }
    }
    out
}

/// Follow a chain of degree-2 pixels from `start` (a node) through `first`
/// until the next node.
fn walk(
    skeleton: &Grid<bool>,
    is_node: &Grid<bool>,
    visited: &mut Grid<bool>,
    start: (usize, usize),
    first: (usize, usize),
) -> Vec<(usize, usize)> {
    let mut path = vec![start];
    let mut prev = start;
    let mut current = first;

    loop {
        path.push(current);
        if is_node.get(current.0, current.1) {
            break;
        }
        if visited.get(current.0, current.1) {
            return Vec::new(); // already consumed by another walk
        }
        visited.set(current.0, current.1, true);

        let next = neighbors8(skeleton, current.0, current.1)
            .into_iter()
            .find(|n| *n != prev && (!visited.get(n.0, n.1) || is_node.get(n.0, n.1)));
        match next {
            Some(n) => {
                prev = current;
                current = n;
            }
            None => break,
        }
    }
    path
}

/// Walk an isolated cycle starting anywhere on it.
fn walk_cycle(
    skeleton: &Grid<bool>,
    visited: &mut Grid<bool>,
    start: (usize, usize),
) -> Vec<(usize, usize)> {
    let mut path = vec![start];
    visited.set(start.0, start.1, true);
    let mut prev = start;
    let mut current = match neighbors8(skeleton, start.0, start.1).first() {
        Some(n) => *n,
        None => return path,
    };

    while current != start {
        path.push(current);
        visited.set(current.0, current.1, true);
        let next = neighbors8(skeleton, current.0, current.1)
            .into_iter()
            .find(|n| *n != prev && !visited.get(n.0, n.1));
        match next {
            Some(n) => {
                prev = current;
                current = n;
            }
            None => break,
        }
    }
    // Close the ring explicitly; roundabout detection keys off this.
    path.push(start);
    path
}

/// Direction of the first few pixels of a path, pointing away from its
/// start.
fn head_direction(path: &[Vec2]) -> Vec2 {
    let k = path.len().min(5);
    (path[k - 1] - path[0]).normalize_or_zero()
}

fn tail_direction(path: &[Vec2]) -> Vec2 {
    let n = path.len();
    let k = n.min(5);
    (path[n - 1] - path[n - k]).normalize_or_zero()
}

/// Merge path pairs that meet at a shared endpoint and continue nearly
/// straight, so a road crossing a side road stays one spline.
fn merge_straight_through(paths: &mut Vec<Vec<Vec2>>, angle_threshold_degrees: f32) {
    let cos_limit = (angle_threshold_degrees.to_radians()).cos();
    loop {
        let mut best: Option<(usize, usize, bool, bool, f32)> = None;
        for i in 0..paths.len() {
            for j in (i + 1)..paths.len() {
                // (i end, j end) combinations: (tail,head) (tail,tail)
                // (head,head) (head,tail)
                let candidates = [
                    (false, true),
                    (false, false),
                    (true, true),
                    (true, false),
                ];
                for (flip_i, flip_j) in candidates {
                    let pi = if flip_i { paths[i][0] } else { *paths[i].last().expect("non-empty") };
                    let pj = if flip_j { *paths[j].last().expect("non-empty") } else { paths[j][0] };
                    if (pi - pj).length() > 1.9 {
                        continue;
                    }
                    let di = if flip_i {
                        -head_direction(&paths[i])
                    } else {
                        tail_direction(&paths[i])
                    };
                    let dj = if flip_j {
                        -tail_direction(&paths[j])
                    } else {
                        head_direction(&paths[j])
                    };
                    let alignment = di.dot(dj);
                    if alignment >= cos_limit
                        && best.map(|b| alignment > b.4).unwrap_or(true)
                    {
                        best = Some((i, j, flip_i, flip_j, alignment));
                    }
                }
            }
        }

        let Some((i, j, flip_i, flip_j, _)) = best else {
            return;
        };
        let mut left = paths[i].clone();
        if flip_i {
            left.reverse();
        }
        let mut right = paths[j].clone();
        if !flip_j {
            // keep as is (head joins)
        } else {
            right.reverse();
        }
        if left.last() == right.first() {
            right.remove(0);
        }
        left.extend(right);
        paths[i] = left;
        paths.remove(j);
    }
}

/// Connect endpoints of different paths whose gap is at most
/// `max_distance` pixels (disconnected skeleton fragments).
///
/// Touching endpoints (gap below two pixels) are junction arms, not
/// fragments, and stay separate.
pub fn bridge_endpoints(paths: &mut Vec<Vec<Vec2>>, max_distance: f32) {
    const MIN_GAP: f32 = 1.9;
    if max_distance <= MIN_GAP {
        return;
    }
    loop {
        let mut best: Option<(usize, usize, bool, bool, f32)> = None;
        for i in 0..paths.len() {
            for j in (i + 1)..paths.len() {
                for (flip_i, flip_j) in [(false, true), (false, false), (true, true), (true, false)]
                {
                    let pi = if flip_i { paths[i][0] } else { *paths[i].last().expect("non-empty") };
                    let pj = if flip_j { *paths[j].last().expect("non-empty") } else { paths[j][0] };
                    let gap = (pi - pj).length();
                    if gap > MIN_GAP
                        && gap <= max_distance
                        && best.map(|b| gap < b.4).unwrap_or(true)
                    {
                        best = Some((i, j, flip_i, flip_j, gap));
                    }
                }
            }
        }
        let Some((i, j, flip_i, flip_j, _)) = best else {
            return;
        };
        let mut left = paths[i].clone();
        if flip_i {
            left.reverse();
        }
        let mut right = paths[j].clone();
        if flip_j {
            right.reverse();
        }
        left.extend(right);
        paths[i] = left;
        paths.remove(j);
    }
}

// ---------------------------------------------------------------------------
// Geometry helpers
// ---------------------------------------------------------------------------

pub fn polyline_length(points: &[Vec2]) -> f32 {
    points.windows(2).map(|w| (w[1] - w[0]).length()).sum()
}

/// Insert points so no segment exceeds `max_spacing`.
pub fn densify(points: &[Vec2], max_spacing: f32) -> Vec<Vec2> {
    if max_spacing <= 0.0 || points.len() < 2 {
        return points.to_vec();
    }
    let mut out = Vec::with_capacity(points.len());
    out.push(points[0]);
    for w in points.windows(2) {
        let span = (w[1] - w[0]).length();
        let steps = (span / max_spacing).ceil() as usize;
        for k in 1..=steps.max(1) {
            out.push(w[0].lerp(w[1], k as f32 / steps.max(1) as f32));
        }
    }
    out
}

/// Douglas-Peucker polyline simplification.
pub fn douglas_peucker(points: &[Vec2], tolerance: f32) -> Vec<Vec2> {
    if points.len() < 3 || tolerance <= 0.0 {
        return points.to_vec();
    }
    let mut keep = vec![false; points.len()];
    keep[0] = true;
    keep[points.len() - 1] = true;
    dp_recurse(points, 0, points.len() - 1, tolerance, &mut keep);
    points
        .iter()
        .zip(&keep)
        .filter_map(|(p, k)| k.then_some(*p))
        .collect()
}

fn dp_recurse(points: &[Vec2], first: usize, last: usize, tolerance: f32, keep: &mut [bool]) {
    if last <= first + 1 {
        return;
    }
    let a = points[first];
    let b = points[last];
    let mut max_dist = 0.0;
    let mut index = first;
    for i in (first + 1)..last {
        let d = point_segment_distance(points[i], a, b);
        if d > max_dist {
            max_dist = d;
            index = i;
        }
    }
    if max_dist > tolerance {
        keep[index] = true;
        dp_recurse(points, first, index, tolerance, keep);
        dp_recurse(points, index, last, tolerance, keep);
    }
}

fn point_segment_distance(p: Vec2, a: Vec2, b: Vec2) -> f32 {
    let ab = b - a;
    let len2 = ab.length_squared();
    if len2 < 1e-12 {
        return (p - a).length();
    }
    let t = ((p - a).dot(ab) / len2).clamp(0.0, 1.0);
    (p - (a + ab * t)).length()
}

/// Greedy nearest-neighbor ordering for point sets that carry no traversal
/// order. Starts from the most extreme point (lowest x, then y) and chains
/// to the nearest unvisited point within `radius`; points beyond the radius
/// start a break and are dropped from the chain.
pub fn greedy_order(points: &[Vec2], radius: f32) -> Vec<Vec2> {
    if points.len() < 2 {
        return points.to_vec();
    }
    let mut remaining: Vec<Vec2> = points.to_vec();
    remaining.sort_by(|a, b| {
        a.x.partial_cmp(&b.x)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.y.partial_cmp(&b.y).unwrap_or(std::cmp::Ordering::Equal))
    });

    let mut ordered = vec![remaining.remove(0)];
    while !remaining.is_empty() {
        let current = *ordered.last().expect("non-empty");
        let (best_idx, best_dist) = remaining
            .iter()
            .enumerate()
            .map(|(i, p)| (i, (*p - current).length()))
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .expect("non-empty");
        if best_dist > radius {
            break;
        }
        ordered.push(remaining.remove(best_idx));
    }
    ordered
}

/// A path is a roundabout candidate when it closes on itself and encloses
/// a plausibly sized, reasonably circular area.
fn detect_roundabout(points: &[Vec2], params: &RoadParams) -> bool {
    if points.len() < 8 {
        return false;
    }
    let close_radius = params.bridge_endpoint_max_distance_pixels.max(2.0);
    if (points[0] - *points.last().expect("non-empty")).length() > close_radius {
        return false;
    }
    let area = polygon_area(points).abs();
    let perimeter = polyline_length(points);
    if perimeter <= 0.0 {
        return false;
    }
    // Circularity: 1 for a circle, lower for elongated loops.
    let circularity = 4.0 * std::f32::consts::PI * area / (perimeter * perimeter);
    let min_area = std::f32::consts::PI * 3.0 * 3.0;
    let max_area = std::f32::consts::PI * 60.0 * 60.0;
    circularity > 0.6 && (min_area..=max_area).contains(&area)
}

fn polygon_area(points: &[Vec2]) -> f32 {
    let n = points.len();
    let mut sum = 0.0;
    for i in 0..n {
        let j = (i + 1) % n;
        sum += points[i].x * points[j].y - points[j].x * points[i].y;
    }
    sum * 0.5
}
