//! Longitudinal elevation smoothing.
//!
//! Builds the target elevation profile for one spline: a median seed taken
//! across the road width, a zero-phase Butterworth (or box) low-pass along
//! the spline, optional leveling toward a reference elevation, and an
//! iterative clamp to the maximum road slope.

use glam::Vec2;
use terraforge_raster::Grid;
use tracing::warn;

use crate::{params::{FilterKind, RoadParams}, CrossSection};

/// Perpendicular samples per cross-section for the seed profile.
const SEED_SAMPLES: usize = 5;
/// Iteration budget for the slope clamp.
const SLOPE_ITERATIONS: usize = 100;

/// Compute target elevations for one spline's sections.
///
/// `level_reference` is the elevation the profile is pulled toward by
/// `global_leveling_strength` (network or spline mean).
pub fn compute_targets(
    sections: &[CrossSection],
    heights: &Grid<f32>,
    params: &RoadParams,
    meters_per_pixel: f32,
    level_reference: f32,
) -> Vec<f32> {
    let mut profile = seed_profile(sections, heights, meters_per_pixel);

    match params.filter {
        FilterKind::Butterworth { order, window } => {
            butterworth_zero_phase(&mut profile, order, window);
        }
        FilterKind::BoxAverage { window } => {
            box_filter(&mut profile, window);
        }
    }

    let strength = params.global_leveling_strength;
    if strength > 0.0 {
        for value in &mut profile {
            *value = *value * (1.0 - strength) + level_reference * strength;
        }
    }

    let distances: Vec<f32> = sections.iter().map(|s| s.distance_m).collect();
    enforce_max_slope(&mut profile, &distances, params.road_max_slope_degrees);

    profile
}

/// Median of terrain elevations sampled across the road width at each
/// section. The median is robust against a single noisy pixel under the
/// centerline.
pub fn seed_profile(
    sections: &[CrossSection],
    heights: &Grid<f32>,
    meters_per_pixel: f32,
) -> Vec<f32> {
    sections
        .iter()
        .map(|section| {
            let half_px = section.road_width_m * 0.5 / meters_per_pixel;
            let mut samples = [0.0f32; SEED_SAMPLES];
            for (k, sample) in samples.iter_mut().enumerate() {
                let t = k as f32 / (SEED_SAMPLES - 1) as f32 * 2.0 - 1.0;
                let pos: Vec2 = section.center + section.normal * (t * half_px);
                *sample = heights.sample_bilinear(pos);
            }
            samples.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            samples[SEED_SAMPLES / 2]
        })
        .collect()
}

/// One second-order filter section (direct form II transposed).
#[derive(Debug, Clone, Copy)]
struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl Biquad {
    fn run(&self, signal: &mut [f64]) {
        if signal.is_empty() {
            return;
        }
        // Steady-state initial conditions for a step at the first sample,
        // so constants pass through without a warm-up transient.
        let x0 = signal[0];
        let mut z1 = (1.0 - self.b0) * x0;
        let mut z2 = (self.b2 - self.a2) * x0;
        for x in signal.iter_mut() {
            let input = *x;
            let output = self.b0 * input + z1;
            z1 = self.b1 * input - self.a1 * output + z2;
            z2 = self.b2 * input - self.a2 * output;
            *x = output;
        }
    }
}

/// Design a low-pass Butterworth of the given order as cascaded biquads.
///
/// The cutoff is derived from the smoothing window: `fc = 1 / window`
/// cycles per sample, prewarped through the bilinear transform. Odd orders
/// get one first-order tail section (`a2 = b2 = 0`).
fn design_butterworth(order: usize, window: usize) -> Vec<Biquad> {
    let fc = (1.0 / window.max(3) as f64).min(0.45);
    let k = (std::f64::consts::PI * fc).tan();
    let k2 = k * k;
    let mut sections = Vec::new();

    let pairs = order / 2;
    for p in 0..pairs {
        let theta = std::f64::consts::PI * (2.0 * p as f64 + order as f64 + 1.0)
            / (2.0 * order as f64);
        let q = -2.0 * theta.cos();
        let norm = 1.0 / (1.0 + q * k + k2);
        sections.push(Biquad {
            b0: k2 * norm,
            b1: 2.0 * k2 * norm,
            b2: k2 * norm,
            a1: 2.0 * (k2 - 1.0) * norm,
            a2: (1.0 - q * k + k2) * norm,
        });
    }
    if order % 2 == 1 {
        let norm = 1.0 / (1.0 + k);
        sections.push(Biquad {
            b0: k * norm,
            b1: k * norm,
            b2: 0.0,
            a1: (k - 1.0) * norm,
            a2: 0.0,
        });
    }
    sections
}

/// Forward-backward Butterworth: zero phase, unity DC gain.
///
/// The signal is extended by odd reflection at both ends so the filter
/// state warms up outside the data; a linear profile passes through
/// unchanged.
pub fn butterworth_zero_phase(profile: &mut [f32], order: usize, window: usize) {
    let n = profile.len();
    if n < 3 {
        return;
    }
    let sections = design_butterworth(order.clamp(2, 5), window);
    // Long reflection padding: the slowest pole must decay before the data
    // starts, otherwise ramps pick up an edge transient.
    let pad = (6 * window.max(3)).min(n - 1);

    let mut extended = Vec::with_capacity(n + 2 * pad);
    let first = profile[0] as f64;
    let last = profile[n - 1] as f64;
    for i in (1..=pad).rev() {
        extended.push(2.0 * first - profile[i] as f64);
    }
    extended.extend(profile.iter().map(|v| *v as f64));
    for i in 1..=pad {
        extended.push(2.0 * last - profile[n - 1 - i] as f64);
    }

    for pass in 0..2 {
        for section in &sections {
            section.run(&mut extended);
        }
        if pass == 0 {
            extended.reverse();
        }
    }
    extended.reverse();

    for (value, filtered) in profile.iter_mut().zip(extended[pad..pad + n].iter()) {
        *value = *filtered as f32;
    }
}

/// Centered moving average with a symmetrically shrinking window at the
/// ends (endpoints stay fixed, linear profiles pass through unchanged).
pub fn box_filter(profile: &mut [f32], window: usize) {
    let n = profile.len();
    if n < 3 || window < 3 {
        return;
    }
    let half = window / 2;
    let source = profile.to_vec();
    for (i, value) in profile.iter_mut().enumerate() {
        let reach = half.min(i).min(n - 1 - i);
        if reach == 0 {
            continue;
        }
        let sum: f32 = source[i - reach..=i + reach].iter().sum();
        *value = sum / (2 * reach + 1) as f32;
    }
}

/// Clamp consecutive elevation differences to the maximum road slope with
/// alternating forward/backward relaxation. Returns the iterations used;
/// when the budget runs out the best effort result is kept and a warning
/// logged.
pub fn enforce_max_slope(profile: &mut [f32], distances: &[f32], max_slope_degrees: f32) -> usize {
    let n = profile.len();
    if n < 2 {
        return 0;
    }
    let tan_max = max_slope_degrees.to_radians().tan();

    for iteration in 0..SLOPE_ITERATIONS {
        let mut changed = false;
        for i in 1..n {
            let max_delta = (distances[i] - distances[i - 1]).max(0.0) * tan_max;
            let clamped = profile[i].clamp(profile[i - 1] - max_delta, profile[i - 1] + max_delta);
            if (clamped - profile[i]).abs() > 1e-6 {
                profile[i] = clamped;
                changed = true;
            }
        }
        for i in (0..n - 1).rev() {
            let max_delta = (distances[i + 1] - distances[i]).max(0.0) * tan_max;
            let clamped = profile[i].clamp(profile[i + 1] - max_delta, profile[i + 1] + max_delta);
            if (clamped - profile[i]).abs() > 1e-6 {
                profile[i] = clamped;
                changed = true;
            }
        }
        if !changed {
            return iteration + 1;
        }
    }

    let residual = max_slope_violation(profile, distances, tan_max);
    if residual > 1e-4 {
        warn!(residual, "slope clamp budget exhausted, keeping best effort");
    }
    SLOPE_ITERATIONS
}

fn max_slope_violation(profile: &[f32], distances: &[f32], tan_max: f32) -> f32 {
    profile
        .windows(2)
        .zip(distances.windows(2))
        .map(|(z, d)| {
            let dx = (d[1] - d[0]).max(1e-6);
            ((z[1] - z[0]).abs() / dx - tan_max).max(0.0)
        })
        .fold(0.0, f32::max)
}
