//! Kochanek-Bartels (TCB) spline over a 2D polyline.
//!
//! Cubic Hermite segments with tension/continuity/bias-shaped tangents and
//! a subdivided arc-length table for constant-speed sampling. Open curves
//! mirror the missing neighbor at each end; closed curves wrap.

use glam::Vec2;

use crate::{RoadError, SplineId};

/// Subdivisions per segment for the arc-length table.
const ARC_SUBDIV: usize = 16;

#[derive(Debug, Clone)]
pub struct TcbSpline {
    points: Vec<Vec2>,
    closed: bool,
    /// Outgoing tangent per segment start, incoming tangent per segment end.
    out_tangents: Vec<Vec2>,
    in_tangents: Vec<Vec2>,
    /// Cumulative arc length at each table sample.
    arc_table: Vec<f32>,
}

impl TcbSpline {
    /// Fit a spline through `points` with the given tension/continuity/bias.
    pub fn fit(
        points: &[Vec2],
        tension: f32,
        continuity: f32,
        bias: f32,
        closed: bool,
    ) -> Result<Self, RoadError> {
        if points.len() < 2 {
            return Err(RoadError::DegenerateSpline(
                SplineId(u32::MAX),
                format!("spline needs at least 2 points, got {}", points.len()),
            ));
        }

        let n = points.len();
        let segment_count = if closed { n } else { n - 1 };

        let neighbor = |i: isize| -> Vec2 {
            if closed {
                points[i.rem_euclid(n as isize) as usize]
            } else if i < 0 {
                // Mirror the second point through the first.
                points[0] * 2.0 - points[1]
            } else if i as usize >= n {
                points[n - 1] * 2.0 - points[n - 2]
            } else {
                points[i as usize]
            }
        };

        let f_out_prev = (1.0 - tension) * (1.0 + bias) * (1.0 + continuity) * 0.5;
        let f_out_next = (1.0 - tension) * (1.0 - bias) * (1.0 - continuity) * 0.5;
        let f_in_prev = (1.0 - tension) * (1.0 + bias) * (1.0 - continuity) * 0.5;
        let f_in_next = (1.0 - tension) * (1.0 - bias) * (1.0 + continuity) * 0.5;

        let mut out_tangents = Vec::with_capacity(segment_count);
        let mut in_tangents = Vec::with_capacity(segment_count);
        for seg in 0..segment_count {
            let i = seg as isize;
            let p0 = neighbor(i - 1);
            let p1 = neighbor(i);
            let p2 = neighbor(i + 1);
            let p3 = neighbor(i + 2);
            out_tangents.push((p1 - p0) * f_out_prev + (p2 - p1) * f_out_next);
            in_tangents.push((p2 - p1) * f_in_prev + (p3 - p2) * f_in_next);
        }

        let mut spline = Self {
            points: points.to_vec(),
            closed,
            out_tangents,
            in_tangents,
            arc_table: Vec::new(),
        };
        spline.build_arc_table();
        Ok(spline)
    }

    pub fn points(&self) -> &[Vec2] {
        &self.points
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn segment_count(&self) -> usize {
        if self.closed {
            self.points.len()
        } else {
            self.points.len() - 1
        }
    }

    pub fn start(&self) -> Vec2 {
        self.points[0]
    }

    pub fn end(&self) -> Vec2 {
        if self.closed {
            self.points[0]
        } else {
            *self.points.last().expect("non-empty")
        }
    }

    /// Total length in the units of the input points.
    pub fn total_length(&self) -> f32 {
        *self.arc_table.last().unwrap_or(&0.0)
    }

    /// Position at parametric `t` in `[0, segment_count]`.
    pub fn position_at(&self, t: f32) -> Vec2 {
        let (seg, s) = self.split_param(t);
        let (p1, p2) = self.segment_points(seg);
        let d1 = self.out_tangents[seg];
        let d2 = self.in_tangents[seg];

        let s2 = s * s;
        let s3 = s2 * s;
        let h00 = 2.0 * s3 - 3.0 * s2 + 1.0;
        let h10 = s3 - 2.0 * s2 + s;
        let h01 = -2.0 * s3 + 3.0 * s2;
        let h11 = s3 - s2;
        p1 * h00 + d1 * h10 + p2 * h01 + d2 * h11
    }

    /// Non-normalized derivative at parametric `t`.
    pub fn derivative_at(&self, t: f32) -> Vec2 {
        let (seg, s) = self.split_param(t);
        let (p1, p2) = self.segment_points(seg);
        let d1 = self.out_tangents[seg];
        let d2 = self.in_tangents[seg];

        let s2 = s * s;
        let h00 = 6.0 * s2 - 6.0 * s;
        let h10 = 3.0 * s2 - 4.0 * s + 1.0;
        let h01 = -6.0 * s2 + 6.0 * s;
        let h11 = 3.0 * s2 - 2.0 * s;
        let d = p1 * h00 + d1 * h10 + p2 * h01 + d2 * h11;
        // Fall back to the chord when the tangent degenerates.
        if d.length_squared() < 1e-12 {
            p2 - p1
        } else {
            d
        }
    }

    /// Unit tangent at parametric `t`.
    pub fn tangent_at(&self, t: f32) -> Vec2 {
        self.derivative_at(t).normalize_or_zero()
    }

    /// Map an arc-length position (same units as the points) to the
    /// parametric value, clamping into range.
    pub fn param_at_arc(&self, arc: f32) -> f32 {
        let total = self.total_length();
        if total <= 0.0 {
            return 0.0;
        }
        let arc = arc.clamp(0.0, total);
        // Binary search the cumulative table.
        let mut lo = 0usize;
        let mut hi = self.arc_table.len() - 1;
        while hi - lo > 1 {
            let mid = (lo + hi) / 2;
            if self.arc_table[mid] <= arc {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        let span = self.arc_table[hi] - self.arc_table[lo];
        let frac = if span > 0.0 {
            (arc - self.arc_table[lo]) / span
        } else {
            0.0
        };
        (lo as f32 + frac) / ARC_SUBDIV as f32
    }

    /// Position and unit tangent at an arc-length position.
    pub fn sample_at_arc(&self, arc: f32) -> (Vec2, Vec2) {
        let t = self.param_at_arc(arc);
        (self.position_at(t), self.tangent_at(t))
    }

    /// Signed curvature (1/length units) estimated at an arc position by
    /// central differencing of the tangent angle.
    pub fn curvature_at_arc(&self, arc: f32, step: f32) -> f32 {
        let total = self.total_length();
        let a0 = (arc - step).max(0.0);
        let a1 = (arc + step).min(total);
        if a1 - a0 < 1e-6 {
            return 0.0;
        }
        let t0 = self.tangent_at(self.param_at_arc(a0));
        let t1 = self.tangent_at(self.param_at_arc(a1));
        let angle = t0.x.mul_add(t1.y, -(t0.y * t1.x)).atan2(t0.dot(t1));
        angle / (a1 - a0)
    }

    fn split_param(&self, t: f32) -> (usize, f32) {
        let max = self.segment_count() as f32;
        let t = t.clamp(0.0, max);
        let seg = (t.floor() as usize).min(self.segment_count() - 1);
        (seg, t - seg as f32)
    }

    fn segment_points(&self, seg: usize) -> (Vec2, Vec2) {
        let n = self.points.len();
        let p1 = self.points[seg % n];
        let p2 = self.points[(seg + 1) % n];
        (p1, p2)
    }

    fn build_arc_table(&mut self) {
        let samples = self.segment_count() * ARC_SUBDIV;
        let mut table = Vec::with_capacity(samples + 1);
        table.push(0.0);
        let mut acc = 0.0;
        let mut prev = self.position_at(0.0);
        for i in 1..=samples {
            let t = i as f32 / ARC_SUBDIV as f32;
            let p = self.position_at(t);
            acc += (p - prev).length();
            prev = p;
            table.push(acc);
        }
        self.arc_table = table;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn straight_line_length_and_tangent() {
        let spline = TcbSpline::fit(
            &[Vec2::ZERO, Vec2::new(10.0, 0.0), Vec2::new(20.0, 0.0)],
            0.0,
            0.0,
            0.0,
            false,
        )
        .unwrap();
        assert_relative_eq!(spline.total_length(), 20.0, epsilon = 1e-3);
        let (pos, tan) = spline.sample_at_arc(10.0);
        assert_relative_eq!(pos.x, 10.0, epsilon = 1e-2);
        assert_relative_eq!(pos.y, 0.0, epsilon = 1e-4);
        assert_relative_eq!(tan.x, 1.0, epsilon = 1e-4);
    }

    #[test]
    fn passes_through_control_points() {
        let points = [
            Vec2::new(0.0, 0.0),
            Vec2::new(5.0, 3.0),
            Vec2::new(9.0, -2.0),
            Vec2::new(14.0, 1.0),
        ];
        let spline = TcbSpline::fit(&points, 0.0, 0.0, 0.0, false).unwrap();
        for (i, p) in points.iter().enumerate() {
            let q = spline.position_at(i as f32);
            assert_relative_eq!(q.x, p.x, epsilon = 1e-4);
            assert_relative_eq!(q.y, p.y, epsilon = 1e-4);
        }
    }

    #[test]
    fn full_tension_reduces_to_polyline() {
        // tension = 1 zeroes all tangents: segments become straight chords.
        let points = [Vec2::ZERO, Vec2::new(4.0, 4.0), Vec2::new(8.0, 0.0)];
        let spline = TcbSpline::fit(&points, 1.0, 0.0, 0.0, false).unwrap();
        let expected = 2.0 * (32.0f32).sqrt();
        assert_relative_eq!(spline.total_length(), expected, epsilon = 1e-3);
    }

    #[test]
    fn closed_spline_wraps() {
        let points = [
            Vec2::new(0.0, 0.0),
            Vec2::new(10.0, 0.0),
            Vec2::new(10.0, 10.0),
            Vec2::new(0.0, 10.0),
        ];
        let spline = TcbSpline::fit(&points, 0.0, 0.0, 0.0, true).unwrap();
        assert_eq!(spline.segment_count(), 4);
        let back_to_start = spline.position_at(4.0);
        assert_relative_eq!(back_to_start.x, 0.0, epsilon = 1e-4);
        assert_relative_eq!(back_to_start.y, 0.0, epsilon = 1e-4);
    }

    #[test]
    fn arc_sampling_is_monotone() {
        let points = [
            Vec2::ZERO,
            Vec2::new(10.0, 5.0),
            Vec2::new(15.0, -5.0),
            Vec2::new(30.0, 0.0),
        ];
        let spline = TcbSpline::fit(&points, 0.0, 0.0, 0.0, false).unwrap();
        let mut last = -1.0;
        for i in 0..=50 {
            let arc = spline.total_length() * i as f32 / 50.0;
            let t = spline.param_at_arc(arc);
            assert!(t >= last);
            last = t;
        }
    }

    #[test]
    fn curvature_sign_follows_turn_direction() {
        // Quarter circle turning left (counter-clockwise).
        let points: Vec<Vec2> = (0..=8)
            .map(|i| {
                let a = i as f32 / 8.0 * std::f32::consts::FRAC_PI_2;
                Vec2::new(a.sin() * 20.0, 20.0 - a.cos() * 20.0)
            })
            .collect();
        let spline = TcbSpline::fit(&points, 0.0, 0.0, 0.0, false).unwrap();
        let mid = spline.total_length() / 2.0;
        let k = spline.curvature_at_arc(mid, 2.0);
        assert!(k > 0.0, "left turn must have positive curvature, got {k}");
        assert_relative_eq!(k, 1.0 / 20.0, epsilon = 0.01);
    }

    #[test]
    fn single_point_is_rejected() {
        assert!(TcbSpline::fit(&[Vec2::ZERO], 0.0, 0.0, 0.0, false).is_err());
    }
}
