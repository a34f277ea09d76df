//! Profile extrusion and lofting on top of [`MeshBuffer`].

use glam::{Vec2, Vec3};
use std::ops::Range;

use crate::{MeshBuffer, MeshError};

/// Sweep a 2D profile along a 3D path.
///
/// `up` supplies one up-vector per path point; the frame at each point is
/// `right = normalize(forward x up)`, `up' = normalize(right x forward)`
/// with `forward` one-sided at the ends and centered in between. Profile X
/// maps onto `right`, profile Y onto `up'`.
///
/// UVs run with cumulative path length over `uv_scale_u` and cumulative
/// profile length over `uv_scale_v`. Returns the emitted vertex range.
pub fn extrude(
    mesh: &mut MeshBuffer,
    profile: &[Vec2],
    path: &[Vec3],
    up: &[Vec3],
    uv_scale_u: f32,
    uv_scale_v: f32,
) -> Result<Range<u32>, MeshError> {
    if path.len() < 2 || up.len() != path.len() || profile.len() < 2 {
        return Err(MeshError::BadExtrudeInput {
            path: path.len(),
            up: up.len(),
            profile: profile.len(),
        });
    }

    let profile_len = cumulative_lengths_2d(profile);
    let path_len = cumulative_lengths_3d(path);
    let profile_tangents = profile_tangents(profile);

    let base = mesh.vertex_count() as u32;
    let cols = profile.len() as u32;

    for (i, point) in path.iter().enumerate() {
        let forward = path_forward(path, i);
        let right = forward.cross(up[i]).normalize_or_zero();
        let frame_up = right.cross(forward).normalize_or_zero();

        for (j, p) in profile.iter().enumerate() {
            let position = *point + right * p.x + frame_up * p.y;
            let t = profile_tangents[j];
            let normal = (right * t.y - frame_up * t.x).normalize_or_zero();
            let uv = Vec2::new(path_len[i] / uv_scale_u, profile_len[j] / uv_scale_v);
            mesh.add_vertex(position, normal, uv);
        }
    }

    for i in 0..path.len() as u32 - 1 {
        for j in 0..cols - 1 {
            let v00 = base + i * cols + j;
            let v10 = base + (i + 1) * cols + j;
            let v11 = base + (i + 1) * cols + j + 1;
            let v01 = base + i * cols + j + 1;
            mesh.add_quad(v00, v10, v11, v01);
        }
    }

    Ok(base..mesh.vertex_count() as u32)
}

/// Connect two equal-length profiles with a quad ribbon and smooth the
/// normals over the new triangles.
pub fn loft(
    mesh: &mut MeshBuffer,
    profile1: &[Vec3],
    profile2: &[Vec3],
) -> Result<Range<u32>, MeshError> {
    if profile1.len() != profile2.len() || profile1.len() < 2 {
        return Err(MeshError::BadLoftInput(profile1.len(), profile2.len()));
    }

    let base = mesh.vertex_count() as u32;
    let tri_base = mesh.triangle_count();
    let n = profile1.len() as u32;
    let len1 = cumulative_lengths_3d(profile1);
    let len2 = cumulative_lengths_3d(profile2);

    for (j, p) in profile1.iter().enumerate() {
        mesh.add_vertex(*p, Vec3::Z, Vec2::new(0.0, len1[j]));
    }
    for (j, p) in profile2.iter().enumerate() {
        mesh.add_vertex(*p, Vec3::Z, Vec2::new(1.0, len2[j]));
    }

    for j in 0..n - 1 {
        mesh.add_quad(base + j, base + n + j, base + n + j + 1, base + j + 1);
    }

    mesh.smooth_normals(Some(tri_base..mesh.triangle_count()));
    Ok(base..mesh.vertex_count() as u32)
}

/// Forward direction at path point `i`: one-sided at the ends, centered in
/// the middle.
fn path_forward(path: &[Vec3], i: usize) -> Vec3 {
    let dir = if i == 0 {
        path[1] - path[0]
    } else if i == path.len() - 1 {
        path[i] - path[i - 1]
    } else {
        path[i + 1] - path[i - 1]
    };
    dir.normalize_or_zero()
}

/// Profile tangent at vertex `j`: one-sided at endpoints, centered inside.
fn profile_tangents(profile: &[Vec2]) -> Vec<Vec2> {
    let n = profile.len();
    (0..n)
        .map(|j| {
            let dir = if j == 0 {
                profile[1] - profile[0]
            } else if j == n - 1 {
                profile[j] - profile[j - 1]
            } else {
                profile[j + 1] - profile[j - 1]
            };
            dir.normalize_or_zero()
        })
        .collect()
}

fn cumulative_lengths_2d(points: &[Vec2]) -> Vec<f32> {
    let mut out = Vec::with_capacity(points.len());
    let mut acc = 0.0;
    out.push(0.0);
    for w in points.windows(2) {
        acc += (w[1] - w[0]).length();
        out.push(acc);
    }
    out
}

fn cumulative_lengths_3d(points: &[Vec3]) -> Vec<f32> {
    let mut out = Vec::with_capacity(points.len());
    let mut acc = 0.0;
    out.push(0.0);
    for w in points.windows(2) {
        acc += (w[1] - w[0]).length();
        out.push(acc);
    }
    out
}
