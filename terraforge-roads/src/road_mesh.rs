//! Road ribbon mesh from world-space cross-sections.
//!
//! Emits one vertex ring per cross-section (surface edges plus optional
//! curb and shoulder strips), connects consecutive rings with quads wound
//! counter-clockwise seen from above, and applies banking by tilting each
//! ring around the tangent axis. Excluded sections split the ribbon.

use glam::{Vec2, Vec3};
use terraforge_mesh::MeshBuffer;
use tracing::debug;

use crate::{params::RoadParams, CrossSection};

/// Pixel-to-world mapping for mesh emission.
///
/// World origin sits at the terrain center; elevations are offset by
/// `base_height`. The emitted mesh is Z-up; the Collada writer performs the
/// Y-up conversion.
#[derive(Debug, Clone, Copy)]
pub struct WorldFrame {
    pub terrain_size: usize,
    pub meters_per_pixel: f32,
    pub base_height: f32,
}

impl WorldFrame {
    /// Map a pixel-space point and elevation to world coordinates.
    pub fn to_world(&self, pixel: Vec2, elevation: f32) -> Vec3 {
        let half = self.terrain_size as f32 * 0.5;
        Vec3::new(
            (pixel.x - half) * self.meters_per_pixel,
            (pixel.y - half) * self.meters_per_pixel,
            elevation + self.base_height,
        )
    }
}

/// One lateral profile vertex: offset across the road and lift above the
/// target elevation.
#[derive(Debug, Clone, Copy)]
struct ProfilePoint {
    across_m: f32,
    lift_m: f32,
}

fn build_profile(params: &RoadParams) -> Vec<ProfilePoint> {
    let half = params.surface_width() * 0.5;
    let mut profile = Vec::new();

    let curb = if params.include_curbs {
        params.curb_width_meters.max(0.0)
    } else {
        0.0
    };
    if params.include_shoulders {
        profile.push(ProfilePoint {
            across_m: -(half + curb + params.shoulder_width_meters),
            lift_m: -params.shoulder_drop_meters,
        });
    }
    if params.include_curbs {
        profile.push(ProfilePoint {
            across_m: -(half + curb),
            lift_m: params.curb_height_meters,
        });
    }
    profile.push(ProfilePoint {
        across_m: -half,
        lift_m: 0.0,
    });
    profile.push(ProfilePoint {
        across_m: half,
        lift_m: 0.0,
    });
    if params.include_curbs {
        profile.push(ProfilePoint {
            across_m: half + curb,
            lift_m: params.curb_height_meters,
        });
    }
    if params.include_shoulders {
        profile.push(ProfilePoint {
            across_m: half + curb + params.shoulder_width_meters,
            lift_m: -params.shoulder_drop_meters,
        });
    }
    profile
}

/// Build the ribbon mesh for one spline's cross-sections.
pub fn build_road_mesh(
    sections: &[CrossSection],
    params: &RoadParams,
    frame: &WorldFrame,
    name: &str,
    material: &str,
) -> MeshBuffer {
    let mut mesh = MeshBuffer::new(name).with_material(material);
    let profile = build_profile(params);

    // Split at excluded sections; each run becomes its own ribbon.
    let mut run: Vec<&CrossSection> = Vec::new();
    for section in sections {
        if section.excluded {
            emit_run(&mut mesh, &run, &profile, params, frame);
            run.clear();
        } else {
            run.push(section);
        }
    }
    emit_run(&mut mesh, &run, &profile, params, frame);

    if params.smooth_normals {
        mesh.smooth_normals(None);
    } else {
        mesh.flat_normals();
    }
    debug!(
        name,
        vertices = mesh.vertex_count(),
        triangles = mesh.triangle_count(),
        "built road mesh"
    );
    mesh
}

fn emit_run(
    mesh: &mut MeshBuffer,
    run: &[&CrossSection],
    profile: &[ProfilePoint],
    params: &RoadParams,
    frame: &WorldFrame,
) {
    if run.len() < 2 {
        return;
    }
    let cols = profile.len() as u32;
    let base = mesh.vertex_count() as u32;
    let across_min = profile.first().expect("non-empty profile").across_m;
    let across_span = (profile.last().expect("non-empty profile").across_m - across_min).max(1e-6);

    let half = params.surface_width() * 0.5;
    for section in run {
        let tan_bank = section.bank_angle_rad.tan();
        for point in profile {
            // Banked elevation across the ring; explicit edge constraints
            // win over the analytic tilt when present.
            let banked = if (point.across_m + half).abs() < 1e-4 {
                section
                    .left_edge_elevation
                    .unwrap_or(section.target_elevation - half * tan_bank)
            } else if (point.across_m - half).abs() < 1e-4 {
                section
                    .right_edge_elevation
                    .unwrap_or(section.target_elevation + half * tan_bank)
            } else {
                section.target_elevation + point.across_m * tan_bank
            };
            let elevation = banked + point.lift_m;
            let pixel_offset = section.normal * (point.across_m / frame.meters_per_pixel);
            let position = frame.to_world(section.center + pixel_offset, elevation);

            let u = section.distance_m / params.texture_repeat_meters_u.max(1e-6);
            let v = (point.across_m - across_min) / across_span;
            mesh.add_vertex(position, Vec3::Z, Vec2::new(u, v));
        }
    }

    for i in 0..run.len() as u32 - 1 {
        for j in 0..cols - 1 {
            let v00 = base + i * cols + j;
            let v01 = v00 + 1;
            let v10 = base + (i + 1) * cols + j;
            let v11 = v10 + 1;
            mesh.add_quad(v00, v01, v11, v10);
        }
    }

    if params.generate_end_caps && cols >= 3 {
        for (ring, flip) in [(0u32, true), ((run.len() as u32 - 1) * cols, false)] {
            for j in 1..cols - 1 {
                let (a, b, c) = (base + ring, base + ring + j, base + ring + j + 1);
                if flip {
                    mesh.add_triangle(a, c, b);
                } else {
                    mesh.add_triangle(a, b, c);
                }
            }
        }
    }
}
