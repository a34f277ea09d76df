//! Primitive solids on the mesh accumulator.
//!
//! All primitives are Z-up, centered at the origin unless noted, and wound
//! counter-clockwise seen from outside.

use glam::{Vec2, Vec3};
use std::f32::consts::TAU;

use crate::MeshBuffer;

/// Axis-aligned box with the given full extents.
pub fn add_box(mesh: &mut MeshBuffer, extents: Vec3) {
    let h = extents * 0.5;
    // (normal, tangent-u, tangent-v) per face.
    let faces = [
        (Vec3::X, Vec3::Y, Vec3::Z),
        (Vec3::NEG_X, Vec3::NEG_Y, Vec3::Z),
        (Vec3::Y, Vec3::NEG_X, Vec3::Z),
        (Vec3::NEG_Y, Vec3::X, Vec3::Z),
        (Vec3::Z, Vec3::X, Vec3::Y),
        (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
    ];
    for (normal, tu, tv) in faces {
        let center = normal * (normal.abs().dot(h));
        let eu = tu * tu.abs().dot(h);
        let ev = tv * tv.abs().dot(h);
        let a = mesh.add_vertex(center - eu - ev, normal, Vec2::new(0.0, 0.0));
        let b = mesh.add_vertex(center + eu - ev, normal, Vec2::new(1.0, 0.0));
        let c = mesh.add_vertex(center + eu + ev, normal, Vec2::new(1.0, 1.0));
        let d = mesh.add_vertex(center - eu + ev, normal, Vec2::new(0.0, 1.0));
        mesh.add_quad(a, b, c, d);
    }
}

/// Flat rectangle in the XY plane facing +Z.
pub fn add_plane(mesh: &mut MeshBuffer, size: Vec2) {
    let h = size * 0.5;
    let a = mesh.add_vertex(Vec3::new(-h.x, -h.y, 0.0), Vec3::Z, Vec2::new(0.0, 0.0));
    let b = mesh.add_vertex(Vec3::new(h.x, -h.y, 0.0), Vec3::Z, Vec2::new(1.0, 0.0));
    let c = mesh.add_vertex(Vec3::new(h.x, h.y, 0.0), Vec3::Z, Vec2::new(1.0, 1.0));
    let d = mesh.add_vertex(Vec3::new(-h.x, h.y, 0.0), Vec3::Z, Vec2::new(0.0, 1.0));
    mesh.add_quad(a, b, c, d);
}

/// Closed cylinder along the Z axis.
pub fn add_cylinder(mesh: &mut MeshBuffer, radius: f32, height: f32, segments: usize) {
    let segments = segments.max(3);
    let hz = height * 0.5;

    // Side wall with smooth radial normals; an extra seam column closes the
    // UV wrap.
    let base = mesh.vertex_count() as u32;
    for i in 0..=segments {
        let t = i as f32 / segments as f32 * TAU;
        let dir = Vec3::new(t.cos(), t.sin(), 0.0);
        let u = i as f32 / segments as f32;
        mesh.add_vertex(dir * radius - Vec3::Z * hz, dir, Vec2::new(u, 0.0));
        mesh.add_vertex(dir * radius + Vec3::Z * hz, dir, Vec2::new(u, 1.0));
    }
    for i in 0..segments as u32 {
        let a = base + i * 2;
        mesh.add_quad(a, a + 2, a + 3, a + 1);
    }

    // Caps as triangle fans.
    for (z, normal) in [(-hz, Vec3::NEG_Z), (hz, Vec3::Z)] {
        let center = mesh.add_vertex(Vec3::Z * z, normal, Vec2::new(0.5, 0.5));
        let ring_base = mesh.vertex_count() as u32;
        for i in 0..segments {
            let t = i as f32 / segments as f32 * TAU;
            let p = Vec3::new(t.cos() * radius, t.sin() * radius, z);
            let uv = Vec2::new(0.5 + t.cos() * 0.5, 0.5 + t.sin() * 0.5);
            mesh.add_vertex(p, normal, uv);
        }
        for i in 0..segments as u32 {
            let j = (i + 1) % segments as u32;
            if normal.z > 0.0 {
                mesh.add_triangle(center, ring_base + i, ring_base + j);
            } else {
                mesh.add_triangle(center, ring_base + j, ring_base + i);
            }
        }
    }
}

/// UV sphere centered at the origin.
pub fn add_sphere(mesh: &mut MeshBuffer, radius: f32, rings: usize, segments: usize) {
    let rings = rings.max(2);
    let segments = segments.max(3);
    let base = mesh.vertex_count() as u32;

    for r in 0..=rings {
        let phi = r as f32 / rings as f32 * std::f32::consts::PI;
        let (sp, cp) = phi.sin_cos();
        for s in 0..=segments {
            let theta = s as f32 / segments as f32 * TAU;
            let dir = Vec3::new(sp * theta.cos(), sp * theta.sin(), cp);
            let uv = Vec2::new(s as f32 / segments as f32, r as f32 / rings as f32);
            mesh.add_vertex(dir * radius, dir, uv);
        }
    }

    let cols = segments as u32 + 1;
    for r in 0..rings as u32 {
        for s in 0..segments as u32 {
            let v00 = base + r * cols + s;
            let v01 = v00 + 1;
            let v10 = v00 + cols;
            let v11 = v10 + 1;
            // Top ring collapses to the pole; skip the degenerate triangle.
            if r != 0 {
                mesh.add_triangle(v00, v10, v01);
            }
            if r != rings as u32 - 1 {
                mesh.add_triangle(v01, v10, v11);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use glam::Vec3;

    fn assert_outward(mesh: &MeshBuffer) {
        for t in 0..mesh.triangle_count() {
            let face = mesh.face_normal(t);
            if face.length() < 1e-12 {
                continue;
            }
            let [a, b, c] = mesh.triangles()[t];
            let centroid = (mesh.vertices()[a as usize].position
                + mesh.vertices()[b as usize].position
                + mesh.vertices()[c as usize].position)
                / 3.0;
            // For origin-centered convex solids the face normal must point
            // away from the origin.
            assert!(
                face.normalize().dot(centroid.normalize_or_zero()) > 0.0,
                "triangle {t} winds inward"
            );
        }
    }

    #[test]
    fn box_has_12_outward_triangles() {
        let mut mesh = MeshBuffer::new("box");
        add_box(&mut mesh, Vec3::new(2.0, 4.0, 6.0));
        assert_eq!(mesh.triangle_count(), 12);
        assert_relative_eq!(mesh.surface_area(), 2.0 * (8.0 + 12.0 + 24.0));
        assert_outward(&mesh);
    }

    #[test]
    fn plane_faces_up() {
        let mut mesh = MeshBuffer::new("plane");
        add_plane(&mut mesh, Vec2::new(3.0, 2.0));
        assert_eq!(mesh.triangle_count(), 2);
        assert!(mesh.face_normal(0).z > 0.0);
        assert_relative_eq!(mesh.surface_area(), 6.0);
    }

    #[test]
    fn cylinder_is_closed_and_outward() {
        let mut mesh = MeshBuffer::new("cyl");
        add_cylinder(&mut mesh, 1.0, 2.0, 16);
        assert_eq!(mesh.triangle_count(), 16 * 2 + 16 * 2);
        assert_outward(&mesh);
        mesh.check_indices().unwrap();
    }

    #[test]
    fn sphere_area_approaches_analytic() {
        let mut mesh = MeshBuffer::new("sphere");
        add_sphere(&mut mesh, 1.0, 24, 48);
        let analytic = 4.0 * std::f32::consts::PI;
        assert!((mesh.surface_area() - analytic).abs() / analytic < 0.01);
        assert_outward(&mesh);
    }
}
