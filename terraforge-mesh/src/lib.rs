//! Procedural mesh construction.
//!
//! A single vertex/triangle accumulator ([`MeshBuffer`]) plus free-function
//! families on top of it: primitives, extrusion/loft, earcut polygon
//! triangulation and the Collada 1.4.1 writer used for road export.

pub mod collada;
pub mod earcut;
pub mod extrude;
pub mod primitives;

pub use collada::write_collada;
pub use earcut::{earcut, signed_area};
pub use extrude::{extrude, loft};

use glam::{Mat3, Mat4, Vec2, Vec3};
use std::ops::Range;

/// Errors from mesh construction.
#[derive(Debug, thiserror::Error)]
pub enum MeshError {
    #[error("extrude requires |up| == |path| >= 2 and |profile| >= 2 (got path {path}, up {up}, profile {profile})")]
    BadExtrudeInput {
        path: usize,
        up: usize,
        profile: usize,
    },
    #[error("loft profiles must have equal, >= 2 vertex counts (got {0} and {1})")]
    BadLoftInput(usize, usize),
    #[error("triangle index {0} out of range ({1} vertices)")]
    IndexOutOfRange(u32, usize),
    #[error("xml write error: {0}")]
    Xml(#[from] xml::writer::Error),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// One mesh vertex.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
}

/// Vertex/triangle accumulator with counter-clockwise winding seen from
/// outside the surface.
#[derive(Debug, Clone, Default)]
pub struct MeshBuffer {
    pub name: String,
    pub material: Option<String>,
    vertices: Vec<Vertex>,
    triangles: Vec<[u32; 3]>,
}

impl MeshBuffer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            material: None,
            vertices: Vec::new(),
            triangles: Vec::new(),
        }
    }

    pub fn with_material(mut self, material: impl Into<String>) -> Self {
        self.material = Some(material.into());
        self
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn triangles(&self) -> &[[u32; 3]] {
        &self.triangles
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Append a vertex and return its index.
    pub fn add_vertex(&mut self, position: Vec3, normal: Vec3, uv: Vec2) -> u32 {
        self.vertices.push(Vertex {
            position,
            normal,
            uv,
        });
        (self.vertices.len() - 1) as u32
    }

    pub fn add_triangle(&mut self, a: u32, b: u32, c: u32) {
        debug_assert!((a as usize) < self.vertices.len());
        debug_assert!((b as usize) < self.vertices.len());
        debug_assert!((c as usize) < self.vertices.len());
        self.triangles.push([a, b, c]);
    }

    /// Two triangles `(a,b,c)` and `(a,c,d)`.
    pub fn add_quad(&mut self, a: u32, b: u32, c: u32, d: u32) {
        self.add_triangle(a, b, c);
        self.add_triangle(a, c, d);
    }

    /// Geometric (non-normalized) face normal of triangle `t`.
    pub fn face_normal(&self, t: usize) -> Vec3 {
        let [a, b, c] = self.triangles[t];
        let pa = self.vertices[a as usize].position;
        let pb = self.vertices[b as usize].position;
        let pc = self.vertices[c as usize].position;
        (pb - pa).cross(pc - pa)
    }

    /// Split every shared vertex so each triangle owns three vertices with
    /// the face normal. Vertex count grows to `3 * triangle_count`.
    pub fn flat_normals(&mut self) {
        let mut vertices = Vec::with_capacity(self.triangles.len() * 3);
        let mut triangles = Vec::with_capacity(self.triangles.len());
        for t in 0..self.triangles.len() {
            let normal = self.face_normal(t).normalize_or_zero();
            let [a, b, c] = self.triangles[t];
            let base = vertices.len() as u32;
            for idx in [a, b, c] {
                let mut v = self.vertices[idx as usize];
                v.normal = normal;
                vertices.push(v);
            }
            triangles.push([base, base + 1, base + 2]);
        }
        self.vertices = vertices;
        self.triangles = triangles;
    }

    /// Area-weighted smooth normals over a triangle range (whole mesh when
    /// `range` is `None`). Face normals are accumulated non-normalized so
    /// larger triangles weigh more, then each vertex normal is normalized.
    pub fn smooth_normals(&mut self, range: Option<Range<usize>>) {
        let range = range.unwrap_or(0..self.triangles.len());
        let mut touched = std::collections::BTreeSet::new();
        let mut accum = vec![Vec3::ZERO; self.vertices.len()];
        for t in range {
            let face = self.face_normal(t);
            for idx in self.triangles[t] {
                accum[idx as usize] += face;
                touched.insert(idx as usize);
            }
        }
        for idx in touched {
            self.vertices[idx].normal = accum[idx].normalize_or_zero();
        }
    }

    /// Apply an affine transform to a vertex range (whole mesh when `None`).
    /// Normals use the transpose-inverse of the upper 3x3 and re-normalize.
    pub fn transform(&mut self, matrix: Mat4, range: Option<Range<usize>>) {
        let range = range.unwrap_or(0..self.vertices.len());
        let normal_matrix = Mat3::from_mat4(matrix).inverse().transpose();
        for v in &mut self.vertices[range] {
            v.position = matrix.transform_point3(v.position);
            v.normal = (normal_matrix * v.normal).normalize_or_zero();
        }
    }

    /// Append `other`, re-indexing its triangles past this buffer's vertices.
    pub fn merge(&mut self, other: &MeshBuffer) {
        let base = self.vertices.len() as u32;
        self.vertices.extend_from_slice(&other.vertices);
        self.triangles
            .extend(other.triangles.iter().map(|[a, b, c]| {
                [a + base, b + base, c + base]
            }));
    }

    /// Validate that every triangle references an existing vertex.
    pub fn check_indices(&self) -> Result<(), MeshError> {
        for tri in &self.triangles {
            for idx in tri {
                if *idx as usize >= self.vertices.len() {
                    return Err(MeshError::IndexOutOfRange(*idx, self.vertices.len()));
                }
            }
        }
        Ok(())
    }

    /// Total surface area.
    pub fn surface_area(&self) -> f32 {
        (0..self.triangles.len())
            .map(|t| self.face_normal(t).length() * 0.5)
            .sum()
    }
}
