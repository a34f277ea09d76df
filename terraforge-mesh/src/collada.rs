//! Collada 1.4.1 export.
//!
//! Writes `library_geometries`/`library_materials`/`library_visual_scenes`
//! for a list of mesh buffers. Input meshes are Z-up (engine native); the
//! writer converts to the Y-up space required by the asset pipeline with
//! `(x, y, z) -> (x, z, -y)`, which preserves handedness so triangle
//! winding stays intact. Output is deterministic: a fixed timestamp is
//! written and mesh order follows the input slice.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use glam::Vec3;
use tracing::info;
use xml::writer::{EmitterConfig, EventWriter, XmlEvent};

use crate::{MeshBuffer, MeshError};

const COLLADA_NS: &str = "http://www.collada.org/2005/11/COLLADASchema";
/// Fixed asset timestamp; outputs must be byte-identical across runs.
const CREATED: &str = "1970-01-01T00:00:00Z";
/// Diffuse used when a material has no extracted dominant color.
const DEFAULT_DIFFUSE: &str = "0.6 0.6 0.6 1";

/// Convert an engine-space (Z-up) vector to Collada Y-up space.
fn to_y_up(v: Vec3) -> Vec3 {
    Vec3::new(v.x, v.z, -v.y)
}

/// Write the given meshes as a Collada 1.4.1 document.
///
/// `diffuse_colors` maps material names to `#RRGGBB` dominant colors (as
/// produced by the terrain texture extraction); materials without an entry
/// fall back to a neutral gray. Meshes with no triangles are skipped; an
/// input with no non-empty meshes still yields a valid document with an
/// empty scene.
pub fn write_collada(
    path: &Path,
    meshes: &[MeshBuffer],
    diffuse_colors: &BTreeMap<String, String>,
) -> Result<(), MeshError> {
    let file = File::create(path)?;
    let mut writer = EmitterConfig::new()
        .perform_indent(true)
        .create_writer(BufWriter::new(file));

    let meshes: Vec<&MeshBuffer> = meshes.iter().filter(|m| !m.is_empty()).collect();

    writer.write(
        XmlEvent::start_element("COLLADA")
            .attr("xmlns", COLLADA_NS)
            .attr("version", "1.4.1"),
    )?;

    write_asset(&mut writer)?;
    write_effects(&mut writer, &meshes, diffuse_colors)?;
    write_materials(&mut writer, &meshes)?;
    write_geometries(&mut writer, &meshes)?;
    write_scene(&mut writer, &meshes)?;

    writer.write(XmlEvent::end_element())?; // COLLADA
    info!(path = %path.display(), meshes = meshes.len(), "wrote collada");
    Ok(())
}

fn write_asset<W: std::io::Write>(w: &mut EventWriter<W>) -> Result<(), MeshError> {
    w.write(XmlEvent::start_element("asset"))?;
    w.write(XmlEvent::start_element("contributor"))?;
    w.write(XmlEvent::start_element("authoring_tool"))?;
    w.write(XmlEvent::characters("terraforge"))?;
    w.write(XmlEvent::end_element())?;
    w.write(XmlEvent::end_element())?; // contributor
    for tag in ["created", "modified"] {
        w.write(XmlEvent::start_element(tag))?;
        w.write(XmlEvent::characters(CREATED))?;
        w.write(XmlEvent::end_element())?;
    }
    w.write(
        XmlEvent::start_element("unit")
            .attr("name", "meter")
            .attr("meter", "1"),
    )?;
    w.write(XmlEvent::end_element())?;
    w.write(XmlEvent::start_element("up_axis"))?;
    w.write(XmlEvent::characters("Y_UP"))?;
    w.write(XmlEvent::end_element())?;
    w.write(XmlEvent::end_element())?; // asset
    Ok(())
}

/// Material symbol for a mesh: its declared material or a per-mesh default.
fn material_id(mesh: &MeshBuffer) -> String {
    mesh.material
        .clone()
        .unwrap_or_else(|| format!("{}_material", mesh.name))
}

/// Convert a `#RRGGBB` hex color into a Collada color string. Malformed
/// values fall back to the neutral default.
fn diffuse_value(hex: Option<&String>) -> String {
    let Some(hex) = hex else {
        return DEFAULT_DIFFUSE.to_string();
    };
    let digits = hex.trim_start_matches('#');
    if digits.len() != 6 {
        return DEFAULT_DIFFUSE.to_string();
    }
    match u32::from_str_radix(digits, 16) {
        Ok(v) => {
            let r = ((v >> 16) & 0xFF) as f32 / 255.0;
            let g = ((v >> 8) & 0xFF) as f32 / 255.0;
            let b = (v & 0xFF) as f32 / 255.0;
            format!("{r:.4} {g:.4} {b:.4} 1")
        }
        Err(_) => DEFAULT_DIFFUSE.to_string(),
    }
}

fn write_effects<W: std::io::Write>(
    w: &mut EventWriter<W>,
    meshes: &[&MeshBuffer],
    diffuse_colors: &BTreeMap<String, String>,
) -> Result<(), MeshError> {
    w.write(XmlEvent::start_element("library_effects"))?;
    for mesh in meshes {
        let id = material_id(mesh);
        let diffuse = diffuse_value(diffuse_colors.get(&id));
        w.write(XmlEvent::start_element("effect").attr("id", &format!("{id}-effect")))?;
        w.write(XmlEvent::start_element("profile_COMMON"))?;
        w.write(XmlEvent::start_element("technique").attr("sid", "common"))?;
        w.write(XmlEvent::start_element("lambert"))?;
        w.write(XmlEvent::start_element("diffuse"))?;
        w.write(XmlEvent::start_element("color").attr("sid", "diffuse"))?;
        w.write(XmlEvent::characters(&diffuse))?;
        w.write(XmlEvent::end_element())?;
        w.write(XmlEvent::end_element())?; // diffuse
        w.write(XmlEvent::end_element())?; // lambert
        w.write(XmlEvent::end_element())?; // technique
        w.write(XmlEvent::end_element())?; // profile_COMMON
        w.write(XmlEvent::end_element())?; // effect
    }
    w.write(XmlEvent::end_element())?;
    Ok(())
}

fn write_materials<W: std::io::Write>(
    w: &mut EventWriter<W>,
    meshes: &[&MeshBuffer],
) -> Result<(), MeshError> {
    w.write(XmlEvent::start_element("library_materials"))?;
    for mesh in meshes {
        let id = material_id(mesh);
        w.write(
            XmlEvent::start_element("material")
                .attr("id", &id)
                .attr("name", &id),
        )?;
        w.write(
            XmlEvent::start_element("instance_effect").attr("url", &format!("#{id}-effect")),
        )?;
        w.write(XmlEvent::end_element())?;
        w.write(XmlEvent::end_element())?;
    }
    w.write(XmlEvent::end_element())?;
    Ok(())
}

/// Join floats with single spaces, trimming trailing zeros the same way for
/// every value so output is reproducible.
fn join_floats(values: impl Iterator<Item = f32>) -> String {
    let mut out = String::new();
    for (i, v) in values.enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{v}");
    }
    out
}

fn write_source<W: std::io::Write>(
    w: &mut EventWriter<W>,
    id: &str,
    data: &str,
    value_count: usize,
    params: &[&str],
) -> Result<(), MeshError> {
    let stride = params.len();
    w.write(XmlEvent::start_element("source").attr("id", id))?;
    w.write(
        XmlEvent::start_element("float_array")
            .attr("id", &format!("{id}-array"))
            .attr("count", &(value_count * stride).to_string()),
    )?;
    w.write(XmlEvent::characters(data))?;
    w.write(XmlEvent::end_element())?;
    w.write(XmlEvent::start_element("technique_common"))?;
    w.write(
        XmlEvent::start_element("accessor")
            .attr("source", &format!("#{id}-array"))
            .attr("count", &value_count.to_string())
            .attr("stride", &stride.to_string()),
    )?;
    for name in params {
        w.write(
            XmlEvent::start_element("param")
                .attr("name", name)
                .attr("type", "float"),
        )?;
        w.write(XmlEvent::end_element())?;
    }
    w.write(XmlEvent::end_element())?; // accessor
    w.write(XmlEvent::end_element())?; // technique_common
    w.write(XmlEvent::end_element())?; // source
    Ok(())
}

fn write_geometries<W: std::io::Write>(
    w: &mut EventWriter<W>,
    meshes: &[&MeshBuffer],
) -> Result<(), MeshError> {
    w.write(XmlEvent::start_element("library_geometries"))?;
    for mesh in meshes {
        let gid = format!("{}-mesh", mesh.name);
        w.write(
            XmlEvent::start_element("geometry")
                .attr("id", &gid)
                .attr("name", &mesh.name),
        )?;
        w.write(XmlEvent::start_element("mesh"))?;

        let positions = join_floats(mesh.vertices().iter().flat_map(|v| {
            let p = to_y_up(v.position);
            [p.x, p.y, p.z]
        }));
        let normals = join_floats(mesh.vertices().iter().flat_map(|v| {
            let n = to_y_up(v.normal);
            [n.x, n.y, n.z]
        }));
        let uvs = join_floats(mesh.vertices().iter().flat_map(|v| [v.uv.x, v.uv.y]));

        let n = mesh.vertex_count();
        write_source(w, &format!("{gid}-positions"), &positions, n, &["X", "Y", "Z"])?;
        write_source(w, &format!("{gid}-normals"), &normals, n, &["X", "Y", "Z"])?;
        write_source(w, &format!("{gid}-uv"), &uvs, n, &["S", "T"])?;

        w.write(XmlEvent::start_element("vertices").attr("id", &format!("{gid}-vertices")))?;
        w.write(
            XmlEvent::start_element("input")
                .attr("semantic", "POSITION")
                .attr("source", &format!("#{gid}-positions")),
        )?;
        w.write(XmlEvent::end_element())?;
        w.write(XmlEvent::end_element())?; // vertices

        w.write(
            XmlEvent::start_element("triangles")
                .attr("material", &material_id(mesh))
                .attr("count", &mesh.triangle_count().to_string()),
        )?;
        for (semantic, source, set) in [
            ("VERTEX", format!("#{gid}-vertices"), None),
            ("NORMAL", format!("#{gid}-normals"), None),
            ("TEXCOORD", format!("#{gid}-uv"), Some("0")),
        ] {
            let mut input = XmlEvent::start_element("input")
                .attr("semantic", semantic)
                .attr("source", &source)
                .attr("offset", "0");
            if let Some(set) = set {
                input = input.attr("set", set);
            }
            w.write(input)?;
            w.write(XmlEvent::end_element())?;
        }

        let mut indices = String::new();
        for (i, [a, b, c]) in mesh.triangles().iter().enumerate() {
            if i > 0 {
                indices.push(' ');
            }
            let _ = write!(indices, "{a} {b} {c}");
        }
        w.write(XmlEvent::start_element("p"))?;
        w.write(XmlEvent::characters(&indices))?;
        w.write(XmlEvent::end_element())?;

        w.write(XmlEvent::end_element())?; // triangles
        w.write(XmlEvent::end_element())?; // mesh
        w.write(XmlEvent::end_element())?; // geometry
    }
    w.write(XmlEvent::end_element())?;
    Ok(())
}

fn write_scene<W: std::io::Write>(
    w: &mut EventWriter<W>,
    meshes: &[&MeshBuffer],
) -> Result<(), MeshError> {
    w.write(XmlEvent::start_element("library_visual_scenes"))?;
    w.write(
        XmlEvent::start_element("visual_scene")
            .attr("id", "Scene")
            .attr("name", "Scene"),
    )?;
    for mesh in meshes {
        let id = material_id(mesh);
        w.write(
            XmlEvent::start_element("node")
                .attr("id", &format!("{}-node", mesh.name))
                .attr("name", &mesh.name),
        )?;
        w.write(
            XmlEvent::start_element("instance_geometry")
                .attr("url", &format!("#{}-mesh", mesh.name)),
        )?;
        w.write(XmlEvent::start_element("bind_material"))?;
        w.write(XmlEvent::start_element("technique_common"))?;
        w.write(
            XmlEvent::start_element("instance_material")
                .attr("symbol", &id)
                .attr("target", &format!("#{id}")),
        )?;
        w.write(XmlEvent::end_element())?;
        w.write(XmlEvent::end_element())?; // technique_common
        w.write(XmlEvent::end_element())?; // bind_material
        w.write(XmlEvent::end_element())?; // instance_geometry
        w.write(XmlEvent::end_element())?; // node
    }
    w.write(XmlEvent::end_element())?; // visual_scene
    w.write(XmlEvent::end_element())?; // library_visual_scenes

    w.write(XmlEvent::start_element("scene"))?;
    w.write(XmlEvent::start_element("instance_visual_scene").attr("url", "#Scene"))?;
    w.write(XmlEvent::end_element())?;
    w.write(XmlEvent::end_element())?; // scene
    Ok(())
}
