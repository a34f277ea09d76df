//! Pipeline orchestration: inputs -> road network -> terrain -> outputs.
//!
//! Dependency-ordered and deterministic: material maps are `BTreeMap`s,
//! spline work fans out through rayon but results are applied in ascending
//! spline-id order, and all outputs are written atomically (temp file +
//! rename). A cooperative [`CancelToken`] is checked between phases and
//! between splines.

pub mod config;
pub mod error;
pub mod features;

pub use config::{MaterialConfig, PipelineConfig};
pub use error::PipelineError;
pub use features::{load_features, FeatureKind, RoadFeature};

use std::collections::BTreeMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{info, warn};

use terraforge_mesh::{write_collada, MeshBuffer};
use terraforge_raster::Grid;
use terraforge_roads::{
    embed::embed_network,
    extract::{centerlines_from_mask, centerlines_from_polylines, fit_splines, ExtractedPath},
    junction::{detect_junctions, harmonize_junctions, taper_free_endpoints, MaterialParams},
    network::RoadNetwork,
    road_mesh::{build_road_mesh, WorldFrame},
    section::{apply_banking, mark_excluded, sample_sections},
    smooth::compute_targets,
    RoadParams, SplineState,
};
use terraforge_terrain::{
    codec, heights_to_codes, material::MaterialDef, png, ElevationSource, MaterialSet,
    PngHeightmap,
};

/// Cooperative cancellation flag shared with the caller.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), PipelineError> {
        if self.is_cancelled() {
            Err(PipelineError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Summary returned on success and printed by the CLI.
#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    pub splines: usize,
    pub cross_sections: usize,
    pub junctions: usize,
    pub modified_pixels: usize,
    pub material_colors: BTreeMap<String, String>,
    pub material_roughness: BTreeMap<String, u8>,
    pub outputs: Vec<PathBuf>,
}

/// Run the full pipeline for one terrain.
pub fn run(
    config: &PipelineConfig,
    output_dir: &Path,
    cancel: &CancelToken,
) -> Result<PipelineReport, PipelineError> {
    config.validate()?;
    std::fs::create_dir_all(output_dir).map_err(|e| PipelineError::io(output_dir, e))?;

    let size = config.size_pixels;
    let mpp = config.meters_per_pixel;

    // ---- Inputs -----------------------------------------------------------
    let source = PngHeightmap::open(&config.heightmap, config.max_height, mpp)?;
    if source.width() != size || source.height() != size {
        return Err(PipelineError::CorruptInput(format!(
            "heightmap is {}x{}, config says {size}x{size}",
            source.width(),
            source.height()
        )));
    }
    let original = source.into_elevations();

    let mut layers: BTreeMap<String, Grid<bool>> = BTreeMap::new();
    for mat in &config.materials {
        if let Some(path) = &mat.layer {
            let mask = png::load_mask_png(path)?;
            if mask.width() != size || mask.height() != size {
                return Err(PipelineError::CorruptInput(format!(
                    "layer mask '{}' is {}x{}, terrain is {size}x{size}",
                    mat.name,
                    mask.width(),
                    mask.height()
                )));
            }
            layers.insert(mat.name.clone(), mask);
        }
    }

    let exclusion = match &config.exclusion_mask {
        Some(path) => {
            let mask = png::load_mask_png(path)?;
            if mask.width() != size || mask.height() != size {
                return Err(PipelineError::CorruptInput(
                    "exclusion mask size mismatch".into(),
                ));
            }
            Some(mask)
        }
        None => None,
    };

    let features = match &config.road_features {
        Some(path) => features::load_features(path)?,
        None => Vec::new(),
    };
    cancel.check()?;

    // ---- Road network -----------------------------------------------------
    let mut params_map: BTreeMap<String, RoadParams> = BTreeMap::new();
    for mat in config.road_materials() {
        params_map.insert(mat.name.clone(), mat.road.clone().expect("road material"));
    }
    let default_road = config.road_materials().next().map(|m| m.name.clone());

    let mut network = RoadNetwork::new();
    let mut next_id = 0u32;
    for mat in config.road_materials() {
        cancel.check()?;
        let p = mat.road.as_ref().expect("road material");

        let mut paths: Vec<ExtractedPath> = Vec::new();
        if let Some(mask) = layers.get(&mat.name) {
            paths = centerlines_from_mask(mask, p);
        } else if !features.is_empty() {
            let is_default = default_road.as_deref() == Some(mat.name.as_str());
            for feature in features::lines_for_material(&features, &mat.name, is_default) {
                let mut extracted =
                    centerlines_from_polylines(&[feature.points()], p, mpp);
                if feature.is_roundabout() {
                    for path in &mut extracted {
                        path.is_roundabout = true;
                    }
                }
                paths.extend(extracted);
            }
        } else {
            warn!(material = %mat.name, "road material has neither layer mask nor features");
            continue;
        }

        let splines = fit_splines(&paths, p, &mat.name, mpp, next_id);
        next_id += splines.len() as u32;

        // Sampling is independent per spline.
        let sampled: Vec<_> = splines
            .into_par_iter()
            .map(|spline| {
                let sections = sample_sections(&spline, p, &original, mpp);
                (spline, sections)
            })
            .collect();

        for (spline, mut sections) in sampled {
            cancel.check()?;
            if let Some(excl) = &exclusion {
                mark_excluded(&mut sections, excl);
            }
            let id = spline.id;
            if let Err(e) = network.add_spline(spline, sections) {
                warn!(spline = id.0, error = %e, "skipping spline");
            }
        }
        info!(material = %mat.name, splines = network.splines().len(), "extracted road material");
    }

    // ---- Elevation smoothing ---------------------------------------------
    for (material, p) in &params_map {
        let ids: Vec<_> = network
            .spline_ids()
            .into_iter()
            .filter(|id| {
                network
                    .spline(*id)
                    .map(|s| &s.material == material)
                    .unwrap_or(false)
            })
            .collect();
        if ids.is_empty() {
            continue;
        }
        // Network-wide leveling reference for this material.
        let (sum, count) = ids
            .iter()
            .flat_map(|id| network.sections_of(*id))
            .fold((0.0f64, 0usize), |(s, c), sec| {
                (s + sec.terrain_elevation as f64, c + 1)
            });
        let reference = if count > 0 { (sum / count as f64) as f32 } else { 0.0 };

        let targets: Vec<_> = ids
            .par_iter()
            .map(|id| {
                let profile =
                    compute_targets(network.sections_of(*id), &original, p, mpp, reference);
                (*id, profile)
            })
            .collect();
        for (id, profile) in targets {
            network.set_targets(id, &profile);
        }
        for spline in network.splines_mut() {
            if &spline.material == material {
                spline.state = SplineState::Smoothed;
            }
        }
    }
    cancel.check()?;

    // ---- Junctions --------------------------------------------------------
    let material_params = MaterialParams::new(&params_map);
    let hints = features::junction_hints(&features);
    network.junctions = detect_junctions(&network, &material_params, mpp, &hints);

    let primary_materials: Vec<Option<String>> = network
        .junctions
        .iter()
        .map(|j| j.members.first().and_then(|id| network_material(&network, *id)))
        .collect();
    for (junction, primary) in network.junctions.iter_mut().zip(primary_materials) {
        for excluded in &config.excluded_junctions {
            let loc = glam::Vec2::new(excluded[0], excluded[1]);
            if (junction.location - loc).length() <= junction.detection_radius_m / mpp {
                junction.excluded = true;
                junction.exclusion_reason = Some("excluded by user".into());
            }
        }
        if let Some(material) = primary {
            if !material_params.get(&material).enable_junction_harmonization {
                junction.excluded = true;
                junction.exclusion_reason = Some("harmonization disabled".into());
            }
        }
    }
    harmonize_junctions(&mut network, &material_params);
    taper_free_endpoints(&mut network, &material_params);

    // Banking runs last so edge elevations see the final targets.
    for id in network.spline_ids() {
        let Some(spline) = network.spline(id).cloned() else {
            continue;
        };
        let p = material_params.get(&spline.material).clone();
        apply_banking(network.sections_of_mut(id), &spline, &p, mpp);
    }
    for spline in network.splines_mut() {
        spline.state = SplineState::Harmonized;
    }
    cancel.check()?;

    // ---- Terrain blending -------------------------------------------------
    let mut working = original.clone();
    let embed = embed_network(
        &mut working,
        &original,
        &mut network,
        &material_params,
        mpp,
        exclusion.as_ref(),
    );
    cancel.check()?;

    // ---- Material raster + codec -----------------------------------------
    let mut defs = Vec::with_capacity(config.materials.len());
    for mat in &config.materials {
        let mut layer = layers.get(&mat.name).cloned();
        if let Some(surface) = embed.surface_by_material.get(&mat.name) {
            layer = Some(match layer {
                Some(mut base) => {
                    for (dst, src) in base.data_mut().iter_mut().zip(surface.data()) {
                        *dst |= *src;
                    }
                    base
                }
                None => surface.clone(),
            });
        }
        defs.push(match layer {
            Some(layer) => MaterialDef::with_layer(mat.name.clone(), layer),
            None => MaterialDef::new(mat.name.clone()),
        });
    }
    let material_set = MaterialSet::new(defs);

    let (material_colors, material_roughness) = extract_material_stats(config, &material_set)?;

    let ter_bytes = codec::encode(&working, &material_set, config.max_height)?;
    let ter_path = output_dir.join(format!("{}.ter", config.terrain_name));
    write_atomic(&ter_path, &ter_bytes)?;

    // ---- Debug heightmap --------------------------------------------------
    let smoothed_codes = heights_to_codes(&working, config.max_height);
    let png_path = output_dir.join(format!("{}_smoothed_heightmap.png", config.terrain_name));
    write_atomic(&png_path, &encode_png16(&smoothed_codes)?)?;

    // ---- Road meshes ------------------------------------------------------
    let frame = WorldFrame {
        terrain_size: size,
        meters_per_pixel: mpp,
        base_height: config.base_height,
    };
    let mut meshes: Vec<MeshBuffer> = Vec::new();
    for (material, p) in &params_map {
        let mut buffer = MeshBuffer::new(format!("road_{material}")).with_material(material.clone());
        for id in network.spline_ids() {
            if network_material(&network, id).as_deref() != Some(material.as_str()) {
                continue;
            }
            let sections = network.sections_of(id);
            let mesh = build_road_mesh(sections, p, &frame, &format!("{material}_{}", id.0), material);
            buffer.merge(&mesh);
        }
        // Polygon features (paved areas) drape onto the blended terrain.
        let is_default = default_road.as_deref() == Some(material.as_str());
        for feature in &features {
            if feature.kind != FeatureKind::Polygon {
                continue;
            }
            let assigned = match feature.material() {
                Some(m) => m == material.as_str(),
                None => is_default,
            };
            if !assigned {
                continue;
            }
            if let Some(mesh) = polygon_feature_mesh(feature, p, &working, &frame) {
                buffer.merge(&mesh);
            }
        }
        if !buffer.is_empty() {
            meshes.push(buffer);
        }
    }
    for spline in network.splines_mut() {
        spline.state = SplineState::Meshed;
    }
    if meshes.is_empty() {
        info!("no roads: emitting empty road mesh document");
    }

    let dae_path = output_dir.join(format!("{}.dae", config.terrain_name));
    let dae_tmp = output_dir.join(format!("{}.dae.tmp", config.terrain_name));
    // Extracted dominant colors drive the mesh materials' diffuse.
    write_collada(&dae_tmp, &meshes, &material_colors)?;
    std::fs::rename(&dae_tmp, &dae_path).map_err(|e| PipelineError::io(&dae_path, e))?;

    let report = PipelineReport {
        splines: network.splines().len(),
        cross_sections: network.section_count(),
        junctions: network.junction_count(),
        modified_pixels: embed.modified_pixels,
        material_colors,
        material_roughness,
        outputs: vec![ter_path, png_path, dae_path],
    };
    info!(
        splines = report.splines,
        cross_sections = report.cross_sections,
        junctions = report.junctions,
        modified_pixels = report.modified_pixels,
        "pipeline finished"
    );
    Ok(report)
}

fn network_material(network: &RoadNetwork, id: terraforge_roads::SplineId) -> Option<String> {
    network.spline(id).map(|s| s.material.clone())
}

/// Triangulate a polygon feature and drape it over the blended terrain,
/// slightly lifted so it does not z-fight the ground.
fn polygon_feature_mesh(
    feature: &RoadFeature,
    params: &RoadParams,
    heights: &Grid<f32>,
    frame: &WorldFrame,
) -> Option<MeshBuffer> {
    const SURFACE_LIFT_M: f32 = 0.05;

    let mut ring: Vec<glam::DVec2> = feature
        .coords
        .iter()
        .map(|c| glam::DVec2::new(c[0] as f64, c[1] as f64))
        .collect();
    // Drop a duplicated closing vertex; earcut expects open rings.
    if ring.len() > 1 && ring.first() == ring.last() {
        ring.pop();
    }
    if ring.len() < 3 {
        warn!("skipping degenerate polygon feature ({} vertices)", ring.len());
        return None;
    }
    terraforge_mesh::earcut::ensure_winding(&mut ring, true);
    let triangles = terraforge_mesh::earcut(&ring, &[]);
    if triangles.is_empty() {
        warn!("polygon feature could not be triangulated");
        return None;
    }

    let mut mesh = MeshBuffer::new("area");
    for v in &ring {
        let pixel = glam::Vec2::new(v.x as f32, v.y as f32);
        let elevation = heights.sample_bilinear(pixel) + SURFACE_LIFT_M;
        let world = frame.to_world(pixel, elevation);
        let uv = glam::Vec2::new(
            world.x / params.texture_repeat_meters_u.max(1e-6),
            world.y / params.texture_repeat_meters_u.max(1e-6),
        );
        mesh.add_vertex(world, glam::Vec3::Z, uv);
    }
    for t in triangles.chunks(3) {
        mesh.add_triangle(t[0], t[1], t[2]);
    }
    Some(mesh)
}

/// Dominant color and roughness for materials that supply textures.
fn extract_material_stats(
    config: &PipelineConfig,
    materials: &MaterialSet,
) -> Result<(BTreeMap<String, String>, BTreeMap<String, u8>), PipelineError> {
    let mut colors = BTreeMap::new();
    let mut roughness_values = BTreeMap::new();
    for mat in &config.materials {
        let Some(index) = materials.index_of(&mat.name) else {
            continue;
        };
        let Some(mask) = materials.get(index).and_then(|d| d.layer.clone()) else {
            continue;
        };
        if let Some(texture_path) = &mat.albedo_texture {
            let (rgba, w, h) = png::load_rgba_png(texture_path)?;
            if let Some(color) = terraforge_terrain::extract_dominant_color(&rgba, w, h, &mask) {
                info!(material = %mat.name, %color, "dominant albedo color");
                colors.insert(mat.name.clone(), color);
            }
        }
        if let Some(rough_path) = &mat.roughness_texture {
            let (gray, w, h) = png::load_gray_png(rough_path)?;
            if let Some(roughness) =
                terraforge_terrain::extract_dominant_roughness(&gray, w, h, &mask)
            {
                info!(material = %mat.name, roughness, "dominant roughness");
                roughness_values.insert(mat.name.clone(), roughness);
            }
        }
    }
    Ok((colors, roughness_values))
}

/// Encode u16 codes as PNG bytes (top-left origin flip included).
fn encode_png16(codes: &Grid<u16>) -> Result<Vec<u8>, PipelineError> {
    let (w, h) = (codes.width() as u32, codes.height() as u32);
    let mut img: image::ImageBuffer<image::Luma<u16>, Vec<u16>> = image::ImageBuffer::new(w, h);
    for (x, y, pixel) in img.enumerate_pixels_mut() {
        *pixel = image::Luma([codes.get(x as usize, (h - 1 - y) as usize)]);
    }
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .map_err(|e| PipelineError::CorruptInput(format!("png encode: {e}")))?;
    Ok(bytes)
}

/// Write a file via temp-and-rename so cancelled or failed runs leave no
/// partial outputs behind.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), PipelineError> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, bytes).map_err(|e| PipelineError::io(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| PipelineError::io(path, e))?;
    Ok(())
}
