//! End-to-end pipeline runs over synthetic terrains.

use std::path::Path;

use image::{GrayImage, ImageBuffer, Luma};
use tempfile::TempDir;
use terraforge_pipeline::{
    config::MaterialConfig, CancelToken, PipelineConfig, PipelineError,
};
use terraforge_roads::RoadParams;
use terraforge_terrain::codec;

fn write_heightmap16(path: &Path, size: u32, value_for_row: impl Fn(u32) -> u16) {
    let mut img: ImageBuffer<Luma<u16>, Vec<u16>> = ImageBuffer::new(size, size);
    for (_, y, pixel) in img.enumerate_pixels_mut() {
        // PNG rows are top-down; bottom-left row index is size-1-y.
        *pixel = Luma([value_for_row(size - 1 - y)]);
    }
    img.save(path).unwrap();
}

fn write_road_strip_mask(path: &Path, size: u32, center_row: u32, half_width: u32) {
    let mut img = GrayImage::new(size, size);
    for (x, y, pixel) in img.enumerate_pixels_mut() {
        let row = size - 1 - y;
        let on = row.abs_diff(center_row) <= half_width;
        *pixel = Luma([if on { 255 } else { 0 }]);
        let _ = x;
    }
    img.save(path).unwrap();
}

fn flat_config(dir: &Path) -> PipelineConfig {
    let heightmap = dir.join("height.png");
    write_heightmap16(&heightmap, 256, |_| 32768);
    PipelineConfig {
        terrain_name: "flat".into(),
        size_pixels: 256,
        max_height: 100.0,
        base_height: 0.0,
        meters_per_pixel: 1.0,
        heightmap,
        materials: vec![MaterialConfig {
            name: "grass".into(),
            ..Default::default()
        }],
        ..Default::default()
    }
}

#[test]
fn flat_terrain_without_roads() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("out");
    let config = flat_config(dir.path());

    let report = terraforge_pipeline::run(&config, &out, &CancelToken::new()).unwrap();
    assert_eq!(report.splines, 0);
    assert_eq!(report.junctions, 0);
    assert_eq!(report.modified_pixels, 0);

    let ter_bytes = std::fs::read(out.join("flat.ter")).unwrap();
    let n = 256usize * 256;
    // version + size + heights + material + reserved + count + "grass"
    assert_eq!(ter_bytes.len(), 1 + 4 + 2 * n + n + n + 4 + (1 + 5));

    let decoded = codec::decode(&ter_bytes).unwrap();
    assert_eq!(decoded.material_names, vec!["grass".to_string()]);
    assert!(decoded.material_index.data().iter().all(|i| *i == 0));
    for code in decoded.height_codes.data() {
        let meters = *code as f32 / 65535.0 * 100.0;
        assert!((meters - 50.0).abs() < 0.002);
    }

    assert!(out.join("flat_smoothed_heightmap.png").exists());
    assert!(out.join("flat.dae").exists());
    let dae = std::fs::read_to_string(out.join("flat.dae")).unwrap();
    assert!(dae.contains("library_geometries"));
}

#[test]
fn road_on_tilted_plane_is_level() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("out");
    let size = 256u32;

    let heightmap = dir.path().join("height.png");
    write_heightmap16(&heightmap, size, |row| {
        ((row as f64 / (size - 1) as f64) * 65535.0) as u16
    });
    let road_mask = dir.path().join("roads.png");
    write_road_strip_mask(&road_mask, size, 128, 3);

    let config = PipelineConfig {
        terrain_name: "tilted".into(),
        size_pixels: size as usize,
        max_height: 100.0,
        base_height: 0.0,
        meters_per_pixel: 1.0,
        heightmap,
        materials: vec![
            MaterialConfig {
                name: "grass".into(),
                ..Default::default()
            },
            MaterialConfig {
                name: "asphalt".into(),
                layer: Some(road_mask),
                road: Some(RoadParams {
                    road_width_meters: 8.0,
                    terrain_affected_range_meters: 10.0,
                    road_max_slope_degrees: 0.0,
                    enable_endpoint_taper: false,
                    smoothing_iterations: 0,
                    ..Default::default()
                }),
                ..Default::default()
            },
        ],
        ..Default::default()
    };

    let report = terraforge_pipeline::run(&config, &out, &CancelToken::new()).unwrap();
    assert_eq!(report.splines, 1);
    assert!(report.cross_sections > 10);
    assert!(report.modified_pixels > 0);

    let decoded = codec::decode(&std::fs::read(out.join("tilted.ter")).unwrap()).unwrap();
    let to_meters = |code: u16| code as f32 / 65535.0 * 100.0;

    // Zero max slope levels the whole road; every pixel within 3 px of the
    // centerline row carries the same elevation.
    let reference = to_meters(decoded.height_codes.get(100, 128));
    for x in (40..216).step_by(4) {
        for y in 126..=130 {
            let v = to_meters(decoded.height_codes.get(x, y));
            assert!(
                (v - reference).abs() < 0.01,
                "road not level at ({x},{y}): {v} vs {reference}"
            );
        }
    }

    // Far outside the corridor the terrain is untouched.
    for y in [60usize, 200] {
        let expected = y as f32 / 255.0 * 100.0;
        let v = to_meters(decoded.height_codes.get(128, y));
        assert!((v - expected).abs() < 0.01, "terrain modified at y={y}");
    }

    // The road material got painted into the raster near the centerline.
    let road_index = decoded
        .material_names
        .iter()
        .position(|n| n == "asphalt")
        .unwrap() as u8;
    let mut painted = 0;
    for x in 40..216 {
        if decoded.material_index.get(x, 128) == road_index {
            painted += 1;
        }
    }
    assert!(painted > 150, "road material painted on {painted} pixels only");

    // Mesh exists and references the road material.
    let dae = std::fs::read_to_string(out.join("tilted.dae")).unwrap();
    assert!(dae.contains("asphalt"));
    assert!(dae.contains("<triangles"));
}

#[test]
fn cancelled_run_leaves_no_outputs() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("out");
    let config = flat_config(dir.path());

    let cancel = CancelToken::new();
    cancel.cancel();
    let err = terraforge_pipeline::run(&config, &out, &cancel).unwrap_err();
    assert!(matches!(err, PipelineError::Cancelled));
    assert!(!out.join("flat.ter").exists());
}

#[test]
fn invalid_config_reports_validation_error() {
    let dir = TempDir::new().unwrap();
    let mut config = flat_config(dir.path());
    config.size_pixels = 300;
    let err = terraforge_pipeline::run(&config, &dir.path().join("out"), &CancelToken::new())
        .unwrap_err();
    assert!(matches!(err, PipelineError::Validation(_)));
    assert_eq!(err.exit_code(), 2);
}

#[test]
fn heightmap_size_mismatch_is_corrupt_input() {
    let dir = TempDir::new().unwrap();
    let mut config = flat_config(dir.path());
    config.size_pixels = 512; // heightmap on disk is 256
    let err = terraforge_pipeline::run(&config, &dir.path().join("out"), &CancelToken::new())
        .unwrap_err();
    assert!(matches!(err, PipelineError::CorruptInput(_)));
}

#[test]
fn vector_features_build_roads_without_masks() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("out");
    let size = 256u32;

    let heightmap = dir.path().join("height.png");
    // Tilted plane so embedding measurably changes the terrain.
    write_heightmap16(&heightmap, size, |row| (row * 128) as u16);

    let features_path = dir.path().join("roads.json");
    std::fs::write(
        &features_path,
        r#"[{"kind": "line",
             "coords": [[20, 128], [120, 128], [230, 128]],
             "tags": {"highway": "primary"}},
            {"kind": "polygon",
             "coords": [[60, 60], [90, 60], [90, 90], [60, 90]],
             "tags": {"amenity": "parking"}}]"#,
    )
    .unwrap();

    let config = PipelineConfig {
        terrain_name: "vector".into(),
        size_pixels: size as usize,
        max_height: 100.0,
        base_height: 0.0,
        meters_per_pixel: 1.0,
        heightmap,
        road_features: Some(features_path),
        materials: vec![
            MaterialConfig {
                name: "grass".into(),
                ..Default::default()
            },
            MaterialConfig {
                name: "asphalt".into(),
                road: Some(RoadParams::default()),
                ..Default::default()
            },
        ],
        ..Default::default()
    };

    let report = terraforge_pipeline::run(&config, &out, &CancelToken::new()).unwrap();
    assert_eq!(report.splines, 1);
    assert!(report.modified_pixels > 0);

    let decoded = codec::decode(&std::fs::read(out.join("vector.ter")).unwrap()).unwrap();
    let road_index = decoded
        .material_names
        .iter()
        .position(|n| n == "asphalt")
        .unwrap() as u8;
    assert!(decoded
        .material_index
        .data()
        .iter()
        .any(|i| *i == road_index));

    // The ribbon and the draped parking polygon share the road material
    // mesh: 2 triangles per section pair plus 2 for the quad polygon.
    let dae = std::fs::read_to_string(out.join("vector.dae")).unwrap();
    let triangles_element = dae.split("<triangles").nth(1).unwrap();
    let triangle_count: usize = triangles_element
        .split("count=\"")
        .nth(1)
        .unwrap()
        .split('"')
        .next()
        .unwrap()
        .parse()
        .unwrap();
    let expected_ribbon = (report.cross_sections - 1) * 2;
    assert_eq!(triangle_count, expected_ribbon + 2);
}
