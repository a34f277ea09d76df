//! PNG adapters for heightmaps, layer masks and material textures.
//!
//! PNG stores rows top-down; every loader here flips rows so the rest of
//! the pipeline only ever sees bottom-left-origin rasters.

use std::path::Path;

use image::{GrayImage, ImageBuffer, Luma};
use terraforge_raster::{threshold_mask, Grid};
use tracing::info;

use crate::TerrainError;

/// Load a 16-bit grayscale heightmap PNG as u16 height codes.
pub fn load_heightmap_png(path: &Path) -> Result<Grid<u16>, TerrainError> {
    let img = image::open(path)?.to_luma16();
    let (w, h) = img.dimensions();
    let mut grid = Grid::filled(w as usize, h as usize, 0u16);
    for (x, y, pixel) in img.enumerate_pixels() {
        grid.set(x as usize, (h - 1 - y) as usize, pixel.0[0]);
    }
    info!(path = %path.display(), width = w, height = h, "loaded heightmap");
    Ok(grid)
}

/// Write u16 height codes as a 16-bit grayscale PNG.
pub fn save_heightmap_png(path: &Path, codes: &Grid<u16>) -> Result<(), TerrainError> {
    let (w, h) = (codes.width() as u32, codes.height() as u32);
    let mut img: ImageBuffer<Luma<u16>, Vec<u16>> = ImageBuffer::new(w, h);
    for (x, y, pixel) in img.enumerate_pixels_mut() {
        *pixel = Luma([codes.get(x as usize, (h - 1 - y) as usize)]);
    }
    img.save(path)?;
    info!(path = %path.display(), "wrote heightmap");
    Ok(())
}

/// Load an 8-bit grayscale PNG as a boolean mask (threshold 128).
pub fn load_mask_png(path: &Path) -> Result<Grid<bool>, TerrainError> {
    let img: GrayImage = image::open(path)?.to_luma8();
    let (w, h) = img.dimensions();
    let mut gray = Grid::filled(w as usize, h as usize, 0u8);
    for (x, y, pixel) in img.enumerate_pixels() {
        gray.set(x as usize, (h - 1 - y) as usize, pixel.0[0]);
    }
    Ok(threshold_mask(&gray))
}

/// Load an RGBA material texture. Returns `(rgba_bytes, width, height)` in
/// texture order (top-left origin) for the dominant color extraction.
pub fn load_rgba_png(path: &Path) -> Result<(Vec<u8>, usize, usize), TerrainError> {
    let img = image::open(path)?.to_rgba8();
    let (w, h) = img.dimensions();
    Ok((img.into_raw(), w as usize, h as usize))
}

/// Load a grayscale texture (top-left origin) for roughness extraction.
pub fn load_gray_png(path: &Path) -> Result<(Vec<u8>, usize, usize), TerrainError> {
    let img = image::open(path)?.to_luma8();
    let (w, h) = img.dimensions();
    Ok((img.into_raw(), w as usize, h as usize))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heightmap_png_round_trip_preserves_codes_and_orientation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("height.png");

        let mut codes = Grid::filled(4, 4, 0u16);
        codes.set(0, 0, 1000); // bottom-left
        codes.set(3, 3, 64000); // top-right
        save_heightmap_png(&path, &codes).unwrap();

        let loaded = load_heightmap_png(&path).unwrap();
        assert_eq!(loaded.get(0, 0), 1000);
        assert_eq!(loaded.get(3, 3), 64000);
        assert_eq!(loaded.get(1, 1), 0);
    }

    #[test]
    fn mask_png_thresholds_at_128() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mask.png");

        let mut img = GrayImage::new(2, 1);
        img.put_pixel(0, 0, Luma([127]));
        img.put_pixel(1, 0, Luma([128]));
        img.save(&path).unwrap();

        let mask = load_mask_png(&path).unwrap();
        assert!(!mask.get(0, 0));
        assert!(mask.get(1, 0));
    }
}
