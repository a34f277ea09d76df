//! Pluggable elevation sources.
//!
//! GeoTIFF and projection handling live outside the core; whatever adapter
//! sits upstream only has to yield a square elevation raster in meters.
//! The PNG-backed source below is the one the pipeline ships with.

use std::path::{Path, PathBuf};

use terraforge_raster::Grid;

use crate::{heights_from_codes, png, TerrainError};

/// A raster of elevations in meters plus its ground resolution.
pub trait ElevationSource {
    fn width(&self) -> usize;
    fn height(&self) -> usize;
    /// Ground size of one pixel in meters.
    fn pixel_size_m(&self) -> f32;
    /// The elevation raster in meters, bottom-left origin.
    fn elevations(&self) -> &Grid<f32>;
}

/// 16-bit grayscale PNG heightmap, decoded against a `max_height` scale.
pub struct PngHeightmap {
    path: PathBuf,
    pixel_size_m: f32,
    elevations: Grid<f32>,
}

impl PngHeightmap {
    pub fn open(path: &Path, max_height: f32, pixel_size_m: f32) -> Result<Self, TerrainError> {
        let codes = png::load_heightmap_png(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            pixel_size_m,
            elevations: heights_from_codes(&codes, max_height),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn into_elevations(self) -> Grid<f32> {
        self.elevations
    }
}

impl ElevationSource for PngHeightmap {
    fn width(&self) -> usize {
        self.elevations.width()
    }

    fn height(&self) -> usize {
        self.elevations.height()
    }

    fn pixel_size_m(&self) -> f32 {
        self.pixel_size_m
    }

    fn elevations(&self) -> &Grid<f32> {
        &self.elevations
    }
}
