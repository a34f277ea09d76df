//! 2D raster primitives shared by the terrain and road pipeline.
//!
//! Every raster in the pipeline uses the same convention: row-major storage
//! with the origin at the **bottom-left** corner, so `(0, 0)` is the first
//! element of the buffer and `y` grows upward. PNG I/O flips rows at the
//! boundary; nothing inside the pipeline ever sees top-left data.

pub mod blur;
pub mod distance;

pub use blur::{gaussian_blur_masked, gaussian_kernel};
pub use distance::distance_transform;

use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Errors produced by raster construction and sampling.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RasterError {
    #[error("data length {len} does not match {width}x{height}")]
    SizeMismatch {
        len: usize,
        width: usize,
        height: usize,
    },
    #[error("rasters have different dimensions: {0}x{1} vs {2}x{3}")]
    DimensionMismatch(usize, usize, usize, usize),
}

/// A dense 2D grid, row-major with bottom-left origin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Grid<T> {
    width: usize,
    height: usize,
    data: Vec<T>,
}

impl<T: Clone> Grid<T> {
    /// Create a grid filled with a single value.
    pub fn filled(width: usize, height: usize, value: T) -> Self {
        Self {
            width,
            height,
            data: vec![value; width * height],
        }
    }

    /// Wrap an existing row-major buffer.
    pub fn from_vec(width: usize, height: usize, data: Vec<T>) -> Result<Self, RasterError> {
        if data.len() != width * height {
            return Err(RasterError::SizeMismatch {
                len: data.len(),
                width,
                height,
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Raw row-major buffer, bottom row first.
    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<T> {
        self.data
    }

    #[inline]
    pub fn in_bounds(&self, x: i64, y: i64) -> bool {
        x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.height
    }

    #[inline]
    fn index(&self, x: usize, y: usize) -> usize {
        debug_assert!(x < self.width && y < self.height);
        y * self.width + x
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> T {
        self.data[self.index(x, y)].clone()
    }

    #[inline]
    pub fn get_ref(&self, x: usize, y: usize) -> &T {
        &self.data[self.index(x, y)]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: T) {
        let i = self.index(x, y);
        self.data[i] = value;
    }

    /// Clamped read: out-of-range coordinates snap to the nearest edge pixel.
    pub fn get_clamped(&self, x: i64, y: i64) -> T {
        let cx = x.clamp(0, self.width as i64 - 1) as usize;
        let cy = y.clamp(0, self.height as i64 - 1) as usize;
        self.get(cx, cy)
    }

    /// Iterate `(x, y, value)` in storage order (bottom row first).
    pub fn iter_cells(&self) -> impl Iterator<Item = (usize, usize, &T)> + '_ {
        self.data
            .iter()
            .enumerate()
            .map(move |(i, v)| (i % self.width, i / self.width, v))
    }
}

impl Grid<f32> {
    /// Bilinear sample at fractional pixel coordinates.
    ///
    /// Coordinates address pixel centers; values outside the grid clamp to
    /// the border, matching the heightmap edge behavior of the blender.
    pub fn sample_bilinear(&self, pos: Vec2) -> f32 {
        let x = pos.x.clamp(0.0, self.width as f32 - 1.0);
        let y = pos.y.clamp(0.0, self.height as f32 - 1.0);

        let x0 = x.floor() as usize;
        let y0 = y.floor() as usize;
        let x1 = (x0 + 1).min(self.width - 1);
        let y1 = (y0 + 1).min(self.height - 1);

        let fx = x - x0 as f32;
        let fy = y - y0 as f32;

        let h00 = self.get(x0, y0);
        let h10 = self.get(x1, y0);
        let h01 = self.get(x0, y1);
        let h11 = self.get(x1, y1);

        let h0 = h00 * (1.0 - fx) + h10 * fx;
        let h1 = h01 * (1.0 - fx) + h11 * fx;

        h0 * (1.0 - fy) + h1 * fy
    }

    /// Minimum and maximum over the whole grid.
    pub fn min_max(&self) -> (f32, f32) {
        let min = self.data.iter().copied().fold(f32::INFINITY, f32::min);
        let max = self.data.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        (min, max)
    }
}

impl Grid<bool> {
    /// Count of `true` cells.
    pub fn count_set(&self) -> usize {
        self.data.iter().filter(|v| **v).count()
    }

    /// Grow the mask by one pixel in the 8-neighborhood, `steps` times.
    pub fn dilate(&self, steps: usize) -> Grid<bool> {
        let mut current = self.clone();
        for _ in 0..steps {
            let mut next = current.clone();
            for y in 0..self.height {
                for x in 0..self.width {
                    if current.get(x, y) {
                        continue;
                    }
                    'scan: for dy in -1i64..=1 {
                        for dx in -1i64..=1 {
                            let (nx, ny) = (x as i64 + dx, y as i64 + dy);
                            if current.in_bounds(nx, ny) && current.get(nx as usize, ny as usize) {
                                next.set(x, y, true);
                                break 'scan;
                            }
                        }
                    }
                }
            }
            current = next;
        }
        current
    }
}

/// Threshold an 8-bit raster into a boolean mask (`value >= 128` is set).
pub fn threshold_mask(gray: &Grid<u8>) -> Grid<bool> {
    let data = gray.data().iter().map(|v| *v >= 128).collect();
    Grid::from_vec(gray.width(), gray.height(), data).expect("same dimensions")
}
