//! Masked Gaussian smoothing.
//!
//! The terrain blender runs a Gaussian pass over the blend annulus after
//! embedding the road surface. The pass must never touch protected road
//! pixels, so the kernel is applied only where the write mask is set; reads
//! clamp at the raster border.

use crate::Grid;

/// Normalized 1D Gaussian kernel of odd length `size`.
pub fn gaussian_kernel(size: usize, sigma: f32) -> Vec<f32> {
    let size = if size % 2 == 0 { size + 1 } else { size };
    let half = (size / 2) as i64;
    let s2 = 2.0 * sigma.max(1e-6) * sigma.max(1e-6);
    let mut kernel: Vec<f32> = (-half..=half)
        .map(|i| (-(i * i) as f32 / s2).exp())
        .collect();
    let sum: f32 = kernel.iter().sum();
    for k in &mut kernel {
        *k /= sum;
    }
    kernel
}

/// Separable Gaussian blur writing only into `write_mask` pixels.
///
/// Pixels outside the write mask keep their value but still contribute as
/// neighbors, which keeps the transition into untouched terrain continuous.
pub fn gaussian_blur_masked(
    grid: &mut Grid<f32>,
    write_mask: &Grid<bool>,
    kernel_size: usize,
    sigma: f32,
    iterations: usize,
) {
    let kernel = gaussian_kernel(kernel_size, sigma);
    let half = (kernel.len() / 2) as i64;
    let (w, h) = (grid.width(), grid.height());

    for _ in 0..iterations {
        // Horizontal pass.
        let mut pass = grid.clone();
        for y in 0..h {
            for x in 0..w {
                if !write_mask.get(x, y) {
                    continue;
                }
                let mut acc = 0.0;
                for (k, weight) in kernel.iter().enumerate() {
                    let sx = x as i64 + k as i64 - half;
                    acc += weight * grid.get_clamped(sx, y as i64);
                }
                pass.set(x, y, acc);
            }
        }
        // Vertical pass.
        for y in 0..h {
            for x in 0..w {
                if !write_mask.get(x, y) {
                    continue;
                }
                let mut acc = 0.0;
                for (k, weight) in kernel.iter().enumerate() {
                    let sy = y as i64 + k as i64 - half;
                    acc += weight * pass.get_clamped(x as i64, sy);
                }
                grid.set(x, y, acc);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn kernel_sums_to_one() {
        let k = gaussian_kernel(7, 1.5);
        assert_relative_eq!(k.iter().sum::<f32>(), 1.0, epsilon = 1e-6);
        assert_eq!(k.len(), 7);
    }

    #[test]
    fn even_size_is_promoted_to_odd() {
        assert_eq!(gaussian_kernel(4, 1.0).len(), 5);
    }

    #[test]
    fn constant_field_is_unchanged() {
        let mut g = Grid::filled(8, 8, 3.5f32);
        let mask = Grid::filled(8, 8, true);
        gaussian_blur_masked(&mut g, &mask, 5, 1.0, 2);
        for v in g.data() {
            assert_relative_eq!(*v, 3.5, epsilon = 1e-5);
        }
    }

    #[test]
    fn masked_pixels_are_untouched() {
        let mut g = Grid::filled(8, 8, 0.0f32);
        g.set(4, 4, 100.0);
        let mut mask = Grid::filled(8, 8, true);
        mask.set(4, 4, false);
        gaussian_blur_masked(&mut g, &mask, 5, 1.0, 1);
        assert_relative_eq!(g.get(4, 4), 100.0);
        // Neighbors absorb some of the spike.
        assert!(g.get(3, 4) > 0.0);
    }
}
