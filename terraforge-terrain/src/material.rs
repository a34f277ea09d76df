//! Ordered material list, layer-mask resolution and texture statistics.
//!
//! Material order is authoritative: the list index is the index stored in
//! the `.ter` material raster. The first material is the fallback wherever
//! no layer mask claims a pixel.

use std::collections::HashMap;

use terraforge_raster::Grid;

use crate::TerrainError;

/// A terrain material: a name plus an optional layer mask that drives
/// material-index assignment. Materials without a mask occupy a valid index
/// but are never auto-placed.
#[derive(Debug, Clone)]
pub struct MaterialDef {
    pub name: String,
    pub layer: Option<Grid<bool>>,
}

impl MaterialDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            layer: None,
        }
    }

    pub fn with_layer(name: impl Into<String>, layer: Grid<bool>) -> Self {
        Self {
            name: name.into(),
            layer: Some(layer),
        }
    }
}

/// The ordered material list for one terrain.
#[derive(Debug, Clone, Default)]
pub struct MaterialSet {
    materials: Vec<MaterialDef>,
}

impl MaterialSet {
    pub fn new(materials: Vec<MaterialDef>) -> Self {
        Self { materials }
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.materials.iter().map(|m| m.name.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MaterialDef> {
        self.materials.iter()
    }

    pub fn get(&self, index: usize) -> Option<&MaterialDef> {
        self.materials.get(index)
    }

    /// Index of the material with the given name, if present.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.materials.iter().position(|m| m.name == name)
    }

    /// Verify that every layer mask matches the terrain size.
    pub fn validate(&self, size: usize) -> Result<(), TerrainError> {
        for mat in &self.materials {
            if let Some(layer) = &mat.layer {
                if layer.width() != size || layer.height() != size {
                    return Err(TerrainError::LayerSizeMismatch {
                        name: mat.name.clone(),
                        got: layer.width(),
                        want: size,
                    });
                }
            }
        }
        Ok(())
    }

    /// Resolve the per-pixel material index raster.
    ///
    /// The highest-indexed material whose mask covers a pixel wins; pixels
    /// no mask claims fall back to material 0.
    pub fn resolve_index_raster(&self, size: usize) -> Result<Grid<u8>, TerrainError> {
        use rayon::prelude::*;

        self.validate(size)?;
        let mut data = vec![0u8; size * size];
        data.par_chunks_mut(size).enumerate().for_each(|(y, row)| {
            for (x, cell) in row.iter_mut().enumerate() {
                for (idx, mat) in self.materials.iter().enumerate().rev() {
                    if let Some(layer) = &mat.layer {
                        if layer.get(x, y) {
                            *cell = idx as u8;
                            break;
                        }
                    }
                }
            }
        });
        Ok(Grid::from_vec(size, size, data).expect("same dimensions"))
    }
}

/// Dominant albedo color of the masked part of a material texture.
///
/// Texture rows use a top-left origin while the mask is bottom-left, so the
/// texel row is flipped before the coverage test. A texel counts once if any
/// terrain pixel it covers is masked; the most frequent RGB triple wins,
/// ties resolved toward the numerically smallest triple.
pub fn extract_dominant_color(
    rgba: &[u8],
    tex_width: usize,
    tex_height: usize,
    mask: &Grid<bool>,
) -> Option<String> {
    let mut counts: HashMap<(u8, u8, u8), u64> = HashMap::new();
    for ty in 0..tex_height {
        for tx in 0..tex_width {
            if !texel_covers_mask(tx, ty, tex_width, tex_height, mask) {
                continue;
            }
            let i = (ty * tex_width + tx) * 4;
            let rgb = (rgba[i], rgba[i + 1], rgba[i + 2]);
            *counts.entry(rgb).or_insert(0) += 1;
        }
    }
    let (rgb, _) = counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0)))?;
    Some(format!("#{:02X}{:02X}{:02X}", rgb.0, rgb.1, rgb.2))
}

/// Dominant intensity (0-255) of the masked part of a grayscale texture.
pub fn extract_dominant_roughness(
    gray: &[u8],
    tex_width: usize,
    tex_height: usize,
    mask: &Grid<bool>,
) -> Option<u8> {
    let mut counts = [0u64; 256];
    for ty in 0..tex_height {
        for tx in 0..tex_width {
            if !texel_covers_mask(tx, ty, tex_width, tex_height, mask) {
                continue;
            }
            counts[gray[ty * tex_width + tx] as usize] += 1;
        }
    }
    counts
        .iter()
        .enumerate()
        .filter(|(_, c)| **c > 0)
        .max_by_key(|(v, c)| (**c, usize::MAX - *v))
        .map(|(v, _)| v as u8)
}

/// Whether any terrain pixel covered by the texel `(tx, ty)` is masked.
fn texel_covers_mask(
    tx: usize,
    ty: usize,
    tex_width: usize,
    tex_height: usize,
    mask: &Grid<bool>,
) -> bool {
    let n = mask.width();
    // Horizontal terrain span of this texel.
    let x0 = tx * n / tex_width;
    let x1 = (((tx + 1) * n).div_ceil(tex_width)).min(n).max(x0 + 1);
    // Vertical span in texture space (top origin), flipped into mask space.
    let top0 = ty * n / tex_height;
    let top1 = (((ty + 1) * n).div_ceil(tex_height)).min(n).max(top0 + 1);
    for top in top0..top1 {
        let my = n - 1 - top;
        for mx in x0..x1.min(n) {
            if mask.get(mx, my) {
                return true;
            }
        }
    }
    false
}
