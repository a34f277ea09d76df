//! Binary `.ter` v9 reader and writer.
//!
//! Little-endian layout: version byte, u32 edge length `N`, `N*N` u16
//! height codes (row-major, bottom row first), `N*N` material indices,
//! a reserved `N*N` layer-texture block (written as zeros), then a u32
//! material count followed by length-prefixed ASCII names.
//!
//! Some files in the wild omit the reserved block; the reader detects its
//! presence from the remaining byte count and accepts both forms.

use terraforge_raster::Grid;
use tracing::debug;

use crate::{heights_to_codes, is_allowed_size, MaterialSet, TerrainError, HOLE_INDEX};

/// The only `.ter` version this codec understands.
pub const TER_VERSION: u8 = 9;

/// Decoded contents of a `.ter` file.
#[derive(Debug, Clone)]
pub struct TerrainFile {
    pub size: usize,
    pub height_codes: Grid<u16>,
    pub material_index: Grid<u8>,
    pub material_names: Vec<String>,
}

impl TerrainFile {
    /// Boolean mask of the pixels assigned to material `index`.
    pub fn layer_mask(&self, index: usize) -> Grid<bool> {
        let data = self
            .material_index
            .data()
            .iter()
            .map(|i| *i as usize == index)
            .collect();
        Grid::from_vec(self.size, self.size, data).expect("same dimensions")
    }

    /// Boolean mask of terrain holes.
    pub fn hole_mask(&self) -> Grid<bool> {
        let data = self
            .material_index
            .data()
            .iter()
            .map(|i| *i == HOLE_INDEX)
            .collect();
        Grid::from_vec(self.size, self.size, data).expect("same dimensions")
    }
}

/// Encode a terrain into `.ter` v9 bytes.
///
/// Heights are given in meters and quantized against `max_height`; the
/// material raster is resolved from the set's layer masks with the highest
/// index winning per pixel.
pub fn encode(
    heights: &Grid<f32>,
    materials: &MaterialSet,
    max_height: f32,
) -> Result<Vec<u8>, TerrainError> {
    let size = heights.width();
    if heights.height() != size || !is_allowed_size(size) {
        return Err(TerrainError::InvalidSize(size));
    }
    if materials.is_empty() {
        return Err(TerrainError::CorruptInput(
            "material list must not be empty".into(),
        ));
    }
    if materials.len() > HOLE_INDEX as usize {
        return Err(TerrainError::CorruptInput(format!(
            "too many materials: {} (max {})",
            materials.len(),
            HOLE_INDEX
        )));
    }

    let codes = heights_to_codes(heights, max_height);
    let index_raster = materials.resolve_index_raster(size)?;

    let name_bytes: usize = materials.iter().map(|m| 1 + m.name.len()).sum();
    let mut out = Vec::with_capacity(5 + size * size * 4 + 4 + name_bytes);

    out.push(TER_VERSION);
    out.extend_from_slice(&(size as u32).to_le_bytes());
    for code in codes.data() {
        out.extend_from_slice(&code.to_le_bytes());
    }
    out.extend_from_slice(index_raster.data());
    // Reserved layer-texture block.
    out.extend(std::iter::repeat_n(0u8, size * size));
    out.extend_from_slice(&(materials.len() as u32).to_le_bytes());
    for mat in materials.iter() {
        let name = mat.name.as_bytes();
        if name.len() > u8::MAX as usize {
            return Err(TerrainError::CorruptInput(format!(
                "material name '{}' exceeds 255 bytes",
                mat.name
            )));
        }
        out.push(name.len() as u8);
        out.extend_from_slice(name);
    }

    debug!(size, materials = materials.len(), bytes = out.len(), "encoded terrain");
    Ok(out)
}

/// Decode `.ter` v9 bytes.
pub fn decode(bytes: &[u8]) -> Result<TerrainFile, TerrainError> {
    let mut cursor = Cursor::new(bytes);

    let version = cursor.u8()?;
    if version != TER_VERSION {
        return Err(TerrainError::UnsupportedFormat(version));
    }
    let size = cursor.u32()? as usize;
    if !is_allowed_size(size) {
        return Err(TerrainError::InvalidSize(size));
    }
    let cell_count = size * size;

    let mut codes = vec![0u16; cell_count];
    for code in &mut codes {
        *code = cursor.u16()?;
    }
    let material_bytes = cursor.take(cell_count)?.to_vec();

    // The reserved layer-texture block is optional on disk. If the bytes
    // after the material raster can hold it plus the material table, it is
    // present and skipped; otherwise the material count follows directly.
    if cursor.remaining() >= cell_count + 4 {
        cursor.take(cell_count)?;
    }

    let material_count = cursor.u32()? as usize;
    if material_count > cursor.remaining() {
        return Err(TerrainError::CorruptInput(format!(
            "declared material count {} exceeds remaining {} bytes",
            material_count,
            cursor.remaining()
        )));
    }
    let mut material_names = Vec::with_capacity(material_count);
    for _ in 0..material_count {
        let len = cursor.u8()? as usize;
        let raw = cursor.take(len)?;
        let name = std::str::from_utf8(raw)
            .map_err(|_| TerrainError::CorruptInput("material name is not ASCII".into()))?;
        material_names.push(name.to_string());
    }

    // Every non-hole index must reference a declared material.
    for index in &material_bytes {
        if *index != HOLE_INDEX && *index as usize >= material_count {
            return Err(TerrainError::CorruptInput(format!(
                "material index {} out of range ({} declared)",
                index, material_count
            )));
        }
    }

    Ok(TerrainFile {
        size,
        height_codes: Grid::from_vec(size, size, codes)
            .map_err(|e| TerrainError::CorruptInput(e.to_string()))?,
        material_index: Grid::from_vec(size, size, material_bytes)
            .map_err(|e| TerrainError::CorruptInput(e.to_string()))?,
        material_names,
    })
}

/// Byte reader that turns truncation into `CorruptInput`.
struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], TerrainError> {
        if self.remaining() < n {
            return Err(TerrainError::CorruptInput(format!(
                "file truncated: needed {} bytes, {} left",
                n,
                self.remaining()
            )));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, TerrainError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, TerrainError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, TerrainError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MaterialDef;

    fn flat_terrain(size: usize) -> (Grid<f32>, MaterialSet) {
        let heights = Grid::filled(size, size, 50.0f32);
        let materials = MaterialSet::new(vec![MaterialDef::new("grass")]);
        (heights, materials)
    }

    #[test]
    fn flat_single_material_file_size() {
        let (heights, materials) = flat_terrain(256);
        let bytes = encode(&heights, &materials, 100.0).unwrap();
        // version + size + heights + material + reserved + count + "grass"
        let expected = 1 + 4 + 256 * 256 * 2 + 256 * 256 + 256 * 256 + 4 + (1 + 5);
        assert_eq!(bytes.len(), expected);
    }

    #[test]
    fn flat_terrain_round_trips_to_midpoint() {
        let (heights, materials) = flat_terrain(256);
        let bytes = encode(&heights, &materials, 100.0).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.size, 256);
        assert_eq!(decoded.material_names, vec!["grass".to_string()]);
        assert!(decoded.material_index.data().iter().all(|i| *i == 0));
        for code in decoded.height_codes.data() {
            let meters = *code as f32 / 65535.0 * 100.0;
            assert!((meters - 50.0).abs() < 0.002);
        }
    }

    #[test]
    fn encode_decode_encode_is_byte_identical() {
        let size = 256;
        let mut heights = Grid::filled(size, size, 0.0f32);
        for y in 0..size {
            for x in 0..size {
                heights.set(x, y, (x + y) as f32 * 0.05);
            }
        }
        let mut road = Grid::filled(size, size, false);
        for x in 0..size {
            road.set(x, size / 2, true);
        }
        let materials = MaterialSet::new(vec![
            MaterialDef::new("grass"),
            MaterialDef::with_layer("road", road),
        ]);

        let first = encode(&heights, &materials, 120.0).unwrap();
        let decoded = decode(&first).unwrap();

        let roundtrip_heights =
            crate::heights_from_codes(&decoded.height_codes, 120.0);
        let roundtrip_materials = MaterialSet::new(vec![
            MaterialDef::new("grass"),
            MaterialDef::with_layer("road", decoded.layer_mask(1)),
        ]);
        let second = encode(&roundtrip_heights, &roundtrip_materials, 120.0).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn reader_accepts_missing_reserved_block() {
        let (heights, materials) = flat_terrain(256);
        let full = encode(&heights, &materials, 100.0).unwrap();
        // Splice the reserved block out of the file.
        let n = 256 * 256;
        let reserved_start = 5 + n * 2 + n;
        let mut short = Vec::with_capacity(full.len() - n);
        short.extend_from_slice(&full[..reserved_start]);
        short.extend_from_slice(&full[reserved_start + n..]);

        let decoded = decode(&short).unwrap();
        assert_eq!(decoded.size, 256);
        assert_eq!(decoded.material_names, vec!["grass".to_string()]);
    }

    #[test]
    fn wrong_version_is_unsupported() {
        let (heights, materials) = flat_terrain(256);
        let mut bytes = encode(&heights, &materials, 100.0).unwrap();
        bytes[0] = 8;
        assert!(matches!(
            decode(&bytes),
            Err(TerrainError::UnsupportedFormat(8))
        ));
    }

    #[test]
    fn bad_size_is_rejected() {
        let mut bytes = vec![TER_VERSION];
        bytes.extend_from_slice(&300u32.to_le_bytes());
        assert!(matches!(decode(&bytes), Err(TerrainError::InvalidSize(300))));
    }

    #[test]
    fn truncated_file_is_corrupt() {
        let (heights, materials) = flat_terrain(256);
        let bytes = encode(&heights, &materials, 100.0).unwrap();
        assert!(matches!(
            decode(&bytes[..bytes.len() / 2]),
            Err(TerrainError::CorruptInput(_))
        ));
    }

    #[test]
    fn oversized_material_count_is_corrupt() {
        let (heights, materials) = flat_terrain(256);
        let mut bytes = encode(&heights, &materials, 100.0).unwrap();
        let count_pos = bytes.len() - 4 - 6;
        bytes[count_pos..count_pos + 4].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(
            decode(&bytes),
            Err(TerrainError::CorruptInput(_))
        ));
    }
}
