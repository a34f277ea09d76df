//! BeamNG terrain data handling.
//!
//! This crate owns everything that touches the `.ter` v9 container: the
//! binary codec, the ordered material list with its layer masks, dominant
//! color/roughness extraction for material previews, and the meters ↔ u16
//! height conversions shared with the PNG heightmap I/O.

pub mod codec;
pub mod heightfield;
pub mod material;
pub mod png;
pub mod source;

pub use codec::{decode, encode, TerrainFile, TER_VERSION};
pub use heightfield::{heights_from_codes, heights_to_codes};
pub use material::{
    extract_dominant_color, extract_dominant_roughness, MaterialDef, MaterialSet,
};
pub use source::{ElevationSource, PngHeightmap};

/// Edge lengths a terrain raster is allowed to have.
pub const ALLOWED_SIZES: [usize; 7] = [256, 512, 1024, 2048, 4096, 8192, 16384];

/// Material index value that marks a terrain hole.
pub const HOLE_INDEX: u8 = 0xFF;

/// Errors for terrain parsing, encoding and material resolution.
#[derive(Debug, thiserror::Error)]
pub enum TerrainError {
    #[error("unsupported terrain format version {0} (expected {TER_VERSION})")]
    UnsupportedFormat(u8),
    #[error("corrupt terrain data: {0}")]
    CorruptInput(String),
    #[error("terrain size {0} is not an allowed power of two")]
    InvalidSize(usize),
    #[error("layer mask for material '{name}' is {got}x{got}, terrain is {want}x{want}")]
    LayerSizeMismatch {
        name: String,
        got: usize,
        want: usize,
    },
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

/// True when `n` is one of the supported power-of-two edge lengths.
pub fn is_allowed_size(n: usize) -> bool {
    ALLOWED_SIZES.contains(&n)
}
