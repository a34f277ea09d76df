//! Meters ↔ u16 height code conversion.
//!
//! The `.ter` container and the 16-bit heightmap PNGs both store elevation
//! as u16 codes where 0 maps to 0 m and 65535 maps to `max_height` meters.
//! The pipeline works in meters throughout and converts at the boundaries.

use terraforge_raster::Grid;

/// Convert u16 height codes to elevations in meters.
pub fn heights_from_codes(codes: &Grid<u16>, max_height: f32) -> Grid<f32> {
    let data = codes
        .data()
        .iter()
        .map(|c| *c as f32 / 65535.0 * max_height)
        .collect();
    Grid::from_vec(codes.width(), codes.height(), data).expect("same dimensions")
}

/// Convert elevations in meters to u16 height codes.
///
/// Values are clamped into the representable range, so elevations above
/// `max_height` saturate rather than wrap.
pub fn heights_to_codes(heights: &Grid<f32>, max_height: f32) -> Grid<u16> {
    let data = heights
        .data()
        .iter()
        .map(|h| {
            let code = (h / max_height * 65535.0).round();
            code.clamp(0.0, 65535.0) as u16
        })
        .collect();
    Grid::from_vec(heights.width(), heights.height(), data).expect("same dimensions")
}
