//! Road network construction: centerline extraction, spline fitting,
//! cross-section sampling, elevation smoothing, junction harmonization,
//! terrain embedding and the road ribbon mesh.
//!
//! The stages communicate through flat arenas ([`network::RoadNetwork`])
//! keyed by stable integer ids, so per-spline work parallelizes without
//! back-pointers and output order stays deterministic.

pub mod embed;
pub mod extract;
pub mod junction;
pub mod network;
pub mod params;
pub mod road_mesh;
pub mod section;
pub mod smooth;
pub mod spline;

pub use network::{CrossSection, Junction, JunctionId, JunctionKind, RoadNetwork, Spline, SplineId, SplineState};
pub use params::{BlendKind, FilterKind, RoadParams};
pub use spline::TcbSpline;

/// Errors raised by the road pipeline stages.
///
/// Slope-clamp exhaustion is deliberately not an error: the smoother keeps
/// its best effort and logs a warning instead.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RoadError {
    #[error("spline {0:?} is degenerate: {1}")]
    DegenerateSpline(SplineId, String),
    #[error("cross sections out of order for spline {0:?} at local index {1}")]
    SectionOrder(SplineId, u32),
    #[error("invalid road parameters: {0}")]
    InvalidParams(String),
}
