//! Flat-arena road network model.
//!
//! Splines, cross-sections and junctions live in three arenas addressed by
//! stable integer ids; relations are lookups, never back-pointers. The
//! cross-section list is kept sorted by `(spline, local_index)` so slicing
//! per spline is cheap and iteration order is deterministic.

use std::collections::BTreeMap;
use std::ops::Range;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::RoadError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SplineId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct JunctionId(pub u32);

/// Pipeline progress of one spline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SplineState {
    #[default]
    Raw,
    Ordered,
    Smoothed,
    Harmonized,
    Embedded,
    Meshed,
}

/// A fitted road centerline in pixel space.
#[derive(Debug, Clone)]
pub struct Spline {
    pub id: SplineId,
    pub curve: crate::TcbSpline,
    pub total_length_m: f32,
    pub material: String,
    pub is_roundabout: bool,
    pub state: SplineState,
}

impl Spline {
    pub fn start(&self) -> Vec2 {
        self.curve.start()
    }

    pub fn end(&self) -> Vec2 {
        self.curve.end()
    }
}

/// One sample along a spline. Geometry is in pixel coordinates, distances
/// and elevations in meters; `normal` points to the right of travel.
#[derive(Debug, Clone, Copy)]
pub struct CrossSection {
    pub spline: SplineId,
    pub local_index: u32,
    pub center: Vec2,
    pub tangent: Vec2,
    pub normal: Vec2,
    pub distance_m: f32,
    pub road_width_m: f32,
    pub bank_angle_rad: f32,
    pub terrain_elevation: f32,
    pub target_elevation: f32,
    pub left_edge_elevation: Option<f32>,
    pub right_edge_elevation: Option<f32>,
    pub excluded: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JunctionKind {
    T,
    Y,
    X,
    Complex,
    Roundabout,
}

/// A meeting point of two or more splines.
#[derive(Debug, Clone)]
pub struct Junction {
    pub id: JunctionId,
    pub location: Vec2,
    pub kind: JunctionKind,
    pub members: Vec<SplineId>,
    pub detection_radius_m: f32,
    pub blend_distance_m: f32,
    pub harmonized_elevation: Option<f32>,
    pub excluded: bool,
    pub exclusion_reason: Option<String>,
}

/// The unified network: spline arena, flat cross-section arena and junction
/// arena, plus the spline -> material map.
#[derive(Debug, Clone, Default)]
pub struct RoadNetwork {
    splines: Vec<Spline>,
    sections: Vec<CrossSection>,
    ranges: BTreeMap<SplineId, Range<usize>>,
    pub junctions: Vec<Junction>,
}

impl RoadNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn splines(&self) -> &[Spline] {
        &self.splines
    }

    pub fn splines_mut(&mut self) -> &mut [Spline] {
        &mut self.splines
    }

    pub fn spline(&self, id: SplineId) -> Option<&Spline> {
        self.splines.iter().find(|s| s.id == id)
    }

    pub fn sections(&self) -> &[CrossSection] {
        &self.sections
    }

    pub fn spline_ids(&self) -> Vec<SplineId> {
        let mut ids: Vec<SplineId> = self.splines.iter().map(|s| s.id).collect();
        ids.sort();
        ids
    }

    /// Add a spline together with its ordered cross-sections.
    ///
    /// Construction-time invariants: strictly increasing `local_index`,
    /// non-decreasing `distance_m`, positive width. Violations reject the
    /// whole spline.
    pub fn add_spline(
        &mut self,
        spline: Spline,
        sections: Vec<CrossSection>,
    ) -> Result<SplineId, RoadError> {
        let id = spline.id;
        if sections.len() < 2 {
            return Err(RoadError::DegenerateSpline(
                id,
                format!("needs at least 2 cross sections, got {}", sections.len()),
            ));
        }
        for pair in sections.windows(2) {
            if pair[1].local_index <= pair[0].local_index {
                return Err(RoadError::SectionOrder(id, pair[1].local_index));
            }
            if pair[1].distance_m < pair[0].distance_m {
                return Err(RoadError::SectionOrder(id, pair[1].local_index));
            }
        }
        for s in &sections {
            if s.road_width_m <= 0.0 {
                return Err(RoadError::DegenerateSpline(
                    id,
                    format!("non-positive road width at section {}", s.local_index),
                ));
            }
            if s.spline != id {
                return Err(RoadError::DegenerateSpline(
                    id,
                    "section owned by a different spline".into(),
                ));
            }
        }

        let start = self.sections.len();
        self.sections.extend(sections);
        self.ranges.insert(id, start..self.sections.len());
        self.splines.push(spline);
        Ok(id)
    }

    /// Cross-sections of one spline, in order.
    pub fn sections_of(&self, id: SplineId) -> &[CrossSection] {
        match self.ranges.get(&id) {
            Some(range) => &self.sections[range.clone()],
            None => &[],
        }
    }

    pub fn sections_of_mut(&mut self, id: SplineId) -> &mut [CrossSection] {
        match self.ranges.get(&id) {
            Some(range) => &mut self.sections[range.clone()],
            None => &mut [],
        }
    }

    /// Replace the target elevations of one spline's sections.
    pub fn set_targets(&mut self, id: SplineId, targets: &[f32]) {
        let sections = self.sections_of_mut(id);
        debug_assert_eq!(sections.len(), targets.len());
        for (section, target) in sections.iter_mut().zip(targets) {
            section.target_elevation = *target;
        }
    }

    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    pub fn junction_count(&self) -> usize {
        self.junctions.len()
    }

    /// Next free spline id.
    pub fn next_spline_id(&self) -> SplineId {
        SplineId(self.splines.iter().map(|s| s.id.0 + 1).max().unwrap_or(0))
    }
}
