//! Junction detection, classification and elevation harmonization.
//!
//! Spline endpoints are clustered within the detection radius; lone
//! endpoints probing another spline's interior become T crossings. OSM
//! junction hints override geometric clusters in their radius. Harmonizing
//! assigns each junction the length-weighted mean of its members' target
//! elevations and tapers nearby cross-sections toward it.

use std::collections::BTreeMap;

use glam::Vec2;
use tracing::{debug, info};

use crate::{
    params::RoadParams, Junction, JunctionId, JunctionKind, RoadNetwork, SplineId,
};

/// Where a junction touches one member spline.
#[derive(Debug, Clone, Copy)]
struct Contact {
    spline: SplineId,
    /// Arc position (meters) of the junction on this spline.
    arc_m: f32,
    /// Unit direction of travel into the junction.
    inbound: Vec2,
}

/// Look up per-material parameters with a shared fallback.
pub struct MaterialParams<'a> {
    by_material: &'a BTreeMap<String, RoadParams>,
    fallback: RoadParams,
}

impl<'a> MaterialParams<'a> {
    pub fn new(by_material: &'a BTreeMap<String, RoadParams>) -> Self {
        Self {
            by_material,
            fallback: RoadParams::default(),
        }
    }

    pub fn get(&self, material: &str) -> &RoadParams {
        self.by_material.get(material).unwrap_or(&self.fallback)
    }
}

/// Detect junctions over the whole network.
///
/// `hints` are pre-tagged intersection locations (pixel space); they take
/// priority over geometric clustering within their detection radius.
pub fn detect_junctions(
    network: &RoadNetwork,
    params: &MaterialParams,
    meters_per_pixel: f32,
    hints: &[Vec2],
) -> Vec<Junction> {
    let mut junctions = Vec::new();
    let mut next_id = 0u32;

    let endpoints = collect_endpoints(network);

    // Greedy single-link clustering of endpoints, deterministic by order.
    let mut assigned = vec![usize::MAX; endpoints.len()];
    let mut clusters: Vec<Vec<usize>> = Vec::new();
    for i in 0..endpoints.len() {
        if assigned[i] != usize::MAX {
            continue;
        }
        let cluster_id = clusters.len();
        let mut members = vec![i];
        assigned[i] = cluster_id;
        let mut cursor = 0;
        while cursor < members.len() {
            let a = members[cursor];
            cursor += 1;
            for b in 0..endpoints.len() {
                if assigned[b] != usize::MAX {
                    continue;
                }
                let radius_px = detection_radius_px(network, params, endpoints[a].0, meters_per_pixel)
                    .max(detection_radius_px(network, params, endpoints[b].0, meters_per_pixel));
                if (endpoints[a].2 - endpoints[b].2).length() <= radius_px {
                    assigned[b] = cluster_id;
                    members.push(b);
                }
            }
        }
        clusters.push(members);
    }

    for members in &clusters {
        let mut contacts: Vec<Contact> = Vec::new();
        let mut location = Vec2::ZERO;
        for &e in members {
            let (spline_id, at_start, pos) = endpoints[e];
            location += pos;
            if let Some(contact) = endpoint_contact(network, spline_id, at_start) {
                contacts.push(contact);
            }
        }
        location /= members.len() as f32;

        if contacts.len() < 2 {
            // A lone endpoint may still cross another spline mid-run.
            match probe_mid_crossing(network, params, &contacts, location, meters_per_pixel) {
                Some(crossing) => contacts.push(crossing),
                None => continue,
            }
        }

        contacts.sort_by_key(|c| c.spline);
        let first = &contacts[0];
        let primary = network
            .spline(first.spline)
            .map(|s| s.material.clone())
            .unwrap_or_default();
        let p = params.get(&primary);

        let mut junction = Junction {
            id: JunctionId(next_id),
            location,
            kind: classify(&contacts, network),
            members: contacts.iter().map(|c| c.spline).collect(),
            detection_radius_m: p.junction_detection_radius_meters,
            blend_distance_m: p.junction_blend_distance_meters,
            harmonized_elevation: None,
            excluded: false,
            exclusion_reason: None,
        };
        apply_quality_checks(&mut junction, network);
        junctions.push(junction);
        next_id += 1;
    }

    apply_hints(network, params, meters_per_pixel, hints, &mut junctions, &mut next_id);

    debug!(count = junctions.len(), "detected junctions");
    junctions
}

fn collect_endpoints(network: &RoadNetwork) -> Vec<(SplineId, bool, Vec2)> {
    let mut endpoints = Vec::new();
    for id in network.spline_ids() {
        let spline = network.spline(id).expect("listed id");
        if spline.is_roundabout {
            continue;
        }
        endpoints.push((id, true, spline.start()));
        endpoints.push((id, false, spline.end()));
    }
    endpoints
}

fn detection_radius_px(
    network: &RoadNetwork,
    params: &MaterialParams,
    spline: SplineId,
    meters_per_pixel: f32,
) -> f32 {
    let material = network
        .spline(spline)
        .map(|s| s.material.as_str())
        .unwrap_or("");
    params.get(material).junction_detection_radius_meters / meters_per_pixel.max(1e-6)
}

fn endpoint_contact(network: &RoadNetwork, id: SplineId, at_start: bool) -> Option<Contact> {
    let spline = network.spline(id)?;
    let total = spline.curve.total_length();
    let (arc_px, sign) = if at_start { (0.0, -1.0) } else { (total, 1.0) };
    let tangent = spline.curve.tangent_at(spline.curve.param_at_arc(arc_px));
    Some(Contact {
        spline: id,
        arc_m: if at_start { 0.0 } else { spline.total_length_m },
        inbound: tangent * sign,
    })
}

/// Check whether a lone endpoint touches another spline's interior; if so,
/// return the crossing contact on that other spline.
fn probe_mid_crossing(
    network: &RoadNetwork,
    params: &MaterialParams,
    contacts: &[Contact],
    location: Vec2,
    meters_per_pixel: f32,
) -> Option<Contact> {
    let own = contacts.first().copied()?;
    let radius_px = detection_radius_px(network, params, own.spline, meters_per_pixel);

    for id in network.spline_ids() {
        if id == own.spline {
            continue;
        }
        let spline = network.spline(id).expect("listed id");
        // Sample the other spline and look for the closest approach.
        let steps = (spline.curve.total_length().ceil() as usize).clamp(2, 4096);
        let mut best: Option<(f32, f32)> = None; // (distance_px, arc_px)
        for k in 0..=steps {
            let arc = spline.curve.total_length() * k as f32 / steps as f32;
            let (pos, _) = spline.curve.sample_at_arc(arc);
            let d = (pos - location).length();
            if best.map(|b| d < b.0).unwrap_or(true) {
                best = Some((d, arc));
            }
        }
        if let Some((d, arc_px)) = best {
            if d <= radius_px {
                // Contacts at the other spline's open ends belong to
                // endpoint clustering, not mid-crossing; closed rings have
                // no such ends.
                if !spline.is_roundabout {
                    let end_gap = radius_px.max(1.0);
                    if arc_px < end_gap || arc_px > spline.curve.total_length() - end_gap {
                        continue;
                    }
                }
                let tangent = spline.curve.tangent_at(spline.curve.param_at_arc(arc_px));
                return Some(Contact {
                    spline: id,
                    arc_m: arc_px * meters_per_pixel,
                    inbound: tangent,
                });
            }
        }
    }
    None
}

/// Classify by incident count and angular distribution.
fn classify(contacts: &[Contact], network: &RoadNetwork) -> JunctionKind {
    if contacts
        .iter()
        .any(|c| network.spline(c.spline).map(|s| s.is_roundabout).unwrap_or(false))
    {
        return JunctionKind::Roundabout;
    }
    match contacts.len() {
        0..=2 => JunctionKind::Y,
        3 => {
            // T when one pair continues straight through (angle near 180).
            for i in 0..contacts.len() {
                for j in (i + 1)..contacts.len() {
                    let alignment = contacts[i].inbound.dot(contacts[j].inbound);
                    if alignment < -0.866 {
                        return JunctionKind::T;
                    }
                }
            }
            JunctionKind::Y
        }
        4 => JunctionKind::X,
        _ => JunctionKind::Complex,
    }
}

/// Automatic exclusions: members with grossly incompatible widths make the
/// harmonized patch unusable, so such junctions are skipped.
fn apply_quality_checks(junction: &mut Junction, network: &RoadNetwork) {
    let mut min_width = f32::INFINITY;
    let mut max_width: f32 = 0.0;
    for member in &junction.members {
        if let Some(section) = network.sections_of(*member).first() {
            min_width = min_width.min(section.road_width_m);
            max_width = max_width.max(section.road_width_m);
        }
    }
    if min_width.is_finite() && max_width > min_width * 2.5 {
        junction.excluded = true;
        junction.exclusion_reason = Some(format!(
            "incompatible widths: {min_width:.1} m vs {max_width:.1} m"
        ));
    }
}

/// Junction hints (tagged intersections) replace geometric junctions within
/// their radius.
fn apply_hints(
    network: &RoadNetwork,
    params: &MaterialParams,
    meters_per_pixel: f32,
    hints: &[Vec2],
    junctions: &mut Vec<Junction>,
    next_id: &mut u32,
) {
    for hint in hints {
        // Members: splines passing within the fallback detection radius.
        let mut contacts = Vec::new();
        for id in network.spline_ids() {
            let spline = network.spline(id).expect("listed id");
            let radius_px = detection_radius_px(network, params, id, meters_per_pixel);
            let steps = (spline.curve.total_length().ceil() as usize).clamp(2, 4096);
            let mut best: Option<(f32, f32)> = None;
            for k in 0..=steps {
                let arc = spline.curve.total_length() * k as f32 / steps as f32;
                let (pos, _) = spline.curve.sample_at_arc(arc);
                let d = (pos - *hint).length();
                if best.map(|b| d < b.0).unwrap_or(true) {
                    best = Some((d, arc));
                }
            }
            if let Some((d, arc_px)) = best {
                if d <= radius_px {
                    let tangent = spline.curve.tangent_at(spline.curve.param_at_arc(arc_px));
                    contacts.push(Contact {
                        spline: id,
                        arc_m: arc_px * meters_per_pixel,
                        inbound: tangent,
                    });
                }
            }
        }
        if contacts.len() < 2 {
            continue;
        }
        contacts.sort_by_key(|c| c.spline);

        let primary = network
            .spline(contacts[0].spline)
            .map(|s| s.material.clone())
            .unwrap_or_default();
        let p = params.get(&primary);
        let radius_px = p.junction_detection_radius_meters / meters_per_pixel.max(1e-6);

        // Hinted junctions win over geometric ones nearby.
        junctions.retain(|j| (j.location - *hint).length() > radius_px);

        let mut junction = Junction {
            id: JunctionId(*next_id),
            location: *hint,
            kind: classify(&contacts, network),
            members: contacts.iter().map(|c| c.spline).collect(),
            detection_radius_m: p.junction_detection_radius_meters,
            blend_distance_m: p.junction_blend_distance_meters,
            harmonized_elevation: None,
            excluded: false,
            exclusion_reason: None,
        };
        apply_quality_checks(&mut junction, network);
        junctions.push(junction);
        *next_id += 1;
    }
}

/// Harmonize all non-excluded junctions: compute the shared elevation and
/// taper member sections toward it over the blend distance.
pub fn harmonize_junctions(network: &mut RoadNetwork, params: &MaterialParams) {
    let junction_count = network.junctions.len();
    for j in 0..junction_count {
        let junction = network.junctions[j].clone();
        if junction.excluded {
            continue;
        }

        // Length-weighted mean of member targets at the junction.
        let mut weighted = 0.0f64;
        let mut weight_sum = 0.0f64;
        let mut member_arcs = Vec::with_capacity(junction.members.len());
        for member in &junction.members {
            let Some((arc_m, target)) = nearest_section(network, *member, junction.location) else {
                continue;
            };
            let weight = network
                .spline(*member)
                .map(|s| s.total_length_m as f64)
                .unwrap_or(1.0);
            weighted += target as f64 * weight;
            weight_sum += weight;
            member_arcs.push((*member, arc_m));
        }
        if weight_sum <= 0.0 {
            continue;
        }
        let harmonized = (weighted / weight_sum) as f32;
        network.junctions[j].harmonized_elevation = Some(harmonized);

        for (member, arc_m) in member_arcs {
            let material = network
                .spline(member)
                .map(|s| s.material.clone())
                .unwrap_or_default();
            let p = params.get(&material);
            let blend_fn = p.junction_blend_function;
            let blend_dist = junction.blend_distance_m.max(1e-3);
            for section in network.sections_of_mut(member) {
                if section.excluded {
                    continue;
                }
                let d = (section.distance_m - arc_m).abs();
                if d >= blend_dist {
                    continue;
                }
                let factor = blend_fn.apply(1.0 - d / blend_dist);
                section.target_elevation =
                    section.target_elevation * (1.0 - factor) + harmonized * factor;
            }
        }
    }
    info!(junctions = junction_count, "harmonized junctions");
}

/// Arc position and target elevation of the section nearest to a location.
fn nearest_section(network: &RoadNetwork, id: SplineId, location: Vec2) -> Option<(f32, f32)> {
    network
        .sections_of(id)
        .iter()
        .map(|s| ((s.center - location).length(), s.distance_m, s.target_elevation))
        .min_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(_, arc, target)| (arc, target))
}

/// Blend free spline ends (ends that meet no junction) back toward the raw
/// terrain so roads do not end on a visible shelf.
pub fn taper_free_endpoints(network: &mut RoadNetwork, params: &MaterialParams) {
    let ids = network.spline_ids();
    for id in ids {
        let (material, total, start_pos, end_pos, is_roundabout) = {
            let spline = network.spline(id).expect("listed id");
            (
                spline.material.clone(),
                spline.total_length_m,
                spline.start(),
                spline.end(),
                spline.is_roundabout,
            )
        };
        if is_roundabout {
            continue;
        }
        let p = params.get(&material);
        if !p.enable_endpoint_taper {
            continue;
        }
        let taper = p.endpoint_taper_distance_meters.max(1e-3);
        let strength = p.endpoint_terrain_blend_strength.clamp(0.0, 1.0);
        let blend_fn = p.junction_blend_function;

        let near_junction = |pos: Vec2, radius_m: f32| {
            network.junctions.iter().any(|j| {
                // Junction locations are in pixels; endpoint radius too.
                (j.location - pos).length() <= radius_m
            })
        };
        // Radii compare in pixel space: detection radius over a nominal
        // meters-per-pixel of 1 was already applied at detection; reuse the
        // configured radius directly.
        let taper_start = !near_junction(start_pos, p.junction_detection_radius_meters);
        let taper_end = !near_junction(end_pos, p.junction_detection_radius_meters);

        for section in network.sections_of_mut(id) {
            if section.excluded {
                continue;
            }
            let mut factor = 0.0f32;
            if taper_start && section.distance_m < taper {
                factor = factor.max(blend_fn.apply(1.0 - section.distance_m / taper));
            }
            let from_end = total - section.distance_m;
            if taper_end && from_end < taper {
                factor = factor.max(blend_fn.apply(1.0 - from_end / taper));
            }
            if factor > 0.0 {
                let f = factor * strength;
                section.target_elevation =
                    section.target_elevation * (1.0 - f) + section.terrain_elevation * f;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::section::sections_for_polyline;
    use crate::{RoadParams, Spline, SplineState, TcbSpline};
    use approx::assert_relative_eq;
    use terraforge_raster::Grid;

    fn net_with_lines(lines: &[Vec<Vec2>]) -> RoadNetwork {
        let heights = Grid::filled(256, 256, 0.0f32);
        let params = RoadParams::default();
        let mut network = RoadNetwork::new();
        for (i, line) in lines.iter().enumerate() {
            let (spline, sections) =
                sections_for_polyline(crate::SplineId(i as u32), line, &params, &heights, 1.0)
                    .unwrap();
            network.add_spline(spline, sections).unwrap();
        }
        network
    }

    fn default_params_map() -> BTreeMap<String, RoadParams> {
        let mut map = BTreeMap::new();
        map.insert("road".to_string(), RoadParams::default());
        map
    }

    #[test]
    fn endpoint_cluster_forms_junction() {
        // Three splines radiating from (100, 100).
        let network = net_with_lines(&[
            vec![Vec2::new(100.0, 100.0), Vec2::new(150.0, 100.0), Vec2::new(200.0, 100.0)],
            vec![Vec2::new(100.0, 100.0), Vec2::new(50.0, 100.0), Vec2::new(0.0, 100.0)],
            vec![Vec2::new(100.0, 100.0), Vec2::new(100.0, 150.0), Vec2::new(100.0, 200.0)],
        ]);
        let map = default_params_map();
        let params = MaterialParams::new(&map);
        let junctions = detect_junctions(&network, &params, 1.0, &[]);
        assert_eq!(junctions.len(), 1);
        assert_eq!(junctions[0].members.len(), 3);
        assert_eq!(junctions[0].kind, JunctionKind::T);
    }

    #[test]
    fn four_way_is_x() {
        let network = net_with_lines(&[
            vec![Vec2::new(100.0, 100.0), Vec2::new(150.0, 100.0), Vec2::new(200.0, 100.0)],
            vec![Vec2::new(100.0, 100.0), Vec2::new(50.0, 100.0), Vec2::new(0.0, 100.0)],
            vec![Vec2::new(100.0, 100.0), Vec2::new(100.0, 150.0), Vec2::new(100.0, 200.0)],
            vec![Vec2::new(100.0, 100.0), Vec2::new(100.0, 50.0), Vec2::new(100.0, 0.0)],
        ]);
        let map = default_params_map();
        let params = MaterialParams::new(&map);
        let junctions = detect_junctions(&network, &params, 1.0, &[]);
        assert_eq!(junctions.len(), 1);
        assert_eq!(junctions[0].kind, JunctionKind::X);
    }

    #[test]
    fn far_apart_endpoints_do_not_cluster() {
        let network = net_with_lines(&[
            vec![Vec2::new(0.0, 0.0), Vec2::new(30.0, 0.0), Vec2::new(60.0, 0.0)],
            vec![Vec2::new(0.0, 200.0), Vec2::new(30.0, 200.0), Vec2::new(60.0, 200.0)],
        ]);
        let map = default_params_map();
        let params = MaterialParams::new(&map);
        let junctions = detect_junctions(&network, &params, 1.0, &[]);
        assert!(junctions.is_empty());
    }

    #[test]
    fn harmonization_meets_in_the_middle() {
        // Two equal-length splines meeting at a right angle with targets
        // differing by 10 m.
        let mut network = net_with_lines(&[
            vec![Vec2::new(100.0, 100.0), Vec2::new(160.0, 100.0), Vec2::new(220.0, 100.0)],
            vec![Vec2::new(100.0, 100.0), Vec2::new(100.0, 160.0), Vec2::new(100.0, 220.0)],
        ]);
        for id in [crate::SplineId(0), crate::SplineId(1)] {
            let value = if id.0 == 0 { 0.0 } else { 10.0 };
            for s in network.sections_of_mut(id) {
                s.target_elevation = value;
            }
        }
        let map = default_params_map();
        let params = MaterialParams::new(&map);
        network.junctions = detect_junctions(&network, &params, 1.0, &[]);
        assert_eq!(network.junctions.len(), 1);

        harmonize_junctions(&mut network, &params);
        let harmonized = network.junctions[0].harmonized_elevation.unwrap();
        assert_relative_eq!(harmonized, 5.0, epsilon = 1e-3);

        // At the junction both splines sit at the harmonized height.
        let s0 = network.sections_of(crate::SplineId(0))[0];
        let s1 = network.sections_of(crate::SplineId(1))[0];
        assert_relative_eq!(s0.target_elevation, 5.0, epsilon = 1e-3);
        assert_relative_eq!(s1.target_elevation, 5.0, epsilon = 1e-3);

        // Beyond the blend distance each spline keeps its own target.
        let far0 = network
            .sections_of(crate::SplineId(0))
            .iter()
            .find(|s| s.distance_m > 20.0 + 1e-3)
            .copied()
            .unwrap();
        assert_relative_eq!(far0.target_elevation, 0.0, epsilon = 1e-3);
    }

    #[test]
    fn excluded_junction_is_skipped() {
        let mut network = net_with_lines(&[
            vec![Vec2::new(100.0, 100.0), Vec2::new(160.0, 100.0), Vec2::new(220.0, 100.0)],
            vec![Vec2::new(100.0, 100.0), Vec2::new(100.0, 160.0), Vec2::new(100.0, 220.0)],
        ]);
        for s in network.sections_of_mut(crate::SplineId(1)) {
            s.target_elevation = 10.0;
        }
        let map = default_params_map();
        let params = MaterialParams::new(&map);
        network.junctions = detect_junctions(&network, &params, 1.0, &[]);
        network.junctions[0].excluded = true;
        network.junctions[0].exclusion_reason = Some("user exclusion".into());

        harmonize_junctions(&mut network, &params);
        assert!(network.junctions[0].harmonized_elevation.is_none());
        let s0 = network.sections_of(crate::SplineId(0))[0];
        assert_relative_eq!(s0.target_elevation, 0.0);
    }

    #[test]
    fn hint_overrides_geometric_junction() {
        let network = net_with_lines(&[
            vec![Vec2::new(100.0, 100.0), Vec2::new(160.0, 100.0), Vec2::new(220.0, 100.0)],
            vec![Vec2::new(100.0, 100.0), Vec2::new(100.0, 160.0), Vec2::new(100.0, 220.0)],
        ]);
        let map = default_params_map();
        let params = MaterialParams::new(&map);
        let hint = Vec2::new(102.0, 101.0);
        let junctions = detect_junctions(&network, &params, 1.0, &[hint]);
        assert_eq!(junctions.len(), 1);
        assert_eq!(junctions[0].location, hint);
    }

    #[test]
    fn endpoint_taper_returns_to_terrain() {
        let heights = Grid::filled(256, 256, 7.0f32);
        let params_one = RoadParams::default();
        let mut network = RoadNetwork::new();
        let (spline, sections) = sections_for_polyline(
            crate::SplineId(0),
            &[Vec2::new(20.0, 128.0), Vec2::new(120.0, 128.0), Vec2::new(220.0, 128.0)],
            &params_one,
            &heights,
            1.0,
        )
        .unwrap();
        network.add_spline(spline, sections).unwrap();
        for s in network.sections_of_mut(crate::SplineId(0)) {
            s.target_elevation = 20.0;
        }
        let map = default_params_map();
        let params = MaterialParams::new(&map);
        taper_free_endpoints(&mut network, &params);

        let sections = network.sections_of(crate::SplineId(0));
        // Ends meet the terrain, middle keeps the smoothed target.
        assert_relative_eq!(sections[0].target_elevation, 7.0, epsilon = 1e-3);
        assert_relative_eq!(
            sections.last().unwrap().target_elevation,
            7.0,
            epsilon = 1e-3
        );
        let mid = &sections[sections.len() / 2];
        assert_relative_eq!(mid.target_elevation, 20.0, epsilon = 1e-3);
    }

    #[test]
    fn roundabout_member_classifies_junction() {
        let heights = Grid::filled(256, 256, 0.0f32);
        let params_one = RoadParams::default();
        let mut network = RoadNetwork::new();

        // A closed ring spline.
        let ring: Vec<Vec2> = (0..16)
            .map(|i| {
                let a = i as f32 / 16.0 * std::f32::consts::TAU;
                Vec2::new(100.0 + a.cos() * 15.0, 100.0 + a.sin() * 15.0)
            })
            .collect();
        let curve = TcbSpline::fit(&ring, 0.0, 0.0, 0.0, true).unwrap();
        let mut sections = Vec::new();
        let spline = Spline {
            id: crate::SplineId(0),
            total_length_m: curve.total_length(),
            curve,
            material: "road".into(),
            is_roundabout: true,
            state: SplineState::Ordered,
        };
        let sampled = crate::section::sample_sections(&spline, &params_one, &heights, 1.0);
        sections.extend(sampled);
        network.add_spline(spline, sections).unwrap();

        // An approach road ending on the ring.
        let (approach, approach_sections) = sections_for_polyline(
            crate::SplineId(1),
            &[Vec2::new(180.0, 100.0), Vec2::new(145.0, 100.0), Vec2::new(116.0, 100.0)],
            &params_one,
            &heights,
            1.0,
        )
        .unwrap();
        network.add_spline(approach, approach_sections).unwrap();

        let map = default_params_map();
        let params = MaterialParams::new(&map);
        let junctions = detect_junctions(&network, &params, 1.0, &[]);
        assert_eq!(junctions.len(), 1);
        assert_eq!(junctions[0].kind, JunctionKind::Roundabout);
    }
}
