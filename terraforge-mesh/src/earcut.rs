//! Ear-clipping polygon triangulation.
//!
//! Iterative earcut over a doubly linked vertex ring with Z-order curve
//! hashing for large inputs. The outer ring must be counter-clockwise and
//! hole rings clockwise (use [`signed_area`] / [`ensure_winding`] to fix up
//! input); rings are open (no duplicated last vertex).
//!
//! Degenerate input never panics: fewer than three vertices yields an empty
//! triangle list, and self-intersections are repaired by a local cure pass
//! followed by a polygon split pass.

use glam::DVec2;

const NIL: usize = usize::MAX;

/// Threshold (in scalar coordinates, two per vertex) above which the
/// Z-order hash acceleration kicks in.
const HASH_THRESHOLD: usize = 80;

/// Signed area of a ring; positive means counter-clockwise in the pipeline's
/// bottom-left coordinate system.
pub fn signed_area(ring: &[DVec2]) -> f64 {
    let mut sum = 0.0;
    let n = ring.len();
    for i in 0..n {
        let j = (i + 1) % n;
        sum += (ring[j].x - ring[i].x) * (ring[j].y + ring[i].y);
    }
    -sum * 0.5
}

/// Reverse `ring` in place if its winding does not match `ccw`.
pub fn ensure_winding(ring: &mut [DVec2], ccw: bool) {
    let area = signed_area(ring);
    if (area > 0.0) != ccw && area != 0.0 {
        ring.reverse();
    }
}

/// Triangulate a polygon given as a flat vertex list plus hole start
/// offsets. Returns triangle vertex indices, counter-clockwise.
///
/// `vertices` holds the outer ring followed by each hole ring in order;
/// `hole_indices[i]` is the offset where hole `i` starts.
pub fn earcut(vertices: &[DVec2], hole_indices: &[usize]) -> Vec<u32> {
    let mut triangles = Vec::new();
    if vertices.len() < 3 {
        return triangles;
    }

    let has_holes = !hole_indices.is_empty();
    let outer_len = if has_holes {
        hole_indices[0]
    } else {
        vertices.len()
    };

    let mut arena = Arena::new(vertices.len());
    let mut outer = arena.linked_list(vertices, 0, outer_len, true);
    if outer == NIL || arena.nodes[outer].next == arena.nodes[outer].prev {
        return triangles;
    }

    if has_holes {
        outer = eliminate_holes(&mut arena, vertices, hole_indices, outer);
    }

    // Z-order hashing only pays off past a size threshold.
    let mut min = DVec2::ZERO;
    let mut inv_size = 0.0;
    if vertices.len() * 2 > HASH_THRESHOLD {
        let mut max = vertices[0];
        min = vertices[0];
        for v in vertices {
            min = min.min(*v);
            max = max.max(*v);
        }
        let span = (max.x - min.x).max(max.y - min.y);
        inv_size = if span != 0.0 { 32767.0 / span } else { 0.0 };
    }

    earcut_linked(&mut arena, outer, &mut triangles, min, inv_size, Pass::Normal);
    triangles
}

#[derive(Clone, Copy, PartialEq)]
enum Pass {
    Normal,
    Filtered,
    Cured,
}

struct Node {
    /// Original vertex index.
    i: u32,
    p: DVec2,
    prev: usize,
    next: usize,
    /// Z-order curve value.
    z: i32,
    prev_z: usize,
    next_z: usize,
    steiner: bool,
}

struct Arena {
    nodes: Vec<Node>,
}

impl Arena {
    fn new(capacity: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(capacity),
        }
    }

    fn insert_node(&mut self, i: u32, p: DVec2, last: usize) -> usize {
        let idx = self.nodes.len();
        let node = Node {
            i,
            p,
            prev: NIL,
            next: NIL,
            z: 0,
            prev_z: NIL,
            next_z: NIL,
            steiner: false,
        };
        self.nodes.push(node);
        if last == NIL {
            self.nodes[idx].prev = idx;
            self.nodes[idx].next = idx;
        } else {
            let next = self.nodes[last].next;
            self.nodes[idx].next = next;
            self.nodes[idx].prev = last;
            self.nodes[next].prev = idx;
            self.nodes[last].next = idx;
        }
        idx
    }

    fn remove_node(&mut self, idx: usize) {
        let (prev, next) = (self.nodes[idx].prev, self.nodes[idx].next);
        self.nodes[next].prev = prev;
        self.nodes[prev].next = next;

        let (prev_z, next_z) = (self.nodes[idx].prev_z, self.nodes[idx].next_z);
        if prev_z != NIL {
            self.nodes[prev_z].next_z = next_z;
        }
        if next_z != NIL {
            self.nodes[next_z].prev_z = prev_z;
        }
    }

    /// Build a circular doubly linked list from a ring slice.
    fn linked_list(&mut self, vertices: &[DVec2], start: usize, end: usize, clockwise: bool) -> usize {
        let mut last = NIL;
        let ring = &vertices[start..end];
        if ring.len() < 2 {
            return NIL;
        }
        // `clockwise == true` requests CCW traversal here (outer ring).
        if clockwise == (signed_area(ring) > 0.0) {
            for (k, v) in ring.iter().enumerate() {
                last = self.insert_node((start + k) as u32, *v, last);
            }
        } else {
            for (k, v) in ring.iter().enumerate().rev() {
                last = self.insert_node((start + k) as u32, *v, last);
            }
        }
        // Collapse a duplicated endpoint.
        if last != NIL {
            let next = self.nodes[last].next;
            if equals(self.nodes[last].p, self.nodes[next].p) {
                self.remove_node(last);
                last = next;
            }
        }
        last
    }

    /// Drop collinear and duplicate points around `start`.
    fn filter_points(&mut self, start: usize, mut end: usize) -> usize {
        if start == NIL {
            return start;
        }
        if end == NIL {
            end = start;
        }
        let mut p = start;
        loop {
            let mut again = false;
            let (prev, next) = (self.nodes[p].prev, self.nodes[p].next);
            if !self.nodes[p].steiner
                && (equals(self.nodes[p].p, self.nodes[next].p)
                    || area(self.nodes[prev].p, self.nodes[p].p, self.nodes[next].p) == 0.0)
            {
                self.remove_node(p);
                p = prev;
                end = prev;
                if p == self.nodes[p].next {
                    break;
                }
                again = true;
            }
            if !again {
                p = self.nodes[p].next;
                if p == end {
                    break;
                }
            }
        }
        end
    }
}

fn earcut_linked(
    arena: &mut Arena,
    ear_start: usize,
    triangles: &mut Vec<u32>,
    min: DVec2,
    inv_size: f64,
    pass: Pass,
) {
    let mut ear = ear_start;
    if ear == NIL {
        return;
    }

    if pass == Pass::Normal && inv_size != 0.0 {
        index_curve(arena, ear, min, inv_size);
    }

    let mut stop = ear;
    while arena.nodes[ear].prev != arena.nodes[ear].next {
        let prev = arena.nodes[ear].prev;
        let next = arena.nodes[ear].next;

        let found = if inv_size != 0.0 {
            is_ear_hashed(arena, ear, min, inv_size)
        } else {
            is_ear(arena, ear)
        };
        if found {
            triangles.push(arena.nodes[prev].i);
            triangles.push(arena.nodes[ear].i);
            triangles.push(arena.nodes[next].i);

            arena.remove_node(ear);
            // Skip the next vertex; it produces thin back-to-back ears.
            ear = arena.nodes[next].next;
            stop = ear;
            continue;
        }

        ear = next;
        if ear == stop {
            match pass {
                // Filter collinear points and retry.
                Pass::Normal => {
                    let filtered = arena.filter_points(ear, NIL);
                    earcut_linked(arena, filtered, triangles, min, inv_size, Pass::Filtered);
                }
                // Cure local self-intersections, then retry.
                Pass::Filtered => {
                    let cured = cure_local_intersections(arena, ear, triangles);
                    earcut_linked(arena, cured, triangles, min, inv_size, Pass::Cured);
                }
                // Last resort: split the remaining polygon in two.
                Pass::Cured => {
                    split_earcut(arena, ear, triangles, min, inv_size);
                }
            }
            return;
        }
    }
}

fn is_ear(arena: &Arena, ear: usize) -> bool {
    let a = &arena.nodes[arena.nodes[ear].prev];
    let b = &arena.nodes[ear];
    let c = &arena.nodes[arena.nodes[ear].next];

    if area(a.p, b.p, c.p) >= 0.0 {
        return false; // reflex
    }

    let mut p = arena.nodes[arena.nodes[ear].next].next;
    while p != arena.nodes[ear].prev {
        let node = &arena.nodes[p];
        if point_in_triangle(a.p, b.p, c.p, node.p)
            && area(arena.nodes[node.prev].p, node.p, arena.nodes[node.next].p) >= 0.0
        {
            return false;
        }
        p = arena.nodes[p].next;
    }
    true
}

fn is_ear_hashed(arena: &Arena, ear: usize, min: DVec2, inv_size: f64) -> bool {
    let a = arena.nodes[arena.nodes[ear].prev].p;
    let b = arena.nodes[ear].p;
    let c = arena.nodes[arena.nodes[ear].next].p;

    if area(a, b, c) >= 0.0 {
        return false;
    }

    // Bounding box of the candidate ear.
    let lo = a.min(b.min(c));
    let hi = a.max(b.max(c));

    let min_z = z_order(lo, min, inv_size);
    let max_z = z_order(hi, min, inv_size);

    let mut p = arena.nodes[ear].prev_z;
    let mut n = arena.nodes[ear].next_z;

    // Walk outward from the ear in both z-directions.
    while p != NIL && arena.nodes[p].z >= min_z && n != NIL && arena.nodes[n].z <= max_z {
        for candidate in [p, n] {
            let node = &arena.nodes[candidate];
            if candidate != arena.nodes[ear].prev
                && candidate != arena.nodes[ear].next
                && point_in_triangle(a, b, c, node.p)
                && area(arena.nodes[node.prev].p, node.p, arena.nodes[node.next].p) >= 0.0
            {
                return false;
            }
        }
        p = arena.nodes[p].prev_z;
        n = arena.nodes[n].next_z;
    }

    while p != NIL && arena.nodes[p].z >= min_z {
        let node = &arena.nodes[p];
        if p != arena.nodes[ear].prev
            && p != arena.nodes[ear].next
            && point_in_triangle(a, b, c, node.p)
            && area(arena.nodes[node.prev].p, node.p, arena.nodes[node.next].p) >= 0.0
        {
            return false;
        }
        p = arena.nodes[p].prev_z;
    }

    while n != NIL && arena.nodes[n].z <= max_z {
        let node = &arena.nodes[n];
        if n != arena.nodes[ear].prev
            && n != arena.nodes[ear].next
            && point_in_triangle(a, b, c, node.p)
            && area(arena.nodes[node.prev].p, node.p, arena.nodes[node.next].p) >= 0.0
        {
            return false;
        }
        n = arena.nodes[n].next_z;
    }

    true
}

/// Repair small local self-intersections by clipping the offending vertex.
fn cure_local_intersections(arena: &mut Arena, start: usize, triangles: &mut Vec<u32>) -> usize {
    let mut p = start;
    let mut start = start;
    loop {
        let a = arena.nodes[p].prev;
        let b = arena.nodes[arena.nodes[p].next].next;

        if !equals(arena.nodes[a].p, arena.nodes[b].p)
            && intersects(
                arena.nodes[a].p,
                arena.nodes[p].p,
                arena.nodes[arena.nodes[p].next].p,
                arena.nodes[b].p,
            )
            && locally_inside(arena, a, b)
            && locally_inside(arena, b, a)
        {
            triangles.push(arena.nodes[a].i);
            triangles.push(arena.nodes[p].i);
            triangles.push(arena.nodes[b].i);

            arena.remove_node(p);
            let p_next = arena.nodes[p].next;
            arena.remove_node(p_next);
            p = b;
            start = b;
        }
        p = arena.nodes[p].next;
        if p == start {
            break;
        }
    }
    arena.filter_points(p, NIL)
}

/// Split the remaining polygon along a valid diagonal and earcut both halves.
fn split_earcut(
    arena: &mut Arena,
    start: usize,
    triangles: &mut Vec<u32>,
    min: DVec2,
    inv_size: f64,
) {
    let mut a = start;
    loop {
        let mut b = arena.nodes[arena.nodes[a].next].next;
        while b != arena.nodes[a].prev {
            if arena.nodes[a].i != arena.nodes[b].i && is_valid_diagonal(arena, a, b) {
                let mut c = split_polygon(arena, a, b);
                let a2 = arena.filter_points(a, arena.nodes[a].next);
                c = arena.filter_points(c, arena.nodes[c].next);
                earcut_linked(arena, a2, triangles, min, inv_size, Pass::Normal);
                earcut_linked(arena, c, triangles, min, inv_size, Pass::Normal);
                return;
            }
            b = arena.nodes[b].next;
        }
        a = arena.nodes[a].next;
        if a == start {
            break;
        }
    }
}

/// Connect every hole into the outer ring, producing a single ring.
fn eliminate_holes(
    arena: &mut Arena,
    vertices: &[DVec2],
    hole_indices: &[usize],
    outer: usize,
) -> usize {
    let mut queue = Vec::new();
    for (k, &start) in hole_indices.iter().enumerate() {
        let end = if k + 1 < hole_indices.len() {
            hole_indices[k + 1]
        } else {
            vertices.len()
        };
        // Holes are built clockwise.
        let list = arena.linked_list(vertices, start, end, false);
        if list == NIL {
            continue;
        }
        if list == arena.nodes[list].next {
            arena.nodes[list].steiner = true;
        }
        queue.push(get_leftmost(arena, list));
    }
    queue.sort_by(|a, b| {
        arena.nodes[*a]
            .p
            .x
            .partial_cmp(&arena.nodes[*b].p.x)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut outer = outer;
    for hole in queue {
        outer = eliminate_hole(arena, hole, outer);
        let next = arena.nodes[outer].next;
        outer = arena.filter_points(outer, next);
    }
    outer
}

fn eliminate_hole(arena: &mut Arena, hole: usize, outer: usize) -> usize {
    let bridge = find_hole_bridge(arena, hole, outer);
    if bridge == NIL {
        return outer;
    }
    let bridge_reverse = split_polygon(arena, bridge, hole);
    let next = arena.nodes[bridge_reverse].next;
    arena.filter_points(bridge_reverse, next);
    let next = arena.nodes[bridge].next;
    arena.filter_points(bridge, next)
}

/// David Eberly's algorithm for finding a bridge between a hole and the
/// outer polygon.
fn find_hole_bridge(arena: &Arena, hole: usize, outer: usize) -> usize {
    let mut p = outer;
    let hp = arena.nodes[hole].p;
    let mut qx = f64::NEG_INFINITY;
    let mut m = NIL;

    // Find the rightmost intersection of a leftward ray from the hole with
    // the outer ring.
    loop {
        let pp = arena.nodes[p].p;
        let np = arena.nodes[arena.nodes[p].next].p;
        if hp.y <= pp.y && hp.y >= np.y && np.y != pp.y {
            let x = pp.x + (hp.y - pp.y) * (np.x - pp.x) / (np.y - pp.y);
            if x <= hp.x && x > qx {
                qx = x;
                m = if pp.x < np.x {
                    p
                } else {
                    arena.nodes[p].next
                };
                if x == hp.x {
                    // Ray touches the vertex directly; it is a valid bridge.
                    return m;
                }
            }
        }
        p = arena.nodes[p].next;
        if p == outer {
            break;
        }
    }

    if m == NIL {
        return NIL;
    }

    // Look for points inside the triangle of the bridge candidate; pick the
    // one that minimizes the angle to the hole point.
    let stop = m;
    let mp = arena.nodes[m].p;
    let mut tan_min = f64::INFINITY;

    p = m;
    loop {
        let pp = arena.nodes[p].p;
        if hp.x >= pp.x
            && pp.x >= mp.x
            && hp.x != pp.x
            && point_in_triangle(
                DVec2::new(if hp.y < mp.y { hp.x } else { qx }, hp.y),
                mp,
                DVec2::new(if hp.y < mp.y { qx } else { hp.x }, hp.y),
                pp,
            )
        {
            let tan = (hp.y - pp.y).abs() / (hp.x - pp.x);
            if locally_inside(arena, p, hole)
                && (tan < tan_min
                    || (tan == tan_min
                        && (pp.x > arena.nodes[m].p.x
                            || (pp.x == arena.nodes[m].p.x
                                && sector_contains_sector(arena, m, p)))))
            {
                m = p;
                tan_min = tan;
            }
        }
        p = arena.nodes[p].next;
        if p == stop {
            break;
        }
    }

    m
}

/// Whether the sector of `m` fully contains the sector of `p` (tie-break for
/// identical bridge tangents).
fn sector_contains_sector(arena: &Arena, m: usize, p: usize) -> bool {
    area(
        arena.nodes[arena.nodes[m].prev].p,
        arena.nodes[m].p,
        arena.nodes[arena.nodes[p].prev].p,
    ) < 0.0
        && area(
            arena.nodes[arena.nodes[p].next].p,
            arena.nodes[m].p,
            arena.nodes[arena.nodes[m].next].p,
        ) < 0.0
}

/// Interleave the lower 16 bits of x and y into a Morton code.
fn z_order(p: DVec2, min: DVec2, inv_size: f64) -> i32 {
    let mut x = ((p.x - min.x) * inv_size) as i64 as i32;
    let mut y = ((p.y - min.y) * inv_size) as i64 as i32;

    x = (x | (x << 8)) & 0x00FF00FF;
    x = (x | (x << 4)) & 0x0F0F0F0F;
    x = (x | (x << 2)) & 0x33333333;
    x = (x | (x << 1)) & 0x55555555;

    y = (y | (y << 8)) & 0x00FF00FF;
    y = (y | (y << 4)) & 0x0F0F0F0F;
    y = (y | (y << 2)) & 0x33333333;
    y = (y | (y << 1)) & 0x55555555;

    x | (y << 1)
}

/// Assign z-order values and sort the secondary z-list.
fn index_curve(arena: &mut Arena, start: usize, min: DVec2, inv_size: f64) {
    let mut p = start;
    loop {
        if arena.nodes[p].z == 0 {
            arena.nodes[p].z = z_order(arena.nodes[p].p, min, inv_size);
        }
        arena.nodes[p].prev_z = arena.nodes[p].prev;
        arena.nodes[p].next_z = arena.nodes[p].next;
        p = arena.nodes[p].next;
        if p == start {
            break;
        }
    }
    let prev_z = arena.nodes[p].prev_z;
    arena.nodes[prev_z].next_z = NIL;
    arena.nodes[p].prev_z = NIL;
    sort_linked(arena, p);
}

/// Bottom-up merge sort of the z-list (Simon Tatham's algorithm).
fn sort_linked(arena: &mut Arena, list: usize) -> usize {
    let mut list = list;
    let mut in_size = 1usize;

    loop {
        let mut p = list;
        list = NIL;
        let mut tail = NIL;
        let mut num_merges = 0;

        while p != NIL {
            num_merges += 1;
            let mut q = p;
            let mut p_size = 0usize;
            for _ in 0..in_size {
                p_size += 1;
                q = arena.nodes[q].next_z;
                if q == NIL {
                    break;
                }
            }
            let mut q_size = in_size;

            while p_size > 0 || (q_size > 0 && q != NIL) {
                let e;
                if p_size != 0
                    && (q_size == 0 || q == NIL || arena.nodes[p].z <= arena.nodes[q].z)
                {
                    e = p;
                    p = arena.nodes[p].next_z;
                    p_size -= 1;
                } else {
                    e = q;
                    q = arena.nodes[q].next_z;
                    q_size -= 1;
                }

                if tail != NIL {
                    arena.nodes[tail].next_z = e;
                } else {
                    list = e;
                }
                arena.nodes[e].prev_z = tail;
                tail = e;
            }

            p = q;
        }

        arena.nodes[tail].next_z = NIL;
        if num_merges <= 1 {
            return list;
        }
        in_size *= 2;
    }
}

fn get_leftmost(arena: &Arena, start: usize) -> usize {
    let mut p = start;
    let mut leftmost = start;
    loop {
        let pp = arena.nodes[p].p;
        let lp = arena.nodes[leftmost].p;
        if pp.x < lp.x || (pp.x == lp.x && pp.y < lp.y) {
            leftmost = p;
        }
        p = arena.nodes[p].next;
        if p == start {
            break;
        }
    }
    leftmost
}

fn point_in_triangle(a: DVec2, b: DVec2, c: DVec2, p: DVec2) -> bool {
    (c.x - p.x) * (a.y - p.y) >= (a.x - p.x) * (c.y - p.y)
        && (a.x - p.x) * (b.y - p.y) >= (b.x - p.x) * (a.y - p.y)
        && (b.x - p.x) * (c.y - p.y) >= (c.x - p.x) * (b.y - p.y)
}

/// Whether the diagonal `a`-`b` lies inside the polygon and intersects no
/// edges.
fn is_valid_diagonal(arena: &Arena, a: usize, b: usize) -> bool {
    let an = arena.nodes[a].next;
    let ap = arena.nodes[a].prev;
    let bn = arena.nodes[b].next;
    let bp = arena.nodes[b].prev;

    arena.nodes[an].i != arena.nodes[b].i
        && arena.nodes[ap].i != arena.nodes[b].i
        && !intersects_polygon(arena, a, b)
        && ((locally_inside(arena, a, b)
            && locally_inside(arena, b, a)
            && middle_inside(arena, a, b)
            && (area(arena.nodes[ap].p, arena.nodes[a].p, arena.nodes[bp].p) != 0.0
                || area(arena.nodes[a].p, arena.nodes[bp].p, arena.nodes[b].p) != 0.0))
            || (equals(arena.nodes[a].p, arena.nodes[b].p)
                && area(arena.nodes[ap].p, arena.nodes[a].p, arena.nodes[an].p) > 0.0
                && area(arena.nodes[bp].p, arena.nodes[b].p, arena.nodes[bn].p) > 0.0))
}

/// Twice the signed area of the triangle `p`, `q`, `r` (positive when the
/// turn is clockwise).
fn area(p: DVec2, q: DVec2, r: DVec2) -> f64 {
    (q.y - p.y) * (r.x - q.x) - (q.x - p.x) * (r.y - q.y)
}

fn equals(a: DVec2, b: DVec2) -> bool {
    a.x == b.x && a.y == b.y
}

/// Segment intersection test with collinearity handling.
fn intersects(p1: DVec2, q1: DVec2, p2: DVec2, q2: DVec2) -> bool {
    let o1 = sign(area(p1, q1, p2));
    let o2 = sign(area(p1, q1, q2));
    let o3 = sign(area(p2, q2, p1));
    let o4 = sign(area(p2, q2, q1));

    if o1 != o2 && o3 != o4 {
        return true;
    }
    if o1 == 0 && on_segment(p1, p2, q1) {
        return true;
    }
    if o2 == 0 && on_segment(p1, q2, q1) {
        return true;
    }
    if o3 == 0 && on_segment(p2, p1, q2) {
        return true;
    }
    if o4 == 0 && on_segment(p2, q1, q2) {
        return true;
    }
    false
}

fn sign(v: f64) -> i32 {
    if v > 0.0 {
        1
    } else if v < 0.0 {
        -1
    } else {
        0
    }
}

fn on_segment(p: DVec2, q: DVec2, r: DVec2) -> bool {
    q.x <= p.x.max(r.x) && q.x >= p.x.min(r.x) && q.y <= p.y.max(r.y) && q.y >= p.y.min(r.y)
}

/// Whether the diagonal `a`-`b` crosses any polygon edge.
fn intersects_polygon(arena: &Arena, a: usize, b: usize) -> bool {
    let mut p = a;
    loop {
        let next = arena.nodes[p].next;
        if arena.nodes[p].i != arena.nodes[a].i
            && arena.nodes[next].i != arena.nodes[a].i
            && arena.nodes[p].i != arena.nodes[b].i
            && arena.nodes[next].i != arena.nodes[b].i
            && intersects(
                arena.nodes[p].p,
                arena.nodes[next].p,
                arena.nodes[a].p,
                arena.nodes[b].p,
            )
        {
            return true;
        }
        p = next;
        if p == a {
            break;
        }
    }
    false
}

/// Whether `b` is locally inside the polygon at corner `a`.
fn locally_inside(arena: &Arena, a: usize, b: usize) -> bool {
    let ap = arena.nodes[arena.nodes[a].prev].p;
    let an = arena.nodes[arena.nodes[a].next].p;
    let aa = arena.nodes[a].p;
    let bb = arena.nodes[b].p;
    if area(ap, aa, an) < 0.0 {
        area(aa, bb, an) >= 0.0 && area(aa, ap, bb) >= 0.0
    } else {
        area(aa, bb, ap) < 0.0 || area(aa, an, bb) < 0.0
    }
}

/// Whether the midpoint of the diagonal `a`-`b` is inside the polygon.
fn middle_inside(arena: &Arena, a: usize, b: usize) -> bool {
    let mid = (arena.nodes[a].p + arena.nodes[b].p) * 0.5;
    let mut inside = false;
    let mut p = a;
    loop {
        let pp = arena.nodes[p].p;
        let np = arena.nodes[arena.nodes[p].next].p;
        if ((pp.y > mid.y) != (np.y > mid.y))
            && np.y != pp.y
            && (mid.x < (np.x - pp.x) * (mid.y - pp.y) / (np.y - pp.y) + pp.x)
        {
            inside = !inside;
        }
        p = arena.nodes[p].next;
        if p == a {
            break;
        }
    }
    inside
}

/// Split the ring into two along the diagonal `a`-`b`; returns the new node
/// on the second ring that mirrors `b`.
fn split_polygon(arena: &mut Arena, a: usize, b: usize) -> usize {
    let a2 = arena.insert_node(arena.nodes[a].i, arena.nodes[a].p, NIL);
    let b2 = arena.insert_node(arena.nodes[b].i, arena.nodes[b].p, NIL);
    let an = arena.nodes[a].next;
    let bp = arena.nodes[b].prev;

    arena.nodes[a].next = b;
    arena.nodes[b].prev = a;

    arena.nodes[a2].next = an;
    arena.nodes[an].prev = a2;

    arena.nodes[b2].next = a2;
    arena.nodes[a2].prev = b2;

    arena.nodes[bp].next = b2;
    arena.nodes[b2].prev = bp;

    b2
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tri_area(vertices: &[DVec2], tri: &[u32]) -> f64 {
        let mut total = 0.0;
        for t in tri.chunks(3) {
            let (a, b, c) = (
                vertices[t[0] as usize],
                vertices[t[1] as usize],
                vertices[t[2] as usize],
            );
            total += ((b.x - a.x) * (c.y - a.y) - (c.x - a.x) * (b.y - a.y)).abs() * 0.5;
        }
        total
    }

    #[test]
    fn square_produces_two_triangles() {
        let verts = [
            DVec2::new(0.0, 0.0),
            DVec2::new(10.0, 0.0),
            DVec2::new(10.0, 10.0),
            DVec2::new(0.0, 10.0),
        ];
        let tri = earcut(&verts, &[]);
        assert_eq!(tri.len(), 6);
        assert!((tri_area(&verts, &tri) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn square_with_central_hole() {
        let verts = [
            // Outer CCW.
            DVec2::new(0.0, 0.0),
            DVec2::new(10.0, 0.0),
            DVec2::new(10.0, 10.0),
            DVec2::new(0.0, 10.0),
            // Hole CW.
            DVec2::new(4.0, 4.0),
            DVec2::new(4.0, 6.0),
            DVec2::new(6.0, 6.0),
            DVec2::new(6.0, 4.0),
        ];
        let tri = earcut(&verts, &[4]);
        assert_eq!(tri.len(), 8 * 3);
        assert!((tri_area(&verts, &tri) - 96.0).abs() < 1e-6 * 96.0);
    }

    #[test]
    fn degenerate_input_yields_no_triangles() {
        assert!(earcut(&[DVec2::ZERO, DVec2::X], &[]).is_empty());
        assert!(earcut(&[], &[]).is_empty());
    }

    #[test]
    fn collinear_points_are_skipped() {
        let verts = [
            DVec2::new(0.0, 0.0),
            DVec2::new(5.0, 0.0),
            DVec2::new(10.0, 0.0),
            DVec2::new(10.0, 10.0),
            DVec2::new(0.0, 10.0),
        ];
        let tri = earcut(&verts, &[]);
        assert!((tri_area(&verts, &tri) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn concave_polygon_area_is_preserved() {
        // An L-shape.
        let verts = [
            DVec2::new(0.0, 0.0),
            DVec2::new(10.0, 0.0),
            DVec2::new(10.0, 4.0),
            DVec2::new(4.0, 4.0),
            DVec2::new(4.0, 10.0),
            DVec2::new(0.0, 10.0),
        ];
        let tri = earcut(&verts, &[]);
        assert_eq!(tri.len(), 4 * 3);
        assert!((tri_area(&verts, &tri) - 64.0).abs() < 1e-9);
    }

    #[test]
    fn large_ring_uses_hash_path_and_covers_area() {
        // A 100-gon: well past the hash threshold.
        let n = 100;
        let verts: Vec<DVec2> = (0..n)
            .map(|i| {
                let t = i as f64 / n as f64 * std::f64::consts::TAU;
                DVec2::new(t.cos() * 50.0, t.sin() * 50.0)
            })
            .collect();
        let tri = earcut(&verts, &[]);
        assert_eq!(tri.len(), (n - 2) * 3);
        let expected = signed_area(&verts);
        assert!((tri_area(&verts, &tri) - expected).abs() < 1e-6 * expected);
    }

    #[test]
    fn output_triangles_are_ccw() {
        let verts = [
            DVec2::new(0.0, 0.0),
            DVec2::new(10.0, 0.0),
            DVec2::new(10.0, 10.0),
            DVec2::new(0.0, 10.0),
        ];
        let tri = earcut(&verts, &[]);
        for t in tri.chunks(3) {
            let (a, b, c) = (
                verts[t[0] as usize],
                verts[t[1] as usize],
                verts[t[2] as usize],
            );
            let cross = (b.x - a.x) * (c.y - a.y) - (c.x - a.x) * (b.y - a.y);
            assert!(cross > 0.0);
        }
    }

    #[test]
    fn ensure_winding_reverses_cw_outer() {
        let mut ring = vec![
            DVec2::new(0.0, 0.0),
            DVec2::new(0.0, 10.0),
            DVec2::new(10.0, 10.0),
            DVec2::new(10.0, 0.0),
        ];
        assert!(signed_area(&ring) < 0.0);
        ensure_winding(&mut ring, true);
        assert!(signed_area(&ring) > 0.0);
    }
}
