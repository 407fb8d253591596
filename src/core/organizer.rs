//! The open-triangle organizer: bookkeeping for cavity repair.
//!
//! During insertion, deletion, and cleanup the kernel tears tetrahedra out
//! of the triangulation, leaving *open* triangles — faces with only one
//! incident tetrahedron. The organizer tracks them under a key invariant to
//! node permutation, pairs them when a new tetrahedron closes a face, and
//! can retriangulate a whole cavity by gift-wrapping: repeatedly pick an
//! open triangle and the apex node that minimizes the signed Delaunay
//! distance, creating one tetrahedron per step.
//!
//! Cospherical and cocircular apex candidates get dedicated handling: all
//! tied nodes are stitched together with a fan around the minimum-id center
//! node before wrapping continues, which keeps degenerate inputs (grids,
//! regular solids) deterministic.

use std::collections::{BTreeMap, VecDeque};

use nalgebra::Vector3;
use tracing::trace;

use crate::core::collections::FastHashMap;
use crate::core::error::TriangulationError;
use crate::core::triangulation::{NodeKey, TetrahedronKey, TriangleKey, Triangulation};
use crate::geometry::exact::{ExactScalar, ExactVector};
use crate::geometry::predicates::{
    det3, three_planes_intersection, three_planes_intersection_exact,
};

/// Iteration budget for the wrapping loops. Progress is geometric (every
/// step closes at least one face), so a healthy cavity finishes in far
/// fewer; exhaustion signals a broken cavity and surfaces as an error.
const WRAP_BUDGET: usize = 2000;

/// Key of a triangle under node permutation: the sorted node ids, with −1
/// standing in for the infinite slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct TripleKey([i64; 3]);

/// An unpaired directed edge on the wrap front, remembering the plane of
/// the face it came from.
#[derive(Clone, Debug)]
struct OpenEdge {
    a: NodeKey,
    b: NodeKey,
    ab: Vector3<f64>,
    last_normal: Vector3<f64>,
}

impl OpenEdge {
    /// Cosine of the dihedral angle between the remembered face plane and
    /// the plane through this edge and `fourth_point`; the wrap picks the
    /// smallest.
    fn cosine(&self, a_position: Vector3<f64>, fourth_point: Vector3<f64>) -> f64 {
        let difference = fourth_point - a_position;
        let normal = self.ab.cross(&difference).normalize();
        let cosine = normal.dot(&self.last_normal);
        if cosine > 0.999_999_999 {
            1.0
        } else if cosine < -0.999_999_99 {
            -1.0
        } else {
            cosine
        }
    }
}

type OpenEdgeMap = FastHashMap<(u64, u64), OpenEdge>;

/// Set of currently unpaired triangles, plus the pool of cavity nodes they
/// span (ordered by node id for deterministic wrapping).
#[derive(Debug, Default)]
pub struct OpenTriangleOrganizer {
    map: FastHashMap<TripleKey, TriangleKey>,
    open_triangles: Vec<TriangleKey>,
    node_pool: BTreeMap<u64, NodeKey>,
    new_tetrahedra: Vec<TetrahedronKey>,
    a_new_tetrahedron: Option<TetrahedronKey>,
}

impl OpenTriangleOrganizer {
    /// A fresh organizer for one cavity-repair episode.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether no triangle is currently registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// One tetrahedron created by the last [`Triangulation::organizer_triangulate`]
    /// run, if any; callers use it as a fresh walk hint.
    #[must_use]
    pub fn a_new_tetrahedron(&self) -> Option<TetrahedronKey> {
        self.a_new_tetrahedron
    }

    /// All tetrahedra created by this organizer.
    #[must_use]
    pub fn new_tetrahedra(&self) -> &[TetrahedronKey] {
        &self.new_tetrahedra
    }
}

impl<U> Triangulation<U> {
    fn triple_key(&self, a: Option<NodeKey>, b: Option<NodeKey>, c: Option<NodeKey>) -> TripleKey {
        let id = |n: Option<NodeKey>| n.map_or(-1, |key| self.nodes[key].id as i64);
        let mut ids = [id(a), id(b), id(c)];
        ids.sort_unstable();
        TripleKey(ids)
    }

    fn pool_insert(&self, oto: &mut OpenTriangleOrganizer, node: Option<NodeKey>) {
        if let Some(key) = node {
            oto.node_pool.insert(self.nodes[key].id, key);
        }
    }

    /// Registers an open triangle.
    pub(crate) fn organizer_put_triangle(
        &mut self,
        oto: &mut OpenTriangleOrganizer,
        triangle: TriangleKey,
    ) {
        let nodes = self.triangles[triangle].nodes();
        let key = self.triple_key(nodes[0], nodes[1], nodes[2]);
        oto.map.insert(key, triangle);
        for node in nodes {
            self.pool_insert(oto, node);
        }
        oto.open_triangles.push(triangle);
        self.triangles[triangle].in_organizer = true;
    }

    /// Deregisters a triangle; if nothing else references it, it leaves the
    /// arena.
    pub(crate) fn organizer_remove_triangle(
        &mut self,
        oto: &mut OpenTriangleOrganizer,
        triangle: TriangleKey,
    ) {
        let nodes = self.triangles[triangle].nodes();
        let key = self.triple_key(nodes[0], nodes[1], nodes[2]);
        oto.map.remove(&key);
        self.triangles[triangle].in_organizer = false;
        self.discard_triangle_if_orphaned(triangle);
    }

    /// Whether a triangle spanning the three nodes is registered.
    fn organizer_contains(
        &self,
        oto: &OpenTriangleOrganizer,
        a: NodeKey,
        b: NodeKey,
        c: NodeKey,
    ) -> bool {
        oto.map
            .contains_key(&self.triple_key(Some(a), Some(b), Some(c)))
    }

    /// Fetches the triangle spanning the given nodes, creating it if absent.
    /// A registered triangle that already carries a tetrahedron is *paired*:
    /// it is handed out and deregistered, since the caller will close it.
    pub(crate) fn organizer_get_triangle(
        &mut self,
        oto: &mut OpenTriangleOrganizer,
        a: Option<NodeKey>,
        b: Option<NodeKey>,
        c: Option<NodeKey>,
    ) -> TriangleKey {
        let key = self.triple_key(a, b, c);
        if let Some(&existing) = oto.map.get(&key) {
            if self.triangles[existing].is_completely_open() {
                oto.open_triangles.push(existing);
            } else {
                oto.map.remove(&key);
                self.triangles[existing].in_organizer = false;
            }
            existing
        } else {
            let triangle = self.create_triangle(a, b, c);
            self.triangles[triangle].in_organizer = true;
            oto.map.insert(key, triangle);
            oto.open_triangles.push(triangle);
            triangle
        }
    }

    /// As [`Self::organizer_get_triangle`], but never deregisters.
    pub(crate) fn organizer_get_triangle_without_removing(
        &mut self,
        oto: &mut OpenTriangleOrganizer,
        a: Option<NodeKey>,
        b: Option<NodeKey>,
        c: Option<NodeKey>,
    ) -> TriangleKey {
        let key = self.triple_key(a, b, c);
        if let Some(&existing) = oto.map.get(&key) {
            existing
        } else {
            let triangle = self.create_triangle(a, b, c);
            self.triangles[triangle].in_organizer = true;
            oto.map.insert(key, triangle);
            oto.open_triangles.push(triangle);
            triangle
        }
    }

    /// Pops a wrappable triangle off the stack: finite, exactly one side
    /// occupied, still alive.
    fn organizer_poll_open_triangle(
        &mut self,
        oto: &mut OpenTriangleOrganizer,
    ) -> Option<TriangleKey> {
        while let Some(candidate) = oto.open_triangles.pop() {
            let Some(triangle) = self.triangles.get(candidate) else {
                continue;
            };
            if triangle.is_infinite() || triangle.is_closed() || triangle.is_completely_open() {
                continue;
            }
            return Some(candidate);
        }
        None
    }

    /// Expands a cavity: removes `start` and, recursively, every neighbor of
    /// matching finiteness whose apex lies inside `start`'s circumsphere,
    /// feeding the opened faces to the organizer.
    pub(crate) fn organizer_remove_all_tetrahedra_in_sphere(
        &mut self,
        oto: &mut OpenTriangleOrganizer,
        start: TetrahedronKey,
    ) {
        let mut pending = vec![start];
        while let Some(tet) = pending.pop() {
            if !self.tetrahedra.contains_key(tet) {
                continue;
            }
            let triangles = self.tetrahedra[tet].triangles;
            let infinite = self.tetrahedra[tet].is_infinite();
            for triangle in triangles {
                if let Some(opposite) = self.triangles[triangle].opposite_tetrahedron(Some(tet)) {
                    if self.tetrahedra[opposite].is_infinite() == infinite {
                        if let Some(Some(apex)) = self.tetrahedron_opposite_node(opposite, triangle)
                        {
                            let position = self.nodes[apex].position;
                            if self.is_inside_sphere(tet, position) {
                                pending.push(opposite);
                            }
                        }
                    }
                }
                if self.triangles[triangle].is_closed() {
                    self.organizer_put_triangle(oto, triangle);
                } else {
                    self.organizer_remove_triangle(oto, triangle);
                }
            }
            self.remove_tetrahedron(tet);
        }
    }

    /// Creates a tetrahedron over `triangle` apexed at `node` (or infinite
    /// when `node` is absent) and records it as the organizer's product.
    fn organizer_create_new_tetrahedron(
        &mut self,
        oto: &mut OpenTriangleOrganizer,
        triangle: TriangleKey,
        node: Option<NodeKey>,
    ) {
        let tet = self.create_tetrahedron_from_triangle(triangle, node, oto);
        oto.new_tetrahedra.push(tet);
        oto.a_new_tetrahedron = Some(tet);
    }

    /// Gift-wraps the cavity until no open triangle remains.
    ///
    /// # Errors
    ///
    /// [`TriangulationError::InvariantViolated`] when the wrap budget is
    /// exhausted without closing the cavity.
    pub(crate) fn organizer_triangulate(
        &mut self,
        oto: &mut OpenTriangleOrganizer,
    ) -> Result<(), TriangulationError> {
        if oto.open_triangles.is_empty() {
            self.organizer_create_initial_triangle(oto);
        }
        let mut budget = WRAP_BUDGET;
        while let Some(open_triangle) = self.organizer_poll_open_triangle(oto) {
            // Re-read the pool every step: forbidden-triangle removal can
            // widen the cavity and add nodes mid-wrap.
            let pool: Vec<NodeKey> = oto.node_pool.values().copied().collect();
            budget = budget.checked_sub(1).ok_or_else(|| {
                TriangulationError::InvariantViolated {
                    detail: "cavity wrap budget exhausted".into(),
                }
            })?;
            self.triangle_update(open_triangle);
            self.triangle_orient_to_open_side(open_triangle);
            let tolerance = self.triangle_typical_sd_distance(open_triangle) * 1e-7;

            let mut picked: Option<NodeKey> = None;
            let mut upper_bound = f64::MAX;
            let mut lower_bound = f64::MAX;
            let mut similar_distance_nodes: VecDeque<NodeKey> = VecDeque::new();
            let mut on_circle_nodes: Vec<NodeKey> = Vec::new();
            let mut in_plane_nodes: Vec<NodeKey> = Vec::new();
            for &node in &pool {
                if self.triangles[open_triangle].is_adjacent_to_node(node) {
                    continue;
                }
                let position = self.nodes[node].position;
                let current_distance = self.triangle_sd_distance(open_triangle, position);
                if current_distance < upper_bound {
                    let mut smaller = false;
                    if current_distance > lower_bound {
                        // Within the float tie band: compare exactly.
                        let picked_position =
                            self.nodes[picked.expect("bounds imply a pick")].position;
                        let last = self.triangle_sd_distance_exact(open_triangle, picked_position);
                        let new = self.triangle_sd_distance_exact(open_triangle, position);
                        match last.compare(&new) {
                            0 => similar_distance_nodes.push_back(node),
                            comparison if comparison > 0 => smaller = true,
                            _ => {}
                        }
                    } else {
                        smaller = true;
                    }
                    if smaller {
                        similar_distance_nodes.clear();
                        let shortest = current_distance;
                        upper_bound = shortest + tolerance;
                        lower_bound = shortest - tolerance;
                        picked = Some(node);
                    }
                } else if self.triangle_orientation_to_upper_side(open_triangle, position) == 0 {
                    in_plane_nodes.push(node);
                    if self.triangle_circle_orientation(open_triangle, position) == 0 {
                        on_circle_nodes.push(node);
                    }
                }
            }

            if picked.is_none() || (similar_distance_nodes.is_empty() && on_circle_nodes.is_empty())
            {
                if picked.is_none() && !in_plane_nodes.is_empty() {
                    // No apex above the face, but a coplanar node exists: the
                    // cavity is flat here and closes with a flat tetrahedron
                    // rather than a hull face. Cocircular candidates first.
                    let apex = on_circle_nodes.first().or(in_plane_nodes.first()).copied();
                    self.organizer_create_new_tetrahedron(oto, open_triangle, apex);
                } else {
                    self.organizer_create_new_tetrahedron(oto, open_triangle, picked);
                }
            } else {
                trace!(
                    tied = similar_distance_nodes.len(),
                    cocircular = on_circle_nodes.len(),
                    "cospherical apex candidates during wrap"
                );
                similar_distance_nodes.push_back(picked.expect("similar set implies a pick"));
                self.organizer_triangulate_points_on_sphere(
                    oto,
                    similar_distance_nodes,
                    &on_circle_nodes,
                    open_triangle,
                )?;
            }
        }
        Ok(())
    }

    /// Seeds an empty organizer with one Delaunay triangle of its node pool:
    /// the pool's first node, its nearest pool neighbor, and the node
    /// minimizing the circumcircle's offset from the edge midpoint. Ties
    /// fall back to exact arithmetic and minimum id.
    fn organizer_create_initial_triangle(&mut self, oto: &mut OpenTriangleOrganizer) {
        let pool: Vec<NodeKey> = oto.node_pool.values().copied().collect();
        if pool.len() < 3 {
            return;
        }
        let a = pool[0];
        let a_position = self.nodes[a].position;

        let mut tolerance = 1e-9;
        let mut shortest_distance = f64::MAX;
        let mut b: Option<NodeKey> = None;
        for &node in &pool {
            if node == a {
                continue;
            }
            let vector = self.nodes[node].position - a_position;
            let distance = vector.norm_squared();
            if distance < shortest_distance + tolerance {
                if distance > shortest_distance - tolerance {
                    let picked = b.expect("bounds imply a pick");
                    let dist_new = ExactVector::from_f64(a_position)
                        .sub(&ExactVector::from_f64(self.nodes[node].position))
                        .squared_length();
                    let dist_last = ExactVector::from_f64(a_position)
                        .sub(&ExactVector::from_f64(self.nodes[picked].position))
                        .squared_length();
                    if dist_last.compare(&dist_new) > 0 {
                        b = Some(node);
                        shortest_distance = shortest_distance.min(distance);
                    }
                } else {
                    b = Some(node);
                    shortest_distance = distance;
                    tolerance = 1e-9 * distance;
                }
            }
        }
        let b = b.expect("pool holds at least two further nodes");
        let b_position = self.nodes[b].position;

        shortest_distance = f64::MAX;
        let edge_normal = b_position - a_position;
        let edge_offset = 0.5 * edge_normal.dot(&(a_position + b_position));
        tolerance = edge_normal.norm_squared() * 1e-9;
        let mut c: Option<NodeKey> = None;
        for &node in &pool {
            if node == a || node == b {
                continue;
            }
            let position = self.nodes[node].position;
            let to_node = position - a_position;
            let normals = [edge_normal, edge_normal.cross(&to_node), to_node];
            let offsets = [
                edge_offset,
                normals[1].dot(&a_position),
                0.5 * normals[2].dot(&(a_position + position)),
            ];
            let circum_center = three_planes_intersection(&normals, offsets, det3(&normals));
            let vector = circum_center - (a_position + b_position) * 0.5;
            let distance = vector.norm_squared();
            if distance < shortest_distance + tolerance {
                if distance > shortest_distance - tolerance {
                    let picked = c.expect("bounds imply a pick");
                    let dist_1 = circumcircle_offset_exact(a_position, b_position, position);
                    let dist_2 = circumcircle_offset_exact(
                        a_position,
                        b_position,
                        self.nodes[picked].position,
                    );
                    let comparison = dist_1.compare(&dist_2);
                    if comparison < 0
                        || (comparison == 0 && self.nodes[node].id < self.nodes[picked].id)
                    {
                        c = Some(node);
                        shortest_distance = shortest_distance.min(distance);
                    }
                } else {
                    c = Some(node);
                    shortest_distance = distance;
                }
            }
        }
        let c = c.expect("pool holds at least three nodes");
        let triangle = self.create_triangle(Some(a), Some(b), Some(c));
        self.organizer_put_triangle(oto, triangle);
    }

    fn open_edge(&self, a: NodeKey, b: NodeKey, opposite: NodeKey) -> OpenEdge {
        let a_position = self.nodes[a].position;
        let ab = self.nodes[b].position - a_position;
        let to_opposite = self.nodes[opposite].position - a_position;
        OpenEdge {
            a,
            b,
            ab,
            last_normal: ab.cross(&to_opposite).normalize(),
        }
    }

    fn edge_pair_key(&self, a: NodeKey, b: NodeKey) -> (u64, u64) {
        let ia = self.nodes[a].id;
        let ib = self.nodes[b].id;
        (ia.min(ib), ia.max(ib))
    }

    /// Toggles the edge `(a, b)` on the wrap front: a fresh edge is stored
    /// (and becomes the new working edge), a matched edge closes and
    /// `old_open_edge` stays the working edge.
    fn put_edge_on_map(
        &self,
        a: NodeKey,
        b: NodeKey,
        opposite: NodeKey,
        old_open_edge: Option<OpenEdge>,
        map: &mut OpenEdgeMap,
    ) -> Option<OpenEdge> {
        let key = self.edge_pair_key(a, b);
        if map.remove(&key).is_some() {
            old_open_edge
        } else {
            let edge = self.open_edge(a, b, opposite);
            map.insert(key, edge.clone());
            Some(edge)
        }
    }

    fn find_center_node<'a>(&self, nodes: impl Iterator<Item = &'a NodeKey>) -> NodeKey {
        let mut center: Option<NodeKey> = None;
        let mut min_id = u64::MAX;
        for &node in nodes {
            if self.nodes[node].id < min_id {
                min_id = self.nodes[node].id;
                center = Some(node);
            }
        }
        center.expect("non-empty node set")
    }

    /// Stitches a set of cospherical nodes onto the wrap front: surfaces the
    /// sphere with triangles fanned around the minimum-id center node, then
    /// fills the enclosed volume with tetrahedra from that center.
    fn organizer_triangulate_points_on_sphere(
        &mut self,
        oto: &mut OpenTriangleOrganizer,
        mut nodes: VecDeque<NodeKey>,
        on_circle_nodes: &[NodeKey],
        starting_triangle: TriangleKey,
    ) -> Result<(), TriangulationError> {
        let mut surface_triangles: Vec<TriangleKey> = Vec::new();
        let starting_nodes: [NodeKey; 3] = self.triangles[starting_triangle]
            .nodes()
            .map(|n| n.expect("wrappable triangles are finite"));
        nodes.extend(starting_nodes);
        nodes.extend(on_circle_nodes.iter().copied());

        let mut map: OpenEdgeMap = OpenEdgeMap::default();
        let mut an_open_edge: Option<OpenEdge> = None;
        if on_circle_nodes.is_empty() {
            surface_triangles.push(starting_triangle);
            for i in 0..3 {
                an_open_edge = self.put_edge_on_map(
                    starting_nodes[i],
                    starting_nodes[(i + 1) % 3],
                    starting_nodes[(i + 2) % 3],
                    an_open_edge,
                    &mut map,
                );
            }
        } else {
            let mut circle: VecDeque<NodeKey> = on_circle_nodes.iter().copied().collect();
            circle.extend(starting_nodes);
            an_open_edge = self.organizer_triangulate_points_on_circle(
                oto,
                circle,
                None,
                &mut map,
                &mut surface_triangles,
            );
        }

        let mut budget = WRAP_BUDGET;
        while !map.is_empty() {
            budget = budget.checked_sub(1).ok_or_else(|| {
                TriangulationError::InvariantViolated {
                    detail: "cospherical wrap budget exhausted".into(),
                }
            })?;
            let Some(edge) = an_open_edge
                .take()
                .or_else(|| map.values().next().cloned())
            else {
                break;
            };
            let (a, b) = (edge.a, edge.b);
            let a_position = self.nodes[a].position;
            let tolerance = 1e-9;
            let mut upper_bound = f64::MAX;
            let mut lower_bound = f64::MAX;
            let mut picked: Option<NodeKey> = None;
            let mut similar_distance_nodes: VecDeque<NodeKey> = VecDeque::new();
            for &current in &nodes {
                if current == a || current == b {
                    continue;
                }
                let cosine = edge.cosine(a_position, self.nodes[current].position);
                if cosine < upper_bound {
                    if cosine > lower_bound {
                        similar_distance_nodes.push_back(current);
                    } else {
                        picked = Some(current);
                        upper_bound = cosine + tolerance;
                        lower_bound = cosine - tolerance;
                        similar_distance_nodes.clear();
                    }
                }
            }
            let picked = picked.ok_or_else(|| TriangulationError::InvariantViolated {
                detail: "no apex candidate on cospherical wrap front".into(),
            })?;
            if similar_distance_nodes.is_empty() {
                let new_triangle =
                    self.organizer_get_triangle_without_removing(oto, Some(a), Some(b), Some(picked));
                surface_triangles.push(new_triangle);
                map.remove(&self.edge_pair_key(a, b));
                an_open_edge = self.put_edge_on_map(a, picked, b, None, &mut map);
                an_open_edge = self.put_edge_on_map(b, picked, a, an_open_edge, &mut map);
            } else {
                similar_distance_nodes.push_back(picked);
                an_open_edge = self.organizer_triangulate_points_on_circle(
                    oto,
                    similar_distance_nodes,
                    Some(edge),
                    &mut map,
                    &mut surface_triangles,
                );
            }
            if an_open_edge.is_none() && !map.is_empty() {
                an_open_edge = map.values().next().cloned();
            }
        }

        let center_node = self.find_center_node(nodes.iter());
        for triangle in surface_triangles {
            if self.triangles.contains_key(triangle)
                && !self.triangles[triangle].is_adjacent_to_node(center_node)
            {
                self.organizer_create_new_tetrahedron(oto, triangle, Some(center_node));
            }
        }
        Ok(())
    }

    /// Triangulates a ring of cocircular nodes as a fan around the
    /// minimum-id center, after removing triangles that contradict the fan.
    fn organizer_triangulate_points_on_circle(
        &mut self,
        oto: &mut OpenTriangleOrganizer,
        mut nodes: VecDeque<NodeKey>,
        starting_edge: Option<OpenEdge>,
        map: &mut OpenEdgeMap,
        triangle_list: &mut Vec<TriangleKey>,
    ) -> Option<OpenEdge> {
        if let Some(edge) = &starting_edge {
            nodes.push_front(edge.a);
            nodes.push_front(edge.b);
        }
        let center_node = self.find_center_node(nodes.iter());
        if starting_edge.is_some() {
            nodes.pop_front();
            nodes.pop_front();
        }
        let sorted_nodes = self.sort_circle_nodes(nodes, starting_edge.as_ref(), center_node);
        self.remove_forbidden_triangles(oto, &sorted_nodes);
        self.triangulate_sorted_circle_points(oto, &sorted_nodes, center_node, map, triangle_list)
    }

    /// Orders cocircular nodes along their circle, starting from the given
    /// edge (or the closest pair), then rotates the ring so the center node
    /// leads.
    fn sort_circle_nodes(
        &self,
        mut nodes: VecDeque<NodeKey>,
        starting_edge: Option<&OpenEdge>,
        center_node: NodeKey,
    ) -> Vec<NodeKey> {
        let mut sorted: VecDeque<NodeKey> = VecDeque::new();
        let (mut last_search_node, mut search_node) = if let Some(edge) = starting_edge {
            (edge.a, edge.b)
        } else {
            let first = nodes.pop_front().expect("ring holds nodes");
            let first_position = self.nodes[first].position;
            let mut min_distance = f64::MAX;
            let mut nearest = first;
            for &node in &nodes {
                let distance = (first_position - self.nodes[node].position).norm_squared();
                if distance < min_distance {
                    nearest = node;
                    min_distance = distance;
                }
            }
            if let Some(position) = nodes.iter().position(|&n| n == nearest) {
                nodes.remove(position);
            }
            (first, nearest)
        };
        let head = [last_search_node, search_node];

        while !nodes.is_empty() {
            let last_vector =
                (self.nodes[search_node].position - self.nodes[last_search_node].position).normalize();
            let mut biggest_cosine = -2.0;
            let mut picked = *nodes.front().expect("loop guard");
            for &node in &nodes {
                let direction =
                    (self.nodes[node].position - self.nodes[search_node].position).normalize();
                let cosine = direction.dot(&last_vector);
                if cosine > biggest_cosine {
                    biggest_cosine = cosine;
                    picked = node;
                }
            }
            sorted.push_back(picked);
            last_search_node = search_node;
            search_node = picked;
            if let Some(position) = nodes.iter().position(|&n| n == picked) {
                nodes.remove(position);
            }
        }
        sorted.push_front(head[1]);
        sorted.push_front(head[0]);

        let mut ring: Vec<NodeKey> = sorted.into();
        if let Some(position) = ring.iter().position(|&n| n == center_node) {
            ring.rotate_left(position);
        }
        ring
    }

    /// Removes registered triangles between ring nodes that the center fan
    /// cannot reuse, together with the tetrahedra in their spheres.
    fn remove_forbidden_triangles(
        &mut self,
        oto: &mut OpenTriangleOrganizer,
        sorted_nodes: &[NodeKey],
    ) {
        let mut doomed: Vec<(NodeKey, NodeKey, NodeKey)> = Vec::new();
        if let [center, a, b, c] = *sorted_nodes {
            if self.organizer_contains(oto, center, a, b) {
                if !self.organizer_contains(oto, center, b, c) {
                    doomed.push((center, a, b));
                }
            } else if self.organizer_contains(oto, center, b, c) {
                doomed.push((center, b, c));
            } else {
                if self.organizer_contains(oto, a, b, c) {
                    doomed.push((a, b, c));
                }
                if self.organizer_contains(oto, center, a, c) {
                    doomed.push((center, a, c));
                }
            }
        } else {
            let mut fan_broken = false;
            for window in sorted_nodes[1..].windows(2) {
                if !self.organizer_contains(oto, sorted_nodes[0], window[0], window[1]) {
                    fan_broken = true;
                    break;
                }
            }
            if fan_broken {
                for i in 0..sorted_nodes.len() {
                    for j in (i + 1)..sorted_nodes.len() {
                        for k in (j + 1)..sorted_nodes.len() {
                            if self.organizer_contains(
                                oto,
                                sorted_nodes[i],
                                sorted_nodes[j],
                                sorted_nodes[k],
                            ) {
                                doomed.push((sorted_nodes[i], sorted_nodes[j], sorted_nodes[k]));
                            }
                        }
                    }
                }
            }
        }
        for (a, b, c) in doomed {
            if !self.organizer_contains(oto, a, b, c) {
                continue;
            }
            let triangle =
                self.organizer_get_triangle_without_removing(oto, Some(a), Some(b), Some(c));
            if let Some(tet) = self.triangles[triangle].opposite_tetrahedron(None) {
                self.organizer_remove_all_tetrahedra_in_sphere(oto, tet);
            }
        }
    }

    /// Fans the sorted ring around the center node, maintaining the open
    /// edge front.
    fn triangulate_sorted_circle_points(
        &mut self,
        oto: &mut OpenTriangleOrganizer,
        sorted_nodes: &[NodeKey],
        center_node: NodeKey,
        map: &mut OpenEdgeMap,
        triangle_list: &mut Vec<TriangleKey>,
    ) -> Option<OpenEdge> {
        let mut ret: Option<OpenEdge> = None;
        for window in sorted_nodes[1..].windows(2) {
            let (last, current) = (window[0], window[1]);
            let triangle = self.organizer_get_triangle_without_removing(
                oto,
                Some(last),
                Some(current),
                Some(center_node),
            );
            triangle_list.push(triangle);
            self.put_edge_on_map(center_node, last, current, None, map);
            ret = self.put_edge_on_map(last, current, center_node, ret, map);
            self.put_edge_on_map(current, center_node, last, None, map);
        }
        ret
    }
}

/// Exact squared distance between the circumcircle center of the triangle
/// `(a, b, third)` and the midpoint of `(a, b)`; the gift-wrap tie-break.
fn circumcircle_offset_exact(
    a: Vector3<f64>,
    b: Vector3<f64>,
    third_point: Vector3<f64>,
) -> ExactScalar {
    let av = ExactVector::from_f64(a);
    let bv = ExactVector::from_f64(b);
    let third = ExactVector::from_f64(third_point);
    let to_third = third.sub(&av);
    let edge = bv.sub(&av);
    let normals = [edge.clone(), edge.cross(&to_third), to_third];
    let half = ExactScalar::ratio(1, 2);
    let offsets = [
        &normals[0].dot(&av.add(&bv)) * &half,
        normals[1].dot(&av),
        &normals[2].dot(&av.add(&third)) * &half,
    ];
    let det = ExactVector::det(&normals);
    let Some(circum_center) = three_planes_intersection_exact(&normals, &offsets, &det) else {
        return ExactScalar::from_f64(f64::MAX);
    };
    let midpoint = av.add(&bv).scale(&half);
    circum_center.sub(&midpoint).squared_length()
}
