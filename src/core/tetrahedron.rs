//! Tetrahedra: the maximal cells of the triangulation.
//!
//! A tetrahedron stores four node slots, four triangle slots (slot *i* lies
//! opposite node *i*), and six edge slots. Slot 0 of the node array is empty
//! for an *infinite* tetrahedron, the bookkeeping cell that pairs a convex
//! hull face with the point at infinity. *Flat* tetrahedra — four exactly
//! coplanar corners — have zero volume and no circumsphere; the predicates
//! dispatch on the kind tag.
//!
//! The circumsphere is cached together with a propagated upper bound on its
//! absolute rounding error; sphere queries that land inside that envelope
//! fall back to the exact rational in-sphere predicate.

use nalgebra::Vector3;

use crate::core::collections::remove_first;
use crate::core::error::TriangulationError;
use crate::core::organizer::OpenTriangleOrganizer;
use crate::core::triangulation::{
    EdgeKey, NodeKey, TetrahedronKey, TriangleKey, Triangulation,
};
use crate::geometry::predicates::{det3, insphere_exact, is_coplanar, three_planes_intersection};

/// Geometric classification of a tetrahedron.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TetrahedronKind {
    /// Four affinely independent nodes; has a circumsphere and volume.
    Finite,
    /// Four exactly coplanar nodes; zero volume, no circumsphere.
    Flat,
    /// Slot 0 is the point at infinity; represents a hull face.
    Infinite,
}

/// Node pairs addressed by each edge slot:
/// (0,1)→0, (0,2)→1, (0,3)→2, (1,2)→3, (1,3)→4, (2,3)→5.
const EDGE_PAIRS: [(usize, usize); 6] = [(0, 1), (0, 2), (0, 3), (1, 2), (1, 3), (2, 3)];

/// A maximal cell of the triangulation.
#[derive(Debug)]
pub struct Tetrahedron {
    pub(crate) kind: TetrahedronKind,
    pub(crate) nodes: [Option<NodeKey>; 4],
    pub(crate) triangles: [TriangleKey; 4],
    pub(crate) edges: [Option<EdgeKey>; 6],
    pub(crate) cross_sections: [f64; 6],
    pub(crate) circum_center: Vector3<f64>,
    pub(crate) squared_radius: f64,
    pub(crate) tolerance: f64,
    pub(crate) volume: f64,
}

impl Tetrahedron {
    fn new(kind: TetrahedronKind, nodes: [Option<NodeKey>; 4], triangles: [TriangleKey; 4]) -> Self {
        Self {
            kind,
            nodes,
            triangles,
            edges: [None; 6],
            cross_sections: [0.0; 6],
            circum_center: Vector3::zeros(),
            squared_radius: 0.0,
            tolerance: 1e-7,
            volume: 0.0,
        }
    }

    /// Geometric classification.
    #[must_use]
    pub fn kind(&self) -> TetrahedronKind {
        self.kind
    }

    /// Whether slot 0 is the point at infinity.
    #[must_use]
    pub fn is_infinite(&self) -> bool {
        self.nodes[0].is_none()
    }

    /// Whether the four corners are coplanar.
    #[must_use]
    pub fn is_flat(&self) -> bool {
        self.kind == TetrahedronKind::Flat
    }

    /// The four node slots.
    #[must_use]
    pub fn nodes(&self) -> [Option<NodeKey>; 4] {
        self.nodes
    }

    /// The four triangles; slot *i* lies opposite node *i*.
    #[must_use]
    pub fn triangles(&self) -> [TriangleKey; 4] {
        self.triangles
    }

    /// The six edge slots, by the canonical edge index scheme.
    #[must_use]
    pub fn edges(&self) -> [Option<EdgeKey>; 6] {
        self.edges
    }

    /// Current volume (zero for flat and infinite tetrahedra).
    #[must_use]
    pub fn volume(&self) -> f64 {
        self.volume
    }

    /// Whether `node` is one of the four corners.
    #[must_use]
    pub fn is_adjacent_to(&self, node: NodeKey) -> bool {
        self.nodes.contains(&Some(node))
    }

    /// Slot index of `node`, if adjacent.
    #[must_use]
    pub fn node_index(&self, node: NodeKey) -> Option<usize> {
        self.nodes.iter().position(|&n| n == Some(node))
    }

    /// Slot index of `triangle`, if adjacent.
    #[must_use]
    pub fn triangle_index(&self, triangle: TriangleKey) -> Option<usize> {
        self.triangles.iter().position(|&t| t == triangle)
    }

    /// The triangle opposite `node`.
    #[must_use]
    pub fn opposite_triangle(&self, node: NodeKey) -> Option<TriangleKey> {
        self.node_index(node).map(|i| self.triangles[i])
    }

    /// Edge slot index for the edge between node slots `a` and `b`.
    #[must_use]
    pub(crate) fn edge_slot(a: usize, b: usize) -> usize {
        debug_assert_ne!(a, b);
        a + b - usize::from(a == 0 || b == 0)
    }

    /// The edge between two adjacent nodes.
    #[must_use]
    pub(crate) fn edge_between(&self, a: NodeKey, b: NodeKey) -> Option<EdgeKey> {
        let ia = self.node_index(a)?;
        let ib = self.node_index(b)?;
        self.edges[Self::edge_slot(ia, ib)]
    }

    /// The node slot other than `a` and `b` encountered first in slot
    /// order. `None` means the point at infinity occupies that slot.
    #[must_use]
    pub(crate) fn first_other_node(
        &self,
        a: Option<NodeKey>,
        b: Option<NodeKey>,
    ) -> Option<NodeKey> {
        for &slot in &self.nodes {
            if slot != a && slot != b {
                return slot;
            }
        }
        None
    }

    /// As [`Self::first_other_node`], but searching slots in reverse.
    #[must_use]
    pub(crate) fn second_other_node(
        &self,
        a: Option<NodeKey>,
        b: Option<NodeKey>,
    ) -> Option<NodeKey> {
        for &slot in self.nodes.iter().rev() {
            if slot != a && slot != b {
                return slot;
            }
        }
        None
    }
}

impl<U> Triangulation<U> {
    /// Positions of the four corners; the tetrahedron must be finite or flat.
    pub(crate) fn tetrahedron_positions(&self, tet: TetrahedronKey) -> [Vector3<f64>; 4] {
        let nodes = self.tetrahedra[tet].nodes;
        nodes.map(|n| self.nodes[n.expect("finite tetrahedron expected")].position)
    }

    /// The node opposite `triangle` within `tet`; outer `None` when the
    /// triangle is not a face of `tet`, inner `None` for the infinite slot.
    pub(crate) fn tetrahedron_opposite_node(
        &self,
        tet: TetrahedronKey,
        triangle: TriangleKey,
    ) -> Option<Option<NodeKey>> {
        let t = &self.tetrahedra[tet];
        t.triangle_index(triangle).map(|i| t.nodes[i])
    }

    /// The neighbor across triangle slot `number`.
    pub(crate) fn adjacent_tetrahedron(
        &self,
        tet: TetrahedronKey,
        number: usize,
    ) -> Option<TetrahedronKey> {
        let triangle = self.tetrahedra[tet].triangles[number];
        self.triangles[triangle].opposite_tetrahedron(Some(tet))
    }

    /// Whether the two tetrahedra share a face.
    pub(crate) fn is_neighbor(&self, tet: TetrahedronKey, other: TetrahedronKey) -> bool {
        self.tetrahedra[tet]
            .triangles
            .iter()
            .any(|&t| self.triangles[t].is_adjacent_to_tetrahedron(other))
    }

    /// The face of `tet` shared with `other`, by slot index.
    pub(crate) fn connecting_triangle_number(
        &self,
        tet: TetrahedronKey,
        other: TetrahedronKey,
    ) -> Option<usize> {
        self.tetrahedra[tet]
            .triangles
            .iter()
            .position(|&t| self.triangles[t].is_adjacent_to_tetrahedron(other))
    }

    /// The three faces of `tet` that share an edge with `base`, ordered by
    /// `base`'s node order.
    pub(crate) fn touching_triangles(
        &self,
        tet: TetrahedronKey,
        base: TriangleKey,
    ) -> [TriangleKey; 3] {
        let base_nodes = self.triangles[base].nodes();
        let t = &self.tetrahedra[tet];
        let mut out = [t.triangles[0]; 3];
        for (slot, node) in base_nodes.iter().enumerate() {
            let key = node.expect("finite base triangle expected");
            out[slot] = t
                .opposite_triangle(key)
                .expect("base nodes belong to the tetrahedron");
        }
        out
    }

    /// Builds a tetrahedron from four existing triangles and four nodes with
    /// stated opposition (`triangles[i]` opposite `nodes[i]`).
    ///
    /// An absent node is normalized into slot 0, which keeps the infinite
    /// classification an O(1) slot check. `force_flat` tags the result flat
    /// regardless of the coplanarity test (the flips know the answer).
    pub(crate) fn create_tetrahedron(
        &mut self,
        mut triangles: [TriangleKey; 4],
        mut nodes: [Option<NodeKey>; 4],
        force_flat: bool,
    ) -> TetrahedronKey {
        if let Some(absent) = (1..4).find(|&i| nodes[i].is_none()) {
            nodes.swap(0, absent);
            triangles.swap(0, absent);
        }
        let kind = self.classify(&nodes, force_flat);
        let key = self.tetrahedra.insert(Tetrahedron::new(kind, nodes, triangles));
        for i in 0..4 {
            self.triangles[triangles[i]].add_tetrahedron(key);
            if let Some(node) = nodes[i] {
                self.nodes[node].tetrahedra.push(key);
            }
        }
        self.register_edges(key);
        self.calculate_circumsphere(key);
        key
    }

    /// Builds a tetrahedron from a base triangle and an opposite node,
    /// creating or pairing the three side triangles through the organizer.
    ///
    /// An absent `apex` — or an infinite base triangle — produces an
    /// infinite tetrahedron; in the latter case the finite triangle spanned
    /// by the base's real nodes and the apex becomes the actual base.
    pub(crate) fn create_tetrahedron_from_triangle(
        &mut self,
        base: TriangleKey,
        apex: Option<NodeKey>,
        oto: &mut OpenTriangleOrganizer,
    ) -> TetrahedronKey {
        let (triangle, point) = if self.triangles[base].is_infinite() {
            let base_nodes = self.triangles[base].nodes();
            let a = base_nodes[1];
            let b = base_nodes[2];
            let finite = self.organizer_get_triangle_without_removing(oto, a, b, apex);
            (finite, None)
        } else {
            (base, apex)
        };

        let triangle_nodes = self.triangles[triangle].nodes();
        let nodes = [point, triangle_nodes[0], triangle_nodes[1], triangle_nodes[2]];
        if !self.triangles[triangle].is_completely_open() {
            self.organizer_remove_triangle(oto, triangle);
        }
        let side_1 = self.organizer_get_triangle(oto, point, triangle_nodes[1], triangle_nodes[2]);
        let side_2 = self.organizer_get_triangle(oto, point, triangle_nodes[0], triangle_nodes[2]);
        let side_3 = self.organizer_get_triangle(oto, point, triangle_nodes[0], triangle_nodes[1]);
        let triangles = [triangle, side_1, side_2, side_3];

        let kind = self.classify(&nodes, false);
        let key = self.tetrahedra.insert(Tetrahedron::new(kind, nodes, triangles));
        for t in triangles {
            self.triangles[t].add_tetrahedron(key);
        }
        for node in nodes.into_iter().flatten() {
            self.nodes[node].tetrahedra.push(key);
        }
        self.register_edges(key);
        self.calculate_circumsphere(key);
        key
    }

    fn classify(&self, nodes: &[Option<NodeKey>; 4], force_flat: bool) -> TetrahedronKind {
        if nodes[0].is_none() {
            return TetrahedronKind::Infinite;
        }
        if force_flat {
            return TetrahedronKind::Flat;
        }
        let positions = nodes.map(|n| self.nodes[n.expect("checked above")].position);
        if is_coplanar(&positions) {
            TetrahedronKind::Flat
        } else {
            TetrahedronKind::Finite
        }
    }

    /// Wires the six edge slots: edges already present on finite neighbors
    /// are reused (keeping cross-section accumulation on one object per node
    /// pair), the rest are looked up or created through the endpoint nodes.
    fn register_edges(&mut self, tet: TetrahedronKey) {
        if self.tetrahedra[tet].is_infinite() {
            return;
        }
        let nodes = self.tetrahedra[tet].nodes.map(|n| n.expect("finite tetrahedron"));
        let triangles = self.tetrahedra[tet].triangles;
        let mut edges: [Option<EdgeKey>; 6] = [None; 6];

        for i in 0..4 {
            let Some(neighbor) = self.triangles[triangles[i]].opposite_tetrahedron(Some(tet))
            else {
                continue;
            };
            if self.tetrahedra[neighbor].is_infinite() {
                continue;
            }
            // The neighbor shares the three nodes of face i; adopt its edge
            // objects for every node pair it covers.
            for a in 0..4 {
                if a == i {
                    continue;
                }
                for b in (a + 1)..4 {
                    if b == i {
                        continue;
                    }
                    let slot = Tetrahedron::edge_slot(a, b);
                    if edges[slot].is_none() {
                        edges[slot] =
                            self.tetrahedra[neighbor].edge_between(nodes[a], nodes[b]);
                    }
                }
            }
        }

        for (slot, &(a, b)) in EDGE_PAIRS.iter().enumerate() {
            if edges[slot].is_none() {
                edges[slot] = Some(self.search_edge(nodes[a], nodes[b]));
            }
        }
        for edge in edges.into_iter().flatten() {
            self.edge_add_tetrahedron(edge, tet);
        }
        self.tetrahedra[tet].edges = edges;
    }

    /// Recomputes the circumsphere, volume, tolerance envelope, and
    /// cross-section contributions. Flat and infinite tetrahedra have none.
    pub(crate) fn calculate_circumsphere(&mut self, tet: TetrahedronKey) {
        if self.tetrahedra[tet].kind != TetrahedronKind::Finite {
            return;
        }
        self.compute_circumsphere_center_and_volume(tet);
        self.compute_radius(tet);
    }

    /// Center, volume, and error envelope from the 3-plane solve.
    ///
    /// The tolerance is an upper bound on the absolute error of the squared
    /// radius, accumulated through the normalization, determinant, offset,
    /// and division steps; it scales with the magnitudes of the input
    /// coordinates.
    fn compute_circumsphere_center_and_volume(&mut self, tet: TetrahedronKey) {
        let positions = self.tetrahedron_positions(tet);
        let mut normals = [
            positions[1] - positions[0],
            positions[2] - positions[0],
            positions[3] - positions[0],
        ];
        self.change_volume(tet, det3(&normals).abs() / 6.0);

        let nm = normals.iter().map(|n| n.amax()).fold(0.0_f64, f64::max);
        let mut max_length_2 = 0.0_f64;
        for normal in &mut normals {
            let length_2 = normal.norm_squared();
            max_length_2 = max_length_2.max(length_2);
            *normal /= length_2.sqrt();
        }

        let my_2 = 1e-15;
        let dns_2 = (nm * nm * (1.0 / max_length_2 + 1.0 / (max_length_2 * max_length_2))).max(1.0);
        let ddet_2 = 36.0 * dns_2;
        let pm = positions.iter().map(|p| p.amax()).fold(0.0_f64, f64::max);
        let pm_2 = pm * pm;
        let doff_2 = 6.0 * pm_2 * (dns_2 + 1.0);
        let dscalar_2 = 4.0 * doff_2 + 36.0 * pm_2 * dns_2;

        let det = det3(&normals);
        let offsets = [
            0.5 * normals[0].dot(&(positions[0] + positions[1])),
            0.5 * normals[1].dot(&(positions[0] + positions[2])),
            0.5 * normals[2].dot(&(positions[0] + positions[3])),
        ];
        let center = three_planes_intersection(&normals, offsets, det);

        let t = &mut self.tetrahedra[tet];
        t.circum_center = center;
        if det != 0.0 {
            let ddiv_2 = 3.0 * dscalar_2 / (det * det) + 324.0 * pm_2 * ddet_2 / det.powi(4);
            t.squared_radius = (center - positions[0]).norm_squared();
            t.tolerance = (12.0 * ddiv_2 * t.squared_radius).sqrt() * my_2;
        }
        self.update_cross_section_areas(tet);
    }

    fn compute_radius(&mut self, tet: TetrahedronKey) {
        let positions = self.tetrahedron_positions(tet);
        let t = &mut self.tetrahedra[tet];
        t.squared_radius = (t.circum_center - positions[0]).norm_squared();
    }

    /// Sets the volume, distributing the change in quarters to the corners.
    pub(crate) fn change_volume(&mut self, tet: TetrahedronKey, new_volume: f64) {
        let old = self.tetrahedra[tet].volume;
        let change_per_node = (new_volume - old) / 4.0;
        if change_per_node != 0.0 {
            let nodes = self.tetrahedra[tet].nodes;
            for node in nodes.into_iter().flatten() {
                self.nodes[node].change_volume(change_per_node);
            }
        }
        self.tetrahedra[tet].volume = new_volume;
    }

    fn change_cross_section(&mut self, tet: TetrahedronKey, slot: usize, new_value: f64) {
        let change = new_value - self.tetrahedra[tet].cross_sections[slot];
        if change != 0.0 {
            if let Some(edge) = self.tetrahedra[tet].edges[slot] {
                self.edge_change_cross_section(edge, change);
            }
        }
        self.tetrahedra[tet].cross_sections[slot] = new_value;
    }

    /// Recomputes the per-edge cross-section contributions: for each edge,
    /// the area of the dual polygon piece spanned by the tetrahedron middle,
    /// the edge middle, and the centroids of the two faces flanking the
    /// opposite edge.
    pub(crate) fn update_cross_section_areas(&mut self, tet: TetrahedronKey) {
        if self.tetrahedra[tet].kind != TetrahedronKind::Finite {
            for slot in 0..6 {
                self.change_cross_section(tet, slot, 0.0);
            }
            return;
        }
        let positions = self.tetrahedron_positions(tet);

        let mut line_middles = [Vector3::zeros(); 6];
        let mut line_vectors = [Vector3::zeros(); 6];
        let mut line_counter = 0;
        let mut tetra_middle = Vector3::zeros();
        let mut area_middles = [Vector3::zeros(); 4];
        for j in 0..4 {
            tetra_middle += positions[j];
            for k in (j + 1)..4 {
                line_middles[line_counter] = (positions[j] + positions[k]) * 0.5;
                line_vectors[line_counter] = positions[j] - positions[k];
                line_counter += 1;
            }
            let mut centroid = Vector3::zeros();
            for (k, p) in positions.iter().enumerate() {
                if k != j {
                    centroid += p;
                }
            }
            area_middles[j] = centroid / 3.0;
        }
        tetra_middle *= 0.25;

        // The pair (j, k) determines the cross section of the complementary
        // edge, whose slot index happens to be 5 minus the pair's rank.
        let mut counter = 5;
        for j in 0..4 {
            for k in (j + 1)..4 {
                let diff_1 = line_middles[counter] - tetra_middle;
                let diff_2 = area_middles[j] - area_middles[k];
                let cross = diff_1.cross(&diff_2);
                let new_cross_section =
                    (cross.dot(&line_vectors[counter]) / line_vectors[counter].norm()).abs();
                self.change_cross_section(tet, counter, new_cross_section);
                counter = counter.wrapping_sub(1);
            }
        }
    }

    /// Re-derives the finite/flat classification after a corner moved.
    fn reclassify_tetrahedron(&mut self, tet: TetrahedronKey) {
        if self.tetrahedra[tet].is_infinite() {
            return;
        }
        let positions = self.tetrahedron_positions(tet);
        let coplanar = is_coplanar(&positions);
        match (self.tetrahedra[tet].kind, coplanar) {
            (TetrahedronKind::Finite, true) => {
                self.tetrahedra[tet].kind = TetrahedronKind::Flat;
                self.change_volume(tet, 0.0);
                self.update_cross_section_areas(tet);
            }
            (TetrahedronKind::Flat, false) => {
                self.tetrahedra[tet].kind = TetrahedronKind::Finite;
            }
            _ => {}
        }
    }

    /// Refreshes the cached circumsphere after `moved` changed position and
    /// invalidates the plane caches of every face that contains it.
    pub(crate) fn update_circumsphere_after_node_movement(
        &mut self,
        tet: TetrahedronKey,
        moved: NodeKey,
    ) {
        self.reclassify_tetrahedron(tet);
        self.calculate_circumsphere(tet);
        let nodes = self.tetrahedra[tet].nodes;
        let triangles = self.tetrahedra[tet].triangles;
        for i in 0..4 {
            if nodes[i] != Some(moved) {
                self.triangles[triangles[i]].mark_geometry_dirty();
            }
        }
    }

    /// Signed position of `point` relative to the circumsphere: +1 strictly
    /// inside, 0 on the sphere, −1 outside.
    ///
    /// Finite tetrahedra compare squared distances under the cached error
    /// envelope and fall back to the exact predicate inside it. For an
    /// infinite tetrahedron the "sphere" is the outer open half space of its
    /// hull face (with the face's circumcircle deciding in-plane queries);
    /// for a flat tetrahedron, off-plane points are outside and in-plane
    /// points are tested against the facet circumcircles.
    pub fn circumsphere_orientation(&mut self, tet: TetrahedronKey, point: Vector3<f64>) -> i32 {
        match self.tetrahedra[tet].kind {
            TetrahedronKind::Infinite => self.infinite_orientation(tet, point),
            TetrahedronKind::Flat => self.flat_orientation(tet, point),
            TetrahedronKind::Finite => {
                let t = &self.tetrahedra[tet];
                let squared_distance = (t.circum_center - point).norm_squared();
                if squared_distance > t.squared_radius + t.tolerance {
                    return -1;
                }
                if squared_distance < t.squared_radius - t.tolerance {
                    return 1;
                }
                let leaned_inside = squared_distance < t.squared_radius;
                let result = self.orientation_exact(tet, point);
                if result != 0 && ((result == 1) ^ leaned_inside) {
                    // The cached sphere leaned the wrong way; refresh it.
                    self.calculate_circumsphere(tet);
                }
                result
            }
        }
    }

    /// Exact in-sphere decision from the current corner positions.
    fn orientation_exact(&mut self, tet: TetrahedronKey, point: Vector3<f64>) -> i32 {
        self.stats.exact_predicate_calls += 1;
        let positions = self.tetrahedron_positions(tet);
        insphere_exact(&positions, point)
    }

    fn infinite_orientation(&mut self, tet: TetrahedronKey, point: Vector3<f64>) -> i32 {
        let base = self.tetrahedra[tet].triangles[0];
        let inner = self.triangles[base].opposite_tetrahedron(Some(tet));
        self.triangle_update_plane(base);
        let orientation = match inner {
            Some(inner_tet) if self.tetrahedra[inner_tet].is_infinite() => return 1,
            // A flat (or vacated) interior has no side to compare against:
            // both half spaces border the degenerate hull, so the hull cell
            // claims nothing. Points near flat regions reconnect through
            // flat tetrahedra instead of growing a cavity past the hull.
            Some(inner_tet) if self.tetrahedra[inner_tet].is_flat() => return -1,
            None => return -1,
            Some(inner_tet) => {
                let opposite = self
                    .tetrahedron_opposite_node(inner_tet, base)
                    .flatten()
                    .expect("finite inner tetrahedron has a real apex");
                let position = self.nodes[opposite].position;
                self.triangle_orientation(base, position, point)
            }
        };
        if orientation == 0 {
            self.triangle_circle_orientation(base, point)
        } else {
            -orientation
        }
    }

    fn flat_orientation(&mut self, tet: TetrahedronKey, point: Vector3<f64>) -> i32 {
        let triangles = self.tetrahedra[tet].triangles;
        self.triangle_update_plane(triangles[0]);
        if self.triangle_orientation(triangles[0], point, point) != 0 {
            return -1;
        }
        let mut memory = -1;
        for triangle in triangles {
            match self.triangle_circle_orientation(triangle, point) {
                1 => return 1,
                0 => memory = 0,
                _ => {}
            }
        }
        memory
    }

    /// Strict in-sphere test.
    pub(crate) fn is_truly_inside_sphere(&mut self, tet: TetrahedronKey, point: Vector3<f64>) -> bool {
        self.circumsphere_orientation(tet, point) > 0
    }

    /// Non-strict in-sphere test (on-sphere counts as inside).
    pub(crate) fn is_inside_sphere(&mut self, tet: TetrahedronKey, point: Vector3<f64>) -> bool {
        self.circumsphere_orientation(tet, point) >= 0
    }

    /// One step of the visibility walk toward `coordinate`.
    ///
    /// Visits the faces in the order given by `triangle_order`; the first
    /// face that strictly separates `coordinate` from its opposite node is
    /// crossed. Returning the same key means the coordinate lies in this
    /// tetrahedron.
    ///
    /// # Errors
    ///
    /// [`TriangulationError::PositionNotAllowed`] if `coordinate` coincides
    /// exactly with one of the corners of the final tetrahedron.
    pub(crate) fn walk_to_point(
        &mut self,
        tet: TetrahedronKey,
        coordinate: Vector3<f64>,
        triangle_order: [usize; 4],
    ) -> Result<TetrahedronKey, TriangulationError> {
        if self.tetrahedra[tet].is_infinite() {
            if !self.is_inside_sphere(tet, coordinate) {
                let base = self.tetrahedra[tet].triangles[0];
                if let Some(next) = self.triangles[base].opposite_tetrahedron(Some(tet)) {
                    return Ok(next);
                }
            }
            self.test_position(tet, coordinate)?;
            return Ok(tet);
        }
        for position in triangle_order {
            let triangle = self.tetrahedra[tet].triangles[position];
            let node = self.tetrahedra[tet].nodes[position].expect("finite tetrahedron");
            let node_position = self.nodes[node].position;
            let orientation = self.triangle_orientation(triangle, node_position, coordinate);
            if orientation < 0 {
                if let Some(next) = self.triangles[triangle].opposite_tetrahedron(Some(tet)) {
                    return Ok(next);
                }
            } else if orientation == 0 {
                let opposite = self.triangles[triangle].opposite_tetrahedron(Some(tet));
                if let Some(opposite) = opposite {
                    if self.tetrahedra[opposite].is_infinite()
                        && self.is_truly_inside_sphere(tet, coordinate)
                    {
                        self.test_position(tet, coordinate)?;
                        return Ok(opposite);
                    }
                }
            }
        }
        self.test_position(tet, coordinate)?;
        Ok(tet)
    }

    /// Whether `point` keeps the union with this tetrahedron convex when
    /// glued across face `connecting_triangle_number`: +1 convex, 0 on a
    /// face plane, −1 reflex. Infinite tetrahedra are never in convex
    /// position; flat ones answer by plane membership.
    pub(crate) fn is_in_convex_position(
        &mut self,
        tet: TetrahedronKey,
        point: Vector3<f64>,
        connecting_triangle_number: usize,
    ) -> i32 {
        match self.tetrahedra[tet].kind {
            TetrahedronKind::Infinite => -1,
            TetrahedronKind::Flat => {
                let base = self.tetrahedra[tet].triangles[0];
                self.triangle_update_plane(base);
                if self.triangle_orientation(base, point, point) == 0 {
                    0
                } else {
                    -1
                }
            }
            TetrahedronKind::Finite => {
                let mut result = 1;
                for i in 0..4 {
                    if i == connecting_triangle_number {
                        continue;
                    }
                    let triangle = self.tetrahedra[tet].triangles[i];
                    let node = self.tetrahedra[tet].nodes[i].expect("finite tetrahedron");
                    let position = self.nodes[node].position;
                    let current = self.triangle_orientation(triangle, position, point);
                    if current < 0 {
                        return -1;
                    }
                    result *= current;
                }
                result
            }
        }
    }

    /// Rejects coordinates that exactly coincide with a corner.
    pub(crate) fn test_position(
        &self,
        tet: TetrahedronKey,
        position: Vector3<f64>,
    ) -> Result<(), TriangulationError> {
        for node in self.tetrahedra[tet].nodes.into_iter().flatten() {
            if self.nodes[node].position == position {
                return Err(TriangulationError::PositionNotAllowed {
                    position: position.into(),
                });
            }
        }
        Ok(())
    }

    /// Tears a tetrahedron down: returns its dual-volume and cross-section
    /// contributions, detaches from nodes, triangles, and edges, and leaves
    /// the arena. Removal of geometry is always initiated here; triangles
    /// and edges that lose their last holder follow automatically.
    pub(crate) fn remove_tetrahedron(&mut self, tet: TetrahedronKey) {
        let Some(t) = self.tetrahedra.get(tet) else {
            return;
        };
        let nodes = t.nodes;
        let triangles = t.triangles;
        let edges = t.edges;
        let cross_sections = t.cross_sections;
        let volume = t.volume;
        let infinite = t.is_infinite();

        for i in 0..4 {
            if let Some(node) = nodes[i] {
                self.nodes[node].change_volume(-volume / 4.0);
                remove_first(&mut self.nodes[node].tetrahedra, &tet);
            }
            let opposite = self.triangles[triangles[i]].opposite_tetrahedron(Some(tet));
            if let Some(opposite) = opposite {
                if !infinite && self.tetrahedra[opposite].is_infinite() {
                    // Keep the hull face oriented toward the interior node
                    // it is about to lose.
                    let position = self.nodes[nodes[i].expect("finite tetrahedron")].position;
                    self.triangle_orient_to_side(triangles[i], position);
                }
            }
            self.triangles[triangles[i]].remove_tetrahedron(tet);
            self.discard_triangle_if_orphaned(triangles[i]);
        }
        for slot in 0..6 {
            if let Some(edge) = edges[slot] {
                self.edge_change_cross_section(edge, -cross_sections[slot]);
                self.edge_remove_tetrahedron(edge, tet);
            }
        }
        self.tetrahedra.remove(tet);
    }

    /// Swaps one face of `tet` for an equal-span replacement (used when a
    /// flat pair between two neighbors collapses), adopting the edge objects
    /// of the tetrahedron on the far side of the new face.
    pub(crate) fn replace_triangle(
        &mut self,
        tet: TetrahedronKey,
        old_triangle: TriangleKey,
        new_triangle: TriangleKey,
    ) {
        self.triangles[new_triangle].add_tetrahedron(tet);
        let other = self.triangles[new_triangle]
            .opposite_tetrahedron(Some(tet))
            .expect("replacement triangle carries the far neighbor");
        let triangle_number = self.tetrahedra[tet]
            .triangle_index(old_triangle)
            .expect("old triangle is a face of the tetrahedron");

        let nodes = self.tetrahedra[tet].nodes;
        let mut position = (triangle_number + 2) % 4;
        let mut last_position = (triangle_number + 1) % 4;
        for _ in 0..3 {
            let edge_number = Tetrahedron::edge_slot(last_position, position);
            let a = nodes[last_position].expect("shared face nodes are real");
            let b = nodes[position].expect("shared face nodes are real");
            let other_edge = self.tetrahedra[other]
                .edge_between(a, b)
                .expect("far neighbor spans the shared nodes");
            if self.tetrahedra[tet].edges[edge_number] != Some(other_edge) {
                if let Some(old_edge) = self.tetrahedra[tet].edges[edge_number] {
                    self.edge_remove_tetrahedron(old_edge, tet);
                }
                self.edge_add_tetrahedron(other_edge, tet);
                self.tetrahedra[tet].edges[edge_number] = Some(other_edge);
            }
            last_position = position;
            position = (position + 1) % 4;
            if position == triangle_number {
                position = (position + 1) % 4;
            }
        }
        self.tetrahedra[tet].triangles[triangle_number] = new_triangle;
        self.triangles[new_triangle].reset_check();
        self.triangles[old_triangle].remove_tetrahedron(tet);
        self.discard_triangle_if_orphaned(old_triangle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_scaled_tetrahedron() -> (Triangulation<()>, TetrahedronKey) {
        let mut tri: Triangulation<()> = Triangulation::default();
        let a = tri.insert_first_node([0.0, 0.0, 0.0], ());
        let b = tri.insert_near(a, [2.0, 0.0, 0.0], ()).unwrap();
        let _ = tri.insert_near(b, [0.0, 2.0, 0.0], ()).unwrap();
        let _ = tri.insert_near(a, [0.0, 0.0, 2.0], ()).unwrap();
        let tet = tri
            .tetrahedron_keys()
            .find(|&t| !tri.tetrahedron(t).unwrap().is_infinite())
            .unwrap();
        (tri, tet)
    }

    #[test]
    fn edge_slot_scheme() {
        assert_eq!(Tetrahedron::edge_slot(0, 1), 0);
        assert_eq!(Tetrahedron::edge_slot(0, 2), 1);
        assert_eq!(Tetrahedron::edge_slot(0, 3), 2);
        assert_eq!(Tetrahedron::edge_slot(1, 2), 3);
        assert_eq!(Tetrahedron::edge_slot(1, 3), 4);
        assert_eq!(Tetrahedron::edge_slot(2, 3), 5);
        assert_eq!(Tetrahedron::edge_slot(3, 2), 5);
    }

    #[test]
    fn circumsphere_of_scaled_unit_tetrahedron() {
        let (tri, tet) = unit_scaled_tetrahedron();
        let t = tri.tetrahedron(tet).unwrap();
        assert_relative_eq!(t.circum_center, Vector3::new(1.0, 1.0, 1.0), epsilon = 1e-12);
        assert_relative_eq!(t.squared_radius, 3.0, epsilon = 1e-12);
        assert_relative_eq!(t.volume(), 8.0 / 6.0, epsilon = 1e-12);
        assert!(t.tolerance > 0.0);
    }

    #[test]
    fn orientation_inside_outside_and_on_sphere() {
        let (mut tri, tet) = unit_scaled_tetrahedron();
        assert_eq!(
            tri.circumsphere_orientation(tet, Vector3::new(1.0, 1.0, 1.0)),
            1
        );
        assert_eq!(
            tri.circumsphere_orientation(tet, Vector3::new(9.0, 9.0, 9.0)),
            -1
        );
        // Exactly on the sphere: must go through the exact predicate and
        // answer 0, on every call.
        let before = tri.stats().exact_predicate_calls;
        for _ in 0..4 {
            assert_eq!(
                tri.circumsphere_orientation(tet, Vector3::new(2.0, 2.0, 0.0)),
                0
            );
        }
        assert!(tri.stats().exact_predicate_calls >= before + 4);
    }

    #[test]
    fn cross_sections_sum_onto_edges() {
        let (tri, tet) = unit_scaled_tetrahedron();
        let t = tri.tetrahedron(tet).unwrap();
        for slot in 0..6 {
            let edge = t.edges()[slot].unwrap();
            assert_relative_eq!(
                tri.edge(edge).unwrap().cross_section_area(),
                t.cross_sections[slot],
                epsilon = 1e-12
            );
            assert!(t.cross_sections[slot] > 0.0);
        }
    }

    #[test]
    fn walk_finds_containing_tetrahedron() {
        let mut tri: Triangulation<()> = Triangulation::default();
        let a = tri.insert_first_node([0.0, 0.0, 0.0], ());
        let b = tri.insert_near(a, [2.0, 0.0, 0.0], ()).unwrap();
        let _ = tri.insert_near(b, [0.0, 2.0, 0.0], ()).unwrap();
        let _ = tri.insert_near(a, [0.0, 0.0, 2.0], ()).unwrap();
        let e = tri.insert_near(a, [0.3, 0.3, 0.3], ()).unwrap();
        // Walk from every tetrahedron toward a point near one corner; the
        // walk must terminate on a tetrahedron containing it.
        let target = Vector3::new(0.05, 0.05, 0.05);
        let start = tri.node(e).unwrap().tetrahedra()[0];
        let mut current = start;
        for _ in 0..32 {
            let next = tri.walk_to_point(current, target, [0, 1, 2, 3]).unwrap();
            if next == current {
                break;
            }
            current = next;
        }
        assert!(!tri.tetrahedron(current).unwrap().is_infinite());
    }

    #[test]
    fn volume_distributes_to_nodes() {
        let (tri, tet) = unit_scaled_tetrahedron();
        let t = tri.tetrahedron(tet).unwrap();
        let volume = t.volume();
        for node in t.nodes().into_iter().flatten() {
            assert_relative_eq!(tri.node(node).unwrap().volume(), volume / 4.0, epsilon = 1e-12);
        }
    }
}
