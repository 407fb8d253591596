//! The triangulation session: arenas, counters, listeners, and the public
//! mutation and query API.

use nalgebra::Vector3;
use slotmap::{new_key_type, SlotMap};
use tracing::debug;

use crate::core::edge::Edge;
use crate::core::error::TriangulationError;
use crate::core::listener::{MovementListener, RandomTriangleOrder, TriangleOrderSource};
use crate::core::node::SpaceNode;
use crate::core::organizer::OpenTriangleOrganizer;
use crate::core::tetrahedron::Tetrahedron;
use crate::core::triangle::Triangle;

new_key_type! {
    /// Stable key of a [`SpaceNode`] in the session's node arena.
    pub struct NodeKey;
}

new_key_type! {
    /// Stable key of an [`Edge`] in the session's edge arena.
    pub struct EdgeKey;
}

new_key_type! {
    /// Stable key of a [`Triangle`] in the session's triangle arena.
    pub struct TriangleKey;
}

new_key_type! {
    /// Stable key of a [`Tetrahedron`] in the session's tetrahedron arena.
    pub struct TetrahedronKey;
}

/// Counters describing the work done by mutation operations since the last
/// reset: flips, cleanup episodes, restoration sweeps, and how often a
/// predicate had to fall back to exact arithmetic.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RestorationStats {
    /// Completed 2→3 flips.
    pub flips_2_to_3: usize,
    /// Completed 3→2 flips.
    pub flips_3_to_2: usize,
    /// Completed flat-pair removals.
    pub flat_pair_removals: usize,
    /// Sweeps of the Delaunay restoration loop.
    pub restoration_passes: usize,
    /// Cleanup (carve and re-wrap) episodes.
    pub cleanup_runs: usize,
    /// Predicate evaluations that fell into their float tolerance envelope
    /// and were settled exactly.
    pub exact_predicate_calls: usize,
}

/// A dynamic 3D Delaunay tetrahedralization over nodes carrying opaque user
/// objects of type `U`.
///
/// All mutation enters through [`Triangulation::insert_first_node`],
/// [`Triangulation::insert_near`], [`Triangulation::move_node_to`],
/// [`Triangulation::move_node_by`], and [`Triangulation::remove`]. The
/// session is strictly single-threaded and its mutation methods are not
/// reentrant; movement listeners run synchronously inside the mutating call.
pub struct Triangulation<U> {
    pub(crate) nodes: SlotMap<NodeKey, SpaceNode<U>>,
    pub(crate) edges: SlotMap<EdgeKey, Edge>,
    pub(crate) triangles: SlotMap<TriangleKey, Triangle>,
    pub(crate) tetrahedra: SlotMap<TetrahedronKey, Tetrahedron>,
    pub(crate) stats: RestorationStats,
    pub(crate) order_source: Box<dyn TriangleOrderSource>,
    listeners: Vec<Box<dyn MovementListener<U>>>,
    next_node_id: u64,
    checking_index: i64,
}

impl<U> Default for Triangulation<U> {
    fn default() -> Self {
        Self::new(Box::new(RandomTriangleOrder::new()))
    }
}

impl<U> std::fmt::Debug for Triangulation<U> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Triangulation")
            .field("nodes", &self.nodes.len())
            .field("edges", &self.edges.len())
            .field("triangles", &self.triangles.len())
            .field("tetrahedra", &self.tetrahedra.len())
            .field("checking_index", &self.checking_index)
            .finish_non_exhaustive()
    }
}

impl<U> Triangulation<U> {
    /// Limit of the session-global checking index; the counter wraps here.
    /// A single restoration pass never comes close, which the stamp logic
    /// asserts in debug builds.
    pub const CHECKING_INDEX_MODULUS: i64 = 2_000_000_000;

    /// Creates an empty triangulation with the given triangle-order source.
    ///
    /// The source randomizes the visibility walk; inject
    /// [`crate::core::listener::SequentialTriangleOrder`] or a seeded
    /// [`RandomTriangleOrder`] for deterministic replay.
    #[must_use]
    pub fn new(order_source: Box<dyn TriangleOrderSource>) -> Self {
        Self {
            nodes: SlotMap::with_key(),
            edges: SlotMap::with_key(),
            triangles: SlotMap::with_key(),
            tetrahedra: SlotMap::with_key(),
            stats: RestorationStats::default(),
            order_source,
            listeners: Vec::new(),
            next_node_id: 0,
            checking_index: 0,
        }
    }

    /// Registers a movement listener; callbacks fire synchronously inside
    /// every mutating call, in registration order.
    pub fn add_listener(&mut self, listener: Box<dyn MovementListener<U>>) {
        self.listeners.push(listener);
    }

    pub(crate) fn notify<F>(&mut self, mut event: F)
    where
        F: FnMut(&mut dyn MovementListener<U>, &Self),
    {
        if self.listeners.is_empty() {
            return;
        }
        let mut listeners = std::mem::take(&mut self.listeners);
        for listener in &mut listeners {
            event(listener.as_mut(), self);
        }
        self.listeners = listeners;
    }

    fn register_node(&mut self, position: Vector3<f64>, user_data: U) -> NodeKey {
        let id = self.next_node_id;
        self.next_node_id += 1;
        self.nodes.insert(SpaceNode::new(id, position, user_data))
    }

    /// Registers the very first node of the session.
    ///
    /// No geometry exists yet; subsequent nodes go through
    /// [`Triangulation::insert_near`], which builds bootstrap edges between
    /// the first three nodes and assembles the initial tetrahedron (one
    /// finite plus four infinite) when the fourth arrives.
    pub fn insert_first_node(&mut self, position: impl Into<Vector3<f64>>, user_data: U) -> NodeKey {
        self.register_node(position.into(), user_data)
    }

    /// Creates and inserts a new node adjacent to `anchor`.
    ///
    /// Before four nodes exist this maintains the bootstrap edge structure;
    /// afterwards it performs a full cavity insertion starting the walk from
    /// one of the anchor's tetrahedra. Returns the new node's key.
    ///
    /// # Errors
    ///
    /// [`TriangulationError::UnknownNode`] for a stale anchor;
    /// [`TriangulationError::PositionNotAllowed`] if the position coincides
    /// with an existing node (nothing is modified).
    pub fn insert_near(
        &mut self,
        anchor: NodeKey,
        position: impl Into<Vector3<f64>>,
        user_data: U,
    ) -> Result<NodeKey, TriangulationError> {
        let position = position.into();
        if !self.nodes.contains_key(anchor) {
            return Err(TriangulationError::UnknownNode);
        }
        if self.nodes[anchor].tetrahedra.is_empty() {
            for node in self.nodes.values() {
                if node.position == position {
                    return Err(TriangulationError::PositionNotAllowed {
                        position: position.into(),
                    });
                }
            }
            let node = self.register_node(position, user_data);
            if self.nodes[anchor].edges.len() == 2 {
                // Four nodes collected: dissolve the bootstrap edges and
                // build the first tetrahedron.
                let first_edge = self.nodes[anchor].edges[0];
                let second_edge = self.nodes[anchor].edges[1];
                let a = self.edges[first_edge].opposite(anchor)?;
                let b = self.edges[second_edge].opposite(anchor)?;
                let mut doomed: Vec<EdgeKey> = Vec::new();
                for endpoint in [anchor, a, b] {
                    for &edge in &self.nodes[endpoint].edges {
                        if !doomed.contains(&edge) {
                            doomed.push(edge);
                        }
                    }
                }
                for edge in doomed {
                    let (x, y) = self.edges[edge].endpoints();
                    for endpoint in [x, y] {
                        crate::core::collections::remove_first(
                            &mut self.nodes[endpoint].edges,
                            &edge,
                        );
                    }
                    self.edges.remove(edge);
                }
                let mut oto = OpenTriangleOrganizer::new();
                self.create_initial_tetrahedron(anchor, node, a, b, &mut oto);
                debug!("initial tetrahedron assembled");
            } else {
                let prior = self.nodes[anchor].edges.first().copied();
                self.create_edge(anchor, node);
                if let Some(prior_edge) = prior {
                    let other = self.edges[prior_edge].opposite(anchor)?;
                    self.create_edge(other, node);
                }
            }
            Ok(node)
        } else {
            let start = self.nodes[anchor].tetrahedra[0];
            let node = self.register_node(position, user_data);
            match self.insert_node(node, start) {
                Ok(_) => Ok(node),
                Err(error) => {
                    self.nodes.remove(node);
                    Err(error)
                }
            }
        }
    }

    /// Builds one finite tetrahedron over the four nodes, plus the four
    /// infinite tetrahedra that close the hull around it.
    pub(crate) fn create_initial_tetrahedron(
        &mut self,
        a: NodeKey,
        b: NodeKey,
        c: NodeKey,
        d: NodeKey,
        oto: &mut OpenTriangleOrganizer,
    ) -> TetrahedronKey {
        let triangle_a = self.create_triangle(Some(b), Some(c), Some(d));
        let triangle_b = self.create_triangle(Some(a), Some(c), Some(d));
        let triangle_c = self.create_triangle(Some(a), Some(b), Some(d));
        let triangle_d = self.create_triangle(Some(a), Some(b), Some(c));
        let ret = self.create_tetrahedron(
            [triangle_a, triangle_b, triangle_c, triangle_d],
            [Some(a), Some(b), Some(c), Some(d)],
            false,
        );
        for triangle in [triangle_a, triangle_b, triangle_c, triangle_d] {
            self.create_tetrahedron_from_triangle(triangle, None, oto);
        }
        ret
    }

    /// Moves a node to `new_position`, restoring the Delaunay property.
    ///
    /// When every incident tetrahedron keeps its orientation (the node does
    /// not cross any opposite face plane), the position is updated in place
    /// and flips repair the neighborhood. Otherwise the node is removed and
    /// re-inserted at the new position.
    ///
    /// Listeners always receive `node_about_to_move` (with the delta, which
    /// may be zero) and, on the fast path, `node_moved` after the flips.
    ///
    /// # Errors
    ///
    /// [`TriangulationError::PositionNotAllowed`] if the target coincides
    /// with an existing node — the previous position is restored;
    /// [`TriangulationError::InvariantViolated`] if restoration fails.
    pub fn move_node_to(
        &mut self,
        node: NodeKey,
        new_position: Vector3<f64>,
    ) -> Result<(), TriangulationError> {
        if !self.nodes.contains_key(node) {
            return Err(TriangulationError::UnknownNode);
        }
        if self.locally_valid_after_move(node, new_position)? {
            let delta = new_position - self.nodes[node].position;
            self.notify(|listener, tri| listener.node_about_to_move(tri, node, delta));
            self.nodes[node].position = new_position;
            self.restore_delaunay(node)?;
            self.notify(|listener, tri| listener.node_moved(tri, node));
            Ok(())
        } else {
            let start = self.nodes[node].tetrahedra[0];
            let insertion_hint = self.search_insertion_tetrahedron(start, new_position)?;
            let created = self.remove_node_geometry(node)?;
            let target = if self.tetrahedra.contains_key(insertion_hint) {
                insertion_hint
            } else {
                created.ok_or_else(|| TriangulationError::InvariantViolated {
                    detail: "no insertion tetrahedron after node removal".into(),
                })?
            };
            let old_position = self.nodes[node].position;
            self.nodes[node].position = new_position;
            match self.insert_node(node, target) {
                Ok(_) => Ok(()),
                Err(error @ TriangulationError::PositionNotAllowed { .. }) => {
                    // Put the node back where it came from.
                    self.nodes[node].position = old_position;
                    self.insert_node(node, target)?;
                    Err(error)
                }
                Err(error) => Err(error),
            }
        }
    }

    /// Moves a node by `delta`. See [`Triangulation::move_node_to`].
    ///
    /// # Errors
    ///
    /// As [`Triangulation::move_node_to`].
    pub fn move_node_by(
        &mut self,
        node: NodeKey,
        delta: Vector3<f64>,
    ) -> Result<(), TriangulationError> {
        let position = self
            .nodes
            .get(node)
            .ok_or(TriangulationError::UnknownNode)?
            .position;
        self.move_node_to(node, position + delta)
    }

    /// Whether the triangulation stays orientation-consistent if `node`
    /// moves to `new_position` without re-triangulation: the node must stay
    /// strictly on its current side of every opposite face. A node of the
    /// lone finite tetrahedron (all hull) may move freely.
    fn locally_valid_after_move(
        &mut self,
        node: NodeKey,
        new_position: Vector3<f64>,
    ) -> Result<bool, TriangulationError> {
        let current_position = self.nodes[node].position;
        let incident: Vec<TetrahedronKey> = self.nodes[node].tetrahedra.to_vec();
        for tet in incident {
            if self.tetrahedra[tet].is_flat() {
                return Ok(false);
            }
            if self.tetrahedra[tet].is_infinite() {
                let Some(inner) = self.adjacent_tetrahedron(tet, 0) else {
                    return Ok(false);
                };
                let all_infinite = (0..4).all(|i| {
                    self.adjacent_tetrahedron(inner, i)
                        .is_some_and(|neighbor| self.tetrahedra[neighbor].is_infinite())
                });
                return Ok(all_infinite);
            }
            let triangle = self.tetrahedra[tet]
                .opposite_triangle(node)
                .expect("incident tetrahedron has the node");
            self.triangle_update_plane(triangle);
            if self.triangle_orientation(triangle, current_position, new_position) <= 0 {
                self.test_position(tet, new_position)?;
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Allocates a checking index for one restoration pass.
    pub(crate) fn create_new_checking_index(&mut self) -> i64 {
        self.checking_index = (self.checking_index + 1) % Self::CHECKING_INDEX_MODULUS;
        self.checking_index
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// The node behind a key.
    #[must_use]
    pub fn node(&self, key: NodeKey) -> Option<&SpaceNode<U>> {
        self.nodes.get(key)
    }

    /// The edge behind a key.
    #[must_use]
    pub fn edge(&self, key: EdgeKey) -> Option<&Edge> {
        self.edges.get(key)
    }

    /// The triangle behind a key.
    #[must_use]
    pub fn triangle(&self, key: TriangleKey) -> Option<&Triangle> {
        self.triangles.get(key)
    }

    /// The tetrahedron behind a key.
    #[must_use]
    pub fn tetrahedron(&self, key: TetrahedronKey) -> Option<&Tetrahedron> {
        self.tetrahedra.get(key)
    }

    /// The opaque user object attached to a node.
    #[must_use]
    pub fn user_object(&self, node: NodeKey) -> Option<&U> {
        self.nodes.get(node).map(|n| &n.user_data)
    }

    /// Mutable access to a node's user object.
    pub fn user_object_mut(&mut self, node: NodeKey) -> Option<&mut U> {
        self.nodes.get_mut(node).map(|n| &mut n.user_data)
    }

    /// User objects of all nodes connected to `node` by an edge.
    #[must_use]
    pub fn neighbors(&self, node: NodeKey) -> Vec<&U> {
        self.neighbor_keys(node)
            .into_iter()
            .map(|key| &self.nodes[key].user_data)
            .collect()
    }

    /// Keys of all nodes connected to `node` by an edge.
    #[must_use]
    pub fn neighbor_keys(&self, node: NodeKey) -> Vec<NodeKey> {
        let Some(n) = self.nodes.get(node) else {
            return Vec::new();
        };
        n.edges
            .iter()
            .filter_map(|&edge| self.edges[edge].opposite(node).ok())
            .collect()
    }

    /// Walks from `from`'s neighborhood to the finite tetrahedron containing
    /// `position` and returns the user objects of its four corners. `None`
    /// when the position lies outside the hull, coincides with a node, or no
    /// geometry exists yet.
    pub fn vertices_of_tetrahedron_containing(
        &mut self,
        from: NodeKey,
        position: impl Into<Vector3<f64>>,
    ) -> Option<[&U; 4]> {
        let position = position.into();
        let start = self.nodes.get(from)?.tetrahedra.first().copied()?;
        let mut current = start;
        if self.tetrahedra[current].is_infinite() {
            let base = self.tetrahedra[current].triangles[0];
            current = self.triangles[base].opposite_tetrahedron(Some(current))?;
        }
        let mut last: Option<TetrahedronKey> = None;
        while last != Some(current) && !self.tetrahedra[current].is_infinite() {
            last = Some(current);
            let order = self.order_source.generate();
            match self.walk_to_point(current, position, order) {
                Ok(next) => current = next,
                Err(_) => break,
            }
        }
        if self.tetrahedra[current].is_infinite() {
            return None;
        }
        let nodes = self.tetrahedra[current].nodes;
        Some(nodes.map(|slot| &self.nodes[slot.expect("finite tetrahedron")].user_data))
    }

    /// Suggests a less crowded position for a node whose intended position
    /// was rejected: half the distance to its nearest neighbor, away from
    /// its farthest one.
    #[must_use]
    pub fn propose_new_position(&self, node: NodeKey) -> Option<Vector3<f64>> {
        let n = self.nodes.get(node)?;
        let mut min_distance = f64::MAX;
        let mut max_distance = f64::MIN;
        let mut farthest_away: Option<Vector3<f64>> = None;
        for &edge in &n.edges {
            let other = self.edges[edge].opposite(node).ok()?;
            let difference = self.nodes[other].position - n.position;
            let distance = difference.norm_squared();
            min_distance = min_distance.min(distance);
            if distance > max_distance {
                max_distance = distance;
                farthest_away = Some(difference);
            }
        }
        let direction = farthest_away?.normalize();
        Some(n.position + direction * (min_distance.sqrt() * 0.5))
    }

    /// Number of registered nodes.
    #[must_use]
    pub fn number_of_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Number of live edges.
    #[must_use]
    pub fn number_of_edges(&self) -> usize {
        self.edges.len()
    }

    /// Number of live triangles, infinite ones included.
    #[must_use]
    pub fn number_of_triangles(&self) -> usize {
        self.triangles.len()
    }

    /// Number of finite triangles.
    #[must_use]
    pub fn number_of_finite_triangles(&self) -> usize {
        self.triangles.values().filter(|t| !t.is_infinite()).count()
    }

    /// Number of live tetrahedra, infinite ones included.
    #[must_use]
    pub fn number_of_tetrahedra(&self) -> usize {
        self.tetrahedra.len()
    }

    /// Number of finite (non-hull) tetrahedra, flat ones included.
    #[must_use]
    pub fn number_of_finite_tetrahedra(&self) -> usize {
        self.tetrahedra.values().filter(|t| !t.is_infinite()).count()
    }

    /// Number of flat tetrahedra.
    #[must_use]
    pub fn number_of_flat_tetrahedra(&self) -> usize {
        self.tetrahedra.values().filter(|t| t.is_flat()).count()
    }

    /// Total volume covered by finite tetrahedra; equals the convex hull
    /// volume of the finite nodes.
    #[must_use]
    pub fn total_volume(&self) -> f64 {
        self.tetrahedra.values().map(Tetrahedron::volume).sum()
    }

    /// Iterator over all node keys.
    pub fn node_keys(&self) -> impl Iterator<Item = NodeKey> + '_ {
        self.nodes.keys()
    }

    /// Iterator over all edge keys.
    pub fn edge_keys(&self) -> impl Iterator<Item = EdgeKey> + '_ {
        self.edges.keys()
    }

    /// Iterator over all triangle keys.
    pub fn triangle_keys(&self) -> impl Iterator<Item = TriangleKey> + '_ {
        self.triangles.keys()
    }

    /// Iterator over all tetrahedron keys.
    pub fn tetrahedron_keys(&self) -> impl Iterator<Item = TetrahedronKey> + '_ {
        self.tetrahedra.keys()
    }

    /// Work counters since the last reset.
    #[must_use]
    pub fn stats(&self) -> RestorationStats {
        self.stats
    }

    /// Clears the work counters.
    pub fn reset_stats(&mut self) {
        self.stats = RestorationStats::default();
    }

    // ------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------

    /// Checks the global Delaunay property: no node lies strictly inside
    /// the circumsphere of any finite, non-flat tetrahedron. O(nodes ×
    /// tetrahedra) — intended for tests and debugging.
    ///
    /// # Errors
    ///
    /// [`TriangulationError::InvariantViolated`] naming the offender.
    pub fn validate_delaunay(&mut self) -> Result<(), TriangulationError> {
        let tetrahedra: Vec<TetrahedronKey> = self.tetrahedra.keys().collect();
        let node_keys: Vec<NodeKey> = self.nodes.keys().collect();
        for tet in tetrahedra {
            if !self.tetrahedra.contains_key(tet) {
                continue;
            }
            let t = &self.tetrahedra[tet];
            if t.is_infinite() || t.is_flat() {
                continue;
            }
            let corners = t.nodes;
            for &node in &node_keys {
                if corners.contains(&Some(node)) {
                    continue;
                }
                let position = self.nodes[node].position;
                if self.circumsphere_orientation(tet, position) > 0 {
                    return Err(TriangulationError::InvariantViolated {
                        detail: format!(
                            "node {} lies inside the circumsphere of a tetrahedron",
                            self.nodes[node].id
                        ),
                    });
                }
            }
        }
        Ok(())
    }

    /// Checks the structural invariants: every triangle bounds exactly two
    /// tetrahedra and sits in no organizer, incidence backlinks are mutual,
    /// every edge's cross-section equals the sum of its tetrahedra's
    /// contributions, and every node's volume equals its quarter shares.
    ///
    /// # Errors
    ///
    /// [`TriangulationError::InvariantViolated`] naming the first failure.
    pub fn validate_structure(&self) -> Result<(), TriangulationError> {
        let violated = |detail: String| TriangulationError::InvariantViolated { detail };
        for (key, triangle) in &self.triangles {
            let incident: Vec<TetrahedronKey> =
                triangle.tetrahedra.iter().copied().flatten().collect();
            if incident.len() != 2 {
                return Err(violated(format!(
                    "triangle bounds {} tetrahedra instead of 2",
                    incident.len()
                )));
            }
            if triangle.in_organizer {
                return Err(violated("triangle left behind in an organizer".into()));
            }
            for tet in incident {
                let backlinked = self
                    .tetrahedra
                    .get(tet)
                    .is_some_and(|t| t.triangle_index(key).is_some());
                if !backlinked {
                    return Err(violated("triangle-tetrahedron backlink broken".into()));
                }
            }
        }
        let any_tetrahedra = !self.tetrahedra.is_empty();
        for (key, edge) in &self.edges {
            if any_tetrahedra && edge.tetrahedra.is_empty() {
                return Err(violated("edge with no incident tetrahedron".into()));
            }
            let mut sum = 0.0;
            for &tet in &edge.tetrahedra {
                let Some(t) = self.tetrahedra.get(tet) else {
                    return Err(violated("edge references a dead tetrahedron".into()));
                };
                let Some(slot) = t.edges.iter().position(|&e| e == Some(key)) else {
                    return Err(violated("edge-tetrahedron backlink broken".into()));
                };
                sum += t.cross_sections[slot];
            }
            if (sum - edge.cross_section_area).abs() > 1e-9 * (1.0 + sum.abs()) {
                return Err(violated(format!(
                    "edge cross-section {} does not match contributions {}",
                    edge.cross_section_area, sum
                )));
            }
        }
        for node in self.nodes.values() {
            let mut sum = 0.0;
            for &tet in &node.tetrahedra {
                let Some(t) = self.tetrahedra.get(tet) else {
                    return Err(violated("node references a dead tetrahedron".into()));
                };
                sum += t.volume / 4.0;
            }
            if (sum - node.volume).abs() > 1e-9 * (1.0 + sum.abs()) {
                return Err(violated(format!(
                    "node volume {} does not match quarter shares {}",
                    node.volume, sum
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::listener::SequentialTriangleOrder;
    use approx::assert_relative_eq;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn unit_tetrahedron() -> (Triangulation<&'static str>, [NodeKey; 4]) {
        let mut tri: Triangulation<&'static str> = Triangulation::default();
        let a = tri.insert_first_node([0.0, 0.0, 0.0], "a");
        let b = tri.insert_near(a, [1.0, 0.0, 0.0], "b").unwrap();
        let c = tri.insert_near(b, [0.0, 1.0, 0.0], "c").unwrap();
        let d = tri.insert_near(a, [0.0, 0.0, 1.0], "d").unwrap();
        (tri, [a, b, c, d])
    }

    #[test]
    fn bootstrap_builds_initial_tetrahedron() {
        let (tri, _) = unit_tetrahedron();
        assert_eq!(tri.number_of_nodes(), 4);
        assert_eq!(tri.number_of_finite_tetrahedra(), 1);
        assert_eq!(tri.number_of_tetrahedra(), 5);
        assert_eq!(tri.number_of_finite_triangles(), 4);
        assert_eq!(tri.number_of_triangles(), 10);
        assert_eq!(tri.number_of_edges(), 6);
        assert_relative_eq!(tri.total_volume(), 1.0 / 6.0, epsilon = 1e-12);
        tri.validate_structure().unwrap();
    }

    #[test]
    fn neighbors_are_reachable_through_edges() {
        let (tri, [a, ..]) = unit_tetrahedron();
        let mut neighbors = tri.neighbors(a);
        neighbors.sort_unstable();
        assert_eq!(neighbors, vec![&"b", &"c", &"d"]);
    }

    #[test]
    fn containing_tetrahedron_reports_user_objects() {
        let (mut tri, [a, ..]) = unit_tetrahedron();
        let cell = tri
            .vertices_of_tetrahedron_containing(a, [0.1, 0.1, 0.1])
            .unwrap();
        let mut names: Vec<&str> = cell.iter().copied().copied().collect();
        names.sort_unstable();
        assert_eq!(names, vec!["a", "b", "c", "d"]);
        // Outside the hull there is no finite containing tetrahedron.
        assert!(tri
            .vertices_of_tetrahedron_containing(a, [5.0, 5.0, 5.0])
            .is_none());
    }

    #[test]
    fn deterministic_order_source_gives_reproducible_structure() {
        let build = || {
            let mut tri: Triangulation<()> =
                Triangulation::new(Box::new(SequentialTriangleOrder));
            let a = tri.insert_first_node([0.0, 0.0, 0.0], ());
            let b = tri.insert_near(a, [2.0, 0.0, 0.0], ()).unwrap();
            let _ = tri.insert_near(b, [0.0, 2.0, 0.0], ()).unwrap();
            let _ = tri.insert_near(a, [0.0, 0.0, 2.0], ()).unwrap();
            let _ = tri.insert_near(a, [0.5, 0.5, 0.5], ()).unwrap();
            (
                tri.number_of_tetrahedra(),
                tri.number_of_triangles(),
                tri.number_of_edges(),
            )
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn listener_receives_full_lifecycle() {
        #[derive(Default)]
        struct Recorder {
            events: Rc<RefCell<Vec<String>>>,
        }
        impl MovementListener<&'static str> for Recorder {
            fn node_about_to_move(
                &mut self,
                _tri: &Triangulation<&'static str>,
                _node: NodeKey,
                delta: Vector3<f64>,
            ) {
                self.events
                    .borrow_mut()
                    .push(format!("about_to_move {:.3}", delta.norm()));
            }
            fn node_moved(&mut self, _tri: &Triangulation<&'static str>, _node: NodeKey) {
                self.events.borrow_mut().push("moved".into());
            }
            fn node_about_to_be_added(
                &mut self,
                _tri: &Triangulation<&'static str>,
                _node: NodeKey,
                _position: Vector3<f64>,
                cell: [Option<&&'static str>; 4],
            ) {
                let filled = cell.iter().filter(|c| c.is_some()).count();
                self.events
                    .borrow_mut()
                    .push(format!("about_to_be_added {filled}"));
            }
            fn node_added(&mut self, _tri: &Triangulation<&'static str>, _node: NodeKey) {
                self.events.borrow_mut().push("added".into());
            }
            fn node_about_to_be_removed(
                &mut self,
                _tri: &Triangulation<&'static str>,
                _node: NodeKey,
            ) {
                self.events.borrow_mut().push("about_to_be_removed".into());
            }
            fn node_removed(&mut self, _tri: &Triangulation<&'static str>, _node: NodeKey) {
                self.events.borrow_mut().push("removed".into());
            }
        }

        let (mut tri, [a, ..]) = unit_tetrahedron();
        let events: Rc<RefCell<Vec<String>>> = Rc::default();
        tri.add_listener(Box::new(Recorder {
            events: Rc::clone(&events),
        }));

        let e = tri.insert_near(a, [0.2, 0.2, 0.2], "e").unwrap();
        tri.move_node_to(e, [0.25, 0.2, 0.2].into()).unwrap();
        tri.remove(e).unwrap();

        let log = events.borrow();
        assert_eq!(
            log.as_slice(),
            &[
                "about_to_be_added 4".to_string(),
                "added".to_string(),
                "about_to_move 0.050".to_string(),
                "moved".to_string(),
                "about_to_be_removed".to_string(),
                "removed".to_string(),
            ]
        );
    }

    #[test]
    fn move_to_same_position_is_consistent() {
        let (mut tri, [a, ..]) = unit_tetrahedron();
        let e = tri.insert_near(a, [0.2, 0.2, 0.2], "e").unwrap();
        let position = tri.node(e).unwrap().position();
        tri.move_node_to(e, position).unwrap();
        tri.validate_structure().unwrap();
        tri.validate_delaunay().unwrap();
    }

    #[test]
    fn checking_index_wraps() {
        let mut tri: Triangulation<()> = Triangulation::default();
        tri.checking_index = Triangulation::<()>::CHECKING_INDEX_MODULUS - 1;
        assert_eq!(tri.create_new_checking_index(), 0);
        assert_eq!(tri.create_new_checking_index(), 1);
    }

    #[test]
    fn propose_new_position_moves_off_nearest_neighbor() {
        let (tri, [a, ..]) = unit_tetrahedron();
        let proposal = tri.propose_new_position(a).unwrap();
        assert!(proposal != tri.node(a).unwrap().position());
    }
}
