//! Point deletion: tear down the star of a node and retriangulate the
//! cavity by gift-wrapping.

use tracing::debug;

use crate::core::error::TriangulationError;
use crate::core::organizer::OpenTriangleOrganizer;
use crate::core::triangulation::{NodeKey, TetrahedronKey, Triangulation};

impl<U> Triangulation<U> {
    /// Removes all geometry incident to `node` and retriangulates the
    /// resulting cavity; the node itself stays registered (motion's slow
    /// path re-inserts it afterwards).
    ///
    /// Returns one tetrahedron created during the repair, usable as a walk
    /// hint when the caller's own hint died with the star.
    ///
    /// # Errors
    ///
    /// [`TriangulationError::InvariantViolated`] when cavity wrapping cannot
    /// finish within its budget.
    pub(crate) fn remove_node_geometry(
        &mut self,
        node: NodeKey,
    ) -> Result<Option<TetrahedronKey>, TriangulationError> {
        self.notify(|listener, tri| listener.node_about_to_be_removed(tri, node));

        let mut oto = OpenTriangleOrganizer::new();
        let mut messed_up: Vec<TetrahedronKey> = Vec::new();
        let position = self.nodes[node].position;
        let incident: Vec<TetrahedronKey> = self.nodes[node].tetrahedra.to_vec();
        for tet in incident {
            if !self.tetrahedra.contains_key(tet) {
                continue;
            }
            let opposite_triangle = self.tetrahedra[tet]
                .opposite_triangle(node)
                .expect("incident tetrahedron has the node");
            self.organizer_put_triangle(&mut oto, opposite_triangle);
            let opposite_tetrahedron =
                self.triangles[opposite_triangle].opposite_tetrahedron(Some(tet));
            self.remove_tetrahedron(tet);
            if let Some(opposite) = opposite_tetrahedron {
                if self.tetrahedra.contains_key(opposite)
                    && !self.tetrahedra[opposite].is_infinite()
                    && self.is_inside_sphere(opposite, position)
                {
                    messed_up.push(opposite);
                }
            }
        }
        debug!(messed_up = messed_up.len(), "star removed, expanding cavity");
        for tet in messed_up {
            if self.tetrahedra.contains_key(tet) {
                self.organizer_remove_all_tetrahedra_in_sphere(&mut oto, tet);
            }
        }
        self.organizer_triangulate(&mut oto)?;

        self.notify(|listener, tri| listener.node_removed(tri, node));
        Ok(oto.a_new_tetrahedron())
    }

    /// Removes a node from the triangulation entirely: tears down its star,
    /// retriangulates the cavity, and unregisters the node.
    ///
    /// # Errors
    ///
    /// [`TriangulationError::UnknownNode`] for a stale key;
    /// [`TriangulationError::InvariantViolated`] when cavity wrapping fails.
    pub fn remove(&mut self, node: NodeKey) -> Result<(), TriangulationError> {
        if !self.nodes.contains_key(node) {
            return Err(TriangulationError::UnknownNode);
        }
        if self.nodes[node].tetrahedra.is_empty() {
            // Pre-tetrahedralization bootstrap state: only bare edges exist.
            self.notify(|listener, tri| listener.node_about_to_be_removed(tri, node));
            let edges: Vec<_> = self.nodes[node].edges.to_vec();
            for edge in edges {
                let (a, b) = self.edges[edge].endpoints();
                for endpoint in [a, b] {
                    if let Some(n) = self.nodes.get_mut(endpoint) {
                        crate::core::collections::remove_first(&mut n.edges, &edge);
                    }
                }
                self.edges.remove(edge);
            }
            self.notify(|listener, tri| listener.node_removed(tri, node));
        } else {
            self.remove_node_geometry(node)?;
        }
        self.nodes.remove(node);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn insert_then_remove_restores_counts_and_volume() {
        let mut tri: Triangulation<()> = Triangulation::default();
        let a = tri.insert_first_node([0.0, 0.0, 0.0], ());
        let b = tri.insert_near(a, [3.0, 0.0, 0.0], ()).unwrap();
        let _ = tri.insert_near(b, [0.0, 3.0, 0.0], ()).unwrap();
        let _ = tri.insert_near(a, [0.0, 0.0, 3.0], ()).unwrap();
        let _ = tri.insert_near(a, [0.9, 0.8, 0.7], ()).unwrap();

        let nodes = tri.number_of_nodes();
        let tets = tri.number_of_tetrahedra();
        let finite = tri.number_of_finite_tetrahedra();
        let edges = tri.number_of_edges();
        let volume = tri.total_volume();

        let p = tri.insert_near(a, [0.5, 0.6, 0.4], ()).unwrap();
        tri.remove(p).unwrap();

        assert_eq!(tri.number_of_nodes(), nodes);
        assert_eq!(tri.number_of_tetrahedra(), tets);
        assert_eq!(tri.number_of_finite_tetrahedra(), finite);
        assert_eq!(tri.number_of_edges(), edges);
        assert_relative_eq!(tri.total_volume(), volume, epsilon = 1e-9);
        tri.validate_structure().unwrap();
        tri.validate_delaunay().unwrap();
    }

    #[test]
    fn removing_unknown_node_fails_cleanly() {
        let mut tri: Triangulation<()> = Triangulation::default();
        let a = tri.insert_first_node([0.0, 0.0, 0.0], ());
        tri.remove(a).unwrap();
        assert_eq!(tri.remove(a), Err(TriangulationError::UnknownNode));
    }

    #[test]
    fn bootstrap_removal_drops_bare_edges() {
        let mut tri: Triangulation<()> = Triangulation::default();
        let a = tri.insert_first_node([0.0, 0.0, 0.0], ());
        let b = tri.insert_near(a, [1.0, 0.0, 0.0], ()).unwrap();
        let c = tri.insert_near(b, [0.0, 1.0, 0.0], ()).unwrap();
        assert_eq!(tri.number_of_edges(), 3);
        tri.remove(c).unwrap();
        assert_eq!(tri.number_of_edges(), 1);
        assert_eq!(tri.number_of_nodes(), 2);
    }
}
