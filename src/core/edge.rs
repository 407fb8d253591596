//! Edges of the triangulation.
//!
//! An edge is the undirected pair of its endpoint nodes. It tracks the
//! tetrahedra it belongs to and accumulates a cross-section area from each
//! incident tetrahedron's contribution; the physics layer reads that area
//! off the adjacency graph. An edge destroys itself when the last incident
//! tetrahedron lets go of it.

use crate::core::collections::{remove_first, SmallBuffer};
use crate::core::error::TriangulationError;
use crate::core::triangulation::{EdgeKey, NodeKey, TetrahedronKey, Triangulation};

/// An undirected edge between two nodes.
#[derive(Debug)]
pub struct Edge {
    pub(crate) a: NodeKey,
    pub(crate) b: NodeKey,
    pub(crate) tetrahedra: SmallBuffer<TetrahedronKey, 8>,
    pub(crate) cross_section_area: f64,
}

impl Edge {
    /// The two endpoint keys.
    #[must_use]
    pub fn endpoints(&self) -> (NodeKey, NodeKey) {
        (self.a, self.b)
    }

    /// The endpoint opposite `node`.
    ///
    /// # Errors
    ///
    /// [`TriangulationError::EdgeNotIncident`] if `node` is not an endpoint.
    pub fn opposite(&self, node: NodeKey) -> Result<NodeKey, TriangulationError> {
        if node == self.a {
            Ok(self.b)
        } else if node == self.b {
            Ok(self.a)
        } else {
            Err(TriangulationError::EdgeNotIncident)
        }
    }

    /// Whether this edge connects exactly the two given nodes.
    #[must_use]
    pub fn connects(&self, a: NodeKey, b: NodeKey) -> bool {
        (self.a == a && self.b == b) || (self.a == b && self.b == a)
    }

    /// Accumulated cross-section area.
    #[must_use]
    pub fn cross_section_area(&self) -> f64 {
        self.cross_section_area
    }

    /// Keys of the incident tetrahedra.
    #[must_use]
    pub fn tetrahedra(&self) -> &[TetrahedronKey] {
        &self.tetrahedra
    }
}

impl<U> Triangulation<U> {
    /// Creates an edge between `a` and `b` and registers it with both nodes.
    pub(crate) fn create_edge(&mut self, a: NodeKey, b: NodeKey) -> EdgeKey {
        let key = self.edges.insert(Edge {
            a,
            b,
            tetrahedra: SmallBuffer::new(),
            cross_section_area: 0.0,
        });
        self.nodes[a].edges.push(key);
        self.nodes[b].edges.push(key);
        key
    }

    /// Finds the edge from `node` to `opposite`, creating it on demand.
    pub(crate) fn search_edge(&mut self, node: NodeKey, opposite: NodeKey) -> EdgeKey {
        for &edge_key in &self.nodes[node].edges {
            if self.edges[edge_key].connects(node, opposite) {
                return edge_key;
            }
        }
        self.create_edge(node, opposite)
    }

    pub(crate) fn edge_add_tetrahedron(&mut self, edge: EdgeKey, tet: TetrahedronKey) {
        self.edges[edge].tetrahedra.push(tet);
    }

    /// Detaches a tetrahedron from the edge; the edge destroys itself when
    /// its tetrahedron list empties.
    pub(crate) fn edge_remove_tetrahedron(&mut self, edge: EdgeKey, tet: TetrahedronKey) {
        let empty = {
            let e = &mut self.edges[edge];
            remove_first(&mut e.tetrahedra, &tet);
            e.tetrahedra.is_empty()
        };
        if empty {
            let (a, b) = self.edges[edge].endpoints();
            if let Some(node) = self.nodes.get_mut(a) {
                remove_first(&mut node.edges, &edge);
            }
            if let Some(node) = self.nodes.get_mut(b) {
                remove_first(&mut node.edges, &edge);
            }
            self.edges.remove(edge);
        }
    }

    pub(crate) fn edge_change_cross_section(&mut self, edge: EdgeKey, change: f64) {
        self.edges[edge].cross_section_area += change;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opposite_endpoint_lookup() {
        let mut tri: Triangulation<()> = Triangulation::default();
        let a = tri.insert_first_node([0.0, 0.0, 0.0], ());
        let b = tri.insert_near(a, [1.0, 0.0, 0.0], ()).unwrap();
        let edge_key = tri.node(a).unwrap().edges()[0];
        let edge = tri.edge(edge_key).unwrap();
        assert_eq!(edge.opposite(a).unwrap(), b);
        assert_eq!(edge.opposite(b).unwrap(), a);
        assert!(edge.connects(b, a));
    }

    #[test]
    fn opposite_rejects_foreign_node() {
        let mut tri: Triangulation<()> = Triangulation::default();
        let a = tri.insert_first_node([0.0, 0.0, 0.0], ());
        let b = tri.insert_near(a, [1.0, 0.0, 0.0], ()).unwrap();
        let c = tri.insert_near(b, [0.0, 1.0, 0.0], ()).unwrap();
        let ab = tri
            .node(a)
            .unwrap()
            .edges()
            .iter()
            .copied()
            .find(|&e| tri.edge(e).unwrap().connects(a, b))
            .unwrap();
        assert_eq!(
            tri.edge(ab).unwrap().opposite(c),
            Err(TriangulationError::EdgeNotIncident)
        );
    }

    #[test]
    fn edge_self_destructs_with_last_tetrahedron() {
        let mut tri: Triangulation<()> = Triangulation::default();
        let a = tri.insert_first_node([0.0, 0.0, 0.0], ());
        let b = tri.insert_near(a, [1.0, 0.0, 0.0], ()).unwrap();
        let _c = tri.insert_near(b, [0.0, 1.0, 0.0], ()).unwrap();
        let _d = tri.insert_near(a, [0.0, 0.0, 1.0], ()).unwrap();
        assert_eq!(tri.number_of_edges(), 6);
        // An interior node connects to all four corners.
        let e = tri.insert_near(a, [0.2, 0.2, 0.2], ()).unwrap();
        assert_eq!(tri.number_of_edges(), 10);
        // Removing it tears its four edges down with their tetrahedra.
        tri.remove(e).unwrap();
        assert_eq!(tri.number_of_edges(), 6);
    }
}
