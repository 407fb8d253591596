//! Point insertion via star-shaped cavity retriangulation.
//!
//! A visibility walk locates the tetrahedron containing the new position;
//! a breadth-first search from there removes every tetrahedron whose open
//! circumsphere truly contains the point. The faces on the rim of that
//! cavity are then joined to the new node, one tetrahedron per face, with
//! the open-triangle organizer pairing shared side faces.

use tracing::debug;

use crate::core::error::TriangulationError;
use crate::core::organizer::OpenTriangleOrganizer;
use crate::core::triangulation::{NodeKey, TetrahedronKey, TriangleKey, Triangulation};
use nalgebra::Vector3;

impl<U> Triangulation<U> {
    /// Walks from `start` to a tetrahedron containing `coordinate`.
    ///
    /// An infinite start first hops to its finite neighbor; the walk ends
    /// when it makes no progress or reaches the hull.
    ///
    /// # Errors
    ///
    /// [`TriangulationError::PositionNotAllowed`] if the coordinate exactly
    /// hits an existing node.
    pub(crate) fn search_insertion_tetrahedron(
        &mut self,
        start: TetrahedronKey,
        coordinate: Vector3<f64>,
    ) -> Result<TetrahedronKey, TriangulationError> {
        let mut current = start;
        if self.tetrahedra[current].is_infinite() {
            let base = self.tetrahedra[current].triangles[0];
            if let Some(inner) = self.triangles[base].opposite_tetrahedron(Some(current)) {
                current = inner;
            }
        }
        let mut last: Option<TetrahedronKey> = None;
        while last != Some(current) && !self.tetrahedra[current].is_infinite() {
            last = Some(current);
            let order = self.order_source.generate();
            current = self.walk_to_point(current, coordinate, order)?;
        }
        Ok(current)
    }

    /// Weaves an already-registered node into the triangulation.
    ///
    /// Returns one of the created tetrahedra as a hint for the next
    /// insertion. On failure nothing has been modified.
    pub(crate) fn insert_node(
        &mut self,
        node: NodeKey,
        start: TetrahedronKey,
    ) -> Result<TetrahedronKey, TriangulationError> {
        let position = self.nodes[node].position;
        let insertion_start = self.search_insertion_tetrahedron(start, position)?;

        let cell_nodes = self.tetrahedra[insertion_start].nodes;
        self.notify(|listener, tri| {
            let cell = cell_nodes.map(|slot| slot.map(|key| &tri.nodes[key].user_data));
            listener.node_about_to_be_added(tri, node, position, cell);
        });

        let mut oto = OpenTriangleOrganizer::new();
        let mut queue: Vec<TriangleKey> = Vec::new();
        let mut outer_triangles: Vec<TriangleKey> = Vec::new();
        self.process_tetrahedron(insertion_start, &mut queue, &mut oto);
        let mut index = 0;
        while index < queue.len() {
            let current_triangle = queue[index];
            index += 1;
            if !self.triangles.contains_key(current_triangle) {
                continue;
            }
            let Some(opposite) = self.triangles[current_triangle].opposite_tetrahedron(None) else {
                continue;
            };
            if self.is_truly_inside_sphere(opposite, position) {
                self.process_tetrahedron(opposite, &mut queue, &mut oto);
            } else {
                outer_triangles.push(current_triangle);
            }
        }
        debug!(
            cavity_faces = outer_triangles.len(),
            "cavity carved for insertion"
        );

        let mut created: Option<TetrahedronKey> = None;
        for triangle in outer_triangles {
            if !self.triangles.contains_key(triangle)
                || self.triangles[triangle].is_completely_open()
            {
                continue;
            }
            created = Some(self.create_tetrahedron_from_triangle(triangle, Some(node), &mut oto));
        }

        self.notify(|listener, tri| listener.node_added(tri, node));
        created.ok_or_else(|| TriangulationError::InvariantViolated {
            detail: "insertion cavity produced no tetrahedra".into(),
        })
    }

    /// Removes one cavity tetrahedron, feeding its faces to the queue and
    /// the organizer; a face opened from both sides is dropped entirely.
    fn process_tetrahedron(
        &mut self,
        tet: TetrahedronKey,
        queue: &mut Vec<TriangleKey>,
        oto: &mut OpenTriangleOrganizer,
    ) {
        let triangles = self.tetrahedra[tet].triangles;
        self.remove_tetrahedron(tet);
        for triangle in triangles {
            if !self.triangles.contains_key(triangle) {
                continue;
            }
            if self.triangles[triangle].is_completely_open() {
                self.organizer_remove_triangle(oto, triangle);
            } else {
                queue.push(triangle);
                self.organizer_put_triangle(oto, triangle);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn interior_insertion_splits_into_star() {
        let mut tri: Triangulation<()> = Triangulation::default();
        let a = tri.insert_first_node([0.0, 0.0, 0.0], ());
        let b = tri.insert_near(a, [3.0, 0.0, 0.0], ()).unwrap();
        let _ = tri.insert_near(b, [0.0, 3.0, 0.0], ()).unwrap();
        let _ = tri.insert_near(a, [0.0, 0.0, 3.0], ()).unwrap();
        let volume = tri.total_volume();

        let e = tri.insert_near(a, [0.4, 0.4, 0.4], ()).unwrap();
        assert_eq!(tri.number_of_finite_tetrahedra(), 4);
        assert_eq!(tri.node(e).unwrap().tetrahedra().len(), 4);
        assert_relative_eq!(tri.total_volume(), volume, epsilon = 1e-12);
        tri.validate_structure().unwrap();
        tri.validate_delaunay().unwrap();
    }

    #[test]
    fn hull_extension_replaces_infinite_tetrahedra() {
        let mut tri: Triangulation<()> = Triangulation::default();
        let a = tri.insert_first_node([0.0, 0.0, 0.0], ());
        let b = tri.insert_near(a, [1.0, 0.0, 0.0], ()).unwrap();
        let _ = tri.insert_near(b, [0.0, 1.0, 0.0], ()).unwrap();
        let _ = tri.insert_near(a, [0.0, 0.0, 1.0], ()).unwrap();
        let volume = tri.total_volume();

        // A point far outside every face extends the convex hull.
        let outside = tri.insert_near(a, [2.0, 2.0, 2.0], ()).unwrap();
        assert!(tri.total_volume() > volume);
        assert!(!tri.node(outside).unwrap().tetrahedra().is_empty());
        tri.validate_structure().unwrap();
        tri.validate_delaunay().unwrap();
    }

    #[test]
    fn duplicate_position_is_rejected_without_damage() {
        let mut tri: Triangulation<()> = Triangulation::default();
        let a = tri.insert_first_node([0.0, 0.0, 0.0], ());
        let b = tri.insert_near(a, [1.0, 0.0, 0.0], ()).unwrap();
        let _ = tri.insert_near(b, [0.0, 1.0, 0.0], ()).unwrap();
        let _ = tri.insert_near(a, [0.0, 0.0, 1.0], ()).unwrap();
        let nodes = tri.number_of_nodes();
        let tets = tri.number_of_tetrahedra();

        let result = tri.insert_near(a, [0.0, 0.0, 0.0], ());
        assert!(matches!(
            result,
            Err(TriangulationError::PositionNotAllowed { .. })
        ));
        assert_eq!(tri.number_of_nodes(), nodes);
        assert_eq!(tri.number_of_tetrahedra(), tets);
        tri.validate_structure().unwrap();
    }
}
