//! Local retriangulation operations: the 2→3 and 3→2 flips and the removal
//! of a pair of flat tetrahedra.
//!
//! Flips preserve the covered point set. The 2→3 flip replaces two
//! tetrahedra sharing a face by three around the new interior edge between
//! their apices; it is only legal when that union is convex. The 3→2 flip is
//! its inverse, applied when three tetrahedra around a common edge violate
//! the Delaunay property pairwise. Two flat tetrahedra that share two faces
//! cancel out entirely, their outer neighbors becoming direct neighbors.

use tracing::trace;

use crate::core::triangulation::{TetrahedronKey, Triangulation};

impl<U> Triangulation<U> {
    /// Replaces `tet_a` and `tet_b` (sharing one face) with three tetrahedra
    /// around the edge between their apices. Returns `None` when the union
    /// is not convex. Any of the three that turns out degenerate (apices
    /// coplanar with a rim node) is created flat.
    pub(crate) fn flip_2_to_3(
        &mut self,
        tet_a: TetrahedronKey,
        tet_b: TetrahedronKey,
    ) -> Option<[TetrahedronKey; 3]> {
        let connecting_number = self.connecting_triangle_number(tet_a, tet_b)?;
        let connecting_triangle = self.tetrahedra[tet_a].triangles[connecting_number];
        let lower_node = self
            .tetrahedron_opposite_node(tet_b, connecting_triangle)
            .flatten();
        let mut convex_position = 1;
        if let Some(lower) = lower_node {
            let lower_position = self.nodes[lower].position;
            convex_position = self.is_in_convex_position(tet_a, lower_position, connecting_number);
        }
        if convex_position < 0 {
            return None;
        }
        let check_for_flat = convex_position == 0;

        let upper_triangles = self.touching_triangles(tet_a, connecting_triangle);
        let lower_triangles = self.touching_triangles(tet_b, connecting_triangle);
        let upper_node = self.tetrahedra[tet_a].nodes[connecting_number];
        let connecting_nodes = self.triangles[connecting_triangle].nodes();

        let mut new_triangles = [connecting_triangle; 3];
        for i in 0..3 {
            new_triangles[i] = self.create_triangle(upper_node, lower_node, connecting_nodes[i]);
        }
        self.remove_tetrahedron(tet_a);
        self.remove_tetrahedron(tet_b);

        let mut created = [tet_a; 3];
        for i in 0..3 {
            // Keep an absent node in the connecting triangle bound for
            // slot 0 of the new tetrahedron.
            let mut a = (i + 1) % 3;
            let mut b = (i + 2) % 3;
            if b == 0 {
                b = 2;
                a = 0;
            }
            let flat = check_for_flat
                && lower_node.is_some_and(|lower| {
                    let position = self.nodes[lower].position;
                    self.triangle_orientation(upper_triangles[i], position, position) == 0
                });
            created[i] = self.create_tetrahedron(
                [
                    new_triangles[b],
                    upper_triangles[i],
                    lower_triangles[i],
                    new_triangles[a],
                ],
                [connecting_nodes[a], lower_node, upper_node, connecting_nodes[b]],
                flat,
            );
        }
        self.stats.flips_2_to_3 += 1;
        trace!(?created, "2->3 flip");
        Some(created)
    }

    /// Replaces three tetrahedra that are pairwise adjacent around a common
    /// edge with the two tetrahedra over the triangle of their apices.
    pub(crate) fn flip_3_to_2(
        &mut self,
        tet_a: TetrahedronKey,
        tet_b: TetrahedronKey,
        tet_c: TetrahedronKey,
    ) -> [TetrahedronKey; 2] {
        let num_a = self
            .connecting_triangle_number(tet_a, tet_b)
            .expect("flip partners are adjacent");
        let num_b = self
            .connecting_triangle_number(tet_b, tet_c)
            .expect("flip partners are adjacent");
        let num_c = self
            .connecting_triangle_number(tet_c, tet_a)
            .expect("flip partners are adjacent");
        let new_triangle_nodes = [
            self.tetrahedra[tet_a].nodes[num_a],
            self.tetrahedra[tet_b].nodes[num_b],
            self.tetrahedra[tet_c].nodes[num_c],
        ];
        let upper_node =
            self.tetrahedra[tet_a].first_other_node(new_triangle_nodes[0], new_triangle_nodes[1]);
        let lower_node =
            self.tetrahedra[tet_a].second_other_node(new_triangle_nodes[0], new_triangle_nodes[1]);

        let new_triangle = self.create_triangle(
            new_triangle_nodes[0],
            new_triangle_nodes[1],
            new_triangle_nodes[2],
        );

        let a_low = self.opposite_triangle_of(tet_a, lower_node);
        let b_low = self.opposite_triangle_of(tet_b, lower_node);
        let c_low = self.opposite_triangle_of(tet_c, lower_node);
        let a_up = self.opposite_triangle_of(tet_a, upper_node);
        let b_up = self.opposite_triangle_of(tet_b, upper_node);
        let c_up = self.opposite_triangle_of(tet_c, upper_node);

        let flat = self.tetrahedra[tet_a].is_flat()
            && self.tetrahedra[tet_b].is_flat()
            && self.tetrahedra[tet_c].is_flat();
        self.remove_tetrahedron(tet_a);
        self.remove_tetrahedron(tet_b);
        self.remove_tetrahedron(tet_c);

        let first = self.create_tetrahedron(
            [new_triangle, a_low, b_low, c_low],
            [
                upper_node,
                new_triangle_nodes[2],
                new_triangle_nodes[0],
                new_triangle_nodes[1],
            ],
            flat,
        );
        let second = self.create_tetrahedron(
            [new_triangle, a_up, b_up, c_up],
            [
                lower_node,
                new_triangle_nodes[2],
                new_triangle_nodes[0],
                new_triangle_nodes[1],
            ],
            flat,
        );
        self.stats.flips_3_to_2 += 1;
        trace!(?first, ?second, "3->2 flip");
        [first, second]
    }

    fn opposite_triangle_of(
        &self,
        tet: TetrahedronKey,
        node: Option<crate::core::triangulation::NodeKey>,
    ) -> crate::core::triangulation::TriangleKey {
        let t = &self.tetrahedra[tet];
        let slot = t
            .nodes
            .iter()
            .position(|&n| n == node)
            .expect("wheel node belongs to the tetrahedron");
        t.triangles[slot]
    }

    /// Removes two flat tetrahedra that share two faces (four coplanar
    /// points in non-convex position); their outer neighbors adopt each
    /// other's faces and become direct neighbors. Returns the neighbors for
    /// subsequent Delaunay re-checking.
    pub(crate) fn remove_flat_pair(
        &mut self,
        tet_a: TetrahedronKey,
        tet_b: TetrahedronKey,
    ) -> Vec<TetrahedronKey> {
        let triangles_a = self.tetrahedra[tet_a].triangles;
        let triangles_b = self.tetrahedra[tet_b].triangles;
        let mut outer_pairs: Vec<(usize, usize)> = Vec::new();
        for i in 0..4 {
            if triangles_b.contains(&triangles_a[i]) {
                continue;
            }
            for j in 0..4 {
                if self.triangles[triangles_a[i]].is_similar_to(&self.triangles[triangles_b[j]]) {
                    outer_pairs.push((i, j));
                }
            }
        }
        self.remove_tetrahedron(tet_a);
        self.remove_tetrahedron(tet_b);

        let mut adjacent_tetrahedra: Vec<TetrahedronKey> = Vec::new();
        for (i, j) in outer_pairs {
            let triangle_a = triangles_a[i];
            let triangle_b = triangles_b[j];
            if !self.triangles.contains_key(triangle_a) || !self.triangles.contains_key(triangle_b)
            {
                continue;
            }
            let neighbor_a = self.triangles[triangle_a].opposite_tetrahedron(None);
            let neighbor_b = self.triangles[triangle_b].opposite_tetrahedron(None);
            if let Some(a) = neighbor_a {
                if !adjacent_tetrahedra.contains(&a) {
                    adjacent_tetrahedra.push(a);
                }
            }
            if let Some(b) = neighbor_b {
                if !adjacent_tetrahedra.contains(&b) {
                    adjacent_tetrahedra.push(b);
                }
            }
            if let Some(a) = neighbor_a {
                self.replace_triangle(a, triangle_a, triangle_b);
            }
        }
        self.stats.flat_pair_removals += 1;
        trace!(neighbors = adjacent_tetrahedra.len(), "flat pair removed");
        adjacent_tetrahedra
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Bipyramid over a triangle base: two finite tetrahedra sharing the
    /// base face. The two apices and the three base nodes allow both the
    /// two-tetrahedron and the three-tetrahedron triangulation.
    fn bipyramid() -> (Triangulation<&'static str>, TetrahedronKey, TetrahedronKey) {
        let mut tri: Triangulation<&'static str> = Triangulation::default();
        let p1 = tri.insert_first_node([0.0, 0.0, 0.0], "p1");
        let p2 = tri.insert_near(p1, [4.0, 0.0, 0.0], "p2").unwrap();
        let _p3 = tri.insert_near(p2, [2.0, 4.0, 0.0], "p3").unwrap();
        let _top = tri.insert_near(p1, [2.0, 1.4, 2.0], "top").unwrap();
        let _bottom = tri.insert_near(p1, [2.0, 1.4, -2.0], "bottom").unwrap();
        let finite: Vec<_> = tri
            .tetrahedron_keys()
            .filter(|&t| !tri.tetrahedron(t).unwrap().is_infinite())
            .collect();
        let mut finite = finite.into_iter();
        let a = finite.next().expect("two finite tetrahedra");
        let b = finite.next().expect("two finite tetrahedra");
        assert!(finite.next().is_none());
        (tri, a, b)
    }

    #[test]
    fn flip_2_to_3_and_back() {
        let (mut tri, a, b) = bipyramid();
        let volume_before = tri.total_volume();
        tri.validate_structure().unwrap();

        let created = tri.flip_2_to_3(a, b).expect("bipyramid union is convex");
        assert_eq!(tri.number_of_finite_tetrahedra(), 3);
        tri.validate_structure().unwrap();
        assert_relative_eq!(tri.total_volume(), volume_before, epsilon = 1e-12);
        assert_eq!(tri.stats().flips_2_to_3, 1);

        // The inverse flip restores the two-tetrahedron configuration.
        let [x, y, z] = created;
        let pair = tri.flip_3_to_2(x, y, z);
        assert_eq!(tri.number_of_finite_tetrahedra(), 2);
        tri.validate_structure().unwrap();
        assert_relative_eq!(tri.total_volume(), volume_before, epsilon = 1e-12);
        assert_eq!(tri.stats().flips_3_to_2, 1);
        for tet in pair {
            assert!(!tri.tetrahedron(tet).unwrap().is_infinite());
        }
    }

    #[test]
    fn flip_2_to_3_refuses_reflex_pairs() {
        // Insert an interior node: every neighbor pair around it is convex
        // except across faces where the union is reflex. Build a reflex pair
        // by taking two tetrahedra of the star around the interior node.
        let mut tri: Triangulation<()> = Triangulation::default();
        let a = tri.insert_first_node([0.0, 0.0, 0.0], ());
        let b = tri.insert_near(a, [3.0, 0.0, 0.0], ()).unwrap();
        let _ = tri.insert_near(b, [0.0, 3.0, 0.0], ()).unwrap();
        let _ = tri.insert_near(a, [0.0, 0.0, 3.0], ()).unwrap();
        let e = tri.insert_near(a, [0.5, 0.5, 0.5], ()).unwrap();
        // Any two star tetrahedra share a face that has e as a corner; their
        // union is reflex at e, so every flip attempt must refuse (and
        // refusal leaves the triangulation untouched).
        let star: Vec<TetrahedronKey> = tri.node(e).unwrap().tetrahedra().to_vec();
        let mut attempts = 0;
        for &s in &star {
            for &t in &star {
                if s != t && tri.is_neighbor(s, t) {
                    assert!(tri.flip_2_to_3(s, t).is_none());
                    attempts += 1;
                }
            }
        }
        assert!(attempts > 0);
        assert_eq!(tri.stats().flips_2_to_3, 0);
        tri.validate_structure().unwrap();
        tri.validate_delaunay().unwrap();
    }
}
