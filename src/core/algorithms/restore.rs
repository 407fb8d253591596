//! Delaunay restoration after node motion.
//!
//! Starting from the moved node's star (whose circumspheres are refreshed),
//! the pass scans each active tetrahedron's faces for empty-circumsphere
//! violations, preferring a 3→2 flip where three mutually adjacent
//! tetrahedra violate pairwise, then flat-pair removal, then a 2→3 flip.
//! Faces already examined in the current pass are skipped via the
//! session-global checking index.
//!
//! Violations no local flip can resolve (octahedral and similar blocked
//! configurations) are parked as *problem* tetrahedra; after the sweep they
//! — together with any surviving flat tetrahedra — are carved out and the
//! hole is retriangulated by the organizer (`clean_up`). The outer loop
//! repeats until no active tetrahedra remain.

use std::collections::VecDeque;

use tracing::{debug, warn};

use crate::core::error::TriangulationError;
use crate::core::organizer::OpenTriangleOrganizer;
use crate::core::triangulation::{NodeKey, TetrahedronKey, Triangulation};

/// Upper bound on restoration sweeps per motion. Each sweep either empties
/// the active set or removes geometry; hitting the bound means the
/// configuration is not converging.
const RESTORE_PASS_BUDGET: usize = 256;

/// Upper bound on cleanup expansion steps.
const CLEANUP_BUDGET: usize = 2000;

impl<U> Triangulation<U> {
    /// Restores the empty-circumsphere property around a node that has just
    /// moved to its new position.
    ///
    /// # Errors
    ///
    /// [`TriangulationError::InvariantViolated`] when the pass or cleanup
    /// budget is exhausted.
    pub(crate) fn restore_delaunay(&mut self, moved: NodeKey) -> Result<(), TriangulationError> {
        let mut active: VecDeque<TetrahedronKey> = self.nodes[moved].tetrahedra.iter().copied().collect();
        for &tet in &active {
            self.update_circumsphere_after_node_movement(tet, moved);
        }

        let mut passes = 0;
        while !active.is_empty() {
            passes += 1;
            if passes > RESTORE_PASS_BUDGET {
                warn!(passes, "delaunay restoration did not converge");
                return Err(TriangulationError::InvariantViolated {
                    detail: "restoration pass budget exhausted".into(),
                });
            }
            self.stats.restoration_passes += 1;
            let checking_index = self.create_new_checking_index();
            let mut problem_tetrahedra: Vec<TetrahedronKey> = Vec::new();
            let mut flat_tetrahedra: Vec<TetrahedronKey> = Vec::new();

            while let Some(tetrahedron) = active.pop_front() {
                if !self.tetrahedra.contains_key(tetrahedron) {
                    continue;
                }
                let start = usize::from(self.tetrahedra[tetrahedron].is_infinite());
                for i in start..4 {
                    let triangle_i = self.tetrahedra[tetrahedron].triangles[i];
                    if self.triangles[triangle_i].was_checked_already(checking_index) {
                        continue;
                    }
                    let Some(tetrahedron_i) =
                        self.triangles[triangle_i].opposite_tetrahedron(Some(tetrahedron))
                    else {
                        continue;
                    };
                    let Some(node_i) = self
                        .tetrahedron_opposite_node(tetrahedron_i, triangle_i)
                        .flatten()
                    else {
                        continue;
                    };
                    let node_i_position = self.nodes[node_i].position;
                    let both_flat = self.tetrahedra[tetrahedron].is_flat()
                        && self.tetrahedra[tetrahedron_i].is_flat();
                    if !both_flat && !self.is_truly_inside_sphere(tetrahedron, node_i_position) {
                        continue;
                    }

                    // Prefer a 3→2 flip: a third neighbor sharing an edge
                    // with both, with mutual sphere violations all around.
                    let mut new_tetrahedra: Vec<TetrahedronKey> = Vec::new();
                    for j in start..4 {
                        if i == j {
                            continue;
                        }
                        let triangle_j = self.tetrahedra[tetrahedron].triangles[j];
                        let Some(tetrahedron_j) =
                            self.triangles[triangle_j].opposite_tetrahedron(Some(tetrahedron))
                        else {
                            continue;
                        };
                        if !self.is_neighbor(tetrahedron_j, tetrahedron_i) {
                            continue;
                        }
                        let (Some(opp_i), Some(opp_j)) = (
                            self.tetrahedra[tetrahedron].nodes[i],
                            self.tetrahedra[tetrahedron].nodes[j],
                        ) else {
                            continue;
                        };
                        let all_flat = both_flat
                            && self.tetrahedra[tetrahedron_j].is_flat()
                            && tetrahedron_i != tetrahedron_j;
                        let ring_violation = all_flat || {
                            let opp_j_position = self.nodes[opp_j].position;
                            let opp_i_position = self.nodes[opp_i].position;
                            self.is_truly_inside_sphere(tetrahedron_j, opp_j_position)
                                && self.is_truly_inside_sphere(tetrahedron_i, opp_i_position)
                        };
                        if ring_violation {
                            let pair =
                                self.flip_3_to_2(tetrahedron, tetrahedron_i, tetrahedron_j);
                            new_tetrahedra.extend(pair);
                            break;
                        }
                    }
                    if new_tetrahedra.is_empty() {
                        if both_flat && self.tetrahedra[tetrahedron].is_adjacent_to(node_i) {
                            new_tetrahedra = self.remove_flat_pair(tetrahedron, tetrahedron_i);
                        } else if !self.tetrahedra[tetrahedron].is_flat()
                            && !self.tetrahedra[tetrahedron_i].is_flat()
                        {
                            if let Some(triple) = self.flip_2_to_3(tetrahedron, tetrahedron_i) {
                                new_tetrahedra.extend(triple);
                            }
                        }
                    }
                    if new_tetrahedra.is_empty() {
                        // No flip applies here; park both and move on.
                        problem_tetrahedra.push(tetrahedron);
                        problem_tetrahedra.push(tetrahedron_i);
                        active.push_back(tetrahedron_i);
                    } else {
                        for &tet in &new_tetrahedra {
                            active.push_back(tet);
                            if self.tetrahedra[tet].is_flat() {
                                flat_tetrahedra.push(tet);
                            }
                        }
                        break;
                    }
                }
            }

            let messed_up = self.collect_messed_up(&flat_tetrahedra, &problem_tetrahedra);
            if !messed_up.is_empty() {
                debug!(count = messed_up.len(), "cleaning up blocked tetrahedra");
                self.clean_up(&messed_up)?;
            }
        }
        Ok(())
    }

    /// Surviving flat tetrahedra (with their neighbors) and problem
    /// tetrahedra that still violate the sphere property.
    fn collect_messed_up(
        &mut self,
        flat_tetrahedra: &[TetrahedronKey],
        problem_tetrahedra: &[TetrahedronKey],
    ) -> Vec<TetrahedronKey> {
        let mut messed_up: Vec<TetrahedronKey> = Vec::new();
        for &flat in flat_tetrahedra {
            if !self.tetrahedra.contains_key(flat) || messed_up.contains(&flat) {
                continue;
            }
            for triangle in self.tetrahedra[flat].triangles {
                let Some(opposite) = self.triangles[triangle].opposite_tetrahedron(Some(flat))
                else {
                    continue;
                };
                if self.tetrahedra.contains_key(opposite) && !messed_up.contains(&opposite) {
                    messed_up.push(opposite);
                }
            }
            messed_up.push(flat);
        }
        for &tetrahedron in problem_tetrahedra {
            if !self.tetrahedra.contains_key(tetrahedron)
                || self.tetrahedra[tetrahedron].is_flat()
                || messed_up.contains(&tetrahedron)
            {
                continue;
            }
            for triangle in self.tetrahedra[tetrahedron].triangles {
                let Some(opposite) = self.triangles[triangle].opposite_tetrahedron(Some(tetrahedron))
                else {
                    continue;
                };
                if self.tetrahedra[opposite].is_infinite() {
                    continue;
                }
                let Some(opposite_node) =
                    self.tetrahedron_opposite_node(opposite, triangle).flatten()
                else {
                    continue;
                };
                let position = self.nodes[opposite_node].position;
                if self.is_truly_inside_sphere(tetrahedron, position) {
                    messed_up.push(tetrahedron);
                    break;
                }
            }
        }
        messed_up
    }

    /// Carves the blocked region out — the messed-up tetrahedra plus every
    /// reachable neighbor that is flat or still covers a cavity node — and
    /// retriangulates the hole.
    pub(crate) fn clean_up(
        &mut self,
        messed_up_tetrahedra: &[TetrahedronKey],
    ) -> Result<(), TriangulationError> {
        self.stats.cleanup_runs += 1;
        let mut oto = OpenTriangleOrganizer::new();
        let mut outer_tetrahedra: Vec<TetrahedronKey> = Vec::new();
        let mut problem_nodes: Vec<NodeKey> = Vec::new();
        for &tetrahedron in messed_up_tetrahedra {
            if self.tetrahedra.contains_key(tetrahedron) {
                self.remove_tetrahedron_during_cleanup(
                    tetrahedron,
                    &mut outer_tetrahedra,
                    &mut problem_nodes,
                    &mut oto,
                );
                outer_tetrahedra.retain(|&t| t != tetrahedron);
            }
        }
        let mut budget = CLEANUP_BUDGET;
        loop {
            budget = budget.checked_sub(1).ok_or_else(|| {
                warn!("cleanup budget exhausted");
                TriangulationError::InvariantViolated {
                    detail: "cleanup expansion budget exhausted".into(),
                }
            })?;
            let mut problem_tetrahedron: Option<TetrahedronKey> = None;
            'outer: for index in 0..outer_tetrahedra.len() {
                let outer = outer_tetrahedra[index];
                if !self.tetrahedra.contains_key(outer) {
                    continue;
                }
                for node_index in 0..problem_nodes.len() {
                    let node = problem_nodes[node_index];
                    if self.tetrahedra[outer].is_adjacent_to(node) {
                        continue;
                    }
                    let position = self.nodes[node].position;
                    if self.tetrahedra[outer].is_flat() || self.is_inside_sphere(outer, position) {
                        self.remove_tetrahedron_during_cleanup(
                            outer,
                            &mut outer_tetrahedra,
                            &mut problem_nodes,
                            &mut oto,
                        );
                        problem_tetrahedron = Some(outer);
                        break 'outer;
                    }
                }
            }
            match problem_tetrahedron {
                Some(tetrahedron) => outer_tetrahedra.retain(|&t| t != tetrahedron),
                None => break,
            }
        }
        self.organizer_triangulate(&mut oto)
    }

    fn remove_tetrahedron_during_cleanup(
        &mut self,
        tetrahedron: TetrahedronKey,
        outer_tetrahedra: &mut Vec<TetrahedronKey>,
        problem_nodes: &mut Vec<NodeKey>,
        oto: &mut OpenTriangleOrganizer,
    ) {
        let nodes = self.tetrahedra[tetrahedron].nodes;
        let triangles = self.tetrahedra[tetrahedron].triangles;
        for node in nodes.into_iter().flatten() {
            if !problem_nodes.contains(&node) {
                problem_nodes.push(node);
            }
        }
        for triangle in triangles {
            if let Some(opposite) = self.triangles[triangle].opposite_tetrahedron(Some(tetrahedron))
            {
                if !outer_tetrahedra.contains(&opposite) {
                    outer_tetrahedra.push(opposite);
                }
            }
        }
        self.remove_tetrahedron(tetrahedron);
        for triangle in triangles {
            if !self.triangles.contains_key(triangle) {
                continue;
            }
            if self.triangles[triangle].is_completely_open() {
                self.organizer_remove_triangle(oto, triangle);
            } else {
                self.organizer_put_triangle(oto, triangle);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::prelude::*;

    /// A triangular bipyramid (base P1 P2 P3, apexes T above and B below)
    /// with an interior node Q. Q's link is the convex bipyramid surface,
    /// so any interior move takes the fast path; pulling Q from just above
    /// the base up toward T makes the tetrahedra between Q and B so tall
    /// that their circumspheres swallow base nodes, forcing flips.
    #[test]
    fn interior_motion_restores_delaunay_with_flips() {
        let mut tri: Triangulation<usize> = Triangulation::default();
        let p1 = tri.insert_first_node([0.0, 0.0, 0.0], 1);
        let p2 = tri.insert_near(p1, [8.0, 0.0, 0.0], 2).unwrap();
        let _p3 = tri.insert_near(p2, [4.0, 7.0, 0.0], 3).unwrap();
        let _top = tri.insert_near(p1, [4.0, 2.5, 6.0], 4).unwrap();
        let _bottom = tri.insert_near(p1, [4.0, 2.5, -6.0], 5).unwrap();
        let q = tri.insert_near(p1, [4.0, 2.5, 1.0], 6).unwrap();
        tri.validate_structure().unwrap();
        tri.validate_delaunay().unwrap();
        // Q must be interior: no incident infinite tetrahedron.
        assert!(tri
            .node(q)
            .unwrap()
            .tetrahedra()
            .iter()
            .all(|&t| !tri.tetrahedron(t).unwrap().is_infinite()));
        tri.reset_stats();

        tri.move_node_to(q, [4.0, 2.5, 4.5].into()).unwrap();
        tri.validate_structure().unwrap();
        tri.validate_delaunay().unwrap();

        let stats = tri.stats();
        assert!(stats.restoration_passes >= 1, "fast path expected: {stats:?}");
        assert!(
            stats.flips_2_to_3 + stats.flips_3_to_2 + stats.flat_pair_removals + stats.cleanup_runs
                >= 1,
            "this move provably violates the empty-sphere property: {stats:?}"
        );
    }

    #[test]
    fn small_interior_motion_keeps_structure() {
        let mut tri: Triangulation<()> = Triangulation::default();
        let a = tri.insert_first_node([0.0, 0.0, 0.0], ());
        let b = tri.insert_near(a, [6.0, 0.0, 0.0], ()).unwrap();
        let _ = tri.insert_near(b, [0.0, 6.0, 0.0], ()).unwrap();
        let _ = tri.insert_near(a, [0.0, 0.0, 6.0], ()).unwrap();
        let e = tri.insert_near(a, [1.0, 1.0, 1.0], ()).unwrap();
        tri.reset_stats();

        tri.move_node_to(e, [1.05, 1.0, 1.0].into()).unwrap();
        tri.validate_structure().unwrap();
        tri.validate_delaunay().unwrap();
        assert!(tri.stats().restoration_passes >= 1);
    }
}
