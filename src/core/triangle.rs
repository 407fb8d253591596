//! Triangles of the triangulation.
//!
//! A triangle is an unordered triple of nodes with at most two incident
//! tetrahedra, one per side. Slot 0 of the node array is empty for an
//! *infinite* triangle (a hull face of an infinite tetrahedron). The plane
//! equation and the circumcircle center are cached lazily and invalidated
//! when an endpoint moves.
//!
//! The "signed Delaunay distance" of a point to a triangle — the signed
//! offset of the circumsphere center through the triangle's three nodes and
//! that point, measured along the triangle normal — drives the gift-wrapping
//! retriangulation of cavities: the apex minimizing it is the Delaunay
//! choice.

use nalgebra::Vector3;

use crate::core::triangulation::{NodeKey, TetrahedronKey, TriangleKey, Triangulation};
use crate::geometry::exact::{ExactScalar, ExactVector};
use crate::geometry::plane::Plane;
use crate::geometry::predicates::{det3, three_planes_intersection, triangle_circumcenter_exact};

/// A triangle between three nodes, bounding up to two tetrahedra.
#[derive(Debug)]
pub struct Triangle {
    pub(crate) nodes: [Option<NodeKey>; 3],
    pub(crate) tetrahedra: [Option<TetrahedronKey>; 2],
    pub(crate) plane: Plane,
    normal_updated: bool,
    plane_updated: bool,
    pub(crate) circum_center: Vector3<f64>,
    circum_center_updated: bool,
    pub(crate) upper_side_positive: bool,
    checked: i64,
    pub(crate) in_organizer: bool,
}

impl Triangle {
    pub(crate) fn new(a: Option<NodeKey>, b: Option<NodeKey>, c: Option<NodeKey>) -> Self {
        // An absent node always occupies slot 0.
        let nodes = if a.is_none() || b.is_none() || c.is_none() {
            let mut reals = [a, b, c].into_iter().flatten();
            let first = reals.next();
            let second = reals.next();
            [None, first, second]
        } else {
            [a, b, c]
        };
        Self {
            nodes,
            tetrahedra: [None, None],
            plane: Plane::default(),
            normal_updated: false,
            plane_updated: false,
            circum_center: Vector3::zeros(),
            circum_center_updated: false,
            upper_side_positive: true,
            checked: -1,
            in_organizer: false,
        }
    }

    /// The three node slots; slot 0 is `None` for an infinite triangle.
    #[must_use]
    pub fn nodes(&self) -> [Option<NodeKey>; 3] {
        self.nodes
    }

    /// Whether this triangle touches the infinite vertex.
    #[must_use]
    pub fn is_infinite(&self) -> bool {
        self.nodes[0].is_none()
    }

    /// Whether `node` is one of the endpoints.
    #[must_use]
    pub fn is_adjacent_to_node(&self, node: NodeKey) -> bool {
        self.nodes.contains(&Some(node))
    }

    /// Whether `tet` occupies one of the two sides.
    #[must_use]
    pub fn is_adjacent_to_tetrahedron(&self, tet: TetrahedronKey) -> bool {
        self.tetrahedra.contains(&Some(tet))
    }

    /// Whether the other triangle spans the same three nodes.
    #[must_use]
    pub fn is_similar_to(&self, other: &Self) -> bool {
        other
            .nodes
            .iter()
            .all(|n| n.map_or(self.is_infinite(), |key| self.is_adjacent_to_node(key)))
    }

    /// Both sides unoccupied.
    #[must_use]
    pub fn is_completely_open(&self) -> bool {
        self.tetrahedra == [None, None]
    }

    /// Both sides occupied.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tetrahedra[0].is_some() && self.tetrahedra[1].is_some()
    }

    /// The tetrahedron on the other side of `of` (which may be `None` to ask
    /// for the single tetrahedron of an open triangle).
    #[must_use]
    pub fn opposite_tetrahedron(&self, of: Option<TetrahedronKey>) -> Option<TetrahedronKey> {
        if self.tetrahedra[0] == of {
            self.tetrahedra[1]
        } else {
            debug_assert_eq!(self.tetrahedra[1], of, "tetrahedron not incident");
            self.tetrahedra[0]
        }
    }

    pub(crate) fn add_tetrahedron(&mut self, tet: TetrahedronKey) {
        if self.tetrahedra[0].is_none() {
            self.tetrahedra[0] = Some(tet);
        } else {
            self.tetrahedra[1] = Some(tet);
        }
        self.checked = -1;
    }

    pub(crate) fn remove_tetrahedron(&mut self, tet: TetrahedronKey) {
        if self.tetrahedra[0] == Some(tet) {
            self.tetrahedra[0] = None;
        } else {
            self.tetrahedra[1] = None;
        }
    }

    /// Stamps the triangle with `checking_index`; returns whether it already
    /// carried that stamp (i.e. this (triangle, pass) pair was visited).
    pub(crate) fn was_checked_already(&mut self, checking_index: i64) -> bool {
        if self.checked == checking_index {
            true
        } else {
            self.checked = checking_index;
            false
        }
    }

    /// Clears the checking-index stamp; freshly re-wired triangles must be
    /// revisited by the running restoration pass.
    pub(crate) fn reset_check(&mut self) {
        self.checked = -1;
    }

    /// Invalidates the cached plane equation and circumcircle after an
    /// endpoint moved.
    pub(crate) fn mark_geometry_dirty(&mut self) {
        self.circum_center_updated = false;
        self.plane_updated = false;
        self.normal_updated = false;
    }
}

impl<U> Triangulation<U> {
    pub(crate) fn create_triangle(
        &mut self,
        a: Option<NodeKey>,
        b: Option<NodeKey>,
        c: Option<NodeKey>,
    ) -> TriangleKey {
        self.triangles.insert(Triangle::new(a, b, c))
    }

    /// Drops a triangle from the arena once nothing references it: both
    /// sides open and no organizer holds it.
    pub(crate) fn discard_triangle_if_orphaned(&mut self, triangle: TriangleKey) {
        if let Some(t) = self.triangles.get(triangle) {
            if t.is_completely_open() && !t.in_organizer {
                self.triangles.remove(triangle);
            }
        }
    }

    /// Positions of the three endpoints; `None` for infinite triangles.
    pub(crate) fn triangle_positions(&self, triangle: TriangleKey) -> Option<[Vector3<f64>; 3]> {
        let t = &self.triangles[triangle];
        Some([
            self.nodes[t.nodes[0]?].position,
            self.nodes[t.nodes[1]?].position,
            self.nodes[t.nodes[2]?].position,
        ])
    }

    /// Recomputes the plane equation if an endpoint movement invalidated it.
    pub(crate) fn triangle_update_plane(&mut self, triangle: TriangleKey) {
        if self.triangles[triangle].plane_updated {
            return;
        }
        let Some([a, b, c]) = self.triangle_positions(triangle) else {
            return;
        };
        let t = &mut self.triangles[triangle];
        if !t.normal_updated {
            let normal = (b - a).cross(&(c - a));
            t.plane.normal = normal;
            t.plane.tolerance = normal.dot(&normal) * Plane::RELATIVE_TOLERANCE;
            t.normal_updated = true;
        }
        t.plane.offset = t.plane.normal.dot(&a);
        t.plane_updated = true;
    }

    /// Recomputes the circumcircle center (and with it the plane normal) if
    /// necessary.
    pub(crate) fn triangle_update_circumcircle(&mut self, triangle: TriangleKey) {
        if self.triangles[triangle].circum_center_updated {
            return;
        }
        let Some([a, b, c]) = self.triangle_positions(triangle) else {
            return;
        };
        let n0 = (b - a).normalize();
        let n1 = (c - a).normalize();
        let n2 = n0.cross(&n1);
        let normals = [n0, n1, n2];
        let offsets = [
            (a + b).dot(&n0) * 0.5,
            (a + c).dot(&n1) * 0.5,
            a.dot(&n2),
        ];
        let center = three_planes_intersection(&normals, offsets, det3(&normals));
        let t = &mut self.triangles[triangle];
        t.circum_center = center;
        t.circum_center_updated = true;
        t.plane.normal = n2;
        t.plane.offset = n2.dot(&a);
        t.plane.tolerance = n2.dot(&n2) * Plane::RELATIVE_TOLERANCE;
        t.normal_updated = true;
    }

    /// Refreshes both cached quantities.
    pub(crate) fn triangle_update(&mut self, triangle: TriangleKey) {
        self.triangle_update_circumcircle(triangle);
        self.triangle_update_plane(triangle);
    }

    /// Exact plane normal and first vertex, from the current node positions.
    fn triangle_exact_plane(&self, triangle: TriangleKey) -> Option<(ExactVector, ExactVector)> {
        let [a, b, c] = self.triangle_positions(triangle)?;
        let pa = ExactVector::from_f64(a);
        let normal = ExactVector::from_f64(b)
            .sub(&pa)
            .cross(&ExactVector::from_f64(c).sub(&pa));
        Some((normal, pa))
    }

    /// Returns +1 if `point_1` and `point_2` lie on the same side of the
    /// triangle's plane, −1 for different sides, 0 if either lies in it.
    ///
    /// Near-plane queries are settled exactly from the node positions rather
    /// than from the cached floating-point plane.
    pub(crate) fn triangle_orientation(
        &mut self,
        triangle: TriangleKey,
        point_1: Vector3<f64>,
        point_2: Vector3<f64>,
    ) -> i32 {
        self.triangle_update_plane(triangle);
        let plane = self.triangles[triangle].plane;
        let side = |dot: f64| {
            if dot > plane.offset + plane.tolerance {
                1
            } else if dot < plane.offset - plane.tolerance {
                -1
            } else {
                0
            }
        };
        let s1 = side(point_1.dot(&plane.normal));
        let s2 = side(point_2.dot(&plane.normal));
        if s1 != 0 && s2 != 0 {
            s1 * s2
        } else {
            self.triangle_orientation_exact(triangle, point_1, point_2)
        }
    }

    fn triangle_orientation_exact(
        &mut self,
        triangle: TriangleKey,
        point_1: Vector3<f64>,
        point_2: Vector3<f64>,
    ) -> i32 {
        self.stats.exact_predicate_calls += 1;
        if let Some((normal, pa)) = self.triangle_exact_plane(triangle) {
            let offset = normal.dot(&pa);
            let dot_1 = normal.dot(&ExactVector::from_f64(point_1));
            let dot_2 = normal.dot(&ExactVector::from_f64(point_2));
            dot_1.compare(&offset) * dot_2.compare(&offset)
        } else {
            self.triangles[triangle]
                .plane
                .orientation_exact(point_1, point_2)
        }
    }

    /// Side of the *oriented* plane: +1 on the upper side, −1 on the lower,
    /// 0 in the plane, where "upper" follows `upper_side_positive`.
    pub(crate) fn triangle_orientation_to_upper_side(
        &mut self,
        triangle: TriangleKey,
        point: Vector3<f64>,
    ) -> i32 {
        self.triangle_update_plane(triangle);
        let plane = self.triangles[triangle].plane;
        let upper = self.triangles[triangle].upper_side_positive;
        let dot = point.dot(&plane.normal);
        if dot > plane.offset + plane.tolerance {
            if upper { 1 } else { -1 }
        } else if dot < plane.offset - plane.tolerance {
            if upper { -1 } else { 1 }
        } else {
            self.stats.exact_predicate_calls += 1;
            let Some((normal, pa)) = self.triangle_exact_plane(triangle) else {
                return 0;
            };
            let dot_1 = normal.dot(&pa);
            let dot_2 = normal.dot(&ExactVector::from_f64(point));
            match dot_1.compare(&dot_2) {
                0 => 0,
                cmp => {
                    if (cmp > 0) ^ upper {
                        1
                    } else {
                        -1
                    }
                }
            }
        }
    }

    pub(crate) fn triangle_on_upper_side(
        &mut self,
        triangle: TriangleKey,
        point: Vector3<f64>,
    ) -> bool {
        self.triangle_orientation_to_upper_side(triangle, point) >= 0
    }

    /// Chooses the upper side so that `position` lies on it.
    pub(crate) fn triangle_orient_to_side(&mut self, triangle: TriangleKey, position: Vector3<f64>) {
        if self.triangles[triangle].is_infinite() {
            return;
        }
        self.triangle_update_plane(triangle);
        let plane = self.triangles[triangle].plane;
        let dot = position.dot(&plane.normal);
        let upper = if dot > plane.offset + plane.tolerance {
            true
        } else if dot < plane.offset - plane.tolerance {
            false
        } else {
            self.stats.exact_predicate_calls += 1;
            let Some((normal, pa)) = self.triangle_exact_plane(triangle) else {
                return;
            };
            let dot_1 = normal.dot(&pa);
            let dot_2 = normal.dot(&ExactVector::from_f64(position));
            let comparison = dot_1.compare(&dot_2);
            if comparison == 0 {
                // An exactly in-plane point (flat neighborhood) cannot pick
                // a side; keep the current orientation.
                return;
            }
            comparison < 0
        };
        self.triangles[triangle].upper_side_positive = upper;
    }

    /// Orients the upper side toward the open (tetrahedron-free) side.
    pub(crate) fn triangle_orient_to_open_side(&mut self, triangle: TriangleKey) {
        let t = &self.triangles[triangle];
        if t.is_infinite() {
            return;
        }
        debug_assert!(!t.is_closed() && !t.is_completely_open());
        let occupied = t.tetrahedra[0].or(t.tetrahedra[1]);
        let Some(tet) = occupied else { return };
        if self.tetrahedra[tet].is_infinite() {
            return;
        }
        let Some(Some(node)) = self.tetrahedron_opposite_node(tet, triangle) else {
            return;
        };
        let position = self.nodes[node].position;
        self.triangle_orient_to_side(triangle, position);
        let t = &mut self.triangles[triangle];
        t.upper_side_positive ^= true;
    }

    /// Position of `point` relative to the circumcircle through the three
    /// endpoints: +1 strictly inside, 0 on the circle, −1 outside.
    pub(crate) fn triangle_circle_orientation(
        &mut self,
        triangle: TriangleKey,
        point: Vector3<f64>,
    ) -> i32 {
        self.triangle_update_circumcircle(triangle);
        let Some([a, _, _]) = self.triangle_positions(triangle) else {
            return -1;
        };
        let center = self.triangles[triangle].circum_center;
        let squared_distance = (point - center).norm_squared();
        let squared_radius = (a - center).norm_squared();
        let tolerance = squared_radius * Plane::RELATIVE_TOLERANCE;
        if squared_distance >= squared_radius + tolerance {
            return -1;
        }
        if squared_distance > squared_radius - tolerance {
            self.stats.exact_predicate_calls += 1;
            let points = self.triangle_exact_positions(triangle);
            let Some((normal, _)) = self.triangle_exact_plane(triangle) else {
                return 0;
            };
            let Some(center) = triangle_circumcenter_exact(&points, &normal) else {
                return 0;
            };
            let point_distance = center
                .sub(&ExactVector::from_f64(point))
                .squared_length();
            let squared_radius = center.sub(&points[0]).squared_length();
            squared_radius.compare(&point_distance)
        } else {
            1
        }
    }

    fn triangle_exact_positions(&self, triangle: TriangleKey) -> [ExactVector; 3] {
        let positions = self
            .triangle_positions(triangle)
            .expect("finite triangle expected");
        [
            ExactVector::from_f64(positions[0]),
            ExactVector::from_f64(positions[1]),
            ExactVector::from_f64(positions[2]),
        ]
    }

    /// Signed Delaunay distance of `fourth_point`, oriented by the current
    /// upper side. Points not on the upper side get `f64::MAX`.
    pub(crate) fn triangle_sd_distance(
        &mut self,
        triangle: TriangleKey,
        fourth_point: Vector3<f64>,
    ) -> f64 {
        if self.triangles[triangle].is_infinite()
            || !self.triangle_on_upper_side(triangle, fourth_point)
        {
            return f64::MAX;
        }
        let sd_distance = self.triangle_raw_sd_distance(triangle, fourth_point);
        if sd_distance == f64::MAX {
            f64::MAX
        } else if self.triangles[triangle].upper_side_positive {
            sd_distance
        } else {
            -sd_distance
        }
    }

    /// The unsigned solve behind [`Self::triangle_sd_distance`]: the offset
    /// along the normal from the circumcircle center to the center of the
    /// sphere through the three endpoints and `fourth_point`.
    fn triangle_raw_sd_distance(
        &mut self,
        triangle: TriangleKey,
        fourth_point: Vector3<f64>,
    ) -> f64 {
        self.triangle_update(triangle);
        let Some([a, _, _]) = self.triangle_positions(triangle) else {
            return f64::MAX;
        };
        let t = &self.triangles[triangle];
        let normal = t.plane.normal;
        let tolerance = t.plane.tolerance;
        let center = t.circum_center;
        let ad = a - fourth_point;
        let mut denominator = ad.dot(&normal);
        if denominator != 0.0 && denominator.abs() < tolerance {
            // The float denominator is not trustworthy; recompute its sign
            // and magnitude from the exact plane normal.
            self.stats.exact_predicate_calls += 1;
            let points = self.triangle_exact_positions(triangle);
            let exact_normal = points[0]
                .sub(&points[1])
                .cross(&points[0].sub(&points[2]));
            let dot = exact_normal.dot(&points[0].sub(&ExactVector::from_f64(fourth_point)));
            if dot.is_zero() {
                denominator = 0.0;
            } else {
                denominator = dot.to_f64();
                let alignment = exact_normal.dot(&ExactVector::from_f64(normal));
                if alignment.signum() < 0 {
                    denominator = -denominator;
                }
            }
        }
        if denominator == 0.0 {
            return f64::MAX;
        }
        ad.dot(&((a + fourth_point) * 0.5 - center)) / denominator
    }

    /// Exact counterpart of [`Self::triangle_sd_distance`].
    pub(crate) fn triangle_sd_distance_exact(
        &mut self,
        triangle: TriangleKey,
        fourth_point: Vector3<f64>,
    ) -> ExactScalar {
        if self.triangles[triangle].is_infinite()
            || !self.triangle_on_upper_side(triangle, fourth_point)
        {
            return ExactScalar::from_f64(f64::MAX);
        }
        self.triangle_update(triangle);
        let points = self.triangle_exact_positions(triangle);
        let fourth = ExactVector::from_f64(fourth_point);
        let mut normal = points[1]
            .sub(&points[0])
            .cross(&points[2].sub(&points[0]));
        let float_normal = ExactVector::from_f64(self.triangles[triangle].plane.normal);
        if normal.dot(&float_normal).signum() < 0 {
            normal = normal.negate();
        }
        let distance = exact_sd_distance(&points, &fourth, &normal);
        if self.triangles[triangle].upper_side_positive {
            distance
        } else {
            -&distance
        }
    }

    /// A length scale for tolerances around the signed Delaunay distance.
    pub(crate) fn triangle_typical_sd_distance(&mut self, triangle: TriangleKey) -> f64 {
        if self.triangles[triangle].is_infinite() {
            return f64::MAX;
        }
        self.triangle_update(triangle);
        let [a, _, _] = self
            .triangle_positions(triangle)
            .expect("finite triangle expected");
        let t = &self.triangles[triangle];
        (a - t.circum_center).norm() / t.plane.normal.norm()
    }
}

/// Exact signed-Delaunay-distance solve over the given exact positions.
fn exact_sd_distance(
    points: &[ExactVector; 3],
    fourth: &ExactVector,
    normal: &ExactVector,
) -> ExactScalar {
    let ad = points[0].sub(fourth);
    let denominator = ad.dot(normal);
    if denominator.is_zero() {
        return ExactScalar::from_f64(f64::MAX);
    }
    let Some(center) = triangle_circumcenter_exact(points, normal) else {
        return ExactScalar::from_f64(f64::MAX);
    };
    let half = ExactScalar::ratio(1, 2);
    let midpoint = points[0].add(fourth).scale(&half);
    &midpoint.sub(&center).dot(&ad) / &denominator
}
