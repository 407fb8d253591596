//! Shared geometric predicates: plane intersections, exact circumcenters,
//! and the exact in-sphere test backing the adaptive circumsphere predicate.
//!
//! Circumcenters are computed as the intersection of three planes: for a
//! triangle, the two perpendicular bisector planes of its edges and the
//! triangle's own plane; for a tetrahedron, the three bisector planes of the
//! edges incident to the first vertex. The same solve exists in a fast
//! floating-point variant and an exact rational variant.

use nalgebra::Vector3;

use crate::geometry::exact::{ExactScalar, ExactVector};

/// Determinant of the 3×3 matrix with the given rows (the scalar triple
/// product).
#[must_use]
pub fn det3(rows: &[Vector3<f64>; 3]) -> f64 {
    rows[0].dot(&rows[1].cross(&rows[2]))
}

/// Intersects the three planes `normals[i] · x = offsets[i]`.
///
/// `normal_det` must be the determinant of the normals; a zero determinant
/// yields the sentinel point at `f64::MAX` in every coordinate, which keeps
/// downstream distance comparisons well-defined without branching.
#[must_use]
pub fn three_planes_intersection(
    normals: &[Vector3<f64>; 3],
    offsets: [f64; 3],
    normal_det: f64,
) -> Vector3<f64> {
    if normal_det == 0.0 {
        return Vector3::repeat(f64::MAX);
    }
    let sum = normals[1].cross(&normals[2]) * offsets[0]
        + normals[2].cross(&normals[0]) * offsets[1]
        + normals[0].cross(&normals[1]) * offsets[2];
    sum / normal_det
}

/// Exact counterpart of [`three_planes_intersection`].
///
/// Returns `None` when the planes do not meet in a single point.
#[must_use]
pub fn three_planes_intersection_exact(
    normals: &[ExactVector; 3],
    offsets: &[ExactScalar; 3],
    normal_det: &ExactScalar,
) -> Option<ExactVector> {
    if normal_det.is_zero() {
        return None;
    }
    let sum = normals[1]
        .cross(&normals[2])
        .scale(&offsets[0])
        .add(&normals[2].cross(&normals[0]).scale(&offsets[1]))
        .add(&normals[0].cross(&normals[1]).scale(&offsets[2]));
    Some(sum.scale_div(normal_det))
}

/// Exact circumcenter of the triangle `points`, given an exact vector normal
/// to its plane.
///
/// Returns `None` for collinear points.
#[must_use]
pub fn triangle_circumcenter_exact(
    points: &[ExactVector; 3],
    normal: &ExactVector,
) -> Option<ExactVector> {
    let a = &points[0];
    let half = ExactScalar::ratio(1, 2);
    let normals = [
        points[1].sub(a),
        points[2].sub(a),
        normal.clone(),
    ];
    let offsets = [
        &points[1].add(a).dot(&normals[0]) * &half,
        &points[2].add(a).dot(&normals[1]) * &half,
        a.dot(&normals[2]),
    ];
    let det = ExactVector::det(&normals);
    three_planes_intersection_exact(&normals, &offsets, &det)
}

/// Exact in-sphere test: sign of `r² − |query − center|²` for the
/// circumsphere of the tetrahedron `corners`.
///
/// Returns +1 when `query` lies strictly inside the circumsphere, −1 when
/// strictly outside, and 0 on the sphere or when the four corners are
/// coplanar (no finite circumsphere exists).
#[must_use]
pub fn insphere_exact(corners: &[Vector3<f64>; 4], query: Vector3<f64>) -> i32 {
    let points: [ExactVector; 4] = [
        ExactVector::from_f64(corners[0]),
        ExactVector::from_f64(corners[1]),
        ExactVector::from_f64(corners[2]),
        ExactVector::from_f64(corners[3]),
    ];
    let normals = [
        points[1].sub(&points[0]),
        points[2].sub(&points[0]),
        points[3].sub(&points[0]),
    ];
    let det = ExactVector::det(&normals);
    let half = ExactScalar::ratio(1, 2);
    let offsets = [
        &points[0].add(&points[1]).dot(&normals[0]) * &half,
        &points[0].add(&points[2]).dot(&normals[1]) * &half,
        &points[0].add(&points[3]).dot(&normals[2]) * &half,
    ];
    let Some(center) = three_planes_intersection_exact(&normals, &offsets, &det) else {
        return 0;
    };
    let squared_radius = center.sub(&points[0]).squared_length();
    let squared_distance = center.sub(&ExactVector::from_f64(query)).squared_length();
    squared_radius.compare(&squared_distance)
}

/// Whether four points are exactly coplanar.
///
/// The float determinant decides whenever it is comfortably nonzero; values
/// inside a magnitude-scaled guard band are settled by the exact determinant.
#[must_use]
pub fn is_coplanar(points: &[Vector3<f64>; 4]) -> bool {
    let rows = [
        points[1] - points[0],
        points[2] - points[0],
        points[3] - points[0],
    ];
    let det = det3(&rows);
    let scale = rows
        .iter()
        .map(|r| r.amax())
        .fold(0.0_f64, f64::max)
        .powi(3);
    if det.abs() > scale * 1e-12 {
        return false;
    }
    let exact_rows = [
        ExactVector::from_f64(rows[0]),
        ExactVector::from_f64(rows[1]),
        ExactVector::from_f64(rows[2]),
    ];
    ExactVector::det(&exact_rows).is_zero()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn plane_intersection_unit_cube_corner() {
        let normals = [
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
            Vector3::new(0.0, 0.0, 1.0),
        ];
        let point = three_planes_intersection(&normals, [2.0, 3.0, 4.0], det3(&normals));
        assert_relative_eq!(point, Vector3::new(2.0, 3.0, 4.0));
    }

    #[test]
    fn degenerate_planes_yield_sentinel() {
        let normals = [
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(0.0, 0.0, 1.0),
        ];
        let point = three_planes_intersection(&normals, [0.0, 0.0, 0.0], det3(&normals));
        assert_eq!(point.x, f64::MAX);
    }

    #[test]
    fn exact_insphere_on_unit_tetrahedron() {
        let corners = [
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(2.0, 0.0, 0.0),
            Vector3::new(0.0, 2.0, 0.0),
            Vector3::new(0.0, 0.0, 2.0),
        ];
        // Circumcenter is (1, 1, 1), squared radius 3.
        assert_eq!(insphere_exact(&corners, Vector3::new(1.0, 1.0, 1.0)), 1);
        assert_eq!(insphere_exact(&corners, Vector3::new(2.0, 2.0, 0.0)), 0);
        assert_eq!(insphere_exact(&corners, Vector3::new(3.0, 3.0, 3.0)), -1);
    }

    #[test]
    fn exact_insphere_is_deterministic_on_boundary() {
        let corners = [
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(2.0, 0.0, 0.0),
            Vector3::new(0.0, 2.0, 0.0),
            Vector3::new(0.0, 0.0, 2.0),
        ];
        let on_sphere = Vector3::new(0.0, 2.0, 2.0);
        for _ in 0..8 {
            assert_eq!(insphere_exact(&corners, on_sphere), 0);
        }
    }

    #[test]
    fn coplanarity_check() {
        let flat = [
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
            Vector3::new(1.0, 1.0, 0.0),
        ];
        assert!(is_coplanar(&flat));
        let solid = [
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
            Vector3::new(0.0, 0.0, 1.0),
        ];
        assert!(!is_coplanar(&solid));
        // Nearly flat but not exactly: the guard band sends this to the
        // exact determinant, which must say "not coplanar".
        let nearly = [
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
            Vector3::new(1.0, 1.0, 1e-14),
        ];
        assert!(!is_coplanar(&nearly));
    }

    #[test]
    fn exact_triangle_circumcenter() {
        let points = [
            ExactVector::from_f64(Vector3::new(0.0, 0.0, 0.0)),
            ExactVector::from_f64(Vector3::new(2.0, 0.0, 0.0)),
            ExactVector::from_f64(Vector3::new(0.0, 2.0, 0.0)),
        ];
        let normal = points[1]
            .sub(&points[0])
            .cross(&points[2].sub(&points[0]));
        let center = triangle_circumcenter_exact(&points, &normal).unwrap();
        assert_eq!(center.0[0].compare(&ExactScalar::ratio(1, 1)), 0);
        assert_eq!(center.0[1].compare(&ExactScalar::ratio(1, 1)), 0);
        assert!(center.0[2].is_zero());
    }
}
