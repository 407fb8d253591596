//! Property tests: the quantified invariants must hold after arbitrary
//! insert / move / remove sequences on generic point clouds.

use approx::relative_eq;
use kinetic_delaunay::prelude::*;
use proptest::prelude::*;

type Point = (f64, f64, f64);

fn coordinate() -> impl Strategy<Value = f64> {
    -10.0..10.0f64
}

fn point_cloud(max: usize) -> impl Strategy<Value = Vec<Point>> {
    prop::collection::vec((coordinate(), coordinate(), coordinate()), 4..max)
}

/// Inserts every point, chaining anchors; exact duplicates are skipped.
fn build(points: &[Point]) -> (Triangulation<usize>, Vec<NodeKey>) {
    let mut tri: Triangulation<usize> = Triangulation::default();
    let mut keys = Vec::new();
    let first = tri.insert_first_node([points[0].0, points[0].1, points[0].2], 0);
    keys.push(first);
    let mut anchor = first;
    for (index, point) in points.iter().enumerate().skip(1) {
        match tri.insert_near(anchor, [point.0, point.1, point.2], index) {
            Ok(key) => {
                keys.push(key);
                anchor = key;
            }
            Err(TriangulationError::PositionNotAllowed { .. }) => {}
            Err(error) => panic!("insertion failed: {error}"),
        }
    }
    (tri, keys)
}

fn interior_node(tri: &Triangulation<usize>, keys: &[NodeKey]) -> Option<NodeKey> {
    keys.iter().copied().find(|&key| {
        tri.node(key).is_some_and(|node| {
            !node.tetrahedra().is_empty()
                && node
                    .tetrahedra()
                    .iter()
                    .all(|&tet| !tri.tetrahedron(tet).unwrap().is_infinite())
        })
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn insertions_preserve_invariants(points in point_cloud(12)) {
        let (mut tri, keys) = build(&points);
        prop_assert!(tri.validate_structure().is_ok());
        prop_assert!(tri.validate_delaunay().is_ok());
        prop_assert_eq!(tri.number_of_nodes(), keys.len());
        // Dual volumes sum to the covered volume.
        let node_volume: f64 = keys
            .iter()
            .map(|&key| tri.node(key).unwrap().volume())
            .sum();
        prop_assert!(relative_eq!(
            node_volume,
            tri.total_volume(),
            epsilon = 1e-6,
            max_relative = 1e-6
        ));
    }

    #[test]
    fn small_interior_moves_preserve_invariants(
        points in point_cloud(10),
        dx in -0.05..0.05f64,
        dy in -0.05..0.05f64,
        dz in -0.05..0.05f64,
    ) {
        let (mut tri, keys) = build(&points);
        if let Some(node) = interior_node(&tri, &keys) {
            match tri.move_node_by(node, Vector3::new(dx, dy, dz)) {
                Ok(()) | Err(TriangulationError::PositionNotAllowed { .. }) => {}
                Err(error) => return Err(TestCaseError::fail(format!("move failed: {error}"))),
            }
        }
        prop_assert!(tri.validate_structure().is_ok());
        prop_assert!(tri.validate_delaunay().is_ok());
    }

    #[test]
    fn insert_remove_roundtrip_is_isomorphic(points in point_cloud(10)) {
        let (mut tri, keys) = build(&points);
        prop_assume!(tri.number_of_finite_tetrahedra() >= 1);

        let nodes = tri.number_of_nodes();
        let tetrahedra = tri.number_of_tetrahedra();
        let edges = tri.number_of_edges();
        let triangles = tri.number_of_triangles();
        let volume = tri.total_volume();

        // A point near the centroid of one finite tetrahedron is interior.
        let tet = tri
            .tetrahedron_keys()
            .find(|&t| {
                let t = tri.tetrahedron(t).unwrap();
                !t.is_infinite() && !t.is_flat()
            });
        prop_assume!(tet.is_some());
        let corners = tri.tetrahedron(tet.unwrap()).unwrap().nodes();
        let centroid = corners
            .iter()
            .flatten()
            .map(|&key| tri.node(key).unwrap().position())
            .sum::<Vector3<f64>>()
            / 4.0;

        let inserted = match tri.insert_near(keys[0], centroid, usize::MAX) {
            Ok(key) => key,
            Err(_) => return Ok(()),
        };
        tri.remove(inserted).unwrap();

        prop_assert_eq!(tri.number_of_nodes(), nodes);
        prop_assert_eq!(tri.number_of_tetrahedra(), tetrahedra);
        prop_assert_eq!(tri.number_of_edges(), edges);
        prop_assert_eq!(tri.number_of_triangles(), triangles);
        prop_assert!(relative_eq!(
            tri.total_volume(),
            volume,
            epsilon = 1e-6,
            max_relative = 1e-6
        ));
        prop_assert!(tri.validate_structure().is_ok());
        prop_assert!(tri.validate_delaunay().is_ok());
    }

    #[test]
    fn removals_preserve_invariants(points in point_cloud(10)) {
        let (mut tri, keys) = build(&points);
        prop_assume!(keys.len() > 5);
        // Remove an interior node if one exists, otherwise the last node.
        let victim = interior_node(&tri, &keys).unwrap_or(*keys.last().unwrap());
        tri.remove(victim).unwrap();
        prop_assert_eq!(tri.number_of_nodes(), keys.len() - 1);
        prop_assert!(tri.validate_structure().is_ok());
        prop_assert!(tri.validate_delaunay().is_ok());
    }
}
