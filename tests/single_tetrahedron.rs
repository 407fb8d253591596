//! End-to-end checks on the smallest possible triangulation: one finite
//! tetrahedron plus its four infinite hull cells.

use approx::assert_relative_eq;
use kinetic_delaunay::prelude::*;

fn build() -> (Triangulation<char>, [NodeKey; 4]) {
    let mut tri: Triangulation<char> = Triangulation::default();
    let a = tri.insert_first_node([0.0, 0.0, 0.0], 'a');
    let b = tri.insert_near(a, [1.0, 0.0, 0.0], 'b').unwrap();
    let c = tri.insert_near(b, [0.0, 1.0, 0.0], 'c').unwrap();
    let d = tri.insert_near(a, [0.0, 0.0, 1.0], 'd').unwrap();
    (tri, [a, b, c, d])
}

#[test]
fn single_tetrahedron_counts_and_volume() {
    let (mut tri, _) = build();
    assert_eq!(tri.number_of_nodes(), 4);
    assert_eq!(tri.number_of_finite_tetrahedra(), 1);
    assert_eq!(tri.number_of_tetrahedra(), 5);
    assert_eq!(tri.number_of_finite_triangles(), 4);
    assert_eq!(tri.number_of_edges(), 6);
    assert_relative_eq!(tri.total_volume(), 1.0 / 6.0, epsilon = 1e-12);
    tri.validate_structure().unwrap();
    tri.validate_delaunay().unwrap();
}

#[test]
fn duplicate_point_is_rejected_and_state_unchanged() {
    let (mut tri, [a, ..]) = build();
    let nodes = tri.number_of_nodes();
    let tets = tri.number_of_tetrahedra();
    let triangles = tri.number_of_triangles();
    let edges = tri.number_of_edges();
    let volume = tri.total_volume();

    let result = tri.insert_near(a, [0.0, 0.0, 0.0], 'x');
    assert_eq!(
        result,
        Err(TriangulationError::PositionNotAllowed {
            position: [0.0, 0.0, 0.0],
        })
    );

    assert_eq!(tri.number_of_nodes(), nodes);
    assert_eq!(tri.number_of_tetrahedra(), tets);
    assert_eq!(tri.number_of_triangles(), triangles);
    assert_eq!(tri.number_of_edges(), edges);
    assert_relative_eq!(tri.total_volume(), volume, epsilon = 1e-15);
    tri.validate_structure().unwrap();
}

#[test]
fn node_accessors_expose_user_objects_and_adjacency() {
    let (mut tri, [a, b, ..]) = build();
    assert_eq!(tri.user_object(a), Some(&'a'));
    *tri.user_object_mut(b).unwrap() = 'B';
    assert_eq!(tri.user_object(b), Some(&'B'));

    let mut names: Vec<char> = tri.neighbors(a).into_iter().copied().collect();
    names.sort_unstable();
    assert_eq!(names, vec!['B', 'c', 'd']);

    let node = tri.node(a).unwrap();
    assert_eq!(node.edges().len(), 3);
    // One finite tetrahedron plus three infinite hull cells touch `a`.
    assert_eq!(node.tetrahedra().len(), 4);
    assert_relative_eq!(node.volume(), (1.0 / 6.0) / 4.0, epsilon = 1e-12);

    let cell = tri
        .vertices_of_tetrahedron_containing(a, [0.2, 0.2, 0.2])
        .unwrap();
    let mut cell_names: Vec<char> = cell.into_iter().copied().collect();
    cell_names.sort_unstable();
    assert_eq!(cell_names, vec!['B', 'a', 'c', 'd']);
}

/// A query exactly on a circumsphere must always go through the exact
/// predicate and give the same answer, run after run.
#[test]
fn on_sphere_queries_are_deterministic() {
    for _ in 0..8 {
        let (mut tri, _) = build();
        let tet = tri
            .tetrahedron_keys()
            .find(|&t| !tri.tetrahedron(t).unwrap().is_infinite())
            .unwrap();
        // Circumsphere of the unit tetrahedron: center (0.5, 0.5, 0.5),
        // squared radius 0.75. The point (1, 1, 0) lies exactly on it.
        let before = tri.stats().exact_predicate_calls;
        assert_eq!(
            tri.circumsphere_orientation(tet, Vector3::new(1.0, 1.0, 0.0)),
            0
        );
        assert!(tri.stats().exact_predicate_calls > before);
        assert_eq!(
            tri.circumsphere_orientation(tet, Vector3::new(1.0, 1.0, 0.0)),
            0
        );
    }
}
