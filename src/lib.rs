//! # kinetic-delaunay
//!
//! A dynamic (kinetic) 3D Delaunay tetrahedralization kernel. The
//! triangulation is maintained incrementally over a moving, growing, and
//! shrinking point set: points can be inserted, removed, and moved, and the
//! kernel restores the Delaunay empty-circumsphere property through local
//! 2↔3 flips, flat-tetrahedron removal, and cavity retriangulation.
//!
//! The kernel was built as the spatial-organization layer of a biophysical
//! tissue simulator: every node carries an opaque user object (the physics
//! layer's handle), publishes per-edge cross-section areas and per-node dual
//! volumes, and notifies movement listeners synchronously around every
//! mutation.
//!
//! # Basic usage
//!
//! ```rust
//! use kinetic_delaunay::prelude::*;
//!
//! let mut tri: Triangulation<&str> = Triangulation::default();
//!
//! // The first four nodes bootstrap the initial tetrahedron.
//! let a = tri.insert_first_node([0.0, 0.0, 0.0], "a");
//! let b = tri.insert_near(a, [1.0, 0.0, 0.0], "b").unwrap();
//! let _c = tri.insert_near(b, [0.0, 1.0, 0.0], "c").unwrap();
//! let d = tri.insert_near(a, [0.0, 0.0, 1.0], "d").unwrap();
//!
//! assert_eq!(tri.number_of_finite_tetrahedra(), 1);
//!
//! // Additional nodes go through cavity insertion.
//! let e = tri.insert_near(a, [0.25, 0.25, 0.25], "e").unwrap();
//! assert_eq!(tri.number_of_finite_tetrahedra(), 4);
//!
//! // Motion restores the Delaunay property through local flips.
//! tri.move_node_to(e, [0.3, 0.3, 0.3].into()).unwrap();
//! tri.validate_delaunay().unwrap();
//!
//! // Removal retriangulates the cavity.
//! tri.remove(e).unwrap();
//! assert_eq!(tri.number_of_finite_tetrahedra(), 1);
//! let _ = (d, tri.number_of_nodes());
//! ```
//!
//! # Structure
//!
//! - [`core`] — the spatial entities ([`core::node::SpaceNode`],
//!   [`core::edge::Edge`], [`core::triangle::Triangle`],
//!   [`core::tetrahedron::Tetrahedron`]), the open-triangle organizer used
//!   during cavity repair, and the mutation algorithms (insertion, removal,
//!   motion, Delaunay restoration).
//! - [`geometry`] — planes, the floating-point predicates with their
//!   propagated error envelopes, and the exact rational fallback used when a
//!   query lands inside an envelope.
//!
//! All entities live in arena maps keyed by stable, type-safe keys
//! ([`core::triangulation::NodeKey`] and friends); cross references between
//! entities are keys, never pointers, which keeps the cyclic
//! node↔edge↔triangle↔tetrahedron adjacency graph free of ownership cycles.
//!
//! # Concurrency
//!
//! A [`core::triangulation::Triangulation`] is single-threaded. Mutation
//! methods are not reentrant; movement listeners are invoked synchronously
//! inside the mutating call and receive a shared view of the triangulation,
//! which makes re-entering a mutating method impossible by construction.

/// Spatial entities, the open-triangle organizer, and the mutation
/// algorithms of the kernel.
pub mod core {
    /// Mutation algorithms: insertion, removal, flips, and Delaunay
    /// restoration.
    pub mod algorithms {
        pub mod flips;
        pub mod insertion;
        pub mod removal;
        pub mod restore;
    }
    pub mod collections;
    pub mod edge;
    pub mod error;
    pub mod listener;
    pub mod node;
    pub mod organizer;
    pub mod tetrahedron;
    pub mod triangle;
    pub mod triangulation;

    pub use error::*;
    pub use listener::*;
    pub use triangulation::*;
}

/// Geometric primitives and predicates: planes, circumsphere solves with
/// propagated error bounds, and the exact rational arithmetic fallback.
pub mod geometry {
    pub mod exact;
    pub mod plane;
    pub mod predicates;

    pub use exact::*;
    pub use plane::*;
    pub use predicates::*;
}

/// Re-exports of the types most downstream code needs.
pub mod prelude {
    pub use crate::core::error::TriangulationError;
    pub use crate::core::listener::{
        MovementListener, RandomTriangleOrder, SequentialTriangleOrder, TriangleOrderSource,
    };
    pub use crate::core::triangulation::{
        EdgeKey, NodeKey, RestorationStats, TetrahedronKey, TriangleKey, Triangulation,
    };
    pub use nalgebra::Vector3;
}
