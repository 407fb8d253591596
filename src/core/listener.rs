//! External interfaces consumed from the physics layer: movement listeners
//! and the injected triangle-order source.

use nalgebra::Vector3;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::core::triangulation::{NodeKey, Triangulation};

/// Observer of node lifecycle and motion events.
///
/// All callbacks run synchronously inside the mutating call. Listeners
/// receive a shared view of the triangulation, so re-entering a mutating
/// method is impossible by construction. Default implementations are no-ops;
/// implement only the events of interest.
#[allow(unused_variables)]
pub trait MovementListener<U> {
    /// A node is about to move by `delta`; fired exactly once per motion,
    /// before the position changes.
    fn node_about_to_move(&mut self, tri: &Triangulation<U>, node: NodeKey, delta: Vector3<f64>) {}

    /// The node has moved and all flips have completed.
    fn node_moved(&mut self, tri: &Triangulation<U>, node: NodeKey) {}

    /// A node is about to be woven into the triangulation at `position`.
    ///
    /// `cell` holds the user objects of the four vertices of the tetrahedron
    /// that contains the position; one slot is `None` when that tetrahedron
    /// is infinite.
    fn node_about_to_be_added(
        &mut self,
        tri: &Triangulation<U>,
        node: NodeKey,
        position: Vector3<f64>,
        cell: [Option<&U>; 4],
    ) {
    }

    /// The node has been inserted.
    fn node_added(&mut self, tri: &Triangulation<U>, node: NodeKey) {}

    /// The node's geometry is about to be torn down.
    fn node_about_to_be_removed(&mut self, tri: &Triangulation<U>, node: NodeKey) {}

    /// The node has been removed and the cavity retriangulated.
    fn node_removed(&mut self, tri: &Triangulation<U>, node: NodeKey) {}
}

/// Supplier of the triangle visiting order for visibility-walk steps.
///
/// The walk crosses the first separating triangle it finds; randomizing the
/// order breaks ties in cospherical configurations and prevents walk cycles.
/// The source is injected so that tests and replays can be deterministic.
pub trait TriangleOrderSource {
    /// Returns a permutation of `{0, 1, 2, 3}`.
    fn generate(&mut self) -> [usize; 4];
}

/// Default order source: a uniformly random permutation per walk step.
#[derive(Debug)]
pub struct RandomTriangleOrder {
    rng: SmallRng,
}

impl RandomTriangleOrder {
    /// Creates a source seeded from entropy.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rng: SmallRng::from_entropy(),
        }
    }

    /// Creates a reproducible source from a fixed seed.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomTriangleOrder {
    fn default() -> Self {
        Self::new()
    }
}

impl TriangleOrderSource for RandomTriangleOrder {
    fn generate(&mut self) -> [usize; 4] {
        let mut order = [0, 1, 2, 3];
        // Fisher-Yates over four elements.
        for i in (1..4).rev() {
            let j = self.rng.gen_range(0..=i);
            order.swap(i, j);
        }
        order
    }
}

/// Deterministic order source returning `[0, 1, 2, 3]` every time.
///
/// Useful for reproducing walks in tests; not recommended for production
/// workloads with cospherical inputs.
#[derive(Clone, Copy, Debug, Default)]
pub struct SequentialTriangleOrder;

impl TriangleOrderSource for SequentialTriangleOrder {
    fn generate(&mut self) -> [usize; 4] {
        [0, 1, 2, 3]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_order_is_a_permutation() {
        let mut source = RandomTriangleOrder::seeded(7);
        for _ in 0..64 {
            let mut order = source.generate();
            order.sort_unstable();
            assert_eq!(order, [0, 1, 2, 3]);
        }
    }

    #[test]
    fn seeded_order_is_reproducible() {
        let mut a = RandomTriangleOrder::seeded(42);
        let mut b = RandomTriangleOrder::seeded(42);
        for _ in 0..16 {
            assert_eq!(a.generate(), b.generate());
        }
    }

    #[test]
    fn sequential_order() {
        assert_eq!(SequentialTriangleOrder.generate(), [0, 1, 2, 3]);
    }
}
