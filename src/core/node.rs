//! Nodes of the triangulation: points in ℝ³ carrying the client's opaque
//! user object and their incident geometry.

use nalgebra::Vector3;

use crate::core::collections::SmallBuffer;
use crate::core::triangulation::{EdgeKey, TetrahedronKey};

/// A point of the triangulation.
///
/// Nodes are created by the session ([`crate::core::triangulation::Triangulation::insert_first_node`] /
/// [`crate::core::triangulation::Triangulation::insert_near`]) and own their
/// incidence lists by key. The accumulated `volume` is the node's share of
/// the dual cell: every finite tetrahedron distributes a quarter of its
/// volume to each of its four corners.
#[derive(Debug)]
pub struct SpaceNode<U> {
    /// Monotonic per-session identity; used by the organizer's hash keys and
    /// for deterministic tie-breaking.
    pub(crate) id: u64,
    pub(crate) position: Vector3<f64>,
    pub(crate) user_data: U,
    pub(crate) edges: SmallBuffer<EdgeKey, 16>,
    pub(crate) tetrahedra: SmallBuffer<TetrahedronKey, 24>,
    pub(crate) volume: f64,
}

impl<U> SpaceNode<U> {
    pub(crate) fn new(id: u64, position: Vector3<f64>, user_data: U) -> Self {
        Self {
            id,
            position,
            user_data,
            edges: SmallBuffer::new(),
            tetrahedra: SmallBuffer::new(),
            volume: 0.0,
        }
    }

    /// The node's session-unique id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Current position.
    #[must_use]
    pub fn position(&self) -> Vector3<f64> {
        self.position
    }

    /// The opaque user object attached by the client.
    #[must_use]
    pub fn user_data(&self) -> &U {
        &self.user_data
    }

    /// Accumulated dual-cell volume.
    #[must_use]
    pub fn volume(&self) -> f64 {
        self.volume
    }

    /// Keys of the incident edges.
    #[must_use]
    pub fn edges(&self) -> &[EdgeKey] {
        &self.edges
    }

    /// Keys of the incident tetrahedra.
    #[must_use]
    pub fn tetrahedra(&self) -> &[TetrahedronKey] {
        &self.tetrahedra
    }

    pub(crate) fn change_volume(&mut self, change: f64) {
        self.volume += change;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_accumulates() {
        let mut node = SpaceNode::new(0, Vector3::zeros(), ());
        node.change_volume(0.5);
        node.change_volume(-0.125);
        assert!((node.volume() - 0.375).abs() < 1e-15);
    }
}
