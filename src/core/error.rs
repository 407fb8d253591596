//! Error types of the triangulation kernel.

use thiserror::Error;

/// Failures surfaced by the public mutation and lookup operations.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum TriangulationError {
    /// A coordinate coincides exactly with an existing node's position.
    ///
    /// Raised from the position test inside visibility walks and insertions;
    /// the failed operation leaves the triangulation unchanged (motion's
    /// slow path restores the previous position before returning this).
    #[error("position ({0:?}, {1:?}, {2:?}) coincides with an existing node", position[0], position[1], position[2])]
    PositionNotAllowed {
        /// The offending coordinate.
        position: [f64; 3],
    },

    /// A restoration, cleanup, or cavity-triangulation pass could not
    /// re-establish the kernel invariants within its iteration budget, or a
    /// post-condition check failed.
    #[error("triangulation invariant violated: {detail}")]
    InvariantViolated {
        /// Description of the failed invariant or exhausted budget.
        detail: String,
    },

    /// An edge lookup named a node that is not an endpoint of the edge.
    #[error("node is not an endpoint of this edge")]
    EdgeNotIncident,

    /// An operation referenced a node key that is not registered.
    #[error("unknown node key")]
    UnknownNode,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_render() {
        let err = TriangulationError::PositionNotAllowed {
            position: [1.0, 2.0, 3.0],
        };
        assert!(err.to_string().contains("coincides"));
        let err = TriangulationError::InvariantViolated {
            detail: "cleanup budget exhausted".into(),
        };
        assert!(err.to_string().contains("cleanup budget"));
    }
}
