//! Error types for setup and per-frame failures.
//!
//! Setup errors (bad DOF counts, out of range nodes, degenerate rest geometry) are returned
//! to the caller before the simulation starts. Inside the pipeline the same errors are
//! caught by the stage that produced them, logged, and the offending representation or
//! constraint is skipped for the frame.

use thiserror::Error;

use crate::utils::allocator::EntityId;

/// Errors produced by the physics core.
#[derive(Debug, Error)]
pub enum PhysicsError {
    /// A state was sized with zero DOF per node or zero nodes.
    #[error("Invalid DOF count: {dof_per_node} DOF per node, {num_nodes} nodes")]
    InvalidDofCount { dof_per_node: usize, num_nodes: usize },

    /// A node index does not exist in the state.
    #[error("Node {node} out of range (state has {num_nodes} nodes)")]
    NodeOutOfRange { node: usize, num_nodes: usize },

    /// A DOF index is larger than the number of DOF per node.
    #[error("DOF {dof} out of range ({dof_per_node} DOF per node)")]
    DofOutOfRange { dof: usize, dof_per_node: usize },

    /// Boundary conditions were added before the state was sized.
    #[error("State has not been initialized with a DOF count")]
    UninitializedState,

    /// An element has zero, negative or near-zero volume.
    #[error("Degenerate element with nodes {node_ids:?} (volume {volume})")]
    DegenerateElement { node_ids: Vec<usize>, volume: f64 },

    /// The isoparametric map of an element cannot be inverted at a quadrature point.
    #[error("Non-invertible Jacobian in element with nodes {node_ids:?} (determinant {determinant})")]
    NonInvertibleJacobian {
        node_ids: Vec<usize>,
        determinant: f64,
    },

    /// A system matrix could not be factorized or inverted.
    #[error("Singular matrix: {0}")]
    SingularMatrix(String),

    /// The integrated state contains NaN or infinite values.
    #[error("Invalid state after integration: {0}")]
    InvalidState(String),

    /// An operation was requested on a geometry that does not support it.
    #[error("Unsupported geometry: {0}")]
    UnsupportedGeometry(String),

    /// No constraint implementation is registered for the combination.
    #[error("No constraint implementation for {representation} / {constraint}")]
    ImplementationNotFound {
        representation: String,
        constraint: String,
    },

    /// A handle does not refer to a live representation.
    #[error("Unknown representation {0:?}")]
    UnknownRepresentation(EntityId),

    /// A component with this handle is already registered.
    #[error("Component {0:?} is already registered")]
    DuplicateComponent(EntityId),

    /// A parameter is outside its valid range.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

impl PhysicsError {
    /// Create a singular matrix error.
    pub fn singular(msg: impl Into<String>) -> Self {
        Self::SingularMatrix(msg.into())
    }

    /// Create an unsupported geometry error.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::UnsupportedGeometry(msg.into())
    }

    /// Create an invalid parameter error.
    pub fn invalid_parameter(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }

    /// True for errors that stem from numerical degeneracy rather than misconfiguration.
    pub fn is_numerical(&self) -> bool {
        matches!(
            self,
            Self::DegenerateElement { .. }
                | Self::NonInvertibleJacobian { .. }
                | Self::SingularMatrix(_)
                | Self::InvalidState(_)
        )
    }
}

/// Result type for physics operations.
pub type Result<T> = std::result::Result<T, PhysicsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degenerate_element_reports_node_ids() {
        let err = PhysicsError::DegenerateElement {
            node_ids: vec![3, 1, 4, 1, 5, 9, 2, 6],
            volume: -0.5,
        };
        let text = err.to_string();
        assert!(text.contains("[3, 1, 4, 1, 5, 9, 2, 6]"));
        assert!(err.is_numerical());
    }

    #[test]
    fn configuration_errors_are_not_numerical() {
        assert!(!PhysicsError::UninitializedState.is_numerical());
        assert!(!PhysicsError::invalid_parameter("radius").is_numerical());
    }
}
