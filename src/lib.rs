//! Deformable Physics – rigid and deformable body simulation for Rust.
//!
//! The crate integrates mass-spring networks, finite element models and rigid bodies,
//! detects discrete and continuous contacts between their collision geometry, and resolves
//! contacts and persistent constraints jointly through a mixed linear complementarity
//! problem every frame. [`PhysicsManager`] runs the whole pipeline and can be driven from a
//! dedicated [`PhysicsThread`].

pub mod collision;
pub mod config;
pub mod constraints;
pub mod core;
pub mod dynamics;
pub mod error;
pub mod utils;
pub mod world;

pub use glam::{DMat3, DQuat, DVec3};

pub use collision::{
    BroadPhase, CollisionDetectionType, CollisionPair, Contact, ContactCalculationTable,
    ElementContactFilter, FilteredElements, Location,
};
pub use config::{MlcpSolverConfig, PhysicsConfig};
pub use constraints::{
    Constraint, ConstraintData, ConstraintImplementationRegistry, ConstraintSide, ConstraintType,
    Localization,
};
pub use core::{
    CollisionRepresentation, Fem3DMeshData, Fem3DParameters, Fem3DRepresentation,
    FixedRepresentation, MassSpringParameters, MassSpringRepresentation, ParticleSystem,
    ParticleSystemParameters, Pose, Representation, RepresentationKind, RigidParameters,
    RigidRepresentation, Shape, ShapeType,
};
pub use dynamics::{
    FemElement, FemMaterial, GaussSeidelMlcpSolver, IntegrationScheme, MlcpPhysicsProblem,
    OdeState, PoseInterpolator,
};
pub use error::{PhysicsError, Result};
pub use utils::allocator::{Arena, EntityId, GenerationalId};
pub use world::{
    Computation, ComponentChange, PhysicsManager, PhysicsManagerState, PhysicsSnapshot,
    PhysicsThread,
};
