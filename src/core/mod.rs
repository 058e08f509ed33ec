//! Core data types: geometry, shapes and the physics and collision representations.

pub mod types;
pub mod mesh;
pub mod octree;
pub mod shapes;
pub mod fixed;
pub mod rigidbody;
pub mod deformable;
pub mod mass_spring;
pub mod fem3d;
pub mod particles;
pub mod representation;
pub mod collider;

pub use types::{MassProperties, Pose, Velocity};
pub use mesh::{Aabb, AabbTree, TriangleMesh};
pub use octree::{OctreeNode, OctreePath};
pub use shapes::{OctreeShape, ParticlesShape, Shape, ShapeType, SubShape};
pub use fixed::FixedRepresentation;
pub use rigidbody::{RigidParameters, RigidRepresentation, RigidState};
pub use deformable::{DeformableCore, RayleighDamping};
pub use mass_spring::{MassSpringParameters, MassSpringRepresentation};
pub use fem3d::{Fem3DMeshData, Fem3DParameters, Fem3DRepresentation};
pub use particles::{Particle, ParticleSystem, ParticleSystemParameters};
pub use representation::{Representation, RepresentationKind};
pub use collider::{CollisionRepresentation, CollisionRepresentationBuilder, CollisionSource};
