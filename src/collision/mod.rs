//! Collision detection: broad phase, discrete and continuous contact calculations and
//! contact filtering.

pub mod contact;
pub mod primitives;
pub mod mesh_contacts;
pub mod octree_contacts;
pub mod ccd;
pub mod narrowphase;
pub mod broadphase;
pub mod filter;

pub use broadphase::BroadPhase;
pub use ccd::ShapeMotion;
pub use contact::{
    CollisionDetectionType, CollisionPair, Contact, ContactType, IndexedLocalCoordinate, Location,
};
pub use filter::{ElementContactFilter, FilteredElements};
pub use narrowphase::{CcdFn, ContactCalculationTable, DcdFn, DispatchTable, SelfCcdFn, SelfDcdFn};
