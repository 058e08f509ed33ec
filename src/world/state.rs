use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use crate::{
    collision::{contact::CollisionPair, filter::ElementContactFilter},
    constraints::Constraint,
    core::{
        collider::{CollisionRepresentation, CollisionSource},
        particles::ParticleSystem,
        representation::Representation,
    },
    dynamics::{
        mlcp::{MlcpPhysicsProblem, MlcpSolution},
        pose_interpolator::PoseInterpolator,
    },
    utils::{
        allocator::{Arena, EntityId},
        profiling::PipelineProfiler,
    },
};

/// Everything the pipeline reads and writes during one frame.
///
/// Computations receive the state by value and hand it to the next stage, so a stage can
/// be run in isolation on a hand-built state.
#[derive(Debug, Default)]
pub struct PhysicsManagerState {
    pub representations: Arena<Representation>,
    pub collision_representations: Arena<CollisionRepresentation>,
    pub particle_systems: Arena<ParticleSystem>,
    /// Constraints kept across frames, rebuilt into the MLCP every frame.
    pub persistent_constraints: Arena<Constraint>,
    pub pose_interpolators: Arena<PoseInterpolator>,
    pub contact_filters: Arena<Arc<ElementContactFilter>>,

    pub collision_pairs: Vec<CollisionPair>,
    /// Constraints generated from this frame's contacts.
    pub contact_constraints: Vec<Constraint>,

    /// First MLCP column of every representation taking part in the MLCP.
    pub dof_offsets: HashMap<EntityId, usize>,
    /// Constraints assembled into the MLCP with their first row, in row order.
    pub mlcp_constraints: Vec<(Constraint, usize)>,
    pub mlcp_problem: MlcpPhysicsProblem,
    pub mlcp_solution: MlcpSolution,

    /// Representations that failed this frame and are left out until the next one.
    pub faulted: HashSet<EntityId>,

    pub time: f64,
    pub frame: u64,
    /// Simulated time of the last debug listing of the collision pairs.
    pub last_pair_log: Option<f64>,
    pub profiler: PipelineProfiler,
}

impl PhysicsManagerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when `id` is registered, active and did not fail this frame.
    pub fn is_representation_live(&self, id: EntityId) -> bool {
        !self.faulted.contains(&id)
            && self
                .representations
                .get(id)
                .is_some_and(|representation| representation.is_active())
    }

    /// True when the collision representation and whatever it follows take part in the
    /// frame.
    pub fn is_collision_live(&self, collision: &CollisionRepresentation) -> bool {
        if !collision.is_active {
            return false;
        }
        match collision.source {
            CollisionSource::Standalone => true,
            CollisionSource::Representation(id) => self.is_representation_live(id),
            CollisionSource::ParticleSystem(id) => self
                .particle_systems
                .get(id)
                .is_some_and(|system| system.is_active),
        }
    }

    /// Physics representation behind a collision representation.
    pub fn representation_of(&self, collision: EntityId) -> Option<(EntityId, &Representation)> {
        let id = self
            .collision_representations
            .get(collision)?
            .physics_representation()?;
        self.representations.get(id).map(|representation| (id, representation))
    }

    pub fn contact_count(&self) -> usize {
        self.collision_pairs.iter().map(|pair| pair.contacts.len()).sum()
    }
}
