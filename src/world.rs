//! Orchestration of the physics pipeline and the thread-safe entry point to it.

pub mod computations;
mod state;
mod thread;

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Instant,
};

use glam::DVec3;
use log::{debug, warn};
use parking_lot::Mutex;

use crate::{
    collision::{filter::ElementContactFilter, narrowphase::ContactCalculationTable},
    config::PhysicsConfig,
    constraints::{Constraint, ConstraintImplementationRegistry},
    core::{
        collider::{CollisionRepresentation, CollisionSource},
        particles::ParticleSystem,
        representation::Representation,
        types::Pose,
    },
    dynamics::pose_interpolator::PoseInterpolator,
    error::PhysicsError,
    utils::{
        allocator::{EntityId, IdAllocator},
        buffered::BufferedValue,
        profiling::PipelineProfiler,
    },
};

pub use computations::{default_pipeline, run_pipeline, Computation};
pub use state::PhysicsManagerState;
pub use thread::PhysicsThread;

/// Change to the set of components, merged at the next frame boundary.
#[derive(Debug)]
pub enum ComponentChange {
    AddRepresentation(EntityId, Representation),
    AddCollisionRepresentation(EntityId, CollisionRepresentation),
    AddParticleSystem(EntityId, ParticleSystem),
    AddConstraint(EntityId, Constraint),
    AddPoseInterpolator(EntityId, PoseInterpolator),
    AddContactFilter(EntityId, Arc<ElementContactFilter>),
    Remove(EntityId),
    SetExternalPose(EntityId, Pose),
    ApplyExternalForce {
        id: EntityId,
        force: DVec3,
        torque: DVec3,
        node: Option<usize>,
    },
}

/// Read-only view of the state after the last completed frame.
#[derive(Debug, Clone, Default)]
pub struct PhysicsSnapshot {
    pub frame: u64,
    pub time: f64,
    /// Poses of representations and collision representations.
    pub poses: HashMap<EntityId, Pose>,
    /// Node positions of deformable representations.
    pub node_positions: HashMap<EntityId, Vec<DVec3>>,
    pub particle_positions: HashMap<EntityId, Vec<DVec3>>,
    /// Contacts recorded on each collision representation.
    pub contact_counts: HashMap<EntityId, usize>,
    pub faulted: HashSet<EntityId>,
    pub profile: PipelineProfiler,
}

impl PhysicsSnapshot {
    fn capture(state: &PhysicsManagerState) -> Self {
        let mut snapshot = Self {
            frame: state.frame,
            time: state.time,
            faulted: state.faulted.clone(),
            profile: state.profiler.clone(),
            ..Self::default()
        };
        for (id, representation) in state.representations.iter() {
            snapshot.poses.insert(id, representation.pose());
            let nodes = representation.node_positions();
            if !nodes.is_empty() {
                snapshot.node_positions.insert(id, nodes);
            }
        }
        for (id, collision) in state.collision_representations.iter() {
            snapshot.poses.insert(id, collision.pose());
            snapshot
                .contact_counts
                .insert(id, collision.collisions().values().map(Vec::len).sum());
        }
        for (id, system) in state.particle_systems.iter() {
            snapshot.particle_positions.insert(id, system.positions());
        }
        snapshot
    }

    pub fn pose(&self, id: EntityId) -> Option<Pose> {
        self.poses.get(&id).copied()
    }

    /// Node positions of a deformable or particle positions of a particle system.
    pub fn positions(&self, id: EntityId) -> Option<&[DVec3]> {
        self.node_positions
            .get(&id)
            .or_else(|| self.particle_positions.get(&id))
            .map(Vec::as_slice)
    }

    pub fn contact_count(&self, id: EntityId) -> usize {
        self.contact_counts.get(&id).copied().unwrap_or(0)
    }
}

/// Owns the simulation state and runs the pipeline on it.
///
/// Every method takes `&self`, so the manager can be shared between the physics thread and
/// any number of client threads. Components are queued with a freshly allocated handle and
/// merged into the state at the start of the next frame.
pub struct PhysicsManager {
    config: PhysicsConfig,
    ids: IdAllocator,
    /// Handles that were added and not removed yet, pending or merged.
    known: Mutex<HashSet<EntityId>>,
    pending: Mutex<Vec<ComponentChange>>,
    state: Mutex<PhysicsManagerState>,
    pipeline: Mutex<Vec<Box<dyn Computation>>>,
    snapshot: BufferedValue<PhysicsSnapshot>,
}

impl Default for PhysicsManager {
    fn default() -> Self {
        Self::new(PhysicsConfig::default())
    }
}

impl PhysicsManager {
    pub fn new(config: PhysicsConfig) -> Self {
        Self::with_tables(
            config,
            Arc::new(ContactCalculationTable::with_defaults()),
            Arc::new(ConstraintImplementationRegistry::with_defaults()),
        )
    }

    /// Manager whose default pipeline uses the given dispatch tables.
    pub fn with_tables(
        config: PhysicsConfig,
        contact_table: Arc<ContactCalculationTable>,
        registry: Arc<ConstraintImplementationRegistry>,
    ) -> Self {
        let pipeline = default_pipeline(&config, contact_table, registry);
        Self {
            config,
            ids: IdAllocator::new(),
            known: Mutex::new(HashSet::new()),
            pending: Mutex::new(Vec::new()),
            state: Mutex::new(PhysicsManagerState::new()),
            pipeline: Mutex::new(pipeline),
            snapshot: BufferedValue::default(),
        }
    }

    pub fn config(&self) -> &PhysicsConfig {
        &self.config
    }

    /// Replaces the stages run by [`Self::update`].
    pub fn set_pipeline(&self, pipeline: Vec<Box<dyn Computation>>) {
        *self.pipeline.lock() = pipeline;
    }

    fn queue(&self, change: impl FnOnce(EntityId) -> ComponentChange) -> EntityId {
        let id = self.ids.allocate();
        self.known.lock().insert(id);
        self.pending.lock().push(change(id));
        id
    }

    pub fn add_representation(&self, representation: impl Into<Representation>) -> EntityId {
        let representation = representation.into();
        self.queue(|id| ComponentChange::AddRepresentation(id, representation))
    }

    pub fn add_collision_representation(&self, collision: CollisionRepresentation) -> EntityId {
        self.queue(|id| ComponentChange::AddCollisionRepresentation(id, collision))
    }

    pub fn add_particle_system(&self, system: ParticleSystem) -> EntityId {
        self.queue(|id| ComponentChange::AddParticleSystem(id, system))
    }

    /// Adds a constraint rebuilt into the MLCP every frame until it is removed.
    pub fn add_constraint(&self, constraint: Constraint) -> EntityId {
        self.queue(|id| ComponentChange::AddConstraint(id, constraint))
    }

    pub fn add_pose_interpolator(&self, interpolator: PoseInterpolator) -> EntityId {
        self.queue(|id| ComponentChange::AddPoseInterpolator(id, interpolator))
    }

    /// Registers a contact filter. Returns `None` if this filter is already registered.
    pub fn add_contact_filter(&self, filter: Arc<ElementContactFilter>) -> Option<EntityId> {
        let registered = self
            .state
            .lock()
            .contact_filters
            .values()
            .any(|registered| Arc::ptr_eq(registered, &filter));
        let queued = self.pending.lock().iter().any(|change| {
            matches!(change, ComponentChange::AddContactFilter(_, queued) if Arc::ptr_eq(queued, &filter))
        });
        if registered || queued {
            return None;
        }
        Some(self.queue(|id| ComponentChange::AddContactFilter(id, filter)))
    }

    /// Queues the removal of any component. Returns `false` for an unknown handle.
    pub fn remove(&self, id: EntityId) -> bool {
        if !self.known.lock().remove(&id) {
            return false;
        }
        self.pending.lock().push(ComponentChange::Remove(id));
        true
    }

    /// Moves a fixed or rigid representation, or a standalone collision representation.
    pub fn set_external_pose(&self, id: EntityId, pose: Pose) {
        self.pending
            .lock()
            .push(ComponentChange::SetExternalPose(id, pose));
    }

    /// Adds a load for the next free motion of `id`.
    pub fn apply_external_force(&self, id: EntityId, force: DVec3, torque: DVec3, node: Option<usize>) {
        self.pending.lock().push(ComponentChange::ApplyExternalForce {
            id,
            force,
            torque,
            node,
        });
    }

    /// Merges the queued changes into the state.
    pub fn process_components(&self) {
        let mut state = self.state.lock();
        self.merge_pending(&mut state);
    }

    fn merge_pending(&self, state: &mut PhysicsManagerState) {
        let changes = std::mem::take(&mut *self.pending.lock());
        for change in changes {
            if let Err(error) = apply_change(state, change) {
                warn!("Component change rejected: {error}");
            }
        }
    }

    /// Runs one frame of `dt` seconds and publishes its snapshot.
    pub fn update(&self, dt: f64) {
        let started = Instant::now();
        let mut pipeline = self.pipeline.lock();
        let mut state = self.state.lock();
        self.merge_pending(&mut state);

        let current = std::mem::take(&mut *state);
        *state = run_pipeline(&mut pipeline, dt, current);
        state.profiler.total_frame_time = started.elapsed();
        self.snapshot.publish(PhysicsSnapshot::capture(&state));
    }

    /// Snapshot published by the last completed frame.
    pub fn final_state(&self) -> Arc<PhysicsSnapshot> {
        self.snapshot.get()
    }

    pub fn pose(&self, id: EntityId) -> Option<Pose> {
        self.final_state().pose(id)
    }

    pub fn positions(&self, id: EntityId) -> Option<Vec<DVec3>> {
        self.final_state().positions(id).map(<[DVec3]>::to_vec)
    }

    /// Runs `inspect` on the live state between two frames.
    pub fn inspect<R>(&self, inspect: impl FnOnce(&PhysicsManagerState) -> R) -> R {
        inspect(&self.state.lock())
    }
}

fn insert<T>(
    arena: &mut crate::utils::allocator::Arena<T>,
    id: EntityId,
    item: T,
) -> crate::error::Result<()> {
    if arena.insert_at(id, item) {
        Ok(())
    } else {
        Err(PhysicsError::DuplicateComponent(id))
    }
}

fn apply_change(state: &mut PhysicsManagerState, change: ComponentChange) -> crate::error::Result<()> {
    match change {
        ComponentChange::AddRepresentation(id, representation) => {
            debug!("Adding {} representation '{}'", representation.kind(), representation.name());
            insert(&mut state.representations, id, representation)
        }
        ComponentChange::AddCollisionRepresentation(id, collision) => {
            debug!("Adding collision representation '{}'", collision.name);
            insert(&mut state.collision_representations, id, collision)
        }
        ComponentChange::AddParticleSystem(id, system) => insert(&mut state.particle_systems, id, system),
        ComponentChange::AddConstraint(id, constraint) => {
            insert(&mut state.persistent_constraints, id, constraint)
        }
        ComponentChange::AddPoseInterpolator(id, interpolator) => {
            insert(&mut state.pose_interpolators, id, interpolator)
        }
        ComponentChange::AddContactFilter(id, filter) => insert(&mut state.contact_filters, id, filter),
        ComponentChange::Remove(id) => {
            let removed = state.representations.remove(id).is_some()
                || state.collision_representations.remove(id).is_some()
                || state.particle_systems.remove(id).is_some()
                || state.persistent_constraints.remove(id).is_some()
                || state.pose_interpolators.remove(id).is_some()
                || state.contact_filters.remove(id).is_some();
            if removed {
                Ok(())
            } else {
                Err(PhysicsError::UnknownRepresentation(id))
            }
        }
        ComponentChange::SetExternalPose(id, pose) => {
            if let Some(representation) = state.representations.get_mut(id) {
                if representation.set_pose(pose) {
                    return Ok(());
                }
                return Err(PhysicsError::invalid_parameter(format!(
                    "{} representation '{}' cannot be posed externally",
                    representation.kind(),
                    representation.name()
                )));
            }
            match state.collision_representations.get_mut(id) {
                Some(collision) if collision.source == CollisionSource::Standalone => {
                    collision.local_pose = pose;
                    Ok(())
                }
                _ => Err(PhysicsError::UnknownRepresentation(id)),
            }
        }
        ComponentChange::ApplyExternalForce {
            id,
            force,
            torque,
            node,
        } => state
            .representations
            .get_mut(id)
            .ok_or(PhysicsError::UnknownRepresentation(id))?
            .apply_external_force(force, torque, node),
    }
}
