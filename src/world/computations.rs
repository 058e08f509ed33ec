//! Pipeline stages of one physics frame.
//!
//! Every stage takes the manager state by value and returns it, so the stages run in a
//! fixed order on a single state and each one can be tested on its own.

use std::sync::Arc;

use glam::DVec3;
use log::{debug, log_enabled, trace, warn, Level};
use nalgebra::DMatrix;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::{
    collision::{
        broadphase::BroadPhase,
        ccd::ShapeMotion,
        contact::{CollisionDetectionType, CollisionPair, Contact, Location},
        narrowphase::ContactCalculationTable,
    },
    config::PhysicsConfig,
    constraints::{
        BuildContext, Constraint, ConstraintData, ConstraintImplementationRegistry, ConstraintSide,
    },
    core::{
        collider::{CollisionRepresentation, CollisionSource},
        representation::{Representation, RepresentationKind},
    },
    dynamics::mlcp::{GaussSeidelMlcpSolver, MlcpPhysicsProblem},
    utils::{allocator::EntityId, logging::ScopedTimer},
    world::state::PhysicsManagerState,
};

/// One stage of the physics pipeline.
pub trait Computation: Send {
    /// Label used by the stage timer and the profiler.
    fn name(&self) -> &'static str;

    fn update(&mut self, dt: f64, state: PhysicsManagerState) -> PhysicsManagerState;
}

/// Runs `pipeline` in order, timing each stage.
pub fn run_pipeline(
    pipeline: &mut [Box<dyn Computation>],
    dt: f64,
    mut state: PhysicsManagerState,
) -> PhysicsManagerState {
    for computation in pipeline.iter_mut() {
        let name = computation.name();
        let timer = ScopedTimer::new(name);
        state = computation.update(dt, state);
        state.profiler.record(name, timer.elapsed());
    }
    state
}

/// The stages of a full frame, in order.
pub fn default_pipeline(
    config: &PhysicsConfig,
    contact_table: Arc<ContactCalculationTable>,
    registry: Arc<ConstraintImplementationRegistry>,
) -> Vec<Box<dyn Computation>> {
    vec![
        Box::new(PreUpdate),
        Box::new(FreeMotion::new(config.gravity)),
        Box::new(UpdateCollisionRepresentations),
        Box::new(PrepareCollisionPairs::new(BroadPhase::default(), config.log_pairs_interval)),
        Box::new(ClearCollisions),
        Box::new(DcdCollision::new(Arc::clone(&contact_table), config.parallel)),
        Box::new(CcdCollision::new(contact_table, config.parallel)),
        Box::new(ContactFiltering),
        Box::new(PublishCollisions),
        Box::new(ContactConstraintGeneration::new(Arc::clone(&registry))),
        Box::new(BuildMlcp::new(registry)),
        Box::new(SolveMlcp::new(GaussSeidelMlcpSolver::new(config.mlcp))),
        Box::new(PushResults),
        Box::new(ParticleCollisionResponse),
        Box::new(UpdateCollisionRepresentations),
        Box::new(PostUpdate),
    ]
}

/// Clears per-frame faults, publishes contact filters, stores the previous state of every
/// representation and drives the pose interpolators.
#[derive(Debug, Default)]
pub struct PreUpdate;

impl Computation for PreUpdate {
    fn name(&self) -> &'static str {
        "pipeline::pre_update"
    }

    fn update(&mut self, dt: f64, mut state: PhysicsManagerState) -> PhysicsManagerState {
        state.faulted.clear();
        state.profiler.reset();
        for filter in state.contact_filters.values() {
            filter.publish();
        }
        for (_, representation) in state.representations.iter_mut() {
            if representation.is_active() {
                representation.before_update();
            }
        }
        for (_, collision) in state.collision_representations.iter_mut() {
            collision.store_previous();
        }

        for (_, interpolator) in state.pose_interpolators.iter_mut() {
            let Some(target) = state.representations.get_mut(interpolator.target()) else {
                continue;
            };
            if !interpolator.is_awake() {
                interpolator.wake_up(target.pose());
            }
            let pose = interpolator.update(dt);
            if !target.set_pose(pose) {
                debug!(
                    "{} representation '{}' cannot follow a pose interpolator",
                    target.kind(),
                    target.name()
                );
            }
        }
        state
    }
}

/// Unconstrained motion of every active representation and particle system.
#[derive(Debug)]
pub struct FreeMotion {
    gravity: DVec3,
}

impl FreeMotion {
    pub fn new(gravity: DVec3) -> Self {
        Self { gravity }
    }
}

impl Computation for FreeMotion {
    fn name(&self) -> &'static str {
        "pipeline::free_motion"
    }

    fn update(&mut self, dt: f64, mut state: PhysicsManagerState) -> PhysicsManagerState {
        let mut active = 0;
        for (id, representation) in state.representations.iter_mut() {
            if !representation.is_active() {
                continue;
            }
            active += 1;
            if let Err(error) = representation.free_motion(dt, self.gravity) {
                warn!(
                    "{} representation '{}' left out of this frame: {}",
                    representation.kind(),
                    representation.name(),
                    error
                );
                state.faulted.insert(id);
            }
        }
        for (_, system) in state.particle_systems.iter_mut() {
            if system.is_active {
                system.update(dt, self.gravity);
            }
        }
        state.profiler.representation_count = active;
        state
    }
}

/// Moves collision geometry onto the current state of what it follows.
#[derive(Debug, Default)]
pub struct UpdateCollisionRepresentations;

impl Computation for UpdateCollisionRepresentations {
    fn name(&self) -> &'static str {
        "pipeline::update_collision_representations"
    }

    fn update(&mut self, _dt: f64, mut state: PhysicsManagerState) -> PhysicsManagerState {
        for (_, collision) in state.collision_representations.iter_mut() {
            match collision.source {
                CollisionSource::Standalone => collision.set_pose(collision.local_pose),
                CollisionSource::Representation(id) => {
                    let Some(representation) = state.representations.get(id) else {
                        continue;
                    };
                    if state.faulted.contains(&id) || !representation.is_active() {
                        continue;
                    }
                    collision.set_pose(representation.pose().combine(&collision.local_pose));
                    match representation.deformed_collision_shape() {
                        Ok(Some(shape)) => collision.set_shape(Arc::new(shape)),
                        Ok(None) => {}
                        Err(error) => warn!(
                            "Collision representation '{}' keeps its last shape: {}",
                            collision.name, error
                        ),
                    }
                }
                CollisionSource::ParticleSystem(id) => {
                    let Some(system) = state.particle_systems.get(id) else {
                        continue;
                    };
                    collision.set_pose(collision.local_pose);
                    collision.set_shape(Arc::new(system.collision_shape()));
                }
            }
        }
        state
    }
}

/// Broad phase over the live collision representations.
#[derive(Debug)]
pub struct PrepareCollisionPairs {
    broadphase: BroadPhase,
    log_interval: f64,
}

impl PrepareCollisionPairs {
    pub fn new(broadphase: BroadPhase, log_interval: f64) -> Self {
        Self {
            broadphase,
            log_interval,
        }
    }

    fn log_pairs(&self, state: &mut PhysicsManagerState) {
        if !log_enabled!(Level::Debug) {
            return;
        }
        if state
            .last_pair_log
            .is_some_and(|last| state.time - last < self.log_interval)
        {
            return;
        }
        state.last_pair_log = Some(state.time);

        let name = |id: EntityId| {
            state
                .collision_representations
                .get(id)
                .map_or_else(|| format!("{id:?}"), |collision| collision.name.clone())
        };
        let mut lines: Vec<String> = state
            .collision_pairs
            .iter()
            .map(|pair| {
                format!(
                    "{} - {} ({})",
                    name(pair.first),
                    name(pair.second),
                    pair.detection_type.tag()
                )
            })
            .collect();
        lines.sort();
        debug!("{} collision pairs at t = {:.3}s", lines.len(), state.time);
        for line in lines {
            debug!("  {line}");
        }
    }
}

impl Computation for PrepareCollisionPairs {
    fn name(&self) -> &'static str {
        "pipeline::prepare_collision_pairs"
    }

    fn update(&mut self, _dt: f64, mut state: PhysicsManagerState) -> PhysicsManagerState {
        let live: Vec<(EntityId, &CollisionRepresentation)> = state
            .collision_representations
            .iter()
            .filter(|(_, collision)| state.is_collision_live(collision))
            .collect();
        let pairs = self.broadphase.prepare_pairs(&live);
        state.collision_pairs = pairs;
        state.profiler.pair_count = state.collision_pairs.len();
        self.log_pairs(&mut state);
        state
    }
}

#[derive(Debug, Default)]
pub struct ClearCollisions;

impl Computation for ClearCollisions {
    fn name(&self) -> &'static str {
        "pipeline::clear_collisions"
    }

    fn update(&mut self, _dt: f64, mut state: PhysicsManagerState) -> PhysicsManagerState {
        for (_, collision) in state.collision_representations.iter_mut() {
            collision.clear_collisions();
        }
        for pair in &mut state.collision_pairs {
            pair.contacts.clear();
        }
        state
    }
}

/// Runs `task` on every pair, on the rayon pool when `parallel` is set.
fn for_each_pair<F>(pairs: &mut [CollisionPair], parallel: bool, task: F)
where
    F: Fn(&mut CollisionPair) + Send + Sync,
{
    #[cfg(feature = "parallel")]
    if parallel {
        pairs.par_iter_mut().for_each(task);
        return;
    }
    #[cfg(not(feature = "parallel"))]
    let _ = parallel;
    pairs.iter_mut().for_each(task);
}

/// Discrete contacts of every discrete pair.
pub struct DcdCollision {
    table: Arc<ContactCalculationTable>,
    parallel: bool,
}

impl DcdCollision {
    pub fn new(table: Arc<ContactCalculationTable>, parallel: bool) -> Self {
        Self { table, parallel }
    }
}

impl Computation for DcdCollision {
    fn name(&self) -> &'static str {
        "pipeline::dcd_collision"
    }

    fn update(&mut self, _dt: f64, mut state: PhysicsManagerState) -> PhysicsManagerState {
        let collisions = &state.collision_representations;
        let table = &*self.table;
        for_each_pair(&mut state.collision_pairs, self.parallel, |pair| {
            if pair.detection_type != CollisionDetectionType::Discrete {
                return;
            }
            let (Some(first), Some(second)) = (collisions.get(pair.first), collisions.get(pair.second))
            else {
                return;
            };
            pair.contacts = if pair.is_self_pair() {
                table.calculate_self_dcd(first.shape(), &first.pose())
            } else {
                table.calculate_dcd(first.shape(), &first.pose(), second.shape(), &second.pose())
            };
        });
        state
    }
}

/// Continuous contacts of every continuous pair, over the motion of the whole frame.
pub struct CcdCollision {
    table: Arc<ContactCalculationTable>,
    parallel: bool,
}

impl CcdCollision {
    pub fn new(table: Arc<ContactCalculationTable>, parallel: bool) -> Self {
        Self { table, parallel }
    }
}

fn motion(collision: &CollisionRepresentation) -> ShapeMotion<'_> {
    ShapeMotion::new(
        collision.previous_shape(),
        collision.previous_pose(),
        collision.shape(),
        collision.pose(),
    )
}

impl Computation for CcdCollision {
    fn name(&self) -> &'static str {
        "pipeline::ccd_collision"
    }

    fn update(&mut self, _dt: f64, mut state: PhysicsManagerState) -> PhysicsManagerState {
        let collisions = &state.collision_representations;
        let table = &*self.table;
        for_each_pair(&mut state.collision_pairs, self.parallel, |pair| {
            if pair.detection_type != CollisionDetectionType::Continuous {
                return;
            }
            let (Some(first), Some(second)) = (collisions.get(pair.first), collisions.get(pair.second))
            else {
                return;
            };
            pair.contacts = if pair.is_self_pair() {
                table.calculate_self_ccd(&motion(first))
            } else {
                table.calculate_ccd(&motion(first), &motion(second))
            };
        });
        state
    }
}

#[derive(Debug, Default)]
pub struct ContactFiltering;

impl Computation for ContactFiltering {
    fn name(&self) -> &'static str {
        "pipeline::contact_filtering"
    }

    fn update(&mut self, _dt: f64, mut state: PhysicsManagerState) -> PhysicsManagerState {
        let mut removed = 0;
        for filter in state.contact_filters.values() {
            for pair in &mut state.collision_pairs {
                removed += filter.filter_contacts(pair);
            }
        }
        if removed > 0 {
            trace!("{removed} contacts filtered out");
        }
        state
    }
}

/// Records the contacts of every pair on both collision representations.
#[derive(Debug, Default)]
pub struct PublishCollisions;

impl Computation for PublishCollisions {
    fn name(&self) -> &'static str {
        "pipeline::publish_collisions"
    }

    fn update(&mut self, _dt: f64, mut state: PhysicsManagerState) -> PhysicsManagerState {
        for pair in &state.collision_pairs {
            if !pair.has_contacts() {
                continue;
            }
            if let Some(first) = state.collision_representations.get_mut(pair.first) {
                first.add_contacts(pair.second, pair.contacts.iter().cloned());
            }
            if pair.is_self_pair() {
                continue;
            }
            if let Some(second) = state.collision_representations.get_mut(pair.second) {
                second.add_contacts(pair.first, pair.contacts.iter().cloned().map(Contact::flipped));
            }
        }
        state.profiler.contact_count = state.contact_count();
        state
    }
}

/// Turns the contacts between physics representations into contact constraints.
///
/// Pairs involving particle systems or standalone geometry are left to other stages, and
/// self contacts are only published.
pub struct ContactConstraintGeneration {
    registry: Arc<ConstraintImplementationRegistry>,
}

impl ContactConstraintGeneration {
    pub fn new(registry: Arc<ConstraintImplementationRegistry>) -> Self {
        Self { registry }
    }
}

/// Location moved from the collision frame into the frame of its representation.
fn in_representation_frame(collision: &CollisionRepresentation, location: &Location) -> Location {
    let mut location = location.clone();
    location.rigid_local_position = location
        .rigid_local_position
        .map(|local| collision.local_pose.transform_point(local));
    location
}

impl Computation for ContactConstraintGeneration {
    fn name(&self) -> &'static str {
        "pipeline::contact_constraint_generation"
    }

    fn update(&mut self, _dt: f64, mut state: PhysicsManagerState) -> PhysicsManagerState {
        let mut constraints = Vec::new();
        for pair in state
            .collision_pairs
            .iter()
            .filter(|pair| pair.has_contacts() && !pair.is_self_pair())
        {
            let (Some(first), Some(second)) = (
                state.collision_representations.get(pair.first),
                state.collision_representations.get(pair.second),
            ) else {
                continue;
            };
            let (Some(first_id), Some(second_id)) =
                (first.physics_representation(), second.physics_representation())
            else {
                continue;
            };
            if !state.is_representation_live(first_id) || !state.is_representation_live(second_id) {
                continue;
            }
            let (Some(positive), Some(negative)) = (
                state.representations.get(first_id),
                state.representations.get(second_id),
            ) else {
                continue;
            };

            let friction = first.friction.max(second.friction);
            let make_data = |normal: DVec3| {
                if friction > 0.0 {
                    ConstraintData::frictional_contact(normal, friction)
                } else {
                    ConstraintData::contact(normal)
                }
            };
            let constraint_type = make_data(DVec3::Y).constraint_type();
            if let Err(error) = self
                .registry
                .get(positive.kind(), constraint_type)
                .and(self.registry.get(negative.kind(), constraint_type))
            {
                warn!(
                    "Contacts between '{}' and '{}' are ignored: {}",
                    first.name, second.name, error
                );
                continue;
            }

            for contact in &pair.contacts {
                let localizations = positive
                    .create_localization(
                        first_id,
                        &in_representation_frame(first, &contact.penetration_points.0),
                    )
                    .and_then(|p| {
                        negative
                            .create_localization(
                                second_id,
                                &in_representation_frame(second, &contact.penetration_points.1),
                            )
                            .map(|n| (p, n))
                    });
                match localizations {
                    Ok((p, n)) => constraints.push(Constraint::new(make_data(contact.normal), p, n)),
                    Err(error) => warn!(
                        "Contact between '{}' and '{}' skipped: {}",
                        first.name, second.name, error
                    ),
                }
            }
        }
        state.contact_constraints = constraints;
        state
    }
}

/// Assembles the MLCP of every contact and persistent constraint.
pub struct BuildMlcp {
    registry: Arc<ConstraintImplementationRegistry>,
}

impl BuildMlcp {
    pub fn new(registry: Arc<ConstraintImplementationRegistry>) -> Self {
        Self { registry }
    }

    /// A side takes part when its representation is live, has an implementation, and has
    /// MLCP columns unless it is fixed.
    fn side_is_buildable(&self, state: &PhysicsManagerState, constraint: &Constraint, side: ConstraintSide) -> bool {
        let id = constraint.localization(side).representation();
        let Some(representation) = state.representations.get(id) else {
            return false;
        };
        state.is_representation_live(id)
            && self
                .registry
                .get(representation.kind(), constraint.constraint_type())
                .is_ok()
            && (representation.kind() == RepresentationKind::Fixed
                || state.dof_offsets.contains_key(&id))
    }

    fn build_constraint(
        &self,
        state: &PhysicsManagerState,
        dt: f64,
        constraint: &Constraint,
        row_offset: usize,
        problem: &mut MlcpPhysicsProblem,
    ) -> crate::error::Result<()> {
        for side in [ConstraintSide::Positive, ConstraintSide::Negative] {
            let localization = constraint.localization(side);
            let id = localization.representation();
            let representation = state
                .representations
                .get(id)
                .ok_or(crate::error::PhysicsError::UnknownRepresentation(id))?;
            let context = BuildContext {
                dt,
                representation,
                localization,
                dof_offset: state.dof_offsets.get(&id).copied().unwrap_or(0),
                row_offset,
                side,
            };
            self.registry
                .get(representation.kind(), constraint.constraint_type())?
                .build(&context, &constraint.data, problem)?;
        }
        Ok(())
    }
}

fn compliance_of(representation: &Representation) -> Option<&DMatrix<f64>> {
    representation.compliance()
}

impl Computation for BuildMlcp {
    fn name(&self) -> &'static str {
        "pipeline::build_mlcp"
    }

    fn update(&mut self, dt: f64, mut state: PhysicsManagerState) -> PhysicsManagerState {
        let mut dof_offsets = std::collections::HashMap::new();
        let mut num_dof = 0;
        for (id, representation) in state.representations.iter() {
            if !state.is_representation_live(id) {
                continue;
            }
            if let Some(compliance) = compliance_of(representation) {
                dof_offsets.insert(id, num_dof);
                num_dof += compliance.nrows();
            }
        }
        state.dof_offsets = dof_offsets;

        let mut selected = Vec::new();
        let mut num_rows = 0;
        for constraint in state
            .contact_constraints
            .iter()
            .chain(state.persistent_constraints.values())
        {
            if self.side_is_buildable(&state, constraint, ConstraintSide::Positive)
                && self.side_is_buildable(&state, constraint, ConstraintSide::Negative)
            {
                selected.push((constraint.clone(), num_rows));
                num_rows += constraint.num_rows();
            }
        }

        let mut problem = MlcpPhysicsProblem::zero(num_rows, num_dof);
        for (constraint, row) in &selected {
            problem.constraint_types.push(constraint.data.mlcp_type());
            problem.mu.push(constraint.data.mu());
            if let Err(error) = self.build_constraint(&state, dt, constraint, *row, &mut problem) {
                warn!("{} constraint left out of the MLCP: {}", constraint.constraint_type(), error);
                for r in *row..*row + constraint.num_rows() {
                    problem.b[r] = 0.0;
                    problem.h.row_mut(r).fill(0.0);
                }
            }
        }

        for (id, &offset) in &state.dof_offsets {
            let Some(compliance) = state.representations.get(*id).and_then(compliance_of) else {
                continue;
            };
            let n = compliance.nrows();
            let block = compliance * problem.h.columns(offset, n).transpose();
            problem.cht.rows_mut(offset, n).copy_from(&block);
        }
        problem.a = &problem.h * &problem.cht;
        debug_assert!(problem.is_consistent());

        state.profiler.constraint_count = selected.len();
        state.profiler.mlcp_size = num_rows;
        state.mlcp_constraints = selected;
        state.mlcp_problem = problem;
        state
    }
}

pub struct SolveMlcp {
    solver: GaussSeidelMlcpSolver,
}

impl SolveMlcp {
    pub fn new(solver: GaussSeidelMlcpSolver) -> Self {
        Self { solver }
    }
}

impl Computation for SolveMlcp {
    fn name(&self) -> &'static str {
        "pipeline::solve_mlcp"
    }

    fn update(&mut self, _dt: f64, mut state: PhysicsManagerState) -> PhysicsManagerState {
        state.mlcp_solution = self.solver.solve(&state.mlcp_problem);
        if !state.mlcp_solution.converged {
            debug!(
                "MLCP with {} rows did not converge in {} sweeps",
                state.mlcp_problem.num_rows(),
                state.mlcp_solution.iterations
            );
        }
        state
    }
}

/// Applies each representation's slice of the DOF correction.
#[derive(Debug, Default)]
pub struct PushResults;

impl Computation for PushResults {
    fn name(&self) -> &'static str {
        "pipeline::push_results"
    }

    fn update(&mut self, dt: f64, mut state: PhysicsManagerState) -> PhysicsManagerState {
        if state.mlcp_problem.is_empty() {
            return state;
        }
        let correction = &state.mlcp_solution.dof_correction;
        for (id, &offset) in &state.dof_offsets {
            let Some(representation) = state.representations.get_mut(*id) else {
                continue;
            };
            let n = representation.num_dof();
            if offset + n > correction.len() {
                continue;
            }
            let slice = correction.rows(offset, n).into_owned();
            if let Err(error) = representation.apply_correction(dt, &slice) {
                warn!(
                    "{} representation '{}' rejected its correction: {}",
                    representation.kind(),
                    representation.name(),
                    error
                );
                state.faulted.insert(*id);
            }
        }
        state
    }
}

/// Projects contacting particles out of the obstacles they touch.
#[derive(Debug, Default)]
pub struct ParticleCollisionResponse;

impl Computation for ParticleCollisionResponse {
    fn name(&self) -> &'static str {
        "pipeline::particle_collision_response"
    }

    fn update(&mut self, _dt: f64, mut state: PhysicsManagerState) -> PhysicsManagerState {
        for pair in state.collision_pairs.iter().filter(|pair| pair.has_contacts()) {
            for (is_first, collision) in [(true, pair.first), (false, pair.second)] {
                let Some(system_id) = state
                    .collision_representations
                    .get(collision)
                    .and_then(CollisionRepresentation::particle_system)
                else {
                    continue;
                };
                let Some(system) = state.particle_systems.get_mut(system_id) else {
                    continue;
                };
                for contact in &pair.contacts {
                    let (normal, location) = if is_first {
                        (contact.normal, &contact.penetration_points.0)
                    } else {
                        (-contact.normal, &contact.penetration_points.1)
                    };
                    if let Some(index) = location.node {
                        system.resolve_collision(index, normal, contact.depth);
                    }
                }
            }
        }
        state
    }
}

#[derive(Debug, Default)]
pub struct PostUpdate;

impl Computation for PostUpdate {
    fn name(&self) -> &'static str {
        "pipeline::post_update"
    }

    fn update(&mut self, dt: f64, mut state: PhysicsManagerState) -> PhysicsManagerState {
        state.time += dt;
        state.frame += 1;
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    use crate::core::{
        fixed::FixedRepresentation,
        rigidbody::{RigidParameters, RigidRepresentation},
        shapes::{Shape, ShapeType},
        types::{Pose, Velocity},
    };

    fn add_body(
        state: &mut PhysicsManagerState,
        index: u32,
        representation: Representation,
        shape: Shape,
    ) -> EntityId {
        let id = EntityId::from_index(index);
        let name = representation.name().to_string();
        state.representations.insert_at(id, representation);
        let collision = CollisionRepresentation::builder(Arc::new(shape))
            .name(name)
            .representation(id)
            .build();
        state
            .collision_representations
            .insert_at(EntityId::from_index(index + 1), collision);
        id
    }

    /// A 0.1 m ball centered on the floor plane, registered before or after the floor.
    fn ball_on_floor(ball_first: bool) -> PhysicsManagerState {
        let mut state = PhysicsManagerState::new();
        let ball = RigidRepresentation::new(
            "ball",
            Arc::new(Shape::sphere(0.1)),
            RigidParameters {
                is_gravity_enabled: false,
                ..RigidParameters::default()
            },
            Pose::IDENTITY,
        )
        .expect("valid rigid");
        let floor = FixedRepresentation::new("floor", Pose::IDENTITY);

        let (ball_index, floor_index) = if ball_first { (0, 2) } else { (2, 0) };
        add_body(&mut state, floor_index, floor.into(), Shape::plane());
        add_body(&mut state, ball_index, ball.into(), Shape::sphere(0.1));
        state
    }

    fn detect_and_build(state: PhysicsManagerState) -> PhysicsManagerState {
        let table = Arc::new(ContactCalculationTable::with_defaults());
        let registry = Arc::new(ConstraintImplementationRegistry::with_defaults());
        let mut pipeline: Vec<Box<dyn Computation>> = vec![
            Box::new(PreUpdate),
            Box::new(FreeMotion::new(DVec3::ZERO)),
            Box::new(UpdateCollisionRepresentations),
            Box::new(PrepareCollisionPairs::new(BroadPhase::default(), 1.0)),
            Box::new(ClearCollisions),
            Box::new(DcdCollision::new(Arc::clone(&table), false)),
            Box::new(CcdCollision::new(table, false)),
            Box::new(PublishCollisions),
            Box::new(ContactConstraintGeneration::new(Arc::clone(&registry))),
            Box::new(BuildMlcp::new(registry)),
        ];
        run_pipeline(&mut pipeline, 1e-3, state)
    }

    #[test]
    fn sphere_on_plane_violation_is_minus_radius_in_both_orders() {
        for ball_first in [true, false] {
            let state = detect_and_build(ball_on_floor(ball_first));
            assert_eq!(state.contact_constraints.len(), 1);
            let problem = &state.mlcp_problem;
            assert_eq!(problem.num_rows(), 1);
            assert_eq!(problem.num_dof(), 6);
            assert_relative_eq!(problem.b[0], -0.1, epsilon = 1e-9);
            // The ball always moves up, whichever side of the constraint it is on.
            assert_relative_eq!(problem.h[(0, 1)], 1e-3, epsilon = 1e-12);
            assert!(problem.is_consistent());
        }
    }

    #[test]
    fn self_colliding_sphere_touches_nothing_but_the_floor() {
        let mut state = ball_on_floor(true);
        let ball_collision = EntityId::from_index(1);
        if let Some(collision) = state.collision_representations.get_mut(ball_collision) {
            collision.self_detection_type = CollisionDetectionType::Discrete;
        }
        let state = detect_and_build(state);

        let self_pair = state
            .collision_pairs
            .iter()
            .find(|pair| pair.is_self_pair())
            .expect("self pair prepared");
        assert!(self_pair.contacts.is_empty());
        assert_eq!(state.contact_constraints.len(), 1);
        assert_eq!(state.mlcp_problem.num_rows(), 1);
        assert_relative_eq!(state.mlcp_problem.b[0], -0.1, epsilon = 1e-9);
    }

    #[test]
    fn self_contacts_are_published_without_constraints() {
        fn touching_itself(_: &Shape, pose: &Pose) -> Vec<Contact> {
            let point = Location::new(pose.translation);
            vec![Contact::discrete(0.05, pose.translation, DVec3::Y, (point.clone(), point))]
        }
        let mut table = ContactCalculationTable::with_defaults();
        table.register_self_dcd(ShapeType::Sphere, touching_itself);
        let registry = Arc::new(ConstraintImplementationRegistry::with_defaults());

        let mut state = ball_on_floor(true);
        let ball_collision = EntityId::from_index(1);
        if let Some(collision) = state.collision_representations.get_mut(ball_collision) {
            collision.self_detection_type = CollisionDetectionType::Discrete;
        }
        let mut pipeline: Vec<Box<dyn Computation>> = vec![
            Box::new(PreUpdate),
            Box::new(UpdateCollisionRepresentations),
            Box::new(PrepareCollisionPairs::new(BroadPhase::default(), 1.0)),
            Box::new(ClearCollisions),
            Box::new(DcdCollision::new(Arc::new(table), false)),
            Box::new(PublishCollisions),
            Box::new(ContactConstraintGeneration::new(registry)),
        ];
        let state = run_pipeline(&mut pipeline, 1e-3, state);

        let self_pair = state
            .collision_pairs
            .iter()
            .find(|pair| pair.is_self_pair())
            .expect("self pair prepared");
        assert_eq!(self_pair.contacts.len(), 1);
        let ball = state
            .collision_representations
            .get(ball_collision)
            .expect("ball collision registered");
        assert_eq!(ball.collisions().get(&ball_collision).map(Vec::len), Some(1));
        // Only the floor contact becomes a constraint.
        assert_eq!(state.contact_constraints.len(), 1);
    }

    #[test]
    fn solving_pushes_the_ball_out_of_the_floor() {
        let state = detect_and_build(ball_on_floor(true));
        let mut pipeline: Vec<Box<dyn Computation>> = vec![
            Box::new(SolveMlcp::new(GaussSeidelMlcpSolver::default())),
            Box::new(PushResults),
            Box::new(UpdateCollisionRepresentations),
            Box::new(PostUpdate),
        ];
        let state = run_pipeline(&mut pipeline, 1e-3, state);
        let ball = state
            .representations
            .values()
            .find(|r| r.name() == "ball")
            .expect("ball registered");
        assert_relative_eq!(ball.pose().translation.y, 0.1, epsilon = 1e-6);
        assert_eq!(state.frame, 1);
    }

    #[test]
    fn failing_free_motion_faults_the_representation_for_the_frame() {
        let mut state = ball_on_floor(true);
        let id = EntityId::from_index(0);
        assert_eq!(state.representations.get(id).map(Representation::name), Some("ball"));
        if let Some(Representation::Rigid(ball)) = state.representations.get_mut(id) {
            ball.set_velocity(Velocity {
                linear: DVec3::new(f64::NAN, 0.0, 0.0),
                angular: DVec3::ZERO,
            });
        }
        let state = detect_and_build(state);
        assert!(state.faulted.contains(&id));
        assert!(state.contact_constraints.is_empty());
        assert!(state.mlcp_problem.is_empty());
    }
}
