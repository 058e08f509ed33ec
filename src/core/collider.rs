use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use serde::{Deserialize, Serialize};

use super::{mesh::Aabb, shapes::Shape, types::Pose};
use crate::{
    collision::contact::{CollisionDetectionType, Contact},
    utils::allocator::EntityId,
};

/// What a collision representation follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CollisionSource {
    /// Kinematic geometry posed only through `local_pose`.
    Standalone,
    Representation(EntityId),
    ParticleSystem(EntityId),
}

/// Geometry tested by the collision pipeline, attached to a physics representation or a
/// particle system.
///
/// Rigid and fixed sources share their shape; deformables and particle systems get a shape
/// rebuilt from their nodes every frame, with the identity pose.
#[derive(Debug, Clone)]
pub struct CollisionRepresentation {
    pub name: String,
    pub source: CollisionSource,
    shape: Arc<Shape>,
    previous_shape: Arc<Shape>,
    /// Pose relative to the source representation.
    pub local_pose: Pose,
    pose: Pose,
    previous_pose: Pose,
    pub detection_type: CollisionDetectionType,
    pub self_detection_type: CollisionDetectionType,
    ignored: HashSet<EntityId>,
    /// Coulomb coefficient used by the contacts of this representation.
    pub friction: f64,
    pub is_active: bool,
    collisions: HashMap<EntityId, Vec<Contact>>,
}

impl CollisionRepresentation {
    pub fn builder(shape: Arc<Shape>) -> CollisionRepresentationBuilder {
        CollisionRepresentationBuilder::new(shape)
    }

    pub fn shape(&self) -> &Arc<Shape> {
        &self.shape
    }

    pub fn previous_shape(&self) -> &Arc<Shape> {
        &self.previous_shape
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }

    pub fn previous_pose(&self) -> Pose {
        self.previous_pose
    }

    pub fn physics_representation(&self) -> Option<EntityId> {
        match self.source {
            CollisionSource::Representation(id) => Some(id),
            _ => None,
        }
    }

    pub fn particle_system(&self) -> Option<EntityId> {
        match self.source {
            CollisionSource::ParticleSystem(id) => Some(id),
            _ => None,
        }
    }

    /// Keeps the pose and shape of the last frame for continuous detection.
    pub fn store_previous(&mut self) {
        self.previous_pose = self.pose;
        self.previous_shape = Arc::clone(&self.shape);
    }

    pub fn set_pose(&mut self, pose: Pose) {
        self.pose = pose;
    }

    pub fn set_shape(&mut self, shape: Arc<Shape>) {
        self.shape = shape;
    }

    pub fn aabb(&self) -> Aabb {
        self.shape.aabb(&self.pose)
    }

    /// Bounds swept between the previous and current frames.
    pub fn swept_aabb(&self) -> Aabb {
        self.previous_shape
            .aabb(&self.previous_pose)
            .merge(&self.aabb())
    }

    pub fn ignore(&mut self, other: EntityId) {
        self.ignored.insert(other);
    }

    pub fn stop_ignoring(&mut self, other: EntityId) {
        self.ignored.remove(&other);
    }

    pub fn is_ignoring(&self, other: EntityId) -> bool {
        self.ignored.contains(&other)
    }

    pub fn collisions(&self) -> &HashMap<EntityId, Vec<Contact>> {
        &self.collisions
    }

    pub fn is_colliding_with(&self, other: EntityId) -> bool {
        self.collisions
            .get(&other)
            .is_some_and(|contacts| !contacts.is_empty())
    }

    pub fn clear_collisions(&mut self) {
        self.collisions.clear();
    }

    pub fn add_contacts(&mut self, other: EntityId, contacts: impl IntoIterator<Item = Contact>) {
        self.collisions.entry(other).or_default().extend(contacts);
    }
}

pub struct CollisionRepresentationBuilder {
    name: String,
    shape: Arc<Shape>,
    source: CollisionSource,
    local_pose: Pose,
    detection_type: CollisionDetectionType,
    self_detection_type: CollisionDetectionType,
    friction: f64,
}

impl CollisionRepresentationBuilder {
    pub fn new(shape: Arc<Shape>) -> Self {
        Self {
            name: String::new(),
            shape,
            source: CollisionSource::Standalone,
            local_pose: Pose::IDENTITY,
            detection_type: CollisionDetectionType::Discrete,
            self_detection_type: CollisionDetectionType::None,
            friction: 0.0,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn representation(mut self, representation: EntityId) -> Self {
        self.source = CollisionSource::Representation(representation);
        self
    }

    pub fn particle_system(mut self, particles: EntityId) -> Self {
        self.source = CollisionSource::ParticleSystem(particles);
        self
    }

    pub fn local_pose(mut self, pose: Pose) -> Self {
        self.local_pose = pose;
        self
    }

    pub fn detection_type(mut self, detection_type: CollisionDetectionType) -> Self {
        self.detection_type = detection_type;
        self
    }

    pub fn self_detection_type(mut self, detection_type: CollisionDetectionType) -> Self {
        self.self_detection_type = detection_type;
        self
    }

    pub fn friction(mut self, friction: f64) -> Self {
        self.friction = friction.max(0.0);
        self
    }

    pub fn build(self) -> CollisionRepresentation {
        CollisionRepresentation {
            name: self.name,
            source: self.source,
            previous_shape: Arc::clone(&self.shape),
            shape: self.shape,
            local_pose: self.local_pose,
            pose: self.local_pose,
            previous_pose: self.local_pose,
            detection_type: self.detection_type,
            self_detection_type: self.self_detection_type,
            ignored: HashSet::new(),
            friction: self.friction,
            is_active: true,
            collisions: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec3;

    #[test]
    fn previous_pose_survives_one_update() {
        let mut collision = CollisionRepresentation::builder(Arc::new(Shape::sphere(1.0)))
            .name("ball")
            .build();
        collision.store_previous();
        collision.set_pose(Pose::from_translation(DVec3::X));
        assert_eq!(collision.previous_pose(), Pose::IDENTITY);
        let swept = collision.swept_aabb();
        assert_eq!(swept.min.x, -1.0);
        assert_eq!(swept.max.x, 2.0);
    }

    #[test]
    fn ignoring_is_per_handle() {
        let mut collision =
            CollisionRepresentation::builder(Arc::new(Shape::plane())).build();
        let other = EntityId::from_index(3);
        collision.ignore(other);
        assert!(collision.is_ignoring(other));
        collision.stop_ignoring(other);
        assert!(!collision.is_ignoring(other));
    }
}
