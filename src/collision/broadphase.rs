use crate::{
    collision::contact::{CollisionDetectionType, CollisionPair},
    core::{collider::CollisionRepresentation, mesh::Aabb},
    utils::allocator::EntityId,
};

/// Broad phase building the collision pairs of a frame from the bounds of every collision
/// representation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BroadPhase {
    /// Distance added around every bound before the overlap test.
    pub margin: f64,
}

impl Default for BroadPhase {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl BroadPhase {
    pub fn new(margin: f64) -> Self {
        Self { margin }
    }

    /// Pairs `(first, second)` with `second` registered at or after `first`.
    ///
    /// `collisions` must be in registration order. Self pairs use the self detection type of
    /// the representation. A pair is dropped when either side is inactive or ignores the
    /// other, when its detection type is `None` or when the bounds cannot overlap (swept
    /// over the frame for continuous pairs).
    pub fn prepare_pairs(&self, collisions: &[(EntityId, &CollisionRepresentation)]) -> Vec<CollisionPair> {
        let bounds: Vec<(Aabb, Aabb)> = collisions
            .iter()
            .map(|(_, collision)| {
                (
                    collision.aabb().expanded(self.margin),
                    collision.swept_aabb().expanded(self.margin),
                )
            })
            .collect();

        let mut pairs = Vec::new();
        for (i, (first_id, first)) in collisions.iter().enumerate() {
            if !first.is_active {
                continue;
            }
            for (j, (second_id, second)) in collisions.iter().enumerate().skip(i) {
                if !second.is_active {
                    continue;
                }
                let detection_type = if i == j {
                    first.self_detection_type
                } else {
                    if first.is_ignoring(*second_id) || second.is_ignoring(*first_id) {
                        continue;
                    }
                    first.detection_type.combine(second.detection_type)
                };
                let overlaps = match detection_type {
                    CollisionDetectionType::None => false,
                    _ if i == j => true,
                    CollisionDetectionType::Discrete => bounds[i].0.intersects(&bounds[j].0),
                    CollisionDetectionType::Continuous => bounds[i].1.intersects(&bounds[j].1),
                };
                if overlaps {
                    pairs.push(CollisionPair::new(*first_id, *second_id, detection_type));
                }
            }
        }
        pairs
    }
}
