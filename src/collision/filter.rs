use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;

use crate::{
    collision::contact::{CollisionPair, Location},
    utils::{allocator::EntityId, buffered::BufferedValue},
};

/// Triangles and nodes of the filtered representation, kept apart since both are indexed
/// from zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilteredElements {
    pub triangles: HashSet<usize>,
    pub nodes: HashSet<usize>,
}

impl FilteredElements {
    pub fn triangles(triangles: impl IntoIterator<Item = usize>) -> Self {
        Self {
            triangles: triangles.into_iter().collect(),
            nodes: HashSet::new(),
        }
    }

    pub fn nodes(nodes: impl IntoIterator<Item = usize>) -> Self {
        Self {
            triangles: HashSet::new(),
            nodes: nodes.into_iter().collect(),
        }
    }

    pub fn with_nodes(mut self, nodes: impl IntoIterator<Item = usize>) -> Self {
        self.nodes.extend(nodes);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty() && self.nodes.is_empty()
    }

    fn references(&self, location: &Location) -> bool {
        location
            .triangle
            .is_some_and(|triangle| self.triangles.contains(&triangle.index))
            || location.node.is_some_and(|node| self.nodes.contains(&node))
    }
}

type FilterMap = HashMap<EntityId, FilteredElements>;

/// Removes contacts touching selected elements of one collision representation.
///
/// For each other collision representation the filter keeps the triangles and nodes of the
/// filtered representation that must not collide with it. Writers fill a pending map from any
/// thread; the pipeline publishes it once per frame and filters against the published
/// snapshot only.
#[derive(Debug)]
pub struct ElementContactFilter {
    collision: EntityId,
    pending: Mutex<FilterMap>,
    published: BufferedValue<FilterMap>,
}

impl ElementContactFilter {
    pub fn new(collision: EntityId) -> Self {
        Self {
            collision,
            pending: Mutex::new(FilterMap::new()),
            published: BufferedValue::new(FilterMap::new()),
        }
    }

    /// Collision representation whose elements are filtered.
    pub fn collision(&self) -> EntityId {
        self.collision
    }

    /// Elements of the filtered representation that must not collide with `other`. An
    /// empty set removes the filter for `other`.
    pub fn set_filter(&self, other: EntityId, elements: FilteredElements) {
        let mut pending = self.pending.lock();
        if elements.is_empty() {
            pending.remove(&other);
        } else {
            pending.insert(other, elements);
        }
    }

    /// Makes the pending filters visible to [`Self::filter_contacts`].
    pub fn publish(&self) {
        let snapshot = self.pending.lock().clone();
        self.published.publish(snapshot);
    }

    /// Drops the contacts of `pair` whose location on the filtered side references a listed
    /// element. Returns the number of removed contacts.
    pub fn filter_contacts(&self, pair: &mut CollisionPair) -> usize {
        let (filtered_is_first, other) = if pair.first == self.collision {
            (true, pair.second)
        } else if pair.second == self.collision {
            (false, pair.first)
        } else {
            return 0;
        };
        let published = self.published.get();
        let Some(elements) = published.get(&other) else {
            return 0;
        };

        let before = pair.contacts.len();
        pair.contacts.retain(|contact| {
            let location = if filtered_is_first {
                &contact.penetration_points.0
            } else {
                &contact.penetration_points.1
            };
            !elements.references(location)
        });
        before - pair.contacts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec3;

    use crate::collision::contact::{CollisionDetectionType, Contact};

    fn contact_on(first_triangle: usize) -> Contact {
        Contact::discrete(
            0.1,
            DVec3::ZERO,
            DVec3::Y,
            (
                Location::new(DVec3::ZERO).with_triangle(first_triangle, DVec3::splat(1.0 / 3.0)),
                Location::new(DVec3::ZERO),
            ),
        )
    }

    #[test]
    fn filters_apply_only_after_publish() {
        let cloth = EntityId::from_index(0);
        let tool = EntityId::from_index(1);
        let filter = ElementContactFilter::new(cloth);
        let mut pair = CollisionPair::new(cloth, tool, CollisionDetectionType::Discrete);
        pair.contacts = vec![contact_on(2), contact_on(7)];

        filter.set_filter(tool, FilteredElements::triangles([7]));
        assert_eq!(filter.filter_contacts(&mut pair), 0);

        filter.publish();
        assert_eq!(filter.filter_contacts(&mut pair), 1);
        assert_eq!(pair.contacts.len(), 1);
        assert_eq!(pair.contacts[0].penetration_points.0.triangle.map(|t| t.index), Some(2));
    }

    #[test]
    fn triangles_and_nodes_with_the_same_index_are_distinct() {
        let cloth = EntityId::from_index(0);
        let tool = EntityId::from_index(1);
        let filter = ElementContactFilter::new(cloth);
        let node_contact = |node: usize| {
            Contact::discrete(
                0.1,
                DVec3::ZERO,
                DVec3::Y,
                (Location::new(DVec3::ZERO).with_node(node), Location::new(DVec3::ZERO)),
            )
        };
        let mut pair = CollisionPair::new(cloth, tool, CollisionDetectionType::Discrete);
        pair.contacts = vec![contact_on(3), node_contact(3)];

        filter.set_filter(tool, FilteredElements::triangles([3]));
        filter.publish();
        assert_eq!(filter.filter_contacts(&mut pair), 1);
        assert_eq!(pair.contacts[0].penetration_points.0.node, Some(3));

        pair.contacts = vec![contact_on(3), node_contact(3)];
        filter.set_filter(tool, FilteredElements::nodes([3]));
        filter.publish();
        assert_eq!(filter.filter_contacts(&mut pair), 1);
        assert_eq!(pair.contacts[0].penetration_points.0.triangle.map(|t| t.index), Some(3));

        pair.contacts = vec![contact_on(3), node_contact(3)];
        filter.set_filter(tool, FilteredElements::triangles([3]).with_nodes([3]));
        filter.publish();
        assert_eq!(filter.filter_contacts(&mut pair), 2);

        filter.set_filter(tool, FilteredElements::default());
        filter.publish();
        pair.contacts = vec![node_contact(3)];
        assert_eq!(filter.filter_contacts(&mut pair), 0);
    }

    #[test]
    fn swapped_pairs_check_the_second_location() {
        let cloth = EntityId::from_index(0);
        let tool = EntityId::from_index(1);
        let filter = ElementContactFilter::new(cloth);
        filter.set_filter(tool, FilteredElements::triangles([2]));
        filter.publish();

        let mut pair = CollisionPair::new(cloth, tool, CollisionDetectionType::Discrete);
        pair.contacts = vec![contact_on(2)];
        pair.swap();
        assert_eq!(filter.filter_contacts(&mut pair), 1);
    }
}
