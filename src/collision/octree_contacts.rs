//! Octree contacts: each active leaf collides as a solid box.
//!
//! The octree is descended from the root and a subtree is skipped as soon as its box cannot
//! reach the other shape.

use glam::DVec3;

use crate::{
    collision::{
        contact::Contact,
        primitives::{box_capsule, box_plane, box_sphere, WorldPlane},
    },
    config::DEFAULT_CONTACT_EPSILON,
    core::{
        mesh::Aabb,
        octree::{OctreeNode, OctreePath},
        shapes::Shape,
        types::Pose,
    },
};

type BoxContactFn = fn(&Shape, &Pose, &Shape, &Pose) -> Vec<Contact>;

/// World region a node box must reach to possibly touch the other shape.
enum Reach {
    Bounds(Aabb),
    /// Single-sided plane: some corner at or below the plane.
    HalfSpace(WorldPlane),
    /// Double-sided plane: corners on both sides or near the plane.
    Slab(WorldPlane),
}

impl Reach {
    fn of(shape: &Shape, pose: &Pose) -> Self {
        match (shape, WorldPlane::from_shape(shape, pose)) {
            (Shape::Plane { .. }, Some(plane)) => Reach::HalfSpace(plane),
            (Shape::DoubleSidedPlane { .. }, Some(plane)) => Reach::Slab(plane),
            _ => Reach::Bounds(shape.aabb(pose).expanded(DEFAULT_CONTACT_EPSILON)),
        }
    }

    fn is_reached_by(&self, corners: &[DVec3; 8]) -> bool {
        match self {
            Reach::Bounds(bounds) => Aabb::from_points(corners).intersects(bounds),
            Reach::HalfSpace(plane) => corners
                .iter()
                .any(|&corner| plane.signed_distance(corner) < DEFAULT_CONTACT_EPSILON),
            Reach::Slab(plane) => {
                let (low, high) = corners.iter().fold((f64::MAX, f64::MIN), |(low, high), &c| {
                    let distance = plane.signed_distance(c);
                    (low.min(distance), high.max(distance))
                });
                low < DEFAULT_CONTACT_EPSILON && high > -DEFAULT_CONTACT_EPSILON
            }
        }
    }
}

struct LeafQuery<'a> {
    octree_pose: &'a Pose,
    other: &'a Shape,
    other_pose: &'a Pose,
    reach: Reach,
    box_contacts: BoxContactFn,
}

impl LeafQuery<'_> {
    fn descend(&self, node: &OctreeNode, path: &mut OctreePath, contacts: &mut Vec<Contact>) {
        if !node.is_active {
            return;
        }
        let corners = node.bounds.corners().map(|c| self.octree_pose.transform_point(c));
        if !self.reach.is_reached_by(&corners) {
            return;
        }
        match &node.children {
            Some(children) => {
                for (index, child) in children.iter().enumerate() {
                    path.push(index);
                    self.descend(child, path, contacts);
                    path.pop();
                }
            }
            None => {
                let leaf_shape = Shape::Box {
                    size: node.bounds.size(),
                };
                let leaf_pose = self
                    .octree_pose
                    .combine(&Pose::from_translation(node.bounds.center()));
                contacts.extend(
                    (self.box_contacts)(&leaf_shape, &leaf_pose, self.other, self.other_pose)
                        .into_iter()
                        .map(|mut contact| {
                            contact.penetration_points.0.octree_node_path = Some(path.clone());
                            contact
                        }),
                );
            }
        }
    }
}

fn leaves_against(
    first: &Shape,
    first_pose: &Pose,
    second: &Shape,
    second_pose: &Pose,
    box_contacts: BoxContactFn,
) -> Vec<Contact> {
    let Shape::Octree(octree) = first else {
        return Vec::new();
    };
    let query = LeafQuery {
        octree_pose: first_pose,
        other: second,
        other_pose: second_pose,
        reach: Reach::of(second, second_pose),
        box_contacts,
    };
    let mut contacts = Vec::new();
    query.descend(&octree.root, &mut Vec::new(), &mut contacts);
    contacts
}

pub fn octree_sphere(first: &Shape, first_pose: &Pose, second: &Shape, second_pose: &Pose) -> Vec<Contact> {
    leaves_against(first, first_pose, second, second_pose, box_sphere)
}

pub fn octree_capsule(first: &Shape, first_pose: &Pose, second: &Shape, second_pose: &Pose) -> Vec<Contact> {
    leaves_against(first, first_pose, second, second_pose, box_capsule)
}

/// Single or double-sided plane.
pub fn octree_plane(first: &Shape, first_pose: &Pose, second: &Shape, second_pose: &Pose) -> Vec<Contact> {
    leaves_against(first, first_pose, second, second_pose, box_plane)
}
