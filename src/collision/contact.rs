use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::{core::octree::OctreePath, utils::allocator::EntityId};

/// How a contact, or a pair, is detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CollisionDetectionType {
    /// No detection at all.
    None,
    #[default]
    Discrete,
    Continuous,
}

impl CollisionDetectionType {
    /// Pair type of two representations: none wins over discrete, which wins over continuous.
    pub fn combine(self, other: CollisionDetectionType) -> CollisionDetectionType {
        use CollisionDetectionType::*;
        match (self, other) {
            (None, _) | (_, None) => None,
            (Discrete, _) | (_, Discrete) => Discrete,
            (Continuous, Continuous) => Continuous,
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            CollisionDetectionType::None => "none",
            CollisionDetectionType::Discrete => "DCD",
            CollisionDetectionType::Continuous => "CCD",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContactType {
    Discrete,
    Continuous,
}

/// Index of a mesh element with local coordinates inside it (barycentric for triangles).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndexedLocalCoordinate {
    pub index: usize,
    pub coordinate: DVec3,
}

impl IndexedLocalCoordinate {
    pub fn new(index: usize, coordinate: DVec3) -> Self {
        Self { index, coordinate }
    }
}

/// Where a contact touches one representation, in every parameterization the detector
/// could provide.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub global_position: DVec3,
    /// Position in the frame of the representation the collision shape is attached to.
    pub rigid_local_position: Option<DVec3>,
    pub triangle: Option<IndexedLocalCoordinate>,
    /// Node (for meshes over nodes) or particle index.
    pub node: Option<usize>,
    pub octree_node_path: Option<OctreePath>,
}

impl Location {
    pub fn new(global_position: DVec3) -> Self {
        Self {
            global_position,
            ..Self::default()
        }
    }

    pub fn with_triangle(mut self, triangle: usize, barycentric: DVec3) -> Self {
        self.triangle = Some(IndexedLocalCoordinate::new(triangle, barycentric));
        self
    }

    pub fn with_node(mut self, node: usize) -> Self {
        self.node = Some(node);
        self
    }

    pub fn with_octree_node_path(mut self, path: OctreePath) -> Self {
        self.octree_node_path = Some(path);
        self
    }
}

/// One contact between the first and second representation of a pair.
///
/// The normal is the direction in which the first representation moves to separate.
/// `penetration_points.0` lies on the first representation, `.1` on the second, and
/// `normal · (p0 − p1) = −depth`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub contact_type: ContactType,
    /// Time of impact in `[0, 1]` over the frame; 1 for discrete contacts.
    pub time: f64,
    pub depth: f64,
    pub contact_point: DVec3,
    pub normal: DVec3,
    pub penetration_points: (Location, Location),
}

impl Contact {
    pub fn discrete(
        depth: f64,
        contact_point: DVec3,
        normal: DVec3,
        penetration_points: (Location, Location),
    ) -> Self {
        Self {
            contact_type: ContactType::Discrete,
            time: 1.0,
            depth,
            contact_point,
            normal,
            penetration_points,
        }
    }

    pub fn continuous(
        time: f64,
        depth: f64,
        contact_point: DVec3,
        normal: DVec3,
        penetration_points: (Location, Location),
    ) -> Self {
        Self {
            contact_type: ContactType::Continuous,
            time,
            depth,
            contact_point,
            normal,
            penetration_points,
        }
    }

    /// Same contact seen from the other representation.
    pub fn flipped(mut self) -> Self {
        self.normal = -self.normal;
        let (first, second) = self.penetration_points;
        self.penetration_points = (second, first);
        self
    }
}

/// Two collision representations tested against each other, with the contacts found this
/// frame.
#[derive(Debug, Clone, PartialEq)]
pub struct CollisionPair {
    pub first: EntityId,
    pub second: EntityId,
    pub detection_type: CollisionDetectionType,
    pub contacts: Vec<Contact>,
    is_swapped: bool,
}

impl CollisionPair {
    pub fn new(first: EntityId, second: EntityId, detection_type: CollisionDetectionType) -> Self {
        Self {
            first,
            second,
            detection_type,
            contacts: Vec::new(),
            is_swapped: false,
        }
    }

    pub fn is_self_pair(&self) -> bool {
        self.first == self.second
    }

    pub fn is_swapped(&self) -> bool {
        self.is_swapped
    }

    pub fn has_contacts(&self) -> bool {
        !self.contacts.is_empty()
    }

    /// Exchanges the sides, flipping every contact.
    pub fn swap(&mut self) {
        std::mem::swap(&mut self.first, &mut self.second);
        for contact in &mut self.contacts {
            *contact = contact.clone().flipped();
        }
        self.is_swapped = !self.is_swapped;
    }
}
