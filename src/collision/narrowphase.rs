//! Narrow phase: contact calculations dispatched on the shape types of a pair.

use std::collections::HashSet;

use log::warn;
use parking_lot::Mutex;

use crate::{
    collision::{
        ccd::{self, ShapeMotion},
        contact::Contact,
        mesh_contacts, octree_contacts, primitives,
    },
    core::{
        shapes::{Shape, ShapeType},
        types::Pose,
    },
};

/// Discrete contact calculation between two posed shapes, first shape first.
pub type DcdFn = fn(&Shape, &Pose, &Shape, &Pose) -> Vec<Contact>;

/// Continuous contact calculation between two moving shapes.
pub type CcdFn = fn(&ShapeMotion<'_>, &ShapeMotion<'_>) -> Vec<Contact>;

/// Discrete contacts of a shape with itself.
pub type SelfDcdFn = fn(&Shape, &Pose) -> Vec<Contact>;

/// Continuous contacts of a moving shape with itself.
pub type SelfCcdFn = fn(&ShapeMotion<'_>) -> Vec<Contact>;

#[derive(Clone, Copy)]
struct Entry<F> {
    calculation: F,
    /// The calculation was registered with the operands in the other order.
    swapped: bool,
}

/// Square table of calculations indexed by shape type.
///
/// Registering `(a, b)` also answers lookups of `(b, a)`, with the operands swapped and the
/// contacts flipped back.
pub struct DispatchTable<F: Copy> {
    entries: [[Option<Entry<F>>; ShapeType::COUNT]; ShapeType::COUNT],
}

impl<F: Copy> Default for DispatchTable<F> {
    fn default() -> Self {
        Self {
            entries: [[None; ShapeType::COUNT]; ShapeType::COUNT],
        }
    }
}

impl<F: Copy> DispatchTable<F> {
    pub fn register(&mut self, first: ShapeType, second: ShapeType, calculation: F) {
        self.entries[first.index()][second.index()] = Some(Entry {
            calculation,
            swapped: false,
        });
        if first != second {
            self.entries[second.index()][first.index()] = Some(Entry {
                calculation,
                swapped: true,
            });
        }
    }

    pub fn contains(&self, first: ShapeType, second: ShapeType) -> bool {
        self.entries[first.index()][second.index()].is_some()
    }

    /// Calculation for the pair and whether the operands must be swapped before calling it.
    fn get(&self, first: ShapeType, second: ShapeType) -> Option<Entry<F>> {
        self.entries[first.index()][second.index()]
    }
}

/// Discrete and continuous calculations for every registered pair of shape types.
///
/// Self contacts go through their own calculations, indexed by a single shape type. A shape
/// type without one never collides with itself.
pub struct ContactCalculationTable {
    dcd: DispatchTable<DcdFn>,
    ccd: DispatchTable<CcdFn>,
    self_dcd: [Option<SelfDcdFn>; ShapeType::COUNT],
    self_ccd: [Option<SelfCcdFn>; ShapeType::COUNT],
    warned: Mutex<HashSet<(ShapeType, ShapeType)>>,
}

impl Default for ContactCalculationTable {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl ContactCalculationTable {
    /// Table without any calculation.
    pub fn empty() -> Self {
        Self {
            dcd: DispatchTable::default(),
            ccd: DispatchTable::default(),
            self_dcd: [None; ShapeType::COUNT],
            self_ccd: [None; ShapeType::COUNT],
            warned: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_defaults() -> Self {
        use ShapeType::*;

        let mut table = Self::empty();
        table.register_dcd(Sphere, Sphere, primitives::sphere_sphere);
        table.register_dcd(Sphere, Plane, primitives::sphere_plane);
        table.register_dcd(Sphere, DoubleSidedPlane, primitives::sphere_plane);
        table.register_dcd(Box, Sphere, primitives::box_sphere);
        table.register_dcd(Box, Plane, primitives::box_plane);
        table.register_dcd(Box, DoubleSidedPlane, primitives::box_plane);
        table.register_dcd(Box, Capsule, primitives::box_capsule);
        table.register_dcd(Capsule, Sphere, primitives::capsule_sphere);
        table.register_dcd(Capsule, Plane, primitives::capsule_plane);
        table.register_dcd(Capsule, DoubleSidedPlane, primitives::capsule_plane);
        table.register_dcd(Mesh, Plane, mesh_contacts::mesh_plane);
        table.register_dcd(Mesh, DoubleSidedPlane, mesh_contacts::mesh_plane);
        table.register_dcd(Mesh, Sphere, mesh_contacts::mesh_sphere);
        table.register_dcd(Mesh, Particles, mesh_contacts::mesh_particles);
        table.register_dcd(Particles, Plane, mesh_contacts::particles_plane);
        table.register_dcd(Particles, DoubleSidedPlane, mesh_contacts::particles_plane);
        table.register_dcd(Particles, Sphere, mesh_contacts::particles_sphere);
        table.register_dcd(Octree, Sphere, octree_contacts::octree_sphere);
        table.register_dcd(Octree, Capsule, octree_contacts::octree_capsule);
        table.register_dcd(Octree, Plane, octree_contacts::octree_plane);
        table.register_dcd(Octree, DoubleSidedPlane, octree_contacts::octree_plane);

        table.register_ccd(Sphere, Sphere, ccd::sphere_sphere);
        table.register_ccd(Sphere, Plane, ccd::sphere_plane);
        table.register_ccd(Sphere, DoubleSidedPlane, ccd::sphere_plane);
        table.register_ccd(Particles, Mesh, ccd::particles_mesh);
        table
    }

    pub fn register_dcd(&mut self, first: ShapeType, second: ShapeType, calculation: DcdFn) {
        self.dcd.register(first, second, calculation);
    }

    pub fn register_ccd(&mut self, first: ShapeType, second: ShapeType, calculation: CcdFn) {
        self.ccd.register(first, second, calculation);
    }

    pub fn register_self_dcd(&mut self, shape_type: ShapeType, calculation: SelfDcdFn) {
        self.self_dcd[shape_type.index()] = Some(calculation);
    }

    pub fn register_self_ccd(&mut self, shape_type: ShapeType, calculation: SelfCcdFn) {
        self.self_ccd[shape_type.index()] = Some(calculation);
    }

    pub fn has_self_dcd(&self, shape_type: ShapeType) -> bool {
        self.self_dcd[shape_type.index()].is_some()
    }

    pub fn has_dcd(&self, first: ShapeType, second: ShapeType) -> bool {
        self.dcd.contains(first, second)
    }

    pub fn has_ccd(&self, first: ShapeType, second: ShapeType) -> bool {
        self.ccd.contains(first, second)
    }

    /// Discrete contacts seen from `first`. Compounds are expanded into their sub-shapes.
    pub fn calculate_dcd(&self, first: &Shape, first_pose: &Pose, second: &Shape, second_pose: &Pose) -> Vec<Contact> {
        if let Shape::Compound(children) = first {
            return children
                .iter()
                .flat_map(|child| {
                    self.calculate_dcd(&child.shape, &first_pose.combine(&child.pose), second, second_pose)
                })
                .collect();
        }
        if let Shape::Compound(children) = second {
            return children
                .iter()
                .flat_map(|child| {
                    self.calculate_dcd(first, first_pose, &child.shape, &second_pose.combine(&child.pose))
                })
                .collect();
        }

        let types = (first.shape_type(), second.shape_type());
        let Some(entry) = self.dcd.get(types.0, types.1) else {
            self.warn_missing("discrete", types);
            return Vec::new();
        };
        if entry.swapped {
            (entry.calculation)(second, second_pose, first, first_pose)
                .into_iter()
                .map(Contact::flipped)
                .collect()
        } else {
            (entry.calculation)(first, first_pose, second, second_pose)
        }
    }

    /// Continuous contacts seen from `first`, falling back to the discrete test at the end
    /// of the frame for pairs without a continuous calculation.
    pub fn calculate_ccd(&self, first: &ShapeMotion, second: &ShapeMotion) -> Vec<Contact> {
        let types = (first.shape.shape_type(), second.shape.shape_type());
        match self.ccd.get(types.0, types.1) {
            Some(entry) if entry.swapped => (entry.calculation)(second, first)
                .into_iter()
                .map(Contact::flipped)
                .collect(),
            Some(entry) => (entry.calculation)(first, second),
            None => self.calculate_dcd(first.shape, &first.pose, second.shape, &second.pose),
        }
    }

    /// Discrete contacts of a shape with itself, empty without a self calculation.
    pub fn calculate_self_dcd(&self, shape: &Shape, pose: &Pose) -> Vec<Contact> {
        match self.self_dcd[shape.shape_type().index()] {
            Some(calculation) => calculation(shape, pose),
            None => Vec::new(),
        }
    }

    /// Continuous contacts of a shape with itself, falling back to the discrete self test at
    /// the end of the frame.
    pub fn calculate_self_ccd(&self, motion: &ShapeMotion) -> Vec<Contact> {
        match self.self_ccd[motion.shape.shape_type().index()] {
            Some(calculation) => calculation(motion),
            None => self.calculate_self_dcd(motion.shape, &motion.pose),
        }
    }

    fn warn_missing(&self, kind: &str, types: (ShapeType, ShapeType)) {
        if self.warned.lock().insert(types) {
            warn!(
                "No {} contact calculation between {:?} and {:?}, the pair never collides",
                kind, types.0, types.1
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{collision::contact::Location, core::shapes::SubShape};
    use approx::assert_relative_eq;
    use glam::DVec3;

    #[test]
    fn reversed_lookup_flips_contacts() {
        let table = ContactCalculationTable::with_defaults();
        let sphere = Shape::sphere(1.0);
        let plane = Shape::plane();
        let pose = Pose::from_translation(DVec3::new(0.0, 0.5, 0.0));

        let direct = table.calculate_dcd(&sphere, &pose, &plane, &Pose::IDENTITY);
        let reversed = table.calculate_dcd(&plane, &Pose::IDENTITY, &sphere, &pose);
        assert_eq!(direct.len(), 1);
        assert_eq!(reversed.len(), 1);
        assert_eq!(reversed[0].normal, -direct[0].normal);
        assert_eq!(reversed[0].depth, direct[0].depth);
        assert_eq!(
            reversed[0].penetration_points.0,
            direct[0].penetration_points.1
        );
    }

    #[test]
    fn shapes_only_collide_with_themselves_through_self_calculations() {
        let mut table = ContactCalculationTable::with_defaults();
        let sphere = Shape::sphere(0.5);
        let pose = Pose::from_translation(DVec3::new(0.0, 1.0, 0.0));
        assert!(!table.has_self_dcd(ShapeType::Sphere));
        assert!(table.calculate_self_dcd(&sphere, &pose).is_empty());
        assert!(table
            .calculate_self_ccd(&ShapeMotion::resting(&sphere, pose))
            .is_empty());

        fn touching_itself(_: &Shape, pose: &Pose) -> Vec<Contact> {
            let point = Location::new(pose.translation);
            vec![Contact::discrete(0.1, pose.translation, DVec3::Y, (point.clone(), point))]
        }
        table.register_self_dcd(ShapeType::Sphere, touching_itself);
        assert!(table.has_self_dcd(ShapeType::Sphere));
        assert_eq!(table.calculate_self_dcd(&sphere, &pose).len(), 1);
        assert_eq!(
            table
                .calculate_self_ccd(&ShapeMotion::resting(&sphere, pose))
                .len(),
            1
        );
    }

    #[test]
    fn unregistered_pairs_have_no_contacts() {
        let table = ContactCalculationTable::with_defaults();
        assert!(!table.has_dcd(ShapeType::Cylinder, ShapeType::Cylinder));
        let cylinder = Shape::Cylinder {
            length: 1.0,
            radius: 1.0,
        };
        assert!(table
            .calculate_dcd(&cylinder, &Pose::IDENTITY, &cylinder, &Pose::IDENTITY)
            .is_empty());
    }

    #[test]
    fn compound_children_are_posed_in_the_compound_frame() {
        let table = ContactCalculationTable::with_defaults();
        let compound = Shape::Compound(vec![
            SubShape {
                pose: Pose::from_translation(DVec3::new(-2.0, 0.0, 0.0)),
                shape: Shape::sphere(0.5),
            },
            SubShape {
                pose: Pose::from_translation(DVec3::new(2.0, -0.2, 0.0)),
                shape: Shape::sphere(0.5),
            },
        ]);
        let contacts = table.calculate_dcd(
            &Shape::plane(),
            &Pose::IDENTITY,
            &compound,
            &Pose::from_translation(DVec3::new(0.0, 0.6, 0.0)),
        );
        assert_eq!(contacts.len(), 1);
        assert_relative_eq!(contacts[0].depth, 0.1, epsilon = 1e-12);
        assert_eq!(contacts[0].normal, -DVec3::Y);
    }

    #[test]
    fn continuous_pairs_without_calculation_use_the_discrete_test() {
        let table = ContactCalculationTable::with_defaults();
        let cube = Shape::cuboid(1.0, 1.0, 1.0);
        let plane = Shape::plane();
        let contacts = table.calculate_ccd(
            &ShapeMotion::resting(&cube, Pose::from_translation(DVec3::new(0.0, 0.4, 0.0))),
            &ShapeMotion::resting(&plane, Pose::IDENTITY),
        );
        assert_eq!(contacts.len(), 4);
    }
}
