//! Geometric shapes and their volume properties.
//!
//! Shapes are expressed in their own local frame and carry no pose. Every shape reports its
//! volume, its center and its second moment of volume about that center, so that
//! `inertia = density * second_moment_of_volume`.

use std::f64::consts::PI;

use glam::{DMat3, DVec3};
use serde::{Deserialize, Serialize};

use crate::{
    core::{
        mesh::{Aabb, AabbTree, TriangleMesh},
        octree::OctreeNode,
        types::{MassProperties, Pose},
    },
    error::{PhysicsError, Result},
};

/// Discriminant used to index contact calculation tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ShapeType {
    Sphere,
    Box,
    Plane,
    DoubleSidedPlane,
    Capsule,
    Cylinder,
    Mesh,
    Particles,
    Octree,
    Compound,
}

impl ShapeType {
    pub const COUNT: usize = 10;

    pub const ALL: [ShapeType; Self::COUNT] = [
        ShapeType::Sphere,
        ShapeType::Box,
        ShapeType::Plane,
        ShapeType::DoubleSidedPlane,
        ShapeType::Capsule,
        ShapeType::Cylinder,
        ShapeType::Mesh,
        ShapeType::Particles,
        ShapeType::Octree,
        ShapeType::Compound,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Set of spheres of equal radius, one per particle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticlesShape {
    pub radius: f64,
    pub positions: Vec<DVec3>,
    #[serde(skip)]
    tree: AabbTree,
}

impl ParticlesShape {
    pub fn new(radius: f64, positions: Vec<DVec3>) -> Self {
        let mut shape = Self {
            radius,
            positions,
            tree: AabbTree::default(),
        };
        shape.update();
        shape
    }

    pub fn set_positions(&mut self, positions: Vec<DVec3>) {
        self.positions = positions;
        self.update();
    }

    pub fn tree(&self) -> &AabbTree {
        &self.tree
    }

    fn update(&mut self) {
        let radius = DVec3::splat(self.radius);
        self.tree = AabbTree::build(
            self.positions
                .iter()
                .map(|&p| Aabb::new(p - radius, p + radius))
                .collect(),
        );
    }
}

/// Sparse octree shape; every active leaf is a solid box.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OctreeShape {
    pub root: OctreeNode,
}

impl OctreeShape {
    pub fn new(bounds: Aabb) -> Self {
        Self {
            root: OctreeNode::new(bounds),
        }
    }
}

/// Shape attached to a compound with a pose relative to the compound frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubShape {
    pub pose: Pose,
    pub shape: Shape,
}

/// Geometric description of a collision or mass object.
///
/// Planes, double-sided planes and capsules/cylinders are Y-up: the plane normal defaults to
/// `+Y` and capsule/cylinder axes run along Y.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Shape {
    Sphere { radius: f64 },
    Box { size: DVec3 },
    /// Half space `normal · x + d <= 0` is inside.
    Plane { normal: DVec3, d: f64 },
    DoubleSidedPlane { normal: DVec3, d: f64 },
    Capsule { length: f64, radius: f64 },
    Cylinder { length: f64, radius: f64 },
    Mesh(TriangleMesh),
    Particles(ParticlesShape),
    Octree(OctreeShape),
    Compound(Vec<SubShape>),
}

impl Shape {
    pub fn sphere(radius: f64) -> Self {
        Shape::Sphere { radius }
    }

    pub fn cuboid(size_x: f64, size_y: f64, size_z: f64) -> Self {
        Shape::Box {
            size: DVec3::new(size_x, size_y, size_z),
        }
    }

    /// Plane through the local origin with a `+Y` normal.
    pub fn plane() -> Self {
        Shape::Plane {
            normal: DVec3::Y,
            d: 0.0,
        }
    }

    pub fn capsule(length: f64, radius: f64) -> Self {
        Shape::Capsule { length, radius }
    }

    pub fn shape_type(&self) -> ShapeType {
        match self {
            Shape::Sphere { .. } => ShapeType::Sphere,
            Shape::Box { .. } => ShapeType::Box,
            Shape::Plane { .. } => ShapeType::Plane,
            Shape::DoubleSidedPlane { .. } => ShapeType::DoubleSidedPlane,
            Shape::Capsule { .. } => ShapeType::Capsule,
            Shape::Cylinder { .. } => ShapeType::Cylinder,
            Shape::Mesh(_) => ShapeType::Mesh,
            Shape::Particles(_) => ShapeType::Particles,
            Shape::Octree(_) => ShapeType::Octree,
            Shape::Compound(_) => ShapeType::Compound,
        }
    }

    /// Checks the shape parameters.
    pub fn validate(&self) -> Result<()> {
        let positive = |value: f64, name: &str| {
            if value > 0.0 && value.is_finite() {
                Ok(())
            } else {
                Err(PhysicsError::invalid_parameter(format!(
                    "{name} must be positive, got {value}"
                )))
            }
        };
        match self {
            Shape::Sphere { radius } => positive(*radius, "sphere radius"),
            Shape::Box { size } => {
                positive(size.x, "box size x")?;
                positive(size.y, "box size y")?;
                positive(size.z, "box size z")
            }
            Shape::Plane { normal, .. } | Shape::DoubleSidedPlane { normal, .. } => {
                if (normal.length() - 1.0).abs() < 1e-9 {
                    Ok(())
                } else {
                    Err(PhysicsError::invalid_parameter("plane normal must be unit length"))
                }
            }
            Shape::Capsule { length, radius } | Shape::Cylinder { length, radius } => {
                positive(*radius, "radius")?;
                if *length >= 0.0 {
                    Ok(())
                } else {
                    Err(PhysicsError::invalid_parameter("length must not be negative"))
                }
            }
            Shape::Particles(particles) => positive(particles.radius, "particle radius"),
            Shape::Compound(children) => children.iter().try_for_each(|c| c.shape.validate()),
            Shape::Mesh(_) | Shape::Octree(_) => Ok(()),
        }
    }

    pub fn volume(&self) -> f64 {
        self.volume_properties().0
    }

    pub fn center(&self) -> DVec3 {
        self.volume_properties().1
    }

    pub fn second_moment_of_volume(&self) -> DMat3 {
        self.volume_properties().2
    }

    /// Volume, center and second moment of volume about the center.
    pub fn volume_properties(&self) -> (f64, DVec3, DMat3) {
        match self {
            Shape::Sphere { radius } => {
                let volume = 4.0 / 3.0 * PI * radius.powi(3);
                let moment = 2.0 / 5.0 * volume * radius * radius;
                (volume, DVec3::ZERO, DMat3::from_diagonal(DVec3::splat(moment)))
            }
            Shape::Box { size } => box_properties(*size),
            Shape::Plane { .. } | Shape::DoubleSidedPlane { .. } | Shape::Particles(_) => {
                (0.0, DVec3::ZERO, DMat3::ZERO)
            }
            Shape::Capsule { length, radius } => capsule_properties(*length, *radius),
            Shape::Cylinder { length, radius } => {
                let volume = PI * radius * radius * length;
                let transverse = volume * (3.0 * radius * radius + length * length) / 12.0;
                let axial = volume * radius * radius / 2.0;
                (
                    volume,
                    DVec3::ZERO,
                    DMat3::from_diagonal(DVec3::new(transverse, axial, transverse)),
                )
            }
            Shape::Mesh(mesh) => mesh.volume_integrals(),
            Shape::Octree(octree) => {
                let parts: Vec<(f64, DVec3, DMat3)> = octree
                    .root
                    .active_leaves()
                    .into_iter()
                    .map(|(_, leaf)| {
                        let (volume, _, moment) = box_properties(leaf.bounds.size());
                        (volume, leaf.bounds.center(), moment)
                    })
                    .collect();
                combine_parts(&parts)
            }
            Shape::Compound(children) => {
                let parts: Vec<(f64, DVec3, DMat3)> = children
                    .iter()
                    .map(|child| {
                        let (volume, center, moment) = child.shape.volume_properties();
                        let r = child.pose.rotation_matrix();
                        (
                            volume,
                            child.pose.transform_point(center),
                            r * moment * r.transpose(),
                        )
                    })
                    .collect();
                combine_parts(&parts)
            }
        }
    }

    /// Mass, center and inertia of the shape filled with `density`.
    pub fn mass_properties(&self, density: f64) -> MassProperties {
        let (volume, center, moment) = self.volume_properties();
        MassProperties {
            mass: density * volume,
            center,
            inertia: moment * density,
        }
    }

    /// World bounds of the shape placed at `pose`.
    pub fn aabb(&self, pose: &Pose) -> Aabb {
        match self {
            Shape::Sphere { radius } => {
                let c = pose.translation;
                Aabb::new(c - DVec3::splat(*radius), c + DVec3::splat(*radius))
            }
            Shape::Box { size } => Aabb::new(-*size * 0.5, *size * 0.5).transformed(pose),
            Shape::Plane { .. } | Shape::DoubleSidedPlane { .. } => Aabb::infinite(),
            Shape::Capsule { length, radius } => {
                let half = DVec3::new(0.0, length * 0.5, 0.0);
                let a = pose.transform_point(-half);
                let b = pose.transform_point(half);
                Aabb::new(a.min(b), a.max(b)).expanded(*radius)
            }
            Shape::Cylinder { length, radius } => {
                let half = DVec3::new(*radius, length * 0.5, *radius);
                Aabb::new(-half, half).transformed(pose)
            }
            Shape::Mesh(mesh) => mesh.aabb().transformed(pose),
            Shape::Particles(particles) => particles
                .tree()
                .bounds()
                .transformed(pose),
            Shape::Octree(octree) => octree.root.bounds.transformed(pose),
            Shape::Compound(children) => children.iter().fold(Aabb::empty(), |acc, child| {
                acc.merge(&child.shape.aabb(&pose.combine(&child.pose)))
            }),
        }
    }
}

fn box_properties(size: DVec3) -> (f64, DVec3, DMat3) {
    let volume = size.x * size.y * size.z;
    let sq = size * size;
    let moment = DVec3::new(sq.y + sq.z, sq.x + sq.z, sq.x + sq.y) * (volume / 12.0);
    (volume, DVec3::ZERO, DMat3::from_diagonal(moment))
}

fn capsule_properties(length: f64, radius: f64) -> (f64, DVec3, DMat3) {
    let r2 = radius * radius;
    let cylinder_volume = PI * r2 * length;
    let sphere_volume = 4.0 / 3.0 * PI * r2 * radius;
    let volume = cylinder_volume + sphere_volume;

    // Two hemispheres shifted by half the length along the axis.
    let half = length * 0.5;
    let hemisphere_offset = 3.0 * radius / 8.0;
    let sphere_transverse = sphere_volume
        * (2.0 / 5.0 * r2 + half * half + 2.0 * half * hemisphere_offset);
    let cylinder_transverse = cylinder_volume * (3.0 * r2 + length * length) / 12.0;
    let axial = cylinder_volume * r2 / 2.0 + sphere_volume * 2.0 / 5.0 * r2;
    let transverse = cylinder_transverse + sphere_transverse;
    (
        volume,
        DVec3::ZERO,
        DMat3::from_diagonal(DVec3::new(transverse, axial, transverse)),
    )
}

/// Sums parts given as (volume, center, moment about own center), shifting each with the
/// parallel-axis theorem.
fn combine_parts(parts: &[(f64, DVec3, DMat3)]) -> (f64, DVec3, DMat3) {
    let volume: f64 = parts.iter().map(|(v, _, _)| v).sum();
    if volume <= 0.0 {
        return (0.0, DVec3::ZERO, DMat3::ZERO);
    }
    let center = parts
        .iter()
        .fold(DVec3::ZERO, |acc, (v, c, _)| acc + *c * *v)
        / volume;
    let moment = parts.iter().fold(DMat3::ZERO, |acc, (v, c, m)| {
        let r = *c - center;
        let shift = DMat3::from_diagonal(DVec3::splat(r.length_squared()))
            - crate::utils::math::outer(r, r);
        acc + *m + shift * *v
    });
    (volume, center, moment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn box_inertia_matches_closed_form() {
        let shape = Shape::cuboid(1.0, 2.0, 3.0);
        let props = shape.mass_properties(2.0);
        assert_relative_eq!(props.mass, 12.0);
        assert_relative_eq!(props.inertia.x_axis.x, 12.0 * (4.0 + 9.0) / 12.0);
        assert_relative_eq!(props.inertia.y_axis.y, 12.0 * (1.0 + 9.0) / 12.0);
        assert_relative_eq!(props.inertia.z_axis.z, 12.0 * (1.0 + 4.0) / 12.0);
    }

    #[test]
    fn capsule_without_length_is_a_sphere() {
        let capsule = Shape::capsule(0.0, 0.3);
        let sphere = Shape::sphere(0.3);
        assert_relative_eq!(capsule.volume(), sphere.volume(), epsilon = 1e-12);
        let (a, b) = (capsule.second_moment_of_volume(), sphere.second_moment_of_volume());
        assert_relative_eq!(a.x_axis.x, b.x_axis.x, epsilon = 1e-12);
        assert_relative_eq!(a.y_axis.y, b.y_axis.y, epsilon = 1e-12);
    }

    #[test]
    fn compound_of_two_boxes_uses_parallel_axis() {
        let child = |x: f64| SubShape {
            pose: Pose::from_translation(DVec3::new(x, 0.0, 0.0)),
            shape: Shape::cuboid(1.0, 1.0, 1.0),
        };
        let compound = Shape::Compound(vec![child(-0.5), child(0.5)]);
        let whole = Shape::cuboid(2.0, 1.0, 1.0);

        assert_relative_eq!(compound.volume(), whole.volume());
        let (a, b) = (
            compound.second_moment_of_volume(),
            whole.second_moment_of_volume(),
        );
        assert_relative_eq!(a.x_axis.x, b.x_axis.x, epsilon = 1e-12);
        assert_relative_eq!(a.y_axis.y, b.y_axis.y, epsilon = 1e-12);
        assert_relative_eq!(a.z_axis.z, b.z_axis.z, epsilon = 1e-12);
    }

    #[test]
    fn plane_is_unbounded() {
        let aabb = Shape::plane().aabb(&Pose::IDENTITY);
        assert!(aabb.intersects(&Aabb::new(DVec3::splat(1e6), DVec3::splat(1e6 + 1.0))));
    }
}
