//! Continuous collision detection.
//!
//! Shapes move linearly between their previous and current state over the normalized frame
//! time `t ∈ [0, 1]`. Each test writes the first time of impact as a polynomial in `t` and
//! looks for its earliest root.

use glam::DVec3;

use crate::{
    collision::{
        contact::{Contact, Location},
        mesh_contacts::mesh_particles,
    },
    config::DEFAULT_CCD_ROOT_EPSILON,
    core::{
        mesh::{Aabb, AabbTree, TriangleMesh},
        shapes::{ParticlesShape, Shape},
        types::Pose,
    },
    utils::{
        math::{barycentric_coordinates, is_inside_triangle},
        polynomial::{LinearMotion, Polynomial},
    },
};

/// Tolerance on barycentric coordinates when a particle crosses a triangle plane.
const INSIDE_TRIANGLE_EPSILON: f64 = 1e-9;

/// Shape and pose at the start and the end of the frame.
#[derive(Debug, Clone, Copy)]
pub struct ShapeMotion<'a> {
    pub previous_shape: &'a Shape,
    pub previous_pose: Pose,
    pub shape: &'a Shape,
    pub pose: Pose,
}

impl<'a> ShapeMotion<'a> {
    pub fn new(previous_shape: &'a Shape, previous_pose: Pose, shape: &'a Shape, pose: Pose) -> Self {
        Self {
            previous_shape,
            previous_pose,
            shape,
            pose,
        }
    }

    /// A shape that does not move over the frame.
    pub fn resting(shape: &'a Shape, pose: Pose) -> Self {
        Self::new(shape, pose, shape, pose)
    }

    fn origin(&self) -> LinearMotion {
        LinearMotion::new(self.previous_pose.translation, self.pose.translation)
    }

    fn pose_at(&self, t: f64) -> Pose {
        Pose::interpolate(&self.previous_pose, &self.pose, t)
    }

    /// Location of `point`, reached at time `t`, in the shape frame at that time.
    fn location_at(&self, point: DVec3, t: f64) -> Location {
        let mut location = Location::new(point);
        location.rigid_local_position = Some(self.pose_at(t).inverse().transform_point(point));
        location
    }
}

/// Earliest `t` where `distance` (positive while separated) reaches zero, or 0 when the
/// shapes already overlap at the start of the frame.
fn time_of_impact(distance: &Polynomial) -> Option<f64> {
    if distance.evaluate(0.0) < 0.0 {
        return Some(0.0);
    }
    distance.first_root_in(0.0, 1.0, DEFAULT_CCD_ROOT_EPSILON)
}

pub fn sphere_sphere(first: &ShapeMotion, second: &ShapeMotion) -> Vec<Contact> {
    let (Shape::Sphere { radius: r1 }, Shape::Sphere { radius: r2 }) = (first.shape, second.shape) else {
        return Vec::new();
    };
    let radii = r1 + r2;
    let delta = first.origin() - second.origin();
    let gap = &delta.dot(&delta) - &Polynomial::constant(radii * radii);
    let Some(t) = time_of_impact(&gap) else {
        return Vec::new();
    };

    let (c1, c2) = (first.origin().at(t), second.origin().at(t));
    let offset = c1 - c2;
    let distance = offset.length();
    let normal = if distance > f64::EPSILON {
        offset / distance
    } else {
        DVec3::Y
    };
    let on_first = c1 - normal * *r1;
    let on_second = c2 + normal * *r2;
    vec![Contact::continuous(
        t,
        radii - distance,
        (on_first + on_second) * 0.5,
        normal,
        (first.location_at(on_first, t), second.location_at(on_second, t)),
    )]
}

/// Sphere against a moving plane, with the plane normal and offset interpolated over the
/// frame. A double-sided plane keeps the sphere on the side it started on.
pub fn sphere_plane(first: &ShapeMotion, second: &ShapeMotion) -> Vec<Contact> {
    let Shape::Sphere { radius } = first.shape else {
        return Vec::new();
    };
    let (Some((n0, d0)), Some((n1, d1))) = (
        world_plane(second.previous_shape, &second.previous_pose),
        world_plane(second.shape, &second.pose),
    ) else {
        return Vec::new();
    };
    let normal = LinearMotion::new(n0, n1);
    let offset = Polynomial::linear(d0, d1);
    let signed_distance = &first.origin().dot(&normal) + &offset;

    let side = if matches!(second.shape, Shape::DoubleSidedPlane { .. })
        && signed_distance.evaluate(0.0) < 0.0
    {
        -1.0
    } else {
        1.0
    };
    let gap = &(&signed_distance * &Polynomial::constant(side)) - &Polynomial::constant(*radius);
    let Some(t) = time_of_impact(&gap) else {
        return Vec::new();
    };

    let n = (normal.at(t) * side).normalize_or_zero();
    let center = first.origin().at(t);
    let distance = side * signed_distance.evaluate(t);
    let on_sphere = center - n * *radius;
    let on_plane = center - n * distance;
    vec![Contact::continuous(
        t,
        radius - distance,
        (on_sphere + on_plane) * 0.5,
        n,
        (first.location_at(on_sphere, t), second.location_at(on_plane, t)),
    )]
}

fn world_plane(shape: &Shape, pose: &Pose) -> Option<(DVec3, f64)> {
    crate::collision::primitives::WorldPlane::from_shape(shape, pose).map(|plane| (plane.normal, plane.d))
}

/// Particles crossing a deforming mesh during the frame.
///
/// Each particle center and triangle become coplanar when the triple product of the
/// triangle corners relative to the particle vanishes; a root inside the triangle is a
/// crossing. Particles that do not cross get the end-of-frame discrete test. When the
/// particle or vertex counts changed over the frame only the discrete test runs.
pub fn particles_mesh(first: &ShapeMotion, second: &ShapeMotion) -> Vec<Contact> {
    let (
        Shape::Particles(previous_particles),
        Shape::Particles(particles),
        Shape::Mesh(previous_mesh),
        Shape::Mesh(mesh),
    ) = (first.previous_shape, first.shape, second.previous_shape, second.shape)
    else {
        return Vec::new();
    };
    let discrete = || -> Vec<Contact> {
        mesh_particles(second.shape, &second.pose, first.shape, &first.pose)
            .into_iter()
            .map(Contact::flipped)
            .collect()
    };
    if previous_particles.positions.len() != particles.positions.len()
        || previous_mesh.vertices().len() != mesh.vertices().len()
        || previous_mesh.triangles().len() != mesh.triangles().len()
    {
        return discrete();
    }

    let particle_motions = particle_motions(previous_particles, first.previous_pose, particles, first.pose);
    let vertex_motions: Vec<LinearMotion> = previous_mesh
        .vertices()
        .iter()
        .zip(mesh.vertices())
        .map(|(start, end)| {
            LinearMotion::new(
                second.previous_pose.transform_point(*start),
                second.pose.transform_point(*end),
            )
        })
        .collect();

    let radius = particles.radius;
    let particle_tree = AabbTree::build(
        particle_motions
            .iter()
            .map(|m| Aabb::from_points(&[m.start, m.end]).expanded(radius))
            .collect(),
    );
    let triangle_tree = swept_triangle_tree(mesh, &vertex_motions);

    let mut earliest: Vec<Option<Contact>> = vec![None; particle_motions.len()];
    for (particle, triangle) in particle_tree.spatial_join(&triangle_tree) {
        let Some(contact) = particle_crossing(
            particle,
            &particle_motions[particle],
            radius,
            triangle,
            mesh.triangles()[triangle],
            &vertex_motions,
        ) else {
            continue;
        };
        let slot = &mut earliest[particle];
        if slot.as_ref().map_or(true, |current| contact.time < current.time) {
            *slot = Some(contact);
        }
    }

    let mut contacts: Vec<Contact> = Vec::new();
    for contact in discrete() {
        let crossed = contact
            .penetration_points
            .0
            .node
            .is_some_and(|particle| earliest[particle].is_some());
        if !crossed {
            contacts.push(contact);
        }
    }
    contacts.extend(earliest.into_iter().flatten());
    contacts
}

fn particle_motions(
    previous: &ParticlesShape,
    previous_pose: Pose,
    current: &ParticlesShape,
    pose: Pose,
) -> Vec<LinearMotion> {
    previous
        .positions
        .iter()
        .zip(&current.positions)
        .map(|(start, end)| {
            LinearMotion::new(previous_pose.transform_point(*start), pose.transform_point(*end))
        })
        .collect()
}

fn swept_triangle_tree(mesh: &TriangleMesh, vertex_motions: &[LinearMotion]) -> AabbTree {
    AabbTree::build(
        mesh.triangles()
            .iter()
            .map(|triangle| {
                let points: Vec<DVec3> = triangle
                    .iter()
                    .flat_map(|&v| [vertex_motions[v].start, vertex_motions[v].end])
                    .collect();
                Aabb::from_points(&points)
            })
            .collect(),
    )
}

fn particle_crossing(
    particle: usize,
    motion: &LinearMotion,
    radius: f64,
    triangle: usize,
    [a, b, c]: [usize; 3],
    vertex_motions: &[LinearMotion],
) -> Option<Contact> {
    let (va, vb, vc) = (vertex_motions[a], vertex_motions[b], vertex_motions[c]);
    let coplanarity = LinearMotion::triple_product(&(va - *motion), &(vb - *motion), &(vc - *motion));

    let normal_at = |t: f64| {
        let (pa, pb, pc) = (va.at(t), vb.at(t), vc.at(t));
        (pb - pa).cross(pc - pa).normalize_or_zero()
    };
    let start_side = (motion.start - va.start).dot(normal_at(0.0));
    if start_side == 0.0 {
        return None;
    }
    let side = start_side.signum();

    coplanarity
        .roots_in(0.0, 1.0, DEFAULT_CCD_ROOT_EPSILON)
        .into_iter()
        .find_map(|t| {
            let point = motion.at(t);
            let barycentric = barycentric_coordinates(point, va.at(t), vb.at(t), vc.at(t))?;
            if !is_inside_triangle(barycentric, INSIDE_TRIANGLE_EPSILON) {
                return None;
            }
            // Resolve the crossing at the end of the frame on the starting side.
            let normal = normal_at(1.0) * side;
            let on_triangle_end =
                va.end * barycentric.x + vb.end * barycentric.y + vc.end * barycentric.z;
            let end_distance = (motion.end - on_triangle_end).dot(normal);
            let on_particle = motion.end - normal * radius;
            let on_mesh = motion.end - normal * end_distance;
            Some(Contact::continuous(
                t,
                radius - end_distance,
                point,
                normal,
                (
                    Location::new(on_particle).with_node(particle),
                    Location::new(on_mesh).with_triangle(triangle, barycentric),
                ),
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn fast_spheres_are_caught_mid_frame() {
        let sphere = Shape::sphere(0.5);
        let first = ShapeMotion::new(
            &sphere,
            Pose::from_translation(DVec3::new(-10.0, 0.0, 0.0)),
            &sphere,
            Pose::from_translation(DVec3::new(10.0, 0.0, 0.0)),
        );
        let second = ShapeMotion::resting(&sphere, Pose::IDENTITY);
        let contacts = sphere_sphere(&first, &second);
        assert_eq!(contacts.len(), 1);
        let contact = &contacts[0];
        assert_relative_eq!(contact.time, 0.45, epsilon = 1e-6);
        assert_relative_eq!(contact.normal.x, -1.0, epsilon = 1e-6);
        let local = contact.penetration_points.0.rigid_local_position.expect("local position");
        assert_relative_eq!(local.x, 0.5, epsilon = 1e-6);
    }

    #[test]
    fn overlapping_spheres_hit_at_frame_start() {
        let sphere = Shape::sphere(1.0);
        let first = ShapeMotion::resting(&sphere, Pose::IDENTITY);
        let second = ShapeMotion::resting(&sphere, Pose::from_translation(DVec3::X));
        let contacts = sphere_sphere(&first, &second);
        assert_eq!(contacts[0].time, 0.0);
        assert_relative_eq!(contacts[0].depth, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn sphere_tunneling_through_plane_is_detected() {
        let sphere = Shape::sphere(0.1);
        let plane = Shape::plane();
        let first = ShapeMotion::new(
            &sphere,
            Pose::from_translation(DVec3::new(0.0, 1.1, 0.0)),
            &sphere,
            Pose::from_translation(DVec3::new(0.0, -0.9, 0.0)),
        );
        let contacts = sphere_plane(&first, &ShapeMotion::resting(&plane, Pose::IDENTITY));
        assert_eq!(contacts.len(), 1);
        assert_relative_eq!(contacts[0].time, 0.5, epsilon = 1e-6);
        assert_eq!(contacts[0].normal, DVec3::Y);
    }

    #[test]
    fn particle_crossing_a_triangle_is_pushed_back() {
        let mesh = Shape::Mesh(
            TriangleMesh::new(
                vec![
                    DVec3::new(-1.0, 0.0, -1.0),
                    DVec3::new(0.0, 0.0, 2.0),
                    DVec3::new(2.0, 0.0, -1.0),
                ],
                vec![[0, 1, 2]],
            )
            .expect("valid mesh"),
        );
        let before = Shape::Particles(ParticlesShape::new(0.01, vec![DVec3::new(0.0, 1.0, 0.0)]));
        let after = Shape::Particles(ParticlesShape::new(0.01, vec![DVec3::new(0.0, -1.0, 0.0)]));
        let particles = ShapeMotion::new(&before, Pose::IDENTITY, &after, Pose::IDENTITY);
        let contacts = particles_mesh(&particles, &ShapeMotion::resting(&mesh, Pose::IDENTITY));
        assert_eq!(contacts.len(), 1);
        let contact = &contacts[0];
        assert_relative_eq!(contact.time, 0.5, epsilon = 1e-6);
        assert_relative_eq!(contact.normal.y, 1.0, epsilon = 1e-12);
        assert_relative_eq!(contact.depth, 1.01, epsilon = 1e-9);
        assert_eq!(contact.penetration_points.0.node, Some(0));
    }
}
