//! Contacts involving triangle meshes and particle sets.
//!
//! Mesh locations carry the triangle and its barycentric coordinates (or the vertex for
//! vertex contacts); particle locations carry the particle index in `node`.

use glam::DVec3;

use crate::{
    collision::{
        contact::{Contact, Location},
        primitives::{sphere_plane_contact, sphere_sphere_contact, WorldPlane},
    },
    config::DEFAULT_CONTACT_EPSILON,
    core::{
        mesh::{Aabb, AabbTree, TriangleMesh},
        shapes::Shape,
        types::Pose,
    },
    utils::math::closest_point_on_triangle,
};

/// Sphere against one triangle, everything in the mesh frame.
struct TriangleHit {
    /// Direction in which the mesh moves to separate.
    normal: DVec3,
    depth: f64,
    on_triangle: DVec3,
    barycentric: DVec3,
    on_sphere: DVec3,
}

fn sphere_triangle(mesh: &TriangleMesh, triangle: usize, center: DVec3, radius: f64) -> Option<TriangleHit> {
    let [a, b, c] = mesh.triangle_positions(triangle);
    let (closest, barycentric) = closest_point_on_triangle(center, a, b, c);
    let delta = center - closest;
    let distance = delta.length();
    if distance > radius {
        return None;
    }
    let direction = if distance > f64::EPSILON {
        delta / distance
    } else {
        mesh.normal(triangle)
    };
    Some(TriangleHit {
        normal: -direction,
        depth: radius - distance,
        on_triangle: closest,
        barycentric,
        on_sphere: center - direction * radius,
    })
}

impl TriangleHit {
    fn into_contact(self, triangle: usize, pose: &Pose, particle: Option<usize>) -> Contact {
        let on_triangle = pose.transform_point(self.on_triangle);
        let on_sphere = pose.transform_point(self.on_sphere);
        let mut sphere_location = Location::new(on_sphere);
        sphere_location.node = particle;
        Contact::discrete(
            self.depth,
            (on_triangle + on_sphere) * 0.5,
            pose.transform_vector(self.normal),
            (
                Location::new(on_triangle).with_triangle(triangle, self.barycentric),
                sphere_location,
            ),
        )
    }
}

fn sphere_bounds(center: DVec3, radius: f64) -> Aabb {
    Aabb::new(center - DVec3::splat(radius), center + DVec3::splat(radius))
}

/// Every mesh vertex used by a triangle and below the plane.
pub fn mesh_plane(first: &Shape, first_pose: &Pose, second: &Shape, second_pose: &Pose) -> Vec<Contact> {
    let (Shape::Mesh(mesh), Some(plane)) = (first, WorldPlane::from_shape(second, second_pose)) else {
        return Vec::new();
    };
    let mut used = vec![false; mesh.vertices().len()];
    for triangle in mesh.triangles() {
        for &vertex in triangle {
            used[vertex] = true;
        }
    }
    mesh.vertices()
        .iter()
        .enumerate()
        .filter(|(index, _)| used[*index])
        .filter_map(|(index, vertex)| {
            let vertex = first_pose.transform_point(*vertex);
            let distance = plane.signed_distance(vertex);
            (distance < DEFAULT_CONTACT_EPSILON).then(|| {
                Contact::discrete(
                    -distance,
                    vertex,
                    plane.normal,
                    (
                        Location::new(vertex).with_node(index),
                        Location::new(vertex - plane.normal * distance),
                    ),
                )
            })
        })
        .collect()
}

pub fn mesh_sphere(first: &Shape, first_pose: &Pose, second: &Shape, second_pose: &Pose) -> Vec<Contact> {
    let (Shape::Mesh(mesh), Shape::Sphere { radius }) = (first, second) else {
        return Vec::new();
    };
    let center = first_pose.inverse().transform_point(second_pose.translation);
    mesh.tree()
        .query(&sphere_bounds(center, *radius))
        .into_iter()
        .filter_map(|triangle| {
            sphere_triangle(mesh, triangle, center, *radius)
                .map(|hit| hit.into_contact(triangle, first_pose, None))
        })
        .collect()
}

/// Every (triangle, particle) overlap found by joining the two bounding volume trees.
pub fn mesh_particles(first: &Shape, first_pose: &Pose, second: &Shape, second_pose: &Pose) -> Vec<Contact> {
    let (Shape::Mesh(mesh), Shape::Particles(particles)) = (first, second) else {
        return Vec::new();
    };
    let to_mesh = first_pose.inverse().combine(second_pose);
    let local: Vec<DVec3> = particles
        .positions
        .iter()
        .map(|p| to_mesh.transform_point(*p))
        .collect();
    let tree = AabbTree::build(
        local
            .iter()
            .map(|&p| sphere_bounds(p, particles.radius))
            .collect(),
    );
    mesh.tree()
        .spatial_join(&tree)
        .into_iter()
        .filter_map(|(triangle, particle)| {
            sphere_triangle(mesh, triangle, local[particle], particles.radius)
                .map(|hit| hit.into_contact(triangle, first_pose, Some(particle)))
        })
        .collect()
}

pub fn particles_plane(first: &Shape, first_pose: &Pose, second: &Shape, second_pose: &Pose) -> Vec<Contact> {
    let (Shape::Particles(particles), Some(plane)) = (first, WorldPlane::from_shape(second, second_pose))
    else {
        return Vec::new();
    };
    let double_sided = matches!(second, Shape::DoubleSidedPlane { .. });
    particles
        .positions
        .iter()
        .enumerate()
        .filter_map(|(index, position)| {
            let center = first_pose.transform_point(*position);
            sphere_plane_contact(center, particles.radius, &plane, double_sided).map(|mut contact| {
                contact.penetration_points.0.node = Some(index);
                contact
            })
        })
        .collect()
}

pub fn particles_sphere(first: &Shape, first_pose: &Pose, second: &Shape, second_pose: &Pose) -> Vec<Contact> {
    let (Shape::Particles(particles), Shape::Sphere { radius }) = (first, second) else {
        return Vec::new();
    };
    let center = second_pose.translation;
    let local_center = first_pose.inverse().transform_point(center);
    particles
        .tree()
        .query(&sphere_bounds(local_center, *radius))
        .into_iter()
        .filter_map(|index| {
            let position = first_pose.transform_point(particles.positions[index]);
            sphere_sphere_contact(position, particles.radius, center, *radius).map(|mut contact| {
                contact.penetration_points.0.node = Some(index);
                contact
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shapes::ParticlesShape;
    use approx::assert_relative_eq;

    fn square() -> Shape {
        let mesh = TriangleMesh::new(
            vec![
                DVec3::new(-1.0, 0.0, -1.0),
                DVec3::new(1.0, 0.0, -1.0),
                DVec3::new(1.0, 0.0, 1.0),
                DVec3::new(-1.0, 0.0, 1.0),
                DVec3::new(5.0, -5.0, 5.0),
            ],
            vec![[0, 2, 1], [0, 3, 2]],
        )
        .expect("valid mesh");
        Shape::Mesh(mesh)
    }

    #[test]
    fn unused_vertices_never_touch_the_plane() {
        let contacts = mesh_plane(
            &square(),
            &Pose::from_translation(DVec3::new(0.0, -0.1, 0.0)),
            &Shape::plane(),
            &Pose::IDENTITY,
        );
        assert_eq!(contacts.len(), 4);
        for contact in &contacts {
            assert_relative_eq!(contact.depth, 0.1, epsilon = 1e-12);
            assert!(contact.penetration_points.0.node.is_some_and(|n| n < 4));
        }
    }

    #[test]
    fn sphere_on_mesh_reports_the_triangle() {
        let contacts = mesh_sphere(
            &square(),
            &Pose::IDENTITY,
            &Shape::sphere(0.5),
            &Pose::from_translation(DVec3::new(0.5, 0.25, -0.2)),
        );
        assert_eq!(contacts.len(), 1);
        let contact = &contacts[0];
        assert_relative_eq!(contact.depth, 0.25, epsilon = 1e-12);
        assert_relative_eq!(contact.normal.y, -1.0, epsilon = 1e-12);
        let triangle = contact.penetration_points.0.triangle.expect("triangle location");
        assert_eq!(triangle.index, 0);
        assert_relative_eq!(triangle.coordinate.element_sum(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn particles_report_their_index() {
        let particles = Shape::Particles(ParticlesShape::new(
            0.1,
            vec![DVec3::new(0.0, 2.0, 0.0), DVec3::new(0.3, 0.05, 0.0)],
        ));
        let contacts = particles_plane(&particles, &Pose::IDENTITY, &Shape::plane(), &Pose::IDENTITY);
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].penetration_points.0.node, Some(1));

        let contacts = mesh_particles(&square(), &Pose::IDENTITY, &particles, &Pose::IDENTITY);
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].penetration_points.1.node, Some(1));
        assert_relative_eq!(contacts[0].depth, 0.05, epsilon = 1e-12);
    }
}
