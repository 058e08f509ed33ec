//! Discrete contacts between analytic shapes.
//!
//! Every function receives the shapes in the canonical order it was registered with and
//! returns contacts seen from the first shape: the normal is the direction in which the
//! first shape moves to separate.

use glam::DVec3;

use crate::{
    collision::contact::{Contact, Location},
    config::DEFAULT_CONTACT_EPSILON,
    core::{shapes::Shape, types::Pose},
    utils::math::closest_point_on_segment,
};

/// World-space plane `normal · x + d = 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldPlane {
    pub normal: DVec3,
    pub d: f64,
}

impl WorldPlane {
    /// Places the local plane `normal · x + d = 0` at `pose`.
    pub fn new(normal: DVec3, d: f64, pose: &Pose) -> Self {
        let normal = pose.transform_vector(normal).normalize_or_zero();
        Self {
            normal,
            d: d - normal.dot(pose.translation),
        }
    }

    pub fn from_shape(shape: &Shape, pose: &Pose) -> Option<Self> {
        match shape {
            Shape::Plane { normal, d } | Shape::DoubleSidedPlane { normal, d } => {
                Some(Self::new(*normal, *d, pose))
            }
            _ => None,
        }
    }

    pub fn signed_distance(&self, point: DVec3) -> f64 {
        self.normal.dot(point) + self.d
    }
}

/// Contact of a sphere `(center, radius)` against a world plane, with the sphere first.
///
/// When `double_sided` is set the sphere is pushed out on the side its center lies on.
pub fn sphere_plane_contact(
    center: DVec3,
    radius: f64,
    plane: &WorldPlane,
    double_sided: bool,
) -> Option<Contact> {
    let mut distance = plane.signed_distance(center);
    let mut normal = plane.normal;
    if double_sided && distance < 0.0 {
        distance = -distance;
        normal = -normal;
    }
    if distance >= radius {
        return None;
    }
    let on_sphere = center - normal * radius;
    let on_plane = center - normal * distance;
    Some(Contact::discrete(
        radius - distance,
        (on_sphere + on_plane) * 0.5,
        normal,
        (Location::new(on_sphere), Location::new(on_plane)),
    ))
}

/// Contact between two spheres, the first at `first_center`.
pub fn sphere_sphere_contact(
    first_center: DVec3,
    first_radius: f64,
    second_center: DVec3,
    second_radius: f64,
) -> Option<Contact> {
    let delta = first_center - second_center;
    let distance = delta.length();
    let radii = first_radius + second_radius;
    if distance > radii {
        return None;
    }
    let normal = if distance > f64::EPSILON {
        delta / distance
    } else {
        DVec3::Y
    };
    let on_first = first_center - normal * first_radius;
    let on_second = second_center + normal * second_radius;
    Some(Contact::discrete(
        radii - distance,
        (on_first + on_second) * 0.5,
        normal,
        (Location::new(on_first), Location::new(on_second)),
    ))
}

/// Contact of a box of `size` at `pose` against a sphere, with the box first.
pub fn box_sphere_contact(size: DVec3, pose: &Pose, center: DVec3, radius: f64) -> Option<Contact> {
    let half = size * 0.5;
    let local = pose.inverse().transform_point(center);
    let closest = local.clamp(-half, half);
    let outside = closest != local;

    let (normal, depth, on_box, on_sphere) = if outside {
        let delta = local - closest;
        let distance = delta.length();
        if distance > radius {
            return None;
        }
        let direction = delta / distance;
        (-direction, radius - distance, closest, local - direction * radius)
    } else {
        let gaps = half - local.abs();
        let axis = if gaps.x <= gaps.y && gaps.x <= gaps.z {
            0
        } else if gaps.y <= gaps.z {
            1
        } else {
            2
        };
        let side = if local[axis] < 0.0 { -1.0 } else { 1.0 };
        let mut face = DVec3::ZERO;
        face[axis] = side;
        let mut on_box = local;
        on_box[axis] = side * half[axis];
        (-face, gaps[axis] + radius, on_box, local - face * radius)
    };

    let on_box = pose.transform_point(on_box);
    let on_sphere = pose.transform_point(on_sphere);
    Some(Contact::discrete(
        depth,
        (on_box + on_sphere) * 0.5,
        pose.transform_vector(normal),
        (Location::new(on_box), Location::new(on_sphere)),
    ))
}

/// Signed distance from a point in box space to a box of half extents `half`.
fn box_signed_distance(half: DVec3, point: DVec3) -> f64 {
    let q = point.abs() - half;
    q.max(DVec3::ZERO).length() + q.max_element().min(0.0)
}

/// End points of the Y axis of a capsule at `pose`.
pub fn capsule_segment(length: f64, pose: &Pose) -> (DVec3, DVec3) {
    let half = DVec3::new(0.0, length * 0.5, 0.0);
    (pose.transform_point(-half), pose.transform_point(half))
}

pub fn sphere_sphere(first: &Shape, first_pose: &Pose, second: &Shape, second_pose: &Pose) -> Vec<Contact> {
    let (Shape::Sphere { radius: r1 }, Shape::Sphere { radius: r2 }) = (first, second) else {
        return Vec::new();
    };
    sphere_sphere_contact(first_pose.translation, *r1, second_pose.translation, *r2)
        .into_iter()
        .collect()
}

pub fn sphere_plane(first: &Shape, first_pose: &Pose, second: &Shape, second_pose: &Pose) -> Vec<Contact> {
    let (Shape::Sphere { radius }, Some(plane)) = (first, WorldPlane::from_shape(second, second_pose))
    else {
        return Vec::new();
    };
    let double_sided = matches!(second, Shape::DoubleSidedPlane { .. });
    sphere_plane_contact(first_pose.translation, *radius, &plane, double_sided)
        .into_iter()
        .collect()
}

pub fn box_sphere(first: &Shape, first_pose: &Pose, second: &Shape, second_pose: &Pose) -> Vec<Contact> {
    let (Shape::Box { size }, Shape::Sphere { radius }) = (first, second) else {
        return Vec::new();
    };
    box_sphere_contact(*size, first_pose, second_pose.translation, *radius)
        .into_iter()
        .collect()
}

/// One contact per box corner below the plane. A double-sided plane pushes the box towards
/// the side of its center.
pub fn box_plane(first: &Shape, first_pose: &Pose, second: &Shape, second_pose: &Pose) -> Vec<Contact> {
    let (Shape::Box { size }, Some(mut plane)) = (first, WorldPlane::from_shape(second, second_pose))
    else {
        return Vec::new();
    };
    if matches!(second, Shape::DoubleSidedPlane { .. })
        && plane.signed_distance(first_pose.translation) < 0.0
    {
        plane = WorldPlane {
            normal: -plane.normal,
            d: -plane.d,
        };
    }
    let half = *size * 0.5;
    (0..8)
        .filter_map(|corner| {
            let local = DVec3::new(
                if corner & 1 != 0 { half.x } else { -half.x },
                if corner & 2 != 0 { half.y } else { -half.y },
                if corner & 4 != 0 { half.z } else { -half.z },
            );
            let vertex = first_pose.transform_point(local);
            let distance = plane.signed_distance(vertex);
            (distance < DEFAULT_CONTACT_EPSILON).then(|| {
                let on_plane = vertex - plane.normal * distance;
                Contact::discrete(
                    -distance,
                    vertex,
                    plane.normal,
                    (Location::new(vertex), Location::new(on_plane)),
                )
            })
        })
        .collect()
}

/// Box against the sphere swept along the capsule axis, at the axis point deepest in the
/// box.
pub fn box_capsule(first: &Shape, first_pose: &Pose, second: &Shape, second_pose: &Pose) -> Vec<Contact> {
    let (Shape::Box { size }, Shape::Capsule { length, radius }) = (first, second) else {
        return Vec::new();
    };
    let (a, b) = capsule_segment(*length, second_pose);
    let to_box = first_pose.inverse();
    let (la, lb) = (to_box.transform_point(a), to_box.transform_point(b));
    let half = *size * 0.5;
    let distance_at = |t: f64| box_signed_distance(half, la.lerp(lb, t));

    // The signed distance to a convex set is convex along a segment.
    let (mut low, mut high) = (0.0f64, 1.0f64);
    for _ in 0..64 {
        let m1 = low + (high - low) / 3.0;
        let m2 = high - (high - low) / 3.0;
        if distance_at(m1) <= distance_at(m2) {
            high = m2;
        } else {
            low = m1;
        }
    }
    let t = (low + high) * 0.5;
    box_sphere_contact(*size, first_pose, a.lerp(b, t), *radius)
        .into_iter()
        .collect()
}

pub fn capsule_sphere(first: &Shape, first_pose: &Pose, second: &Shape, second_pose: &Pose) -> Vec<Contact> {
    let (Shape::Capsule { length, radius }, Shape::Sphere { radius: sphere_radius }) = (first, second)
    else {
        return Vec::new();
    };
    let (a, b) = capsule_segment(*length, first_pose);
    let (closest, _) = closest_point_on_segment(second_pose.translation, a, b);
    sphere_sphere_contact(closest, *radius, second_pose.translation, *sphere_radius)
        .into_iter()
        .collect()
}

/// Both capsule end caps against the plane.
pub fn capsule_plane(first: &Shape, first_pose: &Pose, second: &Shape, second_pose: &Pose) -> Vec<Contact> {
    let (Shape::Capsule { length, radius }, Some(plane)) = (first, WorldPlane::from_shape(second, second_pose))
    else {
        return Vec::new();
    };
    let double_sided = matches!(second, Shape::DoubleSidedPlane { .. });
    let (a, b) = capsule_segment(*length, first_pose);
    [a, b]
        .into_iter()
        .filter_map(|end| sphere_plane_contact(end, *radius, &plane, double_sided))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use glam::DQuat;

    fn check_convention(contact: &Contact) {
        let (p0, p1) = &contact.penetration_points;
        assert_relative_eq!(
            contact.normal.dot(p0.global_position - p1.global_position),
            -contact.depth,
            epsilon = 1e-9
        );
    }

    #[test]
    fn sphere_rests_on_plane() {
        let contacts = sphere_plane(
            &Shape::sphere(1.0),
            &Pose::from_translation(DVec3::new(0.0, 0.5, 0.0)),
            &Shape::plane(),
            &Pose::IDENTITY,
        );
        assert_eq!(contacts.len(), 1);
        assert_relative_eq!(contacts[0].depth, 0.5, epsilon = 1e-12);
        assert_eq!(contacts[0].normal, DVec3::Y);
        check_convention(&contacts[0]);
    }

    #[test]
    fn translated_plane_moves_its_offset() {
        let plane = WorldPlane::new(DVec3::Y, 0.0, &Pose::from_translation(DVec3::new(0.0, 2.0, 0.0)));
        assert_relative_eq!(plane.signed_distance(DVec3::new(5.0, 3.0, 1.0)), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn sphere_inside_box_exits_through_the_nearest_face() {
        let contacts = box_sphere(
            &Shape::cuboid(2.0, 2.0, 2.0),
            &Pose::IDENTITY,
            &Shape::sphere(0.5),
            &Pose::from_translation(DVec3::new(0.0, 0.0, 0.8)),
        );
        assert_eq!(contacts.len(), 1);
        assert_relative_eq!(contacts[0].normal.z, -1.0, epsilon = 1e-12);
        assert_relative_eq!(contacts[0].depth, 0.7, epsilon = 1e-12);
        check_convention(&contacts[0]);
    }

    #[test]
    fn rotated_box_touches_plane_with_one_corner() {
        let rotation = DQuat::from_rotation_z(std::f64::consts::FRAC_PI_4)
            * DQuat::from_rotation_x(std::f64::consts::FRAC_PI_4);
        let contacts = box_plane(
            &Shape::cuboid(1.0, 1.0, 1.0),
            &Pose::new(DVec3::new(0.0, 0.7, 0.0), rotation),
            &Shape::plane(),
            &Pose::IDENTITY,
        );
        assert_eq!(contacts.len(), 1);
        check_convention(&contacts[0]);
    }

    #[test]
    fn lying_capsule_touches_with_both_caps() {
        let pose = Pose::new(
            DVec3::new(0.0, 0.1, 0.0),
            DQuat::from_rotation_z(std::f64::consts::FRAC_PI_2),
        );
        let contacts = capsule_plane(&Shape::capsule(2.0, 0.2), &pose, &Shape::plane(), &Pose::IDENTITY);
        assert_eq!(contacts.len(), 2);
        for contact in &contacts {
            assert_relative_eq!(contact.depth, 0.1, epsilon = 1e-12);
            check_convention(contact);
        }
    }

    #[test]
    fn capsule_end_reaches_into_box() {
        let contacts = box_capsule(
            &Shape::cuboid(2.0, 2.0, 2.0),
            &Pose::IDENTITY,
            &Shape::capsule(2.0, 0.25),
            &Pose::from_translation(DVec3::new(0.0, 2.0, 0.0)),
        );
        assert_eq!(contacts.len(), 1);
        assert_relative_eq!(contacts[0].depth, 0.25, epsilon = 1e-6);
        assert_relative_eq!(contacts[0].normal.y, -1.0, epsilon = 1e-6);
        check_convention(&contacts[0]);
    }
}
