//! Math helpers layered on top of `glam` and `nalgebra`.
//!
//! Node-level data lives in flat `nalgebra` vectors (`dof_per_node` scalars per node) while
//! geometry is expressed with `glam` f64 types; the helpers below move data between the two.

use glam::{DMat3, DQuat, DVec3};
use nalgebra::{DMatrix, DVector, Dim, Matrix, Storage};

/// Converts angular velocity vector (radians/sec) into a quaternion delta.
pub fn angular_velocity_to_quat(angular: DVec3, dt: f64) -> DQuat {
    let angle = angular.length() * dt;
    if angle.abs() < 1e-12 {
        return DQuat::IDENTITY;
    }
    let axis = angular.normalize();
    DQuat::from_axis_angle(axis, angle)
}

/// Rotation vector (axis times angle) of `rotation`, with the angle in `[0, π]`.
pub fn rotation_vector(rotation: DQuat) -> DVec3 {
    let rotation = if rotation.w < 0.0 { -rotation } else { rotation };
    rotation.to_scaled_axis()
}

/// Reads the 3 components of `node` from a flat vector.
pub fn node_vec3(vector: &DVector<f64>, dof_per_node: usize, node: usize) -> DVec3 {
    let base = node * dof_per_node;
    DVec3::new(vector[base], vector[base + 1], vector[base + 2])
}

/// Writes the 3 components of `node` into a flat vector.
pub fn set_node_vec3(vector: &mut DVector<f64>, dof_per_node: usize, node: usize, value: DVec3) {
    let base = node * dof_per_node;
    vector[base] = value.x;
    vector[base + 1] = value.y;
    vector[base + 2] = value.z;
}

/// Accumulates `value` into the 3 components of `node`.
pub fn add_node_vec3(vector: &mut DVector<f64>, dof_per_node: usize, node: usize, value: DVec3) {
    let base = node * dof_per_node;
    vector[base] += value.x;
    vector[base + 1] += value.y;
    vector[base + 2] += value.z;
}

/// Scatter-adds an element block into a representation-level matrix.
///
/// The block is laid out node by node following `node_ids`, with `dof_per_node` rows and
/// columns per node.
pub fn add_sub_matrix<R, C, S>(
    block: &Matrix<f64, R, C, S>,
    node_ids: &[usize],
    dof_per_node: usize,
    target: &mut DMatrix<f64>,
    scale: f64,
) where
    R: Dim,
    C: Dim,
    S: Storage<f64, R, C>,
{
    for (local_row, &row_node) in node_ids.iter().enumerate() {
        for (local_col, &col_node) in node_ids.iter().enumerate() {
            for i in 0..dof_per_node {
                for j in 0..dof_per_node {
                    target[(row_node * dof_per_node + i, col_node * dof_per_node + j)] += scale
                        * block[(local_row * dof_per_node + i, local_col * dof_per_node + j)];
                }
            }
        }
    }
}

/// Adds a 3x3 block at `(row, col)` of `target`.
pub fn add_block3(target: &mut DMatrix<f64>, row: usize, col: usize, block: &DMat3, scale: f64) {
    for i in 0..3 {
        for j in 0..3 {
            target[(row + i, col + j)] += scale * block.col(j)[i];
        }
    }
}

/// Outer product `a * b^T`.
pub fn outer(a: DVec3, b: DVec3) -> DMat3 {
    DMat3::from_cols(a * b.x, a * b.y, a * b.z)
}

/// Returns an orthonormal pair spanning the plane orthogonal to `normal`.
pub fn orthonormal_basis(normal: DVec3) -> (DVec3, DVec3) {
    let n = normal.normalize_or_zero();
    let seed = if n.x.abs() < 0.9 { DVec3::X } else { DVec3::Y };
    let t1 = n.cross(seed).normalize();
    let t2 = n.cross(t1);
    (t1, t2)
}

/// Closest point on segment `[a, b]` to `p`, with its parameter along the segment.
pub fn closest_point_on_segment(p: DVec3, a: DVec3, b: DVec3) -> (DVec3, f64) {
    let ab = b - a;
    let length_squared = ab.length_squared();
    if length_squared < f64::EPSILON {
        return (a, 0.0);
    }
    let t = ((p - a).dot(ab) / length_squared).clamp(0.0, 1.0);
    (a + ab * t, t)
}

/// Closest point on triangle `(a, b, c)` to `p` and its barycentric coordinates.
pub fn closest_point_on_triangle(p: DVec3, a: DVec3, b: DVec3, c: DVec3) -> (DVec3, DVec3) {
    let ab = b - a;
    let ac = c - a;
    let ap = p - a;
    let d1 = ab.dot(ap);
    let d2 = ac.dot(ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return (a, DVec3::new(1.0, 0.0, 0.0));
    }

    let bp = p - b;
    let d3 = ab.dot(bp);
    let d4 = ac.dot(bp);
    if d3 >= 0.0 && d4 <= d3 {
        return (b, DVec3::new(0.0, 1.0, 0.0));
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        return (a + ab * v, DVec3::new(1.0 - v, v, 0.0));
    }

    let cp = p - c;
    let d5 = ab.dot(cp);
    let d6 = ac.dot(cp);
    if d6 >= 0.0 && d5 <= d6 {
        return (c, DVec3::new(0.0, 0.0, 1.0));
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        return (a + ac * w, DVec3::new(1.0 - w, 0.0, w));
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return (b + (c - b) * w, DVec3::new(0.0, 1.0 - w, w));
    }

    let denom = 1.0 / (va + vb + vc);
    let v = vb * denom;
    let w = vc * denom;
    (a + ab * v + ac * w, DVec3::new(1.0 - v - w, v, w))
}

/// Barycentric coordinates of `p` projected in the plane of `(a, b, c)`.
///
/// Returns `None` for degenerate triangles.
pub fn barycentric_coordinates(p: DVec3, a: DVec3, b: DVec3, c: DVec3) -> Option<DVec3> {
    let v0 = b - a;
    let v1 = c - a;
    let v2 = p - a;
    let d00 = v0.dot(v0);
    let d01 = v0.dot(v1);
    let d11 = v1.dot(v1);
    let d20 = v2.dot(v0);
    let d21 = v2.dot(v1);
    let denom = d00 * d11 - d01 * d01;
    if denom.abs() < 1e-20 {
        return None;
    }
    let v = (d11 * d20 - d01 * d21) / denom;
    let w = (d00 * d21 - d01 * d20) / denom;
    Some(DVec3::new(1.0 - v - w, v, w))
}

/// True when all barycentric coordinates are inside `[-epsilon, 1 + epsilon]`.
pub fn is_inside_triangle(barycentric: DVec3, epsilon: f64) -> bool {
    barycentric.min_element() >= -epsilon && barycentric.max_element() <= 1.0 + epsilon
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn closest_point_inside_triangle_projects_onto_plane() {
        let (point, bary) = closest_point_on_triangle(
            DVec3::new(0.25, 1.0, 0.25),
            DVec3::ZERO,
            DVec3::new(1.0, 0.0, 0.0),
            DVec3::new(0.0, 0.0, 1.0),
        );
        assert_relative_eq!(point.y, 0.0);
        assert_relative_eq!(bary.x + bary.y + bary.z, 1.0, epsilon = 1e-12);
        assert_relative_eq!(bary.y, 0.25, epsilon = 1e-12);
        assert_relative_eq!(bary.z, 0.25, epsilon = 1e-12);
    }

    #[test]
    fn rotation_vector_takes_the_short_way_round() {
        let quarter = DQuat::from_axis_angle(DVec3::Z, std::f64::consts::FRAC_PI_2);
        let v = rotation_vector(quarter);
        assert!(v.abs_diff_eq(DVec3::Z * std::f64::consts::FRAC_PI_2, 1e-12));
        assert!(rotation_vector(-quarter).abs_diff_eq(v, 1e-12));
        assert_eq!(rotation_vector(DQuat::IDENTITY), DVec3::ZERO);
    }

    #[test]
    fn closest_point_outside_snaps_to_vertex() {
        let (point, bary) = closest_point_on_triangle(
            DVec3::new(-1.0, 0.0, -1.0),
            DVec3::ZERO,
            DVec3::X,
            DVec3::Z,
        );
        assert_eq!(point, DVec3::ZERO);
        assert_eq!(bary, DVec3::X);
    }

    #[test]
    fn sub_matrix_scatter_uses_node_offsets() {
        let block = DMatrix::from_element(6, 6, 1.0);
        let mut target = DMatrix::zeros(9, 9);
        add_sub_matrix(&block, &[0, 2], 3, &mut target, 2.0);
        assert_eq!(target[(0, 0)], 2.0);
        assert_eq!(target[(0, 6)], 2.0);
        assert_eq!(target[(3, 3)], 0.0);
    }
}
