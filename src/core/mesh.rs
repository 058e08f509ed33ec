use glam::{DMat3, DVec3};
use serde::{Deserialize, Serialize};

use crate::{
    config::DEFAULT_AABB_TREE_LEAF_SIZE,
    core::types::Pose,
    error::{PhysicsError, Result},
};

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: DVec3,
    pub max: DVec3,
}

impl Aabb {
    pub fn new(min: DVec3, max: DVec3) -> Self {
        Self { min, max }
    }

    pub fn empty() -> Self {
        Self {
            min: DVec3::splat(f64::INFINITY),
            max: DVec3::splat(f64::NEG_INFINITY),
        }
    }

    /// Box covering all of space, used by planes.
    pub fn infinite() -> Self {
        Self {
            min: DVec3::splat(f64::NEG_INFINITY),
            max: DVec3::splat(f64::INFINITY),
        }
    }

    pub fn from_points(points: &[DVec3]) -> Self {
        let mut bounds = Self::empty();
        for &p in points {
            bounds.extend(p);
        }
        bounds
    }

    pub fn extend(&mut self, point: DVec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    pub fn merge(&self, other: &Aabb) -> Aabb {
        Aabb::new(self.min.min(other.min), self.max.max(other.max))
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && other.min.x <= self.max.x
            && self.min.y <= other.max.y
            && other.min.y <= self.max.y
            && self.min.z <= other.max.z
            && other.min.z <= self.max.z
    }

    pub fn contains_point(&self, point: DVec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    pub fn center(&self) -> DVec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> DVec3 {
        self.max - self.min
    }

    pub fn expanded(&self, margin: f64) -> Aabb {
        Aabb::new(self.min - DVec3::splat(margin), self.max + DVec3::splat(margin))
    }

    pub fn corners(&self) -> [DVec3; 8] {
        let (a, b) = (self.min, self.max);
        [
            DVec3::new(a.x, a.y, a.z),
            DVec3::new(b.x, a.y, a.z),
            DVec3::new(b.x, b.y, a.z),
            DVec3::new(a.x, b.y, a.z),
            DVec3::new(a.x, a.y, b.z),
            DVec3::new(b.x, a.y, b.z),
            DVec3::new(b.x, b.y, b.z),
            DVec3::new(a.x, b.y, b.z),
        ]
    }

    /// Bounds of this box after applying `pose`.
    pub fn transformed(&self, pose: &Pose) -> Aabb {
        if self.is_empty() {
            return *self;
        }
        if !self.min.is_finite() || !self.max.is_finite() {
            return Aabb::infinite();
        }
        let mut bounds = Aabb::empty();
        for corner in self.corners() {
            bounds.extend(pose.transform_point(corner));
        }
        bounds
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AabbTreeNode {
    bounds: Aabb,
    children: Option<(usize, usize)>,
    items: Vec<usize>,
}

/// Binary bounding-volume hierarchy over a list of item boxes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AabbTree {
    nodes: Vec<AabbTreeNode>,
    item_bounds: Vec<Aabb>,
}

impl AabbTree {
    pub fn build(item_bounds: Vec<Aabb>) -> Self {
        let mut tree = Self {
            nodes: Vec::new(),
            item_bounds,
        };
        if !tree.item_bounds.is_empty() {
            let items: Vec<usize> = (0..tree.item_bounds.len()).collect();
            tree.build_node(items);
        }
        tree
    }

    fn build_node(&mut self, mut items: Vec<usize>) -> usize {
        let bounds = items
            .iter()
            .fold(Aabb::empty(), |acc, &i| acc.merge(&self.item_bounds[i]));
        let index = self.nodes.len();
        self.nodes.push(AabbTreeNode {
            bounds,
            children: None,
            items: Vec::new(),
        });

        if items.len() <= DEFAULT_AABB_TREE_LEAF_SIZE {
            self.nodes[index].items = items;
            return index;
        }

        let size = bounds.size();
        let axis = if size.x >= size.y && size.x >= size.z {
            0
        } else if size.y >= size.z {
            1
        } else {
            2
        };
        items.sort_by(|&a, &b| {
            let ca = self.item_bounds[a].center()[axis];
            let cb = self.item_bounds[b].center()[axis];
            ca.total_cmp(&cb)
        });
        let right_items = items.split_off(items.len() / 2);
        let left = self.build_node(items);
        let right = self.build_node(right_items);
        self.nodes[index].children = Some((left, right));
        index
    }

    pub fn bounds(&self) -> Aabb {
        self.nodes.first().map_or(Aabb::empty(), |node| node.bounds)
    }

    pub fn len(&self) -> usize {
        self.item_bounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.item_bounds.is_empty()
    }

    /// Items whose box intersects `query`.
    pub fn query(&self, query: &Aabb) -> Vec<usize> {
        let mut result = Vec::new();
        if self.nodes.is_empty() {
            return result;
        }
        let mut stack = vec![0];
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            if !node.bounds.intersects(query) {
                continue;
            }
            match node.children {
                Some((left, right)) => {
                    stack.push(left);
                    stack.push(right);
                }
                None => result.extend(
                    node.items
                        .iter()
                        .copied()
                        .filter(|&item| self.item_bounds[item].intersects(query)),
                ),
            }
        }
        result.sort_unstable();
        result
    }

    /// All `(self item, other item)` pairs with intersecting boxes.
    pub fn spatial_join(&self, other: &AabbTree) -> Vec<(usize, usize)> {
        let mut result = Vec::new();
        if self.nodes.is_empty() || other.nodes.is_empty() {
            return result;
        }
        let mut stack = vec![(0usize, 0usize)];
        while let Some((a, b)) = stack.pop() {
            let (node_a, node_b) = (&self.nodes[a], &other.nodes[b]);
            if !node_a.bounds.intersects(&node_b.bounds) {
                continue;
            }
            match (node_a.children, node_b.children) {
                (None, None) => {
                    for &i in &node_a.items {
                        for &j in &node_b.items {
                            if self.item_bounds[i].intersects(&other.item_bounds[j]) {
                                result.push((i, j));
                            }
                        }
                    }
                }
                (Some((l, r)), None) => {
                    stack.push((l, b));
                    stack.push((r, b));
                }
                (None, Some((l, r))) => {
                    stack.push((a, l));
                    stack.push((a, r));
                }
                (Some((la, ra)), Some((lb, rb))) => {
                    stack.push((la, lb));
                    stack.push((la, rb));
                    stack.push((ra, lb));
                    stack.push((ra, rb));
                }
            }
        }
        result.sort_unstable();
        result
    }
}

/// Triangle mesh with per-triangle normals and an AABB tree over its triangles.
///
/// Vertex indices of deformable meshes are node indices of the owning representation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriangleMesh {
    vertices: Vec<DVec3>,
    triangles: Vec<[usize; 3]>,
    normals: Vec<DVec3>,
    tree: AabbTree,
}

impl TriangleMesh {
    pub fn new(vertices: Vec<DVec3>, triangles: Vec<[usize; 3]>) -> Result<Self> {
        for triangle in &triangles {
            if let Some(&bad) = triangle.iter().find(|&&v| v >= vertices.len()) {
                return Err(PhysicsError::NodeOutOfRange {
                    node: bad,
                    num_nodes: vertices.len(),
                });
            }
        }
        let mut mesh = Self {
            vertices,
            triangles,
            normals: Vec::new(),
            tree: AabbTree::default(),
        };
        mesh.update();
        Ok(mesh)
    }

    pub fn vertices(&self) -> &[DVec3] {
        &self.vertices
    }

    pub fn triangles(&self) -> &[[usize; 3]] {
        &self.triangles
    }

    pub fn normal(&self, triangle: usize) -> DVec3 {
        self.normals[triangle]
    }

    pub fn tree(&self) -> &AabbTree {
        &self.tree
    }

    pub fn triangle_positions(&self, triangle: usize) -> [DVec3; 3] {
        let [a, b, c] = self.triangles[triangle];
        [self.vertices[a], self.vertices[b], self.vertices[c]]
    }

    pub fn aabb(&self) -> Aabb {
        Aabb::from_points(&self.vertices)
    }

    /// Moves the vertices and refreshes normals and the AABB tree.
    pub fn set_vertex_positions(&mut self, positions: &[DVec3]) -> Result<()> {
        if positions.len() != self.vertices.len() {
            return Err(PhysicsError::invalid_parameter(format!(
                "mesh has {} vertices, got {} positions",
                self.vertices.len(),
                positions.len()
            )));
        }
        self.vertices.copy_from_slice(positions);
        self.update();
        Ok(())
    }

    /// Copy of the mesh with every vertex moved by `pose`.
    pub fn transformed(&self, pose: &Pose) -> TriangleMesh {
        let mut mesh = self.clone();
        for vertex in &mut mesh.vertices {
            *vertex = pose.transform_point(*vertex);
        }
        mesh.update();
        mesh
    }

    fn update(&mut self) {
        self.normals = self
            .triangles
            .iter()
            .map(|&[a, b, c]| {
                let (a, b, c) = (self.vertices[a], self.vertices[b], self.vertices[c]);
                (b - a).cross(c - a).normalize_or_zero()
            })
            .collect();
        let bounds = (0..self.triangles.len())
            .map(|t| Aabb::from_points(&self.triangle_positions(t)))
            .collect();
        self.tree = AabbTree::build(bounds);
    }

    /// Volume, center and second moment of volume of the closed mesh.
    ///
    /// Surface integrals of Eberly's polyhedral mass properties: ten polynomial terms per
    /// triangle, exact for any closed, consistently oriented mesh.
    pub fn volume_integrals(&self) -> (f64, DVec3, DMat3) {
        const MULTIPLIERS: [f64; 10] = [
            1.0 / 6.0,
            1.0 / 24.0,
            1.0 / 24.0,
            1.0 / 24.0,
            1.0 / 60.0,
            1.0 / 60.0,
            1.0 / 60.0,
            1.0 / 120.0,
            1.0 / 120.0,
            1.0 / 120.0,
        ];

        let mut integral = [0.0f64; 10];
        for t in 0..self.triangles.len() {
            let [p0, p1, p2] = self.triangle_positions(t);
            let d = (p1 - p0).cross(p2 - p0);
            let (f1x, f2x, f3x, g0x, g1x, g2x) = subexpressions(p0.x, p1.x, p2.x);
            let (_, f2y, f3y, g0y, g1y, g2y) = subexpressions(p0.y, p1.y, p2.y);
            let (_, f2z, f3z, g0z, g1z, g2z) = subexpressions(p0.z, p1.z, p2.z);

            integral[0] += d.x * f1x;
            integral[1] += d.x * f2x;
            integral[2] += d.y * f2y;
            integral[3] += d.z * f2z;
            integral[4] += d.x * f3x;
            integral[5] += d.y * f3y;
            integral[6] += d.z * f3z;
            integral[7] += d.x * (p0.y * g0x + p1.y * g1x + p2.y * g2x);
            integral[8] += d.y * (p0.z * g0y + p1.z * g1y + p2.z * g2y);
            integral[9] += d.z * (p0.x * g0z + p1.x * g1z + p2.x * g2z);
        }
        for (value, multiplier) in integral.iter_mut().zip(MULTIPLIERS) {
            *value *= multiplier;
        }

        let volume = integral[0];
        if volume.abs() < f64::EPSILON {
            return (0.0, DVec3::ZERO, DMat3::ZERO);
        }
        let center = DVec3::new(integral[1], integral[2], integral[3]) / volume;

        let xx = integral[5] + integral[6] - volume * (center.y * center.y + center.z * center.z);
        let yy = integral[4] + integral[6] - volume * (center.z * center.z + center.x * center.x);
        let zz = integral[4] + integral[5] - volume * (center.x * center.x + center.y * center.y);
        let xy = -(integral[7] - volume * center.x * center.y);
        let yz = -(integral[8] - volume * center.y * center.z);
        let xz = -(integral[9] - volume * center.z * center.x);

        let second_moment = DMat3::from_cols(
            DVec3::new(xx, xy, xz),
            DVec3::new(xy, yy, yz),
            DVec3::new(xz, yz, zz),
        );
        (volume, center, second_moment)
    }
}

fn subexpressions(w0: f64, w1: f64, w2: f64) -> (f64, f64, f64, f64, f64, f64) {
    let temp0 = w0 + w1;
    let f1 = temp0 + w2;
    let temp1 = w0 * w0;
    let temp2 = temp1 + w1 * temp0;
    let f2 = temp2 + w2 * f1;
    let f3 = w0 * temp1 + w1 * temp2 + w2 * f2;
    let g0 = f2 + w0 * (f1 + w0);
    let g1 = f2 + w1 * (f1 + w1);
    let g2 = f2 + w2 * (f1 + w2);
    (f1, f2, f3, g0, g1, g2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tree_query_matches_brute_force() {
        let boxes: Vec<Aabb> = (0..37)
            .map(|i| {
                let p = DVec3::new(i as f64, (i % 5) as f64, 0.0);
                Aabb::new(p, p + DVec3::splat(0.5))
            })
            .collect();
        let tree = AabbTree::build(boxes.clone());
        let query = Aabb::new(DVec3::new(3.2, -1.0, -1.0), DVec3::new(10.1, 2.2, 1.0));
        let expected: Vec<usize> = boxes
            .iter()
            .enumerate()
            .filter(|(_, b)| b.intersects(&query))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(tree.query(&query), expected);
    }

    #[test]
    fn out_of_range_triangle_is_rejected() {
        let result = TriangleMesh::new(vec![DVec3::ZERO; 3], vec![[0, 1, 3]]);
        assert!(matches!(
            result,
            Err(PhysicsError::NodeOutOfRange { node: 3, .. })
        ));
    }
}
