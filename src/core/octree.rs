use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::core::mesh::Aabb;

/// Child indices from the root down to a node.
pub type OctreePath = Vec<usize>;

/// Node of a sparse octree.
///
/// Child `i` covers the half of the parent box selected by bit 0 (x), bit 1 (y) and bit 2 (z)
/// of `i`. A node is active when it, or one of its descendants, received data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OctreeNode {
    pub bounds: Aabb,
    pub is_active: bool,
    pub children: Option<Box<[OctreeNode; 8]>>,
    pub data: Option<String>,
}

impl OctreeNode {
    pub fn new(bounds: Aabb) -> Self {
        Self {
            bounds,
            is_active: false,
            children: None,
            data: None,
        }
    }

    pub fn has_children(&self) -> bool {
        self.children.is_some()
    }

    /// Creates the 8 children of this node if they do not exist yet.
    pub fn subdivide(&mut self) {
        if self.children.is_some() {
            return;
        }
        let half = self.bounds.size() * 0.5;
        let children = std::array::from_fn(|i| {
            let offset = DVec3::new(
                if i & 1 != 0 { half.x } else { 0.0 },
                if i & 2 != 0 { half.y } else { 0.0 },
                if i & 4 != 0 { half.z } else { 0.0 },
            );
            let min = self.bounds.min + offset;
            OctreeNode::new(Aabb::new(min, min + half))
        });
        self.children = Some(Box::new(children));
    }

    /// Stores `data` in the node of depth `levels` (the root is level 1) containing `position`.
    ///
    /// Returns `false` when `position` is outside the node.
    pub fn add_data(&mut self, position: DVec3, data: impl Into<String>, levels: usize) -> bool {
        if levels == 0 || !self.bounds.contains_point(position) {
            return false;
        }
        if levels == 1 {
            self.is_active = true;
            self.data = Some(data.into());
            return true;
        }
        self.subdivide();
        let data = data.into();
        let added = match self.children.as_mut() {
            Some(children) => children
                .iter_mut()
                .any(|child| child.add_data(position, data.clone(), levels - 1)),
            None => false,
        };
        if added {
            self.is_active = true;
        }
        added
    }

    pub fn child(&self, index: usize) -> Option<&OctreeNode> {
        self.children.as_ref().and_then(|children| children.get(index))
    }

    pub fn node(&self, path: &[usize]) -> Option<&OctreeNode> {
        path.iter()
            .try_fold(self, |node, &index| node.child(index))
    }

    /// Active nodes without children, with their paths.
    pub fn active_leaves(&self) -> Vec<(OctreePath, &OctreeNode)> {
        let mut leaves = Vec::new();
        self.collect_leaves(&mut Vec::new(), &mut leaves);
        leaves
    }

    fn collect_leaves<'a>(
        &'a self,
        path: &mut OctreePath,
        leaves: &mut Vec<(OctreePath, &'a OctreeNode)>,
    ) {
        if !self.is_active {
            return;
        }
        match &self.children {
            Some(children) => {
                for (index, child) in children.iter().enumerate() {
                    path.push(index);
                    child.collect_leaves(path, leaves);
                    path.pop();
                }
            }
            None => leaves.push((path.clone(), self)),
        }
    }
}
