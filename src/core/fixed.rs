use serde::{Deserialize, Serialize};

use crate::core::types::Pose;

/// Representation that never moves under physics; its pose is driven from outside.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixedRepresentation {
    pub name: String,
    pose: Pose,
    previous_pose: Pose,
    pub is_active: bool,
}

impl FixedRepresentation {
    pub fn new(name: impl Into<String>, pose: Pose) -> Self {
        Self {
            name: name.into(),
            pose,
            previous_pose: pose,
            is_active: true,
        }
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }

    pub fn previous_pose(&self) -> Pose {
        self.previous_pose
    }

    pub fn set_pose(&mut self, pose: Pose) {
        self.pose = pose;
    }

    pub fn before_update(&mut self) {
        self.previous_pose = self.pose;
    }
}
