use serde::{Deserialize, Serialize};

use crate::{
    config::DEFAULT_INTERPOLATION_DURATION,
    core::types::Pose,
    error::{PhysicsError, Result},
    utils::allocator::EntityId,
};

/// Drives the pose of a representation from a starting pose to an ending pose over a fixed
/// duration.
///
/// Looping restarts from the starting pose once the duration elapses; ping-pong swaps the two
/// poses instead. Enabling one disables the other. Without either, the target stays at the
/// ending pose.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoseInterpolator {
    target: EntityId,
    optional_starting_pose: Option<Pose>,
    starting_pose: Pose,
    ending_pose: Pose,
    duration: f64,
    current_time: f64,
    is_loop: bool,
    is_ping_pong: bool,
    awake: bool,
}

impl PoseInterpolator {
    pub fn new(target: EntityId, ending_pose: Pose) -> Self {
        Self {
            target,
            optional_starting_pose: None,
            starting_pose: Pose::IDENTITY,
            ending_pose,
            duration: DEFAULT_INTERPOLATION_DURATION,
            current_time: 0.0,
            is_loop: false,
            is_ping_pong: false,
            awake: false,
        }
    }

    pub fn target(&self) -> EntityId {
        self.target
    }

    /// Overrides the target's pose at wake up as the starting pose.
    pub fn set_starting_pose(&mut self, pose: Pose) {
        self.optional_starting_pose = Some(pose);
    }

    pub fn set_ending_pose(&mut self, pose: Pose) {
        self.ending_pose = pose;
    }

    pub fn set_duration(&mut self, duration: f64) -> Result<()> {
        if !(duration > 0.0 && duration.is_finite()) {
            return Err(PhysicsError::invalid_parameter(format!(
                "interpolation duration must be positive, got {duration}"
            )));
        }
        self.duration = duration;
        Ok(())
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn set_loop(&mut self, value: bool) {
        self.is_loop = value;
        if value {
            self.is_ping_pong = false;
        }
    }

    pub fn is_loop(&self) -> bool {
        self.is_loop
    }

    pub fn set_ping_pong(&mut self, value: bool) {
        self.is_ping_pong = value;
        if value {
            self.is_loop = false;
        }
    }

    pub fn is_ping_pong(&self) -> bool {
        self.is_ping_pong
    }

    pub fn is_awake(&self) -> bool {
        self.awake
    }

    /// Fixes the starting pose, falling back to the target's current pose.
    pub fn wake_up(&mut self, target_pose: Pose) {
        self.starting_pose = self.optional_starting_pose.unwrap_or(target_pose);
        self.current_time = 0.0;
        self.awake = true;
    }

    /// Advances time by `dt` and returns the pose the target should take.
    pub fn update(&mut self, dt: f64) -> Pose {
        self.current_time += dt;
        if self.current_time > self.duration {
            if self.is_loop {
                self.current_time %= self.duration;
            } else if self.is_ping_pong {
                // Each full duration elapsed flips the direction once.
                while self.current_time > self.duration {
                    self.current_time -= self.duration;
                    std::mem::swap(&mut self.starting_pose, &mut self.ending_pose);
                }
            } else {
                self.current_time = self.duration;
            }
        }
        Pose::interpolate(
            &self.starting_pose,
            &self.ending_pose,
            self.current_time / self.duration,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec3;

    fn poses() -> (Pose, Pose) {
        (
            Pose::from_translation(DVec3::new(1.0, 2.0, 3.0)),
            Pose::from_translation(DVec3::new(3.0, 2.0, 1.0)),
        )
    }

    #[test]
    fn loop_and_ping_pong_are_exclusive() {
        let mut interpolator = PoseInterpolator::new(EntityId::default(), Pose::IDENTITY);
        interpolator.set_ping_pong(true);
        interpolator.set_loop(true);
        assert!(interpolator.is_loop());
        assert!(!interpolator.is_ping_pong());
        interpolator.set_ping_pong(true);
        assert!(!interpolator.is_loop());
    }

    #[test]
    fn target_pose_is_the_default_start() {
        let (start, end) = poses();
        let mut interpolator = PoseInterpolator::new(EntityId::default(), end);
        interpolator.wake_up(start);
        assert!(interpolator.update(0.0).abs_diff_eq(&start, 1e-12));
        let expected = Pose::interpolate(&start, &end, 0.5);
        assert!(interpolator.update(0.5).abs_diff_eq(&expected, 1e-12));
    }

    #[test]
    fn ping_pong_reflects_and_loop_wraps() {
        let (start, end) = poses();
        let expected_midpoint = Pose::from_translation(DVec3::splat(2.0));
        assert!(Pose::interpolate(&start, &end, 0.5).abs_diff_eq(&expected_midpoint, 1e-12));

        let mut ping_pong = PoseInterpolator::new(EntityId::default(), end);
        ping_pong.set_ping_pong(true);
        ping_pong.wake_up(start);
        let reflected = Pose::interpolate(&end, &start, 0.25);
        assert!(ping_pong.update(1.25).abs_diff_eq(&reflected, 1e-12));

        let mut looping = PoseInterpolator::new(EntityId::default(), end);
        looping.set_loop(true);
        looping.wake_up(start);
        let wrapped = Pose::interpolate(&start, &end, 0.25);
        assert!(looping.update(1.25).abs_diff_eq(&wrapped, 1e-12));
    }

    #[test]
    fn without_repetition_the_end_pose_is_held() {
        let (start, end) = poses();
        let mut interpolator = PoseInterpolator::new(EntityId::default(), end);
        interpolator.set_starting_pose(start);
        interpolator.wake_up(Pose::IDENTITY);
        assert!(interpolator.update(3.0).abs_diff_eq(&end, 1e-12));
    }
}
