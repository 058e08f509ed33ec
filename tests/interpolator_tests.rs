use approx::assert_relative_eq;
use deformable_physics::*;

const DT: f64 = 0.05;

/// Fixed body driven from the origin to (4, 4, 4) over one second.
fn driven(configure: impl FnOnce(&mut PoseInterpolator)) -> (PhysicsManager, EntityId) {
    let manager = PhysicsManager::default();
    let platform = manager.add_representation(FixedRepresentation::new("platform", Pose::IDENTITY));
    let mut interpolator = PoseInterpolator::new(platform, Pose::from_translation(DVec3::splat(4.0)));
    interpolator.set_duration(1.0).expect("positive duration");
    configure(&mut interpolator);
    manager.add_pose_interpolator(interpolator);
    (manager, platform)
}

fn position_after(manager: &PhysicsManager, id: EntityId, frames: usize) -> DVec3 {
    for _ in 0..frames {
        manager.update(DT);
    }
    manager.pose(id).expect("published pose").translation
}

fn assert_at(position: DVec3, expected: f64) {
    for coordinate in position.to_array() {
        assert_relative_eq!(coordinate, expected, epsilon = 1e-9);
    }
}

#[test]
fn halfway_after_half_the_duration() {
    let (manager, platform) = driven(|_| {});
    assert_at(position_after(&manager, platform, 10), 2.0);
}

#[test]
fn holds_the_end_pose_once_done() {
    let (manager, platform) = driven(|_| {});
    assert_at(position_after(&manager, platform, 30), 4.0);
}

#[test]
fn ping_pong_comes_back() {
    let (manager, platform) = driven(|interpolator| interpolator.set_ping_pong(true));
    assert_at(position_after(&manager, platform, 25), 3.0);
}

#[test]
fn loop_starts_over() {
    let (manager, platform) = driven(|interpolator| interpolator.set_loop(true));
    assert_at(position_after(&manager, platform, 25), 1.0);
}

#[test]
fn explicit_starting_pose_overrides_the_target() {
    let (manager, platform) = driven(|interpolator| {
        interpolator.set_starting_pose(Pose::from_translation(DVec3::splat(2.0)));
    });
    assert_at(position_after(&manager, platform, 10), 3.0);
}

#[test]
fn non_positive_durations_are_rejected() {
    let mut interpolator = PoseInterpolator::new(EntityId::from_index(0), Pose::IDENTITY);
    assert!(interpolator.set_duration(0.0).is_err());
    assert!(interpolator.set_duration(f64::NAN).is_err());
    assert!(interpolator.set_duration(0.5).is_ok());
    assert_relative_eq!(interpolator.duration(), 0.5);
}
