use std::{
    collections::HashSet,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use deformable_physics::*;

fn assert_send_sync<T: Send + Sync>() {}

#[test]
fn manager_can_be_shared_between_threads() {
    assert_send_sync::<PhysicsManager>();
    assert_send_sync::<PhysicsSnapshot>();
}

#[test]
fn physics_thread_advances_frames_until_stopped() {
    let manager = Arc::new(PhysicsManager::new(PhysicsConfig {
        rate_hz: 200.0,
        ..PhysicsConfig::default()
    }));
    let ball = manager.add_representation(
        RigidRepresentation::new(
            "ball",
            Arc::new(Shape::sphere(0.1)),
            RigidParameters::default(),
            Pose::from_translation(DVec3::new(0.0, 10.0, 0.0)),
        )
        .expect("valid ball"),
    );

    let mut physics = PhysicsThread::spawn(Arc::clone(&manager)).expect("thread started");
    assert!(physics.is_running());
    let deadline = Instant::now() + Duration::from_secs(5);
    while manager.final_state().frame < 5 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    physics.stop();
    assert!(!physics.is_running());

    let snapshot = manager.final_state();
    assert!(snapshot.frame >= 5);
    let height = snapshot.pose(ball).expect("ball published").translation.y;
    assert!(height < 10.0);

    // Nothing moves once the thread is joined.
    thread::sleep(Duration::from_millis(20));
    assert_eq!(manager.final_state().frame, snapshot.frame);
}

#[test]
fn concurrent_adds_get_distinct_handles() {
    let manager = Arc::new(PhysicsManager::default());
    let workers: Vec<_> = (0..4)
        .map(|worker| {
            let manager = Arc::clone(&manager);
            thread::spawn(move || {
                (0..25)
                    .map(|i| {
                        manager.add_representation(FixedRepresentation::new(
                            format!("post {worker}-{i}"),
                            Pose::IDENTITY,
                        ))
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut handles = HashSet::new();
    for worker in workers {
        for id in worker.join().expect("worker finished") {
            assert!(handles.insert(id), "handle {id:?} handed out twice");
        }
    }
    assert_eq!(handles.len(), 100);

    manager.update(0.001);
    manager.inspect(|state| assert_eq!(state.representations.len(), 100));
    let snapshot = manager.final_state();
    assert!(handles.iter().all(|id| snapshot.pose(*id).is_some()));
}
