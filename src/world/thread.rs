use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};

use log::{debug, log_enabled, Level};

use crate::{
    error::{PhysicsError, Result},
    utils::logging::warn_if_frame_budget_exceeded,
    world::PhysicsManager,
};

/// Runs [`PhysicsManager::update`] at the configured rate on a dedicated thread.
///
/// The thread stops and is joined when this handle is dropped.
pub struct PhysicsThread {
    manager: Arc<PhysicsManager>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl PhysicsThread {
    pub fn spawn(manager: Arc<PhysicsManager>) -> Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let handle = std::thread::Builder::new()
            .name("physics".into())
            .spawn({
                let manager = Arc::clone(&manager);
                let running = Arc::clone(&running);
                move || run(&manager, &running)
            })
            .map_err(|error| {
                PhysicsError::InvalidState(format!("cannot start the physics thread: {error}"))
            })?;
        Ok(Self {
            manager,
            running,
            handle: Some(handle),
        })
    }

    pub fn manager(&self) -> &Arc<PhysicsManager> {
        &self.manager
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Stops the loop after the current frame and waits for the thread.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("physics thread panicked");
            }
        }
    }
}

impl Drop for PhysicsThread {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(manager: &PhysicsManager, running: &AtomicBool) {
    let period = manager.config().period();
    let frames_per_report = manager.config().rate_hz.max(1.0) as u64;
    debug!("physics thread started at {:.1} Hz", 1.0 / period);

    while running.load(Ordering::Acquire) {
        let started = Instant::now();
        manager.update(period);
        let elapsed = started.elapsed();
        warn_if_frame_budget_exceeded(elapsed, period);

        if log_enabled!(Level::Debug) {
            let snapshot = manager.final_state();
            if snapshot.frame % frames_per_report == 0 {
                snapshot.profile.report();
            }
        }

        if let Some(remaining) = Duration::from_secs_f64(period).checked_sub(elapsed) {
            std::thread::sleep(remaining);
        }
    }
    debug!("physics thread stopped");
}
