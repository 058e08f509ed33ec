use std::time::Duration;

/// Per-frame timing and size counters of the physics pipeline.
#[derive(Debug, Default, Clone)]
pub struct PipelineProfiler {
    pub stage_times: Vec<(&'static str, Duration)>,
    pub total_frame_time: Duration,

    pub representation_count: usize,
    pub pair_count: usize,
    pub contact_count: usize,
    pub constraint_count: usize,
    pub mlcp_size: usize,
}

impl PipelineProfiler {
    pub fn reset(&mut self) {
        self.stage_times.clear();
        self.total_frame_time = Duration::ZERO;
        self.representation_count = 0;
        self.pair_count = 0;
        self.contact_count = 0;
        self.constraint_count = 0;
        self.mlcp_size = 0;
    }

    pub fn record(&mut self, stage: &'static str, elapsed: Duration) {
        self.stage_times.push((stage, elapsed));
        self.total_frame_time += elapsed;
    }

    /// Time spent in all runs of `stage` this frame.
    pub fn stage_time(&self, stage: &str) -> Duration {
        self.stage_times
            .iter()
            .filter(|(name, _)| *name == stage)
            .map(|(_, elapsed)| *elapsed)
            .sum()
    }

    pub fn report(&self) {
        let total_us = self.total_frame_time.as_micros() as f64;
        if total_us < 1.0 {
            return;
        }

        log::debug!(
            "physics frame: {:.3} ms, {} representations, {} pairs, {} contacts, {} constraints, mlcp {}",
            self.total_frame_time.as_secs_f64() * 1000.0,
            self.representation_count,
            self.pair_count,
            self.contact_count,
            self.constraint_count,
            self.mlcp_size
        );
        for (stage, elapsed) in &self.stage_times {
            log::debug!(
                "  {:<32} {:.3} ms ({:.1}%)",
                stage,
                elapsed.as_secs_f64() * 1000.0,
                elapsed.as_micros() as f64 / total_us * 100.0
            );
        }
    }
}
