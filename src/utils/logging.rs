use log::{Level, log_enabled};
use std::time::{Duration, Instant};

/// Trace span around one pipeline stage of the tick starting at `time`.
///
/// Costs nothing beyond a level check unless trace logging is enabled.
pub struct StageTrace {
    stage: &'static str,
    time: f64,
    start: Option<Instant>,
}

impl StageTrace {
    pub fn enter(stage: &'static str, time: f64) -> Self {
        let start = log_enabled!(Level::Trace).then(|| {
            log::trace!("t = {time:.6}: enter {stage}");
            Instant::now()
        });
        Self { stage, time, start }
    }
}

impl Drop for StageTrace {
    fn drop(&mut self) {
        if let Some(start) = self.start {
            log::trace!(
                "t = {:.6}: leave {} after {} µs",
                self.time,
                self.stage,
                start.elapsed().as_micros()
            );
        }
    }
}

/// Tracks ticks whose wall-clock cost exceeded the simulated time step.
///
/// The first lagging tick is logged at warn level, later ones at debug level.
#[derive(Debug, Default, Clone)]
pub struct RealTimeMonitor {
    lagging_ticks: u64,
}

impl RealTimeMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one tick; returns `true` when it ran slower than real time.
    pub fn record(&mut self, wall: Duration, dt: f64) -> bool {
        let wall_ms = wall.as_secs_f64() * 1000.0;
        let dt_ms = dt * 1000.0;
        if wall_ms <= dt_ms {
            return false;
        }
        self.lagging_ticks += 1;
        if self.lagging_ticks == 1 {
            log::warn!(
                "simulation is slower than real time: {wall_ms:.3} ms for a {dt_ms:.3} ms tick; further lagging ticks are logged at debug level"
            );
        } else {
            log::debug!("lagging tick: {wall_ms:.3} ms for {dt_ms:.3} ms");
        }
        true
    }

    pub fn lagging_ticks(&self) -> u64 {
        self.lagging_ticks
    }
}
