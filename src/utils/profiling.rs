use std::time::{Duration, Instant};

use super::registry::Registry;

/// Wall-clock breakdown of one engine tick.
#[derive(Debug, Default, Clone, Copy)]
pub struct PhysicsProfiler {
    pub initial_phase: Duration,
    pub detect_collisions: Duration,
    pub configure_collision_handlers: Duration,
    pub handle_collisions: Duration,
    pub final_phase: Duration,
    pub total: Duration,

    pub collision_count: usize,
    pub group_count: usize,
}

impl PhysicsProfiler {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Ratio of simulated time to the wall-clock time spent simulating it.
    pub fn real_time_rate(&self, dt: f64) -> f64 {
        let total = self.total.as_secs_f64();
        if total > 0.0 {
            dt / total
        } else {
            f64::INFINITY
        }
    }

    /// Writes the stage timers (seconds) into `registry`.
    pub fn publish(&self, registry: &Registry, dt: f64) {
        registry.set("initial_phase_timer", self.initial_phase.as_secs_f64());
        registry.set("detect_collisions_timer", self.detect_collisions.as_secs_f64());
        registry.set(
            "configure_collision_handlers_timer",
            self.configure_collision_handlers.as_secs_f64(),
        );
        registry.set("handle_collisions_timer", self.handle_collisions.as_secs_f64());
        registry.set("final_phase_timer", self.final_phase.as_secs_f64());
        registry.set("total_timer", self.total.as_secs_f64());
        registry.set("real_time_rate", self.real_time_rate(dt));
        registry.set("collision_count", self.collision_count as f64);
        registry.set("group_count", self.group_count as f64);
    }

    pub fn report(&self) -> String {
        let total_us = self.total.as_micros().max(1) as f64;
        let line = |label: &str, d: Duration| {
            format!(
                "  {label:<30}{:.3} ms ({:.1}%)\n",
                d.as_secs_f64() * 1000.0,
                d.as_micros() as f64 / total_us * 100.0
            )
        };
        let mut out = format!(
            "collisions: {}, groups: {}, total: {:.3} ms\n",
            self.collision_count,
            self.group_count,
            self.total.as_secs_f64() * 1000.0
        );
        out += &line("initial phase", self.initial_phase);
        out += &line("detect collisions", self.detect_collisions);
        out += &line("configure collision handlers", self.configure_collision_handlers);
        out += &line("handle collisions", self.handle_collisions);
        out += &line("final phase", self.final_phase);
        out
    }
}

pub struct ScopedTimer<'a> {
    start: Instant,
    output: &'a mut Duration,
}

impl<'a> ScopedTimer<'a> {
    pub fn new(output: &'a mut Duration) -> Self {
        Self {
            start: Instant::now(),
            output,
        }
    }
}

impl Drop for ScopedTimer<'_> {
    fn drop(&mut self) {
        *self.output += self.start.elapsed();
    }
}
