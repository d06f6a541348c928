use std::time::{Duration, Instant};

use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrintJob {
    pub started_at: Instant,
    pub duration: Duration,
}

impl PrintJob {
    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started_at)
    }

    pub fn is_done(&self, now: Instant) -> bool {
        self.elapsed(now) >= self.duration
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PrinterTick {
    Idle,
    Printing {
        progress: f32,
        /// Horizontal wobble, fading out towards the end of the job.
        shake: f32,
        /// Vertical hop, fading out towards the end of the job.
        bounce: f32,
    },
    /// Reported once, on the first tick past the job's duration.
    Completed,
}

#[derive(Debug, Clone)]
pub struct Printer {
    duration: Duration,
    job: Option<PrintJob>,
}

impl Printer {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            job: None,
        }
    }

    pub fn is_printing(&self) -> bool {
        self.job.is_some()
    }

    pub fn job(&self) -> Option<&PrintJob> {
        self.job.as_ref()
    }

    /// Returns `false` if a job is already running.
    pub fn start(&mut self, now: Instant) -> bool {
        if self.job.is_some() {
            return false;
        }
        info!(duration_ms = self.duration.as_millis() as u64, "print job started");
        self.job = Some(PrintJob {
            started_at: now,
            duration: self.duration,
        });
        true
    }

    pub fn tick(&mut self, now: Instant) -> PrinterTick {
        let Some(job) = self.job else {
            return PrinterTick::Idle;
        };
        if job.is_done(now) {
            self.job = None;
            info!("print job completed");
            return PrinterTick::Completed;
        }

        let t = job.elapsed(now).as_secs_f32();
        let total = job.duration.as_secs_f32().max(f32::EPSILON);
        let fade = 1.0 - t / total;
        PrinterTick::Printing {
            progress: t / total,
            shake: (t * 30.0).sin() * 0.02 * fade,
            bounce: (t * 8.0).sin().abs() * 0.05 * fade,
        }
    }
}
