//! Rate-limited progress reporting for long proofs.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// A snapshot of a running proof.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProveProgress {
    pub prover: String,
    /// Power iteration or push pass number.
    pub iteration: usize,
    pub pushes: usize,
    /// States holding residual (unsettled) mass.
    pub residual_states: usize,
    pub residual_mass: f64,
    /// States holding settled mass.
    pub settled_states: usize,
    pub settled_mass: f64,
    pub elapsed_ms: u64,
}

type Callback = Box<dyn FnMut(&ProveProgress) + Send>;

/// Emits progress at most once per interval, through `tracing` and an
/// optional callback.
pub struct StatusLogger {
    interval: Duration,
    started: Instant,
    last: Option<Instant>,
    callback: Option<Callback>,
}

impl std::fmt::Debug for StatusLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusLogger")
            .field("interval", &self.interval)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

impl Default for StatusLogger {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

impl StatusLogger {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            started: Instant::now(),
            last: None,
            callback: None,
        }
    }

    /// A logger that never reports.
    pub fn silent() -> Self {
        Self::new(Duration::MAX)
    }

    pub fn with_callback(mut self, callback: impl FnMut(&ProveProgress) + Send + 'static) -> Self {
        self.callback = Some(Box::new(callback));
        self
    }

    /// Whether a report is due. The first report is due one interval after
    /// the logger was created.
    pub fn due(&self) -> bool {
        let since = self.last.unwrap_or(self.started);
        since.elapsed() >= self.interval
    }

    /// Report if due; `progress` is only built when a report goes out.
    pub fn tick(&mut self, progress: impl FnOnce() -> ProveProgress) {
        if !self.due() {
            return;
        }
        self.last = Some(Instant::now());
        let mut progress = progress();
        progress.elapsed_ms = self.started.elapsed().as_millis() as u64;
        tracing::info!(
            prover = %progress.prover,
            iteration = progress.iteration,
            pushes = progress.pushes,
            residual_states = progress.residual_states,
            residual_mass = progress.residual_mass,
            settled_states = progress.settled_states,
            settled_mass = progress.settled_mass,
            elapsed_ms = progress.elapsed_ms,
            "proof progress"
        );
        if let Some(callback) = self.callback.as_mut() {
            callback(&progress);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn progress(iteration: usize) -> ProveProgress {
        ProveProgress {
            prover: "test".into(),
            iteration,
            pushes: 0,
            residual_states: 0,
            residual_mass: 0.0,
            settled_states: 0,
            settled_mass: 0.0,
            elapsed_ms: 0,
        }
    }

    #[test]
    fn zero_interval_reports_every_tick() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut status = StatusLogger::new(Duration::ZERO)
            .with_callback(move |p| sink.lock().unwrap().push(p.iteration));
        for i in 0..3 {
            status.tick(|| progress(i));
        }
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn silent_logger_never_builds_progress() {
        let mut status = StatusLogger::silent();
        status.tick(|| panic!("progress should not be built"));
        assert!(!status.due());
    }
}
