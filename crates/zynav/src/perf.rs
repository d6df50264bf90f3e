// perf.rs - Timing instrumentation for indexing and resolution
//
// Controlled via the ZYNAV_PERF environment variable:
//   ZYNAV_PERF=1 zynav index .        # log phase durations
//   ZYNAV_PERF=verbose zynav index .  # also warn when a phase exceeds its budget

use std::sync::OnceLock;
use std::time::{Duration, Instant};

static PERF_MODE: OnceLock<PerfMode> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PerfMode {
    Off,
    On,
    Verbose,
}

fn parse_mode(value: Option<&str>) -> PerfMode {
    match value.map(str::to_lowercase).as_deref() {
        None | Some("") | Some("0") | Some("false") => PerfMode::Off,
        Some("verbose") => PerfMode::Verbose,
        Some(_) => PerfMode::On,
    }
}

fn mode() -> PerfMode {
    *PERF_MODE.get_or_init(|| parse_mode(std::env::var("ZYNAV_PERF").ok().as_deref()))
}

/// Check if performance timing is enabled
pub fn is_enabled() -> bool {
    mode() != PerfMode::Off
}

/// RAII guard that logs the duration of a scope when dropped.
///
/// ```
/// use zynav::perf::TimingGuard;
///
/// let _guard = TimingGuard::new("index:full-rebuild");
/// // ... work ...
/// ```
pub struct TimingGuard {
    start: Instant,
    name: &'static str,
    budget_ms: Option<u64>,
    mode: PerfMode,
}

impl TimingGuard {
    pub fn new(name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            name,
            budget_ms: None,
            mode: mode(),
        }
    }

    /// Like [`TimingGuard::new`], but warns in verbose mode when the scope
    /// outlives `budget_ms`.
    pub fn with_budget(name: &'static str, budget_ms: u64) -> Self {
        Self {
            start: Instant::now(),
            name,
            budget_ms: Some(budget_ms),
            mode: mode(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for TimingGuard {
    fn drop(&mut self) {
        if self.mode == PerfMode::Off {
            return;
        }
        let elapsed = self.start.elapsed();
        log::info!("[PERF] {} completed in {:?}", self.name, elapsed);

        if let (PerfMode::Verbose, Some(budget)) = (self.mode, self.budget_ms) {
            if elapsed.as_millis() > budget as u128 {
                log::warn!(
                    "[PERF] {} exceeded budget ({}ms > {}ms)",
                    self.name,
                    elapsed.as_millis(),
                    budget
                );
            }
        }
    }
}
