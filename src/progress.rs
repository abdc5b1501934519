use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

pub static HTTP_REQUESTS: AtomicUsize = AtomicUsize::new(0);
pub static STATUS_POLLS: AtomicUsize = AtomicUsize::new(0);
pub static JOBS_LAUNCHED: AtomicUsize = AtomicUsize::new(0);
pub static GENERATIONS: AtomicUsize = AtomicUsize::new(0);
pub static ARTIFACT_BYTES_WRITTEN: AtomicUsize = AtomicUsize::new(0);

pub(crate) fn count(counter: &AtomicUsize) {
    counter.fetch_add(1, Ordering::Relaxed);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Counters {
    pub http_requests: usize,
    pub status_polls: usize,
    pub jobs_launched: usize,
    pub generations: usize,
    pub artifact_bytes_written: usize,
}

impl Counters {
    pub fn snapshot() -> Self {
        Counters {
            http_requests: HTTP_REQUESTS.load(Ordering::Relaxed),
            status_polls: STATUS_POLLS.load(Ordering::Relaxed),
            jobs_launched: JOBS_LAUNCHED.load(Ordering::Relaxed),
            generations: GENERATIONS.load(Ordering::Relaxed),
            artifact_bytes_written: ARTIFACT_BYTES_WRITTEN.load(Ordering::Relaxed),
        }
    }

    /// Activity between `earlier` and `self`
    pub fn since(&self, earlier: &Counters) -> Counters {
        Counters {
            http_requests: self.http_requests.saturating_sub(earlier.http_requests),
            status_polls: self.status_polls.saturating_sub(earlier.status_polls),
            jobs_launched: self.jobs_launched.saturating_sub(earlier.jobs_launched),
            generations: self.generations.saturating_sub(earlier.generations),
            artifact_bytes_written: self
                .artifact_bytes_written
                .saturating_sub(earlier.artifact_bytes_written),
        }
    }

    pub fn status_line(&self) -> String {
        format!(
            "{} HTTP requests, {} jobs launched, {} status polls, {} generations, {} bytes of RACF output written",
            self.http_requests,
            self.jobs_launched,
            self.status_polls,
            self.generations,
            self.artifact_bytes_written
        )
    }
}

pub struct Stopwatch {
    started: Instant,
    counters_at_start: Counters,
}

impl Stopwatch {
    pub fn start() -> Self {
        Stopwatch {
            started: Instant::now(),
            counters_at_start: Counters::snapshot(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn activity(&self) -> Counters {
        Counters::snapshot().since(&self.counters_at_start)
    }
}

pub fn completion_message(elapsed: Duration) -> String {
    format!(
        "Query completed in approximately {:.2} seconds.",
        elapsed.as_secs_f64()
    )
}
