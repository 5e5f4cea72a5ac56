//! Profiler engine
//!
//! Like the statistics engine, but each update contributes a *duration*
//! rather than a bare value, and a rolling bucket tracks `{samples, elapsed,
//! min, max}` instead of a single aggregate. Rollover and read semantics
//! match it exactly: readers see `previous` until the first rollover, then
//! `current`, then zero. Per-second/minute/hour averages are derived
//! at read time from `elapsed`, `samples`, and the interval's length;
//! nothing is pre-computed on the write path.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use indexmap::IndexMap;

use super::{round_down, spin_wait, Clock, IntervalSpec};

const EXPIRING: i64 = -1;

/// One interval's rolling profile, plus the frozen snapshot from before
/// the last rollover that the three-way read rule needs.
struct Cell {
    interval_start_ms: AtomicI64,
    samples: AtomicI64,
    elapsed_ns: AtomicI64,
    min_ns: AtomicI64,
    max_ns: AtomicI64,
    prev_samples: AtomicI64,
    prev_elapsed_ns: AtomicI64,
    prev_min_ns: AtomicI64,
    prev_max_ns: AtomicI64,
}

impl Cell {
    fn fresh(start_ms: i64) -> Self {
        Self {
            interval_start_ms: AtomicI64::new(start_ms),
            samples: AtomicI64::new(0),
            elapsed_ns: AtomicI64::new(0),
            min_ns: AtomicI64::new(i64::MAX),
            max_ns: AtomicI64::new(0),
            prev_samples: AtomicI64::new(0),
            prev_elapsed_ns: AtomicI64::new(0),
            prev_min_ns: AtomicI64::new(i64::MAX),
            prev_max_ns: AtomicI64::new(0),
        }
    }

    fn record(&self, spec: &IntervalSpec, now_ms: i64, sample_ns: i64) {
        let mut attempt = 0u32;
        loop {
            let start = self.interval_start_ms.load(Ordering::Acquire);
            let samples = self.samples.load(Ordering::Acquire);
            if samples == EXPIRING {
                spin_wait(attempt);
                attempt += 1;
                continue;
            }

            if spec.is_cumulative() || now_ms - start < spec.len_ms() {
                if self
                    .samples
                    .compare_exchange(samples, samples + 1, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
                {
                    attempt += 1;
                    continue;
                }
                self.elapsed_ns.fetch_add(sample_ns, Ordering::AcqRel);
                fetch_min(&self.min_ns, sample_ns);
                fetch_max(&self.max_ns, sample_ns);
                return;
            }

            // Claim the rollover. Once claimed, only this thread touches
            // elapsed/min/max until it republishes `samples`, so the reads
            // below are race-free against other writers (they observe the
            // sentinel and spin).
            if self
                .samples
                .compare_exchange(samples, EXPIRING, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                attempt += 1;
                continue;
            }

            self.prev_samples.store(samples, Ordering::Relaxed);
            self.prev_elapsed_ns.store(self.elapsed_ns.load(Ordering::Relaxed), Ordering::Relaxed);
            self.prev_min_ns.store(self.min_ns.load(Ordering::Relaxed), Ordering::Relaxed);
            self.prev_max_ns.store(self.max_ns.load(Ordering::Relaxed), Ordering::Relaxed);

            let new_start = round_down(now_ms, spec.len_ms());
            self.interval_start_ms.store(new_start, Ordering::Release);
            self.elapsed_ns.store(sample_ns, Ordering::Release);
            self.min_ns.store(sample_ns, Ordering::Release);
            self.max_ns.store(sample_ns, Ordering::Release);
            self.samples.store(1, Ordering::Release);
            return;
        }
    }

    /// Same not-yet-elapsed/elapsed-once/elapsed-twice rule as the counter
    /// slots, reused here for the richer per-cell record.
    fn read(&self, spec: &IntervalSpec, now_ms: i64) -> ProfileSample {
        if spec.is_cumulative() {
            return self.current_snapshot();
        }
        let start = self.interval_start_ms.load(Ordering::Acquire);
        let len = spec.len_ms();
        let elapsed = now_ms - start;
        if elapsed < len {
            self.previous_snapshot()
        } else if elapsed < 2 * len {
            self.current_snapshot()
        } else {
            ProfileSample { samples: 0, elapsed: Duration::ZERO, min: Duration::ZERO, max: Duration::ZERO }
        }
    }

    fn current_snapshot(&self) -> ProfileSample {
        loop {
            let samples = self.samples.load(Ordering::Acquire);
            if samples == 0 {
                return ProfileSample { samples: 0, elapsed: Duration::ZERO, min: Duration::ZERO, max: Duration::ZERO };
            }
            if samples != EXPIRING {
                return ProfileSample {
                    samples: samples as u64,
                    elapsed: Duration::from_nanos(self.elapsed_ns.load(Ordering::Acquire).max(0) as u64),
                    min: Duration::from_nanos(self.min_ns.load(Ordering::Acquire).max(0) as u64),
                    max: Duration::from_nanos(self.max_ns.load(Ordering::Acquire).max(0) as u64),
                };
            }
            std::hint::spin_loop();
        }
    }

    fn previous_snapshot(&self) -> ProfileSample {
        let samples = self.prev_samples.load(Ordering::Acquire).max(0) as u64;
        if samples == 0 {
            return ProfileSample { samples: 0, elapsed: Duration::ZERO, min: Duration::ZERO, max: Duration::ZERO };
        }
        ProfileSample {
            samples,
            elapsed: Duration::from_nanos(self.prev_elapsed_ns.load(Ordering::Acquire).max(0) as u64),
            min: Duration::from_nanos(self.prev_min_ns.load(Ordering::Acquire).max(0) as u64),
            max: Duration::from_nanos(self.prev_max_ns.load(Ordering::Acquire).max(0) as u64),
        }
    }
}

/// `i64::MAX` marks "unset" rather than `0`, since `0` is itself a valid
/// minimum duration — unlike `fetch_max`, where `0` safely serves as the
/// floor because a max only ever grows.
fn fetch_min(cell: &AtomicI64, value: i64) {
    let mut current = cell.load(Ordering::Acquire);
    loop {
        if current != i64::MAX && current <= value {
            return;
        }
        match cell.compare_exchange(current, value, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => return,
            Err(observed) => current = observed,
        }
    }
}

fn fetch_max(cell: &AtomicI64, value: i64) {
    let mut current = cell.load(Ordering::Acquire);
    loop {
        if current >= value {
            return;
        }
        match cell.compare_exchange(current, value, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => return,
            Err(observed) => current = observed,
        }
    }
}

/// Raw rolling sample for one interval, used to derive averages at read time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileSample {
    pub samples: u64,
    pub elapsed: Duration,
    pub min: Duration,
    pub max: Duration,
}

impl ProfileSample {
    pub fn average(&self) -> Duration {
        if self.samples == 0 {
            Duration::ZERO
        } else {
            self.elapsed / self.samples as u32
        }
    }

    /// Samples per second implied by this window.
    pub fn throughput_per_sec(&self, window: Duration) -> f64 {
        if window.is_zero() {
            0.0
        } else {
            self.samples as f64 / window.as_secs_f64()
        }
    }
}

struct Section {
    cells: Vec<Cell>,
}

impl Section {
    fn new(intervals: &[IntervalSpec], now_ms: i64) -> Self {
        let cells = intervals
            .iter()
            .map(|spec| {
                let start = if spec.is_cumulative() { now_ms } else { round_down(now_ms, spec.len_ms()) };
                Cell::fresh(start)
            })
            .collect();
        Self { cells }
    }
}

/// Named durations, bucketed across the same rolling intervals the
/// statistics engine uses.
pub struct Profiler {
    clock: Arc<dyn Clock>,
    intervals: Vec<IntervalSpec>,
    sections: RwLock<IndexMap<String, Arc<Section>>>,
}

impl Profiler {
    pub fn new(intervals: Vec<IntervalSpec>, clock: Arc<dyn Clock>) -> Self {
        Self { clock, intervals, sections: RwLock::new(IndexMap::new()) }
    }

    fn section(&self, name: &str) -> Arc<Section> {
        if let Some(existing) = self.sections.read().get(name) {
            return existing.clone();
        }
        let now_ms = self.clock.now_ms();
        self.sections
            .write()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Section::new(&self.intervals, now_ms)))
            .clone()
    }

    /// Begins a scoped measurement. The returned guard records its elapsed
    /// time into every configured interval on drop, including on an
    /// unwinding panic.
    pub fn begin(self: &Arc<Self>, name: &str) -> ProfileInstance {
        ProfileInstance { profiler: self.clone(), name: name.to_string(), started: Instant::now() }
    }

    fn record(&self, name: &str, sample: Duration) {
        let section = self.section(name);
        let now_ms = self.clock.now_ms();
        let sample_ns = sample.as_nanos().min(i64::MAX as u128) as i64;
        for (cell, spec) in section.cells.iter().zip(&self.intervals) {
            cell.record(spec, now_ms, sample_ns);
        }
    }

    fn interval_index(&self, label: &str) -> Option<usize> {
        self.intervals.iter().position(|i| i.label == label)
    }

    pub fn get(&self, name: &str, interval_label: &str) -> Option<ProfileSample> {
        let index = self.interval_index(interval_label)?;
        let now_ms = self.clock.now_ms();
        let sections = self.sections.read();
        let section = sections.get(name)?;
        Some(section.cells[index].read(&self.intervals[index], now_ms))
    }

    pub fn reset(&self, name: &str) {
        let now_ms = self.clock.now_ms();
        let fresh = Arc::new(Section::new(&self.intervals, now_ms));
        self.sections.write().insert(name.to_string(), fresh);
    }
}

/// RAII guard returned by [`Profiler::begin`]. Dropping it — by falling out
/// of scope normally, returning early, or unwinding from a panic — records
/// the elapsed time once.
pub struct ProfileInstance {
    profiler: Arc<Profiler>,
    name: String,
    started: Instant,
}

impl Drop for ProfileInstance {
    fn drop(&mut self) {
        self.profiler.record(&self.name, self.started.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::ManualClock;

    fn profiler() -> (Arc<ManualClock>, Arc<Profiler>) {
        let clock = Arc::new(ManualClock::new(0));
        let intervals = vec![IntervalSpec::new("1s", Duration::from_secs(1))];
        (clock.clone(), Arc::new(Profiler::new(intervals, clock)))
    }

    #[test]
    fn records_on_normal_drop_but_is_not_visible_before_rollover() {
        let (_, profiler) = profiler();
        {
            let _section = profiler.begin("Query");
        }
        // still within the first interval: reads `previous`, blank until
        // the first rollover, matching the statistics engine's rule.
        assert_eq!(profiler.get("Query", "1s").unwrap().samples, 0);
    }

    #[test]
    fn records_on_panicking_drop() {
        let (clock, profiler) = profiler();
        let caught = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _section = profiler.begin("Query");
            panic!("boom");
        }));
        assert!(caught.is_err());
        // no further writes: advancing the clock alone shifts the read
        // into the "current" bucket, same as the statistics engine.
        clock.advance(Duration::from_millis(1100));
        assert_eq!(profiler.get("Query", "1s").unwrap().samples, 1);
    }

    #[test]
    fn average_derives_from_samples_and_elapsed() {
        let sample = ProfileSample {
            samples: 4,
            elapsed: Duration::from_millis(40),
            min: Duration::from_millis(5),
            max: Duration::from_millis(20),
        };
        assert_eq!(sample.average(), Duration::from_millis(10));
    }

    #[test]
    fn min_and_max_track_extremes_within_a_window() {
        let (clock, profiler) = profiler();
        profiler.record("Work", Duration::from_millis(5));
        profiler.record("Work", Duration::from_millis(50));
        profiler.record("Work", Duration::from_millis(20));
        // all three landed in the same window; advancing (without writing
        // again) moves the read from "previous" to "current".
        clock.advance(Duration::from_millis(1100));
        let sample = profiler.get("Work", "1s").unwrap();
        assert_eq!(sample.min, Duration::from_millis(5));
        assert_eq!(sample.max, Duration::from_millis(50));
        assert_eq!(sample.samples, 3);
    }

    #[test]
    fn reset_blanks_the_section() {
        let (_, profiler) = profiler();
        profiler.record("Work", Duration::from_millis(5));
        profiler.reset("Work");
        assert_eq!(profiler.get("Work", "1s").unwrap().samples, 0);
    }

    #[test]
    fn zero_duration_sample_is_not_mistaken_for_unset() {
        let (clock, profiler) = profiler();
        profiler.record("Work", Duration::from_nanos(0));
        profiler.record("Work", Duration::from_millis(5));
        clock.advance(Duration::from_millis(1100));
        let sample = profiler.get("Work", "1s").unwrap();
        assert_eq!(sample.min, Duration::ZERO);
        assert_eq!(sample.max, Duration::from_millis(5));
    }
}
