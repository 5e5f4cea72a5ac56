//! Statistics engine
//!
//! Named counters and peak-trackers, each rolled over across a shared,
//! configurable set of intervals (e.g. `{1m, 5m, 15m}`; a zero-length
//! interval is a since-start cumulative bucket). Updates are lock-free: a
//! single sentinel value in `current` marks a slot as mid-rollover, and
//! writers racing to roll over resolve it with one compare-and-swap;
//! readers that observe the sentinel spin-wait briefly rather than report
//! a torn value.

pub mod profiler;

use parking_lot::RwLock;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;

/// Marks a slot's `current` field as mid-rollover. Counters and peaks are
/// never negative, so -1 is an unambiguous flag.
const EXPIRING: i64 = -1;

/// Injectable wall clock, so rollover can be exercised deterministically in
/// tests without real sleeps.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

#[derive(Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("system clock before the epoch")
            .as_millis() as i64
    }
}

/// A clock a test can move forward by hand.
#[derive(Default)]
pub struct ManualClock {
    now_ms: AtomicI64,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self { now_ms: AtomicI64::new(start_ms) }
    }

    pub fn advance(&self, by: Duration) {
        self.now_ms.fetch_add(by.as_millis() as i64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

/// One configured rolling window. `duration == Duration::ZERO` marks the
/// since-start cumulative bucket.
#[derive(Debug, Clone)]
pub struct IntervalSpec {
    pub label: String,
    pub duration: Duration,
}

impl IntervalSpec {
    pub fn new(label: impl Into<String>, duration: Duration) -> Self {
        Self { label: label.into(), duration }
    }

    fn is_cumulative(&self) -> bool {
        self.duration.is_zero()
    }

    fn len_ms(&self) -> i64 {
        self.duration.as_millis() as i64
    }
}

fn round_down(now_ms: i64, len_ms: i64) -> i64 {
    if len_ms <= 0 {
        now_ms
    } else {
        (now_ms / len_ms) * len_ms
    }
}

fn spin_wait(attempt: u32) {
    if attempt < 8 {
        std::hint::spin_loop();
    } else {
        std::thread::yield_now();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    Additive,
    Max,
}

fn apply(op: Aggregation, existing: i64, value: i64) -> i64 {
    match op {
        Aggregation::Additive => existing + value,
        Aggregation::Max => existing.max(value),
    }
}

/// One interval's rolling state: `{ interval_start, current, previous }`.
/// `interval_len` itself lives on the shared [`IntervalSpec`] rather than
/// being duplicated per slot.
pub(crate) struct Slot {
    interval_start_ms: AtomicI64,
    current: AtomicI64,
    previous: AtomicI64,
}

impl Slot {
    fn fresh(start_ms: i64) -> Self {
        Self {
            interval_start_ms: AtomicI64::new(start_ms),
            current: AtomicI64::new(0),
            previous: AtomicI64::new(0),
        }
    }

    /// Apply one update, rolling the interval over first if it has elapsed.
    pub(crate) fn update(&self, spec: &IntervalSpec, now_ms: i64, op: Aggregation, value: i64) {
        let mut attempt = 0u32;
        loop {
            let start = self.interval_start_ms.load(Ordering::Acquire);
            let current = self.current.load(Ordering::Acquire);
            if current == EXPIRING {
                spin_wait(attempt);
                attempt += 1;
                continue;
            }

            if spec.is_cumulative() || now_ms - start < spec.len_ms() {
                let updated = apply(op, current, value);
                if self
                    .current
                    .compare_exchange(current, updated, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    return;
                }
                attempt += 1;
                continue;
            }

            // Claim the rollover by publishing the sentinel.
            if self
                .current
                .compare_exchange(current, EXPIRING, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                attempt += 1;
                continue;
            }

            let new_start = round_down(now_ms, spec.len_ms());
            let new_current = apply(op, 0, value);
            self.previous.store(current, Ordering::Release);
            self.interval_start_ms.store(new_start, Ordering::Release);
            self.current.store(new_current, Ordering::Release);
            return;
        }
    }

    /// Not-yet-elapsed reads `previous`, elapsed-once reads `current`,
    /// elapsed-twice-or-more reads zero. Spins past a transient sentinel
    /// instead of reporting a torn value.
    pub(crate) fn read(&self, spec: &IntervalSpec, now_ms: i64) -> i64 {
        if spec.is_cumulative() {
            return self.read_current();
        }
        let start = self.interval_start_ms.load(Ordering::Acquire);
        let len = spec.len_ms();
        let elapsed = now_ms - start;
        if elapsed < len {
            self.previous.load(Ordering::Acquire)
        } else if elapsed < 2 * len {
            self.read_current()
        } else {
            0
        }
    }

    fn read_current(&self) -> i64 {
        loop {
            let current = self.current.load(Ordering::Acquire);
            if current != EXPIRING {
                return current;
            }
            std::hint::spin_loop();
        }
    }
}

struct MetricState {
    slots: Vec<Slot>,
}

impl MetricState {
    fn new(intervals: &[IntervalSpec], now_ms: i64) -> Self {
        let slots = intervals
            .iter()
            .map(|spec| {
                let start = if spec.is_cumulative() { now_ms } else { round_down(now_ms, spec.len_ms()) };
                Slot::fresh(start)
            })
            .collect();
        Self { slots }
    }
}

/// Thread-safe counters and peak trackers, bucketed across a shared set of
/// rolling intervals.
pub struct StatsEngine {
    clock: Arc<dyn Clock>,
    intervals: Vec<IntervalSpec>,
    metrics: RwLock<IndexMap<String, Arc<MetricState>>>,
}

impl StatsEngine {
    pub fn new(intervals: Vec<IntervalSpec>, clock: Arc<dyn Clock>) -> Self {
        Self { clock, intervals, metrics: RwLock::new(IndexMap::new()) }
    }

    fn metric(&self, name: &str) -> Arc<MetricState> {
        if let Some(existing) = self.metrics.read().get(name) {
            return existing.clone();
        }
        let now_ms = self.clock.now_ms();
        self.metrics
            .write()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MetricState::new(&self.intervals, now_ms)))
            .clone()
    }

    fn interval_index(&self, label: &str) -> Option<usize> {
        self.intervals.iter().position(|i| i.label == label)
    }

    pub fn increase(&self, name: &str, value: i64) {
        let state = self.metric(name);
        let now_ms = self.clock.now_ms();
        for (slot, spec) in state.slots.iter().zip(&self.intervals) {
            slot.update(spec, now_ms, Aggregation::Additive, value);
        }
    }

    pub fn increment(&self, name: &str) {
        self.increase(name, 1);
    }

    pub fn peak(&self, name: &str, value: i64) {
        let state = self.metric(name);
        let now_ms = self.clock.now_ms();
        for (slot, spec) in state.slots.iter().zip(&self.intervals) {
            slot.update(spec, now_ms, Aggregation::Max, value);
        }
    }

    /// Reads a metric under the named interval; `None` if either is unknown.
    pub fn get(&self, name: &str, interval_label: &str) -> Option<i64> {
        let index = self.interval_index(interval_label)?;
        let now_ms = self.clock.now_ms();
        let metrics = self.metrics.read();
        let state = metrics.get(name)?;
        Some(state.slots[index].read(&self.intervals[index], now_ms))
    }

    /// Atomically replaces every state for `name` with a blank state
    /// anchored at "now".
    pub fn reset(&self, name: &str) {
        let now_ms = self.clock.now_ms();
        let fresh = Arc::new(MetricState::new(&self.intervals, now_ms));
        self.metrics.write().insert(name.to_string(), fresh);
    }
}
