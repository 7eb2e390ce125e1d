//! Rolling-window statistics used to decide whether a metric has settled.
//!
//! A [`RollingStat`] keeps the last N samples of one scalar metric and derives
//! from them an average, a range-to-average variance, a stability flag and the
//! percent change since the last load change. [`RollingStats`] is the fixed
//! set of named windows the control loop maintains for every run.

use std::collections::VecDeque;

use super::numeric::round_to;

/// Sliding window over a single metric.
///
/// The window starts filled with zeros so that the first few samples after
/// start (or after [`RollingStat::reset`]) read as unstable.
#[derive(Debug, Clone)]
pub struct RollingStat {
    capacity: usize,
    precision: u32,
    samples: VecDeque<f64>,
    current: f64,
    average: f64,
    reference: f64,
    increase_pct: f64,
    variance: f64,
    avg_max_ratio: f64,
    new_high: bool,
    highest: f64,
    not_high_count: u32,
    stable: bool,
    stable_count: u32,
    unstable_count: u32,
    no_positive_increase_count: u32,
}

impl RollingStat {
    /// Create a window of `capacity` zero samples averaging to `precision`
    /// decimal places.
    #[must_use]
    pub fn new(capacity: usize, precision: u32) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            precision,
            samples: std::iter::repeat(0.0).take(capacity).collect(),
            current: 0.0,
            average: 0.0,
            reference: 0.0,
            increase_pct: 0.0,
            variance: 0.0,
            avg_max_ratio: 0.0,
            new_high: false,
            highest: 0.0,
            not_high_count: 0,
            stable: false,
            stable_count: 0,
            unstable_count: 0,
            no_positive_increase_count: 0,
        }
    }

    /// Push a sample, evicting the oldest ones so the window never exceeds
    /// its capacity, and recompute average, variance and high-water tracking.
    ///
    /// Returns the new variance.
    pub fn update(&mut self, value: f64) -> f64 {
        self.current = value;
        while self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);

        let sum: f64 = self.samples.iter().sum();
        self.average = round_to(sum / self.samples.len() as f64, self.precision);
        if self.average == 0.0 {
            // Normalises -0.0 so comparisons and output stay clean.
            self.average = 0.0;
        }

        let (min, max) = self
            .samples
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(*v), hi.max(*v))
            });
        self.variance = if self.average == 0.0 {
            0.0
        } else {
            round_to((max - min) / self.average, 3)
        };

        self.track_highest();
        self.variance
    }

    fn track_highest(&mut self) {
        if self.highest < self.average {
            self.highest = self.average;
            self.new_high = true;
            self.not_high_count = 0;
        } else {
            self.new_high = false;
            self.not_high_count += 1;
        }
        self.avg_max_ratio = if self.highest == 0.0 {
            0.0
        } else {
            round_to(self.average / self.highest, 2)
        };
    }

    /// Recompute the change since the last commit, then set the stability
    /// flag against `tolerance`.
    ///
    /// The first call after construction has no reference to compare against
    /// and installs a unit baseline instead of computing a ratio.
    pub fn check_stable(&mut self, tolerance: f64) -> bool {
        self.update_increase();
        if self.variance <= tolerance {
            self.stable = true;
            self.stable_count += 1;
        } else {
            self.stable = false;
            self.stable_count = 0;
            self.unstable_count += 1;
        }
        self.stable
    }

    fn update_increase(&mut self) {
        if self.reference != 0.0 {
            self.increase_pct = round_to((self.average - self.reference) / self.reference * 100.0, 2);
            if self.increase_pct <= 0.0 {
                self.no_positive_increase_count += 1;
            }
        } else {
            self.reference = 1.0;
        }
    }

    /// Re-baseline percent-change tracking on the current average.
    pub fn commit(&mut self) {
        self.reference = self.average;
    }

    /// Refill the window with zeros. Only for control stats; a reported
    /// metric would show a spurious jump afterwards.
    pub fn reset(&mut self) {
        self.samples = std::iter::repeat(0.0).take(self.capacity).collect();
    }

    /// Zero the unstable and non-positive-change streaks.
    pub fn reset_counters(&mut self) {
        self.unstable_count = 0;
        self.no_positive_increase_count = 0;
    }

    /// Change the window size. Extra samples are dropped oldest first.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[must_use]
    pub fn samples(&self) -> &VecDeque<f64> {
        &self.samples
    }

    #[must_use]
    pub fn current(&self) -> f64 {
        self.current
    }

    #[must_use]
    pub fn average(&self) -> f64 {
        self.average
    }

    /// Average recorded by the last [`RollingStat::commit`].
    #[must_use]
    pub fn reference(&self) -> f64 {
        self.reference
    }

    /// Percent change of the average since the last commit.
    #[must_use]
    pub fn increase_pct(&self) -> f64 {
        self.increase_pct
    }

    #[must_use]
    pub fn variance(&self) -> f64 {
        self.variance
    }

    /// Current average divided by the highest average seen so far.
    #[must_use]
    pub fn avg_max_ratio(&self) -> f64 {
        self.avg_max_ratio
    }

    #[must_use]
    pub fn is_new_high(&self) -> bool {
        self.new_high
    }

    #[must_use]
    pub fn highest(&self) -> f64 {
        self.highest
    }

    #[must_use]
    pub fn not_high_count(&self) -> u32 {
        self.not_high_count
    }

    #[must_use]
    pub fn is_stable(&self) -> bool {
        self.stable
    }

    #[must_use]
    pub fn stable_count(&self) -> u32 {
        self.stable_count
    }

    #[must_use]
    pub fn unstable_count(&self) -> u32 {
        self.unstable_count
    }

    #[must_use]
    pub fn no_positive_increase_count(&self) -> u32 {
        self.no_positive_increase_count
    }
}

/// Names of the rolling windows kept for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatKind {
    /// Successful transactions per second.
    Tps,
    /// Average time to first byte.
    Ttfb,
    /// Current load spec count.
    Load,
    /// Established connections per second.
    Cps,
    /// Currently established connections.
    Conns,
    /// Total bandwidth.
    Bw,
    /// Ticks since the last load change; stable once a full window has passed.
    SeekTicks,
}

/// One tick's worth of inputs for the reported windows.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RollingSample {
    pub tps: f64,
    pub ttfb: f64,
    pub load: f64,
    pub cps: f64,
    pub conns: f64,
    pub bw: f64,
}

/// The fixed set of windows maintained by the control loop.
#[derive(Debug, Clone)]
pub struct RollingStats {
    tps: RollingStat,
    ttfb: RollingStat,
    load: RollingStat,
    cps: RollingStat,
    conns: RollingStat,
    bw: RollingStat,
    seek_ticks: RollingStat,
}

impl RollingStats {
    #[must_use]
    pub fn new(sample_size: usize) -> Self {
        Self {
            tps: RollingStat::new(sample_size, 0),
            ttfb: RollingStat::new(sample_size, 1),
            load: RollingStat::new(sample_size, 0),
            cps: RollingStat::new(sample_size, 0),
            conns: RollingStat::new(sample_size, 0),
            bw: RollingStat::new(sample_size, 0),
            seek_ticks: RollingStat::new(sample_size, 1),
        }
    }

    #[must_use]
    pub fn get(&self, kind: StatKind) -> &RollingStat {
        match kind {
            StatKind::Tps => &self.tps,
            StatKind::Ttfb => &self.ttfb,
            StatKind::Load => &self.load,
            StatKind::Cps => &self.cps,
            StatKind::Conns => &self.conns,
            StatKind::Bw => &self.bw,
            StatKind::SeekTicks => &self.seek_ticks,
        }
    }

    pub fn get_mut(&mut self, kind: StatKind) -> &mut RollingStat {
        match kind {
            StatKind::Tps => &mut self.tps,
            StatKind::Ttfb => &mut self.ttfb,
            StatKind::Load => &mut self.load,
            StatKind::Cps => &mut self.cps,
            StatKind::Conns => &mut self.conns,
            StatKind::Bw => &mut self.bw,
            StatKind::SeekTicks => &mut self.seek_ticks,
        }
    }

    /// Feed one tick into every window and check stability. The seek tick
    /// counter is fed a constant 1 and must be perfectly flat to be stable.
    pub fn update(&mut self, sample: &RollingSample, tolerance: f64) {
        let reported = [
            (&mut self.tps, sample.tps),
            (&mut self.ttfb, sample.ttfb),
            (&mut self.load, sample.load),
            (&mut self.cps, sample.cps),
            (&mut self.conns, sample.conns),
            (&mut self.bw, sample.bw),
        ];
        for (stat, value) in reported {
            stat.update(value);
            stat.check_stable(tolerance);
        }
        self.seek_ticks.update(1.0);
        self.seek_ticks.check_stable(0.0);
    }

    /// Re-baseline every reported window after a load change.
    pub fn commit(&mut self) {
        for stat in [
            &mut self.tps,
            &mut self.ttfb,
            &mut self.load,
            &mut self.cps,
            &mut self.conns,
            &mut self.bw,
        ] {
            stat.commit();
        }
    }

    /// Shrink every window (seek ticks included) to `size`.
    pub fn set_capacity(&mut self, size: usize) {
        for stat in [
            &mut self.tps,
            &mut self.ttfb,
            &mut self.load,
            &mut self.cps,
            &mut self.conns,
            &mut self.bw,
            &mut self.seek_ticks,
        ] {
            stat.set_capacity(size);
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.tps.capacity()
    }
}
