//! The five instruments a `MetricsRegistry` hands out.

use super::{Error, GaugeValue, Measurement, Metric, Rates, Snapshot, Summary};
use quantiles::ckms::CKMS;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

const QUANTILE_ERROR: f64 = 0.001;
const TICK_INTERVAL_SECS: u64 = 5;

/// An atomically updated integer.
#[derive(Debug, Default)]
pub struct Counter {
    count: AtomicI64,
}

impl Counter {
    /// Create a counter starting at zero.
    pub fn new() -> Counter {
        Counter::default()
    }

    /// Increment by one.
    pub fn inc(&self) {
        self.inc_by(1)
    }

    /// Increment by `n`.
    pub fn inc_by(&self, n: i64) {
        self.count.fetch_add(n, Ordering::Relaxed);
    }

    /// Decrement by one.
    pub fn dec(&self) {
        self.dec_by(1)
    }

    /// Decrement by `n`.
    pub fn dec_by(&self, n: i64) {
        self.count.fetch_sub(n, Ordering::Relaxed);
    }

    /// The current count.
    pub fn count(&self) -> i64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Reset to zero.
    pub fn clear(&self) {
        self.count.store(0, Ordering::Relaxed);
    }
}

impl Metric for Counter {
    fn measure(&self) -> Result<Measurement, Error> {
        Ok(Measurement::Counter {
            count: self.count(),
        })
    }
}

/// A value computed on demand.
///
/// The closure is called once per measurement, so a gauge always reports
/// what is true at the moment of the poll.
pub struct Gauge {
    read: Box<dyn Fn() -> GaugeValue + Send + Sync>,
}

impl Gauge {
    /// Wrap a read function.
    pub fn new<F>(read: F) -> Gauge
    where
        F: Fn() -> GaugeValue + Send + Sync + 'static,
    {
        Gauge {
            read: Box::new(read),
        }
    }

    /// Call the read function.
    pub fn value(&self) -> GaugeValue {
        (self.read)()
    }
}

impl Metric for Gauge {
    fn measure(&self) -> Result<Measurement, Error> {
        Ok(Measurement::Gauge(self.value()))
    }
}

struct Distribution {
    count: u64,
    min: f64,
    max: f64,
    mean: f64,
    m2: f64,
    ckms: CKMS<f64>,
}

impl Distribution {
    fn new() -> Distribution {
        Distribution {
            count: 0,
            min: 0.0,
            max: 0.0,
            mean: 0.0,
            m2: 0.0,
            ckms: CKMS::new(QUANTILE_ERROR),
        }
    }

    fn insert(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            if value < self.min {
                self.min = value;
            }
            if value > self.max {
                self.max = value;
            }
        }
        // Welford's online variance
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / (self.count as f64);
        self.m2 += delta * (value - self.mean);
        self.ckms.insert(value);
    }

    fn summary(&self) -> Summary {
        if self.count == 0 {
            return Summary::default();
        }
        let variance = if self.count > 1 {
            self.m2 / ((self.count - 1) as f64)
        } else {
            0.0
        };
        Summary {
            min: self.min,
            max: self.max,
            mean: self.mean,
            std_dev: variance.sqrt(),
        }
    }

    fn query(&self, q: f64) -> f64 {
        self.ckms.query(q).map(|(_, v)| v).unwrap_or(0.0)
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            median: self.query(0.5),
            p75: self.query(0.75),
            p95: self.query(0.95),
            p98: self.query(0.98),
            p99: self.query(0.99),
            p999: self.query(0.999),
        }
    }
}

/// A distribution of observed values.
///
/// Min, max, mean and standard deviation are exact. Percentiles are
/// estimated with a CKMS summary.
pub struct Histogram {
    inner: Mutex<Distribution>,
}

impl Default for Histogram {
    fn default() -> Histogram {
        Histogram::new()
    }
}

impl Histogram {
    /// Create an empty histogram.
    pub fn new() -> Histogram {
        Histogram {
            inner: Mutex::new(Distribution::new()),
        }
    }

    /// Record one observation. NaN and infinities are ignored.
    pub fn update(&self, value: f64) {
        if !value.is_finite() {
            return;
        }
        if let Ok(mut inner) = self.inner.lock() {
            inner.insert(value);
        }
    }

    /// Total number of observations.
    pub fn count(&self) -> u64 {
        self.inner.lock().map(|i| i.count).unwrap_or(0)
    }

    fn read(&self) -> Result<(Summary, Snapshot), Error> {
        match self.inner.lock() {
            Ok(inner) => Ok((inner.summary(), inner.snapshot())),
            Err(_) => Err(Error::Unavailable("histogram lock poisoned".into())),
        }
    }
}

impl Metric for Histogram {
    fn measure(&self) -> Result<Measurement, Error> {
        let (summary, snapshot) = self.read()?;
        Ok(Measurement::Histogram { summary, snapshot })
    }
}

/// Exponentially weighted moving average, ticked every five seconds.
struct Ewma {
    alpha: f64,
    rate: f64,
    uncounted: i64,
    initialized: bool,
}

impl Ewma {
    fn minutes(minutes: f64) -> Ewma {
        let interval = TICK_INTERVAL_SECS as f64;
        Ewma {
            alpha: 1.0 - (-interval / 60.0 / minutes).exp(),
            rate: 0.0,
            uncounted: 0,
            initialized: false,
        }
    }

    fn update(&mut self, n: i64) {
        self.uncounted += n;
    }

    fn tick(&mut self) {
        let instant_rate = (self.uncounted as f64) / (TICK_INTERVAL_SECS as f64);
        self.uncounted = 0;
        if self.initialized {
            self.rate += self.alpha * (instant_rate - self.rate);
        } else {
            self.rate = instant_rate;
            self.initialized = true;
        }
    }
}

struct MeterState {
    count: i64,
    start: Instant,
    last_tick: Instant,
    m1: Ewma,
    m5: Ewma,
    m15: Ewma,
}

impl MeterState {
    fn new(now: Instant) -> MeterState {
        MeterState {
            count: 0,
            start: now,
            last_tick: now,
            m1: Ewma::minutes(1.0),
            m5: Ewma::minutes(5.0),
            m15: Ewma::minutes(15.0),
        }
    }

    fn tick_if_necessary(&mut self, now: Instant) {
        let interval = Duration::from_secs(TICK_INTERVAL_SECS);
        let age = now.duration_since(self.last_tick);
        if age > interval {
            let ticks = age.as_secs() / TICK_INTERVAL_SECS;
            self.last_tick += interval * (ticks as u32);
            for _ in 0..ticks {
                self.m1.tick();
                self.m5.tick();
                self.m15.tick();
            }
        }
    }

    fn mark(&mut self, n: i64, now: Instant) {
        self.tick_if_necessary(now);
        self.count += n;
        self.m1.update(n);
        self.m5.update(n);
        self.m15.update(n);
    }

    fn rates(&mut self, now: Instant) -> Rates {
        self.tick_if_necessary(now);
        let elapsed = now.duration_since(self.start);
        let secs = elapsed.as_secs() as f64 + f64::from(elapsed.subsec_nanos()) / 1e9;
        let mean_rate = if self.count == 0 || secs == 0.0 {
            0.0
        } else {
            (self.count as f64) / secs
        };
        Rates {
            count: self.count,
            mean_rate,
            one_minute_rate: self.m1.rate,
            five_minute_rate: self.m5.rate,
            fifteen_minute_rate: self.m15.rate,
        }
    }
}

/// Measures the rate at which events occur.
pub struct Meter {
    inner: Mutex<MeterState>,
}

impl Default for Meter {
    fn default() -> Meter {
        Meter::new()
    }
}

impl Meter {
    /// Create a meter whose lifetime starts now.
    pub fn new() -> Meter {
        Meter {
            inner: Mutex::new(MeterState::new(Instant::now())),
        }
    }

    /// Mark one event.
    pub fn mark(&self) {
        self.mark_n(1)
    }

    /// Mark `n` events.
    pub fn mark_n(&self, n: i64) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.mark(n, Instant::now());
        }
    }

    /// Total events marked.
    pub fn count(&self) -> i64 {
        self.inner.lock().map(|i| i.count).unwrap_or(0)
    }

    fn rates(&self) -> Result<Rates, Error> {
        match self.inner.lock() {
            Ok(mut inner) => Ok(inner.rates(Instant::now())),
            Err(_) => Err(Error::Unavailable("meter lock poisoned".into())),
        }
    }
}

impl Metric for Meter {
    fn measure(&self) -> Result<Measurement, Error> {
        Ok(Measurement::Meter(self.rates()?))
    }
}

/// A meter of events and a histogram of how long they took, in milliseconds.
#[derive(Default)]
pub struct Timer {
    meter: Meter,
    durations: Histogram,
}

impl Timer {
    /// Create an empty timer.
    pub fn new() -> Timer {
        Timer::default()
    }

    /// Record one event of the given duration.
    pub fn update(&self, duration: Duration) {
        let ms = duration.as_secs() as f64 * 1_000.0
            + f64::from(duration.subsec_nanos()) / 1_000_000.0;
        self.durations.update(ms);
        self.meter.mark();
    }

    /// Run `f`, recording how long it took.
    pub fn time<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let start = Instant::now();
        let res = f();
        self.update(start.elapsed());
        res
    }

    /// Total events recorded.
    pub fn count(&self) -> i64 {
        self.meter.count()
    }
}

impl Metric for Timer {
    fn measure(&self) -> Result<Measurement, Error> {
        let rates = self.meter.rates()?;
        let (summary, snapshot) = self.durations.read()?;
        Ok(Measurement::Timer {
            rates,
            summary,
            snapshot,
        })
    }
}
