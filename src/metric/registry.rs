//! Registries hold metrics and hand out per-cycle snapshots of them.

use super::instruments::{Counter, Gauge, Histogram, Meter, Timer};
use super::{GaugeValue, Metric, MetricName};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

/// A snapshot of a registry: group key to the metrics in that group, both
/// levels ordered.
pub type Grouped = BTreeMap<String, BTreeMap<MetricName, Arc<dyn Metric>>>;

/// Decides which metrics are eligible for export.
pub trait MetricPredicate: Send + Sync {
    /// True if the metric should be exported.
    fn matches(&self, name: &MetricName, metric: &dyn Metric) -> bool;
}

impl<F> MetricPredicate for F
where
    F: Fn(&MetricName, &dyn Metric) -> bool + Send + Sync,
{
    fn matches(&self, name: &MetricName, metric: &dyn Metric) -> bool {
        self(name, metric)
    }
}

/// Accepts every metric.
#[derive(Debug, Default, Clone, Copy)]
pub struct All;

impl MetricPredicate for All {
    fn matches(&self, _: &MetricName, _: &dyn Metric) -> bool {
        true
    }
}

/// Anything that can enumerate metrics for export.
pub trait Registry: Send + Sync {
    /// Every metric passing `predicate`, grouped by `MetricName::group_key`.
    ///
    /// The returned map is a snapshot: registrations made after this call
    /// returns do not show up in it.
    fn grouped_metrics(&self, predicate: &dyn MetricPredicate) -> Grouped;
}

/// An in-memory registry.
///
/// Instruments are created on first request and shared on every request
/// after that. Asking for an existing name with a different instrument type
/// replaces the old registration.
#[derive(Default)]
pub struct MetricsRegistry {
    metrics: RwLock<BTreeMap<MetricName, Registered>>,
}

#[derive(Clone)]
enum Registered {
    Counter(Arc<Counter>),
    Gauge(Arc<Gauge>),
    Histogram(Arc<Histogram>),
    Meter(Arc<Meter>),
    Timer(Arc<Timer>),
}

impl Registered {
    fn as_metric(&self) -> Arc<dyn Metric> {
        match *self {
            Registered::Counter(ref m) => m.clone() as Arc<dyn Metric>,
            Registered::Gauge(ref m) => m.clone() as Arc<dyn Metric>,
            Registered::Histogram(ref m) => m.clone() as Arc<dyn Metric>,
            Registered::Meter(ref m) => m.clone() as Arc<dyn Metric>,
            Registered::Timer(ref m) => m.clone() as Arc<dyn Metric>,
        }
    }
}

macro_rules! get_or_create {
    ($fn_name:ident, $variant:ident, $ty:ty, $doc:expr) => {
        #[doc = $doc]
        pub fn $fn_name(&self, name: MetricName) -> Arc<$ty> {
            if let Ok(metrics) = self.metrics.read() {
                if let Some(&Registered::$variant(ref m)) = metrics.get(&name) {
                    return m.clone();
                }
            }
            let fresh = Arc::new(<$ty>::default());
            match self.metrics.write() {
                Ok(mut metrics) => {
                    if let Some(&Registered::$variant(ref m)) = metrics.get(&name) {
                        return m.clone();
                    }
                    metrics.insert(name, Registered::$variant(fresh.clone()));
                }
                Err(_) => {
                    error!("metrics registry lock poisoned, {} not registered", name);
                }
            }
            fresh
        }
    };
}

impl MetricsRegistry {
    /// Create an empty registry.
    pub fn new() -> MetricsRegistry {
        MetricsRegistry::default()
    }

    get_or_create!(counter, Counter, Counter, "Get or create the counter `name`.");
    get_or_create!(
        histogram,
        Histogram,
        Histogram,
        "Get or create the histogram `name`."
    );
    get_or_create!(meter, Meter, Meter, "Get or create the meter `name`.");
    get_or_create!(timer, Timer, Timer, "Get or create the timer `name`.");

    /// Register a gauge under `name`, replacing any existing registration.
    pub fn gauge<F>(&self, name: MetricName, read: F) -> Arc<Gauge>
    where
        F: Fn() -> GaugeValue + Send + Sync + 'static,
    {
        let gauge = Arc::new(Gauge::new(read));
        match self.metrics.write() {
            Ok(mut metrics) => {
                metrics.insert(name, Registered::Gauge(gauge.clone()));
            }
            Err(_) => {
                error!("metrics registry lock poisoned, {} not registered", name);
            }
        }
        gauge
    }

    /// Remove the metric registered as `name`. Returns true if there was one.
    pub fn remove(&self, name: &MetricName) -> bool {
        match self.metrics.write() {
            Ok(mut metrics) => metrics.remove(name).is_some(),
            Err(_) => false,
        }
    }

    /// Total registered metrics.
    pub fn len(&self) -> usize {
        self.metrics.read().map(|m| m.len()).unwrap_or(0)
    }

    /// True if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Registry for MetricsRegistry {
    fn grouped_metrics(&self, predicate: &dyn MetricPredicate) -> Grouped {
        let registered: Vec<(MetricName, Arc<dyn Metric>)> = match self.metrics.read() {
            Ok(metrics) => metrics
                .iter()
                .map(|(name, reg)| (name.clone(), reg.as_metric()))
                .collect(),
            Err(_) => {
                error!("metrics registry lock poisoned, reporting nothing");
                return Grouped::new();
            }
        };
        // The predicate runs outside of the lock; it is user code.
        let mut grouped = Grouped::new();
        for (name, metric) in registered {
            if predicate.matches(&name, &*metric) {
                grouped
                    .entry(name.group_key())
                    .or_insert_with(BTreeMap::new)
                    .insert(name, metric);
            }
        }
        grouped
    }
}
