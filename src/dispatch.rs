//! Measurement to series.
//!
//! `Dispatcher::dispatch` is the heart of the reporter. Given one metric's
//! `Measurement` it decides which series to emit:
//!
//!   - COUNTER   -> one counter series, the raw count, no suffix
//!   - GAUGE     -> one gauge series if the value is numeric, else nothing
//!   - HISTOGRAM -> one gauge series per enabled summary and percentile
//!                  expansion
//!   - METER     -> a `count` counter series if enabled, one gauge series per
//!                  enabled rate expansion
//!   - TIMER     -> the union of METER and HISTOGRAM
//!
//! Dispatch does no I/O. It returns the series and the reporter decides how
//! they reach the transport.

use crate::expansion::{Expansion, Expansions};
use crate::formatter::{is_skipped, MetricNameFormatter};
use crate::metric::{GaugeValue, Measurement, MetricName, Number, Rates, Snapshot, Summary};
use crate::series::{Series, SeriesType};
use crate::tags::TagComposer;
use std::sync::Arc;

/// Turns measurements into series.
///
/// A dispatcher holds only configuration. It is safe to share between
/// concurrently running cycles.
#[derive(Clone)]
pub struct Dispatcher {
    host: Option<String>,
    expansions: Expansions,
    formatter: Arc<dyn MetricNameFormatter>,
    tags: TagComposer,
}

impl Dispatcher {
    /// Create a dispatcher.
    pub fn new(
        host: Option<String>,
        expansions: Expansions,
        formatter: Arc<dyn MetricNameFormatter>,
        tags: TagComposer,
    ) -> Dispatcher {
        Dispatcher {
            host,
            expansions,
            formatter,
            tags,
        }
    }

    /// Every series `measurement` contributes this cycle.
    pub fn dispatch(&self, name: &MetricName, measurement: &Measurement, epoch: i64) -> Vec<Series> {
        let mut out = Vec::new();
        match *measurement {
            Measurement::Counter { count } => {
                self.push(&mut out, name, &[], SeriesType::Counter, Number::Integer(count), epoch);
            }
            Measurement::Gauge(ref value) => match *value {
                GaugeValue::Number(n) => {
                    self.push(&mut out, name, &[], SeriesType::Gauge, n, epoch);
                }
                GaugeValue::Opaque(_) => {
                    debug!("Gauge {} had non Number value, skipped", name);
                }
            },
            Measurement::Histogram {
                ref summary,
                ref snapshot,
            } => {
                self.summarizable(&mut out, name, summary, epoch);
                self.sampling(&mut out, name, snapshot, epoch);
            }
            Measurement::Meter(ref rates) => {
                self.metered(&mut out, name, rates, epoch);
            }
            Measurement::Timer {
                ref rates,
                ref summary,
                ref snapshot,
            } => {
                self.metered(&mut out, name, rates, epoch);
                self.summarizable(&mut out, name, summary, epoch);
                self.sampling(&mut out, name, snapshot, epoch);
            }
        }
        out
    }

    fn metered(&self, out: &mut Vec<Series>, name: &MetricName, rates: &Rates, epoch: i64) {
        if self.expansions.contains(Expansion::Count) {
            self.push(
                out,
                name,
                &[Expansion::Count.as_str()],
                SeriesType::Counter,
                Number::Integer(rates.count),
                epoch,
            );
        }
        self.maybe_expand(out, Expansion::RateMean, name, rates.mean_rate, epoch);
        self.maybe_expand(out, Expansion::Rate1Minute, name, rates.one_minute_rate, epoch);
        self.maybe_expand(out, Expansion::Rate5Minute, name, rates.five_minute_rate, epoch);
        self.maybe_expand(out, Expansion::Rate15Minute, name, rates.fifteen_minute_rate, epoch);
    }

    fn summarizable(&self, out: &mut Vec<Series>, name: &MetricName, summary: &Summary, epoch: i64) {
        self.maybe_expand(out, Expansion::Min, name, summary.min, epoch);
        self.maybe_expand(out, Expansion::Max, name, summary.max, epoch);
        self.maybe_expand(out, Expansion::Mean, name, summary.mean, epoch);
        self.maybe_expand(out, Expansion::StdDev, name, summary.std_dev, epoch);
    }

    fn sampling(&self, out: &mut Vec<Series>, name: &MetricName, snapshot: &Snapshot, epoch: i64) {
        self.maybe_expand(out, Expansion::Median, name, snapshot.median, epoch);
        self.maybe_expand(out, Expansion::P75, name, snapshot.p75, epoch);
        self.maybe_expand(out, Expansion::P95, name, snapshot.p95, epoch);
        self.maybe_expand(out, Expansion::P98, name, snapshot.p98, epoch);
        self.maybe_expand(out, Expansion::P99, name, snapshot.p99, epoch);
        self.maybe_expand(out, Expansion::P999, name, snapshot.p999, epoch);
    }

    #[inline]
    fn maybe_expand(
        &self,
        out: &mut Vec<Series>,
        expansion: Expansion,
        name: &MetricName,
        value: f64,
        epoch: i64,
    ) {
        if self.expansions.contains(expansion) {
            self.push(
                out,
                name,
                &[expansion.as_str()],
                SeriesType::Gauge,
                Number::Float(value),
                epoch,
            );
        }
    }

    fn push(
        &self,
        out: &mut Vec<Series>,
        name: &MetricName,
        path: &[&str],
        kind: SeriesType,
        value: Number,
        epoch: i64,
    ) {
        if !is_finite(value) {
            debug!("{} {:?} had non-finite value {}, skipped", name, path, value);
            return;
        }
        let formatted = self.formatter.format(name, path);
        if is_skipped(&formatted) {
            return;
        }
        out.push(Series::new(
            formatted,
            kind,
            value,
            epoch,
            self.host.clone(),
            self.tags.tags(name),
        ));
    }

    /// A series that bypasses the name formatter and the tag composer. Host
    /// telemetry goes through here. The skip sentinel is still honored.
    pub fn raw(
        &self,
        name: &str,
        tags: Vec<String>,
        kind: SeriesType,
        value: Number,
        epoch: i64,
    ) -> Option<Series> {
        if is_skipped(name) {
            None
        } else if !is_finite(value) {
            debug!("{} had non-finite value {}, skipped", name, value);
            None
        } else {
            Some(Series::new(name, kind, value, epoch, self.host.clone(), tags))
        }
    }
}

/// NaN and infinities have no JSON representation.
fn is_finite(value: Number) -> bool {
    match value {
        Number::Integer(_) => true,
        Number::Float(f) => f.is_finite(),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::expansion::ALL;
    use crate::formatter::{DefaultMetricNameFormatter, SKIP_NAME};
    use quickcheck::{Arbitrary, Gen, QuickCheck, TestResult};

    fn dispatcher(expansions: Expansions) -> Dispatcher {
        Dispatcher::new(
            None,
            expansions,
            Arc::new(DefaultMetricNameFormatter),
            TagComposer::default(),
        )
    }

    fn name() -> MetricName {
        MetricName::new("g", "T", "n")
    }

    fn rates() -> Rates {
        Rates {
            count: 7,
            mean_rate: 1.0,
            one_minute_rate: 2.0,
            five_minute_rate: 3.0,
            fifteen_minute_rate: 4.0,
        }
    }

    fn summary() -> Summary {
        Summary {
            min: 1.0,
            max: 9.0,
            mean: 5.0,
            std_dev: 2.0,
        }
    }

    fn snapshot() -> Snapshot {
        Snapshot {
            median: 5.0,
            p75: 7.0,
            p95: 8.0,
            p98: 8.5,
            p99: 8.9,
            p999: 9.0,
        }
    }

    #[derive(Clone, Debug)]
    enum Kind {
        Counter,
        Gauge,
        Opaque,
        Histogram,
        Meter,
        Timer,
    }

    impl Arbitrary for Kind {
        fn arbitrary(g: &mut Gen) -> Kind {
            g.choose(&[
                Kind::Counter,
                Kind::Gauge,
                Kind::Opaque,
                Kind::Histogram,
                Kind::Meter,
                Kind::Timer,
            ][..])
            .unwrap()
            .clone()
        }
    }

    fn measurement(kind: &Kind) -> Measurement {
        match *kind {
            Kind::Counter => Measurement::Counter { count: 3 },
            Kind::Gauge => Measurement::Gauge(GaugeValue::from(1.5)),
            Kind::Opaque => Measurement::Gauge(GaugeValue::from("up")),
            Kind::Histogram => Measurement::Histogram {
                summary: summary(),
                snapshot: snapshot(),
            },
            Kind::Meter => Measurement::Meter(rates()),
            Kind::Timer => Measurement::Timer {
                rates: rates(),
                summary: summary(),
                snapshot: snapshot(),
            },
        }
    }

    fn applicable(kind: &Kind, e: Expansion) -> bool {
        let rate = match e {
            Expansion::Count
            | Expansion::RateMean
            | Expansion::Rate1Minute
            | Expansion::Rate5Minute
            | Expansion::Rate15Minute => true,
            _ => false,
        };
        match *kind {
            Kind::Counter | Kind::Gauge | Kind::Opaque => false,
            Kind::Histogram => !rate,
            Kind::Meter => rate,
            Kind::Timer => true,
        }
    }

    #[test]
    fn counter_is_exact_and_unsuffixed() {
        let out = dispatcher(Expansions::all()).dispatch(
            &name(),
            &Measurement::Counter {
                count: i64::max_value(),
            },
            10,
        );
        assert_eq!(1, out.len());
        assert_eq!("g.T.n", out[0].metric);
        assert_eq!(SeriesType::Counter, out[0].kind);
        assert_eq!(Some(Number::Integer(i64::max_value())), out[0].value());
    }

    #[test]
    fn counter_ignores_expansions() {
        let out = dispatcher(Expansions::none()).dispatch(&name(), &Measurement::Counter { count: 1 }, 10);
        assert_eq!(1, out.len());
    }

    #[test]
    fn opaque_gauge_emits_nothing() {
        let out = dispatcher(Expansions::all()).dispatch(
            &name(),
            &Measurement::Gauge(GaugeValue::from("not a number")),
            10,
        );
        assert!(out.is_empty());
    }

    #[test]
    fn non_finite_gauge_emits_nothing() {
        let d = dispatcher(Expansions::all());
        for v in &[std::f64::NAN, std::f64::INFINITY, std::f64::NEG_INFINITY] {
            let out = d.dispatch(&name(), &Measurement::Gauge(GaugeValue::from(*v)), 10);
            assert!(out.is_empty(), "{}", v);
        }
    }

    #[test]
    fn non_finite_expansion_drops_only_that_series() {
        let mut poisoned = summary();
        poisoned.mean = std::f64::NAN;
        poisoned.std_dev = std::f64::INFINITY;
        let out = dispatcher(Expansions::all()).dispatch(
            &name(),
            &Measurement::Histogram {
                summary: poisoned,
                snapshot: snapshot(),
            },
            10,
        );
        assert_eq!(8, out.len());
        assert!(out.iter().all(|s| s.metric != "g.T.n.mean" && s.metric != "g.T.n.stddev"));
        let body = serde_json::to_string(&out).unwrap();
        assert!(!body.contains("null"));
    }

    #[test]
    fn raw_drops_non_finite() {
        let d = dispatcher(Expansions::all());
        assert!(d
            .raw("process.system_load_average", vec![], SeriesType::Gauge, Number::Float(std::f64::NAN), 1)
            .is_none());
    }

    #[test]
    fn timer_all_expansions() {
        let out = dispatcher(Expansions::all()).dispatch(&name(), &measurement(&Kind::Timer), 10);
        let names: Vec<&str> = out.iter().map(|s| s.metric.as_str()).collect();
        assert_eq!(
            vec![
                "g.T.n.count",
                "g.T.n.meanRate",
                "g.T.n.1MinuteRate",
                "g.T.n.5MinuteRate",
                "g.T.n.15MinuteRate",
                "g.T.n.min",
                "g.T.n.max",
                "g.T.n.mean",
                "g.T.n.stddev",
                "g.T.n.median",
                "g.T.n.p75",
                "g.T.n.p95",
                "g.T.n.p98",
                "g.T.n.p99",
                "g.T.n.p999",
            ],
            names
        );
        assert_eq!(SeriesType::Counter, out[0].kind);
        assert_eq!(Some(Number::Integer(7)), out[0].value());
        assert!(out[1..].iter().all(|s| s.kind == SeriesType::Gauge));
        assert_eq!(Some(Number::Float(8.9)), out[13].value());
    }

    #[test]
    fn histogram_values_come_from_summary_and_snapshot() {
        let out = dispatcher(Expansions::all()).dispatch(&name(), &measurement(&Kind::Histogram), 10);
        assert_eq!(10, out.len());
        let by_name = |n: &str| out.iter().find(|s| s.metric == n).and_then(|s| s.value());
        assert_eq!(Some(Number::Float(1.0)), by_name("g.T.n.min"));
        assert_eq!(Some(Number::Float(2.0)), by_name("g.T.n.stddev"));
        assert_eq!(Some(Number::Float(8.0)), by_name("g.T.n.p95"));
        assert_eq!(None, by_name("g.T.n.count"));
    }

    #[test]
    fn skip_suppresses_only_the_matching_series() {
        let fmt = |name: &MetricName, path: &[&str]| {
            if path.len() == 1 && path[0] == "p99" {
                SKIP_NAME.to_string()
            } else {
                DefaultMetricNameFormatter.format(name, path)
            }
        };
        let d = Dispatcher::new(None, Expansions::all(), Arc::new(fmt), TagComposer::default());
        let out = d.dispatch(&name(), &measurement(&Kind::Timer), 10);
        assert_eq!(14, out.len());
        assert!(out.iter().all(|s| s.metric != "g.T.n.p99" && s.metric != SKIP_NAME));
    }

    #[test]
    fn raw_honors_skip() {
        let d = dispatcher(Expansions::all());
        assert!(d
            .raw(SKIP_NAME, vec![], SeriesType::Gauge, Number::Integer(1), 1)
            .is_none());
        let s = d
            .raw("process.thread_count", vec!["type:Threading".into()], SeriesType::Gauge, Number::Integer(4), 1)
            .unwrap();
        assert_eq!(vec!["type:Threading"], s.tags);
    }

    #[test]
    fn tags_and_host_on_every_series() {
        let cb = |_: &MetricName| vec!["dyn:1".to_string()];
        let d = Dispatcher::new(
            Some("hostname".into()),
            Expansions::all(),
            Arc::new(DefaultMetricNameFormatter),
            TagComposer::new(Some(Arc::new(cb)), vec!["env:prod".into()]),
        );
        for s in d.dispatch(&name(), &measurement(&Kind::Timer), 10) {
            assert_eq!(Some("hostname".to_string()), s.host);
            assert_eq!(vec!["dyn:1", "env:prod"], s.tags);
        }
    }

    #[test]
    fn one_series_per_enabled_applicable_expansion() {
        fn inner(kind: Kind, expansions: Expansions, epoch: i64) -> TestResult {
            let out = dispatcher(expansions).dispatch(&name(), &measurement(&kind), epoch);
            let expected = match kind {
                Kind::Counter | Kind::Gauge => 1,
                Kind::Opaque => 0,
                _ => ALL
                    .iter()
                    .filter(|e| expansions.contains(**e) && applicable(&kind, **e))
                    .count(),
            };
            assert_eq!(expected, out.len());
            for s in &out {
                assert_eq!(Some(epoch), s.epoch());
                let suffix = s.metric.trim_start_matches("g.T.n").trim_start_matches('.');
                if !suffix.is_empty() {
                    let e: Expansion = suffix.parse().unwrap();
                    assert!(expansions.contains(e));
                    assert_eq!(e == Expansion::Count, s.kind == SeriesType::Counter);
                }
            }
            TestResult::passed()
        }
        QuickCheck::new().quickcheck(inner as fn(Kind, Expansions, i64) -> TestResult);
    }
}
