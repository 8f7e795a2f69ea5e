//! The poll cycle.
//!
//! One call to `DatadogReporter::report` is one cycle:
//!
//!   1. prepare a request from the transport; on failure the cycle ends
//!   2. read the clock once, that epoch stamps every series in the cycle
//!   3. emit host telemetry, if enabled
//!   4. snapshot the registry through the predicate and dispatch every metric
//!   5. send the request
//!
//! Failures inside step 4 are confined to the metric that caused them, a
//! panic included. Anything else that goes wrong ends the cycle and is
//! reported by `report` as an `Error`. `run` is the scheduler-facing wrapper
//! that logs that error and swallows it.

use crate::dispatch::Dispatcher;
use crate::expansion::Expansions;
use crate::formatter::{DefaultMetricNameFormatter, MetricNameFormatter};
use crate::metric::{All, Metric, MetricName, MetricPredicate, Number, Registry};
use crate::series::{Series, SeriesType};
use crate::tags::{DynamicTagCallback, TagComposer};
use crate::time::{self, Clock, SystemClock};
use crate::transport::{self, Request, Transport};
use crate::vm::HostTelemetry;
use std::any::Any;
use std::error;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

lazy_static! {
    /// Total cycles that reached the backend.
    pub static ref REPORT_CYCLE_SUCCESS_SUM: Arc<AtomicUsize> = Arc::new(AtomicUsize::new(0));
    /// Total cycles that ended early.
    pub static ref REPORT_CYCLE_FAILURE_SUM: Arc<AtomicUsize> = Arc::new(AtomicUsize::new(0));
    /// Total metrics or points dropped within otherwise healthy cycles.
    pub static ref REPORT_POINT_FAILURE_SUM: Arc<AtomicUsize> = Arc::new(AtomicUsize::new(0));
}

/// Reporter configuration. Every field has a default; see `Default`.
#[derive(Clone)]
pub struct ReporterConfig {
    /// Host identifier attached to every series. Default: none.
    pub host: Option<String>,
    /// Sub-values of composite metrics to emit. Default: all.
    pub expansions: Expansions,
    /// Emit host telemetry each cycle. Default: true.
    pub vm_metrics: bool,
    /// Leading segment of host telemetry names. Default: `process`.
    pub vm_prefix: String,
    /// Which metrics to export. Default: all of them.
    pub predicate: Arc<dyn MetricPredicate>,
    /// Metric name to series name. Default: dotted path.
    pub formatter: Arc<dyn MetricNameFormatter>,
    /// Tags on every series. Default: none.
    pub tags: Vec<String>,
    /// Per-metric tags ahead of the static ones. Default: none.
    pub dynamic_tags: Option<Arc<dyn DynamicTagCallback>>,
    /// Source of the cycle epoch. Default: the system clock.
    pub clock: Arc<dyn Clock>,
}

impl Default for ReporterConfig {
    fn default() -> ReporterConfig {
        ReporterConfig {
            host: None,
            expansions: Expansions::all(),
            vm_metrics: true,
            vm_prefix: "process".to_string(),
            predicate: Arc::new(All),
            formatter: Arc::new(DefaultMetricNameFormatter),
            tags: Vec::new(),
            dynamic_tags: None,
            clock: Arc::new(SystemClock),
        }
    }
}

/// Reasons a cycle ended without reaching the backend.
#[derive(Debug)]
pub enum Error {
    /// The transport could not produce a request. Nothing was sent.
    Prepare(transport::Error),
    /// The request could not be delivered. Its points are lost.
    Send(transport::Error),
    /// Something panicked outside of a single metric's dispatch.
    Panicked(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Prepare(ref e) => write!(f, "could not prepare request: {}", e),
            Error::Send(ref e) => write!(f, "could not send request: {}", e),
            Error::Panicked(ref msg) => write!(f, "cycle panicked: {}", msg),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::Prepare(ref e) | Error::Send(ref e) => Some(e),
            Error::Panicked(_) => None,
        }
    }
}

/// Exports a registry to Datadog.
pub struct DatadogReporter {
    registry: Arc<dyn Registry>,
    transport: Arc<dyn Transport>,
    vm: Arc<dyn HostTelemetry>,
    dispatcher: Dispatcher,
    predicate: Arc<dyn MetricPredicate>,
    clock: Arc<dyn Clock>,
    vm_metrics: bool,
    vm_prefix: String,
}

impl DatadogReporter {
    /// Create a reporter. Nothing happens until `report` or `run` is called.
    pub fn new(
        registry: Arc<dyn Registry>,
        transport: Arc<dyn Transport>,
        vm: Arc<dyn HostTelemetry>,
        config: ReporterConfig,
    ) -> DatadogReporter {
        let tags = TagComposer::new(config.dynamic_tags, config.tags);
        DatadogReporter {
            registry,
            transport,
            vm,
            dispatcher: Dispatcher::new(config.host, config.expansions, config.formatter, tags),
            predicate: config.predicate,
            clock: config.clock,
            vm_metrics: config.vm_metrics,
            vm_prefix: config.vm_prefix,
        }
    }

    /// Run one cycle and return the number of points the request accepted.
    pub fn report(&self) -> Result<usize, Error> {
        let res = panic::catch_unwind(AssertUnwindSafe(|| self.cycle()))
            .unwrap_or_else(|payload| Err(Error::Panicked(panic_message(&*payload))));
        match res {
            Ok(_) => {
                REPORT_CYCLE_SUCCESS_SUM.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                REPORT_CYCLE_FAILURE_SUM.fetch_add(1, Ordering::Relaxed);
            }
        }
        res
    }

    /// Run one cycle, logging any failure. Never panics and never returns an
    /// error; the next cycle starts from scratch.
    pub fn run(&self) {
        match self.report() {
            Ok(points) => trace!("reported {} points", points),
            Err(Error::Prepare(e)) => error!("Could not prepare request, skipping cycle: {}", e),
            Err(e) => error!("Error reporting metrics: {}", e),
        }
    }

    /// Release the transport. Failure is logged and otherwise ignored.
    pub fn shutdown(&self) {
        if let Err(e) = self.transport.close() {
            error!("Error closing transport: {}", e);
        }
    }

    fn cycle(&self) -> Result<usize, Error> {
        let mut request = self.transport.prepare().map_err(Error::Prepare)?;
        let epoch = time::epoch_seconds(&*self.clock);
        trace!("collecting with epoch {}", epoch);

        let mut points = 0;
        if self.vm_metrics {
            points += self.push_vm_metrics(&mut *request, epoch);
        }
        let grouped = self.registry.grouped_metrics(&*self.predicate);
        for metrics in grouped.values() {
            for (name, metric) in metrics {
                points += self.push_metric(&mut *request, name, &**metric, epoch);
            }
        }

        trace!("sending {} points", points);
        request.send().map_err(Error::Send)?;
        Ok(points)
    }

    fn push_metric(
        &self,
        request: &mut dyn Request,
        name: &MetricName,
        metric: &dyn Metric,
        epoch: i64,
    ) -> usize {
        let dispatched = panic::catch_unwind(AssertUnwindSafe(|| {
            metric
                .measure()
                .map(|m| self.dispatcher.dispatch(name, &m, epoch))
        }));
        match dispatched {
            Ok(Ok(series)) => add_all(request, series),
            Ok(Err(e)) => {
                REPORT_POINT_FAILURE_SUM.fetch_add(1, Ordering::Relaxed);
                error!("Error reporting metric {}: {}", name, e);
                0
            }
            Err(payload) => {
                REPORT_POINT_FAILURE_SUM.fetch_add(1, Ordering::Relaxed);
                error!("Error reporting metric {}: {}", name, panic_message(&*payload));
                0
            }
        }
    }

    fn push_vm_metrics(&self, request: &mut dyn Request, epoch: i64) -> usize {
        let collected = panic::catch_unwind(AssertUnwindSafe(|| self.vm_series(epoch)));
        match collected {
            Ok(series) => add_all(request, series),
            Err(payload) => {
                REPORT_POINT_FAILURE_SUM.fetch_add(1, Ordering::Relaxed);
                error!("Error reading host telemetry: {}", panic_message(&*payload));
                0
            }
        }
    }

    fn vm_series(&self, epoch: i64) -> Vec<Series> {
        let mut out = Vec::new();
        let gauge = |out: &mut Vec<Series>, suffix: &str, tag: &str, value: Number| {
            out.extend(self.dispatcher.raw(
                &self.vm_name(suffix),
                vec![format!("type:{}", tag)],
                SeriesType::Gauge,
                value,
                epoch,
            ));
        };
        gauge(&mut out, "heap_committed", "Memory", self.vm.heap_committed().into());
        gauge(&mut out, "heap_used", "Memory", self.vm.heap_used().into());
        gauge(&mut out, "thread_count", "Threading", self.vm.thread_count().into());
        gauge(
            &mut out,
            "system_load_average",
            "OperatingSystem",
            self.vm.system_load_average().into(),
        );
        for gc in self.vm.garbage_collectors() {
            gauge(&mut out, "gc_time", gc.name.as_str(), Number::Integer(gc.time_ms));
            out.extend(self.dispatcher.raw(
                &self.vm_name("gc_runs"),
                vec![format!("type:{}", gc.name)],
                SeriesType::Counter,
                Number::Integer(gc.runs),
                epoch,
            ));
        }
        out
    }

    fn vm_name(&self, suffix: &str) -> String {
        if self.vm_prefix.is_empty() {
            suffix.to_string()
        } else {
            format!("{}.{}", self.vm_prefix, suffix)
        }
    }
}

/// Hand every series to the request, logging and counting the ones it
/// refuses. Returns how many it accepted.
fn add_all(request: &mut dyn Request, series: Vec<Series>) -> usize {
    let mut accepted = 0;
    for s in series {
        let metric = s.metric.clone();
        let res = match s.kind {
            SeriesType::Counter => request.add_counter(s),
            SeriesType::Gauge => request.add_gauge(s),
        };
        match res {
            Ok(()) => accepted += 1,
            Err(e) => {
                REPORT_POINT_FAILURE_SUM.fetch_add(1, Ordering::Relaxed);
                error!("Error adding point {}: {}", metric, e);
            }
        }
    }
    accepted
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
