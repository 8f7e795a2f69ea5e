#![allow(unknown_lints)]

#[macro_use]
extern crate log;

use chrono::Utc;
use datadog_reporter::config::{self, HostSource, TransportConfig};
use datadog_reporter::host;
use datadog_reporter::metric::{GaugeValue, MetricName, MetricsRegistry};
use datadog_reporter::poll::Poller;
use datadog_reporter::reporter::{
    DatadogReporter, ReporterConfig, REPORT_CYCLE_FAILURE_SUM, REPORT_CYCLE_SUCCESS_SUM,
    REPORT_POINT_FAILURE_SUM,
};
use datadog_reporter::transport::{ConsoleTransport, HttpTransport, Transport, UdpTransport};
use datadog_reporter::vm::ProcessTelemetry;
use std::process;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

/// Expose the reporter's own telemetry through the registry it exports.
fn register_self_telemetry(registry: &MetricsRegistry) {
    let sums: [(&str, &Arc<AtomicUsize>); 3] = [
        ("cycles", &*REPORT_CYCLE_SUCCESS_SUM),
        ("failed_cycles", &*REPORT_CYCLE_FAILURE_SUM),
        ("point_errors", &*REPORT_POINT_FAILURE_SUM),
    ];
    for &(name, sum) in sums.iter() {
        let sum = Arc::clone(sum);
        registry.gauge(MetricName::new("datadog_reporter", "reporter", name), move || {
            GaugeValue::from(sum.load(Ordering::Relaxed) as u64)
        });
    }
}

fn build_transport(cfg: &TransportConfig) -> Result<Arc<dyn Transport>, String> {
    match *cfg {
        TransportConfig::Http(ref http) => {
            info!("shipping series to {}", http.endpoint);
            HttpTransport::new(http.clone())
                .map(|t| Arc::new(t) as Arc<dyn Transport>)
                .map_err(|e| e.to_string())
        }
        TransportConfig::Udp(ref udp) => {
            info!("shipping series to dogstatsd at {}:{}", udp.host, udp.port);
            Ok(Arc::new(UdpTransport::new(udp.clone())))
        }
        TransportConfig::Console => {
            info!("printing series to stdout");
            Ok(Arc::new(ConsoleTransport::new()))
        }
    }
}

fn main() {
    let args = match config::parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    };

    let level = match args.verbose {
        0 => log::LevelFilter::Error,
        1 => log::LevelFilter::Warn,
        2 => log::LevelFilter::Info,
        3 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    let logging = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}][{}][{}][{}] {}",
                record.module_path().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                Utc::now().to_rfc3339(),
                record.level(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stdout())
        .apply();
    if let Err(e) = logging {
        eprintln!("could not set up logging: {}", e);
        process::exit(1);
    }

    info!("datadog-reporter - {}", args.version);

    let host = match args.host {
        HostSource::Unset => None,
        HostSource::Fixed(ref h) => Some(h.clone()),
        HostSource::Ec2 => {
            let id = host::ec2_instance_id();
            if id.is_none() {
                warn!("ec2-host requested but no instance id found, reporting without host");
            }
            id
        }
    };

    let transport = match build_transport(&args.transport) {
        Ok(t) => t,
        Err(e) => {
            error!("could not build transport: {}", e);
            process::exit(1);
        }
    };

    let registry = Arc::new(MetricsRegistry::default());
    register_self_telemetry(&registry);

    let reporter = DatadogReporter::new(
        registry,
        transport,
        Arc::new(ProcessTelemetry::new()),
        ReporterConfig {
            host,
            expansions: args.expansions,
            vm_metrics: args.vm_metrics,
            vm_prefix: args.vm_prefix.clone(),
            tags: args.tags.clone(),
            ..ReporterConfig::default()
        },
    );

    let (stop_tx, stop_rx) = mpsc::channel();
    let handler_tx = stop_tx.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = handler_tx.send(());
    }) {
        warn!("Failed to set shutdown handler: {}", e);
    }

    let poller = Poller::start(reporter, Duration::from_secs(args.flush_interval));
    info!("reporting every {}s", args.flush_interval);

    let _ = stop_rx.recv();
    drop(stop_tx);
    info!("Received shutdown signal");
    poller.shutdown();
    info!("shutdown complete");
}
