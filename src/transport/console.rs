use super::{Error, Request, Transport};
use crate::series::{Series, SeriesType};
use chrono::Utc;

/// Prints each batch to stdout. Useful for trying out a configuration.
#[derive(Debug, Default)]
pub struct ConsoleTransport {}

impl ConsoleTransport {
    /// Create a console transport.
    pub fn new() -> ConsoleTransport {
        ConsoleTransport {}
    }
}

impl Transport for ConsoleTransport {
    fn prepare(&self) -> Result<Box<dyn Request>, Error> {
        Ok(Box::new(ConsoleRequest::default()))
    }

    fn close(&self) -> Result<(), Error> {
        Ok(())
    }
}

#[derive(Default)]
struct ConsoleRequest {
    counters: Vec<Series>,
    gauges: Vec<Series>,
}

/// Print a single series line.
fn fmt_line(series: &Series) -> String {
    let value = series
        .value()
        .map(|v| v.to_string())
        .unwrap_or_default();
    if series.tags.is_empty() {
        format!("    {}: {}", series.metric, value)
    } else {
        format!("    {}: {} [{}]", series.metric, value, series.tags.join(","))
    }
}

impl Request for ConsoleRequest {
    fn add_counter(&mut self, counter: Series) -> Result<(), Error> {
        debug_assert_eq!(SeriesType::Counter, counter.kind);
        self.counters.push(counter);
        Ok(())
    }

    fn add_gauge(&mut self, gauge: Series) -> Result<(), Error> {
        debug_assert_eq!(SeriesType::Gauge, gauge.kind);
        self.gauges.push(gauge);
        Ok(())
    }

    fn send(self: Box<Self>) -> Result<(), Error> {
        println!("Flushing metrics: {}", Utc::now().to_rfc3339());

        println!("  counters:");
        for s in &self.counters {
            println!("{}", fmt_line(s));
        }

        println!("  gauges:");
        for s in &self.gauges {
            println!("{}", fmt_line(s));
        }
        Ok(())
    }
}
