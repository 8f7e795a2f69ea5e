//! The measurement model.
//!
//! A registry holds named `Metric`s. Once per poll cycle each metric is asked
//! to `measure` itself, producing a `Measurement`: exactly one of five kinds.
//! The reporter never mutates metrics, it only reads them.

use serde::ser::{Serialize, Serializer};
use std::error;
use std::fmt;

mod instruments;
mod name;
mod registry;

pub use self::instruments::{Counter, Gauge, Histogram, Meter, Timer};
pub use self::name::MetricName;
pub use self::registry::{All, Grouped, MetricPredicate, MetricsRegistry, Registry};

/// A numeric value as the backend will see it.
///
/// Counts stay integers all the way onto the wire. Rates, means, percentiles
/// and the like are floats.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Number {
    /// An integral value
    Integer(i64),
    /// A floating point value
    Float(f64),
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Number::Integer(i) => write!(f, "{}", i),
            Number::Float(x) => write!(f, "{}", x),
        }
    }
}

impl Serialize for Number {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match *self {
            Number::Integer(i) => serializer.serialize_i64(i),
            Number::Float(f) => serializer.serialize_f64(f),
        }
    }
}

impl From<i64> for Number {
    fn from(i: i64) -> Number {
        Number::Integer(i)
    }
}

impl From<u64> for Number {
    fn from(u: u64) -> Number {
        if u > i64::max_value() as u64 {
            Number::Float(u as f64)
        } else {
            Number::Integer(u as i64)
        }
    }
}

impl From<f64> for Number {
    fn from(f: f64) -> Number {
        Number::Float(f)
    }
}

/// The value held by a gauge at read time.
///
/// Gauges may hold anything. Only numeric values are exported, the rest are
/// skipped.
#[derive(Clone, Debug, PartialEq)]
pub enum GaugeValue {
    /// A numeric reading
    Number(Number),
    /// A reading with no numeric interpretation
    Opaque(String),
}

impl From<i64> for GaugeValue {
    fn from(i: i64) -> GaugeValue {
        GaugeValue::Number(Number::Integer(i))
    }
}

impl From<u64> for GaugeValue {
    fn from(u: u64) -> GaugeValue {
        GaugeValue::Number(u.into())
    }
}

impl From<f64> for GaugeValue {
    fn from(f: f64) -> GaugeValue {
        GaugeValue::Number(Number::Float(f))
    }
}

impl From<String> for GaugeValue {
    fn from(s: String) -> GaugeValue {
        GaugeValue::Opaque(s)
    }
}

impl<'a> From<&'a str> for GaugeValue {
    fn from(s: &'a str) -> GaugeValue {
        GaugeValue::Opaque(s.to_string())
    }
}

/// Summary statistics of a distribution.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Summary {
    /// smallest observed value
    pub min: f64,
    /// largest observed value
    pub max: f64,
    /// arithmetic mean
    pub mean: f64,
    /// sample standard deviation
    pub std_dev: f64,
}

/// Percentile snapshot of a distribution.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Snapshot {
    /// 50th percentile
    pub median: f64,
    /// 75th percentile
    pub p75: f64,
    /// 95th percentile
    pub p95: f64,
    /// 98th percentile
    pub p98: f64,
    /// 99th percentile
    pub p99: f64,
    /// 99.9th percentile
    pub p999: f64,
}

/// Throughput of a metered event, in events per second.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rates {
    /// total events marked
    pub count: i64,
    /// count over the meter's lifetime
    pub mean_rate: f64,
    /// exponentially weighted one minute rate
    pub one_minute_rate: f64,
    /// exponentially weighted five minute rate
    pub five_minute_rate: f64,
    /// exponentially weighted fifteen minute rate
    pub fifteen_minute_rate: f64,
}

/// One read of a metric.
#[derive(Clone, Debug, PartialEq)]
pub enum Measurement {
    /// A monotonic-ish integer count
    Counter {
        /// the raw count
        count: i64,
    },
    /// A point-in-time value
    Gauge(GaugeValue),
    /// A distribution of values
    Histogram {
        /// min, max, mean and standard deviation
        summary: Summary,
        /// percentiles
        snapshot: Snapshot,
    },
    /// A rate of events
    Meter(Rates),
    /// A rate of events and the distribution of their durations
    Timer {
        /// throughput
        rates: Rates,
        /// duration summary, in milliseconds
        summary: Summary,
        /// duration percentiles, in milliseconds
        snapshot: Snapshot,
    },
}

/// Anything a registry can hold.
pub trait Metric: Send + Sync {
    /// Read the metric's current state.
    fn measure(&self) -> Result<Measurement, Error>;
}

/// Failure to read a metric.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// The metric could not produce a reading this cycle.
    Unavailable(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Unavailable(ref reason) => write!(f, "metric unavailable: {}", reason),
        }
    }
}

impl error::Error for Error {}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn integers_serialize_as_integers() {
        assert_eq!("1", serde_json::to_string(&Number::Integer(1)).unwrap());
        assert_eq!("1.5", serde_json::to_string(&Number::Float(1.5)).unwrap());
    }

    #[test]
    fn huge_unsigned_widens_to_float() {
        assert_eq!(Number::Integer(12), Number::from(12u64));
        match Number::from(u64::max_value()) {
            Number::Float(_) => {}
            other => panic!("expected float, got {:?}", other),
        }
    }

    #[test]
    fn gauge_value_conversions() {
        assert_eq!(GaugeValue::Number(Number::Integer(123)), GaugeValue::from(123i64));
        assert_eq!(GaugeValue::Opaque("up".into()), GaugeValue::from("up"));
    }
}
