//! datadog-reporter ships the contents of an in-process metrics registry to
//! Datadog. Once per interval it snapshots every counter, gauge, histogram,
//! meter and timer in a registry, turns each into one or more named, tagged
//! series stamped with a shared epoch, and hands the batch to a transport:
//! the Datadog HTTP series API, a DogStatsD agent over UDP, or stdout.
//!
//! Why you might choose to use datadog-reporter:
//!
//!  * You keep metrics in-process and want them in Datadog.
//!  * You want control over which percentiles and rates get shipped.
//!  * You want a failed export to cost you one interval and nothing else.
//!
//! The moving parts, bottom up: `metric` holds the instruments and the
//! registry, `dispatch` turns one measurement into series, `transport`
//! delivers them, `reporter` runs a single cycle and `poll` runs cycles on a
//! schedule.
#![allow(unknown_lints)]
#![deny(trivial_numeric_casts, missing_docs, unstable_features, unused_import_braces)]

#[macro_use]
extern crate log;

#[macro_use]
extern crate lazy_static;

#[macro_use]
extern crate serde_derive;

pub mod config;
pub mod dispatch;
pub mod expansion;
pub mod formatter;
pub mod host;
pub mod metric;
pub mod poll;
pub mod reporter;
pub mod series;
pub mod tags;
pub mod time;
pub mod transport;
pub mod vm;

pub use crate::reporter::{DatadogReporter, ReporterConfig};
