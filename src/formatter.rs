//! Series naming.
//!
//! A `MetricNameFormatter` turns a `MetricName` plus a suffix path into the
//! name the backend will see. Returning `SKIP_NAME` suppresses the series
//! entirely; this is the only way to drop a single metric or a single
//! expansion of a metric once it has passed the registry predicate.

use crate::metric::MetricName;

/// The reserved name meaning "do not emit this series".
pub const SKIP_NAME: &str = "SKIP";

/// Builds series names.
pub trait MetricNameFormatter: Send + Sync {
    /// Format `name` with the suffix `path` appended. May return `SKIP_NAME`.
    fn format(&self, name: &MetricName, path: &[&str]) -> String;
}

impl<F> MetricNameFormatter for F
where
    F: Fn(&MetricName, &[&str]) -> String + Send + Sync,
{
    fn format(&self, name: &MetricName, path: &[&str]) -> String {
        self(name, path)
    }
}

/// Joins the name's segments and then the path with `.`.
///
/// `com.example.Queue.depth` with path `["p99"]` becomes
/// `com.example.Queue.depth.p99`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultMetricNameFormatter;

impl MetricNameFormatter for DefaultMetricNameFormatter {
    fn format(&self, name: &MetricName, path: &[&str]) -> String {
        let mut s = String::with_capacity(64);
        for segment in name.segments().into_iter().chain(path.iter().cloned()) {
            if segment.is_empty() {
                continue;
            }
            if !s.is_empty() {
                s.push('.');
            }
            s.push_str(segment);
        }
        s
    }
}

/// True if `formatted` is the skip sentinel.
#[inline]
pub fn is_skipped(formatted: &str) -> bool {
    formatted == SKIP_NAME
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_joins_with_dots() {
        let name = MetricName::new("com.example", "Queue", "depth");
        let fmt = DefaultMetricNameFormatter;
        assert_eq!("com.example.Queue.depth", fmt.format(&name, &[]));
        assert_eq!("com.example.Queue.depth.p99", fmt.format(&name, &["p99"]));
        assert_eq!(
            "com.example.Queue.depth.a.b",
            fmt.format(&name, &["a", "b"])
        );
    }

    #[test]
    fn default_includes_scope() {
        let name = MetricName::new("g", "T", "n").scope("s");
        assert_eq!("g.T.s.n.count", DefaultMetricNameFormatter.format(&name, &["count"]));
    }

    #[test]
    fn closures_are_formatters() {
        let fmt = |name: &MetricName, path: &[&str]| {
            if path.contains(&"p999") {
                SKIP_NAME.to_string()
            } else {
                name.name().to_string()
            }
        };
        let name = MetricName::new("g", "T", "n");
        assert!(is_skipped(&fmt.format(&name, &["p999"])));
        assert_eq!("n", fmt.format(&name, &["p99"]));
    }
}
