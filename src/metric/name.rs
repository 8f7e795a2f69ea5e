//! `MetricName` identifies one measurement within a registry.

use std::fmt;

/// The hierarchical identity of a measurement.
///
/// A name is made of a group, a type, an optional scope and the name proper.
/// Names are immutable once built and totally ordered; the registry keys its
/// snapshots by them.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MetricName {
    group: String,
    kind: String,
    name: String,
    scope: Option<String>,
}

impl MetricName {
    /// Create a new `MetricName` without a scope.
    ///
    /// # Examples
    ///
    /// ```
    /// use datadog_reporter::metric::MetricName;
    ///
    /// let name = MetricName::new("com.example", "Queue", "depth");
    /// assert_eq!("com.example.Queue.depth", name.to_string());
    /// ```
    pub fn new<G, T, N>(group: G, kind: T, name: N) -> MetricName
    where
        G: Into<String>,
        T: Into<String>,
        N: Into<String>,
    {
        MetricName {
            group: group.into(),
            kind: kind.into(),
            name: name.into(),
            scope: None,
        }
    }

    /// Build a `MetricName` from a dotted owner path, splitting its last
    /// segment off as the type.
    ///
    /// `"com.example.Queue"` becomes group `com.example` and type `Queue`. An
    /// owner without dots has an empty group.
    pub fn from_owner<N>(owner: &str, name: N) -> MetricName
    where
        N: Into<String>,
    {
        match owner.rfind('.') {
            Some(idx) => MetricName::new(&owner[..idx], &owner[idx + 1..], name),
            None => MetricName::new("", owner, name),
        }
    }

    /// Attach a scope to the name. The scope sits between the type and the
    /// name proper.
    pub fn scope<S>(mut self, scope: S) -> MetricName
    where
        S: Into<String>,
    {
        self.scope = Some(scope.into());
        self
    }

    /// The group segment.
    pub fn group(&self) -> &str {
        &self.group
    }

    /// The type segment.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The name proper.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The scope segment, if any.
    pub fn get_scope(&self) -> Option<&str> {
        self.scope.as_ref().map(|s| s.as_str())
    }

    /// The non-empty segments of the name, in emission order: group, type,
    /// scope, name.
    pub fn segments(&self) -> Vec<&str> {
        let mut segments = Vec::with_capacity(4);
        segments.push(self.group.as_str());
        segments.push(self.kind.as_str());
        if let Some(ref scope) = self.scope {
            segments.push(scope.as_str());
        }
        segments.push(self.name.as_str());
        segments.retain(|s| !s.is_empty());
        segments
    }

    /// The key this name is grouped under in a registry snapshot.
    pub fn group_key(&self) -> String {
        let mut key = String::with_capacity(self.group.len() + self.kind.len() + 1);
        if !self.group.is_empty() {
            key.push_str(&self.group);
            key.push('.');
        }
        key.push_str(&self.kind);
        if let Some(ref scope) = self.scope {
            key.push('.');
            key.push_str(scope);
        }
        key
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.segments().join("."))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn segments_skip_missing_scope() {
        let name = MetricName::new("a.b", "C", "d.e");
        assert_eq!(vec!["a.b", "C", "d.e"], name.segments());
    }

    #[test]
    fn segments_order_scope_before_name() {
        let name = MetricName::new("a", "C", "hits").scope("shard-1");
        assert_eq!(vec!["a", "C", "shard-1", "hits"], name.segments());
        assert_eq!("a.C.shard-1", name.group_key());
    }

    #[test]
    fn from_owner_splits_last_segment() {
        let name = MetricName::from_owner(
            "com.example.reporting.ReporterTest",
            "my.counter",
        );
        assert_eq!("com.example.reporting", name.group());
        assert_eq!("ReporterTest", name.kind());
        assert_eq!(
            "com.example.reporting.ReporterTest.my.counter",
            name.to_string()
        );
    }

    #[test]
    fn from_owner_without_dots() {
        let name = MetricName::from_owner("String", "x");
        assert_eq!("", name.group());
        assert_eq!("String.x", name.to_string());
        assert_eq!("String", name.group_key());
    }

    #[test]
    fn ordering_is_group_then_type_then_name() {
        let a = MetricName::new("g", "T", "my.counter");
        let b = MetricName::new("g", "T", "my.invocations");
        let c = MetricName::new("g", "U", "a");
        assert!(a < b);
        assert!(b < c);
    }
}
