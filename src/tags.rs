//! Tag composition.
//!
//! Every series carries the tags of its metric: first whatever the optional
//! dynamic callback returns for that metric, then the static tags configured
//! for the reporter. Order is preserved and nothing is deduplicated; some
//! consumers read meaning into tag position.

use crate::metric::MetricName;
use std::sync::Arc;

/// A per-metric tag source evaluated at export time.
pub trait DynamicTagCallback: Send + Sync {
    /// Tags for the metric `name`.
    fn dynamic_tags(&self, name: &MetricName) -> Vec<String>;
}

impl<F> DynamicTagCallback for F
where
    F: Fn(&MetricName) -> Vec<String> + Send + Sync,
{
    fn dynamic_tags(&self, name: &MetricName) -> Vec<String> {
        self(name)
    }
}

/// Merges dynamic and static tags.
#[derive(Clone, Default)]
pub struct TagComposer {
    callback: Option<Arc<dyn DynamicTagCallback>>,
    tags: Vec<String>,
}

impl TagComposer {
    /// Create a composer. Either source may be absent.
    pub fn new(callback: Option<Arc<dyn DynamicTagCallback>>, tags: Vec<String>) -> TagComposer {
        TagComposer { callback, tags }
    }

    /// Dynamic tags for `name`, then the static tags.
    pub fn tags(&self, name: &MetricName) -> Vec<String> {
        let mut tags = match self.callback {
            Some(ref cb) => cb.dynamic_tags(name),
            None => Vec::with_capacity(self.tags.len()),
        };
        tags.extend(self.tags.iter().cloned());
        tags
    }
}
