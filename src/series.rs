//! The wire model: series and the batch that carries them.
//!
//! A batch serializes to
//!
//! ```text
//! {"series": [{"metric": "...", "points": [[epoch, value]], "type": "gauge",
//!              "host": "...", "tags": ["..."]}]}
//! ```
//!
//! with `host` present only when the reporter has one configured.

use crate::metric::Number;

/// How the backend should interpret a series.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SeriesType {
    /// a count
    Counter,
    /// a point-in-time value
    Gauge,
}

/// One named, tagged, timestamped time series.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Series {
    /// the formatted series name
    pub metric: String,
    /// `(epoch, value)` pairs
    pub points: Vec<(i64, Number)>,
    /// counter or gauge
    #[serde(rename = "type")]
    pub kind: SeriesType,
    /// the reporting host, if configured
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// tags, in emission order
    pub tags: Vec<String>,
}

impl Series {
    /// Create a single-point series.
    ///
    /// A bracketed segment in `name` is lifted out into tags:
    /// `a.meter[with,tags].count` becomes the series `a.meter.count` tagged
    /// `with`, `tags`, ahead of the tags passed in.
    pub fn new<S>(
        name: S,
        kind: SeriesType,
        value: Number,
        epoch: i64,
        host: Option<String>,
        tags: Vec<String>,
    ) -> Series
    where
        S: Into<String>,
    {
        let (metric, mut embedded) = split_embedded_tags(&name.into());
        embedded.extend(tags);
        Series {
            metric,
            points: vec![(epoch, value)],
            kind,
            host,
            tags: embedded,
        }
    }

    /// The value of the first point.
    pub fn value(&self) -> Option<Number> {
        self.points.first().map(|&(_, v)| v)
    }

    /// The epoch of the first point.
    pub fn epoch(&self) -> Option<i64> {
        self.points.first().map(|&(e, _)| e)
    }
}

/// Separate `name[t1,t2]rest` into `namerest` and `[t1, t2]`.
///
/// Only the first bracketed segment is considered. A name with an unclosed
/// bracket is left alone. Tokens are trimmed and empty tokens dropped.
pub fn split_embedded_tags(name: &str) -> (String, Vec<String>) {
    let open = match name.find('[') {
        Some(idx) => idx,
        None => return (name.to_string(), Vec::new()),
    };
    let close = match name[open..].find(']') {
        Some(idx) => open + idx,
        None => return (name.to_string(), Vec::new()),
    };
    let tags = name[open + 1..close]
        .split(',')
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect();
    let mut stripped = String::with_capacity(name.len());
    stripped.push_str(&name[..open]);
    stripped.push_str(&name[close + 1..]);
    (stripped, tags)
}

/// The unit sent to the backend in one request.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Batch {
    /// every series collected in the cycle
    pub series: Vec<Series>,
}

impl Batch {
    /// An empty batch.
    pub fn new() -> Batch {
        Batch::default()
    }

    /// Append one series.
    pub fn push(&mut self, series: Series) {
        self.series.push(series);
    }

    /// Total series in the batch.
    pub fn len(&self) -> usize {
        self.series.len()
    }

    /// True if there are no series.
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}
