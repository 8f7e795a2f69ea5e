//! Expansions are the named sub-values of composite metrics.
//!
//! A histogram, meter or timer has many things worth reporting about it: its
//! count, its rates, its percentiles. Each of those is an `Expansion` and
//! becomes its own series when, and only when, it is enabled in the
//! reporter's `Expansions` set.

use std::error;
use std::fmt;
use std::str::FromStr;

/// A named sub-value of a composite metric.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Expansion {
    /// total events, reported as a counter
    Count,
    /// lifetime mean rate
    RateMean,
    /// one minute moving average rate
    Rate1Minute,
    /// five minute moving average rate
    Rate5Minute,
    /// fifteen minute moving average rate
    Rate15Minute,
    /// smallest observation
    Min,
    /// mean observation
    Mean,
    /// largest observation
    Max,
    /// standard deviation of observations
    StdDev,
    /// 50th percentile
    Median,
    /// 75th percentile
    P75,
    /// 95th percentile
    P95,
    /// 98th percentile
    P98,
    /// 99th percentile
    P99,
    /// 99.9th percentile
    P999,
}

/// Every expansion, in declaration order.
pub const ALL: [Expansion; 15] = [
    Expansion::Count,
    Expansion::RateMean,
    Expansion::Rate1Minute,
    Expansion::Rate5Minute,
    Expansion::Rate15Minute,
    Expansion::Min,
    Expansion::Mean,
    Expansion::Max,
    Expansion::StdDev,
    Expansion::Median,
    Expansion::P75,
    Expansion::P95,
    Expansion::P98,
    Expansion::P99,
    Expansion::P999,
];

impl Expansion {
    /// The suffix this expansion appends to a series name.
    pub fn as_str(&self) -> &'static str {
        match *self {
            Expansion::Count => "count",
            Expansion::RateMean => "meanRate",
            Expansion::Rate1Minute => "1MinuteRate",
            Expansion::Rate5Minute => "5MinuteRate",
            Expansion::Rate15Minute => "15MinuteRate",
            Expansion::Min => "min",
            Expansion::Mean => "mean",
            Expansion::Max => "max",
            Expansion::StdDev => "stddev",
            Expansion::Median => "median",
            Expansion::P75 => "p75",
            Expansion::P95 => "p95",
            Expansion::P98 => "p98",
            Expansion::P99 => "p99",
            Expansion::P999 => "p999",
        }
    }

    fn bit(self) -> u16 {
        1 << (self as u16)
    }
}

impl fmt::Display for Expansion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string names no expansion.
#[derive(Debug, Clone, PartialEq)]
pub struct UnknownExpansion(pub String);

impl fmt::Display for UnknownExpansion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "unknown expansion '{}'", self.0)
    }
}

impl error::Error for UnknownExpansion {}

impl FromStr for Expansion {
    type Err = UnknownExpansion;

    fn from_str(s: &str) -> Result<Expansion, UnknownExpansion> {
        ALL.iter()
            .find(|e| e.as_str() == s)
            .cloned()
            .ok_or_else(|| UnknownExpansion(s.to_string()))
    }
}

/// The set of enabled expansions.
///
/// A fixed-size bit set: copying is free and lookups never allocate, so the
/// set is safe to share between concurrently running cycles.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Expansions {
    bits: u16,
}

impl Expansions {
    /// No expansions at all.
    pub fn none() -> Expansions {
        Expansions { bits: 0 }
    }

    /// Every expansion.
    pub fn all() -> Expansions {
        ALL.iter().cloned().collect()
    }

    /// Exactly one expansion.
    pub fn of(expansion: Expansion) -> Expansions {
        Expansions {
            bits: expansion.bit(),
        }
    }

    /// True if `expansion` is enabled.
    pub fn contains(&self, expansion: Expansion) -> bool {
        self.bits & expansion.bit() != 0
    }

    /// Enable `expansion`.
    pub fn insert(&mut self, expansion: Expansion) {
        self.bits |= expansion.bit();
    }

    /// Disable `expansion`.
    pub fn remove(&mut self, expansion: Expansion) {
        self.bits &= !expansion.bit();
    }

    /// Total enabled expansions.
    pub fn len(&self) -> usize {
        self.bits.count_ones() as usize
    }

    /// True if nothing is enabled.
    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    /// The enabled expansions, in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = Expansion> + '_ {
        ALL.iter().cloned().filter(move |e| self.contains(*e))
    }
}

impl Default for Expansions {
    fn default() -> Expansions {
        Expansions::all()
    }
}

impl ::std::iter::FromIterator<Expansion> for Expansions {
    fn from_iter<I: IntoIterator<Item = Expansion>>(iter: I) -> Expansions {
        let mut set = Expansions::none();
        for e in iter {
            set.insert(e);
        }
        set
    }
}

impl fmt::Debug for Expansions {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}
