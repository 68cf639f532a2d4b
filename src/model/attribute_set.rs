//! The attribute lattice.
//!
//! Every attribute key of a node or edge maps to an [`AttributeSet`]. Sets
//! are values: `union`, `intersection` and `difference` build new sets and
//! never fail. When two sets cannot be represented exactly by one variant
//! (a string set joined with an integer interval, say) the union widens to
//! [`AttributeSet::Universal`], which is still an upper bound of both.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::AttrValue;

// ============================================================================
// IntervalSet
// ============================================================================

/// A union of closed integer intervals, kept sorted, disjoint and
/// non-adjacent. `i64::MIN` / `i64::MAX` stand for unbounded ends.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IntervalSet {
    intervals: Vec<(i64, i64)>,
}

impl IntervalSet {
    pub fn new(intervals: impl IntoIterator<Item = (i64, i64)>) -> Self {
        let mut raw: Vec<(i64, i64)> = intervals
            .into_iter()
            .filter(|(lo, hi)| lo <= hi)
            .collect();
        raw.sort();
        let mut merged: Vec<(i64, i64)> = Vec::with_capacity(raw.len());
        for (lo, hi) in raw {
            match merged.last_mut() {
                Some(last) if lo <= last.1.saturating_add(1) => {
                    last.1 = last.1.max(hi);
                }
                _ => merged.push((lo, hi)),
            }
        }
        Self { intervals: merged }
    }

    /// All integers.
    pub fn full() -> Self {
        Self { intervals: vec![(i64::MIN, i64::MAX)] }
    }

    pub fn point(v: i64) -> Self {
        Self { intervals: vec![(v, v)] }
    }

    pub fn intervals(&self) -> &[(i64, i64)] {
        &self.intervals
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn contains(&self, v: i64) -> bool {
        self.intervals.iter().any(|&(lo, hi)| lo <= v && v <= hi)
    }

    /// Number of integers covered, `None` if unbounded.
    pub fn cardinality(&self) -> Option<u128> {
        let mut total: u128 = 0;
        for &(lo, hi) in &self.intervals {
            if lo == i64::MIN || hi == i64::MAX {
                return None;
            }
            total += (hi as i128 - lo as i128 + 1) as u128;
        }
        Some(total)
    }

    pub fn union(&self, other: &Self) -> Self {
        Self::new(self.intervals.iter().chain(other.intervals.iter()).copied())
    }

    pub fn intersection(&self, other: &Self) -> Self {
        let mut out = Vec::new();
        let (mut i, mut j) = (0, 0);
        while i < self.intervals.len() && j < other.intervals.len() {
            let (a_lo, a_hi) = self.intervals[i];
            let (b_lo, b_hi) = other.intervals[j];
            let lo = a_lo.max(b_lo);
            let hi = a_hi.min(b_hi);
            if lo <= hi {
                out.push((lo, hi));
            }
            if a_hi < b_hi { i += 1 } else { j += 1 }
        }
        Self::new(out)
    }

    pub fn difference(&self, other: &Self) -> Self {
        let mut out = Vec::new();
        for &(lo, hi) in &self.intervals {
            let mut cursor = lo;
            let mut exhausted = false;
            for &(b_lo, b_hi) in &other.intervals {
                if b_hi < cursor || b_lo > hi {
                    continue;
                }
                if b_lo > cursor {
                    out.push((cursor, b_lo - 1));
                }
                if b_hi >= hi {
                    exhausted = true;
                    break;
                }
                cursor = b_hi + 1;
            }
            if !exhausted {
                out.push((cursor, hi));
            }
        }
        Self::new(out)
    }

    pub fn is_subset(&self, other: &Self) -> bool {
        self.difference(other).is_empty()
    }
}

// ============================================================================
// AttributeSet
// ============================================================================

/// An element of the attribute lattice.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "RawSet", into = "TaggedSet")]
pub enum AttributeSet {
    #[default]
    Empty,
    Finite(BTreeSet<AttrValue>),
    Integers(IntervalSet),
    Universal,
}

impl AttributeSet {
    pub fn finite(values: impl IntoIterator<Item = impl Into<AttrValue>>) -> Self {
        Self::Finite(values.into_iter().map(Into::into).collect()).canonical()
    }

    pub fn integers(intervals: impl IntoIterator<Item = (i64, i64)>) -> Self {
        Self::Integers(IntervalSet::new(intervals)).canonical()
    }

    pub fn is_empty(&self) -> bool {
        match self {
            AttributeSet::Empty => true,
            AttributeSet::Finite(values) => values.is_empty(),
            AttributeSet::Integers(set) => set.is_empty(),
            AttributeSet::Universal => false,
        }
    }

    pub fn is_universal(&self) -> bool {
        matches!(self, AttributeSet::Universal)
    }

    pub fn contains(&self, value: &AttrValue) -> bool {
        match self {
            AttributeSet::Empty => false,
            AttributeSet::Finite(values) => values.contains(value),
            AttributeSet::Integers(set) => match value {
                AttrValue::Int(i) => set.contains(*i),
                _ => false,
            },
            AttributeSet::Universal => true,
        }
    }

    fn canonical(self) -> Self {
        if self.is_empty() { AttributeSet::Empty } else { self }
    }

    /// Integer points of a finite set, or `None` if it holds anything else.
    fn as_points(values: &BTreeSet<AttrValue>) -> Option<IntervalSet> {
        let mut points = Vec::with_capacity(values.len());
        for v in values {
            match v {
                AttrValue::Int(i) => points.push((*i, *i)),
                _ => return None,
            }
        }
        Some(IntervalSet::new(points))
    }

    pub fn union(&self, other: &Self) -> Self {
        use AttributeSet::*;
        match (self, other) {
            (Empty, x) | (x, Empty) => x.clone(),
            (Universal, _) | (_, Universal) => Universal,
            (Finite(a), Finite(b)) => Finite(a.union(b).cloned().collect()),
            (Integers(a), Integers(b)) => Integers(a.union(b)),
            (Finite(a), Integers(b)) | (Integers(b), Finite(a)) => match Self::as_points(a) {
                Some(points) => Integers(b.union(&points)),
                None => Universal,
            },
        }
        .canonical()
    }

    pub fn intersection(&self, other: &Self) -> Self {
        use AttributeSet::*;
        match (self, other) {
            (Empty, _) | (_, Empty) => Empty,
            (Universal, x) | (x, Universal) => x.clone(),
            (Finite(a), Finite(b)) => Finite(a.intersection(b).cloned().collect()),
            (Integers(a), Integers(b)) => Integers(a.intersection(b)),
            (Finite(a), Integers(b)) | (Integers(b), Finite(a)) => Finite(
                a.iter()
                    .filter(|v| matches!(v, AttrValue::Int(i) if b.contains(*i)))
                    .cloned()
                    .collect(),
            ),
        }
        .canonical()
    }

    /// `self − other`. The complement of a proper subset of the universe is
    /// not representable, so `Universal − x` stays `Universal` unless `x` is
    /// itself `Universal`.
    pub fn difference(&self, other: &Self) -> Self {
        use AttributeSet::*;
        match (self, other) {
            (Empty, _) => Empty,
            (x, Empty) => x.clone(),
            (_, Universal) => Empty,
            (Universal, _) => Universal,
            (Finite(a), Finite(b)) => Finite(a.difference(b).cloned().collect()),
            (Finite(a), Integers(b)) => Finite(
                a.iter()
                    .filter(|v| !matches!(v, AttrValue::Int(i) if b.contains(*i)))
                    .cloned()
                    .collect(),
            ),
            (Integers(a), Integers(b)) => Integers(a.difference(b)),
            (Integers(a), Finite(b)) => {
                let points: Vec<(i64, i64)> = b
                    .iter()
                    .filter_map(|v| match v {
                        AttrValue::Int(i) => Some((*i, *i)),
                        _ => None,
                    })
                    .collect();
                Integers(a.difference(&IntervalSet::new(points)))
            }
        }
        .canonical()
    }

    pub fn is_subset(&self, other: &Self) -> bool {
        use AttributeSet::*;
        if self.is_empty() {
            return true;
        }
        match (self, other) {
            (_, Universal) => true,
            (Universal, _) => false,
            (_, Empty) => false,
            (Finite(a), Finite(b)) => a.is_subset(b),
            (Finite(a), Integers(b)) => a
                .iter()
                .all(|v| matches!(v, AttrValue::Int(i) if b.contains(*i))),
            (Integers(a), Integers(b)) => a.is_subset(b),
            (Integers(a), Finite(b)) => match a.cardinality() {
                Some(n) if n <= b.len() as u128 => a.intervals().iter().all(|&(lo, hi)| {
                    (lo..=hi).all(|i| b.contains(&AttrValue::Int(i)))
                }),
                _ => false,
            },
            (Empty, _) => true,
        }
    }
}

// Raw scalars normalize into singleton finite sets.
macro_rules! singleton_from {
    ($($ty:ty),*) => {
        $(impl From<$ty> for AttributeSet {
            fn from(v: $ty) -> Self { AttributeSet::finite([AttrValue::from(v)]) }
        })*
    };
}

singleton_from!(bool, i32, i64, f64, String, &str);

impl From<AttrValue> for AttributeSet {
    fn from(v: AttrValue) -> Self {
        AttributeSet::finite([v])
    }
}

impl fmt::Display for AttributeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeSet::Empty => write!(f, "{{}}"),
            AttributeSet::Universal => write!(f, "*"),
            AttributeSet::Finite(values) => {
                write!(f, "{{")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{v}")?;
                }
                write!(f, "}}")
            }
            AttributeSet::Integers(set) => {
                for (i, (lo, hi)) in set.intervals().iter().enumerate() {
                    if i > 0 { write!(f, " ∪ ")?; }
                    let lo = if *lo == i64::MIN { "-inf".to_string() } else { lo.to_string() };
                    let hi = if *hi == i64::MAX { "inf".to_string() } else { hi.to_string() };
                    write!(f, "[{lo}, {hi}]")?;
                }
                Ok(())
            }
        }
    }
}

// ============================================================================
// Serialization
// ============================================================================

type Bound = Option<i64>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
enum TaggedSet {
    FiniteSet(Vec<AttrValue>),
    IntegerSet(Vec<(Bound, Bound)>),
    UniversalSet,
    EmptySet,
}

/// Everything accepted on load: the tagged form, a bare list, or a scalar.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawSet {
    Tagged(TaggedSet),
    List(Vec<AttrValue>),
    Scalar(AttrValue),
}

impl From<AttributeSet> for TaggedSet {
    fn from(set: AttributeSet) -> Self {
        match set {
            AttributeSet::Empty => TaggedSet::EmptySet,
            AttributeSet::Universal => TaggedSet::UniversalSet,
            AttributeSet::Finite(values) => TaggedSet::FiniteSet(values.into_iter().collect()),
            AttributeSet::Integers(set) => TaggedSet::IntegerSet(
                set.intervals()
                    .iter()
                    .map(|&(lo, hi)| {
                        (
                            (lo != i64::MIN).then_some(lo),
                            (hi != i64::MAX).then_some(hi),
                        )
                    })
                    .collect(),
            ),
        }
    }
}

impl From<RawSet> for AttributeSet {
    fn from(raw: RawSet) -> Self {
        match raw {
            RawSet::Tagged(TaggedSet::EmptySet) => AttributeSet::Empty,
            RawSet::Tagged(TaggedSet::UniversalSet) => AttributeSet::Universal,
            RawSet::Tagged(TaggedSet::FiniteSet(values)) | RawSet::List(values) => {
                AttributeSet::finite(values)
            }
            RawSet::Tagged(TaggedSet::IntegerSet(bounds)) => AttributeSet::integers(
                bounds
                    .into_iter()
                    .map(|(lo, hi)| (lo.unwrap_or(i64::MIN), hi.unwrap_or(i64::MAX))),
            ),
            RawSet::Scalar(v) => AttributeSet::from(v),
        }
    }
}
