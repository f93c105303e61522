//! Compact chunk-number ranges, e.g. `1-3,5,8-10`.
//!
//! The store reports its held chunk numbers this way (§3 "Range"), and the
//! engine both parses what the store reports and truncates it to fit the
//! 4096-byte request cap (§4.4, S7).

use crate::error::WireError;

/// A sorted, non-overlapping set of closed integer intervals.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeSet {
    ranges: Vec<(u32, u32)>,
}

impl RangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a range set from an arbitrary (possibly unsorted, possibly
    /// duplicated) collection of chunk numbers, collapsing consecutive runs.
    pub fn from_ids<I: IntoIterator<Item = u32>>(ids: I) -> Self {
        let mut sorted: Vec<u32> = ids.into_iter().collect();
        sorted.sort_unstable();
        sorted.dedup();

        let mut ranges = Vec::new();
        for id in sorted {
            match ranges.last_mut() {
                Some((_, end)) if *end + 1 == id => *end = id,
                _ => ranges.push((id, id)),
            }
        }
        Self { ranges }
    }

    /// Parse a compact range string such as `1-3,5,8-10`. An empty string is
    /// a valid, empty range set.
    pub fn parse(s: &str) -> Result<Self, WireError> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(Self::new());
        }

        let mut ids = Vec::new();
        for part in s.split(',') {
            let part = part.trim();
            if part.is_empty() {
                return Err(WireError::BadRange(s.to_string()));
            }
            if let Some((lo, hi)) = part.split_once('-') {
                let lo: u32 = lo.parse().map_err(|_| WireError::BadRange(s.to_string()))?;
                let hi: u32 = hi.parse().map_err(|_| WireError::BadRange(s.to_string()))?;
                if lo > hi {
                    return Err(WireError::BadRange(s.to_string()));
                }
                ids.extend(lo..=hi);
            } else {
                let v: u32 = part.parse().map_err(|_| WireError::BadRange(s.to_string()))?;
                ids.push(v);
            }
        }
        Ok(Self::from_ids(ids))
    }

    /// Render the compact string form.
    pub fn to_compact_string(&self) -> String {
        self.ranges
            .iter()
            .map(|(lo, hi)| if lo == hi { lo.to_string() } else { format!("{lo}-{hi}") })
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// The largest chunk number currently held, if any.
    pub fn max(&self) -> Option<u32> {
        self.ranges.last().map(|(_, hi)| *hi)
    }

    pub fn contains(&self, id: u32) -> bool {
        self.ranges
            .binary_search_by(|(lo, hi)| {
                if id < *lo {
                    std::cmp::Ordering::Greater
                } else if id > *hi {
                    std::cmp::Ordering::Less
                } else {
                    std::cmp::Ordering::Equal
                }
            })
            .is_ok()
    }

    /// Iterate individual chunk numbers in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.ranges.iter().flat_map(|&(lo, hi)| lo..=hi)
    }

    /// Render a string no longer than `max_bytes`, truncating from the right
    /// by collapsing the trailing range(s) into a single `lo-max` range that
    /// still advertises the true upper bound (§4.4 "Request construction").
    ///
    /// If even `lo-max` alone overflows `max_bytes` (pathologically small
    /// caps, or a single enormous range), the range is dropped and an empty
    /// string returned rather than silently lying about the bound.
    pub fn truncate_to_fit(&self, max_bytes: usize) -> String {
        let full = self.to_compact_string();
        if full.len() <= max_bytes {
            return full;
        }

        let Some(max_id) = self.max() else {
            return full;
        };

        // Binary-search the largest prefix of `ranges` whose compact string,
        // with its final range's upper bound replaced by `max_id`, still
        // fits. We walk from the full set down, dropping trailing ranges one
        // at a time — the declared sequence is short in practice (a handful
        // of gaps), so this is not performance sensitive.
        for keep in (0..self.ranges.len()).rev() {
            let mut candidate: Vec<(u32, u32)> = self.ranges[..=keep].to_vec();
            if let Some(last) = candidate.last_mut() {
                last.1 = max_id;
            }
            let rendered = RangeSet { ranges: candidate }.to_compact_string();
            if rendered.len() <= max_bytes {
                return rendered;
            }
        }

        // Nothing fits except the bare upper bound itself.
        let bare = max_id.to_string();
        if bare.len() <= max_bytes {
            bare
        } else {
            String::new()
        }
    }
}
