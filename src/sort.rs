//! Comparators for sorting table rows.
//!
//! Each comparator returns the ascending [`Ordering`] reversed for
//! [`SortOrder::Desc`], so they plug straight into `sort_by`.

use std::cmp::Ordering;

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Smallest first.
    #[default]
    Asc,
    /// Largest first.
    Desc,
}

impl SortOrder {
    /// Apply this direction to an ascending ordering.
    pub fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    }
}

/// Compare strings case-insensitively.
pub fn sort_by_string(a: &str, b: &str, order: SortOrder) -> Ordering {
    let ordering = a
        .to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b));
    order.apply(ordering)
}

/// Compare numbers; NaN sorts after every other value.
pub fn sort_by_number(a: f64, b: f64, order: SortOrder) -> Ordering {
    order.apply(a.total_cmp(&b))
}

/// Parse an API timestamp: RFC 3339, or the API's zone-less UTC form
/// `2024-01-31T12:00:00`.
pub fn parse_api_date(value: &str) -> Option<NaiveDateTime> {
    if let Ok(date) = DateTime::parse_from_rfc3339(value) {
        return Some(date.naive_utc());
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f").ok()
}

/// Compare API timestamps chronologically.
///
/// Unparseable timestamps sort after valid ones in either direction.
pub fn sort_by_utf_date(a: &str, b: &str, order: SortOrder) -> Ordering {
    match (parse_api_date(a), parse_api_date(b)) {
        (Some(a), Some(b)) => order.apply(a.cmp(&b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Compare slices by length.
pub fn sort_by_array_length<T>(a: &[T], b: &[T], order: SortOrder) -> Ordering {
    order.apply(a.len().cmp(&b.len()))
}
