//! Stable record ordering.

use std::cmp::Ordering;

use crate::record::PostRecord;
use crate::request::{SortDirection, SortKey};

/// Sorts `records` in place by `key`.
///
/// The sort is stable in both directions: `Desc` reverses the comparison,
/// not the slice, so records with equal keys keep their incoming order.
pub fn sort_records(records: &mut [PostRecord], key: SortKey, direction: SortDirection) {
    records.sort_by(|a, b| {
        let ord = compare(a, b, key);
        match direction {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        }
    });
}

fn compare(a: &PostRecord, b: &PostRecord, key: SortKey) -> Ordering {
    match key {
        SortKey::Date => a.timestamp().cmp(&b.timestamp()),
        SortKey::Reactions => a.reactions().cmp(&b.reactions()),
        SortKey::Views => a.views().cmp(&b.views()),
    }
}
