use std::collections::BTreeMap;

use jiff::{
    civil::{Date, DateTime},
    ToSpan,
};
use log::warn;

use crate::picks::{Pick, PickType, RawPick};

/// Format of the timestamps in the historical log, e.g. `12/15/23, 8:57:33 AM`
pub const TIMESTAMP_FORMAT: &str = "%m/%d/%y, %I:%M:%S %p";

/// Parse a timestamp like `12/15/23, 8:57:33 AM`.  Return `None` if the text
/// doesn't match the format.
///
/// Chat exports sometimes put a narrow no-break space (U+202F) before the
/// AM/PM marker, it is treated as a regular space.
pub fn parse_timestamp(text: &str) -> Option<DateTime> {
    let text = text.trim().replace('\u{202f}', " ");
    DateTime::strptime(TIMESTAMP_FORMAT, &text).ok()
}

/// Get the Monday of the week containing the given date
pub fn week_start(date: Date) -> Date {
    let offset = date.weekday().to_monday_zero_offset();
    date.saturating_sub(i64::from(offset).days())
}

/// Last day (Sunday) of the week starting on `week_start`
pub fn week_end(week_start: Date) -> Date {
    week_start.saturating_add(6.days())
}

/// Bucket the raw picks by the Monday of their week.  Weeks come out in
/// ascending order, picks keep their input order inside a week.
///
/// Entries with a malformed timestamp are dropped silently.  Entries with an
/// unknown pick type are dropped with a warning.
pub fn group_by_week(raw: Vec<RawPick>) -> BTreeMap<Date, Vec<Pick>> {
    let mut weeks: BTreeMap<Date, Vec<Pick>> = BTreeMap::new();
    for record in raw {
        let Some(timestamp) = parse_timestamp(&record.timestamp) else {
            continue;
        };
        let pick_type = match record.pick_type.parse::<PickType>() {
            Ok(t) => t,
            Err(e) => {
                warn!("Skipping pick by {} at {}: {}", record.person, record.timestamp, e);
                continue;
            }
        };
        weeks
            .entry(week_start(timestamp.date()))
            .or_default()
            .push(Pick {
                timestamp,
                person: record.person,
                pick_type,
                url: record.url,
            });
    }
    weeks
}
