//! Splits a parsed feed calendar into per-course and per-course-type
//! sub-calendars.
//!
//! Event summaries follow the `"<group> - <course>"` convention used by the
//! upstream timetable exports; the course part is the grouping key. A
//! cancelled occurrence keeps its course key and only changes its display
//! name, so it stays next to its non-cancelled siblings.

use std::collections::BTreeMap;

use icalendar::{Calendar, CalendarComponent, Component};
use tracing::debug;

const NAME_SEPARATOR: &str = " - ";
const CANCELLED_MARKER: &str = "annulé";
const CANCELLED_PREFIX: &str = "[ANNULÉ] ";

/// Extracts the course name from a raw event summary.
///
/// Splitting on `" - "` must yield at least two segments for the second one
/// to be taken; otherwise the summary is already the course name.
pub fn clean_name(raw: &str) -> &str {
    raw.split(NAME_SEPARATOR).nth(1).unwrap_or(raw)
}

/// Whether the event represents a cancelled occurrence.
///
/// The marker is matched case-insensitively in the raw (pre-clean) summary
/// and in the description, with Unicode case folding so `ANNULÉ` matches.
pub fn is_cancelled(raw_name: &str, description: &str) -> bool {
    raw_name.to_lowercase().contains(CANCELLED_MARKER)
        || description.to_lowercase().contains(CANCELLED_MARKER)
}

/// The summary stored in the sub-calendars. Never used as a grouping key.
pub fn display_name(clean: &str, cancelled: bool) -> String {
    if cancelled {
        format!("{CANCELLED_PREFIX}{clean}")
    } else {
        clean.to_owned()
    }
}

/// Extracts the course type (`tp`, `cm`, ...) from an event description.
///
/// The first case-folded line containing `type` wins; the value is whatever
/// follows the first `:` on that line, trimmed. A matching line with no `:`
/// or an empty value means no type.
pub fn extract_type(description: &str) -> Option<String> {
    // DESCRIPTION survives ICS round trips with its newlines escaped.
    let folded = description.to_lowercase().replace("\\n", "\n");
    let line = folded.lines().find(|line| line.contains("type"))?;
    let (_, value) = line.split_once(':')?;
    let value = value.trim();

    (!value.is_empty()).then(|| value.to_owned())
}

/// Groups a feed's events into sub-calendars keyed by course key.
///
/// Every event lands in its course-only group and, when a type could be
/// extracted from its description, in the `<course>/<type>` group as well.
/// Each group owns an independent copy of the event so that the stored
/// sub-calendars cannot alias each other. Within a group, events keep the
/// feed's order.
pub fn split(calendar: &Calendar) -> BTreeMap<String, Calendar> {
    let mut groups: BTreeMap<String, Calendar> = BTreeMap::new();

    for component in &calendar.components {
        let CalendarComponent::Event(event) = component else {
            continue;
        };

        let Some(raw_name) = event.get_summary() else {
            debug!(uid = ?event.get_uid(), "Skipping an event without a summary");
            continue;
        };

        let description = event.get_description().unwrap_or_default();
        let course = clean_name(raw_name).to_owned();
        let cancelled = is_cancelled(raw_name, description);

        let mut stored = event.clone();
        stored.summary(&display_name(&course, cancelled));

        if let Some(kind) = extract_type(description) {
            groups
                .entry(format!("{course}/{kind}"))
                .or_default()
                .push(stored.clone());
        }

        groups.entry(course).or_default().push(stored);
    }

    groups
}
