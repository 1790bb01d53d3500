//! Re-assembles a client-chosen set of sub-calendars into one calendar.

use std::collections::HashSet;

use anyhow::{anyhow, Result};
use icalendar::{Calendar, CalendarComponent, Component};
use tracing::debug;

use crate::storage::Tx;

/// Filters a merge request down to the keys that exist in the store.
///
/// Request items are `<feed>/<courseKey>` strings. Unknown items are dropped
/// without an error; a request that resolves to nothing is answered with an
/// empty calendar further down the line.
pub async fn resolve(tx: &mut Tx, requested: &[String]) -> Result<Vec<String>> {
    let mut valid = Vec::with_capacity(requested.len());

    for key in requested {
        if tx.course_exists(key).await? {
            valid.push(key.clone());
        } else {
            debug!(%key, "Dropping an unknown course key from a merge request");
        }
    }

    Ok(valid)
}

/// Unions the events of the given sub-calendars into one output calendar.
///
/// An event requested through several keys (a course and one of its typed
/// sub-calendars, say) appears once in the output, identified by its UID.
/// Events without a UID cannot be compared and are always kept.
pub async fn merge(tx: &mut Tx, keys: &[String]) -> Result<Calendar> {
    let mut output = Calendar::new();
    let mut seen_uids = HashSet::new();

    for key in keys {
        let Some(text) = tx.course_calendar(key).await? else {
            // Resolved keys can disappear mid-request if a sync overwrites
            // them; treat that the same as an unknown key.
            debug!(%key, "A resolved course key vanished from the store");
            continue;
        };

        let calendar: Calendar = text
            .parse()
            .map_err(|e| anyhow!("could not parse the stored calendar `{key}`: {e}"))?;

        for component in calendar.components {
            let CalendarComponent::Event(event) = component else {
                continue;
            };

            if let Some(uid) = event.get_uid() {
                if !seen_uids.insert(uid.to_owned()) {
                    continue;
                }
            }

            output.push(event);
        }
    }

    Ok(output.done())
}
