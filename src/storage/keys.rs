//! Key layout of the store.
//!
//! - `calendars` — set of known feed names.
//! - `coursesList/<feed>` — set of course names seen in the feed.
//! - `coursesList/<feed>/<course>` — set of type names seen for the course.
//! - `course/<feed>/<courseKey>` — serialized ICS text of one sub-calendar.
//! - `updateStart`, `updateEnd` — timestamps of the last sync run.
//!
//! A course key is either `<course>` or `<course>/<type>`; neither part
//! contains a `/` of its own, so splitting on the first `/` is unambiguous.

pub const CALENDARS: &str = "calendars";
pub const UPDATE_START: &str = "updateStart";
pub const UPDATE_END: &str = "updateEnd";

pub fn course(feed: &str, course_key: &str) -> String {
    format!("course/{feed}/{course_key}")
}

/// Store key for a merge-request item, which is already `<feed>/<courseKey>`.
pub fn course_entry(request_key: &str) -> String {
    format!("course/{request_key}")
}

pub fn courses_list(feed: &str) -> String {
    format!("coursesList/{feed}")
}

pub fn course_types(feed: &str, course: &str) -> String {
    format!("coursesList/{feed}/{course}")
}

/// Splits a course key into its course name and optional type name.
pub fn split_course_key(course_key: &str) -> (&str, Option<&str>) {
    match course_key.split_once('/') {
        Some((course, kind)) => (course, Some(kind)),
        None => (course_key, None),
    }
}
