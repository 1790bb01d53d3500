//! End-to-end coverage of the split → persist → resolve/merge pipeline over
//! an in-memory store.

use std::collections::BTreeMap;

use calsplit::merge;
use calsplit::split::split;
use calsplit::storage::Storage;
use icalendar::{Calendar, Component, Event};

fn event(uid: &str, summary: &str, description: &str) -> Event {
    let mut event = Event::new();
    event.uid(uid).summary(summary);

    if !description.is_empty() {
        event.description(description);
    }

    event.add_property("DTSTART", "20240902T080000Z");
    event.add_property("DTEND", "20240902T100000Z");

    event.done()
}

fn calendar(events: impl IntoIterator<Item = Event>) -> Calendar {
    let mut calendar = Calendar::new();

    for event in events {
        calendar.push(event);
    }

    calendar.done()
}

async fn persist(storage: &Storage, feed: &str, feed_calendar: &Calendar) {
    let groups = split(feed_calendar);
    persist_groups(storage, feed, &groups).await;
}

async fn persist_groups(storage: &Storage, feed: &str, groups: &BTreeMap<String, Calendar>) {
    let mut tx = storage.begin().await.unwrap();
    tx.persist_feed(feed, groups).await.unwrap();
    tx.commit().await.unwrap();
}

async fn stored_calendar(storage: &Storage, request_key: &str) -> Calendar {
    let mut tx = storage.begin().await.unwrap();
    let text = tx
        .course_calendar(request_key)
        .await
        .unwrap()
        .unwrap_or_else(|| panic!("no stored calendar at `{request_key}`"));
    tx.commit().await.unwrap();

    text.parse().unwrap()
}

fn summaries(calendar: &Calendar) -> Vec<&str> {
    calendar
        .components
        .iter()
        .filter_map(|c| c.as_event())
        .filter_map(|e| e.get_summary())
        .collect()
}

fn uids(calendar: &Calendar) -> Vec<&str> {
    calendar
        .components
        .iter()
        .filter_map(|c| c.as_event())
        .filter_map(|e| e.get_uid())
        .collect()
}

#[tokio::test]
async fn sync_scenario_indexes_course_and_type() {
    let storage = Storage::in_memory().await.unwrap();

    persist(
        &storage,
        "L1",
        &calendar([event("e1", "Prof - Calculus", "Type: TP\n")]),
    )
    .await;

    let mut tx = storage.begin().await.unwrap();
    assert_eq!(tx.list_feeds().await.unwrap(), ["L1"]);
    assert_eq!(tx.list_courses("L1").await.unwrap(), ["Calculus"]);
    assert_eq!(tx.list_course_types("L1", "Calculus").await.unwrap(), ["tp"]);
    tx.commit().await.unwrap();

    let course_only = stored_calendar(&storage, "L1/Calculus").await;
    let typed = stored_calendar(&storage, "L1/Calculus/tp").await;
    assert_eq!(summaries(&course_only), ["Calculus"]);
    assert_eq!(summaries(&typed), ["Calculus"]);
    assert_eq!(uids(&course_only), ["e1"]);
    assert_eq!(uids(&typed), ["e1"]);
}

#[tokio::test]
async fn cancelled_events_are_indexed_under_their_clean_name() {
    let storage = Storage::in_memory().await.unwrap();

    persist(
        &storage,
        "L1",
        &calendar([event("e1", "Prof - Calculus", "Type: TP\nannulé\n")]),
    )
    .await;

    let mut tx = storage.begin().await.unwrap();
    assert_eq!(tx.list_courses("L1").await.unwrap(), ["Calculus"]);
    assert_eq!(tx.list_course_types("L1", "Calculus").await.unwrap(), ["tp"]);
    tx.commit().await.unwrap();

    let course_only = stored_calendar(&storage, "L1/Calculus").await;
    let typed = stored_calendar(&storage, "L1/Calculus/tp").await;
    assert_eq!(summaries(&course_only), ["[ANNULÉ] Calculus"]);
    assert_eq!(summaries(&typed), ["[ANNULÉ] Calculus"]);
}

#[tokio::test]
async fn persist_round_trip_preserves_the_event_set() {
    let storage = Storage::in_memory().await.unwrap();

    persist(
        &storage,
        "l1",
        &calendar([
            event("a", "Dupont - Algebra", ""),
            event("b", "Dupont - Algebra", ""),
            event("c", "Martin - Calculus", ""),
        ]),
    )
    .await;

    let mut tx = storage.begin().await.unwrap();
    let valid = merge::resolve(&mut tx, &["l1/Algebra".into()]).await.unwrap();
    let merged = merge::merge(&mut tx, &valid).await.unwrap();
    tx.commit().await.unwrap();

    assert_eq!(uids(&merged), ["a", "b"]);
}

#[tokio::test]
async fn resolve_drops_unknown_keys() {
    let storage = Storage::in_memory().await.unwrap();

    persist(
        &storage,
        "feedX",
        &calendar([event("a", "Prof - Algebra", "")]),
    )
    .await;

    let mut tx = storage.begin().await.unwrap();
    let valid = merge::resolve(
        &mut tx,
        &["feedX/Algebra".into(), "feedX/DoesNotExist".into()],
    )
    .await
    .unwrap();
    let merged = merge::merge(&mut tx, &valid).await.unwrap();
    tx.commit().await.unwrap();

    assert_eq!(valid, ["feedX/Algebra"]);
    assert_eq!(uids(&merged), ["a"]);
}

#[tokio::test]
async fn merge_deduplicates_events_shared_across_keys() {
    let storage = Storage::in_memory().await.unwrap();

    // The typed sub-calendar holds a copy of the same event.
    persist(
        &storage,
        "l1",
        &calendar([event("a", "Dupont - Algebra", "Type: TP\n")]),
    )
    .await;

    let mut tx = storage.begin().await.unwrap();
    let valid = merge::resolve(&mut tx, &["l1/Algebra".into(), "l1/Algebra/tp".into()])
        .await
        .unwrap();
    let merged = merge::merge(&mut tx, &valid).await.unwrap();
    tx.commit().await.unwrap();

    assert_eq!(valid.len(), 2);
    assert_eq!(uids(&merged), ["a"]);
}

#[tokio::test]
async fn an_empty_request_merges_to_an_empty_calendar() {
    let storage = Storage::in_memory().await.unwrap();

    let mut tx = storage.begin().await.unwrap();
    let valid = merge::resolve(&mut tx, &[]).await.unwrap();
    let merged = merge::merge(&mut tx, &valid).await.unwrap();
    tx.commit().await.unwrap();

    assert!(valid.is_empty());
    assert!(merged.components.is_empty());
}

#[tokio::test]
async fn persisting_twice_is_idempotent() {
    let storage = Storage::in_memory().await.unwrap();
    let feed = calendar([
        event("a", "Dupont - Algebra", "Type: TP\n"),
        event("b", "Martin - Calculus", ""),
    ]);

    persist(&storage, "l1", &feed).await;
    persist(&storage, "l1", &feed).await;

    let mut tx = storage.begin().await.unwrap();
    assert_eq!(tx.list_feeds().await.unwrap(), ["l1"]);
    assert_eq!(tx.list_courses("l1").await.unwrap(), ["Algebra", "Calculus"]);
    assert_eq!(tx.list_course_types("l1", "Algebra").await.unwrap(), ["tp"]);
    tx.commit().await.unwrap();

    let algebra = stored_calendar(&storage, "l1/Algebra").await;
    assert_eq!(uids(&algebra), ["a"]);
}

#[tokio::test]
async fn a_narrower_resync_leaves_stale_keys_in_place() {
    let storage = Storage::in_memory().await.unwrap();

    persist(
        &storage,
        "l1",
        &calendar([
            event("a", "Dupont - Algebra", ""),
            event("b", "Martin - Calculus", ""),
        ]),
    )
    .await;

    // Calculus disappears from the feed; its keys stay behind.
    persist(&storage, "l1", &calendar([event("a", "Dupont - Algebra", "")])).await;

    let mut tx = storage.begin().await.unwrap();
    assert_eq!(tx.list_courses("l1").await.unwrap(), ["Algebra", "Calculus"]);
    assert!(tx.course_exists("l1/Calculus").await.unwrap());
    tx.commit().await.unwrap();
}

#[tokio::test]
async fn course_lists_come_back_sorted() {
    let storage = Storage::in_memory().await.unwrap();

    persist(
        &storage,
        "l1",
        &calendar([
            event("a", "Prof - Zoology", ""),
            event("b", "Prof - Algebra", ""),
            event("c", "Prof - Calculus", ""),
        ]),
    )
    .await;
    persist(&storage, "m1", &calendar([event("d", "Prof - Logic", "")])).await;

    let mut tx = storage.begin().await.unwrap();
    assert_eq!(tx.list_feeds().await.unwrap(), ["l1", "m1"]);
    assert_eq!(
        tx.list_courses("l1").await.unwrap(),
        ["Algebra", "Calculus", "Zoology"]
    );
    tx.commit().await.unwrap();
}

#[tokio::test]
async fn update_timestamps_are_stored_verbatim() {
    let storage = Storage::in_memory().await.unwrap();

    let mut tx = storage.begin().await.unwrap();
    assert_eq!(tx.update_info().await.unwrap(), (None, None));
    tx.set_update_start("2026-08-26T06:00:00Z").await.unwrap();
    tx.set_update_end("2026-08-26T06:00:04Z").await.unwrap();
    tx.commit().await.unwrap();

    let mut tx = storage.begin().await.unwrap();
    let (start, end) = tx.update_info().await.unwrap();
    tx.commit().await.unwrap();

    assert_eq!(start.as_deref(), Some("2026-08-26T06:00:00Z"));
    assert_eq!(end.as_deref(), Some("2026-08-26T06:00:04Z"));
}
