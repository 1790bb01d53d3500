use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Result};
use axum::Json;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::merge;
use crate::server::convert_errors;
use crate::state::State as AppState;

use super::responses::{MalformedCoursesParam, NotFound};

pub async fn list_calendars(State(state): State<AppState>) -> Result<Json<Vec<String>>> {
    convert_errors(async move {
        let mut tx = state.storage.begin().await?;
        let feeds = tx.list_feeds().await?;
        tx.commit().await?;

        Ok(Json(feeds))
    })
    .await
}

pub async fn list_courses(
    State(state): State<AppState>,
    Path(feed): Path<String>,
) -> Result<Json<Vec<String>>> {
    let courses = convert_errors(async {
        let mut tx = state.storage.begin().await?;
        let courses = tx.list_courses(&feed).await?;
        tx.commit().await?;

        Ok(courses)
    })
    .await?;

    if courses.is_empty() {
        return Err(NotFound { what: "calendar" }.into());
    }

    Ok(Json(courses))
}

pub async fn list_course_types(
    State(state): State<AppState>,
    Path((feed, course)): Path<(String, String)>,
) -> Result<Json<Vec<String>>> {
    let types = convert_errors(async {
        let mut tx = state.storage.begin().await?;
        let types = tx.list_course_types(&feed, &course).await?;
        tx.commit().await?;

        Ok(types)
    })
    .await?;

    if types.is_empty() {
        return Err(NotFound { what: "course" }.into());
    }

    Ok(Json(types))
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInfo {
    update_start: Option<String>,
    update_end: Option<String>,
}

pub async fn update_info(State(state): State<AppState>) -> Result<Json<UpdateInfo>> {
    convert_errors(async move {
        let mut tx = state.storage.begin().await?;
        let (update_start, update_end) = tx.update_info().await?;
        tx.commit().await?;

        Ok(Json(UpdateInfo {
            update_start,
            update_end,
        }))
    })
    .await
}

#[derive(Deserialize, Debug, Clone)]
pub struct CalendarQuery {
    /// A base64-encoded JSON array of `<feed>/<courseKey>` strings.
    courses: String,
}

pub async fn calendar(
    State(state): State<AppState>,
    Query(query): Query<CalendarQuery>,
) -> Result<impl IntoResponse> {
    let requested = decode_courses_param(&query.courses)?;

    // Unknown keys are dropped without complaint; a request that names no
    // stored sub-calendar gets an empty calendar back.
    let merged = convert_errors(async {
        let mut tx = state.storage.begin().await?;
        let valid = merge::resolve(&mut tx, &requested).await?;
        let merged = merge::merge(&mut tx, &valid).await?;
        tx.commit().await?;

        Ok(merged)
    })
    .await?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/calendar"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"calendar.ics\"",
            ),
        ],
        merged.to_string(),
    ))
}

fn decode_courses_param(param: &str) -> Result<Vec<String>, MalformedCoursesParam> {
    let decoded = BASE64.decode(param).map_err(|e| MalformedCoursesParam {
        reason: format!("invalid base64: {e}"),
    })?;

    serde_json::from_slice(&decoded).map_err(|e| MalformedCoursesParam {
        reason: format!("invalid JSON: {e}"),
    })
}
