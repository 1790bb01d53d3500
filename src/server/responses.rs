use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// 404 with a JSON error payload, for index lookups that matched nothing.
#[derive(Debug, Clone)]
pub struct NotFound {
    pub what: &'static str,
}

impl IntoResponse for NotFound {
    fn into_response(self) -> Response {
        let what = self.what;

        IntoResponse::into_response((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("{what} not found") })),
        ))
    }
}

/// 400 for a merge request whose payload could not be decoded.
#[derive(Debug, Clone)]
pub struct MalformedCoursesParam {
    pub reason: String,
}

impl IntoResponse for MalformedCoursesParam {
    fn into_response(self) -> Response {
        let reason = self.reason;

        IntoResponse::into_response((
            StatusCode::BAD_REQUEST,
            format!("The `courses` parameter is malformed: {reason}"),
        ))
    }
}
