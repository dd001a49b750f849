use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use tracing::{debug, error, warn};

use super::dto::PushRequest;
use super::error::IngressError;
use super::model::JobReport;
use crate::common::response::{ApiError, ApiResponse, ApiSuccess};
use crate::state::AppState;

pub const WELCOME: &str = "Welcome to the video processing service";
const MISSING_FILENAME: &str = "Bad Request: missing filename.";
const INVALID_FILENAME: &str = "Bad Request: invalid filename.";
const PROCESSING_FAILED: &str = "Processing failed";

/// Transcode the raw video named in a storage notification
#[utoipa::path(
    post,
    path = "/process-video",
    request_body = PushRequest,
    responses(
        (status = 200, description = "Processed video uploaded and public", body = ApiResponse<JobReport>),
        (status = 400, description = "Missing or invalid filename"),
        (status = 500, description = "Processing failed")
    ),
    tag = "Jobs"
)]
pub async fn process_video(
    State(state): State<AppState>,
    payload: Result<Json<PushRequest>, JsonRejection>,
) -> impl IntoResponse {
    let notification = payload
        .map_err(|rejection| IngressError::Body(rejection.body_text()))
        .and_then(|Json(request)| {
            debug!(
                message_id = ?request.message.message_id,
                subscription = ?request.subscription,
                event_type = ?request.message.attributes.get("eventType"),
                "Push request received"
            );
            request.decode()
        });

    let key = match notification {
        Ok(notification) => {
            debug!(bucket = ?notification.bucket, "Notification for {}", notification.name);
            notification.name
        }
        Err(e) => {
            warn!("Rejecting push request: {}", e);
            return ApiError(MISSING_FILENAME, StatusCode::BAD_REQUEST).into_response();
        }
    };

    // Detached so a dropped connection cannot cancel a job halfway through.
    let jobs = state.jobs.clone();
    let outcome = tokio::spawn(async move { jobs.run(&key).await }).await;

    match outcome {
        Ok(Ok(report)) => ApiSuccess(
            ApiResponse::success(report, "Processing finished successfully"),
            StatusCode::OK,
        )
        .into_response(),
        Ok(Err(e)) if e.is_client_error() => ApiError(INVALID_FILENAME, StatusCode::BAD_REQUEST).into_response(),
        Ok(Err(_)) => ApiError(PROCESSING_FAILED, StatusCode::INTERNAL_SERVER_ERROR).into_response(),
        Err(e) => {
            error!("Job task aborted: {}", e);
            ApiError(PROCESSING_FAILED, StatusCode::INTERNAL_SERVER_ERROR).into_response()
        }
    }
}

pub async fn welcome() -> &'static str {
    WELCOME
}
