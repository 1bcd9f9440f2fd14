//! Mapping of workflow errors to HTTP responses.

use axum::{http::StatusCode, Json};
use serde::Serialize;

use archivist_core::WorkflowError;

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Error half of every handler result.
pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn error_response(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

/// HTTP status for a workflow error.
pub fn status_for(err: &WorkflowError) -> StatusCode {
    match err {
        WorkflowError::ObjectNotFound(_) | WorkflowError::PackageNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        WorkflowError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        WorkflowError::DuplicatePackage { .. }
        | WorkflowError::ObjectFrozen(_)
        | WorkflowError::PackageCancelled(_)
        | WorkflowError::StalePackage(_)
        | WorkflowError::InvalidPackageState { .. }
        | WorkflowError::AlreadyUploaded(_)
        | WorkflowError::JobsRunning(_)
        | WorkflowError::NotReenqueueable { .. } => StatusCode::CONFLICT,
        WorkflowError::Toolkit(_) | WorkflowError::Archive(_) => StatusCode::BAD_GATEWAY,
        WorkflowError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        WorkflowError::Store(_) | WorkflowError::Queue(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<WorkflowError> for ErrorResponse {
    fn from(err: WorkflowError) -> Self {
        Self {
            error: err.to_string(),
        }
    }
}

/// Convert a workflow error into its HTTP response.
pub fn workflow_error(err: WorkflowError) -> ApiError {
    (status_for(&err), Json(ErrorResponse::from(err)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_errors_are_conflicts() {
        assert_eq!(
            status_for(&WorkflowError::JobsRunning(vec![1, 2])),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&WorkflowError::NotReenqueueable {
                object_id: 1,
                reason: "Object is frozen".to_string(),
            }),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_missing_object_is_not_found() {
        let (status, Json(body)) = workflow_error(WorkflowError::ObjectNotFound(7));
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.error, "museum object not found: 7");
    }

    #[test]
    fn test_invalid_request_is_bad_request() {
        assert_eq!(
            status_for(&WorkflowError::InvalidRequest("no ids".to_string())),
            StatusCode::BAD_REQUEST
        );
    }
}
