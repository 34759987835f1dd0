mod events;
mod healthcheck;
mod subjects;

use salvo::http::StatusCode;
use salvo::writing::Json;
use salvo::{Response, Router};
use serde::Serialize;

use crate::middleware::acting_user::ActingUserMiddleware;
use satchel_service::error::ServiceError;

// Re-export route constants from core
pub use satchel_core::constants::{
    API_ROUTE_COMPONENT, API_ROUTE_PREFIX, CALENDAR_ROUTE_COMPONENT, CALENDAR_ROUTE_PREFIX,
    SUBJECTS_ROUTE_COMPONENT, SUBJECTS_ROUTE_PREFIX,
};

/// ## Summary
/// Constructs the main API router.
pub fn routes() -> Router {
    Router::with_path(API_ROUTE_COMPONENT)
        .hoop(ActingUserMiddleware)
        .push(healthcheck::routes())
        .push(events::routes())
        .push(subjects::routes())
}

/// ## Summary
/// Error response payload
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub(crate) fn render(res: &mut Response, status: StatusCode, message: impl Into<String>) {
        res.status_code(status);
        res.render(Json(Self {
            error: message.into(),
        }));
    }
}

/// Maps a service error onto an HTTP status.
///
/// Storage failures carry the underlying diesel error inside `anyhow`, so
/// constraint violations are recovered by downcasting instead of collapsing
/// everything to 500.
pub(crate) fn service_error_status(err: &ServiceError) -> StatusCode {
    use diesel::result::{DatabaseErrorKind, Error as DieselError};

    match err {
        ServiceError::RecurrenceParse { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        ServiceError::InvalidWindow { .. } | ServiceError::ValidationError(_) => {
            StatusCode::BAD_REQUEST
        }
        ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
        ServiceError::Conflict(_) => StatusCode::CONFLICT,
        ServiceError::Storage(source) => match source.downcast_ref::<DieselError>() {
            Some(DieselError::NotFound) => StatusCode::NOT_FOUND,
            Some(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
                StatusCode::CONFLICT
            }
            Some(DieselError::DatabaseError(
                DatabaseErrorKind::ForeignKeyViolation | DatabaseErrorKind::CheckViolation,
                _,
            )) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        },
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// ## Summary
/// Maps a service error onto an HTTP status and renders the error body.
///
/// Malformed recurrence grammar is a 422 so clients can distinguish "your
/// rule is wrong" from plain bad parameters; storage failures propagate as
/// 500 without detail.
pub(crate) fn render_service_error(res: &mut Response, err: &ServiceError) {
    let status = service_error_status(err);

    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!(error = ?err, "Request failed");
        ErrorResponse::render(res, status, "Internal server error");
    } else {
        ErrorResponse::render(res, status, err.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use diesel::result::{DatabaseErrorKind, Error as DieselError};

    fn storage(err: DieselError) -> ServiceError {
        ServiceError::Storage(anyhow::Error::from(err))
    }

    #[test]
    fn constraint_violations_inside_storage_errors_keep_their_status() {
        let duplicate = storage(DieselError::DatabaseError(
            DatabaseErrorKind::UniqueViolation,
            Box::new("duplicate slot".to_string()),
        ));
        assert_eq!(service_error_status(&duplicate), StatusCode::CONFLICT);

        let missing = storage(DieselError::NotFound);
        assert_eq!(service_error_status(&missing), StatusCode::NOT_FOUND);

        let bad_reference = storage(DieselError::DatabaseError(
            DatabaseErrorKind::ForeignKeyViolation,
            Box::new("unknown subject".to_string()),
        ));
        assert_eq!(service_error_status(&bad_reference), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn opaque_storage_errors_stay_internal() {
        let opaque = ServiceError::Storage(anyhow::anyhow!("connection reset"));
        assert_eq!(
            service_error_status(&opaque),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn domain_errors_map_directly() {
        let parse = ServiceError::RecurrenceParse {
            rule: "FREQ=NOPE".to_string(),
            reason: "unknown frequency".to_string(),
        };
        assert_eq!(
            service_error_status(&parse),
            StatusCode::UNPROCESSABLE_ENTITY
        );

        let conflict = ServiceError::Conflict("rule still referenced".to_string());
        assert_eq!(service_error_status(&conflict), StatusCode::CONFLICT);
    }
}
