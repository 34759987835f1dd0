//! Subject endpoints: listing and creation under `/api/subjects`.

use salvo::http::StatusCode;
use salvo::writing::Json;
use salvo::{Depot, Request, Response, Router, handler};
use serde::{Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;

use super::ErrorResponse;
use crate::db_handler::get_db_from_depot;
use satchel_core::constants::SUBJECTS_ROUTE_COMPONENT;
use satchel_db::db::query::subject::{insert_subject, list_subjects};
use satchel_db::model::subject::{NewSubject, Subject};

pub fn routes() -> Router {
    Router::with_path(SUBJECTS_ROUTE_COMPONENT)
        .get(list_subjects_handler)
        .post(create_subject_handler)
}

#[derive(Debug, Deserialize)]
pub struct CreateSubjectRequest {
    pub name: String,
    pub color: String,
}

#[derive(Debug, Serialize)]
pub struct SubjectResponse {
    pub id: Uuid,
    pub name: String,
    pub color: String,
}

impl From<&Subject> for SubjectResponse {
    fn from(subject: &Subject) -> Self {
        Self {
            id: subject.id,
            name: subject.name.clone(),
            color: subject.color.clone(),
        }
    }
}

/// ## Summary
/// GET /api/subjects - list subjects ordered by name.
#[handler]
async fn list_subjects_handler(depot: &mut Depot, res: &mut Response) {
    let provider = match get_db_from_depot(depot) {
        Ok(p) => p,
        Err(e) => {
            error!(error = ?e, "Failed to get database provider");
            ErrorResponse::render(res, StatusCode::INTERNAL_SERVER_ERROR, "Internal server error");
            return;
        }
    };
    let mut conn = match provider.get_connection().await {
        Ok(c) => c,
        Err(e) => {
            error!(error = ?e, "Failed to get database connection");
            ErrorResponse::render(res, StatusCode::SERVICE_UNAVAILABLE, "Database unavailable");
            return;
        }
    };

    match list_subjects(&mut conn).await {
        Ok(subjects) => {
            let body: Vec<SubjectResponse> = subjects.iter().map(SubjectResponse::from).collect();
            res.render(Json(body));
        }
        Err(e) => {
            error!(error = ?e, "Failed to list subjects");
            ErrorResponse::render(res, StatusCode::INTERNAL_SERVER_ERROR, "Internal server error");
        }
    }
}

/// ## Summary
/// POST /api/subjects - create a subject.
///
/// ## Errors
/// Returns HTTP 400 for invalid payloads, 409 if the name is already taken
#[handler]
async fn create_subject_handler(req: &mut Request, depot: &mut Depot, res: &mut Response) {
    let create_req: CreateSubjectRequest = match req.parse_json().await {
        Ok(r) => r,
        Err(e) => {
            error!(error = ?e, "Failed to parse create subject request");
            ErrorResponse::render(res, StatusCode::BAD_REQUEST, "Invalid request body");
            return;
        }
    };

    if create_req.name.trim().is_empty() {
        ErrorResponse::render(res, StatusCode::BAD_REQUEST, "name is required");
        return;
    }

    let provider = match get_db_from_depot(depot) {
        Ok(p) => p,
        Err(e) => {
            error!(error = ?e, "Failed to get database provider");
            ErrorResponse::render(res, StatusCode::INTERNAL_SERVER_ERROR, "Internal server error");
            return;
        }
    };
    let mut conn = match provider.get_connection().await {
        Ok(c) => c,
        Err(e) => {
            error!(error = ?e, "Failed to get database connection");
            ErrorResponse::render(res, StatusCode::SERVICE_UNAVAILABLE, "Database unavailable");
            return;
        }
    };

    let new_subject = NewSubject::new(create_req.name, create_req.color);
    match insert_subject(&mut conn, &new_subject).await {
        Ok(subject) => {
            res.status_code(StatusCode::CREATED);
            res.render(Json(SubjectResponse::from(&subject)));
        }
        Err(e) => {
            use diesel::result::{DatabaseErrorKind, Error as DieselError};
            if matches!(
                e.downcast_ref::<DieselError>(),
                Some(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _))
            ) {
                ErrorResponse::render(res, StatusCode::CONFLICT, "Subject name already exists");
            } else {
                error!(error = ?e, "Failed to insert subject");
                ErrorResponse::render(
                    res,
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error",
                );
            }
        }
    }
}
