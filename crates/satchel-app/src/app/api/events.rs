//! Calendar event endpoints under `/api/calendar/events`.
//!
//! Covers the resolved-occurrence window query, event row CRUD,
//! per-occurrence exception writes, and the stale-exception audit.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use salvo::http::StatusCode;
use salvo::writing::Json;
use salvo::{Depot, Request, Response, Router, handler};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::error;
use uuid::Uuid;

use super::{ErrorResponse, render_service_error};
use crate::config::get_config_from_depot;
use crate::db_handler::get_db_from_depot;
use crate::middleware::acting_user::acting_user;
use satchel_core::constants::CALENDAR_ROUTE_COMPONENT;
use satchel_db::model::event::{CalendarEvent, EventChanges};
use satchel_service::calendar::mutate::{self, EventDraft, OccurrencePatch};
use satchel_service::calendar::orphans;
use satchel_service::calendar::query::query_events;
use satchel_service::calendar::types::{
    EventFilters, OccurrenceKind, QueryWindow, ResolvedOccurrence,
};

pub fn routes() -> Router {
    Router::with_path(CALENDAR_ROUTE_COMPONENT).push(
        Router::with_path("events")
            .get(list_events_handler)
            .post(create_event_handler)
            .push(
                Router::with_path("{id}")
                    .get(get_event_handler)
                    .patch(patch_event_handler)
                    .delete(delete_event_handler)
                    .push(Router::with_path("exceptions").post(upsert_exception_handler))
                    .push(Router::with_path("orphans").get(orphans_handler)),
            ),
    )
}

// ---------------------------------------------------------------------------
// Payloads

/// ## Summary
/// Create event request payload
#[derive(Debug, Deserialize)]
pub struct CreateEventRequest {
    pub title: String,
    pub description: Option<String>,
    pub event_type: String,
    pub color: Option<String>,
    pub start_at: DateTime<Utc>,
    pub end_at: Option<DateTime<Utc>>,
    pub timezone: Option<String>,
    #[serde(default)]
    pub all_day: bool,
    pub recurrence_rule: Option<String>,
    pub subject_id: Option<Uuid>,
}

/// ## Summary
/// Partial update request payload.
///
/// Absent fields are left untouched; explicit `null` clears nullable fields.
#[derive(Debug, Default, Deserialize)]
pub struct PatchEventRequest {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    pub event_type: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub color: Option<Option<String>>,
    pub start_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "double_option")]
    pub end_at: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "double_option")]
    pub timezone: Option<Option<String>>,
    pub all_day: Option<bool>,
    #[serde(default, deserialize_with = "double_option")]
    pub recurrence_rule: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub subject_id: Option<Option<Uuid>>,
}

fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

impl From<PatchEventRequest> for EventChanges {
    fn from(patch: PatchEventRequest) -> Self {
        Self {
            title: patch.title,
            description: patch.description,
            event_type: patch.event_type,
            color: patch.color,
            start_at: patch.start_at,
            end_at: patch.end_at,
            timezone: patch.timezone,
            all_day: patch.all_day,
            recurrence_rule: patch.recurrence_rule,
            subject_id: patch.subject_id,
            is_cancelled: None,
            updated_at: None,
        }
    }
}

/// ## Summary
/// Occurrence exception request payload.
///
/// `cancelled: true` deletes the occurrence; otherwise the remaining fields
/// override the generated occurrence for that slot.
#[derive(Debug, Deserialize)]
pub struct ExceptionRequest {
    pub original_start: DateTime<Utc>,
    #[serde(default)]
    pub cancelled: bool,
    pub title: Option<String>,
    pub description: Option<String>,
    pub event_type: Option<String>,
    pub color: Option<String>,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub all_day: Option<bool>,
    pub subject_id: Option<Uuid>,
}

/// ## Summary
/// Resolved occurrence response payload.
#[derive(Debug, Serialize)]
pub struct OccurrenceResponse {
    pub event_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occurrence_start: Option<String>,
    pub kind: &'static str,
    pub title: String,
    pub description: Option<String>,
    pub event_type: String,
    pub color: Option<String>,
    pub start: String,
    pub end: Option<String>,
    pub timezone: Option<String>,
    pub all_day: bool,
    pub subject_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<SubjectSummary>,
    pub created_by: Uuid,
}

#[derive(Debug, Serialize)]
pub struct SubjectSummary {
    pub id: Uuid,
    pub name: String,
    pub color: String,
}

impl From<&ResolvedOccurrence> for OccurrenceResponse {
    fn from(occurrence: &ResolvedOccurrence) -> Self {
        Self {
            event_id: occurrence.event_id,
            series_id: occurrence.series_id,
            occurrence_start: occurrence
                .occurrence_start
                .map(|slot| slot.to_rfc3339_opts(SecondsFormat::Secs, true)),
            kind: match occurrence.kind {
                OccurrenceKind::Single => "single",
                OccurrenceKind::Exception => "exception",
                OccurrenceKind::Generated => "generated",
            },
            title: occurrence.title.clone(),
            description: occurrence.description.clone(),
            event_type: occurrence.event_type.clone(),
            color: occurrence.color.clone(),
            start: format_boundary(occurrence.start_at, occurrence.all_day),
            end: occurrence
                .end_at
                .map(|end| format_boundary(end, occurrence.all_day)),
            timezone: occurrence.timezone.clone(),
            all_day: occurrence.all_day,
            subject_id: occurrence.subject_id,
            subject: occurrence.subject.as_ref().map(|subject| SubjectSummary {
                id: subject.id,
                name: subject.name.clone(),
                color: subject.color.clone(),
            }),
            created_by: occurrence.created_by,
        }
    }
}

/// All-day events expose date-only boundaries.
fn format_boundary(instant: DateTime<Utc>, all_day: bool) -> String {
    if all_day {
        instant.date_naive().format("%Y-%m-%d").to_string()
    } else {
        instant.to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

/// ## Summary
/// Persisted event row response payload (CRUD endpoints).
#[derive(Debug, Serialize)]
pub struct EventRowResponse {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub event_type: String,
    pub color: Option<String>,
    pub start_at: DateTime<Utc>,
    pub end_at: Option<DateTime<Utc>>,
    pub timezone: Option<String>,
    pub all_day: bool,
    pub recurrence_rule: Option<String>,
    pub subject_id: Option<Uuid>,
    pub created_by: Uuid,
    pub parent_id: Option<Uuid>,
    pub is_exception: bool,
    pub exception_original_start: Option<DateTime<Utc>>,
    pub is_cancelled: bool,
}

impl From<&CalendarEvent> for EventRowResponse {
    fn from(event: &CalendarEvent) -> Self {
        Self {
            id: event.id,
            title: event.title.clone(),
            description: event.description.clone(),
            event_type: event.event_type.clone(),
            color: event.color.clone(),
            start_at: event.start_at,
            end_at: event.end_at,
            timezone: event.timezone.clone(),
            all_day: event.all_day,
            recurrence_rule: event.recurrence_rule.clone(),
            subject_id: event.subject_id,
            created_by: event.created_by,
            parent_id: event.parent_id,
            is_exception: event.is_exception,
            exception_original_start: event.exception_original_start,
            is_cancelled: event.is_cancelled,
        }
    }
}

// ---------------------------------------------------------------------------
// Handlers

/// Accepts RFC 3339 instants or bare dates (midnight UTC).
fn parse_instant_param(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(instant) = raw.parse::<DateTime<Utc>>() {
        return Some(instant);
    }
    raw.parse::<NaiveDate>()
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| DateTime::from_naive_utc_and_offset(naive, Utc))
}

/// ## Summary
/// GET /api/calendar/events - resolved occurrences in a window.
///
/// Query parameters: `start` and `end` (required), `subject_id`,
/// `event_types` (comma-separated), `include_recurring` (default true).
///
/// ## Errors
/// Returns HTTP 400 for missing/invalid window parameters
/// Returns HTTP 500 if database operations fail
#[handler]
async fn list_events_handler(req: &mut Request, depot: &mut Depot, res: &mut Response) {
    let window = {
        let start = req
            .query::<String>("start")
            .as_deref()
            .and_then(parse_instant_param);
        let end = req
            .query::<String>("end")
            .as_deref()
            .and_then(parse_instant_param);

        let (Some(start), Some(end)) = (start, end) else {
            ErrorResponse::render(
                res,
                StatusCode::BAD_REQUEST,
                "start and end query parameters are required (RFC 3339 or YYYY-MM-DD)",
            );
            return;
        };

        match QueryWindow::new(start, end) {
            Ok(window) => window,
            Err(err) => {
                render_service_error(res, &err);
                return;
            }
        }
    };

    let filters = EventFilters {
        subject_id: req.query::<Uuid>("subject_id"),
        event_types: req.query::<String>("event_types").map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(String::from)
                .collect()
        }),
        skip_recurring: !req.query::<bool>("include_recurring").unwrap_or(true),
    };

    let limit = match get_config_from_depot(depot) {
        Ok(settings) => settings.calendar.max_occurrences,
        Err(e) => {
            error!(error = ?e, "Failed to get config from depot");
            ErrorResponse::render(res, StatusCode::INTERNAL_SERVER_ERROR, "Internal server error");
            return;
        }
    };

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

    match query_events(&mut conn, window, &filters, limit).await {
        Ok(resolved) => {
            let body: Vec<OccurrenceResponse> =
                resolved.iter().map(OccurrenceResponse::from).collect();
            res.render(Json(body));
        }
        Err(err) => render_service_error(res, &err),
    }
}

/// ## Summary
/// POST /api/calendar/events - create a single event or recurring root.
///
/// ## Errors
/// Returns HTTP 401 if no acting user was supplied
/// Returns HTTP 400 for invalid payloads, 422 for malformed recurrence rules
#[handler]
async fn create_event_handler(req: &mut Request, depot: &mut Depot, res: &mut Response) {
    let Some(created_by) = acting_user(depot) else {
        ErrorResponse::render(res, StatusCode::UNAUTHORIZED, "Acting user required");
        return;
    };

    let create_req: CreateEventRequest = match req.parse_json().await {
        Ok(r) => r,
        Err(e) => {
            error!(error = ?e, "Failed to parse create event request");
            ErrorResponse::render(res, StatusCode::BAD_REQUEST, "Invalid request body");
            return;
        }
    };

    if create_req.title.is_empty() || create_req.event_type.is_empty() {
        ErrorResponse::render(res, StatusCode::BAD_REQUEST, "title and event_type are required");
        return;
    }

    let draft = EventDraft {
        title: create_req.title,
        description: create_req.description,
        event_type: create_req.event_type,
        color: create_req.color,
        start_at: create_req.start_at,
        end_at: create_req.end_at,
        timezone: create_req.timezone,
        all_day: create_req.all_day,
        recurrence_rule: create_req.recurrence_rule,
        subject_id: create_req.subject_id,
    };

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

    match mutate::create_event(&mut conn, draft, created_by).await {
        Ok(event) => {
            res.status_code(StatusCode::CREATED);
            res.render(Json(EventRowResponse::from(&event)));
        }
        Err(err) => render_service_error(res, &err),
    }
}

/// ## Summary
/// GET /api/calendar/events/{id} - fetch one persisted row.
#[handler]
async fn get_event_handler(req: &mut Request, depot: &mut Depot, res: &mut Response) {
    let Some(event_id) = req.param::<Uuid>("id") else {
        ErrorResponse::render(res, StatusCode::BAD_REQUEST, "Invalid event id");
        return;
    };

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

    match satchel_db::db::query::event::find_event(&mut conn, event_id).await {
        Ok(Some(event)) => res.render(Json(EventRowResponse::from(&event))),
        Ok(None) => ErrorResponse::render(res, StatusCode::NOT_FOUND, "Event not found"),
        Err(e) => {
            error!(error = ?e, "Failed to load event");
            ErrorResponse::render(res, StatusCode::INTERNAL_SERVER_ERROR, "Internal server error");
        }
    }
}

/// ## Summary
/// PATCH /api/calendar/events/{id} - partial update.
///
/// Rule edits retroactively reshape the generated series; recorded
/// exceptions stay put and may show up in the orphan report afterwards.
#[handler]
async fn patch_event_handler(req: &mut Request, depot: &mut Depot, res: &mut Response) {
    let Some(event_id) = req.param::<Uuid>("id") else {
        ErrorResponse::render(res, StatusCode::BAD_REQUEST, "Invalid event id");
        return;
    };

    let patch: PatchEventRequest = match req.parse_json().await {
        Ok(r) => r,
        Err(e) => {
            error!(error = ?e, "Failed to parse patch event request");
            ErrorResponse::render(res, StatusCode::BAD_REQUEST, "Invalid request body");
            return;
        }
    };

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

    match mutate::update_event(&mut conn, event_id, patch.into()).await {
        Ok(event) => res.render(Json(EventRowResponse::from(&event))),
        Err(err) => render_service_error(res, &err),
    }
}

/// ## Summary
/// DELETE /api/calendar/events/{id} - delete an event row.
///
/// Deleting a recurring root removes its exception rows as well.
#[handler]
async fn delete_event_handler(req: &mut Request, depot: &mut Depot, res: &mut Response) {
    let Some(event_id) = req.param::<Uuid>("id") else {
        ErrorResponse::render(res, StatusCode::BAD_REQUEST, "Invalid event id");
        return;
    };

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

    match mutate::delete_event(&mut conn, event_id).await {
        Ok(()) => {
            res.status_code(StatusCode::NO_CONTENT);
        }
        Err(err) => render_service_error(res, &err),
    }
}

/// ## Summary
/// POST /api/calendar/events/{id}/exceptions - edit or delete one occurrence.
///
/// Upserts the exception row for the named slot; the root's recurrence rule
/// is never modified by this endpoint.
#[handler]
async fn upsert_exception_handler(req: &mut Request, depot: &mut Depot, res: &mut Response) {
    let Some(root_id) = req.param::<Uuid>("id") else {
        ErrorResponse::render(res, StatusCode::BAD_REQUEST, "Invalid event id");
        return;
    };

    let exception_req: ExceptionRequest = match req.parse_json().await {
        Ok(r) => r,
        Err(e) => {
            error!(error = ?e, "Failed to parse exception request");
            ErrorResponse::render(res, StatusCode::BAD_REQUEST, "Invalid request body");
            return;
        }
    };

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

    let result = if exception_req.cancelled {
        mutate::delete_occurrence(&mut conn, root_id, exception_req.original_start).await
    } else {
        let patch = OccurrencePatch {
            title: exception_req.title,
            description: exception_req.description,
            event_type: exception_req.event_type,
            color: exception_req.color,
            start_at: exception_req.start_at,
            end_at: exception_req.end_at,
            all_day: exception_req.all_day,
            subject_id: exception_req.subject_id,
        };
        mutate::edit_occurrence(&mut conn, root_id, exception_req.original_start, patch).await
    };

    match result {
        Ok(exception) => {
            res.status_code(StatusCode::CREATED);
            res.render(Json(EventRowResponse::from(&exception)));
        }
        Err(err) => render_service_error(res, &err),
    }
}

#[derive(Debug, Serialize)]
struct OrphanResponse {
    root_id: Uuid,
    exceptions_total: usize,
    orphaned: Vec<OrphanRowResponse>,
}

#[derive(Debug, Serialize)]
struct OrphanRowResponse {
    exception_id: Uuid,
    original_start: DateTime<Utc>,
    is_cancelled: bool,
}

/// ## Summary
/// GET /api/calendar/events/{id}/orphans - stale-exception audit for a root.
#[handler]
async fn orphans_handler(req: &mut Request, depot: &mut Depot, res: &mut Response) {
    let Some(root_id) = req.param::<Uuid>("id") else {
        ErrorResponse::render(res, StatusCode::BAD_REQUEST, "Invalid event id");
        return;
    };

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

    match orphans::orphaned_exceptions(&mut conn, root_id).await {
        Ok(report) => {
            let body = OrphanResponse {
                root_id: report.root_id,
                exceptions_total: report.exceptions_total,
                orphaned: report
                    .orphaned
                    .into_iter()
                    .map(|orphan| OrphanRowResponse {
                        exception_id: orphan.exception_id,
                        original_start: orphan.original_start,
                        is_cancelled: orphan.is_cancelled,
                    })
                    .collect(),
            };
            res.render(Json(body));
        }
        Err(err) => render_service_error(res, &err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test_log::test]
    fn instant_params_accept_dates_and_instants() {
        assert_eq!(
            parse_instant_param("2025-01-01"),
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).single()
        );
        assert_eq!(
            parse_instant_param("2025-01-06T09:00:00Z"),
            Utc.with_ymd_and_hms(2025, 1, 6, 9, 0, 0).single()
        );
        assert!(parse_instant_param("next tuesday").is_none());
    }

    #[test_log::test]
    fn all_day_boundaries_are_date_only() {
        let instant = Utc
            .with_ymd_and_hms(2025, 1, 6, 9, 0, 0)
            .single()
            .expect("valid instant");
        assert_eq!(format_boundary(instant, true), "2025-01-06");
        assert_eq!(format_boundary(instant, false), "2025-01-06T09:00:00Z");
    }
}
