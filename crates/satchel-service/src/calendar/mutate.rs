//! Event mutations: CRUD over event rows plus occurrence-level edits.
//!
//! Editing or deleting one occurrence of a series never touches the root's
//! recurrence rule; both are implemented as an upsert of the exception row
//! for that occurrence slot.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::calendar::expand::build_rrule_set;
use crate::error::{ServiceError, ServiceResult};
use satchel_db::db::connection::DbConnection;
use satchel_db::db::query::event;
use satchel_db::model::event::{CalendarEvent, EventChanges, NewCalendarEvent};

/// Input for creating an event (single or recurring root).
#[derive(Debug, Clone)]
pub struct EventDraft {
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
}

/// Field overrides for one occurrence of a series.
///
/// `None` inherits the root's value; the occurrence's default start is its
/// original slot.
#[derive(Debug, Clone, Default)]
pub struct OccurrencePatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub event_type: Option<String>,
    pub color: Option<String>,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub all_day: Option<bool>,
    pub subject_id: Option<Uuid>,
}

fn validate_span(
    start_at: DateTime<Utc>,
    end_at: Option<DateTime<Utc>>,
) -> ServiceResult<()> {
    if let Some(end_at) = end_at
        && end_at < start_at
    {
        return Err(ServiceError::ValidationError(format!(
            "end_at {end_at} precedes start_at {start_at}"
        )));
    }
    Ok(())
}

fn validate_timezone(timezone: Option<&str>) -> ServiceResult<()> {
    if let Some(timezone) = timezone {
        chrono_tz::Tz::from_str(timezone).map_err(|_err| {
            ServiceError::ValidationError(format!("unknown timezone {timezone:?}"))
        })?;
    }
    Ok(())
}

/// Validates a recurrence rule by parsing and anchoring it, so malformed
/// grammar is rejected at write time instead of surfacing on read.
fn validate_rule(rule: &str, start_at: DateTime<Utc>) -> ServiceResult<()> {
    let probe = CalendarEvent {
        id: Uuid::nil(),
        title: String::new(),
        description: None,
        event_type: String::new(),
        color: None,
        start_at,
        end_at: None,
        timezone: None,
        all_day: false,
        recurrence_rule: Some(rule.to_string()),
        subject_id: None,
        created_by: Uuid::nil(),
        parent_id: None,
        is_exception: false,
        exception_original_start: None,
        is_cancelled: false,
        created_at: start_at,
        updated_at: start_at,
    };
    build_rrule_set(&probe).map(|_set| ())
}

/// ## Summary
/// Creates a single event or recurring root for the acting user.
///
/// ## Errors
/// [`ServiceError::ValidationError`] for span or timezone problems,
/// [`ServiceError::RecurrenceParse`] for a malformed rule, storage errors
/// otherwise.
#[tracing::instrument(skip(conn, draft), fields(title = %draft.title))]
pub async fn create_event(
    conn: &mut DbConnection<'_>,
    draft: EventDraft,
    created_by: Uuid,
) -> ServiceResult<CalendarEvent> {
    validate_span(draft.start_at, draft.end_at)?;
    validate_timezone(draft.timezone.as_deref())?;
    if let Some(rule) = &draft.recurrence_rule {
        validate_rule(rule, draft.start_at)?;
    }

    let new_event = NewCalendarEvent {
        id: Uuid::new_v4(),
        title: draft.title,
        description: draft.description,
        event_type: draft.event_type,
        color: draft.color,
        start_at: draft.start_at,
        end_at: draft.end_at,
        timezone: draft.timezone,
        all_day: draft.all_day,
        recurrence_rule: draft.recurrence_rule,
        subject_id: draft.subject_id,
        created_by,
        parent_id: None,
        is_exception: false,
        exception_original_start: None,
        is_cancelled: false,
    };

    let event = event::insert_event(conn, &new_event).await?;
    tracing::debug!(event_id = %event.id, recurring = event.is_recurring_root(), "Event created");
    Ok(event)
}

/// A root's rule cannot be cleared while exception rows still reference it.
/// Without a rule on the parent those rows match no query path at all, so
/// they would silently vanish from every calendar read.
fn reject_rule_clear_with_children(
    root: &CalendarEvent,
    exception_children: &[CalendarEvent],
) -> ServiceResult<()> {
    if exception_children.is_empty() {
        Ok(())
    } else {
        Err(ServiceError::Conflict(format!(
            "cannot clear the recurrence rule of event {}: {} exception rows still reference it",
            root.id,
            exception_children.len()
        )))
    }
}

/// ## Summary
/// Applies a partial update to an event row.
///
/// Recurrence-rule changes are validated against the effective start, and
/// rejected outright on exception rows. Rule edits retroactively change all
/// non-excepted occurrences on the next query; existing exception rows are
/// left alone and may become orphans (see [`crate::calendar::orphans`]).
/// Clearing the rule of a root is only allowed once no exception rows
/// reference it.
///
/// ## Errors
/// [`ServiceError::NotFound`] if the row does not exist,
/// [`ServiceError::Conflict`] when clearing a rule that exception rows
/// still depend on, validation and parse errors as in [`create_event`].
#[tracing::instrument(skip(conn, changes))]
pub async fn update_event(
    conn: &mut DbConnection<'_>,
    event_id: Uuid,
    mut changes: EventChanges,
) -> ServiceResult<CalendarEvent> {
    let existing = event::find_event(conn, event_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("event {event_id}")))?;

    if existing.is_exception
        && matches!(&changes.recurrence_rule, Some(Some(_)))
    {
        return Err(ServiceError::ValidationError(
            "an exception row cannot carry its own recurrence rule".to_string(),
        ));
    }

    if existing.is_recurring_root() && matches!(&changes.recurrence_rule, Some(None)) {
        let children = event::exceptions_for_roots(conn, &[existing.id]).await?;
        reject_rule_clear_with_children(&existing, &children)?;
    }

    let effective_start = changes.start_at.unwrap_or(existing.start_at);
    let effective_end = changes.end_at.unwrap_or(existing.end_at);
    validate_span(effective_start, effective_end)?;

    if let Some(Some(timezone)) = &changes.timezone {
        validate_timezone(Some(timezone))?;
    }
    if let Some(Some(rule)) = &changes.recurrence_rule {
        validate_rule(rule, effective_start)?;
    }

    changes.updated_at = Some(Utc::now());
    let updated = event::update_event(conn, event_id, &changes).await?;
    tracing::debug!(event_id = %updated.id, "Event updated");
    Ok(updated)
}

/// ## Summary
/// Deletes an event row; deleting a recurring root removes its exceptions too.
///
/// ## Errors
/// [`ServiceError::NotFound`] if nothing was deleted, storage errors otherwise.
#[tracing::instrument(skip(conn))]
pub async fn delete_event(conn: &mut DbConnection<'_>, event_id: Uuid) -> ServiceResult<()> {
    let removed = event::delete_event(conn, event_id).await?;
    if removed == 0 {
        return Err(ServiceError::NotFound(format!("event {event_id}")));
    }
    tracing::debug!(event_id = %event_id, rows = removed, "Event deleted");
    Ok(())
}

/// ## Summary
/// Edits one occurrence of a recurring series by upserting its exception row.
///
/// Unspecified fields inherit the root's values; the default start is the
/// occurrence's original slot and the default end preserves the root's
/// duration. Repeating an edit for the same slot replaces the earlier
/// override.
///
/// ## Errors
/// [`ServiceError::NotFound`] if the root does not exist,
/// [`ServiceError::ValidationError`] if the target is not a recurring root
/// or the patched span is inverted, storage errors otherwise.
#[tracing::instrument(skip(conn, patch), fields(original_start = %original_start))]
pub async fn edit_occurrence(
    conn: &mut DbConnection<'_>,
    root_id: Uuid,
    original_start: DateTime<Utc>,
    patch: OccurrencePatch,
) -> ServiceResult<CalendarEvent> {
    let root = load_recurring_root(conn, root_id).await?;

    let start_at = patch.start_at.unwrap_or(original_start);
    let end_at = patch
        .end_at
        .or_else(|| root.end_at.map(|_| start_at + root.duration()));
    validate_span(start_at, end_at)?;

    let new_exception = NewCalendarEvent {
        id: Uuid::new_v4(),
        title: patch.title.unwrap_or_else(|| root.title.clone()),
        description: patch.description.or_else(|| root.description.clone()),
        event_type: patch.event_type.unwrap_or_else(|| root.event_type.clone()),
        color: patch.color.or_else(|| root.color.clone()),
        start_at,
        end_at,
        timezone: root.timezone.clone(),
        all_day: patch.all_day.unwrap_or(root.all_day),
        recurrence_rule: None,
        subject_id: patch.subject_id.or(root.subject_id),
        created_by: root.created_by,
        parent_id: Some(root.id),
        is_exception: true,
        exception_original_start: Some(original_start),
        is_cancelled: false,
    };

    let exception = event::upsert_exception(conn, &new_exception).await?;
    tracing::debug!(root_id = %root.id, exception_id = %exception.id, "Occurrence edited");
    Ok(exception)
}

/// ## Summary
/// Deletes one occurrence of a recurring series.
///
/// Writes (or overwrites) the slot's exception row with the cancellation
/// marker set; the root and its rule are untouched.
///
/// ## Errors
/// Same shape as [`edit_occurrence`].
#[tracing::instrument(skip(conn), fields(original_start = %original_start))]
pub async fn delete_occurrence(
    conn: &mut DbConnection<'_>,
    root_id: Uuid,
    original_start: DateTime<Utc>,
) -> ServiceResult<CalendarEvent> {
    let root = load_recurring_root(conn, root_id).await?;

    let new_exception = NewCalendarEvent {
        id: Uuid::new_v4(),
        title: root.title.clone(),
        description: root.description.clone(),
        event_type: root.event_type.clone(),
        color: root.color.clone(),
        start_at: original_start,
        end_at: root.end_at.map(|_| original_start + root.duration()),
        timezone: root.timezone.clone(),
        all_day: root.all_day,
        recurrence_rule: None,
        subject_id: root.subject_id,
        created_by: root.created_by,
        parent_id: Some(root.id),
        is_exception: true,
        exception_original_start: Some(original_start),
        is_cancelled: true,
    };

    let exception = event::upsert_exception(conn, &new_exception).await?;
    tracing::debug!(root_id = %root.id, exception_id = %exception.id, "Occurrence deleted");
    Ok(exception)
}

async fn load_recurring_root(
    conn: &mut DbConnection<'_>,
    root_id: Uuid,
) -> ServiceResult<CalendarEvent> {
    let root = event::find_event(conn, root_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("event {root_id}")))?;

    if !root.is_recurring_root() {
        return Err(ServiceError::ValidationError(format!(
            "event {root_id} is not a recurring root"
        )));
    }

    Ok(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, mo: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, 0, 0).single().expect("valid instant")
    }

    #[test]
    fn span_validation_rejects_inverted_ranges() {
        let start = utc(2025, 1, 6, 9);
        assert!(validate_span(start, Some(start)).is_ok());
        assert!(validate_span(start, None).is_ok());
        assert!(validate_span(start, Some(start - chrono::TimeDelta::hours(1))).is_err());
    }

    #[test]
    fn timezone_validation_uses_iana_names() {
        assert!(validate_timezone(Some("Europe/Berlin")).is_ok());
        assert!(validate_timezone(None).is_ok());
        assert!(validate_timezone(Some("Mars/Olympus")).is_err());
    }

    #[test]
    fn rule_validation_rejects_malformed_grammar() {
        let start = utc(2025, 1, 6, 9);
        assert!(validate_rule("FREQ=WEEKLY;COUNT=4", start).is_ok());
        let err = validate_rule("FREQ=WEEKLY;COUNT=banana", start).expect_err("must fail");
        assert!(matches!(err, ServiceError::RecurrenceParse { .. }));
    }

    fn recurring_root() -> CalendarEvent {
        let start = utc(2025, 1, 6, 9);
        CalendarEvent {
            id: Uuid::new_v4(),
            title: "Maths".to_string(),
            description: None,
            event_type: "lesson".to_string(),
            color: None,
            start_at: start,
            end_at: None,
            timezone: None,
            all_day: false,
            recurrence_rule: Some("FREQ=WEEKLY;COUNT=4".to_string()),
            subject_id: None,
            created_by: Uuid::new_v4(),
            parent_id: None,
            is_exception: false,
            exception_original_start: None,
            is_cancelled: false,
            created_at: start,
            updated_at: start,
        }
    }

    #[test]
    fn clearing_a_rule_with_exception_children_is_a_conflict() {
        let root = recurring_root();
        let child = CalendarEvent {
            id: Uuid::new_v4(),
            recurrence_rule: None,
            parent_id: Some(root.id),
            is_exception: true,
            exception_original_start: Some(utc(2025, 1, 13, 9)),
            ..root.clone()
        };

        // The patch shape a PATCH with `recurrence_rule: null` produces.
        let changes = EventChanges {
            recurrence_rule: Some(None),
            ..EventChanges::default()
        };
        assert!(root.is_recurring_root() && matches!(&changes.recurrence_rule, Some(None)));

        let err = reject_rule_clear_with_children(&root, std::slice::from_ref(&child))
            .expect_err("must refuse to strand the exception row");
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[test]
    fn clearing_a_rule_without_children_is_allowed() {
        let root = recurring_root();
        assert!(reject_rule_clear_with_children(&root, &[]).is_ok());
    }
}
