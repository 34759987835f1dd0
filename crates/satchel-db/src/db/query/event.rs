//! Calendar event queries.
//!
//! Window queries split the table three ways: single events tested for window
//! overlap in SQL, recurring roots handed to the expander, and exception rows
//! fetched per root for the merge step.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};
use uuid::Uuid;

use crate::db::connection::DbConnection;
use crate::db::schema::calendar_event;
use crate::model::event::{CalendarEvent, EventChanges, NewCalendarEvent};

/// ## Summary
/// Finds an event row by id.
///
/// ## Errors
/// Returns database errors if the query fails.
pub async fn find_event(
    conn: &mut DbConnection<'_>,
    event_id: Uuid,
) -> anyhow::Result<Option<CalendarEvent>> {
    let event = calendar_event::table
        .filter(calendar_event::id.eq(event_id))
        .select(CalendarEvent::as_select())
        .first::<CalendarEvent>(conn)
        .await
        .optional()?;

    Ok(event)
}

/// ## Summary
/// Loads single (non-recurring, non-exception) events overlapping `[window_start, window_end)`.
///
/// Events without an `end_at` are treated as instants: they overlap when
/// their start falls inside the window.
///
/// ## Errors
/// Returns database errors if the query fails.
pub async fn single_events_in_window(
    conn: &mut DbConnection<'_>,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> anyhow::Result<Vec<CalendarEvent>> {
    let events = calendar_event::table
        .filter(calendar_event::recurrence_rule.is_null())
        .filter(calendar_event::parent_id.is_null())
        .filter(calendar_event::start_at.lt(window_end))
        .filter(
            calendar_event::end_at
                .gt(window_start)
                .or(calendar_event::end_at
                    .is_null()
                    .and(calendar_event::start_at.ge(window_start))),
        )
        .order(calendar_event::start_at.asc())
        .select(CalendarEvent::as_select())
        .load::<CalendarEvent>(conn)
        .await?;

    Ok(events)
}

/// ## Summary
/// Loads recurring roots whose series could intersect a window ending at `window_end`.
///
/// A rule never generates before its anchor, so roots starting at or after
/// the window end are excluded up front. Roots with rules that finish before
/// the window are filtered later by the expander, which is the only place
/// the rule text is interpreted.
///
/// ## Errors
/// Returns database errors if the query fails.
pub async fn recurring_roots_for_window(
    conn: &mut DbConnection<'_>,
    window_end: DateTime<Utc>,
) -> anyhow::Result<Vec<CalendarEvent>> {
    let roots = calendar_event::table
        .filter(calendar_event::recurrence_rule.is_not_null())
        .filter(calendar_event::parent_id.is_null())
        .filter(calendar_event::start_at.lt(window_end))
        .order(calendar_event::start_at.asc())
        .select(CalendarEvent::as_select())
        .load::<CalendarEvent>(conn)
        .await?;

    Ok(roots)
}

/// ## Summary
/// Loads all exception rows attached to the given roots.
///
/// ## Errors
/// Returns database errors if the query fails.
pub async fn exceptions_for_roots(
    conn: &mut DbConnection<'_>,
    root_ids: &[Uuid],
) -> anyhow::Result<Vec<CalendarEvent>> {
    if root_ids.is_empty() {
        return Ok(Vec::new());
    }

    let exceptions = calendar_event::table
        .filter(calendar_event::parent_id.eq_any(root_ids))
        .filter(calendar_event::is_exception.eq(true))
        .order(calendar_event::exception_original_start.asc())
        .select(CalendarEvent::as_select())
        .load::<CalendarEvent>(conn)
        .await?;

    Ok(exceptions)
}

/// ## Summary
/// Inserts a new event row and returns it.
///
/// ## Errors
/// Returns database errors, including unique-constraint violations on the
/// `(parent_id, exception_original_start)` slot.
pub async fn insert_event(
    conn: &mut DbConnection<'_>,
    new_event: &NewCalendarEvent,
) -> anyhow::Result<CalendarEvent> {
    let event = diesel::insert_into(calendar_event::table)
        .values(new_event)
        .returning(CalendarEvent::as_returning())
        .get_result::<CalendarEvent>(conn)
        .await?;

    Ok(event)
}

/// ## Summary
/// Applies a partial update to an event row and returns the updated row.
///
/// ## Errors
/// Returns `diesel::result::Error::NotFound` if no row matches, or other
/// database errors.
pub async fn update_event(
    conn: &mut DbConnection<'_>,
    event_id: Uuid,
    changes: &EventChanges,
) -> anyhow::Result<CalendarEvent> {
    let event = diesel::update(calendar_event::table.filter(calendar_event::id.eq(event_id)))
        .set(changes)
        .returning(CalendarEvent::as_returning())
        .get_result::<CalendarEvent>(conn)
        .await?;

    Ok(event)
}

/// ## Summary
/// Deletes an event row together with any exception rows referencing it.
///
/// Returns the number of rows removed.
///
/// ## Errors
/// Returns database errors if either delete fails.
pub async fn delete_event(conn: &mut DbConnection<'_>, event_id: Uuid) -> anyhow::Result<usize> {
    conn.transaction::<_, anyhow::Error, _>(move |tx| {
        async move {
            let children = diesel::delete(
                calendar_event::table.filter(calendar_event::parent_id.eq(event_id)),
            )
            .execute(tx)
            .await?;

            let root =
                diesel::delete(calendar_event::table.filter(calendar_event::id.eq(event_id)))
                    .execute(tx)
                    .await?;

            Ok(children + root)
        }
        .scope_boxed()
    })
    .await
}

/// ## Summary
/// Inserts an exception row, or updates the existing row for the same slot.
///
/// The `(parent_id, exception_original_start)` unique index makes this the
/// only write path for per-occurrence edits: repeating an edit replaces the
/// previous override instead of stacking a second row.
///
/// ## Errors
/// Returns database errors if the upsert fails.
pub async fn upsert_exception(
    conn: &mut DbConnection<'_>,
    new_exception: &NewCalendarEvent,
) -> anyhow::Result<CalendarEvent> {
    let exception = diesel::insert_into(calendar_event::table)
        .values(new_exception)
        .on_conflict((
            calendar_event::parent_id,
            calendar_event::exception_original_start,
        ))
        .do_update()
        .set((
            calendar_event::title.eq(&new_exception.title),
            calendar_event::description.eq(&new_exception.description),
            calendar_event::event_type.eq(&new_exception.event_type),
            calendar_event::color.eq(&new_exception.color),
            calendar_event::start_at.eq(new_exception.start_at),
            calendar_event::end_at.eq(new_exception.end_at),
            calendar_event::timezone.eq(&new_exception.timezone),
            calendar_event::all_day.eq(new_exception.all_day),
            calendar_event::subject_id.eq(new_exception.subject_id),
            calendar_event::is_cancelled.eq(new_exception.is_cancelled),
            calendar_event::updated_at.eq(diesel::dsl::now),
        ))
        .returning(CalendarEvent::as_returning())
        .get_result::<CalendarEvent>(conn)
        .await?;

    Ok(exception)
}
