//! Maintenance report for orphaned exception rows.
//!
//! Editing a root's recurrence rule can leave exception rows whose
//! `exception_original_start` no longer matches any generated instant. The
//! merger treats those as no-ops, which keeps queries correct but hides the
//! stale rows. This report surfaces them so operators can audit or remove
//! them instead of losing the data silently.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::calendar::expand::generates_instant;
use crate::error::{ServiceError, ServiceResult};
use satchel_db::db::connection::DbConnection;
use satchel_db::db::query::event;
use satchel_db::model::event::CalendarEvent;

/// One stale exception row of a root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrphanedException {
    pub exception_id: Uuid,
    /// The slot the exception still claims to override.
    pub original_start: DateTime<Utc>,
    pub is_cancelled: bool,
}

/// Orphan audit for one recurring root.
#[derive(Debug, Clone)]
pub struct OrphanReport {
    pub root_id: Uuid,
    pub exceptions_total: usize,
    pub orphaned: Vec<OrphanedException>,
}

/// ## Summary
/// Finds the exceptions of `root` whose slot the current rule no longer generates.
///
/// Each slot is probed individually against the rule, so the check is exact
/// and terminates even for rules without COUNT or UNTIL.
///
/// ## Errors
/// [`ServiceError::RecurrenceParse`] if the stored rule is unparseable (in
/// that case every exception is indistinguishable from an orphan, so the
/// caller should see the rule problem instead of a report).
pub fn find_orphans(
    root: &CalendarEvent,
    exceptions: &[CalendarEvent],
) -> ServiceResult<Vec<OrphanedException>> {
    let mut orphaned = Vec::new();

    for exception in exceptions {
        if exception.parent_id != Some(root.id) {
            continue;
        }
        let Some(original_start) = exception.exception_original_start else {
            continue;
        };

        if !generates_instant(root, original_start)? {
            orphaned.push(OrphanedException {
                exception_id: exception.id,
                original_start,
                is_cancelled: exception.is_cancelled,
            });
        }
    }

    orphaned.sort_by_key(|orphan| orphan.original_start);
    Ok(orphaned)
}

/// ## Summary
/// Builds the orphan report for a recurring root from the store.
///
/// ## Errors
/// [`ServiceError::NotFound`] if the root does not exist,
/// [`ServiceError::ValidationError`] if the event is not a recurring root,
/// parse and storage errors otherwise.
#[tracing::instrument(skip(conn))]
pub async fn orphaned_exceptions(
    conn: &mut DbConnection<'_>,
    root_id: Uuid,
) -> ServiceResult<OrphanReport> {
    let root = event::find_event(conn, root_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("event {root_id}")))?;

    if !root.is_recurring_root() {
        return Err(ServiceError::ValidationError(format!(
            "event {root_id} is not a recurring root"
        )));
    }

    let exceptions = event::exceptions_for_roots(conn, &[root.id]).await?;
    let orphaned = find_orphans(&root, &exceptions)?;

    if !orphaned.is_empty() {
        tracing::warn!(
            root_id = %root.id,
            orphans = orphaned.len(),
            "Root has exception rows detached from its current rule"
        );
    }

    Ok(OrphanReport {
        root_id: root.id,
        exceptions_total: exceptions.len(),
        orphaned,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};

    fn utc(y: i32, mo: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, 0, 0).single().expect("valid instant")
    }

    fn root(rule: &str) -> CalendarEvent {
        let start = utc(2025, 1, 6, 9);
        CalendarEvent {
            id: Uuid::new_v4(),
            title: "Maths".to_string(),
            description: None,
            event_type: "lesson".to_string(),
            color: None,
            start_at: start,
            end_at: Some(start + TimeDelta::hours(1)),
            timezone: None,
            all_day: false,
            recurrence_rule: Some(rule.to_string()),
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

    fn exception(root: &CalendarEvent, slot: DateTime<Utc>) -> CalendarEvent {
        CalendarEvent {
            id: Uuid::new_v4(),
            recurrence_rule: None,
            parent_id: Some(root.id),
            is_exception: true,
            exception_original_start: Some(slot),
            start_at: slot,
            ..root.clone()
        }
    }

    #[test]
    fn matching_slots_are_not_orphans() {
        let root = root("FREQ=WEEKLY;COUNT=4");
        let live = exception(&root, utc(2025, 1, 13, 9));
        let orphans = find_orphans(&root, &[live]).expect("report succeeds");
        assert!(orphans.is_empty());
    }

    #[test]
    fn rule_change_detaches_old_slots() {
        // Series moved from 09:00 to 10:00: the old 09:00 exception slot is
        // no longer generated.
        let mut moved_root = root("FREQ=WEEKLY;COUNT=4");
        moved_root.start_at = utc(2025, 1, 6, 10);

        let stale = exception(&moved_root, utc(2025, 1, 13, 9));
        let orphans = find_orphans(&moved_root, std::slice::from_ref(&stale))
            .expect("report succeeds");

        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].exception_id, stale.id);
        assert_eq!(orphans[0].original_start, utc(2025, 1, 13, 9));
    }

    #[test]
    fn count_shrink_orphans_trailing_exceptions() {
        let shrunk = root("FREQ=WEEKLY;COUNT=2");
        // Slot that only existed when the rule ran longer.
        let trailing = exception(&shrunk, utc(2025, 1, 27, 9));
        let orphans = find_orphans(&shrunk, &[trailing]).expect("report succeeds");
        assert_eq!(orphans.len(), 1);
    }

    #[test]
    fn unbounded_rule_probe_terminates() {
        let endless = root("FREQ=WEEKLY");
        let live = exception(&endless, utc(2026, 6, 1, 9));
        // 2026-06-01 is a Monday, so the weekly series does generate it.
        let orphans = find_orphans(&endless, &[live]).expect("report succeeds");
        assert!(orphans.is_empty());
    }
}
