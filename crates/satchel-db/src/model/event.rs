//! Models for the calendar event table.
//!
//! A single table holds three shapes of row: plain one-off events, recurring
//! roots (rows with a `recurrence_rule`), and exception rows overriding one
//! occurrence of a root (`parent_id` + `exception_original_start`).

use chrono::{DateTime, TimeDelta, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::db::schema::calendar_event;

/// Persisted calendar event row.
#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = calendar_event)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CalendarEvent {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    /// Free-form category ("lesson", "exam", "meeting", ...).
    pub event_type: String,
    /// Optional display color override; falls back to the subject color.
    pub color: Option<String>,
    /// Start instant, normalized to UTC.
    pub start_at: DateTime<Utc>,
    /// End instant in UTC; `None` means a point-in-time event.
    pub end_at: Option<DateTime<Utc>>,
    /// IANA zone the event was authored in, kept for display only.
    pub timezone: Option<String>,
    pub all_day: bool,
    /// iCal RRULE text; present on recurring roots only.
    pub recurrence_rule: Option<String>,
    pub subject_id: Option<Uuid>,
    pub created_by: Uuid,
    /// Set on exception rows; references the recurring root.
    pub parent_id: Option<Uuid>,
    pub is_exception: bool,
    /// The generated instant this exception overrides.
    pub exception_original_start: Option<DateTime<Utc>>,
    /// Deletion marker for exception rows.
    pub is_cancelled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CalendarEvent {
    /// Whether this row is the root of a recurring series.
    #[must_use]
    pub fn is_recurring_root(&self) -> bool {
        self.recurrence_rule.is_some() && self.parent_id.is_none()
    }

    /// Event duration, preserved across generated occurrences.
    ///
    /// Zero when `end_at` is absent.
    #[must_use]
    pub fn duration(&self) -> TimeDelta {
        self.end_at
            .map_or_else(TimeDelta::zero, |end| end.signed_duration_since(self.start_at))
    }
}

/// New calendar event row for insertion.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = calendar_event)]
pub struct NewCalendarEvent {
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

/// Partial update for PATCH-style mutations.
///
/// `None` leaves the column untouched; nullable columns use a nested option
/// so `Some(None)` clears them.
#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = calendar_event)]
pub struct EventChanges {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub event_type: Option<String>,
    pub color: Option<Option<String>>,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<Option<DateTime<Utc>>>,
    pub timezone: Option<Option<String>>,
    pub all_day: Option<bool>,
    pub recurrence_rule: Option<Option<String>>,
    pub subject_id: Option<Option<Uuid>>,
    pub is_cancelled: Option<bool>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn base_event() -> CalendarEvent {
        let start = Utc.with_ymd_and_hms(2025, 1, 6, 9, 0, 0).single().expect("valid instant");
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
    fn recurring_root_detection() {
        let root = base_event();
        assert!(root.is_recurring_root());

        let mut exception = base_event();
        exception.recurrence_rule = None;
        exception.parent_id = Some(root.id);
        assert!(!exception.is_recurring_root());
    }

    #[test]
    fn duration_is_zero_without_end() {
        let mut event = base_event();
        assert_eq!(event.duration(), TimeDelta::hours(1));
        event.end_at = None;
        assert_eq!(event.duration(), TimeDelta::zero());
    }
}
