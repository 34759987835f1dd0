//! Shared calendar value types.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{ServiceError, ServiceResult};
use satchel_db::model::event::CalendarEvent;
use satchel_db::model::subject::Subject;

/// Half-open query window `[start, end)` in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl QueryWindow {
    /// ## Summary
    /// Validates and builds a query window.
    ///
    /// ## Errors
    /// Returns [`ServiceError::InvalidWindow`] if `end <= start`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> ServiceResult<Self> {
        if end <= start {
            return Err(ServiceError::InvalidWindow { start, end });
        }
        Ok(Self { start, end })
    }

    #[must_use]
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    #[must_use]
    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Whether an instant falls inside the window.
    #[must_use]
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant < self.end
    }
}

/// One concrete instance generated by expanding a recurrence rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occurrence {
    /// Generated start instant.
    pub start: DateTime<Utc>,
    /// Generated end instant; `None` when the root has no `end_at`.
    pub end: Option<DateTime<Utc>>,
}

/// How a resolved occurrence came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OccurrenceKind {
    /// A plain, non-recurring event row.
    Single,
    /// An exception row replacing one generated occurrence.
    Exception,
    /// A generated occurrence with no overriding row.
    Generated,
}

impl OccurrenceKind {
    /// Tie-break rank for same-instant ordering: exceptions sort before
    /// generated occurrences.
    #[must_use]
    pub(crate) fn sort_rank(self) -> u8 {
        match self {
            Self::Exception => 0,
            Self::Single => 1,
            Self::Generated => 2,
        }
    }
}

/// Subject enrichment attached to a resolved occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectInfo {
    pub id: Uuid,
    pub name: String,
    pub color: String,
}

impl From<&Subject> for SubjectInfo {
    fn from(subject: &Subject) -> Self {
        Self {
            id: subject.id,
            name: subject.name.clone(),
            color: subject.color.clone(),
        }
    }
}

/// The final, exception-merged representation of an occurrence.
#[derive(Debug, Clone)]
pub struct ResolvedOccurrence {
    /// Id of the row backing this occurrence: the single event, the root
    /// (for generated occurrences), or the exception row.
    pub event_id: Uuid,
    /// Root id of the series; `None` for single events.
    pub series_id: Option<Uuid>,
    /// The generated instant this occurrence originated from; `None` for
    /// single events. For exceptions this is the overridden slot, which may
    /// differ from `start_at` when the exception moved the occurrence.
    pub occurrence_start: Option<DateTime<Utc>>,
    pub kind: OccurrenceKind,
    pub title: String,
    pub description: Option<String>,
    pub event_type: String,
    pub color: Option<String>,
    pub start_at: DateTime<Utc>,
    pub end_at: Option<DateTime<Utc>>,
    pub timezone: Option<String>,
    pub all_day: bool,
    pub subject_id: Option<Uuid>,
    pub subject: Option<SubjectInfo>,
    pub created_by: Uuid,
}

impl ResolvedOccurrence {
    /// Builds the pass-through representation of a single event row.
    #[must_use]
    pub fn single(event: &CalendarEvent) -> Self {
        Self {
            event_id: event.id,
            series_id: None,
            occurrence_start: None,
            kind: OccurrenceKind::Single,
            title: event.title.clone(),
            description: event.description.clone(),
            event_type: event.event_type.clone(),
            color: event.color.clone(),
            start_at: event.start_at,
            end_at: event.end_at,
            timezone: event.timezone.clone(),
            all_day: event.all_day,
            subject_id: event.subject_id,
            subject: None,
            created_by: event.created_by,
        }
    }

    /// Builds a generated occurrence carrying the root's fields.
    #[must_use]
    pub fn generated(root: &CalendarEvent, occurrence: Occurrence) -> Self {
        Self {
            event_id: root.id,
            series_id: Some(root.id),
            occurrence_start: Some(occurrence.start),
            kind: OccurrenceKind::Generated,
            title: root.title.clone(),
            description: root.description.clone(),
            event_type: root.event_type.clone(),
            color: root.color.clone(),
            start_at: occurrence.start,
            end_at: occurrence.end,
            timezone: root.timezone.clone(),
            all_day: root.all_day,
            subject_id: root.subject_id,
            subject: None,
            created_by: root.created_by,
        }
    }

    /// Builds an occurrence whose fields come from a modified exception row.
    ///
    /// `original_start` is the generated slot the exception consumed.
    #[must_use]
    pub fn from_exception(
        root: &CalendarEvent,
        exception: &CalendarEvent,
        original_start: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: exception.id,
            series_id: Some(root.id),
            occurrence_start: Some(original_start),
            kind: OccurrenceKind::Exception,
            title: exception.title.clone(),
            description: exception.description.clone(),
            event_type: exception.event_type.clone(),
            color: exception.color.clone(),
            start_at: exception.start_at,
            end_at: exception.end_at,
            timezone: exception.timezone.clone(),
            all_day: exception.all_day,
            subject_id: exception.subject_id,
            subject: None,
            created_by: exception.created_by,
        }
    }
}

/// Optional filters applied by the query service.
#[derive(Debug, Clone, Default)]
pub struct EventFilters {
    /// Keep only occurrences linked to this subject.
    pub subject_id: Option<Uuid>,
    /// Keep only these event types; `None` keeps everything.
    pub event_types: Option<Vec<String>>,
    /// When true, recurring series are skipped entirely.
    pub skip_recurring: bool,
}

impl EventFilters {
    /// Whether a resolved occurrence passes the filter set.
    #[must_use]
    pub fn matches(&self, occurrence: &ResolvedOccurrence) -> bool {
        if let Some(subject_id) = self.subject_id
            && occurrence.subject_id != Some(subject_id)
        {
            return false;
        }
        if let Some(event_types) = &self.event_types
            && !event_types.iter().any(|t| t == &occurrence.event_type)
        {
            return false;
        }
        true
    }
}
