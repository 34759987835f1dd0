//! Exception merging: overlay persisted per-occurrence overrides onto a
//! freshly expanded series.

use std::collections::HashMap;

use crate::calendar::types::{Occurrence, ResolvedOccurrence};
use satchel_db::model::event::CalendarEvent;

/// ## Summary
/// Merges exception rows into the generated occurrences of one root.
///
/// Lookup is an exact match of `exception_original_start` against each
/// generated start instant, with no tolerance window. A cancelled exception
/// drops its slot; a modified exception replaces the slot with its own
/// fields (and row id). Exceptions whose slot no longer exists in the
/// generated series are orphans and contribute nothing. The function is
/// pure, so re-running it over the same inputs yields identical output.
///
/// Result ordering: ascending effective start, ties broken by root id and
/// then exception-before-generated.
#[must_use]
pub fn merge(
    root: &CalendarEvent,
    occurrences: Vec<Occurrence>,
    exceptions: &[CalendarEvent],
) -> Vec<ResolvedOccurrence> {
    let by_slot: HashMap<i64, &CalendarEvent> = exceptions
        .iter()
        .filter(|exception| exception.parent_id == Some(root.id))
        .filter_map(|exception| {
            exception
                .exception_original_start
                .map(|slot| (slot.timestamp_micros(), exception))
        })
        .collect();

    let mut resolved: Vec<ResolvedOccurrence> = Vec::with_capacity(occurrences.len());

    for occurrence in occurrences {
        match by_slot.get(&occurrence.start.timestamp_micros()) {
            Some(exception) if exception.is_cancelled => {
                tracing::trace!(
                    root_id = %root.id,
                    slot = %occurrence.start,
                    "Occurrence cancelled by exception"
                );
            }
            Some(exception) => {
                resolved.push(ResolvedOccurrence::from_exception(
                    root,
                    exception,
                    occurrence.start,
                ));
            }
            None => resolved.push(ResolvedOccurrence::generated(root, occurrence)),
        }
    }

    sort_resolved(&mut resolved);
    resolved
}

/// Canonical ordering for resolved occurrences.
pub(crate) fn sort_resolved(resolved: &mut [ResolvedOccurrence]) {
    resolved.sort_by(|a, b| {
        a.start_at
            .cmp(&b.start_at)
            .then_with(|| {
                a.series_id
                    .unwrap_or(a.event_id)
                    .cmp(&b.series_id.unwrap_or(b.event_id))
            })
            .then_with(|| a.kind.sort_rank().cmp(&b.kind.sort_rank()))
    });
}
