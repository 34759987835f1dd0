//! Recurrence expansion: from a recurring root's RRULE to concrete
//! occurrence instants inside a query window.

use chrono::{TimeDelta, Utc};
use rrule::{RRule, RRuleSet, Tz, Unvalidated};

use crate::calendar::types::{Occurrence, QueryWindow};
use crate::error::{ServiceError, ServiceResult};
use satchel_db::model::event::CalendarEvent;

/// Hard cap on occurrences expanded per series in one query. Guards against
/// pathological rules (e.g. FREQ=SECONDLY over a wide window) regardless of
/// the configured limit.
pub const MAX_EXPANSION_INSTANCES: u16 = 10_000;

/// ## Summary
/// Parses and anchors the root's recurrence rule, producing a validated rule set.
///
/// The set is anchored at the root's `start_at`; the first generated instant
/// is the anchor itself whenever it matches the rule pattern.
///
/// ## Errors
/// [`ServiceError::InvariantViolation`] if the event has no rule,
/// [`ServiceError::RecurrenceParse`] naming the offending rule text if the
/// grammar is malformed or the rule cannot be validated.
pub fn build_rrule_set(root: &CalendarEvent) -> ServiceResult<RRuleSet> {
    let rule_text = root
        .recurrence_rule
        .as_deref()
        .ok_or(ServiceError::InvariantViolation(
            "expansion requires a recurrence rule",
        ))?;

    let rrule = rule_text
        .parse::<RRule<Unvalidated>>()
        .map_err(|err| ServiceError::RecurrenceParse {
            rule: rule_text.to_string(),
            reason: err.to_string(),
        })?;

    let dt_start = root.start_at.with_timezone(&Tz::UTC);
    rrule
        .build(dt_start)
        .map_err(|err| ServiceError::RecurrenceParse {
            rule: rule_text.to_string(),
            reason: err.to_string(),
        })
}

/// ## Summary
/// Lazily iterates the occurrences of `root` that start inside `window`.
///
/// Occurrences come out in ascending order of start instant, each paired
/// with an end computed from the root's duration. The underlying rule
/// iterator is consumed strictly up to the window end, so rules without
/// COUNT or UNTIL still terminate. At most `limit` occurrences are yielded.
///
/// ## Errors
/// Same as [`build_rrule_set`].
pub fn occurrences(
    root: &CalendarEvent,
    window: QueryWindow,
    limit: u16,
) -> ServiceResult<impl Iterator<Item = Occurrence> + use<>> {
    let rrule_set = build_rrule_set(root)?;
    let duration = root.duration();
    let has_end = root.end_at.is_some();
    let window_start = window.start();
    let window_end = window.end();
    let limit = limit.min(MAX_EXPANSION_INSTANCES);

    tracing::trace!(
        root_id = %root.id,
        window_start = %window_start,
        window_end = %window_end,
        limit,
        "Expanding recurrence rule"
    );

    Ok(rrule_set
        .into_iter()
        .map(|instant| instant.with_timezone(&Utc))
        .skip_while(move |start| *start < window_start)
        .take_while(move |start| *start < window_end)
        .take(usize::from(limit))
        .map(move |start| Occurrence {
            start,
            end: has_end.then(|| start + duration),
        }))
}

/// ## Summary
/// Expands `root` into the window, collecting the occurrences eagerly.
///
/// ## Errors
/// Same as [`build_rrule_set`].
pub fn expand(
    root: &CalendarEvent,
    window: QueryWindow,
    limit: u16,
) -> ServiceResult<Vec<Occurrence>> {
    Ok(occurrences(root, window, limit)?.collect())
}

/// ## Summary
/// Checks whether `instant` is a generated occurrence start of `root`.
///
/// Probes the rule in a one-second window at the instant, so the check is
/// exact and terminates for unbounded rules.
///
/// ## Errors
/// Same as [`build_rrule_set`].
pub fn generates_instant(
    root: &CalendarEvent,
    instant: chrono::DateTime<Utc>,
) -> ServiceResult<bool> {
    let probe = QueryWindow::new(instant, instant + TimeDelta::seconds(1))?;
    Ok(occurrences(root, probe, 1)?.any(|occurrence| occurrence.start == instant))
}
