//! Calendar domain: recurrence expansion, exception merging, window queries,
//! and occurrence-level mutations.
//!
//! Occurrences of a recurring event are never persisted. A recurring series
//! is one root row plus an RRULE; reads expand the rule into the query
//! window ([`expand`]) and overlay any persisted exception rows ([`merge`]).
//! Editing or deleting a single occurrence writes an exception row keyed by
//! the occurrence's original start instant ([`mutate`]).

pub mod expand;
pub mod merge;
pub mod mutate;
pub mod orphans;
pub mod query;
pub mod types;
