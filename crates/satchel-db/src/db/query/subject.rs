//! Subject registry queries.

use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use uuid::Uuid;

use crate::db::connection::DbConnection;
use crate::db::schema::subject;
use crate::model::subject::{NewSubject, Subject};

/// ## Summary
/// Lists all subjects ordered by name.
///
/// ## Errors
/// Returns database errors if the query fails.
pub async fn list_subjects(conn: &mut DbConnection<'_>) -> anyhow::Result<Vec<Subject>> {
    let subjects = subject::table
        .order(subject::name.asc())
        .select(Subject::as_select())
        .load::<Subject>(conn)
        .await?;

    Ok(subjects)
}

/// ## Summary
/// Loads the subjects referenced by a batch of events in one query.
///
/// ## Errors
/// Returns database errors if the query fails.
pub async fn subjects_by_ids(
    conn: &mut DbConnection<'_>,
    ids: &[Uuid],
) -> anyhow::Result<Vec<Subject>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let subjects = subject::table
        .filter(subject::id.eq_any(ids))
        .select(Subject::as_select())
        .load::<Subject>(conn)
        .await?;

    Ok(subjects)
}

/// ## Summary
/// Inserts a new subject and returns it.
///
/// ## Errors
/// Returns database errors, including name uniqueness violations.
pub async fn insert_subject(
    conn: &mut DbConnection<'_>,
    new_subject: &NewSubject,
) -> anyhow::Result<Subject> {
    let row = diesel::insert_into(subject::table)
        .values(new_subject)
        .returning(Subject::as_returning())
        .get_result::<Subject>(conn)
        .await?;

    Ok(row)
}
