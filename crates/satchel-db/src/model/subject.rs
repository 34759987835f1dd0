//! Models for the subject registry.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::db::schema::subject;

/// Subject row (name and display color referenced by events).
#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = subject)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Subject {
    pub id: Uuid,
    pub name: String,
    pub color: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// New subject row for insertion.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = subject)]
pub struct NewSubject {
    pub id: Uuid,
    pub name: String,
    pub color: String,
}

impl NewSubject {
    #[must_use]
    pub fn new(name: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            color: color.into(),
        }
    }
}
