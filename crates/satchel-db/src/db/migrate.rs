//! Embedded schema migrations, applied once at startup.

use diesel::Connection;
use diesel::pg::PgConnection;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// ## Summary
/// Runs all pending migrations against the given database.
///
/// Migrations run on a dedicated synchronous connection because the
/// migration harness does not speak `diesel-async`.
///
/// ## Errors
/// Returns an error if the connection cannot be established or a migration fails.
pub async fn run_pending_migrations(database_url: &str) -> anyhow::Result<()> {
    let database_url = database_url.to_owned();

    tokio::task::spawn_blocking(move || {
        let mut conn = PgConnection::establish(&database_url)?;
        let applied = conn
            .run_pending_migrations(MIGRATIONS)
            .map_err(|err| anyhow::anyhow!("migration failed: {err}"))?;

        for version in applied {
            tracing::info!(migration = %version, "Applied migration");
        }

        Ok(())
    })
    .await?
}
