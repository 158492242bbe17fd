use anyhow::{bail, Context, Result};
use rusqlite::Connection;

/// Schema scripts in order; the database's `user_version` counts how many
/// have been applied.
const SCHEMA_STEPS: &[(&str, &str)] = &[("schema_v1.sql", include_str!("schemas/schema_v1.sql"))];

fn user_version(conn: &Connection) -> Result<usize> {
    let version: i64 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .context("failed to read schema version")?;
    usize::try_from(version).with_context(|| format!("invalid schema version {version}"))
}

/// Bring the session schema up to date. A database written by a newer build
/// is refused rather than guessed at.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    let applied = user_version(conn)?;
    if applied > SCHEMA_STEPS.len() {
        bail!(
            "session database is at schema {applied}, this build only knows {}",
            SCHEMA_STEPS.len()
        );
    }

    let pending = &SCHEMA_STEPS[applied..];
    if pending.is_empty() {
        return Ok(());
    }

    let tx = conn.transaction().context("failed to begin schema upgrade")?;
    for (name, sql) in pending {
        tx.execute_batch(sql)
            .with_context(|| format!("failed to apply {name}"))?;
    }
    tx.pragma_update(None, "user_version", SCHEMA_STEPS.len() as i64)
        .context("failed to record schema version")?;
    tx.commit().context("failed to commit schema upgrade")?;

    log::info!(
        "Session schema upgraded from {applied} to {}",
        SCHEMA_STEPS.len()
    );
    Ok(())
}
