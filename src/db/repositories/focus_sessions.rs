use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, types::Value, OptionalExtension, Row};
use uuid::Uuid;

use crate::{
    db::{
        connection::Database,
        helpers::{format_timestamp, parse_datetime, parse_session_type, to_i64, to_u64},
        models::{FocusSessionFilter, ProjectTotal, StoredFocusSession},
    },
    timer::FocusSessionRecord,
};

const SESSION_COLUMNS: &str = "id, project_id, task_id, started_at, ended_at, duration_sec, \
                               session_type, pomodoro_cycles, created_at";

fn row_to_session(row: &Row) -> Result<StoredFocusSession> {
    let started_at: String = row.get("started_at")?;
    let ended_at: String = row.get("ended_at")?;
    let created_at: String = row.get("created_at")?;
    let duration_sec: i64 = row.get("duration_sec")?;
    let session_type: String = row.get("session_type")?;
    let pomodoro_cycles: Option<i64> = row.get("pomodoro_cycles")?;

    Ok(StoredFocusSession {
        id: row.get("id")?,
        record: FocusSessionRecord {
            project_id: row.get("project_id")?,
            task_id: row.get("task_id")?,
            start: parse_datetime(&started_at, "started_at")?,
            end: parse_datetime(&ended_at, "ended_at")?,
            duration_sec: to_u64(duration_sec, "duration_sec")?,
            session_type: parse_session_type(&session_type)?,
            pomodoro_cycles: pomodoro_cycles
                .map(|c| u32::try_from(c).context("pomodoro_cycles out of range"))
                .transpose()?,
        },
        created_at: parse_datetime(&created_at, "created_at")?,
    })
}

/// WHERE clause and bound values for a filter.
fn filter_clause(filter: &FocusSessionFilter) -> (String, Vec<Value>) {
    let mut conditions = Vec::new();
    let mut values = Vec::new();

    if let Some(project_id) = &filter.project_id {
        conditions.push("project_id = ?");
        values.push(Value::Text(project_id.clone()));
    }
    if let Some(from) = &filter.from {
        conditions.push("started_at >= ?");
        values.push(Value::Text(format_timestamp(from)));
    }
    if let Some(to) = &filter.to {
        conditions.push("started_at < ?");
        values.push(Value::Text(format_timestamp(to)));
    }

    let clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };
    (clause, values)
}

impl Database {
    pub async fn insert_focus_session(
        &self,
        record: &FocusSessionRecord,
    ) -> Result<StoredFocusSession> {
        let stored = StoredFocusSession {
            id: Uuid::new_v4().to_string(),
            record: record.clone(),
            created_at: Utc::now(),
        };
        let row = stored.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO focus_sessions (id, project_id, task_id, started_at, ended_at, duration_sec, session_type, pomodoro_cycles, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    row.id,
                    row.record.project_id,
                    row.record.task_id,
                    format_timestamp(&row.record.start),
                    format_timestamp(&row.record.end),
                    to_i64(row.record.duration_sec)?,
                    row.record.session_type.as_str(),
                    row.record.pomodoro_cycles,
                    format_timestamp(&row.created_at),
                ],
            )
            .with_context(|| "failed to insert focus session")?;
            Ok(())
        })
        .await?;
        Ok(stored)
    }

    pub async fn get_focus_session(&self, id: &str) -> Result<Option<StoredFocusSession>> {
        let id = id.to_string();
        self.execute(move |conn| {
            let sql = format!("SELECT {SESSION_COLUMNS} FROM focus_sessions WHERE id = ?1");
            let session = conn
                .query_row(&sql, params![id], |row| Ok(row_to_session(row)))
                .optional()?
                .transpose()?;
            Ok(session)
        })
        .await
    }

    pub async fn list_focus_sessions(
        &self,
        filter: FocusSessionFilter,
    ) -> Result<Vec<StoredFocusSession>> {
        self.execute(move |conn| {
            let (clause, mut values) = filter_clause(&filter);
            let limit = filter.limit.map(|l| l as i64).unwrap_or(-1);
            values.push(Value::Integer(limit));
            values.push(Value::Integer(filter.offset as i64));

            let sql = format!(
                "SELECT {SESSION_COLUMNS} FROM focus_sessions {clause}
                 ORDER BY started_at DESC
                 LIMIT ? OFFSET ?"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params_from_iter(values))?;
            let mut sessions = Vec::new();
            while let Some(row) = rows.next()? {
                sessions.push(row_to_session(row)?);
            }
            Ok(sessions)
        })
        .await
    }

    /// Focused seconds per project for sessions starting in `[from, to)`,
    /// largest first.
    pub async fn project_totals(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ProjectTotal>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT project_id, SUM(duration_sec), COUNT(*)
                 FROM focus_sessions
                 WHERE started_at >= ?1 AND started_at < ?2
                 GROUP BY project_id
                 ORDER BY SUM(duration_sec) DESC, project_id ASC",
            )?;

            let mut rows = stmt.query(params![format_timestamp(&from), format_timestamp(&to)])?;
            let mut totals = Vec::new();
            while let Some(row) = rows.next()? {
                let total: i64 = row.get(1)?;
                let count: i64 = row.get(2)?;
                totals.push(ProjectTotal {
                    project_id: row.get(0)?,
                    total_sec: to_u64(total, "total_sec")?,
                    session_count: u32::try_from(count).context("session count out of range")?,
                });
            }
            Ok(totals)
        })
        .await
    }

    /// Returns whether a row was removed.
    pub async fn delete_focus_session(&self, id: &str) -> Result<bool> {
        let id = id.to_string();
        self.execute(move |conn| {
            let rows_affected =
                conn.execute("DELETE FROM focus_sessions WHERE id = ?1", params![id])?;
            Ok(rows_affected > 0)
        })
        .await
    }
}
