//! Database query functions for the `study_sessions` table.

use anyhow::{Context, Result};
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::models::{NewStudySession, StudySession};

/// Insert all sessions of a plan in one statement. Returns the inserted rows
/// ordered by day, then sequence.
pub async fn insert_sessions<'e, E>(
    executor: E,
    plan_id: Uuid,
    sessions: &[NewStudySession],
) -> Result<Vec<StudySession>>
where
    E: PgExecutor<'e>,
{
    if sessions.is_empty() {
        return Ok(Vec::new());
    }

    let days: Vec<i32> = sessions.iter().map(|s| s.day_index).collect();
    let sequences: Vec<i32> = sessions.iter().map(|s| s.sequence).collect();
    let subjects: Vec<String> = sessions.iter().map(|s| s.subject.clone()).collect();
    let topics: Vec<Option<String>> = sessions.iter().map(|s| s.topic.clone()).collect();
    let minutes: Vec<i32> = sessions.iter().map(|s| s.duration_minutes).collect();

    let mut rows = sqlx::query_as::<_, StudySession>(
        "INSERT INTO study_sessions (plan_id, day_index, sequence, subject, topic, duration_minutes) \
         SELECT $1, u.day_index, u.sequence, u.subject, u.topic, u.duration_minutes \
         FROM UNNEST($2::int4[], $3::int4[], $4::text[], $5::text[], $6::int4[]) \
              AS u(day_index, sequence, subject, topic, duration_minutes) \
         RETURNING *",
    )
    .bind(plan_id)
    .bind(&days)
    .bind(&sequences)
    .bind(&subjects)
    .bind(&topics)
    .bind(&minutes)
    .fetch_all(executor)
    .await
    .with_context(|| format!("failed to insert sessions for plan {plan_id}"))?;

    rows.sort_by_key(|s| (s.day_index, s.sequence));
    Ok(rows)
}

/// Sessions of a plan in schedule order.
pub async fn list_sessions_for_plan<'e, E>(executor: E, plan_id: Uuid) -> Result<Vec<StudySession>>
where
    E: PgExecutor<'e>,
{
    let sessions = sqlx::query_as::<_, StudySession>(
        "SELECT * FROM study_sessions WHERE plan_id = $1 ORDER BY day_index, sequence",
    )
    .bind(plan_id)
    .fetch_all(executor)
    .await
    .context("failed to list study sessions")?;

    Ok(sessions)
}
