//! Database query functions for the `study_plans` table.
//!
//! Functions that may run inside a transaction take any [`PgExecutor`], so
//! callers can pass either `&PgPool` or `&mut *tx`.

use anyhow::{Context, Result};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use crate::models::{NewStudyPlan, StudyPlan};

/// Insert a plan row (sessions are inserted separately). The row starts
/// active with zero completion.
pub async fn insert_plan<'e, E>(executor: E, new: &NewStudyPlan) -> Result<StudyPlan>
where
    E: PgExecutor<'e>,
{
    let plan = sqlx::query_as::<_, StudyPlan>(
        "INSERT INTO study_plans \
             (user_id, plan_name, target_exam, exam_date, hours_per_day, days_per_week, weeks_until_exam) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         RETURNING *",
    )
    .bind(new.user_id)
    .bind(&new.plan_name)
    .bind(&new.target_exam)
    .bind(new.exam_date)
    .bind(new.hours_per_day)
    .bind(new.days_per_week)
    .bind(new.weeks_until_exam)
    .fetch_one(executor)
    .await
    .with_context(|| format!("failed to insert study plan for user {}", new.user_id))?;

    Ok(plan)
}

/// Fetch a plan only if it belongs to `user_id`.
pub async fn get_plan_for_user(pool: &PgPool, user_id: Uuid, id: Uuid) -> Result<Option<StudyPlan>> {
    let plan = sqlx::query_as::<_, StudyPlan>(
        "SELECT * FROM study_plans WHERE id = $1 AND user_id = $2",
    )
    .bind(id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .context("failed to fetch study plan")?;

    Ok(plan)
}

/// All plans of a user, newest first.
pub async fn list_plans_for_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<StudyPlan>> {
    let plans = sqlx::query_as::<_, StudyPlan>(
        "SELECT * FROM study_plans WHERE user_id = $1 ORDER BY created_at DESC, id",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .context("failed to list study plans")?;

    Ok(plans)
}

/// The user's active plan, if any.
pub async fn get_active_plan<'e, E>(executor: E, user_id: Uuid) -> Result<Option<StudyPlan>>
where
    E: PgExecutor<'e>,
{
    let plan = sqlx::query_as::<_, StudyPlan>(
        "SELECT * FROM study_plans WHERE user_id = $1 AND is_active",
    )
    .bind(user_id)
    .fetch_optional(executor)
    .await
    .context("failed to fetch active study plan")?;

    Ok(plan)
}

/// Mark every active plan of the user inactive. Returns the number of rows
/// changed.
pub async fn deactivate_all_for_user<'e, E>(executor: E, user_id: Uuid) -> Result<u64>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query(
        "UPDATE study_plans SET is_active = FALSE, updated_at = now() \
         WHERE user_id = $1 AND is_active",
    )
    .bind(user_id)
    .execute(executor)
    .await
    .context("failed to deactivate study plans")?;

    Ok(result.rows_affected())
}

/// Mark one plan inactive. Returns `false` when the plan does not exist or
/// belongs to someone else. Deactivating an inactive plan is a no-op that
/// still returns `true`.
pub async fn deactivate_plan(pool: &PgPool, user_id: Uuid, id: Uuid) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE study_plans \
         SET is_active = FALSE, updated_at = CASE WHEN is_active THEN now() ELSE updated_at END \
         WHERE id = $1 AND user_id = $2",
    )
    .bind(id)
    .bind(user_id)
    .execute(pool)
    .await
    .context("failed to deactivate study plan")?;

    Ok(result.rows_affected() == 1)
}

/// Set the completion percentage. The caller is expected to clamp to
/// 0..=100; the table enforces it with a CHECK constraint.
pub async fn set_completion(
    pool: &PgPool,
    user_id: Uuid,
    id: Uuid,
    percentage: i32,
) -> Result<Option<i32>> {
    let row: Option<(i32,)> = sqlx::query_as(
        "UPDATE study_plans SET completion_percentage = $1, updated_at = now() \
         WHERE id = $2 AND user_id = $3 \
         RETURNING completion_percentage",
    )
    .bind(percentage)
    .bind(id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .context("failed to update study plan progress")?;

    Ok(row.map(|(pct,)| pct))
}

/// Serialize plan replacement for one user until the surrounding
/// transaction ends. Must be called on a transaction connection.
pub async fn lock_user_plans<'e, E>(executor: E, user_id: Uuid) -> Result<()>
where
    E: PgExecutor<'e>,
{
    sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1::text, 0))")
        .bind(user_id)
        .execute(executor)
        .await
        .with_context(|| format!("failed to lock study plans of user {user_id}"))?;

    Ok(())
}
