//! Read-only queries for test assertions.
//!
//! These look at rows the way no production path does (ignoring the owner,
//! aggregating sessions), so they live here rather than in `studyplan-db`.

use sqlx::PgPool;
use uuid::Uuid;

use studyplan_db::models::StudyPlan;

/// Fetch a plan by ID regardless of owner.
pub async fn plan_by_id(pool: &PgPool, id: Uuid) -> Option<StudyPlan> {
    sqlx::query_as::<_, StudyPlan>("SELECT * FROM study_plans WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .expect("failed to fetch study plan")
}

/// Number of active plans the user has.
pub async fn count_active_plans(pool: &PgPool, user_id: Uuid) -> i64 {
    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM study_plans WHERE user_id = $1 AND is_active")
            .bind(user_id)
            .fetch_one(pool)
            .await
            .expect("failed to count active study plans");
    count
}

/// Scheduled minutes per day of a plan, as `(day_index, minutes)` pairs.
pub async fn minutes_per_day(pool: &PgPool, plan_id: Uuid) -> Vec<(i32, i64)> {
    sqlx::query_as(
        "SELECT day_index, SUM(duration_minutes)::int8 FROM study_sessions \
         WHERE plan_id = $1 GROUP BY day_index ORDER BY day_index",
    )
    .bind(plan_id)
    .fetch_all(pool)
    .await
    .expect("failed to sum study session minutes")
}
