//! PostgreSQL-backed [`PlanRepository`].
//!
//! Plan replacement runs in one transaction that first takes a
//! transaction-scoped advisory lock keyed on the user, so concurrent
//! generations for the same user queue up instead of racing. The partial
//! unique index on `study_plans (user_id) WHERE is_active` backs this up at
//! the schema level.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};
use tracing::info;
use uuid::Uuid;

use studyplan_db::models::{NewStudyPlan, StudyPlan};
use studyplan_db::queries::{study_plans as plan_queries, study_sessions as session_queries};

use super::{PlanDetail, PlanRepository, clamp_completion};

#[derive(Debug, Clone)]
pub struct PgPlanRepository {
    pool: PgPool,
}

impl PgPlanRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn with_sessions(&self, plan: Option<StudyPlan>) -> Result<Option<PlanDetail>> {
        let Some(plan) = plan else {
            return Ok(None);
        };
        let sessions = session_queries::list_sessions_for_plan(&self.pool, plan.id).await?;
        Ok(Some(PlanDetail { plan, sessions }))
    }
}

/// Insert the plan row and its sessions on one connection.
async fn insert_plan_with_sessions(
    conn: &mut PgConnection,
    new: &NewStudyPlan,
) -> Result<PlanDetail> {
    let plan = plan_queries::insert_plan(&mut *conn, new).await?;
    let sessions = session_queries::insert_sessions(&mut *conn, plan.id, &new.sessions).await?;
    Ok(PlanDetail { plan, sessions })
}

#[async_trait]
impl PlanRepository for PgPlanRepository {
    async fn save(&self, plan: &NewStudyPlan) -> Result<Uuid> {
        let mut tx = self.pool.begin().await.context("failed to begin transaction")?;
        let detail = insert_plan_with_sessions(&mut *tx, plan).await?;
        tx.commit().await.context("failed to commit transaction")?;
        Ok(detail.plan.id)
    }

    async fn get_active(&self, user_id: Uuid) -> Result<Option<PlanDetail>> {
        let plan = plan_queries::get_active_plan(&self.pool, user_id).await?;
        self.with_sessions(plan).await
    }

    async fn deactivate_all(&self, user_id: Uuid) -> Result<u64> {
        plan_queries::deactivate_all_for_user(&self.pool, user_id).await
    }

    async fn replace_active(&self, plan: &NewStudyPlan) -> Result<PlanDetail> {
        let mut tx = self.pool.begin().await.context("failed to begin transaction")?;

        plan_queries::lock_user_plans(&mut *tx, plan.user_id).await?;
        let deactivated = plan_queries::deactivate_all_for_user(&mut *tx, plan.user_id).await?;
        let detail = insert_plan_with_sessions(&mut *tx, plan).await?;

        // Dropping `tx` on any error above rolls everything back.
        tx.commit().await.context("failed to commit transaction")?;

        info!(
            user_id = %plan.user_id,
            plan_id = %detail.plan.id,
            deactivated,
            sessions = detail.sessions.len(),
            "active study plan replaced"
        );
        Ok(detail)
    }

    async fn get(&self, user_id: Uuid, plan_id: Uuid) -> Result<Option<PlanDetail>> {
        let plan = plan_queries::get_plan_for_user(&self.pool, user_id, plan_id).await?;
        self.with_sessions(plan).await
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<StudyPlan>> {
        plan_queries::list_plans_for_user(&self.pool, user_id).await
    }

    async fn deactivate(&self, user_id: Uuid, plan_id: Uuid) -> Result<bool> {
        plan_queries::deactivate_plan(&self.pool, user_id, plan_id).await
    }

    async fn set_completion(
        &self,
        user_id: Uuid,
        plan_id: Uuid,
        percentage: i32,
    ) -> Result<Option<i32>> {
        plan_queries::set_completion(&self.pool, user_id, plan_id, clamp_completion(percentage))
            .await
    }
}
