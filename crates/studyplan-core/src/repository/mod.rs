//! Storage boundary for study plans.
//!
//! The scheduler never touches storage directly; it hands finished plans to
//! a [`PlanRepository`]. Two implementations ship with the crate:
//! [`PgPlanRepository`] for PostgreSQL and [`InMemoryPlanRepository`] for
//! tests and dry runs.

pub mod memory;
pub mod postgres;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use studyplan_db::models::{NewStudyPlan, StudyPlan, StudySession};

pub use memory::InMemoryPlanRepository;
pub use postgres::PgPlanRepository;

/// A plan together with its sessions in schedule order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanDetail {
    #[serde(flatten)]
    pub plan: StudyPlan,
    pub sessions: Vec<StudySession>,
}

/// Persistence operations the plan service relies on.
///
/// At most one plan per user is active. [`replace_active`] is the only
/// operation that creates a plan while another may be active, and it must
/// deactivate the old plan and store the new one as a single atomic step.
///
/// [`replace_active`]: PlanRepository::replace_active
#[async_trait]
pub trait PlanRepository: Send + Sync {
    /// Store a new active plan with its sessions. Fails if the user already
    /// has an active plan.
    async fn save(&self, plan: &NewStudyPlan) -> Result<Uuid>;

    async fn get_active(&self, user_id: Uuid) -> Result<Option<PlanDetail>>;

    /// Deactivate every active plan of the user; returns how many changed.
    async fn deactivate_all(&self, user_id: Uuid) -> Result<u64>;

    /// `deactivate_all` followed by `save`, atomically.
    async fn replace_active(&self, plan: &NewStudyPlan) -> Result<PlanDetail>;

    /// A plan owned by `user_id`.
    async fn get(&self, user_id: Uuid, plan_id: Uuid) -> Result<Option<PlanDetail>>;

    /// All plans of the user, newest first, without sessions.
    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<StudyPlan>>;

    /// Deactivate one plan. `false` if it is not the user's plan.
    async fn deactivate(&self, user_id: Uuid, plan_id: Uuid) -> Result<bool>;

    /// Record progress, clamped to 0..=100. Returns the stored value, or
    /// `None` if it is not the user's plan.
    async fn set_completion(
        &self,
        user_id: Uuid,
        plan_id: Uuid,
        percentage: i32,
    ) -> Result<Option<i32>>;
}

// Compile-time assertion: the repository is usable as `dyn PlanRepository`.
const _: () = {
    fn _assert_object_safe(_: &dyn PlanRepository) {}
};

/// Clamp a reported completion percentage into 0..=100.
pub fn clamp_completion(percentage: i32) -> i32 {
    percentage.clamp(0, 100)
}
