//! In-process [`PlanRepository`] behind a single mutex.
//!
//! Backs the service and HTTP handler tests. Every operation holds the lock
//! for its whole duration, which makes `replace_active` atomic.

use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use studyplan_db::models::{NewStudyPlan, StudyPlan, StudySession};

use super::{PlanDetail, PlanRepository, clamp_completion};

#[derive(Debug, Default)]
pub struct InMemoryPlanRepository {
    /// Plans in insertion order.
    plans: Mutex<Vec<PlanDetail>>,
}

impl InMemoryPlanRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of active plans the user has.
    pub async fn active_count(&self, user_id: Uuid) -> usize {
        self.plans
            .lock()
            .await
            .iter()
            .filter(|p| p.plan.user_id == user_id && p.plan.is_active)
            .count()
    }
}

fn materialize(new: &NewStudyPlan) -> PlanDetail {
    let plan_id = Uuid::new_v4();
    let plan = StudyPlan {
        id: plan_id,
        user_id: new.user_id,
        plan_name: new.plan_name.clone(),
        target_exam: new.target_exam.clone(),
        exam_date: new.exam_date,
        hours_per_day: new.hours_per_day,
        days_per_week: new.days_per_week,
        weeks_until_exam: new.weeks_until_exam,
        is_active: true,
        completion_percentage: 0,
        created_at: Utc::now(),
        updated_at: None,
    };
    let mut sessions: Vec<StudySession> = new
        .sessions
        .iter()
        .map(|s| StudySession {
            id: Uuid::new_v4(),
            plan_id,
            day_index: s.day_index,
            sequence: s.sequence,
            subject: s.subject.clone(),
            topic: s.topic.clone(),
            duration_minutes: s.duration_minutes,
        })
        .collect();
    sessions.sort_by_key(|s| (s.day_index, s.sequence));
    PlanDetail { plan, sessions }
}

fn deactivate_where(plans: &mut [PlanDetail], pred: impl Fn(&StudyPlan) -> bool) -> u64 {
    let now = Utc::now();
    let mut changed = 0;
    for detail in plans.iter_mut().filter(|p| p.plan.is_active && pred(&p.plan)) {
        detail.plan.is_active = false;
        detail.plan.updated_at = Some(now);
        changed += 1;
    }
    changed
}

#[async_trait]
impl PlanRepository for InMemoryPlanRepository {
    async fn save(&self, plan: &NewStudyPlan) -> Result<Uuid> {
        let mut plans = self.plans.lock().await;
        if plans
            .iter()
            .any(|p| p.plan.user_id == plan.user_id && p.plan.is_active)
        {
            bail!("user {} already has an active study plan", plan.user_id);
        }
        let detail = materialize(plan);
        let id = detail.plan.id;
        plans.push(detail);
        Ok(id)
    }

    async fn get_active(&self, user_id: Uuid) -> Result<Option<PlanDetail>> {
        let plans = self.plans.lock().await;
        Ok(plans
            .iter()
            .find(|p| p.plan.user_id == user_id && p.plan.is_active)
            .cloned())
    }

    async fn deactivate_all(&self, user_id: Uuid) -> Result<u64> {
        let mut plans = self.plans.lock().await;
        Ok(deactivate_where(&mut plans, |p| p.user_id == user_id))
    }

    async fn replace_active(&self, plan: &NewStudyPlan) -> Result<PlanDetail> {
        let mut plans = self.plans.lock().await;
        deactivate_where(&mut plans, |p| p.user_id == plan.user_id);
        let detail = materialize(plan);
        plans.push(detail.clone());
        Ok(detail)
    }

    async fn get(&self, user_id: Uuid, plan_id: Uuid) -> Result<Option<PlanDetail>> {
        let plans = self.plans.lock().await;
        Ok(plans
            .iter()
            .find(|p| p.plan.id == plan_id && p.plan.user_id == user_id)
            .cloned())
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<StudyPlan>> {
        let plans = self.plans.lock().await;
        Ok(plans
            .iter()
            .rev()
            .filter(|p| p.plan.user_id == user_id)
            .map(|p| p.plan.clone())
            .collect())
    }

    async fn deactivate(&self, user_id: Uuid, plan_id: Uuid) -> Result<bool> {
        let mut plans = self.plans.lock().await;
        let owned = plans
            .iter()
            .any(|p| p.plan.id == plan_id && p.plan.user_id == user_id);
        if owned {
            deactivate_where(&mut plans, |p| p.id == plan_id);
        }
        Ok(owned)
    }

    async fn set_completion(
        &self,
        user_id: Uuid,
        plan_id: Uuid,
        percentage: i32,
    ) -> Result<Option<i32>> {
        let mut plans = self.plans.lock().await;
        let Some(detail) = plans
            .iter_mut()
            .find(|p| p.plan.id == plan_id && p.plan.user_id == user_id)
        else {
            return Ok(None);
        };
        detail.plan.completion_percentage = clamp_completion(percentage);
        detail.plan.updated_at = Some(Utc::now());
        Ok(Some(detail.plan.completion_percentage))
    }
}
