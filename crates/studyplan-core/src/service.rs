//! Plan service layer.
//!
//! Runs a request through the planner and hands the result to a
//! [`PlanRepository`], replacing the user's active plan.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use studyplan_db::models::{NewStudyPlan, NewStudySession};

use crate::planner::{
    PlanWarning, PlannerConfig, ScheduledSession, StudyPlanRequest, SubjectWeight,
    ValidationError, build_schedule, normalize,
};
use crate::repository::{PlanDetail, PlanRepository};

/// Horizon assumed when the request carries no exam date.
pub const DEFAULT_WEEKS_UNTIL_EXAM: i32 = 12;

#[derive(Debug, Error)]
pub enum PlanError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("failed to store study plan: {0:#}")]
    Persistence(anyhow::Error),
}

/// A plan ready to be stored, plus what the planner learned on the way.
#[derive(Debug, Clone, Serialize)]
pub struct PlanDraft {
    pub plan: NewStudyPlan,
    pub weights: Vec<SubjectWeight>,
    pub warnings: Vec<PlanWarning>,
    pub unscheduled_minutes: u32,
}

/// A stored plan returned to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedPlan {
    #[serde(flatten)]
    pub plan: PlanDetail,
    pub warnings: Vec<PlanWarning>,
    pub unscheduled_minutes: u32,
}

/// Whole weeks left until the exam, at least 1.
pub fn weeks_until_exam(exam_date: Option<DateTime<Utc>>, now: DateTime<Utc>) -> i32 {
    match exam_date {
        Some(date) => {
            let weeks = (date - now).num_days() / 7;
            weeks.clamp(1, i64::from(i32::MAX)) as i32
        }
        None => DEFAULT_WEEKS_UNTIL_EXAM,
    }
}

impl From<ScheduledSession> for NewStudySession {
    fn from(s: ScheduledSession) -> Self {
        Self {
            day_index: i32::from(s.day_index),
            sequence: s.sequence as i32,
            subject: s.subject,
            topic: s.topic,
            duration_minutes: s.duration_minutes as i32,
        }
    }
}

/// Build a plan without storing it.
pub fn preview_plan(
    config: &PlannerConfig,
    user_id: Uuid,
    request: &StudyPlanRequest,
    now: DateTime<Utc>,
) -> Result<PlanDraft, ValidationError> {
    let normalized = normalize(request)?;
    let schedule = build_schedule(&normalized, config);

    let plan = NewStudyPlan {
        user_id,
        plan_name: format!("{} Preparation Plan", normalized.target_exam),
        target_exam: normalized.target_exam.clone(),
        exam_date: normalized.exam_date,
        hours_per_day: normalized.hours_per_day,
        days_per_week: i32::from(normalized.days_per_week),
        weeks_until_exam: weeks_until_exam(normalized.exam_date, now),
        sessions: schedule.sessions.into_iter().map(Into::into).collect(),
    };

    Ok(PlanDraft {
        plan,
        weights: schedule.weights,
        warnings: schedule.warnings,
        unscheduled_minutes: schedule.unscheduled_minutes,
    })
}

/// Generate a plan and make it the user's only active plan.
pub async fn generate_plan(
    repo: &dyn PlanRepository,
    config: &PlannerConfig,
    user_id: Uuid,
    request: &StudyPlanRequest,
) -> Result<GeneratedPlan, PlanError> {
    generate_plan_at(repo, config, user_id, request, Utc::now()).await
}

/// [`generate_plan`] with an explicit clock.
pub async fn generate_plan_at(
    repo: &dyn PlanRepository,
    config: &PlannerConfig,
    user_id: Uuid,
    request: &StudyPlanRequest,
    now: DateTime<Utc>,
) -> Result<GeneratedPlan, PlanError> {
    let draft = preview_plan(config, user_id, request, now)?;

    for warning in &draft.warnings {
        warn!(user_id = %user_id, "{warning}");
    }

    let plan = repo
        .replace_active(&draft.plan)
        .await
        .map_err(PlanError::Persistence)?;

    info!(
        user_id = %user_id,
        plan_id = %plan.plan.id,
        target_exam = %plan.plan.target_exam,
        sessions = plan.sessions.len(),
        minutes = draft.plan.total_minutes(),
        "study plan generated"
    );

    Ok(GeneratedPlan {
        plan,
        warnings: draft.warnings,
        unscheduled_minutes: draft.unscheduled_minutes,
    })
}
