use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Row structs
// ---------------------------------------------------------------------------

/// A persisted study plan. Sessions live in `study_sessions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct StudyPlan {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan_name: String,
    pub target_exam: String,
    pub exam_date: Option<DateTime<Utc>>,
    pub hours_per_day: f64,
    pub days_per_week: i32,
    pub weeks_until_exam: i32,
    pub is_active: bool,
    pub completion_percentage: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// One block of study time on one day of a plan's week.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct StudySession {
    pub id: Uuid,
    pub plan_id: Uuid,
    pub day_index: i32,
    pub sequence: i32,
    pub subject: String,
    pub topic: Option<String>,
    pub duration_minutes: i32,
}

// ---------------------------------------------------------------------------
// Insert payloads
// ---------------------------------------------------------------------------

/// Everything needed to insert a plan together with its sessions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewStudyPlan {
    pub user_id: Uuid,
    pub plan_name: String,
    pub target_exam: String,
    pub exam_date: Option<DateTime<Utc>>,
    pub hours_per_day: f64,
    pub days_per_week: i32,
    pub weeks_until_exam: i32,
    pub sessions: Vec<NewStudySession>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewStudySession {
    pub day_index: i32,
    pub sequence: i32,
    pub subject: String,
    pub topic: Option<String>,
    pub duration_minutes: i32,
}

impl NewStudyPlan {
    /// Total scheduled minutes across the whole week.
    pub fn total_minutes(&self) -> i64 {
        self.sessions
            .iter()
            .map(|s| i64::from(s.duration_minutes))
            .sum()
    }
}
