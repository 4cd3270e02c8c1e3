//! Study-plan scheduling: request normalization, weight allocation and
//! session packing. Everything here is pure and deterministic.

pub mod packer;
pub mod request;
pub mod weights;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use packer::{PackedSchedule, ScheduledSession, pack_sessions};
pub use request::{NormalizedRequest, StudyPlanRequest, ValidationError, normalize};
pub use weights::{SubjectWeight, allocate_weights};

/// Tunables of the scheduling algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Extra raw weight added to a weak-area subject (base weight is 1).
    pub weak_area_boost: f64,
    /// Subjects whose weekly budget is below this are dropped.
    pub min_session_minutes: u32,
    /// Longest single session.
    pub max_session_minutes: u32,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            weak_area_boost: 1.5,
            min_session_minutes: 20,
            max_session_minutes: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlannerConfigError {
    #[error("weak_area_boost must be a finite number >= 0, got {0}")]
    InvalidBoost(f64),

    #[error("min_session_minutes must be greater than 0")]
    ZeroMinSession,

    #[error("max_session_minutes ({max}) must be >= min_session_minutes ({min})")]
    MaxBelowMin { min: u32, max: u32 },
}

impl PlannerConfig {
    pub fn validate(&self) -> Result<(), PlannerConfigError> {
        if !self.weak_area_boost.is_finite() || self.weak_area_boost < 0.0 {
            return Err(PlannerConfigError::InvalidBoost(self.weak_area_boost));
        }
        if self.min_session_minutes == 0 {
            return Err(PlannerConfigError::ZeroMinSession);
        }
        if self.max_session_minutes < self.min_session_minutes {
            return Err(PlannerConfigError::MaxBelowMin {
                min: self.min_session_minutes,
                max: self.max_session_minutes,
            });
        }
        Ok(())
    }
}

/// Something the caller should tell the user about a generated plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlanWarning {
    /// The subject's share of the week was shorter than one session.
    SubjectDropped { subject: String, budget_minutes: u32 },
    /// A weak area that is not one of the requested subjects.
    WeakAreaIgnored { weak_area: String },
    /// A topic list keyed by a subject that was not requested.
    TopicsIgnored { subject: String },
}

impl fmt::Display for PlanWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SubjectDropped {
                subject,
                budget_minutes,
            } => write!(
                f,
                "{subject} dropped: only {budget_minutes} minutes per week would be available"
            ),
            Self::WeakAreaIgnored { weak_area } => {
                write!(f, "weak area {weak_area:?} is not one of the subjects and was ignored")
            }
            Self::TopicsIgnored { subject } => {
                write!(f, "topics for {subject:?} ignored: not one of the subjects")
            }
        }
    }
}

/// A full weekly schedule for one normalized request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Schedule {
    pub weights: Vec<SubjectWeight>,
    pub sessions: Vec<ScheduledSession>,
    pub warnings: Vec<PlanWarning>,
    pub unscheduled_minutes: u32,
}

/// Allocate weights and pack sessions for a normalized request.
pub fn build_schedule(request: &NormalizedRequest, config: &PlannerConfig) -> Schedule {
    let weights = allocate_weights(&request.subjects, &request.weak_areas, config.weak_area_boost);
    let packed = pack_sessions(
        &weights,
        &request.topics,
        request.days_per_week,
        request.day_capacity_minutes(),
        config,
    );

    let mut warnings: Vec<PlanWarning> = request
        .ignored_weak_areas
        .iter()
        .map(|w| PlanWarning::WeakAreaIgnored {
            weak_area: w.clone(),
        })
        .collect();
    warnings.extend(
        request
            .ignored_topic_subjects
            .iter()
            .map(|s| PlanWarning::TopicsIgnored { subject: s.clone() }),
    );
    warnings.extend(packed.warnings);

    Schedule {
        weights,
        sessions: packed.sessions,
        warnings,
        unscheduled_minutes: packed.unscheduled_minutes,
    }
}
