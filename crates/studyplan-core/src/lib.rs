//! Study-plan generation: the scheduler, the storage boundary and the
//! service that ties them together.

pub mod planner;
pub mod repository;
pub mod service;

pub use planner::{PlannerConfig, StudyPlanRequest, ValidationError};
pub use repository::{InMemoryPlanRepository, PgPlanRepository, PlanDetail, PlanRepository};
pub use service::{GeneratedPlan, PlanError, generate_plan, preview_plan};
