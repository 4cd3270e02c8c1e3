//! Query functions, one module per table.

pub mod study_plans;
pub mod study_sessions;
