//! Request validation and canonicalization.
//!
//! [`normalize`] turns a loosely-shaped [`StudyPlanRequest`] into a
//! [`NormalizedRequest`]:
//! - entries are trimmed, blanks dropped, duplicates removed
//!   case-insensitively (first spelling and position win);
//! - the time budget is range-checked;
//! - weak areas and topic lists that do not name a subject are set aside
//!   instead of failing the request.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Hours in a day; the upper bound for `hours_per_day`.
pub const MAX_HOURS_PER_DAY: f64 = 24.0;

/// A study-plan generation request as received from a client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StudyPlanRequest {
    pub target_exam: String,
    pub hours_per_day: f64,
    pub days_per_week: i64,
    pub subjects: Vec<String>,
    #[serde(default)]
    pub weak_areas: Option<Vec<String>>,
    #[serde(default)]
    pub exam_date: Option<DateTime<Utc>>,
    /// Optional topic lists keyed by subject name.
    #[serde(default)]
    pub topics: Option<BTreeMap<String, Vec<String>>>,
}

/// A request that passed validation. Subjects keep their first-seen order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedRequest {
    pub target_exam: String,
    pub hours_per_day: f64,
    pub days_per_week: u8,
    pub subjects: Vec<String>,
    /// Weak areas that name a subject, spelled as in `subjects`.
    pub weak_areas: Vec<String>,
    /// Weak areas that matched no subject.
    pub ignored_weak_areas: Vec<String>,
    /// Topic list per subject, parallel to `subjects`. Empty when none given.
    pub topics: Vec<Vec<String>>,
    /// Keys of `topics` that matched no subject.
    pub ignored_topic_subjects: Vec<String>,
    pub exam_date: Option<DateTime<Utc>>,
}

impl NormalizedRequest {
    /// Whole minutes available per study day, never more than
    /// `hours_per_day * 60`. The epsilon absorbs float error so 2.3 h is 138.
    pub fn day_capacity_minutes(&self) -> u32 {
        (self.hours_per_day * 60.0 + 1e-9).floor() as u32
    }
}

/// A request field failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {field}: {reason}")]
pub struct ValidationError {
    field: &'static str,
    reason: String,
}

impl ValidationError {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }

    /// Name of the offending request field.
    pub fn field(&self) -> &'static str {
        self.field
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// Validate and canonicalize a request.
pub fn normalize(request: &StudyPlanRequest) -> Result<NormalizedRequest, ValidationError> {
    let target_exam = request.target_exam.trim();
    if target_exam.is_empty() {
        return Err(ValidationError::new("target_exam", "must not be empty"));
    }

    let hours = request.hours_per_day;
    if !hours.is_finite() || hours <= 0.0 {
        return Err(ValidationError::new(
            "hours_per_day",
            format!("must be greater than 0, got {hours}"),
        ));
    }
    if hours > MAX_HOURS_PER_DAY {
        return Err(ValidationError::new(
            "hours_per_day",
            format!("must be at most {MAX_HOURS_PER_DAY}, got {hours}"),
        ));
    }

    let days_per_week = match u8::try_from(request.days_per_week) {
        Ok(days @ 1..=7) => days,
        _ => {
            return Err(ValidationError::new(
                "days_per_week",
                format!("must be between 1 and 7, got {}", request.days_per_week),
            ));
        }
    };

    let subjects = dedupe(&request.subjects);
    if subjects.is_empty() {
        return Err(ValidationError::new(
            "subjects",
            "at least one subject is required",
        ));
    }

    let mut weak_areas = Vec::new();
    let mut ignored_weak_areas = Vec::new();
    for entry in dedupe(request.weak_areas.as_deref().unwrap_or_default()) {
        match find_subject(&subjects, &entry) {
            Some(idx) => weak_areas.push(subjects[idx].clone()),
            None => ignored_weak_areas.push(entry),
        }
    }

    let mut topics = vec![Vec::new(); subjects.len()];
    let mut ignored_topic_subjects = Vec::new();
    for (subject, list) in request.topics.iter().flatten() {
        match find_subject(&subjects, subject.trim()) {
            Some(idx) => {
                // Two keys differing only in case merge into one list.
                let mut merged = std::mem::take(&mut topics[idx]);
                merged.extend(list.iter().cloned());
                topics[idx] = dedupe(&merged);
            }
            None if subject.trim().is_empty() => {}
            None => ignored_topic_subjects.push(subject.trim().to_string()),
        }
    }

    Ok(NormalizedRequest {
        target_exam: target_exam.to_string(),
        hours_per_day: hours,
        days_per_week,
        subjects,
        weak_areas,
        ignored_weak_areas,
        topics,
        ignored_topic_subjects,
        exam_date: request.exam_date,
    })
}

/// Trim, drop blanks and remove case-insensitive duplicates, keeping the
/// first occurrence.
fn dedupe(entries: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    entries
        .iter()
        .map(|e| e.trim())
        .filter(|e| !e.is_empty())
        .filter(|e| seen.insert(e.to_lowercase()))
        .map(str::to_owned)
        .collect()
}

fn find_subject(subjects: &[String], name: &str) -> Option<usize> {
    let needle = name.to_lowercase();
    subjects.iter().position(|s| s.to_lowercase() == needle)
}
