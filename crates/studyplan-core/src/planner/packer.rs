//! Turns subject weights into a week of study sessions.
//!
//! Each subject gets a minute budget proportional to its weight. Days are
//! then filled one at a time: the subject with the most minutes left (ties
//! go to the earlier subject in the request) receives the next session, up
//! to the per-session cap and the day's remaining capacity.

use std::cmp::Reverse;

use serde::Serialize;

use super::weights::SubjectWeight;
use super::{PlanWarning, PlannerConfig};

/// A session placed on a day of the plan's week.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduledSession {
    /// 0-based day within the week.
    pub day_index: u8,
    /// 0-based position within the day.
    pub sequence: u32,
    pub subject: String,
    pub topic: Option<String>,
    pub duration_minutes: u32,
}

/// Output of [`pack_sessions`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PackedSchedule {
    pub sessions: Vec<ScheduledSession>,
    pub warnings: Vec<PlanWarning>,
    /// Budgeted minutes that did not make it into any session.
    pub unscheduled_minutes: u32,
}

struct Slot<'a> {
    subject: &'a str,
    position: usize,
    remaining: u64,
    sessions_so_far: usize,
}

/// Pack a week of sessions.
///
/// `weights` must be ordered as returned by
/// [`allocate_weights`](super::weights::allocate_weights). `topics` is
/// indexed by [`SubjectWeight::position`]; a subject without topics gets
/// sessions with no topic, otherwise its topics rotate.
pub fn pack_sessions(
    weights: &[SubjectWeight],
    topics: &[Vec<String>],
    days_per_week: u8,
    day_capacity_minutes: u32,
    config: &PlannerConfig,
) -> PackedSchedule {
    let total = u64::from(days_per_week) * u64::from(day_capacity_minutes);
    let min_session = u64::from(config.min_session_minutes);
    let max_session = u64::from(config.max_session_minutes.max(1));

    let mut warnings = Vec::new();
    let mut discarded = 0u64;
    let mut queue: Vec<Slot<'_>> = Vec::with_capacity(weights.len());

    for w in weights {
        let budget = (w.weight * total as f64).round() as u64;
        if budget < min_session {
            discarded += budget;
            warnings.push(PlanWarning::SubjectDropped {
                subject: w.subject.clone(),
                budget_minutes: budget as u32,
            });
            continue;
        }
        queue.push(Slot {
            subject: &w.subject,
            position: w.position,
            remaining: budget,
            sessions_so_far: 0,
        });
    }

    let mut sessions = Vec::new();
    for day_index in 0..days_per_week {
        let mut capacity = u64::from(day_capacity_minutes);
        let mut sequence = 0u32;

        while capacity > 0 {
            let Some(slot) = queue
                .iter_mut()
                .filter(|s| s.remaining > 0)
                .min_by_key(|s| (Reverse(s.remaining), s.position))
            else {
                break;
            };

            let minutes = slot.remaining.min(max_session).min(capacity);
            let topic = topics
                .get(slot.position)
                .filter(|list| !list.is_empty())
                .map(|list| list[slot.sessions_so_far % list.len()].clone());

            slot.remaining -= minutes;
            slot.sessions_so_far += 1;
            capacity -= minutes;

            sessions.push(ScheduledSession {
                day_index,
                sequence,
                subject: slot.subject.to_string(),
                topic,
                duration_minutes: minutes as u32,
            });
            sequence += 1;
        }
    }

    discarded += queue.iter().map(|s| s.remaining).sum::<u64>();

    PackedSchedule {
        sessions,
        warnings,
        unscheduled_minutes: discarded as u32,
    }
}
