//! Per-subject priority weights.

use serde::Serialize;

/// Share of the weekly study time assigned to one subject.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectWeight {
    pub subject: String,
    /// Normalized weight; all weights of one allocation sum to 1.
    pub weight: f64,
    /// Index of the subject in the request's subject list.
    pub position: usize,
    /// Whether the subject was listed as a weak area.
    pub boosted: bool,
}

/// Weight every subject `1`, or `1 + boost` when it is a weak area, then
/// normalize.
///
/// The result is ordered by descending weight. Equal weights keep the order
/// of `subjects`. Returns an empty list for no subjects.
pub fn allocate_weights(subjects: &[String], weak_areas: &[String], boost: f64) -> Vec<SubjectWeight> {
    let weak: Vec<String> = weak_areas.iter().map(|w| w.to_lowercase()).collect();

    let raw: Vec<(usize, bool, f64)> = subjects
        .iter()
        .enumerate()
        .map(|(position, subject)| {
            let boosted = weak.contains(&subject.to_lowercase());
            let raw = if boosted { 1.0 + boost } else { 1.0 };
            (position, boosted, raw)
        })
        .collect();
    let total: f64 = raw.iter().map(|(_, _, r)| r).sum();

    let mut weights: Vec<SubjectWeight> = raw
        .into_iter()
        .map(|(position, boosted, r)| SubjectWeight {
            subject: subjects[position].clone(),
            weight: r / total,
            position,
            boosted,
        })
        .collect();

    // `sort_by` is stable, so ties stay in input order.
    weights.sort_by(|a, b| b.weight.total_cmp(&a.weight));
    weights
}
