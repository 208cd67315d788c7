use std::cmp::Ordering;
use std::collections::BTreeSet;

use super::domain::{DispatchProbe, Technician, TechnicianId};
use super::eligibility::{evaluate, EvaluationOptions};

/// Winning candidate with the distance the ranking was based on.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedMatch<'a> {
    pub technician: &'a Technician,
    pub distance_km: Option<f64>,
}

/// Rank every non-excluded technician and return the closest eligible one.
/// Missing distances sort last; ties resolve to the smallest technician id.
/// `None` means no candidate exists, which callers must treat as a normal
/// business outcome.
pub fn find_best_match<'a>(
    probe: &DispatchProbe,
    pool: &'a [Technician],
    excluded: &BTreeSet<TechnicianId>,
) -> Option<RankedMatch<'a>> {
    let options = EvaluationOptions::default();
    let mut ranked: Vec<(&Technician, Option<f64>)> = Vec::new();

    for technician in pool {
        if excluded.contains(&technician.id) {
            continue;
        }
        let result = evaluate(probe, technician, &options);
        if result.eligible {
            ranked.push((technician, result.distance_km));
        }
    }

    ranked.sort_by(|a, b| {
        let left = a.1.unwrap_or(f64::INFINITY);
        let right = b.1.unwrap_or(f64::INFINITY);
        left.partial_cmp(&right)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.id.cmp(&b.0.id))
    });

    ranked
        .into_iter()
        .next()
        .map(|(technician, distance_km)| RankedMatch {
            technician,
            distance_km,
        })
}
