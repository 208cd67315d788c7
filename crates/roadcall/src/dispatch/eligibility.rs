use serde::{Deserialize, Serialize};

use super::domain::{DispatchProbe, Technician, TechnicianId, TechnicianStatus};
use super::geo;

/// Stable identifiers for failed eligibility checks, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    Status,
    Active,
    Available,
    Position,
    ServiceCategory,
    VehicleType,
    Distance,
}

impl RejectionReason {
    pub const fn label(self) -> &'static str {
        match self {
            RejectionReason::Status => "status",
            RejectionReason::Active => "active",
            RejectionReason::Available => "available",
            RejectionReason::Position => "position",
            RejectionReason::ServiceCategory => "service_category",
            RejectionReason::VehicleType => "vehicle_type",
            RejectionReason::Distance => "distance",
        }
    }
}

/// Evaluation switches. `simulate_ready` ignores the live activity and
/// availability flags so audits can measure structural coverage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvaluationOptions {
    pub simulate_ready: bool,
}

/// Outcome of evaluating one (probe, technician) pair. Ephemeral, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EligibilityResult {
    pub technician_id: TechnicianId,
    pub eligible: bool,
    pub distance_km: Option<f64>,
    pub rejection_reasons: Vec<RejectionReason>,
}

/// Score one technician against a probe. Pure; every check runs so the audit
/// histograms see the full rejection picture rather than the first failure.
pub fn evaluate(
    probe: &DispatchProbe,
    technician: &Technician,
    options: &EvaluationOptions,
) -> EligibilityResult {
    let mut rejection_reasons = Vec::new();

    if technician.status != TechnicianStatus::Approved {
        rejection_reasons.push(RejectionReason::Status);
    }

    if !options.simulate_ready {
        if !technician.active {
            rejection_reasons.push(RejectionReason::Active);
        }
        if !technician.available {
            rejection_reasons.push(RejectionReason::Available);
        }
    }

    let position = technician.position.filter(|point| point.is_valid());
    if position.is_none() {
        rejection_reasons.push(RejectionReason::Position);
    }

    if !technician
        .service_categories
        .contains(&probe.service_category)
    {
        rejection_reasons.push(RejectionReason::ServiceCategory);
    }

    if !technician.vehicle_types.contains(&probe.vehicle_type) {
        rejection_reasons.push(RejectionReason::VehicleType);
    }

    let distance_km = match (probe.pickup.filter(|point| point.is_valid()), position) {
        (Some(pickup), Some(at)) => Some(geo::great_circle_km(pickup, at)),
        _ => None,
    };

    // Range is only judged against a concrete pickup; aggregate audits pass no
    // position and skip this check entirely.
    if let Some(distance) = distance_km {
        let mut limit = technician.service_radius_km;
        if let Some(override_km) = probe.radius_override_km {
            limit = limit.min(override_km);
        }
        if distance > limit {
            rejection_reasons.push(RejectionReason::Distance);
        }
    }

    EligibilityResult {
        technician_id: technician.id.clone(),
        eligible: rejection_reasons.is_empty(),
        distance_km,
        rejection_reasons,
    }
}
