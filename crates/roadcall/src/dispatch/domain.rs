use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier wrapper for technicians in the directory.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TechnicianId(pub String);

impl fmt::Display for TechnicianId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier wrapper for service requests.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Raw coordinate pair. Validity is judged by the eligibility evaluator, not at
/// construction, so incomplete directory data can be carried without failing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Finite and within world bounds.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && self.lat.abs() <= 90.0
            && self.lng.abs() <= 180.0
    }
}

/// Error for rejected category and vehicle-type labels.
#[derive(Debug, thiserror::Error)]
#[error("label must be non-empty, found {0:?}")]
pub struct InvalidLabel(pub String);

/// Normalized service category label (e.g. `towing`, `jump_start`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceCategory(String);

impl ServiceCategory {
    pub fn new(raw: &str) -> Result<Self, InvalidLabel> {
        normalize_label(raw)
            .map(Self)
            .ok_or_else(|| InvalidLabel(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalized vehicle-type label (e.g. `sedan`, `box_truck`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VehicleType(String);

impl VehicleType {
    pub fn new(raw: &str) -> Result<Self, InvalidLabel> {
        normalize_label(raw)
            .map(Self)
            .ok_or_else(|| InvalidLabel(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VehicleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn normalize_label(raw: &str) -> Option<String> {
    let normalized = raw
        .trim()
        .to_ascii_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_");
    if normalized.is_empty() {
        None
    } else {
        Some(normalized)
    }
}

/// Onboarding status tracked by the technician profile subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TechnicianStatus {
    Pending,
    Approved,
    Rejected,
}

impl TechnicianStatus {
    pub const fn label(self) -> &'static str {
        match self {
            TechnicianStatus::Pending => "pending",
            TechnicianStatus::Approved => "approved",
            TechnicianStatus::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// Directory profile for a field technician. The dispatch engine only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Technician {
    pub id: TechnicianId,
    pub position: Option<GeoPoint>,
    pub status: TechnicianStatus,
    pub active: bool,
    pub available: bool,
    pub service_categories: BTreeSet<ServiceCategory>,
    pub vehicle_types: BTreeSet<VehicleType>,
    pub service_radius_km: f64,
    pub rating: f32,
}

/// Lifecycle status for a service request; the engine only triggers the
/// assigned/unmatched transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Open,
    Assigned,
    Unmatched,
    Cancelled,
}

impl RequestStatus {
    pub const fn label(self) -> &'static str {
        match self {
            RequestStatus::Open => "open",
            RequestStatus::Assigned => "assigned",
            RequestStatus::Unmatched => "unmatched",
            RequestStatus::Cancelled => "cancelled",
        }
    }
}

/// Inbound roadside job as stored by the request subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRequest {
    pub id: RequestId,
    pub service_category: ServiceCategory,
    pub vehicle_type: VehicleType,
    pub pickup: GeoPoint,
    pub radius_override_km: Option<f64>,
    pub status: RequestStatus,
}

/// What the evaluator matches against: a concrete request, or a synthetic
/// coverage cell with no pickup position.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchProbe {
    pub service_category: ServiceCategory,
    pub vehicle_type: VehicleType,
    pub pickup: Option<GeoPoint>,
    pub radius_override_km: Option<f64>,
}

impl DispatchProbe {
    pub fn from_request(request: &ServiceRequest) -> Self {
        Self {
            service_category: request.service_category.clone(),
            vehicle_type: request.vehicle_type.clone(),
            pickup: Some(request.pickup),
            radius_override_km: request.radius_override_km,
        }
    }

    pub fn for_cell(service_category: ServiceCategory, vehicle_type: VehicleType) -> Self {
        Self {
            service_category,
            vehicle_type,
            pickup: None,
            radius_override_km: None,
        }
    }

    pub fn with_reference(mut self, position: GeoPoint) -> Self {
        self.pickup = Some(position);
        self
    }
}
