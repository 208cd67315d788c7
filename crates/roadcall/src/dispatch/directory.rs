use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::domain::{
    GeoPoint, InvalidLabel, ServiceCategory, Technician, TechnicianId, TechnicianStatus,
    VehicleType,
};

/// Raw technician profile as stored by the profile subsystem, before the
/// directory boundary has vetted it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnicianRecord {
    pub id: String,
    pub status: String,
    pub active: bool,
    pub available: bool,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub service_categories: Vec<String>,
    pub vehicle_types: Vec<String>,
    pub service_radius_km: f64,
    pub rating: f32,
}

/// Validation errors raised at the directory boundary.
#[derive(Debug, thiserror::Error)]
pub enum ProfileViolation {
    #[error("technician record is missing an id")]
    MissingId,
    #[error("unrecognized technician status {0:?}")]
    UnknownStatus(String),
    #[error("service radius must be a positive number of kilometers at most {max}, found {found}")]
    InvalidRadius { found: f64, max: f64 },
    #[error(transparent)]
    Label(#[from] InvalidLabel),
}

const DEFAULT_MAX_RADIUS_KM: f64 = 500.0;

/// Guard converting free-form profile records into validated `Technician`
/// values. Empty category/vehicle sets pass through; the coverage audit
/// reports them in its missing-profile buckets rather than rejecting here.
#[derive(Debug, Clone)]
pub struct ProfileGuard {
    max_radius_km: f64,
}

impl ProfileGuard {
    pub fn new(max_radius_km: f64) -> Self {
        let sanitized = if max_radius_km.is_finite() && max_radius_km > 0.0 {
            max_radius_km
        } else {
            DEFAULT_MAX_RADIUS_KM
        };

        Self {
            max_radius_km: sanitized,
        }
    }

    pub fn max_radius_km(&self) -> f64 {
        self.max_radius_km
    }

    pub fn technician_from_record(
        &self,
        record: TechnicianRecord,
    ) -> Result<Technician, ProfileViolation> {
        let id = record.id.trim();
        if id.is_empty() {
            return Err(ProfileViolation::MissingId);
        }

        let status = TechnicianStatus::parse(&record.status)
            .ok_or_else(|| ProfileViolation::UnknownStatus(record.status.clone()))?;

        if !record.service_radius_km.is_finite()
            || record.service_radius_km <= 0.0
            || record.service_radius_km > self.max_radius_km
        {
            return Err(ProfileViolation::InvalidRadius {
                found: record.service_radius_km,
                max: self.max_radius_km,
            });
        }

        let position = match (record.lat, record.lng) {
            (Some(lat), Some(lng)) => Some(GeoPoint::new(lat, lng)),
            _ => None,
        };

        let service_categories = record
            .service_categories
            .iter()
            .map(|label| ServiceCategory::new(label))
            .collect::<Result<BTreeSet<_>, _>>()?;

        let vehicle_types = record
            .vehicle_types
            .iter()
            .map(|label| VehicleType::new(label))
            .collect::<Result<BTreeSet<_>, _>>()?;

        Ok(Technician {
            id: TechnicianId(id.to_string()),
            position,
            status,
            active: record.active,
            available: record.available,
            service_categories,
            vehicle_types,
            service_radius_km: record.service_radius_km,
            rating: record.rating,
        })
    }
}

impl Default for ProfileGuard {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RADIUS_KM)
    }
}
