use std::io::Read;
use std::path::Path;

use serde::Deserialize;

use super::directory::{ProfileGuard, ProfileViolation, TechnicianRecord};
use super::domain::Technician;

#[derive(Debug)]
pub enum RosterImportError {
    Io(std::io::Error),
    Csv(csv::Error),
    Profile(ProfileViolation),
}

impl std::fmt::Display for RosterImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RosterImportError::Io(err) => write!(f, "failed to read roster export: {}", err),
            RosterImportError::Csv(err) => write!(f, "invalid roster CSV data: {}", err),
            RosterImportError::Profile(err) => {
                write!(f, "roster row failed profile validation: {}", err)
            }
        }
    }
}

impl std::error::Error for RosterImportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RosterImportError::Io(err) => Some(err),
            RosterImportError::Csv(err) => Some(err),
            RosterImportError::Profile(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for RosterImportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for RosterImportError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

impl From<ProfileViolation> for RosterImportError {
    fn from(err: ProfileViolation) -> Self {
        Self::Profile(err)
    }
}

/// Ingest a technician roster CSV export into validated directory profiles.
///
/// Category and vehicle columns are pipe-separated lists; coordinates may be
/// left blank for technicians without a published position.
pub struct RosterImporter;

impl RosterImporter {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Vec<Technician>, RosterImportError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Vec<Technician>, RosterImportError> {
        let guard = ProfileGuard::default();
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut technicians = Vec::new();
        for row in csv_reader.deserialize::<RosterRow>() {
            let row = row?;
            technicians.push(guard.technician_from_record(row.into_record())?);
        }

        Ok(technicians)
    }
}

#[derive(Debug, Deserialize)]
struct RosterRow {
    #[serde(rename = "Technician ID")]
    id: String,
    #[serde(rename = "Status")]
    status: String,
    #[serde(rename = "Active")]
    active: String,
    #[serde(rename = "Available")]
    available: String,
    #[serde(rename = "Latitude")]
    lat: Option<f64>,
    #[serde(rename = "Longitude")]
    lng: Option<f64>,
    #[serde(rename = "Service Categories")]
    service_categories: String,
    #[serde(rename = "Vehicle Types")]
    vehicle_types: String,
    #[serde(rename = "Service Radius Km")]
    service_radius_km: f64,
    #[serde(rename = "Rating", default)]
    rating: Option<f32>,
}

impl RosterRow {
    fn into_record(self) -> TechnicianRecord {
        TechnicianRecord {
            id: self.id,
            status: self.status,
            active: parse_flag(&self.active),
            available: parse_flag(&self.available),
            lat: self.lat,
            lng: self.lng,
            service_categories: split_labels(&self.service_categories),
            vehicle_types: split_labels(&self.vehicle_types),
            service_radius_km: self.service_radius_km,
            rating: self.rating.unwrap_or(0.0),
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "yes" | "y" | "1"
    )
}

fn split_labels(value: &str) -> Vec<String> {
    value
        .split('|')
        .map(str::trim)
        .filter(|label| !label.is_empty())
        .map(str::to_string)
        .collect()
}
