use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::domain::{DispatchProbe, GeoPoint, ServiceCategory, Technician, TechnicianStatus, VehicleType};
use super::eligibility::{evaluate, EvaluationOptions, RejectionReason};
use super::repository::{Clock, RepositoryError, TechnicianDirectory};

/// Histogram entries reported per cell before truncation.
pub const DEFAULT_TOP_REASONS: usize = 3;

/// Fixed dimension catalog used when an audit does not narrow its dimensions.
#[derive(Debug, Clone)]
pub struct ServiceCatalog {
    pub service_categories: Vec<ServiceCategory>,
    pub vehicle_types: Vec<VehicleType>,
}

impl ServiceCatalog {
    pub fn standard() -> Self {
        let service_categories = [
            "towing",
            "jump_start",
            "tire_change",
            "fuel_delivery",
            "lockout",
            "winch_out",
        ]
        .iter()
        .map(|label| ServiceCategory::new(label).expect("catalog labels are non-empty"))
        .collect();

        let vehicle_types = ["sedan", "suv", "pickup", "van", "motorcycle", "box_truck"]
            .iter()
            .map(|label| VehicleType::new(label).expect("catalog labels are non-empty"))
            .collect();

        Self {
            service_categories,
            vehicle_types,
        }
    }
}

fn default_top_reasons() -> usize {
    DEFAULT_TOP_REASONS
}

/// Audit parameters. Omitted dimension lists fall back to the standard catalog;
/// omitting the reference position skips distance feasibility entirely.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AuditOptions {
    #[serde(default)]
    pub service_categories: Option<Vec<ServiceCategory>>,
    #[serde(default)]
    pub vehicle_types: Option<Vec<VehicleType>>,
    #[serde(default)]
    pub simulate_ready: bool,
    #[serde(default)]
    pub reference_position: Option<GeoPoint>,
    #[serde(default = "default_top_reasons")]
    pub top_reasons: usize,
}

impl Default for AuditOptions {
    fn default() -> Self {
        Self {
            service_categories: None,
            vehicle_types: None,
            simulate_ready: false,
            reference_position: None,
            top_reasons: DEFAULT_TOP_REASONS,
        }
    }
}

/// Deterministic classification of one coverage cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverageStatus {
    Pass,
    NoConfigured,
    ConfiguredButNotDispatchable,
}

impl CoverageStatus {
    pub const fn label(self) -> &'static str {
        match self {
            CoverageStatus::Pass => "pass",
            CoverageStatus::NoConfigured => "no_configured",
            CoverageStatus::ConfiguredButNotDispatchable => "configured_but_not_dispatchable",
        }
    }

    fn for_counts(configured: usize, eligible_now: usize) -> Self {
        if configured == 0 {
            CoverageStatus::NoConfigured
        } else if eligible_now > 0 {
            CoverageStatus::Pass
        } else {
            CoverageStatus::ConfiguredButNotDispatchable
        }
    }
}

/// One rejection-reason bucket in a cell histogram.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReasonCount {
    pub reason: RejectionReason,
    pub count: usize,
}

/// One (service category, vehicle type) combination in the audit matrix.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverageCell {
    pub service_category: ServiceCategory,
    pub vehicle_type: VehicleType,
    pub configured_technicians: usize,
    pub ready_technicians: usize,
    pub eligible_technicians_now: usize,
    pub status: CoverageStatus,
    pub top_rejections: Vec<ReasonCount>,
}

/// Whole-pool counts reported alongside the matrix. Incomplete profiles land
/// in the missing buckets instead of failing the audit.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PoolSummary {
    pub total: usize,
    pub approved: usize,
    pub active: usize,
    pub available: usize,
    pub ready: usize,
    pub with_valid_position: usize,
    pub missing_service_categories: usize,
    pub missing_vehicle_types: usize,
}

/// Matrix dimensions of the generated report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DimensionTotals {
    pub service_categories: usize,
    pub vehicle_types: usize,
    pub cells: usize,
}

/// Full fleet-health report. Computed on demand, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditReport {
    pub generated_at: DateTime<Utc>,
    pub simulate_ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_position: Option<GeoPoint>,
    pub cells: Vec<CoverageCell>,
    pub pool: PoolSummary,
    pub dimensions: DimensionTotals,
}

impl AuditReport {
    /// Cells that are structurally absent or practically non-dispatchable.
    pub fn gaps(&self) -> impl Iterator<Item = &CoverageCell> {
        self.cells
            .iter()
            .filter(|cell| cell.status != CoverageStatus::Pass)
    }
}

struct CachedAudit {
    options: AuditOptions,
    at: DateTime<Utc>,
    report: AuditReport,
}

/// Read-only fleet-health scanner over the technician directory.
///
/// A full run touches every technician for every cell in the dimension cross
/// product, so the last report is cached for a short TTL and must be
/// invalidated when technician profiles mutate.
pub struct CoverageAuditEngine<D> {
    directory: Arc<D>,
    clock: Arc<dyn Clock>,
    cache_ttl: Duration,
    cache: Mutex<Option<CachedAudit>>,
}

impl<D> CoverageAuditEngine<D>
where
    D: TechnicianDirectory + 'static,
{
    pub fn new(directory: Arc<D>, clock: Arc<dyn Clock>, cache_ttl: Duration) -> Self {
        Self {
            directory,
            clock,
            cache_ttl,
            cache: Mutex::new(None),
        }
    }

    /// Drop the cached report. Call on any technician-profile mutation.
    pub fn invalidate(&self) {
        let mut cache = self.cache.lock().expect("audit cache poisoned");
        *cache = None;
    }

    pub fn run_audit(&self, options: &AuditOptions) -> Result<AuditReport, RepositoryError> {
        let now = self.clock.now();

        {
            let cache = self.cache.lock().expect("audit cache poisoned");
            if let Some(cached) = cache.as_ref() {
                if cached.options == *options && now - cached.at < self.cache_ttl {
                    debug!("serving coverage audit from cache");
                    return Ok(cached.report.clone());
                }
            }
        }

        let technicians = self.directory.technicians()?;
        let report = build_report(&technicians, options, now);

        let mut cache = self.cache.lock().expect("audit cache poisoned");
        *cache = Some(CachedAudit {
            options: options.clone(),
            at: now,
            report: report.clone(),
        });
        Ok(report)
    }
}

fn build_report(
    pool: &[Technician],
    options: &AuditOptions,
    generated_at: DateTime<Utc>,
) -> AuditReport {
    let catalog = ServiceCatalog::standard();
    let service_categories = options
        .service_categories
        .clone()
        .unwrap_or(catalog.service_categories);
    let vehicle_types = options
        .vehicle_types
        .clone()
        .unwrap_or(catalog.vehicle_types);

    let eval_options = EvaluationOptions {
        simulate_ready: options.simulate_ready,
    };

    let mut cells = Vec::with_capacity(service_categories.len() * vehicle_types.len());
    for service_category in &service_categories {
        for vehicle_type in &vehicle_types {
            cells.push(build_cell(
                service_category,
                vehicle_type,
                pool,
                options,
                &eval_options,
            ));
        }
    }

    let dimensions = DimensionTotals {
        service_categories: service_categories.len(),
        vehicle_types: vehicle_types.len(),
        cells: cells.len(),
    };

    AuditReport {
        generated_at,
        simulate_ready: options.simulate_ready,
        reference_position: options.reference_position,
        cells,
        pool: pool_summary(pool),
        dimensions,
    }
}

fn build_cell(
    service_category: &ServiceCategory,
    vehicle_type: &VehicleType,
    pool: &[Technician],
    options: &AuditOptions,
    eval_options: &EvaluationOptions,
) -> CoverageCell {
    let mut probe = DispatchProbe::for_cell(service_category.clone(), vehicle_type.clone());
    if let Some(reference) = options.reference_position {
        probe = probe.with_reference(reference);
    }

    let mut configured = 0;
    let mut ready = 0;
    let mut eligible_now = 0;
    let mut histogram: BTreeMap<RejectionReason, usize> = BTreeMap::new();

    for technician in pool {
        let is_configured = technician.service_categories.contains(service_category)
            && technician.vehicle_types.contains(vehicle_type);
        if is_configured {
            configured += 1;
            if is_ready(technician, options.simulate_ready) {
                ready += 1;
            }
        }

        let result = evaluate(&probe, technician, eval_options);
        if result.eligible {
            eligible_now += 1;
        } else if is_configured {
            // Only configured technicians carry diagnostic signal here; the
            // rest of the fleet fails on the category/vehicle checks by
            // definition and would drown the histogram.
            for reason in result.rejection_reasons {
                *histogram.entry(reason).or_default() += 1;
            }
        }
    }

    let mut top_rejections: Vec<ReasonCount> = histogram
        .into_iter()
        .map(|(reason, count)| ReasonCount { reason, count })
        .collect();
    top_rejections.sort_by(|a, b| b.count.cmp(&a.count).then(a.reason.cmp(&b.reason)));
    top_rejections.truncate(options.top_reasons);

    CoverageCell {
        service_category: service_category.clone(),
        vehicle_type: vehicle_type.clone(),
        configured_technicians: configured,
        ready_technicians: ready,
        eligible_technicians_now: eligible_now,
        status: CoverageStatus::for_counts(configured, eligible_now),
        top_rejections,
    }
}

/// Ready means approved and active; availability is waived in simulate mode.
fn is_ready(technician: &Technician, simulate_ready: bool) -> bool {
    technician.status == TechnicianStatus::Approved
        && technician.active
        && (simulate_ready || technician.available)
}

fn pool_summary(pool: &[Technician]) -> PoolSummary {
    let mut summary = PoolSummary {
        total: pool.len(),
        ..PoolSummary::default()
    };

    for technician in pool {
        let approved = technician.status == TechnicianStatus::Approved;
        if approved {
            summary.approved += 1;
        }
        if technician.active {
            summary.active += 1;
        }
        if technician.available {
            summary.available += 1;
        }
        if approved && technician.active && technician.available {
            summary.ready += 1;
        }
        if technician
            .position
            .map(|point| point.is_valid())
            .unwrap_or(false)
        {
            summary.with_valid_position += 1;
        }
        if technician.service_categories.is_empty() {
            summary.missing_service_categories += 1;
        }
        if technician.vehicle_types.is_empty() {
            summary.missing_vehicle_types += 1;
        }
    }

    summary
}
