use crate::infra::{
    default_dispatch_config, demo_fleet, next_request_id, InMemoryOfferNotifier,
    InMemoryOfferRepository, InMemoryRequestStore, InMemoryTechnicianDirectory,
};
use clap::Args;
use roadcall::dispatch::{
    AuditOptions, AuditReport, CoverageAuditEngine, CoverageStatus, DispatchEngine, GeoPoint,
    ProfileViolation, RequestStatus, RosterImportError, RosterImporter, ServiceCategory,
    ServiceRequest, SystemClock, Technician, VehicleType,
};
use roadcall::error::AppError;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Roster CSV export to dispatch against; defaults to the built-in demo fleet
    #[arg(long)]
    pub(crate) roster: Option<PathBuf>,
    /// Service category for the demo request
    #[arg(long, default_value = "towing")]
    pub(crate) category: String,
    /// Vehicle type for the demo request
    #[arg(long, default_value = "sedan")]
    pub(crate) vehicle: String,
    /// Pickup latitude for the demo request
    #[arg(long, default_value_t = 41.59)]
    pub(crate) lat: f64,
    /// Pickup longitude for the demo request
    #[arg(long, default_value_t = -93.62)]
    pub(crate) lng: f64,
    /// Run the coverage audit in simulate-ready mode
    #[arg(long)]
    pub(crate) simulate_ready: bool,
    /// Skip the coverage audit portion of the demo
    #[arg(long)]
    pub(crate) skip_audit: bool,
}

#[derive(Args, Debug)]
pub(crate) struct CoverageReportArgs {
    /// Roster CSV export to audit; defaults to the built-in demo fleet
    #[arg(long)]
    pub(crate) roster: Option<PathBuf>,
    /// Limit the audit to these service categories (repeatable)
    #[arg(long = "category")]
    pub(crate) categories: Vec<String>,
    /// Limit the audit to these vehicle types (repeatable)
    #[arg(long = "vehicle")]
    pub(crate) vehicles: Vec<String>,
    /// Ignore live activity/availability flags to measure structural coverage
    #[arg(long)]
    pub(crate) simulate_ready: bool,
    /// Reference latitude for distance feasibility
    #[arg(long)]
    pub(crate) lat: Option<f64>,
    /// Reference longitude for distance feasibility
    #[arg(long)]
    pub(crate) lng: Option<f64>,
    /// Histogram depth reported per cell
    #[arg(long, default_value_t = 3)]
    pub(crate) top_reasons: usize,
    /// Write the cell matrix to a CSV file
    #[arg(long)]
    pub(crate) csv: Option<PathBuf>,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        roster,
        category,
        vehicle,
        lat,
        lng,
        simulate_ready,
        skip_audit,
    } = args;

    let technicians = load_fleet(roster)?;
    println!("RoadCall dispatch demo");
    println!("Fleet: {} technician(s) loaded", technicians.len());

    let directory = Arc::new(InMemoryTechnicianDirectory::default());
    for technician in &technicians {
        directory.upsert(technician.clone());
    }
    let requests = Arc::new(InMemoryRequestStore::default());
    let offers = Arc::new(InMemoryOfferRepository::default());
    let notifier = Arc::new(InMemoryOfferNotifier::default());
    let engine = DispatchEngine::new(
        directory.clone(),
        requests.clone(),
        offers,
        notifier.clone(),
        Arc::new(SystemClock),
        default_dispatch_config(),
    );

    let request = ServiceRequest {
        id: next_request_id(),
        service_category: parse_category(&category)?,
        vehicle_type: parse_vehicle(&vehicle)?,
        pickup: GeoPoint::new(lat, lng),
        radius_override_km: None,
        status: RequestStatus::Open,
    };
    requests.insert(request.clone());

    println!(
        "\nDispatch cycle for request {} ({} / {} at {:.4}, {:.4})",
        request.id, request.service_category, request.vehicle_type, lat, lng
    );

    let offer = match engine.create_offer(&request.id) {
        Ok(offer) => offer,
        Err(err) => {
            println!("- No dispatch possible: {err}");
            return Ok(());
        }
    };
    println!(
        "- Offered to {} (attempt {}, {})",
        offer.technician_id,
        offer.attempt,
        describe_distance(offer.distance_km)
    );

    // Scripted decline so the retry against the runner-up is visible.
    match engine.respond_decline(&request.id, &offer.technician_id) {
        Ok(next) => {
            println!(
                "- {} declined; reoffered to {} (attempt {}, {})",
                offer.technician_id,
                next.technician_id,
                next.attempt,
                describe_distance(next.distance_km)
            );
            match engine.respond_accept(&request.id, &next.technician_id) {
                Ok(accepted) => println!(
                    "- {} accepted; request {} assigned",
                    accepted.technician_id, request.id
                ),
                Err(err) => println!("- Acceptance failed: {err}"),
            }
        }
        Err(err) => println!("- {} declined; {err}", offer.technician_id),
    }

    println!("\nPublished notices");
    for notice in notifier.events() {
        let target = notice
            .technician_id
            .map(|id| id.0)
            .unwrap_or_else(|| "operations".to_string());
        println!("- {} -> {}", notice.kind.label(), target);
    }

    if skip_audit {
        return Ok(());
    }

    let audit = CoverageAuditEngine::new(
        directory,
        Arc::new(SystemClock),
        default_dispatch_config().audit_cache_ttl(),
    );
    let options = AuditOptions {
        simulate_ready,
        ..AuditOptions::default()
    };
    let report = audit.run_audit(&options)?;
    println!();
    render_audit_report(&report);

    Ok(())
}

pub(crate) fn run_coverage_report(args: CoverageReportArgs) -> Result<(), AppError> {
    let CoverageReportArgs {
        roster,
        categories,
        vehicles,
        simulate_ready,
        lat,
        lng,
        top_reasons,
        csv,
    } = args;

    let technicians = load_fleet(roster)?;
    let directory = Arc::new(InMemoryTechnicianDirectory::default());
    for technician in technicians {
        directory.upsert(technician);
    }

    let audit = CoverageAuditEngine::new(
        directory,
        Arc::new(SystemClock),
        default_dispatch_config().audit_cache_ttl(),
    );

    let service_categories = if categories.is_empty() {
        None
    } else {
        Some(
            categories
                .iter()
                .map(|label| parse_category(label))
                .collect::<Result<Vec<_>, _>>()?,
        )
    };
    let vehicle_types = if vehicles.is_empty() {
        None
    } else {
        Some(
            vehicles
                .iter()
                .map(|label| parse_vehicle(label))
                .collect::<Result<Vec<_>, _>>()?,
        )
    };
    let reference_position = match (lat, lng) {
        (Some(lat), Some(lng)) => Some(GeoPoint::new(lat, lng)),
        _ => None,
    };

    let options = AuditOptions {
        service_categories,
        vehicle_types,
        simulate_ready,
        reference_position,
        top_reasons,
    };
    let report = audit.run_audit(&options)?;
    render_audit_report(&report);

    if let Some(path) = csv {
        write_cells_csv(&report, &path)?;
        println!("\nCell matrix written to {}", path.display());
    }

    Ok(())
}

fn load_fleet(roster: Option<PathBuf>) -> Result<Vec<Technician>, AppError> {
    let technicians = match roster {
        Some(path) => RosterImporter::from_path(path)?,
        None => demo_fleet()?,
    };
    Ok(technicians)
}

fn parse_category(label: &str) -> Result<ServiceCategory, AppError> {
    ServiceCategory::new(label)
        .map_err(ProfileViolation::from)
        .map_err(RosterImportError::from)
        .map_err(AppError::from)
}

fn parse_vehicle(label: &str) -> Result<VehicleType, AppError> {
    VehicleType::new(label)
        .map_err(ProfileViolation::from)
        .map_err(RosterImportError::from)
        .map_err(AppError::from)
}

fn describe_distance(distance_km: Option<f64>) -> String {
    match distance_km {
        Some(distance) => format!("{distance:.1} km out"),
        None => "distance unknown".to_string(),
    }
}

pub(crate) fn render_audit_report(report: &AuditReport) {
    println!(
        "Coverage audit: {} categories x {} vehicle types = {} cells (evaluated {})",
        report.dimensions.service_categories,
        report.dimensions.vehicle_types,
        report.dimensions.cells,
        report.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    if report.simulate_ready {
        println!("Mode: simulate-ready (structural coverage, live flags ignored)");
    }
    if let Some(reference) = report.reference_position {
        println!(
            "Distance feasibility from ({:.4}, {:.4})",
            reference.lat, reference.lng
        );
    }

    println!("\nPool summary");
    println!(
        "- {} technician(s): {} approved, {} active, {} available, {} ready",
        report.pool.total,
        report.pool.approved,
        report.pool.active,
        report.pool.available,
        report.pool.ready
    );
    println!(
        "- {} with valid coordinates | {} missing service categories | {} missing vehicle types",
        report.pool.with_valid_position,
        report.pool.missing_service_categories,
        report.pool.missing_vehicle_types
    );

    let gaps: Vec<_> = report.gaps().collect();
    if gaps.is_empty() {
        println!("\nCoverage gaps: none");
    } else {
        println!("\nCoverage gaps");
        for cell in &gaps {
            println!(
                "- {} / {}: {} (configured {}, ready {}, eligible now {})",
                cell.service_category,
                cell.vehicle_type,
                cell.status.label(),
                cell.configured_technicians,
                cell.ready_technicians,
                cell.eligible_technicians_now
            );
            for reason in &cell.top_rejections {
                println!("    blocked by {} x{}", reason.reason.label(), reason.count);
            }
        }
    }

    let passing = report
        .cells
        .iter()
        .filter(|cell| cell.status == CoverageStatus::Pass)
        .count();
    println!("\n{passing} of {} cells pass", report.cells.len());
}

fn write_cells_csv(report: &AuditReport, path: &PathBuf) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record([
        "service_category",
        "vehicle_type",
        "configured",
        "ready",
        "eligible_now",
        "status",
        "top_rejections",
    ])?;

    for cell in &report.cells {
        let rejections = cell
            .top_rejections
            .iter()
            .map(|entry| format!("{}:{}", entry.reason.label(), entry.count))
            .collect::<Vec<_>>()
            .join("|");
        writer.write_record([
            cell.service_category.as_str(),
            cell.vehicle_type.as_str(),
            &cell.configured_technicians.to_string(),
            &cell.ready_technicians.to_string(),
            &cell.eligible_technicians_now.to_string(),
            cell.status.label(),
            &rejections,
        ])?;
    }

    writer.flush()?;
    Ok(())
}
