//! Technician dispatch matching engine.
//!
//! The eligibility evaluator and best-match selector are pure functions over
//! directory snapshots; the offer engine orchestrates the live
//! assign/respond/retry cycle through injected collaborator seams; the
//! coverage auditor reuses the same evaluator for fleet-health reporting off
//! the live path.

pub mod coverage;
pub mod directory;
pub mod domain;
pub mod eligibility;
pub mod geo;
pub mod offers;
pub mod repository;
pub mod roster;
pub mod router;
pub mod selector;

#[cfg(test)]
mod tests;

pub use coverage::{
    AuditOptions, AuditReport, CoverageAuditEngine, CoverageCell, CoverageStatus, DimensionTotals,
    PoolSummary, ReasonCount, ServiceCatalog,
};
pub use directory::{ProfileGuard, ProfileViolation, TechnicianRecord};
pub use domain::{
    DispatchProbe, GeoPoint, InvalidLabel, RequestId, RequestStatus, ServiceCategory,
    ServiceRequest, Technician, TechnicianId, TechnicianStatus, VehicleType,
};
pub use eligibility::{evaluate, EligibilityResult, EvaluationOptions, RejectionReason};
pub use offers::{DispatchEngine, DispatchError, DispatchOffer, OfferState, OfferView};
pub use repository::{
    Clock, DispatchNotice, NoticeKind, NotifyError, OfferNotifier, OfferRepository,
    RepositoryError, RequestStore, SystemClock, TechnicianDirectory,
};
pub use roster::{RosterImporter, RosterImportError};
pub use router::{dispatch_router, DispatchState};
pub use selector::{find_best_match, RankedMatch};
