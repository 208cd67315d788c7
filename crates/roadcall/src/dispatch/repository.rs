use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{RequestId, RequestStatus, ServiceRequest, Technician, TechnicianId};
use super::offers::DispatchOffer;

/// Read access to technician profiles owned by the profile subsystem.
pub trait TechnicianDirectory: Send + Sync {
    fn technicians(&self) -> Result<Vec<Technician>, RepositoryError>;
}

/// Read access to request attributes plus the status transitions the engine triggers.
pub trait RequestStore: Send + Sync {
    fn fetch(&self, id: &RequestId) -> Result<Option<ServiceRequest>, RepositoryError>;
    fn set_status(&self, id: &RequestId, status: RequestStatus) -> Result<(), RepositoryError>;
}

/// Offer persistence keyed by (request, technician). History is retained for
/// audit and for deriving exclusion sets.
pub trait OfferRepository: Send + Sync {
    fn insert(&self, offer: DispatchOffer) -> Result<DispatchOffer, RepositoryError>;
    fn update(&self, offer: DispatchOffer) -> Result<(), RepositoryError>;
    fn live_offer(&self, request_id: &RequestId) -> Result<Option<DispatchOffer>, RepositoryError>;
    fn history(&self, request_id: &RequestId) -> Result<Vec<DispatchOffer>, RepositoryError>;
}

/// Error enumeration for storage failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Event classes pushed to the notification channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    Offered,
    Accepted,
    Unmatched,
}

impl NoticeKind {
    pub const fn label(self) -> &'static str {
        match self {
            NoticeKind::Offered => "offered",
            NoticeKind::Accepted => "accepted",
            NoticeKind::Unmatched => "unmatched",
        }
    }
}

/// One-way dispatch event payload. Delivery is best effort; the engine never
/// rolls a transition back because a notice was dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchNotice {
    pub kind: NoticeKind,
    pub request_id: RequestId,
    pub technician_id: Option<TechnicianId>,
    pub details: BTreeMap<String, String>,
}

/// Trait describing the outbound push/real-time channel.
pub trait OfferNotifier: Send + Sync {
    fn publish(&self, notice: DispatchNotice) -> Result<(), NotifyError>;
}

/// Notification dispatch error.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

/// Clock seam so offer expiry can be driven deterministically in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock implementation used by the service wiring.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
