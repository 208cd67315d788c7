use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::DispatchConfig;

use super::domain::{DispatchProbe, RequestId, RequestStatus, ServiceRequest, TechnicianId};
use super::repository::{
    Clock, DispatchNotice, NoticeKind, OfferNotifier, OfferRepository, RepositoryError,
    RequestStore, TechnicianDirectory,
};
use super::selector::find_best_match;

/// Lifecycle states for a single offer instance. The response states are
/// terminal for the instance; the owning request may produce a fresh offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferState {
    Created,
    Offered,
    Accepted,
    Declined,
    Expired,
}

impl OfferState {
    pub const fn label(self) -> &'static str {
        match self {
            OfferState::Created => "created",
            OfferState::Offered => "offered",
            OfferState::Accepted => "accepted",
            OfferState::Declined => "declined",
            OfferState::Expired => "expired",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            OfferState::Accepted | OfferState::Declined | OfferState::Expired
        )
    }
}

/// Time-boxed proposal of one request to one technician.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchOffer {
    pub request_id: RequestId,
    pub technician_id: TechnicianId,
    pub state: OfferState,
    pub attempt: u32,
    pub distance_km: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl DispatchOffer {
    pub fn create(
        request_id: RequestId,
        technician_id: TechnicianId,
        attempt: u32,
        distance_km: Option<f64>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            request_id,
            technician_id,
            state: OfferState::Created,
            attempt,
            distance_km,
            created_at,
            expires_at: created_at,
        }
    }

    /// Move a freshly created offer into the live `offered` state.
    pub fn open(&mut self, expires_at: DateTime<Utc>) -> Result<(), DispatchError> {
        self.transition(OfferState::Created, OfferState::Offered)?;
        self.expires_at = expires_at;
        Ok(())
    }

    pub fn accept(&mut self) -> Result<(), DispatchError> {
        self.transition(OfferState::Offered, OfferState::Accepted)
    }

    pub fn decline(&mut self) -> Result<(), DispatchError> {
        self.transition(OfferState::Offered, OfferState::Declined)
    }

    pub fn expire(&mut self) -> Result<(), DispatchError> {
        self.transition(OfferState::Offered, OfferState::Expired)
    }

    /// Live means offered and still inside the response window.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.state == OfferState::Offered && now < self.expires_at
    }

    /// Offered but past the deadline, awaiting the expiry transition.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.state == OfferState::Offered && now >= self.expires_at
    }

    fn transition(&mut self, from: OfferState, to: OfferState) -> Result<(), DispatchError> {
        if self.state != from {
            return Err(DispatchError::InvalidTransition {
                request_id: self.request_id.clone(),
                detail: format!(
                    "cannot move a {} offer to {}",
                    self.state.label(),
                    to.label()
                ),
            });
        }
        self.state = to;
        Ok(())
    }

    pub fn view(&self) -> OfferView {
        OfferView {
            request_id: self.request_id.clone(),
            technician_id: self.technician_id.clone(),
            state: self.state.label(),
            attempt: self.attempt,
            distance_km: self.distance_km,
            expires_at: self.expires_at,
        }
    }
}

/// Sanitized offer representation exposed over the API and CLI.
#[derive(Debug, Clone, Serialize)]
pub struct OfferView {
    pub request_id: RequestId,
    pub technician_id: TechnicianId,
    pub state: &'static str,
    pub attempt: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
    pub expires_at: DateTime<Utc>,
}

/// Failure kinds signaled by the offer state machine.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("request {request_id}: {detail}")]
    InvalidTransition { request_id: RequestId, detail: String },
    #[error("request {request_id} already has a live offer for technician {technician_id}")]
    ConcurrentOfferConflict {
        request_id: RequestId,
        technician_id: TechnicianId,
    },
    #[error("request {request_id} exhausted its candidate pool after {attempts} attempt(s)")]
    ExhaustedCandidates { request_id: RequestId, attempts: u32 },
    #[error("request {0} not found")]
    UnknownRequest(RequestId),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Orchestrates the assign -> respond -> retry cycle for service requests.
///
/// Transitions for a given request are serialized through a per-request lock so
/// interleaved accept/decline/expire calls can never produce two simultaneous
/// live offers. Deadlines are checked lazily on every entry point in addition
/// to the timer-driven `on_expire` path.
pub struct DispatchEngine<D, R, O, N> {
    directory: Arc<D>,
    requests: Arc<R>,
    offers: Arc<O>,
    notifier: Arc<N>,
    clock: Arc<dyn Clock>,
    config: DispatchConfig,
    request_locks: Mutex<HashMap<RequestId, Arc<Mutex<()>>>>,
}

impl<D, R, O, N> DispatchEngine<D, R, O, N>
where
    D: TechnicianDirectory + 'static,
    R: RequestStore + 'static,
    O: OfferRepository + 'static,
    N: OfferNotifier + 'static,
{
    pub fn new(
        directory: Arc<D>,
        requests: Arc<R>,
        offers: Arc<O>,
        notifier: Arc<N>,
        clock: Arc<dyn Clock>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            directory,
            requests,
            offers,
            notifier,
            clock,
            config,
            request_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Open the first (or next) offer for a request.
    pub fn create_offer(&self, request_id: &RequestId) -> Result<DispatchOffer, DispatchError> {
        let lock = self.request_lock(request_id);
        let _guard = lock.lock().expect("request lock poisoned");

        let request = self.fetch_request(request_id)?;

        if let Some(mut live) = self.offers.live_offer(request_id)? {
            if live.is_due(self.clock.now()) {
                self.expire_offer(&mut live)?;
            } else {
                return Err(DispatchError::ConcurrentOfferConflict {
                    request_id: request_id.clone(),
                    technician_id: live.technician_id,
                });
            }
        }

        self.ensure_open(&request)?;
        self.advance(&request)
    }

    /// Explicit technician acceptance. The request transitions to assigned and
    /// no further offers are created for it.
    pub fn respond_accept(
        &self,
        request_id: &RequestId,
        technician_id: &TechnicianId,
    ) -> Result<DispatchOffer, DispatchError> {
        let lock = self.request_lock(request_id);
        let _guard = lock.lock().expect("request lock poisoned");

        let request = self.fetch_request(request_id)?;
        let mut offer = self.live_offer_for_response(&request, technician_id)?;

        offer.accept()?;
        self.offers.update(offer.clone())?;
        self.requests.set_status(request_id, RequestStatus::Assigned)?;
        info!(
            request_id = %offer.request_id,
            technician_id = %offer.technician_id,
            attempt = offer.attempt,
            "dispatch offer accepted"
        );
        self.publish(DispatchNotice {
            kind: NoticeKind::Accepted,
            request_id: request_id.clone(),
            technician_id: Some(offer.technician_id.clone()),
            details: BTreeMap::new(),
        });
        Ok(offer)
    }

    /// Explicit technician decline: the candidate joins the exclusion set and
    /// the selector is re-run for the next-best technician.
    pub fn respond_decline(
        &self,
        request_id: &RequestId,
        technician_id: &TechnicianId,
    ) -> Result<DispatchOffer, DispatchError> {
        let lock = self.request_lock(request_id);
        let _guard = lock.lock().expect("request lock poisoned");

        let request = self.fetch_request(request_id)?;
        let mut offer = self.live_offer_for_response(&request, technician_id)?;

        offer.decline()?;
        self.offers.update(offer.clone())?;
        info!(
            request_id = %offer.request_id,
            technician_id = %offer.technician_id,
            attempt = offer.attempt,
            "dispatch offer declined"
        );
        self.advance(&request)
    }

    /// Deadline-driven expiry: same exclusion-and-retry behavior as a decline.
    pub fn on_expire(&self, request_id: &RequestId) -> Result<DispatchOffer, DispatchError> {
        let lock = self.request_lock(request_id);
        let _guard = lock.lock().expect("request lock poisoned");

        let request = self.fetch_request(request_id)?;
        self.ensure_open(&request)?;

        let mut offer = match self.offers.live_offer(request_id)? {
            Some(offer) => offer,
            None => {
                return Err(DispatchError::InvalidTransition {
                    request_id: request_id.clone(),
                    detail: "no live offer to expire".to_string(),
                })
            }
        };

        if !offer.is_due(self.clock.now()) {
            return Err(DispatchError::InvalidTransition {
                request_id: request_id.clone(),
                detail: "live offer has not reached its deadline".to_string(),
            });
        }

        self.expire_offer(&mut offer)?;
        self.advance(&request)
    }

    fn fetch_request(&self, request_id: &RequestId) -> Result<ServiceRequest, DispatchError> {
        self.requests
            .fetch(request_id)?
            .ok_or_else(|| DispatchError::UnknownRequest(request_id.clone()))
    }

    fn ensure_open(&self, request: &ServiceRequest) -> Result<(), DispatchError> {
        if request.status != RequestStatus::Open {
            return Err(DispatchError::InvalidTransition {
                request_id: request.id.clone(),
                detail: format!("request is {}", request.status.label()),
            });
        }
        Ok(())
    }

    /// Shared preamble for accept/decline: resolve the live offer, lazily
    /// expiring it (and advancing to the next candidate) if the deadline has
    /// already passed, so a stale response is never honored.
    fn live_offer_for_response(
        &self,
        request: &ServiceRequest,
        technician_id: &TechnicianId,
    ) -> Result<DispatchOffer, DispatchError> {
        self.ensure_open(request)?;

        let mut offer = match self.offers.live_offer(&request.id)? {
            Some(offer) => offer,
            None => {
                return Err(DispatchError::InvalidTransition {
                    request_id: request.id.clone(),
                    detail: "no live offer awaiting a response".to_string(),
                })
            }
        };

        if offer.is_due(self.clock.now()) {
            self.expire_offer(&mut offer)?;
            match self.advance(request) {
                Ok(_) | Err(DispatchError::ExhaustedCandidates { .. }) => {}
                Err(other) => return Err(other),
            }
            return Err(DispatchError::InvalidTransition {
                request_id: request.id.clone(),
                detail: "offer deadline elapsed before the response arrived".to_string(),
            });
        }

        if offer.technician_id != *technician_id {
            return Err(DispatchError::InvalidTransition {
                request_id: request.id.clone(),
                detail: format!("live offer belongs to technician {}", offer.technician_id),
            });
        }

        Ok(offer)
    }

    /// Run the selector against the not-yet-excluded pool and open the next
    /// offer, or settle the request as unmatched when the pool is exhausted or
    /// the attempt bound is reached.
    fn advance(&self, request: &ServiceRequest) -> Result<DispatchOffer, DispatchError> {
        let history = self.offers.history(&request.id)?;
        let attempt = history.len() as u32 + 1;
        if attempt > self.config.max_offer_attempts {
            return self.exhaust(&request.id, attempt - 1);
        }

        let excluded = exclusion_set(&history);
        let pool = self.directory.technicians()?;
        let probe = DispatchProbe::from_request(request);

        let candidate = match find_best_match(&probe, &pool, &excluded) {
            Some(candidate) => candidate,
            None => return self.exhaust(&request.id, attempt - 1),
        };

        let now = self.clock.now();
        let mut offer = DispatchOffer::create(
            request.id.clone(),
            candidate.technician.id.clone(),
            attempt,
            candidate.distance_km,
            now,
        );
        offer.open(now + self.config.offer_timeout())?;
        let offer = self.offers.insert(offer)?;

        info!(
            request_id = %offer.request_id,
            technician_id = %offer.technician_id,
            attempt = offer.attempt,
            expires_at = %offer.expires_at,
            "dispatch offer opened"
        );

        let mut details = BTreeMap::new();
        details.insert("attempt".to_string(), offer.attempt.to_string());
        details.insert("expires_at".to_string(), offer.expires_at.to_rfc3339());
        self.publish(DispatchNotice {
            kind: NoticeKind::Offered,
            request_id: request.id.clone(),
            technician_id: Some(offer.technician_id.clone()),
            details,
        });

        Ok(offer)
    }

    /// The designed fallback when no candidate remains: the request becomes
    /// unmatched and waits for manual escalation.
    fn exhaust(&self, request_id: &RequestId, attempts: u32) -> Result<DispatchOffer, DispatchError> {
        self.requests
            .set_status(request_id, RequestStatus::Unmatched)?;
        warn!(%request_id, attempts, "candidate pool exhausted; request unmatched");

        let mut details = BTreeMap::new();
        details.insert("attempts".to_string(), attempts.to_string());
        self.publish(DispatchNotice {
            kind: NoticeKind::Unmatched,
            request_id: request_id.clone(),
            technician_id: None,
            details,
        });

        Err(DispatchError::ExhaustedCandidates {
            request_id: request_id.clone(),
            attempts,
        })
    }

    fn expire_offer(&self, offer: &mut DispatchOffer) -> Result<(), DispatchError> {
        offer.expire()?;
        self.offers.update(offer.clone())?;
        info!(
            request_id = %offer.request_id,
            technician_id = %offer.technician_id,
            attempt = offer.attempt,
            "dispatch offer expired"
        );
        Ok(())
    }

    /// Fire-and-forget publish: a dropped notice is logged, never propagated.
    fn publish(&self, notice: DispatchNotice) {
        if let Err(err) = self.notifier.publish(notice) {
            warn!(%err, "dispatch notice dropped");
        }
    }

    fn request_lock(&self, request_id: &RequestId) -> Arc<Mutex<()>> {
        let mut registry = self.request_locks.lock().expect("lock registry poisoned");
        registry.entry(request_id.clone()).or_default().clone()
    }
}

/// Technicians already offered-and-rejected for the request. The set is
/// derived from offer history, so it can only grow.
fn exclusion_set(history: &[DispatchOffer]) -> BTreeSet<TechnicianId> {
    history
        .iter()
        .filter(|offer| matches!(offer.state, OfferState::Declined | OfferState::Expired))
        .map(|offer| offer.technician_id.clone())
        .collect()
}
