use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;

use crate::config::DispatchConfig;
use crate::dispatch::coverage::CoverageAuditEngine;
use crate::dispatch::domain::{
    DispatchProbe, GeoPoint, RequestId, RequestStatus, ServiceCategory, ServiceRequest,
    Technician, TechnicianId, TechnicianStatus, VehicleType,
};
use crate::dispatch::offers::{DispatchEngine, DispatchOffer, OfferState};
use crate::dispatch::repository::{
    Clock, DispatchNotice, NotifyError, OfferNotifier, OfferRepository, RepositoryError,
    RequestStore, TechnicianDirectory,
};
use crate::dispatch::router::{dispatch_router, DispatchState};

pub(super) fn category(label: &str) -> ServiceCategory {
    ServiceCategory::new(label).expect("valid category label")
}

pub(super) fn vehicle(label: &str) -> VehicleType {
    VehicleType::new(label).expect("valid vehicle label")
}

/// Approved, active, available towing/flatbed technician with a 50 km radius.
pub(super) fn technician(id: &str, lat: f64, lng: f64) -> Technician {
    Technician {
        id: TechnicianId(id.to_string()),
        position: Some(GeoPoint::new(lat, lng)),
        status: TechnicianStatus::Approved,
        active: true,
        available: true,
        service_categories: [category("towing")].into_iter().collect(),
        vehicle_types: [vehicle("flatbed")].into_iter().collect(),
        service_radius_km: 50.0,
        rating: 4.5,
    }
}

pub(super) fn towing_request(id: &str, lat: f64, lng: f64) -> ServiceRequest {
    ServiceRequest {
        id: RequestId(id.to_string()),
        service_category: category("towing"),
        vehicle_type: vehicle("flatbed"),
        pickup: GeoPoint::new(lat, lng),
        radius_override_km: None,
        status: RequestStatus::Open,
    }
}

pub(super) fn towing_probe(lat: f64, lng: f64) -> DispatchProbe {
    DispatchProbe::from_request(&towing_request("req-probe", lat, lng))
}

pub(super) fn dispatch_config() -> DispatchConfig {
    DispatchConfig {
        offer_timeout_secs: 45,
        max_offer_attempts: 3,
        audit_cache_ttl_secs: 30,
    }
}

pub(super) fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0)
        .single()
        .expect("valid start time")
}

#[derive(Default)]
pub(super) struct MemoryDirectory {
    technicians: Mutex<Vec<Technician>>,
}

impl MemoryDirectory {
    pub(super) fn seed(&self, technicians: Vec<Technician>) {
        *self.technicians.lock().expect("directory mutex poisoned") = technicians;
    }
}

impl TechnicianDirectory for MemoryDirectory {
    fn technicians(&self) -> Result<Vec<Technician>, RepositoryError> {
        Ok(self
            .technicians
            .lock()
            .expect("directory mutex poisoned")
            .clone())
    }
}

#[derive(Default)]
pub(super) struct MemoryRequests {
    records: Mutex<HashMap<RequestId, ServiceRequest>>,
}

impl MemoryRequests {
    pub(super) fn insert(&self, request: ServiceRequest) {
        self.records
            .lock()
            .expect("request mutex poisoned")
            .insert(request.id.clone(), request);
    }

    pub(super) fn status_of(&self, id: &RequestId) -> Option<RequestStatus> {
        self.records
            .lock()
            .expect("request mutex poisoned")
            .get(id)
            .map(|request| request.status)
    }
}

impl RequestStore for MemoryRequests {
    fn fetch(&self, id: &RequestId) -> Result<Option<ServiceRequest>, RepositoryError> {
        Ok(self
            .records
            .lock()
            .expect("request mutex poisoned")
            .get(id)
            .cloned())
    }

    fn set_status(&self, id: &RequestId, status: RequestStatus) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("request mutex poisoned");
        match guard.get_mut(id) {
            Some(request) => {
                request.status = status;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }
}

#[derive(Default)]
pub(super) struct MemoryOffers {
    records: Mutex<Vec<DispatchOffer>>,
}

impl MemoryOffers {
    pub(super) fn all(&self) -> Vec<DispatchOffer> {
        self.records.lock().expect("offer mutex poisoned").clone()
    }

    pub(super) fn live_count(&self, request_id: &RequestId) -> usize {
        self.records
            .lock()
            .expect("offer mutex poisoned")
            .iter()
            .filter(|offer| offer.request_id == *request_id && offer.state == OfferState::Offered)
            .count()
    }
}

impl OfferRepository for MemoryOffers {
    fn insert(&self, offer: DispatchOffer) -> Result<DispatchOffer, RepositoryError> {
        let mut guard = self.records.lock().expect("offer mutex poisoned");
        let duplicate = guard.iter().any(|existing| {
            existing.request_id == offer.request_id
                && (existing.technician_id == offer.technician_id
                    || existing.state == OfferState::Offered)
        });
        if duplicate {
            return Err(RepositoryError::Conflict);
        }
        guard.push(offer.clone());
        Ok(offer)
    }

    fn update(&self, offer: DispatchOffer) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("offer mutex poisoned");
        match guard.iter_mut().find(|existing| {
            existing.request_id == offer.request_id
                && existing.technician_id == offer.technician_id
        }) {
            Some(existing) => {
                *existing = offer;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn live_offer(&self, request_id: &RequestId) -> Result<Option<DispatchOffer>, RepositoryError> {
        Ok(self
            .records
            .lock()
            .expect("offer mutex poisoned")
            .iter()
            .find(|offer| offer.request_id == *request_id && offer.state == OfferState::Offered)
            .cloned())
    }

    fn history(&self, request_id: &RequestId) -> Result<Vec<DispatchOffer>, RepositoryError> {
        Ok(self
            .records
            .lock()
            .expect("offer mutex poisoned")
            .iter()
            .filter(|offer| offer.request_id == *request_id)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub(super) struct RecordingNotifier {
    notices: Mutex<Vec<DispatchNotice>>,
}

impl RecordingNotifier {
    pub(super) fn notices(&self) -> Vec<DispatchNotice> {
        self.notices.lock().expect("notice mutex poisoned").clone()
    }
}

impl OfferNotifier for RecordingNotifier {
    fn publish(&self, notice: DispatchNotice) -> Result<(), NotifyError> {
        self.notices
            .lock()
            .expect("notice mutex poisoned")
            .push(notice);
        Ok(())
    }
}

pub(super) struct FailingNotifier;

impl OfferNotifier for FailingNotifier {
    fn publish(&self, _notice: DispatchNotice) -> Result<(), NotifyError> {
        Err(NotifyError::Transport("push gateway offline".to_string()))
    }
}

pub(super) struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub(super) fn at(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub(super) fn advance(&self, by: Duration) {
        let mut guard = self.now.lock().expect("clock mutex poisoned");
        *guard += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock mutex poisoned")
    }
}

pub(super) struct EngineHarness {
    pub(super) engine: Arc<DispatchEngine<MemoryDirectory, MemoryRequests, MemoryOffers, RecordingNotifier>>,
    pub(super) directory: Arc<MemoryDirectory>,
    pub(super) requests: Arc<MemoryRequests>,
    pub(super) offers: Arc<MemoryOffers>,
    pub(super) notifier: Arc<RecordingNotifier>,
    pub(super) clock: Arc<ManualClock>,
}

pub(super) fn build_engine(technicians: Vec<Technician>) -> EngineHarness {
    let directory = Arc::new(MemoryDirectory::default());
    directory.seed(technicians);
    let requests = Arc::new(MemoryRequests::default());
    let offers = Arc::new(MemoryOffers::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let clock = Arc::new(ManualClock::at(start_time()));

    let engine = Arc::new(DispatchEngine::new(
        directory.clone(),
        requests.clone(),
        offers.clone(),
        notifier.clone(),
        clock.clone(),
        dispatch_config(),
    ));

    EngineHarness {
        engine,
        directory,
        requests,
        offers,
        notifier,
        clock,
    }
}

pub(super) fn dispatch_router_for(harness: &EngineHarness) -> axum::Router {
    let audit = Arc::new(CoverageAuditEngine::new(
        harness.directory.clone(),
        harness.clock.clone(),
        dispatch_config().audit_cache_ttl(),
    ));
    dispatch_router(DispatchState {
        engine: harness.engine.clone(),
        audit,
    })
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
