use std::collections::{BTreeMap, HashMap};
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use metrics_exporter_prometheus::PrometheusHandle;
use roadcall::config::DispatchConfig;
use roadcall::dispatch::{
    DispatchNotice, DispatchOffer, NotifyError, OfferNotifier, OfferRepository, OfferState,
    RepositoryError, RequestId, RequestStatus, RequestStore, RosterImportError, RosterImporter,
    ServiceRequest, Technician, TechnicianDirectory, TechnicianId,
};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

#[derive(Default)]
pub(crate) struct InMemoryTechnicianDirectory {
    technicians: Mutex<BTreeMap<TechnicianId, Technician>>,
}

impl InMemoryTechnicianDirectory {
    pub(crate) fn upsert(&self, technician: Technician) {
        self.technicians
            .lock()
            .expect("directory mutex poisoned")
            .insert(technician.id.clone(), technician);
    }
}

impl TechnicianDirectory for InMemoryTechnicianDirectory {
    fn technicians(&self) -> Result<Vec<Technician>, RepositoryError> {
        Ok(self
            .technicians
            .lock()
            .expect("directory mutex poisoned")
            .values()
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub(crate) struct InMemoryRequestStore {
    records: Mutex<HashMap<RequestId, ServiceRequest>>,
}

impl InMemoryRequestStore {
    pub(crate) fn insert(&self, request: ServiceRequest) {
        self.records
            .lock()
            .expect("request mutex poisoned")
            .insert(request.id.clone(), request);
    }
}

impl RequestStore for InMemoryRequestStore {
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
pub(crate) struct InMemoryOfferRepository {
    records: Mutex<HashMap<RequestId, Vec<DispatchOffer>>>,
}

impl OfferRepository for InMemoryOfferRepository {
    fn insert(&self, offer: DispatchOffer) -> Result<DispatchOffer, RepositoryError> {
        let mut guard = self.records.lock().expect("offer mutex poisoned");
        let offers = guard.entry(offer.request_id.clone()).or_default();
        let duplicate = offers.iter().any(|existing| {
            existing.technician_id == offer.technician_id
                || existing.state == OfferState::Offered
        });
        if duplicate {
            return Err(RepositoryError::Conflict);
        }
        offers.push(offer.clone());
        Ok(offer)
    }

    fn update(&self, offer: DispatchOffer) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("offer mutex poisoned");
        let offers = guard
            .get_mut(&offer.request_id)
            .ok_or(RepositoryError::NotFound)?;
        match offers
            .iter_mut()
            .find(|existing| existing.technician_id == offer.technician_id)
        {
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
            .get(request_id)
            .and_then(|offers| {
                offers
                    .iter()
                    .find(|offer| offer.state == OfferState::Offered)
                    .cloned()
            }))
    }

    fn history(&self, request_id: &RequestId) -> Result<Vec<DispatchOffer>, RepositoryError> {
        Ok(self
            .records
            .lock()
            .expect("offer mutex poisoned")
            .get(request_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[derive(Default)]
pub(crate) struct InMemoryOfferNotifier {
    events: Mutex<Vec<DispatchNotice>>,
}

impl InMemoryOfferNotifier {
    pub(crate) fn events(&self) -> Vec<DispatchNotice> {
        self.events.lock().expect("notice mutex poisoned").clone()
    }
}

impl OfferNotifier for InMemoryOfferNotifier {
    fn publish(&self, notice: DispatchNotice) -> Result<(), NotifyError> {
        self.events
            .lock()
            .expect("notice mutex poisoned")
            .push(notice);
        Ok(())
    }
}

static REQUEST_SEQUENCE: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_request_id() -> RequestId {
    let id = REQUEST_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    RequestId(format!("req-{id:06}"))
}

pub(crate) fn default_dispatch_config() -> DispatchConfig {
    DispatchConfig {
        offer_timeout_secs: 45,
        max_offer_attempts: 5,
        audit_cache_ttl_secs: 30,
    }
}

/// Built-in fleet around Des Moines used by the demo and as the coverage
/// report fallback when no roster export is supplied.
const DEMO_ROSTER: &str = "\
Technician ID,Status,Active,Available,Latitude,Longitude,Service Categories,Vehicle Types,Service Radius Km,Rating
tech-001,approved,yes,yes,41.5868,-93.6250,towing|winch_out,sedan|suv|pickup,40,4.8
tech-002,approved,yes,yes,41.6005,-93.6091,towing|tire_change,sedan|suv,35,4.6
tech-003,approved,yes,yes,41.5772,-93.7116,jump_start|lockout,sedan|motorcycle,30,4.4
tech-004,approved,no,yes,41.6523,-93.5795,fuel_delivery,sedan|van,25,4.1
tech-005,pending,yes,yes,41.5448,-93.6597,towing,box_truck,45,
tech-006,approved,yes,no,41.6180,-93.6740,lockout|tire_change,sedan|suv,20,4.9
";

pub(crate) fn demo_fleet() -> Result<Vec<Technician>, RosterImportError> {
    RosterImporter::from_reader(Cursor::new(DEMO_ROSTER))
}
