//! End-to-end specifications for the live dispatch cycle, driven through the
//! public engine facade with in-memory collaborators.

mod common {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use chrono::{DateTime, Duration, TimeZone, Utc};

    use roadcall::config::DispatchConfig;
    use roadcall::dispatch::{
        Clock, DispatchEngine, DispatchNotice, DispatchOffer, GeoPoint, NotifyError, OfferNotifier,
        OfferRepository, OfferState, RepositoryError, RequestId, RequestStatus, RequestStore,
        ServiceCategory, ServiceRequest, Technician, TechnicianDirectory, TechnicianId,
        TechnicianStatus, VehicleType,
    };

    pub fn category(label: &str) -> ServiceCategory {
        ServiceCategory::new(label).expect("valid category label")
    }

    pub fn vehicle(label: &str) -> VehicleType {
        VehicleType::new(label).expect("valid vehicle label")
    }

    pub fn technician(id: &str, lat: f64, lng: f64) -> Technician {
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

    pub fn towing_request(id: &str, lat: f64, lng: f64) -> ServiceRequest {
        ServiceRequest {
            id: RequestId(id.to_string()),
            service_category: category("towing"),
            vehicle_type: vehicle("flatbed"),
            pickup: GeoPoint::new(lat, lng),
            radius_override_km: None,
            status: RequestStatus::Open,
        }
    }

    pub fn start_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0)
            .single()
            .expect("valid start time")
    }

    #[derive(Default)]
    pub struct MemoryDirectory {
        technicians: Mutex<Vec<Technician>>,
    }

    impl MemoryDirectory {
        pub fn seed(&self, technicians: Vec<Technician>) {
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
    pub struct MemoryRequests {
        records: Mutex<HashMap<RequestId, ServiceRequest>>,
    }

    impl MemoryRequests {
        pub fn insert(&self, request: ServiceRequest) {
            self.records
                .lock()
                .expect("request mutex poisoned")
                .insert(request.id.clone(), request);
        }

        pub fn status_of(&self, id: &RequestId) -> Option<RequestStatus> {
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
    pub struct MemoryOffers {
        records: Mutex<Vec<DispatchOffer>>,
    }

    impl MemoryOffers {
        pub fn all(&self) -> Vec<DispatchOffer> {
            self.records.lock().expect("offer mutex poisoned").clone()
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

        fn live_offer(
            &self,
            request_id: &RequestId,
        ) -> Result<Option<DispatchOffer>, RepositoryError> {
            Ok(self
                .records
                .lock()
                .expect("offer mutex poisoned")
                .iter()
                .find(|offer| {
                    offer.request_id == *request_id && offer.state == OfferState::Offered
                })
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
    pub struct RecordingNotifier {
        notices: Mutex<Vec<DispatchNotice>>,
    }

    impl RecordingNotifier {
        pub fn notices(&self) -> Vec<DispatchNotice> {
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

    pub struct ManualClock {
        now: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        pub fn at(start: DateTime<Utc>) -> Self {
            Self {
                now: Mutex::new(start),
            }
        }

        pub fn advance(&self, by: Duration) {
            let mut guard = self.now.lock().expect("clock mutex poisoned");
            *guard += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().expect("clock mutex poisoned")
        }
    }

    pub struct Harness {
        pub engine: DispatchEngine<MemoryDirectory, MemoryRequests, MemoryOffers, RecordingNotifier>,
        pub requests: Arc<MemoryRequests>,
        pub offers: Arc<MemoryOffers>,
        pub notifier: Arc<RecordingNotifier>,
        pub clock: Arc<ManualClock>,
    }

    pub fn build_harness(technicians: Vec<Technician>, max_offer_attempts: u32) -> Harness {
        let directory = Arc::new(MemoryDirectory::default());
        directory.seed(technicians);
        let requests = Arc::new(MemoryRequests::default());
        let offers = Arc::new(MemoryOffers::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let clock = Arc::new(ManualClock::at(start_time()));

        let config = DispatchConfig {
            offer_timeout_secs: 45,
            max_offer_attempts,
            audit_cache_ttl_secs: 30,
        };

        let engine = DispatchEngine::new(
            directory,
            requests.clone(),
            offers.clone(),
            notifier.clone(),
            clock.clone(),
            config,
        );

        Harness {
            engine,
            requests,
            offers,
            notifier,
            clock,
        }
    }
}

use chrono::Duration;
use common::*;
use roadcall::dispatch::{DispatchError, NoticeKind, OfferState, RequestId, RequestStatus};

#[test]
fn request_travels_decline_expiry_and_acceptance_to_assignment() {
    let harness = build_harness(
        vec![
            technician("tech-1", 10.01, 10.0),
            technician("tech-2", 10.02, 10.0),
            technician("tech-3", 10.03, 10.0),
        ],
        5,
    );
    harness.requests.insert(towing_request("req-9", 10.0, 10.0));
    let id = RequestId("req-9".to_string());

    let first = harness.engine.create_offer(&id).expect("first offer");
    assert_eq!(first.technician_id.0, "tech-1");

    let second = harness
        .engine
        .respond_decline(&id, &first.technician_id)
        .expect("retry after decline");
    assert_eq!(second.technician_id.0, "tech-2");

    harness.clock.advance(Duration::seconds(50));
    let third = harness.engine.on_expire(&id).expect("retry after expiry");
    assert_eq!(third.technician_id.0, "tech-3");

    let accepted = harness
        .engine
        .respond_accept(&id, &third.technician_id)
        .expect("final acceptance");
    assert_eq!(accepted.attempt, 3);
    assert_eq!(
        harness.requests.status_of(&id),
        Some(RequestStatus::Assigned)
    );

    let states: Vec<OfferState> = harness
        .offers
        .all()
        .iter()
        .map(|offer| offer.state)
        .collect();
    assert_eq!(
        states,
        vec![OfferState::Declined, OfferState::Expired, OfferState::Accepted]
    );

    let kinds: Vec<NoticeKind> = harness
        .notifier
        .notices()
        .iter()
        .map(|notice| notice.kind)
        .collect();
    assert_eq!(
        kinds,
        vec![
            NoticeKind::Offered,
            NoticeKind::Offered,
            NoticeKind::Offered,
            NoticeKind::Accepted,
        ]
    );
}

#[test]
fn a_fully_declined_pool_settles_as_unmatched() {
    let harness = build_harness(
        vec![
            technician("tech-1", 10.01, 10.0),
            technician("tech-2", 10.02, 10.0),
        ],
        5,
    );
    harness.requests.insert(towing_request("req-9", 10.0, 10.0));
    let id = RequestId("req-9".to_string());

    let first = harness.engine.create_offer(&id).expect("first offer");
    let second = harness
        .engine
        .respond_decline(&id, &first.technician_id)
        .expect("second offer");

    match harness.engine.respond_decline(&id, &second.technician_id) {
        Err(DispatchError::ExhaustedCandidates { attempts, .. }) => assert_eq!(attempts, 2),
        other => panic!("expected exhaustion, got {other:?}"),
    }
    assert_eq!(
        harness.requests.status_of(&id),
        Some(RequestStatus::Unmatched)
    );

    let kinds: Vec<NoticeKind> = harness
        .notifier
        .notices()
        .iter()
        .map(|notice| notice.kind)
        .collect();
    assert_eq!(
        kinds,
        vec![
            NoticeKind::Offered,
            NoticeKind::Offered,
            NoticeKind::Unmatched,
        ]
    );
}

#[test]
fn the_attempt_bound_holds_even_with_candidates_left() {
    let harness = build_harness(
        vec![
            technician("tech-1", 10.01, 10.0),
            technician("tech-2", 10.02, 10.0),
            technician("tech-3", 10.03, 10.0),
        ],
        2,
    );
    harness.requests.insert(towing_request("req-9", 10.0, 10.0));
    let id = RequestId("req-9".to_string());

    let first = harness.engine.create_offer(&id).expect("first offer");
    let second = harness
        .engine
        .respond_decline(&id, &first.technician_id)
        .expect("second offer");

    match harness.engine.respond_decline(&id, &second.technician_id) {
        Err(DispatchError::ExhaustedCandidates { attempts, .. }) => assert_eq!(attempts, 2),
        other => panic!("expected exhaustion at the bound, got {other:?}"),
    }
    assert_eq!(
        harness.requests.status_of(&id),
        Some(RequestStatus::Unmatched)
    );
}
