use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::response::Response;
use serde_json::Value;

use crate::booking::collaborators::{
    GatewayError, GatewayRefund, Geocoder, NotificationDispatcher, NotificationOutcome,
    NotifyError, PaymentGateway,
};
use crate::booking::domain::{
    Booking, BookingId, BookingRequest, Coordinates, Examiner, ExaminerId, SchedulePreference,
    StudentContact,
};
use crate::booking::geo::{Candidate, EARTH_RADIUS_KM};
use crate::booking::lifecycle::BookingLifecycle;
use crate::booking::memory::{MemoryBookingStore, StaticExaminerDirectory};

/// Reference point all distance fixtures are measured from.
pub(super) fn origin() -> Coordinates {
    Coordinates {
        latitude: 40.0,
        longitude: -85.0,
    }
}

/// A point exactly `km` kilometers due north of the origin. Along a meridian
/// the haversine distance reduces to `R * delta_lat`, so this is exact.
pub(super) fn point_km_north(km: f64) -> Coordinates {
    Coordinates {
        latitude: 40.0 + (km / EARTH_RADIUS_KM).to_degrees(),
        longitude: -85.0,
    }
}

pub(super) fn examiner(id: &str, coordinates: Option<Coordinates>, qualifications: &str) -> Examiner {
    Examiner {
        id: ExaminerId(id.to_string()),
        display_name: format!("Examiner {id}"),
        email: format!("{id}@examiners.test"),
        coordinates,
        qualifications: qualifications.to_string(),
        specializations: Vec::new(),
    }
}

/// Three private-pilot examiners at 2, 5, and 120 km from the origin.
pub(super) fn seed_examiners() -> Vec<Examiner> {
    vec![
        examiner("dpe-close", Some(point_km_north(2.0)), "DPE-PE-ASEL, DPE-CIRE"),
        examiner("dpe-mid", Some(point_km_north(5.0)), "DPE-PE"),
        examiner("dpe-far", Some(point_km_north(120.0)), "DPE-PE-ASEL"),
    ]
}

pub(super) fn booking_request() -> BookingRequest {
    BookingRequest {
        student: StudentContact {
            first_name: "Avery".to_string(),
            last_name: "Collins".to_string(),
            email: "avery.collins@students.test".to_string(),
            phone: Some("555-0100".to_string()),
        },
        exam_type: "Private Pilot".to_string(),
        preferred_location: "KMIE".to_string(),
        search_radius_nm: 50.0,
        schedule: SchedulePreference::AsSoonAsPossible,
        amount_cents: Some(75_000),
        payment_session_ref: None,
    }
}

#[derive(Default)]
pub(super) struct MapGeocoder {
    entries: HashMap<String, Coordinates>,
}

impl MapGeocoder {
    pub(super) fn with(mut self, query: &str, coordinates: Coordinates) -> Self {
        self.entries.insert(query.to_string(), coordinates);
        self
    }
}

impl Geocoder for MapGeocoder {
    fn geocode(&self, address: &str) -> Option<Coordinates> {
        self.entries.get(address).copied()
    }
}

#[derive(Default)]
pub(super) struct RecordingNotifier {
    pub(super) contacts: Mutex<Vec<(ExaminerId, BookingId)>>,
    pub(super) outcomes: Mutex<Vec<(BookingId, String)>>,
}

impl RecordingNotifier {
    pub(super) fn contacted(&self) -> Vec<ExaminerId> {
        self.contacts
            .lock()
            .expect("notifier mutex poisoned")
            .iter()
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub(super) fn outcome_kinds(&self) -> Vec<String> {
        self.outcomes
            .lock()
            .expect("notifier mutex poisoned")
            .iter()
            .map(|(_, kind)| kind.clone())
            .collect()
    }
}

impl NotificationDispatcher for RecordingNotifier {
    fn contact_examiner(&self, candidate: &Candidate, booking: &Booking) -> Result<(), NotifyError> {
        self.contacts
            .lock()
            .expect("notifier mutex poisoned")
            .push((candidate.examiner_id.clone(), booking.id));
        Ok(())
    }

    fn notify_outcome(
        &self,
        booking: &Booking,
        outcome: &NotificationOutcome,
    ) -> Result<(), NotifyError> {
        let kind = match outcome {
            NotificationOutcome::PaymentConfirmed => "payment_confirmed",
            NotificationOutcome::ExaminerAssigned { .. } => "examiner_assigned",
            NotificationOutcome::DeclineRecorded { .. } => "decline_recorded",
            NotificationOutcome::Cancelled { .. } => "cancelled",
            NotificationOutcome::Refunded { .. } => "refunded",
        };
        self.outcomes
            .lock()
            .expect("notifier mutex poisoned")
            .push((booking.id, kind.to_string()));
        Ok(())
    }
}

/// Every delivery attempt fails; transitions must still commit.
pub(super) struct FailingNotifier;

impl NotificationDispatcher for FailingNotifier {
    fn contact_examiner(&self, _: &Candidate, _: &Booking) -> Result<(), NotifyError> {
        Err(NotifyError::Transport("smtp offline".to_string()))
    }

    fn notify_outcome(&self, _: &Booking, _: &NotificationOutcome) -> Result<(), NotifyError> {
        Err(NotifyError::Transport("smtp offline".to_string()))
    }
}

#[derive(Default)]
pub(super) struct TestGateway {
    pub(super) fail: bool,
    pub(super) refunds: Mutex<Vec<(String, Option<u32>)>>,
}

impl TestGateway {
    pub(super) fn failing() -> Self {
        Self {
            fail: true,
            refunds: Mutex::new(Vec::new()),
        }
    }

    pub(super) fn refund_calls(&self) -> usize {
        self.refunds.lock().expect("gateway mutex poisoned").len()
    }
}

impl PaymentGateway for TestGateway {
    fn refund(
        &self,
        payment_ref: &str,
        amount_cents: Option<u32>,
        _reason: &str,
    ) -> Result<GatewayRefund, GatewayError> {
        if self.fail {
            return Err(GatewayError("card network declined the reversal".to_string()));
        }
        self.refunds
            .lock()
            .expect("gateway mutex poisoned")
            .push((payment_ref.to_string(), amount_cents));
        Ok(GatewayRefund {
            reference: format!("re_{payment_ref}"),
        })
    }
}

pub(super) struct Fixture {
    pub(super) service: Arc<BookingLifecycle<MemoryBookingStore>>,
    pub(super) store: Arc<MemoryBookingStore>,
    pub(super) notifier: Arc<RecordingNotifier>,
    pub(super) gateway: Arc<TestGateway>,
}

pub(super) fn build_lifecycle() -> Fixture {
    build_lifecycle_with(seed_examiners(), TestGateway::default())
}

pub(super) fn build_lifecycle_with(examiners: Vec<Examiner>, gateway: TestGateway) -> Fixture {
    let store = Arc::new(MemoryBookingStore::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let gateway = Arc::new(gateway);
    let geocoder = MapGeocoder::default().with("KMIE", origin());
    let service = Arc::new(BookingLifecycle::new(
        store.clone(),
        Arc::new(StaticExaminerDirectory::new(examiners)),
        Arc::new(geocoder),
        gateway.clone(),
        notifier.clone(),
    ));
    Fixture {
        service,
        store,
        notifier,
        gateway,
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
