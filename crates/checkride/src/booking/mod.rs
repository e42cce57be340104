//! Checkride booking coordination: lifecycle state machine, geographic and
//! qualification matching, and first-acceptance-wins examiner assignment.

pub mod arbiter;
pub mod collaborators;
pub mod domain;
pub(crate) mod exam_types;
pub mod geo;
pub mod ingest;
pub mod lifecycle;
pub mod memory;
pub mod router;
pub mod store;

#[cfg(test)]
mod tests;

pub use arbiter::{parse_decision, AssignmentArbiter, ResponseOutcome, ResponseReason};
pub use collaborators::{
    GatewayError, GatewayRefund, Geocoder, NotificationDispatcher, NotificationOutcome,
    NotifyError, PaymentGateway,
};
pub use domain::{
    ActionLogEntry, ActionType, Booking, BookingId, BookingIdError, BookingRequest,
    BookingStatus, BookingView, Coordinates, Examiner, ExaminerId, ExaminerReply,
    ExaminerResponse, ResponseDecision, SchedulePreference, StudentContact, ValidationError,
};
pub use exam_types::{canonicalize, has_matching_qualification, required_qualification_codes};
pub use geo::{haversine_km, nautical_miles_to_km, Candidate, ExaminerDirectory, GeoMatcher};
pub use ingest::{load_examiners, parse_examiners, GazetteerGeocoder, IngestError};
pub use lifecycle::{
    BookingLifecycle, BookingServiceError, CancelOutcome, ContactOutcome, PaymentOutcome,
    RefundOutcome, RefundRequestOutcome,
};
pub use memory::{MemoryBookingStore, StaticExaminerDirectory};
pub use router::booking_router;
pub use store::{BookingStore, RefundRecord, StoreError};
