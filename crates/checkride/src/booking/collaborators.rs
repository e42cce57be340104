//! External collaborator boundaries: geocoding, payment gateway, and
//! notification dispatch.
//!
//! Notification delivery is best-effort by contract; lifecycle transitions
//! commit before any notification is attempted and never roll back on
//! delivery failure. Implementations are expected to be time-bounded so a
//! hung provider cannot stall a request handler.

use chrono::{DateTime, Utc};

use super::domain::{Booking, Coordinates, ExaminerId};
use super::geo::Candidate;

/// Resolves a free-text address or airport identifier to coordinates.
/// `None` covers both "not found" and provider failure; the caller treats
/// either as a normal flow branch, not an exception.
pub trait Geocoder: Send + Sync {
    fn geocode(&self, address: &str) -> Option<Coordinates>;
}

/// Monetary reversal confirmed by the gateway.
#[derive(Debug, Clone)]
pub struct GatewayRefund {
    pub reference: String,
}

/// Gateway-side refund failure, surfaced to the caller rather than absorbed.
#[derive(Debug, thiserror::Error)]
#[error("payment gateway refund failed: {0}")]
pub struct GatewayError(pub String);

pub trait PaymentGateway: Send + Sync {
    fn refund(
        &self,
        payment_ref: &str,
        amount_cents: Option<u32>,
        reason: &str,
    ) -> Result<GatewayRefund, GatewayError>;
}

/// Outcome kinds fanned out to students and examiners after a transition.
#[derive(Debug, Clone)]
pub enum NotificationOutcome {
    PaymentConfirmed,
    ExaminerAssigned {
        examiner: ExaminerId,
        scheduled_at: Option<DateTime<Utc>>,
    },
    DeclineRecorded {
        examiner: ExaminerId,
    },
    Cancelled {
        reason: String,
    },
    Refunded {
        manual: bool,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

/// Best-effort fan-out over whatever channels the deployment wires up
/// (email, SMS, calendar, chat). A failure here is logged and swallowed;
/// booking correctness never depends on delivery.
pub trait NotificationDispatcher: Send + Sync {
    fn contact_examiner(&self, candidate: &Candidate, booking: &Booking) -> Result<(), NotifyError>;

    fn notify_outcome(&self, booking: &Booking, outcome: &NotificationOutcome)
        -> Result<(), NotifyError>;
}
