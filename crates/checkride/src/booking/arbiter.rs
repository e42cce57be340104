//! First-accepted-response-wins arbitration.
//!
//! Multiple examiners receive the contact notification at the same time and
//! may accept concurrently from independent request handlers. The contract
//! is purely "exactly one wins": arrival order over the network is not
//! observable, so the winner is whoever commits first through the store's
//! atomic conditional update. Declines never contend for the assignment.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use super::collaborators::{NotificationDispatcher, NotificationOutcome};
use super::domain::{
    Booking, BookingId, BookingStatus, ExaminerId, ExaminerReply, ResponseDecision,
    ValidationError,
};
use super::lifecycle::BookingServiceError;
use super::store::{AssignmentCommit, BookingStore, DeclineCommit};

/// Why a response produced (or did not produce) an assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseReason {
    Assigned,
    DeclineRecorded,
    /// Another examiner was committed first; the accept was recorded as a
    /// non-winner for audit.
    TooLate,
    /// The booking left the assignable states for a non-assignment reason
    /// (cancelled, refunded). The response is still recorded.
    BookingUnavailable,
    /// This examiner already responded; response rows mutate exactly once.
    AlreadyResponded,
    /// No Pending contact row exists for this (booking, examiner) pair.
    NeverContacted,
}

/// Structured outcome returned for every recorded response. Losing the race
/// is a normal branch, not an error.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseOutcome {
    pub assigned: bool,
    pub reason: ResponseReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_status: Option<&'static str>,
    pub message: String,
}

impl ResponseOutcome {
    fn assigned(booking: &Booking) -> Self {
        Self {
            assigned: true,
            reason: ResponseReason::Assigned,
            current_status: Some(booking.status.label()),
            message: "Congratulations! You have been assigned to this booking. The student has been notified."
                .to_string(),
        }
    }

    fn decline_recorded(status: BookingStatus) -> Self {
        Self {
            assigned: false,
            reason: ResponseReason::DeclineRecorded,
            current_status: Some(status.label()),
            message: "Thank you for your response. Your decline has been recorded.".to_string(),
        }
    }

    fn too_late() -> Self {
        Self {
            assigned: false,
            reason: ResponseReason::TooLate,
            current_status: None,
            message:
                "Sorry, another examiner responded first and has been assigned to this booking."
                    .to_string(),
        }
    }

    fn unavailable(status: BookingStatus) -> Self {
        Self {
            assigned: false,
            reason: ResponseReason::BookingUnavailable,
            current_status: Some(status.label()),
            message: "Sorry, this booking is no longer available.".to_string(),
        }
    }

    fn already_responded(decision: ResponseDecision) -> Self {
        Self {
            assigned: false,
            reason: ResponseReason::AlreadyResponded,
            current_status: None,
            message: format!(
                "A response has already been recorded for this booking ({}).",
                decision.label()
            ),
        }
    }

    fn never_contacted() -> Self {
        Self {
            assigned: false,
            reason: ResponseReason::NeverContacted,
            current_status: None,
            message: "No contact request was sent to this examiner for this booking.".to_string(),
        }
    }
}

/// Parses an examiner's decision string. Only "Accepted" and "Declined" are
/// valid, case-insensitively.
pub fn parse_decision(raw: &str) -> Result<ResponseDecision, ValidationError> {
    if raw.eq_ignore_ascii_case("accepted") {
        Ok(ResponseDecision::Accepted)
    } else if raw.eq_ignore_ascii_case("declined") {
        Ok(ResponseDecision::Declined)
    } else {
        Err(ValidationError::InvalidDecision(raw.to_string()))
    }
}

/// Enforces at-most-one-winner assignment over the persisted booking state.
pub struct AssignmentArbiter<S> {
    store: Arc<S>,
    notifier: Arc<dyn NotificationDispatcher>,
}

impl<S> AssignmentArbiter<S>
where
    S: BookingStore + 'static,
{
    pub fn new(store: Arc<S>, notifier: Arc<dyn NotificationDispatcher>) -> Self {
        Self { store, notifier }
    }

    /// Records an examiner's response and, for an accept, races for the
    /// assignment through the store's compare-and-commit.
    pub fn record_response(
        &self,
        booking_id: BookingId,
        examiner_id: &ExaminerId,
        decision: ResponseDecision,
        reply: ExaminerReply,
    ) -> Result<ResponseOutcome, BookingServiceError> {
        match decision {
            ResponseDecision::Accepted => self.try_assign(booking_id, examiner_id, reply),
            ResponseDecision::Declined => self.record_decline(booking_id, examiner_id, reply),
            ResponseDecision::Pending => Err(BookingServiceError::Validation(
                ValidationError::InvalidDecision("Pending".to_string()),
            )),
        }
    }

    fn try_assign(
        &self,
        booking_id: BookingId,
        examiner_id: &ExaminerId,
        reply: ExaminerReply,
    ) -> Result<ResponseOutcome, BookingServiceError> {
        let commit =
            self.store
                .commit_assignment(booking_id, examiner_id, reply, &examiner_id.0)?;

        match commit {
            AssignmentCommit::Won(booking) => {
                info!(booking = %booking.id, examiner = %examiner_id, "examiner assigned");
                let outcome = NotificationOutcome::ExaminerAssigned {
                    examiner: examiner_id.clone(),
                    scheduled_at: booking.scheduled_at,
                };
                if let Err(err) = self.notifier.notify_outcome(&booking, &outcome) {
                    warn!(booking = %booking.id, error = %err, "assignment notification failed");
                }
                Ok(ResponseOutcome::assigned(&booking))
            }
            AssignmentCommit::Lost { status, assigned } => {
                info!(
                    booking = %booking_id,
                    examiner = %examiner_id,
                    status = status.label(),
                    "accept lost the assignment race"
                );
                if assigned.is_some() || status.is_assigned() {
                    Ok(ResponseOutcome::too_late())
                } else {
                    Ok(ResponseOutcome::unavailable(status))
                }
            }
            AssignmentCommit::AlreadyResponded { decision } => {
                Ok(ResponseOutcome::already_responded(decision))
            }
            AssignmentCommit::NeverContacted => Ok(ResponseOutcome::never_contacted()),
        }
    }

    fn record_decline(
        &self,
        booking_id: BookingId,
        examiner_id: &ExaminerId,
        reply: ExaminerReply,
    ) -> Result<ResponseOutcome, BookingServiceError> {
        let commit = self
            .store
            .record_decline(booking_id, examiner_id, reply, &examiner_id.0)?;

        match commit {
            DeclineCommit::Recorded { status } => {
                info!(booking = %booking_id, examiner = %examiner_id, "examiner declined");
                if let Ok(Some(booking)) = self.store.fetch_booking(booking_id) {
                    let outcome = NotificationOutcome::DeclineRecorded {
                        examiner: examiner_id.clone(),
                    };
                    if let Err(err) = self.notifier.notify_outcome(&booking, &outcome) {
                        warn!(booking = %booking_id, error = %err, "decline notification failed");
                    }
                }
                Ok(ResponseOutcome::decline_recorded(status))
            }
            DeclineCommit::AlreadyResponded { decision } => {
                Ok(ResponseOutcome::already_responded(decision))
            }
            DeclineCommit::NeverContacted => Ok(ResponseOutcome::never_contacted()),
        }
    }
}
