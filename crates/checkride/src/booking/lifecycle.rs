//! The booking lifecycle state machine.
//!
//! `Created -> PaymentPending -> PaymentConfirmed -> ExaminersContacted ->
//! ExaminerAssigned -> Scheduled -> Completed`, with `Cancelled` reachable
//! from any non-terminal state and `RefundRequested -> Refunded` from paid
//! states. Status transitions commit through the store's conditional
//! operations; notification fan-out happens after the commit and never rolls
//! it back.

use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use super::arbiter::{AssignmentArbiter, ResponseOutcome};
use super::collaborators::{
    Geocoder, NotificationDispatcher, NotificationOutcome, PaymentGateway,
};
use super::domain::{
    Booking, BookingId, BookingStatus, BookingRequest, BookingView, ExaminerId, ExaminerReply,
    ResponseDecision, ValidationError, ActionLogEntry, ExaminerResponse,
};
use super::exam_types::canonicalize;
use super::geo::{nautical_miles_to_km, Candidate, ExaminerDirectory, GeoMatcher};
use super::store::{
    BookingStore, CancelCommit, ContactCommit, PaymentCommit, RefundCommit, RefundRecord,
    RefundRequestCommit, StoreError,
};

const SYSTEM_ACTOR: &str = "system";

/// Error raised by the lifecycle facade. Expected business branches are
/// outcome enums, never errors.
#[derive(Debug, thiserror::Error)]
pub enum BookingServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome of a payment confirmation.
#[derive(Debug, Clone)]
pub enum PaymentOutcome {
    /// Confirmed; `first` is false for the idempotent repeat of the same
    /// reference.
    Confirmed { booking: Booking, first: bool },
    /// A different reference was already recorded; rejected.
    ReferenceMismatch { existing: String },
    NotConfirmable { status: BookingStatus },
}

/// Outcome of the contact-examiners transition.
#[derive(Debug, Clone)]
pub enum ContactOutcome {
    Contacted {
        booking: Booking,
        candidates: Vec<Candidate>,
    },
    /// Valid, user-facing condition; the booking was cancelled with reason.
    NoExaminersFound { radius_nm: f64, location: String },
    /// The query location could not be resolved; booking cancelled.
    GeocodeFailed { location: String },
    NotContactable { status: BookingStatus },
}

/// Outcome of a cancellation.
#[derive(Debug, Clone)]
pub enum CancelOutcome {
    Cancelled(Booking),
    AlreadyCancelled,
    NotCancellable { status: BookingStatus },
}

/// Outcome of a refund-request parking transition.
#[derive(Debug, Clone)]
pub enum RefundRequestOutcome {
    Requested(Booking),
    NotPaid,
    AlreadyRefunded,
}

/// Outcome of a refund.
#[derive(Debug, Clone)]
pub enum RefundOutcome {
    Refunded {
        booking: Booking,
        /// True when the administrative override path was taken instead of a
        /// gateway-confirmed reversal.
        manual: bool,
        amount_cents: Option<u32>,
    },
    NotPaid,
    AlreadyRefunded,
    /// The gateway declined or failed; booking state is unchanged and the
    /// manual override path remains available.
    GatewayFailed { error: String },
}

/// Facade composing the store, matcher, arbiter, and collaborator
/// boundaries.
pub struct BookingLifecycle<S> {
    store: Arc<S>,
    matcher: GeoMatcher,
    geocoder: Arc<dyn Geocoder>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn NotificationDispatcher>,
    arbiter: AssignmentArbiter<S>,
    refund_lock: Mutex<()>,
}

impl<S> BookingLifecycle<S>
where
    S: BookingStore + 'static,
{
    pub fn new(
        store: Arc<S>,
        directory: Arc<dyn ExaminerDirectory>,
        geocoder: Arc<dyn Geocoder>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        let arbiter = AssignmentArbiter::new(store.clone(), notifier.clone());
        Self {
            store,
            matcher: GeoMatcher::new(directory),
            geocoder,
            gateway,
            notifier,
            arbiter,
            refund_lock: Mutex::new(()),
        }
    }

    /// Caps how many candidates are contacted per booking (never more than
    /// the matcher's hard cap of 3).
    pub fn with_contact_limit(mut self, limit: usize) -> Self {
        self.matcher = self.matcher.with_limit(limit);
        self
    }

    /// Validates and persists a new booking. Initial status is
    /// `PaymentPending` for the payment-first flow (session reference
    /// present) and `Created` otherwise.
    pub fn create_booking(&self, request: BookingRequest) -> Result<Booking, BookingServiceError> {
        request.validate()?;
        let canonical = canonicalize(&request.exam_type);
        let booking = self
            .store
            .insert_booking(request, &canonical, SYSTEM_ACTOR)?;
        info!(booking = %booking.id, exam_type = %booking.exam_type, "booking created");
        Ok(booking)
    }

    /// Applies an externally-verified payment confirmation. Idempotent for a
    /// repeated reference; a mismatched reference on a confirmed booking is
    /// rejected.
    pub fn confirm_payment(
        &self,
        booking_id: BookingId,
        payment_ref: &str,
    ) -> Result<PaymentOutcome, BookingServiceError> {
        match self
            .store
            .confirm_payment(booking_id, payment_ref, SYSTEM_ACTOR)?
        {
            PaymentCommit::Confirmed(booking) => {
                info!(booking = %booking.id, "payment confirmed");
                self.notify(&booking, &NotificationOutcome::PaymentConfirmed);
                Ok(PaymentOutcome::Confirmed {
                    booking,
                    first: true,
                })
            }
            PaymentCommit::AlreadyConfirmed(booking) => Ok(PaymentOutcome::Confirmed {
                booking,
                first: false,
            }),
            PaymentCommit::ReferenceMismatch { existing } => {
                Ok(PaymentOutcome::ReferenceMismatch { existing })
            }
            PaymentCommit::NotConfirmable { status } => {
                Ok(PaymentOutcome::NotConfirmable { status })
            }
        }
    }

    /// Geocodes the preferred location, ranks nearby qualified examiners,
    /// and commits the `ExaminersContacted` transition before fanning out
    /// contact notifications. No candidates (or an unresolvable location)
    /// cancels the booking with a descriptive reason.
    pub fn contact_examiners(
        &self,
        booking_id: BookingId,
    ) -> Result<ContactOutcome, BookingServiceError> {
        let booking = self.require_booking(booking_id)?;

        if !matches!(
            booking.status,
            BookingStatus::Created | BookingStatus::PaymentConfirmed
        ) {
            return Ok(ContactOutcome::NotContactable {
                status: booking.status,
            });
        }

        let Some(origin) = self.geocoder.geocode(&booking.preferred_location) else {
            let reason = format!(
                "unable to geocode preferred location '{}'",
                booking.preferred_location
            );
            warn!(booking = %booking.id, location = %booking.preferred_location, "geocoding failed");
            self.cancel_with_reason(booking_id, &reason)?;
            return Ok(ContactOutcome::GeocodeFailed {
                location: booking.preferred_location,
            });
        };

        let radius_km = nautical_miles_to_km(booking.search_radius_nm);
        let candidates = self
            .matcher
            .find_nearby(origin, radius_km, &booking.exam_type)?;

        if candidates.is_empty() {
            let reason = format!(
                "no qualified examiners found within {} nautical miles",
                booking.search_radius_nm
            );
            warn!(booking = %booking.id, radius_nm = booking.search_radius_nm, "no examiners found");
            self.cancel_with_reason(booking_id, &reason)?;
            return Ok(ContactOutcome::NoExaminersFound {
                radius_nm: booking.search_radius_nm,
                location: booking.preferred_location,
            });
        }

        match self
            .store
            .begin_contact(booking_id, &candidates, SYSTEM_ACTOR)?
        {
            ContactCommit::Contacted(booking) => {
                info!(
                    booking = %booking.id,
                    candidates = candidates.len(),
                    "examiners contacted"
                );
                for candidate in &candidates {
                    if let Err(err) = self.notifier.contact_examiner(candidate, &booking) {
                        warn!(
                            booking = %booking.id,
                            examiner = %candidate.examiner_id,
                            error = %err,
                            "examiner contact notification failed"
                        );
                    }
                }
                Ok(ContactOutcome::Contacted {
                    booking,
                    candidates,
                })
            }
            ContactCommit::NotContactable { status } => {
                Ok(ContactOutcome::NotContactable { status })
            }
        }
    }

    /// Records an examiner's response; accepts race through the arbiter.
    pub fn record_examiner_response(
        &self,
        booking_id: BookingId,
        examiner_id: &ExaminerId,
        decision: ResponseDecision,
        reply: ExaminerReply,
    ) -> Result<ResponseOutcome, BookingServiceError> {
        self.arbiter
            .record_response(booking_id, examiner_id, decision, reply)
    }

    /// Cancels from any non-terminal state; idempotent.
    pub fn cancel(
        &self,
        booking_id: BookingId,
        reason: &str,
        actor: &str,
    ) -> Result<CancelOutcome, BookingServiceError> {
        match self.store.cancel_booking(booking_id, reason, actor)? {
            CancelCommit::Cancelled(booking) => {
                info!(booking = %booking.id, reason, "booking cancelled");
                self.notify(
                    &booking,
                    &NotificationOutcome::Cancelled {
                        reason: reason.to_string(),
                    },
                );
                Ok(CancelOutcome::Cancelled(booking))
            }
            CancelCommit::AlreadyCancelled => Ok(CancelOutcome::AlreadyCancelled),
            CancelCommit::NotCancellable { status } => Ok(CancelOutcome::NotCancellable { status }),
        }
    }

    /// Parks a paid booking in `RefundRequested` ahead of the money moving.
    pub fn request_refund(
        &self,
        booking_id: BookingId,
        reason: &str,
        actor: &str,
    ) -> Result<RefundRequestOutcome, BookingServiceError> {
        match self.store.request_refund(booking_id, reason, actor)? {
            RefundRequestCommit::Requested(booking) => Ok(RefundRequestOutcome::Requested(booking)),
            RefundRequestCommit::NotPaid => Ok(RefundRequestOutcome::NotPaid),
            RefundRequestCommit::AlreadyRefunded => Ok(RefundRequestOutcome::AlreadyRefunded),
        }
    }

    /// Refunds a paid booking. The gateway handles the monetary reversal
    /// unless the manual override path is taken (or no payment reference
    /// exists); gateway failure leaves the booking unchanged and is
    /// surfaced, never absorbed. Refunds serialize within the service so
    /// the gateway sees at most one reversal per booking.
    pub fn refund(
        &self,
        booking_id: BookingId,
        amount_cents: Option<u32>,
        reason: &str,
        manual_override: bool,
        actor: &str,
    ) -> Result<RefundOutcome, BookingServiceError> {
        // The paid check, the gateway call, and the terminal commit must not
        // interleave across callers, or two refunds could both reach the
        // gateway before either commits.
        let _refund_guard = self
            .refund_lock
            .lock()
            .map_err(|_| StoreError::Unavailable("refund lock poisoned".to_string()))?;

        let booking = self.require_booking(booking_id)?;

        if booking.status == BookingStatus::Refunded {
            return Ok(RefundOutcome::AlreadyRefunded);
        }
        if !booking.paid {
            return Ok(RefundOutcome::NotPaid);
        }

        let amount = amount_cents.or(booking.amount_cents);
        let (manual, gateway_ref) = match (&booking.payment_ref, manual_override) {
            (Some(payment_ref), false) => {
                match self.gateway.refund(payment_ref, amount, reason) {
                    Ok(refund) => (false, Some(refund.reference)),
                    Err(err) => {
                        warn!(booking = %booking.id, error = %err, "gateway refund failed");
                        return Ok(RefundOutcome::GatewayFailed {
                            error: err.to_string(),
                        });
                    }
                }
            }
            // No payment reference on record, or an explicit override: the
            // reversal happens outside the system.
            _ => (true, None),
        };

        let record = RefundRecord {
            amount_cents: amount,
            reason: reason.to_string(),
            manual,
            gateway_ref,
        };
        match self.store.mark_refunded(booking_id, record, actor)? {
            RefundCommit::Refunded(booking) => {
                info!(booking = %booking.id, manual, "refund processed");
                self.notify(&booking, &NotificationOutcome::Refunded { manual });
                Ok(RefundOutcome::Refunded {
                    booking,
                    manual,
                    amount_cents: amount,
                })
            }
            RefundCommit::NotPaid => Ok(RefundOutcome::NotPaid),
            RefundCommit::AlreadyRefunded => Ok(RefundOutcome::AlreadyRefunded),
        }
    }

    pub fn get_booking(&self, booking_id: BookingId) -> Result<Option<Booking>, BookingServiceError> {
        Ok(self.store.fetch_booking(booking_id)?)
    }

    pub fn booking_view(
        &self,
        booking_id: BookingId,
    ) -> Result<Option<BookingView>, BookingServiceError> {
        Ok(self
            .store
            .fetch_booking(booking_id)?
            .map(|booking| booking.view()))
    }

    /// True while an examiner can still win the booking.
    pub fn is_assignable(&self, booking_id: BookingId) -> Result<bool, BookingServiceError> {
        let booking = self.require_booking(booking_id)?;
        Ok(booking.status.is_assignable() && booking.assigned_examiner.is_none())
    }

    pub fn active_bookings(&self) -> Result<Vec<Booking>, BookingServiceError> {
        Ok(self.store.active_bookings()?)
    }

    pub fn responses_for(
        &self,
        booking_id: BookingId,
    ) -> Result<Vec<ExaminerResponse>, BookingServiceError> {
        self.require_booking(booking_id)?;
        Ok(self.store.responses_for(booking_id)?)
    }

    pub fn action_log(
        &self,
        booking_id: BookingId,
    ) -> Result<Vec<ActionLogEntry>, BookingServiceError> {
        self.require_booking(booking_id)?;
        Ok(self.store.action_log(booking_id)?)
    }

    fn require_booking(&self, booking_id: BookingId) -> Result<Booking, BookingServiceError> {
        self.store
            .fetch_booking(booking_id)?
            .ok_or(BookingServiceError::Store(StoreError::NotFound))
    }

    fn cancel_with_reason(
        &self,
        booking_id: BookingId,
        reason: &str,
    ) -> Result<(), BookingServiceError> {
        if let CancelCommit::Cancelled(booking) =
            self.store.cancel_booking(booking_id, reason, SYSTEM_ACTOR)?
        {
            self.notify(
                &booking,
                &NotificationOutcome::Cancelled {
                    reason: reason.to_string(),
                },
            );
        }
        Ok(())
    }

    fn notify(&self, booking: &Booking, outcome: &NotificationOutcome) {
        if let Err(err) = self.notifier.notify_outcome(booking, outcome) {
            warn!(booking = %booking.id, error = %err, "outcome notification failed");
        }
    }
}
