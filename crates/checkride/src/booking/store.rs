//! Durable-store abstraction for bookings, responses, and the audit trail.
//!
//! Every mutating operation performs its own guard check and commits the row
//! mutations together with the matching audit entry as one transaction. A
//! read-then-write sequence at a call site cannot implement the assignment
//! race correctly; implementations must make `commit_assignment` a single
//! atomic conditional update ("set assigned where still assignable").

use super::domain::{
    ActionLogEntry, Booking, BookingId, BookingRequest, BookingStatus, ExaminerId,
    ExaminerReply, ExaminerResponse,
};
use super::geo::Candidate;

/// Unexpected storage failures. Expected business branches are modeled as
/// commit outcome enums, not errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("booking not found")]
    NotFound,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Result of a conditional payment confirmation.
#[derive(Debug, Clone)]
pub enum PaymentCommit {
    /// First confirmation; booking is now `PaymentConfirmed`.
    Confirmed(Booking),
    /// Same reference seen again; nothing changed.
    AlreadyConfirmed(Booking),
    /// A different reference was already recorded.
    ReferenceMismatch { existing: String },
    /// Booking is in a state that cannot accept a confirmation.
    NotConfirmable { status: BookingStatus },
}

/// Result of committing the contacted-candidates fan-out.
#[derive(Debug, Clone)]
pub enum ContactCommit {
    Contacted(Booking),
    NotContactable { status: BookingStatus },
}

/// Result of recording a decline.
#[derive(Debug, Clone)]
pub enum DeclineCommit {
    /// Row recorded; carries the booking status at commit time so the caller
    /// can phrase the acknowledgement.
    Recorded { status: BookingStatus },
    /// No prior Pending contact row for this (booking, examiner) pair.
    NeverContacted,
    /// The examiner already responded; rows mutate exactly once.
    AlreadyResponded { decision: super::domain::ResponseDecision },
}

/// Result of the atomic assignment attempt.
#[derive(Debug, Clone)]
pub enum AssignmentCommit {
    /// This caller won; the winning response row, booking fields, status,
    /// and audit entry were committed together.
    Won(Booking),
    /// The guard failed. The accept is still recorded (non-winner) for
    /// audit unless the examiner had already responded.
    Lost {
        status: BookingStatus,
        assigned: Option<ExaminerId>,
    },
    NeverContacted,
    AlreadyResponded { decision: super::domain::ResponseDecision },
}

/// Result of a cancellation.
#[derive(Debug, Clone)]
pub enum CancelCommit {
    Cancelled(Booking),
    /// Idempotent success: already cancelled.
    AlreadyCancelled,
    /// Terminal states other than Cancelled refuse further mutation.
    NotCancellable { status: BookingStatus },
}

/// What to record alongside a refund commit.
#[derive(Debug, Clone)]
pub struct RefundRecord {
    pub amount_cents: Option<u32>,
    pub reason: String,
    /// True for the administrative override path; distinguished structurally
    /// from gateway-confirmed refunds in the audit trail.
    pub manual: bool,
    pub gateway_ref: Option<String>,
}

/// Result of a conditional refund status commit.
#[derive(Debug, Clone)]
pub enum RefundCommit {
    Refunded(Booking),
    NotPaid,
    AlreadyRefunded,
}

/// Result of parking a paid booking in `RefundRequested`.
#[derive(Debug, Clone)]
pub enum RefundRequestCommit {
    Requested(Booking),
    NotPaid,
    AlreadyRefunded,
}

pub trait BookingStore: Send + Sync {
    /// Allocates a monotonic identity and persists the new booking. The
    /// initial status is `PaymentPending` when a payment-session reference is
    /// present, `Created` otherwise.
    fn insert_booking(&self, request: BookingRequest, canonical_exam_type: &str, actor: &str)
        -> Result<Booking, StoreError>;

    fn fetch_booking(&self, id: BookingId) -> Result<Option<Booking>, StoreError>;

    /// Bookings still in flight (not terminal), newest first.
    fn active_bookings(&self) -> Result<Vec<Booking>, StoreError>;

    /// Idempotent conditional payment confirmation.
    fn confirm_payment(&self, id: BookingId, payment_ref: &str, actor: &str)
        -> Result<PaymentCommit, StoreError>;

    /// Writes one Pending response row per candidate and moves the booking to
    /// `ExaminersContacted`, guarded on `Created` or `PaymentConfirmed`.
    fn begin_contact(&self, id: BookingId, candidates: &[Candidate], actor: &str)
        -> Result<ContactCommit, StoreError>;

    /// Records a decline. Declines never contend for the assignment; late
    /// declines are still recorded for audit.
    fn record_decline(&self, id: BookingId, examiner: &ExaminerId, reply: ExaminerReply, actor: &str)
        -> Result<DeclineCommit, StoreError>;

    /// The concurrency-critical compare-and-commit: exactly one call per
    /// booking may observe `Won`, regardless of interleaving.
    fn commit_assignment(&self, id: BookingId, examiner: &ExaminerId, reply: ExaminerReply, actor: &str)
        -> Result<AssignmentCommit, StoreError>;

    fn cancel_booking(&self, id: BookingId, reason: &str, actor: &str)
        -> Result<CancelCommit, StoreError>;

    fn request_refund(&self, id: BookingId, reason: &str, actor: &str)
        -> Result<RefundRequestCommit, StoreError>;

    /// Terminal refund commit, guarded on paid and not already refunded.
    fn mark_refunded(&self, id: BookingId, record: RefundRecord, actor: &str)
        -> Result<RefundCommit, StoreError>;

    fn responses_for(&self, id: BookingId) -> Result<Vec<ExaminerResponse>, StoreError>;

    fn action_log(&self, id: BookingId) -> Result<Vec<ActionLogEntry>, StoreError>;

    fn append_log(&self, entry: ActionLogEntry) -> Result<(), StoreError>;
}
