use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Prefix carried by every externally rendered booking tag.
pub const BOOKING_TAG_PREFIX: &str = "BK";

const BOOKING_TAG_DIGITS: usize = 6;

/// Integer-backed booking identity, rendered externally as `BK` plus a
/// zero-padded six-digit decimal (id 42 -> `BK000042`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BookingId(pub u32);

impl BookingId {
    /// Largest id the six-digit tag can carry. Stores refuse to allocate
    /// past it rather than emit tags that fail to parse back.
    pub const MAX: u32 = 999_999;

    pub fn tag(self) -> String {
        format!("{BOOKING_TAG_PREFIX}{:06}", self.0)
    }

    /// Parses an external tag. The prefix is case-sensitive and the numeric
    /// part must be exactly six digits; anything else is malformed.
    pub fn parse_tag(raw: &str) -> Result<Self, BookingIdError> {
        let digits = raw
            .strip_prefix(BOOKING_TAG_PREFIX)
            .ok_or_else(|| BookingIdError(raw.to_string()))?;
        if digits.len() != BOOKING_TAG_DIGITS || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(BookingIdError(raw.to_string()));
        }
        let id = digits
            .parse::<u32>()
            .map_err(|_| BookingIdError(raw.to_string()))?;
        Ok(Self(id))
    }
}

impl fmt::Display for BookingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tag())
    }
}

impl FromStr for BookingId {
    type Err = BookingIdError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Self::parse_tag(raw)
    }
}

impl Serialize for BookingId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.tag())
    }
}

impl<'de> Deserialize<'de> for BookingId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse_tag(&raw).map_err(D::Error::custom)
    }
}

/// Raised when an external booking tag does not match the `BK######` shape.
#[derive(Debug, Clone, thiserror::Error)]
#[error("booking id must be '{BOOKING_TAG_PREFIX}' followed by six digits, got '{0}'")]
pub struct BookingIdError(pub String);

/// Identifier wrapper for directory examiners.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExaminerId(pub String);

impl fmt::Display for ExaminerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Student contact details captured on submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentContact {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
}

impl StudentContact {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Scheduling preference supplied by the student.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SchedulePreference {
    AsSoonAsPossible,
    Window {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

/// Submission payload for a new booking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingRequest {
    pub student: StudentContact,
    pub exam_type: String,
    pub preferred_location: String,
    /// Search radius in nautical miles, as entered by the student.
    pub search_radius_nm: f64,
    pub schedule: SchedulePreference,
    #[serde(default)]
    pub amount_cents: Option<u32>,
    /// Present when the booking was created through the payment-first flow;
    /// persisted so webhook correlation survives restarts.
    #[serde(default)]
    pub payment_session_ref: Option<String>,
}

/// Lifecycle status of a booking. Cancellation and refund are terminal
/// statuses, never row deletions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingStatus {
    Created,
    PaymentPending,
    PaymentConfirmed,
    ExaminersContacted,
    ExaminerAssigned,
    Scheduled,
    Completed,
    Cancelled,
    RefundRequested,
    Refunded,
}

impl BookingStatus {
    pub const fn label(self) -> &'static str {
        match self {
            BookingStatus::Created => "created",
            BookingStatus::PaymentPending => "payment_pending",
            BookingStatus::PaymentConfirmed => "payment_confirmed",
            BookingStatus::ExaminersContacted => "examiners_contacted",
            BookingStatus::ExaminerAssigned => "examiner_assigned",
            BookingStatus::Scheduled => "scheduled",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::RefundRequested => "refund_requested",
            BookingStatus::Refunded => "refunded",
        }
    }

    /// A booking can be won by an examiner only while in one of these states.
    pub const fn is_assignable(self) -> bool {
        matches!(
            self,
            BookingStatus::PaymentConfirmed | BookingStatus::ExaminersContacted
        )
    }

    /// An examiner has already been committed to the booking.
    pub const fn is_assigned(self) -> bool {
        matches!(
            self,
            BookingStatus::ExaminerAssigned | BookingStatus::Scheduled | BookingStatus::Completed
        )
    }

    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            BookingStatus::Completed | BookingStatus::Cancelled | BookingStatus::Refunded
        )
    }
}

/// The central entity owned by the lifecycle/arbiter pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub student: StudentContact,
    /// Exam type exactly as the student typed it.
    pub requested_exam_type: String,
    /// Canonical exam type resolved at creation time.
    pub exam_type: String,
    pub preferred_location: String,
    pub search_radius_nm: f64,
    pub schedule: SchedulePreference,
    pub paid: bool,
    pub payment_ref: Option<String>,
    pub payment_session_ref: Option<String>,
    pub amount_cents: Option<u32>,
    pub status: BookingStatus,
    pub assigned_examiner: Option<ExaminerId>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn view(&self) -> BookingView {
        BookingView {
            booking_id: self.id,
            student_name: self.student.full_name(),
            student_email: self.student.email.clone(),
            exam_type: self.exam_type.clone(),
            preferred_location: self.preferred_location.clone(),
            search_radius_nm: self.search_radius_nm,
            status: self.status.label(),
            paid: self.paid,
            assigned_examiner: self.assigned_examiner.clone(),
            scheduled_at: self.scheduled_at,
            created_at: self.created_at,
        }
    }
}

/// Sanitized booking representation returned by the API.
#[derive(Debug, Clone, Serialize)]
pub struct BookingView {
    pub booking_id: BookingId,
    pub student_name: String,
    pub student_email: String,
    pub exam_type: String,
    pub preferred_location: String,
    pub search_radius_nm: f64,
    pub status: &'static str,
    pub paid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_examiner: Option<ExaminerId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Decision recorded on an examiner response row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseDecision {
    Pending,
    Accepted,
    Declined,
}

impl ResponseDecision {
    pub const fn label(self) -> &'static str {
        match self {
            ResponseDecision::Pending => "pending",
            ResponseDecision::Accepted => "accepted",
            ResponseDecision::Declined => "declined",
        }
    }
}

/// Proposal details carried on an examiner's reply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExaminerReply {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub proposed_datetime: Option<DateTime<Utc>>,
    #[serde(default)]
    pub proposed_venue: Option<String>,
    #[serde(default)]
    pub proposed_price_cents: Option<u32>,
}

/// One record per (booking, examiner) contact attempt. Created as `Pending`
/// when the examiner is contacted, mutated exactly once on response, and
/// immutable thereafter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExaminerResponse {
    pub booking_id: BookingId,
    pub examiner_id: ExaminerId,
    pub examiner_name: String,
    pub examiner_email: String,
    pub decision: ResponseDecision,
    pub contacted_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
    pub reply: ExaminerReply,
    /// Set only by the arbiter's compare-and-commit; at most one per booking.
    pub is_winner: bool,
}

/// Directory entry consumed read-only by the matcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Examiner {
    pub id: ExaminerId,
    pub display_name: String,
    pub email: String,
    pub coordinates: Option<Coordinates>,
    /// Raw qualification field as held in the directory, comma or semicolon
    /// separated (e.g. "DPE-PE-ASEL, DPE-CE").
    pub qualifications: String,
    #[serde(default)]
    pub specializations: Vec<String>,
}

/// Plain WGS84 coordinate pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Audit trail action kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionType {
    BookingCreated,
    PaymentConfirmed,
    ExaminerContacted,
    ResponseReceived,
    ExaminerAssigned,
    StatusChanged,
    RefundProcessed,
    BookingCancelled,
}

impl ActionType {
    pub const fn label(self) -> &'static str {
        match self {
            ActionType::BookingCreated => "booking_created",
            ActionType::PaymentConfirmed => "payment_confirmed",
            ActionType::ExaminerContacted => "examiner_contacted",
            ActionType::ResponseReceived => "response_received",
            ActionType::ExaminerAssigned => "examiner_assigned",
            ActionType::StatusChanged => "status_changed",
            ActionType::RefundProcessed => "refund_processed",
            ActionType::BookingCancelled => "booking_cancelled",
        }
    }
}

/// Append-only audit entry keyed by booking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionLogEntry {
    pub booking_id: BookingId,
    pub action: ActionType,
    pub description: String,
    pub details: BTreeMap<String, String>,
    pub at: DateTime<Utc>,
    pub actor: String,
}

impl ActionLogEntry {
    pub fn new(booking_id: BookingId, action: ActionType, description: impl Into<String>, actor: &str) -> Self {
        Self {
            booking_id,
            action,
            description: description.into(),
            details: BTreeMap::new(),
            at: Utc::now(),
            actor: actor.to_string(),
        }
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<String>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }
}

/// Validation failures rejected at the boundary before any state mutation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ValidationError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("search radius must be positive, got {0}")]
    NonPositiveRadius(f64),
    #[error("scheduling window end precedes start")]
    InvalidWindow,
    #[error("invalid response '{0}': must be 'Accepted' or 'Declined'")]
    InvalidDecision(String),
}

impl BookingRequest {
    /// Checks the required student fields are present before any identity is
    /// allocated.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.student.first_name.trim().is_empty() {
            return Err(ValidationError::MissingField("student.first_name"));
        }
        if self.student.last_name.trim().is_empty() {
            return Err(ValidationError::MissingField("student.last_name"));
        }
        if self.student.email.trim().is_empty() {
            return Err(ValidationError::MissingField("student.email"));
        }
        if self.exam_type.trim().is_empty() {
            return Err(ValidationError::MissingField("exam_type"));
        }
        if self.preferred_location.trim().is_empty() {
            return Err(ValidationError::MissingField("preferred_location"));
        }
        if !(self.search_radius_nm > 0.0) {
            return Err(ValidationError::NonPositiveRadius(self.search_radius_nm));
        }
        if let SchedulePreference::Window { start, end } = self.schedule {
            if end < start {
                return Err(ValidationError::InvalidWindow);
            }
        }
        Ok(())
    }
}
