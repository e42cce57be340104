//! In-memory reference implementations of the storage and directory traits.
//!
//! `MemoryBookingStore` keeps all booking state behind a single mutex so each
//! trait operation is one transaction: the guard check, row mutations, and
//! audit append commit together or not at all. A SQL-backed store would
//! express the same guards as conditional `UPDATE` statements.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;

use super::domain::{
    ActionLogEntry, ActionType, Booking, BookingId, BookingRequest, BookingStatus, Examiner,
    ExaminerId, ExaminerReply, ExaminerResponse, ResponseDecision,
};
use super::geo::{Candidate, ExaminerDirectory};
use super::store::{
    AssignmentCommit, BookingStore, CancelCommit, ContactCommit, DeclineCommit, PaymentCommit,
    RefundCommit, RefundRecord, RefundRequestCommit, StoreError,
};

#[derive(Default)]
struct StoreInner {
    sequence: u32,
    bookings: HashMap<BookingId, Booking>,
    responses: HashMap<BookingId, Vec<ExaminerResponse>>,
    log: Vec<ActionLogEntry>,
}

#[derive(Default)]
pub struct MemoryBookingStore {
    inner: Mutex<StoreInner>,
}

impl MemoryBookingStore {
    fn lock(&self) -> Result<MutexGuard<'_, StoreInner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Unavailable("store mutex poisoned".to_string()))
    }

    #[cfg(test)]
    pub(super) fn set_sequence(&self, sequence: u32) {
        self.inner.lock().expect("store mutex poisoned").sequence = sequence;
    }
}

impl BookingStore for MemoryBookingStore {
    fn insert_booking(
        &self,
        request: BookingRequest,
        canonical_exam_type: &str,
        actor: &str,
    ) -> Result<Booking, StoreError> {
        let mut inner = self.lock()?;
        if inner.sequence >= BookingId::MAX {
            return Err(StoreError::Unavailable(
                "booking id space exhausted".to_string(),
            ));
        }
        inner.sequence += 1;
        let id = BookingId(inner.sequence);
        let now = Utc::now();

        let status = if request.payment_session_ref.is_some() {
            BookingStatus::PaymentPending
        } else {
            BookingStatus::Created
        };

        let booking = Booking {
            id,
            student: request.student,
            requested_exam_type: request.exam_type.clone(),
            exam_type: canonical_exam_type.to_string(),
            preferred_location: request.preferred_location,
            search_radius_nm: request.search_radius_nm,
            schedule: request.schedule,
            paid: false,
            payment_ref: None,
            payment_session_ref: request.payment_session_ref,
            amount_cents: request.amount_cents,
            status,
            assigned_examiner: None,
            scheduled_at: None,
            created_at: now,
            updated_at: now,
        };

        inner.bookings.insert(id, booking.clone());
        inner.log.push(
            ActionLogEntry::new(id, ActionType::BookingCreated, "booking created", actor)
                .with_detail("exam_type", canonical_exam_type)
                .with_detail("status", status.label()),
        );
        Ok(booking)
    }

    fn fetch_booking(&self, id: BookingId) -> Result<Option<Booking>, StoreError> {
        Ok(self.lock()?.bookings.get(&id).cloned())
    }

    fn active_bookings(&self) -> Result<Vec<Booking>, StoreError> {
        let inner = self.lock()?;
        let mut active: Vec<Booking> = inner
            .bookings
            .values()
            .filter(|booking| !booking.status.is_terminal())
            .cloned()
            .collect();
        active.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(active)
    }

    fn confirm_payment(
        &self,
        id: BookingId,
        payment_ref: &str,
        actor: &str,
    ) -> Result<PaymentCommit, StoreError> {
        let mut inner = self.lock()?;
        let booking = inner.bookings.get_mut(&id).ok_or(StoreError::NotFound)?;

        if booking.paid {
            return match booking.payment_ref.as_deref() {
                Some(existing) if existing == payment_ref => {
                    Ok(PaymentCommit::AlreadyConfirmed(booking.clone()))
                }
                Some(existing) => Ok(PaymentCommit::ReferenceMismatch {
                    existing: existing.to_string(),
                }),
                // paid without a reference means a manual override was
                // recorded; a gateway confirmation no longer applies.
                None => Ok(PaymentCommit::NotConfirmable {
                    status: booking.status,
                }),
            };
        }

        if !matches!(
            booking.status,
            BookingStatus::Created | BookingStatus::PaymentPending
        ) {
            return Ok(PaymentCommit::NotConfirmable {
                status: booking.status,
            });
        }

        booking.paid = true;
        booking.payment_ref = Some(payment_ref.to_string());
        booking.status = BookingStatus::PaymentConfirmed;
        booking.updated_at = Utc::now();
        let committed = booking.clone();

        inner.log.push(
            ActionLogEntry::new(id, ActionType::PaymentConfirmed, "payment confirmed", actor)
                .with_detail("payment_ref", payment_ref),
        );
        Ok(PaymentCommit::Confirmed(committed))
    }

    fn begin_contact(
        &self,
        id: BookingId,
        candidates: &[Candidate],
        actor: &str,
    ) -> Result<ContactCommit, StoreError> {
        let mut inner = self.lock()?;
        let booking = inner.bookings.get_mut(&id).ok_or(StoreError::NotFound)?;

        if !matches!(
            booking.status,
            BookingStatus::Created | BookingStatus::PaymentConfirmed
        ) {
            return Ok(ContactCommit::NotContactable {
                status: booking.status,
            });
        }

        booking.status = BookingStatus::ExaminersContacted;
        booking.updated_at = Utc::now();
        let committed = booking.clone();

        let rows = inner.responses.entry(id).or_default();
        let now = Utc::now();
        for candidate in candidates {
            rows.push(ExaminerResponse {
                booking_id: id,
                examiner_id: candidate.examiner_id.clone(),
                examiner_name: candidate.name.clone(),
                examiner_email: candidate.email.clone(),
                decision: ResponseDecision::Pending,
                contacted_at: now,
                responded_at: None,
                reply: ExaminerReply::default(),
                is_winner: false,
            });
        }
        for candidate in candidates {
            inner.log.push(
                ActionLogEntry::new(id, ActionType::ExaminerContacted, "examiner contacted", actor)
                    .with_detail("examiner", candidate.examiner_id.0.clone())
                    .with_detail("distance_km", format!("{:.1}", candidate.distance_km)),
            );
        }
        Ok(ContactCommit::Contacted(committed))
    }

    fn record_decline(
        &self,
        id: BookingId,
        examiner: &ExaminerId,
        reply: ExaminerReply,
        actor: &str,
    ) -> Result<DeclineCommit, StoreError> {
        let mut inner = self.lock()?;
        if !inner.bookings.contains_key(&id) {
            return Err(StoreError::NotFound);
        }
        let status = inner.bookings[&id].status;

        let Some(row) = inner
            .responses
            .get_mut(&id)
            .and_then(|rows| rows.iter_mut().find(|row| &row.examiner_id == examiner))
        else {
            return Ok(DeclineCommit::NeverContacted);
        };

        if row.decision != ResponseDecision::Pending {
            return Ok(DeclineCommit::AlreadyResponded {
                decision: row.decision,
            });
        }

        row.decision = ResponseDecision::Declined;
        row.responded_at = Some(Utc::now());
        row.reply = reply;

        inner.log.push(
            ActionLogEntry::new(id, ActionType::ResponseReceived, "examiner declined", actor)
                .with_detail("examiner", examiner.0.clone())
                .with_detail("decision", ResponseDecision::Declined.label()),
        );
        Ok(DeclineCommit::Recorded { status })
    }

    fn commit_assignment(
        &self,
        id: BookingId,
        examiner: &ExaminerId,
        reply: ExaminerReply,
        actor: &str,
    ) -> Result<AssignmentCommit, StoreError> {
        let mut inner = self.lock()?;
        let Some(booking) = inner.bookings.get(&id) else {
            return Err(StoreError::NotFound);
        };
        let (status, assigned) = (booking.status, booking.assigned_examiner.clone());

        let Some(rows) = inner.responses.get_mut(&id) else {
            return Ok(AssignmentCommit::NeverContacted);
        };
        let Some(row) = rows.iter_mut().find(|row| &row.examiner_id == examiner) else {
            return Ok(AssignmentCommit::NeverContacted);
        };
        if row.decision != ResponseDecision::Pending {
            return Ok(AssignmentCommit::AlreadyResponded {
                decision: row.decision,
            });
        }

        let now = Utc::now();
        row.decision = ResponseDecision::Accepted;
        row.responded_at = Some(now);
        row.reply = reply.clone();

        // The guard: still assignable and nobody committed yet. Everything
        // below it commits under the same lock that checked it.
        if !(status.is_assignable() && assigned.is_none()) {
            inner.log.push(
                ActionLogEntry::new(id, ActionType::ResponseReceived, "examiner accepted", actor)
                    .with_detail("examiner", examiner.0.clone())
                    .with_detail("outcome", "lost")
                    .with_detail("status", status.label()),
            );
            return Ok(AssignmentCommit::Lost { status, assigned });
        }

        row.is_winner = true;
        let booking = inner.bookings.get_mut(&id).ok_or(StoreError::NotFound)?;
        booking.assigned_examiner = Some(examiner.clone());
        booking.scheduled_at = reply.proposed_datetime;
        booking.status = if reply.proposed_datetime.is_some() {
            BookingStatus::Scheduled
        } else {
            BookingStatus::ExaminerAssigned
        };
        booking.updated_at = now;
        let committed = booking.clone();

        inner.log.push(
            ActionLogEntry::new(id, ActionType::ExaminerAssigned, "examiner assigned", actor)
                .with_detail("examiner", examiner.0.clone())
                .with_detail("status", committed.status.label()),
        );
        Ok(AssignmentCommit::Won(committed))
    }

    fn cancel_booking(
        &self,
        id: BookingId,
        reason: &str,
        actor: &str,
    ) -> Result<CancelCommit, StoreError> {
        let mut inner = self.lock()?;
        let booking = inner.bookings.get_mut(&id).ok_or(StoreError::NotFound)?;

        match booking.status {
            BookingStatus::Cancelled => return Ok(CancelCommit::AlreadyCancelled),
            BookingStatus::Completed | BookingStatus::Refunded => {
                return Ok(CancelCommit::NotCancellable {
                    status: booking.status,
                })
            }
            _ => {}
        }

        booking.status = BookingStatus::Cancelled;
        booking.updated_at = Utc::now();
        let committed = booking.clone();

        inner.log.push(
            ActionLogEntry::new(id, ActionType::BookingCancelled, "booking cancelled", actor)
                .with_detail("reason", reason),
        );
        Ok(CancelCommit::Cancelled(committed))
    }

    fn request_refund(
        &self,
        id: BookingId,
        reason: &str,
        actor: &str,
    ) -> Result<RefundRequestCommit, StoreError> {
        let mut inner = self.lock()?;
        let booking = inner.bookings.get_mut(&id).ok_or(StoreError::NotFound)?;

        if booking.status == BookingStatus::Refunded {
            return Ok(RefundRequestCommit::AlreadyRefunded);
        }
        if !booking.paid {
            return Ok(RefundRequestCommit::NotPaid);
        }
        if booking.status == BookingStatus::RefundRequested {
            return Ok(RefundRequestCommit::Requested(booking.clone()));
        }

        booking.status = BookingStatus::RefundRequested;
        booking.updated_at = Utc::now();
        let committed = booking.clone();

        inner.log.push(
            ActionLogEntry::new(id, ActionType::StatusChanged, "refund requested", actor)
                .with_detail("reason", reason),
        );
        Ok(RefundRequestCommit::Requested(committed))
    }

    fn mark_refunded(
        &self,
        id: BookingId,
        record: RefundRecord,
        actor: &str,
    ) -> Result<RefundCommit, StoreError> {
        let mut inner = self.lock()?;
        let booking = inner.bookings.get_mut(&id).ok_or(StoreError::NotFound)?;

        if booking.status == BookingStatus::Refunded {
            return Ok(RefundCommit::AlreadyRefunded);
        }
        if !booking.paid {
            return Ok(RefundCommit::NotPaid);
        }

        booking.status = BookingStatus::Refunded;
        booking.updated_at = Utc::now();
        let committed = booking.clone();

        let mut entry =
            ActionLogEntry::new(id, ActionType::RefundProcessed, "refund processed", actor)
                .with_detail("manual", if record.manual { "true" } else { "false" })
                .with_detail("reason", record.reason);
        if let Some(amount) = record.amount_cents {
            entry = entry.with_detail("amount_cents", amount.to_string());
        }
        if let Some(gateway_ref) = record.gateway_ref {
            entry = entry.with_detail("gateway_ref", gateway_ref);
        }
        inner.log.push(entry);
        Ok(RefundCommit::Refunded(committed))
    }

    fn responses_for(&self, id: BookingId) -> Result<Vec<ExaminerResponse>, StoreError> {
        Ok(self.lock()?.responses.get(&id).cloned().unwrap_or_default())
    }

    fn action_log(&self, id: BookingId) -> Result<Vec<ActionLogEntry>, StoreError> {
        Ok(self
            .lock()?
            .log
            .iter()
            .filter(|entry| entry.booking_id == id)
            .cloned()
            .collect())
    }

    fn append_log(&self, entry: ActionLogEntry) -> Result<(), StoreError> {
        self.lock()?.log.push(entry);
        Ok(())
    }
}

/// Directory backed by a fixed examiner list, loaded at startup.
#[derive(Default, Clone)]
pub struct StaticExaminerDirectory {
    examiners: Arc<Vec<Examiner>>,
}

impl StaticExaminerDirectory {
    pub fn new(examiners: Vec<Examiner>) -> Self {
        Self {
            examiners: Arc::new(examiners),
        }
    }

    pub fn len(&self) -> usize {
        self.examiners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examiners.is_empty()
    }
}

impl ExaminerDirectory for StaticExaminerDirectory {
    fn examiners(&self) -> Result<Vec<Examiner>, StoreError> {
        Ok(self.examiners.as_ref().clone())
    }
}
