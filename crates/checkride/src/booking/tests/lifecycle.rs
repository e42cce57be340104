use std::sync::Arc;
use std::thread;

use super::common::*;
use crate::booking::domain::{
    ActionType, BookingId, BookingStatus, ResponseDecision, SchedulePreference, ValidationError,
};
use crate::booking::lifecycle::{
    BookingLifecycle, BookingServiceError, CancelOutcome, ContactOutcome, PaymentOutcome,
    RefundOutcome, RefundRequestOutcome,
};
use crate::booking::memory::{MemoryBookingStore, StaticExaminerDirectory};
use crate::booking::store::{BookingStore, StoreError};
use chrono::{Duration, Utc};

#[test]
fn create_rejects_missing_student_email() {
    let fixture = build_lifecycle();
    let mut request = booking_request();
    request.student.email = "  ".to_string();

    match fixture.service.create_booking(request) {
        Err(BookingServiceError::Validation(ValidationError::MissingField("student.email"))) => {}
        other => panic!("expected missing-field error, got {other:?}"),
    }
}

#[test]
fn create_rejects_non_positive_radius() {
    let fixture = build_lifecycle();
    let mut request = booking_request();
    request.search_radius_nm = 0.0;

    match fixture.service.create_booking(request) {
        Err(BookingServiceError::Validation(ValidationError::NonPositiveRadius(_))) => {}
        other => panic!("expected radius error, got {other:?}"),
    }
}

#[test]
fn create_rejects_inverted_scheduling_window() {
    let fixture = build_lifecycle();
    let mut request = booking_request();
    let start = Utc::now();
    request.schedule = SchedulePreference::Window {
        start,
        end: start - Duration::hours(1),
    };

    match fixture.service.create_booking(request) {
        Err(BookingServiceError::Validation(ValidationError::InvalidWindow)) => {}
        other => panic!("expected window error, got {other:?}"),
    }
}

#[test]
fn create_canonicalizes_the_exam_type_and_keeps_the_original() {
    let fixture = build_lifecycle();
    let mut request = booking_request();
    request.exam_type = "Private Pilot Single Engine Land".to_string();

    let booking = fixture.service.create_booking(request).expect("creates");
    assert_eq!(booking.exam_type, "Private");
    assert_eq!(booking.requested_exam_type, "Private Pilot Single Engine Land");
    assert_eq!(booking.status, BookingStatus::Created);
    assert_eq!(booking.id.tag(), "BK000001");
}

#[test]
fn payment_session_reference_starts_the_payment_first_flow() {
    let fixture = build_lifecycle();
    let mut request = booking_request();
    request.payment_session_ref = Some("cs_test_123".to_string());

    let booking = fixture.service.create_booking(request).expect("creates");
    assert_eq!(booking.status, BookingStatus::PaymentPending);
    assert!(!booking.paid);
}

#[test]
fn payment_confirmation_is_idempotent_for_the_same_reference() {
    let fixture = build_lifecycle();
    let booking = fixture
        .service
        .create_booking(booking_request())
        .expect("creates");

    let first = fixture
        .service
        .confirm_payment(booking.id, "pi_abc")
        .expect("confirms");
    match first {
        PaymentOutcome::Confirmed { ref booking, first } => {
            assert!(first);
            assert!(booking.paid);
            assert_eq!(booking.status, BookingStatus::PaymentConfirmed);
        }
        other => panic!("expected confirmation, got {other:?}"),
    }

    let repeat = fixture
        .service
        .confirm_payment(booking.id, "pi_abc")
        .expect("repeat succeeds");
    match repeat {
        PaymentOutcome::Confirmed { ref booking, first } => {
            assert!(!first);
            assert_eq!(booking.payment_ref.as_deref(), Some("pi_abc"));
        }
        other => panic!("expected idempotent confirmation, got {other:?}"),
    }

    // Only the first confirmation notifies or logs.
    assert_eq!(
        fixture
            .notifier
            .outcome_kinds()
            .iter()
            .filter(|kind| kind.as_str() == "payment_confirmed")
            .count(),
        1
    );
    let log = fixture.service.action_log(booking.id).expect("log reads");
    assert_eq!(
        log.iter()
            .filter(|entry| entry.action == ActionType::PaymentConfirmed)
            .count(),
        1
    );
}

#[test]
fn mismatched_payment_reference_is_rejected() {
    let fixture = build_lifecycle();
    let booking = fixture
        .service
        .create_booking(booking_request())
        .expect("creates");
    fixture
        .service
        .confirm_payment(booking.id, "pi_abc")
        .expect("confirms");

    match fixture.service.confirm_payment(booking.id, "pi_other") {
        Ok(PaymentOutcome::ReferenceMismatch { existing }) => assert_eq!(existing, "pi_abc"),
        other => panic!("expected mismatch, got {other:?}"),
    }

    let stored = fixture
        .service
        .get_booking(booking.id)
        .expect("fetch succeeds")
        .expect("present");
    assert_eq!(stored.payment_ref.as_deref(), Some("pi_abc"));
}

#[test]
fn contact_ranks_and_records_nearby_examiners() {
    let fixture = build_lifecycle();
    let booking = fixture
        .service
        .create_booking(booking_request())
        .expect("creates");

    let outcome = fixture
        .service
        .contact_examiners(booking.id)
        .expect("contact succeeds");
    let candidates = match outcome {
        ContactOutcome::Contacted { booking, candidates } => {
            assert_eq!(booking.status, BookingStatus::ExaminersContacted);
            candidates
        }
        other => panic!("expected contact, got {other:?}"),
    };

    // 120 km exceeds the 50 nm radius; only the two close examiners qualify.
    let ids: Vec<&str> = candidates.iter().map(|c| c.examiner_id.0.as_str()).collect();
    assert_eq!(ids, vec!["dpe-close", "dpe-mid"]);
    assert_eq!(fixture.notifier.contacted().len(), 2);

    let responses = fixture.service.responses_for(booking.id).expect("responses");
    assert_eq!(responses.len(), 2);
    assert!(responses
        .iter()
        .all(|row| row.decision == ResponseDecision::Pending && !row.is_winner));
}

#[test]
fn unresolvable_location_cancels_the_booking() {
    let fixture = build_lifecycle();
    let mut request = booking_request();
    request.preferred_location = "Nowhere Field".to_string();
    let booking = fixture.service.create_booking(request).expect("creates");

    match fixture.service.contact_examiners(booking.id) {
        Ok(ContactOutcome::GeocodeFailed { location }) => {
            assert_eq!(location, "Nowhere Field");
        }
        other => panic!("expected geocode failure, got {other:?}"),
    }

    let stored = fixture
        .service
        .get_booking(booking.id)
        .expect("fetch succeeds")
        .expect("present");
    assert_eq!(stored.status, BookingStatus::Cancelled);

    let log = fixture.service.action_log(booking.id).expect("log reads");
    let cancellation = log
        .iter()
        .find(|entry| entry.action == ActionType::BookingCancelled)
        .expect("cancellation logged");
    assert!(cancellation.details["reason"].contains("unable to geocode"));
}

#[test]
fn empty_match_result_cancels_with_a_descriptive_reason() {
    let fixture = build_lifecycle();
    let mut request = booking_request();
    request.search_radius_nm = 0.5;
    let booking = fixture.service.create_booking(request).expect("creates");

    match fixture.service.contact_examiners(booking.id) {
        Ok(ContactOutcome::NoExaminersFound { radius_nm, .. }) => {
            assert!((radius_nm - 0.5).abs() < 1e-9);
        }
        other => panic!("expected empty match, got {other:?}"),
    }

    let stored = fixture
        .service
        .get_booking(booking.id)
        .expect("fetch succeeds")
        .expect("present");
    assert_eq!(stored.status, BookingStatus::Cancelled);

    let log = fixture.service.action_log(booking.id).expect("log reads");
    let cancellation = log
        .iter()
        .find(|entry| entry.action == ActionType::BookingCancelled)
        .expect("cancellation logged");
    assert!(cancellation.details["reason"].contains("no qualified examiners"));
}

#[test]
fn contact_is_rejected_after_examiners_were_already_contacted() {
    let fixture = build_lifecycle();
    let booking = fixture
        .service
        .create_booking(booking_request())
        .expect("creates");
    fixture
        .service
        .contact_examiners(booking.id)
        .expect("first contact");

    match fixture.service.contact_examiners(booking.id) {
        Ok(ContactOutcome::NotContactable { status }) => {
            assert_eq!(status, BookingStatus::ExaminersContacted);
        }
        other => panic!("expected not-contactable, got {other:?}"),
    }
}

#[test]
fn failed_notifications_never_roll_back_the_transition() {
    let store = Arc::new(MemoryBookingStore::default());
    let gateway = Arc::new(TestGateway::default());
    let geocoder = MapGeocoder::default().with("KMIE", origin());
    let service = BookingLifecycle::new(
        store.clone(),
        Arc::new(StaticExaminerDirectory::new(seed_examiners())),
        Arc::new(geocoder),
        gateway,
        Arc::new(FailingNotifier),
    );

    let booking = service.create_booking(booking_request()).expect("creates");
    let outcome = service
        .contact_examiners(booking.id)
        .expect("contact commits despite delivery failures");
    assert!(matches!(outcome, ContactOutcome::Contacted { .. }));

    let stored = store
        .fetch_booking(booking.id)
        .expect("fetch succeeds")
        .expect("present");
    assert_eq!(stored.status, BookingStatus::ExaminersContacted);
}

#[test]
fn cancellation_is_idempotent() {
    let fixture = build_lifecycle();
    let booking = fixture
        .service
        .create_booking(booking_request())
        .expect("creates");

    match fixture
        .service
        .cancel(booking.id, "student request", "student")
    {
        Ok(CancelOutcome::Cancelled(cancelled)) => {
            assert_eq!(cancelled.status, BookingStatus::Cancelled);
        }
        other => panic!("expected cancellation, got {other:?}"),
    }

    match fixture.service.cancel(booking.id, "again", "student") {
        Ok(CancelOutcome::AlreadyCancelled) => {}
        other => panic!("expected idempotent cancel, got {other:?}"),
    }
}

#[test]
fn refund_goes_through_the_gateway_by_default() {
    let fixture = build_lifecycle();
    let booking = fixture
        .service
        .create_booking(booking_request())
        .expect("creates");
    fixture
        .service
        .confirm_payment(booking.id, "pi_abc")
        .expect("confirms");

    match fixture
        .service
        .refund(booking.id, None, "no examiner available", false, "admin")
    {
        Ok(RefundOutcome::Refunded {
            booking,
            manual,
            amount_cents,
        }) => {
            assert!(!manual);
            assert_eq!(amount_cents, Some(75_000));
            assert_eq!(booking.status, BookingStatus::Refunded);
        }
        other => panic!("expected refund, got {other:?}"),
    }
    assert_eq!(fixture.gateway.refund_calls(), 1);

    let log = fixture.service.action_log(booking.id).expect("log reads");
    let refund = log
        .iter()
        .find(|entry| entry.action == ActionType::RefundProcessed)
        .expect("refund logged");
    assert_eq!(refund.details["manual"], "false");
    assert_eq!(refund.details["gateway_ref"], "re_pi_abc");
}

#[test]
fn manual_override_skips_the_gateway() {
    let fixture = build_lifecycle();
    let booking = fixture
        .service
        .create_booking(booking_request())
        .expect("creates");
    fixture
        .service
        .confirm_payment(booking.id, "pi_abc")
        .expect("confirms");

    match fixture
        .service
        .refund(booking.id, Some(50_000), "processed by phone", true, "admin")
    {
        Ok(RefundOutcome::Refunded { manual, amount_cents, .. }) => {
            assert!(manual);
            assert_eq!(amount_cents, Some(50_000));
        }
        other => panic!("expected manual refund, got {other:?}"),
    }
    assert_eq!(fixture.gateway.refund_calls(), 0);

    let log = fixture.service.action_log(booking.id).expect("log reads");
    let refund = log
        .iter()
        .find(|entry| entry.action == ActionType::RefundProcessed)
        .expect("refund logged");
    assert_eq!(refund.details["manual"], "true");
    assert!(!refund.details.contains_key("gateway_ref"));
}

#[test]
fn gateway_failure_leaves_the_booking_refundable() {
    let fixture = build_lifecycle_with(seed_examiners(), TestGateway::failing());
    let booking = fixture
        .service
        .create_booking(booking_request())
        .expect("creates");
    fixture
        .service
        .confirm_payment(booking.id, "pi_abc")
        .expect("confirms");

    match fixture
        .service
        .refund(booking.id, None, "no examiner available", false, "admin")
    {
        Ok(RefundOutcome::GatewayFailed { error }) => {
            assert!(error.contains("card network declined"));
        }
        other => panic!("expected gateway failure, got {other:?}"),
    }

    let stored = fixture
        .service
        .get_booking(booking.id)
        .expect("fetch succeeds")
        .expect("present");
    assert!(stored.paid);
    assert_ne!(stored.status, BookingStatus::Refunded);

    // The manual path is still open after the gateway declined.
    match fixture
        .service
        .refund(booking.id, None, "reversed outside the system", true, "admin")
    {
        Ok(RefundOutcome::Refunded { manual, .. }) => assert!(manual),
        other => panic!("expected manual refund, got {other:?}"),
    }
}

#[test]
fn refund_requires_a_paid_booking_and_happens_once() {
    let fixture = build_lifecycle();
    let booking = fixture
        .service
        .create_booking(booking_request())
        .expect("creates");

    match fixture
        .service
        .refund(booking.id, None, "early exit", false, "admin")
    {
        Ok(RefundOutcome::NotPaid) => {}
        other => panic!("expected not-paid, got {other:?}"),
    }

    fixture
        .service
        .confirm_payment(booking.id, "pi_abc")
        .expect("confirms");
    fixture
        .service
        .refund(booking.id, None, "no examiner available", false, "admin")
        .expect("refunds");

    match fixture
        .service
        .refund(booking.id, None, "again", false, "admin")
    {
        Ok(RefundOutcome::AlreadyRefunded) => {}
        other => panic!("expected already-refunded, got {other:?}"),
    }
}

#[test]
fn concurrent_refunds_move_money_once() {
    const CALLERS: usize = 8;

    let fixture = build_lifecycle();
    let booking = fixture
        .service
        .create_booking(booking_request())
        .expect("creates");
    fixture
        .service
        .confirm_payment(booking.id, "pi_abc")
        .expect("confirms");

    let handles: Vec<_> = (0..CALLERS)
        .map(|_| {
            let service = fixture.service.clone();
            let booking_id = booking.id;
            thread::spawn(move || {
                service
                    .refund(booking_id, None, "no examiner available", false, "admin")
                    .expect("refund call completes")
            })
        })
        .collect();
    let outcomes: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().expect("thread completes"))
        .collect();

    let refunded = outcomes
        .iter()
        .filter(|outcome| matches!(outcome, RefundOutcome::Refunded { .. }))
        .count();
    assert_eq!(refunded, 1, "exactly one caller may move the money");
    assert!(outcomes.iter().all(|outcome| matches!(
        outcome,
        RefundOutcome::Refunded { .. } | RefundOutcome::AlreadyRefunded
    )));
    assert_eq!(fixture.gateway.refund_calls(), 1);
}

#[test]
fn refunded_bookings_are_terminal() {
    let fixture = build_lifecycle();
    let booking = fixture
        .service
        .create_booking(booking_request())
        .expect("creates");
    fixture
        .service
        .confirm_payment(booking.id, "pi_abc")
        .expect("confirms");
    fixture
        .service
        .refund(booking.id, None, "no examiner available", false, "admin")
        .expect("refunds");

    match fixture.service.cancel(booking.id, "too late", "admin") {
        Ok(CancelOutcome::NotCancellable { status }) => {
            assert_eq!(status, BookingStatus::Refunded);
        }
        other => panic!("expected terminal booking, got {other:?}"),
    }
    assert!(!fixture
        .service
        .active_bookings()
        .expect("list reads")
        .iter()
        .any(|active| active.id == booking.id));
}

#[test]
fn refund_request_parks_the_booking_before_the_money_moves() {
    let fixture = build_lifecycle();
    let booking = fixture
        .service
        .create_booking(booking_request())
        .expect("creates");

    match fixture
        .service
        .request_refund(booking.id, "examiner unavailable", "admin")
    {
        Ok(RefundRequestOutcome::NotPaid) => {}
        other => panic!("expected not-paid, got {other:?}"),
    }

    fixture
        .service
        .confirm_payment(booking.id, "pi_abc")
        .expect("confirms");
    match fixture
        .service
        .request_refund(booking.id, "examiner unavailable", "admin")
    {
        Ok(RefundRequestOutcome::Requested(parked)) => {
            assert_eq!(parked.status, BookingStatus::RefundRequested);
        }
        other => panic!("expected refund request, got {other:?}"),
    }

    match fixture
        .service
        .refund(booking.id, None, "examiner unavailable", false, "admin")
    {
        Ok(RefundOutcome::Refunded { booking, .. }) => {
            assert_eq!(booking.status, BookingStatus::Refunded);
        }
        other => panic!("expected refund, got {other:?}"),
    }
}

#[test]
fn active_listing_is_newest_first_and_skips_terminal_bookings() {
    let fixture = build_lifecycle();
    let first = fixture
        .service
        .create_booking(booking_request())
        .expect("creates");
    let second = fixture
        .service
        .create_booking(booking_request())
        .expect("creates");
    fixture
        .service
        .cancel(first.id, "student request", "student")
        .expect("cancels");

    let active = fixture.service.active_bookings().expect("list reads");
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, second.id);
}

#[test]
fn lookups_on_unknown_bookings_fail_with_not_found() {
    let fixture = build_lifecycle();
    match fixture.service.action_log(BookingId(999)) {
        Err(BookingServiceError::Store(StoreError::NotFound)) => {}
        other => panic!("expected not-found, got {other:?}"),
    }
}

#[test]
fn id_allocation_stops_at_the_tag_ceiling() {
    let fixture = build_lifecycle();
    fixture.store.set_sequence(BookingId::MAX - 1);

    let last = fixture
        .service
        .create_booking(booking_request())
        .expect("creates");
    assert_eq!(last.id.tag(), "BK999999");
    assert_eq!(BookingId::parse_tag("BK999999").expect("parses"), last.id);

    match fixture.service.create_booking(booking_request()) {
        Err(BookingServiceError::Store(StoreError::Unavailable(message))) => {
            assert!(message.contains("id space"));
        }
        other => panic!("expected exhausted id space, got {other:?}"),
    }
}

#[test]
fn booking_tags_round_trip_and_reject_malformed_input() {
    let id = BookingId(42);
    assert_eq!(id.tag(), "BK000042");
    assert_eq!(BookingId::parse_tag("BK000042").expect("parses"), id);

    for malformed in ["XX000042", "BK42", "bk000042", "BK0000421", "BK00004a", ""] {
        assert!(
            BookingId::parse_tag(malformed).is_err(),
            "{malformed:?} should be rejected"
        );
    }
}
