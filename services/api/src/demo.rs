use std::sync::Arc;

use chrono::{Duration, Utc};
use clap::Args;

use checkride::booking::{
    BookingLifecycle, BookingRequest, ContactOutcome, ExaminerReply, MemoryBookingStore,
    PaymentOutcome, RefundOutcome, ResponseDecision, SchedulePreference, StaticExaminerDirectory,
    StudentContact,
};
use checkride::config::MatchingConfig;
use checkride::error::AppError;

use crate::infra::{load_directory, load_geocoder, AcknowledgingGateway, LoggingNotifier};

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Preferred location (airport identifier). Defaults to KMIE.
    #[arg(long)]
    pub(crate) location: Option<String>,
    /// Exam type as a student would enter it. Defaults to "Private Pilot".
    #[arg(long)]
    pub(crate) exam_type: Option<String>,
    /// Search radius in nautical miles. Defaults to 60.
    #[arg(long)]
    pub(crate) radius_nm: Option<f64>,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let location = args.location.unwrap_or_else(|| "KMIE".to_string());
    let exam_type = args.exam_type.unwrap_or_else(|| "Private Pilot".to_string());
    let radius_nm = args.radius_nm.unwrap_or(60.0);

    let matching = MatchingConfig {
        max_examiners_to_contact: 3,
        examiner_directory: None,
        airport_gazetteer: None,
    };
    let service = BookingLifecycle::new(
        Arc::new(MemoryBookingStore::default()),
        Arc::new(StaticExaminerDirectory::new(load_directory(&matching)?)),
        Arc::new(load_geocoder(&matching)?),
        Arc::new(AcknowledgingGateway),
        Arc::new(LoggingNotifier),
    );

    println!("Checkride booking demo");
    println!("Student: Riley Parker | exam '{exam_type}' near {location} within {radius_nm} nm");

    let booking = service.create_booking(BookingRequest {
        student: StudentContact {
            first_name: "Riley".to_string(),
            last_name: "Parker".to_string(),
            email: "riley.parker@students.example.net".to_string(),
            phone: Some("555-0147".to_string()),
        },
        exam_type,
        preferred_location: location,
        search_radius_nm: radius_nm,
        schedule: SchedulePreference::AsSoonAsPossible,
        amount_cents: Some(80_000),
        payment_session_ref: Some("cs_demo_001".to_string()),
    })?;
    println!("\nCreated {} (status {})", booking.id, booking.status.label());

    match service.confirm_payment(booking.id, "pi_demo_001")? {
        PaymentOutcome::Confirmed { .. } => println!("Payment confirmed (pi_demo_001)"),
        other => {
            println!("Payment not confirmed: {other:?}");
            return Ok(());
        }
    }

    let candidates = match service.contact_examiners(booking.id)? {
        ContactOutcome::Contacted { candidates, .. } => {
            println!("\nContacted {} examiner(s):", candidates.len());
            for candidate in &candidates {
                println!(
                    "  - {} <{}> at {:.1} km",
                    candidate.name, candidate.email, candidate.distance_km
                );
            }
            candidates
        }
        ContactOutcome::NoExaminersFound { radius_nm, location } => {
            println!("No qualified examiners within {radius_nm} nm of {location}; booking cancelled");
            demo_refund(&service, booking.id)?;
            return Ok(());
        }
        ContactOutcome::GeocodeFailed { location } => {
            println!("Could not resolve '{location}'; booking cancelled");
            demo_refund(&service, booking.id)?;
            return Ok(());
        }
        ContactOutcome::NotContactable { status } => {
            println!("Booking not contactable from status '{}'", status.label());
            return Ok(());
        }
    };

    // The furthest candidate declines, then the nearest accepts with a slot.
    if candidates.len() > 1 {
        let decliner = &candidates[candidates.len() - 1];
        let outcome = service.record_examiner_response(
            booking.id,
            &decliner.examiner_id,
            ResponseDecision::Declined,
            ExaminerReply {
                message: Some("Fully booked that month".to_string()),
                ..ExaminerReply::default()
            },
        )?;
        println!("\n{} declined: {}", decliner.name, outcome.message);
    }

    let winner = &candidates[0];
    let outcome = service.record_examiner_response(
        booking.id,
        &winner.examiner_id,
        ResponseDecision::Accepted,
        ExaminerReply {
            message: Some("See you at the FBO".to_string()),
            proposed_datetime: Some(Utc::now() + Duration::days(12)),
            proposed_venue: Some("FBO conference room".to_string()),
            proposed_price_cents: Some(85_000),
        },
    )?;
    println!("{} accepted: {}", winner.name, outcome.message);

    if let Some(view) = service.booking_view(booking.id)? {
        match serde_json::to_string_pretty(&view) {
            Ok(json) => println!("\nBooking state:\n{json}"),
            Err(err) => println!("\nBooking state unavailable: {err}"),
        }
    }

    println!("\nAudit trail:");
    for entry in service.action_log(booking.id)? {
        println!(
            "  [{}] {} ({})",
            entry.at.format("%H:%M:%S"),
            entry.description,
            entry.actor
        );
    }

    Ok(())
}

fn demo_refund(
    service: &BookingLifecycle<MemoryBookingStore>,
    booking_id: checkride::booking::BookingId,
) -> Result<(), AppError> {
    match service.refund(booking_id, None, "no examiner available", false, "demo")? {
        RefundOutcome::Refunded { amount_cents, .. } => {
            println!("Refunded {:?} cents to the student", amount_cents);
        }
        other => println!("Refund not processed: {other:?}"),
    }
    Ok(())
}
