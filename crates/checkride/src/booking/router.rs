//! HTTP surface for the booking API.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use super::arbiter::{parse_decision, ResponseReason};
use super::domain::{BookingId, ExaminerId, ExaminerReply};
use super::lifecycle::{
    BookingLifecycle, BookingServiceError, CancelOutcome, ContactOutcome, PaymentOutcome,
    RefundOutcome,
};
use super::store::{BookingStore, StoreError};

/// Router builder exposing the booking lifecycle over HTTP.
pub fn booking_router<S>(service: Arc<BookingLifecycle<S>>) -> Router
where
    S: BookingStore + 'static,
{
    Router::new()
        .route(
            "/api/v1/bookings",
            post(create_handler::<S>).get(active_handler::<S>),
        )
        .route("/api/v1/bookings/:booking_id", get(get_handler::<S>))
        .route("/api/v1/bookings/:booking_id/log", get(log_handler::<S>))
        .route(
            "/api/v1/bookings/:booking_id/responses",
            post(respond_handler::<S>),
        )
        .route(
            "/api/v1/bookings/:booking_id/cancel",
            post(cancel_handler::<S>),
        )
        .route(
            "/api/v1/bookings/:booking_id/refund",
            post(refund_handler::<S>),
        )
        .route("/api/v1/payments/webhook", post(webhook_handler::<S>))
        .with_state(service)
}

fn service_error(err: BookingServiceError) -> Response {
    let status = match &err {
        BookingServiceError::Validation(_) => StatusCode::BAD_REQUEST,
        BookingServiceError::Store(StoreError::NotFound) => StatusCode::NOT_FOUND,
        BookingServiceError::Store(StoreError::Unavailable(_)) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(json!({ "error": err.to_string() }))).into_response()
}

fn parse_tag(raw: &str) -> Result<BookingId, Response> {
    BookingId::parse_tag(raw).map_err(|err| {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": err.to_string() })),
        )
            .into_response()
    })
}

pub(crate) async fn create_handler<S>(
    State(service): State<Arc<BookingLifecycle<S>>>,
    Json(request): Json<super::domain::BookingRequest>,
) -> Response
where
    S: BookingStore + 'static,
{
    let booking = match service.create_booking(request) {
        Ok(booking) => booking,
        Err(err) => return service_error(err),
    };

    // The payment-first flow waits for the webhook before contacting anyone.
    if booking.status == super::domain::BookingStatus::PaymentPending {
        return (
            StatusCode::ACCEPTED,
            Json(json!({
                "booking_id": booking.id,
                "status": booking.status.label(),
                "message": "Booking created; awaiting payment confirmation.",
            })),
        )
            .into_response();
    }

    match service.contact_examiners(booking.id) {
        Ok(ContactOutcome::Contacted {
            booking,
            candidates,
        }) => {
            let names: Vec<&str> = candidates.iter().map(|c| c.name.as_str()).collect();
            (
                StatusCode::OK,
                Json(json!({
                    "booking_id": booking.id,
                    "status": booking.status.label(),
                    "message": format!(
                        "Booking request sent to {} qualified examiners",
                        candidates.len()
                    ),
                    "examiners_contacted": names,
                })),
            )
                .into_response()
        }
        Ok(ContactOutcome::NoExaminersFound {
            radius_nm,
            location,
        }) => (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "booking_id": booking.id,
                "error": format!(
                    "No qualified examiners found within {radius_nm} nautical miles of {location}"
                ),
            })),
        )
            .into_response(),
        Ok(ContactOutcome::GeocodeFailed { location }) => (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "booking_id": booking.id,
                "error": format!("Unable to find location for: {location}"),
            })),
        )
            .into_response(),
        Ok(ContactOutcome::NotContactable { status }) => (
            StatusCode::CONFLICT,
            Json(json!({
                "booking_id": booking.id,
                "error": format!("booking is not contactable from status '{}'", status.label()),
            })),
        )
            .into_response(),
        Err(err) => service_error(err),
    }
}

pub(crate) async fn active_handler<S>(State(service): State<Arc<BookingLifecycle<S>>>) -> Response
where
    S: BookingStore + 'static,
{
    match service.active_bookings() {
        Ok(bookings) => {
            let views: Vec<_> = bookings.iter().map(super::domain::Booking::view).collect();
            (StatusCode::OK, Json(views)).into_response()
        }
        Err(err) => service_error(err),
    }
}

pub(crate) async fn get_handler<S>(
    State(service): State<Arc<BookingLifecycle<S>>>,
    Path(booking_id): Path<String>,
) -> Response
where
    S: BookingStore + 'static,
{
    let id = match parse_tag(&booking_id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match service.booking_view(id) {
        Ok(Some(view)) => (StatusCode::OK, Json(view)).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("Booking {booking_id} not found") })),
        )
            .into_response(),
        Err(err) => service_error(err),
    }
}

pub(crate) async fn log_handler<S>(
    State(service): State<Arc<BookingLifecycle<S>>>,
    Path(booking_id): Path<String>,
) -> Response
where
    S: BookingStore + 'static,
{
    let id = match parse_tag(&booking_id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match service.action_log(id) {
        Ok(entries) => (StatusCode::OK, Json(entries)).into_response(),
        Err(err) => service_error(err),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ExaminerResponseRequest {
    pub(crate) examiner_id: String,
    /// "Accepted" or "Declined", case-insensitive.
    pub(crate) response: String,
    #[serde(default)]
    pub(crate) message: Option<String>,
    #[serde(default)]
    pub(crate) proposed_datetime: Option<DateTime<Utc>>,
    #[serde(default)]
    pub(crate) proposed_venue: Option<String>,
    #[serde(default)]
    pub(crate) proposed_price_cents: Option<u32>,
}

pub(crate) async fn respond_handler<S>(
    State(service): State<Arc<BookingLifecycle<S>>>,
    Path(booking_id): Path<String>,
    Json(request): Json<ExaminerResponseRequest>,
) -> Response
where
    S: BookingStore + 'static,
{
    let id = match parse_tag(&booking_id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    if request.examiner_id.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "missing required field: examiner_id" })),
        )
            .into_response();
    }
    let decision = match parse_decision(&request.response) {
        Ok(decision) => decision,
        Err(err) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": err.to_string() })),
            )
                .into_response()
        }
    };

    let reply = ExaminerReply {
        message: request.message,
        proposed_datetime: request.proposed_datetime,
        proposed_venue: request.proposed_venue,
        proposed_price_cents: request.proposed_price_cents,
    };
    let examiner = ExaminerId(request.examiner_id);

    match service.record_examiner_response(id, &examiner, decision, reply) {
        Ok(outcome) => {
            let status = match outcome.reason {
                ResponseReason::NeverContacted => StatusCode::UNPROCESSABLE_ENTITY,
                ResponseReason::AlreadyResponded => StatusCode::CONFLICT,
                _ => StatusCode::OK,
            };
            (status, Json(outcome)).into_response()
        }
        Err(err) => service_error(err),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct CancelRequest {
    #[serde(default)]
    pub(crate) reason: Option<String>,
}

pub(crate) async fn cancel_handler<S>(
    State(service): State<Arc<BookingLifecycle<S>>>,
    Path(booking_id): Path<String>,
    Json(request): Json<CancelRequest>,
) -> Response
where
    S: BookingStore + 'static,
{
    let id = match parse_tag(&booking_id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    let reason = request.reason.unwrap_or_else(|| "cancelled via api".to_string());

    match service.cancel(id, &reason, "api") {
        Ok(CancelOutcome::Cancelled(booking)) => (
            StatusCode::OK,
            Json(json!({
                "booking_id": booking.id,
                "status": booking.status.label(),
            })),
        )
            .into_response(),
        Ok(CancelOutcome::AlreadyCancelled) => (
            StatusCode::OK,
            Json(json!({ "booking_id": booking_id, "status": "cancelled" })),
        )
            .into_response(),
        Ok(CancelOutcome::NotCancellable { status }) => (
            StatusCode::CONFLICT,
            Json(json!({
                "error": format!("booking cannot be cancelled from status '{}'", status.label()),
            })),
        )
            .into_response(),
        Err(err) => service_error(err),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RefundRequestBody {
    #[serde(default)]
    pub(crate) amount_cents: Option<u32>,
    #[serde(default)]
    pub(crate) reason: Option<String>,
    /// Forces the administrative override path (no gateway call).
    #[serde(default)]
    pub(crate) manual: bool,
}

pub(crate) async fn refund_handler<S>(
    State(service): State<Arc<BookingLifecycle<S>>>,
    Path(booking_id): Path<String>,
    Json(request): Json<RefundRequestBody>,
) -> Response
where
    S: BookingStore + 'static,
{
    let id = match parse_tag(&booking_id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    let reason = request
        .reason
        .unwrap_or_else(|| "no examiner available".to_string());

    match service.refund(id, request.amount_cents, &reason, request.manual, "admin") {
        Ok(RefundOutcome::Refunded {
            booking,
            manual,
            amount_cents,
        }) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "manual": manual,
                "booking_id": booking.id,
                "refund_amount_cents": amount_cents,
            })),
        )
            .into_response(),
        Ok(RefundOutcome::NotPaid) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Booking is not paid - cannot refund" })),
        )
            .into_response(),
        Ok(RefundOutcome::AlreadyRefunded) => (
            StatusCode::CONFLICT,
            Json(json!({ "error": "Booking already refunded" })),
        )
            .into_response(),
        Ok(RefundOutcome::GatewayFailed { error }) => (
            StatusCode::BAD_GATEWAY,
            Json(json!({
                "success": false,
                "error": error,
                "suggestion": "Retry later, or mark the booking manually refunded once the reversal is processed outside the system.",
            })),
        )
            .into_response(),
        Err(err) => service_error(err),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct PaymentWebhookRequest {
    pub(crate) booking_id: String,
    pub(crate) payment_ref: String,
}

/// Externally-verified "payment succeeded" event. Confirms the payment and
/// then runs the contact-examiners transition; the event is acknowledged
/// even when matching subsequently cancels the booking.
pub(crate) async fn webhook_handler<S>(
    State(service): State<Arc<BookingLifecycle<S>>>,
    Json(event): Json<PaymentWebhookRequest>,
) -> Response
where
    S: BookingStore + 'static,
{
    let id = match parse_tag(&event.booking_id) {
        Ok(id) => id,
        Err(response) => return response,
    };

    match service.confirm_payment(id, &event.payment_ref) {
        Ok(PaymentOutcome::Confirmed { first: false, .. }) => (
            StatusCode::OK,
            Json(json!({ "received": true, "booking_id": event.booking_id, "duplicate": true })),
        )
            .into_response(),
        Ok(PaymentOutcome::Confirmed { first: true, .. }) => {
            let contact = match service.contact_examiners(id) {
                Ok(outcome) => outcome,
                Err(err) => return service_error(err),
            };
            let summary = match contact {
                ContactOutcome::Contacted { candidates, .. } => {
                    json!({ "contacted": candidates.len() })
                }
                ContactOutcome::NoExaminersFound { radius_nm, .. } => {
                    json!({ "contacted": 0, "cancelled": true, "radius_nm": radius_nm })
                }
                ContactOutcome::GeocodeFailed { location } => {
                    json!({ "contacted": 0, "cancelled": true, "location": location })
                }
                ContactOutcome::NotContactable { status } => {
                    json!({ "contacted": 0, "status": status.label() })
                }
            };
            (
                StatusCode::OK,
                Json(json!({
                    "received": true,
                    "booking_id": event.booking_id,
                    "contact": summary,
                })),
            )
                .into_response()
        }
        Ok(PaymentOutcome::ReferenceMismatch { existing }) => (
            StatusCode::CONFLICT,
            Json(json!({
                "error": format!(
                    "payment already confirmed with a different reference '{existing}'"
                ),
            })),
        )
            .into_response(),
        Ok(PaymentOutcome::NotConfirmable { status }) => (
            StatusCode::CONFLICT,
            Json(json!({
                "error": format!(
                    "payment cannot be confirmed from status '{}'",
                    status.label()
                ),
            })),
        )
            .into_response(),
        Err(err) => service_error(err),
    }
}
