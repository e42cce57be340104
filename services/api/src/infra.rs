use std::io::Cursor;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use checkride::booking::{
    load_examiners, parse_examiners, Booking, Candidate, Examiner, GatewayError, GatewayRefund,
    GazetteerGeocoder, NotificationDispatcher, NotificationOutcome, NotifyError, PaymentGateway,
};
use checkride::config::MatchingConfig;
use checkride::error::AppError;
use metrics_exporter_prometheus::PrometheusHandle;
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Built-in examiner directory used when no CSV is configured. Coordinates
/// cluster around east-central Indiana so the seed airports produce matches.
const SEED_EXAMINERS: &str = "\
id,name,email,latitude,longitude,qualifications,specializations
dpe-101,Marie Holloway,marie.holloway@dpe.example.net,40.1934,-85.3864,DPE-PE-ASEL; DPE-CIRE-ASEL,tailwheel
dpe-102,Glen Okafor,glen.okafor@dpe.example.net,39.7431,-86.2735,DPE-PE; DPE-CE-ASEL,
dpe-103,Rita Vasquez,rita.vasquez@dpe.example.net,39.9150,-84.2300,DPE-CFII; DPE-FIE,mountain checkouts
dpe-104,Hal Brennan,hal.brennan@dpe.example.net,41.9700,-87.9000,DPE-ATP; DPE-ME-AMEL,
dpe-105,June Carver,june.carver@dpe.example.net,40.4850,-86.1500,DPE-PE-ASEL,sport pilot transitions
";

/// Built-in airport gazetteer used when no CSV is configured.
const SEED_AIRPORTS: &str = "\
ident,name,latitude,longitude
KMIE,Delaware County Regional,40.2423,-85.3958
KIND,Indianapolis International,39.7173,-86.2944
KDAY,Dayton International,39.9024,-84.2194
KORD,Chicago O'Hare International,41.9786,-87.9048
KOKK,Kokomo Municipal,40.5282,-86.0590
KCMH,John Glenn Columbus International,39.9980,-82.8919
";

pub(crate) fn load_directory(config: &MatchingConfig) -> Result<Vec<Examiner>, AppError> {
    match &config.examiner_directory {
        Some(path) => Ok(load_examiners(path)?),
        None => {
            let examiners = parse_examiners(Cursor::new(SEED_EXAMINERS))
                .map_err(|err| AppError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, err)))?;
            Ok(examiners)
        }
    }
}

pub(crate) fn load_geocoder(config: &MatchingConfig) -> Result<GazetteerGeocoder, AppError> {
    match &config.airport_gazetteer {
        Some(path) => Ok(GazetteerGeocoder::from_path(path)?),
        None => GazetteerGeocoder::from_reader(Cursor::new(SEED_AIRPORTS))
            .map_err(|err| AppError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, err))),
    }
}

/// Logs every would-be delivery instead of sending anything. Stands in for
/// the email/SMS dispatcher until one is wired up.
#[derive(Default)]
pub(crate) struct LoggingNotifier;

impl NotificationDispatcher for LoggingNotifier {
    fn contact_examiner(&self, candidate: &Candidate, booking: &Booking) -> Result<(), NotifyError> {
        info!(
            booking = %booking.id,
            examiner = %candidate.examiner_id,
            email = %candidate.email,
            distance_km = format!("{:.1}", candidate.distance_km),
            "would contact examiner"
        );
        Ok(())
    }

    fn notify_outcome(
        &self,
        booking: &Booking,
        outcome: &NotificationOutcome,
    ) -> Result<(), NotifyError> {
        info!(booking = %booking.id, ?outcome, "would notify outcome");
        Ok(())
    }
}

/// Acknowledges refunds without moving money. Real deployments swap in a
/// gateway-backed implementation.
#[derive(Default)]
pub(crate) struct AcknowledgingGateway;

impl PaymentGateway for AcknowledgingGateway {
    fn refund(
        &self,
        payment_ref: &str,
        amount_cents: Option<u32>,
        reason: &str,
    ) -> Result<GatewayRefund, GatewayError> {
        info!(payment_ref, ?amount_cents, reason, "acknowledging refund");
        Ok(GatewayRefund {
            reference: format!("re_local_{payment_ref}"),
        })
    }
}
