//! Great-circle distance matching over the examiner directory.

use std::sync::Arc;

use serde::Serialize;

use super::domain::{Coordinates, Examiner, ExaminerId};
use super::exam_types::has_matching_qualification;
use super::store::StoreError;

/// Mean Earth radius in kilometers, as used by the haversine formula.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// One nautical mile in kilometers.
pub const KM_PER_NAUTICAL_MILE: f64 = 1.852;

/// At most this many candidates are returned per search.
pub const MAX_CANDIDATES: usize = 3;

pub fn nautical_miles_to_km(nm: f64) -> f64 {
    nm * KM_PER_NAUTICAL_MILE
}

/// Haversine great-circle distance between two coordinate pairs, in km.
pub fn haversine_km(a: Coordinates, b: Coordinates) -> f64 {
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2)
        + a.latitude.to_radians().cos() * b.latitude.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_KM * c
}

/// Read-only view of the examiner directory. Coordinate and qualification
/// writes happen in an out-of-band batch job; entries without coordinates are
/// simply excluded from matching.
pub trait ExaminerDirectory: Send + Sync {
    fn examiners(&self) -> Result<Vec<Examiner>, StoreError>;

    fn fetch(&self, id: &ExaminerId) -> Result<Option<Examiner>, StoreError> {
        Ok(self
            .examiners()?
            .into_iter()
            .find(|examiner| &examiner.id == id))
    }
}

/// An examiner eligible to be contacted for a booking, with the computed
/// distance from the query point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub examiner_id: ExaminerId,
    pub name: String,
    pub email: String,
    pub distance_km: f64,
}

/// Ranks eligible examiners by distance from a query coordinate.
pub struct GeoMatcher {
    directory: Arc<dyn ExaminerDirectory>,
    limit: usize,
}

impl GeoMatcher {
    pub fn new(directory: Arc<dyn ExaminerDirectory>) -> Self {
        Self {
            directory,
            limit: MAX_CANDIDATES,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.min(MAX_CANDIDATES);
        self
    }

    /// Returns the nearest qualifying examiners within `radius_km`, nearest
    /// first, capped at the configured limit. An empty exam type skips the
    /// qualification filter ("any qualification accepted"). An empty result
    /// is a valid outcome the caller must surface to the student, not a
    /// fault.
    pub fn find_nearby(
        &self,
        origin: Coordinates,
        radius_km: f64,
        canonical_exam_type: &str,
    ) -> Result<Vec<Candidate>, StoreError> {
        let mut candidates: Vec<Candidate> = Vec::new();

        for examiner in self.directory.examiners()? {
            let Some(coordinates) = examiner.coordinates else {
                continue;
            };
            if examiner.email.trim().is_empty() {
                continue;
            }

            let distance_km = haversine_km(origin, coordinates);
            if distance_km > radius_km {
                continue;
            }
            if !canonical_exam_type.is_empty()
                && !has_matching_qualification(&examiner.qualifications, canonical_exam_type)
            {
                continue;
            }

            candidates.push(Candidate {
                examiner_id: examiner.id,
                name: examiner.display_name,
                email: examiner.email,
                distance_km,
            });
        }

        candidates.sort_by(|a, b| {
            a.distance_km
                .partial_cmp(&b.distance_km)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(self.limit);
        Ok(candidates)
    }
}
