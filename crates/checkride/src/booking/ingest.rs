//! CSV ingestion for the examiner directory and the airport gazetteer.
//!
//! Both files are read once at startup. Rows are permissive where the
//! upstream exports are sloppy: blank coordinates on an examiner keep the
//! row (such examiners simply never match), while a gazetteer row without
//! coordinates is useless and is skipped.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Deserializer};
use tracing::debug;

use super::domain::{Coordinates, Examiner, ExaminerId};
use super::collaborators::Geocoder;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: csv::Error,
    },
}

#[derive(Debug, Deserialize)]
struct ExaminerRow {
    id: String,
    name: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    email: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    latitude: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    longitude: Option<String>,
    #[serde(default)]
    qualifications: String,
    #[serde(default)]
    specializations: String,
}

impl ExaminerRow {
    fn coordinates(&self) -> Option<Coordinates> {
        let latitude = self.latitude.as_deref()?.parse().ok()?;
        let longitude = self.longitude.as_deref()?.parse().ok()?;
        Some(Coordinates {
            latitude,
            longitude,
        })
    }
}

/// Reads `id,name,email,latitude,longitude,qualifications,specializations`
/// rows into examiner records.
pub fn parse_examiners<R: Read>(reader: R) -> Result<Vec<Examiner>, csv::Error> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut examiners = Vec::new();

    for record in csv_reader.deserialize::<ExaminerRow>() {
        let row = record?;
        let coordinates = row.coordinates();
        let specializations = row
            .specializations
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        examiners.push(Examiner {
            id: ExaminerId(row.id),
            display_name: row.name,
            email: row.email.unwrap_or_default(),
            coordinates,
            qualifications: row.qualifications,
            specializations,
        });
    }

    Ok(examiners)
}

pub fn load_examiners(path: &Path) -> Result<Vec<Examiner>, IngestError> {
    let file = File::open(path).map_err(|source| IngestError::Open {
        path: path.display().to_string(),
        source,
    })?;
    let examiners = parse_examiners(file).map_err(|source| IngestError::Parse {
        path: path.display().to_string(),
        source,
    })?;
    debug!(count = examiners.len(), path = %path.display(), "loaded examiner directory");
    Ok(examiners)
}

#[derive(Debug, Deserialize)]
struct GazetteerRow {
    ident: String,
    #[serde(default)]
    name: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    latitude: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    longitude: Option<String>,
}

/// Offline geocoder backed by an airport gazetteer CSV
/// (`ident,name,latitude,longitude`). Lookup tries the airport identifier
/// first, then the airport name, both case-insensitively.
pub struct GazetteerGeocoder {
    by_ident: HashMap<String, Coordinates>,
    by_name: HashMap<String, Coordinates>,
}

impl GazetteerGeocoder {
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, csv::Error> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut by_ident = HashMap::new();
        let mut by_name = HashMap::new();

        for record in csv_reader.deserialize::<GazetteerRow>() {
            let row = record?;
            let coordinates = match (
                row.latitude.as_deref().and_then(|v| v.parse().ok()),
                row.longitude.as_deref().and_then(|v| v.parse().ok()),
            ) {
                (Some(latitude), Some(longitude)) => Coordinates {
                    latitude,
                    longitude,
                },
                _ => continue,
            };
            by_ident.insert(row.ident.to_ascii_uppercase(), coordinates);
            if !row.name.is_empty() {
                by_name.insert(row.name.to_ascii_lowercase(), coordinates);
            }
        }

        Ok(Self { by_ident, by_name })
    }

    pub fn from_path(path: &Path) -> Result<Self, IngestError> {
        let file = File::open(path).map_err(|source| IngestError::Open {
            path: path.display().to_string(),
            source,
        })?;
        let geocoder = Self::from_reader(file).map_err(|source| IngestError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        debug!(
            idents = geocoder.by_ident.len(),
            path = %path.display(),
            "loaded airport gazetteer"
        );
        Ok(geocoder)
    }

    pub fn len(&self) -> usize {
        self.by_ident.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_ident.is_empty()
    }
}

impl Geocoder for GazetteerGeocoder {
    fn geocode(&self, address: &str) -> Option<Coordinates> {
        let trimmed = address.trim();
        if trimmed.is_empty() {
            return None;
        }
        if let Some(found) = self.by_ident.get(&trimmed.to_ascii_uppercase()) {
            return Some(*found);
        }
        self.by_name.get(&trimmed.to_ascii_lowercase()).copied()
    }
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}
