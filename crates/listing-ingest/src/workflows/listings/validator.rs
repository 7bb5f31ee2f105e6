use super::normalizer::NormalizationError;
use super::record::NormalizedRecord;
use super::schema::ListingField;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

pub const EARLIEST_YEAR_BUILT: i64 = 1600;

/// What to do when two rows of one file resolve to the same identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicatePolicy {
    /// The later row in file order replaces the earlier one, mirroring the sinks' upserts.
    #[default]
    LastRowWins,
    /// The first row is kept and later rows are rejected.
    Reject,
}

/// A record that type-checks but breaks a domain rule.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("record has no identity (id, mls or compass_property_id)")]
    MissingIdentity,
    #[error("status is required")]
    MissingStatus,
    #[error("{field} must not be negative (got {value})")]
    Negative { field: ListingField, value: f64 },
    #[error("year_built {year} is outside 1600..={latest}")]
    YearBuiltOutOfRange { year: i64, latest: i64 },
    #[error("latitude {0} is outside -90..=90")]
    LatitudeOutOfRange(f64),
    #[error("longitude {0} is outside -180..=180")]
    LongitudeOutOfRange(f64),
    #[error("identity '{0}' already appeared earlier in this file")]
    DuplicateIdentity(String),
}

impl ValidationError {
    pub const fn code(&self) -> &'static str {
        match self {
            Self::MissingIdentity => "missing_identity",
            Self::MissingStatus => "missing_status",
            Self::Negative { field, .. } => match field {
                ListingField::Price => "negative_price",
                ListingField::Bedrooms => "negative_bedrooms",
                ListingField::Bathrooms => "negative_bathrooms",
                ListingField::SquareFeet => "negative_square_feet",
                _ => "negative_value",
            },
            Self::YearBuiltOutOfRange { .. } => "year_built_out_of_range",
            Self::LatitudeOutOfRange(_) => "latitude_out_of_range",
            Self::LongitudeOutOfRange(_) => "longitude_out_of_range",
            Self::DuplicateIdentity(_) => "duplicate_identity",
        }
    }

    pub const fn field(&self) -> Option<ListingField> {
        match self {
            Self::MissingIdentity | Self::DuplicateIdentity(_) => Some(ListingField::Id),
            Self::MissingStatus => Some(ListingField::Status),
            Self::Negative { field, .. } => Some(*field),
            Self::YearBuiltOutOfRange { .. } => Some(ListingField::YearBuilt),
            Self::LatitudeOutOfRange(_) => Some(ListingField::Latitude),
            Self::LongitudeOutOfRange(_) => Some(ListingField::Longitude),
        }
    }
}

/// Machine-readable reason attached to a rejected row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectionReason {
    pub code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<ListingField>,
    pub message: String,
}

impl RejectionReason {
    pub fn malformed_row(message: impl Into<String>) -> Self {
        Self {
            code: "malformed_row",
            field: None,
            message: message.into(),
        }
    }
}

impl From<NormalizationError> for RejectionReason {
    fn from(err: NormalizationError) -> Self {
        Self {
            code: err.code(),
            field: Some(err.field()),
            message: err.to_string(),
        }
    }
}

impl From<ValidationError> for RejectionReason {
    fn from(err: ValidationError) -> Self {
        Self {
            code: err.code(),
            field: err.field(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Accepted,
    Rejected(RejectionReason),
    /// A later row with the same identity replaces this one; `superseded_by` is that row's
    /// position in the validated sequence.
    SupersededInBatch { superseded_by: usize },
}

impl ValidationOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// Record- and batch-level rules. Holds the reference date so validation stays pure.
#[derive(Debug, Clone)]
pub struct BatchValidator {
    latest_year_built: i64,
    duplicates: DuplicatePolicy,
}

impl BatchValidator {
    pub fn new(reference_date: NaiveDate, duplicates: DuplicatePolicy) -> Self {
        Self {
            latest_year_built: i64::from(reference_date.year()) + 1,
            duplicates,
        }
    }

    pub fn check(&self, record: &NormalizedRecord) -> Result<(), ValidationError> {
        if record.id.trim().is_empty() {
            return Err(ValidationError::MissingIdentity);
        }
        if record.status.is_none() {
            return Err(ValidationError::MissingStatus);
        }

        let non_negative = [
            (ListingField::Price, record.price),
            (ListingField::Bedrooms, record.bedrooms.map(|v| v as f64)),
            (ListingField::Bathrooms, record.bathrooms),
            (ListingField::SquareFeet, record.square_feet.map(|v| v as f64)),
        ];
        for (field, value) in non_negative {
            if let Some(value) = value.filter(|value| *value < 0.0) {
                return Err(ValidationError::Negative { field, value });
            }
        }

        if let Some(year) = record.year_built {
            if !(EARLIEST_YEAR_BUILT..=self.latest_year_built).contains(&year) {
                return Err(ValidationError::YearBuiltOutOfRange {
                    year,
                    latest: self.latest_year_built,
                });
            }
        }
        if let Some(latitude) = record.latitude.filter(|v| !(-90.0..=90.0).contains(v)) {
            return Err(ValidationError::LatitudeOutOfRange(latitude));
        }
        if let Some(longitude) = record.longitude.filter(|v| !(-180.0..=180.0).contains(v)) {
            return Err(ValidationError::LongitudeOutOfRange(longitude));
        }

        Ok(())
    }

    /// Outcomes are aligned with `records`. Duplicates are resolved in sequence order.
    pub fn validate(&self, records: &[NormalizedRecord]) -> Vec<ValidationOutcome> {
        let mut outcomes: Vec<ValidationOutcome> = records
            .iter()
            .map(|record| match self.check(record) {
                Ok(()) => ValidationOutcome::Accepted,
                Err(err) => ValidationOutcome::Rejected(err.into()),
            })
            .collect();

        match self.duplicates {
            DuplicatePolicy::LastRowWins => {
                let mut latest: HashMap<&str, usize> = HashMap::new();
                for (index, record) in records.iter().enumerate() {
                    if outcomes[index].is_accepted() {
                        latest.insert(record.id.as_str(), index);
                    }
                }
                for (index, record) in records.iter().enumerate() {
                    let Some(&winner) = latest.get(record.id.as_str()) else {
                        continue;
                    };
                    if winner != index && outcomes[index].is_accepted() {
                        outcomes[index] = ValidationOutcome::SupersededInBatch {
                            superseded_by: winner,
                        };
                    }
                }
            }
            DuplicatePolicy::Reject => {
                let mut seen: HashSet<&str> = HashSet::new();
                for (index, record) in records.iter().enumerate() {
                    if outcomes[index].is_accepted() && !seen.insert(record.id.as_str()) {
                        outcomes[index] = ValidationOutcome::Rejected(
                            ValidationError::DuplicateIdentity(record.id.clone()).into(),
                        );
                    }
                }
            }
        }

        outcomes
    }
}
