//! Fixed column catalog shared by the warehouse table and the search index.
//!
//! Both sinks are provisioned against this list; the order here is the column order used for
//! generated SQL and for serialized records.

use chrono::NaiveDate;
use serde::{Serialize, Serializer};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Integer,
    Float,
    Date,
}

impl FieldType {
    pub const fn label(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Date => "date",
        }
    }
}

macro_rules! listing_fields {
    ($( $variant:ident => ($name:literal, $ty:ident, $nullable:literal) ),+ $(,)?) => {
        /// One column of the listing catalog.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum ListingField {
            $( $variant ),+
        }

        impl ListingField {
            pub const ALL: &'static [ListingField] = &[$( ListingField::$variant ),+];

            /// Column name as provisioned in both sinks.
            pub const fn name(self) -> &'static str {
                match self {
                    $( Self::$variant => $name ),+
                }
            }

            pub const fn field_type(self) -> FieldType {
                match self {
                    $( Self::$variant => FieldType::$ty ),+
                }
            }

            pub const fn nullable(self) -> bool {
                match self {
                    $( Self::$variant => $nullable ),+
                }
            }
        }
    };
}

listing_fields! {
    Id => ("id", String, false),
    Mls => ("mls", String, true),
    CompassPropertyId => ("compass_property_id", String, true),
    Status => ("status", String, true),
    Price => ("price", Float, true),
    Bedrooms => ("bedrooms", Integer, true),
    Bathrooms => ("bathrooms", Float, true),
    SquareFeet => ("square_feet", Integer, true),
    PropertyType => ("property_type", String, true),
    YearBuilt => ("year_built", Integer, true),
    AddressLine1 => ("address_line_1", String, true),
    AddressLine2 => ("address_line_2", String, true),
    StreetNumber => ("street_number", String, true),
    StreetName => ("street_name", String, true),
    StreetType => ("street_type", String, true),
    PreDirection => ("pre_direction", String, true),
    UnitType => ("unit_type", String, true),
    UnitNumber => ("unit_number", String, true),
    City => ("city", String, true),
    State => ("state", String, true),
    ZipCode => ("zip_code", String, true),
    Latitude => ("latitude", Float, true),
    Longitude => ("longitude", Float, true),
    FullAddress => ("full_address", String, true),
    PresentedBy => ("presented_by", String, true),
    PresentedByFirstName => ("presented_by_first_name", String, true),
    PresentedByMiddleName => ("presented_by_middle_name", String, true),
    PresentedByLastName => ("presented_by_last_name", String, true),
    PresentedByMobile => ("presented_by_mobile", String, true),
    BrokeredBy => ("brokered_by", String, true),
    ListingOfficeId => ("listing_office_id", String, true),
    ListingAgentId => ("listing_agent_id", String, true),
    Email => ("email", String, true),
    Email1 => ("email_1", String, true),
    Email2 => ("email_2", String, true),
    ListDate => ("list_date", Date, true),
    PendingDate => ("pending_date", Date, true),
    ScrapedDate => ("scraped_date", Date, true),
    OpenHouse => ("open_house", String, true),
    OhStartTime => ("oh_startTime", Integer, true),
    OhCompany => ("oh_company", String, true),
    OhContactName => ("oh_contactName", String, true),
    PageLink => ("page_link", String, true),
}

impl ListingField {
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|field| field.name() == name)
    }

    /// Resolves a header from an uploaded file, accepting the exporter's camelCase names.
    pub fn from_header(header: &str) -> Option<Self> {
        let header = header.trim_start_matches('\u{feff}').trim();
        Self::from_name(header).or_else(|| {
            EXPORT_ALIASES
                .iter()
                .find(|(alias, _)| *alias == header)
                .map(|(_, field)| *field)
        })
    }
}

impl fmt::Display for ListingField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for ListingField {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

const EXPORT_ALIASES: &[(&str, ListingField)] = &[
    ("propertyStatus", ListingField::Status),
    ("numberOfBeds", ListingField::Bedrooms),
    ("numberOfBaths", ListingField::Bathrooms),
    ("sqft", ListingField::SquareFeet),
    ("addr1", ListingField::AddressLine1),
    ("addr2", ListingField::AddressLine2),
    ("streetNumber", ListingField::StreetNumber),
    ("streetName", ListingField::StreetName),
    ("streetType", ListingField::StreetType),
    ("preDirection", ListingField::PreDirection),
    ("unitType", ListingField::UnitType),
    ("unitNumber", ListingField::UnitNumber),
    ("zipcode", ListingField::ZipCode),
    ("propertyType", ListingField::PropertyType),
    ("yearBuilt", ListingField::YearBuilt),
    ("presentedBy", ListingField::PresentedBy),
    ("brokeredBy", ListingField::BrokeredBy),
    ("realtorMobile", ListingField::PresentedByMobile),
    ("sourcePropertyId", ListingField::Mls),
    ("openHouse", ListingField::OpenHouse),
    ("compassPropertyId", ListingField::CompassPropertyId),
    ("pageLink", ListingField::PageLink),
];

/// A typed column value. Every variant carries its own null so the declared type survives
/// even when the value is absent.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    String(Option<String>),
    Integer(Option<i64>),
    Float(Option<f64>),
    Date(Option<NaiveDate>),
}

impl FieldValue {
    pub const fn field_type(&self) -> FieldType {
        match self {
            Self::String(_) => FieldType::String,
            Self::Integer(_) => FieldType::Integer,
            Self::Float(_) => FieldType::Float,
            Self::Date(_) => FieldType::Date,
        }
    }

    /// JSON form used by the search index: dates become ISO-8601 strings, nulls stay explicit.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::String(value) => value
                .as_ref()
                .map_or(serde_json::Value::Null, |v| serde_json::Value::from(v.as_str())),
            Self::Integer(value) => value.map_or(serde_json::Value::Null, serde_json::Value::from),
            Self::Float(value) => value
                .and_then(serde_json::Number::from_f64)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Self::Date(value) => value.map_or(serde_json::Value::Null, |date| {
                serde_json::Value::from(date.format("%Y-%m-%d").to_string())
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn catalog_has_forty_three_unique_columns() {
        assert_eq!(ListingField::ALL.len(), 43);
        let names: HashSet<_> = ListingField::ALL.iter().map(|f| f.name()).collect();
        assert_eq!(names.len(), 43);
    }

    #[test]
    fn only_identity_is_required() {
        let required: Vec<_> = ListingField::ALL
            .iter()
            .filter(|field| !field.nullable())
            .collect();
        assert_eq!(required, vec![&ListingField::Id]);
    }

    #[test]
    fn headers_resolve_canonical_names_and_export_aliases() {
        assert_eq!(ListingField::from_header("price"), Some(ListingField::Price));
        assert_eq!(
            ListingField::from_header("\u{feff}propertyStatus"),
            Some(ListingField::Status)
        );
        assert_eq!(
            ListingField::from_header(" realtorMobile "),
            Some(ListingField::PresentedByMobile)
        );
        assert_eq!(
            ListingField::from_header("oh_startTime"),
            Some(ListingField::OhStartTime)
        );
        assert_eq!(ListingField::from_header("favoriteColor"), None);
    }

    #[test]
    fn dates_serialize_as_iso_strings() {
        let value = FieldValue::Date(NaiveDate::from_ymd_opt(2024, 3, 5));
        assert_eq!(value.to_json(), serde_json::json!("2024-03-05"));
        assert_eq!(FieldValue::Float(None).to_json(), serde_json::Value::Null);
    }
}
