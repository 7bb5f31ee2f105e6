use super::address::AddressParts;
use super::fields::{self, clean, title_case};
use super::record::NormalizedRecord;
use super::schema::{FieldType, ListingField};
use super::source::RawRow;
use serde_json::Value;

/// A raw value that cannot be coerced to its declared catalog type. The whole row is rejected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NormalizationError {
    #[error("{field} value '{raw_value}' is not a valid {}", .expected.label())]
    InvalidNumber {
        field: ListingField,
        raw_value: String,
        expected: FieldType,
    },
    #[error("{field} value '{raw_value}' is not a supported date (expected YYYY-MM-DD)")]
    InvalidDate {
        field: ListingField,
        raw_value: String,
    },
}

impl NormalizationError {
    pub fn field(&self) -> ListingField {
        match self {
            Self::InvalidNumber { field, .. } | Self::InvalidDate { field, .. } => *field,
        }
    }

    pub fn raw_value(&self) -> &str {
        match self {
            Self::InvalidNumber { raw_value, .. } | Self::InvalidDate { raw_value, .. } => {
                raw_value
            }
        }
    }

    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidNumber { .. } => "invalid_number",
            Self::InvalidDate { .. } => "invalid_date",
        }
    }
}

const STATUS_SYNONYMS: &[(&str, &str)] = &[
    ("Active Under Contract", "Pending"),
    ("New", "Active"),
    ("Closed", "Sold"),
];

/// Coerces one raw row into the catalog. Pure: the same row always yields the same record.
pub fn normalize(row: &RawRow) -> Result<NormalizedRecord, NormalizationError> {
    use ListingField as F;

    let text = |field: ListingField| clean(row.get(field));
    let title = |field: ListingField| text(field).map(|value| title_case(&value));
    let upper = |field: ListingField| text(field).map(|value| value.to_uppercase());

    let price = fields::parse_float(F::Price, row.get(F::Price))?;
    let bedrooms = fields::parse_integer(F::Bedrooms, row.get(F::Bedrooms))?;
    let bathrooms = fields::parse_float(F::Bathrooms, row.get(F::Bathrooms))?;
    let square_feet = fields::parse_integer(F::SquareFeet, row.get(F::SquareFeet))?;
    let year_built = fields::parse_integer(F::YearBuilt, row.get(F::YearBuilt))?;
    let latitude = fields::parse_float(F::Latitude, row.get(F::Latitude))?;
    let longitude = fields::parse_float(F::Longitude, row.get(F::Longitude))?;
    let explicit_start_time = fields::parse_integer(F::OhStartTime, row.get(F::OhStartTime))?;
    let list_date = fields::parse_date(F::ListDate, row.get(F::ListDate))?;
    let pending_date = fields::parse_date(F::PendingDate, row.get(F::PendingDate))?;
    let scraped_date = fields::parse_date(F::ScrapedDate, row.get(F::ScrapedDate))?;

    let address_line_1 = text(F::AddressLine1);
    let address_line_2 = text(F::AddressLine2);
    let street_number = text(F::StreetNumber);
    let street_name = text(F::StreetName);
    let street_type = title(F::StreetType);
    let pre_direction = upper(F::PreDirection);
    let unit_type = title(F::UnitType);
    let unit_number = text(F::UnitNumber);
    let city = text(F::City);
    let state = upper(F::State);
    let zip_code = text(F::ZipCode);

    let address = AddressParts {
        address_line_1: address_line_1.as_deref(),
        address_line_2: address_line_2.as_deref(),
        street_number: street_number.as_deref(),
        pre_direction: pre_direction.as_deref(),
        street_name: street_name.as_deref(),
        street_type: street_type.as_deref(),
        unit_type: unit_type.as_deref(),
        unit_number: unit_number.as_deref(),
        city: city.as_deref(),
        state: state.as_deref(),
        zip_code: zip_code.as_deref(),
    };
    let full_address = address.full_address(text(F::FullAddress).as_deref());

    let mls = text(F::Mls);
    let compass_property_id = text(F::CompassPropertyId);
    let id = text(F::Id).unwrap_or_else(|| {
        derive_identity(
            mls.as_deref().or(compass_property_id.as_deref()),
            &address,
        )
    });

    let presenter = PresenterName::resolve(
        text(F::PresentedBy),
        text(F::PresentedByFirstName),
        text(F::PresentedByMiddleName),
        text(F::PresentedByLastName),
    );

    let email = text(F::Email);
    let (email_1, email_2) = match (text(F::Email1), text(F::Email2)) {
        (None, None) => split_email(email.as_deref()),
        explicit => explicit,
    };

    let open_house = text(F::OpenHouse);
    let derived = OpenHouseDetails::from_descriptor(row.get(F::OpenHouse));

    Ok(NormalizedRecord {
        id,
        mls,
        compass_property_id,
        status: text(F::Status).map(|value| canonical_status(&value)),
        price,
        bedrooms,
        bathrooms,
        square_feet,
        property_type: title(F::PropertyType),
        year_built,
        address_line_1,
        address_line_2,
        street_number,
        street_name,
        street_type,
        pre_direction,
        unit_type,
        unit_number,
        city,
        state,
        zip_code,
        latitude,
        longitude,
        full_address,
        presented_by: presenter.full,
        presented_by_first_name: presenter.first,
        presented_by_middle_name: presenter.middle,
        presented_by_last_name: presenter.last,
        presented_by_mobile: fields::mobile_digits(row.get(F::PresentedByMobile)),
        brokered_by: text(F::BrokeredBy),
        listing_office_id: text(F::ListingOfficeId),
        listing_agent_id: text(F::ListingAgentId),
        email,
        email_1,
        email_2,
        list_date,
        pending_date,
        scraped_date,
        open_house,
        oh_start_time: explicit_start_time.or(derived.start_time),
        oh_company: text(F::OhCompany).or(derived.company),
        oh_contact_name: text(F::OhContactName).or(derived.contact_name),
        page_link: text(F::PageLink),
    })
}

fn canonical_status(value: &str) -> String {
    STATUS_SYNONYMS
        .iter()
        .find(|(synonym, _)| value.eq_ignore_ascii_case(synonym))
        .map(|(_, canonical)| (*canonical).to_string())
        .unwrap_or_else(|| title_case(value))
}

/// Empty when neither `mls` nor `compass_property_id` is known; the validator rejects those rows.
fn derive_identity(key: Option<&str>, address: &AddressParts<'_>) -> String {
    let Some(key) = key else {
        return String::new();
    };
    let street = address.street_line().unwrap_or_default();
    let seed = [
        key,
        street.as_str(),
        address.city.unwrap_or_default(),
        address.state.unwrap_or_default(),
        address.zip_code.unwrap_or_default(),
    ]
    .join("-");
    fields::slugify(&seed)
}

fn split_email(email: Option<&str>) -> (Option<String>, Option<String>) {
    let Some(email) = email else {
        return (None, None);
    };
    match email.split_once(',') {
        Some((first, second)) => (clean(Some(first)), clean(Some(second))),
        None => (clean(Some(email)), None),
    }
}

#[derive(Debug, Default)]
struct PresenterName {
    full: Option<String>,
    first: Option<String>,
    middle: Option<String>,
    last: Option<String>,
}

impl PresenterName {
    fn resolve(
        full: Option<String>,
        first: Option<String>,
        middle: Option<String>,
        last: Option<String>,
    ) -> Self {
        if first.is_some() || middle.is_some() || last.is_some() {
            let joined = [first.as_deref(), middle.as_deref(), last.as_deref()]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>()
                .join(" ");
            return Self {
                full: full.or(Some(joined)),
                first,
                middle,
                last,
            };
        }

        let Some(full) = full else {
            return Self::default();
        };
        let words: Vec<&str> = full.split(' ').collect();
        let (first, middle, last) = match words.as_slice() {
            [] => (None, None, None),
            [only] => (Some(only.to_string()), None, None),
            [first, last] => (Some(first.to_string()), None, Some(last.to_string())),
            [first, middle, rest @ ..] => (
                Some(first.to_string()),
                Some(middle.to_string()),
                Some(rest.join(" ")),
            ),
        };
        Self {
            full: Some(full),
            first,
            middle,
            last,
        }
    }
}

#[derive(Debug, Default)]
struct OpenHouseDetails {
    start_time: Option<i64>,
    company: Option<String>,
    contact_name: Option<String>,
}

impl OpenHouseDetails {
    /// Reads the first entry of a JSON open-house array. Anything else is treated as a plain
    /// flag and yields no details.
    fn from_descriptor(raw: Option<&str>) -> Self {
        let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
            return Self::default();
        };
        let Ok(Value::Array(entries)) = serde_json::from_str::<Value>(raw) else {
            return Self::default();
        };
        let Some(first) = entries.first() else {
            return Self::default();
        };

        let start_time = match first.get("startTimeMillis") {
            Some(Value::Number(number)) => number.as_i64().or_else(|| {
                number
                    .as_f64()
                    .filter(|value| value.fract() == 0.0)
                    .map(|value| value as i64)
            }),
            Some(Value::String(value)) => value.trim().parse::<i64>().ok(),
            _ => None,
        };
        let contact = first.get("contact");
        let contact_text = |key: &str| {
            contact
                .and_then(|contact| contact.get(key))
                .and_then(Value::as_str)
                .and_then(|value| clean(Some(value)))
        };

        Self {
            start_time,
            company: contact_text("company"),
            contact_name: contact_text("contactName"),
        }
    }
}
