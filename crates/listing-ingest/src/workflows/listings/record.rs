use super::schema::{FieldValue, ListingField};
use chrono::NaiveDate;
use serde::Serialize;

/// A listing row coerced to the catalog. Field order follows [`ListingField::ALL`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedRecord {
    pub id: String,
    pub mls: Option<String>,
    pub compass_property_id: Option<String>,

    pub status: Option<String>,
    pub price: Option<f64>,
    pub bedrooms: Option<i64>,
    pub bathrooms: Option<f64>,
    pub square_feet: Option<i64>,
    pub property_type: Option<String>,
    pub year_built: Option<i64>,

    pub address_line_1: Option<String>,
    pub address_line_2: Option<String>,
    pub street_number: Option<String>,
    pub street_name: Option<String>,
    pub street_type: Option<String>,
    pub pre_direction: Option<String>,
    pub unit_type: Option<String>,
    pub unit_number: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub full_address: Option<String>,

    pub presented_by: Option<String>,
    pub presented_by_first_name: Option<String>,
    pub presented_by_middle_name: Option<String>,
    pub presented_by_last_name: Option<String>,
    pub presented_by_mobile: Option<String>,
    pub brokered_by: Option<String>,
    pub listing_office_id: Option<String>,
    pub listing_agent_id: Option<String>,
    pub email: Option<String>,
    pub email_1: Option<String>,
    pub email_2: Option<String>,

    pub list_date: Option<NaiveDate>,
    pub pending_date: Option<NaiveDate>,
    pub scraped_date: Option<NaiveDate>,

    pub open_house: Option<String>,
    #[serde(rename = "oh_startTime")]
    pub oh_start_time: Option<i64>,
    pub oh_company: Option<String>,
    #[serde(rename = "oh_contactName")]
    pub oh_contact_name: Option<String>,

    pub page_link: Option<String>,
}

impl NormalizedRecord {
    pub fn value(&self, field: ListingField) -> FieldValue {
        use ListingField as F;

        let text = |value: &Option<String>| FieldValue::String(value.clone());
        match field {
            F::Id => FieldValue::String(Some(self.id.clone())),
            F::Mls => text(&self.mls),
            F::CompassPropertyId => text(&self.compass_property_id),
            F::Status => text(&self.status),
            F::Price => FieldValue::Float(self.price),
            F::Bedrooms => FieldValue::Integer(self.bedrooms),
            F::Bathrooms => FieldValue::Float(self.bathrooms),
            F::SquareFeet => FieldValue::Integer(self.square_feet),
            F::PropertyType => text(&self.property_type),
            F::YearBuilt => FieldValue::Integer(self.year_built),
            F::AddressLine1 => text(&self.address_line_1),
            F::AddressLine2 => text(&self.address_line_2),
            F::StreetNumber => text(&self.street_number),
            F::StreetName => text(&self.street_name),
            F::StreetType => text(&self.street_type),
            F::PreDirection => text(&self.pre_direction),
            F::UnitType => text(&self.unit_type),
            F::UnitNumber => text(&self.unit_number),
            F::City => text(&self.city),
            F::State => text(&self.state),
            F::ZipCode => text(&self.zip_code),
            F::Latitude => FieldValue::Float(self.latitude),
            F::Longitude => FieldValue::Float(self.longitude),
            F::FullAddress => text(&self.full_address),
            F::PresentedBy => text(&self.presented_by),
            F::PresentedByFirstName => text(&self.presented_by_first_name),
            F::PresentedByMiddleName => text(&self.presented_by_middle_name),
            F::PresentedByLastName => text(&self.presented_by_last_name),
            F::PresentedByMobile => text(&self.presented_by_mobile),
            F::BrokeredBy => text(&self.brokered_by),
            F::ListingOfficeId => text(&self.listing_office_id),
            F::ListingAgentId => text(&self.listing_agent_id),
            F::Email => text(&self.email),
            F::Email1 => text(&self.email_1),
            F::Email2 => text(&self.email_2),
            F::ListDate => FieldValue::Date(self.list_date),
            F::PendingDate => FieldValue::Date(self.pending_date),
            F::ScrapedDate => FieldValue::Date(self.scraped_date),
            F::OpenHouse => text(&self.open_house),
            F::OhStartTime => FieldValue::Integer(self.oh_start_time),
            F::OhCompany => text(&self.oh_company),
            F::OhContactName => text(&self.oh_contact_name),
            F::PageLink => text(&self.page_link),
        }
    }

    /// Every catalog column paired with its typed value, in catalog order.
    pub fn values(&self) -> Vec<(ListingField, FieldValue)> {
        ListingField::ALL
            .iter()
            .map(|field| (*field, self.value(*field)))
            .collect()
    }

    /// Canonical serialized form; two records are the same if and only if these bytes match.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank_record() -> NormalizedRecord {
        NormalizedRecord {
            id: "mls-1".to_string(),
            mls: Some("MLS-1".to_string()),
            compass_property_id: None,
            status: Some("Active".to_string()),
            price: Some(450_000.0),
            bedrooms: Some(3),
            bathrooms: Some(2.5),
            square_feet: None,
            property_type: None,
            year_built: None,
            address_line_1: None,
            address_line_2: None,
            street_number: None,
            street_name: None,
            street_type: None,
            pre_direction: None,
            unit_type: None,
            unit_number: None,
            city: None,
            state: None,
            zip_code: None,
            latitude: None,
            longitude: None,
            full_address: None,
            presented_by: None,
            presented_by_first_name: None,
            presented_by_middle_name: None,
            presented_by_last_name: None,
            presented_by_mobile: None,
            brokered_by: None,
            listing_office_id: None,
            listing_agent_id: None,
            email: None,
            email_1: None,
            email_2: None,
            list_date: NaiveDate::from_ymd_opt(2024, 3, 5),
            pending_date: None,
            scraped_date: None,
            open_house: None,
            oh_start_time: None,
            oh_company: None,
            oh_contact_name: None,
            page_link: None,
        }
    }

    #[test]
    fn values_match_catalog_types_and_order() {
        let record = blank_record();
        let values = record.values();
        assert_eq!(values.len(), ListingField::ALL.len());
        for (field, value) in &values {
            assert_eq!(field.field_type(), value.field_type(), "{field}");
        }
        assert_eq!(values[0].0, ListingField::Id);
        assert_eq!(values[42].0, ListingField::PageLink);
    }

    #[test]
    fn serialized_keys_are_exactly_the_catalog_columns() {
        let json = serde_json::to_value(blank_record()).expect("serializes");
        let object = json.as_object().expect("object");
        assert_eq!(object.len(), 43);
        for field in ListingField::ALL {
            assert!(object.contains_key(field.name()), "missing {field}");
        }
        assert_eq!(object["list_date"], serde_json::json!("2024-03-05"));
    }
}
