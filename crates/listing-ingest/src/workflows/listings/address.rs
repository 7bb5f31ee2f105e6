/// Already-cleaned address components of one listing.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct AddressParts<'a> {
    pub(crate) address_line_1: Option<&'a str>,
    pub(crate) address_line_2: Option<&'a str>,
    pub(crate) street_number: Option<&'a str>,
    pub(crate) pre_direction: Option<&'a str>,
    pub(crate) street_name: Option<&'a str>,
    pub(crate) street_type: Option<&'a str>,
    pub(crate) unit_type: Option<&'a str>,
    pub(crate) unit_number: Option<&'a str>,
    pub(crate) city: Option<&'a str>,
    pub(crate) state: Option<&'a str>,
    pub(crate) zip_code: Option<&'a str>,
}

impl<'a> AddressParts<'a> {
    fn has_granular_street(&self) -> bool {
        [
            self.street_number,
            self.pre_direction,
            self.street_name,
            self.street_type,
        ]
        .iter()
        .any(Option::is_some)
    }

    /// Street portion of the address. Granular parts win over the free-text address lines.
    pub(crate) fn street_line(&self) -> Option<String> {
        if self.has_granular_street() {
            let unit = join_present(&[self.unit_type, self.unit_number], " ");
            let unit = unit.as_deref().or(self.address_line_2);
            return join_present(
                &[
                    self.street_number,
                    self.pre_direction,
                    self.street_name,
                    self.street_type,
                    unit,
                ],
                " ",
            );
        }
        join_present(&[self.address_line_1, self.address_line_2], " ")
    }

    /// `street, City, ST 12345` with absent segments dropped.
    ///
    /// A supplied free-text address is only used when no structured address data exists.
    pub(crate) fn full_address(&self, supplied: Option<&str>) -> Option<String> {
        let street = self.street_line();
        let region = join_present(&[self.state, self.zip_code], " ");
        let composed = join_present(&[street.as_deref(), self.city, region.as_deref()], ", ");
        composed.or_else(|| supplied.map(str::to_string))
    }
}

fn join_present(parts: &[Option<&str>], separator: &str) -> Option<String> {
    let present: Vec<&str> = parts
        .iter()
        .flatten()
        .map(|part| part.trim())
        .filter(|part| !part.is_empty())
        .collect();
    if present.is_empty() {
        None
    } else {
        Some(present.join(separator))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composes_from_granular_parts() {
        let parts = AddressParts {
            street_number: Some("123"),
            street_name: Some("Main"),
            street_type: Some("St"),
            city: Some("Springfield"),
            state: Some("IL"),
            zip_code: Some("62704"),
            ..AddressParts::default()
        };
        assert_eq!(
            parts.full_address(None).as_deref(),
            Some("123 Main St, Springfield, IL 62704")
        );
    }

    #[test]
    fn granular_parts_override_conflicting_free_text() {
        let parts = AddressParts {
            address_line_1: Some("999 Elsewhere Rd"),
            street_number: Some("12"),
            pre_direction: Some("N"),
            street_name: Some("Oak"),
            street_type: Some("Ave"),
            unit_type: Some("Apt"),
            unit_number: Some("4B"),
            city: Some("Peoria"),
            ..AddressParts::default()
        };
        assert_eq!(
            parts.full_address(Some("999 Elsewhere Rd, Nowhere")).as_deref(),
            Some("12 N Oak Ave Apt 4B, Peoria")
        );
    }

    #[test]
    fn falls_back_to_address_lines() {
        let parts = AddressParts {
            address_line_1: Some("77 Lake Shore Dr"),
            address_line_2: Some("Unit 9"),
            city: Some("Chicago"),
            state: Some("IL"),
            ..AddressParts::default()
        };
        assert_eq!(
            parts.full_address(None).as_deref(),
            Some("77 Lake Shore Dr Unit 9, Chicago, IL")
        );
    }

    #[test]
    fn supplied_text_only_used_without_structure() {
        let parts = AddressParts::default();
        assert_eq!(parts.full_address(None), None);
        assert_eq!(
            parts.full_address(Some("1 Infinite Loop")).as_deref(),
            Some("1 Infinite Loop")
        );
    }
}
