use serde::{Deserialize, Serialize};

use bloodbank_core::DomainResult;

use crate::{HospitalRequest, RequestStatus};

/// Most rows a request listing returns.
pub const SEARCH_LIMIT: usize = 100;

/// Filter for listing hospital requests, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestQuery {
    /// Case-insensitive substring of hospital name or city.
    pub search: Option<String>,
    pub status: Option<RequestStatus>,
}

impl RequestQuery {
    /// Build a query from raw filter strings; `"all"` or blank means any status.
    pub fn parse(search: Option<&str>, status: Option<&str>) -> DomainResult<Self> {
        let search = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let status = match status.map(str::trim) {
            None | Some("") => None,
            Some(s) if s.eq_ignore_ascii_case("all") => None,
            Some(s) => Some(s.parse::<RequestStatus>()?),
        };
        Ok(Self { search, status })
    }

    /// LIKE pattern for SQL backends (`%term%`), if a search term is present.
    pub fn like_pattern(&self) -> Option<String> {
        self.search.as_ref().map(|s| format!("%{}%", s.to_lowercase()))
    }

    pub fn matches(&self, request: &HospitalRequest) -> bool {
        if self.status.is_some_and(|status| request.status != status) {
            return false;
        }
        match &self.search {
            None => true,
            Some(term) => {
                let term = term.to_lowercase();
                request.hospital_name.to_lowercase().contains(&term) || request.city.to_lowercase().contains(&term)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bloodbank_core::{BloodGroup, RequestId};
    use chrono::NaiveDate;

    use crate::NewRequest;

    fn request() -> HospitalRequest {
        NewRequest::new("St. Mary", BloodGroup::BPos, 2)
            .with_city("Leeds")
            .into_request(RequestId::new(3), NaiveDate::from_ymd_opt(2024, 6, 2).unwrap())
    }

    #[test]
    fn parse_treats_blank_and_all_as_no_filter() {
        assert_eq!(RequestQuery::parse(Some(" "), Some("ALL")).unwrap(), RequestQuery::default());
        let q = RequestQuery::parse(Some("Mary"), Some("pending")).unwrap();
        assert_eq!(q.status, Some(RequestStatus::Pending));
        assert_eq!(q.like_pattern().as_deref(), Some("%mary%"));
        assert!(RequestQuery::parse(None, Some("approved")).is_err());
    }

    #[test]
    fn matches_hospital_or_city_and_status() {
        let r = request();
        let by = |s: &str| RequestQuery::parse(Some(s), None).unwrap().matches(&r);
        assert!(by("MARY"));
        assert!(by("leed"));
        assert!(!by("general"));

        let pending = RequestQuery::parse(None, Some("Pending")).unwrap();
        assert!(pending.matches(&r));
        let fulfilled = RequestQuery::parse(None, Some("Fulfilled")).unwrap();
        assert!(!fulfilled.matches(&r));
    }
}
