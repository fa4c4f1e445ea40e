use chrono::NaiveDate;
use core::str::FromStr;
use serde::{Deserialize, Serialize};

use bloodbank_core::{BloodGroup, DomainError, DomainResult, DonorId, Entity};

/// Upper bound on rows returned by a donor search.
pub const SEARCH_LIMIT: usize = 100;

/// Date of birth recorded when none is supplied.
pub const DEFAULT_DATE_OF_BIRTH: (i32, u32, u32) = (1990, 1, 1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
    #[default]
    Other,
}

impl Gender {
    pub fn as_str(self) -> &'static str {
        match self {
            Gender::Male => "Male",
            Gender::Female => "Female",
            Gender::Other => "Other",
        }
    }
}

impl core::fmt::Display for Gender {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Gender {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "male" | "m" => Ok(Gender::Male),
            "female" | "f" => Ok(Gender::Female),
            "other" | "" => Ok(Gender::Other),
            other => Err(DomainError::validation(format!("unknown gender '{other}'"))),
        }
    }
}

/// A registered donor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Donor {
    pub id: DonorId,
    pub name: String,
    pub blood_group: BloodGroup,
    pub phone: String,
    pub email: String,
    pub city: String,
    pub date_of_birth: NaiveDate,
    pub gender: Gender,
    /// `None` until the first recorded donation.
    pub last_donation: Option<NaiveDate>,
}

impl Entity for Donor {
    type Id = DonorId;

    fn id(&self) -> DonorId {
        self.id
    }
}

/// Editable donor fields, used both to register and to update a donor.
///
/// Updates only touch name, blood group, phone, email and city; date of birth
/// and gender are fixed at registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DonorProfile {
    pub name: String,
    pub blood_group: BloodGroup,
    pub phone: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default)]
    pub gender: Gender,
}

impl DonorProfile {
    pub fn new(name: impl Into<String>, blood_group: BloodGroup, phone: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            blood_group,
            phone: phone.into(),
            email: String::new(),
            city: String::new(),
            date_of_birth: None,
            gender: Gender::Other,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = email.into();
        self
    }

    pub fn with_city(mut self, city: impl Into<String>) -> Self {
        self.city = city.into();
        self
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("donor name cannot be empty"));
        }
        if self.phone.trim().is_empty() {
            return Err(DomainError::validation("contact number cannot be empty"));
        }
        let email = self.email.trim();
        if !email.is_empty() && !email.contains('@') {
            return Err(DomainError::validation(format!("invalid email '{email}'")));
        }
        Ok(())
    }

    pub fn date_of_birth_or_default(&self) -> NaiveDate {
        self.date_of_birth.unwrap_or_else(default_date_of_birth)
    }

    /// Build the stored donor for a freshly assigned id.
    pub fn into_donor(self, id: DonorId) -> Donor {
        let date_of_birth = self.date_of_birth_or_default();
        Donor {
            id,
            name: self.name.trim().to_string(),
            blood_group: self.blood_group,
            phone: self.phone.trim().to_string(),
            email: self.email.trim().to_string(),
            city: self.city.trim().to_string(),
            date_of_birth,
            gender: self.gender,
            last_donation: None,
        }
    }

    /// Overwrite the updatable fields of `donor`.
    pub fn apply_to(&self, donor: &mut Donor) {
        donor.name = self.name.trim().to_string();
        donor.blood_group = self.blood_group;
        donor.phone = self.phone.trim().to_string();
        donor.email = self.email.trim().to_string();
        donor.city = self.city.trim().to_string();
    }
}

fn default_date_of_birth() -> NaiveDate {
    let (y, m, d) = DEFAULT_DATE_OF_BIRTH;
    NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default()
}

/// Donor search filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DonorQuery {
    /// Case-insensitive substring of name, email or phone.
    pub search: Option<String>,
    pub blood_group: Option<BloodGroup>,
}

impl DonorQuery {
    /// Build a query from raw filter strings; `"all"` or blank means no blood filter.
    pub fn parse(search: Option<&str>, blood_group: Option<&str>) -> DomainResult<Self> {
        let search = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let blood_group = match blood_group.map(str::trim) {
            None | Some("") => None,
            Some(s) if s.eq_ignore_ascii_case("all") => None,
            Some(s) => Some(s.parse::<BloodGroup>()?),
        };
        Ok(Self { search, blood_group })
    }

    /// LIKE pattern for SQL backends (`%term%`), if a search term is present.
    pub fn like_pattern(&self) -> Option<String> {
        self.search.as_ref().map(|s| format!("%{}%", s.to_lowercase()))
    }

    pub fn matches(&self, donor: &Donor) -> bool {
        if let Some(group) = self.blood_group {
            if donor.blood_group != group {
                return false;
            }
        }
        match &self.search {
            None => true,
            Some(term) => {
                let term = term.to_lowercase();
                donor.name.to_lowercase().contains(&term)
                    || donor.email.to_lowercase().contains(&term)
                    || donor.phone.to_lowercase().contains(&term)
            }
        }
    }
}
