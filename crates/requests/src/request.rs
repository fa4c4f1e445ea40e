use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use bloodbank_core::{BloodGroup, ComponentType, DomainError, DomainResult, Entity, RequestId};

use crate::RequestStatus;

/// City stored when a request names none.
pub const UNSPECIFIED_CITY: &str = "N/A";

/// A hospital's ask for units of one blood group, as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HospitalRequest {
    pub id: RequestId,
    pub hospital_name: String,
    pub city: String,
    pub blood_group: BloodGroup,
    pub component: ComponentType,
    pub units_requested: i64,
    pub notes: String,
    pub request_date: NaiveDate,
    pub status: RequestStatus,
}

impl HospitalRequest {
    pub fn is_pending(&self) -> bool {
        self.status == RequestStatus::Pending
    }
}

impl Entity for HospitalRequest {
    type Id = RequestId;

    fn id(&self) -> RequestId {
        self.id
    }
}

/// Intake payload for a new request. Always stored as Pending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRequest {
    pub hospital_name: String,
    pub city: String,
    pub blood_group: BloodGroup,
    #[serde(default = "whole_blood")]
    pub component: ComponentType,
    pub units_requested: i64,
    #[serde(default)]
    pub notes: String,
}

fn whole_blood() -> ComponentType {
    ComponentType::WHOLE_BLOOD
}

impl NewRequest {
    pub fn new(hospital_name: impl Into<String>, blood_group: BloodGroup, units_requested: i64) -> Self {
        Self {
            hospital_name: hospital_name.into(),
            city: String::new(),
            blood_group,
            component: ComponentType::WHOLE_BLOOD,
            units_requested,
            notes: String::new(),
        }
    }

    pub fn with_city(mut self, city: impl Into<String>) -> Self {
        self.city = city.into();
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.hospital_name.trim().is_empty() {
            return Err(DomainError::validation("hospital name cannot be empty"));
        }
        if self.units_requested <= 0 {
            return Err(DomainError::validation(format!(
                "units requested must be greater than zero (got {})",
                self.units_requested
            )));
        }
        if self.component != ComponentType::WHOLE_BLOOD {
            return Err(DomainError::validation(format!(
                "only {} requests are accepted",
                ComponentType::WHOLE_BLOOD
            )));
        }
        Ok(())
    }

    /// Materialize the persisted form once the store has assigned an id.
    pub fn into_request(self, id: RequestId, request_date: NaiveDate) -> HospitalRequest {
        HospitalRequest {
            id,
            hospital_name: self.hospital_name.trim().to_string(),
            city: match self.city.trim() {
                "" => UNSPECIFIED_CITY.to_string(),
                city => city.to_string(),
            },
            blood_group: self.blood_group,
            component: self.component,
            units_requested: self.units_requested,
            notes: self.notes,
            request_date,
            status: RequestStatus::Pending,
        }
    }
}
