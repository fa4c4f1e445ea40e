use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use bloodbank_auth::ActorRef;
use bloodbank_core::{DomainError, DomainResult, FulfillmentId, RequestId};

/// Append-only audit entry written when a request is fulfilled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FulfillmentRecord {
    pub id: FulfillmentId,
    pub request_id: RequestId,
    pub units_supplied: i64,
    pub fulfilled_date: NaiveDate,
    pub fulfilled_by: ActorRef,
}

/// A fulfillment entry before the store assigns its id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewFulfillment {
    pub request_id: RequestId,
    pub units_supplied: i64,
    pub fulfilled_date: NaiveDate,
    pub fulfilled_by: ActorRef,
}

impl NewFulfillment {
    pub fn validate(&self) -> DomainResult<()> {
        if self.units_supplied <= 0 {
            return Err(DomainError::validation(format!(
                "units supplied must be greater than zero (got {})",
                self.units_supplied
            )));
        }
        Ok(())
    }

    pub fn into_record(self, id: FulfillmentId) -> FulfillmentRecord {
        FulfillmentRecord {
            id,
            request_id: self.request_id,
            units_supplied: self.units_supplied,
            fulfilled_date: self.fulfilled_date,
            fulfilled_by: self.fulfilled_by,
        }
    }
}
