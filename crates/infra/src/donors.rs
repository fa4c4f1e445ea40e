//! Donor registry over a [`DonorDirectory`].

use tracing::{info, instrument, warn};

use bloodbank_core::DonorId;
use bloodbank_donors::{Donor, DonorProfile, DonorQuery, SEARCH_LIMIT};

use crate::errors::WorkflowError;
use crate::store::DonorDirectory;

#[derive(Debug, Clone)]
pub struct DonorRegistry<D> {
    directory: D,
}

impl<D: DonorDirectory> DonorRegistry<D> {
    pub fn new(directory: D) -> Self {
        Self { directory }
    }

    #[instrument(skip(self, profile), fields(blood_group = %profile.blood_group))]
    pub async fn add(&self, profile: DonorProfile) -> Result<Donor, WorkflowError> {
        profile.validate()?;
        let donor = self.directory.insert(profile).await?;
        info!(donor_id = %donor.id, "donor registered");
        Ok(donor)
    }

    /// Replace a donor's editable fields. Date of birth and gender are kept.
    #[instrument(skip(self, profile), fields(donor_id = %id))]
    pub async fn update(&self, id: DonorId, profile: DonorProfile) -> Result<Donor, WorkflowError> {
        profile.validate()?;
        match self.directory.update(id, profile).await? {
            Some(donor) => {
                info!("donor updated");
                Ok(donor)
            }
            None => Err(not_found(id)),
        }
    }

    #[instrument(skip(self), fields(donor_id = %id))]
    pub async fn delete(&self, id: DonorId) -> Result<(), WorkflowError> {
        if self.directory.delete(id).await? {
            info!("donor deleted");
            Ok(())
        } else {
            Err(not_found(id))
        }
    }

    /// Newest donors first, capped at [`SEARCH_LIMIT`].
    pub async fn search(&self, query: &DonorQuery) -> Result<Vec<Donor>, WorkflowError> {
        Ok(self.directory.search(query, SEARCH_LIMIT).await?)
    }
}

fn not_found(id: DonorId) -> WorkflowError {
    warn!(donor_id = %id, "unknown donor");
    WorkflowError::NotFound(format!("donor {id}"))
}
