//! In-memory facility directory.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::domain::foundation::{DomainError, FacilityId};
use crate::ports::FacilityDirectory;

use super::poisoned;

#[derive(Debug, Clone)]
struct FacilityRecord {
    name: String,
    has_business_agreement: bool,
}

#[derive(Default)]
pub struct InMemoryFacilityDirectory {
    facilities: RwLock<HashMap<FacilityId, FacilityRecord>>,
}

impl InMemoryFacilityDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a facility.
    pub fn insert(&self, facility_id: FacilityId, name: impl Into<String>, has_business_agreement: bool) {
        if let Ok(mut facilities) = self.facilities.write() {
            facilities.insert(
                facility_id,
                FacilityRecord {
                    name: name.into(),
                    has_business_agreement,
                },
            );
        }
    }

    /// Builder form of `insert`.
    pub fn with_facility(
        self,
        facility_id: FacilityId,
        name: impl Into<String>,
        has_business_agreement: bool,
    ) -> Self {
        self.insert(facility_id, name, has_business_agreement);
        self
    }
}

#[async_trait]
impl FacilityDirectory for InMemoryFacilityDirectory {
    async fn facility_name(&self, facility_id: &FacilityId) -> Result<Option<String>, DomainError> {
        let facilities = self.facilities.read().map_err(|_| poisoned("facilities"))?;
        Ok(facilities.get(facility_id).map(|f| f.name.clone()))
    }

    async fn has_business_agreement(&self, facility_id: &FacilityId) -> Result<bool, DomainError> {
        let facilities = self.facilities.read().map_err(|_| poisoned("facilities"))?;
        Ok(facilities
            .get(facility_id)
            .map_or(false, |f| f.has_business_agreement))
    }
}
