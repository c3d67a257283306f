//! In-memory payment method store.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::domain::foundation::{DomainError, FacilityId};
use crate::ports::PaymentMethodStore;

use super::poisoned;

#[derive(Default)]
pub struct InMemoryPaymentMethodStore {
    tokens: RwLock<HashMap<FacilityId, String>>,
}

impl InMemoryPaymentMethodStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentMethodStore for InMemoryPaymentMethodStore {
    async fn upsert(&self, facility_id: &FacilityId, payment_token: &str) -> Result<(), DomainError> {
        let mut tokens = self.tokens.write().map_err(|_| poisoned("payment methods"))?;
        tokens.insert(*facility_id, payment_token.to_string());
        Ok(())
    }

    async fn find(&self, facility_id: &FacilityId) -> Result<Option<String>, DomainError> {
        let tokens = self.tokens.read().map_err(|_| poisoned("payment methods"))?;
        Ok(tokens.get(facility_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_replaces_previous_token() {
        let store = InMemoryPaymentMethodStore::new();
        let facility = FacilityId::new();

        store.upsert(&facility, "tok_one").await.unwrap();
        store.upsert(&facility, "tok_two").await.unwrap();

        assert_eq!(store.find(&facility).await.unwrap().as_deref(), Some("tok_two"));
    }
}
