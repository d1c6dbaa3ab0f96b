//! In-memory pending request storage.

use crate::pending::{PendingStore, PendingVerification, VerificationToken};
use async_trait::async_trait;
use campus_gate_verification::StoreError;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Pending requests keyed by token.
#[derive(Debug, Default)]
pub struct InMemoryPendingStore {
    requests: Mutex<HashMap<VerificationToken, PendingVerification>>,
}

impl InMemoryPendingStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PendingStore for InMemoryPendingStore {
    async fn insert(&self, request: &PendingVerification) -> Result<(), StoreError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(request.token().clone(), request.clone());
        Ok(())
    }

    async fn get(
        &self,
        token: &VerificationToken,
    ) -> Result<Option<PendingVerification>, StoreError> {
        Ok(self
            .requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(token)
            .cloned())
    }

    async fn mark_consumed(
        &self,
        token: &VerificationToken,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut requests = self.requests.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(request) = requests.get(token) else {
            return Ok(false);
        };
        if request.consumed_at().is_some() {
            return Ok(false);
        }
        let consumed = PendingVerification::with_all_fields(
            request.token().clone(),
            request.platform_user_id().clone(),
            request.community_id().clone(),
            request.created_at(),
            request.expires_at(),
            Some(at),
        );
        requests.insert(token.clone(), consumed);
        Ok(true)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut requests = self.requests.lock().unwrap_or_else(PoisonError::into_inner);
        let before = requests.len();
        requests.retain(|_, request| !request.is_expired_at(now));
        Ok((before - requests.len()) as u64)
    }
}
