use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;

/// Precondition check owned by another subsystem. Consulted before any
/// network call; a false answer short-circuits the verification and is
/// never retried.
#[async_trait]
pub trait EligibilityGate: Send + Sync {
    async fn is_eligible(&self, user_id: Uuid) -> Result<bool>;
}

/// Default gate for deployments where eligibility is enforced upstream.
pub struct AllowAllGate;

#[async_trait]
impl EligibilityGate for AllowAllGate {
    async fn is_eligible(&self, _user_id: Uuid) -> Result<bool> {
        Ok(true)
    }
}
