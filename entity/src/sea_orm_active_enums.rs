use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Reconciled entitlement state. Always re-derivable from the last
/// upstream response; stored for cheap reads, never authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(
    rs_type = "String",
    db_type = "Enum",
    enum_name = "subscription_status"
)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    #[sea_orm(string_value = "in_trial")]
    InTrial,
    #[sea_orm(string_value = "active")]
    Active,
    #[sea_orm(string_value = "in_grace")]
    InGrace,
    #[sea_orm(string_value = "expired")]
    Expired,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InTrial => "in_trial",
            Self::Active => "active",
            Self::InGrace => "in_grace",
            Self::Expired => "expired",
        }
    }

    /// An entitlement is usable in trial, active, or grace states.
    pub fn grants_access(&self) -> bool {
        !matches!(self, Self::Expired)
    }
}
