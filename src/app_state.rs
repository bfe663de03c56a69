use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::{
    config::Config,
    services::{AllowAllGate, AppStoreClient, EligibilityGate, JWTService, SubscriptionService, TokenSigner},
};

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub subscription_service: Arc<SubscriptionService>,
    pub jwt_service: Arc<JWTService>,
    pub config: Arc<Config>,
}

impl AppState {
    pub async fn new(config: Config) -> Result<Self, anyhow::Error> {
        let eligibility: Arc<dyn EligibilityGate> = Arc::new(AllowAllGate);
        Self::with_eligibility(config, eligibility).await
    }

    /// Build state with an injected eligibility gate (the check itself is
    /// owned by another subsystem).
    pub async fn with_eligibility(
        config: Config,
        eligibility: Arc<dyn EligibilityGate>,
    ) -> Result<Self, anyhow::Error> {
        // Connect to database
        let db = sea_orm::Database::connect(&config.database.url).await?;

        // Missing Apple credentials are not fatal at startup; requests
        // fail with CONFIGURATION_ERROR until the deployment is fixed.
        if config.apple.credentials().is_err() {
            tracing::warn!("Apple App Store credentials are not fully configured");
        }

        let signer = Arc::new(TokenSigner::new(&config.apple));
        let client = Arc::new(AppStoreClient::new(
            signer,
            config.apple.request_timeout_ms,
        )?);

        let subscription_service =
            Arc::new(SubscriptionService::new(db.clone(), client, eligibility));
        let jwt_service = Arc::new(JWTService::new(Arc::new(config.auth.clone())));

        Ok(Self {
            db,
            subscription_service,
            jwt_service,
            config: Arc::new(config),
        })
    }
}
