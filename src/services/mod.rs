// Service modules
pub mod app_store_client;
pub mod eligibility;
pub mod jwt_service;
pub mod reconcile;
pub mod subscription_service;
pub mod token_signer;

pub use app_store_client::AppStoreClient;
pub use eligibility::{AllowAllGate, EligibilityGate};
pub use jwt_service::JWTService;
pub use subscription_service::SubscriptionService;
pub use token_signer::TokenSigner;
