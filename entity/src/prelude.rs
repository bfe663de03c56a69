pub use super::plans::Entity as Plans;
pub use super::user_subscriptions::Entity as UserSubscriptions;
