pub mod plans;
pub mod prelude;
pub mod sea_orm_active_enums;
pub mod user_subscriptions;
