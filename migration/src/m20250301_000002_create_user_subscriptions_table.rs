use sea_orm_migration::prelude::extension::postgres::Type;
use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_type(
                Type::create()
                    .as_enum(SubscriptionStatus::Enum)
                    .values([
                        SubscriptionStatus::InTrial,
                        SubscriptionStatus::Active,
                        SubscriptionStatus::InGrace,
                        SubscriptionStatus::Expired,
                    ])
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(UserSubscriptions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(UserSubscriptions::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(UserSubscriptions::UserId).uuid().not_null())
                    .col(ColumnDef::new(UserSubscriptions::PlanId).uuid().not_null())
                    .col(
                        ColumnDef::new(UserSubscriptions::Status)
                            .custom(SubscriptionStatus::Enum)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(UserSubscriptions::CurrentPeriodStart)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(UserSubscriptions::CurrentPeriodEnd)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(UserSubscriptions::LastReceiptSnapshot)
                            .json_binary()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(UserSubscriptions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(UserSubscriptions::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_user_subscriptions_plan")
                            .from(UserSubscriptions::Table, UserSubscriptions::PlanId)
                            .to(Plans::Table, Plans::Id),
                    )
                    .to_owned(),
            )
            .await?;

        // One entitlement row per (user, plan); the upsert conflicts on this.
        manager
            .create_index(
                Index::create()
                    .name("idx_user_subscriptions_user_plan")
                    .table(UserSubscriptions::Table)
                    .col(UserSubscriptions::UserId)
                    .col(UserSubscriptions::PlanId)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(UserSubscriptions::Table).to_owned())
            .await?;

        manager
            .drop_type(Type::drop().name(SubscriptionStatus::Enum).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum UserSubscriptions {
    Table,
    Id,
    UserId,
    PlanId,
    Status,
    CurrentPeriodStart,
    CurrentPeriodEnd,
    LastReceiptSnapshot,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Plans {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum SubscriptionStatus {
    #[sea_orm(iden = "subscription_status")]
    Enum,
    #[sea_orm(iden = "in_trial")]
    InTrial,
    #[sea_orm(iden = "active")]
    Active,
    #[sea_orm(iden = "in_grace")]
    InGrace,
    #[sea_orm(iden = "expired")]
    Expired,
}
