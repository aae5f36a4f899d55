use crate::entities::prelude::*;
use crate::entities::{subscriptions, watch_history};
use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::Schema;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let backend = manager.get_database_backend();
        let schema = Schema::new(backend);

        manager
            .create_table(
                schema
                    .create_table_from_entity(Users)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                schema
                    .create_table_from_entity(Subscriptions)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        // No duplicate edges, enforced at the storage layer.
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_subscriptions_subscriber_channel")
                    .table(Subscriptions)
                    .col(subscriptions::Column::SubscriberId)
                    .col(subscriptions::Column::ChannelId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                schema
                    .create_table_from_entity(Videos)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                schema
                    .create_table_from_entity(WatchHistory)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_watch_history_user_position")
                    .table(WatchHistory)
                    .col(watch_history::Column::UserId)
                    .col(watch_history::Column::Position)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(WatchHistory).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Videos).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Subscriptions).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Users).to_owned())
            .await?;

        Ok(())
    }
}
