use anyhow::{Context, Result};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseBackend, DatabaseConnection, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, Set, Statement,
};

use crate::entities::subscriptions;

/// Outcome of a toggle, reported back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleState {
    Subscribed,
    Unsubscribed,
}

impl ToggleState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Subscribed => "subscribed",
            Self::Unsubscribed => "unsubscribed",
        }
    }
}

/// Snapshot of the derived channel quantities, computed in one statement.
#[derive(Debug, Clone, Copy)]
pub struct ChannelStats {
    pub subscribers: i64,
    pub subscribed_to: i64,
    pub is_subscribed: bool,
}

pub struct SubscriptionRepository {
    conn: DatabaseConnection,
}

impl SubscriptionRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Toggle the (subscriber, channel) edge.
    ///
    /// Delete-first, then insert with ON CONFLICT DO NOTHING: both halves
    /// are single conditional writes, so two concurrent toggles can never
    /// leave a duplicate edge. A toggle that loses the insert race still
    /// reports `Subscribed`, which matches the state it observed.
    pub async fn toggle(&self, subscriber_id: i32, channel_id: i32) -> Result<ToggleState> {
        let deleted = subscriptions::Entity::delete_many()
            .filter(subscriptions::Column::SubscriberId.eq(subscriber_id))
            .filter(subscriptions::Column::ChannelId.eq(channel_id))
            .exec(&self.conn)
            .await
            .context("Failed to delete subscription edge")?;

        if deleted.rows_affected > 0 {
            return Ok(ToggleState::Unsubscribed);
        }

        let active = subscriptions::ActiveModel {
            subscriber_id: Set(subscriber_id),
            channel_id: Set(channel_id),
            created_at: Set(chrono::Utc::now().to_rfc3339()),
            ..Default::default()
        };

        let insert = subscriptions::Entity::insert(active)
            .on_conflict(
                sea_orm::sea_query::OnConflict::columns([
                    subscriptions::Column::SubscriberId,
                    subscriptions::Column::ChannelId,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec(&self.conn)
            .await;

        match insert {
            // RecordNotInserted: a concurrent toggle created the edge first.
            Ok(_) | Err(DbErr::RecordNotInserted) => Ok(ToggleState::Subscribed),
            Err(e) => Err(e).context("Failed to insert subscription edge"),
        }
    }

    pub async fn count_subscribers(&self, channel_id: i32) -> Result<i64> {
        let count = subscriptions::Entity::find()
            .filter(subscriptions::Column::ChannelId.eq(channel_id))
            .count(&self.conn)
            .await
            .context("Failed to count subscribers")?;

        Ok(i64::try_from(count).unwrap_or(i64::MAX))
    }

    pub async fn count_subscriptions(&self, subscriber_id: i32) -> Result<i64> {
        let count = subscriptions::Entity::find()
            .filter(subscriptions::Column::SubscriberId.eq(subscriber_id))
            .count(&self.conn)
            .await
            .context("Failed to count subscriptions")?;

        Ok(i64::try_from(count).unwrap_or(i64::MAX))
    }

    /// Subscriber count, subscribed-to count, and the viewer's membership
    /// flag, read as three scalar subqueries of one statement so all three
    /// reflect the same snapshot of the edge set.
    pub async fn channel_stats(
        &self,
        channel_id: i32,
        viewer_id: Option<i32>,
    ) -> Result<ChannelStats> {
        // -1 never matches a real identity, so an anonymous viewer
        // resolves to is_subscribed = false inside the same statement.
        let viewer = viewer_id.unwrap_or(-1);

        let row = self
            .conn
            .query_one(Statement::from_sql_and_values(
                DatabaseBackend::Sqlite,
                r"SELECT
                    (SELECT COUNT(*) FROM subscriptions WHERE channel_id = ?) AS subscribers,
                    (SELECT COUNT(*) FROM subscriptions WHERE subscriber_id = ?) AS subscribed_to,
                    EXISTS(
                        SELECT 1 FROM subscriptions
                        WHERE channel_id = ? AND subscriber_id = ?
                    ) AS is_subscribed",
                [
                    channel_id.into(),
                    channel_id.into(),
                    channel_id.into(),
                    viewer.into(),
                ],
            ))
            .await
            .context("Failed to query channel stats")?
            .ok_or_else(|| anyhow::anyhow!("Channel stats query returned no row"))?;

        Ok(ChannelStats {
            subscribers: row.try_get("", "subscribers")?,
            subscribed_to: row.try_get("", "subscribed_to")?,
            is_subscribed: row.try_get::<i64>("", "is_subscribed")? != 0,
        })
    }
}
