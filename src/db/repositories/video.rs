use anyhow::{Context, Result};
use sea_orm::{
    ActiveModelTrait, ConnectionTrait, DatabaseBackend, DatabaseConnection, EntityTrait, Set,
    Statement,
};

use crate::entities::videos;

/// One resolved watch-history row: the video summary joined with a
/// minimal projection of its owner. Nothing else about the owner is
/// read out of the join.
#[derive(Debug, Clone)]
pub struct WatchHistoryRow {
    pub video_id: i32,
    pub title: String,
    pub thumbnail: String,
    pub duration: f64,
    pub views: i64,
    pub owner_username: String,
    pub owner_full_name: String,
    pub owner_avatar: String,
}

pub struct VideoRepository {
    conn: DatabaseConnection,
}

impl VideoRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn get(&self, id: i32) -> Result<Option<videos::Model>> {
        let video = videos::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query video")?;

        Ok(video)
    }

    /// Insert a video summary. The upload pipeline that normally produces
    /// these records is an external collaborator; this is the ingest seam
    /// it writes through (and what tests seed with).
    pub async fn add(
        &self,
        title: &str,
        thumbnail: &str,
        duration: f64,
        owner_id: i32,
    ) -> Result<i32> {
        let active = videos::ActiveModel {
            title: Set(title.to_string()),
            thumbnail: Set(thumbnail.to_string()),
            duration: Set(duration),
            owner_id: Set(owner_id),
            is_published: Set(true),
            views: Set(0),
            created_at: Set(chrono::Utc::now().to_rfc3339()),
            ..Default::default()
        };

        let model = active
            .insert(&self.conn)
            .await
            .context("Failed to insert video")?;

        Ok(model.id)
    }

    /// Append a video to the user's watch history at the next position.
    /// Position assignment happens inside the insert statement so two
    /// concurrent appends cannot both claim the same slot blindly.
    pub async fn record_watch(&self, user_id: i32, video_id: i32) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();

        self.conn
            .execute(Statement::from_sql_and_values(
                DatabaseBackend::Sqlite,
                r"INSERT INTO watch_history (user_id, video_id, position, created_at)
                  SELECT ?, ?, COALESCE(MAX(position) + 1, 0), ?
                  FROM watch_history WHERE user_id = ?",
                [user_id.into(), video_id.into(), now.into(), user_id.into()],
            ))
            .await
            .context("Failed to record watch-history entry")?;

        Ok(())
    }

    /// The user's watch history in stored order, each entry joined to its
    /// video and the video's owner in a single statement.
    pub async fn watch_history(&self, user_id: i32) -> Result<Vec<WatchHistoryRow>> {
        let rows = self
            .conn
            .query_all(Statement::from_sql_and_values(
                DatabaseBackend::Sqlite,
                r"SELECT v.id AS video_id, v.title, v.thumbnail, v.duration, v.views,
                         u.username AS owner_username,
                         u.full_name AS owner_full_name,
                         u.avatar AS owner_avatar
                  FROM watch_history wh
                  JOIN videos v ON v.id = wh.video_id
                  JOIN users u ON u.id = v.owner_id
                  WHERE wh.user_id = ?
                  ORDER BY wh.position ASC",
                [user_id.into()],
            ))
            .await
            .context("Failed to query watch history")?;

        rows.into_iter()
            .map(|row| {
                Ok(WatchHistoryRow {
                    video_id: row.try_get("", "video_id")?,
                    title: row.try_get("", "title")?,
                    thumbnail: row.try_get("", "thumbnail")?,
                    duration: row.try_get("", "duration")?,
                    views: row.try_get("", "views")?,
                    owner_username: row.try_get("", "owner_username")?,
                    owner_full_name: row.try_get("", "owner_full_name")?,
                    owner_avatar: row.try_get("", "owner_avatar")?,
                })
            })
            .collect()
    }
}
