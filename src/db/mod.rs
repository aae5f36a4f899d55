use anyhow::Result;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::config::SecurityConfig;
use crate::entities::videos;

pub mod migrator;
pub mod repositories;

pub use repositories::subscription::{ChannelStats, ToggleState};
pub use repositories::user::{NewUser, User};
pub use repositories::video::WatchHistoryRow;

#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        if !db_url.contains(":memory:") {
            let path_str = db_url.trim_start_matches("sqlite:");
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
        }

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(600))
            .sqlx_logging(false);

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn })
    }

    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }

    fn user_repo(&self) -> repositories::user::UserRepository {
        repositories::user::UserRepository::new(self.conn.clone())
    }

    fn subscription_repo(&self) -> repositories::subscription::SubscriptionRepository {
        repositories::subscription::SubscriptionRepository::new(self.conn.clone())
    }

    fn video_repo(&self) -> repositories::video::VideoRepository {
        repositories::video::VideoRepository::new(self.conn.clone())
    }

    // ========== Users ==========

    pub async fn create_user(&self, new: NewUser, config: &SecurityConfig) -> Result<User> {
        self.user_repo().create(new, config).await
    }

    pub async fn username_or_email_taken(&self, username: &str, email: &str) -> Result<bool> {
        self.user_repo()
            .username_or_email_taken(username, email)
            .await
    }

    pub async fn get_user_by_id(&self, id: i32) -> Result<Option<User>> {
        self.user_repo().get_by_id(id).await
    }

    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        self.user_repo().get_by_username(username).await
    }

    pub async fn get_user_by_identifier(&self, identifier: &str) -> Result<Option<User>> {
        self.user_repo().get_by_identifier(identifier).await
    }

    pub async fn verify_user_password(&self, id: i32, password: &str) -> Result<bool> {
        self.user_repo().verify_password(id, password).await
    }

    pub async fn update_user_password(
        &self,
        id: i32,
        new_password: &str,
        config: &SecurityConfig,
    ) -> Result<()> {
        self.user_repo()
            .update_password(id, new_password, config)
            .await
    }

    pub async fn get_refresh_token(&self, id: i32) -> Result<Option<Option<String>>> {
        self.user_repo().get_refresh_token(id).await
    }

    pub async fn set_refresh_token(&self, id: i32, value: Option<&str>) -> Result<()> {
        self.user_repo().set_refresh_token(id, value).await
    }

    pub async fn swap_refresh_token(&self, id: i32, expected: &str, new: &str) -> Result<bool> {
        self.user_repo().swap_refresh_token(id, expected, new).await
    }

    // ========== Subscription graph ==========

    pub async fn toggle_subscription(
        &self,
        subscriber_id: i32,
        channel_id: i32,
    ) -> Result<ToggleState> {
        self.subscription_repo()
            .toggle(subscriber_id, channel_id)
            .await
    }

    pub async fn count_subscribers(&self, channel_id: i32) -> Result<i64> {
        self.subscription_repo().count_subscribers(channel_id).await
    }

    pub async fn count_subscriptions(&self, subscriber_id: i32) -> Result<i64> {
        self.subscription_repo()
            .count_subscriptions(subscriber_id)
            .await
    }

    pub async fn channel_stats(
        &self,
        channel_id: i32,
        viewer_id: Option<i32>,
    ) -> Result<ChannelStats> {
        self.subscription_repo()
            .channel_stats(channel_id, viewer_id)
            .await
    }

    // ========== Videos & watch history ==========

    pub async fn get_video(&self, id: i32) -> Result<Option<videos::Model>> {
        self.video_repo().get(id).await
    }

    pub async fn add_video(
        &self,
        title: &str,
        thumbnail: &str,
        duration: f64,
        owner_id: i32,
    ) -> Result<i32> {
        self.video_repo()
            .add(title, thumbnail, duration, owner_id)
            .await
    }

    pub async fn record_watch(&self, user_id: i32, video_id: i32) -> Result<()> {
        self.video_repo().record_watch(user_id, video_id).await
    }

    pub async fn watch_history(&self, user_id: i32) -> Result<Vec<WatchHistoryRow>> {
        self.video_repo().watch_history(user_id).await
    }
}
