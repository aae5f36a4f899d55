use sea_orm::entity::prelude::*;

/// Video summary record. The core treats videos as read-only; the
/// upload pipeline that produces them lives outside this service.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "videos")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub title: String,

    pub thumbnail: String,

    /// Duration in seconds
    pub duration: f64,

    pub owner_id: i32,

    pub is_published: bool,

    pub views: i64,

    pub created_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
