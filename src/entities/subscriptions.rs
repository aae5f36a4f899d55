use sea_orm::entity::prelude::*;

/// One "subscriber watches channel" edge.
///
/// The (subscriber_id, channel_id) pair carries a unique index, so the
/// graph can never hold duplicate edges even under concurrent toggles.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "subscriptions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub subscriber_id: i32,

    pub channel_id: i32,

    pub created_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
