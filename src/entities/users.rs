use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Stored lowercased; lookups are case-insensitive by construction.
    #[sea_orm(unique)]
    pub username: String,

    #[sea_orm(unique)]
    pub email: String,

    /// Argon2id password hash
    pub password_hash: String,

    pub full_name: String,

    /// Media reference for the avatar image (required at registration)
    pub avatar: String,

    pub cover_image: Option<String>,

    /// The single live refresh-token value for this identity.
    /// NULL means no active session; overwritten on every login/refresh.
    pub refresh_token: Option<String>,

    pub created_at: String,

    pub updated_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
