use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "accounts")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Lower-cased and trimmed before it is stored.
    #[sea_orm(unique)]
    pub email: String,

    /// Argon2id password hash
    pub password_hash: String,

    pub title: String,

    pub first_name: String,

    pub last_name: String,

    pub accept_terms: bool,

    /// "Admin" or "User"
    pub role: String,

    pub verification_token: Option<String>,

    pub verified: Option<ChronoDateTimeUtc>,

    pub reset_token: Option<String>,

    pub reset_token_expires: Option<ChronoDateTimeUtc>,

    /// Set when a reset token was consumed. Also counts as verification.
    pub password_reset: Option<ChronoDateTimeUtc>,

    pub created: ChronoDateTimeUtc,

    pub updated: Option<ChronoDateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::refresh_tokens::Entity")]
    RefreshTokens,
}

impl Related<super::refresh_tokens::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RefreshTokens.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
