use sea_orm::entity::prelude::*;

/// Either the coordinate pair or the four manual-location columns are set.
/// The database also maintains a generated `location` point column for
/// spatial queries; it is not mapped here.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "reports")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub author_id: Uuid,
    #[sea_orm(column_type = "String(StringLen::N(200))")]
    pub title: String,
    #[sea_orm(column_type = "Text")]
    pub description: String,
    #[sea_orm(column_type = "String(StringLen::N(50))")]
    pub category: String,
    #[sea_orm(column_type = "String(StringLen::N(10))")]
    pub priority: String,
    #[sea_orm(column_type = "String(StringLen::N(20))")]
    pub status: String,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    pub manual_state: Option<String>,
    pub manual_district: Option<String>,
    pub manual_city: Option<String>,
    pub manual_address: Option<String>,
    pub photo_url: Option<String>,
    pub upvote_count: i64,
    pub is_anonymous: bool,
    pub resolution_rewarded: bool,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::AuthorId",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    Author,
    #[sea_orm(has_many = "super::upvote::Entity")]
    Upvotes,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Author.def()
    }
}

impl Related<super::upvote::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Upvotes.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
