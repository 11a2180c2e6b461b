//! Movie entity (catalog rows keyed by TMDb id).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "movie")]
pub struct Model {
    /// External catalog id.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i64,

    pub title: String,

    pub release_date: Date,

    #[sea_orm(column_type = "Text", nullable)]
    pub overview: Option<String>,

    #[sea_orm(nullable)]
    pub poster_path: Option<String>,

    #[sea_orm(nullable)]
    pub backdrop_path: Option<String>,

    #[sea_orm(column_type = "Double")]
    pub popularity: f64,

    #[sea_orm(nullable)]
    pub imdb_url: Option<String>,

    #[sea_orm(nullable)]
    pub cinemagia_url: Option<String>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::vote::Entity")]
    Vote,
    #[sea_orm(has_many = "super::tally::Entity")]
    Tally,
    #[sea_orm(has_many = "super::snapshot::Entity")]
    Snapshot,
}

impl Related<super::vote::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Vote.def()
    }
}

impl Related<super::tally::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Tally.def()
    }
}

impl Related<super::snapshot::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Snapshot.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
