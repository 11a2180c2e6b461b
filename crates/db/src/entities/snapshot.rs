//! Snapshot entity (frozen monthly tallies per movie).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "snapshot")]
pub struct Model {
    /// Month key, `YYYY-MM`
    #[sea_orm(primary_key, auto_increment = false)]
    pub month: String,

    #[sea_orm(primary_key, auto_increment = false)]
    pub movie_id: i64,

    /// `{category: count}` for all four categories
    #[sea_orm(column_type = "JsonBinary")]
    pub tallies: Json,

    pub closed_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::movie::Entity",
        from = "Column::MovieId",
        to = "super::movie::Column::Id",
        on_delete = "Cascade"
    )]
    Movie,
}

impl Related<super::movie::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Movie.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
