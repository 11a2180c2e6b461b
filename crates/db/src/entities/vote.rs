//! Vote entity (one category vote per voter per movie).

use std::fmt;
use std::str::FromStr;

use cinekami_common::AppError;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Vote category.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum VoteCategory {
    /// Watch with friends or alone.
    #[sea_orm(string_value = "solo_friends")]
    SoloFriends,
    /// Date movie.
    #[sea_orm(string_value = "couple")]
    Couple,
    /// Wait for streaming.
    #[sea_orm(string_value = "streaming")]
    Streaming,
    /// Skip it.
    #[sea_orm(string_value = "arr")]
    Arr,
}

impl VoteCategory {
    /// Every category, in canonical order.
    pub const ALL: [Self; 4] = [Self::SoloFriends, Self::Couple, Self::Streaming, Self::Arr];

    /// Wire name of the category.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SoloFriends => "solo_friends",
            Self::Couple => "couple",
            Self::Streaming => "streaming",
            Self::Arr => "arr",
        }
    }

    /// Position in [`Self::ALL`].
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::SoloFriends => 0,
            Self::Couple => 1,
            Self::Streaming => 2,
            Self::Arr => 3,
        }
    }
}

impl fmt::Display for VoteCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VoteCategory {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| AppError::InvalidCategory(s.to_string()))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "vote")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub movie_id: i64,

    pub voter_id: i64,

    pub category: VoteCategory,

    pub created_at: DateTimeWithTimeZone,
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

    #[sea_orm(
        belongs_to = "super::voter::Entity",
        from = "Column::VoterId",
        to = "super::voter::Column::Id",
        on_delete = "Cascade"
    )]
    Voter,
}

impl Related<super::movie::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Movie.def()
    }
}

impl Related<super::voter::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Voter.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
