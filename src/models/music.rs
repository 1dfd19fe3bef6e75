//! Music catalog: singers, songs and song lists
//!
//! Catalog records use integer ids assigned by the database.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::pagination::{default_limit, default_page};
use super::PaginateOptions;

pub const SINGER_NAME_MAX: usize = 45;
pub const SONG_NAME_MAX: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Singer {
    pub id: i64,
    pub name: String,
    /// 0 female, 1 male, 2 group, 3 unknown
    pub sex: i32,
    pub pic: Option<String>,
    pub birth: Option<DateTime<Utc>>,
    pub location: Option<String>,
    pub introduction: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Song {
    pub id: i64,
    pub singer_id: i64,
    pub name: String,
    pub introduction: Option<String>,
    pub create_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
    pub pic: Option<String>,
    pub lyric: Option<String>,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SongList {
    pub id: i64,
    pub title: String,
    pub pic: Option<String>,
    pub introduction: Option<String>,
    pub style: Option<String>,
}

/// Singer fields for create and update
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SingerInput {
    pub name: String,
    #[serde(default)]
    pub sex: i32,
    pub pic: Option<String>,
    pub birth: Option<DateTime<Utc>>,
    pub location: Option<String>,
    pub introduction: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SongInput {
    pub singer_id: i64,
    pub name: String,
    pub introduction: Option<String>,
    pub pic: Option<String>,
    pub lyric: Option<String>,
    pub url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SongListInput {
    pub title: String,
    pub pic: Option<String>,
    pub introduction: Option<String>,
    pub style: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SingerQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Substring of the name
    pub name: Option<String>,
    pub location: Option<String>,
    pub sex: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SongQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Substring of the name
    pub name: Option<String>,
    pub singer_id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SongListQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Substring of the title
    pub title: Option<String>,
    pub style: Option<String>,
}

macro_rules! impl_page_query {
    ($($ty:ident { $($field:ident),* }),* $(,)?) => {
        $(
            impl Default for $ty {
                fn default() -> Self {
                    Self {
                        page: default_page(),
                        limit: default_limit(),
                        $($field: None,)*
                    }
                }
            }

            impl $ty {
                pub fn options(&self) -> PaginateOptions {
                    PaginateOptions::new(self.page, self.limit)
                }
            }
        )*
    };
}

impl_page_query!(
    SingerQuery { name, location, sex },
    SongQuery { name, singer_id },
    SongListQuery { title, style },
);
