//! Music catalog service
//!
//! Guests browse singers, songs and song lists; managers edit them.

use crate::db::repositories::{SingerRepository, SongListRepository, SongRepository};
use crate::models::{
    Paginated, Singer, SingerInput, SingerQuery, Song, SongInput, SongList, SongListInput,
    SongListQuery, SongQuery, SINGER_NAME_MAX, SONG_NAME_MAX,
};
use std::sync::Arc;

const SONG_LIST_TITLE_MAX: usize = 255;

#[derive(Debug, thiserror::Error)]
pub enum MusicServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct MusicService {
    singers: Arc<dyn SingerRepository>,
    songs: Arc<dyn SongRepository>,
    song_lists: Arc<dyn SongListRepository>,
}

impl MusicService {
    pub fn new(
        singers: Arc<dyn SingerRepository>,
        songs: Arc<dyn SongRepository>,
        song_lists: Arc<dyn SongListRepository>,
    ) -> Self {
        Self {
            singers,
            songs,
            song_lists,
        }
    }

    // Singers

    pub async fn query_singer_list(&self) -> Result<Vec<Singer>, MusicServiceError> {
        Ok(self.singers.list_all().await?)
    }

    pub async fn query_page_singer(&self, query: &SingerQuery) -> Result<Paginated<Singer>, MusicServiceError> {
        let (singers, total) = self.singers.paginate(query).await?;
        Ok(Paginated::from_page(singers, total, query.options()))
    }

    pub async fn singer_detail(&self, id: i64) -> Result<Singer, MusicServiceError> {
        self.singers
            .get_by_id(id)
            .await?
            .ok_or_else(|| MusicServiceError::NotFound(format!("singer {}", id)))
    }

    pub async fn create_singer(&self, input: SingerInput) -> Result<Singer, MusicServiceError> {
        let input = validate_singer(input)?;
        let singer = self.singers.create(&input).await?;
        tracing::debug!("Created singer {} ({})", singer.name, singer.id);
        Ok(singer)
    }

    pub async fn update_singer(&self, id: i64, input: SingerInput) -> Result<Singer, MusicServiceError> {
        let input = validate_singer(input)?;
        self.singers
            .update(id, &input)
            .await?
            .ok_or_else(|| MusicServiceError::NotFound(format!("singer {}", id)))
    }

    /// Songs of the singer are removed with it
    pub async fn delete_singer(&self, id: i64) -> Result<(), MusicServiceError> {
        if !self.singers.delete(id).await? {
            return Err(MusicServiceError::NotFound(format!("singer {}", id)));
        }
        Ok(())
    }

    // Songs

    pub async fn query_song_list(&self) -> Result<Vec<Song>, MusicServiceError> {
        Ok(self.songs.list_all().await?)
    }

    pub async fn query_page_song(&self, query: &SongQuery) -> Result<Paginated<Song>, MusicServiceError> {
        let (songs, total) = self.songs.paginate(query).await?;
        Ok(Paginated::from_page(songs, total, query.options()))
    }

    pub async fn song_detail(&self, id: i64) -> Result<Song, MusicServiceError> {
        self.songs
            .get_by_id(id)
            .await?
            .ok_or_else(|| MusicServiceError::NotFound(format!("song {}", id)))
    }

    pub async fn create_song(&self, input: SongInput) -> Result<Song, MusicServiceError> {
        let input = self.validate_song(input).await?;
        Ok(self.songs.create(&input).await?)
    }

    pub async fn update_song(&self, id: i64, input: SongInput) -> Result<Song, MusicServiceError> {
        let input = self.validate_song(input).await?;
        self.songs
            .update(id, &input)
            .await?
            .ok_or_else(|| MusicServiceError::NotFound(format!("song {}", id)))
    }

    pub async fn delete_song(&self, id: i64) -> Result<(), MusicServiceError> {
        if !self.songs.delete(id).await? {
            return Err(MusicServiceError::NotFound(format!("song {}", id)));
        }
        Ok(())
    }

    // Song lists

    pub async fn query_song_lists(&self) -> Result<Vec<SongList>, MusicServiceError> {
        Ok(self.song_lists.list_all().await?)
    }

    pub async fn query_page_song_list(
        &self,
        query: &SongListQuery,
    ) -> Result<Paginated<SongList>, MusicServiceError> {
        let (lists, total) = self.song_lists.paginate(query).await?;
        Ok(Paginated::from_page(lists, total, query.options()))
    }

    pub async fn song_list_detail(&self, id: i64) -> Result<SongList, MusicServiceError> {
        self.song_lists
            .get_by_id(id)
            .await?
            .ok_or_else(|| MusicServiceError::NotFound(format!("song list {}", id)))
    }

    pub async fn create_song_list(&self, input: SongListInput) -> Result<SongList, MusicServiceError> {
        let input = validate_song_list(input)?;
        Ok(self.song_lists.create(&input).await?)
    }

    pub async fn update_song_list(&self, id: i64, input: SongListInput) -> Result<SongList, MusicServiceError> {
        let input = validate_song_list(input)?;
        self.song_lists
            .update(id, &input)
            .await?
            .ok_or_else(|| MusicServiceError::NotFound(format!("song list {}", id)))
    }

    pub async fn delete_song_list(&self, id: i64) -> Result<(), MusicServiceError> {
        if !self.song_lists.delete(id).await? {
            return Err(MusicServiceError::NotFound(format!("song list {}", id)));
        }
        Ok(())
    }

    async fn validate_song(&self, mut input: SongInput) -> Result<SongInput, MusicServiceError> {
        input.name = required(&input.name, "Song name", SONG_NAME_MAX)?;
        if input.url.trim().is_empty() {
            return Err(MusicServiceError::ValidationError("Song url cannot be empty".to_string()));
        }
        if self.singers.get_by_id(input.singer_id).await?.is_none() {
            return Err(MusicServiceError::ValidationError(format!(
                "Singer {} does not exist",
                input.singer_id
            )));
        }
        Ok(input)
    }
}

fn validate_singer(mut input: SingerInput) -> Result<SingerInput, MusicServiceError> {
    input.name = required(&input.name, "Singer name", SINGER_NAME_MAX)?;
    if !(0..=3).contains(&input.sex) {
        return Err(MusicServiceError::ValidationError(
            "Singer sex must be between 0 and 3".to_string(),
        ));
    }
    Ok(input)
}

fn validate_song_list(mut input: SongListInput) -> Result<SongListInput, MusicServiceError> {
    input.title = required(&input.title, "Song list title", SONG_LIST_TITLE_MAX)?;
    Ok(input)
}

fn required(value: &str, field: &str, max: usize) -> Result<String, MusicServiceError> {
    let value = value.trim();
    if value.is_empty() || value.chars().count() > max {
        return Err(MusicServiceError::ValidationError(format!(
            "{} must be 1 to {} characters",
            field, max
        )));
    }
    Ok(value.to_string())
}
