//! Music catalog API endpoints
//!
//! Guest routes keep the catalog client's paths:
//! - GET /singer/querySingerList, GET /singer/queryPageSinger
//! - GET /song/querySongList, GET /song/queryPageSong
//! - GET /songList/querySongList, GET /songList/queryPageSong
//!
//! Manage routes: `/manage/singers`, `/manage/songs` and
//! `/manage/song-lists`, each with list, create, detail, update and delete.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use crate::api::common::{JsonBody, SuccessResponse};
use crate::api::middleware::{ApiError, AppState};
use crate::models::{
    Paginated, Singer, SingerInput, SingerQuery, Song, SongInput, SongList, SongListInput,
    SongListQuery, SongQuery,
};

pub fn singer_router() -> Router<AppState> {
    Router::new()
        .route("/querySingerList", get(query_singer_list))
        .route("/queryPageSinger", get(query_page_singer))
}

pub fn song_router() -> Router<AppState> {
    Router::new()
        .route("/querySongList", get(query_song_list))
        .route("/queryPageSong", get(query_page_song))
}

pub fn song_list_router() -> Router<AppState> {
    Router::new()
        .route("/querySongList", get(query_song_lists))
        .route("/queryPageSong", get(query_page_song_list))
}

pub fn manage_singer_router() -> Router<AppState> {
    Router::new()
        .route("/", get(query_page_singer).post(create_singer))
        .route(
            "/{id}",
            get(get_singer).patch(update_singer).delete(delete_singer),
        )
}

pub fn manage_song_router() -> Router<AppState> {
    Router::new()
        .route("/", get(query_page_song).post(create_song))
        .route("/{id}", get(get_song).patch(update_song).delete(delete_song))
}

pub fn manage_song_list_router() -> Router<AppState> {
    Router::new()
        .route("/", get(query_page_song_list).post(create_song_list))
        .route(
            "/{id}",
            get(get_song_list)
                .patch(update_song_list)
                .delete(delete_song_list),
        )
}

// Singers

async fn query_singer_list(State(state): State<AppState>) -> Result<Json<Vec<Singer>>, ApiError> {
    Ok(Json(state.music_service.query_singer_list().await?))
}

async fn query_page_singer(
    State(state): State<AppState>,
    Query(query): Query<SingerQuery>,
) -> Result<Json<Paginated<Singer>>, ApiError> {
    Ok(Json(state.music_service.query_page_singer(&query).await?))
}

async fn get_singer(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Singer>, ApiError> {
    Ok(Json(state.music_service.singer_detail(id).await?))
}

async fn create_singer(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<SingerInput>,
) -> Result<impl IntoResponse, ApiError> {
    let singer = state.music_service.create_singer(body).await?;
    Ok((StatusCode::CREATED, Json(singer)))
}

async fn update_singer(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    JsonBody(body): JsonBody<SingerInput>,
) -> Result<Json<Singer>, ApiError> {
    Ok(Json(state.music_service.update_singer(id, body).await?))
}

async fn delete_singer(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<SuccessResponse>, ApiError> {
    state.music_service.delete_singer(id).await?;
    Ok(Json(SuccessResponse::ok()))
}

// Songs

async fn query_song_list(State(state): State<AppState>) -> Result<Json<Vec<Song>>, ApiError> {
    Ok(Json(state.music_service.query_song_list().await?))
}

async fn query_page_song(
    State(state): State<AppState>,
    Query(query): Query<SongQuery>,
) -> Result<Json<Paginated<Song>>, ApiError> {
    Ok(Json(state.music_service.query_page_song(&query).await?))
}

async fn get_song(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Song>, ApiError> {
    Ok(Json(state.music_service.song_detail(id).await?))
}

async fn create_song(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<SongInput>,
) -> Result<impl IntoResponse, ApiError> {
    let song = state.music_service.create_song(body).await?;
    Ok((StatusCode::CREATED, Json(song)))
}

async fn update_song(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    JsonBody(body): JsonBody<SongInput>,
) -> Result<Json<Song>, ApiError> {
    Ok(Json(state.music_service.update_song(id, body).await?))
}

async fn delete_song(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<SuccessResponse>, ApiError> {
    state.music_service.delete_song(id).await?;
    Ok(Json(SuccessResponse::ok()))
}

// Song lists

async fn query_song_lists(State(state): State<AppState>) -> Result<Json<Vec<SongList>>, ApiError> {
    Ok(Json(state.music_service.query_song_lists().await?))
}

async fn query_page_song_list(
    State(state): State<AppState>,
    Query(query): Query<SongListQuery>,
) -> Result<Json<Paginated<SongList>>, ApiError> {
    Ok(Json(state.music_service.query_page_song_list(&query).await?))
}

async fn get_song_list(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<SongList>, ApiError> {
    Ok(Json(state.music_service.song_list_detail(id).await?))
}

async fn create_song_list(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<SongListInput>,
) -> Result<impl IntoResponse, ApiError> {
    let list = state.music_service.create_song_list(body).await?;
    Ok((StatusCode::CREATED, Json(list)))
}

async fn update_song_list(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    JsonBody(body): JsonBody<SongListInput>,
) -> Result<Json<SongList>, ApiError> {
    Ok(Json(state.music_service.update_song_list(id, body).await?))
}

async fn delete_song_list(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<SuccessResponse>, ApiError> {
    state.music_service.delete_song_list(id).await?;
    Ok(Json(SuccessResponse::ok()))
}
