//! Ruifeng - content management and music catalog server
//!
//! Posts, categories, tags and comments with role-based access control,
//! plus a catalog of singers, songs and song lists, served over a JSON API.

pub mod api;
pub mod app;
pub mod cache;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
