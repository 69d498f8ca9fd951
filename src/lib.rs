//! Core library for artist-playlist-sync
pub mod api;
pub mod config;
pub mod db;
pub mod index;
pub mod library;
pub mod matcher;
pub mod models;
pub mod paging;
pub mod sync;
