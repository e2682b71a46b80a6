#![forbid(unsafe_code)]

//! Fetch-and-serve service for short-lived video downloads.
//!
//! A query (free text or a direct link) is resolved to a video URL, downloaded
//! with yt-dlp into a flat storage directory, registered with an expiry (a day
//! by default), and exposed over HTTP until the janitor deletes it.

pub mod api;
pub mod clock;
pub mod config;
pub mod fetcher;
pub mod janitor;
pub mod registry;
pub mod resolver;
pub mod search;
pub mod security;
pub mod service;
pub mod telemetry;
pub mod ytdlp;
