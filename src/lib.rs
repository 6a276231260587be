pub mod analysis;
pub mod api;
pub mod app_state;
pub mod auth;
pub mod clock;
pub mod config;
pub mod curation;
pub mod entities;
pub mod extractor;
pub mod health;
pub mod middleware;
pub mod notify;
pub mod pipeline;
pub mod repositories;
pub mod scheduler;
pub mod source;
pub mod telemetry;
