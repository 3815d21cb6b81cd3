pub mod api;
pub mod auth;
pub mod chat;
pub mod config;
pub mod error;
pub mod models;

pub use config::ClientConfig;
pub use error::ChatError;
