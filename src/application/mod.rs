//! Application services layer.

pub mod auth;
pub mod cache;
pub mod categories;
pub mod error;
pub mod kv;
pub mod mailer;
pub mod pagination;
pub mod passwords;
pub mod posts;
pub mod repos;
pub mod tokens;
