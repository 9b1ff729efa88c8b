//! Quire: a blogging API with accounts, bearer-token sessions and post publishing.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
