//! taskboard - multi-user task tracker
//!
//! The server side is a REST task store over SQLite ([`api`], [`db`]); the
//! client side is an in-memory task cache that mirrors one user's tasks and
//! reconciles itself with server responses ([`client`]).

pub mod api;
pub mod auth;
pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
