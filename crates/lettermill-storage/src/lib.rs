//! Lettermill Storage - PostgreSQL persistence layer
//!
//! This crate provides the relational persistence for the delivery
//! pipeline: subscribers, segments, campaigns, the send queue, delivery
//! events, and derived campaign statistics.

pub mod db;
pub mod models;
pub mod repository;

pub use db::DatabasePool;
pub use models::*;
pub use repository::*;
