//! Lettermill API - REST API server
//!
//! REST surface for managing subscribers, segments, and campaigns, plus
//! the provider webhook endpoint and the public one-click unsubscribe
//! route.

pub mod handlers;
pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::AppState;
