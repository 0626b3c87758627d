//! SwainOS analytics backend.
//!
//! Domain modules each pair a repository (row store queries) with a service
//! (business rules). The `api` module exposes them over HTTP and the
//! `swainctl` binary drives the maintenance runs.

pub mod ai_insights;
pub mod api;
pub mod fx;
pub mod itinerary_revenue;
pub mod revenue_bookings;
pub mod state;
pub mod telemetry;
pub mod travel_consultants;
pub mod travel_trade;

pub use state::AppState;
