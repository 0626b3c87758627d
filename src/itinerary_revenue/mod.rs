//! Itinerary revenue outlook, deposits, conversion, channels and actuals.

pub mod repository;
pub mod service;
pub mod types;

pub use repository::ItineraryRevenueRepository;
pub use service::ItineraryRevenueService;
