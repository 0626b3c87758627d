//! Travel agents, agencies and the trade partner search index.

pub mod repository;
pub mod service;
pub mod types;

pub use repository::TravelTradeRepository;
pub use service::TravelTradeService;
