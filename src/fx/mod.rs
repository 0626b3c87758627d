//! Foreign exchange desk: rates, exposure, signals, ledger and market intelligence.

pub mod intelligence;
pub mod repository;
pub mod service;
pub mod signals;
pub mod types;

pub use intelligence::FxIntelligenceService;
pub use repository::{FxRepository, PageRequest};
pub use service::FxService;
