//! Generated insights: briefings, feed, recommendation queue and generation runs.

pub mod orchestration;
pub mod repository;
pub mod service;
pub mod types;

pub use orchestration::AiOrchestrationService;
pub use repository::AiInsightsRepository;
pub use service::AiInsightsService;
