pub mod repository;
pub mod service;
pub mod types;

pub use repository::TravelConsultantsRepository;
pub use service::TravelConsultantsService;
