//! Bookings, customer payments and supplier invoices.

pub mod repository;
pub mod service;
pub mod types;

pub use repository::RevenueBookingsRepository;
pub use service::RevenueBookingsService;
