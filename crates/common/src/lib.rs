//! Shared settings, errors, response envelope and row helpers for SwainOS.

pub mod config;
pub mod envelope;
pub mod error;
pub mod row;
pub mod time;

pub use config::Settings;
pub use envelope::{paginate_list, Envelope, Meta, Pagination};
pub use error::Error;

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, Error>;
