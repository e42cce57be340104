//! Core library for the checkride booking coordination service.

pub mod booking;
pub mod config;
pub mod error;
pub mod telemetry;

pub use error::AppError;
