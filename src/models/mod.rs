//! Domain models and DTOs.

pub mod audit;
pub mod finding;
pub mod pagination;
pub mod user;
